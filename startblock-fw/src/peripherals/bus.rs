//! Half-duplex multidrop bus endpoint.
//!
//! All blocks and the host share one pair of wires; whoever transmits
//! asserts its transmit-enable line for exactly the span of the frame.
//! The USART's hardware driver-enable output does that here: DE rises
//! before the start bit and falls once the last stop bit has shifted
//! out, so the block never holds the bus after a reply.

use embassy_stm32::{
    bind_interrupts,
    mode::Async,
    peripherals::{DMA1_CH2, DMA1_CH3, PD4, PD5, PD6, USART2},
    usart::{self, Config as UartConfig, Uart},
    Peri,
};
use embassy_time::{with_timeout, Duration};

/// Bus bit rate, 8-N-1. The electrical design also allows 1.5 MBd.
pub const BAUD_RATE: u32 = 1_000_000;

/// A command frame must arrive in full within this window.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(100);

bind_interrupts!(
    /// Bus USART interrupt handlers
    pub struct BusInterrupts {
        USART2 => usart::InterruptHandler<embassy_stm32::peripherals::USART2>;
    }
);

/// Peripheral collection for the bus interface
pub struct BusPeripherals<'d> {
    pub usart: Peri<'d, USART2>,
    pub rx: Peri<'d, PD6>,
    pub tx: Peri<'d, PD5>,
    pub de: Peri<'d, PD4>, // transmit-enable, driven by the USART
    pub dma_tx: Peri<'d, DMA1_CH2>,
    pub dma_rx: Peri<'d, DMA1_CH3>,
}

/// Macro to claim peripherals for BusUart
#[macro_export]
macro_rules! claim_bus_uart {
    ($peripherals:expr) => {{
        $crate::peripherals::bus::BusPeripherals {
            usart: $peripherals.USART2,
            rx: $peripherals.PD6,
            tx: $peripherals.PD5,
            de: $peripherals.PD4, // transmit-enable
            dma_tx: $peripherals.DMA1_CH2,
            dma_rx: $peripherals.DMA1_CH3,
        }
    }};
}

/// The block's end of the half-duplex bus.
pub struct BusUart<'d> {
    uart: Uart<'d, Async>,
}

impl<'d> BusUart<'d> {
    /// Create the bus endpoint.
    ///
    /// # Panics
    ///
    /// Panics when the USART rejects the configuration; this is a boot
    /// time wiring error, not a runtime condition.
    pub fn new(peripherals: BusPeripherals<'d>) -> Self {
        let mut config = UartConfig::default();
        config.baudrate = BAUD_RATE;

        let uart = Uart::new_with_de(
            peripherals.usart,
            peripherals.rx,
            peripherals.tx,
            BusInterrupts,
            peripherals.de,
            peripherals.dma_tx,
            peripherals.dma_rx,
            config,
        )
        .expect("bus UART configuration failed");

        Self { uart }
    }

    /// Drive one frame onto the bus.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), usart::Error> {
        self.uart.write(frame).await
    }

    /// Receive one burst of bus bytes, bounded by the frame timeout.
    ///
    /// Returns `None` on timeout or receiver error; incomplete frames
    /// are the frame parser's problem and bad ones are dropped there.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        match with_timeout(FRAME_TIMEOUT, self.uart.read_until_idle(buf)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(n)) => Some(n),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}
