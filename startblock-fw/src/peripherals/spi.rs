//! SPI peripheral configuration for the ICM-42688 IMU.
//!
//! Provides register-level SPI access with software chip select and DMA
//! transfers, which the FIFO drain depends on for burst reads straight
//! into the trace buffer.

use embassy_stm32::{
    gpio::{Level, Output, Speed},
    mode::Async,
    peripherals::{DMA1_CH0, DMA1_CH1, PE11, PE12, PE13, PE14, SPI4},
    spi::{Config as SpiConfig, Mode, Phase, Polarity, Spi},
    time::Hertz,
    Peri,
};

/// Register address bit 7 set marks a read; cleared, a write.
const SPI_READ_BIT: u8 = 0x80;
const SPI_WRITE_MASK: u8 = 0x7F;

/// Peripheral collection for the IMU SPI interface
pub struct SpiPeripherals<'d> {
    pub spi4: Peri<'d, SPI4>,
    pub cs: Peri<'d, PE11>,         // CS
    pub sck: Peri<'d, PE12>,        // SCK
    pub miso: Peri<'d, PE13>,       // MISO
    pub mosi: Peri<'d, PE14>,       // MOSI
    pub dma_tx: Peri<'d, DMA1_CH0>, // TX DMA
    pub dma_rx: Peri<'d, DMA1_CH1>, // RX DMA
}

/// Macro to claim peripherals for ImuSpi
#[macro_export]
macro_rules! claim_imu_spi {
    ($peripherals:expr) => {{
        $crate::peripherals::spi::SpiPeripherals {
            spi4: $peripherals.SPI4,
            cs: $peripherals.PE11,         // CS
            sck: $peripherals.PE12,        // SCK
            miso: $peripherals.PE13,       // MISO
            mosi: $peripherals.PE14,       // MOSI
            dma_tx: $peripherals.DMA1_CH0, // TX DMA
            dma_rx: $peripherals.DMA1_CH1, // RX DMA
        }
    }};
}

/// SPI interface to the ICM-42688.
///
/// The ICM-42688 speaks SPI mode 0 at up to 24 MHz. Chip select is a
/// software-controlled GPIO so burst reads can hold it across the
/// address byte and the data phase.
pub struct ImuSpi<'d> {
    /// SPI peripheral instance with DMA
    pub spi: Spi<'d, Async>,
    /// Chip select pin (software controlled)
    pub cs: Output<'d>,
}

impl<'d> ImuSpi<'d> {
    /// Create a new IMU SPI interface with software chip select.
    pub fn new(peripherals: SpiPeripherals<'d>) -> Self {
        let mut config = SpiConfig::default();
        config.mode = Mode {
            polarity: Polarity::IdleLow,
            phase: Phase::CaptureOnFirstTransition,
        };
        config.frequency = Hertz(24_000_000);

        let cs_pin = Output::new(peripherals.cs, Level::High, Speed::VeryHigh);

        let spi = Spi::new(
            peripherals.spi4,
            peripherals.sck,
            peripherals.mosi,
            peripherals.miso,
            peripherals.dma_tx,
            peripherals.dma_rx,
            config,
        );

        Self { spi, cs: cs_pin }
    }

    /// Read a single register.
    ///
    /// Asserts chip select, sends the register address with the read
    /// bit set, clocks one response byte, and releases chip select.
    pub async fn read_register(&mut self, reg: u8) -> Result<u8, embassy_stm32::spi::Error> {
        let tx_buf = [reg | SPI_READ_BIT, 0x00]; // dummy byte clocks the response
        let mut rx_buf = [0u8; 2];

        self.cs.set_low();
        let result = self.spi.transfer(&mut rx_buf, &tx_buf).await;
        self.cs.set_high();

        result?;
        Ok(rx_buf[1])
    }

    /// Write a single register.
    pub async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), embassy_stm32::spi::Error> {
        let tx_buf = [reg & SPI_WRITE_MASK, value];

        self.cs.set_low();
        let result = self.spi.write(&tx_buf).await;
        self.cs.set_high();

        result
    }

    /// Burst-read starting at `reg` into a caller-owned buffer.
    ///
    /// This is the FIFO drain fast path: no allocation, one DMA
    /// transfer directly into the destination region.
    pub async fn read_register_burst(
        &mut self,
        reg: u8,
        buffer: &mut [u8],
    ) -> Result<(), embassy_stm32::spi::Error> {
        let cmd = [reg | SPI_READ_BIT];

        self.cs.set_low();
        // Send the address, then clock the data with chip select held.
        let result = match self.spi.write(&cmd).await {
            Ok(()) => self.spi.read(buffer).await,
            Err(e) => Err(e),
        };
        self.cs.set_high();

        result
    }
}
