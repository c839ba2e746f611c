//! ICM-42688 6-axis IMU driver
//!
//! This driver provides the low-level interface to the ICM-42688 over
//! SPI. It handles:
//! - Register-level communication across the three register banks
//! - The capture configuration written at every ARM (2 kHz ODR, FIFO
//!   streaming with header records, threshold interrupt on INT1,
//!   external 32.768 kHz CLKIN timebase)
//! - FIFO byte counts and DMA burst reads into a caller-owned region
//! - The gun timestamp latch (strobe + bank 1 readout)

use embassy_stm32::{
    exti::ExtiInput,
    gpio::Pull,
    peripherals::{EXTI10, PE10},
    Peri,
};
use embassy_time::{Duration, Timer};

use crate::peripherals::spi::ImuSpi;
use crate::session::IRQ;

/// Peripheral collection for the IMU threshold interrupt
pub struct ImuPeripherals<'d> {
    pub interrupt_pin: Peri<'d, PE10>,
    pub interrupt_line: Peri<'d, EXTI10>,
}

/// Macro to claim peripherals for the IMU threshold interrupt
#[macro_export]
macro_rules! claim_imu {
    ($peripherals:expr) => {{
        $crate::drivers::imu::ImuPeripherals {
            interrupt_pin: $peripherals.PE10,
            interrupt_line: $peripherals.EXTI10,
        }
    }};
}

/// Bank 0 register addresses
///
/// These correspond to the register map in the ICM-42688 datasheet.
#[repr(u8)]
#[derive(Copy, Clone)]
enum Bank0 {
    DeviceConfig = 0x11,
    IntConfig = 0x14,
    FifoConfig = 0x16,
    IntStatus = 0x2D,
    FifoCountH = 0x2E,
    FifoData = 0x30,
    SignalPathReset = 0x4B,
    IntfConfig0 = 0x4C,
    IntfConfig1 = 0x4D,
    PwrMgmt0 = 0x4E,
    GyroConfig0 = 0x4F,
    AccelConfig0 = 0x50,
    GyroAccelConfig0 = 0x52,
    AccelConfig1 = 0x53,
    TmstConfig = 0x54,
    FifoConfig1 = 0x5F,
    FifoConfig2 = 0x60,
    FifoConfig3 = 0x61,
    IntConfig0 = 0x63,
    IntConfig1 = 0x64,
    IntSource0 = 0x65,
    FifoLostPkt0 = 0x6C,
    WhoAmI = 0x75,
    RegBankSel = 0x76,
}

/// Bank 1 register addresses
#[repr(u8)]
#[derive(Copy, Clone)]
enum Bank1 {
    TmstVal0 = 0x62,
    IntfConfig5 = 0x7B,
}

/// Bank 2 register addresses
#[repr(u8)]
#[derive(Copy, Clone)]
enum Bank2 {
    AccelConfigStatic2 = 0x03,
}

const WHO_AM_I_EXPECTED: u8 = 0x47;

// PWR_MGMT0
const SENSORS_OFF: u8 = 0x00;
const ACCEL_GYRO_LOW_NOISE: u8 = 0b0000_1111;

// DEVICE_CONFIG
const SOFT_RESET: u8 = 0b0000_0001;

// GYRO_CONFIG0 / ACCEL_CONFIG0: FS_SEL=000 (full range), ODR=0101 (2 kHz)
const FULL_SCALE_ODR_2KHZ: u8 = 0b0000_0101;
// ACCEL_CONFIG1: first-order UI filter; bit 0 is reserved and must be set
const ACCEL_UI_FILT_FIRST_ORDER: u8 = 0b0000_0101;
// GYRO_ACCEL_CONFIG0: ACCEL_UI_FILT_BW=6, GYRO_UI_FILT_BW=0
const UI_FILT_BANDWIDTH: u8 = 0b0001_0000;

// FIFO_CONFIG: FIFO_MODE=01 (streaming)
const FIFO_STREAM_MODE: u8 = 0b0100_0000;
// FIFO_CONFIG1: header records with accel + gyro + temperature enabled
const FIFO_PACKET_LAYOUT: u8 = 0b0000_1111;
// FIFO watermark in bytes (~32 samples)
const FIFO_WATERMARK: u16 = 0x0200;

// TMST_CONFIG: timestamp registers enabled, 16-bit field in FIFO records
const TMST_16BIT_FIELD: u8 = 0b0011_1001;
// INTF_CONFIG0: big-endian sensor data, FIFO count in bytes
const INTF_DATA_FORMAT: u8 = 0b0011_0011;
// INTF_CONFIG1: RTC mode, timebase from the external CLKIN
const RTC_MODE_CLKIN: u8 = 0b1001_0100;
// Bank 1 INTF_CONFIG5: PIN9_FUNCTION=10 (CLKIN)
const PIN9_CLKIN: u8 = 0b0000_0100;
// Bank 2 ACCEL_CONFIG_STATIC2: anti-alias filter disabled
const ACCEL_AAF_DISABLE: u8 = 0b0011_0001;

// INT_CONFIG: INT1 push-pull, active high, latched until status read
const INT1_PUSH_PULL_LATCHED: u8 = 0b0000_0111;
// INT_CONFIG0: FIFO threshold flag cleared on status read
const INT_CLEAR_ON_STATUS_READ: u8 = 0b0000_0100;
// INT_CONFIG1: INT_ASYNC_RESET off
const INT_ASYNC_RESET_OFF: u8 = 0b0000_0000;
// INT_SOURCE0: FIFO threshold routed to INT1
const INT1_FIFO_THRESHOLD: u8 = 0b0000_0100;

// SIGNAL_PATH_RESET strobes
const FIFO_FLUSH: u8 = 0b0000_0010;
const TMST_STROBE: u8 = 0b0000_0100;

/// IMU driver errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "debug", derive(defmt::Format))]
pub enum ImuError {
    /// SPI bus transaction failed
    Bus,
    /// Device not found or wrong chip ID
    DeviceNotFound,
}

impl From<embassy_stm32::spi::Error> for ImuError {
    fn from(_: embassy_stm32::spi::Error) -> Self {
        ImuError::Bus
    }
}

/// ICM-42688 driver.
///
/// The driver does not retry failed transactions; a bus error surfaces
/// to the caller and the next ARM reconfigures the device from scratch.
pub struct Icm42688<'d> {
    /// SPI interface to the chip (includes chip select)
    spi: ImuSpi<'d>,
}

impl<'d> Icm42688<'d> {
    pub fn new(spi: ImuSpi<'d>) -> Self {
        Self { spi }
    }

    /// Verify the chip answers with the expected WHO_AM_I.
    pub async fn probe(&mut self) -> Result<(), ImuError> {
        self.set_bank(0).await?;
        let chip_id = self.spi.read_register(Bank0::WhoAmI as u8).await?;
        if chip_id != WHO_AM_I_EXPECTED {
            defmt::error!(
                "Wrong chip ID: expected 0x{:02X}, got 0x{:02X}",
                WHO_AM_I_EXPECTED,
                chip_id
            );
            return Err(ImuError::DeviceNotFound);
        }
        Ok(())
    }

    /// Select a register bank and let the device settle.
    pub async fn set_bank(&mut self, bank: u8) -> Result<(), ImuError> {
        self.spi
            .write_register(Bank0::RegBankSel as u8, bank & 0x07)
            .await?;
        Timer::after(Duration::from_micros(10)).await;
        Ok(())
    }

    /// Soft-reset the device: bank 0, sensors parked, reset strobed.
    pub async fn reset(&mut self) -> Result<(), ImuError> {
        self.set_bank(0).await?;
        self.spi
            .write_register(Bank0::PwrMgmt0 as u8, SENSORS_OFF)
            .await?;
        self.spi
            .write_register(Bank0::DeviceConfig as u8, SOFT_RESET)
            .await?;
        Timer::after(Duration::from_millis(10)).await;
        Ok(())
    }

    /// Full capture configuration, written at every ARM.
    ///
    /// Leaves the device reset, sampling both sensors at 2 kHz into a
    /// streaming FIFO with header records, the threshold interrupt on
    /// INT1, the timebase locked to the external 32.768 kHz clock, and
    /// the FIFO flushed of anything a previous run left behind.
    pub async fn configure_capture(&mut self) -> Result<(), ImuError> {
        self.reset().await?;

        self.write(Bank0::GyroConfig0, FULL_SCALE_ODR_2KHZ).await?;
        self.write(Bank0::AccelConfig0, FULL_SCALE_ODR_2KHZ).await?;
        self.write(Bank0::AccelConfig1, ACCEL_UI_FILT_FIRST_ORDER).await?;
        self.write(Bank0::GyroAccelConfig0, UI_FILT_BANDWIDTH).await?;

        self.write(Bank0::FifoConfig, FIFO_STREAM_MODE).await?;
        self.write(Bank0::FifoConfig1, FIFO_PACKET_LAYOUT).await?;
        self.write(Bank0::FifoConfig2, (FIFO_WATERMARK & 0xFF) as u8).await?;
        self.write(Bank0::FifoConfig3, (FIFO_WATERMARK >> 8) as u8).await?;

        self.write(Bank0::TmstConfig, TMST_16BIT_FIELD).await?;
        self.write(Bank0::IntfConfig0, INTF_DATA_FORMAT).await?;
        self.write(Bank0::IntConfig0, INT_CLEAR_ON_STATUS_READ).await?;

        self.write(Bank0::IntConfig, INT1_PUSH_PULL_LATCHED).await?;
        self.write(Bank0::IntConfig1, INT_ASYNC_RESET_OFF).await?;
        self.write(Bank0::IntSource0, INT1_FIFO_THRESHOLD).await?;

        self.set_bank(2).await?;
        self.spi
            .write_register(Bank2::AccelConfigStatic2 as u8, ACCEL_AAF_DISABLE)
            .await?;
        self.set_bank(1).await?;
        self.spi
            .write_register(Bank1::IntfConfig5 as u8, PIN9_CLKIN)
            .await?;
        self.set_bank(0).await?;

        self.write(Bank0::IntfConfig1, RTC_MODE_CLKIN).await?;
        self.write(Bank0::SignalPathReset, FIFO_FLUSH).await?;

        self.drain_residual().await
    }

    /// Power both sensors up in low-noise mode.
    pub async fn enable_sensors(&mut self) -> Result<(), ImuError> {
        self.write(Bank0::PwrMgmt0, ACCEL_GYRO_LOW_NOISE).await
    }

    pub async fn disable_sensors(&mut self) -> Result<(), ImuError> {
        self.write(Bank0::PwrMgmt0, SENSORS_OFF).await
    }

    /// Bytes currently held by the FIFO.
    pub async fn fifo_byte_count(&mut self) -> Result<u16, ImuError> {
        let mut count = [0u8; 2];
        self.spi
            .read_register_burst(Bank0::FifoCountH as u8, &mut count)
            .await?;
        Ok(u16::from_be_bytes(count))
    }

    /// Burst-read FIFO bytes straight into the caller's region.
    pub async fn read_fifo_into(&mut self, region: &mut [u8]) -> Result<(), ImuError> {
        self.spi
            .read_register_burst(Bank0::FifoData as u8, region)
            .await?;
        Ok(())
    }

    /// Read INT_STATUS, which clears the latched threshold interrupt.
    pub async fn clear_fifo_interrupt(&mut self) -> Result<u8, ImuError> {
        Ok(self.spi.read_register(Bank0::IntStatus as u8).await?)
    }

    /// Latch and read the 20-bit timestamp, used by the gun capture.
    ///
    /// Strobes the timestamp latch bit, then reads the three timestamp
    /// bytes from bank 1 and reassembles them little end first.
    pub async fn latch_timestamp(&mut self) -> Result<u32, ImuError> {
        self.write(Bank0::SignalPathReset, TMST_STROBE).await?;
        self.set_bank(1).await?;
        let mut ts = [0u8; 3];
        self.spi
            .read_register_burst(Bank1::TmstVal0 as u8, &mut ts)
            .await?;
        self.set_bank(0).await?;
        Ok(u32::from(ts[2]) << 16 | u32::from(ts[1]) << 8 | u32::from(ts[0]))
    }

    /// Packets the sensor dropped on FIFO overflow, from the lost
    /// packet counter pair.
    pub async fn fifo_lost_packets(&mut self) -> Result<u16, ImuError> {
        let mut lost = [0u8; 2];
        self.spi
            .read_register_burst(Bank0::FifoLostPkt0 as u8, &mut lost)
            .await?;
        Ok(u16::from_le_bytes(lost))
    }

    async fn write(&mut self, reg: Bank0, value: u8) -> Result<(), ImuError> {
        self.spi.write_register(reg as u8, value).await?;
        Ok(())
    }

    /// Discard whatever the FIFO still holds after a reconfiguration.
    async fn drain_residual(&mut self) -> Result<(), ImuError> {
        let mut scratch = [0u8; 256];
        // Bounded: the FIFO is 2 KiB.
        for _ in 0..16 {
            let count = self.fifo_byte_count().await?;
            if count == 0 {
                break;
            }
            let take = usize::from(count).min(scratch.len());
            self.read_fifo_into(&mut scratch[..take]).await?;
        }
        Ok(())
    }
}

/// FIFO-threshold edge watcher.
///
/// The handler stays minimal: latch data-ready, count the edge. The
/// bulk drain runs in the capture loop, which polls the latch.
#[embassy_executor::task]
pub async fn threshold_task(peripherals: ImuPeripherals<'static>) -> ! {
    let mut line = ExtiInput::new(
        peripherals.interrupt_pin,
        peripherals.interrupt_line,
        Pull::None,
    );
    loop {
        line.wait_for_rising_edge().await;
        IRQ.note_fifo_edge();
    }
}
