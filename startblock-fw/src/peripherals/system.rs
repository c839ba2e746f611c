//! System initialization and clock configuration for the STM32H753.

use embassy_stm32::{rcc::*, Config, Peripherals};

/// Initialize the STM32H753 clock tree.
///
/// Configures the system for high-performance operation:
/// - **480 MHz** system clock (maximum for the STM32H753) using PLL1
///   from HSI
/// - **240 MHz** AHB clock (CPU and high-speed peripherals)
/// - **120 MHz** APB clocks (peripheral buses, which feed the bus USART
///   and the IMU SPI kernel clocks)
/// - **Scale0** voltage scaling for maximum performance
///
/// Sample timestamps do not depend on any of this: the IMU timebase is
/// locked to the external 32.768 kHz CLKIN distributed by the host.
///
/// # Returns
///
/// The initialized [`Peripherals`] struct containing all STM32
/// peripheral instances.
///
/// # Panics
///
/// Panics if the clock configuration fails, which indicates hardware
/// issues or invalid clock settings.
pub fn init_system() -> Peripherals {
    let mut config = Config::default();

    // High-speed internal oscillator (16 MHz).
    config.rcc.hsi = Some(HSIPrescaler::DIV1);

    // Low-power internal oscillator for backup.
    config.rcc.csi = true;

    // PLL1 = HSI(16MHz) / DIVM1(4) * DIVN1(60) / DIVP1(2) = 480MHz
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSI,   // Use internal 16MHz oscillator
        prediv: PllPreDiv::DIV4,  // DIVM1=4 -> 4MHz PLL input
        mul: PllMul::MUL60,       // DIVN1=60 -> 240MHz VCO
        divp: Some(PllDiv::DIV2), // DIVP1=2 -> 480MHz output
        divq: None,               // Q output not used
        divr: None,               // R output not used
    });

    // System clock configuration
    config.rcc.sys = Sysclk::PLL1_P; // 480 MHz system clock
    config.rcc.ahb_pre = AHBPrescaler::DIV2; // 240 MHz AHB clock
    config.rcc.apb1_pre = APBPrescaler::DIV2; // 120 MHz APB1 clock
    config.rcc.apb2_pre = APBPrescaler::DIV2; // 120 MHz APB2 clock
    config.rcc.apb3_pre = APBPrescaler::DIV2; // 120 MHz APB3 clock
    config.rcc.apb4_pre = APBPrescaler::DIV2; // 120 MHz APB4 clock

    // Maximum voltage scaling for 480MHz operation
    config.rcc.voltage_scale = VoltageScale::Scale0;

    embassy_stm32::init(config)
}
