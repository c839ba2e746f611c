//! Discrete GPIO surface of the block.
//!
//! Four pulled-down DIP inputs strap the block identity, read once at
//! boot. The alert output goes high on a false start, the gun-fired
//! output mirrors gun detection for downstream equipment, and the abort
//! input is push-pull driven by the host controller.

use embassy_stm32::{
    gpio::{Input, Level, Output, Pull, Speed},
    peripherals::{EXTI1, PD1, PD2, PD8, PD9, PD10, PD11, PE0, PE1, PE3},
    Peri,
};

/// Peripheral collection for the identity DIP bank
pub struct DipPeripherals<'d> {
    pub ones: Peri<'d, PD8>,
    pub twos: Peri<'d, PD9>,
    pub fours: Peri<'d, PD10>,
    pub eights: Peri<'d, PD11>,
}

/// Macro to claim peripherals for DipSwitch
#[macro_export]
macro_rules! claim_dip {
    ($peripherals:expr) => {{
        $crate::peripherals::io::DipPeripherals {
            ones: $peripherals.PD8,
            twos: $peripherals.PD9,
            fours: $peripherals.PD10,
            eights: $peripherals.PD11,
        }
    }};
}

/// Binary identity straps.
pub struct DipSwitch<'d> {
    ones: Input<'d>,
    twos: Input<'d>,
    fours: Input<'d>,
    eights: Input<'d>,
}

impl<'d> DipSwitch<'d> {
    pub fn new(peripherals: DipPeripherals<'d>) -> Self {
        Self {
            ones: Input::new(peripherals.ones, Pull::Down),
            twos: Input::new(peripherals.twos, Pull::Down),
            fours: Input::new(peripherals.fours, Pull::Down),
            eights: Input::new(peripherals.eights, Pull::Down),
        }
    }

    /// The four-bit strap value.
    pub fn read_nibble(&self) -> u8 {
        u8::from(self.ones.is_high())
            | u8::from(self.twos.is_high()) << 1
            | u8::from(self.fours.is_high()) << 2
            | u8::from(self.eights.is_high()) << 3
    }
}

/// Peripheral collection for the gun input and its mirror output
pub struct GunPeripherals<'d> {
    pub pin: Peri<'d, PD1>,
    pub exti: Peri<'d, EXTI1>,
    pub fired_out: Peri<'d, PE1>,
}

/// Macro to claim peripherals for the gun watch task
#[macro_export]
macro_rules! claim_gun {
    ($peripherals:expr) => {{
        $crate::peripherals::io::GunPeripherals {
            pin: $peripherals.PD1,
            exti: $peripherals.EXTI1,
            fired_out: $peripherals.PE1,
        }
    }};
}

/// Peripheral collection for the block's status lines
pub struct BlockIoPeripherals<'d> {
    pub alert: Peri<'d, PE0>,
    pub status_led: Peri<'d, PE3>,
    pub abort: Peri<'d, PD2>,
}

/// Macro to claim peripherals for BlockIo
#[macro_export]
macro_rules! claim_block_io {
    ($peripherals:expr) => {{
        $crate::peripherals::io::BlockIoPeripherals {
            alert: $peripherals.PE0,
            status_led: $peripherals.PE3,
            abort: $peripherals.PD2,
        }
    }};
}

/// Alert and status outputs plus the host-driven abort input.
pub struct BlockIo<'d> {
    /// High signals a false start.
    pub alert: Output<'d>,
    pub status_led: Output<'d>,
    /// Push-pull driven by the host controller; no pull needed.
    pub abort: Input<'d>,
}

impl<'d> BlockIo<'d> {
    pub fn new(peripherals: BlockIoPeripherals<'d>) -> Self {
        Self {
            alert: Output::new(peripherals.alert, Level::Low, Speed::Low),
            status_led: Output::new(peripherals.status_led, Level::Low, Speed::Low),
            abort: Input::new(peripherals.abort, Pull::None),
        }
    }
}
