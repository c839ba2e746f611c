//! Gun-edge capture task.
//!
//! The gun input polarity depends on the wired sensor: normally-closed
//! idles high and fires on the rising edge, normally-open idles low and
//! fires on the falling edge. ARM hands this task the polarity through
//! [`GUN_ARM`]; the task is one-shot per arming.
//!
//! The register work after the edge is deferred out of interrupt
//! context by construction: the task body runs on the executor, so the
//! EXTI handler itself only wakes the awaiting future.

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use startblock_core::config::GunSensor;

use crate::drivers::imu::Icm42688;
use crate::peripherals::io::GunPeripherals;
use crate::session::{GUN_ARM, IRQ};

/// Waits for the starter's gun and latches its IMU timestamp.
///
/// On the edge: strobe the IMU timestamp latch, read the three
/// timestamp bytes from bank 1, publish the assembled 20-bit tick
/// through the IRQ view, and raise the gun-fired output. A new ARM
/// while waiting restarts the wait with the freshly configured
/// polarity.
#[embassy_executor::task]
pub async fn task(
    imu: &'static Mutex<NoopRawMutex, Icm42688<'static>>,
    mut peripherals: GunPeripherals<'static>,
) -> ! {
    let mut fired_out = Output::new(peripherals.fired_out, Level::Low, Speed::Low);
    let mut sensor = GUN_ARM.wait().await;

    loop {
        fired_out.set_low();

        let fired = {
            let (pull, rising) = match sensor {
                GunSensor::NormallyClosed => (Pull::Up, true),
                GunSensor::NormallyOpen => (Pull::Down, false),
            };
            let mut line = ExtiInput::new(
                peripherals.pin.reborrow(),
                peripherals.exti.reborrow(),
                pull,
            );
            let edge = async {
                if rising {
                    line.wait_for_rising_edge().await
                } else {
                    line.wait_for_falling_edge().await
                }
            };
            match select(GUN_ARM.wait(), edge).await {
                Either::First(next) => {
                    sensor = next;
                    false
                }
                Either::Second(()) => true,
            }
        };
        if !fired {
            continue;
        }

        let latched = imu.lock().await.latch_timestamp().await;
        match latched {
            Ok(tick) => {
                IRQ.publish_gun(tick);
                fired_out.set_high();
                info!("Gun fired at tick {}", tick);
            }
            Err(e) => warn!("Gun timestamp latch failed: {:?}", e),
        }

        // One-shot consumed; park until the next ARM.
        sensor = GUN_ARM.wait().await;
    }
}
