//! ICM-42688 6-axis IMU driver.

mod driver;

pub use driver::{threshold_task, Icm42688, ImuError, ImuPeripherals};
