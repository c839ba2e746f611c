//! Hardware drivers for the starting block.
//!
//! This module contains device drivers for the sensors used by the
//! block-side capture pipeline.

/// ICM-42688 6-axis IMU driver
pub mod imu;
