//! Application layer for the starting block.
//!
//! This module contains the block-side applications: the bus protocol
//! engine with its capture loop, and the gun-edge watch task. They use
//! the hardware abstractions from the peripherals layer and the
//! portable logic from `startblock-core`.

/// Bus protocol engine and capture loop
pub mod block;
/// Gun-edge capture task
pub mod gun_watch;

// Re-export for convenience
pub use block::BlockApp;
