//! Run state shared between the block application and the
//! interrupt-side tasks.
//!
//! Everything here is single-writer: the capture loop owns the trace,
//! clock and detector inside [`Session`]; the threshold task writes the
//! FIFO latch and counter; the gun watch task writes the gun tick once
//! per arming. Cross-owner reads go through [`SessionIrq`], which is
//! all the interrupt side is allowed to touch.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use startblock_core::config::{DetectorConfig, Gender, GunSensor};
use startblock_core::detector::FalseStartDetector;
use startblock_core::timestamp::TickClock;
use startblock_core::trace::TraceBuffer;

/// Latches and counters the interrupt-side tasks may touch.
pub struct SessionIrq {
    /// Set on each FIFO threshold edge; cleared by the capture loop.
    fifo_ready: AtomicBool,
    /// Threshold edges seen since the last ARM, for the run summary.
    fifo_int_count: AtomicU32,
    /// Set once per arming when the gun tick has been captured.
    gun_triggered: AtomicBool,
    /// 20-bit gun tick; meaningful only while `gun_triggered` is set.
    gun_tick: AtomicU32,
}

/// The one IRQ view in the system.
pub static IRQ: SessionIrq = SessionIrq {
    fifo_ready: AtomicBool::new(false),
    fifo_int_count: AtomicU32::new(0),
    gun_triggered: AtomicBool::new(false),
    gun_tick: AtomicU32::new(0),
};

impl SessionIrq {
    /// Clear every latch for a new run.
    pub fn reset(&self) {
        self.fifo_ready.store(false, Ordering::Relaxed);
        self.fifo_int_count.store(0, Ordering::Relaxed);
        self.gun_triggered.store(false, Ordering::Relaxed);
        self.gun_tick.store(0, Ordering::Relaxed);
    }

    /// Threshold edge: latch data-ready and count the edge.
    pub fn note_fifo_edge(&self) {
        self.fifo_ready.store(true, Ordering::Relaxed);
        self.fifo_int_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume the data-ready latch.
    pub fn take_fifo_ready(&self) -> bool {
        self.fifo_ready.swap(false, Ordering::Relaxed)
    }

    pub fn fifo_int_count(&self) -> u32 {
        self.fifo_int_count.load(Ordering::Relaxed)
    }

    /// Publish the captured gun tick. Tick first, flag second, so a
    /// reader that observes the flag also observes the tick.
    pub fn publish_gun(&self, tick: u32) {
        self.gun_tick.store(tick, Ordering::Relaxed);
        self.gun_triggered.store(true, Ordering::Release);
    }

    /// The gun tick, if the gun has fired this run.
    pub fn gun_tick(&self) -> Option<u32> {
        if self.gun_triggered.load(Ordering::Acquire) {
            Some(self.gun_tick.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// Arms the gun watch task with the configured sensor polarity.
pub static GUN_ARM: Signal<CriticalSectionRawMutex, GunSensor> = Signal::new();

/// Per-run capture state owned by the block application.
pub struct Session<'a> {
    pub trace: TraceBuffer<'a>,
    pub clock: TickClock,
    pub detector: FalseStartDetector,
    pub detector_config: DetectorConfig,
    pub sensor: GunSensor,
    /// None until SET_GENDER arrives; the detector stays inert then.
    pub gender: Option<Gender>,
    /// Wall-clock instant the runner-started latch fell. Distinct from
    /// IMU ticks; only used to time the post-start capture tail.
    pub started_at: Option<Instant>,
}

impl<'a> Session<'a> {
    pub fn new(trace: TraceBuffer<'a>) -> Self {
        let detector_config = DetectorConfig::default();
        Self {
            trace,
            clock: TickClock::new(),
            detector: FalseStartDetector::new(detector_config, None),
            detector_config,
            sensor: GunSensor::default(),
            gender: None,
            started_at: None,
        }
    }

    /// Re-initialise everything a new run must not inherit. The sensor
    /// polarity and gender settings persist across runs.
    pub fn rearm(&mut self) {
        self.trace.reset();
        self.clock = TickClock::new();
        self.detector = FalseStartDetector::new(self.detector_config, self.gender);
        self.started_at = None;
        IRQ.reset();
    }
}
