//! Block application: bus command dispatch and the capture loop.
//!
//! One task owns the bus and the session. Between runs it listens for
//! framed commands; SET turns it into the capture loop until the run
//! ends, so a run is never interrupted by bus traffic. The abort line,
//! not a bus command, cancels a run early.

use defmt::{debug, info, warn};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use startblock_core::config::{Gender, GunSensor};
use startblock_core::frame::{self, Command, Frame, FrameParser, MAX_FRAME};
use startblock_core::identity::{BlockId, BROADCAST_ID};
use startblock_core::ingest;
use startblock_core::report::RtReport;
use startblock_core::trace::TraceBuffer;

use crate::drivers::imu::{Icm42688, ImuError};
use crate::peripherals::{BlockIo, BusUart};
use crate::session::{Session, GUN_ARM, IRQ};

/// Hard cap on one run.
const RUN_DURATION: Duration = Duration::from_secs(5);

/// Capture kept after the runner starts, so the trace shows the full
/// push-off rather than stopping at the detection instant.
const POST_START_TAIL: Duration = Duration::from_millis(1000);

/// Capture loop poll spacing; yields to the executor between polls.
const CAPTURE_POLL_US: u64 = 400;

/// Warn when drains space out enough to endanger rollover detection.
const DRAIN_LAG_WARN: Duration = Duration::from_millis(140);

/// DUMP data frames carry 15 whole records; the length field is one
/// byte, so a 256-byte chunk would not be representable.
const DUMP_CHUNK: usize = 240;

pub struct BlockApp<'d> {
    id: BlockId,
    imu: &'static Mutex<NoopRawMutex, Icm42688<'static>>,
    bus: BusUart<'d>,
    parser: FrameParser,
    session: Session<'d>,
    io: BlockIo<'d>,
    scratch: [u8; MAX_FRAME],
}

impl<'d> BlockApp<'d> {
    pub fn new(
        id: BlockId,
        imu: &'static Mutex<NoopRawMutex, Icm42688<'static>>,
        bus: BusUart<'d>,
        trace: TraceBuffer<'d>,
        io: BlockIo<'d>,
    ) -> Self {
        Self {
            id,
            imu,
            bus,
            parser: FrameParser::new(),
            session: Session::new(trace),
            io,
            scratch: [0; MAX_FRAME],
        }
    }

    /// Listen for commands forever.
    pub async fn run(&mut self) -> ! {
        info!("Listening on the block bus as id {}", self.id.get());
        loop {
            let Some(frame) = self.recv_frame().await else {
                continue;
            };
            if !self.id.accepts(frame.block_id) {
                continue; // not for this block
            }
            let broadcast = frame.block_id == BROADCAST_ID;
            self.dispatch(&frame, broadcast).await;
        }
    }

    async fn dispatch(&mut self, frame: &Frame, broadcast: bool) {
        match Command::from_code(frame.command) {
            Some(Command::Ping) => {
                debug!("PING");
                if !broadcast {
                    self.send_ack(Command::Ping).await;
                }
            }
            Some(Command::Arm) => self.handle_arm(broadcast).await,
            Some(Command::Set) => self.run_capture().await,
            Some(Command::Dump) => {
                // A broadcast DUMP would have every block drive the bus
                // at once; only a unicast request streams.
                if !broadcast {
                    self.handle_dump().await;
                }
            }
            Some(Command::SetSensor) => self.handle_set_sensor(frame.payload(), broadcast).await,
            Some(Command::SetGender) => self.handle_set_gender(frame.payload(), broadcast).await,
            Some(Command::RtReport) => {
                if !broadcast {
                    self.handle_rt_report().await;
                }
            }
            None => warn!("Unknown command 0x{:02X}", frame.command),
        }
    }

    /// Wait for one receive burst and run it through the frame parser.
    async fn recv_frame(&mut self) -> Option<Frame> {
        let mut raw = [0u8; MAX_FRAME];
        let Some(n) = self.bus.recv(&mut raw).await else {
            // Timeout: whatever was mid-flight is not completing.
            self.parser.resync();
            return None;
        };
        let mut complete = None;
        for &byte in &raw[..n] {
            if let Some(frame) = self.parser.push(byte) {
                complete = Some(frame);
            }
        }
        complete
    }

    async fn send_reply(&mut self, command: u8, payload: &[u8]) {
        let Some(reply) = frame::encode_frame(&mut self.scratch, self.id.get(), command, payload)
        else {
            return;
        };
        if self.bus.send(reply).await.is_err() {
            warn!("Bus write failed");
        }
    }

    async fn send_ack(&mut self, command: Command) {
        self.send_reply(command.reply_code(), &[]).await;
    }

    /// ARM: reset the session, arm the gun watch, reconfigure the IMU.
    ///
    /// The ACK goes out only after the setup sequence completes, so the
    /// host's ARM round-trip doubles as a readiness check. A failed
    /// setup is logged and left unanswered; the host retries.
    async fn handle_arm(&mut self, broadcast: bool) {
        info!("ARM");
        self.io.alert.set_low();
        self.session.rearm();
        GUN_ARM.signal(self.session.sensor);

        let configured = {
            let mut imu = self.imu.lock().await;
            imu.configure_capture().await
        };
        match configured {
            Ok(()) => {
                if !broadcast {
                    self.send_ack(Command::Arm).await;
                }
            }
            Err(e) => warn!("ARM setup failed: {:?}", e),
        }
    }

    async fn handle_set_sensor(&mut self, payload: &[u8], broadcast: bool) {
        match GunSensor::from_payload(payload) {
            Some(sensor) => {
                info!("Sensor type set to {:?}", sensor);
                self.session.sensor = sensor;
                if !broadcast {
                    self.send_ack(Command::SetSensor).await;
                }
            }
            None => warn!("Invalid SET_SENSOR payload"),
        }
    }

    async fn handle_set_gender(&mut self, payload: &[u8], broadcast: bool) {
        match Gender::from_payload(payload) {
            Some(gender) => {
                info!("Gender set to {:?}", gender);
                self.session.gender = Some(gender);
                if !broadcast {
                    self.send_ack(Command::SetGender).await;
                }
            }
            None => warn!("Invalid SET_GENDER payload"),
        }
    }

    async fn handle_rt_report(&mut self) {
        let report = RtReport::from_ticks(self.session.detector.reaction_tick(), IRQ.gun_tick());
        let mut payload = [0u8; 5];
        let encoded = report.encode(&mut payload);
        let len = encoded.len();
        self.send_reply(Command::RtReport.reply_code(), &payload[..len])
            .await;
    }

    /// Stream the captured trace back in record-aligned chunks, closed
    /// by an empty frame as the end-of-stream marker.
    async fn handle_dump(&mut self) {
        info!("DUMP: {} records", self.session.trace.record_count());
        let total = self.session.trace.len();
        let mut offset = 0;
        while offset < total {
            let end = (offset + DUMP_CHUNK).min(total);
            let mut chunk = [0u8; DUMP_CHUNK];
            let len = end - offset;
            chunk[..len].copy_from_slice(&self.session.trace.as_bytes()[offset..end]);
            self.send_reply(Command::Dump.reply_code(), &chunk[..len]).await;
            offset = end;
        }
        self.send_reply(Command::Dump.reply_code(), &[]).await;
    }

    /// SET: the capture loop of a run.
    ///
    /// Runs for up to five seconds, draining the FIFO whenever the
    /// threshold latch is set. Ends early one second after the runner
    /// started, or immediately when the host asserts the abort line.
    async fn run_capture(&mut self) {
        info!("SET: capture starting");
        if let Err(e) = self.imu.lock().await.enable_sensors().await {
            warn!("Could not enable sensors: {:?}", e);
            return;
        }

        let run_start = Instant::now();
        let mut last_drain = Instant::now();
        while run_start.elapsed() < RUN_DURATION {
            if IRQ.take_fifo_ready() {
                if last_drain.elapsed() > DRAIN_LAG_WARN {
                    warn!("Drain latency near the rollover bound");
                }
                if let Err(e) = self.drain().await {
                    warn!("Drain failed: {:?}", e);
                }
                last_drain = Instant::now();
            }
            Timer::after(Duration::from_micros(CAPTURE_POLL_US)).await;

            if let Some(at) = self.session.started_at {
                if at.elapsed() > POST_START_TAIL {
                    break;
                }
            }
            if self.io.abort.is_high() {
                info!("Run aborted by host");
                break;
            }
        }

        if let Err(e) = self.imu.lock().await.disable_sensors().await {
            warn!("Could not disable sensors: {:?}", e);
        }
        // Recover whatever the FIFO still holds.
        if let Err(e) = self.drain().await {
            warn!("Final drain failed: {:?}", e);
        }

        let gun_tick = IRQ.gun_tick();
        let reaction_tick = self.session.detector.reaction_tick();
        self.session.trace.seal(gun_tick, reaction_tick);
        self.log_run_summary(gun_tick, reaction_tick).await;
    }

    /// One drain cycle: count, burst read, process, clear the latch.
    async fn drain(&mut self) -> Result<(), ImuError> {
        let mut imu = self.imu.lock().await;

        let count = imu.fifo_byte_count().await?;
        let region = self.session.trace.stage(usize::from(count));
        if region.is_empty() {
            imu.clear_fifo_interrupt().await?;
            return Ok(());
        }

        imu.read_fifo_into(region).await?;
        let len = region.len();
        let summary = ingest::ingest_samples(
            region,
            &mut self.session.clock,
            &mut self.session.detector,
            || IRQ.gun_tick(),
        );
        imu.clear_fifo_interrupt().await?;
        self.session.trace.commit(len);

        if let Some(event) = summary.start {
            self.session.started_at = Some(Instant::now());
            if event.false_start {
                self.io.alert.set_high();
                warn!("FALSE START, reaction tick {}", event.reaction_tick);
            } else {
                info!("Runner started, reaction tick {}", event.reaction_tick);
            }
        }
        Ok(())
    }

    async fn log_run_summary(&mut self, gun_tick: Option<u32>, reaction_tick: Option<u32>) {
        info!("Captured {} records", self.session.trace.record_count());
        info!("Threshold interrupts: {}", IRQ.fifo_int_count());
        match gun_tick {
            Some(tick) => info!("Gun at tick {}", tick),
            None => info!("No gun detected"),
        }
        match reaction_tick {
            Some(tick) => info!("Reaction at tick {}", tick),
            None => info!("No reaction"),
        }

        let mut imu = self.imu.lock().await;
        if let Ok(count) = imu.fifo_byte_count().await {
            info!("Final FIFO count: {}", count);
        }
        if let Ok(lost) = imu.fifo_lost_packets().await {
            if lost > 0 {
                warn!("{} packets lost in the sensor FIFO", lost);
            }
        }
        info!("{} timestamp rollovers", self.session.clock.rollovers());
        if self.session.clock.lag_suspected() {
            warn!("Sample gaps approached the rollover-detection bound");
        }
    }
}
