//! Post-drain processing of newly ingested FIFO records.
//!
//! Runs over the region a burst read just filled: per record it extends
//! the raw 16-bit timestamp, materialises the rollover nibble into
//! byte 13 (the former temperature byte; downstream tooling relies on
//! this), and advances the false-start detector on the scaled X axis.

use byteorder::{BigEndian, ByteOrder};

use crate::detector::{FalseStartDetector, StartEvent};
use crate::record::{self, RECORD_LEN};
use crate::timestamp::TickClock;

/// Outcome of one drain's worth of samples.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IngestSummary {
    pub records: usize,
    /// Present when the runner-started latch fell during this drain.
    pub start: Option<StartEvent>,
}

/// Walk `region` (an integral number of records) and process every
/// sample in FIFO order. `gun_tick` is sampled once per record, so a
/// gun edge landing mid-drain is picked up by the very next sample.
pub fn ingest_samples(
    region: &mut [u8],
    clock: &mut TickClock,
    detector: &mut FalseStartDetector,
    mut gun_tick: impl FnMut() -> Option<u32>,
) -> IngestSummary {
    debug_assert_eq!(region.len() % RECORD_LEN, 0);

    let mut start = None;
    for rec in region.chunks_exact_mut(RECORD_LEN) {
        let raw = BigEndian::read_u16(&rec[14..16]);
        let (tick, nibble) = clock.extend(raw);
        rec[13] = nibble;
        let x_g = record::x_axis_g(rec);
        if let Some(event) = detector.update(x_g, tick, gun_tick()) {
            start = Some(event);
        }
    }
    IngestSummary {
        records: region.len() / RECORD_LEN,
        start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, Gender};
    use crate::record::record_tick;

    /// Build a raw FIFO sample the way the sensor emits it: temperature
    /// still in byte 13, X axis big-endian in bytes 1..=2.
    fn sample(x_g: f32, raw_tick: u16) -> [u8; RECORD_LEN] {
        let mut rec = [0u8; RECORD_LEN];
        rec[0] = 0x68;
        let raw = (x_g * 2048.0) as i16;
        rec[1..3].copy_from_slice(&raw.to_be_bytes());
        rec[13] = 0x5A; // temperature, to be overwritten
        rec[14..16].copy_from_slice(&raw_tick.to_be_bytes());
        rec
    }

    fn region_of(samples: &[[u8; RECORD_LEN]]) -> Vec<u8> {
        samples.iter().flatten().copied().collect()
    }

    fn men_detector() -> FalseStartDetector {
        FalseStartDetector::new(DetectorConfig::default(), Some(Gender::Male))
    }

    #[test]
    fn timestamps_are_materialised_in_place() {
        let mut region = region_of(&[sample(0.0, 100), sample(0.0, 116), sample(0.0, 132)]);
        let mut clock = TickClock::new();
        let mut detector = men_detector();

        let summary = ingest_samples(&mut region, &mut clock, &mut detector, || None);
        assert_eq!(summary.records, 3);
        for (i, rec) in region.chunks_exact(RECORD_LEN).enumerate() {
            // Temperature byte replaced by the (zero) rollover nibble.
            assert_eq!(rec[13], 0);
            assert_eq!(record_tick(rec), 100 + 16 * i as u32);
        }
    }

    #[test]
    fn rollover_spans_a_drain_boundary() {
        let mut clock = TickClock::new();
        let mut detector = men_detector();

        let mut first = region_of(&[sample(0.0, 0xFFE0), sample(0.0, 0xFFF0)]);
        ingest_samples(&mut first, &mut clock, &mut detector, || None);

        let mut second = region_of(&[sample(0.0, 0x0000), sample(0.0, 0x0010)]);
        ingest_samples(&mut second, &mut clock, &mut detector, || None);

        let last = &second[RECORD_LEN..];
        assert_eq!(last[13], 1);
        assert_eq!(record_tick(last), 0x1_0010);
        assert_eq!(clock.rollovers(), 1);
    }

    #[test]
    fn an_impulse_ramp_starts_the_runner() {
        // Quiet lead-in, then a push-off ramp.
        let mut region = region_of(&[
            sample(0.02, 1000),
            sample(0.05, 1016),
            sample(0.6, 1032),
            sample(0.9, 1048),
            sample(1.3, 1064),
        ]);
        let mut clock = TickClock::new();
        let mut detector = men_detector();

        let summary = ingest_samples(&mut region, &mut clock, &mut detector, || None);
        let event = summary.start.expect("ramp must latch the start");
        assert_eq!(event.reaction_tick, 1032);
        // No gun yet: pre-gun movement is always a false start.
        assert!(event.false_start);
        assert_eq!(detector.reaction_tick(), Some(1032));
    }

    #[test]
    fn gun_arriving_mid_drain_is_seen_by_later_samples() {
        let mut region = region_of(&[
            sample(0.02, 9000),
            sample(0.6, 9016),
            sample(0.9, 9032),
            sample(1.3, 9048),
        ]);
        let mut clock = TickClock::new();
        let mut detector = men_detector();

        // The gun tick becomes visible from the second sample onward,
        // as if the edge landed while the drain was walking the region.
        let mut polls = 0;
        let summary = ingest_samples(&mut region, &mut clock, &mut detector, || {
            polls += 1;
            if polls >= 2 {
                Some(4000)
            } else {
                None
            }
        });
        let event = summary.start.expect("ramp must latch the start");
        // Reaction at 9016, gun at 4000: 5016 ticks is a clean start.
        assert!(!event.false_start);
    }

    #[test]
    fn a_quiet_run_produces_no_start() {
        let samples: Vec<[u8; RECORD_LEN]> = (0..128)
            .map(|i| sample(0.01 * (i % 3) as f32, (i * 16) as u16))
            .collect();
        let mut region = region_of(&samples);
        let mut clock = TickClock::new();
        let mut detector = men_detector();

        let summary = ingest_samples(&mut region, &mut clock, &mut detector, || None);
        assert_eq!(summary.records, 128);
        assert!(summary.start.is_none());
        assert_eq!(detector.reaction_tick(), None);
    }
}
