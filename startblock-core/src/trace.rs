//! Append-only trace of FIFO records for one run.
//!
//! The block owns one contiguous byte region for the lifetime of a run;
//! drains append whole records at the write pointer and the gun and
//! reaction trailers are appended when the run is sealed. The buffer
//! always holds an integral number of 16-byte records.

use crate::record::{self, GUN_EVENT_HEADER, REACTION_EVENT_HEADER, RECORD_LEN};

/// 5 s of 16-byte samples at the 2 kHz output rate, plus headroom for
/// burst overshoot and the event trailers.
pub const TRACE_CAPACITY: usize = 5 * 2048 * RECORD_LEN + 2 * 4096;

pub struct TraceBuffer<'a> {
    data: &'a mut [u8],
    wp: usize,
}

impl<'a> TraceBuffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, wp: 0 }
    }

    /// Forget the previous run. The region itself is reused.
    pub fn reset(&mut self) {
        self.wp = 0;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.wp
    }

    pub fn is_empty(&self) -> bool {
        self.wp == 0
    }

    pub fn record_count(&self) -> usize {
        self.wp / RECORD_LEN
    }

    /// Everything committed so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.wp]
    }

    /// Borrow the next unused region for a FIFO burst read. `want` is
    /// rounded down to whole records and clamped to the space left, so
    /// a full buffer truncates the drain instead of overrunning.
    pub fn stage(&mut self, want: usize) -> &mut [u8] {
        let fit = (self.data.len() - self.wp) / RECORD_LEN * RECORD_LEN;
        let take = core::cmp::min(want / RECORD_LEN * RECORD_LEN, fit);
        &mut self.data[self.wp..self.wp + take]
    }

    /// Advance the write pointer over a region previously staged.
    pub fn commit(&mut self, len: usize) {
        debug_assert_eq!(len % RECORD_LEN, 0);
        self.wp = core::cmp::min(self.wp + len, self.data.len());
    }

    pub fn append_record(&mut self, record: &[u8; RECORD_LEN]) -> bool {
        if self.data.len() - self.wp < RECORD_LEN {
            return false;
        }
        self.data[self.wp..self.wp + RECORD_LEN].copy_from_slice(record);
        self.wp += RECORD_LEN;
        true
    }

    /// Append the gun and reaction trailers that close out a run. The
    /// capacity headroom guarantees space in any run the loop allows.
    pub fn seal(&mut self, gun_tick: Option<u32>, reaction_tick: Option<u32>) {
        if let Some(tick) = gun_tick {
            let _ = self.append_record(&record::event_record(GUN_EVENT_HEADER, tick));
        }
        if let Some(tick) = reaction_tick {
            let _ = self.append_record(&record::event_record(REACTION_EVENT_HEADER, tick));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_covers_a_full_run() {
        // 5 s at 2048 Hz plus trailer headroom.
        assert_eq!(TRACE_CAPACITY, 163_840 + 8_192);
        assert_eq!(TRACE_CAPACITY % RECORD_LEN, 0);
    }

    #[test]
    fn stage_rounds_down_to_whole_records() {
        let mut mem = [0u8; 64];
        let mut trace = TraceBuffer::new(&mut mem);
        assert_eq!(trace.stage(40).len(), 32);
        assert_eq!(trace.stage(15).len(), 0);
    }

    #[test]
    fn commit_advances_and_preserves_the_record_invariant() {
        let mut mem = [0u8; 64];
        let mut trace = TraceBuffer::new(&mut mem);
        let region = trace.stage(32);
        region.fill(0xAB);
        trace.commit(32);
        assert_eq!(trace.len(), 32);
        assert_eq!(trace.record_count(), 2);
        assert!(trace.as_bytes().iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn a_full_buffer_truncates_the_drain() {
        let mut mem = [0u8; 48];
        let mut trace = TraceBuffer::new(&mut mem);
        trace.commit(32);
        // Only one record still fits, however much the FIFO holds.
        assert_eq!(trace.stage(4096).len(), 16);
        trace.commit(16);
        assert_eq!(trace.stage(4096).len(), 0);
    }

    #[test]
    fn seal_appends_only_the_captured_trailers() {
        let mut mem = [0u8; 96];

        let mut trace = TraceBuffer::new(&mut mem);
        trace.seal(Some(0x1234), None);
        assert_eq!(trace.record_count(), 1);
        assert_eq!(trace.as_bytes()[0], GUN_EVENT_HEADER);

        trace.reset();
        trace.seal(Some(0x1234), Some(0x2345));
        assert_eq!(trace.record_count(), 2);
        assert_eq!(trace.as_bytes()[0], GUN_EVENT_HEADER);
        assert_eq!(trace.as_bytes()[16], REACTION_EVENT_HEADER);
        assert_eq!(record::record_tick(&trace.as_bytes()[16..32]), 0x2345);

        trace.reset();
        trace.seal(None, None);
        assert!(trace.is_empty());
    }
}
