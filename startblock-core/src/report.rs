//! Post-run reaction-time verdict and its bus encoding.

/// The reaction value travels as a 3-byte big-endian signed integer.
const MICROS_MAX: i32 = 0x7F_FFFF;
const MICROS_MIN: i32 = -0x80_0000;

/// Outcome of a run as reported to the host by SEND_RT_REPORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RtReport {
    /// Gun and reaction both captured; reaction time in microseconds,
    /// negative when the runner moved before the gun.
    Calculated { micros: i32 },
    /// Reaction captured but the gun was never detected.
    NoGun,
    /// Gun captured but the runner never moved.
    NoReaction,
    /// Neither detected.
    NoData,
}

impl RtReport {
    pub fn from_ticks(reaction_tick: Option<u32>, gun_tick: Option<u32>) -> Self {
        match (reaction_tick, gun_tick) {
            (Some(r), Some(g)) => Self::Calculated {
                micros: ticks_to_micros(i64::from(r) - i64::from(g)),
            },
            (Some(_), None) => Self::NoGun,
            (None, Some(_)) => Self::NoReaction,
            (None, None) => Self::NoData,
        }
    }

    /// Encode the reply payload: two ASCII status bytes, then the
    /// 3-byte reaction value for the calculated case.
    pub fn encode<'a>(&self, buf: &'a mut [u8; 5]) -> &'a [u8] {
        match self {
            Self::Calculated { micros } => {
                buf[..2].copy_from_slice(b"CA");
                let be = (*micros).clamp(MICROS_MIN, MICROS_MAX).to_be_bytes();
                buf[2..5].copy_from_slice(&be[1..4]);
                &buf[..5]
            }
            Self::NoGun => {
                buf[..2].copy_from_slice(b"NG");
                &buf[..2]
            }
            Self::NoReaction => {
                buf[..2].copy_from_slice(b"NR");
                &buf[..2]
            }
            Self::NoData => {
                buf[..2].copy_from_slice(b"ND");
                &buf[..2]
            }
        }
    }
}

/// Ticks to microseconds: `delta * 10^6 / 32768`, rounded to nearest.
fn ticks_to_micros(delta_ticks: i64) -> i32 {
    let scaled = delta_ticks * 1_000_000;
    let half = if scaled >= 0 { 16_384 } else { -16_384 };
    ((scaled + half) / 32_768) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_follows_what_was_captured() {
        assert_eq!(RtReport::from_ticks(None, None), RtReport::NoData);
        assert_eq!(RtReport::from_ticks(Some(1), None), RtReport::NoGun);
        assert_eq!(RtReport::from_ticks(None, Some(1)), RtReport::NoReaction);
        assert!(matches!(
            RtReport::from_ticks(Some(2), Some(1)),
            RtReport::Calculated { .. }
        ));
    }

    #[test]
    fn tick_scaling_rounds_to_the_nearest_microsecond() {
        // 5000 ticks is 152587.89 us.
        assert_eq!(
            RtReport::from_ticks(Some(15_000), Some(10_000)),
            RtReport::Calculated { micros: 152_588 }
        );
        // One tick is 30.52 us.
        assert_eq!(
            RtReport::from_ticks(Some(1), Some(0)),
            RtReport::Calculated { micros: 31 }
        );
        // Pre-gun movement comes out negative.
        assert_eq!(
            RtReport::from_ticks(Some(10_000), Some(11_638)),
            RtReport::Calculated { micros: -49_988 }
        );
    }

    #[test]
    fn calculated_payload_is_status_plus_three_bytes() {
        let mut buf = [0u8; 5];
        let payload = RtReport::Calculated { micros: 152_588 }.encode(&mut buf);
        assert_eq!(payload.len(), 5);
        assert_eq!(&payload[..2], b"CA");
        assert_eq!(&payload[2..], &[0x02, 0x54, 0x0C]);
    }

    #[test]
    fn negative_reaction_encodes_twos_complement() {
        let mut buf = [0u8; 5];
        let payload = RtReport::Calculated { micros: -1 }.encode(&mut buf);
        assert_eq!(&payload[2..], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn status_only_verdicts_are_two_bytes() {
        let mut buf = [0u8; 5];
        assert_eq!(RtReport::NoGun.encode(&mut buf), b"NG");
        assert_eq!(RtReport::NoReaction.encode(&mut buf), b"NR");
        assert_eq!(RtReport::NoData.encode(&mut buf), b"ND");
    }

    #[test]
    fn out_of_range_values_saturate_the_wire_field() {
        let mut buf = [0u8; 5];
        let payload = RtReport::Calculated { micros: 30_000_000 }.encode(&mut buf);
        assert_eq!(&payload[2..], &[0x7F, 0xFF, 0xFF]);
    }
}
