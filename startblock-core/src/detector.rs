//! Hysteretic rising-streak detector over the scaled X-axis channel.
//!
//! The detector idles until a sample crosses the configured threshold
//! upward, then counts consecutive rising samples inside the window. A
//! streak of `rise_streak` latches "runner started" exactly once per
//! run; dropping back below `threshold - hysteresis` abandons the
//! window so bench vibration cannot accumulate a streak.

use crate::config::{DetectorConfig, Gender, REACTION_WINDOW_S};
use crate::timestamp::TICK_PERIOD_S;

/// Raised once, at the sample where a qualifying rise completes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartEvent {
    /// Sample-stream tick at which the successful impulse entered the
    /// rise window.
    pub reaction_tick: u32,
    /// True when the start must raise the alert line: the gun had not
    /// fired yet, or the reaction landed inside the reaction window.
    pub false_start: bool,
}

pub struct FalseStartDetector {
    config: DetectorConfig,
    /// None until a gender has been configured; without a threshold the
    /// detector stays inert and the run reports no reaction.
    threshold: Option<f32>,
    prev: f32,
    rising: u8,
    in_window: bool,
    started: bool,
    reaction_tick: Option<u32>,
}

impl FalseStartDetector {
    pub fn new(config: DetectorConfig, gender: Option<Gender>) -> Self {
        Self {
            threshold: gender.map(|g| config.threshold_for(g)),
            config,
            prev: 0.0,
            rising: 0,
            in_window: false,
            started: false,
            reaction_tick: None,
        }
    }

    /// Advance the state machine by one sample.
    ///
    /// `gun_tick` is whatever the gun capture has published by now; the
    /// verdict tolerates it being absent.
    pub fn update(&mut self, value: f32, tick: u32, gun_tick: Option<u32>) -> Option<StartEvent> {
        let Some(threshold) = self.threshold else {
            self.prev = value;
            return None;
        };

        if !self.in_window && self.prev < threshold && value >= threshold {
            self.in_window = true;
            self.reaction_tick = Some(tick);
            self.rising = 0;
        }

        let mut event = None;
        if self.in_window && !self.started {
            if value > self.prev + self.config.hysteresis_g {
                self.rising += 1;
            } else if value < threshold - self.config.hysteresis_g {
                self.in_window = false;
                self.reaction_tick = None;
                self.rising = 0;
            }

            if self.rising >= self.config.rise_streak {
                if let Some(reaction_tick) = self.reaction_tick {
                    self.started = true;
                    self.rising = 0;
                    event = Some(StartEvent {
                        reaction_tick,
                        false_start: is_false_start(reaction_tick, gun_tick),
                    });
                }
            }
        }
        self.prev = value;
        event
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Tick at which the successful impulse entered the rise window.
    /// None until the runner actually started.
    pub fn reaction_tick(&self) -> Option<u32> {
        if self.started {
            self.reaction_tick
        } else {
            None
        }
    }
}

fn is_false_start(reaction_tick: u32, gun_tick: Option<u32>) -> bool {
    match gun_tick {
        // Moving before the gun is always a false start.
        None => true,
        Some(gun) => {
            let delta = i64::from(reaction_tick) - i64::from(gun);
            (delta as f32) * TICK_PERIOD_S < REACTION_WINDOW_S
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn men_detector() -> FalseStartDetector {
        FalseStartDetector::new(DetectorConfig::default(), Some(Gender::Male))
    }

    fn feed(
        detector: &mut FalseStartDetector,
        samples: &[f32],
        gun: Option<u32>,
    ) -> Option<StartEvent> {
        let mut event = None;
        for (i, &v) in samples.iter().enumerate() {
            if let Some(e) = detector.update(v, 1000 + 16 * i as u32, gun) {
                assert!(event.is_none(), "detector latched twice");
                event = Some(e);
            }
        }
        event
    }

    #[test]
    fn oscillation_inside_the_hysteresis_band_never_starts() {
        let mut detector = men_detector();
        let mut samples = [0.0f32; 64];
        for (i, v) in samples.iter_mut().enumerate() {
            *v = if i % 2 == 0 { 0.45 } else { 0.55 };
        }
        assert_eq!(feed(&mut detector, &samples, None), None);
        assert!(!detector.started());
        assert_eq!(detector.reaction_tick(), None);
    }

    #[test]
    fn sustained_rise_latches_exactly_once() {
        let mut detector = men_detector();
        let event = feed(&mut detector, &[0.1, 0.6, 0.9, 1.3, 1.8, 2.4], None).unwrap();
        // Window opened on the 0.6 g sample.
        assert_eq!(event.reaction_tick, 1016);
        assert!(detector.started());
        assert_eq!(detector.reaction_tick(), Some(1016));
    }

    #[test]
    fn falling_out_of_the_window_clears_the_pending_reaction() {
        let mut detector = men_detector();
        // Crosses, then collapses below threshold - hysteresis.
        assert_eq!(feed(&mut detector, &[0.1, 0.6, 0.1], None), None);
        assert_eq!(detector.reaction_tick(), None);
        // A later clean rise still works and uses the new tick.
        let event = detector.update(0.7, 5000, None);
        let event = event.or(detector.update(1.0, 5016, None));
        let event = event.or(detector.update(1.4, 5032, None));
        assert_eq!(event.unwrap().reaction_tick, 5000);
    }

    #[test]
    fn start_before_the_gun_is_a_false_start() {
        let mut detector = men_detector();
        let event = feed(&mut detector, &[0.1, 0.6, 0.9, 1.3], None).unwrap();
        assert!(event.false_start);
    }

    #[test]
    fn reaction_inside_the_window_is_a_false_start() {
        // 0.05 s after the gun: 1638 ticks.
        let gun = 10_000;
        let mut detector = men_detector();
        let mut event = None;
        for (i, v) in [0.1, 0.6, 0.9, 1.3].iter().enumerate() {
            event = event.or(detector.update(*v, gun + 1638 + 16 * i as u32, Some(gun)));
        }
        assert!(event.unwrap().false_start);
    }

    #[test]
    fn reaction_past_the_window_is_clean() {
        // ~152 ms after the gun: 5000 ticks.
        let gun = 10_000;
        let mut detector = men_detector();
        let mut event = None;
        for (i, v) in [0.1, 0.6, 0.9, 1.3].iter().enumerate() {
            event = event.or(detector.update(*v, gun + 5000 + 16 * i as u32, Some(gun)));
        }
        assert!(!event.unwrap().false_start);
    }

    #[test]
    fn unset_threshold_keeps_the_detector_inert() {
        let mut detector = FalseStartDetector::new(DetectorConfig::default(), None);
        assert_eq!(feed(&mut detector, &[0.1, 5.0, 10.0, 15.0], None), None);
        assert!(!detector.started());
    }

    #[test]
    fn women_threshold_ignores_a_men_scale_impulse() {
        let mut detector =
            FalseStartDetector::new(DetectorConfig::default(), Some(Gender::Female));
        assert_eq!(feed(&mut detector, &[0.1, 0.6, 0.9, 1.3, 2.0], None), None);
        let event = feed(&mut detector, &[7.0, 8.5, 10.0, 12.0], None).unwrap();
        assert!(event.false_start);
    }
}
