//! Runtime-settable configuration and the detector datums.

/// Gun-sensor wiring, set over the bus before a run.
///
/// A normally-closed sensor idles high and fires on the rising edge; a
/// normally-open sensor idles low and fires on the falling edge. The
/// firmware configures the matching pull for the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GunSensor {
    #[default]
    NormallyClosed,
    NormallyOpen,
}

impl GunSensor {
    /// Parse the two-byte ASCII payload of SET_SENSOR.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            b"NC" => Some(Self::NormallyClosed),
            b"NO" => Some(Self::NormallyOpen),
            _ => None,
        }
    }
}

/// Athlete category selecting the impulse threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Parse the one-byte ASCII payload of SET_GENDER.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            b"M" => Some(Self::Male),
            b"F" => Some(Self::Female),
            _ => None,
        }
    }
}

/// A start within this window after the gun is a false start.
pub const REACTION_WINDOW_S: f32 = 0.1;

/// Impulse-rise detector datums.
///
/// The men/women threshold disparity is carried from the deployed
/// hardware as-is; the women's blocks are sensed far stiffer.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DetectorConfig {
    pub threshold_men_g: f32,
    pub threshold_women_g: f32,
    pub hysteresis_g: f32,
    /// Consecutive rising samples required to call the runner started.
    pub rise_streak: u8,
}

impl DetectorConfig {
    pub fn threshold_for(&self, gender: Gender) -> f32 {
        match gender {
            Gender::Male => self.threshold_men_g,
            Gender::Female => self.threshold_women_g,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_men_g: 0.5,
            threshold_women_g: 8.0,
            hysteresis_g: 0.2,
            rise_streak: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_payloads_parse() {
        assert_eq!(GunSensor::from_payload(b"NC"), Some(GunSensor::NormallyClosed));
        assert_eq!(GunSensor::from_payload(b"NO"), Some(GunSensor::NormallyOpen));
        assert_eq!(GunSensor::from_payload(b"XX"), None);
        assert_eq!(GunSensor::from_payload(b""), None);
    }

    #[test]
    fn gender_payloads_parse() {
        assert_eq!(Gender::from_payload(b"M"), Some(Gender::Male));
        assert_eq!(Gender::from_payload(b"F"), Some(Gender::Female));
        assert_eq!(Gender::from_payload(b"W"), None);
    }

    #[test]
    fn default_thresholds_match_the_deployed_values() {
        let config = DetectorConfig::default();
        assert_eq!(config.threshold_for(Gender::Male), 0.5);
        assert_eq!(config.threshold_for(Gender::Female), 8.0);
    }
}
