//! Physical-to-logical time mapping
//!
//! The formula is written against a logical sample rate (classically 8 kHz)
//! while the device consumes at a fixed physical rate. Each physical sample
//! ordinal maps to `floor(n * logical / physical)`. Faster logical rates skip
//! values, slower ones repeat them; there is no interpolation.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleClock {
    logical_rate: u32,
    physical_rate: u32,
}

impl SampleClock {
    pub fn new(logical_rate: u32, physical_rate: u32) -> Result<Self, ConfigError> {
        if logical_rate == 0 || physical_rate == 0 {
            return Err(ConfigError::Invalid(format!(
                "sample rates must be positive (logical {logical_rate}, physical {physical_rate})"
            )));
        }
        Ok(Self {
            logical_rate,
            physical_rate,
        })
    }

    /// Logical time index for a physical sample ordinal.
    ///
    /// Computed in 128-bit integer arithmetic so the mapping stays exact for
    /// the whole life of a session.
    #[inline]
    pub fn logical_time(&self, physical_ordinal: u64) -> u64 {
        let scaled = physical_ordinal as u128 * self.logical_rate as u128;
        (scaled / self.physical_rate as u128) as u64
    }

    pub fn ratio(&self) -> f64 {
        self.logical_rate as f64 / self.physical_rate as f64
    }

    pub fn logical_rate(&self) -> u32 {
        self.logical_rate
    }

    pub fn physical_rate(&self) -> u32 {
        self.physical_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ratio_is_identity() {
        let clock = SampleClock::new(44100, 44100).unwrap();
        for n in [0u64, 1, 2, 1000, 1 << 40] {
            assert_eq!(clock.logical_time(n), n);
        }
        assert_eq!(clock.ratio(), 1.0);
    }

    #[test]
    fn test_half_ratio_repeats_each_value() {
        let clock = SampleClock::new(22050, 44100).unwrap();
        let times: Vec<u64> = (0..8).map(|n| clock.logical_time(n)).collect();
        assert_eq!(times, vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_double_ratio_skips_every_other_value() {
        let clock = SampleClock::new(16000, 8000).unwrap();
        let times: Vec<u64> = (0..5).map(|n| clock.logical_time(n)).collect();
        assert_eq!(times, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_downsampled_scenario() {
        // 8 kHz formula on a 44.1 kHz device
        let clock = SampleClock::new(8000, 44100).unwrap();
        assert_eq!(clock.logical_time(0), 0);
        assert_eq!(clock.logical_time(1), 0);
        assert_eq!(clock.logical_time(6), 1);
        assert_eq!(clock.logical_time(44100), 8000);
    }

    #[test]
    fn test_no_overflow_for_huge_ordinals() {
        let clock = SampleClock::new(96000, 44100).unwrap();
        let n = u64::MAX / 4;
        let expected = (n as u128 * 96000 / 44100) as u64;
        assert_eq!(clock.logical_time(n), expected);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(SampleClock::new(0, 44100).is_err());
        assert!(SampleClock::new(8000, 0).is_err());
    }
}
