//! Loudness estimation for visualization
//!
//! Runs on the same delivery path as playback, so it must never block or
//! allocate: one pass over the buffer, one scalar out. Delivery to the
//! caller happens over a watch channel owned by the session, never on the
//! audio thread.

use crate::audio::demux::MonoBuffer;
use crate::constants::METER_GAIN;

/// Maps per-buffer RMS to a bounded visual scale
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter {
    gain: f32,
}

impl LevelMeter {
    /// Create a meter with a custom visual gain
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Loudness of one buffer as `min(rms * gain, 1.0)`.
    ///
    /// An empty buffer reads as silence.
    pub fn level(&self, buffer: &MonoBuffer) -> f32 {
        if buffer.is_empty() {
            return 0.0;
        }

        let sum_of_squares: f32 = buffer.samples().iter().map(|s| s * s).sum();
        let rms = (sum_of_squares / buffer.len() as f32).sqrt();

        (rms * self.gain).min(1.0)
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        // Gain chosen so typical speech peaks near 1.0 without constant
        // clipping of the visual scale
        Self::new(METER_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_silence_reads_exactly_zero() {
        let meter = LevelMeter::default();
        assert_eq!(meter.level(&MonoBuffer::new(vec![0.0; 320])), 0.0);
        assert_eq!(meter.level(&MonoBuffer::new(Vec::new())), 0.0);
    }

    #[test]
    fn test_full_scale_clamps_to_one() {
        let meter = LevelMeter::default();
        let loud = MonoBuffer::new(vec![1.0; 160]);
        assert_eq!(meter.level(&loud), 1.0);
    }

    #[test]
    fn test_quiet_signal_is_scaled_by_gain() {
        let meter = LevelMeter::default();
        // Constant amplitude 0.1 has rms 0.1; with gain 4.0 → 0.4
        let quiet = MonoBuffer::new(vec![0.1; 160]);
        let level = meter.level(&quiet);
        assert!((level - 0.4).abs() < 1e-4);
    }

    proptest! {
        #[test]
        fn prop_level_always_in_unit_interval(
            samples in proptest::collection::vec(-4.0f32..4.0, 0..512),
        ) {
            let level = LevelMeter::default().level(&MonoBuffer::new(samples));
            prop_assert!((0.0..=1.0).contains(&level));
        }
    }
}
