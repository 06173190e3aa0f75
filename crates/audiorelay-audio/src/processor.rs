use audiorelay_foundation::ProcessingConfig;

/// Overshoot past the clip threshold is compressed to this fraction
/// instead of being truncated.
const SOFT_KNEE: f64 = 0.3;

/// Pure per-sample conditioning: gain, then a soft clip at the configured
/// threshold.
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    volume: f64,
    clip_threshold: f64,
}

impl SignalProcessor {
    pub fn new(params: &ProcessingConfig) -> Self {
        Self {
            volume: params.volume_multiplier,
            clip_threshold: params.clip_threshold as f64,
        }
    }

    pub fn process(&self, samples: &[i16]) -> Vec<i16> {
        samples.iter().map(|&s| self.shape(s)).collect()
    }

    fn shape(&self, sample: i16) -> i16 {
        let mut v = sample as f64 * self.volume;
        if v > self.clip_threshold {
            v = self.clip_threshold + (v - self.clip_threshold) * SOFT_KNEE;
        } else if v < -self.clip_threshold {
            v = -self.clip_threshold + (v + self.clip_threshold) * SOFT_KNEE;
        }
        v as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(volume: f64, clip: i16) -> SignalProcessor {
        SignalProcessor::new(&ProcessingConfig {
            silence_detection: true,
            silence_threshold: 1000,
            volume_multiplier: volume,
            clip_threshold: clip,
        })
    }

    #[test]
    fn unity_gain_below_threshold_is_identity() {
        let p = processor(1.0, 28_000);
        let input = vec![0i16, 100, -100, 27_999, -27_999];
        assert_eq!(p.process(&input), input);
    }

    #[test]
    fn gain_is_applied_before_clipping() {
        let p = processor(2.0, 28_000);
        assert_eq!(p.process(&[100, -250]), vec![200, -500]);
    }

    #[test]
    fn overshoot_is_compressed_to_thirty_percent() {
        // 2x gain puts 15_000 at 30_000: 2_000 over the knee, kept at 600.
        let p = processor(2.0, 28_000);
        assert_eq!(p.process(&[15_000]), vec![28_600]);
    }

    #[test]
    fn negative_overshoot_is_symmetric() {
        let p = processor(2.0, 28_000);
        assert_eq!(p.process(&[-15_000]), vec![-28_600]);
    }

    #[test]
    fn threshold_itself_is_not_clipped() {
        let p = processor(1.0, 28_000);
        assert_eq!(p.process(&[28_000, -28_000]), vec![28_000, -28_000]);
    }
}
