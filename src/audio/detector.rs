//! Energy-based activity detection.
//!
//! The score of a buffer is its root-mean-square energy. An empty buffer
//! scores 0 and therefore never counts as activity.

use super::backend::SampleBuffer;

/// Root-mean-square energy of a block of samples. Returns 0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_of_squares / samples.len() as f64).sqrt() as f32
}

/// Classifies buffers against a fixed RMS threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityDetector {
    threshold: f32,
}

impl ActivityDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn score(&self, buffer: &SampleBuffer) -> f32 {
        rms(&buffer.samples)
    }

    /// Strictly above the threshold counts as activity
    pub fn is_active(&self, score: f32) -> bool {
        score > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_handles_empty() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn threshold_is_strict() {
        let detector = ActivityDetector::new(0.1);
        assert!(!detector.is_active(0.1));
        assert!(detector.is_active(0.1001));
    }
}
