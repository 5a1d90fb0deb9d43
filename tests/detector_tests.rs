// Activity detector properties
//
// RMS must be 0 for empty and all-zero buffers and |A| for a constant
// amplitude A.

use surface_agent::audio::{rms, ActivityDetector, CaptureFormat, SampleBuffer};
use surface_agent::session::SessionConfig;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn test_empty_buffer_scores_zero() {
    assert_eq!(rms(&[]), 0.0);

    let buffer = SampleBuffer::new(Vec::new(), CaptureFormat::float32(16000, 1), 0);
    assert_eq!(ActivityDetector::new(0.1).score(&buffer), 0.0);
}

#[test]
fn test_all_zero_buffer_scores_zero() {
    for len in [1usize, 7, 160, 4096] {
        assert_eq!(rms(&vec![0.0; len]), 0.0, "len {}", len);
    }
}

#[test]
fn test_constant_amplitude_scores_its_magnitude() {
    for amplitude in [0.05f32, 0.1, 0.5, -0.5, 1.0, -0.75] {
        let samples = vec![amplitude; 480];
        let score = rms(&samples);
        assert!(
            approx_eq(score, amplitude.abs()),
            "amplitude {} scored {}",
            amplitude,
            score
        );
    }
}

#[test]
fn test_alternating_sign_matches_formula() {
    // sqrt((0.6^2 + 0.8^2) / 2)
    let samples = [0.6f32, -0.8, 0.6, -0.8];
    assert!(approx_eq(rms(&samples), (0.5f32).sqrt()));
}

#[test]
fn test_session_detector_uses_configured_threshold() {
    let config = SessionConfig {
        activity_threshold: 0.3,
        ..SessionConfig::default()
    };
    let detector = config.detector();
    assert_eq!(detector.threshold(), 0.3);

    let buffer = SampleBuffer::new(vec![0.25; 64], CaptureFormat::float32(16000, 1), 0);
    assert!(!detector.is_active(detector.score(&buffer)));
    assert!(SessionConfig::default().detector().is_active(detector.score(&buffer)));
}

#[test]
fn test_detector_threshold_is_strict() {
    let detector = ActivityDetector::new(0.1);
    assert_eq!(detector.threshold(), 0.1);

    let at_threshold = SampleBuffer::new(vec![0.1; 64], CaptureFormat::float32(16000, 1), 0);
    assert!(!detector.is_active(detector.score(&at_threshold)));

    let loud = SampleBuffer::new(vec![0.2; 64], CaptureFormat::float32(16000, 1), 0);
    assert!(detector.is_active(detector.score(&loud)));
}
