//! Preamble synchronization: template generation, normalized
//! cross-correlation against the sliding window, and the two-stage lock
//! confirmation protocol.

use crate::config::RxConfig;
use std::f32::consts::PI;

/// Generate one fixed-frequency tone burst.
pub fn generate_tone(freq: f32, num_samples: usize, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let fs = sample_rate as f32;
    (0..num_samples)
        .map(|n| amplitude * (2.0 * PI * freq * n as f32 / fs).sin())
        .collect()
}

/// Build the reference waveform for the configured preamble bit pattern.
///
/// Bit 1 maps to the one-tone, bit 0 to the zero-tone, one symbol period
/// each. Pure function of the configuration; built once per session.
pub fn preamble_template(config: &RxConfig) -> Vec<f32> {
    let mut template = Vec::with_capacity(config.template_samples());
    for &bit in &config.preamble_bits {
        let freq = if bit == 1 { config.one_freq } else { config.zero_freq };
        template.extend(generate_tone(
            freq,
            config.symbol_samples,
            config.sample_rate,
            config.amplitude,
        ));
    }
    template
}

/// Best-scoring alignment of the template inside a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Offset of the match into the window
    pub position: usize,
    /// Normalized correlation in [-1, 1]
    pub score: f32,
}

/// Pearson-style normalized cross-correlation of the template against every
/// valid lag of the window.
///
/// `score(L) = Σ w[L+i]·t[i] / sqrt(Σ w[L+i]² · Σ t[i]²)`, defined as 0
/// whenever either energy is 0. Normalizing by both energies makes the score
/// robust to amplitude scaling of the received signal. Returns the
/// highest-scoring lag, or `None` when the template does not fit.
pub fn cross_correlate(window: &[f32], template: &[f32]) -> Option<Correlation> {
    if template.is_empty() || window.len() < template.len() {
        return None;
    }
    let max_lag = window.len() - template.len();

    let template_energy: f32 = template.iter().map(|x| x * x).sum();

    // Prefix sums of squared samples give O(1) window energy per lag.
    let mut sq_prefix = vec![0.0f32; window.len() + 1];
    for (i, &s) in window.iter().enumerate() {
        sq_prefix[i + 1] = sq_prefix[i] + s * s;
    }

    let mut best: Option<Correlation> = None;
    for lag in 0..=max_lag {
        let dot: f32 = window[lag..lag + template.len()]
            .iter()
            .zip(template)
            .map(|(w, t)| w * t)
            .sum();
        let window_energy = sq_prefix[lag + template.len()] - sq_prefix[lag];
        let denom = (window_energy * template_energy).sqrt();
        let score = if denom > 0.0 { dot / denom } else { 0.0 };
        match best {
            Some(b) if score <= b.score => {}
            _ => best = Some(Correlation { position: lag, score }),
        }
    }
    best
}

/// Outcome of feeding one window update's best correlation to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncDecision {
    /// Best score below threshold; any stored candidate was discarded
    NoDetection,
    /// Candidate stored; confirmation pends on the next window update
    Tentative,
    /// Lock confirmed; `data_start` is the window offset just past the template
    Confirmed { data_start: usize },
}

/// Two-stage lock confirmation.
///
/// A single high correlation peak is not trusted: noise can produce one. A
/// genuine preamble sits still in the audio while the window slides over it,
/// so across two consecutive updates its peak moves back by exactly one
/// symbol period and keeps the same shift-invariant score. A spurious peak
/// fails at least one of the two conditions.
///
/// The score comparison uses a small tolerance rather than exact float
/// equality: the window energy under the peak is re-accumulated from a
/// different prefix range each update and may wobble in the last ulps.
#[derive(Debug)]
pub struct PreambleDetector {
    symbol_samples: usize,
    template_samples: usize,
    threshold: f32,
    score_epsilon: f32,
    pending: Option<Correlation>,
}

impl PreambleDetector {
    pub fn new(config: &RxConfig) -> Self {
        Self {
            symbol_samples: config.symbol_samples,
            template_samples: config.template_samples(),
            threshold: config.detection_threshold,
            score_epsilon: config.score_epsilon,
            pending: None,
        }
    }

    /// Feed the best correlation of one window update.
    ///
    /// The detector is one-shot: after `Confirmed` the sync stage is done
    /// for the session and must not observe further updates.
    pub fn observe(&mut self, best: Correlation) -> SyncDecision {
        if best.score < self.threshold {
            self.pending = None;
            return SyncDecision::NoDetection;
        }

        let confirmed = self.pending.is_some_and(|prev| {
            (best.score - prev.score).abs() <= self.score_epsilon
                && prev.position.checked_sub(self.symbol_samples) == Some(best.position)
        });

        if confirmed {
            SyncDecision::Confirmed {
                data_start: best.position + self.template_samples,
            }
        } else {
            // A failed confirmation replaces the stored candidate so the
            // check can be attempted again one update later.
            self.pending = Some(best);
            SyncDecision::Tentative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config() -> RxConfig {
        RxConfig::default()
    }

    #[test]
    fn template_has_one_symbol_per_bit() {
        let config = config();
        let template = preamble_template(&config);
        assert_eq!(template.len(), config.preamble_bits.len() * config.symbol_samples);
    }

    #[test]
    fn template_is_deterministic() {
        let config = config();
        assert_eq!(preamble_template(&config), preamble_template(&config));
    }

    #[test]
    fn tone_respects_amplitude() {
        let tone = generate_tone(63_000.0, 192, 192_000, 0.5);
        let max = tone.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(max <= 0.5 + 1e-6, "max amplitude {max}");
        assert!(max > 0.4, "tone should actually swing, got {max}");
    }

    #[test]
    fn correlation_finds_embedded_template() {
        let config = config();
        let template = preamble_template(&config);
        let offset = 250;

        let mut window = vec![0.0f32; config.window_samples()];
        window[offset..offset + template.len()].copy_from_slice(&template);

        let best = cross_correlate(&window, &template).unwrap();
        assert_eq!(best.position, offset);
        assert!((best.score - 1.0).abs() < 1e-4, "score {}", best.score);
    }

    #[test]
    fn correlation_is_amplitude_invariant() {
        let config = config();
        let template = preamble_template(&config);

        let mut window = vec![0.0f32; config.window_samples()];
        for (slot, s) in window[300..300 + template.len()].iter_mut().zip(&template) {
            *slot = s * 0.05;
        }

        let best = cross_correlate(&window, &template).unwrap();
        assert_eq!(best.position, 300);
        assert!((best.score - 1.0).abs() < 1e-3, "score {}", best.score);
    }

    #[test]
    fn correlation_of_silence_is_zero() {
        let config = config();
        let template = preamble_template(&config);
        let window = vec![0.0f32; config.window_samples()];

        let best = cross_correlate(&window, &template).unwrap();
        assert_eq!(best.score, 0.0);
    }

    #[test]
    fn correlation_rejects_short_window() {
        let template = vec![1.0f32; 16];
        assert!(cross_correlate(&[0.0; 8], &template).is_none());
        assert!(cross_correlate(&[0.0; 8], &[]).is_none());
    }

    #[test]
    fn detector_confirms_stationary_peak() {
        let mut detector = PreambleDetector::new(&config());
        let first = Correlation { position: 384, score: 0.93 };
        let second = Correlation { position: 192, score: 0.93 };

        assert_eq!(detector.observe(first), SyncDecision::Tentative);
        assert_eq!(
            detector.observe(second),
            SyncDecision::Confirmed { data_start: 192 + 1536 }
        );
    }

    #[test]
    fn detector_tolerates_score_jitter_within_epsilon() {
        let mut detector = PreambleDetector::new(&config());
        detector.observe(Correlation { position: 384, score: 0.93 });
        let decision = detector.observe(Correlation { position: 192, score: 0.93 + 5e-7 });
        assert!(matches!(decision, SyncDecision::Confirmed { .. }));
    }

    #[test]
    fn detector_replaces_candidate_on_score_mismatch() {
        let mut detector = PreambleDetector::new(&config());
        detector.observe(Correlation { position: 384, score: 0.93 });
        assert_eq!(
            detector.observe(Correlation { position: 192, score: 0.80 }),
            SyncDecision::Tentative
        );
        // The replacement is live: a matching follow-up confirms against it.
        assert_eq!(
            detector.observe(Correlation { position: 0, score: 0.80 }),
            SyncDecision::Confirmed { data_start: 1536 }
        );
    }

    #[test]
    fn detector_replaces_candidate_on_position_mismatch() {
        let mut detector = PreambleDetector::new(&config());
        detector.observe(Correlation { position: 384, score: 0.93 });
        // Peak moved by two symbols: unstable, not a lock.
        assert_eq!(
            detector.observe(Correlation { position: 0, score: 0.93 }),
            SyncDecision::Tentative
        );
    }

    #[test]
    fn detector_resets_on_below_threshold_update() {
        let mut detector = PreambleDetector::new(&config());
        detector.observe(Correlation { position: 384, score: 0.93 });
        assert_eq!(
            detector.observe(Correlation { position: 192, score: 0.1 }),
            SyncDecision::NoDetection
        );
        // Stored state was discarded: the protocol restarts from empty.
        assert_eq!(
            detector.observe(Correlation { position: 192, score: 0.93 }),
            SyncDecision::Tentative
        );
    }

    #[test]
    fn detector_never_locks_on_noise() {
        let config = config();
        let template = preamble_template(&config);
        let mut detector = PreambleDetector::new(&config);
        let mut rng = StdRng::seed_from_u64(0x5EED);

        let mut window = vec![0.0f32; config.window_samples()];
        for _ in 0..300 {
            window.drain(..config.symbol_samples);
            window.extend((0..config.symbol_samples).map(|_| rng.gen_range(-1.0f32..1.0)));

            let best = cross_correlate(&window, &template).unwrap();
            let decision = detector.observe(best);
            assert!(
                !matches!(decision, SyncDecision::Confirmed { .. }),
                "locked on noise at score {}",
                best.score
            );
        }
    }
}
