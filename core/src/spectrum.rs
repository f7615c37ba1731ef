//! Dominant-frequency estimation via real-FFT peak picking.

use crate::error::{ReceiverError, Result};
use realfft::RealFftPlanner;

/// Estimates the dominant frequency of one symbol period of samples.
///
/// Implementations must be deterministic for a given input; the
/// demodulation consumer assumes no side effects beyond internal caching.
pub trait FrequencyEstimator: Send {
    fn dominant_frequency(&mut self, samples: &[f32], sample_rate: u32) -> Result<f32>;
}

/// FFT magnitude-peak estimator.
///
/// Resolution is `sample_rate / len` per bin (1 kHz for a 192-sample symbol
/// at 192 kHz), so returned frequencies are bin-quantized. The symbol
/// classifier works in bands for exactly this reason.
pub struct FftPeakEstimator {
    planner: RealFftPlanner<f32>,
}

impl FftPeakEstimator {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
        }
    }
}

impl Default for FftPeakEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyEstimator for FftPeakEstimator {
    fn dominant_frequency(&mut self, samples: &[f32], sample_rate: u32) -> Result<f32> {
        if samples.is_empty() {
            return Err(ReceiverError::FftError("empty input".into()));
        }
        let n = samples.len();
        let r2c = self.planner.plan_fft_forward(n);

        let mut input = samples.to_vec();
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut input, &mut spectrum)
            .map_err(|e| ReceiverError::FftError(format!("forward FFT failed: {e:?}")))?;

        // Skip the DC bin: a constant offset is not a tone.
        let mut peak_bin = 1;
        let mut peak_mag = 0.0f32;
        for (bin, value) in spectrum.iter().enumerate().skip(1) {
            let mag = value.norm_sqr();
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = bin;
            }
        }

        Ok(peak_bin as f32 * sample_rate as f32 / n as f32)
    }
}
