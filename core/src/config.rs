//! Receiver configuration

use crate::error::{ReceiverError, Result};

/// Parameters of one receive session.
///
/// Defaults come from the reference link: 192 kHz capture, 1 ms symbols,
/// data tones at 63/67 kHz and a 69.75 kHz stop sentinel.
#[derive(Debug, Clone)]
pub struct RxConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Samples per symbol period (one tone burst, one bit)
    pub symbol_samples: usize,
    /// Sliding-window depth in symbol periods
    pub window_symbols: usize,
    /// Amplitude of the generated preamble template, in (0, 1]
    pub amplitude: f32,
    /// Data tone encoding bit 0, Hz
    pub zero_freq: f32,
    /// Data tone encoding bit 1, Hz
    pub one_freq: f32,
    /// Inclusive frequency band classified as bit 0
    pub zero_band: (f32, f32),
    /// Inclusive frequency band classified as bit 1
    pub one_band: (f32, f32),
    /// End-of-transmission sentinel tone, Hz
    pub stop_freq: f32,
    /// Half-width of the sentinel band, Hz
    pub stop_tolerance: f32,
    /// Minimum normalized correlation for a candidate detection
    pub detection_threshold: f32,
    /// Tolerance for the score-stability half of the confirmation check
    pub score_epsilon: f32,
    /// Known preamble bit pattern (values 0 or 1)
    pub preamble_bits: Vec<u8>,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::SAMPLE_RATE,
            symbol_samples: crate::SYMBOL_SAMPLES,
            window_symbols: crate::WINDOW_SYMBOLS,
            amplitude: crate::TONE_AMPLITUDE,
            zero_freq: crate::ZERO_FREQ,
            one_freq: crate::ONE_FREQ,
            zero_band: crate::ZERO_BAND,
            one_band: crate::ONE_BAND,
            stop_freq: crate::STOP_FREQ,
            stop_tolerance: crate::STOP_TOLERANCE,
            detection_threshold: crate::DETECTION_THRESHOLD,
            score_epsilon: crate::SCORE_EPSILON,
            preamble_bits: crate::PREAMBLE_BITS.to_vec(),
        }
    }
}

impl RxConfig {
    /// Total samples held by the sliding window.
    pub fn window_samples(&self) -> usize {
        self.window_symbols * self.symbol_samples
    }

    /// Length of the preamble template in samples.
    pub fn template_samples(&self) -> usize {
        self.preamble_bits.len() * self.symbol_samples
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ReceiverError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if self.symbol_samples == 0 {
            return Err(ReceiverError::InvalidConfig("symbol_samples must be non-zero".into()));
        }
        if self.preamble_bits.is_empty() {
            return Err(ReceiverError::InvalidConfig("preamble pattern is empty".into()));
        }
        if self.preamble_bits.iter().any(|&b| b > 1) {
            return Err(ReceiverError::InvalidConfig(
                "preamble pattern may only contain 0 and 1".into(),
            ));
        }
        // The confirmation protocol needs the template to stay fully inside
        // the window across two consecutive one-symbol shifts.
        if self.window_symbols <= self.preamble_bits.len() {
            return Err(ReceiverError::InvalidConfig(format!(
                "window of {} symbols cannot track a {}-symbol preamble; \
                 at least one symbol of slack is required",
                self.window_symbols,
                self.preamble_bits.len()
            )));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return Err(ReceiverError::InvalidConfig(format!(
                "amplitude {} outside (0, 1]",
                self.amplitude
            )));
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold <= 1.0) {
            return Err(ReceiverError::InvalidConfig(format!(
                "detection_threshold {} outside (0, 1]",
                self.detection_threshold
            )));
        }
        let plateau = partial_self_match(&self.preamble_bits);
        if self.detection_threshold <= plateau {
            return Err(ReceiverError::InvalidConfig(format!(
                "detection_threshold {} does not clear the preamble's partial \
                 self-match score {plateau:.4}; the pattern entering the window \
                 would lock before it is fully received",
                self.detection_threshold
            )));
        }
        if self.score_epsilon < 0.0 {
            return Err(ReceiverError::InvalidConfig("score_epsilon must be non-negative".into()));
        }
        if self.stop_tolerance < 0.0 {
            return Err(ReceiverError::InvalidConfig("stop_tolerance must be non-negative".into()));
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        for (name, freq) in [
            ("zero_freq", self.zero_freq),
            ("one_freq", self.one_freq),
            ("stop_freq", self.stop_freq + self.stop_tolerance),
        ] {
            if !(freq > 0.0 && freq < nyquist) {
                return Err(ReceiverError::InvalidConfig(format!(
                    "{name} {freq} Hz outside (0, {nyquist}) Hz at sample rate {}",
                    self.sample_rate
                )));
            }
        }

        let stop_band = (
            self.stop_freq - self.stop_tolerance,
            self.stop_freq + self.stop_tolerance,
        );
        for (name, band) in [
            ("zero_band", self.zero_band),
            ("one_band", self.one_band),
            ("stop band", stop_band),
        ] {
            if band.0 > band.1 {
                return Err(ReceiverError::InvalidConfig(format!(
                    "{name} is inverted: {} > {}",
                    band.0, band.1
                )));
            }
        }
        for (pair, a, b) in [
            ("zero_band and one_band", self.zero_band, self.one_band),
            ("zero_band and stop band", self.zero_band, stop_band),
            ("one_band and stop band", self.one_band, stop_band),
        ] {
            if a.0 <= b.1 && b.0 <= a.1 {
                return Err(ReceiverError::InvalidConfig(format!("{pair} overlap")));
            }
        }
        if !in_band(self.zero_freq, self.zero_band) {
            return Err(ReceiverError::InvalidConfig("zero_freq outside zero_band".into()));
        }
        if !in_band(self.one_freq, self.one_band) {
            return Err(ReceiverError::InvalidConfig("one_freq outside one_band".into()));
        }

        Ok(())
    }
}

fn in_band(freq: f32, band: (f32, f32)) -> bool {
    freq >= band.0 && freq <= band.1
}

/// Best correlation the template can score against a window that holds only
/// the first `k` symbols of the pattern, the rest silence. When those `k`
/// symbols equal the template's last `k` (a border of the pattern) the score
/// degenerates to `sqrt(k/n)`; the periodic `00110011` plateaus at
/// `sqrt(1/2)` once its first half has arrived.
fn partial_self_match(bits: &[u8]) -> f32 {
    let n = bits.len();
    (1..n)
        .filter(|&k| bits[..k] == bits[n - k..])
        .map(|k| (k as f32 / n as f32).sqrt())
        .fold(0.0, f32::max)
}
