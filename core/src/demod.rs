//! Symbol classification, bit accumulation, and message bit packing.

use crate::config::RxConfig;
use crate::error::Result;
use crate::spectrum::FrequencyEstimator;

/// Classification of one symbol period's dominant tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    Zero,
    One,
    /// End-of-transmission sentinel
    Stop,
    /// Outside every configured band; dropped by design
    Unknown,
}

/// Maps a dominant frequency onto the three-range tone alphabet.
#[derive(Debug, Clone)]
pub struct SymbolClassifier {
    zero_band: (f32, f32),
    one_band: (f32, f32),
    stop_band: (f32, f32),
}

impl SymbolClassifier {
    pub fn new(config: &RxConfig) -> Self {
        Self {
            zero_band: config.zero_band,
            one_band: config.one_band,
            stop_band: (
                config.stop_freq - config.stop_tolerance,
                config.stop_freq + config.stop_tolerance,
            ),
        }
    }

    pub fn classify(&self, freq: f32) -> SymbolClass {
        if in_band(freq, self.stop_band) {
            SymbolClass::Stop
        } else if in_band(freq, self.zero_band) {
            SymbolClass::Zero
        } else if in_band(freq, self.one_band) {
            SymbolClass::One
        } else {
            SymbolClass::Unknown
        }
    }
}

fn in_band(freq: f32, band: (f32, f32)) -> bool {
    freq >= band.0 && freq <= band.1
}

/// Pack classified bits into bytes, most significant bit first.
///
/// A trailing group of fewer than eight bits is discarded, never padded.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|group| group.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8))
        .collect()
}

/// Consumes symbol-period chunks and accumulates classified bits until the
/// stop sentinel is observed.
///
/// Classification is lossy by design: a chunk whose dominant frequency falls
/// outside all three bands contributes nothing, trading message length for
/// resilience against tone-detection jitter.
pub struct Demodulator {
    classifier: SymbolClassifier,
    estimator: Box<dyn FrequencyEstimator>,
    sample_rate: u32,
    bits: Vec<bool>,
}

impl Demodulator {
    pub fn new(config: &RxConfig, estimator: Box<dyn FrequencyEstimator>) -> Self {
        Self {
            classifier: SymbolClassifier::new(config),
            estimator,
            sample_rate: config.sample_rate,
            bits: Vec::new(),
        }
    }

    /// Classify one symbol period of samples.
    ///
    /// Returns `true` when the stop sentinel was observed and consumption
    /// must end.
    pub fn feed_symbol(&mut self, chunk: &[f32]) -> Result<bool> {
        let freq = self.estimator.dominant_frequency(chunk, self.sample_rate)?;
        match self.classifier.classify(freq) {
            SymbolClass::Zero => self.bits.push(false),
            SymbolClass::One => self.bits.push(true),
            SymbolClass::Stop => return Ok(true),
            SymbolClass::Unknown => {
                log::debug!("dropping unclassifiable symbol at {freq} Hz");
            }
        }
        Ok(false)
    }

    pub fn bit_count(&self) -> usize {
        self.bits.len()
    }

    /// Pack the accumulated bits into the final message bytes.
    pub fn finish(self) -> Vec<u8> {
        pack_bits(&self.bits)
    }
}
