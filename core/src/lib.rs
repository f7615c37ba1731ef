//! BFSK acoustic-modem receiver
//!
//! Locates a known preamble waveform inside a continuous audio stream via
//! normalized cross-correlation, confirms the lock across two consecutive
//! sliding-window updates, then demodulates tone symbols into bits and packs
//! the final message bytes.

pub mod config;
pub mod demod;
pub mod error;
pub mod receiver;
pub mod source;
pub mod spectrum;
pub mod sync;

pub use config::RxConfig;
pub use error::{ReceiverError, Result};
pub use receiver::{Receiver, SessionState};
pub use source::{MemorySource, SampleSource};
pub use spectrum::{FftPeakEstimator, FrequencyEstimator};

// Reference configuration constants (ultrasonic BFSK link at 192 kHz)
pub const SAMPLE_RATE: u32 = 192_000;
pub const SYMBOL_SAMPLES: usize = 192; // 1 ms per symbol
pub const WINDOW_SYMBOLS: usize = 10;

// Tone alphabet
pub const ZERO_FREQ: f32 = 63_000.0; // Hz
pub const ONE_FREQ: f32 = 67_000.0; // Hz
pub const STOP_FREQ: f32 = 69_750.0; // Hz, end-of-transmission sentinel

// Classifier bands (inclusive)
pub const ZERO_BAND: (f32, f32) = (62_500.0, 63_500.0);
pub const ONE_BAND: (f32, f32) = (66_500.0, 67_500.0);
pub const STOP_TOLERANCE: f32 = 500.0; // Hz, half-width of the sentinel band

// Synchronization. The preamble repeats its first half, so a window holding
// only `0011` already correlates at sqrt(1/2) ≈ 0.7071 against the template's
// back half; the threshold must clear that plateau or the receiver locks four
// symbols early. `RxConfig::validate` enforces the floor for custom patterns.
pub const DETECTION_THRESHOLD: f32 = 0.8;
pub const SCORE_EPSILON: f32 = 1e-6;
pub const PREAMBLE_BITS: [u8; 8] = [0, 0, 1, 1, 0, 0, 1, 1];
pub const TONE_AMPLITUDE: f32 = 1.0;
