use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sample block has {actual} samples, expected {expected}")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("session cancelled before end of transmission")]
    Cancelled,

    #[error("input ended before a complete transmission was observed")]
    Incomplete,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
