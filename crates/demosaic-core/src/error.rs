use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemosaicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unable to acquire CFA pattern information: required metadata not available")]
    PatternUnavailable,

    #[error("Unsupported or invalid CFA pattern '{0}'")]
    InvalidCfaPattern(String),

    #[error("Image too small for {method}: {width}x{height} (minimum {min}x{min})")]
    ImageTooSmall {
        method: &'static str,
        width: usize,
        height: usize,
        min: usize,
    },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Batch error: {0}")]
    Batch(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Process aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, DemosaicError>;
