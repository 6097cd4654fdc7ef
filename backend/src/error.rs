/// Request-fatal failures. These are the only errors that leave the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid image file: {0}")]
    Decode(String),
    #[error("Cannot open video file: {0}")]
    VideoOpen(String),
    #[error("No frames extracted from video")]
    NoFramesExtracted,
}

/// Failure of a single scoring backend. Always recovered inside the scorer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Inference error: {0}")]
    Inference(String),
    #[error("Unparseable model output: {0}")]
    Shape(String),
    #[error("Backend panicked: {0}")]
    Panicked(String),
    #[error("Backend unavailable")]
    Unavailable,
}

/// Decode or conversion failure of one video frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame decode error: {0}")]
    Decode(String),
    #[error("Frame conversion error: {0}")]
    Convert(String),
}

impl From<image::ImageError> for FrameError {
    fn from(err: image::ImageError) -> Self {
        FrameError::Decode(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
