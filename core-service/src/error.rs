use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Progress error: {0}")]
    Progress(#[from] core_progress::ProgressError),
}

impl CoreError {
    /// Whether the UI should offer a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Playback(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
