//! Error types for the rendering engine.

use std::time::Duration;

use thiserror::Error;

use renderbox_sandbox::{BootstrapError, ChannelError, ValidationError};

/// Main error type for rendering operations.
///
/// Every failure crossing the engine boundary is one of these variants or an
/// error event; nothing panics across the boundary. Classification and cache
/// degradations never surface here — they are logged and worked around.
#[derive(Debug, Error)]
pub enum Error {
    #[error("context did not initialize after {attempts} attempts")]
    InitializationTimeout { attempts: u32 },

    #[error("render of artifact {artifact_id} timed out after {timeout:?}")]
    RenderTimeout {
        artifact_id: String,
        timeout: Duration,
    },

    #[error("context communication: {0}")]
    ContextCommunication(String),

    #[error("invalid content: {0}")]
    ContentValidation(#[from] ValidationError),

    #[error("bootstrap: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::ContextCommunication(e.to_string())
    }
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, Error>;
