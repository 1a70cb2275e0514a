//! Engine-level render events.

use std::time::Duration;

/// Outcome metadata attached to every completed or failed render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub success: bool,
    pub duration: Duration,
    pub from_cache: bool,
    pub error: Option<String>,
}

impl RenderOutcome {
    pub fn success(duration: Duration, from_cache: bool) -> Self {
        Self {
            success: true,
            duration,
            from_cache,
            error: None,
        }
    }

    pub fn failure(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration,
            from_cache: false,
            error: Some(error.into()),
        }
    }
}

/// Event surfaced to the host for each render that ran to a conclusion.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// The artifact was painted into a complete document.
    Completed {
        artifact_id: String,
        document: String,
        outcome: RenderOutcome,
    },
    /// The render failed or timed out.
    Failed {
        artifact_id: String,
        outcome: RenderOutcome,
    },
}

impl RenderEvent {
    pub fn artifact_id(&self) -> &str {
        match self {
            RenderEvent::Completed { artifact_id, .. } => artifact_id,
            RenderEvent::Failed { artifact_id, .. } => artifact_id,
        }
    }
}
