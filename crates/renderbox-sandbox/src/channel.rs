//! Wire protocol between the host and an execution context.
//!
//! All messages are scoped to a single context instance. The host verifies
//! the sending context is still registered before acting on a message, so a
//! reply arriving after its context was torn down is dropped, not dispatched.
//!
//! The message set is a closed tagged union; the boundary matches it
//! exhaustively. Nothing duck-typed crosses the channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::ContextId;

/// Artifact content categories understood by the paint step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Raw markup documents (HTML).
    Markup,
    /// Component scripts (JSX/TSX-style UI components).
    Component,
    /// Documentation markup (Markdown).
    Markdown,
    /// Programming scripts (Python and friends), displayed, never executed.
    Code,
    /// Structured data interchange (JSON).
    Json,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Markup => "markup",
            ArtifactKind::Component => "component",
            ArtifactKind::Markdown => "markdown",
            ArtifactKind::Code => "code",
            ArtifactKind::Json => "json",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render request as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub artifact_id: String,
}

/// Messages sent from the host to a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    RenderArtifact { payload: RenderRequest },
    /// Orderly teardown. Host-internal; a context exits its loop on receipt.
    Shutdown,
}

/// Messages sent from a context back to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextMessage {
    /// The context finished bootstrapping and can accept render requests.
    RendererReady,
    RenderComplete { payload: String, success: bool },
    RenderError { error: String },
}

/// Error dispatching a message to a context.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unknown context: {0}")]
    UnknownContext(ContextId),

    #[error("context channel closed: {0}")]
    Disconnected(ContextId),
}
