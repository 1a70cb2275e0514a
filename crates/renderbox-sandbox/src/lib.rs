//! renderbox-sandbox: Isolated execution contexts for artifact rendering.
//!
//! This crate provides the execution substrate the renderbox engine leases
//! contexts from. Each context is an isolated runtime on its own thread,
//! bootstrapped from a fixed baseline resource, that paints untrusted
//! artifact content into complete sanitized documents. Host and context
//! coordinate exclusively through asynchronous message channels — never
//! direct calls or shared state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use renderbox_sandbox::{Bootstrap, Executor, HostMessage, RenderRequest, ArtifactKind};
//! use std::time::Duration;
//!
//! let mut executor = Executor::new();
//! let id = executor.spawn(Bootstrap::builtin());
//! executor.wait_ready(id, Duration::from_secs(30))?;
//!
//! executor.send(id, HostMessage::RenderArtifact {
//!     payload: RenderRequest {
//!         code: "<p>hello</p>".into(),
//!         kind: ArtifactKind::Markup,
//!         artifact_id: "a-1".into(),
//!     },
//! })?;
//!
//! let mut events = Vec::new();
//! executor.poll(&mut events, Some(Duration::from_millis(50)));
//! ```
//!
//! ## Isolation model
//!
//! Painting never executes artifact content: scripts are displayed, markup
//! is sanitized, structured data is re-serialized. Isolation is therefore
//! only as strong as the paint step; this crate does not attempt
//! process-level sandboxing.

pub mod bootstrap;
pub mod channel;
pub mod context;
pub mod executor;
pub mod paint;
pub mod validate;

pub use bootstrap::{Bootstrap, BootstrapError, CONTENT_SLOT};
pub use channel::{ArtifactKind, ChannelError, ContextMessage, HostMessage, RenderRequest};
pub use context::{ContextRuntime, OutboxSender, PaintRuntime};
pub use executor::{ContextEvent, ContextId, Executor, HandshakeError};
pub use paint::{paint, PaintError};
pub use validate::{validate_artifact_id, validate_content, ValidationError, MAX_CONTENT_BYTES};
