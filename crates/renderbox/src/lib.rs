//! renderbox: a poll-driven artifact rendering engine.
//!
//! Untrusted artifact content (markup, component scripts, markdown,
//! structured data, plain code) is rendered inside isolated execution
//! contexts provided by [`renderbox_sandbox`]. This crate supplies the host
//! side: per-artifact renderers with queuing and initialization watchdogs, a
//! bounded context pool, content classification, a render-result cache and
//! render performance monitoring.
//!
//! ## Quick start
//!
//! ```ignore
//! use renderbox::{RendererConfig, RendererManager, TypeHint};
//! use std::time::Duration;
//!
//! let mut manager = RendererManager::new(RendererConfig::default())?;
//!
//! if let Some(event) = manager.render_artifact("doc-1", "# Hello", TypeHint::Auto)? {
//!     // Answered synchronously (cache hit).
//! }
//! for event in manager.poll(Some(Duration::from_millis(50))) {
//!     // Completions and failures stream out of poll().
//! }
//! ```
//!
//! The engine is single-threaded on the host side: `poll()` routes context
//! replies, enforces every deadline and runs periodic maintenance. Call it
//! from your event loop.

pub mod cache;
pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod manager;
pub mod perf;
pub mod pool;
pub mod renderer;

pub use cache::{fingerprint, CacheReport, CacheStats, RenderCache};
pub use config::RendererConfig;
pub use detect::{
    Classification, Complexity, ContentDetector, SecurityLevel, SecurityReport, SizeCategory,
    SizeInfo, TypeHint,
};
pub use error::{Error, Result};
pub use events::{RenderEvent, RenderOutcome};
pub use manager::{RendererManager, RendererStatus};
pub use perf::{Alert, AlertSeverity, PerfMonitor, PerfReport, PerfStats, SpanMetadata};
pub use pool::{ContextPool, RuntimeFactory};
pub use renderer::{ArtifactRenderer, Phase};

pub use renderbox_sandbox::ArtifactKind;
