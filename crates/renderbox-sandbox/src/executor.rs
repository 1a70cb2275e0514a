//! Context executor: spawn, message, poll, destroy.
//!
//! The executor owns the host side of every context channel and multiplexes
//! their replies into a single event stream:
//!
//! - `spawn()` - start a new context from a bootstrap resource
//! - `send()` + `poll()` - asynchronous render protocol
//! - `wait_ready()` - blocking readiness handshake (pool warm-up path)
//!
//! ## Source verification
//!
//! Every inbound message carries the id of the context that produced it. A
//! message whose source is no longer registered — typically a reply arriving
//! after its context was destroyed — is logged and dropped, never
//! dispatched. This is what makes teardown the effective cancellation
//! mechanism: once a context is deregistered, its late replies are inert.
//!
//! ## Example
//!
//! ```ignore
//! use renderbox_sandbox::{Bootstrap, Executor, HostMessage};
//!
//! let mut executor = Executor::new();
//! let id = executor.spawn(Bootstrap::builtin());
//! executor.wait_ready(id, Duration::from_secs(30))?;
//! executor.send(id, HostMessage::RenderArtifact { payload })?;
//!
//! let mut events = Vec::new();
//! executor.poll(&mut events, Some(Duration::from_millis(50)));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::bootstrap::Bootstrap;
use crate::channel::{ChannelError, ContextMessage, HostMessage};
use crate::context::{ContextHandle, ContextRuntime, PaintRuntime};

/// Identifier for a spawned execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Context({})", self.0)
    }
}

/// Events surfaced by [`Executor::poll`].
#[derive(Debug)]
pub enum ContextEvent {
    /// A verified message from a registered context.
    Message {
        id: ContextId,
        message: ContextMessage,
    },
}

/// Error waiting for a context's readiness handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("{0} did not signal readiness within {1:?}")]
    Timeout(ContextId, Duration),

    #[error("unknown context: {0}")]
    UnknownContext(ContextId),
}

pub struct Executor {
    contexts: HashMap<ContextId, ContextHandle>,
    events_tx: Sender<(ContextId, ContextMessage)>,
    events_rx: Receiver<(ContextId, ContextMessage)>,
    /// Messages set aside while a blocking handshake drained the channel.
    buffered: VecDeque<(ContextId, ContextMessage)>,
    next_id: u64,
}

impl Executor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            contexts: HashMap::new(),
            events_tx,
            events_rx,
            buffered: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Spawn a new context bootstrapped from the given resource. Returns
    /// immediately; readiness arrives as a `RENDERER_READY` message.
    pub fn spawn(&mut self, bootstrap: Bootstrap) -> ContextId {
        self.spawn_with_runtime(PaintRuntime::new(bootstrap))
    }

    /// Spawn a context with a custom runtime. The seam tests use to stand up
    /// contexts that never answer or answer late.
    pub fn spawn_with_runtime<R: ContextRuntime>(&mut self, runtime: R) -> ContextId {
        let id = ContextId(self.next_id);
        self.next_id += 1;

        let (tx, inbox) = mpsc::channel();
        let outbox = self.events_tx.clone();
        let runtime = Box::new(runtime);
        let join = std::thread::Builder::new()
            .name(format!("renderbox-context-{}", id.0))
            .spawn(move || runtime.run(id, inbox, outbox))
            .expect("spawning context thread");

        tracing::debug!(context_id = %id, "spawned context");
        self.contexts.insert(
            id,
            ContextHandle {
                id,
                tx,
                join: Some(join),
                spawned_at: Instant::now(),
            },
        );
        id
    }

    /// Dispatch a message to a context.
    pub fn send(&mut self, id: ContextId, message: HostMessage) -> Result<(), ChannelError> {
        let handle = self
            .contexts
            .get(&id)
            .ok_or(ChannelError::UnknownContext(id))?;
        handle
            .tx
            .send(message)
            .map_err(|_| ChannelError::Disconnected(id))
    }

    /// Poll for context messages. Blocks up to `timeout` for the first
    /// message, then drains whatever else is immediately available.
    /// Messages from unregistered sources are dropped.
    pub fn poll(&mut self, events: &mut Vec<ContextEvent>, timeout: Option<Duration>) {
        events.clear();

        while let Some((id, message)) = self.buffered.pop_front() {
            self.admit(id, message, events);
        }

        if events.is_empty() {
            // The executor keeps a sender clone, so the channel never
            // disconnects; a None timeout means "drain without blocking".
            let wait = timeout.unwrap_or(Duration::ZERO);
            match self.events_rx.recv_timeout(wait) {
                Ok((id, message)) => self.admit(id, message, events),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }
        }

        while let Ok((id, message)) = self.events_rx.try_recv() {
            self.admit(id, message, events);
        }
    }

    /// Block until `id` signals readiness or the handshake times out.
    ///
    /// Messages from other contexts observed while waiting are buffered and
    /// surfaced by the next `poll`. A timeout rejects without retry; whether
    /// to try again is the caller's decision.
    pub fn wait_ready(&mut self, id: ContextId, timeout: Duration) -> Result<(), HandshakeError> {
        if !self.contexts.contains_key(&id) {
            return Err(HandshakeError::UnknownContext(id));
        }

        // The ready signal may already be sitting in the buffer.
        if let Some(pos) = self.buffered.iter().position(|(from, message)| {
            *from == id && matches!(message, ContextMessage::RendererReady)
        }) {
            self.buffered.remove(pos);
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HandshakeError::Timeout(id, timeout));
            }
            match self.events_rx.recv_timeout(remaining) {
                Ok((from, ContextMessage::RendererReady)) if from == id => return Ok(()),
                Ok((from, message)) => self.buffered.push_back((from, message)),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return Err(HandshakeError::Timeout(id, timeout));
                }
            }
        }
    }

    /// Tear down a context. Late replies from it will fail the source check.
    pub fn destroy(&mut self, id: ContextId) {
        if let Some(handle) = self.contexts.remove(&id) {
            tracing::debug!(context_id = %id, "destroying context");
            handle.shutdown();
        }
        self.buffered.retain(|(from, _)| *from != id);
    }

    pub fn active_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    /// How long a context has been alive, if it is still registered.
    pub fn age(&self, id: ContextId) -> Option<Duration> {
        self.contexts.get(&id).map(|h| h.spawned_at.elapsed())
    }

    fn admit(&mut self, id: ContextId, message: ContextMessage, events: &mut Vec<ContextEvent>) {
        if self.contexts.contains_key(&id) {
            events.push(ContextEvent::Message { id, message });
        } else {
            tracing::warn!(context_id = %id, "dropping message from unregistered context");
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for (_, handle) in self.contexts.drain() {
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ArtifactKind, RenderRequest};
    use crate::context::OutboxSender;
    use std::sync::mpsc::Receiver as HostReceiver;

    /// A context that never signals readiness and never replies.
    struct SilentRuntime;

    impl ContextRuntime for SilentRuntime {
        fn run(
            self: Box<Self>,
            _id: ContextId,
            inbox: HostReceiver<HostMessage>,
            _outbox: OutboxSender,
        ) {
            while let Ok(message) = inbox.recv() {
                if matches!(message, HostMessage::Shutdown) {
                    break;
                }
            }
        }
    }

    fn render_request(code: &str) -> HostMessage {
        HostMessage::RenderArtifact {
            payload: RenderRequest {
                code: code.into(),
                kind: ArtifactKind::Markup,
                artifact_id: "a-1".into(),
            },
        }
    }

    #[test]
    fn spawn_ready_render_complete() {
        let mut executor = Executor::new();
        let id = executor.spawn(Bootstrap::builtin());

        executor
            .wait_ready(id, Duration::from_secs(5))
            .expect("handshake");

        executor.send(id, render_request("<p>hi</p>")).unwrap();

        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            executor.poll(&mut events, Some(Duration::from_millis(20)));
            if !events.is_empty() || Instant::now() > deadline {
                break;
            }
        }

        match &events[0] {
            ContextEvent::Message {
                id: from,
                message: ContextMessage::RenderComplete { payload, success },
            } => {
                assert_eq!(*from, id);
                assert!(*success);
                assert!(payload.contains("<p>hi</p>"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn handshake_timeout_rejects_without_retry() {
        let mut executor = Executor::new();
        let id = executor.spawn_with_runtime(SilentRuntime);

        let err = executor
            .wait_ready(id, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(from, _) if from == id));

        // Still registered; the caller decides what happens next.
        assert!(executor.contains(id));
        executor.destroy(id);
        assert!(!executor.contains(id));
    }

    #[test]
    fn late_message_after_destroy_is_dropped() {
        let mut executor = Executor::new();
        let id = executor.spawn(Bootstrap::builtin());
        executor.wait_ready(id, Duration::from_secs(5)).unwrap();

        executor.send(id, render_request("<p>late</p>")).unwrap();
        // Destroy before draining; the completion may still be in flight.
        executor.destroy(id);

        let mut events = Vec::new();
        executor.poll(&mut events, Some(Duration::from_millis(100)));
        assert!(
            events.is_empty(),
            "reply from a destroyed context must not be dispatched"
        );
    }

    #[test]
    fn send_to_unknown_context_fails() {
        let mut executor = Executor::new();
        let err = executor
            .send(ContextId(99), HostMessage::Shutdown)
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownContext(_)));
    }

    #[test]
    fn wait_ready_buffers_unrelated_messages() {
        let mut executor = Executor::new();
        let first = executor.spawn(Bootstrap::builtin());
        executor.wait_ready(first, Duration::from_secs(5)).unwrap();
        executor.send(first, render_request("<p>one</p>")).unwrap();

        // Handshake a second context while the first one's completion is in
        // flight; that completion must not be lost.
        let second = executor.spawn(Bootstrap::builtin());
        executor.wait_ready(second, Duration::from_secs(5)).unwrap();

        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut saw_completion = false;
        while Instant::now() < deadline && !saw_completion {
            executor.poll(&mut events, Some(Duration::from_millis(20)));
            saw_completion = events.iter().any(|event| {
                matches!(
                    event,
                    ContextEvent::Message {
                        id,
                        message: ContextMessage::RenderComplete { .. },
                    } if *id == first
                )
            });
        }
        assert!(saw_completion);
    }

    #[test]
    fn context_id_display() {
        assert_eq!(format!("{}", ContextId(7)), "Context(7)");
    }
}
