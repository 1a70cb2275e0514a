//! Execution context worker.
//!
//! A context is an isolated, capability-restricted runtime: it runs on its
//! own thread with its own single-threaded loop, shares no memory with the
//! host, and coordinates exclusively through message channels. The host side
//! treats it as a managed resource; all the logic here is context-internal.
//!
//! The [`ContextRuntime`] trait is the seam between the executor and the
//! loop body, so tests can stand up contexts that never signal readiness or
//! reply late.

use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::bootstrap::Bootstrap;
use crate::channel::{ContextMessage, HostMessage};
use crate::executor::ContextId;
use crate::paint::paint;

/// The body of a context's loop.
///
/// Implementations own the receiving end of the host channel and report back
/// through `outbox`. The loop ends when the host channel disconnects or a
/// shutdown message arrives.
pub trait ContextRuntime: Send + 'static {
    fn run(self: Box<Self>, id: ContextId, inbox: Receiver<HostMessage>, outbox: OutboxSender);
}

/// Sending half of the context→host event channel.
pub type OutboxSender = Sender<(ContextId, ContextMessage)>;

impl ContextRuntime for Box<dyn ContextRuntime> {
    fn run(self: Box<Self>, id: ContextId, inbox: Receiver<HostMessage>, outbox: OutboxSender) {
        (*self).run(id, inbox, outbox)
    }
}

/// The production runtime: bootstrap, signal readiness, paint on request.
pub struct PaintRuntime {
    bootstrap: Bootstrap,
}

impl PaintRuntime {
    pub fn new(bootstrap: Bootstrap) -> Self {
        Self { bootstrap }
    }
}

impl ContextRuntime for PaintRuntime {
    fn run(self: Box<Self>, id: ContextId, inbox: Receiver<HostMessage>, outbox: OutboxSender) {
        // Readiness handshake: the baseline document is established before
        // any artifact content is accepted.
        if outbox.send((id, ContextMessage::RendererReady)).is_err() {
            return;
        }
        tracing::debug!(context_id = %id, "context ready");

        while let Ok(message) = inbox.recv() {
            match message {
                HostMessage::RenderArtifact { payload } => {
                    let reply = match paint(&payload.code, payload.kind, &self.bootstrap) {
                        Ok(document) => ContextMessage::RenderComplete {
                            payload: document,
                            success: true,
                        },
                        Err(e) => ContextMessage::RenderError {
                            error: e.to_string(),
                        },
                    };
                    if outbox.send((id, reply)).is_err() {
                        break;
                    }
                }
                HostMessage::Shutdown => break,
            }
        }
        tracing::debug!(context_id = %id, "context loop ended");
    }
}

/// Host-side handle to a spawned context.
///
/// The join handle is kept for orderly teardown; dropping the handle after a
/// shutdown message detaches a thread that is already unwinding its loop.
pub struct ContextHandle {
    pub id: ContextId,
    pub(crate) tx: Sender<HostMessage>,
    pub(crate) join: Option<JoinHandle<()>>,
    pub spawned_at: Instant,
}

impl ContextHandle {
    pub(crate) fn shutdown(mut self) {
        // Best effort: the thread may already be gone.
        let _ = self.tx.send(HostMessage::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
