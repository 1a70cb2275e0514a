//! Per-artifact renderer state machine.
//!
//! Each artifact gets one renderer. A renderer leases a context, waits for
//! its readiness handshake under a watchdog, then feeds it one render at a
//! time. Renders arriving before the context is ready queue up, bounded;
//! when the renderer becomes ready only the newest queued render is played,
//! older ones are superseded.
//!
//! Initialization retries with doubling backoff up to an attempt budget.
//! A renderer that exhausts the budget parks in the failed phase: it still
//! answers (with errors) instead of wedging callers.
//!
//! This type holds no channels and performs no I/O. The engine drives it and
//! acts on the [`TickAction`]s it returns, which keeps every transition
//! testable with a paused clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use renderbox_sandbox::{ArtifactKind, ContextId};

use crate::config::RendererConfig;
use crate::perf::SpanId;

/// A render waiting for its context to become ready.
#[derive(Debug)]
pub struct QueuedRender {
    pub code: String,
    pub kind: ArtifactKind,
    pub cache_key: u64,
}

/// A render dispatched to a context, awaiting its result.
#[derive(Debug)]
pub struct InFlight {
    pub cache_key: u64,
    pub kind: ArtifactKind,
    pub deadline: Instant,
    pub span: Option<SpanId>,
    pub started: Instant,
}

/// Renderer lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No context leased yet.
    AwaitingContext,
    /// Context leased, readiness handshake pending.
    AwaitingReady { deadline: Instant, attempt: u32 },
    /// Previous handshake attempt timed out, cooling down before retry.
    Backoff { until: Instant, attempt: u32 },
    Ready,
    /// Initialization budget exhausted. Terminal.
    Failed,
}

/// What the engine must do after a clock tick.
#[derive(Debug, PartialEq, Eq)]
pub enum TickAction {
    None,
    /// Lease a context and call [`ArtifactRenderer::attach_context`].
    AcquireContext,
    /// Destroy the current context; the renderer is backing off.
    RetryInit { attempt: u32 },
    /// Initialization failed for good. Flush pending work with errors.
    FailInit { attempts: u32 },
    /// The in-flight render missed its deadline.
    TimeoutRender,
}

pub struct ArtifactRenderer {
    artifact_id: String,
    context: Option<ContextId>,
    phase: Phase,
    pending: VecDeque<QueuedRender>,
    in_flight: Option<InFlight>,
    queue_capacity: usize,
}

impl ArtifactRenderer {
    pub fn new(artifact_id: impl Into<String>, config: &RendererConfig) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            context: None,
            phase: Phase::AwaitingContext,
            pending: VecDeque::new(),
            in_flight: None,
            queue_capacity: config.pending_queue_capacity.max(1),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Ready or permanently failed. Either way the renderer answers promptly.
    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Failed)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending_renders(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    /// Queue a render for when the context becomes ready. Oldest entries are
    /// dropped once the queue is full; the newest request always survives.
    pub fn enqueue(&mut self, render: QueuedRender) {
        self.pending.push_back(render);
        while self.pending.len() > self.queue_capacity {
            self.pending.pop_front();
            tracing::warn!(
                artifact_id = %self.artifact_id,
                capacity = self.queue_capacity,
                "pending queue full, dropped oldest render"
            );
        }
    }

    /// Drain the queue, keeping only the newest render. Anything older has
    /// been superseded and would paint a stale document.
    pub fn take_newest_pending(&mut self) -> Option<QueuedRender> {
        let superseded = self.pending.len().saturating_sub(1);
        if superseded > 0 {
            tracing::debug!(
                artifact_id = %self.artifact_id,
                superseded,
                "superseded stale pending renders"
            );
        }
        let newest = self.pending.pop_back();
        self.pending.clear();
        newest
    }

    /// Drain everything queued, for error flushes.
    pub fn drain_pending(&mut self) -> Vec<QueuedRender> {
        self.pending.drain(..).collect()
    }

    /// Adopt a freshly leased context and start the handshake clock.
    pub fn attach_context(&mut self, id: ContextId, now: Instant, config: &RendererConfig) {
        let attempt = match self.phase {
            Phase::AwaitingReady { attempt, .. } | Phase::Backoff { attempt, .. } => attempt + 1,
            _ => 1,
        };
        self.context = Some(id);
        self.phase = Phase::AwaitingReady {
            deadline: now + config.init_timeout,
            attempt,
        };
        tracing::debug!(
            artifact_id = %self.artifact_id,
            context = %id,
            attempt,
            "context attached, awaiting readiness"
        );
    }

    /// Record the readiness handshake.
    pub fn mark_ready(&mut self) {
        self.phase = Phase::Ready;
    }

    pub fn begin(&mut self, in_flight: InFlight) {
        self.in_flight = Some(in_flight);
    }

    pub fn finish(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }

    /// Drop the context after a render timeout and start over.
    pub fn reset_context(&mut self) -> Option<ContextId> {
        self.phase = Phase::AwaitingContext;
        self.context.take()
    }

    /// Advance deadlines. At most one action is due per tick.
    pub fn tick(&mut self, now: Instant, config: &RendererConfig) -> TickAction {
        if let Some(in_flight) = &self.in_flight {
            if now >= in_flight.deadline {
                return TickAction::TimeoutRender;
            }
        }

        match self.phase {
            Phase::AwaitingContext if !self.pending.is_empty() => TickAction::AcquireContext,
            Phase::AwaitingReady { deadline, attempt } if now >= deadline => {
                if attempt >= config.init_max_attempts {
                    self.phase = Phase::Failed;
                    self.context = None;
                    tracing::error!(
                        artifact_id = %self.artifact_id,
                        attempts = attempt,
                        "context never became ready, giving up"
                    );
                    TickAction::FailInit { attempts: attempt }
                } else {
                    let backoff = config.init_backoff * 2u32.saturating_pow(attempt - 1);
                    self.phase = Phase::Backoff {
                        until: now + backoff,
                        attempt,
                    };
                    self.context = None;
                    tracing::warn!(
                        artifact_id = %self.artifact_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "readiness handshake timed out, backing off"
                    );
                    TickAction::RetryInit { attempt }
                }
            }
            // Phase stays Backoff so the attempt counter survives until a
            // context is actually attached; acquisition may fail and retry.
            Phase::Backoff { until, .. } if now >= until => TickAction::AcquireContext,
            _ => TickAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RendererConfig {
        RendererConfig::default()
    }

    fn render(cache_key: u64) -> QueuedRender {
        QueuedRender {
            code: format!("content-{cache_key}"),
            kind: ArtifactKind::Markup,
            cache_key,
        }
    }

    #[test]
    fn queue_drops_oldest_at_capacity() {
        let mut config = config();
        config.pending_queue_capacity = 3;
        let mut r = ArtifactRenderer::new("a", &config);
        for i in 0..5 {
            r.enqueue(render(i));
        }
        assert_eq!(r.pending_renders(), 3);
        // Oldest two were dropped.
        let drained = r.drain_pending();
        assert_eq!(drained[0].cache_key, 2);
        assert_eq!(drained[2].cache_key, 4);
    }

    #[test]
    fn newest_pending_wins() {
        let mut r = ArtifactRenderer::new("a", &config());
        r.enqueue(render(1));
        r.enqueue(render(2));
        r.enqueue(render(3));
        let newest = r.take_newest_pending().unwrap();
        assert_eq!(newest.cache_key, 3);
        assert_eq!(r.pending_renders(), 0);
    }

    #[test]
    fn tick_requests_context_only_with_pending_work() {
        let mut r = ArtifactRenderer::new("a", &config());
        let now = Instant::now();
        assert_eq!(r.tick(now, &config()), TickAction::None);
        r.enqueue(render(1));
        assert_eq!(r.tick(now, &config()), TickAction::AcquireContext);
    }

    #[test]
    fn handshake_timeout_backs_off_then_retries() {
        let config = config();
        let mut r = ArtifactRenderer::new("a", &config);
        let now = Instant::now();
        r.attach_context(ContextId(1), now, &config);
        assert!(!r.is_initialized());

        let after_deadline = now + config.init_timeout + Duration::from_millis(1);
        assert_eq!(
            r.tick(after_deadline, &config),
            TickAction::RetryInit { attempt: 1 }
        );
        assert!(r.context().is_none());

        // Still cooling down.
        assert_eq!(r.tick(after_deadline, &config), TickAction::None);

        let after_backoff = after_deadline + config.init_backoff + Duration::from_millis(1);
        assert_eq!(r.tick(after_backoff, &config), TickAction::AcquireContext);

        // Second attempt carries the incremented counter.
        r.attach_context(ContextId(2), after_backoff, &config);
        assert!(matches!(
            r.phase(),
            Phase::AwaitingReady { attempt: 2, .. }
        ));
    }

    #[test]
    fn attempt_budget_exhaustion_is_terminal() {
        let mut config = config();
        config.init_max_attempts = 2;
        let mut r = ArtifactRenderer::new("a", &config);
        let mut now = Instant::now();

        r.attach_context(ContextId(1), now, &config);
        now += config.init_timeout + Duration::from_millis(1);
        assert_eq!(r.tick(now, &config), TickAction::RetryInit { attempt: 1 });

        now += config.init_backoff * 2;
        assert_eq!(r.tick(now, &config), TickAction::AcquireContext);
        r.attach_context(ContextId(2), now, &config);

        now += config.init_timeout + Duration::from_millis(1);
        assert_eq!(r.tick(now, &config), TickAction::FailInit { attempts: 2 });
        assert_eq!(r.phase(), Phase::Failed);
        assert!(r.is_initialized());

        // Terminal: no further actions ever.
        now += Duration::from_secs(3600);
        assert_eq!(r.tick(now, &config), TickAction::None);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let mut cfg = config();
        cfg.init_max_attempts = 3;
        let mut r = ArtifactRenderer::new("a", &cfg);
        let mut now = Instant::now();

        r.attach_context(ContextId(1), now, &cfg);
        now += cfg.init_timeout;
        r.tick(now, &cfg);

        // First backoff is the base; not yet elapsed at base/2.
        assert_eq!(r.tick(now + cfg.init_backoff / 2, &cfg), TickAction::None);
        now += cfg.init_backoff;
        assert_eq!(r.tick(now, &cfg), TickAction::AcquireContext);
        r.attach_context(ContextId(2), now, &cfg);

        now += cfg.init_timeout;
        assert_eq!(r.tick(now, &cfg), TickAction::RetryInit { attempt: 2 });
        // Second backoff is doubled; base alone is not enough.
        assert_eq!(r.tick(now + cfg.init_backoff, &cfg), TickAction::None);
        assert_eq!(
            r.tick(now + cfg.init_backoff * 2, &cfg),
            TickAction::AcquireContext
        );
    }

    #[test]
    fn in_flight_deadline_times_out() {
        let config = config();
        let mut r = ArtifactRenderer::new("a", &config);
        let now = Instant::now();
        r.attach_context(ContextId(1), now, &config);
        r.mark_ready();
        r.begin(InFlight {
            cache_key: 42,
            kind: ArtifactKind::Markup,
            deadline: now + config.render_timeout,
            span: None,
            started: now,
        });

        assert_eq!(r.tick(now, &config), TickAction::None);
        assert_eq!(
            r.tick(now + config.render_timeout, &config),
            TickAction::TimeoutRender
        );

        let in_flight = r.finish().unwrap();
        assert_eq!(in_flight.cache_key, 42);
        assert!(r.reset_context().is_some());
        assert_eq!(r.phase(), Phase::AwaitingContext);
    }
}
