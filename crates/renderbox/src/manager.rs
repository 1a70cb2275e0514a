//! The rendering engine facade.
//!
//! `RendererManager` owns every moving part: the context executor, the
//! leasing pool, one renderer per live artifact, the render cache and the
//! performance monitor. Callers submit renders and then drive `poll()`;
//! results come back as [`RenderEvent`]s, never via blocking waits.
//!
//! A single poll pass does all periodic work: it routes context messages to
//! their renderers, advances every renderer's deadlines, sweeps the cache
//! and flushes the performance window. There are no background threads on
//! the host side.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use renderbox_sandbox::{
    validate_artifact_id, validate_content, ArtifactKind, Bootstrap, ContextEvent, ContextId,
    ContextMessage, Executor, HostMessage, RenderRequest,
};

use crate::cache::{fingerprint, CacheReport, RenderCache};
use crate::config::RendererConfig;
use crate::detect::{fallback_kind, ContentDetector, SecurityLevel, TypeHint};
use crate::error::{Error, Result};
use crate::events::{RenderEvent, RenderOutcome};
use crate::perf::{Alert, PerfMonitor, PerfReport, PerfStats};
use crate::pool::{ContextPool, RuntimeFactory};
use crate::renderer::{ArtifactRenderer, InFlight, Phase, QueuedRender, TickAction};

/// Point-in-time view of one artifact's renderer.
#[derive(Debug, Clone, Copy)]
pub struct RendererStatus {
    /// Ready to render, or permanently failed. Both answer promptly.
    pub is_initialized: bool,
    pub pending_renders: usize,
    pub has_context: bool,
}

pub struct RendererManager {
    config: RendererConfig,
    bootstrap: Bootstrap,
    executor: Executor,
    pool: ContextPool,
    cache: RenderCache,
    monitor: PerfMonitor,
    detector: Option<ContentDetector>,
    renderers: HashMap<String, ArtifactRenderer>,
    by_context: HashMap<ContextId, String>,
    poll_buf: Vec<ContextEvent>,
}

impl RendererManager {
    pub fn new(config: RendererConfig) -> Result<Self> {
        let bootstrap = Bootstrap::load(config.bootstrap_path.as_deref())?;
        Ok(Self {
            pool: ContextPool::new(&config),
            cache: RenderCache::new(&config),
            monitor: PerfMonitor::new(&config),
            config,
            bootstrap,
            executor: Executor::new(),
            detector: Some(ContentDetector::new()),
            renderers: HashMap::new(),
            by_context: HashMap::new(),
            poll_buf: Vec::new(),
        })
    }

    /// Replace the content detector. `None` falls back to the fixed
    /// signature chain.
    pub fn set_detector(&mut self, detector: Option<ContentDetector>) {
        self.detector = detector;
    }

    /// Replace the runtime every fresh context runs. Tests use this to stand
    /// up contexts that stay silent or hang up early.
    pub fn set_runtime_factory(&mut self, runtime: RuntimeFactory) {
        self.pool.set_runtime(runtime);
    }

    /// Submit a render. Returns an event immediately when the answer is
    /// already known (cache hit, failed renderer, invalid input as `Err`);
    /// otherwise the render proceeds asynchronously and its conclusion
    /// arrives from [`poll`](Self::poll).
    pub fn render_artifact(
        &mut self,
        artifact_id: &str,
        content: &str,
        hint: TypeHint,
    ) -> Result<Option<RenderEvent>> {
        validate_artifact_id(artifact_id)?;
        validate_content(content, self.config.max_content_bytes)?;

        let kind = self.resolve_kind(content, hint);
        let cache_key = fingerprint(content, kind);

        if let Some(document) = self.cache.get(cache_key) {
            tracing::debug!(artifact_id, kind = kind.as_str(), "cache hit");
            return Ok(Some(RenderEvent::Completed {
                artifact_id: artifact_id.to_string(),
                document,
                outcome: RenderOutcome::success(Duration::ZERO, true),
            }));
        }

        let renderer = self
            .renderers
            .entry(artifact_id.to_string())
            .or_insert_with(|| ArtifactRenderer::new(artifact_id, &self.config));

        if renderer.phase() == Phase::Failed {
            return Ok(Some(RenderEvent::Failed {
                artifact_id: artifact_id.to_string(),
                outcome: RenderOutcome::failure(
                    Duration::ZERO,
                    Error::InitializationTimeout {
                        attempts: self.config.init_max_attempts,
                    }
                    .to_string(),
                ),
            }));
        }

        let queued = QueuedRender {
            code: content.to_string(),
            kind,
            cache_key,
        };

        if renderer.phase() == Phase::Ready && !renderer.is_busy() {
            if let Some(event) = dispatch(
                &mut self.executor,
                &mut self.pool,
                &mut self.by_context,
                &mut self.monitor,
                &self.config,
                renderer,
                queued,
            ) {
                return Ok(Some(event));
            }
            return Ok(None);
        }

        renderer.enqueue(queued);

        // A renderer with no context yet gets one right away when a slot is
        // free; otherwise it stays queued and retries on later polls.
        if renderer.phase() == Phase::AwaitingContext {
            if let Some(lease) = self.pool.acquire(&mut self.executor, &self.bootstrap) {
                self.by_context.insert(lease.id, artifact_id.to_string());
                renderer.attach_context(lease.id, Instant::now(), &self.config);
                if lease.ready {
                    renderer.mark_ready();
                    if let Some(q) = renderer.take_newest_pending() {
                        if let Some(event) = dispatch(
                            &mut self.executor,
                            &mut self.pool,
                            &mut self.by_context,
                            &mut self.monitor,
                            &self.config,
                            renderer,
                            q,
                        ) {
                            return Ok(Some(event));
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Drive the engine: route context messages, advance deadlines, run
    /// periodic maintenance. Blocks up to `timeout` waiting for the first
    /// context message.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Vec<RenderEvent> {
        let mut out = Vec::new();

        let mut buf = std::mem::take(&mut self.poll_buf);
        self.executor.poll(&mut buf, timeout);
        for event in buf.drain(..) {
            let ContextEvent::Message { id, message } = event;
            self.route(id, message, &mut out);
        }
        self.poll_buf = buf;

        self.tick_renderers(&mut out);

        self.cache.maybe_sweep();
        self.monitor.maybe_flush();
        out
    }

    fn route(&mut self, id: ContextId, message: ContextMessage, out: &mut Vec<RenderEvent>) {
        let Some(artifact_id) = self.by_context.get(&id).cloned() else {
            tracing::warn!(context = %id, "message from context with no renderer");
            return;
        };
        let Some(renderer) = self.renderers.get_mut(&artifact_id) else {
            return;
        };
        // Replies from a context this renderer no longer holds are stale.
        if renderer.context() != Some(id) {
            tracing::warn!(context = %id, %artifact_id, "dropping reply from stale context");
            return;
        }

        match message {
            ContextMessage::RendererReady => {
                renderer.mark_ready();
                tracing::info!(%artifact_id, context = %id, "renderer ready");
                if let Some(queued) = renderer.take_newest_pending() {
                    if let Some(event) = dispatch(
                        &mut self.executor,
                        &mut self.pool,
                        &mut self.by_context,
                        &mut self.monitor,
                        &self.config,
                        renderer,
                        queued,
                    ) {
                        out.push(event);
                    }
                }
            }
            ContextMessage::RenderComplete { payload, success } => {
                let Some(in_flight) = renderer.finish() else {
                    tracing::warn!(%artifact_id, "completion with no render in flight");
                    return;
                };
                self.monitor.end_measurement(in_flight.span);
                let duration = in_flight.started.elapsed();
                if success {
                    self.cache.insert(in_flight.cache_key, payload.clone());
                    out.push(RenderEvent::Completed {
                        artifact_id: artifact_id.clone(),
                        document: payload,
                        outcome: RenderOutcome::success(duration, false),
                    });
                } else {
                    out.push(RenderEvent::Failed {
                        artifact_id: artifact_id.clone(),
                        outcome: RenderOutcome::failure(duration, "render reported failure"),
                    });
                }
                self.dispatch_next(&artifact_id, out);
            }
            ContextMessage::RenderError { error } => {
                let Some(in_flight) = renderer.finish() else {
                    tracing::warn!(%artifact_id, %error, "error with no render in flight");
                    return;
                };
                // Failed renders are measured too; only teardown paths
                // discard an open span.
                self.monitor.end_measurement(in_flight.span);
                out.push(RenderEvent::Failed {
                    artifact_id: artifact_id.clone(),
                    outcome: RenderOutcome::failure(in_flight.started.elapsed(), error),
                });
                self.dispatch_next(&artifact_id, out);
            }
        }
    }

    /// Start the next queued render for an idle, ready renderer.
    fn dispatch_next(&mut self, artifact_id: &str, out: &mut Vec<RenderEvent>) {
        let Some(renderer) = self.renderers.get_mut(artifact_id) else {
            return;
        };
        if renderer.phase() != Phase::Ready || renderer.is_busy() {
            return;
        }
        if let Some(queued) = renderer.take_newest_pending() {
            if let Some(event) = dispatch(
                &mut self.executor,
                &mut self.pool,
                &mut self.by_context,
                &mut self.monitor,
                &self.config,
                renderer,
                queued,
            ) {
                out.push(event);
            }
        }
    }

    fn tick_renderers(&mut self, out: &mut Vec<RenderEvent>) {
        let now = Instant::now();
        let ids: Vec<String> = self.renderers.keys().cloned().collect();
        for artifact_id in ids {
            let Some(renderer) = self.renderers.get_mut(&artifact_id) else {
                continue;
            };
            let held = renderer.context();
            match renderer.tick(now, &self.config) {
                TickAction::None => {}
                TickAction::AcquireContext => {
                    if let Some(lease) = self.pool.acquire(&mut self.executor, &self.bootstrap) {
                        self.by_context.insert(lease.id, artifact_id.clone());
                        renderer.attach_context(lease.id, now, &self.config);
                        if lease.ready {
                            renderer.mark_ready();
                            if let Some(queued) = renderer.take_newest_pending() {
                                if let Some(event) = dispatch(
                                    &mut self.executor,
                                    &mut self.pool,
                                    &mut self.by_context,
                                    &mut self.monitor,
                                    &self.config,
                                    renderer,
                                    queued,
                                ) {
                                    out.push(event);
                                }
                            }
                        }
                    }
                }
                TickAction::RetryInit { .. } => {
                    if let Some(id) = held {
                        self.by_context.remove(&id);
                        self.pool.discard(&mut self.executor, id);
                    }
                }
                TickAction::FailInit { attempts } => {
                    if let Some(id) = held {
                        self.by_context.remove(&id);
                        self.pool.discard(&mut self.executor, id);
                    }
                    let dropped = renderer.drain_pending();
                    tracing::error!(
                        %artifact_id,
                        attempts,
                        dropped = dropped.len(),
                        "renderer initialization failed"
                    );
                    out.push(RenderEvent::Failed {
                        artifact_id: artifact_id.clone(),
                        outcome: RenderOutcome::failure(
                            Duration::ZERO,
                            Error::InitializationTimeout { attempts }.to_string(),
                        ),
                    });
                }
                TickAction::TimeoutRender => {
                    let Some(in_flight) = renderer.finish() else {
                        continue;
                    };
                    self.monitor.end_measurement(in_flight.span);
                    if let Some(id) = renderer.reset_context() {
                        self.by_context.remove(&id);
                        self.pool.discard(&mut self.executor, id);
                    }
                    let error = Error::RenderTimeout {
                        artifact_id: artifact_id.clone(),
                        timeout: self.config.render_timeout,
                    };
                    tracing::warn!(%artifact_id, "render timed out, context destroyed");
                    out.push(RenderEvent::Failed {
                        artifact_id: artifact_id.clone(),
                        outcome: RenderOutcome::failure(
                            in_flight.started.elapsed(),
                            error.to_string(),
                        ),
                    });
                }
            }
        }
    }

    fn resolve_kind(&self, content: &str, hint: TypeHint) -> ArtifactKind {
        match hint {
            TypeHint::Declared(kind) => kind,
            TypeHint::Auto => match &self.detector {
                Some(detector) => {
                    let classification = detector.analyze(content);
                    if classification.security.level == SecurityLevel::Dangerous {
                        tracing::warn!(
                            issues = ?classification.security.issues,
                            "rendering content with dangerous constructs, sanitizer will strip them"
                        );
                    }
                    tracing::debug!(
                        kind = classification.kind.as_str(),
                        confidence = classification.confidence,
                        features = ?classification.features,
                        "classified content"
                    );
                    classification.kind
                }
                None => fallback_kind(content),
            },
        }
    }

    /// Warm up to `count` contexts ahead of demand. Blocks through each
    /// readiness handshake; returns how many contexts were warmed.
    pub fn preload(&mut self, count: usize) -> usize {
        self.pool.warm(&mut self.executor, &self.bootstrap, count)
    }

    pub fn status(&self, artifact_id: &str) -> Option<RendererStatus> {
        self.renderers.get(artifact_id).map(|r| RendererStatus {
            is_initialized: r.is_initialized(),
            pending_renders: r.pending_renders(),
            has_context: r.context().is_some(),
        })
    }

    /// Tear down an artifact's renderer and recycle its context.
    pub fn release_artifact(&mut self, artifact_id: &str) {
        let Some(mut renderer) = self.renderers.remove(artifact_id) else {
            return;
        };
        if let Some(id) = renderer.context() {
            self.by_context.remove(&id);
            // A context mid-render is suspect; only clean ones are recycled.
            if renderer.finish().is_some() {
                self.pool.discard(&mut self.executor, id);
            } else {
                self.pool.release(&mut self.executor, id);
            }
        }
        tracing::debug!(artifact_id, "released artifact");
    }

    /// Destroy an artifact's context and reinitialize from scratch, keeping
    /// nothing but the artifact id.
    pub fn restart(&mut self, artifact_id: &str) {
        if let Some(renderer) = self.renderers.get_mut(artifact_id) {
            if let Some(in_flight) = renderer.finish() {
                self.monitor.cancel(in_flight.span);
            }
            if let Some(id) = renderer.reset_context() {
                self.by_context.remove(&id);
                self.pool.discard(&mut self.executor, id);
            }
            *renderer = ArtifactRenderer::new(artifact_id, &self.config);
            tracing::info!(artifact_id, "renderer restarted");
        }
    }

    pub fn cache_report(&self) -> CacheReport {
        self.cache.report()
    }

    pub fn perf_stats(&self) -> PerfStats {
        self.monitor.get_stats()
    }

    pub fn perf_report(&self) -> PerfReport {
        self.monitor.get_report()
    }

    pub fn take_alerts(&mut self) -> Vec<Alert> {
        self.monitor.take_alerts()
    }

    pub fn active_contexts(&self) -> usize {
        self.executor.active_count()
    }

    /// Persist the cache and tear down every context.
    pub fn cleanup(&mut self) -> Result<()> {
        self.cache.persist()?;
        let ids: Vec<String> = self.renderers.keys().cloned().collect();
        for artifact_id in ids {
            self.release_artifact(&artifact_id);
        }
        self.pool.drain(&mut self.executor);
        self.monitor.flush();
        self.monitor.destroy();
        Ok(())
    }
}

/// Send a queued render to the renderer's context. Returns a failure event
/// when the send itself fails; the dead context is destroyed and its pool
/// slot freed.
fn dispatch(
    executor: &mut Executor,
    pool: &mut ContextPool,
    by_context: &mut HashMap<ContextId, String>,
    monitor: &mut PerfMonitor,
    config: &RendererConfig,
    renderer: &mut ArtifactRenderer,
    queued: QueuedRender,
) -> Option<RenderEvent> {
    let artifact_id = renderer.artifact_id().to_string();
    let context = renderer.context()?;
    let content_length = queued.code.len();
    let kind = queued.kind;

    let message = HostMessage::RenderArtifact {
        payload: RenderRequest {
            code: queued.code,
            kind,
            artifact_id: artifact_id.clone(),
        },
    };
    if let Err(e) = executor.send(context, message) {
        let err: Error = e.into();
        tracing::error!(%artifact_id, context = %context, error = %err, "dispatch failed");
        if let Some(stale) = renderer.reset_context() {
            by_context.remove(&stale);
            pool.discard(executor, stale);
        }
        return Some(RenderEvent::Failed {
            artifact_id,
            outcome: RenderOutcome::failure(Duration::ZERO, err.to_string()),
        });
    }

    let now = Instant::now();
    let span = monitor.start_measurement(
        "artifact-render",
        vec![
            ("type", kind.as_str().to_string()),
            ("contentLength", content_length.to_string()),
            ("artifactId", artifact_id.clone()),
        ],
    );
    renderer.begin(InFlight {
        cache_key: queued.cache_key,
        kind,
        deadline: now + config.render_timeout,
        span,
        started: now,
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc::Receiver;

    use renderbox_sandbox::{ContextRuntime, OutboxSender};

    fn manager() -> RendererManager {
        RendererManager::new(RendererConfig::default()).unwrap()
    }

    /// Never answers the readiness handshake.
    struct SilentRuntime;

    impl ContextRuntime for SilentRuntime {
        fn run(
            self: Box<Self>,
            _id: ContextId,
            inbox: Receiver<HostMessage>,
            _outbox: OutboxSender,
        ) {
            while let Ok(message) = inbox.recv() {
                if matches!(message, HostMessage::Shutdown) {
                    break;
                }
            }
        }
    }

    /// Signals readiness after closing its inbox, so every later send to it
    /// fails at the channel.
    struct VanishingRuntime;

    impl ContextRuntime for VanishingRuntime {
        fn run(
            self: Box<Self>,
            id: ContextId,
            inbox: Receiver<HostMessage>,
            outbox: OutboxSender,
        ) {
            drop(inbox);
            let _ = outbox.send((id, ContextMessage::RendererReady));
        }
    }

    /// Handshakes normally but reports every render as an error.
    struct ErroringRuntime;

    impl ContextRuntime for ErroringRuntime {
        fn run(
            self: Box<Self>,
            id: ContextId,
            inbox: Receiver<HostMessage>,
            outbox: OutboxSender,
        ) {
            if outbox.send((id, ContextMessage::RendererReady)).is_err() {
                return;
            }
            while let Ok(message) = inbox.recv() {
                match message {
                    HostMessage::RenderArtifact { .. } => {
                        let reply = ContextMessage::RenderError {
                            error: "paint refused".to_string(),
                        };
                        if outbox.send((id, reply)).is_err() {
                            break;
                        }
                    }
                    HostMessage::Shutdown => break,
                }
            }
        }
    }

    fn poll_until_event(m: &mut RendererManager) -> Vec<RenderEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let events = m.poll(Some(Duration::from_millis(20)));
            if !events.is_empty() {
                return events;
            }
        }
        panic!("no render event before deadline");
    }

    #[test]
    fn render_completes_and_caches() {
        let mut m = manager();
        let first = m
            .render_artifact("a-1", "<p>hello</p>", TypeHint::Auto)
            .unwrap();
        assert!(first.is_none());

        let events = poll_until_event(&mut m);
        match &events[0] {
            RenderEvent::Completed {
                artifact_id,
                document,
                outcome,
            } => {
                assert_eq!(artifact_id, "a-1");
                assert!(document.contains("<p>hello</p>"));
                assert!(!outcome.from_cache);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Identical content answers from cache without touching a context.
        let second = m
            .render_artifact("a-1", "<p>hello</p>", TypeHint::Auto)
            .unwrap()
            .expect("cache hit should answer synchronously");
        match second {
            RenderEvent::Completed { outcome, .. } => assert!(outcome.from_cache),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn invalid_content_is_rejected_before_any_context_work() {
        let mut m = manager();
        let err = m.render_artifact("a-1", "", TypeHint::Auto).unwrap_err();
        assert!(matches!(err, Error::ContentValidation(_)));
        assert_eq!(m.active_contexts(), 0);
        assert!(m.status("a-1").is_none());
    }

    #[test]
    fn empty_artifact_id_is_rejected() {
        let mut m = manager();
        let err = m.render_artifact("", "<p>x</p>", TypeHint::Auto).unwrap_err();
        assert!(matches!(err, Error::ContentValidation(_)));
    }

    #[test]
    fn newest_submission_wins_while_context_initializes() {
        let mut m = manager();
        // All three land before the readiness handshake is observed; only
        // the newest may actually render.
        for i in 1..=3 {
            let r = m
                .render_artifact("a-1", &format!("<p>v{i}</p>"), TypeHint::Auto)
                .unwrap();
            assert!(r.is_none());
        }

        let events = poll_until_event(&mut m);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RenderEvent::Completed { document, .. } => {
                assert!(document.contains("<p>v3</p>"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let status = m.status("a-1").unwrap();
        assert_eq!(status.pending_renders, 0);
        assert!(status.is_initialized);
    }

    #[test]
    fn declared_type_bypasses_detection() {
        let mut m = manager();
        // Markup-looking content rendered as a code listing.
        m.render_artifact("a-1", "<p>hi</p>", TypeHint::Declared(ArtifactKind::Code))
            .unwrap();
        let events = poll_until_event(&mut m);
        match &events[0] {
            RenderEvent::Completed { document, .. } => {
                assert!(document.contains("&lt;p&gt;"), "markup must be escaped, got {document}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn distinct_artifacts_get_distinct_contexts() {
        let mut m = manager();
        m.render_artifact("a-1", "<p>one</p>", TypeHint::Auto).unwrap();
        m.render_artifact("a-2", "<p>two</p>", TypeHint::Auto).unwrap();

        let mut seen = std::collections::HashSet::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.len() < 2 && Instant::now() < deadline {
            for event in m.poll(Some(Duration::from_millis(20))) {
                seen.insert(event.artifact_id().to_string());
            }
        }
        assert!(seen.contains("a-1") && seen.contains("a-2"));
        assert_eq!(m.active_contexts(), 2);

        let c1 = m.renderers.get("a-1").unwrap().context();
        let c2 = m.renderers.get("a-2").unwrap().context();
        assert_ne!(c1, c2);
    }

    #[test]
    fn release_recycles_the_context() {
        let mut m = manager();
        m.render_artifact("a-1", "<p>one</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);
        assert_eq!(m.active_contexts(), 1);

        m.release_artifact("a-1");
        assert!(m.status("a-1").is_none());
        // Context survives in the idle pool for the next artifact.
        assert_eq!(m.active_contexts(), 1);

        m.render_artifact("a-2", "<p>two</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);
        assert_eq!(m.active_contexts(), 1);
    }

    #[test]
    fn preload_warms_contexts() {
        let mut m = manager();
        assert_eq!(m.preload(2), 2);
        assert_eq!(m.active_contexts(), 2);

        // A warmed context answers without a fresh handshake.
        m.render_artifact("a-1", "<p>warm</p>", TypeHint::Auto).unwrap();
        let status = m.status("a-1").unwrap();
        assert!(status.is_initialized);
    }

    #[test]
    fn perf_stats_accumulate() {
        let mut m = manager();
        m.render_artifact("a-1", "<p>x</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);
        assert_eq!(m.perf_stats().count, 1);
    }

    #[test]
    fn failed_dispatch_frees_the_pool_slot() {
        let mut m = RendererManager::new(RendererConfig::new().pool_max_size(1)).unwrap();
        m.set_runtime_factory(Box::new(|_| Box::new(VanishingRuntime)));

        m.render_artifact("a-1", "<p>one</p>", TypeHint::Auto).unwrap();
        let events = poll_until_event(&mut m);
        assert!(matches!(events[0], RenderEvent::Failed { .. }));
        assert_eq!(m.active_contexts(), 0);
        assert_eq!(m.pool.total(), 0);

        // With the only slot reclaimed, another artifact can still lease a
        // context; a leaked slot would starve it forever.
        m.render_artifact("a-2", "<p>two</p>", TypeHint::Auto).unwrap();
        let status = m.status("a-2").unwrap();
        assert!(status.has_context);
        let events = poll_until_event(&mut m);
        assert!(matches!(events[0], RenderEvent::Failed { .. }));
        assert_eq!(m.pool.total(), 0);
    }

    #[test]
    fn init_failure_reports_exactly_one_terminal_event() {
        let mut config = RendererConfig::new()
            .pool_max_size(1)
            .init_timeout(Duration::from_millis(40))
            .init_max_attempts(2);
        config.init_backoff = Duration::from_millis(10);
        let mut m = RendererManager::new(config).unwrap();
        m.set_runtime_factory(Box::new(|_| Box::new(SilentRuntime)));

        for i in 1..=2 {
            let r = m
                .render_artifact("a-1", &format!("<p>v{i}</p>"), TypeHint::Auto)
                .unwrap();
            assert!(r.is_none());
        }

        // Both attempts time out; then a little longer to catch duplicates.
        let mut failures = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            failures.extend(m.poll(Some(Duration::from_millis(10))));
        }
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            RenderEvent::Failed { artifact_id, outcome } => {
                assert_eq!(artifact_id, "a-1");
                let error = outcome.error.as_deref().unwrap();
                assert!(error.contains("did not initialize"), "got {error}");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let status = m.status("a-1").unwrap();
        assert!(status.is_initialized);
        assert_eq!(status.pending_renders, 0);
        assert!(!status.has_context);
        assert_eq!(m.active_contexts(), 0);

        // Later submissions answer promptly with the same failure.
        let replay = m
            .render_artifact("a-1", "<p>again</p>", TypeHint::Auto)
            .unwrap();
        assert!(matches!(replay, Some(RenderEvent::Failed { .. })));
    }

    #[test]
    fn render_errors_still_record_a_measurement() {
        let mut m = manager();
        m.set_runtime_factory(Box::new(|_| Box::new(ErroringRuntime)));

        m.render_artifact("a-1", "<p>x</p>", TypeHint::Auto).unwrap();
        let events = poll_until_event(&mut m);
        match &events[0] {
            RenderEvent::Failed { outcome, .. } => {
                assert_eq!(outcome.error.as_deref(), Some("paint refused"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(m.perf_stats().count, 1);
    }

    #[test]
    fn render_spans_share_one_name() {
        let mut m = manager();
        m.render_artifact("a-1", "<p>x</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);
        m.render_artifact("a-2", "<p>y</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);

        assert_eq!(m.monitor.get_stats_for("artifact-render").count, 2);
        assert_eq!(m.monitor.get_stats_for("a-1").count, 0);
    }

    #[test]
    fn cleanup_tears_everything_down() {
        let mut m = manager();
        m.render_artifact("a-1", "<p>x</p>", TypeHint::Auto).unwrap();
        poll_until_event(&mut m);
        m.cleanup().unwrap();
        assert!(m.status("a-1").is_none());
        assert_eq!(m.active_contexts(), 0);
    }
}
