//! Context pool.
//!
//! Bounds how many contexts exist at once and tracks which renderer holds
//! which. A context is either idle or leased to exactly one renderer; it is
//! never shared. Released contexts return to the idle set for reuse, which
//! skips the spawn and handshake cost on the next lease.

use std::collections::HashSet;
use std::time::Duration;

use renderbox_sandbox::{Bootstrap, ContextId, ContextRuntime, Executor, PaintRuntime};

use crate::config::RendererConfig;

/// Builds the runtime a fresh context thread runs. The production factory
/// yields [`PaintRuntime`]; tests swap in runtimes that never answer or
/// hang up early.
pub type RuntimeFactory = Box<dyn Fn(Bootstrap) -> Box<dyn ContextRuntime>>;

fn paint_runtime(bootstrap: Bootstrap) -> Box<dyn ContextRuntime> {
    Box::new(PaintRuntime::new(bootstrap))
}

/// A leased context. `ready` tells the renderer whether the readiness
/// handshake already happened (idle reuse) or still has to be awaited
/// (fresh spawn).
#[derive(Debug, Clone, Copy)]
pub struct Lease {
    pub id: ContextId,
    pub ready: bool,
}

pub struct ContextPool {
    max_size: usize,
    handshake_timeout: Duration,
    idle: Vec<ContextId>,
    in_use: HashSet<ContextId>,
    runtime: RuntimeFactory,
}

impl ContextPool {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            max_size: config.pool_max_size.max(1),
            handshake_timeout: config.handshake_timeout,
            idle: Vec::new(),
            in_use: HashSet::new(),
            runtime: Box::new(paint_runtime),
        }
    }

    /// Replace the runtime every fresh spawn gets.
    pub fn set_runtime(&mut self, runtime: RuntimeFactory) {
        self.runtime = runtime;
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn total(&self) -> usize {
        self.idle.len() + self.in_use.len()
    }

    /// Lease a context, preferring a warmed idle one, spawning a fresh one
    /// under the cap. Returns `None` when every slot is leased; the caller
    /// stays queued and retries on a later tick.
    pub fn acquire(&mut self, executor: &mut Executor, bootstrap: &Bootstrap) -> Option<Lease> {
        while let Some(id) = self.idle.pop() {
            // An idle context may have died since release.
            if executor.contains(id) {
                self.in_use.insert(id);
                tracing::debug!(context = %id, "leased idle context");
                return Some(Lease { id, ready: true });
            }
        }
        if self.total() >= self.max_size {
            tracing::debug!(max = self.max_size, "pool exhausted");
            return None;
        }
        let id = executor.spawn_with_runtime((self.runtime)(bootstrap.clone()));
        self.in_use.insert(id);
        tracing::debug!(context = %id, "spawned fresh context");
        Some(Lease { id, ready: false })
    }

    /// Return a leased context to the idle set.
    pub fn release(&mut self, executor: &mut Executor, id: ContextId) {
        if !self.in_use.remove(&id) {
            return;
        }
        if executor.contains(id) && self.total() < self.max_size {
            self.idle.push(id);
        } else {
            executor.destroy(id);
        }
    }

    /// Destroy a leased context instead of recycling it. Used after render
    /// timeouts and failed handshakes, where the context state is suspect.
    pub fn discard(&mut self, executor: &mut Executor, id: ContextId) {
        self.in_use.remove(&id);
        self.idle.retain(|&i| i != id);
        executor.destroy(id);
    }

    /// Destroy every pooled context, leased or idle.
    pub fn drain(&mut self, executor: &mut Executor) {
        for id in self.idle.drain(..) {
            executor.destroy(id);
        }
        for id in self.in_use.drain() {
            executor.destroy(id);
        }
    }

    /// Spawn and handshake up to `count` contexts ahead of demand, blocking
    /// until each is ready. Returns how many were warmed.
    pub fn warm(&mut self, executor: &mut Executor, bootstrap: &Bootstrap, count: usize) -> usize {
        let mut warmed = 0;
        while warmed < count && self.total() < self.max_size {
            let id = executor.spawn_with_runtime((self.runtime)(bootstrap.clone()));
            match executor.wait_ready(id, self.handshake_timeout) {
                Ok(()) => {
                    self.idle.push(id);
                    warmed += 1;
                }
                Err(e) => {
                    tracing::warn!(context = %id, error = %e, "warm-up handshake failed");
                    executor.destroy(id);
                    break;
                }
            }
        }
        if warmed > 0 {
            tracing::info!(warmed, "preloaded contexts");
        }
        warmed
    }
}
