//! Background driver running both poll cadences and the retry worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};

use crate::Engine;
use crate::poll::Cadence;

/// Cadences for [`Engine::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between continuous passes.
    pub continuous_every: Duration,
    /// Interval between deep-check passes.
    pub deep_check_every: Duration,
    /// Interval between retry passes.
    pub retry_every: Duration,
    /// Continuations allowed back to back after a pass runs out of budget.
    pub max_continuations: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            continuous_every: Duration::from_secs(30),
            deep_check_every: Duration::from_secs(30 * 60),
            retry_every: Duration::from_secs(60),
            max_continuations: 10,
        }
    }
}

/// Handle to a spawned scheduler. Dropping it stops the scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    inner: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop after the pass in flight and wait for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.inner.take() {
            let _ = h.await;
        }
    }

    /// Whether the scheduler task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.inner.take()
            && !h.is_finished()
        {
            h.abort();
        }
    }
}

impl Engine {
    /// Run continuous passes, deep checks and retries on a background task.
    ///
    /// The first continuous pass runs immediately; deep checks and retries
    /// wait one full interval. A pass that runs out of batch budget is
    /// continued right away, up to `max_continuations` times.
    #[must_use = "dropping the handle stops the scheduler"]
    pub fn spawn(self: &Arc<Self>, cfg: SchedulerConfig) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let engine = Arc::clone(self);
        let inner = tokio::spawn(async move {
            let mut continuous = interval(cfg.continuous_every);
            let mut deep = interval_at(Instant::now() + cfg.deep_check_every, cfg.deep_check_every);
            let mut retry = interval_at(Instant::now() + cfg.retry_every, cfg.retry_every);
            for t in [&mut continuous, &mut deep, &mut retry] {
                t.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
            tracing::info!(?cfg, "scheduler started");
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = continuous.tick() => engine.drive(Cadence::Continuous, cfg.max_continuations).await,
                    _ = deep.tick() => engine.drive(Cadence::DeepCheck, cfg.max_continuations).await,
                    _ = retry.tick() => {
                        if let Err(e) = engine.run_retries().await {
                            tracing::error!(error = %e, "retry pass failed");
                        }
                    }
                }
            }
            tracing::info!("scheduler stopped");
        });
        SchedulerHandle {
            inner: Some(inner),
            stop_tx: Some(stop_tx),
        }
    }

    async fn drive(&self, cadence: Cadence, max_continuations: u32) {
        let mut continuations = 0;
        loop {
            let report = match cadence {
                Cadence::Continuous => self.run_continuous().await,
                Cadence::DeepCheck => self.run_deep_check().await,
            };
            match report {
                Ok(r) if r.continuation_needed && continuations < max_continuations => {
                    continuations += 1;
                    tracing::debug!(%cadence, continuations, "running continuation");
                }
                Ok(r) if r.continuation_needed => {
                    tracing::warn!(%cadence, continuations, "continuation limit reached; resuming on next tick");
                    return;
                }
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(%cadence, error = %e, "poll pass failed");
                    return;
                }
            }
        }
    }
}
