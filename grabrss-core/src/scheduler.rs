use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classify::RunOptions;
use crate::config::EngineSettings;
use crate::engine::RssEngine;
use crate::error::{PollError, SchedulerError};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Wait after each feed so sources are not hammered.
    pub feed_pause: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_minutes.max(1) * 60),
            feed_pause: Duration::from_secs(settings.feed_pause_secs),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Paused, or another cycle was still running.
    Skipped,
    Completed { feeds_polled: usize },
    Cancelled { feeds_polled: usize },
}

pub struct SchedulerHandle {
    engine: Arc<RssEngine>,
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler, interrupting a running cycle, and waits for it.
    pub async fn stop(self) -> Result<(), SchedulerError> {
        self.engine.stop();
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(SchedulerError::from)
    }
}

pub fn spawn_scheduler(engine: Arc<RssEngine>, config: SchedulerConfig) -> SchedulerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let task_engine = Arc::clone(&engine);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = run_cycle(&task_engine, config.feed_pause).await;
                    debug!(?outcome, "RSS cycle finished");
                    if matches!(outcome, CycleOutcome::Cancelled { .. }) {
                        break;
                    }
                }
            }
        }
    });

    SchedulerHandle {
        engine,
        cancel_tx,
        join,
    }
}

/// Polls every enabled feed once, pausing `pause` after each, then saves.
pub async fn run_cycle(engine: &RssEngine, pause: Duration) -> CycleOutcome {
    if engine.is_paused() {
        debug!("engine paused, RSS cycle skipped");
        return CycleOutcome::Skipped;
    }
    let Some(_guard) = engine.begin_cycle() else {
        debug!("RSS cycle already running");
        return CycleOutcome::Skipped;
    };

    let mut feeds_polled = 0;
    for feed in engine.enabled_feeds().await {
        if engine.is_shutting_down() {
            return finish(engine, CycleOutcome::Cancelled { feeds_polled }).await;
        }
        let result = engine.run_feed(&feed, RunOptions::scheduled()).await;
        feeds_polled += 1;
        match result {
            Ok(outcome) => {
                debug!(
                    feed = %feed,
                    seen = outcome.entries_seen,
                    queued = outcome.new_downloads.len(),
                    "feed polled"
                );
            }
            Err(PollError::Cancelled) => {
                return finish(engine, CycleOutcome::Cancelled { feeds_polled }).await;
            }
            Err(err) => warn!(feed = %feed, error = %err, "feed poll failed"),
        }
        if !pause_between_feeds(engine, pause).await {
            return finish(engine, CycleOutcome::Cancelled { feeds_polled }).await;
        }
    }

    finish(engine, CycleOutcome::Completed { feeds_polled }).await
}

async fn finish(engine: &RssEngine, outcome: CycleOutcome) -> CycleOutcome {
    let polled = match outcome {
        CycleOutcome::Completed { feeds_polled } | CycleOutcome::Cancelled { feeds_polled } => {
            feeds_polled
        }
        CycleOutcome::Skipped => 0,
    };
    if polled > 0 {
        if let Err(err) = engine.save().await {
            error!(error = %err, "failed to save RSS data");
        }
    }
    outcome
}

/// Sleeps in one-second steps; false when shutdown was requested meanwhile.
async fn pause_between_feeds(engine: &RssEngine, pause: Duration) -> bool {
    let step = Duration::from_secs(1);
    let mut remaining = pause;
    loop {
        if engine.is_shutting_down() {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let nap = remaining.min(step);
        tokio::time::sleep(nap).await;
        remaining -= nap;
    }
}
