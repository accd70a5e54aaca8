use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::classify::{classify, PollContext, PollOutcome, RunOptions};
use crate::config::SharedConfig;
use crate::dispatch::Collaborators;
use crate::error::{PersistError, PollError};
use crate::feed::FeedSource;
use crate::filter::{compile_rules, FeedDefaults};
use crate::job::JobRecord;
use crate::persist::JobPersistence;
use crate::resolver::prepare_uri;
use crate::store::JobStore;

/// Owns the job store and runs polls against it.
///
/// Every operation takes the store lock once; fetching happens before the
/// lock is taken.
pub struct RssEngine {
    config: SharedConfig,
    source: Arc<dyn FeedSource>,
    collaborators: Collaborators,
    persistence: Arc<dyn JobPersistence>,
    store: Mutex<JobStore>,
    shutdown: AtomicBool,
    paused: AtomicBool,
    cycle_running: AtomicBool,
}

/// Held while a scheduler cycle runs; releases the slot on drop.
pub(crate) struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl RssEngine {
    /// Builds an engine, restoring whatever the persistence layer has saved.
    pub async fn new(
        config: SharedConfig,
        source: Arc<dyn FeedSource>,
        collaborators: Collaborators,
        persistence: Arc<dyn JobPersistence>,
    ) -> Self {
        let store = persistence.load().await.unwrap_or_default();
        debug!(records = store.len(), "RSS job store loaded");
        Self {
            config,
            source,
            collaborators,
            persistence,
            store: Mutex::new(store),
            shutdown: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cycle_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Polls one configured feed and classifies its entries.
    pub async fn run_feed(
        &self,
        feed: &str,
        options: RunOptions,
    ) -> Result<PollOutcome, PollError> {
        let (feed_config, settings) = {
            let config = self.config.read().await;
            let feed_config = config
                .feeds
                .get(feed)
                .cloned()
                .ok_or_else(|| PollError::ConfigNotFound {
                    feed: feed.to_string(),
                })?;
            (feed_config, config.settings.clone())
        };

        let uri = prepare_uri(&feed_config.uri);
        debug!(feed = %feed, uri = %uri, "running feed");
        let result = match self.source.fetch(&uri).await {
            Ok(result) => result,
            Err(err) => {
                info!(feed = %feed, uri = %uri, error = %err, "failed to retrieve RSS");
                return Err(PollError::SourceUnreachable {
                    uri,
                    reason: err.to_string(),
                });
            }
        };
        if result.entries.is_empty() {
            info!(feed = %feed, uri = %uri, "RSS feed was empty");
            return Err(match result.bozo_error {
                Some(reason) => PollError::SourceUnreachable { uri, reason },
                None => PollError::EmptyFeed { uri },
            });
        }

        let rules = compile_rules(&feed_config.filters);
        let defaults = FeedDefaults::from(&feed_config);
        let ctx = PollContext {
            feed,
            uri: &uri,
            rules: &rules,
            defaults: &defaults,
            options,
            no_dupes: settings.no_dupes,
            email: settings.email_rss,
            retention: settings.retention(),
            now: Utc::now(),
            collaborators: &self.collaborators,
            shutdown: &self.shutdown,
        };

        let mut store = self.store.lock().await;
        classify(&mut store, &result.entries, &ctx)
    }

    /// Tracked records of `feed` in feed order.
    pub async fn show_result(&self, feed: &str) -> Vec<(String, JobRecord)> {
        self.store.lock().await.sorted_records(feed)
    }

    /// Marks the records whose url (link or message id) is `id` as downloaded.
    pub async fn flag_downloaded(&self, feed: &str, id: &str) -> usize {
        self.store.lock().await.flag_downloaded(feed, id)
    }

    pub async fn delete_feed(&self, feed: &str) -> bool {
        self.store.lock().await.remove_feed(feed)
    }

    /// Forgets the feed so its next poll starts fresh.
    pub async fn clear_feed(&self, feed: &str) -> bool {
        self.store.lock().await.remove_feed(feed)
    }

    pub async fn save(&self) -> Result<(), PersistError> {
        let store = self.store.lock().await;
        self.persistence.save(&store).await
    }

    /// Copy of the whole store.
    pub async fn snapshot(&self) -> JobStore {
        self.store.lock().await.clone()
    }

    /// Asks running polls and cycles to stop at their next check.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub async fn enabled_feeds(&self) -> Vec<String> {
        self.config.read().await.enabled_feeds()
    }

    /// Claims the single cycle slot, `None` when a cycle already runs.
    pub(crate) fn begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                flag: &self.cycle_running,
            })
    }
}
