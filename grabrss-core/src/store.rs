use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::job::{JobRecord, JobStatus, StatusKind};

/// link -> record, for one feed.
pub type FeedJobs = HashMap<String, JobRecord>;

/// feed name -> link -> record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStore {
    feeds: HashMap<String, FeedJobs>,
}

/// Counts from one end-of-poll sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub obsoleted: usize,
    pub purged: usize,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_feeds(feeds: HashMap<String, FeedJobs>) -> Self {
        Self { feeds }
    }

    pub fn contains_feed(&self, feed: &str) -> bool {
        self.feeds.contains_key(feed)
    }

    pub fn feed(&self, feed: &str) -> Option<&FeedJobs> {
        self.feeds.get(feed)
    }

    /// The feed's map, created empty on first use.
    pub fn feed_mut(&mut self, feed: &str) -> &mut FeedJobs {
        self.feeds.entry(feed.to_string()).or_default()
    }

    pub fn get(&self, feed: &str, link: &str) -> Option<&JobRecord> {
        self.feeds.get(feed).and_then(|jobs| jobs.get(link))
    }

    pub fn insert(&mut self, feed: &str, link: impl Into<String>, record: JobRecord) {
        self.feed_mut(feed).insert(link.into(), record);
    }

    pub fn feed_names(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.feeds.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when any feed holds a downloaded record with this title
    /// (compared case-insensitively).
    pub fn is_duplicate_title(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.feeds.values().flat_map(HashMap::values).any(|job| {
            job.status.kind == StatusKind::Downloaded && job.title.to_lowercase() == title
        })
    }

    /// End-of-poll bookkeeping: good/bad matches not seen in this poll become
    /// obsolete, and obsolete records older than `retention` are dropped.
    pub fn sweep_feed(
        &mut self,
        feed: &str,
        seen: &HashSet<String>,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Sweep {
        let Some(jobs) = self.feeds.get_mut(feed) else {
            return Sweep::default();
        };
        let mut sweep = Sweep::default();

        for (link, job) in jobs.iter_mut() {
            if !seen.contains(link) && job.status.is_match() {
                job.status = job.status.obsoleted();
                sweep.obsoleted += 1;
            }
        }

        let before = jobs.len();
        jobs.retain(|link, job| {
            let expired =
                job.status.kind == StatusKind::Obsolete && job.age_exceeds(now, retention);
            if expired {
                debug!(link = %link, "purging link");
            }
            !expired
        });
        sweep.purged = before - jobs.len();
        sweep
    }

    /// Marks every record of `feed` whose url equals `id` as downloaded.
    pub fn flag_downloaded(&mut self, feed: &str, id: &str) -> usize {
        let Some(jobs) = self.feeds.get_mut(feed) else {
            return 0;
        };
        let mut flagged = 0;
        for job in jobs.values_mut() {
            if job.url.as_deref() == Some(id) {
                job.status = JobStatus::downloaded();
                flagged += 1;
            }
        }
        flagged
    }

    pub fn remove_feed(&mut self, feed: &str) -> bool {
        self.feeds.remove(feed).is_some()
    }

    /// Records of one feed in feed order.
    pub fn sorted_records(&self, feed: &str) -> Vec<(String, JobRecord)> {
        let mut records: Vec<(String, JobRecord)> = self
            .feeds
            .get(feed)
            .map(|jobs| jobs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(&b.0)));
        records
    }
}
