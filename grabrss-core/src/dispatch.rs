//! Boundaries to the download queue, category table and notifier.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::job::Priority;

/// Options passed along with every download hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub pp: Option<String>,
    pub script: Option<String>,
    pub category: Option<String>,
    pub priority: Priority,
    /// Job name; `None` lets the queue derive one (used for sources whose
    /// titles are unusable as names).
    pub display_name: Option<String>,
}

pub trait DownloadQueue: Send + Sync {
    /// Queue an item known to the indexer by message id.
    fn enqueue_by_id(&self, id: &str, request: DownloadRequest);
    /// Queue an item by URL.
    fn enqueue_by_link(&self, link: &str, request: DownloadRequest);
}

pub trait CategoryMapper: Send + Sync {
    /// Maps a feed-supplied category onto a local one.
    fn map_category(&self, raw: &str) -> Option<String>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, feed: &str, titles: &[String]);
}

/// The collaborators a poll hands its results to.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn DownloadQueue>,
    pub categories: Arc<dyn CategoryMapper>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        queue: Arc<dyn DownloadQueue>,
        categories: Arc<dyn CategoryMapper>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            queue,
            categories,
            notifier,
        }
    }

    /// Log-only queue and notifier with the given category table.
    pub fn logging(categories: &HashMap<String, String>) -> Self {
        Self::new(
            Arc::new(LogDownloadQueue),
            Arc::new(TableCategoryMapper::new(categories)),
            Arc::new(LogNotifier),
        )
    }
}

/// Case-insensitive lookup table, usually built from the config's
/// `categories` section.
#[derive(Debug, Clone, Default)]
pub struct TableCategoryMapper {
    table: HashMap<String, String>,
}

impl TableCategoryMapper {
    pub fn new(table: &HashMap<String, String>) -> Self {
        Self::from_pairs(table.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            table: pairs
                .into_iter()
                .map(|(external, local)| (external.trim().to_lowercase(), local.to_string()))
                .collect(),
        }
    }
}

impl CategoryMapper for TableCategoryMapper {
    fn map_category(&self, raw: &str) -> Option<String> {
        self.table.get(&raw.trim().to_lowercase()).cloned()
    }
}

/// Queue that only records hand-offs in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDownloadQueue;

impl DownloadQueue for LogDownloadQueue {
    fn enqueue_by_id(&self, id: &str, request: DownloadRequest) {
        info!(
            msgid = %id,
            cat = ?request.category,
            pp = ?request.pp,
            script = ?request.script,
            priority = ?request.priority,
            name = ?request.display_name,
            "enqueue by message id"
        );
    }

    fn enqueue_by_link(&self, link: &str, request: DownloadRequest) {
        info!(
            url = %link,
            cat = ?request.category,
            pp = ?request.pp,
            script = ?request.script,
            priority = ?request.priority,
            name = ?request.display_name,
            "enqueue by url"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, feed: &str, titles: &[String]) {
        info!(feed = %feed, count = titles.len(), titles = ?titles, "new RSS downloads");
    }
}
