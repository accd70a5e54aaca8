#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use grabrss_core::{
    shared_config, CategoryMapper, Collaborators, DownloadQueue, DownloadRequest, Entry, FeedResult,
    FeedSource, FetchError, JobPersistence, JobStore, Notifier, PersistError, RssConfig, RssEngine,
    TableCategoryMapper,
};

/// What a fake URI answers with.
#[derive(Debug, Clone)]
pub enum Canned {
    Entries(Vec<Entry>),
    Bozo(String),
    Status(u16),
}

#[derive(Default)]
pub struct StaticFeedSource {
    feeds: Mutex<HashMap<String, Canned>>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFeedSource {
    pub fn set(&self, uri: &str, canned: Canned) {
        self.feeds.lock().unwrap().insert(uri.to_string(), canned);
    }

    pub fn set_entries(&self, uri: &str, entries: Vec<Entry>) {
        self.set(uri, Canned::Entries(entries));
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self, uri: &str) -> Result<FeedResult, FetchError> {
        self.fetched.lock().unwrap().push(uri.to_string());
        match self.feeds.lock().unwrap().get(uri).cloned() {
            Some(Canned::Entries(entries)) => Ok(FeedResult {
                entries,
                bozo_error: None,
            }),
            Some(Canned::Bozo(reason)) => Ok(FeedResult {
                entries: Vec::new(),
                bozo_error: Some(reason),
            }),
            Some(Canned::Status(code)) => Err(FetchError::Status(code)),
            None => Err(FetchError::Status(404)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    ById(String, DownloadRequest),
    ByLink(String, DownloadRequest),
}

#[derive(Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<Enqueued>>,
}

impl RecordingQueue {
    pub fn calls(&self) -> Vec<Enqueued> {
        self.calls.lock().unwrap().clone()
    }
}

impl DownloadQueue for RecordingQueue {
    fn enqueue_by_id(&self, id: &str, request: DownloadRequest) {
        self.calls.lock().unwrap().push(Enqueued::ById(id.to_string(), request));
    }

    fn enqueue_by_link(&self, link: &str, request: DownloadRequest) {
        self.calls.lock().unwrap().push(Enqueued::ByLink(link.to_string(), request));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, feed: &str, titles: &[String]) {
        self.calls.lock().unwrap().push((feed.to_string(), titles.to_vec()));
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<JobStore>>,
    saves: Mutex<usize>,
}

impl MemoryPersistence {
    pub fn with_store(store: JobStore) -> Self {
        Self {
            saved: Mutex::new(Some(store)),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Option<JobStore> {
        self.saved.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl JobPersistence for MemoryPersistence {
    async fn load(&self) -> Option<JobStore> {
        self.saved.lock().unwrap().clone()
    }

    async fn save(&self, store: &JobStore) -> Result<(), PersistError> {
        *self.saved.lock().unwrap() = Some(store.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<RssEngine>,
    pub source: Arc<StaticFeedSource>,
    pub queue: Arc<RecordingQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub persistence: Arc<MemoryPersistence>,
}

impl Harness {
    pub async fn new(config: RssConfig) -> Self {
        Self::with_persistence(config, MemoryPersistence::default()).await
    }

    pub async fn with_persistence(config: RssConfig, persistence: MemoryPersistence) -> Self {
        let source = Arc::new(StaticFeedSource::default());
        let queue = Arc::new(RecordingQueue::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let persistence = Arc::new(persistence);
        let categories: Arc<dyn CategoryMapper> =
            Arc::new(TableCategoryMapper::new(&config.categories));
        let collaborators = Collaborators::new(queue.clone(), categories, notifier.clone());
        let engine = RssEngine::new(
            shared_config(config),
            source.clone(),
            collaborators,
            persistence.clone(),
        )
        .await;
        Self {
            engine: Arc::new(engine),
            source,
            queue,
            notifier,
            persistence,
        }
    }
}
