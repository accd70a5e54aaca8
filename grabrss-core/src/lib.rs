pub mod classify;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feed;
pub mod filter;
pub mod job;
pub mod persist;
pub mod resolver;
pub mod sanitize;
pub mod scheduler;
pub mod store;

pub use classify::{PollOutcome, RunOptions};
pub use config::{
    shared_config, EngineSettings, FeedConfig, FilterRule, MatchMode, RssConfig, SharedConfig,
};
pub use dispatch::{
    CategoryMapper, Collaborators, DownloadQueue, DownloadRequest, LogDownloadQueue, LogNotifier,
    Notifier, TableCategoryMapper,
};
pub use engine::RssEngine;
pub use error::{FetchError, PersistError, PollError, SchedulerError};
pub use feed::{Entry, EntryLink, FeedResult, FeedSource, HttpFeedSource};
pub use job::{JobRecord, JobStatus, Priority, StatusKind};
pub use persist::{JobPersistence, JsonFilePersistence};
pub use scheduler::{run_cycle, spawn_scheduler, CycleOutcome, SchedulerConfig, SchedulerHandle};
pub use store::JobStore;
