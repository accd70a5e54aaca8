use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PersistError;
use crate::job::{epoch_seconds, JobRecord, JobStatus, Priority};
use crate::store::{FeedJobs, JobStore};

pub const RSS_FILE_NAME: &str = "rss_data.json";

/// Where the job store lives between runs.
#[async_trait]
pub trait JobPersistence: Send + Sync {
    /// Previously saved state; `None` when there is none or it is unreadable.
    async fn load(&self) -> Option<JobStore>;
    async fn save(&self, store: &JobStore) -> Result<(), PersistError>;
}

/// JSON file with atomic replace and a `.tmp` fallback on corruption.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(RSS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

pub type RawStore = HashMap<String, HashMap<String, Value>>;

async fn read_raw(path: &Path) -> Option<RawStore> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice::<RawStore>(&bytes) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to parse RSS data");
            None
        }
    }
}

#[async_trait]
impl JobPersistence for JsonFilePersistence {
    async fn load(&self) -> Option<JobStore> {
        let raw = match read_raw(&self.path).await {
            Some(raw) => raw,
            None => {
                let tmp = self.tmp_path();
                debug!(path = %tmp.display(), "trying tmp fallback");
                read_raw(&tmp).await?
            }
        };
        Some(upgrade_store(raw, Utc::now()))
    }

    async fn save(&self, store: &JobStore) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec_pretty(store)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write to tmp, then rename over the target
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Builds a typed store from loosely-typed saved data. Positional records are
/// upgraded, missing or broken timestamps are replaced by `now`, and records
/// that cannot be understood are dropped with a warning.
pub fn upgrade_store(raw: RawStore, now: DateTime<Utc>) -> JobStore {
    let feeds = raw
        .into_iter()
        .map(|(feed, links)| {
            let jobs: FeedJobs = links
                .into_iter()
                .filter_map(|(link, value)| {
                    let record = upgrade_record(&link, value, now)?;
                    Some((link, record))
                })
                .collect();
            (feed, jobs)
        })
        .collect();
    JobStore::from_feeds(feeds)
}

fn upgrade_record(link: &str, value: Value, now: DateTime<Utc>) -> Option<JobRecord> {
    match value {
        Value::Array(items) => upgrade_positional(link, &items, now),
        Value::Object(map) => {
            let status = parse_status(link, map.get("status"))?;
            Some(JobRecord {
                status,
                title: text(map.get("title")).unwrap_or_default(),
                url: text(map.get("url")),
                category: text(map.get("cat")),
                pp: text(map.get("pp")),
                script: text(map.get("script")),
                priority: priority(map.get("prio")),
                order: map.get("order").and_then(Value::as_u64).unwrap_or(0) as usize,
                time: timestamp(link, map.get("time"), now),
            })
        }
        other => {
            warn!(link = %link, value = %other, "dropping unreadable RSS record");
            None
        }
    }
}

/// `[status, title, url, cat, pp, script, time]`
fn upgrade_positional(link: &str, items: &[Value], now: DateTime<Utc>) -> Option<JobRecord> {
    if items.len() < 7 {
        warn!(link = %link, len = items.len(), "dropping short positional RSS record");
        return None;
    }
    let status = parse_status(link, items.first())?;
    Some(JobRecord {
        status,
        title: text(items.get(1)).unwrap_or_default(),
        url: text(items.get(2)),
        category: text(items.get(3)),
        pp: text(items.get(4)),
        script: text(items.get(5)),
        priority: Priority::Normal,
        order: 0,
        time: timestamp(link, items.get(6), now),
    })
}

fn parse_status(link: &str, value: Option<&Value>) -> Option<JobStatus> {
    let status = value.and_then(Value::as_str).and_then(JobStatus::parse);
    if status.is_none() {
        warn!(link = %link, status = ?value, "dropping RSS record with unknown status");
    }
    status
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn priority(value: Option<&Value>) -> Priority {
    number(value)
        .and_then(|n| Priority::try_from(n as i64).ok())
        .unwrap_or_default()
}

fn timestamp(link: &str, value: Option<&Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    match number(value).and_then(epoch_seconds::from_secs) {
        Some(time) => time,
        None => {
            debug!(link = %link, "fixing missing timestamp");
            now
        }
    }
}
