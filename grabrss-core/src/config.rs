use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::PersistError;
use crate::job::Priority;

/// How a filter rule's pattern is applied to an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchMode {
    /// Pattern must match the entry's category (falls back to the title when
    /// the entry has none).
    #[serde(rename = "C")]
    CategoryMatch,
    /// Title must match, otherwise the entry is rejected.
    #[serde(rename = "M")]
    Must,
    #[serde(rename = "A")]
    Accept,
    #[serde(rename = "R")]
    Reject,
}

type RawFilterRule = (String, String, String, MatchMode, String);

/// One ordered classification directive. Stored on disk as
/// `[cat, pp, script, mode, pattern]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawFilterRule", into = "RawFilterRule")]
pub struct FilterRule {
    pub category: String,
    pub pp: String,
    pub script: String,
    pub mode: MatchMode,
    pub pattern: String,
}

impl FilterRule {
    pub fn new(mode: MatchMode, pattern: impl Into<String>) -> Self {
        Self {
            category: String::new(),
            pp: String::new(),
            script: String::new(),
            mode,
            pattern: pattern.into(),
        }
    }

    pub fn with_overrides(
        mut self,
        category: impl Into<String>,
        pp: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        self.category = category.into();
        self.pp = pp.into();
        self.script = script.into();
        self
    }
}

impl From<RawFilterRule> for FilterRule {
    fn from((category, pp, script, mode, pattern): RawFilterRule) -> Self {
        Self {
            category,
            pp,
            script,
            mode,
            pattern,
        }
    }
}

impl From<FilterRule> for RawFilterRule {
    fn from(rule: FilterRule) -> Self {
        (rule.category, rule.pp, rule.script, rule.mode, rule.pattern)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    pub uri: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub pp: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
}

impl FeedConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            category: String::new(),
            pp: String::new(),
            script: String::new(),
            priority: Priority::default(),
            enabled: true,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<FilterRule>) -> Self {
        self.filters = filters;
        self
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Skip entries whose title was already downloaded from any feed.
    pub no_dupes: bool,
    /// Send one notification per poll listing newly queued titles.
    pub email_rss: bool,
    pub interval_minutes: u64,
    pub feed_pause_secs: u64,
    /// Days an obsolete record is kept. Zero, negative or oversized values
    /// fall back to the default.
    #[serde(deserialize_with = "retention_days_or_default")]
    pub retention_days: u32,
}

const DEFAULT_RETENTION_DAYS: u32 = 28;

impl EngineSettings {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::try_days(i64::from(self.retention_days))
            .filter(|window| *window > chrono::Duration::zero())
            .unwrap_or_else(|| {
                warn!(days = self.retention_days, "invalid retention window, using default");
                chrono::Duration::days(i64::from(DEFAULT_RETENTION_DAYS))
            })
    }
}

fn retention_days_or_default<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let days = i64::deserialize(deserializer)?;
    match u32::try_from(days) {
        Ok(days) if days > 0 => Ok(days),
        _ => {
            warn!(days, "invalid retention_days in config, using default");
            Ok(DEFAULT_RETENTION_DAYS)
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            no_dupes: false,
            email_rss: false,
            interval_minutes: 60,
            feed_pause_secs: 30,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RssConfig {
    pub feeds: BTreeMap<String, FeedConfig>,
    pub settings: EngineSettings,
    /// External category name (lower-case) -> local category.
    pub categories: HashMap<String, String>,
}

impl RssConfig {
    /// Loads the configuration, or returns defaults when the file is missing
    /// or unreadable.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read_file(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    error = %err,
                    path = %path.display(),
                    "failed to load config, using defaults"
                );
                Self::default()
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn add_feed(&mut self, name: impl Into<String>, feed: FeedConfig) {
        self.feeds.insert(name.into(), feed);
    }

    /// All configured feed URIs, in feed-name order.
    pub fn uris(&self) -> Vec<String> {
        self.feeds.values().map(|feed| feed.uri.clone()).collect()
    }

    pub fn enabled_feeds(&self) -> Vec<String> {
        self.feeds
            .iter()
            .filter(|(_, feed)| feed.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

pub type SharedConfig = Arc<RwLock<RssConfig>>;

pub fn shared_config(initial: RssConfig) -> SharedConfig {
    Arc::new(RwLock::new(initial))
}
