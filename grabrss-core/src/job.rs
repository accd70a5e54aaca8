use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue priority handed to the download dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "i64", into = "i64")]
pub enum Priority {
    /// Use whatever the download queue considers its default.
    Default,
    Paused,
    Low,
    #[default]
    Normal,
    High,
    Force,
}

impl TryFrom<i64> for Priority {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -100 => Ok(Priority::Default),
            -2 => Ok(Priority::Paused),
            -1 => Ok(Priority::Low),
            0 => Ok(Priority::Normal),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Force),
            other => Err(format!("unknown priority {other}")),
        }
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Default => -100,
            Priority::Paused => -2,
            Priority::Low => -1,
            Priority::Normal => 0,
            Priority::High => 1,
            Priority::Force => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Downloaded,
    GoodMatch,
    BadMatch,
    Obsolete,
}

impl StatusKind {
    fn code(self) -> char {
        match self {
            StatusKind::Downloaded => 'D',
            StatusKind::GoodMatch => 'G',
            StatusKind::BadMatch => 'B',
            StatusKind::Obsolete => 'X',
        }
    }
}

/// Lifecycle state of a tracked link. `first_batch` marks links seen on the
/// first scan of a feed that were deliberately not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobStatus {
    pub kind: StatusKind,
    pub first_batch: bool,
}

impl JobStatus {
    pub fn downloaded() -> Self {
        Self {
            kind: StatusKind::Downloaded,
            first_batch: false,
        }
    }

    pub fn good(first_batch: bool) -> Self {
        Self {
            kind: StatusKind::GoodMatch,
            first_batch,
        }
    }

    pub fn bad(first_batch: bool) -> Self {
        Self {
            kind: StatusKind::BadMatch,
            first_batch,
        }
    }

    /// Obsolete keeps the marker of the status it replaces.
    pub fn obsoleted(self) -> Self {
        Self {
            kind: StatusKind::Obsolete,
            first_batch: self.first_batch,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self.kind, StatusKind::GoodMatch | StatusKind::BadMatch)
    }

    /// Good and bad matches (starred or not) are re-run through the filters
    /// when a later poll sees them again; downloads and obsoletes are final.
    pub fn is_reclassifiable(&self) -> bool {
        self.is_match()
    }

    pub fn parse(code: &str) -> Option<Self> {
        let (head, first_batch) = match code.strip_suffix('*') {
            Some(head) => (head, true),
            None => (code, false),
        };
        let kind = match head {
            "D" => StatusKind::Downloaded,
            "G" => StatusKind::GoodMatch,
            "B" => StatusKind::BadMatch,
            "X" => StatusKind::Obsolete,
            _ => return None,
        };
        let first_batch = first_batch && kind != StatusKind::Downloaded;
        Some(Self { kind, first_batch })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.code())?;
        if self.first_batch {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobStatus::parse(&value).ok_or_else(|| format!("unknown job status {value:?}"))
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.to_string()
    }
}

/// Classification and lifecycle state for one link of one feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub status: JobStatus,
    pub title: String,
    /// The link, or the message id for sources that expose one.
    pub url: Option<String>,
    #[serde(rename = "cat")]
    pub category: Option<String>,
    pub pp: Option<String>,
    pub script: Option<String>,
    #[serde(rename = "prio")]
    pub priority: Priority,
    #[serde(default)]
    pub order: usize,
    #[serde(with = "epoch_seconds")]
    pub time: DateTime<Utc>,
}

impl JobRecord {
    pub fn age_exceeds(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.time > window
    }
}

/// Timestamps are stored as float seconds since the epoch.
pub mod epoch_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_secs(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_secs(secs).ok_or_else(|| de::Error::custom(format!("timestamp out of range: {secs}")))
    }

    pub fn to_secs(time: &DateTime<Utc>) -> f64 {
        time.timestamp_millis() as f64 / 1000.0
    }

    pub fn from_secs(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()
    }
}
