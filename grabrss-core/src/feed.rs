use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchError;

pub const USER_AGENT: &str = concat!("GrabRSS/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryLink {
    pub href: String,
}

impl EntryLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// One announcement as produced by the feed parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub title: String,
    pub link: Option<String>,
    pub links: Vec<EntryLink>,
    pub enclosures: Vec<EntryLink>,
    pub category: Option<String>,
    /// Free-text category some indexers publish next to the plain one.
    pub cattext: Option<String>,
}

impl Entry {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            title: title.into(),
            links: vec![EntryLink::new(link.clone())],
            link: Some(link),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_enclosure(mut self, href: impl Into<String>) -> Self {
        self.enclosures.push(EntryLink::new(href));
        self
    }

    pub fn from_rss_item(item: &rss::Item) -> Self {
        let link = item.link().map(ToOwned::to_owned);

        // Category from categories or Dublin Core subject
        let category = item
            .categories()
            .first()
            .map(|cat| cat.name().to_string())
            .or_else(|| {
                item.dublin_core_ext()
                    .and_then(|dc| dc.subjects().first().map(|s| s.to_string()))
            });

        Self {
            title: item.title().unwrap_or_default().to_owned(),
            links: link.iter().cloned().map(EntryLink::new).collect(),
            link,
            enclosures: item
                .enclosure()
                .map(|enc| vec![EntryLink::new(enc.url())])
                .unwrap_or_default(),
            category,
            cattext: None,
        }
    }

    pub fn from_atom_entry(entry: &atom_syndication::Entry) -> Self {
        let link = entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|l| l.href().to_string());

        let category = entry.categories().first().map(|cat| {
            cat.label()
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| cat.term().to_owned())
        });

        Self {
            title: entry.title().value.clone(),
            link,
            links: entry
                .links()
                .iter()
                .filter(|l| l.rel() != "enclosure")
                .map(|l| EntryLink::new(l.href()))
                .collect(),
            enclosures: entry
                .links()
                .iter()
                .filter(|l| l.rel() == "enclosure")
                .map(|l| EntryLink::new(l.href()))
                .collect(),
            category,
            cattext: None,
        }
    }
}

/// Parsed feed. `bozo_error` is set when the parser recovered from a
/// malformed document; with no entries that counts as a failed fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedResult {
    pub entries: Vec<Entry>,
    pub bozo_error: Option<String>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<FeedResult, FetchError>;
}

/// Fetches over HTTP and parses RSS 2.0, falling back to Atom.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, uri: &str) -> Result<FeedResult, FetchError> {
        let response = self.client.get(uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

pub fn parse_feed(bytes: &[u8]) -> Result<FeedResult, FetchError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(FeedResult {
            entries: channel.items().iter().map(Entry::from_rss_item).collect(),
            bozo_error: None,
        }),
        Err(rss_err) => {
            debug!(error = %rss_err, "not an RSS document, trying Atom");
            match atom_syndication::Feed::read_from(bytes) {
                Ok(feed) => Ok(FeedResult {
                    entries: feed.entries().iter().map(Entry::from_atom_entry).collect(),
                    bozo_error: None,
                }),
                Err(_) => Err(FetchError::from(rss_err)),
            }
        }
    }
}
