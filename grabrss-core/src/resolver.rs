//! Link and category extraction from feed entries.
//!
//! Indexers disagree on where the downloadable link lives, so the source URI
//! selects the extraction rule.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::warn;
use url::Url;

use crate::feed::{Entry, EntryLink};

static MSGID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"(newz)(bin|xxx)\.com/browse/post/(\d+)")
        .case_insensitive(true)
        .build()
        .expect("message id regex is valid") // Static pattern, safe to panic
});

/// The entry lacks the structure its source's extraction rule needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incompatible;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub link: String,
    /// Raw feed category, `None` when the entry carries none.
    pub category: Option<String>,
}

/// Rewrites a configured feed URI into the one actually fetched.
pub fn prepare_uri(uri: &str) -> String {
    let uri = match uri.strip_prefix("feed://") {
        Some(rest) => format!("http://{rest}"),
        None => uri.to_string(),
    };
    if !uri.contains("nzbs.org/") {
        return uri;
    }
    match Url::parse(&uri) {
        Ok(mut parsed) => {
            if !parsed.query_pairs().any(|(k, v)| k == "dl" && v == "1") {
                parsed.query_pairs_mut().append_pair("dl", "1");
            }
            parsed.to_string()
        }
        Err(_) if !uri.contains("&dl=1") => format!("{uri}&dl=1"),
        Err(_) => uri,
    }
}

fn first_href(links: &[EntryLink]) -> Result<String, Incompatible> {
    links.first().map(|l| l.href.clone()).ok_or(Incompatible)
}

/// Extracts `(link, category)` from an entry.
///
/// Returns `Ok(None)` when the resulting link is unusable (the entry should be
/// skipped) and `Err(Incompatible)` when the entry shape does not fit the
/// source at all.
pub fn resolve_link(
    source_uri: &str,
    entry: &Entry,
) -> Result<Option<ResolvedLink>, Incompatible> {
    let uri = source_uri.to_lowercase();

    let link = if uri.contains("newzbin.com") || uri.contains("newzxxx.com") {
        match &entry.link {
            Some(link) if link.to_lowercase().contains("/post/") => Some(link.clone()),
            _ => Some(first_href(&entry.links)?),
        }
    } else if uri.contains("nzbindex.nl")
        || uri.contains("nzbindex.com")
        || uri.contains("animeusenet.org")
    {
        Some(first_href(&entry.enclosures)?)
    } else if uri.contains("feed.nzbclub.com") {
        let link = entry.link.as_ref().ok_or(Incompatible)?;
        Some(link.replace("nzb_view.aspx", "nzb_download.aspx"))
    } else {
        match entry.link.as_deref() {
            Some(link) if !link.is_empty() => Some(link.to_string()),
            _ => Some(first_href(&entry.links)?),
        }
    };

    match link {
        Some(link) if link.to_lowercase().contains("http") => {
            let category = entry
                .cattext
                .clone()
                .or_else(|| entry.category.clone())
                .filter(|c| !c.is_empty());
            Ok(Some(ResolvedLink {
                link: link.replace(' ', ""),
                category,
            }))
        }
        other => {
            warn!(link = ?other, "empty RSS entry found");
            Ok(None)
        }
    }
}

/// Message id for indexers whose links point at a post page.
pub fn message_id(link: &str) -> Option<String> {
    let caps = MSGID_PATTERN.captures(link)?;
    if caps.get(1)?.as_str().eq_ignore_ascii_case("newz") {
        caps.get(3).map(|m| m.as_str().to_string())
    } else {
        None
    }
}

/// Sources whose titles make poor job names.
pub fn is_odd_title_source(link: &str) -> bool {
    ["nzbindex.nl/", "nzbindex.com/", "nzbclub.com/"]
        .iter()
        .any(|site| link.contains(site))
}
