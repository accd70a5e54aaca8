//! One feed poll: every entry is resolved, filtered and recorded against the
//! job store, then the feed's leftovers are swept.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::dispatch::{Collaborators, DownloadRequest};
use crate::error::PollError;
use crate::feed::Entry;
use crate::filter::{evaluate, CompiledRule, FeedDefaults, Resolved};
use crate::job::{JobRecord, JobStatus};
use crate::resolver::{is_odd_title_source, message_id, resolve_link, Incompatible};
use crate::sanitize::{normalize_text, sanitize_foldername};
use crate::store::JobStore;

/// Flags for a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Hand accepted entries to the download queue.
    pub download: bool,
    /// On a feed's very first poll, only remember entries (starred) and
    /// never download them.
    pub ignore_first: bool,
    /// Download accepted entries even when they carry the first-batch marker.
    pub force: bool,
}

impl RunOptions {
    /// What the scheduler uses.
    pub fn scheduled() -> Self {
        Self {
            download: true,
            ignore_first: true,
            force: false,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::scheduled()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Titles handed to the download queue, in feed order.
    pub new_downloads: Vec<String>,
    pub entries_seen: usize,
}

/// Everything a poll needs besides the store and the entries.
pub struct PollContext<'a> {
    pub feed: &'a str,
    /// The URI the entries were fetched from.
    pub uri: &'a str,
    pub rules: &'a [CompiledRule],
    pub defaults: &'a FeedDefaults,
    pub options: RunOptions,
    pub no_dupes: bool,
    pub email: bool,
    pub retention: Duration,
    pub now: DateTime<Utc>,
    pub collaborators: &'a Collaborators,
    pub shutdown: &'a AtomicBool,
}

/// Classifies `entries` into the store.
///
/// Records written before an `IncompatibleEntry` error or a cancellation are
/// kept; the end-of-poll sweep and the notification only happen when every
/// entry was processed.
pub fn classify(
    store: &mut JobStore,
    entries: &[Entry],
    ctx: &PollContext<'_>,
) -> Result<PollOutcome, PollError> {
    let first = !store.contains_feed(ctx.feed) && ctx.options.ignore_first;
    store.feed_mut(ctx.feed);

    let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());
    let mut outcome = PollOutcome::default();

    for (order, entry) in entries.iter().enumerate() {
        if ctx.shutdown.load(Ordering::Acquire) {
            info!(feed = %ctx.feed, "shutdown requested, poll abandoned");
            return Err(PollError::Cancelled);
        }
        outcome.entries_seen += 1;

        let resolved = match resolve_link(ctx.uri, entry) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => continue,
            Err(Incompatible) => {
                warn!(feed = %ctx.feed, uri = %ctx.uri, "incompatible feed");
                return Err(PollError::IncompatibleEntry {
                    uri: ctx.uri.to_string(),
                });
            }
        };
        let link = resolved.link;
        let category = resolved
            .category
            .map(|c| normalize_text(&c))
            .filter(|c| !c.is_empty());
        let title = normalize_text(&entry.title);
        seen.insert(link.clone());

        if ctx.no_dupes && store.is_duplicate_title(&title) {
            info!(title = %title, "skipping duplicate RSS entry");
            continue;
        }

        let existing = store.get(ctx.feed, &link).map(|job| job.status);
        if let Some(status) = existing.filter(|s| !s.is_reclassifiable()) {
            // downloads and obsoletes keep their verdict
            debug!(link = %link, status = %status, "keeping previous result");
            if let Some(job) = store.feed_mut(ctx.feed).get_mut(&link) {
                job.order = order;
            }
            continue;
        }

        debug!(title = %title, "trying title");
        let evaluation = evaluate(
            ctx.rules,
            &title,
            category.as_deref(),
            ctx.defaults,
            ctx.collaborators.categories.as_ref(),
        );

        let marked = existing.is_some_and(|s| s.first_batch);
        let act = ctx.options.download && !first && (!marked || ctx.options.force);
        let star = first || marked;

        let status = match (evaluation.accepted, act) {
            (true, true) => JobStatus::downloaded(),
            (true, false) => JobStatus::good(star),
            (false, _) => JobStatus::bad(star),
        };
        let msgid = message_id(&link);

        if status == JobStatus::downloaded() {
            info!(title = %title, feed = %ctx.feed, "adding RSS entry to queue");
            dispatch(ctx, &link, msgid.as_deref(), &title, &evaluation.resolved);
            outcome.new_downloads.push(title.clone());
        }

        let Resolved {
            category,
            pp,
            script,
        } = evaluation.resolved;
        store.insert(
            ctx.feed,
            link.clone(),
            JobRecord {
                status,
                title,
                url: Some(msgid.unwrap_or(link)),
                category,
                pp: pp.filter(|v| !v.is_empty()),
                script: script.filter(|v| !v.is_empty()),
                priority: ctx.defaults.priority,
                order,
                time: ctx.now,
            },
        );
    }

    let sweep = store.sweep_feed(ctx.feed, &seen, ctx.now, ctx.retention);
    debug!(
        feed = %ctx.feed,
        obsoleted = sweep.obsoleted,
        purged = sweep.purged,
        "feed swept"
    );

    if !outcome.new_downloads.is_empty() && !ctx.options.force && ctx.email {
        ctx.collaborators
            .notifier
            .notify(ctx.feed, &outcome.new_downloads);
    }
    Ok(outcome)
}

fn dispatch(
    ctx: &PollContext<'_>,
    link: &str,
    msgid: Option<&str>,
    title: &str,
    resolved: &Resolved,
) {
    let request = DownloadRequest {
        pp: resolved.pp.clone(),
        script: resolved.script.clone(),
        category: resolved.category.clone(),
        priority: ctx.defaults.priority,
        display_name: if is_odd_title_source(link) {
            None
        } else {
            Some(sanitize_foldername(title))
        },
    };
    let queue = &ctx.collaborators.queue;
    match msgid {
        Some(id) => queue.enqueue_by_id(id, request),
        None => queue.enqueue_by_link(link, request),
    }
}
