mod common;

use chrono::{Duration, Utc};
use common::{Canned, Enqueued, Harness, MemoryPersistence};
use grabrss_core::{
    DownloadRequest, Entry, FeedConfig, FilterRule, JobRecord, JobStatus, JobStore, MatchMode,
    PollError, Priority, RssConfig, RunOptions,
};

const URI: &str = "http://indexer.test/rss";

fn tv_feed(uri: &str) -> FeedConfig {
    let mut feed =
        FeedConfig::new(uri).with_filters(vec![FilterRule::new(MatchMode::Accept, "foo")]);
    feed.category = "tv".into();
    feed.pp = "3".into();
    feed.script = "notify.py".into();
    feed
}

fn two_feeds() -> RssConfig {
    config(vec![("a", tv_feed("http://a.test/rss")), ("b", tv_feed("http://b.test/rss"))])
}

fn config(feeds: Vec<(&str, FeedConfig)>) -> RssConfig {
    let mut config = RssConfig::default();
    for (name, feed) in feeds {
        config.add_feed(name, feed);
    }
    config
}

fn classify_only() -> RunOptions {
    RunOptions {
        download: false,
        ignore_first: false,
        force: false,
    }
}

fn download_now() -> RunOptions {
    RunOptions {
        download: true,
        ignore_first: false,
        force: false,
    }
}

fn record(status: JobStatus, title: &str, age: Duration) -> JobRecord {
    JobRecord {
        status,
        title: title.into(),
        url: Some(format!("http://indexer.test/{title}")),
        category: None,
        pp: None,
        script: None,
        priority: Priority::Normal,
        order: 0,
        time: Utc::now() - age,
    }
}

#[tokio::test]
async fn accepted_entry_gets_feed_defaults() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo Bar", "http://indexer.test/1")]);

    let outcome = h.engine.run_feed("tv", classify_only()).await.unwrap();
    assert_eq!(outcome.entries_seen, 1);
    assert!(outcome.new_downloads.is_empty());

    let records = h.engine.show_result("tv").await;
    assert_eq!(records.len(), 1);
    let (link, job) = &records[0];
    assert_eq!(link, "http://indexer.test/1");
    assert_eq!(job.status, JobStatus::good(false));
    assert_eq!(job.title, "Foo Bar");
    assert_eq!(job.url.as_deref(), Some("http://indexer.test/1"));
    assert_eq!(job.category.as_deref(), Some("tv"));
    assert_eq!(job.pp.as_deref(), Some("3"));
    assert_eq!(job.script.as_deref(), Some("notify.py"));
    assert_eq!(job.order, 0);
    assert!(h.queue.calls().is_empty());
}

#[tokio::test]
async fn accepted_entry_is_queued_by_link_when_downloading() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo Bar", "http://indexer.test/1")]);

    let outcome = h.engine.run_feed("tv", download_now()).await.unwrap();
    assert_eq!(outcome.new_downloads, vec!["Foo Bar".to_string()]);

    let job = h.engine.snapshot().await.get("tv", "http://indexer.test/1").cloned().unwrap();
    assert_eq!(job.status, JobStatus::downloaded());
    assert_eq!(
        h.queue.calls(),
        vec![Enqueued::ByLink(
            "http://indexer.test/1".into(),
            DownloadRequest {
                pp: Some("3".into()),
                script: Some("notify.py".into()),
                category: Some("tv".into()),
                priority: Priority::Normal,
                display_name: Some("Foo Bar".into()),
            }
        )]
    );
}

#[tokio::test]
async fn first_batch_is_remembered_until_forced() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo Bar", "http://indexer.test/1")]);
    let status = |store: JobStore| store.get("tv", "http://indexer.test/1").map(|j| j.status);

    h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap();
    assert_eq!(status(h.engine.snapshot().await), Some(JobStatus::good(true)));
    assert!(h.queue.calls().is_empty());

    h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap();
    assert_eq!(status(h.engine.snapshot().await), Some(JobStatus::good(true)));
    assert!(h.queue.calls().is_empty());

    let forced = RunOptions {
        force: true,
        ..RunOptions::scheduled()
    };
    let outcome = h.engine.run_feed("tv", forced).await.unwrap();
    assert_eq!(outcome.new_downloads.len(), 1);
    assert_eq!(status(h.engine.snapshot().await), Some(JobStatus::downloaded()));
    assert_eq!(h.queue.calls().len(), 1);
}

#[tokio::test]
async fn rejected_first_batch_entry_is_starred_bad_match() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Other show", "http://indexer.test/2")]);

    h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap();
    let store = h.engine.snapshot().await;
    assert_eq!(store.get("tv", "http://indexer.test/2").unwrap().status.to_string(), "B*");
}

#[tokio::test]
async fn duplicate_titles_are_skipped_across_feeds() {
    let mut cfg = two_feeds();
    cfg.settings.no_dupes = true;
    let h = Harness::new(cfg).await;
    h.source.set_entries("http://a.test/rss", vec![Entry::new("Foo Bar", "http://a.test/1")]);
    h.source.set_entries("http://b.test/rss", vec![Entry::new("FOO  BAR", "http://b.test/9")]);

    h.engine.run_feed("a", download_now()).await.unwrap();
    let outcome = h.engine.run_feed("b", download_now()).await.unwrap();

    assert!(outcome.new_downloads.is_empty());
    assert!(h.engine.show_result("b").await.is_empty());
    assert_eq!(h.queue.calls().len(), 1);
}

#[tokio::test]
async fn duplicates_are_kept_when_suppression_is_off() {
    let h = Harness::new(two_feeds()).await;
    h.source.set_entries("http://a.test/rss", vec![Entry::new("Foo Bar", "http://a.test/1")]);
    h.source.set_entries("http://b.test/rss", vec![Entry::new("Foo Bar", "http://b.test/9")]);

    h.engine.run_feed("a", download_now()).await.unwrap();
    h.engine.run_feed("b", download_now()).await.unwrap();
    assert_eq!(h.queue.calls().len(), 2);
}

#[tokio::test]
async fn unseen_matches_become_obsolete() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(
        URI,
        vec![
            Entry::new("Foo 1", "http://indexer.test/1"),
            Entry::new("Bar 2", "http://indexer.test/2"),
        ],
    );
    h.engine.run_feed("tv", classify_only()).await.unwrap();

    h.source.set_entries(URI, vec![Entry::new("Bar 2", "http://indexer.test/2")]);
    h.engine.run_feed("tv", classify_only()).await.unwrap();

    let store = h.engine.snapshot().await;
    assert_eq!(store.get("tv", "http://indexer.test/1").unwrap().status.to_string(), "X");
    let kept = store.get("tv", "http://indexer.test/2").unwrap();
    assert_eq!(kept.status, JobStatus::bad(false));
    assert_eq!(kept.order, 0);
}

#[tokio::test]
async fn old_obsolete_records_are_purged() {
    let mut seeded = JobStore::new();
    let old = record(JobStatus::good(false).obsoleted(), "old", Duration::days(29));
    let recent = record(JobStatus::good(true).obsoleted(), "recent", Duration::days(27));
    seeded.insert("tv", "old", old);
    seeded.insert("tv", "recent", recent);
    seeded.insert("tv", "done", record(JobStatus::downloaded(), "done", Duration::days(90)));
    seeded.insert("tv", "stale-good", record(JobStatus::good(false), "stale", Duration::days(60)));
    let h = Harness::with_persistence(
        config(vec![("tv", tv_feed(URI))]),
        MemoryPersistence::with_store(seeded),
    )
    .await;
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);

    h.engine.run_feed("tv", classify_only()).await.unwrap();

    let store = h.engine.snapshot().await;
    assert!(store.get("tv", "old").is_none());
    assert_eq!(store.get("tv", "recent").unwrap().status.to_string(), "X*");
    assert!(store.get("tv", "done").is_some());
    // obsoleted in this poll and already past the window
    assert!(store.get("tv", "stale-good").is_none());
}

#[tokio::test]
async fn huge_retention_window_keeps_obsolete_records() {
    let mut seeded = JobStore::new();
    let ancient = record(JobStatus::bad(false).obsoleted(), "ancient", Duration::days(3650));
    seeded.insert("tv", "ancient", ancient);
    let mut cfg = config(vec![("tv", tv_feed(URI))]);
    cfg.settings.retention_days = u32::MAX;
    let h = Harness::with_persistence(cfg, MemoryPersistence::with_store(seeded)).await;
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);

    h.engine.run_feed("tv", classify_only()).await.unwrap();

    let store = h.engine.snapshot().await;
    assert!(store.get("tv", "ancient").is_some());
    assert!(store.get("tv", "http://indexer.test/1").is_some());
}

#[tokio::test]
async fn unknown_feed_is_reported() {
    let h = Harness::new(RssConfig::default()).await;
    let err = h.engine.run_feed("nope", RunOptions::scheduled()).await.unwrap_err();
    assert!(matches!(err, PollError::ConfigNotFound { ref feed } if feed == "nope"));
    assert_eq!(err.to_string(), "no such feed: nope");
    assert!(h.source.fetched().is_empty());
}

#[tokio::test]
async fn failed_fetch_mutates_nothing() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set(URI, Canned::Status(500));

    let err = h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap_err();
    assert!(matches!(err, PollError::SourceUnreachable { .. }));
    assert!(!h.engine.snapshot().await.contains_feed("tv"));

    // the next successful poll is still the feed's first one
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);
    h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap();
    let store = h.engine.snapshot().await;
    assert_eq!(store.get("tv", "http://indexer.test/1").unwrap().status, JobStatus::good(true));
}

#[tokio::test]
async fn empty_feeds_are_reported() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;

    h.source.set(URI, Canned::Bozo("mismatched tag".into()));
    let err = h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap_err();
    assert!(matches!(
        err,
        PollError::SourceUnreachable { ref reason, .. } if reason == "mismatched tag"
    ));

    h.source.set_entries(URI, Vec::new());
    let err = h.engine.run_feed("tv", RunOptions::scheduled()).await.unwrap_err();
    assert!(matches!(err, PollError::EmptyFeed { .. }));
    assert!(!h.engine.snapshot().await.contains_feed("tv"));
}

#[tokio::test]
async fn incompatible_entry_keeps_earlier_records() {
    let uri = "http://nzbindex.test.nzbindex.com/rss";
    let h = Harness::new(config(vec![("idx", tv_feed(uri))])).await;
    h.source.set_entries(
        uri,
        vec![
            Entry::new("Foo 1", "http://nzbindex.com/release/1")
                .with_enclosure("http://nzbindex.com/download/1.nzb"),
            Entry::new("Foo 2", "http://nzbindex.com/release/2"),
            Entry::new("Foo 3", "http://nzbindex.com/release/3")
                .with_enclosure("http://nzbindex.com/download/3.nzb"),
        ],
    );

    let err = h.engine.run_feed("idx", download_now()).await.unwrap_err();
    assert!(matches!(err, PollError::IncompatibleEntry { .. }));

    let store = h.engine.snapshot().await;
    assert_eq!(store.feed("idx").unwrap().len(), 1);
    assert_eq!(
        store.get("idx", "http://nzbindex.com/download/1.nzb").unwrap().status,
        JobStatus::downloaded()
    );
    // odd-title sources are queued without a name
    match &h.queue.calls()[..] {
        [Enqueued::ByLink(link, request)] => {
            assert_eq!(link, "http://nzbindex.com/download/1.nzb");
            assert_eq!(request.display_name, None);
        }
        other => panic!("unexpected calls {other:?}"),
    }
}

#[tokio::test]
async fn message_id_sources_queue_by_id_and_flag_by_id() {
    let uri = "http://www.newzbin.com/rss";
    let h = Harness::new(config(vec![("nb", tv_feed(uri))])).await;
    let entry = Entry::new("Foo Bar", "http://www.newzbin.com/browse/post/4711/");
    h.source.set_entries(uri, vec![entry]);

    h.engine.run_feed("nb", download_now()).await.unwrap();
    assert!(matches!(&h.queue.calls()[..], [Enqueued::ById(id, _)] if id == "4711"));
    let store = h.engine.snapshot().await;
    let job = store.get("nb", "http://www.newzbin.com/browse/post/4711/").unwrap();
    assert_eq!(job.url.as_deref(), Some("4711"));
}

#[tokio::test]
async fn category_rules_and_mapping() {
    let rules = vec![
        FilterRule::new(MatchMode::CategoryMatch, "tv*"),
        FilterRule::new(MatchMode::Accept, "*"),
    ];
    let mut cfg = config(vec![("tv", tv_feed(URI).with_filters(rules))]);
    cfg.categories.insert("tv hd".into(), "television".into());
    let h = Harness::new(cfg).await;
    h.source.set_entries(
        URI,
        vec![
            Entry::new("Show A", "http://indexer.test/a").with_category("TV HD"),
            Entry::new("Film B", "http://indexer.test/b").with_category("Movies"),
            Entry::new("Plain C", "http://indexer.test/c"),
        ],
    );

    h.engine.run_feed("tv", classify_only()).await.unwrap();
    let store = h.engine.snapshot().await;

    let a = store.get("tv", "http://indexer.test/a").unwrap();
    assert_eq!(a.status, JobStatus::good(false));
    assert_eq!(a.category.as_deref(), Some("television"));
    // the entry brought its own category, so pp and script stay unset
    assert_eq!(a.pp, None);
    assert_eq!(a.script, None);

    assert_eq!(store.get("tv", "http://indexer.test/b").unwrap().status, JobStatus::bad(false));

    // no category: the category rule falls through to the title
    let c = store.get("tv", "http://indexer.test/c").unwrap();
    assert_eq!(c.status, JobStatus::good(false));
    assert_eq!(c.category.as_deref(), Some("tv"));
    assert_eq!(c.pp.as_deref(), Some("3"));
}

#[tokio::test]
async fn rule_overrides_win() {
    let rule =
        FilterRule::new(MatchMode::Accept, "re:^foo").with_overrides("movies", "1", "Default");
    let h = Harness::new(config(vec![("tv", tv_feed(URI).with_filters(vec![rule]))])).await;
    h.source.set_entries(URI, vec![Entry::new("FOO bar", "http://indexer.test/1")]);

    h.engine.run_feed("tv", download_now()).await.unwrap();
    match &h.queue.calls()[..] {
        [Enqueued::ByLink(_, request)] => {
            assert_eq!(request.category.as_deref(), Some("movies"));
            assert_eq!(request.pp.as_deref(), Some("1"));
            // a category override keeps the feed script out
            assert_eq!(request.script, None);
        }
        other => panic!("unexpected calls {other:?}"),
    }
}

#[tokio::test]
async fn notification_lists_new_downloads_unless_forced() {
    let mut cfg = config(vec![("tv", tv_feed(URI))]);
    cfg.settings.email_rss = true;
    let h = Harness::new(cfg).await;
    h.source.set_entries(
        URI,
        vec![
            Entry::new("Foo 1", "http://indexer.test/1"),
            Entry::new("Nope", "http://indexer.test/2"),
            Entry::new("Foo 3", "http://indexer.test/3"),
        ],
    );

    h.engine.run_feed("tv", download_now()).await.unwrap();
    assert_eq!(
        h.notifier.calls(),
        vec![("tv".to_string(), vec!["Foo 1".to_string(), "Foo 3".to_string()])]
    );

    h.source.set_entries(URI, vec![Entry::new("Foo 4", "http://indexer.test/4")]);
    let forced = RunOptions {
        force: true,
        ..download_now()
    };
    h.engine.run_feed("tv", forced).await.unwrap();
    assert_eq!(h.notifier.calls().len(), 1);
    assert_eq!(h.queue.calls().len(), 3);
}

#[tokio::test]
async fn prepared_uri_is_fetched() {
    let h = Harness::new(config(vec![("tv", tv_feed("feed://indexer.test/rss"))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);

    h.engine.run_feed("tv", classify_only()).await.unwrap();
    assert_eq!(h.source.fetched(), vec![URI.to_string()]);
}

#[tokio::test]
async fn store_maintenance_operations() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);
    h.engine.run_feed("tv", classify_only()).await.unwrap();

    assert_eq!(h.engine.flag_downloaded("tv", "http://indexer.test/1").await, 1);
    assert_eq!(h.engine.show_result("tv").await[0].1.status, JobStatus::downloaded());

    h.engine.save().await.unwrap();
    assert_eq!(h.persistence.saves(), 1);
    assert!(h.persistence.saved().unwrap().contains_feed("tv"));

    assert!(h.engine.clear_feed("tv").await);
    assert!(h.engine.show_result("tv").await.is_empty());
    assert!(!h.engine.delete_feed("tv").await);
}

#[tokio::test]
async fn stopped_engine_cancels_polls() {
    let h = Harness::new(config(vec![("tv", tv_feed(URI))])).await;
    h.source.set_entries(URI, vec![Entry::new("Foo", "http://indexer.test/1")]);
    h.engine.stop();
    assert!(h.engine.is_shutting_down());

    let err = h.engine.run_feed("tv", classify_only()).await.unwrap_err();
    assert!(matches!(err, PollError::Cancelled));
    assert!(h.engine.show_result("tv").await.is_empty());
}
