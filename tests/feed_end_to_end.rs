use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use assert_matches::assert_matches;
use parking_lot::Mutex;
use tempfile::TempDir;
use time::macros::{date, datetime};
use time::{Date, UtcOffset};

use til_feed::config::{AppConfig, ConfigPaths, EditFailurePolicy};
use til_feed::feed::today_at;
use til_feed::storage;
use til_feed::{
    CommitOutcome, Entry, EntryId, FeedController, FeedError, FeedSettings, NewEntry, PageLoad,
    RemoteStore, SqliteStore, TimeRange,
};

/// SQLite store that records query ranges and can refuse updates.
struct RecordingStore {
    inner: SqliteStore,
    ranges: Mutex<Vec<TimeRange>>,
    fail_updates: AtomicBool,
}

impl RecordingStore {
    fn refuse(&self) -> til_feed::Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(FeedError::Network(anyhow!("connection reset")));
        }
        Ok(())
    }
}

impl RemoteStore for RecordingStore {
    fn query(&self, range: &TimeRange) -> til_feed::Result<Vec<Entry>> {
        self.ranges.lock().push(*range);
        self.inner.query(range)
    }

    fn insert(&self, entry: &NewEntry) -> til_feed::Result<Entry> {
        self.inner.insert(entry)
    }

    fn update_content(&self, id: EntryId, content: &str) -> til_feed::Result<()> {
        self.refuse()?;
        self.inner.update_content(id, content)
    }

    fn update_category(&self, id: EntryId, category: &str) -> til_feed::Result<()> {
        self.refuse()?;
        self.inner.update_category(id, category)
    }
}

fn recording_store() -> anyhow::Result<(TempDir, Arc<RecordingStore>)> {
    let temp = TempDir::new()?;
    let paths = ConfigPaths::under(temp.path());
    paths.ensure_directories()?;
    let inner = storage::init(&paths, &AppConfig::default().storage)?;
    let store = Arc::new(RecordingStore {
        inner,
        ranges: Mutex::new(Vec::new()),
        fail_updates: AtomicBool::new(false),
    });
    Ok((temp, store))
}

fn settings(today: Date, edit_failure: EditFailurePolicy) -> FeedSettings {
    let mut settings = FeedSettings::from_config(&AppConfig::default(), today, UtcOffset::UTC);
    settings.edit_failure = edit_failure;
    settings
}

#[test]
fn pages_request_consecutive_five_day_windows() -> anyhow::Result<()> {
    let (_temp, store) = recording_store()?;
    for (content, at) in [
        ("jan 5 late", datetime!(2024-01-05 23:59:59 UTC)),
        ("jan 6 start", datetime!(2024-01-06 00:00 UTC)),
        ("jan 8", datetime!(2024-01-08 13:30 UTC)),
        ("jan 10 late", datetime!(2024-01-10 23:59:59 UTC)),
        ("jan 11", datetime!(2024-01-11 00:00 UTC)),
        ("jan 1", datetime!(2024-01-01 00:00 UTC)),
    ] {
        store.inner.insert_at(&NewEntry::new(content, "dev"), at)?;
    }
    let mut feed = FeedController::new(
        store.clone(),
        settings(date!(2024 - 01 - 10), EditFailurePolicy::Rollback),
    )?;
    assert_eq!(feed.pagination().windows().size(), 5);

    let page_one = assert_matches!(feed.load_page(1)?, PageLoad::Loaded { buckets, .. } => buckets);
    let page_two = assert_matches!(feed.load_page(2)?, PageLoad::Loaded { buckets, .. } => buckets);

    let ranges = store.ranges.lock().clone();
    assert_eq!(
        ranges,
        vec![
            TimeRange {
                start: datetime!(2024-01-06 00:00 UTC),
                end: datetime!(2024-01-11 00:00 UTC),
            },
            TimeRange {
                start: datetime!(2024-01-01 00:00 UTC),
                end: datetime!(2024-01-06 00:00 UTC),
            },
        ]
    );

    let contents = |buckets: &[til_feed::feed::DateBucket]| {
        buckets
            .iter()
            .flat_map(|bucket| bucket.entries.iter().map(|entry| entry.content.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(contents(page_one.as_slice()), vec!["jan 10 late", "jan 8", "jan 6 start"]);
    assert_eq!(contents(page_two.as_slice()), vec!["jan 5 late", "jan 1"]);
    for bucket in page_one {
        assert!((date!(2024 - 01 - 06)..=date!(2024 - 01 - 10)).contains(&bucket.day));
    }
    Ok(())
}

#[test]
fn inserted_entry_leads_todays_bucket_after_reload() -> anyhow::Result<()> {
    let (_temp, store) = recording_store()?;
    let today = today_at(UtcOffset::UTC);
    let earlier = store
        .inner
        .insert_at(&NewEntry::new("earlier", "life"), today.midnight().assume_utc())?;
    let mut feed = FeedController::new(store.clone(), settings(today, EditFailurePolicy::Rollback))?;
    feed.load_page(1)?;

    let created = feed.submit("learned X", "dev")?;
    let buckets = assert_matches!(feed.refresh_latest()?, PageLoad::Loaded { buckets, .. } => buckets);

    let newest = buckets.first().ok_or_else(|| anyhow!("no buckets"))?;
    assert_eq!(newest.key(), today.to_string());
    assert_eq!(newest.entries[0].id, created.id);
    assert_eq!(newest.entries[0].content, "learned X");
    assert_eq!(newest.entries[0].category, "dev");
    assert_eq!(newest.entries[1].id, earlier.id);
    assert_eq!(feed.cache().len(), 2);
    Ok(())
}

fn failing_commit(policy: EditFailurePolicy) -> anyhow::Result<(CommitOutcome, String, String)> {
    let (_temp, store) = recording_store()?;
    let entry = store
        .inner
        .insert_at(&NewEntry::new("original", "dev"), datetime!(2024-01-09 10:00 UTC))?;
    let mut feed = FeedController::new(store.clone(), settings(date!(2024 - 01 - 10), policy))?;
    feed.load_page(1)?;

    assert!(feed.begin_edit(entry.id));
    assert!(feed.edit_content(entry.id, "optimistic"));
    store.fail_updates.store(true, Ordering::SeqCst);
    let outcome = feed.end_edit(entry.id);
    assert!(!feed.is_editing(entry.id));

    let cached = feed
        .entry(entry.id)
        .map(|entry| entry.content.clone())
        .ok_or_else(|| anyhow!("entry dropped from cache"))?;
    let persisted = store
        .inner
        .query(&TimeRange {
            start: datetime!(2024-01-09 00:00 UTC),
            end: datetime!(2024-01-10 00:00 UTC),
        })?
        .into_iter()
        .map(|entry| entry.content)
        .next()
        .ok_or_else(|| anyhow!("entry missing from store"))?;
    Ok((outcome, cached, persisted))
}

#[test]
fn failed_commit_reverts_under_rollback() -> anyhow::Result<()> {
    let (outcome, cached, persisted) = failing_commit(EditFailurePolicy::Rollback)?;
    assert_eq!(outcome, CommitOutcome::Failed { reverted: true });
    assert_eq!(cached, "original");
    assert_eq!(persisted, "original");
    Ok(())
}

#[test]
fn failed_commit_keeps_optimistic_value_when_configured() -> anyhow::Result<()> {
    let (outcome, cached, persisted) = failing_commit(EditFailurePolicy::KeepOptimistic)?;
    assert_eq!(outcome, CommitOutcome::Failed { reverted: false });
    assert_eq!(cached, "optimistic");
    assert_eq!(persisted, "original");
    Ok(())
}
