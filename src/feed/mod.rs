use std::num::NonZeroU32;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use time::{Date, OffsetDateTime, UtcOffset};

use crate::config::categories::CategoryRegistry;
use crate::config::{AppConfig, EditFailurePolicy, ScrollOptions};
use crate::error::{FeedError, Result};
use crate::model::{Entry, EntryId, EntryPatch, NewEntry};
use crate::storage::RemoteStore;

pub mod cache;
pub mod edit;
pub mod pagination;
pub mod scroll;
pub mod window;
pub mod worker;

pub use cache::{DateBucket, DateBucketCache, MergeStats};
pub use edit::{AuthEvent, AuthGate, EditSession, EditSessions};
pub use pagination::{PageCompletion, PageRequest, PaginationController};
pub use scroll::{ScrollSampler, ScrollTrigger, SentinelObserver, TriggerSignal};
pub use window::{bucket_key, DayWindow, PageWindows};
pub use worker::{FetchCompletion, FetchJob, FetchWorker};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub window_days: NonZeroU32,
    pub today: Date,
    pub offset: UtcOffset,
    pub edit_failure: EditFailurePolicy,
    pub require_auth: bool,
    pub categories: CategoryRegistry,
    pub scroll: ScrollOptions,
}

impl FeedSettings {
    pub fn from_config(config: &AppConfig, today: Date, offset: UtcOffset) -> Self {
        Self {
            window_days: NonZeroU32::new(config.feed.window_days).unwrap_or(NonZeroU32::MIN),
            today,
            offset,
            edit_failure: config.feed.edit_failure,
            require_auth: config.feed.require_auth,
            categories: config.categories(),
            scroll: config.scroll.clone(),
        }
    }
}

pub fn today_at(offset: UtcOffset) -> Date {
    OffsetDateTime::now_utc().to_offset(offset).date()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoad {
    Loaded { page: u32, buckets: Vec<DateBucket> },
    /// A fetch covering this page is already outstanding.
    Skipped { in_flight: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    NotFound,
    NotEditing,
    Unchanged,
    /// Refused before reaching the store; the cache holds the confirmed value.
    Rejected,
    Committed,
    Failed { reverted: bool },
}

#[derive(Debug)]
enum Applied {
    Stale,
    Loaded { page: u32 },
    Failed { page: u32, error: FeedError },
}

/// Single owner of the feed's client-side state. Every mutation of the cache
/// goes through this type.
pub struct FeedController {
    store: Arc<dyn RemoteStore>,
    cache: DateBucketCache,
    pagination: PaginationController,
    edits: EditSessions,
    scroll: ScrollTrigger,
    auth: AuthGate,
    categories: CategoryRegistry,
    edit_failure: EditFailurePolicy,
    worker: FetchWorker,
    submitting: bool,
}

impl FeedController {
    pub fn new(store: Arc<dyn RemoteStore>, settings: FeedSettings) -> anyhow::Result<Self> {
        let windows = PageWindows::new(settings.window_days, settings.today, settings.offset);
        let worker = FetchWorker::spawn(store.clone())?;
        Ok(Self {
            store,
            cache: DateBucketCache::new(settings.offset),
            pagination: PaginationController::new(windows),
            edits: EditSessions::new(),
            scroll: ScrollTrigger::new(&settings.scroll),
            auth: AuthGate::new(settings.require_auth),
            categories: settings.categories,
            edit_failure: settings.edit_failure,
            worker,
            submitting: false,
        })
    }

    pub fn cache(&self) -> &DateBucketCache {
        &self.cache
    }

    pub fn buckets(&self) -> Vec<DateBucket> {
        self.cache.snapshot()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.cache.get(id)
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn current_page(&self) -> u32 {
        self.pagination.current_page()
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    pub fn is_editing(&self, id: EntryId) -> bool {
        self.edits.is_editing(id)
    }

    pub fn edit_session(&self, id: EntryId) -> Option<&EditSession> {
        self.edits.get(id)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn can_write(&self) -> bool {
        self.auth.can_write()
    }

    pub fn show_scroll_top(&self) -> bool {
        self.scroll.far_from_top()
    }

    pub fn activate(&mut self) -> ActiveFeed<'_> {
        self.scroll.attach();
        ActiveFeed { feed: self }
    }

    fn deactivate(&mut self) {
        self.scroll.detach();
        self.pagination.cancel();
    }

    /// Fetches page `page` and blocks until it is merged. A repeated request
    /// for a page that is already outstanding returns `Skipped` without
    /// touching the store.
    pub fn load_page(&mut self, page: u32) -> Result<PageLoad> {
        match self.pagination.request(page)? {
            PageRequest::AlreadyInFlight { in_flight } => {
                tracing::debug!(page, in_flight, "page already in flight");
                return Ok(PageLoad::Skipped { in_flight });
            }
            PageRequest::Queued { .. } => {}
            PageRequest::Dispatch(job) => self.submit_job(job)?,
        }

        loop {
            let completion = match self.worker.wait(FETCH_TIMEOUT) {
                Ok(completion) => completion,
                Err(err) => {
                    self.pagination.cancel();
                    return Err(err);
                }
            };
            match self.apply_completion(completion) {
                Applied::Loaded { page: loaded } if loaded == page => {
                    let days = self.pagination.windows().days(page)?;
                    let buckets = self.cache.buckets_between(days.oldest, days.newest);
                    return Ok(PageLoad::Loaded { page, buckets });
                }
                Applied::Failed { error, .. } => return Err(error),
                Applied::Stale | Applied::Loaded { .. } => {}
            }
            if !self.pagination.is_fetching() {
                return Err(FeedError::Network(anyhow::anyhow!(
                    "page {page} was dropped before it could be fetched"
                )));
            }
        }
    }

    pub fn load_next_page(&mut self) -> Result<PageLoad> {
        self.load_page(self.pagination.next_page())
    }

    pub fn refresh_latest(&mut self) -> Result<PageLoad> {
        self.load_page(1)
    }

    /// Sentinel visibility report from the view. Returns true when a fetch was dispatched.
    pub fn on_sentinel(&mut self, intersecting: bool) -> bool {
        let Some(TriggerSignal::LoadNext) = self.scroll.on_intersection(intersecting) else {
            return false;
        };
        let page = self.pagination.next_page();
        match self.pagination.request(page) {
            Ok(PageRequest::Dispatch(job)) => self.submit_job(job).is_ok(),
            Ok(PageRequest::AlreadyInFlight { .. } | PageRequest::Queued { .. }) => false,
            Err(err) => {
                tracing::warn!(page, %err, "cannot request next page");
                false
            }
        }
    }

    pub fn on_scroll(&mut self, offset: f64, now: Instant) -> Option<bool> {
        self.scroll.on_scroll(offset, now)
    }

    /// Flushes the trailing scroll sample and merges finished fetches.
    pub fn tick(&mut self, now: Instant) -> Option<bool> {
        let changed = self.scroll.tick(now);
        self.poll();
        changed
    }

    /// Merges every completed fetch without blocking. Failures are logged and
    /// dropped; the page counter stays put so the next trigger retries.
    pub fn poll(&mut self) -> usize {
        let mut loaded = 0;
        while let Some(completion) = self.worker.try_next() {
            if let Applied::Loaded { .. } = self.apply_completion(completion) {
                loaded += 1;
            }
        }
        loaded
    }

    pub fn settle(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.pagination.is_fetching() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let completion = match self.worker.wait(remaining) {
                Ok(completion) => completion,
                Err(err) => {
                    self.pagination.cancel();
                    return Err(err);
                }
            };
            self.apply_completion(completion);
        }
        Ok(())
    }

    pub fn submit(&mut self, content: &str, category: &str) -> Result<Entry> {
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!("ignoring empty submission");
            return Err(FeedError::validation("entry content cannot be empty"));
        }
        if !self.auth.can_write() {
            tracing::debug!("ignoring submission while signed out");
            return Err(FeedError::Unauthorized);
        }
        let category = self
            .categories
            .resolve(category)
            .ok_or_else(|| FeedError::validation(format!("unknown category '{}'", category.trim())))?
            .to_string();

        self.submitting = true;
        let result = self.store.insert(&NewEntry::new(content, category));
        self.submitting = false;

        match &result {
            Ok(entry) => tracing::info!(id = entry.id, category = %entry.category, "entry created"),
            Err(err) => tracing::error!(%err, "creating entry failed"),
        }
        result
    }

    /// Viewing -> Editing. Refused while signed out or when already editing.
    pub fn begin_edit(&mut self, id: EntryId) -> bool {
        if !self.auth.can_write() {
            tracing::debug!(id, "feed is read-only");
            return false;
        }
        let Some(entry) = self.cache.get(id) else {
            return false;
        };
        self.edits.begin(id, &entry.content)
    }

    /// Buffers `text` and mirrors it into the cache. No remote call.
    pub fn edit_content(&mut self, id: EntryId, text: &str) -> bool {
        if !self.edits.set_buffer(id, text) {
            return false;
        }
        self.cache.update(id, &EntryPatch::Content(text.to_string()))
    }

    /// Editing -> Viewing, committing the buffer.
    pub fn end_edit(&mut self, id: EntryId) -> CommitOutcome {
        let Some(session) = self.edits.finish(id) else {
            return CommitOutcome::NotEditing;
        };
        if !session.is_dirty() {
            return CommitOutcome::Unchanged;
        }
        let confirmed = EntryPatch::Content(session.confirmed().to_string());
        if session.buffer().trim().is_empty() {
            tracing::debug!(id, "refusing to commit empty content");
            self.cache.update(id, &confirmed);
            return CommitOutcome::Rejected;
        }
        match self.store.update_content(id, session.buffer()) {
            Ok(()) => {
                tracing::debug!(id, "entry content committed");
                CommitOutcome::Committed
            }
            Err(err) => {
                tracing::error!(id, %err, "committing entry content failed");
                self.after_failed_commit(id, &confirmed)
            }
        }
    }

    /// Category changes commit at once, with the cache updated first.
    pub fn change_category(&mut self, id: EntryId, category: &str) -> CommitOutcome {
        if !self.auth.can_write() {
            return CommitOutcome::Rejected;
        }
        let Some(previous) = self.cache.get(id).map(|entry| entry.category.clone()) else {
            return CommitOutcome::NotFound;
        };
        let Some(category) = self.categories.resolve(category).map(str::to_string) else {
            tracing::debug!(id, category, "unknown category");
            return CommitOutcome::Rejected;
        };
        if category == previous {
            return CommitOutcome::Unchanged;
        }
        self.cache.update(id, &EntryPatch::Category(category.clone()));
        match self.store.update_category(id, &category) {
            Ok(()) => CommitOutcome::Committed,
            Err(err) => {
                tracing::error!(id, %err, "committing entry category failed");
                self.after_failed_commit(id, &EntryPatch::Category(previous))
            }
        }
    }

    pub fn on_auth_change(&mut self, event: AuthEvent) {
        self.auth.apply(event);
        if self.auth.can_write() {
            return;
        }
        for (id, confirmed) in self.edits.abandon_all() {
            self.cache.update(id, &EntryPatch::Content(confirmed));
        }
    }

    fn after_failed_commit(&mut self, id: EntryId, confirmed: &EntryPatch) -> CommitOutcome {
        let reverted = self.edit_failure == EditFailurePolicy::Rollback;
        if reverted {
            self.cache.update(id, confirmed);
        }
        CommitOutcome::Failed { reverted }
    }

    fn submit_job(&mut self, job: FetchJob) -> Result<()> {
        tracing::debug!(page = job.page, range = %job.range, "dispatching fetch");
        if let Err(err) = self.worker.submit(job) {
            tracing::error!(page = job.page, %err, "could not dispatch fetch");
            self.pagination.cancel();
            return Err(err);
        }
        Ok(())
    }

    fn apply_completion(&mut self, completion: FetchCompletion) -> Applied {
        let range = completion.range;
        match self.pagination.complete(completion) {
            PageCompletion::Stale => Applied::Stale,
            PageCompletion::Loaded {
                page,
                entries,
                next,
            } => {
                let fetched = entries.len();
                let in_range = entries
                    .into_iter()
                    .filter(|entry| range.contains(entry.created_at))
                    .collect::<Vec<_>>();
                if in_range.len() != fetched {
                    tracing::warn!(
                        page,
                        dropped = fetched - in_range.len(),
                        "store returned entries outside the requested window"
                    );
                }
                let stats = self.cache.merge(in_range);
                tracing::debug!(page, inserted = stats.inserted, skipped = stats.skipped, "merged page");
                if let Some(job) = next {
                    // Failure already cancelled pagination; the caller sees it as not fetching.
                    let _ = self.submit_job(job);
                }
                Applied::Loaded { page }
            }
            PageCompletion::Failed { page, error } => {
                tracing::error!(page, %error, "fetching page failed");
                Applied::Failed { page, error }
            }
        }
    }
}

/// Feed attached to a live view. Dropping it detaches the scroll trigger and
/// cancels outstanding fetches so late results never reach the cache.
pub struct ActiveFeed<'a> {
    feed: &'a mut FeedController,
}

impl Deref for ActiveFeed<'_> {
    type Target = FeedController;

    fn deref(&self) -> &Self::Target {
        &*self.feed
    }
}

impl DerefMut for ActiveFeed<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.feed
    }
}

impl Drop for ActiveFeed<'_> {
    fn drop(&mut self) {
        self.feed.deactivate();
    }
}
