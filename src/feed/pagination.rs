use crate::error::{FeedError, Result};
use crate::feed::window::PageWindows;
use crate::feed::worker::{FetchCompletion, FetchJob};
use crate::model::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Dispatch(FetchJob),
    /// A fetch for this page or a later one is outstanding.
    AlreadyInFlight { in_flight: u32 },
    /// Recorded as a target; pages up to it are fetched in order once the
    /// outstanding fetch completes.
    Queued { page: u32 },
}

#[derive(Debug)]
pub enum PageCompletion {
    Stale,
    Loaded {
        page: u32,
        entries: Vec<Entry>,
        next: Option<FetchJob>,
    },
    Failed {
        page: u32,
        error: FeedError,
    },
}

/// Tracks which date windows have been fetched. At most one fetch is
/// outstanding at a time.
#[derive(Debug, Clone)]
pub struct PaginationController {
    windows: PageWindows,
    current_page: u32,
    in_flight: Option<u32>,
    queued: Option<u32>,
    generation: u64,
}

impl PaginationController {
    pub fn new(windows: PageWindows) -> Self {
        Self {
            windows,
            current_page: 0,
            in_flight: None,
            queued: None,
            generation: 0,
        }
    }

    pub fn windows(&self) -> &PageWindows {
        &self.windows
    }

    /// Highest page loaded successfully; 0 before the first load.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn next_page(&self) -> u32 {
        self.current_page.saturating_add(1)
    }

    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    pub fn queued(&self) -> Option<u32> {
        self.queued
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn request(&mut self, page: u32) -> Result<PageRequest> {
        let range = self.windows.range(page)?;
        if let Some(in_flight) = self.in_flight {
            if page <= in_flight {
                return Ok(PageRequest::AlreadyInFlight { in_flight });
            }
            self.queued = Some(self.queued.map_or(page, |queued| queued.max(page)));
            return Ok(PageRequest::Queued { page });
        }
        self.in_flight = Some(page);
        Ok(PageRequest::Dispatch(FetchJob {
            generation: self.generation,
            page,
            range,
        }))
    }

    pub fn complete(&mut self, completion: FetchCompletion) -> PageCompletion {
        if completion.generation != self.generation || self.in_flight != Some(completion.page) {
            tracing::debug!(
                page = completion.page,
                generation = completion.generation,
                "dropping stale fetch completion"
            );
            return PageCompletion::Stale;
        }
        self.in_flight = None;
        let page = completion.page;
        match completion.result {
            Ok(entries) => {
                self.current_page = self.current_page.max(page);
                let next = self.dispatch_queued();
                PageCompletion::Loaded {
                    page,
                    entries,
                    next,
                }
            }
            Err(error) => {
                // A failed page blocks everything behind it until it is retried.
                self.queued = None;
                PageCompletion::Failed { page, error }
            }
        }
    }

    /// Forgets outstanding work; completions already on their way become stale.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = None;
        self.queued = None;
    }

    /// Drops every loaded page so the next request starts from page 1.
    pub fn reset(&mut self) {
        self.cancel();
        self.current_page = 0;
    }

    /// Walks toward the queued target one page at a time so no window is skipped.
    fn dispatch_queued(&mut self) -> Option<FetchJob> {
        let target = self.queued?;
        let page = self.next_page();
        if page >= target {
            self.queued = None;
        }
        if page > target {
            return None;
        }
        match self.request(page) {
            Ok(PageRequest::Dispatch(job)) => Some(job),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(page, %err, "dropping queued page");
                self.queued = None;
                None
            }
        }
    }
}
