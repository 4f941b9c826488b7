use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{RemoteStore, TimeRange};
use crate::error::{FeedError, Result};
use crate::model::{Entry, EntryId, NewEntry};

/// In-memory store with failure injection and an optional query gate.
#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicI64,
    gate: Mutex<Option<Receiver<()>>>,
    pub fail_queries: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
    pub query_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub ranges: Mutex<Vec<TimeRange>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, content: &str, category: &str, created_at: OffsetDateTime) -> Entry {
        let entry = Entry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            content: content.to_string(),
            category: category.to_string(),
            created_at,
        };
        self.entries.lock().push(entry.clone());
        entry
    }

    /// Every subsequent query blocks until a unit is sent on the returned channel.
    pub fn install_gate(&self) -> Sender<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn stored(&self, id: EntryId) -> Option<Entry> {
        self.entries.lock().iter().find(|entry| entry.id == id).cloned()
    }

    fn update_with(&self, id: EntryId, f: impl FnOnce(&mut Entry)) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(FeedError::Network(anyhow!("update rejected by test store")));
        }
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(FeedError::NotFound(id))?;
        f(entry);
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn query(&self, range: &TimeRange) -> Result<Vec<Entry>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.ranges.lock().push(*range);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(FeedError::Network(anyhow!("query rejected by test store")));
        }
        let mut hits = self
            .entries
            .lock()
            .iter()
            .filter(|entry| range.contains(entry.created_at))
            .cloned()
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(hits)
    }

    fn insert(&self, entry: &NewEntry) -> Result<Entry> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(FeedError::Network(anyhow!("insert rejected by test store")));
        }
        Ok(self.seed(&entry.content, &entry.category, OffsetDateTime::now_utc()))
    }

    fn update_content(&self, id: EntryId, content: &str) -> Result<()> {
        self.update_with(id, |entry| entry.content = content.to_string())
    }

    fn update_category(&self, id: EntryId, category: &str) -> Result<()> {
        self.update_with(id, |entry| entry.category = category.to_string())
    }
}
