use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{Date, UtcOffset};

use crate::feed::window::bucket_key;
use crate::model::{Entry, EntryId, EntryPatch};

/// Entries sharing one calendar day, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    #[serde(serialize_with = "serialize_day")]
    pub day: Date,
    pub entries: Vec<Entry>,
}

impl DateBucket {
    pub fn key(&self) -> String {
        self.day.to_string()
    }
}

fn serialize_day<S: serde::Serializer>(day: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(day)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct DateBucketCache {
    offset: UtcOffset,
    buckets: BTreeMap<Date, Vec<Entry>>,
    index: HashMap<EntryId, Date>,
}

impl DateBucketCache {
    pub fn new(offset: UtcOffset) -> Self {
        Self {
            offset,
            buckets: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn day_of(&self, id: EntryId) -> Option<Date> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        let day = self.index.get(&id)?;
        self.buckets
            .get(day)?
            .iter()
            .find(|entry| entry.id == id)
    }

    /// Adds a fetched page. Ids already cached are left untouched, so merging
    /// the same page twice is a no-op.
    pub fn merge<I>(&mut self, entries: I) -> MergeStats
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut stats = MergeStats::default();
        for entry in entries {
            if self.index.contains_key(&entry.id) {
                stats.skipped += 1;
                continue;
            }
            let day = bucket_key(entry.created_at, self.offset);
            let bucket = self.buckets.entry(day).or_default();
            let position = bucket.partition_point(|existing| existing.created_at >= entry.created_at);
            self.index.insert(entry.id, day);
            bucket.insert(position, entry);
            stats.inserted += 1;
        }
        stats
    }

    /// Applies `patch` in place. Returns false when `id` is not cached.
    pub fn update(&mut self, id: EntryId, patch: &EntryPatch) -> bool {
        let Some(day) = self.index.get(&id) else {
            return false;
        };
        let Some(entry) = self
            .buckets
            .get_mut(day)
            .and_then(|bucket| bucket.iter_mut().find(|entry| entry.id == id))
        else {
            return false;
        };
        entry.apply(patch);
        true
    }

    pub fn buckets(&self) -> impl Iterator<Item = (Date, &[Entry])> {
        self.buckets
            .iter()
            .rev()
            .map(|(day, entries)| (*day, entries.as_slice()))
    }

    /// Owned copies of the buckets whose day lies in `[oldest, newest]`, newest first.
    pub fn buckets_between(&self, oldest: Date, newest: Date) -> Vec<DateBucket> {
        if oldest > newest {
            return Vec::new();
        }
        self.buckets
            .range(oldest..=newest)
            .rev()
            .map(|(day, entries)| DateBucket {
                day: *day,
                entries: entries.clone(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<DateBucket> {
        self.buckets()
            .map(|(day, entries)| DateBucket {
                day,
                entries: entries.to_vec(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }
}
