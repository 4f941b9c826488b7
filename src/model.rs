use serde::Serialize;
use time::OffsetDateTime;

pub type EntryId = i64;

/// A persisted journal entry. Transient view state lives in the edit side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: EntryId,
    pub content: String,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Entry {
    pub fn apply(&mut self, patch: &EntryPatch) {
        match patch {
            EntryPatch::Content(content) => {
                self.content.clear();
                self.content.push_str(content);
            }
            EntryPatch::Category(category) => {
                self.category.clear();
                self.category.push_str(category);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub content: String,
    pub category: String,
}

impl NewEntry {
    pub fn new(content: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: category.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPatch {
    Content(String),
    Category(String),
}
