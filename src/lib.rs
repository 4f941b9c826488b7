pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod storage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{FeedError, Result};
pub use feed::{ActiveFeed, CommitOutcome, FeedController, FeedSettings, PageLoad};
pub use model::{Entry, EntryId, EntryPatch, NewEntry};
pub use storage::{RemoteStore, SqliteStore, TimeRange};
