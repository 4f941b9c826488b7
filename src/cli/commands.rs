use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::UtcOffset;

use crate::config::AppConfig;
use crate::error::FeedError;
use crate::feed::{
    today_at, AuthEvent, CommitOutcome, DateBucket, FeedController, FeedSettings, PageLoad,
};
use crate::model::{Entry, EntryId};
use crate::storage::RemoteStore;

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Entry text. If omitted, reads from stdin.
    #[arg()]
    pub content: Option<String>,
    /// Category for the entry (defaults to feed.default_category)
    #[arg(long, short)]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Number of pages to print, newest first
    #[arg(long, default_value_t = 1)]
    pub pages: u32,
    /// Emit the buckets as JSON
    #[arg(long)]
    pub json: bool,
}

impl Default for FeedArgs {
    fn default() -> Self {
        Self {
            pages: 1,
            json: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Entry identifier
    pub id: EntryId,
    /// Replacement text
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryArgs {
    /// Entry identifier
    pub id: EntryId,
    /// New category
    pub category: String,
}

/// Everything a command needs to open a feed.
pub struct Journal {
    config: AppConfig,
    store: Arc<dyn RemoteStore>,
    offset: UtcOffset,
}

impl Journal {
    pub fn new(config: AppConfig, store: Arc<dyn RemoteStore>, offset: UtcOffset) -> Self {
        Self {
            config,
            store,
            offset,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// A fresh feed anchored at today. The local user owns the journal, so
    /// the session starts signed in.
    pub fn open_feed(&self) -> Result<FeedController> {
        let settings = FeedSettings::from_config(&self.config, today_at(self.offset), self.offset);
        let mut feed = FeedController::new(self.store.clone(), settings)?;
        feed.on_auth_change(AuthEvent::SignedIn);
        Ok(feed)
    }
}

pub fn add_entry(journal: &Journal, args: AddArgs) -> Result<()> {
    let content = match args.content {
        Some(content) => content,
        None => match read_stdin()? {
            Some(content) => content,
            None => prompt("Today I learned")?,
        },
    };
    let category = args
        .category
        .unwrap_or_else(|| journal.config().feed.default_category.clone());
    let entry = create_entry(journal, &content, &category)?;
    println!("Created entry #{} [{}]", entry.id, entry.category);
    Ok(())
}

fn create_entry(journal: &Journal, content: &str, category: &str) -> Result<Entry> {
    let mut feed = journal.open_feed()?;
    feed.submit(content, category).context("creating entry")
}

pub fn print_feed(journal: &Journal, args: FeedArgs) -> Result<()> {
    let output = render_feed(journal, &args)?;
    print!("{output}");
    Ok(())
}

fn render_feed(journal: &Journal, args: &FeedArgs) -> Result<String> {
    if args.pages == 0 {
        bail!("--pages must be at least 1");
    }
    let mut feed = journal.open_feed()?;
    for page in 1..=args.pages {
        match feed
            .load_page(page)
            .with_context(|| format!("loading page {page}"))?
        {
            PageLoad::Loaded { .. } => {}
            PageLoad::Skipped { in_flight } => {
                tracing::debug!(page, in_flight, "page skipped");
            }
        }
    }
    let buckets = feed.buckets();
    if args.json {
        let mut json = serde_json::to_string_pretty(&buckets).context("serializing feed")?;
        json.push('\n');
        return Ok(json);
    }
    if buckets.is_empty() {
        let days = journal.config().feed.window_days.saturating_mul(args.pages);
        return Ok(format!("No entries in the last {days} days.\n"));
    }
    Ok(format_buckets(&buckets, feed.cache().offset()))
}

fn format_buckets(buckets: &[DateBucket], offset: UtcOffset) -> String {
    let mut out = String::new();
    for bucket in buckets {
        let _ = writeln!(&mut out, "{}", bucket.key());
        for entry in &bucket.entries {
            let at = entry.created_at.to_offset(offset).time();
            let mut lines = entry.content.lines();
            let first = lines.next().unwrap_or_default();
            let _ = writeln!(
                &mut out,
                "  #{:<5} {:02}:{:02}  [{}]  {}",
                entry.id,
                at.hour(),
                at.minute(),
                entry.category,
                first
            );
            for line in lines {
                let _ = writeln!(&mut out, "{:>24}{line}", "");
            }
        }
        out.push('\n');
    }
    out
}

pub fn edit_entry(journal: &Journal, args: EditArgs) -> Result<()> {
    println!("{}", update_content(journal, &args)?);
    Ok(())
}

fn update_content(journal: &Journal, args: &EditArgs) -> Result<String> {
    let mut feed = journal.open_feed()?;
    locate(&mut feed, args.id, journal.config().feed.max_scan_pages)?;
    if !feed.begin_edit(args.id) {
        bail!("entry #{} cannot be edited right now", args.id);
    }
    feed.edit_content(args.id, &args.content);
    describe(args.id, feed.end_edit(args.id), "content")
}

pub fn change_category(journal: &Journal, args: CategoryArgs) -> Result<()> {
    println!("{}", update_category(journal, &args)?);
    Ok(())
}

fn update_category(journal: &Journal, args: &CategoryArgs) -> Result<String> {
    let mut feed = journal.open_feed()?;
    if feed.categories().resolve(&args.category).is_none() {
        bail!(
            "unknown category '{}' (expected one of: {})",
            args.category,
            feed.categories().all().collect::<Vec<_>>().join(", ")
        );
    }
    locate(&mut feed, args.id, journal.config().feed.max_scan_pages)?;
    describe(args.id, feed.change_category(args.id, &args.category), "category")
}

pub fn list_categories(journal: &Journal) -> Result<()> {
    print!("{}", format_categories(journal.config()));
    Ok(())
}

fn format_categories(config: &AppConfig) -> String {
    let mut out = String::new();
    for name in config.categories().all() {
        let marker = if name == config.feed.default_category {
            "*"
        } else {
            " "
        };
        let _ = writeln!(&mut out, "{marker} {name}");
    }
    out
}

/// Loads pages until `id` is cached or `max_pages` windows have been scanned.
fn locate(feed: &mut FeedController, id: EntryId, max_pages: u32) -> Result<()> {
    while feed.entry(id).is_none() {
        if feed.current_page() >= max_pages {
            return Err(FeedError::NotFound(id).into());
        }
        feed.load_next_page()
            .with_context(|| format!("searching for entry #{id}"))?;
    }
    Ok(())
}

fn describe(id: EntryId, outcome: CommitOutcome, field: &str) -> Result<String> {
    match outcome {
        CommitOutcome::Committed => Ok(format!("Updated {field} of entry #{id}")),
        CommitOutcome::Unchanged => Ok(format!("Entry #{id} already has that {field}")),
        CommitOutcome::Rejected => bail!("refusing to set an empty or unknown {field} on entry #{id}"),
        CommitOutcome::Failed { .. } => bail!("saving {field} of entry #{id} failed"),
        CommitOutcome::NotFound | CommitOutcome::NotEditing => Err(FeedError::NotFound(id).into()),
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
