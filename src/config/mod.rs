use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use time::UtcOffset;

use crate::config::categories::CategoryRegistry;

pub mod categories;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "TilFeed";
const APP_NAME: &str = "til";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("TIL_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("TIL_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("journal.db");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
        })
    }

    /// Lays every path out under one root; used by tests and throwaway stores.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("journal.db"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedOptions,
    pub scroll: ScrollOptions,
    pub storage: StorageOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        self.feed.normalize();
        Ok(())
    }

    pub fn categories(&self) -> CategoryRegistry {
        CategoryRegistry::new(self.feed.categories.iter().cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    /// Number of calendar days covered by one page.
    pub window_days: u32,
    pub categories: Vec<String>,
    pub default_category: String,
    pub edit_failure: EditFailurePolicy,
    /// When set, edits and submissions require a signed-in session.
    pub require_auth: bool,
    /// Offset used to derive calendar days; falls back to the system offset.
    pub utc_offset_minutes: Option<i32>,
    /// Upper bound on pages scanned when looking up an entry by id.
    pub max_scan_pages: u32,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            window_days: 5,
            categories: vec!["dev".into(), "life".into(), "book".into(), "idea".into()],
            default_category: "dev".into(),
            edit_failure: EditFailurePolicy::Rollback,
            require_auth: false,
            utc_offset_minutes: None,
            max_scan_pages: 24,
        }
    }
}

impl FeedOptions {
    fn normalize(&mut self) {
        if self.window_days == 0 {
            tracing::warn!("window_days must be at least 1, falling back to 5");
            self.window_days = 5;
        }
        if self.max_scan_pages == 0 {
            self.max_scan_pages = 1;
        }
        let registry = CategoryRegistry::new(self.categories.iter().cloned());
        if registry.is_empty() {
            tracing::warn!("empty category taxonomy in config, restoring defaults");
            self.categories = FeedOptions::default().categories;
        }
        let registry = CategoryRegistry::new(self.categories.iter().cloned());
        if !registry.contains(&self.default_category) {
            let fallback = registry.first().unwrap_or("dev").to_string();
            tracing::warn!(
                default = %self.default_category,
                %fallback,
                "default category not in taxonomy"
            );
            self.default_category = fallback;
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if self.resolved_offset().is_none() {
                tracing::warn!(minutes, "utc_offset_minutes out of range, ignoring");
                self.utc_offset_minutes = None;
            }
        }
    }

    pub fn resolved_offset(&self) -> Option<UtcOffset> {
        let minutes = self.utc_offset_minutes?;
        UtcOffset::from_whole_seconds(minutes.checked_mul(60)?).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditFailurePolicy {
    /// Revert the cached entry to its last confirmed value.
    #[default]
    Rollback,
    /// Leave the optimistic value in place.
    KeepOptimistic,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "throttle_ms")]
    pub throttle: Duration,
    pub far_from_top_px: u32,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(100),
            far_from_top_px: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_default_config() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::from_paths(ConfigPaths::under(temp.path()));
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.feed.window_days, 5);
        assert_eq!(cfg.scroll.throttle, Duration::from_millis(100));
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.feed.categories, cfg.feed.categories);
        Ok(())
    }

    #[test]
    fn ensure_directories_creates_only_config_and_data() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
        assert_eq!(
            paths.database_path.parent(),
            Some(paths.data_dir.as_path())
        );

        let mut created = fs::read_dir(temp.path())?
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect::<std::io::Result<Vec<_>>>()?;
        created.sort();
        assert_eq!(created, vec!["config", "data"]);
        Ok(())
    }

    #[test]
    fn post_load_repairs_inconsistent_feed_options() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            r#"
[feed]
window_days = 0
categories = ["til", "  ", "TIL"]
default_category = "missing"
edit_failure = "keep-optimistic"
utc_offset_minutes = 540

[scroll]
throttle_ms = 250
"#,
        )?;
        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.feed.window_days, 5);
        assert_eq!(cfg.feed.default_category, "til");
        assert_eq!(cfg.feed.edit_failure, EditFailurePolicy::KeepOptimistic);
        assert_eq!(cfg.scroll.throttle, Duration::from_millis(250));
        assert_eq!(
            cfg.feed.resolved_offset(),
            Some(UtcOffset::from_hms(9, 0, 0)?)
        );
        assert_eq!(cfg.categories().len(), 1);
        Ok(())
    }
}
