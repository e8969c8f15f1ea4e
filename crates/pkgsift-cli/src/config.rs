//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pkgsift_core::Deadline;
use pkgsift_crawldb::{CrawlStageConfig, SchedulePolicy};
use pkgsift_merge::{DEFAULT_PARTS, MergeConfig};
use serde::Deserialize;

/// Global configuration for pkgsift
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub schedule: ScheduleConfig,
    pub crawl: CrawlConfig,
    pub merge: MergeSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub base_age_days: u64,
    pub failure_age_hours: u64,
    pub jitter_percent: u32,
    /// Bump to force one unconditional fetch of everything.
    pub version: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_age_days: 10,
            failure_age_hours: 24,
            jitter_percent: 10,
            version: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_per_host: usize,
    /// 0 = no deadline.
    pub deadline_minutes: u64,
    pub failure_threshold: u32,
    pub failure_sleep_secs: u64,
    /// External fetch program and leading arguments.
    pub fetch_command: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_per_host: 1000,
            deadline_minutes: 60,
            failure_threshold: 10,
            failure_sleep_secs: 60,
            fetch_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    pub partitions: usize,
    /// Regex patterns; matching packages are purged from the baseline.
    pub exclude: Vec<String>,
    pub workers: usize,
}

impl Default for MergeSection {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            partitions: DEFAULT_PARTS,
            exclude: Vec::new(),
            workers: cpus.min(8),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./pkgsift.toml (current directory)
    /// 2. ~/.config/pkgsift/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("pkgsift.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "pkgsift") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            base_age: Duration::from_secs(self.schedule.base_age_days * 24 * 3600),
            failure_age: Duration::from_secs(self.schedule.failure_age_hours * 3600),
            jitter_percent: self.schedule.jitter_percent,
            version: self.schedule.version,
        }
    }

    /// Crawl stage settings. The deadline starts counting now.
    pub fn crawl_stage(&self) -> CrawlStageConfig {
        let deadline = match self.crawl.deadline_minutes {
            0 => Deadline::unbounded(),
            m => Deadline::after(Duration::from_secs(m * 60)),
        };
        CrawlStageConfig {
            deadline,
            failure_threshold: self.crawl.failure_threshold,
            failure_sleep: Duration::from_secs(self.crawl.failure_sleep_secs),
            seed: None,
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            parts: self.merge.partitions,
            exclude: self.merge.exclude.clone(),
            workers: self.merge.workers,
        }
    }

    pub fn crawler_dir(&self) -> PathBuf {
        self.data.root.join("crawler")
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.data.root.join("baseline")
    }

    /// Queue directory under the data root (`import`, `tocrawl`, `newdocs`).
    pub fn queue_dir(&self, name: &str) -> PathBuf {
        self.data.root.join(name)
    }
}
