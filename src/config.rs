use std::fs;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ValidationError;
use crate::schema::SourceId;

/// Upper bound for either end of the fetcher's random pause.
pub const MAX_DELAY_SECS: f64 = 3600.0;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// Every section has defaults, so `{}` is a valid (memory-backed,
// default-sources) configuration.
//
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Where collected records are persisted
    pub store: StoreConfig,

    /// HTTP behaviour shared by all adapters
    pub fetcher: FetcherConfig,

    /// Orchestrator settings
    pub collection: CollectionConfig,

    /// Built-in daily job
    pub schedule: ScheduleConfig,

    /// Registered sources, in collection order
    pub sources: Vec<SourceConfig>,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Reads a JSON configuration file from disk.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> anyhow::Result<Config> {
        let mut cfg: Config = serde_json::from_str(data)?;
        if cfg.sources.is_empty() {
            cfg.sources = SourceConfig::defaults();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let f = &self.fetcher;
        let bounded = |secs: f64| (0.0..=MAX_DELAY_SECS).contains(&secs);
        if !bounded(f.delay_min_secs)
            || !bounded(f.delay_max_secs)
            || f.delay_max_secs < f.delay_min_secs
        {
            return Err(ValidationError::Config(format!(
                "fetcher delay range [{}, {}] is invalid",
                f.delay_min_secs, f.delay_max_secs
            )));
        }

        crate::scheduler::trigger::DailyTrigger::validated(
            i64::from(self.schedule.hour),
            i64::from(self.schedule.minute),
            self.schedule.timezone()?,
        )?;

        for src in &self.sources {
            if SourceId::parse(&src.name).is_none() {
                return Err(ValidationError::Config(format!(
                    "unknown source '{}'",
                    src.name
                )));
            }
        }

        if self.store.backend == StoreBackend::Redis && self.store.url.is_none() {
            return Err(ValidationError::Config("redis store requires `url`".into()));
        }

        Ok(())
    }

    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().and_then(|d| d.log).unwrap_or(false)
    }

    /// Enabled sources, in configured order.
    pub fn enabled_sources(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| SourceId::parse(&s.name))
            .collect()
    }
}

// ------------------------------------------------------------
// Store configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// e.g. "redis://127.0.0.1:6379/0"
    pub url: Option<String>,

    /// Prefix for every key written to Redis
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            key_prefix: "juris".into(),
        }
    }
}

// ------------------------------------------------------------
// Fetcher configuration
// ------------------------------------------------------------
//
// The random pause keeps the request rate against each court portal
// low. Defaults match what the portals have tolerated so far (1–3 s).
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetcherConfig {
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            delay_min_secs: 1.0,
            delay_max_secs: 3.0,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollectionConfig {
    /// Run adapters concurrently instead of one after another
    pub parallel: bool,

    /// Window used by manual collections when the caller gives none
    pub manual_days_back: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            manual_days_back: 7,
        }
    }
}

// ------------------------------------------------------------
// Daily job configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA name, e.g. "America/Sao_Paulo"
    pub timezone: String,
    pub hour: u32,
    pub minute: u32,

    /// Collection window of the scheduled run
    pub days_back: u32,

    pub misfire_grace_secs: u64,
}

impl ScheduleConfig {
    pub fn timezone(&self) -> Result<Tz, ValidationError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ValidationError::UnknownTimezone(self.timezone.clone()))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Sao_Paulo".into(),
            hour: 9,
            minute: 0,
            days_back: 1,
            misfire_grace_secs: 3600,
        }
    }
}

// ------------------------------------------------------------
// Source configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// "STF", "STJ", "TJSP", "TST", "TSE", "STM" or "ENUNCIADOS"
    pub name: String,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    pub fn defaults() -> Vec<SourceConfig> {
        ["STF", "STJ", "TJSP", "ENUNCIADOS"]
            .into_iter()
            .map(|name| SourceConfig {
                name: name.into(),
                enabled: true,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Enables debug-level logging
    pub log: Option<bool>,
}
