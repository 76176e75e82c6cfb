//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PERK_DATABASE_PATH=/var/lib/perk/perk.db                           │
//! │     PERK_DISPATCH_CONCURRENCY=16                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/perk/perk.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.perk.engine/perk.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/perk/perk.db"
//! max_connections = 5
//!
//! [dispatch]
//! max_concurrency = 8
//! coupon_code_attempts = 5
//! poll_interval_secs = 30
//! customer_page_size = 500
//!
//! [business]
//! name = "Sparkle Car Wash"
//! phone = "(555) 010-0200"
//! booking_url = "https://book.example.com"
//! loyalty_cents_per_point = 5
//!
//! [attribution]
//! default_window_days = 7
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use perk_core::template::BusinessInfo;
use perk_core::DEFAULT_ATTRIBUTION_WINDOW_DAYS;
use perk_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "perk", "engine")
        .map(|dirs| dirs.data_dir().join("perk.db"))
        .unwrap_or_else(|| PathBuf::from("perk.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Dispatch Settings
// =============================================================================

/// Campaign send behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Recipients processed at once during one dispatch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Codes tried per minted coupon before giving up.
    #[serde(default = "default_coupon_code_attempts")]
    pub coupon_code_attempts: u32,

    /// Interval between scheduler polls (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Customers read per page during audience selection.
    #[serde(default = "default_customer_page_size")]
    pub customer_page_size: i64,
}

fn default_max_concurrency() -> usize {
    8
}
fn default_coupon_code_attempts() -> u32 {
    5
}
fn default_poll_interval() -> u64 {
    30
}
fn default_customer_page_size() -> i64 {
    500
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            max_concurrency: default_max_concurrency(),
            coupon_code_attempts: default_coupon_code_attempts(),
            poll_interval_secs: default_poll_interval(),
            customer_page_size: default_customer_page_size(),
        }
    }
}

// =============================================================================
// Business Settings
// =============================================================================

/// Values every campaign message can reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessSettings {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub phone: String,

    /// Base booking link; each recipient gets a personalised copy.
    #[serde(default)]
    pub booking_url: String,

    #[serde(default)]
    pub loyalty_cents_per_point: i64,
}

// =============================================================================
// Attribution Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionSettings {
    #[serde(default = "default_window_days")]
    pub default_window_days: i64,
}

fn default_window_days() -> i64 {
    DEFAULT_ATTRIBUTION_WINDOW_DAYS
}

impl Default for AttributionSettings {
    fn default() -> Self {
        AttributionSettings {
            default_window_days: default_window_days(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub business: BusinessSettings,

    #[serde(default)]
    pub attribution: AttributionSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (perk.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.dispatch.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "dispatch.max_concurrency must be greater than 0".into(),
            ));
        }
        if self.dispatch.coupon_code_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "dispatch.coupon_code_attempts must be greater than 0".into(),
            ));
        }
        if self.dispatch.poll_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "dispatch.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.dispatch.customer_page_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "dispatch.customer_page_size must be greater than 0".into(),
            ));
        }
        if self.attribution.default_window_days < 0 {
            return Err(EngineError::InvalidConfig(
                "attribution.default_window_days must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("PERK_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = var("PERK_DB_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid PERK_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(n) = var("PERK_DISPATCH_CONCURRENCY") {
            match n.parse() {
                Ok(n) => self.dispatch.max_concurrency = n,
                Err(_) => warn!(value = %n, "Ignoring invalid PERK_DISPATCH_CONCURRENCY"),
            }
        }

        if let Some(n) = var("PERK_CODE_ATTEMPTS") {
            match n.parse() {
                Ok(n) => self.dispatch.coupon_code_attempts = n,
                Err(_) => warn!(value = %n, "Ignoring invalid PERK_CODE_ATTEMPTS"),
            }
        }

        if let Some(secs) = var("PERK_POLL_INTERVAL_SECS") {
            match secs.parse() {
                Ok(s) => self.dispatch.poll_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid PERK_POLL_INTERVAL_SECS"),
            }
        }

        if let Some(name) = var("PERK_BUSINESS_NAME") {
            self.business.name = name;
        }

        if let Some(phone) = var("PERK_BUSINESS_PHONE") {
            self.business.phone = phone;
        }

        if let Some(url) = var("PERK_BOOKING_URL") {
            debug!(url = %url, "Overriding booking URL from environment");
            self.business.booking_url = url;
        }

        if let Some(days) = var("PERK_ATTRIBUTION_WINDOW_DAYS") {
            match days.parse() {
                Ok(d) => self.attribution.default_window_days = d,
                Err(_) => warn!(value = %days, "Ignoring invalid PERK_ATTRIBUTION_WINDOW_DAYS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "perk", "engine")
            .map(|dirs| dirs.config_dir().join("perk.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database pool settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    /// Business details for message templates.
    pub fn business_info(&self) -> BusinessInfo {
        BusinessInfo {
            name: self.business.name.clone(),
            phone: self.business.phone.clone(),
            booking_url: self.business.booking_url.clone(),
            loyalty_cents_per_point: self.business.loyalty_cents_per_point,
        }
    }
}
