//! # Node Configuration
//!
//! Key/value configuration store and the immutable node snapshot loaded
//! from it at startup.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BRANCHLINK_APP_TYPE=BRANCH                                         │
//! │     BRANCHLINK_LOCAL_URL=http://10.0.0.5:8000/api                      │
//! │                                                                         │
//! │  2. Config Store (ConfigStore trait)                                   │
//! │     FileConfigStore: ~/.config/branchlink/node.toml (Linux)            │
//! │     MemoryConfigStore: tests and embedding hosts                       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     BACK_OFFICE, not standalone, no URLs, 5s / 10s / 5s timings        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # node.toml
//! app_type = "HEAD_OFFICE"
//! head_office_role = "MAIN"
//! standalone = false
//! local_branch_id = 7
//! local_api_url = "http://10.0.0.5:8000/api"
//! online_api_url = "https://ho.example.com/api"
//!
//! # optional timing overrides
//! retry_delay_ms = 5000
//! retry_policy = "fixed"
//! ```
//!
//! The store is read once into [`NodeConfig`]; identity and endpoints never
//! change for the lifetime of the process. The only key written at runtime
//! is `sync_pending`, owned by the sync queue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use branchlink_core::validation::{validate_base_url, DEFAULT_MAX_PAGE_SIZE};
use branchlink_core::{
    AppType, BranchId, CoreError, EndpointResolver, EndpointSet, HeadOfficeRole, NodeIdentity,
    HEAD_OFFICE_PING_INTERVAL_MS, PRESENCE_INTERVAL_MS, SYNC_RETRY_DELAY_MS,
};

use crate::error::{SyncError, SyncResult};
use crate::retry::{RetryKind, RetryPolicy};

// =============================================================================
// Keys
// =============================================================================

/// Well-known configuration keys.
pub mod keys {
    pub const APP_TYPE: &str = "app_type";
    pub const HEAD_OFFICE_ROLE: &str = "head_office_role";
    pub const STANDALONE: &str = "standalone";
    pub const LOCAL_BRANCH_ID: &str = "local_branch_id";
    pub const LOCAL_API_URL: &str = "local_api_url";
    pub const ONLINE_API_URL: &str = "online_api_url";
    /// Set while the sync queue holds unconfirmed items.
    pub const SYNC_PENDING: &str = "sync_pending";

    pub const PRESENCE_INTERVAL_MS: &str = "presence_interval_ms";
    pub const PING_INTERVAL_MS: &str = "ping_interval_ms";
    pub const RETRY_DELAY_MS: &str = "retry_delay_ms";
    pub const RETRY_MAX_DELAY_MS: &str = "retry_max_delay_ms";
    pub const RETRY_POLICY: &str = "retry_policy";
    pub const REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";
    pub const MAX_PAGE_SIZE: &str = "max_page_size";
}

// =============================================================================
// Config Store
// =============================================================================

/// Synchronous key/value configuration.
///
/// No transactional guarantees: each `set`/`remove` stands alone.
pub trait ConfigStore: Send + Sync {
    /// Returns the value for `key`, or `None` if unset.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// In-process store. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-filled with the given pairs.
    pub fn with_values<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MemoryConfigStore {
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// A flat TOML table on disk. Every write is persisted immediately.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    table: Mutex<toml::Table>,
}

impl FileConfigStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();

        let table = if path.exists() {
            info!(?path, "Loading node config from file");
            let contents = std::fs::read_to_string(&path)?;
            contents.parse::<toml::Table>()?
        } else {
            debug!(?path, "Config file not found, starting empty");
            toml::Table::new()
        };

        Ok(FileConfigStore {
            path,
            table: Mutex::new(table),
        })
    }

    /// Opens the store at the platform default location.
    pub fn open_default() -> SyncResult<Self> {
        let path = Self::default_config_path()
            .ok_or_else(|| SyncError::ConfigLoadFailed("No config path available".into()))?;
        Self::open(path)
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "branchlink", "branchlink")
            .map(|dirs| dirs.config_dir().join("node.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table(&self) -> std::sync::MutexGuard<'_, toml::Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, table: &toml::Table) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(table)?;
        std::fs::write(&self.path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        debug!(path = ?self.path, "Node config saved");
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.table().get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            other => {
                warn!(key, kind = other.type_str(), "Ignoring non-scalar config value");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut table = self.table();
        table.insert(key.to_string(), toml::Value::String(value.to_string()));
        self.persist(&table)
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut table = self.table();
        if table.remove(key).is_some() {
            self.persist(&table)?;
        }
        Ok(())
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Timing and paging knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval of the presence monitor (UI badge).
    #[serde(default = "default_presence_interval")]
    pub presence_interval_ms: u64,

    /// Interval of the head-office ping (read routing).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Delay before a failed drain is retried.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Ceiling for the exponential policy.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    #[serde(default)]
    pub retry_policy: RetryKind,

    /// Transport default for every request; there is no per-call timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_presence_interval() -> u64 {
    PRESENCE_INTERVAL_MS
}
fn default_ping_interval() -> u64 {
    HEAD_OFFICE_PING_INTERVAL_MS
}
fn default_retry_delay() -> u64 {
    SYNC_RETRY_DELAY_MS
}
fn default_retry_max_delay() -> u64 {
    60_000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            presence_interval_ms: default_presence_interval(),
            ping_interval_ms: default_ping_interval(),
            retry_delay_ms: default_retry_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_policy: RetryKind::default(),
            request_timeout_secs: default_request_timeout(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl SyncSettings {
    /// Reads the optional timing keys, keeping defaults for absent ones.
    pub fn from_store(store: &dyn ConfigStore) -> SyncResult<Self> {
        let mut settings = SyncSettings::default();

        if let Some(v) = parse_number(store, keys::PRESENCE_INTERVAL_MS)? {
            settings.presence_interval_ms = v;
        }
        if let Some(v) = parse_number(store, keys::PING_INTERVAL_MS)? {
            settings.ping_interval_ms = v;
        }
        if let Some(v) = parse_number(store, keys::RETRY_DELAY_MS)? {
            settings.retry_delay_ms = v;
        }
        if let Some(v) = parse_number(store, keys::RETRY_MAX_DELAY_MS)? {
            settings.retry_max_delay_ms = v;
        }
        if let Some(v) = parse_number(store, keys::REQUEST_TIMEOUT_SECS)? {
            settings.request_timeout_secs = v;
        }
        if let Some(v) = parse_number(store, keys::MAX_PAGE_SIZE)? {
            settings.max_page_size = v;
        }
        if let Some(raw) = non_empty(store, keys::RETRY_POLICY) {
            settings.retry_policy = raw.parse().map_err(SyncError::InvalidConfig)?;
        }

        Ok(settings)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.retry_delay_ms);
        match self.retry_policy {
            RetryKind::Fixed => RetryPolicy::fixed(delay),
            RetryKind::Exponential => {
                RetryPolicy::exponential(delay, Duration::from_millis(self.retry_max_delay_ms))
            }
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.presence_interval_ms == 0 || self.ping_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "check intervals must be greater than 0".into(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "max_page_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Node Config
// =============================================================================

/// Immutable startup snapshot of everything the routing rules need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub identity: NodeIdentity,
    pub endpoints: EndpointSet,
    pub settings: SyncSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            identity: NodeIdentity::default(),
            endpoints: EndpointSet::default(),
            settings: SyncSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Loads configuration from the store, then the environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config store
    /// 3. Environment variables
    pub fn load(store: &dyn ConfigStore) -> SyncResult<Self> {
        let mut config = Self::from_store(store)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            app_type = %config.identity.app_type,
            role = ?config.identity.head_office_role,
            standalone = config.identity.standalone,
            branch_id = ?config.identity.local_branch_id,
            "Node config loaded"
        );
        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(store: &dyn ConfigStore) -> Self {
        Self::load(store).unwrap_or_else(|e| {
            warn!("Failed to load node config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Reads the store alone, without environment overrides.
    pub fn from_store(store: &dyn ConfigStore) -> SyncResult<Self> {
        let defaults = NodeIdentity::default();

        let app_type = match non_empty(store, keys::APP_TYPE) {
            Some(raw) => raw.parse::<AppType>()?,
            None => defaults.app_type,
        };
        let head_office_role = non_empty(store, keys::HEAD_OFFICE_ROLE)
            .map(|raw| raw.parse::<HeadOfficeRole>())
            .transpose()?;
        let standalone = match non_empty(store, keys::STANDALONE) {
            Some(raw) => parse_flag(keys::STANDALONE, &raw)?,
            None => defaults.standalone,
        };
        let local_branch_id = parse_number::<BranchId>(store, keys::LOCAL_BRANCH_ID)?;

        let endpoints = EndpointSet::new(
            store.get(keys::LOCAL_API_URL).as_deref(),
            store.get(keys::ONLINE_API_URL).as_deref(),
        );

        Ok(NodeConfig {
            identity: NodeIdentity {
                app_type,
                head_office_role,
                standalone,
                local_branch_id,
            },
            endpoints,
            settings: SyncSettings::from_store(store)?,
        })
    }

    /// Validates the configuration.
    ///
    /// A missing URL is never an error; it disables the features that need
    /// it.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref url) = self.endpoints.local_url {
            validate_base_url(keys::LOCAL_API_URL, url)?;
            url::Url::parse(url)?;
        }
        if let Some(ref url) = self.endpoints.online_url {
            validate_base_url(keys::ONLINE_API_URL, url)?;
            url::Url::parse(url)?;
        }
        if self.identity.head_office_role.is_some() && !self.identity.is_head_office() {
            warn!(
                app_type = %self.identity.app_type,
                "head_office_role is set on a non head-office node and will be ignored"
            );
        }
        self.settings.validate()
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) -> SyncResult<()> {
        if let Some(raw) = env_var("BRANCHLINK_APP_TYPE") {
            debug!(app_type = %raw, "Overriding app type from environment");
            self.identity.app_type = raw.parse()?;
        }

        if let Some(raw) = env_var("BRANCHLINK_HEAD_OFFICE_ROLE") {
            debug!(role = %raw, "Overriding head office role from environment");
            self.identity.head_office_role = Some(raw.parse()?);
        }

        if let Some(raw) = env_var("BRANCHLINK_STANDALONE") {
            self.identity.standalone = parse_flag("BRANCHLINK_STANDALONE", &raw)?;
        }

        if let Some(raw) = env_var("BRANCHLINK_BRANCH_ID") {
            match raw.parse::<BranchId>() {
                Ok(id) => self.identity.local_branch_id = Some(id),
                Err(_) => warn!(value = %raw, "Ignoring non-numeric BRANCHLINK_BRANCH_ID"),
            }
        }

        let local = env_var("BRANCHLINK_LOCAL_URL");
        let online = env_var("BRANCHLINK_ONLINE_URL");
        if local.is_some() || online.is_some() {
            debug!(?local, ?online, "Overriding endpoints from environment");
            self.endpoints = EndpointSet::new(
                local.as_deref().or(self.endpoints.local_url.as_deref()),
                online.as_deref().or(self.endpoints.online_url.as_deref()),
            );
        }

        Ok(())
    }

    /// Routing view of this snapshot.
    pub fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.identity.clone(), self.endpoints.clone())
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_empty(store: &dyn ConfigStore, key: &str) -> Option<String> {
    store.get(key).filter(|v| !v.trim().is_empty())
}

/// Parses a persisted boolean. Accepts the spellings hosts commonly write.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CoreError::InvalidFlag {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(store: &dyn ConfigStore, key: &str) -> SyncResult<Option<T>> {
    match non_empty(store, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::InvalidConfig(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(None),
    }
}
