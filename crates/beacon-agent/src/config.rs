//! # Agent Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_CLIENT_ID=...   BEACON_REFRESH_TOKEN=...                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/beacon/beacon.toml (Linux)                               │
//! │     ~/Library/Application Support/com.beacon.agent/beacon.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     178 s dwell, 2000 ms propagation, 5 s debounce, 2 attempts         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # beacon.toml
//! [cloud]
//! client_id = "C0ffee..."
//! client_secret = "..."
//! access_token = "..."      # bootstrap pair, used until one is persisted
//! refresh_token = "..."
//!
//! [discovery]
//! local_device_id = "Y2lzY29zcGFyazovL3VzL0RFVklDRS8..."
//! target_product = "Cisco Room Navigator"
//! target_type = "roomdesk"
//!
//! [session]
//! hold_phrase = "Someone has put this room"
//! dwell_secs = 178
//! propagation_delay_ms = 2000
//! presence_debounce_secs = 5
//! revert_on_occupancy = true
//!
//! [broadcast]
//! max_attempts = 2
//! retry_delay_ms = 1000
//!
//! [storage]
//! token_key = "webex_tokens_v3"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use beacon_core::{TokenPair, DEFAULT_HOLD_PHRASE};

use crate::error::{AgentError, AgentResult};

// =============================================================================
// Cloud Settings
// =============================================================================

/// Cloud API endpoints and OAuth client credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Relative request paths are joined onto this.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Refresh-token grant endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Bootstrap access token, used until a refreshed pair is persisted.
    #[serde(default)]
    pub access_token: String,

    /// Bootstrap refresh token.
    #[serde(default)]
    pub refresh_token: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://webexapis.com/v1".to_string()
}

fn default_token_url() -> String {
    "https://webexapis.com/v1/access_token".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            base_url: default_base_url(),
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Discovery Settings
// =============================================================================

/// Which workspace devices count as hold-light panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Cloud id of the room device this agent runs next to.
    #[serde(default)]
    pub local_device_id: Option<String>,

    /// Substring of the inventory `product` field.
    #[serde(default = "default_target_product")]
    pub target_product: String,

    /// Exact value of the inventory `type` field.
    #[serde(default = "default_target_type")]
    pub target_type: String,

    /// Upper bound on inventory pages followed through `Link: rel="next"`.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_target_product() -> String {
    "Cisco Room Navigator".to_string()
}

fn default_target_type() -> String {
    "roomdesk".to_string()
}

fn default_max_pages() -> u32 {
    10
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            local_device_id: None,
            target_product: default_target_product(),
            target_type: default_target_type(),
            max_pages: default_max_pages(),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Timing and wording of the hold-light session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Prompt text containing this phrase is a hold announcement.
    #[serde(default = "default_hold_phrase")]
    pub hold_phrase: String,

    /// Time panels stay on the hold colour before reverting (seconds).
    #[serde(default = "default_dwell")]
    pub dwell_secs: u64,

    /// Pause between switching to manual mode and setting the colour.
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay_ms: u64,

    /// Occupancy must stay true this long before an early revert (seconds).
    #[serde(default = "default_presence_debounce")]
    pub presence_debounce_secs: u64,

    /// When false, occupancy changes are logged and ignored.
    #[serde(default = "default_true")]
    pub revert_on_occupancy: bool,

    #[serde(default = "default_manual_mode")]
    pub manual_mode: String,

    #[serde(default = "default_auto_mode")]
    pub auto_mode: String,

    #[serde(default = "default_hold_color")]
    pub hold_color: String,
}

fn default_hold_phrase() -> String {
    DEFAULT_HOLD_PHRASE.to_string()
}

fn default_dwell() -> u64 {
    178
}

fn default_propagation_delay() -> u64 {
    2000
}

fn default_presence_debounce() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_manual_mode() -> String {
    "Manual".to_string()
}

fn default_auto_mode() -> String {
    "Auto".to_string()
}

fn default_hold_color() -> String {
    "Blue".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            hold_phrase: default_hold_phrase(),
            dwell_secs: default_dwell(),
            propagation_delay_ms: default_propagation_delay(),
            presence_debounce_secs: default_presence_debounce(),
            revert_on_occupancy: true,
            manual_mode: default_manual_mode(),
            auto_mode: default_auto_mode(),
            hold_color: default_hold_color(),
        }
    }
}

impl SessionSettings {
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }

    pub fn propagation_delay(&self) -> Duration {
        Duration::from_millis(self.propagation_delay_ms)
    }

    pub fn presence_debounce(&self) -> Duration {
        Duration::from_secs(self.presence_debounce_secs)
    }
}

// =============================================================================
// Broadcast Settings
// =============================================================================

/// Per-device retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSettings {
    /// Attempts per device per broadcast, including the first. At most
    /// [`MAX_ATTEMPTS_LIMIT`].
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts on the same device.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Upper bound on attempts per device, including the first.
pub const MAX_ATTEMPTS_LIMIT: u32 = 2;

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        BroadcastSettings {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl BroadcastSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Key the token pair is stored under.
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

fn default_token_key() -> String {
    "webex_tokens_v3".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: None,
            token_key: default_token_key(),
        }
    }
}

// =============================================================================
// Main Agent Configuration
// =============================================================================

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub broadcast: BroadcastSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl AgentConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (beacon.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> AgentResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading beacon config from file");
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

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> AgentResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| AgentError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Beacon config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AgentResult<()> {
        if self.cloud.client_id.trim().is_empty() || self.cloud.client_secret.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "cloud.client_id and cloud.client_secret are required".into(),
            ));
        }

        for (name, value) in [
            ("base_url", &self.cloud.base_url),
            ("token_url", &self.cloud.token_url),
        ] {
            let parsed = url::Url::parse(value)?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(AgentError::InvalidUrl(format!(
                    "cloud.{} must be http(s), got: {}",
                    name, value
                )));
            }
        }

        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.broadcast.max_attempts) {
            return Err(AgentError::InvalidConfig(format!(
                "broadcast.max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {}",
                self.broadcast.max_attempts
            )));
        }

        if self.session.dwell_secs == 0 {
            return Err(AgentError::InvalidConfig(
                "session.dwell_secs must be greater than 0".into(),
            ));
        }

        if self.session.hold_phrase.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "session.hold_phrase must not be empty".into(),
            ));
        }

        if self.cloud.refresh_token.is_empty() {
            warn!("No bootstrap refresh token configured; relying on the persisted pair");
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BEACON_BASE_URL") {
            debug!(url = %url, "Overriding base URL from environment");
            self.cloud.base_url = url;
        }

        if let Ok(url) = std::env::var("BEACON_TOKEN_URL") {
            self.cloud.token_url = url;
        }

        if let Ok(id) = std::env::var("BEACON_CLIENT_ID") {
            self.cloud.client_id = id;
        }

        if let Ok(secret) = std::env::var("BEACON_CLIENT_SECRET") {
            self.cloud.client_secret = secret;
        }

        if let Ok(token) = std::env::var("BEACON_ACCESS_TOKEN") {
            self.cloud.access_token = token;
        }

        if let Ok(token) = std::env::var("BEACON_REFRESH_TOKEN") {
            self.cloud.refresh_token = token;
        }

        if let Ok(id) = std::env::var("BEACON_LOCAL_DEVICE_ID") {
            debug!(device_id = %id, "Overriding local device id from environment");
            self.discovery.local_device_id = Some(id);
        }

        if let Ok(path) = std::env::var("BEACON_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(phrase) = std::env::var("BEACON_HOLD_PHRASE") {
            self.session.hold_phrase = phrase;
        }

        if let Ok(dwell) = std::env::var("BEACON_DWELL_SECS") {
            match dwell.parse::<u64>() {
                Ok(secs) => self.session.dwell_secs = secs,
                Err(_) => warn!(value = %dwell, "Ignoring non-numeric BEACON_DWELL_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "beacon", "agent")
            .map(|dirs| dirs.config_dir().join("beacon.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pair used when nothing has been persisted yet.
    pub fn bootstrap_tokens(&self) -> TokenPair {
        TokenPair::new(
            self.cloud.access_token.clone(),
            self.cloud.refresh_token.clone(),
        )
    }

    /// Resolved database path: configured, else the platform data dir.
    pub fn database_path(&self) -> PathBuf {
        self.storage.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "beacon", "agent")
                .map(|dirs| dirs.data_dir().join("beacon.db"))
                .unwrap_or_else(|| PathBuf::from("beacon.db"))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud.request_timeout_secs)
    }
}
