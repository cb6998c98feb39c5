//! # Agent Error Types
//!
//! One error type per failure domain, plus an umbrella [`AgentError`] for
//! startup and the actor handles.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Agent Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transport     │  │  Refresh (Auth) │  │         Api             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Timeout        │  │  Transport      │  │  Transport              │ │
//! │  │  Connect        │  │  Rejected       │  │  Unauthorized           │ │
//! │  │  Request        │  │  Malformed      │  │  InvalidUrl             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Discovery     │  │    Storage      │  │        Agent            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  LocalIdentity  │  │  Database       │  │  InvalidConfig          │ │
//! │  │  Status         │  │  Serialization  │  │  ConfigLoad/Save        │ │
//! │  │  NoMatching     │  │                 │  │  ShuttingDown/Channel   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Only Agent errors ever leave the crate boundary as hard failures.     │
//! │  Everything else is resolved or logged inside its component.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for agent startup and handle operations.
pub type AgentResult<T> = Result<T, AgentError>;

// =============================================================================
// Transport Errors
// =============================================================================

/// A request never produced an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    /// Status arrived but the body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

// =============================================================================
// Refresh (Auth) Errors
// =============================================================================

/// The refresh-token grant did not yield a usable pair.
///
/// `Clone` so one failed single-flight refresh can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] TransportError),

    /// Provider answered with a non-2xx status.
    #[error("Token endpoint rejected refresh with status {status}")]
    Rejected { status: u16, body: String },

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// 2xx response without an `access_token`.
    #[error("Token response did not include an access token")]
    MissingAccessToken,
}

// =============================================================================
// API Errors
// =============================================================================

/// Terminal failure of one logical API call.
///
/// Non-2xx statuses other than an unrecoverable 401 are NOT errors; they
/// come back as a response for the caller to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 401 whose token refresh failed. The original status is surfaced.
    #[error("Unauthorized (401) and token refresh failed: {source}")]
    Unauthorized { source: RefreshError },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// Discovery Errors
// =============================================================================

/// A discovery lookup failed. The previous device set is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// This device's own cloud identity could not be resolved.
    #[error("Local device identity unavailable: {0}")]
    LocalIdentity(String),

    #[error("{stage} lookup failed: {source}")]
    Api {
        stage: &'static str,
        source: ApiError,
    },

    #[error("{stage} lookup returned HTTP {status}")]
    Status { stage: &'static str, status: u16 },

    #[error("Malformed {stage} response: {reason}")]
    MalformedResponse { stage: &'static str, reason: String },

    /// Inventory listed fine but nothing matched the target class.
    #[error("No matching devices among {inspected} workspace devices")]
    NoMatchingDevices { inspected: usize },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Token persistence failed. Never fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] beacon_db::DbError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Database(e) => e.is_retryable(),
            StorageError::Serialization(_) => false,
        }
    }
}

// =============================================================================
// Agent Errors
// =============================================================================

/// Errors surfaced by configuration loading and the actor handles.
#[derive(Debug, Error)]
pub enum AgentError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Component Errors
    // =========================================================================
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Beacon agent is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(err: toml::de::Error) -> Self {
        AgentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for AgentError {
    fn from(err: toml::ser::Error) -> Self {
        AgentError::ConfigSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        AgentError::InvalidUrl(err.to_string())
    }
}

impl AgentError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidConfig(_)
                | AgentError::InvalidUrl(_)
                | AgentError::ConfigLoadFailed(_)
                | AgentError::ConfigSaveFailed(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Api(e) => e.is_retryable(),
            AgentError::Discovery(DiscoveryError::Api { source, .. }) => source.is_retryable(),
            AgentError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
