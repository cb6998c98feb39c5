//! # beacon-agent: Hold-Light Orchestration for Room Navigators
//!
//! When a room is put on hold, every Room Navigator panel in the same
//! workspace switches its LED to a manual hold colour. The panels revert to
//! automatic after a dwell period, or earlier once presence is confirmed.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Agent Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    BeaconAgent (wiring + routing)                │  │
//! │  │                                                                  │  │
//! │  │  Started by beacon-daemon, fed LocalEvents line by line          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │LedSessionMachine│ │  Broadcast     │  │  DeviceDiscovery       │    │
//! │  │                │  │  Controller    │  │                        │    │
//! │  │ Idle/Activating│  │ Fan-out with   │  │ local id → workspace   │    │
//! │  │ Active/Revert- │  │ per-device     │  │ → paginated inventory  │    │
//! │  │ ing, timers    │  │ retry          │  │ → navigator filter     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  ApiClient ──► TokenAuthority ──► TokenStore (beacon-db)        │   │
//! │  │  Bearer auth, one refresh-and-retry on 401, single-flight grant │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                  HttpTransport (reqwest in production)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `BeaconAgent` wiring and `AgentHandle`
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Error taxonomy
//! - [`http`] - HTTP transport seam
//! - [`token_store`] / [`token_authority`] - OAuth token lifecycle
//! - [`api_client`] - Authenticated cloud API calls
//! - [`discovery`] - Workspace panel discovery
//! - [`broadcast`] - Per-device fan-out with retry
//! - [`panel`] - LED mode and colour commands
//! - [`session`] - The hold-light state machine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_agent::{AgentConfig, BeaconAgent};
//! use beacon_core::LocalEvent;
//! use beacon_db::{Database, DbConfig};
//!
//! let config = AgentConfig::load(None)?;
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let agent = BeaconAgent::new(config, &db)?.start().await?;
//! agent.handle_event(LocalEvent::parse_line("room-in-use False")?).await?;
//! println!("Phase: {}", agent.session().phase);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api_client;
pub mod broadcast;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod panel;
pub mod session;
pub mod token_authority;
pub mod token_store;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentHandle, BeaconAgent};
pub use api_client::ApiClient;
pub use broadcast::BroadcastController;
pub use config::{
    AgentConfig, BroadcastSettings, CloudSettings, DiscoverySettings, SessionSettings,
    StorageSettings,
};
pub use discovery::{DeviceDiscovery, LocalIdentity, StaticIdentity};
pub use error::{
    AgentError, AgentResult, ApiError, DiscoveryError, RefreshError, StorageError, TransportError,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use panel::PanelCommands;
pub use session::{LedSessionMachine, SessionCommand, SessionHandle};
pub use token_authority::{OAuthClient, TokenAuthority};
pub use token_store::{DbTokenStore, MemoryTokenStore, TokenStore};
