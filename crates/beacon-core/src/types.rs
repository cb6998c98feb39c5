//! # Domain Types
//!
//! Core data structures shared by the agent and the daemon.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  ┌───────────────────┐     ┌───────────────────┐                       │
//! │  │    TokenPair      │     │ DeviceDescriptor  │                       │
//! │  │  ───────────────  │     │  ───────────────  │                       │
//! │  │  access_token     │     │  id               │                       │
//! │  │  refresh_token    │     │  display_name     │                       │
//! │  │  updated_at       │     └─────────┬─────────┘                       │
//! │  └───────────────────┘               │ one per panel                   │
//! │                                      ▼                                  │
//! │  ┌───────────────────┐     ┌───────────────────┐                       │
//! │  │    LedSession     │     │   ActionOutcome   │                       │
//! │  │  ───────────────  │     │  ───────────────  │                       │
//! │  │  phase            │     │  device           │                       │
//! │  │  active           │     │  succeeded        │                       │
//! │  │  revert_deadline  │     │  attempts         │                       │
//! │  │  debounce_armed   │     └───────────────────┘                       │
//! │  │  generation       │                                                  │
//! │  └───────────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Token Pair
// =============================================================================

/// OAuth access/refresh pair as persisted in the key-value store.
///
/// ## Wire Format
/// Stored as JSON `{"access": "...", "refresh": "...", "updatedAt": "..."}`,
/// compatible with what earlier deployments wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "access")]
    pub access_token: String,

    #[serde(rename = "refresh")]
    pub refresh_token: String,

    #[serde(rename = "updatedAt", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TokenPair {
    /// Creates a pair stamped with the current time.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        TokenPair {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            updated_at: Utc::now(),
        }
    }

    /// Both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// Builds the successor pair after a refresh grant.
    ///
    /// If the provider omitted (or blanked) the refresh token, the current one
    /// is carried forward.
    pub fn rotate(&self, access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        let refresh_token = refresh_token
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());

        TokenPair {
            access_token: access_token.into(),
            refresh_token,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Device Descriptor
// =============================================================================

/// A panel that receives LED commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Opaque cloud id, percent-encoded before it goes into a URL.
    pub id: String,
    pub display_name: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        DeviceDescriptor {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

// =============================================================================
// Action Outcome
// =============================================================================

/// Result of one per-device action inside a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub device: DeviceDescriptor,
    pub succeeded: bool,
    /// Attempts actually made, always at least 1.
    pub attempts: u32,
}

// =============================================================================
// LED Session
// =============================================================================

/// Lifecycle phase of the hold-light session.
///
/// ```text
///   Idle ──hold──▶ Activating ──done──▶ Active ──timer/presence──▶ Reverting ──▶ Idle
///                      ▲                   │
///                      └──────hold─────────┘   (any phase: hold restarts)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Activating,
    Active,
    Reverting,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Activating => "activating",
            SessionPhase::Active => "active",
            SessionPhase::Reverting => "reverting",
        };
        f.write_str(name)
    }
}

/// Observable snapshot of the session state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedSession {
    pub phase: SessionPhase,
    /// Panels are believed to be in manual mode showing the hold colour.
    pub active: bool,
    /// Wall-clock time of the scheduled revert, while one is armed.
    pub revert_deadline: Option<DateTime<Utc>>,
    pub presence_debounce_armed: bool,
    /// Bumped on every hold; stale timer firings carry an older value.
    pub generation: u64,
}

impl LedSession {
    /// Moves to `phase`, keeping `active` consistent with it.
    pub fn enter(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.active = matches!(phase, SessionPhase::Active | SessionPhase::Reverting);
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SessionPhase::Idle
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
