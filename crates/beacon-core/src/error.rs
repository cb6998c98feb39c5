//! # Error Types
//!
//! Domain-specific error types for beacon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  beacon-core errors (this file)                                        │
//! │  └── CoreError        - Malformed local events                         │
//! │                                                                         │
//! │  beacon-db errors (separate crate)                                     │
//! │  └── DbError          - Persistence failures                           │
//! │                                                                         │
//! │  beacon-agent errors                                                   │
//! │  └── RefreshError / ApiError / DiscoveryError / StorageError           │
//! │                                                                         │
//! │  Flow: CoreError → logged by the daemon, event dropped                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while interpreting local input.
///
/// None of these are fatal: the daemon logs them and keeps reading events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The event line was blank.
    #[error("Empty event line")]
    EmptyEvent,

    /// The event kind is not one the agent listens to.
    #[error("Unknown event kind: '{0}'")]
    UnknownEvent(String),

    /// Occupancy value was neither `True` nor `False`.
    ///
    /// ## When This Occurs
    /// - The room analytics status reported something other than a boolean
    /// - A hand-typed test line has a typo
    #[error("Invalid occupancy value: '{0}' (expected True or False)")]
    InvalidOccupancy(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
