//! # beacon-core: Pure Domain Types for Beacon
//!
//! Everything the orchestration layer passes around, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Local event source (daemon stdin)                 │   │
//! │  │     "prompt Someone has put this room on hold" / "room-in-use"  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ LocalEvent::parse_line                 │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ beacon-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌──────────────────┐  ┌─────────────────────┐ │   │
//! │  │   │   event   │  │      types       │  │        error        │ │   │
//! │  │   │ LocalEvent│  │ TokenPair        │  │ CoreError           │ │   │
//! │  │   │ occupancy │  │ DeviceDescriptor │  │                     │ │   │
//! │  │   │           │  │ ActionOutcome    │  │                     │ │   │
//! │  │   │           │  │ LedSession       │  │                     │ │   │
//! │  │   └───────────┘  └──────────────────┘  └─────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          beacon-db / beacon-agent (I/O happens there)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Token pair, device descriptor, outcomes, session snapshot
//! - [`event`] - Local event parsing (hold prompts, occupancy)
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use beacon_core::{LocalEvent, TokenPair};
//!
//! let event = LocalEvent::parse_line("room-in-use True").unwrap();
//! assert_eq!(event, LocalEvent::OccupancyChanged { occupied: true });
//!
//! // Providers do not always rotate refresh tokens.
//! let pair = TokenPair::new("old-access", "keep-me");
//! let next = pair.rotate("new-access", None);
//! assert_eq!(next.refresh_token, "keep-me");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use event::{parse_occupancy, LocalEvent, DEFAULT_HOLD_PHRASE};
pub use types::{ActionOutcome, DeviceDescriptor, LedSession, SessionPhase, TokenPair};
