//! # Rankwarden Core
//!
//! Invite accounting and rank reconciliation for chat communities.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       RANKWARDEN CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │   Invites   │  │    Ranks    │  │    Roles    │  │   Commands   │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Events    │  │ - Tables    │  │ - Plan      │  │ - Registry   │   │
//! │  │ - Counts    │  │ - Resolve   │  │ - Hazards   │  │ - Resolve    │   │
//! │  │ - Resets    │  │ - Cache     │  │ - Perms     │  │              │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────────────┘   │
//! │         │                │                │                             │
//! │         └────────────────┴───────┬────────┘                             │
//! │                                  │                                      │
//! │  ┌─────────────┐          ┌──────┴──────┐          ┌─────────────────┐ │
//! │  │   Storage   │◄─────────│   Engine    │─────────►│    Platform     │ │
//! │  │             │          │             │          │                 │ │
//! │  │ - SQLite    │          │ - Deadlines │          │ - Members       │ │
//! │  │ - Event log │          │ - Reconcile │          │ - Grant/Revoke  │ │
//! │  └─────────────┘          └─────────────┘          └─────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`storage`] - SQLite event log and rank tables
//! - [`invites`] - Invite events and derived counts
//! - [`ranks`] - Rank tables, resolution and caching
//! - [`roles`] - Permission bitfields and the role reconciler
//! - [`platform`] - The chat platform's membership interface
//! - [`commands`] - Command registry and name resolution
//! - [`engine`] - Async facade with deadlines over all of the above
//!
//! ## Counting Model
//!
//! Counts are never stored. Every join, leave and fake flag is appended to
//! the event log, and a user's counts are summed from the events attributed
//! to them since their last reset. Concurrent events for the same inviter
//! therefore cannot overwrite one another.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod commands;
pub mod engine;
pub mod error;
pub mod invites;
pub mod platform;
pub mod ranks;
pub mod roles;
pub mod storage;
/// Wall-clock helpers.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use commands::{Command, CommandGroup, CommandRegistry};
pub use engine::{ApplyOutcome, Engine, EngineConfig, Reconciliation, SkipReason};
pub use error::{Error, Result};
pub use invites::{InviteCounts, InviteEvent, InviteSource};
pub use platform::{MemberSnapshot, MembershipClient};
pub use ranks::{Rank, RankResolution};
pub use roles::{Permission, Permissions, PromotionResult};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Rankwarden Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        schema_version: storage::SCHEMA_VERSION,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Store schema version this build writes
    pub schema_version: i32,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert_eq!(info.schema_version, storage::SCHEMA_VERSION);
    }
}
