//! # Storage Module
//!
//! Durable storage for the invite event log and per-community rank tables.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite Database                                                │   │
//! │  │  ───────────────                                                │   │
//! │  │                                                                 │   │
//! │  │  Tables:                                                       │   │
//! │  │  • invite_events - append-only join/leave/fake log             │   │
//! │  │  • invite_resets - per-user reset markers                      │   │
//! │  │  • ranks         - thresholds → roles                          │   │
//! │  │                                                                 │   │
//! │  │  Appends are atomic per event; counts are summed on read.      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub use database::{
    AttributionRecord, Database, InviteTallyRecord, JoinRecord, RankRecord,
};
pub use schema::SCHEMA_VERSION;
