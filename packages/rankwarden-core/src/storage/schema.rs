//! # Database Schema
//!
//! SQL schema definitions for the Rankwarden database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │  invite_events  │    │  invite_resets  │      │      ranks      │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id (seq)        │◄───│ last_event_id   │      │ id (seq)        │    │
//! │  │ community_id    │    │ community_id    │      │ community_id    │    │
//! │  │ inviter_id      │    │ user_id         │      │ num_invites     │    │
//! │  │ member_id       │    │ reset_at        │      │ role_id         │    │
//! │  │ kind            │    └─────────────────┘      │ name            │    │
//! │  │ invite_code     │                             │ created_at      │    │
//! │  │ join_event_id ──┼──► (self, for leave/fake)   └─────────────────┘    │
//! │  │ recorded_at     │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `invite_events` is append-only. Counts are never stored; they are summed
//! from this table on every read.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Append-only invite event log.
-- kind: 'regular' | 'custom' credit the inviter, 'fake' | 'leave' debit it.
-- inviter_id is NULL when a leave/fake could not be attributed to a join.
CREATE TABLE IF NOT EXISTS invite_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    community_id TEXT NOT NULL,
    inviter_id TEXT,
    member_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('regular', 'custom', 'fake', 'leave')),
    invite_code TEXT,
    join_event_id INTEGER,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_invite_events_inviter
    ON invite_events(community_id, inviter_id);
CREATE INDEX IF NOT EXISTS idx_invite_events_member
    ON invite_events(community_id, member_id, id);
CREATE INDEX IF NOT EXISTS idx_invite_events_join
    ON invite_events(join_event_id, kind);

-- Reset markers: only events with id > last_event_id count for the user.
CREATE TABLE IF NOT EXISTS invite_resets (
    community_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    last_event_id INTEGER NOT NULL,
    reset_at INTEGER NOT NULL,
    PRIMARY KEY (community_id, user_id)
);

-- Rank thresholds. Uniqueness of num_invites is enforced by the write path,
-- not by a constraint, so legacy duplicates can still be read.
CREATE TABLE IF NOT EXISTS ranks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    community_id TEXT NOT NULL,
    num_invites INTEGER NOT NULL CHECK (num_invites >= 0),
    role_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ranks_community
    ON ranks(community_id, num_invites, id);
"#;
