//! HTTP request and response bodies.
//!
//! Invite events are accepted as the core's tagged [`InviteEvent`] JSON:
//!
//! ```json
//! { "type": "invite_used", "community_id": "g1", "inviter_id": "u1",
//!   "member_id": "u2", "source": "regular", "code": "abc" }
//! { "type": "member_left", "community_id": "g1", "member_id": "u2" }
//! { "type": "invite_flagged_fake", "community_id": "g1", "member_id": "u2" }
//! ```
//!
//! [`InviteEvent`]: rankwarden_core::InviteEvent

use rankwarden_core::invites::LeaderboardEntry;
use rankwarden_core::{Error, InviteCounts, Rank};
use serde::{Deserialize, Serialize};

// ── Counts ────────────────────────────────────────────────────────────────────

/// A user's counts with the derived total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsResponse {
    pub community_id: String,
    pub user_id: String,
    pub regular: i64,
    pub custom: i64,
    pub fake: i64,
    pub leave: i64,
    pub total: i64,
}

impl CountsResponse {
    pub fn new(community_id: &str, user_id: &str, counts: InviteCounts) -> Self {
        Self {
            community_id: community_id.to_string(),
            user_id: user_id.to_string(),
            regular: counts.regular,
            custom: counts.custom,
            fake: counts.fake,
            leave: counts.leave,
            total: counts.total(),
        }
    }
}

/// Query for the leaderboard endpoint.
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// One leaderboard line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardItem {
    pub user_id: String,
    #[serde(flatten)]
    pub counts: InviteCounts,
    pub total: i64,
}

impl From<LeaderboardEntry> for LeaderboardItem {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            total: entry.counts.total(),
            user_id: entry.user_id,
            counts: entry.counts,
        }
    }
}

// ── Reconciliation ────────────────────────────────────────────────────────────

/// Query for the reconcile endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    /// Compute the plan without touching roles.
    #[serde(default)]
    pub dry_run: bool,
}

// ── Ranks ─────────────────────────────────────────────────────────────────────

/// Body of `PUT /communities/:c/ranks`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetRankRequest {
    pub num_invites: i64,
    pub role_id: String,
    /// Defaults to the role ID
    #[serde(default)]
    pub name: Option<String>,
}

/// Query of `DELETE /communities/:c/ranks`.
#[derive(Debug, Deserialize)]
pub struct RemoveRankQuery {
    pub num_invites: i64,
}

/// A community's rank table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RanksResponse {
    pub community_id: String,
    pub ranks: Vec<Rank>,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// A chat command line to execute.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    pub community_id: String,
    /// User who typed the command
    pub invoker_id: String,
    /// Raw line, prefix included or not
    pub line: String,
}

/// Rendered reply to a command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// Canonical name of the resolved command
    pub command: Option<String>,
    /// False when the reply describes a user mistake
    pub ok: bool,
    pub reply: String,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: i32,
    pub retryable: bool,
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> Self {
        Self {
            error: e.to_string(),
            code: e.code(),
            retryable: e.is_recoverable(),
        }
    }
}
