//! # Invite Accounting
//!
//! Platform invite activity arrives as a closed set of [`InviteEvent`]
//! variants. The [`InviteCounter`] appends them to the event log and derives
//! [`InviteCounts`] on demand.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       INVITE ACCOUNTING                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   InviteUsed ─────────► +1 regular / +1 custom   (inviter)              │
//! │        │                                                                │
//! │        └─ self-invite or repeat while present ──► +1 fake               │
//! │                                                                         │
//! │   MemberLeft ─────────► +1 leave  (inviter of the newest open join)     │
//! │   InviteFlaggedFake ──► +1 fake   (inviter of the newest open join)     │
//! │                                  at most one debit per join             │
//! │                                                                         │
//! │   total = regular + custom − fake − leave   (signed, never clamped)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod counter;

pub use counter::{IngestOutcome, InviteCounter, LeaderboardEntry};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a member joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteSource {
    /// A normal invite link
    Regular,
    /// A vanity/custom code attributed to its owner
    Custom,
}

impl InviteSource {
    /// Storage name of the category this source credits.
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteSource::Regular => "regular",
            InviteSource::Custom => "custom",
        }
    }
}

/// Why a join was recorded as fake at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeReason {
    /// The member used their own invite
    SelfInvite,
    /// The member already had a join through the same inviter with no leave
    DuplicateJoin,
}

/// An invite-affecting platform event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InviteEvent {
    /// A member joined through an invite owned by `inviter_id`.
    InviteUsed {
        /// Community joined
        community_id: String,
        /// Owner of the invite
        inviter_id: String,
        /// The new member
        member_id: String,
        /// Regular or vanity invite
        source: InviteSource,
        /// Invite code, when the platform reports it
        #[serde(default)]
        code: Option<String>,
    },

    /// A member left the community.
    MemberLeft {
        /// Community left
        community_id: String,
        /// The departing member
        member_id: String,
    },

    /// A member's join was flagged as suspicious (e.g. an alt account).
    InviteFlaggedFake {
        /// Community of the flagged join
        community_id: String,
        /// The flagged member
        member_id: String,
    },
}

impl InviteEvent {
    /// Community the event belongs to.
    pub fn community_id(&self) -> &str {
        match self {
            InviteEvent::InviteUsed { community_id, .. }
            | InviteEvent::MemberLeft { community_id, .. }
            | InviteEvent::InviteFlaggedFake { community_id, .. } => community_id,
        }
    }

    /// Member the event is about.
    pub fn member_id(&self) -> &str {
        match self {
            InviteEvent::InviteUsed { member_id, .. }
            | InviteEvent::MemberLeft { member_id, .. }
            | InviteEvent::InviteFlaggedFake { member_id, .. } => member_id,
        }
    }

    /// Reject events with empty identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.community_id().trim().is_empty() {
            return Err(Error::InvalidEvent("community_id is empty".to_string()));
        }
        if self.member_id().trim().is_empty() {
            return Err(Error::InvalidEvent("member_id is empty".to_string()));
        }
        if let InviteEvent::InviteUsed { inviter_id, .. } = self {
            if inviter_id.trim().is_empty() {
                return Err(Error::InvalidEvent("inviter_id is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Categorized invite counts for one (community, user) pair.
///
/// The total is never stored; [`InviteCounts::total`] always sums the
/// components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteCounts {
    /// Joins through regular invite links
    pub regular: i64,
    /// Joins through vanity/custom codes
    pub custom: i64,
    /// Joins flagged as fake
    pub fake: i64,
    /// Invited members who left
    pub leave: i64,
}

impl InviteCounts {
    /// `regular + custom - fake - leave`. May be negative.
    pub fn total(&self) -> i64 {
        self.regular + self.custom - self.fake - self.leave
    }
}

impl From<&crate::storage::InviteTallyRecord> for InviteCounts {
    fn from(record: &crate::storage::InviteTallyRecord) -> Self {
        Self {
            regular: record.regular,
            custom: record.custom,
            fake: record.fake,
            leave: record.leave,
        }
    }
}
