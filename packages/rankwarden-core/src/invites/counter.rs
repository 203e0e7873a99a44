//! # Invite Counter
//!
//! Appends invite events and derives per-user counts from the log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FakeReason, InviteCounts, InviteEvent};
use crate::error::Result;
use crate::storage::Database;

/// What appending an event did to the counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// A join credited `inviter_id`; it may also have been flagged fake.
    Credited {
        /// Inviter credited with the join
        inviter_id: String,
        /// Log ID of the join
        event_id: i64,
        /// Set when the join was also recorded as fake
        flagged_fake: Option<FakeReason>,
    },
    /// A leave or fake flag debited `inviter_id`.
    Debited {
        /// Inviter debited
        inviter_id: String,
        /// Log ID of the debit
        event_id: i64,
    },
    /// The event was stored but no inviter could be attributed.
    Unattributed {
        /// Log ID of the stored event
        event_id: i64,
    },
}

impl IngestOutcome {
    /// Inviter whose counts changed, if any.
    pub fn affected_inviter(&self) -> Option<&str> {
        match self {
            IngestOutcome::Credited { inviter_id, .. } | IngestOutcome::Debited { inviter_id, .. } => {
                Some(inviter_id)
            }
            IngestOutcome::Unattributed { .. } => None,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Inviter
    pub user_id: String,
    /// Their counts
    pub counts: InviteCounts,
}

/// Invite counter backed by the event log.
///
/// All methods are blocking; async callers go through the engine, which
/// moves them onto the blocking pool under a timeout.
#[derive(Clone)]
pub struct InviteCounter {
    db: Arc<Database>,
}

impl InviteCounter {
    /// Create a counter over the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one event to the log.
    pub fn ingest(&self, event: &InviteEvent, recorded_at: i64) -> Result<IngestOutcome> {
        event.validate()?;

        let outcome = match event {
            InviteEvent::InviteUsed {
                community_id,
                inviter_id,
                member_id,
                source,
                code,
            } => {
                let join = self.db.record_join(
                    community_id,
                    inviter_id,
                    member_id,
                    *source,
                    code.as_deref(),
                    recorded_at,
                )?;
                if let Some(reason) = join.flagged_fake {
                    tracing::info!(
                        community_id = community_id.as_str(),
                        inviter_id = inviter_id.as_str(),
                        member_id = member_id.as_str(),
                        ?reason,
                        "Join recorded as fake"
                    );
                }
                IngestOutcome::Credited {
                    inviter_id: inviter_id.clone(),
                    event_id: join.event_id,
                    flagged_fake: join.flagged_fake,
                }
            }
            InviteEvent::MemberLeft {
                community_id,
                member_id,
            } => debit_outcome(self.db.record_leave(community_id, member_id, recorded_at)?),
            InviteEvent::InviteFlaggedFake {
                community_id,
                member_id,
            } => debit_outcome(self.db.record_fake(community_id, member_id, recorded_at)?),
        };

        tracing::debug!(
            community_id = event.community_id(),
            member_id = event.member_id(),
            ?outcome,
            "Invite event recorded"
        );

        Ok(outcome)
    }

    /// Counts for one user. Unknown pairs yield zeroes.
    pub fn get_invite_counts(&self, community_id: &str, user_id: &str) -> Result<InviteCounts> {
        let tally = self.db.invite_tally(community_id, user_id)?;
        Ok(InviteCounts::from(&tally))
    }

    /// Top inviters by total, ties broken by user ID.
    pub fn top_inviters(&self, community_id: &str, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut entries: Vec<LeaderboardEntry> = self
            .db
            .invite_tallies(community_id)?
            .iter()
            .map(|t| LeaderboardEntry {
                user_id: t.user_id.clone(),
                counts: InviteCounts::from(t),
            })
            .collect();

        entries.sort_by(|a, b| {
            b.counts
                .total()
                .cmp(&a.counts.total())
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Zero a user's counts. Earlier events stay in the log.
    pub fn clear_invites(&self, community_id: &str, user_id: &str, reset_at: i64) -> Result<()> {
        let marker = self.db.reset_invites(community_id, user_id, reset_at)?;
        tracing::info!(community_id, user_id, marker, "Invite counts cleared");
        Ok(())
    }
}

fn debit_outcome(record: crate::storage::AttributionRecord) -> IngestOutcome {
    match record.inviter_id {
        Some(inviter_id) => IngestOutcome::Debited {
            inviter_id,
            event_id: record.event_id,
        },
        None => IngestOutcome::Unattributed {
            event_id: record.event_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invites::InviteSource;

    fn counter() -> InviteCounter {
        InviteCounter::new(Arc::new(Database::open(None).unwrap()))
    }

    fn joined(inviter: &str, member: &str, source: InviteSource) -> InviteEvent {
        InviteEvent::InviteUsed {
            community_id: "guild".into(),
            inviter_id: inviter.into(),
            member_id: member.into(),
            source,
            code: None,
        }
    }

    fn left(member: &str) -> InviteEvent {
        InviteEvent::MemberLeft {
            community_id: "guild".into(),
            member_id: member.into(),
        }
    }

    #[test]
    fn test_counts_follow_events() {
        let counter = counter();
        counter.ingest(&joined("alice", "bob", InviteSource::Regular), 1).unwrap();
        counter.ingest(&joined("alice", "carol", InviteSource::Regular), 2).unwrap();
        counter.ingest(&joined("alice", "dave", InviteSource::Custom), 3).unwrap();
        counter.ingest(&left("bob"), 4).unwrap();
        counter
            .ingest(
                &InviteEvent::InviteFlaggedFake {
                    community_id: "guild".into(),
                    member_id: "carol".into(),
                },
                5,
            )
            .unwrap();

        let counts = counter.get_invite_counts("guild", "alice").unwrap();
        assert_eq!(
            counts,
            InviteCounts {
                regular: 2,
                custom: 1,
                fake: 1,
                leave: 1
            }
        );
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_self_invite_then_leave_nets_zero() {
        let counter = counter();
        counter.ingest(&joined("alice", "alice", InviteSource::Regular), 1).unwrap();
        let outcome = counter.ingest(&left("alice"), 2).unwrap();
        assert_eq!(outcome.affected_inviter(), None);

        let counts = counter.get_invite_counts("guild", "alice").unwrap();
        assert_eq!(
            counts,
            InviteCounts {
                regular: 1,
                custom: 0,
                fake: 1,
                leave: 0
            }
        );
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn test_flagged_member_leaving_is_not_debited_twice() {
        let counter = counter();
        counter.ingest(&joined("alice", "bob", InviteSource::Regular), 1).unwrap();
        counter
            .ingest(
                &InviteEvent::InviteFlaggedFake {
                    community_id: "guild".into(),
                    member_id: "bob".into(),
                },
                2,
            )
            .unwrap();
        counter.ingest(&left("bob"), 3).unwrap();

        let counts = counter.get_invite_counts("guild", "alice").unwrap();
        assert_eq!((counts.fake, counts.leave), (1, 0));
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn test_outcome_names_affected_inviter() {
        let counter = counter();
        let credited = counter.ingest(&joined("alice", "bob", InviteSource::Regular), 1).unwrap();
        assert_eq!(credited.affected_inviter(), Some("alice"));

        let debited = counter.ingest(&left("bob"), 2).unwrap();
        assert_eq!(debited.affected_inviter(), Some("alice"));

        let orphan = counter.ingest(&left("nobody"), 3).unwrap();
        assert_eq!(orphan.affected_inviter(), None);
    }

    #[test]
    fn test_invalid_event_is_not_recorded() {
        let counter = counter();
        let result = counter.ingest(&left(""), 1);
        assert!(result.is_err());
        assert_eq!(counter.db.invite_event_count().unwrap(), 0);
    }

    #[test]
    fn test_leaderboard_orders_by_total_then_id() {
        let counter = counter();
        counter.ingest(&joined("bob", "m1", InviteSource::Regular), 1).unwrap();
        counter.ingest(&joined("alice", "m2", InviteSource::Regular), 2).unwrap();
        counter.ingest(&joined("carol", "m3", InviteSource::Regular), 3).unwrap();
        counter.ingest(&joined("carol", "m4", InviteSource::Custom), 4).unwrap();

        let top = counter.top_inviters("guild", 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, "carol");
        assert_eq!(top[0].counts.total(), 2);
        assert_eq!(top[1].user_id, "alice");
    }

    #[test]
    fn test_clear_invites_zeroes_counts() {
        let counter = counter();
        counter.ingest(&joined("alice", "bob", InviteSource::Regular), 1).unwrap();
        counter.clear_invites("guild", "alice", 2).unwrap();
        assert_eq!(counter.get_invite_counts("guild", "alice").unwrap().total(), 0);

        // A member invited before the reset leaving does not reach the new counts
        counter.ingest(&left("bob"), 3).unwrap();
        assert_eq!(
            counter.get_invite_counts("guild", "alice").unwrap(),
            InviteCounts::default()
        );

        counter.ingest(&joined("alice", "carol", InviteSource::Regular), 4).unwrap();
        counter.ingest(&left("carol"), 5).unwrap();
        let counts = counter.get_invite_counts("guild", "alice").unwrap();
        assert_eq!((counts.regular, counts.leave, counts.total()), (1, 1, 0));
    }
}
