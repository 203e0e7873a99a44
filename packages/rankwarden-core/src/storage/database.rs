//! # Database
//!
//! SQLite wrapper holding the invite event log and the rank tables.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  InviteCounter  │  ingest / counts / leaderboard / reset            │
//! │  │  Engine (ranks) │  list / set / remove                              │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  One transaction per appended event               │
//! │  │   (this file)   │  One aggregate statement per count read           │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  In-memory for tests, file for production         │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::Arc;

use super::schema;
use crate::error::{Error, Result};
use crate::invites::{FakeReason, InviteSource};

/// The main database handle
///
/// Wraps a single SQLite connection. Every method takes the lock for the
/// duration of one statement or one transaction, so concurrent appends for
/// the same key are serialized and never lost.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Per-user category tallies summed from the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteTallyRecord {
    /// Inviter the tallies belong to
    pub user_id: String,
    /// Joins through regular invite links
    pub regular: i64,
    /// Joins through vanity/custom codes
    pub custom: i64,
    /// Joins flagged as fake
    pub fake: i64,
    /// Invited members who left
    pub leave: i64,
}

/// A stored rank row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRecord {
    /// Row ID (insertion order)
    pub id: i64,
    /// Community the rank belongs to
    pub community_id: String,
    /// Threshold
    pub num_invites: i64,
    /// Role granted at this threshold
    pub role_id: String,
    /// Display name
    pub name: String,
    /// Creation time (unix seconds)
    pub created_at: i64,
}

/// Result of appending a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRecord {
    /// Event ID of the join row
    pub event_id: i64,
    /// Set when the join was also recorded as fake
    pub flagged_fake: Option<FakeReason>,
}

/// Result of appending a leave or a fake flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    /// Event ID of the appended row
    pub event_id: i64,
    /// Inviter debited by the event, if the member's join could be found
    pub inviter_id: Option<String>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::StoreUnavailable(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::StoreUnavailable(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // The version table may not exist yet on a fresh file.
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::StoreUnavailable(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::StoreUnavailable(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::Misconfiguration(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // INVITE EVENT LOG
    // ========================================================================

    /// Append a join-via-invite.
    ///
    /// In the same transaction, the join is additionally flagged as fake
    /// when the member invited themselves or when the member's newest join
    /// or leave is a join through the same inviter.
    pub fn record_join(
        &self,
        community_id: &str,
        inviter_id: &str,
        member_id: &str,
        source: InviteSource,
        invite_code: Option<&str>,
        recorded_at: i64,
    ) -> Result<JoinRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        // The member's newest join or leave decides whether they are present.
        let latest: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT kind, inviter_id FROM invite_events
                 WHERE community_id = ?1 AND member_id = ?2
                   AND kind IN ('regular', 'custom', 'leave')
                 ORDER BY id DESC LIMIT 1",
                params![community_id, member_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let duplicate = matches!(
            &latest,
            Some((kind, Some(previous))) if kind != "leave" && previous == inviter_id
        );

        tx.execute(
            "INSERT INTO invite_events
             (community_id, inviter_id, member_id, kind, invite_code, join_event_id, recorded_at)
             VALUES (?, ?, ?, ?, ?, NULL, ?)",
            params![
                community_id,
                inviter_id,
                member_id,
                source.as_str(),
                invite_code,
                recorded_at
            ],
        )?;
        let event_id = tx.last_insert_rowid();

        let flagged_fake = if inviter_id == member_id {
            Some(FakeReason::SelfInvite)
        } else if duplicate {
            Some(FakeReason::DuplicateJoin)
        } else {
            None
        };

        if flagged_fake.is_some() {
            insert_debit(&tx, community_id, Some(inviter_id), member_id, "fake", Some(event_id), recorded_at)?;
        }

        tx.commit()?;

        Ok(JoinRecord {
            event_id,
            flagged_fake,
        })
    }

    /// Append a leave, debiting the inviter of the member's newest open join.
    ///
    /// A join is open while it has no leave or fake attached and no leave
    /// follows it. A leave with no open join is stored unattributed and
    /// does not count against anyone.
    pub fn record_leave(
        &self,
        community_id: &str,
        member_id: &str,
        recorded_at: i64,
    ) -> Result<AttributionRecord> {
        self.record_debit(community_id, member_id, "leave", recorded_at)
    }

    /// Append a fake flag for the member's newest open join.
    ///
    /// Attribution follows the same rules as [`Database::record_leave`].
    pub fn record_fake(
        &self,
        community_id: &str,
        member_id: &str,
        recorded_at: i64,
    ) -> Result<AttributionRecord> {
        self.record_debit(community_id, member_id, "fake", recorded_at)
    }

    fn record_debit(
        &self,
        community_id: &str,
        member_id: &str,
        kind: &str,
        recorded_at: i64,
    ) -> Result<AttributionRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        // Each join carries at most one debit.
        let attributed: Option<(i64, String)> = tx
            .query_row(
                "SELECT j.id, j.inviter_id FROM invite_events j
                 WHERE j.community_id = ?1 AND j.member_id = ?2
                   AND j.kind IN ('regular', 'custom') AND j.inviter_id IS NOT NULL
                   AND j.id > COALESCE(
                       (SELECT MAX(l.id) FROM invite_events l
                        WHERE l.community_id = ?1 AND l.member_id = ?2 AND l.kind = 'leave'), 0)
                   AND NOT EXISTS (
                       SELECT 1 FROM invite_events d WHERE d.join_event_id = j.id
                   )
                 ORDER BY j.id DESC LIMIT 1",
                params![community_id, member_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (join_event_id, inviter_id) = match attributed {
            Some((id, inviter)) => (Some(id), Some(inviter)),
            None => (None, None),
        };

        let event_id = insert_debit(
            &tx,
            community_id,
            inviter_id.as_deref(),
            member_id,
            kind,
            join_event_id,
            recorded_at,
        )?;

        tx.commit()?;

        Ok(AttributionRecord {
            event_id,
            inviter_id,
        })
    }

    /// Sum the four categories for one inviter in a single statement.
    ///
    /// Rows are kept when the join they belong to is newer than the user's
    /// reset marker. Unknown pairs yield an all-zero tally.
    pub fn invite_tally(&self, community_id: &str, user_id: &str) -> Result<InviteTallyRecord> {
        let conn = self.conn.lock();

        let tally = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN kind = 'regular' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'custom' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'fake' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'leave' THEN 1 ELSE 0 END), 0)
             FROM invite_events
             WHERE community_id = ?1 AND inviter_id = ?2
               AND COALESCE(join_event_id, id) > COALESCE(
                   (SELECT last_event_id FROM invite_resets
                    WHERE community_id = ?1 AND user_id = ?2), 0)",
            params![community_id, user_id],
            |row| {
                Ok(InviteTallyRecord {
                    user_id: user_id.to_string(),
                    regular: row.get(0)?,
                    custom: row.get(1)?,
                    fake: row.get(2)?,
                    leave: row.get(3)?,
                })
            },
        )?;

        Ok(tally)
    }

    /// Tallies for every inviter of a community, in one statement.
    pub fn invite_tallies(&self, community_id: &str) -> Result<Vec<InviteTallyRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT e.inviter_id,
                SUM(CASE WHEN e.kind = 'regular' THEN 1 ELSE 0 END),
                SUM(CASE WHEN e.kind = 'custom' THEN 1 ELSE 0 END),
                SUM(CASE WHEN e.kind = 'fake' THEN 1 ELSE 0 END),
                SUM(CASE WHEN e.kind = 'leave' THEN 1 ELSE 0 END)
             FROM invite_events e
             LEFT JOIN invite_resets r
               ON r.community_id = e.community_id AND r.user_id = e.inviter_id
             WHERE e.community_id = ? AND e.inviter_id IS NOT NULL
               AND COALESCE(e.join_event_id, e.id) > COALESCE(r.last_event_id, 0)
             GROUP BY e.inviter_id",
        )?;

        let rows = stmt.query_map(params![community_id], |row| {
            Ok(InviteTallyRecord {
                user_id: row.get(0)?,
                regular: row.get(1)?,
                custom: row.get(2)?,
                fake: row.get(3)?,
                leave: row.get(4)?,
            })
        })?;

        let mut tallies = Vec::new();
        for row in rows {
            tallies.push(row?);
        }
        Ok(tallies)
    }

    /// Move the user's reset marker to the newest event in the log.
    ///
    /// Returns the event ID the marker now points at.
    pub fn reset_invites(&self, community_id: &str, user_id: &str, reset_at: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let last_event_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM invite_events",
            [],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO invite_resets (community_id, user_id, last_event_id, reset_at)
             VALUES (?, ?, ?, ?)",
            params![community_id, user_id, last_event_id, reset_at],
        )?;

        Ok(last_event_id)
    }

    /// Total number of rows in the event log (all communities).
    pub fn invite_event_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM invite_events", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // RANK OPERATIONS
    // ========================================================================

    /// Get all ranks for a community in table order (threshold, then insertion).
    pub fn get_ranks(&self, community_id: &str) -> Result<Vec<RankRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, community_id, num_invites, role_id, name, created_at
             FROM ranks WHERE community_id = ? ORDER BY num_invites ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![community_id], |row| {
            Ok(RankRecord {
                id: row.get(0)?,
                community_id: row.get(1)?,
                num_invites: row.get(2)?,
                role_id: row.get(3)?,
                name: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut ranks = Vec::new();
        for row in rows {
            ranks.push(row?);
        }
        Ok(ranks)
    }

    /// Insert a rank, replacing any rank at the same threshold.
    pub fn upsert_rank(
        &self,
        community_id: &str,
        num_invites: i64,
        role_id: &str,
        name: &str,
        created_at: i64,
    ) -> Result<RankRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM ranks WHERE community_id = ? AND num_invites = ?",
            params![community_id, num_invites],
        )?;
        tx.execute(
            "INSERT INTO ranks (community_id, num_invites, role_id, name, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![community_id, num_invites, role_id, name, created_at],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;

        Ok(RankRecord {
            id,
            community_id: community_id.to_string(),
            num_invites,
            role_id: role_id.to_string(),
            name: name.to_string(),
            created_at,
        })
    }

    /// Remove the rank at a threshold. Returns whether a row was deleted.
    pub fn delete_rank(&self, community_id: &str, num_invites: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM ranks WHERE community_id = ? AND num_invites = ?",
            params![community_id, num_invites],
        )?;
        Ok(deleted > 0)
    }
}

fn insert_debit(
    tx: &Transaction<'_>,
    community_id: &str,
    inviter_id: Option<&str>,
    member_id: &str,
    kind: &str,
    join_event_id: Option<i64>,
    recorded_at: i64,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO invite_events
         (community_id, inviter_id, member_id, kind, invite_code, join_event_id, recorded_at)
         VALUES (?, ?, ?, ?, NULL, ?, ?)",
        params![community_id, inviter_id, member_id, kind, join_event_id, recorded_at],
    )?;
    Ok(tx.last_insert_rowid())
}

// ============================================================================
// TESTS
// ============================================================================
