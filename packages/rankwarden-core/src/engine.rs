//! # Engine
//!
//! Async facade over the counter, rank tables and reconciler.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     RECONCILE ONE MEMBER                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  get_member ──► None ─────────────────────────────► Skipped            │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  get_invite_counts ──► ranks (cache) ──► role catalog (hazard)         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                   promote_if_qualified (pure)                           │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                   apply_plan: grant / revoke, each independent          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every store and platform call runs under its own deadline. Store work is
//! blocking SQLite and is moved to the blocking pool. A deadline that
//! expires surfaces as [`Error::Timeout`]; counts are never zero-filled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::invites::{IngestOutcome, InviteCounter, InviteCounts, InviteEvent, LeaderboardEntry};
use crate::platform::{MemberSnapshot, MembershipClient};
use crate::ranks::{
    check_rank_table, resolve_rank, Rank, RankCache, RankResolution, DEFAULT_RANK_CACHE_TTL,
};
use crate::roles::{promote_if_qualified, NoHazard, PermissionHazard, Permissions, PromotionResult};
use crate::storage::Database;

/// Default deadline for a single store operation.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default deadline for a single platform call.
const DEFAULT_PLATFORM_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for each store read or write
    pub store_timeout: Duration,
    /// Deadline for each platform call
    pub platform_timeout: Duration,
    /// How long a loaded rank table may be served from cache
    pub rank_cache_ttl: Duration,
    /// Roles carrying any of these permissions are flagged, never mutated.
    /// Empty means no role is dangerous.
    pub dangerous_permissions: Permissions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            platform_timeout: DEFAULT_PLATFORM_TIMEOUT,
            rank_cache_ttl: DEFAULT_RANK_CACHE_TTL,
            dangerous_permissions: Permissions::NONE,
        }
    }
}

/// Outcome of applying a plan's mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Roles granted
    pub granted: Vec<String>,
    /// Roles revoked
    pub revoked: Vec<String>,
    /// Roles whose mutation failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Why a member was not reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The user is no longer in the community
    NotMember,
    /// Bots do not hold rank roles
    Bot,
}

/// Result of [`Engine::reconcile_member`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reconciliation {
    /// Nothing was computed
    Skipped {
        /// Why
        reason: SkipReason,
    },
    /// The community has no ranks
    Unranked {
        /// The member's counts
        counts: InviteCounts,
    },
    /// A plan was computed and, if requested, applied
    Planned {
        /// The member's counts
        counts: InviteCounts,
        /// Role changes the member needs
        plan: PromotionResult,
        /// Mutations made, when applying was requested and there was work
        applied: Option<ApplyOutcome>,
    },
}

/// The invite accounting and rank reconciliation engine.
pub struct Engine {
    db: Arc<Database>,
    counter: InviteCounter,
    rank_cache: RankCache,
    platform: Arc<dyn MembershipClient>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over a database and a platform client.
    pub fn new(db: Arc<Database>, platform: Arc<dyn MembershipClient>, config: EngineConfig) -> Self {
        Self {
            counter: InviteCounter::new(Arc::clone(&db)),
            rank_cache: RankCache::new(config.rank_cache_ttl),
            db,
            platform,
            config,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // DEADLINES
    // ========================================================================

    async fn with_store<T, F>(&self, what: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&InviteCounter, &Database) -> Result<T> + Send + 'static,
    {
        let counter = self.counter.clone();
        let db = Arc::clone(&self.db);
        let task = tokio::task::spawn_blocking(move || op(&counter, &db));

        match tokio::time::timeout(self.config.store_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                tracing::warn!(operation = what, "Store operation timed out");
                Err(Error::Timeout(format!("store {}", what)))
            }
        }
    }

    async fn with_platform<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.platform_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation = what, "Platform call timed out");
                Err(Error::Timeout(format!("platform {}", what)))
            }
        }
    }

    // ========================================================================
    // INVITE ACCOUNTING
    // ========================================================================

    /// Append a platform event to the log.
    pub async fn ingest(&self, event: InviteEvent) -> Result<IngestOutcome> {
        let now = crate::time::now_timestamp();
        self.with_store("ingest", move |counter, _| counter.ingest(&event, now))
            .await
    }

    /// Categorized counts for one user.
    pub async fn get_invite_counts(&self, community_id: &str, user_id: &str) -> Result<InviteCounts> {
        let (community_id, user_id) = (community_id.to_string(), user_id.to_string());
        self.with_store("get_invite_counts", move |counter, _| {
            counter.get_invite_counts(&community_id, &user_id)
        })
        .await
    }

    /// Top inviters of a community.
    pub async fn top_inviters(&self, community_id: &str, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let community_id = community_id.to_string();
        self.with_store("top_inviters", move |counter, _| {
            counter.top_inviters(&community_id, limit)
        })
        .await
    }

    /// Zero a user's counts.
    pub async fn clear_invites(&self, community_id: &str, user_id: &str) -> Result<()> {
        let (community_id, user_id) = (community_id.to_string(), user_id.to_string());
        let now = crate::time::now_timestamp();
        self.with_store("clear_invites", move |counter, _| {
            counter.clear_invites(&community_id, &user_id, now)
        })
        .await
    }

    // ========================================================================
    // RANK TABLES
    // ========================================================================

    /// The community's ranks in table order, possibly a few seconds stale.
    pub async fn ranks(&self, community_id: &str) -> Result<Arc<Vec<Rank>>> {
        if let Some(ranks) = self.rank_cache.get(community_id) {
            return Ok(ranks);
        }

        let key = community_id.to_string();
        let ranks: Vec<Rank> = self
            .with_store("get_ranks", move |_, db| {
                Ok(db.get_ranks(&key)?.into_iter().map(Rank::from).collect())
            })
            .await?;

        if let Err(e) = check_rank_table(&ranks) {
            tracing::warn!(community_id, "{}", e);
        }

        Ok(self.rank_cache.insert(community_id, ranks))
    }

    /// The community's ranks as an owned list, in table order.
    pub async fn list_ranks(&self, community_id: &str) -> Result<Vec<Rank>> {
        Ok(self.ranks(community_id).await?.as_ref().clone())
    }

    /// Add a rank or replace the rank at the same threshold.
    pub async fn set_rank(&self, community_id: &str, rank: Rank) -> Result<Rank> {
        let rank = Rank::new(rank.num_invites, rank.role_id, rank.name)?;
        let key = community_id.to_string();
        let now = crate::time::now_timestamp();
        let stored = self
            .with_store("set_rank", move |_, db| {
                db.upsert_rank(&key, rank.num_invites, &rank.role_id, &rank.name, now)
            })
            .await?;
        self.rank_cache.invalidate(community_id);

        tracing::info!(
            community_id,
            num_invites = stored.num_invites,
            role_id = stored.role_id.as_str(),
            "Rank set"
        );
        Ok(Rank::from(stored))
    }

    /// Remove the rank at a threshold. Returns whether one existed.
    pub async fn remove_rank(&self, community_id: &str, num_invites: i64) -> Result<bool> {
        let key = community_id.to_string();
        let removed = self
            .with_store("remove_rank", move |_, db| db.delete_rank(&key, num_invites))
            .await?;
        self.rank_cache.invalidate(community_id);
        Ok(removed)
    }

    /// Where a total sits in the community's rank table.
    pub async fn resolve_rank(&self, community_id: &str, total: i64) -> Result<RankResolution> {
        let ranks = self.ranks(community_id).await?;
        Ok(resolve_rank(total, &ranks))
    }

    // ========================================================================
    // RECONCILIATION
    // ========================================================================

    /// Plan role changes for a member whose snapshot the caller already has.
    ///
    /// `None` when the community has no ranks. The caller is responsible for
    /// checking that the member is still in the community.
    pub async fn promote_if_qualified(
        &self,
        community_id: &str,
        member: &MemberSnapshot,
        total: i64,
    ) -> Result<Option<PromotionResult>> {
        let ranks = self.ranks(community_id).await?;
        if ranks.is_empty() {
            return Ok(None);
        }

        let mask = self.config.dangerous_permissions;
        if mask.is_empty() {
            return Ok(promote_if_qualified(&ranks, member, total, &NoHazard));
        }

        let catalog = self
            .with_platform(
                "get_role_permissions",
                self.platform.get_role_permissions(community_id),
            )
            .await?;
        let hazard = PermissionHazard::new(mask, catalog);
        Ok(promote_if_qualified(&ranks, member, total, &hazard))
    }

    /// Grant and revoke the plan's non-dangerous roles.
    ///
    /// Each mutation is attempted on its own; one failure does not stop the
    /// rest of the batch.
    pub async fn apply_plan(
        &self,
        community_id: &str,
        user_id: &str,
        plan: &PromotionResult,
    ) -> ApplyOutcome {
        let grants = plan.grants().map(|role| async move {
            let result = self
                .with_platform("grant_role", self.platform.grant_role(community_id, user_id, role))
                .await;
            (role, result)
        });
        let revokes = plan.revocations().map(|role| async move {
            let result = self
                .with_platform("revoke_role", self.platform.revoke_role(community_id, user_id, role))
                .await;
            (role, result)
        });

        let (granted, revoked) = futures::future::join(
            futures::future::join_all(grants),
            futures::future::join_all(revokes),
        )
        .await;

        let mut outcome = ApplyOutcome::default();
        for (role, result) in granted {
            match result {
                Ok(()) => outcome.granted.push(role.to_string()),
                Err(e) => outcome.failed.push((role.to_string(), e.to_string())),
            }
        }
        for (role, result) in revoked {
            match result {
                Ok(()) => outcome.revoked.push(role.to_string()),
                Err(e) => outcome.failed.push((role.to_string(), e.to_string())),
            }
        }

        if !outcome.failed.is_empty() {
            tracing::warn!(
                community_id,
                user_id,
                failed = outcome.failed.len(),
                "Some role mutations failed"
            );
        }
        if !plan.dangerous.is_empty() {
            tracing::info!(
                community_id,
                user_id,
                dangerous = ?plan.dangerous,
                "Dangerous rank roles left for manual review"
            );
        }

        outcome
    }

    /// Fetch, count, plan and optionally apply for one member.
    pub async fn reconcile_member(
        &self,
        community_id: &str,
        user_id: &str,
        apply: bool,
    ) -> Result<Reconciliation> {
        let member = match self.reconcilable_member(community_id, user_id).await? {
            Ok(member) => member,
            Err(reason) => return Ok(Reconciliation::Skipped { reason }),
        };
        let counts = self.get_invite_counts(community_id, user_id).await?;
        self.plan_member(community_id, &member, counts, apply).await
    }

    /// Same as [`Engine::reconcile_member`], planning from counts the caller
    /// has already read so replies and role changes agree on one total.
    pub async fn reconcile_member_with_counts(
        &self,
        community_id: &str,
        user_id: &str,
        counts: InviteCounts,
        apply: bool,
    ) -> Result<Reconciliation> {
        let member = match self.reconcilable_member(community_id, user_id).await? {
            Ok(member) => member,
            Err(reason) => return Ok(Reconciliation::Skipped { reason }),
        };
        self.plan_member(community_id, &member, counts, apply).await
    }

    async fn reconcilable_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<std::result::Result<MemberSnapshot, SkipReason>> {
        let member = self
            .with_platform("get_member", self.platform.get_member(community_id, user_id))
            .await?;

        Ok(match member {
            Some(m) if m.bot => Err(SkipReason::Bot),
            Some(m) => Ok(m),
            None => {
                tracing::debug!(community_id, user_id, "Member gone; skipping reconciliation");
                Err(SkipReason::NotMember)
            }
        })
    }

    async fn plan_member(
        &self,
        community_id: &str,
        member: &MemberSnapshot,
        counts: InviteCounts,
        apply: bool,
    ) -> Result<Reconciliation> {
        let plan = match self
            .promote_if_qualified(community_id, member, counts.total())
            .await?
        {
            Some(plan) => plan,
            None => return Ok(Reconciliation::Unranked { counts }),
        };

        let applied = if apply && !plan.is_settled() {
            Some(self.apply_plan(community_id, &member.user_id, &plan).await)
        } else {
            None
        };

        Ok(Reconciliation::Planned {
            counts,
            plan,
            applied,
        })
    }
}
