//! # Role Reconciler
//!
//! Computes the difference between the roles a member holds and the roles
//! their invite total entitles them to. Pure: the member's roles come in as
//! a [`MemberSnapshot`] and the plan goes out as a [`PromotionResult`];
//! nothing here talks to the platform.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     RECONCILIATION (total = 20)                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   rank       threshold   qualifies   held   →  plan                     │
//! │   ────────   ─────────   ─────────   ────      ──────────────────       │
//! │   Newcomer        0         yes       no       should_have              │
//! │   Bronze         10         yes       yes      (keep)                   │
//! │   Gold           50         no        yes      should_not_have          │
//! │   Staff         100         no        no       (nothing)                │
//! │                                                                         │
//! │   dangerous = hazard(should_have ∪ held rank roles)                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::RoleHazard;
use crate::platform::MemberSnapshot;
use crate::ranks::{resolve_rank, Rank};

/// The reconciliation plan for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionResult {
    /// Highest rank reached, if any
    pub current_rank: Option<Rank>,
    /// Next rank to reach, `None` at the top
    pub next_rank: Option<Rank>,
    /// Number of configured ranks
    pub num_ranks: usize,
    /// Qualifying ranks whose role the member lacks, in table order
    pub should_have: Vec<Rank>,
    /// Held rank roles whose threshold the member no longer meets
    pub should_not_have: Vec<String>,
    /// Rank roles that must not be mutated automatically
    pub dangerous: Vec<String>,
}

impl PromotionResult {
    /// Roles to grant automatically: `should_have` minus dangerous ones.
    pub fn grants(&self) -> impl Iterator<Item = &str> + '_ {
        self.should_have
            .iter()
            .map(|r| r.role_id.as_str())
            .filter(move |role| !self.is_dangerous(role))
    }

    /// Roles to revoke automatically: `should_not_have` minus dangerous ones.
    pub fn revocations(&self) -> impl Iterator<Item = &str> + '_ {
        self.should_not_have
            .iter()
            .map(String::as_str)
            .filter(move |role| !self.is_dangerous(role))
    }

    /// Whether the role was flagged.
    pub fn is_dangerous(&self, role_id: &str) -> bool {
        self.dangerous.iter().any(|r| r == role_id)
    }

    /// Nothing to grant or revoke automatically.
    pub fn is_settled(&self) -> bool {
        self.grants().next().is_none() && self.revocations().next().is_none()
    }
}

/// Plan the role changes implied by `total`.
///
/// Returns `None` when the community has no ranks. Ranks are cumulative: a
/// member keeps every rank role at or below their total, not just the
/// highest. A role is only revoked when no qualifying rank maps to it.
pub fn promote_if_qualified(
    ranks: &[Rank],
    member: &MemberSnapshot,
    total: i64,
    hazard: &dyn RoleHazard,
) -> Option<PromotionResult> {
    if ranks.is_empty() {
        return None;
    }

    let resolution = resolve_rank(total, ranks);

    let qualified: HashSet<&str> = ranks
        .iter()
        .filter(|r| r.num_invites <= total)
        .map(|r| r.role_id.as_str())
        .collect();

    let mut should_have: Vec<Rank> = Vec::new();
    let mut should_not_have: Vec<String> = Vec::new();
    let mut dangerous: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for rank in ranks {
        let role = rank.role_id.as_str();
        if !seen.insert(role) {
            continue;
        }

        let held = member.has_role(role);
        let qualifies = qualified.contains(role);

        if qualifies && !held {
            should_have.push(rank.clone());
        } else if !qualifies && held {
            should_not_have.push(role.to_string());
        }

        // Held rank roles and pending grants are the only candidates.
        if (held || qualifies) && hazard.is_dangerous(role) {
            dangerous.push(role.to_string());
        }
    }

    let result = PromotionResult {
        current_rank: resolution.current_rank,
        next_rank: resolution.next_rank,
        num_ranks: resolution.num_ranks,
        should_have,
        should_not_have,
        dangerous,
    };

    #[cfg(feature = "verbose-logging")]
    tracing::trace!(user_id = member.user_id.as_str(), total, ?result, "Promotion plan");

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::NoHazard;

    fn rank(n: i64, role: &str) -> Rank {
        Rank::new(n, role, format!("Rank {}", n)).unwrap()
    }

    fn table() -> Vec<Rank> {
        vec![rank(0, "r0"), rank(10, "r10"), rank(50, "r50")]
    }

    fn member(roles: &[&str]) -> MemberSnapshot {
        MemberSnapshot::new("bob", roles.iter().copied())
    }

    fn roles_of(ranks: &[Rank]) -> Vec<&str> {
        ranks.iter().map(|r| r.role_id.as_str()).collect()
    }

    #[test]
    fn test_no_ranks_returns_none() {
        assert!(promote_if_qualified(&[], &member(&[]), 100, &NoHazard).is_none());
    }

    #[test]
    fn test_cumulative_ranks() {
        let plan = promote_if_qualified(&table(), &member(&[]), 50, &NoHazard).unwrap();
        assert_eq!(roles_of(&plan.should_have), vec!["r0", "r10", "r50"]);
        assert!(plan.should_not_have.is_empty());
        assert!(plan.next_rank.is_none());
        assert_eq!(plan.num_ranks, 3);
    }

    #[test]
    fn test_demotion_only_removes_lost_threshold() {
        let plan =
            promote_if_qualified(&table(), &member(&["r0", "r10", "r50"]), 20, &NoHazard).unwrap();
        assert!(plan.should_have.is_empty());
        assert_eq!(plan.should_not_have, vec!["r50".to_string()]);
        assert_eq!(plan.next_rank.unwrap().role_id, "r50");
    }

    #[test]
    fn test_unrelated_roles_untouched() {
        let plan =
            promote_if_qualified(&table(), &member(&["moderator", "r0"]), 5, &NoHazard).unwrap();
        assert!(plan.should_not_have.is_empty());
        assert!(plan.should_have.is_empty());
        assert!(plan.is_settled());
    }

    #[test]
    fn test_idempotent_plan() {
        let ranks = table();
        let snapshot = member(&["r50", "vip"]);
        let hazard = |role: &str| role == "r10";
        let first = promote_if_qualified(&ranks, &snapshot, 12, &hazard);
        let second = promote_if_qualified(&ranks, &snapshot, 12, &hazard);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dangerous_roles_flagged_but_rest_still_planned() {
        let hazard = |role: &str| role == "r10";
        let plan = promote_if_qualified(&table(), &member(&[]), 60, &hazard).unwrap();

        assert_eq!(plan.dangerous, vec!["r10".to_string()]);
        assert_eq!(roles_of(&plan.should_have), vec!["r0", "r10", "r50"]);
        assert_eq!(plan.grants().collect::<Vec<_>>(), vec!["r0", "r50"]);
    }

    #[test]
    fn test_held_dangerous_role_is_flagged_and_not_revoked() {
        let hazard = |role: &str| role == "r50";
        let plan = promote_if_qualified(&table(), &member(&["r0", "r50"]), 3, &hazard).unwrap();

        assert_eq!(plan.should_not_have, vec!["r50".to_string()]);
        assert_eq!(plan.dangerous, vec!["r50".to_string()]);
        assert_eq!(plan.revocations().count(), 0);
    }

    #[test]
    fn test_dangerous_role_outside_plan_and_not_held_is_ignored() {
        let hazard = |role: &str| role == "r50";
        let plan = promote_if_qualified(&table(), &member(&[]), 3, &hazard).unwrap();
        assert!(plan.dangerous.is_empty());
    }

    #[test]
    fn test_role_shared_by_two_ranks_is_kept_while_any_qualifies() {
        let ranks = vec![rank(5, "shared"), rank(30, "shared"), rank(40, "r40")];
        let plan = promote_if_qualified(&ranks, &member(&["shared"]), 10, &NoHazard).unwrap();
        assert!(plan.should_not_have.is_empty());

        let plan = promote_if_qualified(&ranks, &member(&[]), 10, &NoHazard).unwrap();
        assert_eq!(roles_of(&plan.should_have), vec!["shared"]);
    }

    #[test]
    fn test_negative_total_revokes_every_rank_role() {
        let plan =
            promote_if_qualified(&table(), &member(&["r0", "r10"]), -1, &NoHazard).unwrap();
        assert_eq!(plan.should_not_have, vec!["r0".to_string(), "r10".to_string()]);
        assert!(plan.current_rank.is_none());
    }
}
