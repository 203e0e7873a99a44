//! Pure rank resolution.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Rank;
use crate::error::{Error, Result};

/// Where a total sits in a rank table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResolution {
    /// Highest rank whose threshold is `<= total`
    pub current_rank: Option<Rank>,
    /// Lowest rank whose threshold is `> total`; `None` at the top
    pub next_rank: Option<Rank>,
    /// Number of ranks in the table
    pub num_ranks: usize,
}

impl RankResolution {
    /// Invites still needed to reach the next rank.
    pub fn invites_to_next(&self, total: i64) -> Option<i64> {
        self.next_rank.as_ref().map(|r| r.num_invites - total)
    }

    /// Ranks are configured and the total already meets the top threshold.
    pub fn is_highest_rank(&self) -> bool {
        self.num_ranks > 0 && self.next_rank.is_none()
    }
}

/// Check that thresholds are unique.
pub fn check_rank_table(ranks: &[Rank]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ranks.len());
    for rank in ranks {
        if !seen.insert(rank.num_invites) {
            return Err(Error::Misconfiguration(format!(
                "duplicate rank threshold {}",
                rank.num_invites
            )));
        }
    }
    Ok(())
}

/// Map a total onto a rank table.
///
/// Linear scan. Among ranks sharing a threshold the first in table order
/// wins, so a misconfigured table still resolves deterministically.
pub fn resolve_rank(total: i64, ranks: &[Rank]) -> RankResolution {
    if let Err(e) = check_rank_table(ranks) {
        tracing::warn!("{}; using first rank in table order", e);
    }

    let mut current_rank: Option<&Rank> = None;
    let mut next_rank: Option<&Rank> = None;

    for rank in ranks {
        if rank.num_invites <= total {
            if current_rank.map_or(true, |c| rank.num_invites > c.num_invites) {
                current_rank = Some(rank);
            }
        } else if next_rank.map_or(true, |n| rank.num_invites < n.num_invites) {
            next_rank = Some(rank);
        }
    }

    RankResolution {
        current_rank: current_rank.cloned(),
        next_rank: next_rank.cloned(),
        num_ranks: ranks.len(),
    }
}
