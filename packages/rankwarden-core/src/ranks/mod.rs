//! # Rank System
//!
//! Per-community tables mapping invite thresholds to roles, the pure
//! resolver over them, and a bounded-staleness cache.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          RANK TABLE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   threshold:   0          10          50          100                   │
//! │                │           │           │           │                    │
//! │   total = 23 ──┼───────────┼──►●       │           │                    │
//! │                │           │   ▲       │                                │
//! │            current_rank ───┘   └─── next_rank (27 to go)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod resolver;

pub use cache::{RankCache, DEFAULT_RANK_CACHE_TTL};
pub use resolver::{check_rank_table, resolve_rank, RankResolution};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::RankRecord;

/// A configured invite threshold mapped to a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rank {
    /// Minimum total invites required
    pub num_invites: i64,
    /// Platform role granted at this rank
    pub role_id: String,
    /// Display name
    pub name: String,
}

impl Rank {
    /// Build a rank, rejecting negative thresholds and empty role IDs.
    pub fn new(num_invites: i64, role_id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let role_id = role_id.into();
        if num_invites < 0 {
            return Err(Error::InvalidRank(format!(
                "threshold must be >= 0, got {}",
                num_invites
            )));
        }
        if role_id.trim().is_empty() {
            return Err(Error::InvalidRank("role is empty".to_string()));
        }
        Ok(Self {
            num_invites,
            role_id,
            name: name.into(),
        })
    }
}

impl From<RankRecord> for Rank {
    fn from(record: RankRecord) -> Self {
        Self {
            num_invites: record.num_invites,
            role_id: record.role_id,
            name: record.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_validation() {
        assert!(Rank::new(0, "role", "Newcomer").is_ok());
        assert!(matches!(Rank::new(-1, "role", "x"), Err(Error::InvalidRank(_))));
        assert!(matches!(Rank::new(5, "  ", "x"), Err(Error::InvalidRank(_))));
    }
}
