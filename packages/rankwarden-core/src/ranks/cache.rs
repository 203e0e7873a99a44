//! Rank table cache with a bounded staleness window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use super::Rank;

/// Default staleness window for cached rank tables.
pub const DEFAULT_RANK_CACHE_TTL: Duration = Duration::from_secs(5);

struct CachedTable {
    loaded_at: Instant,
    ranks: Arc<Vec<Rank>>,
}

/// Community ID → rank table, each entry valid for `ttl` after loading.
pub struct RankCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedTable>>,
}

impl RankCache {
    /// Create a cache with the given staleness window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached table if it was loaded within the window.
    pub fn get(&self, community_id: &str) -> Option<Arc<Vec<Rank>>> {
        let entries = self.entries.read();
        entries
            .get(community_id)
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.ranks))
    }

    /// Store a freshly loaded table.
    pub fn insert(&self, community_id: &str, ranks: Vec<Rank>) -> Arc<Vec<Rank>> {
        let ranks = Arc::new(ranks);
        self.entries.write().insert(
            community_id.to_string(),
            CachedTable {
                loaded_at: Instant::now(),
                ranks: Arc::clone(&ranks),
            },
        );
        ranks
    }

    /// Drop a community's entry after an administrative edit.
    pub fn invalidate(&self, community_id: &str) {
        self.entries.write().remove(community_id);
    }
}

impl Default for RankCache {
    fn default() -> Self {
        Self::new(DEFAULT_RANK_CACHE_TTL)
    }
}
