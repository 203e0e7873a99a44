//! In-process membership store.
//!
//! Backs local runs without a platform gateway, and the engine tests. Can be
//! switched offline or told to reject specific roles to exercise failure
//! paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{MemberSnapshot, MembershipClient};
use crate::error::{Error, Result};
use crate::roles::Permissions;

/// Membership held in memory.
#[derive(Default)]
pub struct InMemoryMembership {
    /// (community, user) → snapshot
    members: RwLock<HashMap<(String, String), MemberSnapshot>>,
    /// community → role → permissions
    roles: RwLock<HashMap<String, HashMap<String, Permissions>>>,
    /// Role IDs whose mutations fail
    failing_roles: RwLock<HashSet<String>>,
    offline: AtomicBool,
    mutations: AtomicUsize,
}

impl InMemoryMembership {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member.
    pub fn upsert_member(&self, community_id: &str, member: MemberSnapshot) {
        self.members
            .write()
            .insert((community_id.to_string(), member.user_id.clone()), member);
    }

    /// Remove a member.
    pub fn remove_member(&self, community_id: &str, user_id: &str) {
        self.members
            .write()
            .remove(&(community_id.to_string(), user_id.to_string()));
    }

    /// Declare a role and its permissions.
    pub fn define_role(&self, community_id: &str, role_id: &str, permissions: Permissions) {
        self.roles
            .write()
            .entry(community_id.to_string())
            .or_default()
            .insert(role_id.to_string(), permissions);
    }

    /// Make every call fail with `PlatformUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make grants and revokes of this role fail.
    pub fn fail_role(&self, role_id: &str) {
        self.failing_roles.write().insert(role_id.to_string());
    }

    /// Number of successful grant/revoke calls so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Snapshot without going through the async trait.
    pub fn member(&self, community_id: &str, user_id: &str) -> Option<MemberSnapshot> {
        self.members
            .read()
            .get(&(community_id.to_string(), user_id.to_string()))
            .cloned()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::PlatformUnavailable("membership store offline".to_string()));
        }
        Ok(())
    }

    fn mutate(
        &self,
        community_id: &str,
        user_id: &str,
        role_id: &str,
        apply: impl FnOnce(&mut MemberSnapshot),
    ) -> Result<()> {
        self.check_online()?;
        if self.failing_roles.read().contains(role_id) {
            return Err(Error::PlatformUnavailable(format!(
                "role {} rejected by platform",
                role_id
            )));
        }

        let mut members = self.members.write();
        let member = members
            .get_mut(&(community_id.to_string(), user_id.to_string()))
            .ok_or_else(|| {
                Error::PlatformUnavailable(format!("unknown member {} in {}", user_id, community_id))
            })?;
        apply(member);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MembershipClient for InMemoryMembership {
    async fn get_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberSnapshot>> {
        self.check_online()?;
        Ok(self.member(community_id, user_id))
    }

    async fn grant_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        self.mutate(community_id, user_id, role_id, |m| {
            m.roles.insert(role_id.to_string());
        })
    }

    async fn revoke_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        self.mutate(community_id, user_id, role_id, |m| {
            m.roles.remove(role_id);
        })
    }

    async fn get_role_permissions(
        &self,
        community_id: &str,
    ) -> Result<HashMap<String, Permissions>> {
        self.check_online()?;
        Ok(self
            .roles
            .read()
            .get(community_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_and_revoke_are_set_operations() {
        let platform = InMemoryMembership::new();
        platform.upsert_member("guild", MemberSnapshot::new("bob", ["r0"]));

        platform.grant_role("guild", "bob", "r10").await.unwrap();
        platform.grant_role("guild", "bob", "r10").await.unwrap();
        platform.revoke_role("guild", "bob", "r0").await.unwrap();
        platform.revoke_role("guild", "bob", "r0").await.unwrap();

        let member = platform.get_member("guild", "bob").await.unwrap().unwrap();
        assert_eq!(member.roles.iter().collect::<Vec<_>>(), vec!["r10"]);
    }

    #[tokio::test]
    async fn test_offline_store_fails_retryably() {
        let platform = InMemoryMembership::new();
        platform.set_offline(true);
        let err = platform.get_member("guild", "bob").await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_unknown_member_is_none() {
        let platform = InMemoryMembership::new();
        assert!(platform.get_member("guild", "ghost").await.unwrap().is_none());
    }
}
