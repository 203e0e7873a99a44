//! # Platform Collaborator
//!
//! The chat platform owns membership and roles. The engine reaches it only
//! through [`MembershipClient`]; every call is idempotent and may be retried.

mod memory;

pub use memory::InMemoryMembership;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::roles::Permissions;

/// A member's roles at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// Platform user ID
    pub user_id: String,
    /// Role IDs currently held
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

impl MemberSnapshot {
    /// Build a human member snapshot.
    pub fn new<I, S>(user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            bot: false,
        }
    }

    /// Whether the member holds the role.
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.contains(role_id)
    }
}

/// Membership and role operations on the chat platform.
#[async_trait]
pub trait MembershipClient: Send + Sync {
    /// Current member snapshot, or `None` if the user is not in the community.
    async fn get_member(&self, community_id: &str, user_id: &str)
        -> Result<Option<MemberSnapshot>>;

    /// Add a role to a member. Granting a held role is a no-op.
    async fn grant_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()>;

    /// Remove a role from a member. Revoking a missing role is a no-op.
    async fn revoke_role(&self, community_id: &str, user_id: &str, role_id: &str) -> Result<()>;

    /// Role ID → permission bitfield for every role in the community.
    async fn get_role_permissions(&self, community_id: &str)
        -> Result<HashMap<String, Permissions>>;
}
