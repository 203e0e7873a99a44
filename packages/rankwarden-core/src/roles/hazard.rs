//! Dangerous-role predicates.
//!
//! Which roles count as dangerous is operator policy. The reconciler only
//! asks a [`RoleHazard`]; it never inspects permissions itself.

use std::collections::HashMap;

use super::Permissions;

/// Decides whether automatically granting or revoking a role needs a human.
pub trait RoleHazard: Send + Sync {
    /// `true` if the role must be flagged instead of mutated.
    fn is_dangerous(&self, role_id: &str) -> bool;
}

impl<F> RoleHazard for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_dangerous(&self, role_id: &str) -> bool {
        self(role_id)
    }
}

/// Flags nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHazard;

impl RoleHazard for NoHazard {
    fn is_dangerous(&self, _role_id: &str) -> bool {
        false
    }
}

/// Flags roles whose permissions intersect a configured mask.
///
/// Roles missing from the catalog are not flagged: the platform is the
/// authority on which roles exist.
#[derive(Debug, Clone, Default)]
pub struct PermissionHazard {
    mask: Permissions,
    role_permissions: HashMap<String, Permissions>,
}

impl PermissionHazard {
    /// Build from a mask and a role ID → permissions catalog.
    pub fn new(mask: Permissions, role_permissions: HashMap<String, Permissions>) -> Self {
        Self {
            mask,
            role_permissions,
        }
    }
}

impl RoleHazard for PermissionHazard {
    fn is_dangerous(&self, role_id: &str) -> bool {
        self.role_permissions
            .get(role_id)
            .map_or(false, |perms| perms.intersects(self.mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Permission;

    #[test]
    fn test_permission_hazard() {
        let mut catalog = HashMap::new();
        catalog.insert("admin".to_string(), Permissions::from(Permission::Administrator));
        catalog.insert("vip".to_string(), Permissions::from(Permission::SendMessages));

        let hazard = PermissionHazard::new(Permission::Administrator.into(), catalog);
        assert!(hazard.is_dangerous("admin"));
        assert!(!hazard.is_dangerous("vip"));
        assert!(!hazard.is_dangerous("unknown"));
    }

    #[test]
    fn test_closure_hazard() {
        let hazard = |role: &str| role.starts_with("staff");
        assert!(hazard.is_dangerous("staff-lead"));
        assert!(!NoHazard.is_dangerous("staff-lead"));
    }
}
