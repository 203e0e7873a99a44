//! # Permission Bitfield
//!
//! Platform role permissions as a u64 bitfield, using the same bit layout
//! as Discord-style gateways so values can be passed through unchanged.
//! Only the bits the engine reasons about are named here.

use serde::{Deserialize, Serialize};

/// Individual permission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Permission {
    /// Create invite links
    CreateInvites = 1 << 0,
    /// Kick members
    KickMembers = 1 << 1,
    /// Ban members
    BanMembers = 1 << 2,
    /// Full administrator access
    Administrator = 1 << 3,
    /// Manage channels (create, edit, delete)
    ManageChannels = 1 << 4,
    /// Manage community settings
    ManageCommunity = 1 << 5,
    /// View audit log
    ViewAuditLog = 1 << 7,
    /// View channels and read messages
    ViewChannels = 1 << 10,
    /// Send messages in text channels
    SendMessages = 1 << 11,
    /// Manage messages (delete/pin others' messages)
    ManageMessages = 1 << 13,
    /// Mention @everyone and @here
    MentionEveryone = 1 << 17,
    /// Change other members' nicknames
    ManageNicknames = 1 << 27,
    /// Manage roles (create, edit, delete, assign)
    ManageRoles = 1 << 28,
    /// Manage webhooks
    ManageWebhooks = 1 << 29,
    /// Timeout members
    ModerateMembers = 1 << 40,
}

impl Permission {
    /// Every named flag, in bit order.
    pub const ALL_NAMED: [Permission; 15] = [
        Permission::CreateInvites,
        Permission::KickMembers,
        Permission::BanMembers,
        Permission::Administrator,
        Permission::ManageChannels,
        Permission::ManageCommunity,
        Permission::ViewAuditLog,
        Permission::ViewChannels,
        Permission::SendMessages,
        Permission::ManageMessages,
        Permission::MentionEveryone,
        Permission::ManageNicknames,
        Permission::ManageRoles,
        Permission::ManageWebhooks,
        Permission::ModerateMembers,
    ];

    /// snake_case name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Permission::CreateInvites => "create_invites",
            Permission::KickMembers => "kick_members",
            Permission::BanMembers => "ban_members",
            Permission::Administrator => "administrator",
            Permission::ManageChannels => "manage_channels",
            Permission::ManageCommunity => "manage_community",
            Permission::ViewAuditLog => "view_audit_log",
            Permission::ViewChannels => "view_channels",
            Permission::SendMessages => "send_messages",
            Permission::ManageMessages => "manage_messages",
            Permission::MentionEveryone => "mention_everyone",
            Permission::ManageNicknames => "manage_nicknames",
            Permission::ManageRoles => "manage_roles",
            Permission::ManageWebhooks => "manage_webhooks",
            Permission::ModerateMembers => "moderate_members",
        }
    }

    /// Look a flag up by its configuration name.
    pub fn from_name(name: &str) -> Option<Permission> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL_NAMED.iter().copied().find(|p| p.name() == name)
    }
}

/// A set of permissions represented as a bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    /// No permissions.
    pub const NONE: Permissions = Permissions(0);

    /// Create from a raw bitfield value.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get the raw bitfield value.
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Parse the decimal string form gateways send.
    pub fn from_string(s: &str) -> Option<Self> {
        s.trim().parse::<u64>().ok().map(Self)
    }

    /// Parse a comma-separated list of flag names or a decimal bitfield.
    pub fn parse_list(s: &str) -> Option<Self> {
        if let Ok(bits) = s.trim().parse::<u64>() {
            return Some(Self(bits));
        }
        let mut p = Permissions::NONE;
        for part in s.split(',').filter(|part| !part.trim().is_empty()) {
            p.add(Permission::from_name(part)?);
        }
        Some(p)
    }

    /// Check if a specific bit is set. No administrator bypass: this answers
    /// "does the role carry this flag", not "may the member do this".
    pub fn has(&self, perm: Permission) -> bool {
        self.0 & (perm as u64) != 0
    }

    /// Whether any bit is shared with `mask`.
    pub fn intersects(&self, mask: Permissions) -> bool {
        self.0 & mask.0 != 0
    }

    /// Add a permission.
    pub fn add(&mut self, perm: Permission) {
        self.0 |= perm as u64;
    }

    /// Merge with another permission set (OR).
    pub fn merge(&self, other: &Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Names of the named flags present in this set.
    pub fn names(&self) -> Vec<&'static str> {
        Permission::ALL_NAMED
            .iter()
            .filter(|p| self.has(**p))
            .map(|p| p.name())
            .collect()
    }
}

impl From<Permission> for Permissions {
    fn from(perm: Permission) -> Self {
        Permissions(perm as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_has() {
        let mut p = Permissions::NONE;
        assert!(!p.has(Permission::ManageRoles));

        p.add(Permission::ManageRoles);
        assert!(p.has(Permission::ManageRoles));
        assert!(!p.has(Permission::Administrator));
    }

    #[test]
    fn test_administrator_does_not_imply_other_bits() {
        let p = Permissions::from(Permission::Administrator);
        assert!(!p.has(Permission::BanMembers));
    }

    #[test]
    fn test_intersects_mask() {
        let role = Permissions::from(Permission::SendMessages)
            .merge(&Permissions::from(Permission::BanMembers));
        let mask = Permissions::from(Permission::BanMembers)
            .merge(&Permissions::from(Permission::Administrator));
        assert!(role.intersects(mask));
        assert!(!Permissions::from(Permission::SendMessages).intersects(mask));
        assert!(!role.intersects(Permissions::NONE));
    }

    #[test]
    fn test_decimal_string_form() {
        assert_eq!(Permissions::from_string("8"), Some(Permission::Administrator.into()));
        assert_eq!(Permissions::from_string(" 0 "), Some(Permissions::NONE));
        assert_eq!(Permissions::from_string("nope"), None);
        assert_eq!(Permissions::from_string(""), None);
    }

    #[test]
    fn test_parse_list() {
        let p = Permissions::parse_list("administrator, manage_roles").unwrap();
        assert!(p.has(Permission::Administrator));
        assert!(p.has(Permission::ManageRoles));
        assert_eq!(p.names(), vec!["administrator", "manage_roles"]);

        assert_eq!(Permissions::parse_list("8"), Some(Permission::Administrator.into()));
        assert_eq!(Permissions::parse_list(""), Some(Permissions::NONE));
        assert_eq!(Permissions::parse_list("fly"), None);
    }
}
