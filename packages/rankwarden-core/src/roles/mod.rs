//! # Roles
//!
//! Permission bitfields, dangerous-role policy and the role reconciler.

mod hazard;
mod permissions;
mod reconciler;

pub use hazard::{NoHazard, PermissionHazard, RoleHazard};
pub use permissions::{Permission, Permissions};
pub use reconciler::{promote_if_qualified, PromotionResult};
