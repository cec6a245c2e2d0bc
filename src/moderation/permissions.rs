//! Role & permission model.
//!
//! This module handles:
//! - The closed set of named permissions
//! - The static grant table for `USER`, `MODERATOR` and `ADMIN`
//! - `has_permission`, the pure role → permission predicate
//!
//! The permission model is:
//! - **User**: read, post, reply, edit own posts, report content
//! - **Moderator**: everything a user can do, plus content and report moderation
//!   and approval of member accounts
//! - **Admin**: everything a moderator can do, plus role management, admin account
//!   creation and the audit log
//! - **Super admin**: every permission, including ones added after this table was
//!   written. It is a short-circuit, not a table row.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Role;

/// Named actions that can be permitted to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadPublicContent,
    ViewOwnProfile,
    CreatePost,
    CreateReply,
    EditOwnPost,
    SubmitReport,
    EditAnyPost,
    SoftDeleteContent,
    RestoreContent,
    PermanentDeleteContent,
    ViewDeletedContent,
    PostInLockedCategory,
    ViewReports,
    ResolveReport,
    WarnUser,
    ApproveAccount,
    RejectAccount,
    ChangeUserRole,
    CreateAccount,
    DeleteAccount,
    EditUserProfile,
    ViewAuditLog,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 22] = [
        Permission::ReadPublicContent,
        Permission::ViewOwnProfile,
        Permission::CreatePost,
        Permission::CreateReply,
        Permission::EditOwnPost,
        Permission::SubmitReport,
        Permission::EditAnyPost,
        Permission::SoftDeleteContent,
        Permission::RestoreContent,
        Permission::PermanentDeleteContent,
        Permission::ViewDeletedContent,
        Permission::PostInLockedCategory,
        Permission::ViewReports,
        Permission::ResolveReport,
        Permission::WarnUser,
        Permission::ApproveAccount,
        Permission::RejectAccount,
        Permission::ChangeUserRole,
        Permission::CreateAccount,
        Permission::DeleteAccount,
        Permission::EditUserProfile,
        Permission::ViewAuditLog,
    ];

    /// Returns the canonical name of this permission.
    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::ReadPublicContent => "read_public_content",
            Permission::ViewOwnProfile => "view_own_profile",
            Permission::CreatePost => "create_post",
            Permission::CreateReply => "create_reply",
            Permission::EditOwnPost => "edit_own_post",
            Permission::SubmitReport => "submit_report",
            Permission::EditAnyPost => "edit_any_post",
            Permission::SoftDeleteContent => "soft_delete_content",
            Permission::RestoreContent => "restore_content",
            Permission::PermanentDeleteContent => "permanent_delete_content",
            Permission::ViewDeletedContent => "view_deleted_content",
            Permission::PostInLockedCategory => "post_in_locked_category",
            Permission::ViewReports => "view_reports",
            Permission::ResolveReport => "resolve_report",
            Permission::WarnUser => "warn_user",
            Permission::ApproveAccount => "approve_account",
            Permission::RejectAccount => "reject_account",
            Permission::ChangeUserRole => "change_user_role",
            Permission::CreateAccount => "create_account",
            Permission::DeleteAccount => "delete_account",
            Permission::EditUserProfile => "edit_user_profile",
            Permission::ViewAuditLog => "view_audit_log",
        }
    }

    /// Looks up a permission by its canonical name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions granted to every member.
const USER_GRANTS: &[Permission] = &[
    Permission::ReadPublicContent,
    Permission::ViewOwnProfile,
    Permission::CreatePost,
    Permission::CreateReply,
    Permission::EditOwnPost,
    Permission::SubmitReport,
];

/// Permissions a moderator holds on top of the user grants.
const MODERATOR_GRANTS: &[Permission] = &[
    Permission::EditAnyPost,
    Permission::SoftDeleteContent,
    Permission::RestoreContent,
    Permission::PermanentDeleteContent,
    Permission::ViewDeletedContent,
    Permission::PostInLockedCategory,
    Permission::ViewReports,
    Permission::ResolveReport,
    Permission::WarnUser,
    Permission::ApproveAccount,
    Permission::RejectAccount,
];

/// Permissions an admin holds on top of the moderator grants.
const ADMIN_GRANTS: &[Permission] = &[
    Permission::ChangeUserRole,
    Permission::CreateAccount,
    Permission::DeleteAccount,
    Permission::EditUserProfile,
    Permission::ViewAuditLog,
];

/// Returns the grants a role adds over the role below it.
///
/// `SuperAdmin` has no row; it is handled by [`has_permission`] before any
/// table lookup.
fn own_grants(role: Role) -> &'static [Permission] {
    match role {
        Role::User => USER_GRANTS,
        Role::Moderator => MODERATOR_GRANTS,
        Role::Admin => ADMIN_GRANTS,
        Role::SuperAdmin => &[],
    }
}

/// Returns true if `role` holds `permission`.
///
/// Pure and total. Each role inherits the grants of every role ranked below it.
pub fn has_permission(role: Role, permission: Permission) -> bool {
    if role == Role::SuperAdmin {
        return true;
    }
    Role::ALL
        .iter()
        .take_while(|r| r.rank() <= role.rank())
        .any(|r| own_grants(*r).contains(&permission))
}

/// Like [`has_permission`], for permission names arriving as strings.
///
/// Unknown names are never granted, not even to `SUPER_ADMIN`.
pub fn has_named_permission(role: Role, name: &str) -> bool {
    Permission::parse(name).is_some_and(|p| has_permission(role, p))
}

/// Returns the least privileged role holding `permission`.
pub fn minimum_role(permission: Permission) -> Role {
    Role::ALL
        .iter()
        .copied()
        .find(|r| has_permission(*r, permission))
        .unwrap_or(Role::SuperAdmin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_holds_everything() {
        for permission in Permission::ALL {
            assert!(has_permission(Role::SuperAdmin, permission));
        }
    }

    #[test]
    fn test_grants_are_inherited_upwards() {
        for permission in Permission::ALL {
            for pair in Role::ALL.windows(2) {
                if has_permission(pair[0], permission) {
                    assert!(
                        has_permission(pair[1], permission),
                        "{} lost {} held by {}",
                        pair[1],
                        permission,
                        pair[0]
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_permission_is_classified() {
        // Each permission must be reachable below the super admin short-circuit.
        for permission in Permission::ALL {
            assert!(has_permission(Role::Admin, permission), "{}", permission);
        }
    }

    #[test]
    fn test_user_permissions() {
        assert!(has_permission(Role::User, Permission::CreatePost));
        assert!(has_permission(Role::User, Permission::SubmitReport));
        assert!(!has_permission(Role::User, Permission::SoftDeleteContent));
        assert!(!has_permission(Role::User, Permission::ViewReports));
        assert!(!has_permission(Role::User, Permission::ChangeUserRole));
    }

    #[test]
    fn test_moderator_permissions() {
        assert!(has_permission(Role::Moderator, Permission::SoftDeleteContent));
        assert!(has_permission(Role::Moderator, Permission::PostInLockedCategory));
        assert!(has_permission(Role::Moderator, Permission::ApproveAccount));
        assert!(!has_permission(Role::Moderator, Permission::ChangeUserRole));
        assert!(!has_permission(Role::Moderator, Permission::ViewAuditLog));
    }

    #[test]
    fn test_named_permissions() {
        assert!(has_named_permission(Role::Admin, "view_audit_log"));
        assert!(!has_named_permission(Role::User, "view_audit_log"));
        assert!(!has_named_permission(Role::SuperAdmin, "launch_rockets"));
        assert!(!has_named_permission(Role::SuperAdmin, ""));
    }

    #[test]
    fn test_minimum_role() {
        assert_eq!(minimum_role(Permission::CreateReply), Role::User);
        assert_eq!(minimum_role(Permission::ResolveReport), Role::Moderator);
        assert_eq!(minimum_role(Permission::ChangeUserRole), Role::Admin);
    }

    #[test]
    fn test_permission_names_roundtrip() {
        for permission in Permission::ALL {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
    }
}
