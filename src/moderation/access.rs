//! Resource access evaluator.
//!
//! [`can`] answers "may this actor perform this action on this resource?"
//! without side effects. It is fail-closed: a missing actor, an unapproved
//! actor or a missing piece of resource information resolves to deny.
//!
//! The account hierarchy rules ([`check_role_change`],
//! [`check_status_change`], [`check_account_management`]) live here so the evaluator and the account
//! state machine apply the same function instead of two copies of it.

use std::fmt;

use super::permissions::{has_permission, Permission};
use super::types::{Actor, Role, UserId};

/// What the evaluator knows about the resource an action targets.
///
/// Every field is optional; a rule that needs a field that is absent denies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    /// Author of the targeted content.
    pub author_id: Option<UserId>,
    /// Lock flag of the targeted category.
    pub category_locked: Option<bool>,
    /// Account targeted by an account action.
    pub target_user_id: Option<UserId>,
    /// Current role of the targeted account.
    pub target_role: Option<Role>,
    /// Role requested by a role change or account creation.
    pub new_role: Option<Role>,
}

impl Resource {
    /// Content written by `author_id`.
    pub fn authored_by(author_id: UserId) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::default()
        }
    }

    /// A category with the given lock flag.
    pub fn category(locked_for_users: bool) -> Self {
        Self {
            category_locked: Some(locked_for_users),
            ..Self::default()
        }
    }

    /// An existing account with its current role.
    pub fn account(target_user_id: UserId, target_role: Role) -> Self {
        Self {
            target_user_id: Some(target_user_id),
            target_role: Some(target_role),
            ..Self::default()
        }
    }

    /// The caller's own profile.
    pub fn own_profile(user_id: UserId) -> Self {
        Self {
            target_user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Sets the role requested by the action.
    pub fn with_new_role(mut self, role: Role) -> Self {
        self.new_role = Some(role);
        self
    }
}

/// Why a role change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChangeDenial {
    /// A super admin tried to leave the super admin role.
    SuperAdminSelfDemotion,
    /// An admin tried to change another admin or a super admin.
    PeerOrSuperior,
    /// An admin tried to grant the super admin role.
    TopRolePromotion,
    /// An admin tried to change their own role.
    AdminSelfChange,
    /// The actor is below admin.
    InsufficientRole,
}

impl fmt::Display for RoleChangeDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RoleChangeDenial::SuperAdminSelfDemotion => {
                "a super admin cannot demote their own account"
            }
            RoleChangeDenial::PeerOrSuperior => "admins cannot change the role of admins or super admins",
            RoleChangeDenial::TopRolePromotion => "admins cannot grant the super admin role",
            RoleChangeDenial::AdminSelfChange => "admins cannot change their own role",
            RoleChangeDenial::InsufficientRole => "only admins can change roles",
        };
        f.write_str(reason)
    }
}

/// Applies the role-change hierarchy rules, in priority order.
///
/// The service identity never reaches this function; it bypasses the
/// hierarchy entirely.
pub fn check_role_change(
    actor_id: UserId,
    actor_role: Role,
    target_id: UserId,
    current_role: Role,
    new_role: Role,
) -> Result<(), RoleChangeDenial> {
    let is_self = actor_id == target_id;
    match actor_role {
        Role::SuperAdmin if is_self && new_role != Role::SuperAdmin => {
            Err(RoleChangeDenial::SuperAdminSelfDemotion)
        }
        Role::SuperAdmin => Ok(()),
        Role::Admin if !is_self && current_role.is_at_least(Role::Admin) => {
            Err(RoleChangeDenial::PeerOrSuperior)
        }
        Role::Admin if new_role == Role::SuperAdmin => Err(RoleChangeDenial::TopRolePromotion),
        Role::Admin if is_self && new_role != Role::Admin => Err(RoleChangeDenial::AdminSelfChange),
        Role::Admin => Ok(()),
        Role::Moderator | Role::User => Err(RoleChangeDenial::InsufficientRole),
    }
}

/// Applies the hierarchy rules for approving or rejecting an account.
///
/// Nobody sets their own approval status. Admins and super admins may act on
/// any other account; a moderator only on users.
pub fn check_status_change(
    actor_id: UserId,
    actor_role: Role,
    target_id: UserId,
    target_role: Role,
) -> bool {
    if actor_id == target_id {
        return false;
    }
    match actor_role {
        Role::SuperAdmin | Role::Admin => true,
        Role::Moderator => target_role == Role::User,
        Role::User => false,
    }
}

/// Applies the hierarchy rules for other actions on another account
/// (warnings, profile edits, deletion).
///
/// Nobody manages their own account through this path; a moderator may only
/// act on users; an admin may not act on admins or super admins.
pub fn check_account_management(
    actor_id: UserId,
    actor_role: Role,
    target_id: UserId,
    target_role: Role,
) -> bool {
    if actor_id == target_id {
        return false;
    }
    match actor_role {
        Role::SuperAdmin => true,
        Role::Admin => target_role < Role::Admin,
        Role::Moderator => target_role == Role::User,
        Role::User => false,
    }
}

/// Returns the highest role `creator` may assign to an account it creates.
pub fn max_assignable_role(creator: Role) -> Option<Role> {
    match creator {
        Role::SuperAdmin => Some(Role::SuperAdmin),
        Role::Admin => Some(Role::Moderator),
        Role::Moderator | Role::User => None,
    }
}

/// Actions an unapproved (or absent) actor may still perform.
fn unapproved_allows(actor: Option<&Actor>, action: Permission, resource: Option<&Resource>) -> bool {
    match action {
        Permission::ReadPublicContent => true,
        Permission::ViewOwnProfile => match (actor, resource.and_then(|r| r.target_user_id)) {
            (Some(actor), Some(target)) => actor.id == target,
            _ => false,
        },
        _ => false,
    }
}

/// Returns true if `resource` carries every field `action` is decided on.
fn has_required_fields(action: Permission, resource: Option<&Resource>) -> bool {
    let Some(resource) = resource else {
        return !matches!(
            action,
            Permission::ViewOwnProfile
                | Permission::CreatePost
                | Permission::EditOwnPost
                | Permission::WarnUser
                | Permission::ApproveAccount
                | Permission::RejectAccount
                | Permission::ChangeUserRole
                | Permission::CreateAccount
                | Permission::DeleteAccount
                | Permission::EditUserProfile
        );
    };
    match action {
        Permission::CreatePost => resource.category_locked.is_some(),
        Permission::EditOwnPost => resource.author_id.is_some(),
        Permission::ChangeUserRole => {
            resource.target_user_id.is_some()
                && resource.target_role.is_some()
                && resource.new_role.is_some()
        }
        Permission::CreateAccount => resource.new_role.is_some(),
        Permission::ViewOwnProfile => resource.target_user_id.is_some(),
        Permission::WarnUser
        | Permission::ApproveAccount
        | Permission::RejectAccount
        | Permission::DeleteAccount
        | Permission::EditUserProfile => {
            resource.target_user_id.is_some() && resource.target_role.is_some()
        }
        _ => true,
    }
}

/// Returns true if `action` targets the actor's own account destructively.
fn is_destructive_self_action(actor: &Actor, action: Permission, resource: Option<&Resource>) -> bool {
    let Some(resource) = resource else {
        return false;
    };
    if resource.target_user_id != Some(actor.id) {
        return false;
    }
    match action {
        Permission::ChangeUserRole => resource.new_role != Some(Role::SuperAdmin),
        Permission::DeleteAccount
        | Permission::ApproveAccount
        | Permission::RejectAccount
        | Permission::WarnUser => true,
        _ => false,
    }
}

/// Decides whether `actor` may perform `action` on `resource`.
///
/// Never panics. Absent information denies.
pub fn can(actor: Option<&Actor>, action: Permission, resource: Option<&Resource>) -> bool {
    let actor = match actor {
        Some(actor) if actor.is_approved() => actor,
        _ => return unapproved_allows(actor, action, resource),
    };

    if actor.role == Role::SuperAdmin {
        return has_required_fields(action, resource)
            && !is_destructive_self_action(actor, action, resource);
    }

    if !has_permission(actor.role, action) {
        return false;
    }

    match action {
        Permission::ReadPublicContent
        | Permission::CreateReply
        | Permission::SubmitReport
        | Permission::EditAnyPost
        | Permission::SoftDeleteContent
        | Permission::RestoreContent
        | Permission::PermanentDeleteContent
        | Permission::ViewDeletedContent
        | Permission::PostInLockedCategory
        | Permission::ViewReports
        | Permission::ResolveReport
        | Permission::ViewAuditLog => true,

        Permission::ViewOwnProfile => {
            resource.and_then(|r| r.target_user_id) == Some(actor.id)
        }

        Permission::CreatePost => match resource.and_then(|r| r.category_locked) {
            Some(false) => true,
            Some(true) => has_permission(actor.role, Permission::PostInLockedCategory),
            None => false,
        },

        Permission::EditOwnPost => resource.and_then(|r| r.author_id) == Some(actor.id),

        Permission::ApproveAccount | Permission::RejectAccount => match resource {
            Some(Resource {
                target_user_id: Some(target_id),
                target_role: Some(target_role),
                ..
            }) => check_status_change(actor.id, actor.role, *target_id, *target_role),
            _ => false,
        },

        Permission::WarnUser | Permission::DeleteAccount | Permission::EditUserProfile => {
            match resource {
                Some(Resource {
                    target_user_id: Some(target_id),
                    target_role: Some(target_role),
                    ..
                }) => check_account_management(actor.id, actor.role, *target_id, *target_role),
                _ => false,
            }
        }

        Permission::ChangeUserRole => match resource {
            Some(Resource {
                target_user_id: Some(target_id),
                target_role: Some(current_role),
                new_role: Some(new_role),
                ..
            }) => check_role_change(actor.id, actor.role, *target_id, *current_role, *new_role)
                .is_ok(),
            _ => false,
        },

        Permission::CreateAccount => match resource.and_then(|r| r.new_role) {
            Some(new_role) => max_assignable_role(actor.role).is_some_and(|max| new_role <= max),
            None => false,
        },
    }
}
