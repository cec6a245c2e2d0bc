//! Account lifecycle state machine.
//!
//! An account is `(approval status, role)`. Registration creates
//! `(pending_approval, USER)` unless the service identity seeds another
//! role. From there:
//!
//! ```text
//! pending_approval ──approve──▶ approved ◀──approve── rejected
//!        └─────────reject────▶ rejected ◀──reject─── approved
//! ```
//!
//! Roles move only through [`ModerationService::change_role`]. Status
//! transitions write the status field and nothing else, so a moderator's
//! update can never carry a role change with it.

use serde_json::json;
use tracing::{debug, info};

use super::access::{check_role_change, check_status_change, Resource};
use super::audit::{AuditActionType, AuditEntry, PerformedBy};
use super::permissions::Permission;
use super::service::{actor_guard, ModerationService};
use super::store::{ChangeSet, ModerationStore};
use super::types::{
    current_timestamp_millis, Account, Actor, ApprovalStatus, Outcome, Principal, Role,
    ServiceIdentity, UserId,
};
use crate::error::{ForumError, Result};

impl<S: ModerationStore> ModerationService<S> {
    /// Returns the stored account for `id`.
    pub fn account(&self, id: &UserId) -> Result<Account> {
        self.store()
            .load_account(id)?
            .ok_or_else(|| ForumError::not_found(format!("Account {}", id)))
    }

    /// Registers a new account on behalf of the identity collaborator.
    ///
    /// The account starts in `pending_approval`. Seeding a role above `USER`
    /// is recorded in the ledger as a role change.
    pub fn register_account(
        &self,
        service: &ServiceIdentity,
        id: UserId,
        role: Role,
    ) -> Result<Account> {
        if self.store().load_account(&id)?.is_some() {
            return Err(ForumError::invalid_transition(format!(
                "Account {} is already registered",
                id
            )));
        }

        let account = Account::register(id, role, ApprovalStatus::PendingApproval);
        let mut changes = ChangeSet::new();
        changes.insert_account(account.clone());
        if role != Role::User {
            changes.append_audit(
                AuditEntry::new(
                    PerformedBy::Service(service.name().to_string()),
                    AuditActionType::UserRoleChange,
                    Some("Initial role seeded at registration"),
                )
                .target_user(id)
                .details(json!({ "oldRole": null, "newRole": role })),
            );
        }
        self.store().commit(changes)?;

        info!(user = %id, role = %role, service = service.name(), "account registered");
        Ok(Account {
            version: 1,
            ..account
        })
    }

    /// Creates an already-approved account through the admin path.
    ///
    /// Admins may create accounts up to `MODERATOR`; super admins any role.
    pub fn create_account(
        &self,
        actor: &Actor,
        id: UserId,
        role: Role,
        justification: Option<&str>,
    ) -> Result<Account> {
        self.check_justification(justification)?;
        self.with_retry("create_account", || {
            let acting = self.resolve_actor(actor)?;
            let resource = Resource {
                target_user_id: Some(id),
                new_role: Some(role),
                ..Resource::default()
            };
            self.authorize(
                &acting,
                Permission::CreateAccount,
                Some(&resource),
                &format!("create {} accounts", role),
            )?;

            if self.store().load_account(&id)?.is_some() {
                return Err(ForumError::invalid_transition(format!(
                    "Account {} is already registered",
                    id
                )));
            }

            let account = Account::register(id, role, ApprovalStatus::Approved);
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes
                .guard(key, version)
                .insert_account(account.clone())
                .append_audit(
                    AuditEntry::new(
                        PerformedBy::Actor(acting.id),
                        AuditActionType::UserAccountCreateAdmin,
                        justification,
                    )
                    .target_user(id)
                    .details(json!({ "role": role, "approvalStatus": ApprovalStatus::Approved })),
                );
            self.store().commit(changes)?;

            info!(actor = %acting.id, user = %id, role = %role, "account created by admin");
            Ok(Account {
                version: 1,
                ..account
            })
        })
    }

    /// Approves an account. Shorthand for [`Self::change_status`].
    pub fn approve<'a>(
        &self,
        by: impl Into<Principal<'a>>,
        target: &UserId,
        justification: Option<&str>,
    ) -> Result<Outcome<Account>> {
        self.change_status(by, target, ApprovalStatus::Approved, justification)
    }

    /// Rejects an account. Shorthand for [`Self::change_status`].
    pub fn reject<'a>(
        &self,
        by: impl Into<Principal<'a>>,
        target: &UserId,
        justification: Option<&str>,
    ) -> Result<Outcome<Account>> {
        self.change_status(by, target, ApprovalStatus::Rejected, justification)
    }

    /// Sets the approval status of `target`.
    ///
    /// Moderators may only act on `USER` accounts, admins and super admins on
    /// any account, and nobody on their own account. Only the status field
    /// is written.
    pub fn change_status<'a>(
        &self,
        by: impl Into<Principal<'a>>,
        target: &UserId,
        new_status: ApprovalStatus,
        justification: Option<&str>,
    ) -> Result<Outcome<Account>> {
        let principal = by.into();
        let (permission, action_type) = match new_status {
            ApprovalStatus::Approved => {
                (Permission::ApproveAccount, AuditActionType::UserAccountApprove)
            }
            ApprovalStatus::Rejected => {
                (Permission::RejectAccount, AuditActionType::UserAccountReject)
            }
            ApprovalStatus::PendingApproval => {
                return Err(ForumError::invalid_transition(
                    "Accounts cannot be returned to pending approval",
                ))
            }
        };
        self.check_justification(justification)?;

        self.with_retry("change_status", || {
            let current = self.account(target)?;
            let mut changes = ChangeSet::new();

            let performed_by = match principal {
                Principal::Service(service) => PerformedBy::Service(service.name().to_string()),
                Principal::Actor(actor) => {
                    let acting = self.resolve_actor(actor)?;
                    let resource = Resource::account(current.id, current.role);
                    self.authorize(
                        &acting,
                        permission,
                        Some(&resource),
                        &format!("set a {} account to {}", current.role, new_status),
                    )?;
                    if !check_status_change(acting.id, acting.role, current.id, current.role)
                    {
                        return Err(ForumError::permission_denied(format!(
                            "{} may not change the status of a {} account",
                            acting.role, current.role
                        )));
                    }
                    let (key, version) = actor_guard(&acting);
                    changes.guard(key, version);
                    PerformedBy::Actor(acting.id)
                }
            };

            if current.approval_status == new_status {
                debug!(user = %current.id, status = %new_status, "change_status: already in target state");
                return Ok(Outcome::Unchanged(current));
            }

            let old_status = current.approval_status;
            let mut updated = current;
            updated.approval_status = new_status;
            updated.updated_at = current_timestamp_millis();

            changes.update_account(updated.clone()).append_audit(
                AuditEntry::new(performed_by.clone(), action_type, justification)
                    .target_user(updated.id)
                    .details(json!({ "oldStatus": old_status, "newStatus": new_status })),
            );
            self.store().commit(changes)?;

            info!(
                by = %performed_by,
                user = %updated.id,
                from = %old_status,
                to = %new_status,
                "account status changed"
            );
            updated.version += 1;
            Ok(Outcome::Applied(updated))
        })
    }

    /// Changes the role of `target`.
    ///
    /// End-user callers go through the evaluator and then the hierarchy rules
    /// again against the freshly loaded target. The service identity bypasses
    /// the hierarchy.
    pub fn change_role<'a>(
        &self,
        by: impl Into<Principal<'a>>,
        target: &UserId,
        new_role: Role,
        justification: Option<&str>,
    ) -> Result<Outcome<Account>> {
        let principal = by.into();
        self.check_justification(justification)?;

        self.with_retry("change_role", || {
            let current = self.account(target)?;
            let mut changes = ChangeSet::new();

            let performed_by = match principal {
                Principal::Service(service) => PerformedBy::Service(service.name().to_string()),
                Principal::Actor(actor) => {
                    let acting = self.resolve_actor(actor)?;
                    let resource =
                        Resource::account(current.id, current.role).with_new_role(new_role);
                    self.authorize(
                        &acting,
                        Permission::ChangeUserRole,
                        Some(&resource),
                        &format!("change a {} account to {}", current.role, new_role),
                    )?;
                    check_role_change(acting.id, acting.role, current.id, current.role, new_role)
                        .map_err(ForumError::permission_denied)?;
                    if acting.id != current.id {
                        let (key, version) = actor_guard(&acting);
                        changes.guard(key, version);
                    }
                    PerformedBy::Actor(acting.id)
                }
            };

            if current.role == new_role {
                debug!(user = %current.id, role = %new_role, "change_role: already in target state");
                return Ok(Outcome::Unchanged(current));
            }

            let old_role = current.role;
            let mut updated = current;
            updated.role = new_role;
            updated.updated_at = current_timestamp_millis();

            changes.update_account(updated.clone()).append_audit(
                AuditEntry::new(
                    performed_by.clone(),
                    AuditActionType::UserRoleChange,
                    justification,
                )
                .target_user(updated.id)
                .details(json!({ "oldRole": old_role, "newRole": new_role })),
            );
            self.store().commit(changes)?;

            info!(
                by = %performed_by,
                user = %updated.id,
                from = %old_role,
                to = %new_role,
                "role changed"
            );
            updated.version += 1;
            Ok(Outcome::Applied(updated))
        })
    }

    /// Records a formal warning against `target`. Ledger-only; no account state changes.
    pub fn warn_user(
        &self,
        actor: &Actor,
        target: &UserId,
        justification: Option<&str>,
    ) -> Result<()> {
        self.check_justification(justification)?;
        self.with_retry("warn_user", || {
            let acting = self.resolve_actor(actor)?;
            let current = self.account(target)?;
            self.authorize(
                &acting,
                Permission::WarnUser,
                Some(&Resource::account(current.id, current.role)),
                &format!("warn a {} account", current.role),
            )?;

            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes
                .guard(key, version)
                .guard(super::store::RowKey::Account(current.id), current.version)
                .append_audit(
                    AuditEntry::new(
                        PerformedBy::Actor(acting.id),
                        AuditActionType::UserWarn,
                        justification,
                    )
                    .target_user(current.id),
                );
            self.store().commit(changes)?;

            info!(actor = %acting.id, user = %current.id, "user warned");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::audit::AuditFilter;
    use crate::moderation::store::MemoryStore;

    fn service() -> (ModerationService<MemoryStore>, ServiceIdentity) {
        (
            ModerationService::new(MemoryStore::new()),
            ServiceIdentity::new("provisioning"),
        )
    }

    fn member(
        svc: &ModerationService<MemoryStore>,
        provisioning: &ServiceIdentity,
        role: Role,
    ) -> Actor {
        let id = UserId::new();
        svc.register_account(provisioning, id, role).unwrap();
        svc.approve(provisioning, &id, None).unwrap();
        svc.account(&id).unwrap().as_actor()
    }

    fn ledger_len(svc: &ModerationService<MemoryStore>) -> u64 {
        svc.store().audit_len().unwrap()
    }

    #[test]
    fn test_registration_defaults() {
        let (svc, provisioning) = service();
        let id = UserId::new();
        let account = svc.register_account(&provisioning, id, Role::User).unwrap();
        assert_eq!(account.approval_status, ApprovalStatus::PendingApproval);
        assert_eq!(account.role, Role::User);
        assert_eq!(ledger_len(&svc), 0);

        let again = svc.register_account(&provisioning, id, Role::User);
        assert!(matches!(again, Err(ForumError::InvalidStateTransition(_))));
    }

    #[test]
    fn test_moderator_approves_user_only() {
        let (svc, provisioning) = service();
        let moderator = member(&svc, &provisioning, Role::Moderator);
        let user = UserId::new();
        let other_mod = UserId::new();
        svc.register_account(&provisioning, user, Role::User).unwrap();
        svc.register_account(&provisioning, other_mod, Role::Moderator)
            .unwrap();

        let before = ledger_len(&svc);
        let outcome = svc.approve(&moderator, &user, Some("looks fine")).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(outcome.get().approval_status, ApprovalStatus::Approved);
        assert_eq!(ledger_len(&svc), before + 1);

        let denied = svc.approve(&moderator, &other_mod, None);
        assert!(matches!(denied, Err(ForumError::PermissionDenied(_))));
        assert_eq!(ledger_len(&svc), before + 1);
    }

    #[test]
    fn test_admin_approves_pending_admin() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);
        let seeded = UserId::new();
        svc.register_account(&provisioning, seeded, Role::Admin)
            .unwrap();

        let before = ledger_len(&svc);
        let outcome = svc.approve(&admin, &seeded, Some("new staff")).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(outcome.get().approval_status, ApprovalStatus::Approved);
        assert_eq!(outcome.get().role, Role::Admin);
        assert_eq!(ledger_len(&svc), before + 1);

        let own = svc.reject(&admin, &admin.id, None);
        assert!(matches!(own, Err(ForumError::PermissionDenied(_))));
        assert_eq!(ledger_len(&svc), before + 1);
    }

    #[test]
    fn test_moderator_status_change_keeps_role() {
        let (svc, provisioning) = service();
        let moderator = member(&svc, &provisioning, Role::Moderator);
        let user = member(&svc, &provisioning, Role::User);

        let outcome = svc.reject(&moderator, &user.id, Some("spam account")).unwrap();
        assert_eq!(outcome.get().role, Role::User);
        assert_eq!(svc.account(&user.id).unwrap().role, Role::User);
        assert_eq!(
            svc.account(&user.id).unwrap().approval_status,
            ApprovalStatus::Rejected
        );
    }

    #[test]
    fn test_cannot_return_to_pending() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);
        let user = member(&svc, &provisioning, Role::User);
        let result = svc.change_status(&admin, &user.id, ApprovalStatus::PendingApproval, None);
        assert!(matches!(result, Err(ForumError::InvalidStateTransition(_))));
    }

    #[test]
    fn test_repeated_approval_is_a_noop() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);
        let user = member(&svc, &provisioning, Role::User);
        let before = ledger_len(&svc);
        let outcome = svc.approve(&admin, &user.id, None).unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(ledger_len(&svc), before);
    }

    #[test]
    fn test_admin_promotes_user() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);
        let user = member(&svc, &provisioning, Role::User);

        let outcome = svc
            .change_role(&admin, &user.id, Role::Moderator, Some("trusted member"))
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(svc.account(&user.id).unwrap().role, Role::Moderator);

        let filter = AuditFilter {
            action_type: Some(AuditActionType::UserRoleChange),
            target_user_id: Some(user.id),
            ..AuditFilter::default()
        };
        let entries = svc.store().query_audit(&filter, None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["oldRole"], "USER");
        assert_eq!(entries[0].details["newRole"], "MODERATOR");
        assert_eq!(entries[0].justification, "trusted member");
    }

    #[test]
    fn test_stale_actor_record_is_not_trusted() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);
        let user = member(&svc, &provisioning, Role::User);

        // Demoted after the session was resolved.
        svc.change_role(&provisioning, &admin.id, Role::User, None)
            .unwrap();

        let result = svc.change_role(&admin, &user.id, Role::Moderator, None);
        assert!(matches!(result, Err(ForumError::PermissionDenied(_))));
        assert_eq!(svc.account(&user.id).unwrap().role, Role::User);
    }

    #[test]
    fn test_service_identity_bypasses_hierarchy() {
        let (svc, provisioning) = service();
        let user = member(&svc, &provisioning, Role::User);
        let outcome = svc
            .change_role(&provisioning, &user.id, Role::SuperAdmin, None)
            .unwrap();
        assert!(outcome.is_applied());

        let entries = svc
            .store()
            .query_audit(&AuditFilter::default(), None, 100)
            .unwrap();
        let last = entries.last().unwrap();
        assert_eq!(last.moderator_id(), None);
        assert_eq!(last.justification, "Role changed");
    }

    #[test]
    fn test_admin_creates_accounts_below_admin() {
        let (svc, provisioning) = service();
        let admin = member(&svc, &provisioning, Role::Admin);

        let created = svc
            .create_account(&admin, UserId::new(), Role::Moderator, Some("new staff"))
            .unwrap();
        assert_eq!(created.approval_status, ApprovalStatus::Approved);

        let denied = svc.create_account(&admin, UserId::new(), Role::Admin, None);
        assert!(matches!(denied, Err(ForumError::PermissionDenied(_))));
    }

    #[test]
    fn test_warn_user() {
        let (svc, provisioning) = service();
        let moderator = member(&svc, &provisioning, Role::Moderator);
        let user = member(&svc, &provisioning, Role::User);
        let admin = member(&svc, &provisioning, Role::Admin);

        let before = ledger_len(&svc);
        svc.warn_user(&moderator, &user.id, Some("tone")).unwrap();
        assert_eq!(ledger_len(&svc), before + 1);

        assert!(svc.warn_user(&moderator, &admin.id, None).is_err());
        assert!(svc.warn_user(&moderator, &moderator.id, None).is_err());
    }
}
