//! The moderation service: shared plumbing for the state machines.
//!
//! `ModerationService` owns the store and configuration. The transitions
//! themselves are implemented next to their data in `account`, `content`,
//! `report` and `audit`.

use tracing::{debug, warn};

use super::access::{can, Resource};
use super::permissions::Permission;
use super::store::{ModerationStore, RowKey};
use super::types::{Account, Actor};
use crate::config::ModerationConfig;
use crate::error::{ForumError, Result};

/// Entry point for every privileged operation of the moderation core.
#[derive(Debug)]
pub struct ModerationService<S> {
    store: S,
    config: ModerationConfig,
}

impl<S: ModerationStore> ModerationService<S> {
    /// Creates a service with the default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: ModerationConfig::default(),
        }
    }

    /// Creates a service with a custom configuration, rejecting inconsistent settings.
    pub fn with_config(store: S, config: ModerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Loads the stored account behind `actor`.
    ///
    /// The stored role and status win over whatever the caller passed in.
    /// Unknown actors are denied.
    pub(crate) fn resolve_actor(&self, actor: &Actor) -> Result<Account> {
        let account = self.store.load_account(&actor.id)?.ok_or_else(|| {
            ForumError::permission_denied(format!("Unknown actor {}", actor.id))
        })?;
        if account.role != actor.role || account.approval_status != actor.approval_status {
            debug!(
                actor = %actor.id,
                claimed_role = %actor.role,
                stored_role = %account.role,
                "resolve_actor: caller record was stale, using stored account"
            );
        }
        Ok(account)
    }

    /// Resolves an optional actor for read paths; unknown actors read anonymously.
    pub(crate) fn resolve_reader(&self, actor: Option<&Actor>) -> Result<Option<Actor>> {
        match actor {
            Some(actor) => Ok(self
                .store
                .load_account(&actor.id)?
                .map(|account| account.as_actor())),
            None => Ok(None),
        }
    }

    /// Asks the evaluator, turning a denial into `PermissionDenied`.
    pub(crate) fn authorize(
        &self,
        account: &Account,
        action: Permission,
        resource: Option<&Resource>,
        what: &str,
    ) -> Result<()> {
        if can(Some(&account.as_actor()), action, resource) {
            Ok(())
        } else {
            debug!(
                actor = %account.id,
                role = %account.role,
                action = %action,
                "authorize: denied"
            );
            Err(ForumError::permission_denied(format!(
                "{} may not {}",
                account.role, what
            )))
        }
    }

    /// Runs a read-modify-write, re-running it after a lost commit race.
    ///
    /// Each attempt re-reads state, so a retried transition sees the winner's
    /// write and can report "already in target state".
    pub(crate) fn with_retry<T, F>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut retries_left = self.config.conflict_retries;
        loop {
            match attempt() {
                Err(e) if e.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!(operation, error = %e, "commit conflict, retrying after re-read");
                }
                result => return result,
            }
        }
    }

    /// Rejects text longer than `max` bytes.
    pub(crate) fn check_size(&self, field: &str, value: &str, max: usize) -> Result<()> {
        if value.len() > max {
            return Err(ForumError::validation(format!(
                "{} too large: {} bytes (max {})",
                field,
                value.len(),
                max
            )));
        }
        Ok(())
    }

    /// Rejects an over-long justification; blank ones are defaulted later.
    pub(crate) fn check_justification(&self, justification: Option<&str>) -> Result<()> {
        match justification {
            Some(text) => {
                self.check_size("justification", text.trim(), self.config.max_justification_size)
            }
            None => Ok(()),
        }
    }
}

/// Returns the guard key for an actor's account row.
pub(crate) fn actor_guard(account: &Account) -> (RowKey, u64) {
    (RowKey::Account(account.id), account.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::store::MemoryStore;

    #[test]
    fn test_with_config_rejects_invalid_settings() {
        let zero_max = ModerationConfig {
            max_audit_page_size: 0,
            ..ModerationConfig::default()
        };
        let result = ModerationService::with_config(MemoryStore::new(), zero_max);
        assert!(matches!(result, Err(ForumError::Config(_))));

        let oversized_page = ModerationConfig {
            audit_page_size: 10,
            max_audit_page_size: 5,
            ..ModerationConfig::default()
        };
        assert!(ModerationService::with_config(MemoryStore::new(), oversized_page).is_err());

        let retries = ModerationConfig {
            conflict_retries: 3,
            ..ModerationConfig::default()
        };
        let service = ModerationService::with_config(MemoryStore::new(), retries).unwrap();
        assert_eq!(service.config().conflict_retries, 3);
    }
}
