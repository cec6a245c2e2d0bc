//! Runtime configuration for the moderation core.
//!
//! Every setting has a default; `from_env` overrides them from `FORUMCORE_*`
//! environment variables.

use crate::error::{ForumError, Result};
use crate::moderation::constants::{
    DEFAULT_AUDIT_PAGE_SIZE, DEFAULT_CONFLICT_RETRIES, MAX_AUDIT_PAGE_SIZE, MAX_BODY_SIZE,
    MAX_JUSTIFICATION_SIZE, MAX_MODERATOR_NOTES_SIZE, MAX_REPORT_DETAILS_SIZE,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming the data directory used by the CLI.
pub const ENV_DATA_DIR: &str = "FORUMCORE_DATA";
/// Environment variable overriding [`ModerationConfig::conflict_retries`].
pub const ENV_CONFLICT_RETRIES: &str = "FORUMCORE_CONFLICT_RETRIES";
/// Environment variable overriding [`ModerationConfig::audit_page_size`].
pub const ENV_AUDIT_PAGE_SIZE: &str = "FORUMCORE_AUDIT_PAGE_SIZE";
/// Environment variable overriding [`ModerationConfig::max_body_size`].
pub const ENV_MAX_BODY_SIZE: &str = "FORUMCORE_MAX_BODY_SIZE";

/// Default data directory name.
pub const DEFAULT_DATA_DIR: &str = "forumcore_data";

/// Limits and retry policy for the moderation services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationConfig {
    /// Re-runs of a transition after a `ConcurrentModification`.
    pub conflict_retries: u32,
    /// Maximum post/reply body size in bytes.
    pub max_body_size: usize,
    /// Maximum justification or deletion reason size in bytes.
    pub max_justification_size: usize,
    /// Maximum report details size in bytes.
    pub max_report_details_size: usize,
    /// Maximum merged moderator notes size in bytes.
    pub max_moderator_notes_size: usize,
    /// Audit entries per page when a query gives no limit.
    pub audit_page_size: usize,
    /// Upper bound on any audit page.
    pub max_audit_page_size: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            max_body_size: MAX_BODY_SIZE,
            max_justification_size: MAX_JUSTIFICATION_SIZE,
            max_report_details_size: MAX_REPORT_DETAILS_SIZE,
            max_moderator_notes_size: MAX_MODERATOR_NOTES_SIZE,
            audit_page_size: DEFAULT_AUDIT_PAGE_SIZE,
            max_audit_page_size: MAX_AUDIT_PAGE_SIZE,
        }
    }
}

impl ModerationConfig {
    /// Builds a configuration from defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(retries) = env_value(ENV_CONFLICT_RETRIES)? {
            config.conflict_retries = retries;
        }
        if let Some(page_size) = env_value(ENV_AUDIT_PAGE_SIZE)? {
            config.audit_page_size = page_size;
        }
        if let Some(body_size) = env_value(ENV_MAX_BODY_SIZE)? {
            config.max_body_size = body_size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_audit_page_size == 0 {
            return Err(ForumError::config("max_audit_page_size must be at least 1"));
        }
        if self.audit_page_size == 0 || self.audit_page_size > self.max_audit_page_size {
            return Err(ForumError::config(format!(
                "audit_page_size must be between 1 and {}",
                self.max_audit_page_size
            )));
        }
        if self.max_body_size == 0 {
            return Err(ForumError::config("max_body_size must be at least 1"));
        }
        Ok(())
    }
}

/// Returns the data directory from the environment, or the default.
pub fn data_dir_from_env() -> PathBuf {
    env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ForumError::config(format!("{} has an invalid value '{}'", name, raw))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ForumError::config(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ModerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conflict_retries, 1);
    }

    #[test]
    fn test_page_size_bounds() {
        let config = ModerationConfig {
            audit_page_size: 1000,
            ..ModerationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ModerationConfig {
            audit_page_size: 0,
            ..ModerationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
