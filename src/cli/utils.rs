//! Utility functions for CLI operations.

use crate::config::ModerationConfig;
use crate::moderation::{ModerationService, PerformedBy, RocksModerationStore, ServiceIdentity};
use crate::Result;
use std::fs;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

/// Name the operator tool records in the audit ledger.
pub const CLI_SERVICE_NAME: &str = "forumcore-cli";

/// Opens the moderation service over the RocksDB store in `data_dir`.
pub fn open_service(data_dir: &Path) -> Result<ModerationService<RocksModerationStore>> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
    }
    let config = ModerationConfig::from_env()?;
    let store = RocksModerationStore::open(data_dir)?;
    ModerationService::with_config(store, config)
}

/// The trusted identity the operator tool acts as.
pub fn cli_identity() -> ServiceIdentity {
    ServiceIdentity::new(CLI_SERVICE_NAME)
}

/// Format a millisecond Unix timestamp for CLI display
pub fn format_timestamp(millis: u64) -> String {
    let datetime = UNIX_EPOCH + Duration::from_millis(millis);
    format!("{:?}", datetime)
}

/// Short label for an audit performer.
pub fn format_performer(performed_by: &PerformedBy) -> String {
    match performed_by {
        PerformedBy::Actor(id) => id.to_string(),
        PerformedBy::Service(name) => format!("[{}]", name),
    }
}
