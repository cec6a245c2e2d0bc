//! Command implementations for the forumcore CLI.

use crate::{
    cli::utils::{cli_identity, format_performer, format_timestamp, open_service},
    error::ForumError,
    moderation::{AuditActionType, AuditFilter, AuditQuery, Outcome, Role, UserId},
    Result,
};
use std::path::Path;
use tracing::info;

/// Execute register command
pub fn register(data_dir: &Path, user_id: UserId, role: Role) -> Result<()> {
    let service = open_service(data_dir)?;
    let account = service.register_account(&cli_identity(), user_id, role)?;

    info!(user = %account.id, role = %account.role, "Registered account");
    println!(
        "Registered {} as {} ({})",
        account.id, account.role, account.approval_status
    );
    Ok(())
}

/// Execute activate command
pub fn activate(data_dir: &Path, user_id: UserId, justification: Option<&str>) -> Result<()> {
    let service = open_service(data_dir)?;
    match service.approve(&cli_identity(), &user_id, justification)? {
        Outcome::Applied(account) => println!("Approved {}", account.id),
        Outcome::Unchanged(account) => println!("{} is already approved", account.id),
    }
    Ok(())
}

/// Execute set-role command
pub fn set_role(
    data_dir: &Path,
    user_id: UserId,
    role: Role,
    justification: Option<&str>,
) -> Result<()> {
    let service = open_service(data_dir)?;
    match service.change_role(&cli_identity(), &user_id, role, justification)? {
        Outcome::Applied(account) => println!("{} is now {}", account.id, account.role),
        Outcome::Unchanged(account) => println!("{} already has role {}", account.id, account.role),
    }
    Ok(())
}

/// Execute show-user command
pub fn show_user(data_dir: &Path, user_id: UserId) -> Result<()> {
    let service = open_service(data_dir)?;
    let account = service.account(&user_id)?;

    println!("Account:   {}", account.id);
    println!("Role:      {}", account.role);
    println!("Status:    {}", account.approval_status);
    println!("Created:   {}", format_timestamp(account.created_at));
    println!("Updated:   {}", format_timestamp(account.updated_at));
    Ok(())
}

/// Execute audit command
pub fn audit(
    data_dir: &Path,
    admin_id: UserId,
    limit: Option<usize>,
    action: Option<AuditActionType>,
    user: Option<UserId>,
) -> Result<()> {
    let service = open_service(data_dir)?;
    let admin = service
        .account(&admin_id)
        .map_err(|_| ForumError::permission_denied(format!("Unknown actor {}", admin_id)))?
        .as_actor();

    let query = AuditQuery {
        filter: AuditFilter {
            action_type: action,
            target_user_id: user,
            ..AuditFilter::default()
        },
        cursor: None,
        limit,
    };
    let page = service.query_audit_log(&admin, &query)?;

    if page.entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    for entry in &page.entries {
        let target = entry
            .target_user_id
            .map(|id| format!(" user={}", id))
            .unwrap_or_default();
        println!(
            "#{:<6} {} {:<30} by {}{}",
            entry.sequence,
            format_timestamp(entry.timestamp),
            entry.action_type,
            format_performer(&entry.performed_by),
            target
        );
        println!("        {}", entry.justification);
    }
    if let Some(cursor) = page.next_cursor {
        println!();
        println!("More entries after #{} (cursor {})", cursor.sequence, cursor.encode()?);
    }
    Ok(())
}
