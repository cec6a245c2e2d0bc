//! Command-line interface for forumcore.
//!
//! An operator tool over a RocksDB data directory. It acts as the trusted
//! service identity for provisioning (registration, approval, role changes)
//! and as an admin actor for ledger reads.

pub mod args;
pub mod commands;
pub mod utils;

use crate::Result;
use std::env;
use std::process;

pub use args::{Command, Invocation};

/// Main entry point for the CLI application
pub fn run() -> Result<()> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let invocation = match args::parse_args(&raw) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            args::print_usage();
            process::exit(1);
        }
    };

    let data_dir = invocation.data_dir.as_path();
    match invocation.command {
        Command::Register { user_id, role } => commands::register(data_dir, user_id, role),
        Command::Activate {
            user_id,
            justification,
        } => commands::activate(data_dir, user_id, justification.as_deref()),
        Command::SetRole {
            user_id,
            role,
            justification,
        } => commands::set_role(data_dir, user_id, role, justification.as_deref()),
        Command::ShowUser { user_id } => commands::show_user(data_dir, user_id),
        Command::Audit {
            admin_id,
            limit,
            action,
            user,
        } => commands::audit(data_dir, admin_id, limit, action, user),
        Command::Help => {
            args::print_usage();
            Ok(())
        }
    }
}
