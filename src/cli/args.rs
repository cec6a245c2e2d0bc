//! Command-line argument parsing for the forumcore operator tool.

use crate::config::data_dir_from_env;
use crate::error::{ForumError, Result};
use crate::moderation::{AuditActionType, Role, UserId};
use std::path::PathBuf;

/// Operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        user_id: UserId,
        role: Role,
    },
    Activate {
        user_id: UserId,
        justification: Option<String>,
    },
    SetRole {
        user_id: UserId,
        role: Role,
        justification: Option<String>,
    },
    ShowUser {
        user_id: UserId,
    },
    Audit {
        admin_id: UserId,
        limit: Option<usize>,
        action: Option<AuditActionType>,
        user: Option<UserId>,
    },
    Help,
}

/// Parsed invocation: where the data lives and what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub data_dir: PathBuf,
    pub command: Command,
}

/// Parses `args` (without the program name).
///
/// `--data <dir>` may appear anywhere; without it the data directory comes
/// from the environment.
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut data_dir = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--data" {
            let dir = iter
                .next()
                .ok_or_else(|| ForumError::validation("--data requires a directory"))?;
            data_dir = Some(PathBuf::from(dir));
        } else {
            rest.push(arg.as_str());
        }
    }

    Ok(Invocation {
        data_dir: data_dir.unwrap_or_else(data_dir_from_env),
        command: parse_command(&rest)?,
    })
}

fn parse_command(args: &[&str]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match *name {
        "register" => {
            let user_id = required(rest, 0, "register requires a user id")?.parse()?;
            let role = match rest.get(1) {
                Some(raw) => raw.parse()?,
                None => Role::User,
            };
            Ok(Command::Register { user_id, role })
        }

        "activate" => Ok(Command::Activate {
            user_id: required(rest, 0, "activate requires a user id")?.parse()?,
            justification: joined(&rest[1..]),
        }),

        "set-role" => {
            if rest.len() < 2 {
                return Err(ForumError::validation(
                    "set-role requires a user id and a role",
                ));
            }
            Ok(Command::SetRole {
                user_id: rest[0].parse()?,
                role: rest[1].parse()?,
                justification: joined(&rest[2..]),
            })
        }

        "show-user" => Ok(Command::ShowUser {
            user_id: required(rest, 0, "show-user requires a user id")?.parse()?,
        }),

        "audit" => parse_audit(rest),

        "help" | "--help" | "-h" => Ok(Command::Help),

        other => Err(ForumError::validation(format!(
            "Unknown command '{}'",
            other
        ))),
    }
}

fn parse_audit(args: &[&str]) -> Result<Command> {
    let admin_id = required(args, 0, "audit requires an admin user id")?.parse()?;
    let mut limit = None;
    let mut action = None;
    let mut user = None;

    let mut iter = args[1..].iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| ForumError::validation(format!("{} requires a value", flag)))?;
        match *flag {
            "--limit" => {
                limit = Some(value.parse().map_err(|_| {
                    ForumError::validation(format!("Invalid limit '{}'", value))
                })?)
            }
            "--action" => {
                action = Some(AuditActionType::parse(value).ok_or_else(|| {
                    ForumError::validation(format!("Unknown action type '{}'", value))
                })?)
            }
            "--user" => user = Some(value.parse()?),
            other => {
                return Err(ForumError::validation(format!(
                    "Unknown audit option '{}'",
                    other
                )))
            }
        }
    }

    Ok(Command::Audit {
        admin_id,
        limit,
        action,
        user,
    })
}

fn required<'a>(args: &[&'a str], index: usize, message: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| ForumError::validation(message))
}

fn joined(words: &[&str]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Print usage information
pub fn print_usage() {
    println!("forumcore - forum moderation core, operator tool");
    println!("================================================");
    println!();
    println!("Usage: forumcore [--data <dir>] <command> [args...]");
    println!();
    println!("Commands:");
    println!("  register <user-id> [role]                     Register an account (pending approval)");
    println!("  activate <user-id> [justification]            Approve an account");
    println!("  set-role <user-id> <role> [justification]     Change an account's role");
    println!("  show-user <user-id>                           Show role and approval status");
    println!("  audit <admin-id> [--limit N] [--action TYPE] [--user ID]");
    println!("                                                Read the audit ledger as an admin");
    println!();
    println!("Roles:");
    println!("  USER, MODERATOR, ADMIN, SUPER_ADMIN");
    println!();
    println!("Environment:");
    println!("  FORUMCORE_DATA      data directory (default: forumcore_data)");
    println!("  RUST_LOG            log filter (default: forumcore=info)");
    println!();
    println!("Examples:");
    println!("  forumcore register 6f1c2a9e-0d4b-4c5e-9a51-2f7e8b3c1d20 ADMIN");
    println!("  forumcore activate 6f1c2a9e-0d4b-4c5e-9a51-2f7e8b3c1d20 'verified by support'");
    println!("  forumcore audit 6f1c2a9e-0d4b-4c5e-9a51-2f7e8b3c1d20 --action USER_ROLE_CHANGE");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_defaults_to_user() {
        let id = UserId::new();
        let parsed = parse_args(&args(&["--data", "/tmp/x", "register", &id.to_string()])).unwrap();
        assert_eq!(parsed.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(
            parsed.command,
            Command::Register {
                user_id: id,
                role: Role::User
            }
        );
    }

    #[test]
    fn test_set_role_with_justification() {
        let id = UserId::new();
        let parsed = parse_args(&args(&[
            "set-role",
            &id.to_string(),
            "moderator",
            "trusted",
            "member",
            "--data",
            "d",
        ]))
        .unwrap();
        assert_eq!(
            parsed.command,
            Command::SetRole {
                user_id: id,
                role: Role::Moderator,
                justification: Some("trusted member".to_string()),
            }
        );
    }

    #[test]
    fn test_audit_options() {
        let admin = UserId::new();
        let user = UserId::new();
        let parsed = parse_args(&args(&[
            "audit",
            &admin.to_string(),
            "--limit",
            "5",
            "--action",
            "user_warn",
            "--user",
            &user.to_string(),
        ]))
        .unwrap();
        assert_eq!(
            parsed.command,
            Command::Audit {
                admin_id: admin,
                limit: Some(5),
                action: Some(AuditActionType::UserWarn),
                user: Some(user),
            }
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_args(&args(&["register", "not-a-uuid"])).is_err());
        assert!(parse_args(&args(&["set-role", &UserId::new().to_string()])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["--data"])).is_err());
        assert_eq!(parse_args(&args(&[])).unwrap().command, Command::Help);
    }
}
