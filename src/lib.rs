//! # forumcore - Forum Authorization & Moderation Core
//!
//! Role-based access control and moderation state machines for a
//! discussion forum.
//!
//! ## Features
//!
//! - **Role hierarchy**: USER < MODERATOR < ADMIN < SUPER_ADMIN with a static grant table
//! - **Fail-closed evaluation**: unapproved or unknown actors are denied by default
//! - **Lifecycles**: account approval and roles, content removal, report resolution
//! - **Audit ledger**: every privileged change is recorded atomically with it
//! - **Storage**: in-memory or RocksDB, both with compare-and-set commits
//!
//! ## Example
//!
//! ```rust,no_run
//! use forumcore::moderation::{
//!     Category, CategoryId, MemoryStore, ModerationService, ModerationStore, Role,
//!     ServiceIdentity, UserId,
//! };
//! # fn main() -> forumcore::Result<()> {
//! let service = ModerationService::new(MemoryStore::new());
//! let provisioning = ServiceIdentity::new("provisioning");
//!
//! let category = Category::new(CategoryId::new(), false);
//! service.store().store_category(&category)?;
//!
//! let member = UserId::new();
//! service.register_account(&provisioning, member, Role::User)?;
//! service.approve(&provisioning, &member, Some("verified email"))?;
//!
//! let actor = service.account(&member)?.as_actor();
//! let post = service.create_post(&actor, &category.id, "Hello, forum")?;
//! println!("created post {}", post.id);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod moderation;
pub mod storage;

pub use config::ModerationConfig;
pub use error::{ForumError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
