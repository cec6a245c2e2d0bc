//! Authorization and moderation core.
//!
//! Everything a forum backend needs to decide who may do what, and to carry
//! out privileged changes safely:
//! - **Roles and permissions**: a strict four-level hierarchy with a static
//!   grant table (`permissions`)
//! - **Access evaluation**: a pure, fail-closed `can(actor, action, resource)`
//!   (`access`)
//! - **Lifecycles**: accounts, content and reports as explicit state
//!   machines on [`ModerationService`]
//! - **Audit ledger**: one append-only entry per privileged change, written
//!   in the same atomic unit as the change (`audit`)
//!
//! ## State Machines
//!
//! ```text
//! Account: pending_approval ──▶ approved ⇄ rejected      role: change_role only
//! Content: Draft ──▶ Active ⇄ SoftDeleted ──▶ Gone
//! Report:  PENDING ──▶ RESOLVED_{APPROVED, ACTION_TAKEN, REJECTED}
//! ```
//!
//! Every transition re-loads the acting account from the store, asks the
//! evaluator, re-validates the hierarchy against fresh state and commits one
//! [`ChangeSet`] holding the row writes and the ledger entry.

pub mod access;
mod account;
pub mod audit;
pub mod constants;
pub mod content;
pub mod permissions;
pub mod report;
mod service;
pub mod storage;
pub mod store;
pub mod types;

pub use access::{
    can, check_account_management, check_role_change, check_status_change, max_assignable_role,
    Resource, RoleChangeDenial,
};
pub use audit::{
    AuditActionType, AuditCursor, AuditEntry, AuditFilter, AuditPage, AuditQuery, PerformedBy,
};
pub use content::{is_visible_to, ContentItem, ContentKind, ContentState, Deletion};
pub use permissions::{has_named_permission, has_permission, minimum_role, Permission};
pub use report::{ReasonCategory, Report, ReportStatus, ReportSubmission, ReportTarget};
pub use service::ModerationService;
pub use storage::RocksModerationStore;
pub use store::{ChangeSet, MemoryStore, ModerationStore, RowKey, RowWrite};
pub use types::{
    Account, Actor, ApprovalStatus, AuditId, Category, CategoryId, ContentId, Outcome, Principal,
    ReportId, Role, ServiceIdentity, UserId,
};
