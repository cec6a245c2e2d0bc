//! Shared types for the moderation core.
//!
//! This module contains the identity and hierarchy types every other
//! moderation module builds on:
//! - Opaque identifiers (`UserId`, `ContentId`, `CategoryId`, `ReportId`, `AuditId`)
//! - `Role` and its rank ordering
//! - `ApprovalStatus`, `Actor`, `ServiceIdentity` and `Principal`
//! - The persisted `Account` and `Category` records

use crate::error::{ForumError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the 16 raw bytes, used as storage keys.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parses an identifier from its 16 raw bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                Uuid::from_slice(bytes).map(Self).map_err(|e| {
                    ForumError::validation(format!("Invalid {} bytes: {}", $label, e))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ForumError;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|e| {
                    ForumError::validation(format!("Invalid {} '{}': {}", $label, s, e))
                })
            }
        }
    };
}

define_id!(
    /// Identifier of a user account (and therefore of an actor).
    UserId,
    "user id"
);
define_id!(
    /// Identifier of a post or reply.
    ContentId,
    "content id"
);
define_id!(
    /// Identifier of a category.
    CategoryId,
    "category id"
);
define_id!(
    /// Identifier of a content report.
    ReportId,
    "report id"
);
define_id!(
    /// Identifier of an audit ledger entry.
    AuditId,
    "audit id"
);

/// Forum role, strictly ordered by privilege.
///
/// The discriminant is the rank. All "at least as privileged as" checks go
/// through [`Role::rank`] (directly or via `Ord`), never through local
/// string or variant comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Role {
    /// Regular member.
    #[default]
    User = 1,
    /// Can moderate content and reports, and approve member accounts.
    Moderator = 2,
    /// Can manage roles of users and moderators.
    Admin = 3,
    /// Holds every permission.
    SuperAdmin = 4,
}

impl Role {
    /// All roles in ascending order of privilege.
    pub const ALL: [Role; 4] = [Role::User, Role::Moderator, Role::Admin, Role::SuperAdmin];

    /// Position of this role in the hierarchy (higher = more privileged).
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Returns true if this role is at least as privileged as `min`.
    pub const fn is_at_least(self, min: Role) -> bool {
        self.rank() >= min.rank()
    }

    /// Returns the canonical encoding of this role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Parses a role, normalizing case and separators.
    ///
    /// This is the only place role spellings are normalized.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(&['-', ' '][..], "_");
        match normalized.as_str() {
            "USER" => Some(Role::User),
            "MODERATOR" | "MOD" => Some(Role::Moderator),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" | "SUPERADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ForumError;

    fn from_str(s: &str) -> Result<Self> {
        Role::parse(s).ok_or_else(|| ForumError::validation(format!("Unknown role '{}'", s)))
    }
}

/// Account approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Registered, waiting for a moderator or admin.
    #[default]
    PendingApproval,
    /// Full member.
    Approved,
    /// Refused; limited to the read-only allow-list.
    Rejected,
}

impl ApprovalStatus {
    /// Returns the canonical encoding of this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::PendingApproval => "pending_approval",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Parses a status, normalizing case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending_approval" | "pending" => Some(ApprovalStatus::PendingApproval),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated identity performing an operation.
///
/// Resolved by the external identity collaborator and passed explicitly into
/// every call. The moderation services re-load the stored account before
/// acting, so a stale actor record cannot exercise a revoked role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub approval_status: ApprovalStatus,
}

impl Actor {
    /// Creates a new actor record.
    pub fn new(id: UserId, role: Role, approval_status: ApprovalStatus) -> Self {
        Self {
            id,
            role,
            approval_status,
        }
    }

    /// Returns true if the account approval gate is open for this actor.
    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }
}

/// A fully trusted, non-human caller used for account provisioning.
///
/// This is a separate trust tier, not a role: it bypasses the role
/// hierarchy rules instead of sitting at the top of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    name: String,
}

impl ServiceIdentity {
    /// Creates a service identity with the given name (recorded in the audit ledger).
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The caller of an account operation: an end-user actor or the service identity.
#[derive(Debug, Clone, Copy)]
pub enum Principal<'a> {
    Actor(&'a Actor),
    Service(&'a ServiceIdentity),
}

impl<'a> From<&'a Actor> for Principal<'a> {
    fn from(actor: &'a Actor) -> Self {
        Principal::Actor(actor)
    }
}

impl<'a> From<&'a ServiceIdentity> for Principal<'a> {
    fn from(service: &'a ServiceIdentity) -> Self {
        Principal::Service(service)
    }
}

/// Persisted account state backing an [`Actor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub role: Role,
    pub approval_status: ApprovalStatus,
    /// Registration timestamp in milliseconds.
    pub created_at: u64,
    /// Timestamp of the last role or status change.
    pub updated_at: u64,
    /// Row version for compare-and-set; bumped by the store on every write.
    pub version: u64,
}

impl Account {
    /// Creates a freshly registered account.
    pub fn register(id: UserId, role: Role, approval_status: ApprovalStatus) -> Self {
        let now = current_timestamp_millis();
        Self {
            id,
            role,
            approval_status,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Returns the actor view of this account.
    pub fn as_actor(&self) -> Actor {
        Actor::new(self.id, self.role, self.approval_status)
    }
}

/// A forum category, managed externally and read here for lock checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    /// When set, only moderators and above may open new posts here.
    pub locked_for_users: bool,
}

impl Category {
    /// Creates a category record.
    pub fn new(id: CategoryId, locked_for_users: bool) -> Self {
        Self {
            id,
            locked_for_users,
        }
    }
}

/// Result of a state transition that may already have happened.
///
/// `Unchanged` means the target was already in the requested state: nothing
/// was written and no audit entry was appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    Unchanged(T),
}

impl<T> Outcome<T> {
    /// Returns true if the transition mutated state.
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    /// Returns the resulting record.
    pub fn get(&self) -> &T {
        match self {
            Outcome::Applied(v) | Outcome::Unchanged(v) => v,
        }
    }

    /// Consumes the outcome and returns the resulting record.
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Applied(v) | Outcome::Unchanged(v) => v,
        }
    }
}
