//! Append-only audit ledger.
//!
//! Every successful privileged transition appends exactly one [`AuditEntry`]
//! in the same change set as the state mutation it records. Entries carry a
//! non-empty justification: callers that give none get a system default for
//! the action type.
//!
//! The ledger itself performs no authorization. Reads go through
//! [`ModerationService::query_audit_log`], which asks the evaluator for
//! `view_audit_log` first. There is no update or delete path.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::content::ContentItem;
use super::permissions::Permission;
use super::service::ModerationService;
use super::store::ModerationStore;
use super::types::{current_timestamp_millis, Actor, AuditId, ContentId, ReportId, UserId};
use crate::error::{ForumError, Result};

/// Closed set of audited action types. Extend by adding values, never by
/// repurposing existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditActionType {
    ContentSoftDelete,
    ContentRestore,
    ContentPermanentDelete,
    ContentEditModerator,
    UserWarn,
    UserSuspendTemp,
    UserBanPerma,
    UserRoleChange,
    UserProfileEditAdmin,
    UserAccountApprove,
    UserAccountReject,
    UserAccountCreateAdmin,
    UserAccountDeleteAdmin,
    ReportStatusChangeApprove,
    ReportStatusChangeReject,
    ReportStatusChangeResolved,
}

impl AuditActionType {
    /// Every action type, in declaration order.
    pub const ALL: [AuditActionType; 16] = [
        AuditActionType::ContentSoftDelete,
        AuditActionType::ContentRestore,
        AuditActionType::ContentPermanentDelete,
        AuditActionType::ContentEditModerator,
        AuditActionType::UserWarn,
        AuditActionType::UserSuspendTemp,
        AuditActionType::UserBanPerma,
        AuditActionType::UserRoleChange,
        AuditActionType::UserProfileEditAdmin,
        AuditActionType::UserAccountApprove,
        AuditActionType::UserAccountReject,
        AuditActionType::UserAccountCreateAdmin,
        AuditActionType::UserAccountDeleteAdmin,
        AuditActionType::ReportStatusChangeApprove,
        AuditActionType::ReportStatusChangeReject,
        AuditActionType::ReportStatusChangeResolved,
    ];

    /// Returns the canonical encoding of this action type.
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditActionType::ContentSoftDelete => "CONTENT_SOFT_DELETE",
            AuditActionType::ContentRestore => "CONTENT_RESTORE",
            AuditActionType::ContentPermanentDelete => "CONTENT_PERMANENT_DELETE",
            AuditActionType::ContentEditModerator => "CONTENT_EDIT_MODERATOR",
            AuditActionType::UserWarn => "USER_WARN",
            AuditActionType::UserSuspendTemp => "USER_SUSPEND_TEMP",
            AuditActionType::UserBanPerma => "USER_BAN_PERMA",
            AuditActionType::UserRoleChange => "USER_ROLE_CHANGE",
            AuditActionType::UserProfileEditAdmin => "USER_PROFILE_EDIT_ADMIN",
            AuditActionType::UserAccountApprove => "USER_ACCOUNT_APPROVE",
            AuditActionType::UserAccountReject => "USER_ACCOUNT_REJECT",
            AuditActionType::UserAccountCreateAdmin => "USER_ACCOUNT_CREATE_ADMIN",
            AuditActionType::UserAccountDeleteAdmin => "USER_ACCOUNT_DELETE_ADMIN",
            AuditActionType::ReportStatusChangeApprove => "REPORT_STATUS_CHANGE_APPROVE",
            AuditActionType::ReportStatusChangeReject => "REPORT_STATUS_CHANGE_REJECT",
            AuditActionType::ReportStatusChangeResolved => "REPORT_STATUS_CHANGE_RESOLVED",
        }
    }

    /// Parses an action type, normalizing case.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|a| a.as_str() == normalized)
    }

    /// Justification recorded when the caller supplies none.
    pub const fn default_justification(self) -> &'static str {
        match self {
            AuditActionType::ContentSoftDelete => "Content removed by moderator",
            AuditActionType::ContentRestore => "Content restored by moderator",
            AuditActionType::ContentPermanentDelete => "Content permanently deleted by moderator",
            AuditActionType::ContentEditModerator => "Content edited by moderator",
            AuditActionType::UserWarn => "User warned by moderator",
            AuditActionType::UserSuspendTemp => "User temporarily suspended",
            AuditActionType::UserBanPerma => "User permanently banned",
            AuditActionType::UserRoleChange => "Role changed",
            AuditActionType::UserProfileEditAdmin => "Profile edited by admin",
            AuditActionType::UserAccountApprove => "Account approved",
            AuditActionType::UserAccountReject => "Account rejected",
            AuditActionType::UserAccountCreateAdmin => "Account created by admin",
            AuditActionType::UserAccountDeleteAdmin => "Account deleted by admin",
            AuditActionType::ReportStatusChangeApprove => "Report approved",
            AuditActionType::ReportStatusChangeReject => "Report rejected",
            AuditActionType::ReportStatusChangeResolved => "Report resolved",
        }
    }
}

impl fmt::Display for AuditActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PerformedBy {
    /// An end-user actor (moderator, admin or super admin).
    Actor(UserId),
    /// The trusted service identity, by name.
    Service(String),
}

impl fmt::Display for PerformedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformedBy::Actor(id) => write!(f, "{}", id),
            PerformedBy::Service(name) => write!(f, "service:{}", name),
        }
    }
}

/// Returns the trimmed justification, or the default for `action_type` if it is blank.
pub fn normalize_justification(action_type: AuditActionType, raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => action_type.default_justification().to_string(),
    }
}

/// An immutable ledger record of one privileged action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    /// Position in the ledger, assigned by the store on append (1-based).
    pub sequence: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub performed_by: PerformedBy,
    pub action_type: AuditActionType,
    pub target_user_id: Option<UserId>,
    pub target_post_id: Option<ContentId>,
    pub target_reply_id: Option<ContentId>,
    pub target_report_id: Option<ReportId>,
    /// Never empty.
    pub justification: String,
    /// Old/new values and other action-specific data.
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// Starts a new entry. Blank justifications are replaced by the action default.
    pub fn new(
        performed_by: PerformedBy,
        action_type: AuditActionType,
        justification: Option<&str>,
    ) -> Self {
        Self {
            id: AuditId::new(),
            sequence: 0,
            timestamp: current_timestamp_millis(),
            performed_by,
            action_type,
            target_user_id: None,
            target_post_id: None,
            target_reply_id: None,
            target_report_id: None,
            justification: normalize_justification(action_type, justification),
            details: serde_json::Value::Null,
        }
    }

    /// Sets the targeted account.
    pub fn target_user(mut self, user_id: UserId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    /// Sets the targeted post or reply, depending on the item's kind.
    pub fn target_content(mut self, item: &ContentItem) -> Self {
        if item.is_reply() {
            self.target_reply_id = Some(item.id);
        } else {
            self.target_post_id = Some(item.id);
        }
        self
    }

    /// Sets the targeted report.
    pub fn target_report(mut self, report_id: ReportId) -> Self {
        self.target_report_id = Some(report_id);
        self
    }

    /// Attaches the structured details payload.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Returns the acting user's id, if an end-user actor performed the action.
    pub fn moderator_id(&self) -> Option<UserId> {
        match &self.performed_by {
            PerformedBy::Actor(id) => Some(*id),
            PerformedBy::Service(_) => None,
        }
    }

    /// Re-applies the non-empty justification rule. Called by the ledger on append.
    pub(crate) fn ensure_justification(&mut self) {
        if self.justification.trim().is_empty() {
            self.justification = self.action_type.default_justification().to_string();
        }
    }
}

/// Read-side filter over the ledger. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub performed_by: Option<UserId>,
    pub action_type: Option<AuditActionType>,
    pub target_user_id: Option<UserId>,
    /// Matches either the post or the reply target.
    pub target_content_id: Option<ContentId>,
    pub target_report_id: Option<ReportId>,
}

impl AuditFilter {
    /// Returns true if `entry` passes every set criterion.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(moderator) = self.performed_by {
            if entry.moderator_id() != Some(moderator) {
                return false;
            }
        }
        if let Some(action_type) = self.action_type {
            if entry.action_type != action_type {
                return false;
            }
        }
        if let Some(user) = self.target_user_id {
            if entry.target_user_id != Some(user) {
                return false;
            }
        }
        if let Some(content) = self.target_content_id {
            if entry.target_post_id != Some(content) && entry.target_reply_id != Some(content) {
                return false;
            }
        }
        if let Some(report) = self.target_report_id {
            if entry.target_report_id != Some(report) {
                return false;
            }
        }
        true
    }
}

/// Pagination cursor: the sequence number of the last entry already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCursor {
    pub sequence: u64,
}

impl AuditCursor {
    /// Creates a cursor positioned after `sequence`.
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Encodes the cursor as a URL-safe base64 string.
    pub fn encode(&self) -> Result<String> {
        let bytes = bincode::serialize(self)
            .map_err(|e| ForumError::serialization(format!("Failed to encode cursor: {}", e)))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decodes a cursor from a base64 string.
    pub fn decode(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ForumError::validation("Malformed audit cursor"))?;
        bincode::deserialize(&bytes).map_err(|_| ForumError::validation("Malformed audit cursor"))
    }
}

/// A ledger query.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub filter: AuditFilter,
    /// Continue after this cursor; `None` starts at the oldest entry.
    pub cursor: Option<AuditCursor>,
    /// Page size; defaults to the configured audit page size.
    pub limit: Option<usize>,
}

/// One page of ledger entries, oldest first.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub next_cursor: Option<AuditCursor>,
}

impl AuditPage {
    /// Returns true if there are more pages after this one.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

impl<S: ModerationStore> ModerationService<S> {
    /// Reads the audit ledger. Requires `view_audit_log` (admins and above).
    pub fn query_audit_log(&self, actor: &Actor, query: &AuditQuery) -> Result<AuditPage> {
        let actor = self.resolve_actor(actor)?;
        self.authorize(&actor, Permission::ViewAuditLog, None, "read the audit log")?;

        let limit = query
            .limit
            .unwrap_or(self.config().audit_page_size)
            .clamp(1, self.config().max_audit_page_size);
        let after = query.cursor.map(|c| c.sequence);

        let mut entries = self.store().query_audit(&query.filter, after, limit + 1)?;
        let next_cursor = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|e| AuditCursor::new(e.sequence))
        } else {
            None
        };

        debug!(
            actor = %actor.id,
            returned = entries.len(),
            has_more = next_cursor.is_some(),
            "audit_query: served ledger page"
        );

        Ok(AuditPage {
            entries,
            next_cursor,
        })
    }
}
