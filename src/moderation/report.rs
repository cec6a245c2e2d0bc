//! Report lifecycle.
//!
//! Reports move from `PENDING` to exactly one terminal status and stay
//! there. Besides explicit resolution, soft-deleting the reported content
//! resolves its pending reports as `RESOLVED_ACTION_TAKEN`
//! (see [`ModerationService::soft_delete`]).

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

use super::audit::{AuditActionType, AuditEntry, PerformedBy};
use super::constants::NOTES_SEPARATOR;
use super::content::is_visible_to;
use super::permissions::Permission;
use super::service::{actor_guard, ModerationService};
use super::store::{ChangeSet, ModerationStore};
use super::types::{current_timestamp_millis, Actor, ContentId, Outcome, ReportId, UserId};
use crate::error::{ForumError, Result};

/// Why a member reported content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCategory {
    Spam,
    Harassment,
    OffensiveContent,
    RulesViolation,
    Other,
}

impl ReasonCategory {
    pub const ALL: [ReasonCategory; 5] = [
        ReasonCategory::Spam,
        ReasonCategory::Harassment,
        ReasonCategory::OffensiveContent,
        ReasonCategory::RulesViolation,
        ReasonCategory::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ReasonCategory::Spam => "SPAM",
            ReasonCategory::Harassment => "HARASSMENT",
            ReasonCategory::OffensiveContent => "OFFENSIVE_CONTENT",
            ReasonCategory::RulesViolation => "RULES_VIOLATION",
            ReasonCategory::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|r| r.as_str() == normalized)
    }
}

impl fmt::Display for ReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report status. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[default]
    Pending,
    /// The report was valid; no action beyond acknowledging it.
    ResolvedApproved,
    /// The report led to moderation of the content.
    ResolvedActionTaken,
    /// The report was unfounded.
    ResolvedRejected,
}

impl ReportStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::ResolvedApproved => "RESOLVED_APPROVED",
            ReportStatus::ResolvedActionTaken => "RESOLVED_ACTION_TAKEN",
            ReportStatus::ResolvedRejected => "RESOLVED_REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(ReportStatus::Pending),
            "RESOLVED_APPROVED" => Some(ReportStatus::ResolvedApproved),
            "RESOLVED_ACTION_TAKEN" => Some(ReportStatus::ResolvedActionTaken),
            "RESOLVED_REJECTED" => Some(ReportStatus::ResolvedRejected),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }

    /// Ledger action type recording a resolution to this status.
    const fn audit_action(self) -> Option<AuditActionType> {
        match self {
            ReportStatus::Pending => None,
            ReportStatus::ResolvedApproved => Some(AuditActionType::ReportStatusChangeApprove),
            ReportStatus::ResolvedActionTaken => Some(AuditActionType::ReportStatusChangeResolved),
            ReportStatus::ResolvedRejected => Some(AuditActionType::ReportStatusChangeReject),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single item a validated report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportTarget {
    Post(ContentId),
    Reply(ContentId),
}

impl ReportTarget {
    pub fn content_id(&self) -> ContentId {
        match self {
            ReportTarget::Post(id) | ReportTarget::Reply(id) => *id,
        }
    }
}

/// A report as submitted by a member, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSubmission {
    pub reported_post_id: Option<ContentId>,
    pub reported_reply_id: Option<ContentId>,
    pub reason_category: ReasonCategory,
    pub reason_details: Option<String>,
}

impl ReportSubmission {
    /// A report on a post.
    pub fn post(post_id: ContentId, reason: ReasonCategory, details: Option<&str>) -> Self {
        Self {
            reported_post_id: Some(post_id),
            reported_reply_id: None,
            reason_category: reason,
            reason_details: details.map(str::to_string),
        }
    }

    /// A report on a reply.
    pub fn reply(reply_id: ContentId, reason: ReasonCategory, details: Option<&str>) -> Self {
        Self {
            reported_post_id: None,
            reported_reply_id: Some(reply_id),
            reason_category: reason,
            reason_details: details.map(str::to_string),
        }
    }

    /// Checks that exactly one of the post and reply ids is set.
    pub fn target(&self) -> Result<ReportTarget> {
        match (self.reported_post_id, self.reported_reply_id) {
            (Some(post), None) => Ok(ReportTarget::Post(post)),
            (None, Some(reply)) => Ok(ReportTarget::Reply(reply)),
            (Some(_), Some(_)) => Err(ForumError::invalid_transition(
                "A report targets either a post or a reply, not both",
            )),
            (None, None) => Err(ForumError::invalid_transition(
                "A report must target a post or a reply",
            )),
        }
    }
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub target: ReportTarget,
    pub reason_category: ReasonCategory,
    pub reason_details: Option<String>,
    pub status: ReportStatus,
    pub resolved_at: Option<u64>,
    pub resolved_by: Option<UserId>,
    pub moderator_notes: Option<String>,
    pub created_at: u64,
    pub version: u64,
}

impl Report {
    pub fn content_id(&self) -> ContentId {
        self.target.content_id()
    }

    pub fn reported_post_id(&self) -> Option<ContentId> {
        match self.target {
            ReportTarget::Post(id) => Some(id),
            ReportTarget::Reply(_) => None,
        }
    }

    pub fn reported_reply_id(&self) -> Option<ContentId> {
        match self.target {
            ReportTarget::Reply(id) => Some(id),
            ReportTarget::Post(_) => None,
        }
    }
}

/// Appends `addition` to `existing` notes. Blank additions never clear notes.
pub fn merge_notes(existing: Option<&str>, addition: Option<&str>) -> Option<String> {
    let addition = addition.map(str::trim).filter(|a| !a.is_empty());
    match (existing.filter(|e| !e.is_empty()), addition) {
        (Some(existing), Some(addition)) => {
            Some(format!("{}{}{}", existing, NOTES_SEPARATOR, addition))
        }
        (Some(existing), None) => Some(existing.to_string()),
        (None, Some(addition)) => Some(addition.to_string()),
        (None, None) => None,
    }
}

impl<S: ModerationStore> ModerationService<S> {
    /// Files a report on a visible, non-deleted post or reply.
    pub fn submit_report(&self, actor: &Actor, submission: &ReportSubmission) -> Result<Report> {
        let target = submission.target()?;
        if let Some(details) = &submission.reason_details {
            self.check_size("report details", details, self.config().max_report_details_size)?;
        }

        self.with_retry("submit_report", || {
            let acting = self.resolve_actor(actor)?;
            self.authorize(&acting, Permission::SubmitReport, None, "submit reports")?;

            let item = self
                .store()
                .load_content(&target.content_id())?
                .filter(|item| is_visible_to(Some(&acting.as_actor()), item))
                .ok_or_else(|| {
                    ForumError::not_found(format!("Content {}", target.content_id()))
                })?;
            let kind_matches = match target {
                ReportTarget::Post(_) => item.is_post(),
                ReportTarget::Reply(_) => item.is_reply(),
            };
            if !kind_matches {
                return Err(ForumError::invalid_transition(
                    "Reported id does not match the content kind",
                ));
            }
            if item.is_deleted() {
                return Err(ForumError::invalid_transition(
                    "Deleted content cannot be reported",
                ));
            }

            let report = Report {
                id: ReportId::new(),
                reporter_id: acting.id,
                target,
                reason_category: submission.reason_category,
                reason_details: submission
                    .reason_details
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                status: ReportStatus::Pending,
                resolved_at: None,
                resolved_by: None,
                moderator_notes: None,
                created_at: current_timestamp_millis(),
                version: 0,
            };

            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            // Touch the item so a concurrent soft-delete sees this report.
            changes
                .guard(key, version)
                .update_content(item)
                .insert_report(report.clone());
            self.store().commit(changes)?;

            info!(
                reporter = %acting.id,
                report = %report.id,
                content = %report.content_id(),
                reason = %report.reason_category,
                "report submitted"
            );
            Ok(Report {
                version: 1,
                ..report
            })
        })
    }

    /// Moves a pending report to a terminal status.
    ///
    /// Resolving to the status it already has is a no-op; any other move out
    /// of a terminal status is refused.
    pub fn resolve_report(
        &self,
        actor: &Actor,
        id: &ReportId,
        new_status: ReportStatus,
        notes: Option<&str>,
    ) -> Result<Outcome<Report>> {
        let Some(action_type) = new_status.audit_action() else {
            return Err(ForumError::invalid_transition(
                "Reports cannot be returned to pending",
            ));
        };
        if let Some(notes) = notes {
            self.check_size("moderator notes", notes, self.config().max_moderator_notes_size)?;
        }

        self.with_retry("resolve_report", || {
            let acting = self.resolve_actor(actor)?;
            self.authorize(&acting, Permission::ResolveReport, None, "resolve reports")?;
            let mut report = self
                .store()
                .load_report(id)?
                .ok_or_else(|| ForumError::not_found(format!("Report {}", id)))?;

            if report.status == new_status {
                debug!(report = %report.id, status = %new_status, "resolve_report: already in target state");
                return Ok(Outcome::Unchanged(report));
            }
            if report.status.is_terminal() {
                return Err(ForumError::invalid_transition(format!(
                    "Report {} is already {}",
                    report.id, report.status
                )));
            }

            let merged = merge_notes(report.moderator_notes.as_deref(), notes);
            if let Some(merged) = &merged {
                self.check_size(
                    "moderator notes",
                    merged,
                    self.config().max_moderator_notes_size,
                )?;
            }

            let old_status = report.status;
            report.status = new_status;
            report.resolved_at = Some(current_timestamp_millis());
            report.resolved_by = Some(acting.id);
            report.moderator_notes = merged;

            let mut entry = AuditEntry::new(PerformedBy::Actor(acting.id), action_type, notes)
                .target_report(report.id)
                .details(json!({ "oldStatus": old_status, "newStatus": new_status }));
            entry.target_post_id = report.reported_post_id();
            entry.target_reply_id = report.reported_reply_id();

            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes
                .guard(key, version)
                .update_report(report.clone())
                .append_audit(entry);
            self.store().commit(changes)?;

            info!(moderator = %acting.id, report = %report.id, status = %new_status, "report resolved");
            report.version += 1;
            Ok(Outcome::Applied(report))
        })
    }

    /// Lists reports for moderators, optionally restricted to one status.
    pub fn report_queue(&self, actor: &Actor, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let acting = self.resolve_actor(actor)?;
        self.authorize(&acting, Permission::ViewReports, None, "view the report queue")?;
        self.store().list_reports(status)
    }

    /// Returns a report to its reporter or to a moderator.
    pub fn view_report(&self, actor: &Actor, id: &ReportId) -> Result<Report> {
        let acting = self.resolve_actor(actor)?;
        let report = self
            .store()
            .load_report(id)?
            .ok_or_else(|| ForumError::not_found(format!("Report {}", id)))?;
        if report.reporter_id == acting.id && acting.as_actor().is_approved() {
            return Ok(report);
        }
        self.authorize(&acting, Permission::ViewReports, None, "view this report")?;
        Ok(report)
    }
}
