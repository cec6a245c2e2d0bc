//! Content lifecycle: posts, replies, drafts and moderation removal.
//!
//! ```text
//!            publish_draft
//!   Draft ─────────────────▶ Active ◀──── restore ────┐
//!                              │                      │
//!                              └──── soft_delete ──▶ SoftDeleted
//!
//!   any state ── permanently_delete ──▶ Gone (row removed)
//! ```
//!
//! Soft deletion resolves every pending report on the item in the same
//! change set. Permanent deletion records its ledger entry before any row
//! disappears.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::access::{can, Resource};
use super::audit::{AuditActionType, AuditEntry, PerformedBy};
use super::permissions::Permission;
use super::report::ReportStatus;
use super::service::{actor_guard, ModerationService};
use super::store::{ChangeSet, ModerationStore};
use super::types::{current_timestamp_millis, Actor, CategoryId, ContentId, Outcome, UserId};
use crate::error::{ForumError, Result};

/// Whether an item is a post in a category or a reply to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Post { category_id: CategoryId },
    Reply { post_id: ContentId },
}

/// Deletion record of a soft-deleted item.
///
/// Being an `Option` on the item, it cannot exist half-set: an item is
/// deleted exactly when it has a deletion time and a deleting actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub deleted_at: u64,
    pub deleted_by: UserId,
    pub reason: Option<String>,
}

/// Lifecycle state derived from an item's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Draft,
    Active,
    SoftDeleted,
}

/// A post or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub author_id: UserId,
    pub kind: ContentKind,
    pub body: String,
    /// False for drafts. Replies are always published.
    pub published: bool,
    pub deletion: Option<Deletion>,
    pub created_at: u64,
    pub edited_at: Option<u64>,
    pub version: u64,
}

impl ContentItem {
    fn new(author_id: UserId, kind: ContentKind, body: String, published: bool) -> Self {
        Self {
            id: ContentId::new(),
            author_id,
            kind,
            body,
            published,
            deletion: None,
            created_at: current_timestamp_millis(),
            edited_at: None,
            version: 0,
        }
    }

    pub fn is_post(&self) -> bool {
        matches!(self.kind, ContentKind::Post { .. })
    }

    pub fn is_reply(&self) -> bool {
        matches!(self.kind, ContentKind::Reply { .. })
    }

    /// Category of a post; `None` for replies.
    pub fn category_id(&self) -> Option<CategoryId> {
        match self.kind {
            ContentKind::Post { category_id } => Some(category_id),
            ContentKind::Reply { .. } => None,
        }
    }

    /// Parent post of a reply; `None` for posts.
    pub fn parent_id(&self) -> Option<ContentId> {
        match self.kind {
            ContentKind::Reply { post_id } => Some(post_id),
            ContentKind::Post { .. } => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn state(&self) -> ContentState {
        if self.is_deleted() {
            ContentState::SoftDeleted
        } else if self.published {
            ContentState::Active
        } else {
            ContentState::Draft
        }
    }
}

/// Visibility rule for a single item.
///
/// Approved moderators and above see everything. Everyone else sees
/// published, non-deleted items plus their own non-deleted drafts.
pub fn is_visible_to(viewer: Option<&Actor>, item: &ContentItem) -> bool {
    if can(viewer, Permission::ViewDeletedContent, None) {
        return true;
    }
    match item.state() {
        ContentState::Active => true,
        ContentState::Draft => viewer.is_some_and(|v| v.id == item.author_id),
        ContentState::SoftDeleted => false,
    }
}

fn reason_text(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

impl<S: ModerationStore> ModerationService<S> {
    /// Creates a published post. Locked categories need `post_in_locked_category`.
    pub fn create_post(
        &self,
        actor: &Actor,
        category_id: &CategoryId,
        body: &str,
    ) -> Result<ContentItem> {
        self.create_post_item(actor, category_id, body, true)
    }

    /// Creates an unpublished post visible only to its author and moderators.
    pub fn create_draft(
        &self,
        actor: &Actor,
        category_id: &CategoryId,
        body: &str,
    ) -> Result<ContentItem> {
        self.create_post_item(actor, category_id, body, false)
    }

    fn create_post_item(
        &self,
        actor: &Actor,
        category_id: &CategoryId,
        body: &str,
        published: bool,
    ) -> Result<ContentItem> {
        self.check_size("body", body, self.config().max_body_size)?;
        self.with_retry("create_post", || {
            let acting = self.resolve_actor(actor)?;
            let category = self
                .store()
                .load_category(category_id)?
                .ok_or_else(|| ForumError::not_found(format!("Category {}", category_id)))?;
            self.authorize(
                &acting,
                Permission::CreatePost,
                Some(&Resource::category(category.locked_for_users)),
                "post in this category",
            )?;

            let item = ContentItem::new(
                acting.id,
                ContentKind::Post {
                    category_id: category.id,
                },
                body.to_string(),
                published,
            );
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes.guard(key, version).insert_content(item.clone());
            self.store().commit(changes)?;

            info!(author = %acting.id, post = %item.id, category = %category.id, published, "post created");
            Ok(ContentItem { version: 1, ..item })
        })
    }

    /// Replies to a published, non-deleted post. Category locks do not apply.
    pub fn create_reply(&self, actor: &Actor, post_id: &ContentId, body: &str) -> Result<ContentItem> {
        self.check_size("body", body, self.config().max_body_size)?;
        self.with_retry("create_reply", || {
            let acting = self.resolve_actor(actor)?;
            self.authorize(&acting, Permission::CreateReply, None, "reply")?;

            let parent = self
                .store()
                .load_content(post_id)?
                .ok_or_else(|| ForumError::not_found(format!("Post {}", post_id)))?;
            if !parent.is_post() {
                return Err(ForumError::invalid_transition("Replies must target a post"));
            }
            if parent.state() != ContentState::Active {
                return Err(ForumError::invalid_transition(format!(
                    "Post {} is not open for replies",
                    post_id
                )));
            }

            let reply = ContentItem::new(
                acting.id,
                ContentKind::Reply { post_id: parent.id },
                body.to_string(),
                true,
            );
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            // Touch the parent so a concurrent delete of it conflicts with this insert.
            changes
                .guard(key, version)
                .update_content(parent)
                .insert_content(reply.clone());
            self.store().commit(changes)?;

            info!(author = %acting.id, reply = %reply.id, post = %post_id, "reply created");
            Ok(ContentItem {
                version: 1,
                ..reply
            })
        })
    }

    /// Publishes the author's own draft.
    pub fn publish_draft(&self, actor: &Actor, id: &ContentId) -> Result<Outcome<ContentItem>> {
        self.with_retry("publish_draft", || {
            let acting = self.resolve_actor(actor)?;
            let mut item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::EditOwnPost,
                Some(&Resource::authored_by(item.author_id)),
                "publish this draft",
            )?;
            match item.state() {
                ContentState::Active => return Ok(Outcome::Unchanged(item)),
                ContentState::SoftDeleted => {
                    return Err(ForumError::invalid_transition(
                        "Deleted content cannot be published",
                    ))
                }
                ContentState::Draft => {}
            }

            item.published = true;
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes.guard(key, version).update_content(item.clone());
            self.store().commit(changes)?;

            info!(author = %acting.id, post = %item.id, "draft published");
            item.version += 1;
            Ok(Outcome::Applied(item))
        })
    }

    /// Replaces the body of the author's own, non-deleted item.
    pub fn edit_own(
        &self,
        actor: &Actor,
        id: &ContentId,
        body: &str,
    ) -> Result<Outcome<ContentItem>> {
        self.check_size("body", body, self.config().max_body_size)?;
        self.with_retry("edit_own", || {
            let acting = self.resolve_actor(actor)?;
            let mut item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::EditOwnPost,
                Some(&Resource::authored_by(item.author_id)),
                "edit this content",
            )?;
            if item.is_deleted() {
                return Err(ForumError::invalid_transition(
                    "Deleted content cannot be edited",
                ));
            }
            if item.body == body {
                return Ok(Outcome::Unchanged(item));
            }

            item.body = body.to_string();
            item.edited_at = Some(current_timestamp_millis());
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes.guard(key, version).update_content(item.clone());
            self.store().commit(changes)?;

            debug!(author = %acting.id, content = %item.id, "content edited by author");
            item.version += 1;
            Ok(Outcome::Applied(item))
        })
    }

    /// Replaces the body of any existing item on behalf of a moderator.
    pub fn edit_as_moderator(
        &self,
        actor: &Actor,
        id: &ContentId,
        body: &str,
        justification: Option<&str>,
    ) -> Result<Outcome<ContentItem>> {
        self.check_size("body", body, self.config().max_body_size)?;
        self.check_justification(justification)?;
        self.with_retry("edit_as_moderator", || {
            let acting = self.resolve_actor(actor)?;
            let mut item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::EditAnyPost,
                Some(&Resource::authored_by(item.author_id)),
                "edit other members' content",
            )?;
            if item.body == body {
                return Ok(Outcome::Unchanged(item));
            }

            let old_body = std::mem::replace(&mut item.body, body.to_string());
            item.edited_at = Some(current_timestamp_millis());
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes
                .guard(key, version)
                .update_content(item.clone())
                .append_audit(
                    AuditEntry::new(
                        PerformedBy::Actor(acting.id),
                        AuditActionType::ContentEditModerator,
                        justification,
                    )
                    .target_content(&item)
                    .target_user(item.author_id)
                    .details(json!({ "oldBody": old_body, "newBody": item.body })),
                );
            self.store().commit(changes)?;

            info!(moderator = %acting.id, content = %item.id, "content edited by moderator");
            item.version += 1;
            Ok(Outcome::Applied(item))
        })
    }

    /// Soft-deletes an item and resolves its pending reports as action taken.
    ///
    /// Deleting an already-deleted item is a no-op with no ledger entry.
    pub fn soft_delete(
        &self,
        actor: &Actor,
        id: &ContentId,
        reason: Option<&str>,
    ) -> Result<Outcome<ContentItem>> {
        self.check_justification(reason)?;
        self.with_retry("soft_delete", || {
            let acting = self.resolve_actor(actor)?;
            let mut item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::SoftDeleteContent,
                Some(&Resource::authored_by(item.author_id)),
                "delete content",
            )?;
            if item.is_deleted() {
                debug!(content = %item.id, "soft_delete: already in target state");
                return Ok(Outcome::Unchanged(item));
            }

            let now = current_timestamp_millis();
            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes.guard(key, version);

            let mut resolved = Vec::new();
            for mut report in self.store().load_reports_for_content(&item.id)? {
                if report.status != ReportStatus::Pending {
                    continue;
                }
                report.status = ReportStatus::ResolvedActionTaken;
                report.resolved_at = Some(now);
                report.resolved_by = Some(acting.id);
                resolved.push(report.id);
                changes.update_report(report);
            }

            item.deletion = Some(Deletion {
                deleted_at: now,
                deleted_by: acting.id,
                reason: reason_text(reason),
            });
            changes.update_content(item.clone()).append_audit(
                AuditEntry::new(
                    PerformedBy::Actor(acting.id),
                    AuditActionType::ContentSoftDelete,
                    reason,
                )
                .target_content(&item)
                .target_user(item.author_id)
                .details(json!({ "resolvedReports": resolved })),
            );
            self.store().commit(changes)?;

            info!(
                moderator = %acting.id,
                content = %item.id,
                resolved_reports = resolved.len(),
                "content soft-deleted"
            );
            item.version += 1;
            Ok(Outcome::Applied(item))
        })
    }

    /// Clears the deletion of a soft-deleted item. Reports are left as they are.
    pub fn restore(
        &self,
        actor: &Actor,
        id: &ContentId,
        justification: Option<&str>,
    ) -> Result<ContentItem> {
        self.check_justification(justification)?;
        self.with_retry("restore", || {
            let acting = self.resolve_actor(actor)?;
            let mut item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::RestoreContent,
                Some(&Resource::authored_by(item.author_id)),
                "restore content",
            )?;
            let Some(deletion) = item.deletion.take() else {
                return Err(ForumError::invalid_transition(format!(
                    "Content {} is not deleted",
                    item.id
                )));
            };

            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes
                .guard(key, version)
                .update_content(item.clone())
                .append_audit(
                    AuditEntry::new(
                        PerformedBy::Actor(acting.id),
                        AuditActionType::ContentRestore,
                        justification,
                    )
                    .target_content(&item)
                    .target_user(item.author_id)
                    .details(json!({
                        "deletedAt": deletion.deleted_at,
                        "deletedBy": deletion.deleted_by,
                        "deletionReason": deletion.reason,
                    })),
                );
            self.store().commit(changes)?;

            info!(moderator = %acting.id, content = %item.id, "content restored");
            item.version += 1;
            Ok(item)
        })
    }

    /// Removes an item for good, together with its replies and every report
    /// on any of them.
    pub fn permanently_delete(
        &self,
        actor: &Actor,
        id: &ContentId,
        justification: Option<&str>,
    ) -> Result<()> {
        self.check_justification(justification)?;
        self.with_retry("permanently_delete", || {
            let acting = self.resolve_actor(actor)?;
            let item = self.load_item(id)?;
            self.authorize(
                &acting,
                Permission::PermanentDeleteContent,
                Some(&Resource::authored_by(item.author_id)),
                "permanently delete content",
            )?;

            let replies = if item.is_post() {
                self.store().load_replies(&item.id)?
            } else {
                Vec::new()
            };
            let mut reports = self.store().load_reports_for_content(&item.id)?;
            for reply in &replies {
                reports.extend(self.store().load_reports_for_content(&reply.id)?);
            }

            let (key, version) = actor_guard(&acting);
            let mut changes = ChangeSet::new();
            changes.guard(key, version).append_audit(
                AuditEntry::new(
                    PerformedBy::Actor(acting.id),
                    AuditActionType::ContentPermanentDelete,
                    justification,
                )
                .target_content(&item)
                .target_user(item.author_id)
                .details(json!({
                    "wasSoftDeleted": item.is_deleted(),
                    "replyIds": replies.iter().map(|r| r.id).collect::<Vec<_>>(),
                    "reportIds": reports.iter().map(|r| r.id).collect::<Vec<_>>(),
                })),
            );
            for report in &reports {
                changes.delete_report(report.id, report.version);
            }
            for reply in &replies {
                changes.delete_content(reply.id, reply.version);
            }
            changes.delete_content(item.id, item.version);
            self.store().commit(changes)?;

            info!(
                moderator = %acting.id,
                content = %item.id,
                replies = replies.len(),
                reports = reports.len(),
                "content permanently deleted"
            );
            Ok(())
        })
    }

    /// Returns an item if `viewer` may see it; invisible items are `NotFound`.
    ///
    /// A reply is only visible while its parent post is.
    pub fn view_content(&self, viewer: Option<&Actor>, id: &ContentId) -> Result<ContentItem> {
        let viewer = self.resolve_reader(viewer)?;
        let item = self.load_item(id)?;
        if !is_visible_to(viewer.as_ref(), &item) {
            return Err(ForumError::not_found(format!("Content {}", id)));
        }
        if let Some(parent_id) = item.parent_id() {
            let parent = self.load_item(&parent_id)?;
            if !is_visible_to(viewer.as_ref(), &parent) {
                return Err(ForumError::not_found(format!("Content {}", id)));
            }
        }
        Ok(item)
    }

    /// Returns the replies to a post that `viewer` may see, oldest first.
    pub fn visible_replies(
        &self,
        viewer: Option<&Actor>,
        post_id: &ContentId,
    ) -> Result<Vec<ContentItem>> {
        let viewer = self.resolve_reader(viewer)?;
        let post = self.load_item(post_id)?;
        if !post.is_post() || !is_visible_to(viewer.as_ref(), &post) {
            return Err(ForumError::not_found(format!("Post {}", post_id)));
        }
        Ok(self
            .store()
            .load_replies(post_id)?
            .into_iter()
            .filter(|reply| is_visible_to(viewer.as_ref(), reply))
            .collect())
    }

    fn load_item(&self, id: &ContentId) -> Result<ContentItem> {
        self.store()
            .load_content(id)?
            .ok_or_else(|| ForumError::not_found(format!("Content {}", id)))
    }
}
