//! Integration tests for forumcore
//!
//! These tests drive the moderation service end to end, through both the
//! in-memory store and the RocksDB store, and check state and ledger
//! together after every privileged operation.

use forumcore::moderation::{
    Actor, ApprovalStatus, AuditActionType, AuditCursor, AuditFilter, AuditQuery, Category,
    CategoryId, MemoryStore, ModerationService, ModerationStore, ReasonCategory, ReportStatus,
    ReportSubmission, RocksModerationStore, Role, ServiceIdentity, UserId,
};
use forumcore::ForumError;
use tempfile::TempDir;

struct Forum<S: ModerationStore> {
    service: ModerationService<S>,
    provisioning: ServiceIdentity,
    category: CategoryId,
}

impl<S: ModerationStore> Forum<S> {
    fn new(store: S) -> Self {
        let service = ModerationService::new(store);
        let category = Category::new(CategoryId::new(), false);
        service
            .store()
            .store_category(&category)
            .expect("Failed to seed category");
        Self {
            service,
            provisioning: ServiceIdentity::new("provisioning"),
            category: category.id,
        }
    }

    fn member(&self, role: Role) -> Actor {
        let id = UserId::new();
        self.service
            .register_account(&self.provisioning, id, role)
            .expect("Failed to register");
        self.service
            .approve(&self.provisioning, &id, None)
            .expect("Failed to approve");
        self.service.account(&id).unwrap().as_actor()
    }

    fn pending(&self) -> Actor {
        let id = UserId::new();
        self.service
            .register_account(&self.provisioning, id, Role::User)
            .expect("Failed to register");
        self.service.account(&id).unwrap().as_actor()
    }

    fn entries(&self, filter: AuditFilter) -> Vec<forumcore::moderation::AuditEntry> {
        self.service
            .store()
            .query_audit(&filter, None, 1000)
            .unwrap()
    }

    fn ledger_len(&self) -> u64 {
        self.service.store().audit_len().unwrap()
    }
}

fn rocks_forum() -> (Forum<RocksModerationStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = RocksModerationStore::open(temp_dir.path()).expect("Failed to open store");
    (Forum::new(store), temp_dir)
}

fn by_action(action_type: AuditActionType) -> AuditFilter {
    AuditFilter {
        action_type: Some(action_type),
        ..AuditFilter::default()
    }
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

/// A: a report on a post is resolved by the soft-delete of that post.
fn scenario_report_resolved_by_soft_delete<S: ModerationStore>(forum: &Forum<S>) {
    let u1 = forum.member(Role::User);
    let m1 = forum.member(Role::Moderator);
    let author = forum.member(Role::User);
    let p1 = forum
        .service
        .create_post(&author, &forum.category, "cheap watches")
        .unwrap();

    let report = forum
        .service
        .submit_report(&u1, &ReportSubmission::post(p1.id, ReasonCategory::Spam, None))
        .unwrap();
    assert_eq!(report.status, ReportStatus::Pending);

    let outcome = forum.service.soft_delete(&m1, &p1.id, Some("spam")).unwrap();
    assert!(outcome.is_applied());

    let stored = forum.service.store().load_content(&p1.id).unwrap().unwrap();
    assert!(stored.is_deleted());
    let deletion = stored.deletion.unwrap();
    assert_eq!(deletion.deleted_by, m1.id);
    assert_eq!(deletion.reason.as_deref(), Some("spam"));

    let report = forum.service.store().load_report(&report.id).unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::ResolvedActionTaken);

    let entries = forum.entries(by_action(AuditActionType::ContentSoftDelete));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target_post_id, Some(p1.id));
    assert_eq!(entries[0].moderator_id(), Some(m1.id));
}

/// B: an admin promotes a user to moderator.
fn scenario_admin_promotes_user<S: ModerationStore>(forum: &Forum<S>) {
    let a1 = forum.member(Role::Admin);
    let u1 = forum.member(Role::User);

    let outcome = forum
        .service
        .change_role(&a1, &u1.id, Role::Moderator, None)
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(forum.service.account(&u1.id).unwrap().role, Role::Moderator);

    let entries = forum.entries(AuditFilter {
        action_type: Some(AuditActionType::UserRoleChange),
        target_user_id: Some(u1.id),
        ..AuditFilter::default()
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details["oldRole"], "USER");
    assert_eq!(entries[0].details["newRole"], "MODERATOR");
}

/// C: an admin cannot demote another admin.
fn scenario_admin_peer_is_immune<S: ModerationStore>(forum: &Forum<S>) {
    let a1 = forum.member(Role::Admin);
    let a2 = forum.member(Role::Admin);
    let before = forum.ledger_len();

    let result = forum.service.change_role(&a1, &a2.id, Role::User, None);
    assert!(matches!(result, Err(ForumError::PermissionDenied(_))));
    assert_eq!(forum.service.account(&a2.id).unwrap().role, Role::Admin);
    assert_eq!(forum.ledger_len(), before);
}

/// D: a pending user cannot post.
fn scenario_pending_user_cannot_post<S: ModerationStore>(forum: &Forum<S>) {
    let u2 = forum.pending();
    assert_eq!(u2.approval_status, ApprovalStatus::PendingApproval);

    let result = forum.service.create_post(&u2, &forum.category, "hello?");
    assert!(matches!(result, Err(ForumError::PermissionDenied(_))));
}

#[test]
fn test_scenarios_in_memory() {
    scenario_report_resolved_by_soft_delete(&Forum::new(MemoryStore::new()));
    scenario_admin_promotes_user(&Forum::new(MemoryStore::new()));
    scenario_admin_peer_is_immune(&Forum::new(MemoryStore::new()));
    scenario_pending_user_cannot_post(&Forum::new(MemoryStore::new()));
}

#[test]
fn test_scenarios_on_rocksdb() {
    let (forum, _temp) = rocks_forum();
    scenario_report_resolved_by_soft_delete(&forum);
    scenario_admin_promotes_user(&forum);
    scenario_admin_peer_is_immune(&forum);
    scenario_pending_user_cannot_post(&forum);
}

// =============================================================================
// Ledger completeness
// =============================================================================

/// Every successful privileged call appends exactly one entry of its type.
fn check_audit_completeness<S: ModerationStore>(forum: &Forum<S>) {
    let admin = forum.member(Role::Admin);
    let moderator = forum.member(Role::Moderator);
    let author = forum.member(Role::User);

    let expect = |action: AuditActionType, run: &dyn Fn()| {
        let before = forum.entries(by_action(action)).len();
        let total_before = forum.ledger_len();
        run();
        assert_eq!(forum.entries(by_action(action)).len(), before + 1, "{}", action);
        assert_eq!(forum.ledger_len(), total_before + 1, "{}", action);
    };

    let post = forum
        .service
        .create_post(&author, &forum.category, "body")
        .unwrap();
    expect(AuditActionType::ContentSoftDelete, &|| {
        forum.service.soft_delete(&moderator, &post.id, None).unwrap();
    });
    expect(AuditActionType::ContentRestore, &|| {
        forum.service.restore(&moderator, &post.id, None).unwrap();
    });
    expect(AuditActionType::ContentEditModerator, &|| {
        forum
            .service
            .edit_as_moderator(&moderator, &post.id, "edited", None)
            .unwrap();
    });

    let report = forum
        .service
        .submit_report(&author, &ReportSubmission::post(post.id, ReasonCategory::Other, None))
        .unwrap();
    expect(AuditActionType::ReportStatusChangeApprove, &|| {
        forum
            .service
            .resolve_report(&moderator, &report.id, ReportStatus::ResolvedApproved, None)
            .unwrap();
    });

    expect(AuditActionType::ContentPermanentDelete, &|| {
        forum
            .service
            .permanently_delete(&moderator, &post.id, None)
            .unwrap();
    });

    let newcomer = forum.pending();
    expect(AuditActionType::UserAccountReject, &|| {
        forum.service.reject(&moderator, &newcomer.id, None).unwrap();
    });
    expect(AuditActionType::UserAccountApprove, &|| {
        forum.service.approve(&moderator, &newcomer.id, None).unwrap();
    });
    expect(AuditActionType::UserRoleChange, &|| {
        forum
            .service
            .change_role(&admin, &newcomer.id, Role::Moderator, None)
            .unwrap();
    });
    expect(AuditActionType::UserWarn, &|| {
        forum.service.warn_user(&admin, &newcomer.id, None).unwrap();
    });
    expect(AuditActionType::UserAccountCreateAdmin, &|| {
        forum
            .service
            .create_account(&admin, UserId::new(), Role::User, None)
            .unwrap();
    });

    // Every entry carries a justification.
    assert!(forum
        .entries(AuditFilter::default())
        .iter()
        .all(|e| !e.justification.trim().is_empty()));
}

#[test]
fn test_audit_completeness_in_memory() {
    check_audit_completeness(&Forum::new(MemoryStore::new()));
}

#[test]
fn test_audit_completeness_on_rocksdb() {
    let (forum, _temp) = rocks_forum();
    check_audit_completeness(&forum);
}

// =============================================================================
// Cascades
// =============================================================================

#[test]
fn test_soft_delete_cascade_leaves_resolved_reports_alone() {
    let forum = Forum::new(MemoryStore::new());
    let author = forum.member(Role::User);
    let reporter = forum.member(Role::User);
    let moderator = forum.member(Role::Moderator);
    let post = forum
        .service
        .create_post(&author, &forum.category, "borderline")
        .unwrap();

    let rejected = forum
        .service
        .submit_report(&reporter, &ReportSubmission::post(post.id, ReasonCategory::Other, None))
        .unwrap();
    forum
        .service
        .resolve_report(&moderator, &rejected.id, ReportStatus::ResolvedRejected, Some("ok"))
        .unwrap();
    let pending = forum
        .service
        .submit_report(
            &reporter,
            &ReportSubmission::post(post.id, ReasonCategory::Harassment, Some("again")),
        )
        .unwrap();

    forum.service.soft_delete(&moderator, &post.id, None).unwrap();

    let store = forum.service.store();
    assert_eq!(
        store.load_report(&rejected.id).unwrap().unwrap().status,
        ReportStatus::ResolvedRejected
    );
    assert_eq!(
        store.load_report(&pending.id).unwrap().unwrap().status,
        ReportStatus::ResolvedActionTaken
    );

    // Restoring does not reopen reports.
    forum.service.restore(&moderator, &post.id, None).unwrap();
    assert_eq!(
        store.load_report(&pending.id).unwrap().unwrap().status,
        ReportStatus::ResolvedActionTaken
    );
}

#[test]
fn test_permanent_delete_on_rocksdb_cleans_indexes() {
    let (forum, _temp) = rocks_forum();
    let author = forum.member(Role::User);
    let moderator = forum.member(Role::Moderator);
    let post = forum
        .service
        .create_post(&author, &forum.category, "thread")
        .unwrap();
    let keep = forum
        .service
        .create_post(&author, &forum.category, "other thread")
        .unwrap();
    for i in 0..3 {
        let reply = forum
            .service
            .create_reply(&author, &post.id, &format!("reply {}", i))
            .unwrap();
        forum
            .service
            .submit_report(&moderator, &ReportSubmission::reply(reply.id, ReasonCategory::Spam, None))
            .unwrap();
    }
    forum.service.create_reply(&author, &keep.id, "stays").unwrap();

    forum
        .service
        .permanently_delete(&moderator, &post.id, Some("thread removed"))
        .unwrap();

    let store = forum.service.store();
    assert!(store.load_content(&post.id).unwrap().is_none());
    assert!(store.load_replies(&post.id).unwrap().is_empty());
    assert!(store.list_reports(None).unwrap().is_empty());
    assert_eq!(store.load_replies(&keep.id).unwrap().len(), 1);

    let entries = forum.entries(by_action(AuditActionType::ContentPermanentDelete));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details["replyIds"].as_array().unwrap().len(), 3);
    assert_eq!(entries[0].details["reportIds"].as_array().unwrap().len(), 3);
}

// =============================================================================
// Ledger reads
// =============================================================================

#[test]
fn test_audit_log_is_admin_only_and_paged() {
    let forum = Forum::new(MemoryStore::new());
    let super_admin = forum.member(Role::SuperAdmin);
    let admin = forum.member(Role::Admin);
    let moderator = forum.member(Role::Moderator);
    let target = forum.member(Role::User);

    for i in 0..5 {
        forum
            .service
            .warn_user(&moderator, &target.id, Some(&format!("warning {}", i)))
            .unwrap();
    }

    let query = AuditQuery {
        filter: by_action(AuditActionType::UserWarn),
        cursor: None,
        limit: Some(2),
    };
    let denied = forum.service.query_audit_log(&moderator, &query);
    assert!(matches!(denied, Err(ForumError::PermissionDenied(_))));

    let mut seen = Vec::new();
    let mut cursor: Option<AuditCursor> = None;
    loop {
        let page = forum
            .service
            .query_audit_log(
                &admin,
                &AuditQuery {
                    cursor,
                    ..query.clone()
                },
            )
            .unwrap();
        seen.extend(page.entries.iter().map(|e| e.justification.clone()));
        match page.next_cursor {
            Some(next) => cursor = Some(AuditCursor::decode(&next.encode().unwrap()).unwrap()),
            None => break,
        }
    }
    assert_eq!(
        seen,
        (0..5).map(|i| format!("warning {}", i)).collect::<Vec<_>>()
    );

    assert!(forum.service.query_audit_log(&super_admin, &query).is_ok());
}

#[test]
fn test_rejected_admin_loses_ledger_access() {
    let forum = Forum::new(MemoryStore::new());
    let super_admin = forum.member(Role::SuperAdmin);
    let admin = forum.member(Role::Admin);

    forum.service.reject(&super_admin, &admin.id, None).unwrap();

    // The caller still holds an "approved" actor record; the store wins.
    let result = forum.service.query_audit_log(&admin, &AuditQuery::default());
    assert!(matches!(result, Err(ForumError::PermissionDenied(_))));
}

#[test]
fn test_rocksdb_state_survives_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let provisioning = ServiceIdentity::new("provisioning");
    let user = UserId::new();
    {
        let service =
            ModerationService::new(RocksModerationStore::open(temp_dir.path()).unwrap());
        service
            .register_account(&provisioning, user, Role::Moderator)
            .unwrap();
        service.approve(&provisioning, &user, None).unwrap();
    }

    let service = ModerationService::new(RocksModerationStore::open(temp_dir.path()).unwrap());
    let account = service.account(&user).unwrap();
    assert_eq!(account.role, Role::Moderator);
    assert_eq!(account.approval_status, ApprovalStatus::Approved);
    // Seeded role plus approval.
    assert_eq!(service.store().audit_len().unwrap(), 2);
}
