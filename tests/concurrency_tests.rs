//! Concurrency tests for moderation transitions
//!
//! Threads race conflicting transitions against a shared service and the
//! tests check that commits stay serializable: one winner, one ledger entry,
//! no orphaned pending reports. Unless a test says otherwise it runs on the
//! default retry policy, so a loser either re-reads into a no-op or reports
//! `ConcurrentModification`.

use forumcore::moderation::{
    Actor, AuditActionType, AuditFilter, Category, CategoryId, ContentId, MemoryStore,
    ModerationService, ModerationStore, ReasonCategory, ReportStatus, ReportSubmission, Role,
    ServiceIdentity, UserId,
};
use forumcore::{ForumError, ModerationConfig, Result};
use std::sync::{Arc, Barrier};
use std::thread;

const ROUNDS: usize = 25;

struct Fixture {
    service: Arc<ModerationService<MemoryStore>>,
    provisioning: ServiceIdentity,
    category: CategoryId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(ModerationConfig::default())
    }

    fn with_retries(conflict_retries: u32) -> Self {
        Self::with_config(ModerationConfig {
            conflict_retries,
            ..ModerationConfig::default()
        })
    }

    fn with_config(config: ModerationConfig) -> Self {
        let service = ModerationService::with_config(MemoryStore::new(), config).unwrap();
        let category = Category::new(CategoryId::new(), false);
        service.store().store_category(&category).unwrap();
        Self {
            service: Arc::new(service),
            provisioning: ServiceIdentity::new("provisioning"),
            category: category.id,
        }
    }

    fn member(&self, role: Role) -> Actor {
        let id = UserId::new();
        self.service
            .register_account(&self.provisioning, id, role)
            .unwrap();
        self.service.approve(&self.provisioning, &id, None).unwrap();
        self.service.account(&id).unwrap().as_actor()
    }

    fn post(&self, author: &Actor) -> ContentId {
        self.service
            .create_post(author, &self.category, "contested post")
            .unwrap()
            .id
    }

    fn ledger_count(&self, action: AuditActionType, content: ContentId) -> usize {
        let filter = AuditFilter {
            action_type: Some(action),
            target_content_id: Some(content),
            ..AuditFilter::default()
        };
        self.service
            .store()
            .query_audit(&filter, None, usize::MAX)
            .unwrap()
            .len()
    }
}

#[test]
fn test_racing_soft_deletes_apply_once() {
    let fixture = Fixture::new();
    let author = fixture.member(Role::User);
    let moderators: Vec<Actor> = (0..4).map(|_| fixture.member(Role::Moderator)).collect();

    for _ in 0..ROUNDS {
        let post = fixture.post(&author);
        let barrier = Arc::new(Barrier::new(moderators.len()));

        let handles: Vec<_> = moderators
            .iter()
            .cloned()
            .map(|moderator| {
                let service = Arc::clone(&fixture.service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.soft_delete(&moderator, &post, Some("spam"))
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(outcome) => {
                    assert!(outcome.get().is_deleted());
                    if outcome.is_applied() {
                        applied += 1;
                    }
                }
                Err(ForumError::ConcurrentModification(_)) => {}
                Err(other) => panic!("Unexpected soft-delete error: {}", other),
            }
        }
        assert_eq!(applied, 1, "Exactly one soft-delete must win");
        let stored = fixture.service.store().load_content(&post).unwrap().unwrap();
        assert!(stored.is_deleted());
        assert_eq!(
            fixture.ledger_count(AuditActionType::ContentSoftDelete, post),
            1
        );
    }
}

#[test]
fn test_report_submission_races_soft_delete() {
    // Reporters also contend with each other on the item row.
    let fixture = Fixture::with_retries(16);
    let author = fixture.member(Role::User);
    let moderator = fixture.member(Role::Moderator);
    let reporters: Vec<Actor> = (0..3).map(|_| fixture.member(Role::User)).collect();

    for _ in 0..ROUNDS {
        let post = fixture.post(&author);
        let barrier = Arc::new(Barrier::new(reporters.len() + 1));

        let report_handles: Vec<_> = reporters
            .iter()
            .cloned()
            .map(|reporter| {
                let service = Arc::clone(&fixture.service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let submission = ReportSubmission::post(post, ReasonCategory::Spam, None);
                    service.submit_report(&reporter, &submission)
                })
            })
            .collect();

        let delete_handle = {
            let service = Arc::clone(&fixture.service);
            let barrier = Arc::clone(&barrier);
            let moderator = moderator.clone();
            thread::spawn(move || {
                barrier.wait();
                service.soft_delete(&moderator, &post, None)
            })
        };

        for handle in report_handles {
            match handle.join().unwrap() {
                Ok(report) => assert_eq!(report.status, ReportStatus::Pending),
                // Lost the race: the item was already gone for this reporter.
                Err(ForumError::NotFound(_)) | Err(ForumError::InvalidStateTransition(_)) => {}
                Err(other) => panic!("Unexpected submission error: {}", other),
            }
        }
        assert!(delete_handle.join().unwrap().unwrap().is_applied());

        // Every report that landed was cascaded by the delete.
        let reports = fixture.service.store().load_reports_for_content(&post).unwrap();
        for report in &reports {
            assert_eq!(report.status, ReportStatus::ResolvedActionTaken);
            assert_eq!(report.resolved_by, Some(moderator.id));
        }
    }
}

#[test]
fn test_demotion_races_moderator_action() {
    let fixture = Fixture::new();
    let author = fixture.member(Role::User);
    let super_admin = fixture.member(Role::SuperAdmin);

    for _ in 0..ROUNDS {
        let moderator = fixture.member(Role::Moderator);
        let post = fixture.post(&author);
        let barrier = Arc::new(Barrier::new(2));

        let delete_handle = {
            let service = Arc::clone(&fixture.service);
            let barrier = Arc::clone(&barrier);
            let moderator = moderator.clone();
            thread::spawn(move || {
                barrier.wait();
                service.soft_delete(&moderator, &post, None)
            })
        };
        let demote_handle = {
            let service = Arc::clone(&fixture.service);
            let barrier = Arc::clone(&barrier);
            let super_admin = super_admin.clone();
            let target = moderator.id;
            thread::spawn(move || {
                barrier.wait();
                service.change_role(&super_admin, &target, Role::User, Some("inactive"))
            })
        };

        assert!(demote_handle.join().unwrap().unwrap().is_applied());
        let deleted = delete_handle.join().unwrap();
        let item = fixture.service.store().load_content(&post).unwrap().unwrap();
        match deleted {
            Ok(outcome) => {
                assert!(outcome.is_applied());
                assert!(item.is_deleted());
                assert_eq!(
                    fixture.ledger_count(AuditActionType::ContentSoftDelete, post),
                    1
                );
            }
            Err(ForumError::PermissionDenied(_)) => {
                assert!(!item.is_deleted());
                assert_eq!(
                    fixture.ledger_count(AuditActionType::ContentSoftDelete, post),
                    0
                );
            }
            Err(other) => panic!("Unexpected soft-delete error: {}", other),
        }
        assert_eq!(
            fixture.service.account(&moderator.id).unwrap().role,
            Role::User
        );
    }
}

#[test]
fn test_racing_role_changes_leave_consistent_ledger() {
    let fixture = Fixture::new();
    let admins: Vec<Actor> = (0..4).map(|_| fixture.member(Role::Admin)).collect();
    let roles = [Role::Moderator, Role::User, Role::Moderator, Role::User];

    for _ in 0..ROUNDS {
        let target = fixture.member(Role::User);
        let barrier = Arc::new(Barrier::new(admins.len()));
        let handles: Vec<_> = admins
            .iter()
            .cloned()
            .zip(roles)
            .map(|(admin, role)| {
                let service = Arc::clone(&fixture.service);
                let barrier = Arc::clone(&barrier);
                let target = target.id;
                thread::spawn(move || {
                    barrier.wait();
                    service.change_role(&admin, &target, role, None)
                })
            })
            .collect();

        let results: Vec<Result<_>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let mut applied = 0;
        for result in &results {
            match result {
                Ok(outcome) if outcome.is_applied() => applied += 1,
                Ok(_) | Err(ForumError::ConcurrentModification(_)) => {}
                Err(other) => panic!("Unexpected role change error: {}", other),
            }
        }
        assert!(applied >= 1, "At least one role change must land");

        let filter = AuditFilter {
            action_type: Some(AuditActionType::UserRoleChange),
            target_user_id: Some(target.id),
            ..AuditFilter::default()
        };
        let entries = fixture
            .service
            .store()
            .query_audit(&filter, None, usize::MAX)
            .unwrap();
        assert_eq!(entries.len(), applied);

        // Each change starts from the role the previous one left behind.
        let mut expected_old = Role::User.as_str();
        for entry in &entries {
            assert_eq!(entry.details["oldRole"], expected_old);
            expected_old = entry.details["newRole"].as_str().unwrap();
        }

        let account = fixture.service.account(&target.id).unwrap();
        assert_eq!(account.role.as_str(), expected_old);
        assert_eq!(account.version, 2 + applied as u64);
    }
}
