//! Storage abstraction for the moderation state machines.
//!
//! Every transition is a read-modify-write. The state machines read rows,
//! decide, and hand the store a [`ChangeSet`]: the rows to write (each
//! carrying the version it was read at), read-only preconditions on other
//! rows, and the audit entries to append. The store applies a change set
//! atomically or not at all; any stale version fails the whole set with
//! `ForumError::ConcurrentModification`.
//!
//! Two implementations exist: [`MemoryStore`] here and
//! [`RocksModerationStore`](super::storage::RocksModerationStore).

use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::audit::{AuditEntry, AuditFilter};
use super::content::ContentItem;
use super::report::{Report, ReportStatus};
use super::types::{Account, Category, CategoryId, ContentId, ReportId, UserId};
use crate::error::{ForumError, Result};

/// Identifies a versioned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    Account(UserId),
    Content(ContentId),
    Report(ReportId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Account(id) => write!(f, "account {}", id),
            RowKey::Content(id) => write!(f, "content {}", id),
            RowKey::Report(id) => write!(f, "report {}", id),
        }
    }
}

/// One row mutation inside a change set.
///
/// `expected` is the version the row was read at, or `None` for an insert
/// (the row must not exist yet).
#[derive(Debug, Clone)]
pub enum RowWrite {
    Account {
        record: Account,
        expected: Option<u64>,
    },
    Content {
        record: ContentItem,
        expected: Option<u64>,
    },
    Report {
        record: Report,
        expected: Option<u64>,
    },
    DeleteContent {
        id: ContentId,
        expected: u64,
    },
    DeleteReport {
        id: ReportId,
        expected: u64,
    },
}

impl RowWrite {
    /// The row this write touches.
    pub fn key(&self) -> RowKey {
        match self {
            RowWrite::Account { record, .. } => RowKey::Account(record.id),
            RowWrite::Content { record, .. } => RowKey::Content(record.id),
            RowWrite::Report { record, .. } => RowKey::Report(record.id),
            RowWrite::DeleteContent { id, .. } => RowKey::Content(*id),
            RowWrite::DeleteReport { id, .. } => RowKey::Report(*id),
        }
    }

    /// The version the row must currently have (`None`: must be absent).
    pub fn expected(&self) -> Option<u64> {
        match self {
            RowWrite::Account { expected, .. }
            | RowWrite::Content { expected, .. }
            | RowWrite::Report { expected, .. } => *expected,
            RowWrite::DeleteContent { expected, .. } | RowWrite::DeleteReport { expected, .. } => {
                Some(*expected)
            }
        }
    }

    /// Stamps the version the row will have once written.
    fn bump_version(&mut self) {
        let next = |expected: Option<u64>| expected.map_or(1, |v| v + 1);
        match self {
            RowWrite::Account { record, expected } => record.version = next(*expected),
            RowWrite::Content { record, expected } => record.version = next(*expected),
            RowWrite::Report { record, expected } => record.version = next(*expected),
            RowWrite::DeleteContent { .. } | RowWrite::DeleteReport { .. } => {}
        }
    }
}

/// An atomic unit of work: preconditions, audit appends and row writes.
///
/// Audit entries are applied before row writes, so a destructive delete
/// never lands without its ledger record.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    guards: Vec<(RowKey, u64)>,
    audit: Vec<AuditEntry>,
    writes: Vec<RowWrite>,
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to still be at `version` at commit time, without writing it.
    pub fn guard(&mut self, key: RowKey, version: u64) -> &mut Self {
        self.guards.push((key, version));
        self
    }

    /// Appends a ledger entry. This is the ledger's only write operation.
    pub fn append_audit(&mut self, mut entry: AuditEntry) -> &mut Self {
        entry.ensure_justification();
        self.audit.push(entry);
        self
    }

    /// Inserts a new account.
    pub fn insert_account(&mut self, record: Account) -> &mut Self {
        self.writes.push(RowWrite::Account {
            record,
            expected: None,
        });
        self
    }

    /// Overwrites an account read at `record.version`.
    pub fn update_account(&mut self, record: Account) -> &mut Self {
        let expected = Some(record.version);
        self.writes.push(RowWrite::Account { record, expected });
        self
    }

    /// Inserts a new content item.
    pub fn insert_content(&mut self, record: ContentItem) -> &mut Self {
        self.writes.push(RowWrite::Content {
            record,
            expected: None,
        });
        self
    }

    /// Overwrites a content item read at `record.version`.
    pub fn update_content(&mut self, record: ContentItem) -> &mut Self {
        let expected = Some(record.version);
        self.writes.push(RowWrite::Content { record, expected });
        self
    }

    /// Removes a content item read at `version`.
    pub fn delete_content(&mut self, id: ContentId, version: u64) -> &mut Self {
        self.writes.push(RowWrite::DeleteContent {
            id,
            expected: version,
        });
        self
    }

    /// Inserts a new report.
    pub fn insert_report(&mut self, record: Report) -> &mut Self {
        self.writes.push(RowWrite::Report {
            record,
            expected: None,
        });
        self
    }

    /// Overwrites a report read at `record.version`.
    pub fn update_report(&mut self, record: Report) -> &mut Self {
        let expected = Some(record.version);
        self.writes.push(RowWrite::Report { record, expected });
        self
    }

    /// Removes a report read at `version`.
    pub fn delete_report(&mut self, id: ReportId, version: u64) -> &mut Self {
        self.writes.push(RowWrite::DeleteReport {
            id,
            expected: version,
        });
        self
    }

    /// Returns true if the change set holds neither writes nor audit entries.
    pub fn is_empty(&self) -> bool {
        self.audit.is_empty() && self.writes.is_empty()
    }

    /// Read-only preconditions.
    pub fn guards(&self) -> &[(RowKey, u64)] {
        &self.guards
    }

    /// Pending audit entries.
    pub fn audit_entries(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Pending row writes.
    pub fn writes(&self) -> &[RowWrite] {
        &self.writes
    }

    /// Checks every guard and write against the current row versions.
    ///
    /// `current_version` returns the stored version of a row, or `None` if
    /// it does not exist. Called by stores while holding their commit lock.
    pub fn validate<F>(&self, mut current_version: F) -> Result<()>
    where
        F: FnMut(&RowKey) -> Result<Option<u64>>,
    {
        for (key, version) in &self.guards {
            let current = current_version(key)?;
            if current != Some(*version) {
                return Err(ForumError::conflict(format!(
                    "{} changed since it was read (expected version {}, found {:?})",
                    key, version, current
                )));
            }
        }
        for write in &self.writes {
            let key = write.key();
            let current = current_version(&key)?;
            if current != write.expected() {
                return Err(ForumError::conflict(match write.expected() {
                    None => format!("{} already exists", key),
                    Some(v) => format!(
                        "{} changed since it was read (expected version {}, found {:?})",
                        key, v, current
                    ),
                }));
            }
        }
        Ok(())
    }

    /// Splits the change set into audit entries and version-stamped writes.
    pub fn into_parts(self) -> (Vec<AuditEntry>, Vec<RowWrite>) {
        let mut writes = self.writes;
        for write in &mut writes {
            write.bump_version();
        }
        (self.audit, writes)
    }
}

/// Persistent state backing the moderation services.
///
/// Reads return the stored version in each record's `version` field.
/// `commit` must be atomic and serializable with respect to other commits.
pub trait ModerationStore: Send + Sync {
    fn load_account(&self, id: &UserId) -> Result<Option<Account>>;

    fn load_category(&self, id: &CategoryId) -> Result<Option<Category>>;

    /// Seeds or replaces a category. Categories are owned by an external
    /// collaborator; this core only reads them.
    fn store_category(&self, category: &Category) -> Result<()>;

    fn load_content(&self, id: &ContentId) -> Result<Option<ContentItem>>;

    /// Replies to a post, oldest first.
    fn load_replies(&self, post_id: &ContentId) -> Result<Vec<ContentItem>>;

    fn load_report(&self, id: &ReportId) -> Result<Option<Report>>;

    /// Reports referencing a content item, in any status.
    fn load_reports_for_content(&self, content_id: &ContentId) -> Result<Vec<Report>>;

    /// All reports, optionally restricted to one status, oldest first.
    fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>>;

    /// Ledger entries matching `filter` with a sequence greater than `after`,
    /// oldest first, at most `limit` of them.
    fn query_audit(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;

    /// Number of ledger entries.
    fn audit_len(&self) -> Result<u64>;

    /// Applies a change set atomically.
    fn commit(&self, changes: ChangeSet) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    categories: HashMap<CategoryId, Category>,
    content: HashMap<ContentId, ContentItem>,
    reports: HashMap<ReportId, Report>,
    audit: Vec<AuditEntry>,
}

impl Tables {
    fn version_of(&self, key: &RowKey) -> Option<u64> {
        match key {
            RowKey::Account(id) => self.accounts.get(id).map(|a| a.version),
            RowKey::Content(id) => self.content.get(id).map(|c| c.version),
            RowKey::Report(id) => self.reports.get(id).map(|r| r.version),
        }
    }
}

/// In-process store guarded by a single `RwLock`.
///
/// Commits validate and apply under the write lock, which makes them
/// serializable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ForumError::storage("Memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| ForumError::storage("Memory store lock poisoned"))
    }
}

impl ModerationStore for MemoryStore {
    fn load_account(&self, id: &UserId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(id).cloned())
    }

    fn load_category(&self, id: &CategoryId) -> Result<Option<Category>> {
        Ok(self.read()?.categories.get(id).cloned())
    }

    fn store_category(&self, category: &Category) -> Result<()> {
        self.write()?
            .categories
            .insert(category.id, category.clone());
        Ok(())
    }

    fn load_content(&self, id: &ContentId) -> Result<Option<ContentItem>> {
        Ok(self.read()?.content.get(id).cloned())
    }

    fn load_replies(&self, post_id: &ContentId) -> Result<Vec<ContentItem>> {
        let tables = self.read()?;
        let mut replies: Vec<ContentItem> = tables
            .content
            .values()
            .filter(|item| item.parent_id() == Some(*post_id))
            .cloned()
            .collect();
        replies.sort_by_key(|item| (item.created_at, item.id));
        Ok(replies)
    }

    fn load_report(&self, id: &ReportId) -> Result<Option<Report>> {
        Ok(self.read()?.reports.get(id).cloned())
    }

    fn load_reports_for_content(&self, content_id: &ContentId) -> Result<Vec<Report>> {
        let tables = self.read()?;
        let mut reports: Vec<Report> = tables
            .reports
            .values()
            .filter(|r| r.content_id() == *content_id)
            .cloned()
            .collect();
        reports.sort_by_key(|r| (r.created_at, r.id));
        Ok(reports)
    }

    fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let tables = self.read()?;
        let mut reports: Vec<Report> = tables
            .reports
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        reports.sort_by_key(|r| (r.created_at, r.id));
        Ok(reports)
    }

    fn query_audit(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let tables = self.read()?;
        let start = after.unwrap_or(0);
        Ok(tables
            .audit
            .iter()
            .filter(|e| e.sequence > start && filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    fn audit_len(&self) -> Result<u64> {
        Ok(self.read()?.audit.len() as u64)
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.write()?;
        changes.validate(|key| Ok(tables.version_of(key)))?;

        let (audit, writes) = changes.into_parts();
        let appended = audit.len();
        for mut entry in audit {
            entry.sequence = tables.audit.len() as u64 + 1;
            tables.audit.push(entry);
        }

        let written = writes.len();
        for write in writes {
            match write {
                RowWrite::Account { record, .. } => {
                    tables.accounts.insert(record.id, record);
                }
                RowWrite::Content { record, .. } => {
                    tables.content.insert(record.id, record);
                }
                RowWrite::Report { record, .. } => {
                    tables.reports.insert(record.id, record);
                }
                RowWrite::DeleteContent { id, .. } => {
                    tables.content.remove(&id);
                }
                RowWrite::DeleteReport { id, .. } => {
                    tables.reports.remove(&id);
                }
            }
        }

        trace!(
            audit_entries = appended,
            row_writes = written,
            "memory_commit: applied change set"
        );
        Ok(())
    }
}
