//! Moderation data persistence using RocksDB.
//!
//! ## Storage Layout
//!
//! Uses column families for logical separation:
//! - `accounts`: `{user_id}` -> bincode Account
//! - `categories`: `{category_id}` -> bincode Category
//! - `content`: `{content_id}` -> bincode ContentItem
//! - `reports`: `{report_id}` -> bincode Report
//! - `audit`: `{sequence_be}` -> JSON AuditEntry (details are free-form JSON)
//! - `meta`: `audit_seq` -> last assigned ledger sequence
//!
//! Index column families hold empty values; the key is the data:
//! - `idx_replies`: `post_id + created_at_be + reply_id`
//! - `idx_reports`: `content_id + report_id`
//!
//! Ids are 16 raw UUID bytes, so every index key is fixed-width.

use std::path::Path;
use std::sync::Mutex;
use tracing::{info, trace, warn};

use super::audit::{AuditEntry, AuditFilter};
use super::content::ContentItem;
use super::report::{Report, ReportStatus};
use super::store::{ChangeSet, ModerationStore, RowKey, RowWrite};
use super::types::{Account, Category, CategoryId, ContentId, ReportId, UserId};
use crate::error::{ForumError, Result};
use crate::storage::rocksdb::{decode, decode_json};
use crate::storage::{index_key, RocksBatch, RocksDbConfig, RocksDbHandle};

/// Database subdirectory.
const DB_DIR: &str = "moderation_db";

/// Column family names.
const CF_ACCOUNTS: &str = "accounts";
const CF_CATEGORIES: &str = "categories";
const CF_CONTENT: &str = "content";
const CF_REPORTS: &str = "reports";
const CF_AUDIT: &str = "audit";
const CF_META: &str = "meta";

/// Index column families.
const CF_IDX_REPLIES: &str = "idx_replies"; // post_id + created_at + reply_id -> ()
const CF_IDX_REPORTS: &str = "idx_reports"; // content_id + report_id -> ()

/// Key of the ledger sequence counter in the meta column family.
const META_AUDIT_SEQ: &[u8] = b"audit_seq";

const ID_LEN: usize = 16;

fn reply_index_key(post_id: &ContentId, reply: &ContentItem) -> Vec<u8> {
    index_key(&[
        post_id.as_bytes(),
        &reply.created_at.to_be_bytes(),
        reply.id.as_bytes(),
    ])
}

fn report_index_key(content_id: &ContentId, report_id: &ReportId) -> Vec<u8> {
    index_key(&[content_id.as_bytes(), report_id.as_bytes()])
}

/// RocksDB-backed [`ModerationStore`].
///
/// Commits are serialized by a mutex: validation and the batch write happen
/// under it, reads do not take it.
#[derive(Debug)]
pub struct RocksModerationStore {
    db: RocksDbHandle,
    commit_lock: Mutex<()>,
}

impl RocksModerationStore {
    /// Opens (or creates) the store under `data_dir` with default tuning.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(data_dir, &RocksDbConfig::default())
    }

    /// Opens (or creates) the store under `data_dir`.
    pub fn open_with_config(data_dir: impl AsRef<Path>, config: &RocksDbConfig) -> Result<Self> {
        let db_path = data_dir.as_ref().join(DB_DIR);
        let column_families = &[
            CF_ACCOUNTS,
            CF_CATEGORIES,
            CF_CONTENT,
            CF_REPORTS,
            CF_AUDIT,
            CF_META,
            CF_IDX_REPLIES,
            CF_IDX_REPORTS,
        ];

        let db = RocksDbHandle::open(&db_path, config, column_families)?;
        info!("Opened moderation RocksDB at {:?}", db_path);

        Ok(Self {
            db,
            commit_lock: Mutex::new(()),
        })
    }

    fn version_of(&self, key: &RowKey) -> Result<Option<u64>> {
        Ok(match key {
            RowKey::Account(id) => self.load_account(id)?.map(|a| a.version),
            RowKey::Content(id) => self.load_content(id)?.map(|c| c.version),
            RowKey::Report(id) => self.load_report(id)?.map(|r| r.version),
        })
    }

    fn index_ids(&self, cf_name: &str, prefix: &[u8], id_offset: usize) -> Result<Vec<Vec<u8>>> {
        let mut ids = Vec::new();
        self.db.prefix_iterate(cf_name, prefix, |key, _| {
            if let Some(id) = key.get(id_offset..id_offset + ID_LEN) {
                ids.push(id.to_vec());
            }
            true
        })?;
        Ok(ids)
    }

    fn stage_write(&self, batch: &mut RocksBatch<'_>, write: RowWrite) -> Result<()> {
        match write {
            RowWrite::Account { record, .. } => {
                batch.put(CF_ACCOUNTS, record.id.as_bytes(), &record)?;
            }
            RowWrite::Content { record, .. } => {
                if let Some(post_id) = record.parent_id() {
                    batch.put_raw(CF_IDX_REPLIES, &reply_index_key(&post_id, &record), &[])?;
                }
                batch.put(CF_CONTENT, record.id.as_bytes(), &record)?;
            }
            RowWrite::Report { record, .. } => {
                batch.put_raw(
                    CF_IDX_REPORTS,
                    &report_index_key(&record.content_id(), &record.id),
                    &[],
                )?;
                batch.put(CF_REPORTS, record.id.as_bytes(), &record)?;
            }
            RowWrite::DeleteContent { id, .. } => {
                if let Some(existing) = self.load_content(&id)? {
                    if let Some(post_id) = existing.parent_id() {
                        batch.delete(CF_IDX_REPLIES, &reply_index_key(&post_id, &existing))?;
                    }
                }
                batch.delete(CF_CONTENT, id.as_bytes())?;
            }
            RowWrite::DeleteReport { id, .. } => {
                if let Some(existing) = self.load_report(&id)? {
                    batch.delete(
                        CF_IDX_REPORTS,
                        &report_index_key(&existing.content_id(), &existing.id),
                    )?;
                }
                batch.delete(CF_REPORTS, id.as_bytes())?;
            }
        }
        Ok(())
    }
}

impl ModerationStore for RocksModerationStore {
    fn load_account(&self, id: &UserId) -> Result<Option<Account>> {
        self.db.get(CF_ACCOUNTS, id.as_bytes())
    }

    fn load_category(&self, id: &CategoryId) -> Result<Option<Category>> {
        self.db.get(CF_CATEGORIES, id.as_bytes())
    }

    fn store_category(&self, category: &Category) -> Result<()> {
        self.db.put(CF_CATEGORIES, category.id.as_bytes(), category)
    }

    fn load_content(&self, id: &ContentId) -> Result<Option<ContentItem>> {
        self.db.get(CF_CONTENT, id.as_bytes())
    }

    fn load_replies(&self, post_id: &ContentId) -> Result<Vec<ContentItem>> {
        // post_id (16) + created_at (8) + reply_id (16)
        let ids = self.index_ids(CF_IDX_REPLIES, post_id.as_bytes(), ID_LEN + 8)?;
        let mut replies = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = ContentId::from_slice(&raw)?;
            match self.load_content(&id)? {
                Some(reply) => replies.push(reply),
                None => warn!(reply = %id, "load_replies: index entry without row"),
            }
        }
        Ok(replies)
    }

    fn load_report(&self, id: &ReportId) -> Result<Option<Report>> {
        self.db.get(CF_REPORTS, id.as_bytes())
    }

    fn load_reports_for_content(&self, content_id: &ContentId) -> Result<Vec<Report>> {
        let ids = self.index_ids(CF_IDX_REPORTS, content_id.as_bytes(), ID_LEN)?;
        let mut reports = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = ReportId::from_slice(&raw)?;
            match self.load_report(&id)? {
                Some(report) => reports.push(report),
                None => warn!(report = %id, "load_reports_for_content: index entry without row"),
            }
        }
        reports.sort_by_key(|r| (r.created_at, r.id));
        Ok(reports)
    }

    fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let mut reports = Vec::new();
        let mut failure = None;
        self.db.iterate_all(CF_REPORTS, |_, value| match decode::<Report>(value) {
            Ok(report) => {
                if status.map_or(true, |s| report.status == s) {
                    reports.push(report);
                }
                true
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        })?;
        if let Some(e) = failure {
            return Err(e);
        }
        reports.sort_by_key(|r| (r.created_at, r.id));
        Ok(reports)
    }

    fn query_audit(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }
        let start = after.map_or(1, |seq| seq.saturating_add(1));
        let mut failure = None;
        self.db
            .seek_iterate(CF_AUDIT, &start.to_be_bytes(), &[], |_, value| {
                match decode_json::<AuditEntry>(value) {
                    Ok(entry) => {
                        if filter.matches(&entry) {
                            entries.push(entry);
                        }
                        entries.len() < limit
                    }
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                }
            })?;
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(entries)
    }

    fn audit_len(&self) -> Result<u64> {
        Ok(self.db.get(CF_META, META_AUDIT_SEQ)?.unwrap_or(0))
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| ForumError::storage("Commit lock poisoned"))?;
        changes.validate(|key| self.version_of(key))?;

        let (audit, writes) = changes.into_parts();
        let mut batch = self.db.batch();

        let mut sequence = self.audit_len()?;
        let appended = audit.len();
        for mut entry in audit {
            sequence += 1;
            entry.sequence = sequence;
            batch.put_json(CF_AUDIT, &sequence.to_be_bytes(), &entry)?;
        }
        if appended > 0 {
            batch.put(CF_META, META_AUDIT_SEQ, &sequence)?;
        }

        let written = writes.len();
        for write in writes {
            self.stage_write(&mut batch, write)?;
        }
        self.db.write(batch)?;

        trace!(
            audit_entries = appended,
            row_writes = written,
            "rocks_commit: applied change set"
        );
        Ok(())
    }
}
