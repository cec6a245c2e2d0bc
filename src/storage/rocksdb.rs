//! Shared RocksDB storage utilities.
//!
//! Generic helpers the moderation store is built on. Nothing in here knows
//! about accounts, content or reports.
//!
//! ## Key Features
//!
//! - Configurable RocksDB setup with sensible defaults
//! - Typed reads with bincode or JSON decoding
//! - Atomic multi-column-family writes through [`RocksBatch`]
//! - Prefix and seek iteration for indexes and ledger paging

use crate::error::{ForumError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

// =============================================================================
// RocksDB Configuration
// =============================================================================

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
    /// Target file size for SST files.
    pub target_file_size_base: u64,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 32 * 1024 * 1024,      // 32MB
            write_buffer_size: 16 * 1024 * 1024, // 16MB
            max_write_buffer_number: 2,
            target_file_size_base: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl RocksDbConfig {
    /// Creates a configuration for a long-running forum backend.
    ///
    /// Uses larger buffers and more files for higher throughput.
    pub fn for_server() -> Self {
        Self {
            max_open_files: 256,
            keep_log_file_num: 3,
            max_wal_size: 64 * 1024 * 1024,      // 64MB
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024, // 64MB
        }
    }

    /// Builds RocksDB Options from this configuration.
    pub fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_target_file_size_base(self.target_file_size_base);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Concatenates key parts into one index key.
///
/// Parts are fixed-width (raw ids, big-endian integers), so no separator is
/// needed and byte order equals logical order.
pub fn index_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Encodes a value with bincode.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| ForumError::serialization(format!("Failed to serialize: {}", e)))
}

/// Decodes a bincode value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| ForumError::serialization(format!("Failed to deserialize: {}", e)))
}

/// Encodes a value as JSON, for records that carry self-describing data.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| ForumError::serialization(format!("Failed to serialize JSON: {}", e)))
}

/// Decodes a JSON value.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ForumError::serialization(format!("Failed to deserialize JSON: {}", e)))
}

// =============================================================================
// Database Handle Wrapper
// =============================================================================

/// A wrapper around RocksDB that provides common operations.
///
/// Embedded in storage structs, which add their domain-specific layout.
pub struct RocksDbHandle {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let opts = config.build_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            db_path.as_ref(),
            cf_descriptors,
        )
        .map_err(|e| ForumError::storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Gets a column family handle.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ForumError::storage(format!("Column family '{}' not found", name)))
    }

    /// Loads raw bytes from the given key.
    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key) {
            Ok(Some(bytes)) => {
                trace!(
                    cf = cf_name,
                    key_len = key.len(),
                    value_bytes = bytes.len(),
                    "db_get: found record"
                );
                Ok(Some(bytes))
            }
            Ok(None) => {
                trace!(cf = cf_name, key_len = key.len(), "db_get: key not found");
                Ok(None)
            }
            Err(e) => Err(ForumError::storage(format!("Failed to read: {}", e))),
        }
    }

    /// Loads and decodes a bincode value.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(cf_name, key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Loads and decodes a JSON value.
    pub fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(cf_name, key)?
            .map(|bytes| decode_json(&bytes))
            .transpose()
    }

    /// Stores a bincode value outside of any batch.
    pub fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = encode(value)?;
        trace!(
            cf = cf_name,
            key_len = key.len(),
            value_bytes = bytes.len(),
            "db_put: storing serialized value"
        );
        self.db
            .put_cf(&cf, key, &bytes)
            .map_err(|e| ForumError::storage(format!("Failed to write: {}", e)))
    }

    /// Starts an empty write batch against this database.
    pub fn batch(&self) -> RocksBatch<'_> {
        RocksBatch {
            handle: self,
            batch: WriteBatch::default(),
        }
    }

    /// Applies a batch atomically.
    pub fn write(&self, batch: RocksBatch<'_>) -> Result<()> {
        let operations = batch.batch.len();
        self.db
            .write(batch.batch)
            .map_err(|e| ForumError::storage(format!("Failed to write batch: {}", e)))?;
        trace!(operations, "db_write: applied batch");
        Ok(())
    }

    /// Iterates over all entries with the given prefix.
    ///
    /// The callback receives (key, value) pairs and should return true to continue
    /// or false to stop iteration.
    pub fn prefix_iterate<F>(&self, cf_name: &str, prefix: &[u8], callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.seek_iterate(cf_name, prefix, prefix, callback)
    }

    /// Iterates from a seek position while keys share `filter_prefix`.
    ///
    /// Used for cursor paging: seek just past the last entry already seen.
    pub fn seek_iterate<F>(
        &self,
        cf_name: &str,
        seek_key: &[u8],
        filter_prefix: &[u8],
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut iter = self.db.raw_iterator_cf(&cf);
        iter.seek(seek_key);

        let mut count: usize = 0;
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(filter_prefix) {
                break;
            }
            count += 1;
            if !callback(key, value) {
                break;
            }
            iter.next();
        }
        if let Err(e) = iter.status() {
            warn!(cf = cf_name, error = %e, "db_seek_iterate: iterator error");
            return Err(ForumError::storage(format!("Iterator error: {}", e)));
        }

        debug!(
            cf = cf_name,
            seek_key_len = seek_key.len(),
            filter_prefix_len = filter_prefix.len(),
            records_iterated = count,
            "db_seek_iterate: completed seek iteration"
        );
        Ok(())
    }

    /// Iterates over all entries in a column family.
    pub fn iterate_all<F>(&self, cf_name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.seek_iterate(cf_name, &[], &[], callback)
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle")
            .field("db", &"RocksDB")
            .finish()
    }
}

/// Pending writes across column families, applied by [`RocksDbHandle::write`].
pub struct RocksBatch<'a> {
    handle: &'a RocksDbHandle,
    batch: WriteBatch,
}

impl RocksBatch<'_> {
    /// Queues raw bytes.
    pub fn put_raw(&mut self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;
        self.batch.put_cf(&cf, key, value);
        Ok(())
    }

    /// Queues a bincode value.
    pub fn put<T: Serialize>(&mut self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.put_raw(cf_name, key, &bytes)
    }

    /// Queues a JSON value.
    pub fn put_json<T: Serialize>(&mut self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = encode_json(value)?;
        self.put_raw(cf_name, key, &bytes)
    }

    /// Queues a delete.
    pub fn delete(&mut self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;
        self.batch.delete_cf(&cf, key);
        Ok(())
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}
