//! Storage utilities and abstractions.
//!
//! ## Modules
//!
//! - `rocksdb`: Generic RocksDB utilities (configuration, handle, batches, iteration)

pub mod rocksdb;

pub use rocksdb::{index_key, RocksBatch, RocksDbConfig, RocksDbHandle};
