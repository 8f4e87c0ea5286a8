//! `aida-db`: storage and replay substrate for deterministically
//! re-executing a blockchain's transaction history against a pluggable
//! state database.
//!
//! Module map:
//! - [`codec`] — key encoding
//! - [`metadata`] — metadata store + merge
//! - [`hash_index`] — block/state-root hash index + scraper
//! - [`rollup`] — update-set rollup
//! - [`priming`] — priming engine + prime context
//! - [`patch`] — patch composer
//! - [`config`] / [`block_range`] — config + block-range resolver
//! - [`stress`] — RPC stress client
//! - [`stats`] — percentile report + progress tracker

pub mod block_range;
pub mod codec;
pub mod config;
pub mod error;
pub mod hash_index;
pub mod kv;
pub mod metadata;
pub mod patch;
pub mod priming;
pub mod rollup;
pub mod stats;
pub mod stress;
pub mod types;

pub use config::Config;
pub use error::{AidaError, Result};
pub use kv::{OpenMode, Store};
pub use metadata::MetadataStore;
