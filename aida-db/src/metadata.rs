//! Typed fields under the `_md` prefix, an in-memory cache for hot fields,
//! and merge semantics for composing two aida-db snapshots.

use std::sync::RwLock;

use crate::codec::{self, metadata_key};
use crate::config::Config;
use crate::error::{AidaError, Result};
use crate::hash_index::RpcClient;
use crate::kv::Store;
use crate::types::DbType;

#[derive(Debug, Clone, Default)]
struct Cache {
    first_block: Option<u64>,
    last_block: Option<u64>,
    chain_id: Option<u64>,
    timestamp: Option<u64>,
    db_type: Option<DbType>,
}

/// Reads/writes/deletes the fixed set of typed metadata fields, caching the
/// heavily-queried ones (first/last block, chain-id, timestamp, db-type).
pub struct MetadataStore<'a> {
    store: &'a Store,
    cache: RwLock<Cache>,
}

impl<'a> MetadataStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store, cache: RwLock::new(Cache::default()) }
    }

    fn get_u64_field(&self, field: &[u8], cached: impl Fn(&Cache) -> Option<u64>) -> Option<u64> {
        if let Some(v) = cached(&self.cache.read().unwrap()) {
            return Some(v);
        }
        match self.store.get(&metadata_key(field)) {
            Ok(Some(bytes)) => match codec::decode_u64(&bytes) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(field = ?String::from_utf8_lossy(field), error = %e, "metadata field failed to decode");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!(field = ?String::from_utf8_lossy(field), "metadata field not found");
                None
            }
            Err(e) => {
                tracing::warn!(field = ?String::from_utf8_lossy(field), error = %e, "metadata field read failed");
                None
            }
        }
    }

    pub fn first_block(&self) -> Option<u64> {
        let v = self.get_u64_field(codec::FIELD_FIRST_BLOCK, |c| c.first_block);
        if let Some(v) = v {
            self.cache.write().unwrap().first_block = Some(v);
        }
        v
    }

    pub fn last_block(&self) -> Option<u64> {
        let v = self.get_u64_field(codec::FIELD_LAST_BLOCK, |c| c.last_block);
        if let Some(v) = v {
            self.cache.write().unwrap().last_block = Some(v);
        }
        v
    }

    pub fn first_epoch(&self) -> Option<u64> {
        self.get_u64_field(codec::FIELD_FIRST_EPOCH, |_| None)
    }

    pub fn last_epoch(&self) -> Option<u64> {
        self.get_u64_field(codec::FIELD_LAST_EPOCH, |_| None)
    }

    pub fn chain_id(&self) -> Option<u64> {
        if let Some(v) = self.cache.read().unwrap().chain_id {
            return Some(v);
        }
        let key = metadata_key(codec::FIELD_CHAIN_ID);
        let v = match self.store.get(&key) {
            Ok(Some(bytes)) => match codec::decode_chain_id(&bytes) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "chain id failed to decode");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!("chain id not found");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "chain id read failed");
                None
            }
        };
        if let Some(v) = v {
            self.cache.write().unwrap().chain_id = Some(v);
        }
        v
    }

    pub fn timestamp(&self) -> Option<u64> {
        let v = self.get_u64_field(codec::FIELD_TIMESTAMP, |c| c.timestamp);
        if let Some(v) = v {
            self.cache.write().unwrap().timestamp = Some(v);
        }
        v
    }

    pub fn db_type(&self) -> Option<DbType> {
        if let Some(v) = self.cache.read().unwrap().db_type {
            return Some(v);
        }
        let key = metadata_key(codec::FIELD_DB_TYPE);
        let v = match self.store.get(&key) {
            Ok(Some(bytes)) => match codec::decode_db_type(&bytes) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "db type failed to decode");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!("db type not found");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "db type read failed");
                None
            }
        };
        if let Some(v) = v {
            self.cache.write().unwrap().db_type = Some(v);
        }
        v
    }

    pub fn db_hash(&self) -> Option<Vec<u8>> {
        match self.store.get(&metadata_key(codec::FIELD_DB_HASH)) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "db hash read failed");
                None
            }
        }
    }

    pub fn has_hash_patch(&self) -> bool {
        match self.store.get(&metadata_key(codec::FIELD_HAS_HASH_PATCH)) {
            Ok(Some(bytes)) => codec::decode_bool_flag(&bytes).unwrap_or(false),
            _ => false,
        }
    }

    fn invalidate(&self) {
        *self.cache.write().unwrap() = Cache::default();
    }

    pub fn set_first_block(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_FIRST_BLOCK), &codec::encode_u64(value))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_last_block(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_LAST_BLOCK), &codec::encode_u64(value))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_first_epoch(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_FIRST_EPOCH), &codec::encode_u64(value))?;
        Ok(())
    }

    pub fn set_last_epoch(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_LAST_EPOCH), &codec::encode_u64(value))?;
        Ok(())
    }

    pub fn set_chain_id(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_CHAIN_ID), &codec::encode_u64(value))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_timestamp(&self, value: u64) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_TIMESTAMP), &codec::encode_u64(value))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_db_type(&self, value: DbType) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_DB_TYPE), &codec::encode_db_type(value))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_db_hash(&self, value: &[u8]) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_DB_HASH), value)?;
        Ok(())
    }

    pub fn set_has_hash_patch(&self, value: bool) -> Result<()> {
        self.store.put(&metadata_key(codec::FIELD_HAS_HASH_PATCH), &codec::encode_bool_flag(value))?;
        Ok(())
    }

    /// Best-effort erase of all metadata fields. Individual failures are
    /// collected and the final return is a joined error.
    pub fn delete(&self) -> Result<()> {
        let fields: [&[u8]; 9] = [
            codec::FIELD_FIRST_BLOCK,
            codec::FIELD_LAST_BLOCK,
            codec::FIELD_FIRST_EPOCH,
            codec::FIELD_LAST_EPOCH,
            codec::FIELD_DB_TYPE,
            codec::FIELD_CHAIN_ID,
            codec::FIELD_TIMESTAMP,
            codec::FIELD_DB_HASH,
            codec::FIELD_HAS_HASH_PATCH,
        ];
        let mut joined: Option<AidaError> = None;
        for field in fields {
            if let Err(e) = self.store.delete(&metadata_key(field)) {
                tracing::warn!(field = ?String::from_utf8_lossy(field), error = %e, "failed to delete metadata field");
                joined = Some(match joined {
                    None => e,
                    Some(prev) => AidaError::join(prev, String::from_utf8_lossy(field).to_string(), e),
                });
            }
        }
        self.invalidate();
        match joined {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Scans the substate keyspace for the smallest and largest block with a
    /// recorded substate. Returns `None` when the store holds no substates.
    fn substate_block_range(&self) -> Result<Option<(u64, u64)>> {
        let mut range: Option<(u64, u64)> = None;
        for (key, _value) in self.store.iter_prefix(codec::SUBSTATE_PREFIX) {
            let (block, _tx) = codec::decode_substate_key(&key)?;
            range = Some(match range {
                None => (block, block),
                Some((min, max)) => (min.min(block), max.max(block)),
            });
        }
        Ok(range)
    }

    /// Re-derives `FirstBlock`/`LastBlock` from the substates actually
    /// present in the store, then recomputes the epoch range via
    /// [`find_epochs`](Self::find_epochs) unless `chain_id` is an
    /// Ethereum-family chain (those have no native epoch concept).
    pub fn generate_metadata(&self, config: &Config, chain_id: u64, rpc: Option<&RpcClient>) -> Result<()> {
        if let Some((min_block, max_block)) = self.substate_block_range()? {
            self.set_first_block(min_block)?;
            self.set_last_block(max_block)?;
        }
        if !config.is_ethereum_family(chain_id) {
            match rpc {
                Some(rpc) => self.find_epochs(rpc)?,
                None => tracing::warn!("no rpc client available; epoch range left unchanged"),
            }
        }
        Ok(())
    }

    /// Confirms that `FirstBlock`/`LastBlock` sit on epoch boundaries and
    /// records the epoch each belongs to. Warns, but does not fail, when a
    /// boundary block turns out to sit mid-epoch: that's a property of the
    /// chain's fork schedule, not a store error.
    pub fn find_epochs(&self, rpc: &RpcClient) -> Result<()> {
        let (Some(first_block), Some(last_block)) = (self.first_block(), self.last_block()) else {
            return Ok(());
        };

        let first_epoch = rpc.get_epoch(first_block)?;
        if first_block > 0 {
            let prev_epoch = rpc.get_epoch(first_block - 1)?;
            if prev_epoch == first_epoch {
                tracing::warn!(block = first_block, epoch = first_epoch, "first block is not the start of its epoch");
            }
        }

        let last_epoch = rpc.get_epoch(last_block)?;
        let next_epoch = rpc.get_epoch(last_block + 1)?;
        if next_epoch == last_epoch {
            tracing::warn!(block = last_block, epoch = last_epoch, "last block is not the end of its epoch");
        }

        self.set_first_epoch(first_epoch)?;
        self.set_last_epoch(last_epoch)?;
        Ok(())
    }

    /// Merges `src` into `self`: chain-id resolution, db-type lattice,
    /// adjacency-checked range extension, then epoch-range recomputation.
    pub fn merge(&self, src: &MetadataStore, config: &Config, rpc: Option<&RpcClient>) -> Result<()> {
        let target_chain = self.chain_id();
        let src_chain = src.chain_id();
        let chain_id = match (target_chain, src_chain) {
            (None, None) => return Err(AidaError::ChainMismatch { target: None, source: None }),
            (None, Some(c)) => c,
            (Some(t), None) => t,
            (Some(t), Some(s)) if t == s => t,
            (Some(t), Some(s)) => return Err(AidaError::ChainMismatch { target: Some(t), source: Some(s) }),
        };
        self.set_chain_id(chain_id)?;

        let target_type = self.db_type().unwrap_or(DbType::NoType);
        let src_type = src.db_type().unwrap_or(DbType::NoType);
        let merged_type = match target_type {
            DbType::NoType => src_type,
            DbType::GenType if matches!(src_type, DbType::GenType | DbType::PatchType) => DbType::GenType,
            _ => DbType::CustomType,
        };
        self.set_db_type(merged_type)?;

        let t1 = self.first_block().unwrap_or(0);
        let t2 = self.last_block().unwrap_or(0);
        let s1 = src.first_block().unwrap_or(0);
        let s2 = src.last_block().unwrap_or(0);

        if t1 < s1 && t2 > s2 {
            return Err(AidaError::RangeMismatch {
                target_first: t1,
                target_last: t2,
                source_first: s1,
                source_last: s2,
            });
        }
        if t1 > s1 && t2 < s2 {
            return Err(AidaError::RangeMismatch {
                target_first: t1,
                target_last: t2,
                source_first: s1,
                source_last: s2,
            });
        }

        // Alignment requires both directional adjacency checks to hold: the
        // source's start can't leave a gap after the target's end, and the
        // target's start can't leave a gap after the source's end. Using
        // min/max (rather than directly assigning one side's boundary) keeps
        // the merge correct and commutative regardless of which snapshot is
        // chronologically earlier.
        let aligned = (t2 + 1 >= s1) && (s2 + 1 >= t1);
        if !aligned {
            return Err(AidaError::AlignmentMismatch(format!(
                "blocks do not align: target=[{t1},{t2}], source=[{s1},{s2}]"
            )));
        }
        self.set_first_block(t1.min(s1))?;
        self.set_last_block(t2.max(s2))?;

        if !config.is_ethereum_family(chain_id) {
            match rpc {
                Some(rpc) => self.find_epochs(rpc)?,
                None => tracing::warn!("no rpc client available; epoch range left unchanged after merge"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::OpenMode;
    use assert_matches::assert_matches;

    fn open_with_range(chain: u64, first: u64, last: u64, db_type: DbType) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let md = MetadataStore::new(&store);
        md.set_chain_id(chain).unwrap();
        md.set_first_block(first).unwrap();
        md.set_last_block(last).unwrap();
        md.set_db_type(db_type).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_field_returns_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let md = MetadataStore::new(&store);
        assert_eq!(md.first_block(), None);
        assert_eq!(md.chain_id(), None);
    }

    #[test]
    fn merge_happy_path_extends_range() {
        let (_d1, target_store) = open_with_range(146, 10, 20, DbType::GenType);
        let (_d2, source_store) = open_with_range(146, 21, 30, DbType::GenType);
        let target = MetadataStore::new(&target_store);
        let source = MetadataStore::new(&source_store);
        target.merge(&source, &Config::default(), None).unwrap();
        assert_eq!(target.first_block(), Some(10));
        assert_eq!(target.last_block(), Some(30));
        assert_eq!(target.db_type(), Some(DbType::GenType));
    }

    #[test]
    fn merge_rejects_subset_ranges() {
        let (_d1, target_store) = open_with_range(146, 10, 30, DbType::GenType);
        let (_d2, source_store) = open_with_range(146, 15, 20, DbType::GenType);
        let target = MetadataStore::new(&target_store);
        let source = MetadataStore::new(&source_store);
        let err = target.merge(&source, &Config::default(), None).unwrap_err();
        assert_matches!(err, AidaError::RangeMismatch { .. });
    }

    #[test]
    fn merge_rejects_different_chain_ids() {
        let (_d1, target_store) = open_with_range(146, 10, 30, DbType::GenType);
        let (_d2, source_store) = open_with_range(250, 31, 40, DbType::GenType);
        let target = MetadataStore::new(&target_store);
        let source = MetadataStore::new(&source_store);
        let err = target.merge(&source, &Config::default(), None).unwrap_err();
        assert_matches!(err, AidaError::ChainMismatch { .. });
    }

    #[test]
    fn merge_is_commutative_on_resulting_range() {
        let (_d1, a_store) = open_with_range(146, 21, 30, DbType::GenType);
        let (_d2, b_store) = open_with_range(146, 10, 20, DbType::GenType);
        let a = MetadataStore::new(&a_store);
        let b = MetadataStore::new(&b_store);
        a.merge(&b, &Config::default(), None).unwrap();
        assert_eq!((a.first_block(), a.last_block()), (Some(10), Some(30)));

        let (_d3, c_store) = open_with_range(146, 10, 20, DbType::GenType);
        let (_d4, d_store) = open_with_range(146, 21, 30, DbType::GenType);
        let c = MetadataStore::new(&c_store);
        let d = MetadataStore::new(&d_store);
        c.merge(&d, &Config::default(), None).unwrap();
        assert_eq!((c.first_block(), c.last_block()), (a.first_block(), a.last_block()));
    }

    #[test]
    fn merge_rejects_unaligned_ranges() {
        let (_d1, target_store) = open_with_range(146, 10, 20, DbType::GenType);
        let (_d2, source_store) = open_with_range(146, 100, 200, DbType::GenType);
        let target = MetadataStore::new(&target_store);
        let source = MetadataStore::new(&source_store);
        let err = target.merge(&source, &Config::default(), None).unwrap_err();
        assert_matches!(err, AidaError::AlignmentMismatch(_));
    }

    #[test]
    fn merge_without_rpc_on_non_ethereum_chain_leaves_epochs_unchanged() {
        let (_d1, target_store) = open_with_range(146, 10, 20, DbType::GenType);
        let (_d2, source_store) = open_with_range(146, 21, 30, DbType::GenType);
        let target = MetadataStore::new(&target_store);
        let source = MetadataStore::new(&source_store);
        target.merge(&source, &Config::default(), None).unwrap();
        assert_eq!(target.first_epoch(), None);
        assert_eq!(target.last_epoch(), None);
    }

    #[test]
    fn delete_clears_all_fields() {
        let (_d, store) = open_with_range(146, 10, 20, DbType::GenType);
        let md = MetadataStore::new(&store);
        md.delete().unwrap();
        assert_eq!(md.first_block(), None);
        assert_eq!(md.chain_id(), None);
    }

    #[test]
    fn generate_metadata_derives_block_range_from_substates() {
        use crate::rollup::Rollup;
        use crate::types::{Substate, WorldState};

        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let rollup = Rollup::new(&store);
        for block in [5u64, 9, 20] {
            rollup
                .put_substate(&Substate {
                    block,
                    tx: 0,
                    input_state: WorldState::new(),
                    output_state: WorldState::new(),
                    env: vec![],
                    msg: vec![],
                    result: vec![],
                })
                .unwrap();
        }

        let md = MetadataStore::new(&store);
        md.generate_metadata(&Config::default(), crate::config::chain_ids::ETHEREUM_MAINNET, None).unwrap();
        assert_eq!(md.first_block(), Some(5));
        assert_eq!(md.last_block(), Some(20));
    }

    #[test]
    fn generate_metadata_on_empty_store_leaves_range_unset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let md = MetadataStore::new(&store);
        md.generate_metadata(&Config::default(), crate::config::chain_ids::ETHEREUM_MAINNET, None).unwrap();
        assert_eq!(md.first_block(), None);
    }

    #[test]
    fn find_epochs_on_store_with_no_block_range_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        let md = MetadataStore::new(&store);
        let rpc = RpcClient::new("http://127.0.0.1:0").unwrap();
        md.find_epochs(&rpc).unwrap();
        assert_eq!(md.first_epoch(), None);
    }
}
