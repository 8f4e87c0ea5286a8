//! Thin rocksdb wrapper: open modes, typed get/put, prefix iteration and
//! batched writes. Grounded on `core/store/src/node_storage/opener.rs`'s
//! open-mode handling and `core/store/src/archive/cold_storage.rs`'s
//! `BatchTransaction` (threshold-triggered flush during bulk copy).

use std::path::Path;
use std::sync::Arc;

use rocksdb::{IteratorMode, Options, DB};

use crate::error::{AidaError, Result};

/// How to open the underlying database (teacher idiom: `near_store::Mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a new database; fails if one already exists.
    Create,
    /// Open an existing database for reading and writing; fails if absent.
    ReadWriteExisting,
    /// Open for reading and writing, creating it if absent.
    ReadWrite,
    /// Open strictly for reading; fails if absent.
    ReadOnly,
}

/// A single aida-db on-disk store.
#[derive(Clone)]
pub struct Store {
    db: Arc<DB>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.join("CURRENT").exists();

        match mode {
            OpenMode::Create if exists => {
                return Err(AidaError::InvalidArgument(format!(
                    "database already exists at {}",
                    path.display()
                )));
            }
            OpenMode::ReadWriteExisting | OpenMode::ReadOnly if !exists => {
                return Err(AidaError::NotFound(format!("database does not exist at {}", path.display())));
            }
            _ => {}
        }

        let mut options = Options::default();
        options.create_if_missing(!matches!(mode, OpenMode::ReadOnly | OpenMode::ReadWriteExisting));
        options.create_missing_column_families(true);

        let db = if mode == OpenMode::ReadOnly {
            DB::open_for_read_only(&options, path, false)?
        } else {
            DB::open(&options, path)?
        };

        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.get(key)?.is_some())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// Iterates all keys with the given prefix in ascending lexicographic
    /// order.
    pub fn iter_prefix<'a>(&'a self, prefix: &[u8]) -> impl Iterator<Item = (Box<[u8]>, Box<[u8]>)> + 'a {
        let prefix = prefix.to_vec();
        self.db
            .prefix_iterator(prefix.clone())
            .filter_map(|item| item.ok())
            .take_while(move |(k, _)| k.starts_with(&prefix))
    }

    /// Iterates all keys in `[lower, upper)` ascending, independent of any
    /// common prefix. Used for fixed-width block-ranged scans (update sets,
    /// substates, destroyed-account records) where the caller has already
    /// computed an exclusive upper bound.
    pub fn iter_range<'a>(&'a self, lower: &[u8], upper: &'a [u8]) -> impl Iterator<Item = (Box<[u8]>, Box<[u8]>)> + 'a {
        let mode = IteratorMode::From(lower, rocksdb::Direction::Forward);
        self.db.iterator(mode).filter_map(|item| item.ok()).take_while(move |(k, _)| k.as_ref() < upper)
    }

    /// First key (in byte order) with the given prefix, or `None`.
    pub fn seek_first(&self, prefix: &[u8]) -> Result<Option<(Box<[u8]>, Box<[u8]>)>> {
        Ok(self.iter_prefix(prefix).next())
    }

    /// Last key (in byte order) with the given prefix, or `None`. Achieved by
    /// reverse iteration from the end of the prefix range.
    pub fn seek_last(&self, prefix: &[u8]) -> Result<Option<(Box<[u8]>, Box<[u8]>)>> {
        let mut upper = prefix.to_vec();
        // Bump the last byte (or append 0xff) to get an exclusive upper bound,
        // then iterate backwards from there.
        if let Some(last) = upper.last_mut() {
            if *last < 0xff {
                *last += 1;
            } else {
                upper.push(0xff);
            }
        } else {
            upper.push(0xff);
        }
        let mode = IteratorMode::From(&upper, rocksdb::Direction::Reverse);
        for item in self.db.iterator(mode) {
            let (k, v) = item?;
            if k.starts_with(prefix) {
                return Ok(Some((k, v)));
            }
            if k.as_ref() < prefix {
                break;
            }
        }
        Ok(None)
    }

    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch.inner)?;
        Ok(())
    }
}

/// A batched set of writes, flushed together via [`Store::write_batch`].
pub struct WriteBatch {
    inner: rocksdb::WriteBatch,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self { inner: rocksdb::WriteBatch::default() }
    }
}

impl WriteBatch {
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Copies every key/value pair under `prefix` from `src` into `dst`, in
/// batches of `batch_size` entries. Grounded on
/// `core/store/src/archive/cold_storage.rs`'s `copy_from_store`/
/// `BatchTransaction` (threshold-triggered flush).
pub fn copy_prefix(src: &Store, dst: &Store, prefix: &[u8], batch_size: usize) -> Result<usize> {
    let mut batch = WriteBatch::default();
    let mut total = 0usize;
    for (key, value) in src.iter_prefix(prefix) {
        batch.put(&key, &value);
        total += 1;
        if batch.len() >= batch_size {
            dst.write_batch(std::mem::take(&mut batch))?;
        }
    }
    if !batch.is_empty() {
        dst.write_batch(batch)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, store) = open_tmp();
        store.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn prefix_iteration_is_ascending() {
        let (_dir, store) = open_tmp();
        for b in [5u64, 1, 1000, 0, 256] {
            store.put(&crate::codec::block_hash_key(b), &[1; 32]).unwrap();
        }
        let blocks: Vec<u64> = store
            .iter_prefix(crate::codec::BLOCK_HASH_PREFIX)
            .map(|(k, _)| crate::codec::decode_block_hash_key(&k).unwrap())
            .collect();
        assert_eq!(blocks, vec![0, 1, 5, 256, 1000]);
    }

    #[test]
    fn seek_first_and_last() {
        let (_dir, store) = open_tmp();
        for b in [5u64, 1, 1000, 0, 256] {
            store.put(&crate::codec::block_hash_key(b), &[1; 32]).unwrap();
        }
        let (first_key, _) = store.seek_first(crate::codec::BLOCK_HASH_PREFIX).unwrap().unwrap();
        let (last_key, _) = store.seek_last(crate::codec::BLOCK_HASH_PREFIX).unwrap().unwrap();
        assert_eq!(crate::codec::decode_block_hash_key(&first_key).unwrap(), 0);
        assert_eq!(crate::codec::decode_block_hash_key(&last_key).unwrap(), 1000);
    }

    #[test]
    fn copy_prefix_moves_all_matching_keys() {
        let (_dir1, src) = open_tmp();
        let (_dir2, dst) = open_tmp();
        for b in 0..50u64 {
            src.put(&crate::codec::block_hash_key(b), &[2; 32]).unwrap();
        }
        let copied = copy_prefix(&src, &dst, crate::codec::BLOCK_HASH_PREFIX, 8).unwrap();
        assert_eq!(copied, 50);
        for b in 0..50u64 {
            assert_eq!(dst.get(&crate::codec::block_hash_key(b)).unwrap(), Some(vec![2; 32]));
        }
    }

    #[test]
    fn iter_range_excludes_upper_bound() {
        let (_dir, store) = open_tmp();
        for b in 0..10u64 {
            store.put(&crate::codec::update_set_key(b), &[1]).unwrap();
        }
        let lower = crate::codec::update_set_key(0);
        let upper = crate::codec::upper_bound_inclusive(crate::codec::UPDATE_SET_PREFIX, 4);
        let blocks: Vec<u64> =
            store.iter_range(&lower, &upper).map(|(k, _)| crate::codec::decode_update_set_key(&k).unwrap()).collect();
        assert_eq!(blocks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn open_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _store = Store::open(dir.path(), OpenMode::Create).unwrap();
        drop(_store);
        let err = Store::open(dir.path(), OpenMode::Create);
        assert!(err.is_err());
    }
}
