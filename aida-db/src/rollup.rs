//! Folds update-sets and a tail of raw substates into a `WorldState` as of
//! an arbitrary target block. Grounded on `core/primitives/src/state_record.rs`'s
//! delta-record fold pattern (apply deltas to an accumulator in strictly
//! ascending key order).

use std::collections::HashSet;

use borsh::BorshDeserialize;

use crate::codec;
use crate::error::Result;
use crate::kv::Store;
use crate::types::{Address, DestroyedAccountRecord, Substate, UpdateSet, WorldState};

/// Read-only view over the update-set, substate and destroyed-account
/// record ranges of a store.
pub struct Rollup<'a> {
    store: &'a Store,
}

impl<'a> Rollup<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn put_update_set(&self, entry: &UpdateSet) -> Result<()> {
        let bytes = borsh::to_vec(entry)?;
        self.store.put(&codec::update_set_key(entry.block), &bytes)
    }

    pub fn put_substate(&self, entry: &Substate) -> Result<()> {
        let bytes = borsh::to_vec(entry)?;
        self.store.put(&codec::substate_key(entry.block, entry.tx), &bytes)
    }

    pub fn put_destroyed_account_record(&self, entry: &DestroyedAccountRecord) -> Result<()> {
        let bytes = borsh::to_vec(entry)?;
        self.store.put(&codec::destroyed_account_key(entry.block, entry.tx), &bytes)
    }

    fn destroyed_account_record(&self, block: u64, tx: u32) -> Result<Option<DestroyedAccountRecord>> {
        match self.store.get(&codec::destroyed_account_key(block, tx))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(DestroyedAccountRecord::try_from_slice(&bytes)?)),
        }
    }

    /// Rolls up `WorldState` as of `target`: fold update-sets up to `target`,
    /// replay the tail of raw substates past the last update-set, then erase
    /// every account destroyed anywhere in `[0, target]`. Returns the
    /// reconstructed state plus the accumulated deleted-accounts set.
    pub fn rollup(&self, target: u64) -> Result<(WorldState, HashSet<Address>)> {
        let span = tracing::debug_span!("rollup", target);
        let _enter = span.enter();

        if target == 0 {
            return Ok((WorldState::new(), HashSet::new()));
        }

        let mut state = WorldState::new();
        let mut deleted_accounts: HashSet<Address> = HashSet::new();
        let mut cursor = 0u64;

        // Fold update-sets with key <= target, strictly ascending.
        let lower = codec::update_set_key(0);
        let upper = codec::upper_bound_inclusive(codec::UPDATE_SET_PREFIX, target);
        for (_key, value) in self.store.iter_range(&lower, &upper) {
            let entry = UpdateSet::try_from_slice(&value)?;
            for address in &entry.deleted_accounts {
                state.clear_storage(address);
            }
            state.merge(&entry.world_state);
            deleted_accounts.extend(entry.deleted_accounts.iter().copied());
            cursor = entry.block + 1;
        }

        // Tail substate replay over [cursor, target].
        let sub_lower = codec::substate_key(cursor, 0);
        let sub_upper = codec::upper_bound_inclusive(codec::SUBSTATE_PREFIX, target);
        for (key, value) in self.store.iter_range(&sub_lower, &sub_upper) {
            let (block, tx) = codec::decode_substate_key(&key)?;
            let substate = Substate::try_from_slice(&value)?;
            if let Some(record) = self.destroyed_account_record(block, tx)? {
                for address in &record.resurrected {
                    state.clear_storage(address);
                }
                deleted_accounts.extend(record.destroyed.iter().copied());
                deleted_accounts.extend(record.resurrected.iter().copied());
            }
            state.merge(&substate.output_state);
        }

        // Full erase of every address destroyed anywhere in [0, target], not
        // just storage-cleared.
        let da_lower = codec::destroyed_account_key(0, 0);
        let da_upper = codec::upper_bound_inclusive(codec::DESTROYED_ACCOUNT_PREFIX, target);
        for (_key, value) in self.store.iter_range(&da_lower, &da_upper) {
            let record = DestroyedAccountRecord::try_from_slice(&value)?;
            for address in &record.destroyed {
                state.remove(address);
                deleted_accounts.insert(*address);
            }
        }

        Ok((state, deleted_accounts))
    }
}
