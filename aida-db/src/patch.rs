//! Validates and merges one aida-db snapshot (a patch) into another, plus
//! the HTTP patches-manifest fetch. Grounded on
//! `core/store/src/archive/cold_storage.rs`'s `copy_from_store` (batched
//! column copy ahead of a metadata update).

use crate::codec::{BLOCK_HASH_PREFIX, STATE_ROOT_PREFIX};
use crate::config::{ChainId, Config};
use crate::error::{AidaError, Result};
use crate::hash_index::RpcClient;
use crate::kv::{copy_prefix, Store};
use crate::metadata::MetadataStore;
use crate::types::PatchEntry;

const COPY_BATCH_SIZE: usize = 10_000;

/// Fetches `<repo-url>/patches.json` for `chain_id`. Returns the manifest
/// entries in the order the server sent them.
pub fn fetch_patches_manifest(config: &Config, chain_id: ChainId) -> Result<Vec<PatchEntry>> {
    let repo_url = config
        .patches_repo_url(chain_id)
        .ok_or_else(|| AidaError::InvalidArgument(format!("no patches repo configured for chain {chain_id}")))?;
    let url = format!("{repo_url}/patches.json");
    let response = reqwest::blocking::get(&url)?;
    let entries: Vec<PatchEntry> = response.json()?;
    Ok(entries)
}

/// Finds the manifest entry whose `fromBlock` is the known start of a
/// published patch immediately following `after_block`.
pub fn find_patch_starting_after(manifest: &[PatchEntry], after_block: u64) -> Option<&PatchEntry> {
    manifest.iter().find(|entry| entry.from_block == after_block + 1)
}

/// Applies a patch snapshot (`source`) onto `target`:
/// - `target.LastBlock != 0`,
/// - `source.FirstBlock == target.LastBlock + 1`, OR `source.FirstBlock` is
///   a known published-patch start (checked by the caller via
///   [`find_patch_starting_after`] and passed as `allow_disjoint_start`),
/// - chain-ids match (checked inside `MetadataStore::merge`).
///
/// On success: copies every key/value from `source` into `target` (batched
/// via [`copy_prefix`]), merges metadata (recomputing the epoch range when
/// `rpc` is given), and persists the patch's integrity hash.
pub fn apply_patch(
    target: &Store,
    source: &Store,
    allow_disjoint_start: bool,
    config: &Config,
    rpc: Option<&RpcClient>,
) -> Result<()> {
    let span = tracing::debug_span!("apply_patch");
    let _enter = span.enter();

    let target_md = MetadataStore::new(target);
    let source_md = MetadataStore::new(source);

    let target_last = target_md.last_block().unwrap_or(0);
    if target_last == 0 {
        return Err(AidaError::InvalidArgument("target db has no LastBlock".into()));
    }

    let source_first = source_md
        .first_block()
        .ok_or_else(|| AidaError::InvalidArgument("source patch has no FirstBlock".into()))?;
    if source_first != target_last + 1 && !allow_disjoint_start {
        return Err(AidaError::RangeMismatch {
            target_first: target_md.first_block().unwrap_or(0),
            target_last,
            source_first,
            source_last: source_md.last_block().unwrap_or(0),
        });
    }

    for prefix in [BLOCK_HASH_PREFIX, STATE_ROOT_PREFIX] {
        copy_prefix(source, target, prefix, COPY_BATCH_SIZE)?;
    }
    for prefix in
        [crate::codec::UPDATE_SET_PREFIX, crate::codec::SUBSTATE_PREFIX, crate::codec::DESTROYED_ACCOUNT_PREFIX]
    {
        copy_prefix(source, target, prefix, COPY_BATCH_SIZE)?;
    }

    target_md.merge(&source_md, config, rpc)?;

    if let Some(hash) = source_md.db_hash() {
        target_md.set_db_hash(&hash)?;
    }
    if source_md.has_hash_patch() {
        target_md.set_has_hash_patch(true)?;
    }

    Ok(())
}
