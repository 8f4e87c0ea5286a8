//! Hash Index: block-hash and state-root indices, plus the RPC scraper that
//! populates them. Grounded on `core/store/src/archive/cold_storage.rs`'s
//! iterate-and-log loop and `tools/state-viewer`'s RPC client usage.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::codec::{self, BLOCK_HASH_PREFIX, STATE_ROOT_PREFIX};
use crate::error::{AidaError, Result};
use crate::kv::Store;

const LOG_INTERVAL: u64 = 10_000;

/// Read/write access to the block-hash and state-root indices.
pub struct HashIndex<'a> {
    store: &'a Store,
}

impl<'a> HashIndex<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn put_block_hash(&self, block: u64, hash: &[u8; 32]) -> Result<()> {
        self.store.put(&codec::block_hash_key(block), hash)
    }

    pub fn get_block_hash(&self, block: u64) -> Result<Option<[u8; 32]>> {
        match self.store.get(&codec::block_hash_key(block))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(codec::validate_hash32(&bytes)?)),
        }
    }

    pub fn put_state_root(&self, block: u64, hash: &[u8; 32]) -> Result<()> {
        self.store.put(&codec::state_root_key(block), hash)
    }

    pub fn get_state_root(&self, block: u64) -> Result<Option<[u8; 32]>> {
        match self.store.get(&codec::state_root_key(block))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(codec::validate_hash32(&bytes)?)),
        }
    }

    /// Seek-first / seek-last over the fixed-width block-hash prefix; fails
    /// with `NotFound` when the index is empty.
    pub fn first_block_hash(&self) -> Result<(u64, [u8; 32])> {
        let (key, value) = self
            .store
            .seek_first(BLOCK_HASH_PREFIX)?
            .ok_or_else(|| AidaError::NotFound("no block hash found".into()))?;
        Ok((codec::decode_block_hash_key(&key)?, codec::validate_hash32(&value)?))
    }

    pub fn last_block_hash(&self) -> Result<(u64, [u8; 32])> {
        let (key, value) = self
            .store
            .seek_last(BLOCK_HASH_PREFIX)?
            .ok_or_else(|| AidaError::NotFound("no block hash found".into()))?;
        Ok((codec::decode_block_hash_key(&key)?, codec::validate_hash32(&value)?))
    }

    /// `GetFirstStateHash`/`GetLastStateHash`: the state-root keyspace is
    /// textual hex, so a seek-first/seek-last shortcut would return the
    /// *lexicographically* first/last key, not the numerically smallest/
    /// largest block. Instead this does a full prefix scan, parsing each key
    /// back to a block number and tracking the numeric extremum.
    pub fn first_state_hash(&self) -> Result<(u64, [u8; 32])> {
        self.extreme_state_hash(Extreme::Min)
    }

    pub fn last_state_hash(&self) -> Result<(u64, [u8; 32])> {
        self.extreme_state_hash(Extreme::Max)
    }

    fn extreme_state_hash(&self, which: Extreme) -> Result<(u64, [u8; 32])> {
        let mut best: Option<(u64, [u8; 32])> = None;
        for (key, value) in self.store.iter_prefix(STATE_ROOT_PREFIX) {
            let block = match codec::state_hash_key_to_u64(&key) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let hash = codec::validate_hash32(&value)?;
            best = Some(match (best, which) {
                (None, _) => (block, hash),
                (Some((b, _)), Extreme::Min) if block < b => (block, hash),
                (Some((b, _)), Extreme::Max) if block > b => (block, hash),
                (Some(existing), _) => existing,
            });
        }
        best.ok_or_else(|| AidaError::NotFound("no state root hash found".into()))
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

/// Upstream RPC endpoint, resolved via the connection-preference order: try
/// `<db>/sonic.ipc`, then `<db>/geth.ipc`, then a chain-id-derived public
/// HTTPS provider URL. First successful connection wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Ipc(std::path::PathBuf),
    Http(String),
}

pub fn resolve_endpoint(db_path: &Path, https_fallback: &str) -> Endpoint {
    let sonic_ipc = db_path.join("sonic.ipc");
    if sonic_ipc.exists() {
        return Endpoint::Ipc(sonic_ipc);
    }
    let geth_ipc = db_path.join("geth.ipc");
    if geth_ipc.exists() {
        return Endpoint::Ipc(geth_ipc);
    }
    Endpoint::Http(https_fallback.to_string())
}

/// A minimal JSON-RPC client over HTTP, used by the scraper. IPC transport
/// is represented but not implemented here: it requires a platform-specific
/// unix-domain-socket transport that is out of scope for this crate's test
/// surface; callers that resolve an `Endpoint::Ipc` get a clear
/// `NotImplemented` rather than a silent no-op.
pub struct RpcClient {
    http: reqwest::blocking::Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http, url: url.into() })
    }

    /// Builds a client from a resolved [`Endpoint`], matching the
    /// connection-preference order of [`resolve_endpoint`]. IPC endpoints
    /// are not yet supported over this transport.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Http(url) => Self::new(url.clone()),
            Endpoint::Ipc(_) => Err(AidaError::NotImplemented("IPC transport")),
        }
    }

    /// Calls `eth_getBlockByNumber(blockHex, false)`, returning the raw JSON
    /// result object.
    pub fn get_block_by_number(&self, block: u64) -> Result<Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBlockByNumber",
            "params": [format!("0x{block:x}"), false],
        });
        let response: Value = self.http.post(&self.url).json(&body).send()?.json()?;
        if let Some(error) = response.get("error") {
            return Err(AidaError::InvalidArgument(format!("rpc error: {error}")));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| AidaError::NotFound(format!("no block {block} from rpc")))
    }

    /// Calls the chain's native epoch-at-block RPC method, returning the
    /// epoch number the block belongs to. Used by `findEpochs` to confirm
    /// epoch-boundary blocks after a metadata merge or regeneration.
    pub fn get_epoch(&self, block: u64) -> Result<u64> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ftm_getBlockByNumber",
            "params": [format!("0x{block:x}"), false],
        });
        let response: Value = self.http.post(&self.url).json(&body).send()?.json()?;
        if let Some(error) = response.get("error") {
            return Err(AidaError::InvalidArgument(format!("rpc error: {error}")));
        }
        let result = response
            .get("result")
            .ok_or_else(|| AidaError::NotFound(format!("no block {block} from rpc")))?;
        let epoch_hex = result
            .get("epoch")
            .and_then(Value::as_str)
            .ok_or_else(|| AidaError::InvalidArgument(format!("block {block} missing field epoch")))?;
        let epoch_hex = epoch_hex.strip_prefix("0x").unwrap_or(epoch_hex);
        u64::from_str_radix(epoch_hex, 16)
            .map_err(|e| AidaError::InvalidArgument(format!("block {block} field epoch not hex: {e}")))
    }
}

fn parse_hash_field(block: &Value, field: &str, block_num: u64) -> Result<[u8; 32]> {
    let hex_str = block
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AidaError::InvalidArgument(format!("block {block_num} missing field {field}")))?;
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)
        .map_err(|e| AidaError::InvalidArgument(format!("block {block_num} field {field} not hex: {e}")))?;
    codec::validate_hash32(&bytes)
}

/// Drives the scraper state machine over `[first_block, last_block]`,
/// writing into `index`.
pub fn scrape(index: &HashIndex, client: &RpcClient, first_block: u64, last_block: u64) -> Result<()> {
    let span = tracing::debug_span!("scrape_hashes", first_block, last_block);
    let _enter = span.enter();

    if first_block == 0 {
        // Genesis state-root is not reliably returned by upstream RPCs, so
        // block 1's state-root is persisted for block 0 too, and block 1's
        // own hash is persisted as its hash.
        let block1 = client.get_block_by_number(1)?;
        let state_root = parse_hash_field(&block1, "stateRoot", 1)?;
        let hash = parse_hash_field(&block1, "hash", 1)?;
        index.put_state_root(0, &state_root)?;
        index.put_state_root(1, &state_root)?;
        index.put_block_hash(1, &hash)?;
    }

    let start = first_block.max(1);
    for i in start..=last_block {
        let block = client.get_block_by_number(i)?;
        let state_root = parse_hash_field(&block, "stateRoot", i)?;
        let hash = parse_hash_field(&block, "hash", i)?;
        index.put_state_root(i, &state_root)?;
        index.put_block_hash(i, &hash)?;
        if i % LOG_INTERVAL == 0 {
            tracing::info!(block = i, "scraped hashes");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::OpenMode;
    use assert_matches::assert_matches;

    fn open_tmp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), OpenMode::Create).unwrap();
        (dir, store)
    }

    #[test]
    fn block_hash_round_trip_and_last() {
        let (_dir, store) = open_tmp();
        let index = HashIndex::new(&store);
        index.put_block_hash(42, &[0x11; 32]).unwrap();
        assert_eq!(index.get_block_hash(42).unwrap(), Some([0x11; 32]));
        assert_eq!(index.last_block_hash().unwrap().0, 42);
    }

    #[test]
    fn missing_block_hash_is_none() {
        let (_dir, store) = open_tmp();
        let index = HashIndex::new(&store);
        assert_eq!(index.get_block_hash(7).unwrap(), None);
    }

    #[test]
    fn empty_index_last_block_hash_not_found() {
        let (_dir, store) = open_tmp();
        let index = HashIndex::new(&store);
        assert_matches!(index.last_block_hash(), Err(AidaError::NotFound(_)));
    }

    #[test]
    fn state_hash_extremes_use_numeric_not_lexicographic_order() {
        let (_dir, store) = open_tmp();
        let index = HashIndex::new(&store);
        // Lexicographically "0x2" < "0x10" would be wrong; numerically 16 > 2.
        index.put_state_root(2, &[1; 32]).unwrap();
        index.put_state_root(16, &[2; 32]).unwrap();
        index.put_state_root(100, &[3; 32]).unwrap();
        assert_eq!(index.first_state_hash().unwrap().0, 2);
        assert_eq!(index.last_state_hash().unwrap().0, 100);
    }

    #[test]
    fn resolve_endpoint_prefers_sonic_ipc_over_geth_and_https() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sonic.ipc"), b"").unwrap();
        std::fs::write(dir.path().join("geth.ipc"), b"").unwrap();
        assert_eq!(resolve_endpoint(dir.path(), "https://fallback"), Endpoint::Ipc(dir.path().join("sonic.ipc")));
    }

    #[test]
    fn resolve_endpoint_falls_back_to_geth_ipc_when_no_sonic_ipc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("geth.ipc"), b"").unwrap();
        assert_eq!(resolve_endpoint(dir.path(), "https://fallback"), Endpoint::Ipc(dir.path().join("geth.ipc")));
    }

    #[test]
    fn resolve_endpoint_falls_back_to_https_when_no_ipc_socket_present() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_endpoint(dir.path(), "https://fallback"), Endpoint::Http("https://fallback".to_string()));
    }

    #[test]
    fn connect_to_ipc_endpoint_is_not_implemented() {
        let endpoint = Endpoint::Ipc(std::path::PathBuf::from("/tmp/sonic.ipc"));
        assert_matches!(RpcClient::connect(&endpoint), Err(AidaError::NotImplemented(_)));
    }
}
