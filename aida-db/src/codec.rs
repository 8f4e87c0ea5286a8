//! Bit-exact key encoding/decoding for aida-db's on-disk key prefixes.
//! These byte layouts are part of binary compatibility and must never
//! change shape, matching the teacher's own warning on `DBCol` variants in
//! `core/store/src/columns.rs`: "it is *not* safe to rename a variant."

use crate::error::{AidaError, Result};

/// Metadata base prefix (`_md`).
pub const METADATA_PREFIX: &[u8] = b"_md";

pub const FIELD_FIRST_BLOCK: &[u8] = b"fb";
pub const FIELD_LAST_BLOCK: &[u8] = b"lb";
pub const FIELD_FIRST_EPOCH: &[u8] = b"fe";
pub const FIELD_LAST_EPOCH: &[u8] = b"le";
pub const FIELD_DB_TYPE: &[u8] = b"ty";
pub const FIELD_CHAIN_ID: &[u8] = b"ci";
pub const FIELD_TIMESTAMP: &[u8] = b"ti";
pub const FIELD_DB_HASH: &[u8] = b"md";
pub const FIELD_HAS_HASH_PATCH: &[u8] = b"sh";

pub const BLOCK_HASH_PREFIX: &[u8] = b"bh";
pub const STATE_ROOT_PREFIX: &[u8] = b"dbh";

/// Internal-only prefixes: update sets, substates and destroyed-account
/// records. Fixed-width big-endian
/// suffixes, matching the block-hash key's rationale, so range iteration
/// (`[0, target]`) is a plain lexicographic prefix scan.
pub const UPDATE_SET_PREFIX: &[u8] = b"us";
pub const SUBSTATE_PREFIX: &[u8] = b"sb";
pub const DESTROYED_ACCOUNT_PREFIX: &[u8] = b"da";

/// Builds a metadata field key: `_md` ‖ field code.
pub fn metadata_key(field: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(METADATA_PREFIX.len() + field.len());
    key.extend_from_slice(METADATA_PREFIX);
    key.extend_from_slice(field);
    key
}

/// `u64` value, 8-byte big-endian.
pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    if bytes.len() != 8 {
        return Err(AidaError::DecodeSize { expected: 8, got: bytes.len() });
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

/// Chain id decoding: the source may have written either a legacy 2-byte
/// big-endian value, or the current 8-byte big-endian value. Both are
/// accepted and widened to `u64`.
pub fn decode_chain_id(bytes: &[u8]) -> Result<u64> {
    match bytes.len() {
        2 => {
            let mut buf = [0u8; 2];
            buf.copy_from_slice(bytes);
            Ok(u16::from_be_bytes(buf) as u64)
        }
        8 => decode_u64(bytes),
        got => Err(AidaError::DecodeSize { expected: 8, got }),
    }
}

pub fn encode_db_type(db_type: crate::types::DbType) -> [u8; 1] {
    [db_type.to_byte()]
}

pub fn decode_db_type(bytes: &[u8]) -> Result<crate::types::DbType> {
    if bytes.len() != 1 {
        return Err(AidaError::DecodeSize { expected: 1, got: bytes.len() });
    }
    crate::types::DbType::from_byte(bytes[0])
        .ok_or_else(|| AidaError::DecodeSize { expected: 1, got: bytes.len() })
}

/// Boolean flag: single byte, `0x01` means present.
pub fn encode_bool_flag(value: bool) -> [u8; 1] {
    [if value { 0x01 } else { 0x00 }]
}

pub fn decode_bool_flag(bytes: &[u8]) -> Result<bool> {
    if bytes.len() != 1 {
        return Err(AidaError::DecodeSize { expected: 1, got: bytes.len() });
    }
    Ok(bytes[0] == 0x01)
}

/// `32`-byte hash: every persisted state-root or block-hash value must be
/// exactly this long.
pub fn validate_hash32(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() != 32 {
        return Err(AidaError::DecodeSize { expected: 32, got: bytes.len() });
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(bytes);
    Ok(buf)
}

/// Block-hash key: `"bh" ‖ be64(block)`, 10 bytes. Fixed-width big-endian so
/// lexicographic iteration equals numeric order.
pub fn block_hash_key(block: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_HASH_PREFIX.len() + 8);
    key.extend_from_slice(BLOCK_HASH_PREFIX);
    key.extend_from_slice(&encode_u64(block));
    key
}

/// Inverse of [`block_hash_key`]. Holds for all `b` in `[0, 2^64)`.
pub fn decode_block_hash_key(key: &[u8]) -> Result<u64> {
    if key.len() != BLOCK_HASH_PREFIX.len() + 8 || !key.starts_with(BLOCK_HASH_PREFIX) {
        return Err(AidaError::DecodeSize { expected: BLOCK_HASH_PREFIX.len() + 8, got: key.len() });
    }
    decode_u64(&key[BLOCK_HASH_PREFIX.len()..])
}

/// State-root key: `"dbh" ‖ "0x" ‖ lowercase hex of block (no leading zeros)`.
/// Retains historical textual form; iteration order is *not* guaranteed to
/// equal numeric order.
pub fn state_root_key(block: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(STATE_ROOT_PREFIX.len() + 2 + 16);
    key.extend_from_slice(STATE_ROOT_PREFIX);
    key.extend_from_slice(b"0x");
    key.extend_from_slice(format!("{block:x}").as_bytes());
    key
}

/// Parses the trailing hex of a state-root key back to `u64`.
pub fn state_hash_key_to_u64(key: &[u8]) -> Result<u64> {
    let prefix_len = STATE_ROOT_PREFIX.len() + 2;
    if key.len() < prefix_len || !key.starts_with(STATE_ROOT_PREFIX) {
        return Err(AidaError::InvalidArgument(format!(
            "state-root key too short or missing prefix: {} bytes",
            key.len()
        )));
    }
    if &key[STATE_ROOT_PREFIX.len()..prefix_len] != b"0x" {
        return Err(AidaError::InvalidArgument("state-root key missing 0x marker".into()));
    }
    let hex_str = std::str::from_utf8(&key[prefix_len..])
        .map_err(|e| AidaError::InvalidArgument(format!("state-root key not utf8: {e}")))?;
    u64::from_str_radix(hex_str, 16)
        .map_err(|e| AidaError::InvalidArgument(format!("state-root key not hex: {e}")))
}

/// Update-set key: `"us" ‖ be64(block)`.
pub fn update_set_key(block: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(UPDATE_SET_PREFIX.len() + 8);
    key.extend_from_slice(UPDATE_SET_PREFIX);
    key.extend_from_slice(&encode_u64(block));
    key
}

pub fn decode_update_set_key(key: &[u8]) -> Result<u64> {
    if key.len() != UPDATE_SET_PREFIX.len() + 8 || !key.starts_with(UPDATE_SET_PREFIX) {
        return Err(AidaError::DecodeSize { expected: UPDATE_SET_PREFIX.len() + 8, got: key.len() });
    }
    decode_u64(&key[UPDATE_SET_PREFIX.len()..])
}

/// Substate key: `"sb" ‖ be64(block) ‖ be32(tx)`. Lexicographic order
/// equals `(block,tx)` order.
pub fn substate_key(block: u64, tx: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(SUBSTATE_PREFIX.len() + 12);
    key.extend_from_slice(SUBSTATE_PREFIX);
    key.extend_from_slice(&encode_u64(block));
    key.extend_from_slice(&tx.to_be_bytes());
    key
}

pub fn decode_substate_key(key: &[u8]) -> Result<(u64, u32)> {
    let expected = SUBSTATE_PREFIX.len() + 12;
    if key.len() != expected || !key.starts_with(SUBSTATE_PREFIX) {
        return Err(AidaError::DecodeSize { expected, got: key.len() });
    }
    let block = decode_u64(&key[SUBSTATE_PREFIX.len()..SUBSTATE_PREFIX.len() + 8])?;
    let mut tx_buf = [0u8; 4];
    tx_buf.copy_from_slice(&key[SUBSTATE_PREFIX.len() + 8..]);
    Ok((block, u32::from_be_bytes(tx_buf)))
}

/// Destroyed-account record key: same layout as [`substate_key`].
pub fn destroyed_account_key(block: u64, tx: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(DESTROYED_ACCOUNT_PREFIX.len() + 12);
    key.extend_from_slice(DESTROYED_ACCOUNT_PREFIX);
    key.extend_from_slice(&encode_u64(block));
    key.extend_from_slice(&tx.to_be_bytes());
    key
}

pub fn decode_destroyed_account_key(key: &[u8]) -> Result<(u64, u32)> {
    let expected = DESTROYED_ACCOUNT_PREFIX.len() + 12;
    if key.len() != expected || !key.starts_with(DESTROYED_ACCOUNT_PREFIX) {
        return Err(AidaError::DecodeSize { expected, got: key.len() });
    }
    let block = decode_u64(&key[DESTROYED_ACCOUNT_PREFIX.len()..DESTROYED_ACCOUNT_PREFIX.len() + 8])?;
    let mut tx_buf = [0u8; 4];
    tx_buf.copy_from_slice(&key[DESTROYED_ACCOUNT_PREFIX.len() + 8..]);
    Ok((block, u32::from_be_bytes(tx_buf)))
}

/// Upper-bound key for a prefix-scan over `[0, target]` for any of the
/// fixed-width `(prefix ‖ be64(block) [‖ be32(tx)])` key families: one past
/// `target`'s full-width zero-tx key, so the scan excludes `target+1` and
/// everything after while including every tx within `target` itself.
pub fn upper_bound_inclusive(prefix: &[u8], target: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&encode_u64(target.saturating_add(1)));
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DbType;

    #[test]
    fn block_hash_key_round_trips() {
        for block in [0u64, 1, 42, u64::MAX, u64::MAX - 1, 1 << 40] {
            let key = block_hash_key(block);
            assert_eq!(key.len(), 10);
            assert_eq!(decode_block_hash_key(&key).unwrap(), block);
        }
    }

    #[test]
    fn block_hash_keys_sort_numerically() {
        let mut keys: Vec<_> = [5u64, 1, 1000, 0, 256].into_iter().map(block_hash_key).collect();
        keys.sort();
        let blocks: Vec<u64> = keys.iter().map(|k| decode_block_hash_key(k).unwrap()).collect();
        assert_eq!(blocks, vec![0, 1, 5, 256, 1000]);
    }

    #[test]
    fn state_root_key_round_trips() {
        for block in [0u64, 1, 42, 0xdead_beef] {
            let key = state_root_key(block);
            assert_eq!(state_hash_key_to_u64(&key).unwrap(), block);
        }
    }

    #[test]
    fn state_root_key_has_no_leading_zeros() {
        assert_eq!(state_root_key(255), b"dbh0xff".to_vec());
    }

    #[test]
    fn chain_id_widens_legacy_two_byte_value() {
        assert_eq!(decode_chain_id(&250u16.to_be_bytes()).unwrap(), 250);
        assert_eq!(decode_chain_id(&encode_u64(250)).unwrap(), 250);
    }

    #[test]
    fn hash32_rejects_wrong_length() {
        assert!(validate_hash32(&[0u8; 31]).is_err());
        assert!(validate_hash32(&[0u8; 32]).is_ok());
    }

    #[test]
    fn db_type_round_trips() {
        for t in [DbType::NoType, DbType::GenType, DbType::PatchType, DbType::CloneType, DbType::CustomType] {
            assert_eq!(decode_db_type(&encode_db_type(t)).unwrap() as u8, t as u8);
        }
    }
}
