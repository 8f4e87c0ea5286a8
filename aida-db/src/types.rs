//! Core data model: substates, world state, update sets and destroyed-account
//! records.

use std::collections::{HashMap, HashSet};

use borsh::{BorshDeserialize, BorshSerialize};
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

pub type Address = H160;
pub type StorageKey = H256;
pub type StorageValue = H256;

/// One account's state: balance, nonce, code, and a flat storage map.
/// Storage has no nested structure and accounts never reference each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub code: Vec<u8>,
    pub storage: HashMap<StorageKey, StorageValue>,
}

impl Account {
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }
}

/// A mapping from address to account. Mutation follows "merge" semantics
/// throughout this crate: the source overwrites the destination per account,
/// with storage overwritten per key rather than wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WorldState {
    pub accounts: HashMap<Address, Account>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn get_mut_or_default(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    pub fn remove(&mut self, address: &Address) -> Option<Account> {
        self.accounts.remove(address)
    }

    /// Clears storage of `address` if present, keeping nonce/balance/code.
    pub fn clear_storage(&mut self, address: &Address) {
        if let Some(account) = self.accounts.get_mut(address) {
            account.storage.clear();
        }
    }

    /// Merges `other` into `self`: source (`other`) overwrites destination
    /// per account — nonce, balance and code unconditionally, storage per
    /// key — so an account whose code becomes empty in a later update is not
    /// left holding stale bytes from an earlier merge.
    pub fn merge(&mut self, other: &WorldState) {
        for (address, src_account) in &other.accounts {
            let dst = self.accounts.entry(*address).or_default();
            dst.nonce = src_account.nonce;
            dst.balance = src_account.balance;
            dst.code = src_account.code.clone();
            for (key, value) in &src_account.storage {
                dst.storage.insert(*key, *value);
            }
        }
    }
}

/// A substate record: one transaction's pre-state, post-state, environment,
/// message and receipt. The environment/message/receipt payloads are opaque
/// to this crate beyond size accounting; downstream VM factories interpret
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Substate {
    pub block: u64,
    pub tx: u32,
    pub input_state: WorldState,
    pub output_state: WorldState,
    pub env: Vec<u8>,
    pub msg: Vec<u8>,
    pub result: Vec<u8>,
}

/// A merged world-state delta covering all substates up to `block`, with
/// destroyed-account pruning already applied.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct UpdateSet {
    pub block: u64,
    pub world_state: WorldState,
    pub deleted_accounts: HashSet<Address>,
}

/// A per-(block,tx) record of accounts destroyed or resurrected within that
/// transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DestroyedAccountRecord {
    pub block: u64,
    pub tx: u32,
    pub destroyed: Vec<Address>,
    pub resurrected: Vec<Address>,
}

/// Db-type byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DbType {
    NoType = 0,
    GenType = 1,
    PatchType = 2,
    CloneType = 3,
    CustomType = 4,
}

impl DbType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DbType::NoType),
            1 => Some(DbType::GenType),
            2 => Some(DbType::PatchType),
            3 => Some(DbType::CloneType),
            4 => Some(DbType::CustomType),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// One entry of the patches manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchEntry {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fromBlock")]
    pub from_block: u64,
    #[serde(rename = "toBlock")]
    pub to_block: u64,
    #[serde(rename = "fromEpoch")]
    pub from_epoch: u64,
    #[serde(rename = "toEpoch")]
    pub to_epoch: u64,
    #[serde(rename = "dbHash")]
    pub db_hash: String,
    #[serde(rename = "tarHash")]
    pub tar_hash: String,
    pub nightly: bool,
}
