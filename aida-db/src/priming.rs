//! Priming engine and prime context state machine: stream a `WorldState`
//! into a state-db through a bulk-load interface, batching writes by
//! operation count. Grounded on
//! `core/store/src/archive/cold_storage.rs`'s `BatchTransaction`
//! (threshold-triggered flush during bulk copy).

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::error::Result;
use crate::types::{Address, StorageKey, StorageValue, WorldState};
use primitive_types::U256;

/// One open bulk-load segment. Implementations are state-db-backend
/// specific; this crate only drives the contract.
pub trait BulkLoadHandle {
    fn create_account(&mut self, addr: Address) -> Result<()>;
    fn set_balance(&mut self, addr: Address, balance: U256) -> Result<()>;
    fn set_nonce(&mut self, addr: Address, nonce: u64) -> Result<()>;
    fn set_code(&mut self, addr: Address, code: &[u8]) -> Result<()>;
    fn set_state(&mut self, addr: Address, key: StorageKey, value: StorageValue) -> Result<()>;
    /// Consumes the handle, committing its writes. Resource-release errors
    /// are the caller's responsibility to join with any in-flight error.
    fn close(self: Box<Self>) -> Result<()>;
}

/// The state-db capability set a backend must expose to be primed. Variants
/// (in-memory, LSM-backed, multi-version, shadow-compose) all implement this
/// the same way from the priming engine's perspective.
pub trait StateDb {
    fn start_bulk_load(&mut self, block: u64) -> Result<Box<dyn BulkLoadHandle>>;
    fn exist(&mut self, addr: Address) -> Result<bool>;
    fn begin_sync_period(&mut self, period: u64) -> Result<()>;
    fn end_sync_period(&mut self) -> Result<()>;
    fn begin_block(&mut self, block: u64) -> Result<()>;
    fn end_block(&mut self) -> Result<()>;
    fn begin_transaction(&mut self, tx: u32) -> Result<()>;
    fn end_transaction(&mut self) -> Result<()>;
    fn self_destruct(&mut self, addr: Address) -> Result<()>;
}

/// Ordering in which addresses are streamed into the bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeOrder {
    /// Ascending address order (deterministic, no shuffle).
    Sequential,
    /// Sorted for determinism, then shuffled with a seeded PRNG to exercise
    /// the state-db under non-sequential insertion.
    Random,
}

/// Tracks bulk-load operation count, the existence cache and the active
/// block counter across a priming run. Ephemeral: owned by a single thread
/// for the duration of one replay.
pub struct PrimeContext {
    operation_threshold: u64,
    operation_count: u64,
    exists_cache: HashSet<Address>,
    block: u64,
}

impl PrimeContext {
    pub fn new(config: &Config, starting_block: u64) -> Self {
        Self {
            operation_threshold: config.operation_threshold,
            operation_count: 0,
            exists_cache: HashSet::new(),
            block: starting_block,
        }
    }

    fn record_op(&mut self) -> bool {
        self.operation_count += 1;
        self.operation_count >= self.operation_threshold
    }
}

fn ordered_addresses(state: &WorldState, order: PrimeOrder, seed: i64) -> Vec<Address> {
    let mut addresses: Vec<Address> = state.accounts.keys().copied().collect();
    addresses.sort();
    if order == PrimeOrder::Random {
        let mut rng = ChaCha8Rng::seed_from_u64(crate::config::normalize_seed(seed));
        addresses.shuffle(&mut rng);
    }
    addresses
}

/// Drives the full priming contract: existence-cache precompute, then
/// bulk-load streaming with threshold-triggered `Close`/`StartBulkLoad`
/// cycling, then destroyed-accounts replay.
pub fn prime(
    db: &mut dyn StateDb,
    config: &Config,
    state: &WorldState,
    deleted_accounts: &HashSet<Address>,
    starting_block: u64,
    order: PrimeOrder,
) -> Result<()> {
    let span = tracing::debug_span!("prime", starting_block, accounts = state.accounts.len());
    let _enter = span.enter();

    let mut ctx = PrimeContext::new(config, starting_block);

    // Existence-cache precompute: one synchronous transaction calling
    // `Exist` for every address in the input world state.
    db.begin_sync_period(0)?;
    db.begin_block(ctx.block)?;
    db.begin_transaction(0)?;
    for address in state.accounts.keys() {
        if db.exist(*address)? {
            ctx.exists_cache.insert(*address);
        }
    }
    db.end_transaction()?;
    db.end_block()?;
    db.end_sync_period()?;

    let addresses = ordered_addresses(state, order, config.random_seed);

    let mut handle = db.start_bulk_load(ctx.block)?;
    for address in addresses {
        let account = state.get(&address).expect("address sourced from this world state");

        let already_exists = ctx.exists_cache.contains(&address);
        if !already_exists && account.is_empty() {
            // Nothing to persist: skip accounts that don't exist and carry no state.
            continue;
        }
        if !already_exists {
            handle.create_account(address)?;
            ctx.exists_cache.insert(address);
        }
        handle.set_balance(address, account.balance)?;
        handle.set_nonce(address, account.nonce)?;
        handle.set_code(address, &account.code)?;
        if ctx.record_op() {
            handle = cycle_bulk_load(db, &mut ctx, handle)?;
        }
        for (key, value) in &account.storage {
            handle.set_state(address, *key, *value)?;
            if ctx.record_op() {
                handle = cycle_bulk_load(db, &mut ctx, handle)?;
            }
        }
    }
    handle.close()?;

    // Destroyed-accounts replay: in the prime block, after priming,
    // self-destruct every address still present in the state-db.
    db.begin_sync_period(0)?;
    db.begin_block(ctx.block)?;
    db.begin_transaction(0)?;
    for address in deleted_accounts {
        if db.exist(*address)? {
            db.self_destruct(*address)?;
        }
        ctx.exists_cache.remove(address);
    }
    db.end_transaction()?;
    db.end_block()?;
    db.end_sync_period()?;

    Ok(())
}

fn cycle_bulk_load(
    db: &mut dyn StateDb,
    ctx: &mut PrimeContext,
    handle: Box<dyn BulkLoadHandle>,
) -> Result<Box<dyn BulkLoadHandle>> {
    handle.close()?;
    ctx.operation_count = 0;
    ctx.block += 1;
    db.start_bulk_load(ctx.block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Account;
    use primitive_types::H160;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeBackend {
        accounts: HashMap<Address, Account>,
        create_calls: u32,
        bulk_load_opens: u32,
        self_destructs: Vec<Address>,
    }

    struct FakeHandle {
        backend: Rc<RefCell<FakeBackend>>,
    }

    impl BulkLoadHandle for FakeHandle {
        fn create_account(&mut self, addr: Address) -> Result<()> {
            let mut b = self.backend.borrow_mut();
            b.create_calls += 1;
            b.accounts.entry(addr).or_default();
            Ok(())
        }
        fn set_balance(&mut self, addr: Address, balance: U256) -> Result<()> {
            self.backend.borrow_mut().accounts.entry(addr).or_default().balance = balance;
            Ok(())
        }
        fn set_nonce(&mut self, addr: Address, nonce: u64) -> Result<()> {
            self.backend.borrow_mut().accounts.entry(addr).or_default().nonce = nonce;
            Ok(())
        }
        fn set_code(&mut self, addr: Address, code: &[u8]) -> Result<()> {
            self.backend.borrow_mut().accounts.entry(addr).or_default().code = code.to_vec();
            Ok(())
        }
        fn set_state(&mut self, addr: Address, key: StorageKey, value: StorageValue) -> Result<()> {
            self.backend.borrow_mut().accounts.entry(addr).or_default().storage.insert(key, value);
            Ok(())
        }
        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    struct FakeStateDb {
        backend: Rc<RefCell<FakeBackend>>,
    }

    impl StateDb for FakeStateDb {
        fn start_bulk_load(&mut self, _block: u64) -> Result<Box<dyn BulkLoadHandle>> {
            self.backend.borrow_mut().bulk_load_opens += 1;
            Ok(Box::new(FakeHandle { backend: self.backend.clone() }))
        }
        fn exist(&mut self, addr: Address) -> Result<bool> {
            Ok(self.backend.borrow().accounts.contains_key(&addr))
        }
        fn begin_sync_period(&mut self, _period: u64) -> Result<()> {
            Ok(())
        }
        fn end_sync_period(&mut self) -> Result<()> {
            Ok(())
        }
        fn begin_block(&mut self, _block: u64) -> Result<()> {
            Ok(())
        }
        fn end_block(&mut self) -> Result<()> {
            Ok(())
        }
        fn begin_transaction(&mut self, _tx: u32) -> Result<()> {
            Ok(())
        }
        fn end_transaction(&mut self) -> Result<()> {
            Ok(())
        }
        fn self_destruct(&mut self, addr: Address) -> Result<()> {
            self.backend.borrow_mut().accounts.remove(&addr);
            self.backend.borrow_mut().self_destructs.push(addr);
            Ok(())
        }
    }

    fn addr(byte: u8) -> H160 {
        H160::from([byte; 20])
    }

    #[test]
    fn primes_new_accounts_and_skips_empty_unseen() {
        let backend = Rc::new(RefCell::new(FakeBackend::default()));
        let mut db = FakeStateDb { backend: backend.clone() };
        let config = Config::default();

        let mut state = WorldState::new();
        state.get_mut_or_default(addr(1)).balance = U256::from(42);
        state.get_mut_or_default(addr(2)); // empty, unseen -> skipped

        prime(&mut db, &config, &state, &HashSet::new(), 0, PrimeOrder::Sequential).unwrap();

        let b = backend.borrow();
        assert_eq!(b.accounts.get(&addr(1)).unwrap().balance, U256::from(42));
        assert!(!b.accounts.contains_key(&addr(2)));
        assert_eq!(b.create_calls, 1);
    }

    #[test]
    fn existing_account_is_not_recreated() {
        let backend = Rc::new(RefCell::new(FakeBackend::default()));
        backend.borrow_mut().accounts.insert(addr(1), Account::default());
        let mut db = FakeStateDb { backend: backend.clone() };
        let config = Config::default();

        let mut state = WorldState::new();
        state.get_mut_or_default(addr(1)).balance = U256::from(9);

        prime(&mut db, &config, &state, &HashSet::new(), 0, PrimeOrder::Sequential).unwrap();
        assert_eq!(backend.borrow().create_calls, 0);
    }

    #[test]
    fn threshold_cycles_bulk_load_handle() {
        let backend = Rc::new(RefCell::new(FakeBackend::default()));
        let mut db = FakeStateDb { backend: backend.clone() };
        let mut config = Config::default();
        config.operation_threshold = 2; // force a cycle mid-stream

        let mut state = WorldState::new();
        for i in 0..5u8 {
            state.get_mut_or_default(addr(i)).balance = U256::from(i as u64 + 1);
        }

        prime(&mut db, &config, &state, &HashSet::new(), 0, PrimeOrder::Sequential).unwrap();
        assert!(backend.borrow().bulk_load_opens > 1);
    }

    #[test]
    fn destroyed_accounts_are_self_destructed_after_priming() {
        let backend = Rc::new(RefCell::new(FakeBackend::default()));
        let mut db = FakeStateDb { backend: backend.clone() };
        let config = Config::default();

        let mut state = WorldState::new();
        state.get_mut_or_default(addr(1)).balance = U256::from(5);
        let mut deleted = HashSet::new();
        deleted.insert(addr(1));

        prime(&mut db, &config, &state, &deleted, 0, PrimeOrder::Sequential).unwrap();
        assert_eq!(backend.borrow().self_destructs, vec![addr(1)]);
        assert!(!backend.borrow().accounts.contains_key(&addr(1)));
    }

    #[test]
    fn random_order_is_a_permutation_of_sequential() {
        let mut state = WorldState::new();
        for i in 0..20u8 {
            state.get_mut_or_default(addr(i)).balance = U256::from(1);
        }
        let sequential = ordered_addresses(&state, PrimeOrder::Sequential, 42);
        let mut shuffled = ordered_addresses(&state, PrimeOrder::Random, 42);
        assert_ne!(sequential, shuffled);
        shuffled.sort();
        let mut sorted_sequential = sequential.clone();
        sorted_sequential.sort();
        assert_eq!(shuffled, sorted_sequential);
    }
}
