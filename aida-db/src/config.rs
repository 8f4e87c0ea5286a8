//! Process-wide, immutable configuration, built once at startup and passed
//! by reference from then on rather than held in module globals.

use std::collections::HashMap;

/// A chain identifier drawn from a known set, or left unconstrained for
/// chains this crate doesn't recognize by name.
pub type ChainId = u64;

/// Known chain ids used by the keyword table and patches-repository map.
pub mod chain_ids {
    use super::ChainId;

    pub const SONIC_MAINNET: ChainId = 146;
    pub const OPERA_MAINNET: ChainId = 250;
    pub const OPERA_TESTNET: ChainId = 4002;
    pub const ETHEREUM_MAINNET: ChainId = 1;
    pub const HOLESKY: ChainId = 17000;
    pub const HOODI: ChainId = 560048;
    pub const SEPOLIA: ChainId = 11155111;
}

/// A single block-range keyword resolved to a base block height for a given
/// chain. Hard-fork names beyond the well-known ones resolve to `None`
/// rather than panicking.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    entries: HashMap<(ChainId, String), u64>,
}

impl KeywordTable {
    pub fn insert(&mut self, chain_id: ChainId, keyword: &str, block: u64) {
        self.entries.insert((chain_id, keyword.to_ascii_lowercase()), block);
    }

    pub fn lookup(&self, chain_id: ChainId, keyword: &str) -> Option<u64> {
        self.entries.get(&(chain_id, keyword.to_ascii_lowercase())).copied()
    }
}

/// Process-wide configuration, built once at startup and passed by
/// reference from then on.
#[derive(Debug, Clone)]
pub struct Config {
    pub keyword_table: KeywordTable,
    pub patches_repo_urls: HashMap<ChainId, String>,
    /// Number of bulk-load operations per segment before a forced
    /// `Close`/`StartBulkLoad` cycle.
    pub operation_threshold: u64,
    /// Seed for the random-order priming shuffle. Negative values are
    /// regenerated to a positive value at construction time.
    pub random_seed: i64,
    pub ethereum_family_chains: Vec<ChainId>,
}

impl Config {
    /// Chains that do not derive epochs via RPC and so skip `findEpochs`
    /// during metadata generation and merge.
    pub fn is_ethereum_family(&self, chain_id: ChainId) -> bool {
        self.ethereum_family_chains.contains(&chain_id)
    }

    pub fn patches_repo_url(&self, chain_id: ChainId) -> Option<&str> {
        self.patches_repo_urls.get(&chain_id).map(String::as_str)
    }
}

impl Default for Config {
    fn default() -> Self {
        use chain_ids::*;

        let mut keyword_table = KeywordTable::default();
        keyword_table.insert(OPERA_MAINNET, "zero", 0);
        keyword_table.insert(OPERA_MAINNET, "opera", 4_564_026);
        keyword_table.insert(OPERA_MAINNET, "istanbul", 4_564_026);
        keyword_table.insert(OPERA_MAINNET, "muirglacier", 4_564_026);
        keyword_table.insert(OPERA_MAINNET, "berlin", 37_455_223);
        keyword_table.insert(OPERA_MAINNET, "london", 37_534_833);
        keyword_table.insert(OPERA_TESTNET, "zero", 0);
        keyword_table.insert(OPERA_TESTNET, "opera", 479_327);
        keyword_table.insert(OPERA_TESTNET, "london", 7_513_335);

        let mut patches_repo_urls = HashMap::new();
        patches_repo_urls.insert(SONIC_MAINNET, "https://aida-db.repo.sonic/sonic-mainnet".to_string());
        patches_repo_urls.insert(OPERA_MAINNET, "https://aida-db.repo.sonic/opera-mainnet".to_string());
        patches_repo_urls.insert(OPERA_TESTNET, "https://aida-db.repo.sonic/opera-testnet".to_string());
        patches_repo_urls.insert(ETHEREUM_MAINNET, "https://aida-db.repo.sonic/ethereum".to_string());
        patches_repo_urls.insert(HOLESKY, "https://aida-db.repo.sonic/holesky".to_string());
        patches_repo_urls.insert(HOODI, "https://aida-db.repo.sonic/hoodi".to_string());
        patches_repo_urls.insert(SEPOLIA, "https://aida-db.repo.sonic/sepolia".to_string());

        Self {
            keyword_table,
            patches_repo_urls,
            operation_threshold: 10_000,
            random_seed: 42,
            ethereum_family_chains: vec![ETHEREUM_MAINNET, HOLESKY, HOODI, SEPOLIA],
        }
    }
}

/// Regenerates a negative seed to a positive value.
pub fn normalize_seed(seed: i64) -> u64 {
    if seed < 0 {
        seed.unsigned_abs()
    } else {
        seed as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_seed_normalizes_positive() {
        assert_eq!(normalize_seed(-7), 7);
        assert_eq!(normalize_seed(7), 7);
        assert_eq!(normalize_seed(0), 0);
    }

    #[test]
    fn keyword_lookup_is_case_insensitive() {
        let config = Config::default();
        assert_eq!(
            config.keyword_table.lookup(chain_ids::OPERA_MAINNET, "OpeRa"),
            config.keyword_table.lookup(chain_ids::OPERA_MAINNET, "opera"),
        );
    }
}
