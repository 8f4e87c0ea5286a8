//! Command implementations. Each function takes its parsed `clap::Args`
//! struct and calls straight into the `aida_db` library, converting
//! `aida_db::AidaError` into `anyhow::Error` at this boundary.

use anyhow::Context;

use aida_db::hash_index::{resolve_endpoint, scrape as run_scrape, Endpoint, HashIndex, RpcClient};
use aida_db::kv::OpenMode;
use aida_db::patch::apply_patch as run_apply_patch;
use aida_db::rollup::Rollup;
use aida_db::{Config, MetadataStore, Store};

use crate::cli::{ApplyPatchArgs, InfoArgs, ResolveRangeArgs, RollupArgs, ScrapeArgs};

pub fn info(args: InfoArgs) -> anyhow::Result<()> {
    let store = Store::open(&args.db_path, OpenMode::ReadOnly).context("opening store")?;
    let md = MetadataStore::new(&store);
    println!("chain_id:      {:?}", md.chain_id());
    println!("db_type:       {:?}", md.db_type());
    println!("first_block:   {:?}", md.first_block());
    println!("last_block:    {:?}", md.last_block());
    println!("first_epoch:   {:?}", md.first_epoch());
    println!("last_epoch:    {:?}", md.last_epoch());
    println!("has_hash_patch:{:?}", md.has_hash_patch());

    let index = HashIndex::new(&store);
    match index.first_block_hash() {
        Ok((block, hash)) => println!("first_block_hash: {block} {}", hex::encode(hash)),
        Err(e) => println!("first_block_hash: unavailable ({e})"),
    }
    match index.last_block_hash() {
        Ok((block, hash)) => println!("last_block_hash:  {block} {}", hex::encode(hash)),
        Err(e) => println!("last_block_hash:  unavailable ({e})"),
    }
    Ok(())
}

pub fn rollup(args: RollupArgs) -> anyhow::Result<()> {
    let store = Store::open(&args.db_path, OpenMode::ReadOnly).context("opening store")?;
    let rollup = Rollup::new(&store);
    let (state, deleted) = rollup.rollup(args.target).context("rolling up")?;
    println!("accounts:          {}", state.accounts.len());
    println!("destroyed_accounts:{}", deleted.len());
    Ok(())
}

pub fn resolve_range(args: ResolveRangeArgs) -> anyhow::Result<()> {
    let config = Config::default();
    let (metadata_first, metadata_last) = match &args.db_path {
        Some(path) => {
            let store = Store::open(path, OpenMode::ReadOnly).context("opening store")?;
            let md = MetadataStore::new(&store);
            (md.first_block(), md.last_block())
        }
        None => (None, None),
    };
    let (first, last) =
        aida_db::block_range::resolve_block_range(&config, args.chain_id, &args.first, &args.last, metadata_first, metadata_last)
            .context("resolving block range")?;
    println!("{first} {last}");
    Ok(())
}

pub fn apply_patch(args: ApplyPatchArgs) -> anyhow::Result<()> {
    let target = Store::open(&args.target_path, OpenMode::ReadWriteExisting).context("opening target store")?;
    let source = Store::open(&args.source_path, OpenMode::ReadOnly).context("opening source store")?;
    let config = Config::default();
    run_apply_patch(&target, &source, args.allow_disjoint_start, &config, None).context("applying patch")?;
    let md = MetadataStore::new(&target);
    println!("target now spans [{:?}, {:?}]", md.first_block(), md.last_block());
    Ok(())
}

pub fn scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    let store = Store::open(&args.db_path, OpenMode::ReadWrite).context("opening store")?;
    let index = HashIndex::new(&store);
    let endpoint = match args.rpc_url {
        Some(url) => Endpoint::Http(url),
        None => resolve_endpoint(&args.db_path, &args.https_fallback),
    };
    let client = RpcClient::connect(&endpoint).context("building rpc client")?;
    run_scrape(&index, &client, args.first_block, args.last_block).context("scraping hashes")?;
    println!("scraped blocks [{}, {}]", args.first_block, args.last_block);
    Ok(())
}
