//! Parses `{first, last}` CLI-style arguments (decimal, keyword, or
//! keyword+offset) and clamps them against the known metadata range.
//! Grounded on `tools/database/src/adjust_database.rs`'s
//! plain-struct argument parsing (no `clap::Args` derive needed for a single
//! value with this shape).

use crate::config::{ChainId, Config};
use crate::error::{AidaError, Result};

const KEYWORDS: &[&str] =
    &["zero", "first", "last", "lastpatch", "opera", "istanbul", "muirglacier", "berlin", "london", "shanghai", "cancun", "prague"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offset {
    Plus(u64),
    Minus(u64),
    None,
}

fn split_offset(token: &str) -> (&str, Offset) {
    if let Some(pos) = token.find('+') {
        let (keyword, rest) = token.split_at(pos);
        if let Ok(n) = rest[1..].parse::<u64>() {
            return (keyword, Offset::Plus(n));
        }
    }
    if let Some(pos) = token.find('-') {
        let (keyword, rest) = token.split_at(pos);
        if let Ok(n) = rest[1..].parse::<u64>() {
            return (keyword, Offset::Minus(n));
        }
    }
    (token, Offset::None)
}

fn apply_offset(base: u64, offset: Offset) -> Result<u64> {
    match offset {
        Offset::None => Ok(base),
        Offset::Plus(n) => Ok(base + n),
        Offset::Minus(n) => base
            .checked_sub(n)
            .ok_or_else(|| AidaError::InvalidArgument(format!("offset underflow: {base}-{n}"))),
    }
}

/// Resolves one positional argument (`arg`) to a block height for
/// `chain_id`. `first`/`last`/`lastpatch` read from live metadata rather
/// than the static keyword table.
fn resolve_one(config: &Config, chain_id: ChainId, arg: &str, metadata_first: Option<u64>, metadata_last: Option<u64>) -> Result<u64> {
    if let Ok(n) = arg.parse::<u64>() {
        return Ok(n);
    }

    let (keyword, offset) = split_offset(arg);
    let lower = keyword.to_ascii_lowercase();
    if !KEYWORDS.contains(&lower.as_str()) {
        return Err(AidaError::InvalidArgument(format!("unknown block-range keyword: {arg}")));
    }

    let base = match lower.as_str() {
        "first" => metadata_first
            .ok_or_else(|| AidaError::InvalidArgument("no metadata FirstBlock available".into()))?,
        "last" | "lastpatch" => metadata_last
            .ok_or_else(|| AidaError::InvalidArgument("no metadata LastBlock available".into()))?,
        _ => config
            .keyword_table
            .lookup(chain_id, &lower)
            .ok_or_else(|| AidaError::InvalidArgument(format!("no base block for keyword {lower:?} on chain {chain_id}")))?,
    };
    apply_offset(base, offset)
}

/// Resolves `(first_arg, last_arg)` against `chain_id` and, when metadata is
/// present, clamps to the intersection of the requested and metadata-known
/// range. Fails when the ranges don't overlap or when `first > last` after
/// resolution/clamping.
pub fn resolve_block_range(
    config: &Config,
    chain_id: ChainId,
    first_arg: &str,
    last_arg: &str,
    metadata_first: Option<u64>,
    metadata_last: Option<u64>,
) -> Result<(u64, u64)> {
    let mut first = resolve_one(config, chain_id, first_arg, metadata_first, metadata_last)?;
    let mut last = resolve_one(config, chain_id, last_arg, metadata_first, metadata_last)?;

    if let (Some(mf), Some(ml)) = (metadata_first, metadata_last) {
        if last < mf || first > ml {
            return Err(AidaError::RangeMismatch {
                target_first: mf,
                target_last: ml,
                source_first: first,
                source_last: last,
            });
        }
        first = first.max(mf);
        last = last.min(ml);
    }

    if first > last {
        return Err(AidaError::InvalidArgument(format!("first ({first}) > last ({last})")));
    }
    Ok((first, last))
}
