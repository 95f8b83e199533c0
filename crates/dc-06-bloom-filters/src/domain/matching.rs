//! Which transactions a peer's filter selects.

use super::bloom_filter::BloomFilter;
use dc_02_ledger::{Block, Transaction, Verifiable};
use shared_types::Serializable;

/// True when the filter matches the transaction hash, an output's script
/// hash, a spent coin reference or a witness's script hash.
pub fn test_transaction(filter: &BloomFilter, tx: &Transaction) -> bool {
    filter.check(tx.hash().as_bytes())
        || tx
            .outputs()
            .iter()
            .any(|output| filter.check(output.script_hash.as_bytes()))
        || tx
            .inputs()
            .iter()
            .any(|input| filter.check(&input.to_array()))
        || tx
            .witnesses()
            .iter()
            .any(|witness| filter.check(witness.script_hash().as_bytes()))
}

/// One flag per transaction of `block`, in block order.
pub fn match_flags(filter: &BloomFilter, block: &Block) -> Vec<bool> {
    block
        .transactions
        .iter()
        .map(|tx| test_transaction(filter, tx))
        .collect()
}
