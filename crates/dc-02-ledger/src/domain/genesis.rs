//! Native assets and the genesis block.

use super::block::{Block, Header};
use super::coin::TransactionOutput;
use super::errors::{LedgerError, LedgerResult};
use super::states::{AssetState, AssetType};
use super::transaction::Transaction;
use super::validators::consensus_address;
use super::witness::Witness;
use crate::config::ProtocolSettings;
use shared_crypto::{hash256, multisig_redeem_script, opcode, script_hash};
use shared_types::{Fixed8, UInt160, UInt256};
use std::sync::LazyLock;

pub const GENESIS_TIMESTAMP: u32 = 1_468_595_301;
pub const GENESIS_NONCE: u32 = 2_083_236_893;
pub const GOVERNING_TOKEN_TOTAL: i64 = 100_000_000;

static GOVERNING_TOKEN_ID: LazyLock<UInt256> =
    LazyLock::new(|| hash256(b"native asset: NEO, governing token, precision 0"));
static UTILITY_TOKEN_ID: LazyLock<UInt256> =
    LazyLock::new(|| hash256(b"native asset: GAS, utility token, precision 8"));

/// Asset whose holders vote and generate the utility token.
pub fn governing_token_id() -> UInt256 {
    *GOVERNING_TOKEN_ID
}

/// Asset that pays fees.
pub fn utility_token_id() -> UInt256 {
    *UTILITY_TOKEN_ID
}

fn native_asset(
    asset_id: UInt256,
    asset_type: AssetType,
    name: &str,
    amount: Fixed8,
    precision: u8,
) -> AssetState {
    AssetState {
        asset_id,
        asset_type,
        name: name.to_string(),
        amount,
        available: Fixed8::ZERO,
        precision,
        fee: Fixed8::ZERO,
        fee_address: UInt160::ZERO,
        owner: None,
        admin: script_hash(&[opcode::PUSHT]),
        issuer: UInt160::ZERO,
        expiration: u32::MAX,
        is_frozen: false,
    }
}

pub fn governing_token() -> LedgerResult<AssetState> {
    Ok(native_asset(
        governing_token_id(),
        AssetType::GoverningToken,
        "NEO",
        Fixed8::from_units(GOVERNING_TOKEN_TOTAL)?,
        0,
    ))
}

pub fn utility_token(settings: &ProtocolSettings) -> LedgerResult<AssetState> {
    Ok(native_asset(
        utility_token_id(),
        AssetType::UtilityToken,
        "GAS",
        Fixed8::from_units(settings.utility_token_total())?,
        8,
    ))
}

/// Block 0: a miner transaction handing the whole governing supply to the
/// majority multisig of the standby validators.
pub fn genesis_block(settings: &ProtocolSettings) -> LedgerResult<Block> {
    let standby = &settings.standby_validators;
    if standby.is_empty() {
        return Err(LedgerError::Genesis("no standby validators".into()));
    }
    let owners = multisig_redeem_script(standby.len() / 2 + 1, standby)
        .map_err(|e| LedgerError::Genesis(e.to_string()))?;
    let issue = TransactionOutput::new(
        governing_token_id(),
        Fixed8::from_units(GOVERNING_TOKEN_TOTAL)?,
        script_hash(&owners),
    );
    let miner = Transaction::miner(GENESIS_NONCE, vec![issue]);
    let header = Header {
        version: 0,
        prev_hash: UInt256::ZERO,
        merkle_root: UInt256::ZERO,
        timestamp: GENESIS_TIMESTAMP,
        index: 0,
        consensus_data: u64::from(GENESIS_NONCE),
        next_consensus: consensus_address(standby)?,
        witness: Witness::new(Vec::new(), vec![opcode::PUSHT]),
    };
    Ok(Block::new(header, vec![miner]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::KeyPair;
    use shared_types::Serializable;

    fn settings() -> ProtocolSettings {
        ProtocolSettings::for_testing(
            (1..=4u8)
                .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
                .collect(),
        )
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = genesis_block(&settings()).unwrap();
        let b = genesis_block(&settings()).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.index(), 0);
        assert!(a.transactions[0].is_miner());
        assert_eq!(Block::from_array(&a.to_array()).unwrap(), a);
    }

    #[test]
    fn test_genesis_requires_validators() {
        assert!(matches!(
            genesis_block(&ProtocolSettings::default()),
            Err(LedgerError::Genesis(_))
        ));
    }

    #[test]
    fn test_native_token_ids_differ() {
        assert_ne!(governing_token_id(), utility_token_id());
        assert_eq!(utility_token(&settings()).unwrap().precision, 8);
    }
}
