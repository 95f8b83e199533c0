//! Protocol-wide constants a network agrees on.

use shared_crypto::PublicKey;
use shared_types::Fixed8;

/// GAS generated per block during each decrement interval.
pub const GENERATION_AMOUNT: [u32; 22] = [
    8, 7, 6, 5, 4, 3, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    /// Network magic carried in every message header.
    pub magic: u32,
    pub address_version: u8,
    /// Validators used until enough votes are cast, and at genesis.
    pub standby_validators: Vec<PublicKey>,
    /// `host:port` seeds for the first connections.
    pub seed_list: Vec<String>,
    pub seconds_per_block: u32,
    /// Blocks between generation-amount decrements.
    pub decrement_interval: u32,
    pub generation_amount: Vec<u32>,
    /// Maximum public keys in a vote list or validator set.
    pub max_validators: usize,
    /// Network fee below which a transaction counts as free.
    pub low_priority_threshold: Fixed8,
    /// GAS granted to every script execution before it is charged.
    pub free_gas: Fixed8,
    /// System fee for registering a validator.
    pub validator_registration_fee: Fixed8,
    /// Verify headers and block witnesses on import.
    pub verify_blocks: bool,
    pub memory_pool_max_transactions: usize,
    /// Low-priority transactions a primary packs into one block.
    pub max_free_transactions_per_block: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            magic: 0x0074_6E41,
            address_version: 0x17,
            standby_validators: Vec::new(),
            seed_list: Vec::new(),
            seconds_per_block: 15,
            decrement_interval: 2_000_000,
            generation_amount: GENERATION_AMOUNT.to_vec(),
            max_validators: 1024,
            low_priority_threshold: Fixed8::from_raw(100_000),
            free_gas: Fixed8::from_raw(10 * 100_000_000),
            validator_registration_fee: Fixed8::from_raw(1000 * 100_000_000),
            verify_blocks: true,
            memory_pool_max_transactions: 50_000,
            max_free_transactions_per_block: 20,
        }
    }
}

impl ProtocolSettings {
    /// Settings for a private network run by `validators`.
    pub fn for_testing(validators: Vec<PublicKey>) -> Self {
        Self {
            magic: 0x5445_5354,
            standby_validators: validators,
            seconds_per_block: 1,
            ..Self::default()
        }
    }

    /// Total utility token that will ever be generated.
    pub fn utility_token_total(&self) -> i64 {
        self.generation_amount
            .iter()
            .map(|a| i64::from(*a) * i64::from(self.decrement_interval))
            .sum()
    }
}
