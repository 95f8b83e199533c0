//! # Persist Effects
//!
//! How a block and each of its transactions change the state records:
//! coin states, balances, vote tallies, validator registration and claims.

use crate::domain::{
    genesis, AccountState, Block, BlockState, CoinReference, CoinState, HashIndexState,
    LedgerError, SpentCoinState, StateDescriptor, StateType, Transaction, TransactionData,
    TransactionState, UnspentCoinState, ValidatorState, FIELD_REGISTERED, FIELD_VOTES,
};
use crate::ports::ContractExecutor;
use crate::snapshot::Snapshot;
use crate::LedgerResult;
use shared_crypto::PublicKey;
use shared_types::{Fixed8, UInt256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Snapshot {
    /// Apply `block` on top of the current tip. Invocations run through
    /// `executor` in a child snapshot that is merged only if it halts.
    pub fn persist_block(&mut self, block: &Block, executor: &dyn ContractExecutor) -> LedgerResult<()> {
        let index = block.index();
        let previous_fee = if index == 0 {
            0
        } else {
            self.get_sys_fee_amount_of(&block.header.prev_hash)?
        };
        let block_fee = Fixed8::checked_sum(
            block
                .transactions
                .iter()
                .map(|tx| tx.system_fee(self.settings())),
        )?;
        self.blocks.put(
            block.hash(),
            BlockState {
                system_fee_amount: previous_fee + block_fee.raw() / Fixed8::ONE.raw(),
                trimmed_block: block.trim(),
            },
        )?;
        if index == 0 {
            let governing = genesis::governing_token()?;
            let utility = genesis::utility_token(self.settings())?;
            self.assets.put(governing.asset_id, governing)?;
            self.assets.put(utility.asset_id, utility)?;
        }
        for tx in &block.transactions {
            self.persist_transaction(tx, index)?;
            if matches!(tx.data(), TransactionData::Invocation { .. }) {
                let mut engine_snapshot = self.create_snapshot();
                if executor.execute(tx, &mut engine_snapshot) {
                    self.merge(engine_snapshot)?;
                } else {
                    debug!(tx = %tx.hash(), block_index = index, "Invocation faulted, state discarded");
                }
            }
        }
        *self.block_hash_index.get_and_change()? = HashIndexState {
            hash: block.hash(),
            index,
        };
        Ok(())
    }

    /// State changes of one transaction mined at `block_index`, except
    /// script execution.
    pub fn persist_transaction(&mut self, tx: &Transaction, block_index: u32) -> LedgerResult<()> {
        self.transactions.put(
            tx.hash(),
            TransactionState {
                block_index,
                transaction: tx.clone(),
            },
        )?;
        self.unspent_coins
            .put(tx.hash(), UnspentCoinState::confirmed(tx.outputs().len()))?;
        let governing = genesis::governing_token_id();

        for output in tx.outputs() {
            let account = self
                .accounts
                .get_and_change_or(&output.script_hash, || AccountState::new(output.script_hash))?;
            credit(&mut account.balances, output.asset_id, output.value)?;
            if output.asset_id == governing && !account.votes.is_empty() {
                let votes = account.votes.clone();
                self.add_vote_weight(&votes, output.value)?;
            }
        }

        let mut spent: BTreeMap<UInt256, Vec<u16>> = BTreeMap::new();
        for input in tx.inputs() {
            spent.entry(input.prev_hash).or_default().push(input.prev_index);
        }
        for (prev_hash, indexes) in spent {
            let prev = self
                .transactions
                .try_get(&prev_hash)?
                .ok_or(LedgerError::UnknownTransaction(prev_hash))?;
            for index in indexes {
                let output = prev
                    .transaction
                    .outputs()
                    .get(usize::from(index))
                    .cloned()
                    .ok_or(LedgerError::MissingOutput {
                        hash: prev_hash,
                        index,
                    })?;
                let coins = self.unspent_coins.get_and_change(&prev_hash)?;
                if let Some(coin) = coins.items.get_mut(usize::from(index)) {
                    coin.insert(CoinState::SPENT);
                }
                if output.asset_id == governing {
                    self.spent_coins
                        .get_and_change_or(&prev_hash, || SpentCoinState {
                            transaction_hash: prev_hash,
                            transaction_height: prev.block_index,
                            items: BTreeMap::new(),
                        })?
                        .items
                        .insert(index, block_index);
                }
                let account = self
                    .accounts
                    .get_and_change_or(&output.script_hash, || AccountState::new(output.script_hash))?;
                let votes = account.votes.clone();
                credit(&mut account.balances, output.asset_id, output.value.checked_neg()?)?;
                if output.asset_id == governing && !votes.is_empty() {
                    self.add_vote_weight(&votes, output.value.checked_neg()?)?;
                }
            }
        }

        match tx.data() {
            TransactionData::Claim { claims } => self.remove_claims(claims)?,
            TransactionData::Enrollment { public_key } => {
                self.validators
                    .get_and_change_or(public_key, || ValidatorState::new(*public_key))?
                    .registered = true;
            }
            TransactionData::State { descriptors } => {
                for descriptor in descriptors {
                    match descriptor.state_type {
                        StateType::Account => self.process_account(descriptor)?,
                        StateType::Validator => self.process_validator(descriptor)?,
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Move `delta` of voting weight onto each of `votes` and onto the
    /// tally for vote lists of that length.
    fn add_vote_weight(&mut self, votes: &[PublicKey], delta: Fixed8) -> LedgerResult<()> {
        for key in votes {
            let validator = self
                .validators
                .get_and_change_or(key, || ValidatorState::new(*key))?;
            validator.votes = validator.votes.checked_add(delta)?;
            if !validator.registered && validator.votes == Fixed8::ZERO {
                self.validators.delete(key)?;
            }
        }
        if let Some(slot) = votes.len().checked_sub(1) {
            let counts = self.validators_count.get_and_change()?;
            if let Some(tally) = counts.votes.get_mut(slot) {
                *tally = tally.checked_add(delta)?;
            }
        }
        Ok(())
    }

    fn remove_claims(&mut self, claims: &[CoinReference]) -> LedgerResult<()> {
        let mut grouped: BTreeMap<UInt256, Vec<u16>> = BTreeMap::new();
        for claim in claims {
            grouped.entry(claim.prev_hash).or_default().push(claim.prev_index);
        }
        for (hash, indexes) in grouped {
            if !self.spent_coins.contains(&hash)? {
                continue;
            }
            let spent = self.spent_coins.get_and_change(&hash)?;
            for index in indexes {
                spent.items.remove(&index);
            }
            if spent.items.is_empty() {
                self.spent_coins.delete(&hash)?;
            }
        }
        Ok(())
    }

    fn process_account(&mut self, descriptor: &StateDescriptor) -> LedgerResult<()> {
        if descriptor.field != FIELD_VOTES {
            return Ok(());
        }
        let hash = descriptor.account_hash()?;
        let mut keys = descriptor.vote_keys(self.settings().max_validators)?;
        let mut seen = BTreeSet::new();
        keys.retain(|k| seen.insert(*k));

        let account = self
            .accounts
            .get_and_change_or(&hash, || AccountState::new(hash))?;
        let balance = account.balance(&genesis::governing_token_id());
        let old = std::mem::replace(&mut account.votes, keys.clone());
        self.add_vote_weight(&old, balance.checked_neg()?)?;
        self.add_vote_weight(&keys, balance)?;
        Ok(())
    }

    fn process_validator(&mut self, descriptor: &StateDescriptor) -> LedgerResult<()> {
        if descriptor.field != FIELD_REGISTERED {
            return Ok(());
        }
        let key = descriptor.validator_key()?;
        let registered = descriptor.registered_flag();
        let validator = self
            .validators
            .get_and_change_or(&key, || ValidatorState::new(key))?;
        validator.registered = registered;
        if !registered && validator.votes == Fixed8::ZERO {
            self.validators.delete(&key)?;
        }
        Ok(())
    }
}

fn credit(
    balances: &mut BTreeMap<UInt256, Fixed8>,
    asset_id: UInt256,
    delta: Fixed8,
) -> LedgerResult<()> {
    let balance = balances.entry(asset_id).or_insert(Fixed8::ZERO);
    *balance = balance.checked_add(delta)?;
    Ok(())
}
