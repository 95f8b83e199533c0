//! # Ledger Rules
//!
//! Context-dependent checks for transactions and blocks. Structural checks
//! happen at decode time; everything here needs chain state and returns a
//! plain `bool`, logging the reason a candidate was turned away.

use crate::domain::{
    genesis, validators, Block, CoinReference, StateType, Transaction,
    TransactionData, TransactionResult, MAX_TRANSACTION_SIZE,
};
use crate::ports::WitnessVerifier;
use crate::snapshot::Snapshot;
use crate::LedgerResult;
use shared_types::{Fixed8, Serializable};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Transaction {
    /// Full validity against `snapshot` and the other transactions in
    /// `mempool`. `self` may appear in `mempool`; it is skipped by hash.
    pub fn verify(
        &self,
        snapshot: &Snapshot,
        mempool: &[&Transaction],
        verifier: &dyn WitnessVerifier,
    ) -> bool {
        let others: Vec<&Transaction> = mempool
            .iter()
            .copied()
            .filter(|tx| tx.hash() != self.hash())
            .collect();
        match self.rejection(snapshot, &others) {
            Ok(None) => {}
            Ok(Some(reason)) => {
                debug!(tx = %self.hash(), reason, "Transaction rejected");
                return false;
            }
            Err(e) => {
                debug!(tx = %self.hash(), error = %e, "Transaction rejected");
                return false;
            }
        }
        if !verifier.verify_witnesses(self, snapshot) {
            debug!(tx = %self.hash(), "Transaction witness check failed");
            return false;
        }
        true
    }

    fn rejection(
        &self,
        snapshot: &Snapshot,
        others: &[&Transaction],
    ) -> LedgerResult<Option<&'static str>> {
        if let Some(reason) = self.kind_rejection(snapshot)? {
            return Ok(Some(reason));
        }
        if self.size() > MAX_TRANSACTION_SIZE {
            return Ok(Some("oversized"));
        }
        let inputs: BTreeSet<&CoinReference> = self.inputs().iter().collect();
        if inputs.len() != self.inputs().len() {
            return Ok(Some("duplicate inputs"));
        }
        if others
            .iter()
            .flat_map(|tx| tx.inputs())
            .any(|input| inputs.contains(input))
        {
            return Ok(Some("input spent by a pooled transaction"));
        }
        if snapshot.is_double_spend(self)? {
            return Ok(Some("double spend"));
        }
        if let Some(reason) = self.output_rejection(snapshot)? {
            return Ok(Some(reason));
        }
        let results = self.transaction_results(snapshot)?;
        if let Some(reason) = self.result_rejection(snapshot, &results) {
            return Ok(Some(reason));
        }
        let ecdh = self
            .attributes()
            .iter()
            .filter(|a| a.usage.is_ecdh())
            .count();
        if ecdh > 1 {
            return Ok(Some("more than one ECDH attribute"));
        }
        if let TransactionData::Claim { claims } = self.data() {
            return self.claim_rejection(snapshot, others, claims, &results);
        }
        Ok(None)
    }

    /// Checks a kind adds in front of the common rules.
    fn kind_rejection(&self, snapshot: &Snapshot) -> LedgerResult<Option<&'static str>> {
        match self.data() {
            TransactionData::Enrollment { .. } => Ok(Some("enrollment is disabled")),
            TransactionData::Invocation { gas, .. } => {
                if gas.raw() % Fixed8::ONE.raw() != 0 {
                    return Ok(Some("fractional invocation gas"));
                }
                Ok(None)
            }
            TransactionData::State { descriptors } => {
                for descriptor in descriptors {
                    if descriptor.state_type == StateType::Account
                        && !account_vote_allowed(snapshot, descriptor)?
                    {
                        return Ok(Some("vote not allowed"));
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn output_rejection(&self, snapshot: &Snapshot) -> LedgerResult<Option<&'static str>> {
        let next_height = snapshot.height().map_or(0, |h| h + 1);
        let mut by_asset: BTreeMap<_, Vec<Fixed8>> = BTreeMap::new();
        for output in self.outputs() {
            by_asset.entry(output.asset_id).or_default().push(output.value);
        }
        for (asset_id, values) in by_asset {
            let Some(asset) = snapshot.assets.try_get(&asset_id)? else {
                return Ok(Some("unknown asset"));
            };
            if asset.expiration <= next_height && !asset.asset_type.is_native() {
                return Ok(Some("asset expired"));
            }
            if values
                .iter()
                .any(|v| !v.is_positive() || !v.fits_precision(asset.precision))
            {
                return Ok(Some("output amount exceeds asset precision"));
            }
        }
        Ok(None)
    }

    fn result_rejection(
        &self,
        snapshot: &Snapshot,
        results: &[TransactionResult],
    ) -> Option<&'static str> {
        let utility = genesis::utility_token_id();
        let destroyed: Vec<&TransactionResult> =
            results.iter().filter(|r| r.amount.is_positive()).collect();
        if destroyed.len() > 1 {
            return Some("more than one asset destroyed");
        }
        if destroyed.first().is_some_and(|r| r.asset_id != utility) {
            return Some("only the utility token may be destroyed");
        }
        let system_fee = self.system_fee(snapshot.settings());
        if system_fee.is_positive() && destroyed.first().map_or(true, |r| r.amount < system_fee) {
            return Some("system fee not covered");
        }
        let mut issued = results.iter().filter(|r| r.amount.is_negative());
        match self.data() {
            TransactionData::Miner { .. } | TransactionData::Claim { .. } => {
                if issued.any(|r| r.asset_id != utility) {
                    return Some("issues an asset other than the utility token");
                }
            }
            _ => {
                if issued.next().is_some() {
                    return Some("issues assets");
                }
            }
        }
        None
    }

    fn claim_rejection(
        &self,
        snapshot: &Snapshot,
        others: &[&Transaction],
        claims: &[CoinReference],
        results: &[TransactionResult],
    ) -> LedgerResult<Option<&'static str>> {
        let distinct: BTreeSet<&CoinReference> = claims.iter().collect();
        if distinct.len() != claims.len() {
            return Ok(Some("duplicate claims"));
        }
        if others
            .iter()
            .flat_map(|tx| tx.claims())
            .any(|claim| distinct.contains(claim))
        {
            return Ok(Some("claim made by a pooled transaction"));
        }
        let utility = genesis::utility_token_id();
        let Some(result) = results.iter().find(|r| r.asset_id == utility) else {
            return Ok(Some("claim produces no utility token"));
        };
        if result.amount.is_positive() {
            return Ok(Some("claim destroys utility token"));
        }
        let bonus = match snapshot.calculate_bonus(claims, false) {
            Ok(bonus) => bonus,
            Err(e) => {
                debug!(tx = %self.hash(), error = %e, "Claim bonus unavailable");
                return Ok(Some("claim bonus unavailable"));
            }
        };
        if bonus != result.amount.checked_neg()? {
            return Ok(Some("claimed amount differs from bonus"));
        }
        Ok(None)
    }
}

fn account_vote_allowed(
    snapshot: &Snapshot,
    descriptor: &crate::domain::StateDescriptor,
) -> LedgerResult<bool> {
    let account_hash = descriptor.account_hash()?;
    let account = snapshot.accounts.try_get(&account_hash)?;
    if account.as_ref().is_some_and(|a| a.is_frozen) {
        return Ok(false);
    }
    let keys = descriptor.vote_keys(snapshot.settings().max_validators)?;
    if keys.is_empty() {
        return Ok(true);
    }
    let governing = genesis::governing_token_id();
    if account.map_or(true, |a| a.balance(&governing) == Fixed8::ZERO) {
        return Ok(false);
    }
    let standby: BTreeSet<_> = snapshot.settings().standby_validators.iter().collect();
    for key in &keys {
        if standby.contains(key) {
            continue;
        }
        if !snapshot.validators.try_get(key)?.is_some_and(|v| v.registered) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Utility token the non-miner transactions pay beyond their system fees.
pub fn calculate_net_fee(transactions: &[Transaction], snapshot: &Snapshot) -> LedgerResult<Fixed8> {
    let mut total = Fixed8::ZERO;
    for tx in transactions {
        total = total.checked_add(tx.network_fee(snapshot)?)?;
    }
    Ok(total)
}

impl Block {
    /// Header checks plus every rule a proposed block must pass: the next
    /// consensus address follows from its transactions, each transaction
    /// verifies against the rest, and the miner collects exactly the
    /// network fees.
    pub fn verify_completely(&self, snapshot: &Snapshot, verifier: &dyn WitnessVerifier) -> bool {
        if !self.verify(snapshot, verifier) {
            return false;
        }
        match self.check_contents(snapshot, verifier) {
            Ok(None) => true,
            Ok(Some(reason)) => {
                debug!(block = %self.hash(), index = self.index(), reason, "Block rejected");
                false
            }
            Err(e) => {
                debug!(block = %self.hash(), error = %e, "Block rejected");
                false
            }
        }
    }

    fn check_contents(
        &self,
        snapshot: &Snapshot,
        verifier: &dyn WitnessVerifier,
    ) -> LedgerResult<Option<&'static str>> {
        let next = snapshot.get_validators_with(&self.transactions)?;
        if validators::consensus_address(&next)? != self.header.next_consensus {
            return Ok(Some("next consensus mismatch"));
        }
        let pool: Vec<&Transaction> = self.transactions.iter().collect();
        if self.transactions.iter().any(|tx| !tx.verify(snapshot, &pool, verifier)) {
            return Ok(Some("contains an invalid transaction"));
        }
        let utility = genesis::utility_token_id();
        let reward = Fixed8::checked_sum(
            self.transactions
                .iter()
                .filter(|tx| tx.is_miner())
                .flat_map(|tx| tx.outputs())
                .filter(|o| o.asset_id == utility)
                .map(|o| o.value),
        )?;
        if reward != calculate_net_fee(&self.transactions, snapshot)? {
            return Ok(Some("miner reward differs from network fee"));
        }
        Ok(None)
    }
}
