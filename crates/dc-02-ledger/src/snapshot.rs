//! # Ledger Snapshot
//!
//! One [`DataCache`] per record prefix plus the metadata singletons, all
//! reading through the same store view. Child snapshots isolate speculative
//! changes (script execution, validator previews) until merged.

use crate::config::ProtocolSettings;
use crate::domain::{
    validators, AccountState, AssetState, Block, BlockState, ContractState, Header,
    HeaderHashList, HashIndexState, HeightKey, LedgerError, LedgerResult, SpentCoinState,
    StorageItem, StorageKey, Transaction, TransactionOutput, TransactionState, UnspentCoinState,
    ValidatorState, ValidatorsCountState,
};
use crate::domain::CoinReference;
use crate::header_index::HeaderIndex;
use dc_03_state_cache::{DataCache, MetaDataCache, Store, StoreView, WriteBatch};
use shared_crypto::PublicKey;
use shared_types::{Fixed8, UInt160, UInt256};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod prefix {
    pub const BLOCK: u8 = 0x01;
    pub const TRANSACTION: u8 = 0x02;
    pub const ACCOUNT: u8 = 0x40;
    pub const UNSPENT_COIN: u8 = 0x44;
    pub const SPENT_COIN: u8 = 0x45;
    pub const VALIDATOR: u8 = 0x48;
    pub const ASSET: u8 = 0x4C;
    pub const CONTRACT: u8 = 0x50;
    pub const STORAGE: u8 = 0x70;
    pub const HEADER_HASH_LIST: u8 = 0x80;
    pub const VALIDATORS_COUNT: u8 = 0x90;
    pub const CURRENT_BLOCK: u8 = 0xC0;
    pub const CURRENT_HEADER: u8 = 0xC1;
}

/// A spent governing-token output whose generated utility token is unclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentCoin {
    pub output: TransactionOutput,
    pub start_height: u32,
    pub end_height: u32,
}

pub struct Snapshot {
    settings: Arc<ProtocolSettings>,
    header_index: Arc<HeaderIndex>,
    pub blocks: DataCache<UInt256, BlockState>,
    pub transactions: DataCache<UInt256, TransactionState>,
    pub accounts: DataCache<UInt160, AccountState>,
    pub unspent_coins: DataCache<UInt256, UnspentCoinState>,
    pub spent_coins: DataCache<UInt256, SpentCoinState>,
    pub validators: DataCache<PublicKey, ValidatorState>,
    pub assets: DataCache<UInt256, AssetState>,
    pub contracts: DataCache<UInt160, ContractState>,
    pub storages: DataCache<StorageKey, StorageItem>,
    pub header_hash_list: DataCache<HeightKey, HeaderHashList>,
    pub validators_count: MetaDataCache<ValidatorsCountState>,
    pub block_hash_index: MetaDataCache<HashIndexState>,
    pub header_hash_index: MetaDataCache<HashIndexState>,
}

impl Snapshot {
    pub fn new(
        view: Arc<dyn StoreView>,
        settings: Arc<ProtocolSettings>,
        header_index: Arc<HeaderIndex>,
    ) -> Self {
        Self {
            settings,
            header_index,
            blocks: DataCache::db(Arc::clone(&view), prefix::BLOCK),
            transactions: DataCache::db(Arc::clone(&view), prefix::TRANSACTION),
            accounts: DataCache::db(Arc::clone(&view), prefix::ACCOUNT),
            unspent_coins: DataCache::db(Arc::clone(&view), prefix::UNSPENT_COIN),
            spent_coins: DataCache::db(Arc::clone(&view), prefix::SPENT_COIN),
            validators: DataCache::db(Arc::clone(&view), prefix::VALIDATOR),
            assets: DataCache::db(Arc::clone(&view), prefix::ASSET),
            contracts: DataCache::db(Arc::clone(&view), prefix::CONTRACT),
            storages: DataCache::db(Arc::clone(&view), prefix::STORAGE),
            header_hash_list: DataCache::db(Arc::clone(&view), prefix::HEADER_HASH_LIST),
            validators_count: MetaDataCache::db(
                Arc::clone(&view),
                prefix::VALIDATORS_COUNT,
                ValidatorsCountState::default,
            ),
            block_hash_index: MetaDataCache::db(
                Arc::clone(&view),
                prefix::CURRENT_BLOCK,
                HashIndexState::default,
            ),
            header_hash_index: MetaDataCache::db(view, prefix::CURRENT_HEADER, HashIndexState::default),
        }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn header_index(&self) -> &Arc<HeaderIndex> {
        &self.header_index
    }

    /// Isolated overlay over the current contents of this snapshot.
    pub fn create_snapshot(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            header_index: Arc::clone(&self.header_index),
            blocks: self.blocks.create_snapshot(),
            transactions: self.transactions.create_snapshot(),
            accounts: self.accounts.create_snapshot(),
            unspent_coins: self.unspent_coins.create_snapshot(),
            spent_coins: self.spent_coins.create_snapshot(),
            validators: self.validators.create_snapshot(),
            assets: self.assets.create_snapshot(),
            contracts: self.contracts.create_snapshot(),
            storages: self.storages.create_snapshot(),
            header_hash_list: self.header_hash_list.create_snapshot(),
            validators_count: self.validators_count.create_snapshot(),
            block_hash_index: self.block_hash_index.create_snapshot(),
            header_hash_index: self.header_hash_index.create_snapshot(),
        }
    }

    /// Fold a child's tracked changes into this snapshot.
    pub fn merge(&mut self, child: Snapshot) -> LedgerResult<()> {
        self.blocks.merge(child.blocks)?;
        self.transactions.merge(child.transactions)?;
        self.accounts.merge(child.accounts)?;
        self.unspent_coins.merge(child.unspent_coins)?;
        self.spent_coins.merge(child.spent_coins)?;
        self.validators.merge(child.validators)?;
        self.assets.merge(child.assets)?;
        self.contracts.merge(child.contracts)?;
        self.storages.merge(child.storages)?;
        self.header_hash_list.merge(child.header_hash_list)?;
        self.validators_count.merge(child.validators_count)?;
        self.block_hash_index.merge(child.block_hash_index)?;
        self.header_hash_index.merge(child.header_hash_index)?;
        Ok(())
    }

    /// Write every tracked change to `store` as one batch.
    pub fn commit(&self, store: &dyn Store) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        self.blocks.commit_to(prefix::BLOCK, &mut batch);
        self.transactions.commit_to(prefix::TRANSACTION, &mut batch);
        self.accounts.commit_to(prefix::ACCOUNT, &mut batch);
        self.unspent_coins.commit_to(prefix::UNSPENT_COIN, &mut batch);
        self.spent_coins.commit_to(prefix::SPENT_COIN, &mut batch);
        self.validators.commit_to(prefix::VALIDATOR, &mut batch);
        self.assets.commit_to(prefix::ASSET, &mut batch);
        self.contracts.commit_to(prefix::CONTRACT, &mut batch);
        self.storages.commit_to(prefix::STORAGE, &mut batch);
        self.header_hash_list.commit_to(prefix::HEADER_HASH_LIST, &mut batch);
        self.validators_count.commit_to(prefix::VALIDATORS_COUNT, &mut batch);
        self.block_hash_index.commit_to(prefix::CURRENT_BLOCK, &mut batch);
        self.header_hash_index.commit_to(prefix::CURRENT_HEADER, &mut batch);
        store.write(batch)?;
        Ok(())
    }

    /// Height of the last persisted block, `None` before genesis.
    pub fn height(&self) -> Option<u32> {
        match self.block_hash_index.get() {
            Ok(state) if state.index != u32::MAX => Some(state.index),
            _ => None,
        }
    }

    pub fn current_block_hash(&self) -> LedgerResult<UInt256> {
        Ok(self.block_hash_index.get()?.hash)
    }

    pub fn current_header_hash(&self) -> LedgerResult<UInt256> {
        Ok(self.header_hash_index.get()?.hash)
    }

    pub fn block_hash(&self, height: u32) -> Option<UInt256> {
        self.header_index.get(height)
    }

    pub fn get_header(&self, hash: &UInt256) -> LedgerResult<Option<Header>> {
        Ok(self.blocks.try_get(hash)?.map(|s| s.trimmed_block.header))
    }

    pub fn get_header_by_height(&self, height: u32) -> LedgerResult<Option<Header>> {
        match self.block_hash(height) {
            Some(hash) => self.get_header(&hash),
            None => Ok(None),
        }
    }

    /// Full block with its transactions; `None` when only the header is stored.
    pub fn get_block(&self, hash: &UInt256) -> LedgerResult<Option<Block>> {
        let Some(state) = self.blocks.try_get(hash)? else {
            return Ok(None);
        };
        if !state.trimmed_block.is_block() {
            return Ok(None);
        }
        let mut transactions = Vec::with_capacity(state.trimmed_block.hashes.len());
        for tx_hash in &state.trimmed_block.hashes {
            let tx = self
                .get_transaction(tx_hash)?
                .ok_or(LedgerError::UnknownTransaction(*tx_hash))?;
            transactions.push(tx);
        }
        Ok(Some(Block {
            header: state.trimmed_block.header,
            transactions,
        }))
    }

    pub fn contains_block(&self, hash: &UInt256) -> LedgerResult<bool> {
        Ok(self
            .blocks
            .try_get(hash)?
            .is_some_and(|s| s.trimmed_block.is_block()))
    }

    pub fn get_transaction(&self, hash: &UInt256) -> LedgerResult<Option<Transaction>> {
        Ok(self.transactions.try_get(hash)?.map(|s| s.transaction))
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> LedgerResult<bool> {
        self.transactions.contains(hash).map_err(Into::into)
    }

    /// The output if it exists and is not spent.
    pub fn get_unspent(&self, hash: &UInt256, index: u16) -> LedgerResult<Option<TransactionOutput>> {
        match self.unspent_coins.try_get(hash)? {
            Some(coins) if !coins.is_spent(index) => Ok(self
                .get_transaction(hash)?
                .and_then(|tx| tx.outputs().get(usize::from(index)).cloned())),
            _ => Ok(None),
        }
    }

    pub fn is_double_spend(&self, tx: &Transaction) -> LedgerResult<bool> {
        let mut grouped: BTreeMap<UInt256, Vec<u16>> = BTreeMap::new();
        for input in tx.inputs() {
            grouped.entry(input.prev_hash).or_default().push(input.prev_index);
        }
        for (hash, indexes) in grouped {
            let Some(coins) = self.unspent_coins.try_get(&hash)? else {
                return Ok(true);
            };
            if indexes.iter().any(|i| coins.is_spent(*i)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validators elected by the stored votes.
    pub fn get_validators(&self) -> LedgerResult<Vec<PublicKey>> {
        let standby = &self.settings.standby_validators;
        let counts = self.validators_count.get()?;
        let count = validators::elected_count(&counts.votes, standby.len());
        let candidates = self
            .validators
            .find(&[])?
            .into_iter()
            .map(|(_, state)| state)
            .collect();
        Ok(validators::select_validators(candidates, standby, count))
    }

    /// Validators that would be elected once `pending` are persisted.
    pub fn get_validators_with(&self, pending: &[Transaction]) -> LedgerResult<Vec<PublicKey>> {
        if pending.is_empty() {
            return self.get_validators();
        }
        let mut preview = self.create_snapshot();
        let index = self.height().map_or(0, |h| h + 1);
        for tx in pending {
            preview.persist_transaction(tx, index)?;
        }
        preview.get_validators()
    }

    /// Running system fee total (whole units) up to and including `height`.
    pub fn get_sys_fee_amount(&self, height: u32) -> LedgerResult<i64> {
        match self.block_hash(height) {
            Some(hash) => self.get_sys_fee_amount_of(&hash),
            None => Ok(0),
        }
    }

    pub fn get_sys_fee_amount_of(&self, hash: &UInt256) -> LedgerResult<i64> {
        Ok(self
            .blocks
            .try_get(hash)?
            .map_or(0, |s| s.system_fee_amount))
    }

    /// Spent and still claimable governing outputs of transaction `hash`.
    pub fn get_unclaimed(&self, hash: &UInt256) -> LedgerResult<Option<BTreeMap<u16, SpentCoin>>> {
        let Some(tx_state) = self.transactions.try_get(hash)? else {
            return Ok(None);
        };
        let Some(spent) = self.spent_coins.try_get(hash)? else {
            return Ok(Some(BTreeMap::new()));
        };
        let mut unclaimed = BTreeMap::new();
        for (index, end_height) in spent.items {
            let output = tx_state
                .transaction
                .outputs()
                .get(usize::from(index))
                .cloned()
                .ok_or(LedgerError::MissingOutput { hash: *hash, index })?;
            unclaimed.insert(
                index,
                SpentCoin {
                    output,
                    start_height: tx_state.block_index,
                    end_height,
                },
            );
        }
        Ok(Some(unclaimed))
    }

    /// Utility token generated by the claimed outputs while they were held.
    ///
    /// With `ignore_claimed` unset, any reference that is not a spent,
    /// unclaimed governing output fails with `InvalidClaim`.
    pub fn calculate_bonus(&self, claims: &[CoinReference], ignore_claimed: bool) -> LedgerResult<Fixed8> {
        let mut grouped: BTreeMap<UInt256, Vec<u16>> = BTreeMap::new();
        for claim in claims {
            grouped.entry(claim.prev_hash).or_default().push(claim.prev_index);
        }
        let mut coins = Vec::new();
        for (hash, indexes) in grouped {
            let claimable = self.get_unclaimed(&hash)?.unwrap_or_default();
            if claimable.is_empty() {
                if ignore_claimed {
                    continue;
                }
                return Err(LedgerError::InvalidClaim(format!("{hash} has nothing to claim")));
            }
            for index in indexes {
                match claimable.get(&index) {
                    Some(coin) => coins.push(coin.clone()),
                    None if ignore_claimed => {}
                    None => {
                        return Err(LedgerError::InvalidClaim(format!(
                            "{hash}:{index} is not claimable"
                        )))
                    }
                }
            }
        }
        self.bonus_of(&coins)
    }

    fn bonus_of(&self, coins: &[SpentCoin]) -> LedgerResult<Fixed8> {
        let settings = &self.settings;
        let interval = settings.decrement_interval;
        let generation = &settings.generation_amount;
        let mut spans: BTreeMap<(u32, u32), Fixed8> = BTreeMap::new();
        for coin in coins {
            let total = spans.entry((coin.start_height, coin.end_height)).or_insert(Fixed8::ZERO);
            *total = total.checked_add(coin.output.value)?;
        }
        let mut claimed = Fixed8::ZERO;
        for ((start, end), value) in spans {
            let mut amount: i64 = 0;
            let mut ustart = start / interval;
            if (ustart as usize) < generation.len() {
                let mut istart = start % interval;
                let mut uend = end / interval;
                let mut iend = end % interval;
                if uend as usize >= generation.len() {
                    uend = generation.len() as u32;
                    iend = 0;
                }
                if iend == 0 {
                    uend = uend.saturating_sub(1);
                    iend = interval;
                }
                while ustart < uend {
                    amount += i64::from(interval - istart) * i64::from(generation[ustart as usize]);
                    ustart += 1;
                    istart = 0;
                }
                amount += (i64::from(iend) - i64::from(istart)) * i64::from(generation[ustart as usize]);
            }
            let fees_end = self.get_sys_fee_amount(end.saturating_sub(1))?;
            let fees_start = if start == 0 {
                0
            } else {
                self.get_sys_fee_amount(start - 1)?
            };
            amount += fees_end - fees_start;
            let units = Fixed8::from_raw(value.raw() / 100_000_000);
            claimed = claimed.checked_add(units.checked_mul_int(amount)?)?;
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::genesis;
    use dc_03_state_cache::MemoryStore;

    fn empty() -> (Arc<MemoryStore>, Snapshot) {
        let store = Arc::new(MemoryStore::new());
        let snapshot = Snapshot::new(
            store.snapshot(),
            Arc::new(ProtocolSettings::default()),
            Arc::new(HeaderIndex::new()),
        );
        (store, snapshot)
    }

    #[test]
    fn test_empty_chain_has_no_height() {
        let (_, snapshot) = empty();
        assert_eq!(snapshot.height(), None);
        assert_eq!(snapshot.get_sys_fee_amount(0).unwrap(), 0);
    }

    #[test]
    fn test_child_changes_need_merge_and_commit() {
        let (store, mut snapshot) = empty();
        let mut child = snapshot.create_snapshot();
        child
            .storages
            .add(StorageKey::new(UInt160::ZERO, b"k".to_vec()), StorageItem::default())
            .unwrap();
        assert_eq!(snapshot.storages.find(&[]).unwrap().len(), 0);
        snapshot.merge(child).unwrap();
        snapshot.commit(store.as_ref()).unwrap();

        let reread = Snapshot::new(
            store.snapshot(),
            Arc::new(ProtocolSettings::default()),
            Arc::new(HeaderIndex::new()),
        );
        assert_eq!(reread.storages.find(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_bonus_over_one_interval() {
        let (_, snapshot) = empty();
        let coin = SpentCoin {
            output: TransactionOutput::new(
                genesis::governing_token_id(),
                Fixed8::from_units(100).unwrap(),
                UInt160::ZERO,
            ),
            start_height: 0,
            end_height: 10,
        };
        // 10 blocks at 8 per block for 100 units, no fees
        assert_eq!(snapshot.bonus_of(&[coin]).unwrap(), Fixed8::from_raw(100 * 10 * 8));
    }

    #[test]
    fn test_bonus_rejects_unknown_claims_unless_ignored() {
        let (_, snapshot) = empty();
        let claim = CoinReference::new(UInt256::from([1; 32]), 0);
        assert!(matches!(
            snapshot.calculate_bonus(&[claim], false),
            Err(LedgerError::InvalidClaim(_))
        ));
        assert_eq!(snapshot.calculate_bonus(&[claim], true).unwrap(), Fixed8::ZERO);
    }
}
