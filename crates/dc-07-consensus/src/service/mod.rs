//! # Consensus Service
//!
//! Drives one [`ConsensusContext`] through the dBFT round:
//!
//! - the primary proposes when its timer fires (`PrepareRequest`)
//! - backups check the proposal, gather its transactions and answer with
//!   their signature (`PrepareResponse`)
//! - whoever holds `m` signatures first assembles and relays the block
//! - a timeout or a bad proposal asks for the next view (`ChangeView`);
//!   once `m` validators expect the same view the round restarts there
//!
//! Every handler takes the context lock for its whole duration, so round
//! transitions are strictly sequential. Errors inside a handler are
//! logged and the triggering message is dropped.

pub mod events;

#[cfg(test)]
mod tests;

pub use events::ConsensusEvent;

use crate::config::ConsensusConfig;
use crate::domain::{
    ConsensusContext, ConsensusError, ConsensusMessage, ConsensusResult, ConsensusState,
    MessageBody, PrepareRequest, CONSENSUS_VERSION,
};
use crate::ports::{Clock, ConsensusRelay};
use dc_01_peer_network::{InventoryItem, NetworkEvent};
use dc_02_ledger::{
    genesis, Block, Blockchain, ConsensusPayload, LedgerEvent, Transaction, TransactionOutput,
    Verifiable,
};
use dc_05_mempool::MemoryPool;
use parking_lot::Mutex;
use rand::Rng;
use shared_bus::{EventPublisher, InMemoryEventBus, Subscription};
use shared_crypto::{signature_contract_hash, KeyPair, Signature};
use shared_types::{Fixed8, Serializable, UInt256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest wait a timer is armed for.
const MAX_TIMER_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Everything the service is wired to.
pub struct ConsensusDependencies {
    pub chain: Arc<Blockchain>,
    pub mempool: Arc<MemoryPool>,
    pub relay: Arc<dyn ConsensusRelay>,
    pub clock: Arc<dyn Clock>,
    /// `None` runs the node as an observer.
    pub key_pair: Option<KeyPair>,
    pub config: ConsensusConfig,
}

/// The single armed round timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub block_index: u32,
    pub view: u8,
    pub delay: Duration,
    pub deadline: Instant,
}

pub struct ConsensusService {
    config: ConsensusConfig,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    relay: Arc<dyn ConsensusRelay>,
    clock: Arc<dyn Clock>,
    context: Mutex<ConsensusContext>,
    timer: Mutex<Option<Timer>>,
    timer_changed: Notify,
    block_received: Mutex<Instant>,
    events: InMemoryEventBus<ConsensusEvent>,
}

impl ConsensusService {
    pub fn new(deps: ConsensusDependencies) -> Self {
        Self {
            config: deps.config,
            chain: deps.chain,
            mempool: deps.mempool,
            relay: deps.relay,
            clock: deps.clock,
            context: Mutex::new(ConsensusContext::new(deps.key_pair)),
            timer: Mutex::new(None),
            timer_changed: Notify::new(),
            block_received: Mutex::new(Instant::now()),
            events: InMemoryEventBus::new(),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn subscribe(&self) -> Subscription<ConsensusEvent> {
        self.events.subscribe()
    }

    /// The armed timer, if any.
    pub fn timer(&self) -> Option<Timer> {
        *self.timer.lock()
    }

    /// Run `f` with the context locked.
    pub fn with_context<R>(&self, f: impl FnOnce(&ConsensusContext) -> R) -> R {
        f(&self.context.lock())
    }

    /// Begin consensus at the block after the current tip.
    pub fn start(&self) -> ConsensusResult<()> {
        info!("Consensus started");
        self.relay.synchronize_memory_pool();
        let mut context = self.context.lock();
        self.initialize(&mut context, 0)
    }

    pub fn on_persist_completed(&self, block: &Block) {
        info!(block_index = block.index(), hash = %block.hash(), "Persisted block");
        *self.block_received.lock() = Instant::now();
        let mut context = self.context.lock();
        if let Err(error) = self.initialize(&mut context, 0) {
            error!(%error, "Failed to start the next round");
        }
    }

    /// The timer armed for `block_index` at `view` fired.
    pub fn on_timeout(&self, block_index: u32, view: u8) {
        let mut context = self.context.lock();
        if context.block_index != block_index || context.view_number != view {
            return;
        }
        info!(
            block_index,
            view,
            state = %context.state,
            "Round timeout"
        );
        if let Err(error) = self.handle_timeout(&mut context) {
            warn!(%error, block_index, view, "Timeout handling failed");
        }
    }

    /// A consensus payload that passed the relay gate.
    pub fn on_consensus_payload(&self, payload: &ConsensusPayload) {
        let mut context = self.context.lock();
        if let Err(error) = self.handle_payload(&mut context, payload) {
            debug!(
                %error,
                block_index = payload.block_index,
                validator = payload.validator_index,
                "Consensus payload dropped"
            );
        }
    }

    /// A transaction arrived from the network; it may complete a proposal.
    pub fn on_transaction(&self, tx: &Transaction) {
        if tx.is_miner() {
            return;
        }
        let mut context = self.context.lock();
        let state = context.state;
        if !state.contains(ConsensusState::BACKUP)
            || !state.contains(ConsensusState::REQUEST_RECEIVED)
            || state.contains(ConsensusState::SIGNATURE_SENT)
            || state.contains(ConsensusState::VIEW_CHANGING)
            || state.contains(ConsensusState::BLOCK_SENT)
        {
            return;
        }
        let hash = tx.hash();
        let proposed = context
            .transaction_hashes
            .as_ref()
            .is_some_and(|hashes| hashes.contains(&hash));
        if !proposed || context.transactions.contains_key(&hash) {
            return;
        }
        if let Err(error) = self.add_transaction(&mut context, tx.clone(), true) {
            warn!(%error, tx = %hash, "Adding proposed transaction failed");
        }
    }

    /// Start, then follow the ledger, the network and the round timer
    /// until `shutdown`.
    pub async fn run(
        self: Arc<Self>,
        mut network: Subscription<NetworkEvent>,
        shutdown: CancellationToken,
    ) {
        let mut ledger = self.chain.subscribe();
        if let Err(error) = self.start() {
            error!(%error, "Consensus failed to start");
            return;
        }
        loop {
            let armed = self.timer();
            let expiry = async move {
                match armed {
                    Some(timer) => tokio::time::sleep_until(timer.deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.timer_changed.notified() => {}
                _ = expiry => {
                    let fired = {
                        let mut slot = self.timer.lock();
                        if *slot == armed { slot.take() } else { None }
                    };
                    if let Some(timer) = fired {
                        self.on_timeout(timer.block_index, timer.view);
                    }
                }
                event = ledger.recv() => match event {
                    Some(LedgerEvent::PersistCompleted { block }) => {
                        self.on_persist_completed(&block);
                    }
                    None => {
                        warn!("Ledger event bus closed, consensus stopping");
                        break;
                    }
                },
                event = network.recv() => match event {
                    Some(NetworkEvent::InventoryReceived { item }) => match item.as_ref() {
                        InventoryItem::Consensus(payload) => self.on_consensus_payload(payload),
                        InventoryItem::Transaction(tx) => self.on_transaction(tx),
                        InventoryItem::Block(_) => {}
                    },
                    Some(_) => {}
                    None => {
                        warn!("Network event bus closed, consensus stopping");
                        break;
                    }
                },
            }
        }
        info!("Consensus stopped");
    }

    fn initialize(&self, context: &mut ConsensusContext, view: u8) -> ConsensusResult<()> {
        if view == 0 {
            context.reset(&self.chain)?;
        } else {
            context.change_view(view);
        }
        let Some(my_index) = context.my_index else {
            debug!(block_index = context.block_index, "Not a validator, observing");
            self.clear_timer();
            return Ok(());
        };
        info!(
            block_index = context.block_index,
            view,
            index = my_index,
            role = context.role(),
            "Initialize consensus"
        );
        if context.is_primary() {
            context.state.insert(ConsensusState::PRIMARY);
            let elapsed = self.block_received.lock().elapsed();
            self.set_timer(context, self.config.seconds_per_block.saturating_sub(elapsed));
        } else {
            context.state.insert(ConsensusState::BACKUP);
            self.set_timer(context, self.config.view_timeout(view));
        }
        self.events.publish(ConsensusEvent::RoundStarted {
            block_index: context.block_index,
            view_number: view,
        });
        Ok(())
    }

    fn handle_timeout(&self, context: &mut ConsensusContext) -> ConsensusResult<()> {
        let state = context.state;
        if state.contains(ConsensusState::PRIMARY) && !state.contains(ConsensusState::REQUEST_SENT) {
            info!(
                block_index = context.block_index,
                view = context.view_number,
                "Sending prepare request"
            );
            context.state.insert(ConsensusState::REQUEST_SENT);
            if !state.contains(ConsensusState::SIGNATURE_SENT) {
                self.fill_context(context)?;
                context.timestamp = self.clock.now().max(context.prev_timestamp + 1);
                context
                    .sign_header()
                    .ok_or(ConsensusError::NotValidator(context.block_index))?;
            }
            let request = context
                .make_prepare_request()
                .ok_or(ConsensusError::NoProposal(context.block_index))?;
            self.send(request);
            let view = context.view_number;
            self.set_timer(context, self.config.view_timeout(view));
            self.check_signatures(context);
            Ok(())
        } else if state.contains(ConsensusState::PRIMARY) || state.contains(ConsensusState::BACKUP) {
            self.request_change_view(context)
        } else {
            Ok(())
        }
    }

    /// Build the primary's proposal from the memory pool.
    fn fill_context(&self, context: &mut ConsensusContext) -> ConsensusResult<()> {
        let mut transactions = self.mempool.get_for_block();
        let net_fee = self.chain.calculate_net_fee(&transactions)?;
        let outputs = match context.public_key() {
            Some(key) if net_fee != Fixed8::ZERO => vec![TransactionOutput::new(
                genesis::utility_token_id(),
                net_fee,
                signature_contract_hash(&key),
            )],
            _ => Vec::new(),
        };
        let mut rng = rand::thread_rng();
        let (nonce, miner) = loop {
            let nonce: u64 = rng.gen();
            let miner = Transaction::miner(nonce as u32, outputs.clone());
            if !self.chain.contains_transaction(&miner.hash())? {
                break (nonce, miner);
            }
        };
        transactions.insert(0, miner);
        let validators = self.chain.get_next_block_validators(&transactions)?;
        let next_consensus = self.chain.get_consensus_address(&validators)?;
        context.propose(nonce, next_consensus, transactions);
        Ok(())
    }

    fn handle_payload(
        &self,
        context: &mut ConsensusContext,
        payload: &ConsensusPayload,
    ) -> ConsensusResult<()> {
        if context.state.contains(ConsensusState::BLOCK_SENT)
            || context.my_index == Some(usize::from(payload.validator_index))
            || payload.version != CONSENSUS_VERSION
        {
            return Ok(());
        }
        if payload.prev_hash != context.prev_hash || payload.block_index != context.block_index {
            if context.block_index < payload.block_index {
                warn!(
                    expected = payload.block_index,
                    current = context.block_index,
                    "Chain is behind the validators"
                );
            }
            return Ok(());
        }
        if usize::from(payload.validator_index) >= context.validators.len() {
            return Ok(());
        }
        let message = ConsensusMessage::from_array(&payload.data)?;
        match message.body {
            MessageBody::ChangeView { new_view_number } => {
                self.on_change_view_received(context, payload, message.view_number, new_view_number)
            }
            _ if message.view_number != context.view_number => Ok(()),
            MessageBody::PrepareRequest(request) => {
                self.on_prepare_request_received(context, payload, request)
            }
            MessageBody::PrepareResponse { signature } => {
                self.on_prepare_response_received(context, payload, signature);
                Ok(())
            }
        }
    }

    fn on_change_view_received(
        &self,
        context: &mut ConsensusContext,
        payload: &ConsensusPayload,
        view: u8,
        new_view: u8,
    ) -> ConsensusResult<()> {
        let index = usize::from(payload.validator_index);
        if new_view <= context.expected_view[index] {
            return Ok(());
        }
        info!(
            block_index = payload.block_index,
            view,
            index,
            new_view,
            "Change view received"
        );
        context.expected_view[index] = new_view;
        self.check_expected_view(context, new_view)
    }

    fn on_prepare_request_received(
        &self,
        context: &mut ConsensusContext,
        payload: &ConsensusPayload,
        request: PrepareRequest,
    ) -> ConsensusResult<()> {
        let index = usize::from(payload.validator_index);
        info!(
            block_index = payload.block_index,
            view = context.view_number,
            index,
            tx = request.transaction_hashes.len(),
            "Prepare request received"
        );
        if !context.state.contains(ConsensusState::BACKUP)
            || context.state.contains(ConsensusState::REQUEST_RECEIVED)
            || index != context.primary_index
        {
            return Ok(());
        }
        let latest = u64::from(self.clock.now()) + self.config.max_future_timestamp.as_secs();
        if payload.timestamp <= context.prev_timestamp || u64::from(payload.timestamp) > latest {
            warn!(timestamp = payload.timestamp, "Proposal timestamp out of range");
            return Ok(());
        }
        let header = context.proposal_header(
            payload.timestamp,
            request.nonce,
            request.next_consensus,
            &request.transaction_hashes,
        );
        let hash_data = header.hash_data();
        context.validators[index].verify(&hash_data, request.signature.as_bytes())?;

        context.state.insert(ConsensusState::REQUEST_RECEIVED);
        context.timestamp = payload.timestamp;
        context.nonce = request.nonce;
        context.next_consensus = request.next_consensus;
        context.transaction_hashes = Some(request.transaction_hashes.clone());
        context.transactions.clear();
        let validators = context.validators.clone();
        for (slot, key) in context.signatures.iter_mut().zip(&validators) {
            if let Some(signature) = slot {
                if key.verify(&hash_data, signature.as_bytes()).is_err() {
                    *slot = None;
                }
            }
        }
        context.signatures[index] = Some(request.signature);

        let mut unverified = Vec::new();
        for hash in request.transaction_hashes.iter().skip(1) {
            if let Some(tx) = self.mempool.get(hash) {
                if !self.add_transaction(context, tx, false)? {
                    return Ok(());
                }
            } else if let Some(tx) = self.mempool.get_staged(hash) {
                unverified.push(tx);
            }
        }
        for tx in unverified {
            if !self.add_transaction(context, tx, true)? {
                return Ok(());
            }
        }
        if !self.add_transaction(context, request.miner_transaction, true)? {
            return Ok(());
        }
        let missing: Vec<UInt256> = request
            .transaction_hashes
            .iter()
            .filter(|hash| !context.transactions.contains_key(hash))
            .copied()
            .collect();
        if !missing.is_empty() {
            debug!(count = missing.len(), "Requesting proposed transactions");
            self.relay.request_transactions(&missing);
        }
        Ok(())
    }

    fn on_prepare_response_received(
        &self,
        context: &mut ConsensusContext,
        payload: &ConsensusPayload,
        signature: Signature,
    ) {
        let index = usize::from(payload.validator_index);
        info!(
            block_index = payload.block_index,
            view = context.view_number,
            index,
            "Prepare response received"
        );
        if context.signatures[index].is_some() {
            return;
        }
        match context.make_header() {
            // Checked once the proposal arrives.
            None => context.signatures[index] = Some(signature),
            Some(header) => {
                if context.validators[index]
                    .verify(&header.hash_data(), signature.as_bytes())
                    .is_ok()
                {
                    context.signatures[index] = Some(signature);
                    self.check_signatures(context);
                }
            }
        }
    }

    /// Admit one proposed transaction. `Ok(false)` means it was rejected and
    /// a view change was requested.
    fn add_transaction(
        &self,
        context: &mut ConsensusContext,
        tx: Transaction,
        verify: bool,
    ) -> ConsensusResult<bool> {
        let hash = tx.hash();
        let rejected = self.chain.contains_transaction(&hash)?
            || (verify && {
                let others: Vec<&Transaction> = context.transactions.values().collect();
                !self.chain.verify_transaction(&tx, &others)
            })
            || !self.mempool.policy().filter_for_memory_pool(&tx);
        if rejected {
            warn!(tx = %hash, "Rejected proposed transaction");
            self.request_change_view(context)?;
            return Ok(false);
        }
        context.transactions.insert(hash, tx);
        if !context.has_all_transactions() {
            return Ok(true);
        }
        let transactions = context.ordered_transactions();
        let validators = self.chain.get_next_block_validators(&transactions)?;
        if self.chain.get_consensus_address(&validators)? != context.next_consensus {
            warn!(
                block_index = context.block_index,
                "Proposed next consensus does not match"
            );
            self.request_change_view(context)?;
            return Ok(false);
        }
        info!(block_index = context.block_index, "Sending prepare response");
        let signature = context
            .sign_header()
            .ok_or(ConsensusError::NotValidator(context.block_index))?;
        context.state.insert(ConsensusState::SIGNATURE_SENT);
        let response = context
            .make_prepare_response(signature)
            .ok_or(ConsensusError::NotValidator(context.block_index))?;
        self.send(response);
        self.check_signatures(context);
        Ok(true)
    }

    /// Relay the block once `m` signatures and every transaction are in.
    fn check_signatures(&self, context: &mut ConsensusContext) {
        if context.state.contains(ConsensusState::BLOCK_SENT)
            || context.signature_count() < context.m()
        {
            return;
        }
        let Some(block) = context.create_block() else {
            return;
        };
        let hash = block.hash();
        info!(block_index = context.block_index, %hash, "Relaying block");
        if !self.relay.relay(InventoryItem::Block(block)) {
            warn!(%hash, "Block rejected by relay");
        }
        context.state.insert(ConsensusState::BLOCK_SENT);
        self.events.publish(ConsensusEvent::BlockSent {
            block_index: context.block_index,
            hash,
        });
    }

    fn request_change_view(&self, context: &mut ConsensusContext) -> ConsensusResult<()> {
        let my_index = context
            .my_index
            .ok_or(ConsensusError::NotValidator(context.block_index))?;
        context.state.insert(ConsensusState::VIEW_CHANGING);
        let new_view = context.expected_view[my_index].saturating_add(1);
        context.expected_view[my_index] = new_view;
        info!(
            block_index = context.block_index,
            view = context.view_number,
            new_view,
            state = %context.state,
            "Requesting change view"
        );
        self.set_timer(context, self.config.view_timeout(new_view));
        let payload = context
            .make_change_view()
            .ok_or(ConsensusError::NotValidator(context.block_index))?;
        self.send(payload);
        self.events.publish(ConsensusEvent::ChangeViewRequested {
            block_index: context.block_index,
            new_view,
        });
        self.check_expected_view(context, new_view)
    }

    /// Move to `view` once `m` validators expect it.
    fn check_expected_view(&self, context: &mut ConsensusContext, view: u8) -> ConsensusResult<()> {
        if context.view_number == view {
            return Ok(());
        }
        let votes = context.expected_view.iter().filter(|v| **v == view).count();
        if votes >= context.m() {
            self.initialize(context, view)?;
        }
        Ok(())
    }

    fn send(&self, payload: ConsensusPayload) {
        let hash = payload.hash();
        if !self.relay.relay(InventoryItem::Consensus(payload)) {
            debug!(%hash, "Consensus payload refused by relay");
        }
    }

    fn set_timer(&self, context: &ConsensusContext, delay: Duration) {
        let now = Instant::now();
        *self.timer.lock() = Some(Timer {
            block_index: context.block_index,
            view: context.view_number,
            delay,
            deadline: now + delay.min(MAX_TIMER_DELAY),
        });
        self.timer_changed.notify_one();
    }

    fn clear_timer(&self) {
        *self.timer.lock() = None;
        self.timer_changed.notify_one();
    }
}
