use super::*;
use crate::domain::{ConsensusContext, MessageType};
use crate::test_utils::{
    keys, mempool, pump, spend, test_chain, validator_keys, validators, AcceptAllVerifier,
    FixedClock, HaltingExecutor, RecordingRelay,
};
use dc_01_peer_network::{LocalNode, NetworkConfig};
use dc_02_ledger::{AddBlockResult, CoinReference, ProtocolSettings, WitnessVerifier};
use dc_03_state_cache::MemoryStore;
use dc_04_script_verification::ScriptWitnessVerifier;
use shared_types::UInt160;
use std::sync::atomic::AtomicU32;

fn decode(payload: &ConsensusPayload) -> ConsensusMessage {
    ConsensusMessage::from_array(&payload.data).unwrap()
}

/// A context for `pair` at the chain tip, as a hand-driven validator.
fn context_for(chain: &Blockchain, pair: &KeyPair) -> ConsensusContext {
    let mut context = ConsensusContext::new(Some(pair.clone()));
    context.reset(chain).unwrap();
    context
}

fn change_view_from(chain: &Blockchain, pair: &KeyPair, new_view: u8) -> ConsensusPayload {
    let mut context = context_for(chain, pair);
    let index = context.my_index.unwrap();
    context.expected_view[index] = new_view;
    context.make_change_view().unwrap()
}

fn drain(events: &mut Subscription<ConsensusEvent>) -> Vec<ConsensusEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.try_recv().unwrap() {
        seen.push(event);
    }
    seen
}

#[test]
fn test_start_assigns_roles() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);

    for (index, node) in nodes.iter().enumerate() {
        assert_eq!(node.relay.syncs(), 1);
        let (state, primary) = node
            .service
            .with_context(|c| (c.state, c.primary_index));
        assert_eq!(primary, 2);
        let timer = node.service.timer().unwrap();
        assert_eq!((timer.block_index, timer.view), (2, 0));
        if index == 2 {
            assert_eq!(state, ConsensusState::PRIMARY);
            assert!(timer.delay <= Duration::from_secs(1));
        } else {
            assert_eq!(state, ConsensusState::BACKUP);
            assert_eq!(timer.delay, Duration::from_secs(2));
        }
    }
}

#[test]
fn test_block_assembly() {
    let (chain, split) = test_chain();
    let pool = mempool(&chain);
    let spends: Vec<Transaction> = (0..3).map(|i| spend(&split, i, 0x70 + i as u8)).collect();
    for tx in &spends {
        pool.add_transaction(tx.clone()).unwrap();
    }
    let nodes = validators(&chain, &pool);
    let primary = &nodes[2];
    let mut events = primary.service.subscribe();

    primary.service.on_timeout(2, 0);
    let (hashes, miner_first, state) = primary.service.with_context(|c| {
        let hashes = c.transaction_hashes.clone().unwrap();
        let miner_first = c.transactions[&hashes[0]].is_miner();
        (hashes, miner_first, c.state)
    });
    assert_eq!(hashes.len(), 4);
    assert!(miner_first);
    for tx in &spends {
        assert!(hashes.contains(&tx.hash()));
    }
    assert!(state.contains(ConsensusState::PRIMARY | ConsensusState::REQUEST_SENT));
    assert_eq!(primary.service.with_context(|c| c.signature_count()), 1);
    assert_eq!(primary.service.timer().unwrap().delay, Duration::from_secs(2));

    assert!(pump(&nodes) > 0);

    let (state, signatures) = primary
        .service
        .with_context(|c| (c.state, c.signature_count()));
    assert!(state.contains(ConsensusState::BLOCK_SENT));
    assert!(signatures >= 3);
    let blocks = primary.relay.blocks();
    assert_eq!(blocks.len(), 1);
    let block = blocks[0].clone();
    assert_eq!(block.index(), 2);
    assert_eq!(block.transaction_hashes(), hashes);
    assert_eq!(block.header.witness.invocation_script.len(), 3 * 65);
    assert!(ScriptWitnessVerifier.verify_witnesses(&block, &chain.snapshot()));
    assert!(drain(&mut events).contains(&ConsensusEvent::BlockSent {
        block_index: 2,
        hash: block.hash(),
    }));

    for (index, node) in nodes.iter().enumerate().filter(|(index, _)| *index != 2) {
        assert_eq!(node.service.with_context(|c| c.my_index), Some(index));
        assert!(node
            .service
            .with_context(|c| c.state.contains(ConsensusState::SIGNATURE_SENT)));
    }
    assert_eq!(chain.add_block(block).unwrap(), AddBlockResult::Accepted);
    assert_eq!(chain.height(), 2);
}

#[test]
fn test_rejected_transaction_requests_view_change() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let backup = &nodes[0];
    let mut events = backup.service.subscribe();

    let unbacked = Transaction::contract(
        vec![CoinReference::new(UInt256::from([9; 32]), 0)],
        vec![TransactionOutput::new(
            genesis::governing_token_id(),
            Fixed8::from_units(1).unwrap(),
            UInt160::from([9; 20]),
        )],
    );
    let primary_key = &validator_keys(&chain)[2];
    let mut proposer = context_for(&chain, primary_key);
    proposer.timestamp = proposer.prev_timestamp + 15;
    let validators = chain.get_validators().unwrap();
    let next_consensus = chain.get_consensus_address(&validators).unwrap();
    proposer.propose(
        77,
        next_consensus,
        vec![Transaction::miner(77, Vec::new()), unbacked.clone()],
    );
    proposer.sign_header().unwrap();
    let request = proposer.make_prepare_request().unwrap();

    backup.service.on_consensus_payload(&request);
    assert_eq!(backup.relay.requested(), vec![unbacked.hash()]);
    assert!(backup
        .service
        .with_context(|c| c.state.contains(ConsensusState::REQUEST_RECEIVED)));

    backup.service.on_transaction(&unbacked);

    let sent = backup.relay.take_payloads();
    assert_eq!(sent.len(), 1);
    assert_eq!(decode(&sent[0]), ConsensusMessage::change_view(0, 1));
    let (expected, state) = backup
        .service
        .with_context(|c| (c.expected_view[0], c.state));
    assert_eq!(expected, 1);
    assert!(state.contains(ConsensusState::VIEW_CHANGING));
    assert!(!state.contains(ConsensusState::SIGNATURE_SENT));
    let timer = backup.service.timer().unwrap();
    assert_eq!(timer.delay, Duration::from_secs(1 << 2));
    assert_eq!((timer.block_index, timer.view), (2, 0));
    assert!(drain(&mut events).contains(&ConsensusEvent::ChangeViewRequested {
        block_index: 2,
        new_view: 1,
    }));
}

#[test]
fn test_change_view_is_monotonic_and_reinitializes_once() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let node = &nodes[0];
    let pairs = validator_keys(&chain);
    let mut events = node.service.subscribe();

    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[1], 2));
    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[1], 1));
    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[1], 2));
    assert_eq!(node.service.with_context(|c| c.expected_view.clone()), vec![0, 2, 0, 0]);

    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[2], 2));
    assert_eq!(node.service.with_context(|c| c.view_number), 0);

    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[3], 2));
    node.service
        .on_consensus_payload(&change_view_from(&chain, &pairs[3], 2));

    let (view, primary, state) = node
        .service
        .with_context(|c| (c.view_number, c.primary_index, c.state));
    assert_eq!(view, 2);
    assert_eq!(primary, 0);
    assert!(state.contains(ConsensusState::PRIMARY));
    let restarts: Vec<ConsensusEvent> = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, ConsensusEvent::RoundStarted { .. }))
        .collect();
    assert_eq!(
        restarts,
        vec![ConsensusEvent::RoundStarted {
            block_index: 2,
            view_number: 2
        }]
    );
}

#[test]
fn test_primary_second_timeout_requests_change_view() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let primary = &nodes[2];

    primary.service.on_timeout(2, 0);
    let request = primary.relay.take_payloads();
    assert_eq!(request.len(), 1);
    assert_eq!(decode(&request[0]).message_type(), MessageType::PrepareRequest);

    primary.service.on_timeout(2, 1);
    assert!(primary.relay.take_payloads().is_empty());

    primary.service.on_timeout(2, 0);
    let sent = primary.relay.take_payloads();
    assert_eq!(sent.len(), 1);
    assert_eq!(decode(&sent[0]), ConsensusMessage::change_view(0, 1));
}

#[test]
fn test_forged_request_ignored() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let pairs = validator_keys(&chain);

    let mut proposer = context_for(&chain, &pairs[2]);
    proposer.timestamp = proposer.prev_timestamp + 15;
    proposer.propose(5, UInt160::default(), vec![Transaction::miner(5, Vec::new())]);
    proposer.signatures[2] = Some(pairs[1].sign(b"something else"));
    let forged = proposer.make_prepare_request().unwrap();

    nodes[0].service.on_consensus_payload(&forged);
    assert!(!nodes[0]
        .service
        .with_context(|c| c.state.contains(ConsensusState::REQUEST_RECEIVED)));

    let mut late = context_for(&chain, &pairs[2]);
    late.timestamp = late.prev_timestamp;
    late.propose(5, UInt160::default(), vec![Transaction::miner(5, Vec::new())]);
    late.sign_header().unwrap();
    nodes[0]
        .service
        .on_consensus_payload(&late.make_prepare_request().unwrap());
    assert!(!nodes[0]
        .service
        .with_context(|c| c.state.contains(ConsensusState::REQUEST_RECEIVED)));
}

#[test]
fn test_foreign_and_malformed_payloads_ignored() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let pairs = validator_keys(&chain);

    let mut stale = change_view_from(&chain, &pairs[1], 1);
    stale.block_index = 1;
    nodes[0].service.on_consensus_payload(&stale);

    let mut garbage = change_view_from(&chain, &pairs[1], 1);
    garbage.data = vec![0x20, 0x00, 0x01];
    nodes[0].service.on_consensus_payload(&garbage);

    let mut unknown = change_view_from(&chain, &pairs[1], 1);
    unknown.validator_index = 9;
    nodes[0].service.on_consensus_payload(&unknown);

    assert_eq!(
        nodes[0].service.with_context(|c| c.expected_view.clone()),
        vec![0; 4]
    );
}

#[test]
fn test_response_before_request_is_checked_later() {
    let (chain, _) = test_chain();
    let pool = mempool(&chain);
    let nodes = validators(&chain, &pool);
    let pairs = validator_keys(&chain);

    let mut proposer = context_for(&chain, &pairs[2]);
    proposer.timestamp = proposer.prev_timestamp + 15;
    let next_consensus = chain
        .get_consensus_address(&chain.get_validators().unwrap())
        .unwrap();
    proposer.propose(6, next_consensus, vec![Transaction::miner(6, Vec::new())]);
    proposer.sign_header().unwrap();
    let request = proposer.make_prepare_request().unwrap();

    let mut honest = context_for(&chain, &pairs[1]);
    honest.timestamp = proposer.timestamp;
    honest.propose(6, next_consensus, vec![Transaction::miner(6, Vec::new())]);
    let signature = honest.sign_header().unwrap();
    let good = honest.make_prepare_response(signature).unwrap();

    let liar = context_for(&chain, &pairs[3]);
    let bad = liar
        .make_prepare_response(pairs[3].sign(b"not the header"))
        .unwrap();

    nodes[0].service.on_consensus_payload(&good);
    nodes[0].service.on_consensus_payload(&bad);
    assert_eq!(nodes[0].service.with_context(|c| c.signature_count()), 2);

    nodes[0].service.on_consensus_payload(&request);
    let (signatures, state) = nodes[0].service.with_context(|c| {
        (
            c.signatures.iter().map(Option::is_some).collect::<Vec<_>>(),
            c.state,
        )
    });
    assert!(state.contains(ConsensusState::BLOCK_SENT));
    assert_eq!(signatures, vec![true, true, true, false]);
    assert_eq!(nodes[0].relay.blocks().len(), 1);
}

#[test]
fn test_observer_stays_idle() {
    let (chain, _) = test_chain();
    let relay = Arc::new(RecordingRelay::default());
    let service = ConsensusService::new(ConsensusDependencies {
        chain: Arc::clone(&chain),
        mempool: mempool(&chain),
        relay: Arc::clone(&relay) as Arc<dyn ConsensusRelay>,
        clock: Arc::new(FixedClock(AtomicU32::new(0))),
        key_pair: Some(KeyPair::from_bytes([0x42; 32]).unwrap()),
        config: ConsensusConfig::for_testing(),
    });
    service.start().unwrap();

    assert!(service.timer().is_none());
    assert_eq!(service.with_context(|c| c.role()), "Observer");
    service.on_timeout(2, 0);
    assert!(relay.take_payloads().is_empty());
}

#[tokio::test]
async fn test_single_validator_produces_blocks() {
    let pair = keys().remove(0);
    let chain = Arc::new(
        Blockchain::new(
            ProtocolSettings::for_testing(vec![pair.public_key()]),
            Arc::new(MemoryStore::new()),
            Arc::new(AcceptAllVerifier),
            Arc::new(HaltingExecutor),
        )
        .unwrap(),
    );
    let pool = mempool(&chain);
    let node = Arc::new(LocalNode::new(
        NetworkConfig::for_testing(),
        Arc::clone(&chain),
        Arc::clone(&pool),
    ));
    let service = Arc::new(ConsensusService::new(ConsensusDependencies {
        chain: Arc::clone(&chain),
        mempool: pool,
        relay: Arc::clone(&node) as Arc<dyn ConsensusRelay>,
        clock: Arc::new(crate::ports::SystemClock),
        key_pair: Some(pair),
        config: ConsensusConfig::for_testing(),
    }));
    let mut persisted = chain.subscribe();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&service).run(node.subscribe(), shutdown.clone()));

    let mut heights = Vec::new();
    while heights.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(5), persisted.recv()).await {
            Ok(Some(LedgerEvent::PersistCompleted { block })) => heights.push(block.index()),
            other => panic!("no block persisted: {other:?}"),
        }
    }
    assert_eq!(heights, vec![1, 2]);

    shutdown.cancel();
    task.await.unwrap();
}
