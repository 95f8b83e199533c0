//! A whole node on a one-validator network: config file in, blocks out.

use dc_02_ledger::LedgerEvent;
use node_runtime::{NodeConfig, NodeRuntime};
use shared_crypto::KeyPair;
use std::io::Write;
use std::time::Duration;

fn write_config(private_key: [u8; 32]) -> tempfile::NamedTempFile {
    let public_key = KeyPair::from_bytes(private_key).unwrap().public_key();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [protocol]
        magic = 1146374723
        seconds_per_block = 1
        standby_validators = ["{public_key}"]

        [network]
        port = 0
        ws_port = 0

        [wallet]
        private_key = "{}"
        "#,
        hex::encode(private_key),
    )
    .unwrap();
    file
}

#[tokio::test]
async fn test_single_validator_node_produces_verified_blocks() {
    let file = write_config([7; 32]);
    let config = NodeConfig::from_file(file.path()).unwrap();
    let mut runtime = NodeRuntime::new(config).unwrap();
    let container = runtime.container();
    assert!(container.consensus.is_some());

    let mut persisted = container.chain.subscribe();
    runtime.start();

    let mut heights = Vec::new();
    while heights.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(10), persisted.recv()).await {
            Ok(Some(LedgerEvent::PersistCompleted { block })) => heights.push(block.index()),
            other => panic!("no block persisted: {other:?}"),
        }
    }
    assert_eq!(heights, vec![1, 2]);
    assert!(container.chain.height() >= 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_node_without_wallet_only_follows() {
    let file = write_config([7; 32]);
    let mut config = NodeConfig::from_file(file.path()).unwrap();
    config.wallet.private_key = None;
    let mut runtime = NodeRuntime::new(config).unwrap();
    let container = runtime.container();
    assert!(container.consensus.is_none());

    runtime.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(container.chain.height(), 0);
    runtime.shutdown().await;
}
