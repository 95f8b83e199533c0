//! # Subsystem Container
//!
//! Builds every subsystem from a [`NodeConfig`] in dependency order:
//!
//! 1. Store (in memory)
//! 2. Ledger, verifying witnesses and running contracts through the VM
//! 3. Memory pool with the fee policy
//! 4. Peer network
//! 5. Consensus, only when the wallet holds a key

pub mod config;

pub use config::{ConfigError, NodeConfig};

use dc_01_peer_network::LocalNode;
use dc_02_ledger::Blockchain;
use dc_03_state_cache::MemoryStore;
use dc_04_script_verification::{ScriptContractExecutor, ScriptWitnessVerifier};
use dc_05_mempool::{FeePolicy, MemoryPool};
use dc_07_consensus::{ConsensusDependencies, ConsensusRelay, ConsensusService, SystemClock};
use std::sync::Arc;
use tracing::info;

pub struct NodeContainer {
    pub config: NodeConfig,
    pub chain: Arc<Blockchain>,
    pub mempool: Arc<MemoryPool>,
    pub local_node: Arc<LocalNode>,
    pub consensus: Option<Arc<ConsensusService>>,
}

impl NodeContainer {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let settings = config.protocol_settings()?;
        let pool_config = config.mempool_config(&settings);
        let consensus_config = config.consensus_config(&settings);
        let key_pair = config.key_pair()?;

        let chain = Arc::new(Blockchain::new(
            settings,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptWitnessVerifier),
            Arc::new(ScriptContractExecutor),
        )?);
        info!(height = chain.height(), "Ledger ready");

        let policy = Arc::new(FeePolicy::new(Arc::clone(&chain), pool_config.clone()));
        let mempool = Arc::new(MemoryPool::new(pool_config, Arc::clone(&chain), policy));

        let local_node = Arc::new(LocalNode::new(
            config.network_config(),
            Arc::clone(&chain),
            Arc::clone(&mempool),
        ));

        let consensus = key_pair.map(|pair| {
            info!(public_key = %pair.public_key(), "Consensus enabled");
            Arc::new(ConsensusService::new(ConsensusDependencies {
                chain: Arc::clone(&chain),
                mempool: Arc::clone(&mempool),
                relay: Arc::clone(&local_node) as Arc<dyn ConsensusRelay>,
                clock: Arc::new(SystemClock),
                key_pair: Some(pair),
                config: consensus_config,
            }))
        });

        Ok(Self {
            config,
            chain,
            mempool,
            local_node,
            consensus,
        })
    }
}
