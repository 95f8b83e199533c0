//! Background tasks of a running node.

use crate::container::{NodeConfig, NodeContainer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The node runtime driving every subsystem's task.
pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        Ok(Self {
            container: Arc::new(NodeContainer::new(config)?),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    pub fn container(&self) -> Arc<NodeContainer> {
        Arc::clone(&self.container)
    }

    /// Spawn the memory pool, peer network and consensus tasks.
    pub fn start(&mut self) {
        let container = &self.container;
        info!(
            magic = container.chain.settings().magic,
            port = container.config.network.port,
            ws_port = container.config.network.ws_port,
            height = container.chain.height(),
            "Starting node"
        );

        self.tasks.push(tokio::spawn(
            Arc::clone(&container.mempool).run(self.shutdown.clone()),
        ));

        // Subscribe before the network starts so no inventory is missed.
        let network_events = container.local_node.subscribe();
        let local_node = Arc::clone(&container.local_node);
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(error) = local_node.run(shutdown.clone()).await {
                error!(%error, "Peer network stopped");
                shutdown.cancel();
            }
        }));

        match &container.consensus {
            Some(consensus) => self.tasks.push(tokio::spawn(
                Arc::clone(consensus).run(network_events, self.shutdown.clone()),
            )),
            None => info!("No wallet key, running without consensus"),
        }
    }

    /// Resolves once any task asked the node to stop.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Shutting down");
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                warn!(%error, "Task ended abnormally");
            }
        }
        info!("Shutdown complete");
    }
}
