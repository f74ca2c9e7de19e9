//! Registry of deployed leaves, grouped by network.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::besu::{BesuLeaf, BesuLeafOptions};
use super::error::BridgeError;
use super::ethereum::{EthereumLeaf, EthereumLeafOptions};
use super::execution::BridgeExecutionLayer;
use super::fabric::{FabricLeaf, FabricLeafOptions};
use super::BridgeLeaf;
use crate::ontology::{OntologyManager, OntologyManagerOptions};
use crate::telemetry::SpanScope;
use crate::types::asset::TokenType;
use crate::types::network::{ClaimFormat, NetworkId};

const CLASS_NAME: &str = "BridgeManager";

/// Options for one leaf, tagged by ledger family.
#[derive(Clone)]
pub enum LeafOptions {
    /// Besu 1.x or 2.x network.
    Besu(BesuLeafOptions),
    /// Ethereum network.
    Ethereum(EthereumLeafOptions),
    /// Fabric 2 network.
    Fabric(FabricLeafOptions),
}

impl LeafOptions {
    /// Network the leaf will serve.
    pub fn network_identification(&self) -> &NetworkId {
        match self {
            Self::Besu(o) | Self::Ethereum(o) => &o.network_identification,
            Self::Fabric(o) => &o.network_identification,
        }
    }
}

struct NetworkLeaves {
    network: NetworkId,
    leaves: Vec<Arc<dyn BridgeLeaf>>,
}

/// Deploys leaves and hands out endpoints and execution layers.
pub struct BridgeManager {
    ontology_manager: Arc<OntologyManager>,
    leaves: RwLock<BTreeMap<String, NetworkLeaves>>,
}

impl BridgeManager {
    /// Build the manager and load its ontologies.
    pub fn new(ontology_options: OntologyManagerOptions) -> Result<Self, BridgeError> {
        let ontology_manager = OntologyManager::new(ontology_options)?;
        Ok(Self::with_ontology_manager(Arc::new(ontology_manager)))
    }

    /// Build the manager around an already loaded ontology manager.
    pub fn with_ontology_manager(ontology_manager: Arc<OntologyManager>) -> Self {
        Self {
            ontology_manager,
            leaves: RwLock::new(BTreeMap::new()),
        }
    }

    /// Shared ontology manager handed to every leaf.
    pub fn ontology_manager(&self) -> &Arc<OntologyManager> {
        &self.ontology_manager
    }

    /// Build the leaf described by `options`, deploy its contracts and register it.
    pub async fn deploy_leaf(&self, options: LeafOptions) -> Result<Arc<dyn BridgeLeaf>, BridgeError> {
        let leaf: Arc<dyn BridgeLeaf> = match options {
            LeafOptions::Besu(o) => Arc::new(BesuLeaf::new(o, self.ontology_manager.clone())?),
            LeafOptions::Ethereum(o) => Arc::new(EthereumLeaf::new(o, self.ontology_manager.clone())?),
            LeafOptions::Fabric(o) => Arc::new(FabricLeaf::new(o, self.ontology_manager.clone())?),
        };
        self.register_leaf(leaf.clone()).await?;
        Ok(leaf)
    }

    /// Deploy the contracts of an existing leaf and register it.
    ///
    /// An already deployed wrapper is not an error here.
    pub async fn register_leaf(&self, leaf: Arc<dyn BridgeLeaf>) -> Result<(), BridgeError> {
        let fn_tag = format!("{CLASS_NAME}#deployLeaf");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let network = leaf.network_identification().clone();
                let key = network.key();
                let duplicate = || BridgeError::DeployLeaf {
                    context: fn_tag.clone(),
                    leaf_id: leaf.id().to_string(),
                };
                if self.contains(&key, leaf.id()) {
                    return Err(duplicate());
                }

                tracing::debug!(leaf_id = leaf.id(), network = %network, "deploying leaf");
                match leaf.deploy_contracts().await {
                    Ok(()) => {}
                    Err(err) if err.is_already_created() => {
                        tracing::debug!(leaf_id = leaf.id(), "contracts already deployed");
                    }
                    Err(err) => return Err(err),
                }

                let mut leaves = self.leaves.write();
                let entry = leaves.entry(key).or_insert_with(|| NetworkLeaves {
                    network: network.clone(),
                    leaves: Vec::new(),
                });
                if entry.leaves.iter().any(|l| l.id() == leaf.id()) {
                    return Err(duplicate());
                }
                entry.leaves.push(leaf.clone());
                tracing::info!(leaf_id = leaf.id(), network = %network, "leaf registered");
                Ok(())
            })
            .await
    }

    fn contains(&self, key: &str, leaf_id: &str) -> bool {
        self.leaves
            .read()
            .get(key)
            .is_some_and(|n| n.leaves.iter().any(|l| l.id() == leaf_id))
    }

    /// First leaf on `network` that supports `claim_format`.
    pub fn get_bridge_end_point(
        &self,
        network: &NetworkId,
        claim_format: ClaimFormat,
    ) -> Result<Arc<dyn BridgeLeaf>, BridgeError> {
        let fn_tag = format!("{CLASS_NAME}#getBridgeEndPoint");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            let leaves = self.leaves.read();
            let entry = leaves.get(&network.key()).ok_or_else(|| BridgeError::Leaf {
                context: fn_tag.clone(),
                reason: format!("bridge endpoint not available for network {network}"),
            })?;
            entry
                .leaves
                .iter()
                .find(|l| l.supports_claim_format(claim_format))
                .cloned()
                .ok_or_else(|| BridgeError::Leaf {
                    context: fn_tag.clone(),
                    reason: format!("no endpoint on {network} with claim format {claim_format}"),
                })
        })
    }

    /// Networks that have at least one registered leaf.
    pub fn get_available_end_points(&self) -> Vec<NetworkId> {
        self.leaves.read().values().map(|n| n.network.clone()).collect()
    }

    /// Address the asset owner must approve on `network`.
    pub fn get_approve_address(&self, network: &NetworkId, token_type: TokenType) -> Result<String, BridgeError> {
        self.get_bridge_end_point(network, ClaimFormat::Default)?
            .get_approve_address(token_type)
    }

    /// Execution layer over the endpoint for `network` and `claim_format`.
    pub fn get_execution_layer(
        &self,
        network: &NetworkId,
        claim_format: ClaimFormat,
    ) -> Result<BridgeExecutionLayer, BridgeError> {
        let leaf = self.get_bridge_end_point(network, claim_format)?;
        BridgeExecutionLayer::new(leaf, claim_format)
    }

    /// Close every leaf's connector, returning the first failure.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        let leaves: Vec<Arc<dyn BridgeLeaf>> = self
            .leaves
            .read()
            .values()
            .flat_map(|n| n.leaves.iter().cloned())
            .collect();
        let mut first_error = None;
        for leaf in leaves {
            if let Err(err) = leaf.shutdown_connection().await {
                tracing::warn!(leaf_id = leaf.id(), error = %err, "leaf shutdown failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
