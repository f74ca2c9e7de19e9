//! Ethereum leaf.

use super::bungee::BungeeStrategy;
use super::evm::{EvmFlavor, EvmLeaf, EvmLeafOptions, ReceiptSource};
use crate::types::network::{LedgerType, NetworkId};

/// Ethereum flavor of the EVM leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ethereum;

impl EvmFlavor for Ethereum {
    const CLASS_NAME: &'static str = "EthereumLeaf";
    const STRATEGY: BungeeStrategy = BungeeStrategy::Ethereum;
    const RECEIPT_SOURCE: ReceiptSource = ReceiptSource::RawWeb3;

    fn accepts(ledger_type: LedgerType) -> bool {
        ledger_type == LedgerType::Ethereum
    }

    fn ontology_ledger(network: &NetworkId) -> LedgerType {
        network.ledger_type
    }
}

/// Bridge leaf for Ethereum networks.
pub type EthereumLeaf = EvmLeaf<Ethereum>;

/// Construction options for [`EthereumLeaf`].
pub type EthereumLeafOptions = EvmLeafOptions;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::evm::tests::{make_credential, make_manager, RecordingConnector};
    use crate::bridge::{BridgeError, BridgeLeaf};
    use std::sync::Arc;

    #[test]
    fn test_rejects_besu_network() {
        let options = EthereumLeafOptions::new(
            NetworkId::new("besu", LedgerType::Besu2X),
            Arc::new(RecordingConnector::default()),
            make_credential(),
        );
        assert!(matches!(
            EthereumLeaf::new(options, make_manager()),
            Err(BridgeError::UnsupportedNetwork { .. })
        ));
    }

    #[tokio::test]
    async fn test_receipt_and_bytecode_use_raw_web3() {
        let connector = Arc::new(RecordingConnector::default());
        let leaf = EthereumLeaf::new(
            EthereumLeafOptions::new(NetworkId::new("eth", LedgerType::Ethereum), connector.clone(), make_credential()),
            make_manager(),
        )
        .unwrap();
        leaf.get_receipt("0xabc").await.unwrap();
        assert_eq!(leaf.get_contract_bytecode("0xtoken").await.unwrap(), "0x6080");
        assert_eq!(
            connector.raw_calls.lock().as_slice(),
            ["web3:getTransaction".to_string(), "web3:getCode".to_string()]
        );
        assert!(leaf.id().starts_with("EthereumLeaf-"));
    }
}
