//! Bridge leaves driven through the bridge manager and execution layer.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{besu_network, bridge_manager, credential, ontology_manager, WrapperLedger, WRAPPER_ADDRESS, WRAPPER_NAME};
use satp_hermes::bridge::bungee::{BungeeFactory, BungeeHermes, BungeeStrategy, GeneratedView, NetworkDetails};
use satp_hermes::bridge::connector::ConnectorError;
use satp_hermes::bridge::{BesuLeafOptions, BridgeError, BridgeManager, EthereumLeafOptions, LeafOptions, StageOperation};
use satp_hermes::types::{Amount, Asset, ClaimFormat, ErcTokenStandard, LedgerType, NetworkId, TokenType};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn make_asset(amount: u128) -> Asset {
    make_owned_asset("asset-1", "0xalice", amount)
}

fn make_owned_asset(id: &str, owner: &str, amount: u128) -> Asset {
    Asset::fungible(id, "token1", owner, "SATPTokenContract", besu_network(), Amount::new(amount))
        .with_evm("0xtoken", ErcTokenStandard::Erc20)
}

/// Bungee that snapshots the asset ids it is asked about.
struct EchoBungee;

#[async_trait]
impl BungeeHermes for EchoBungee {
    async fn generate_snapshot(
        &self,
        asset_ids: Vec<String>,
        network_id: &str,
        details: &NetworkDetails,
    ) -> Result<Value, ConnectorError> {
        Ok(json!({
            "assets": asset_ids,
            "network": network_id,
            "contract": details.contract_name,
        }))
    }

    fn generate_view(&self, snapshot: &Value, ti: &str, tf: &str, _view_id: Option<&str>) -> GeneratedView {
        GeneratedView {
            view: Some(json!({"snapshot": snapshot, "ti": ti, "tf": tf})),
            signature: Some("sig".to_string()),
        }
    }
}

struct EchoBungeeFactory;

impl BungeeFactory for EchoBungeeFactory {
    fn create(&self, _network_id: &str, strategy: BungeeStrategy) -> Arc<dyn BungeeHermes> {
        assert_eq!(strategy, BungeeStrategy::Besu);
        Arc::new(EchoBungee)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transfer lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sender_side_lifecycle() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_asset(40);
    ledger.fund("0xalice", 40);

    layer.wrap_asset(&asset).await.unwrap();
    let receipt = layer.lock_asset(&asset).await.unwrap();
    assert_eq!(receipt.receipt, r#"{"hash":"0x0002","status":true}"#);
    assert_eq!(receipt.proof, "");
    assert_eq!(ledger.token("asset-1").unwrap().amount, 40);

    let leaf = layer.leaf();
    assert_eq!(leaf.get_assets().await.unwrap(), vec!["asset-1".to_string()]);
    let stored = leaf.get_asset("asset-1").await.unwrap();
    assert_eq!(stored.token_type, TokenType::NonstandardFungible);
    assert_eq!(stored.amount(), Some(Amount::new(40)));
    assert_eq!(stored.owner, "0xalice");

    layer.burn_asset(&asset).await.unwrap();
    layer.unwrap_asset(&asset).await.unwrap();
    assert!(ledger.token("asset-1").is_none());
    assert_eq!(ledger.calls(), vec!["wrap", "lock", "burn", "unwrap"]);
}

#[tokio::test]
async fn test_receiver_side_lifecycle() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_asset(15);

    layer.wrap_asset(&asset).await.unwrap();
    for op in [StageOperation::Mint, StageOperation::Assign] {
        layer.execute(op, &asset).await.unwrap();
    }
    assert_eq!(ledger.calls(), vec!["wrap", "mint", "assign"]);
    let token = ledger.token("asset-1").unwrap();
    assert_eq!(token.amount, 0);
    assert_eq!(token.owner, "0xalice");
}

#[tokio::test]
async fn test_ledger_rejection_surfaces_as_transaction_error() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();

    // Unlocking more than the wrapper holds reverts.
    ledger.seed_token("asset-1", "0xalice", 5);
    let err = layer.unlock_asset(&make_asset(6)).await.unwrap_err();
    assert!(matches!(err, BridgeError::Transaction { .. }));
    assert_eq!(ledger.token("asset-1").unwrap().amount, 5);
}

#[tokio::test]
async fn test_wrap_requires_ontology() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();

    let mut asset = make_asset(1);
    asset.reference_id = "unknown-token".to_string();
    assert!(matches!(layer.wrap_asset(&asset).await, Err(BridgeError::Ontology { .. })));
    assert!(ledger.calls().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Balances
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_wrap_takes_custody_with_zero_amount() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    ledger.fund("0xalice", 10);

    layer.wrap_asset(&make_asset(10)).await.unwrap();

    let leaf = layer.leaf();
    assert_eq!(leaf.get_asset("asset-1").await.unwrap().amount(), Some(Amount::new(0)));
    let ids = leaf.get_assets().await.unwrap();
    assert_eq!(ids.iter().filter(|id| *id == "asset-1").count(), 1);
    assert_eq!(ledger.balance("0xalice"), 10);
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 0);
}

#[tokio::test]
async fn test_lock_then_unlock_restores_owner_balance() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_asset(50);
    ledger.fund("0xalice", 50);

    layer.wrap_asset(&asset).await.unwrap();
    layer.lock_asset(&asset).await.unwrap();
    assert_eq!(ledger.balance("0xalice"), 0);
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 50);

    layer.unlock_asset(&asset).await.unwrap();
    let stored = layer.leaf().get_asset("asset-1").await.unwrap();
    assert_eq!(stored.amount(), Some(Amount::new(0)));
    assert_eq!(ledger.balance("0xalice"), 50);
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 0);
}

#[tokio::test]
async fn test_lock_without_funds_reverts() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_asset(5);
    ledger.fund("0xalice", 4);

    layer.wrap_asset(&asset).await.unwrap();
    assert!(matches!(layer.lock_asset(&asset).await, Err(BridgeError::Transaction { .. })));
    assert_eq!(ledger.balance("0xalice"), 4);
    assert_eq!(ledger.token("asset-1").unwrap().amount, 0);
}

#[tokio::test]
async fn test_burn_after_lock_destroys_tokens() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_asset(30);
    ledger.fund("0xalice", 30);

    layer.wrap_asset(&asset).await.unwrap();
    layer.lock_asset(&asset).await.unwrap();
    layer.burn_asset(&asset).await.unwrap();

    let stored = layer.leaf().get_asset("asset-1").await.unwrap();
    assert_eq!(stored.amount(), Some(Amount::new(0)));
    assert_eq!(ledger.balance("0xalice"), 0);
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 0);
}

#[tokio::test]
async fn test_mint_then_assign_pays_receiver() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let asset = make_owned_asset("asset-1", "0xbob", 25);

    layer.wrap_asset(&asset).await.unwrap();
    layer.mint_asset(&asset).await.unwrap();
    let stored = layer.leaf().get_asset("asset-1").await.unwrap();
    assert_eq!(stored.amount(), Some(Amount::new(25)));
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 25);

    layer.assign_asset(&asset).await.unwrap();
    let stored = layer.leaf().get_asset("asset-1").await.unwrap();
    assert_eq!(stored.amount(), Some(Amount::new(0)));
    assert_eq!(ledger.balance("0xbob"), 25);
    assert_eq!(ledger.balance(WRAPPER_ADDRESS), 0);
}

#[tokio::test]
async fn test_unwrap_removes_exactly_one_asset() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;
    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Default).unwrap();
    let first = make_owned_asset("asset-1", "0xalice", 0);
    let second = make_owned_asset("asset-2", "0xalice", 0);

    layer.wrap_asset(&first).await.unwrap();
    layer.wrap_asset(&second).await.unwrap();
    let before = layer.leaf().get_assets().await.unwrap();
    assert_eq!(before.len(), 2);

    layer.unwrap_asset(&first).await.unwrap();
    let after = layer.leaf().get_assets().await.unwrap();
    assert_eq!(after.len(), before.len() - 1);
    assert_eq!(after, vec!["asset-2".to_string()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_endpoints_by_network_and_claim_format() {
    let manager = bridge_manager(WrapperLedger::new()).await;

    assert_eq!(manager.get_available_end_points(), vec![besu_network()]);
    assert_eq!(
        manager.get_approve_address(&besu_network(), TokenType::NonstandardFungible).unwrap(),
        WRAPPER_ADDRESS
    );
    assert!(matches!(
        manager.get_execution_layer(&besu_network(), ClaimFormat::Bungee),
        Err(BridgeError::Leaf { .. })
    ));
    let other = NetworkId::new("EthereumLedgerTestNetwork", LedgerType::Ethereum);
    assert!(matches!(
        manager.get_execution_layer(&other, ClaimFormat::Default),
        Err(BridgeError::Leaf { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_leaf_rejected() {
    let ledger = WrapperLedger::new();
    let manager = bridge_manager(ledger.clone()).await;

    let mut options = BesuLeafOptions::new(besu_network(), ledger, credential());
    options.leaf_id = Some("besu-leaf".to_string());
    options.wrapper_contract_name = Some(WRAPPER_NAME.to_string());
    options.wrapper_contract_address = Some(WRAPPER_ADDRESS.to_string());
    assert!(matches!(
        manager.deploy_leaf(LeafOptions::Besu(options)).await,
        Err(BridgeError::DeployLeaf { .. })
    ));
}

#[tokio::test]
async fn test_ethereum_leaf_deploys_wrapper() {
    let ledger = WrapperLedger::new();
    let manager = BridgeManager::with_ontology_manager(ontology_manager());
    let network = NetworkId::new("EthereumLedgerTestNetwork", LedgerType::Ethereum);
    let options = EthereumLeafOptions::new(network.clone(), ledger, credential());

    let leaf = manager.deploy_leaf(LeafOptions::Ethereum(options)).await.unwrap();
    assert_eq!(leaf.get_wrapper_contract(TokenType::NonstandardNonfungible).unwrap(), WRAPPER_ADDRESS);
    assert!(manager.get_execution_layer(&network, ClaimFormat::Default).is_ok());
    manager.shutdown().await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Proofs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bungee_proof_is_stable_view() {
    let ledger = WrapperLedger::new();
    let manager = BridgeManager::with_ontology_manager(ontology_manager());
    let mut options = BesuLeafOptions::new(besu_network(), ledger.clone(), credential());
    options.claim_formats = vec![ClaimFormat::Bungee];
    options.bungee_factory = Some(Arc::new(EchoBungeeFactory));
    options.wrapper_contract_name = Some(WRAPPER_NAME.to_string());
    options.wrapper_contract_address = Some(WRAPPER_ADDRESS.to_string());
    manager.deploy_leaf(LeafOptions::Besu(options)).await.unwrap();

    let layer = manager.get_execution_layer(&besu_network(), ClaimFormat::Bungee).unwrap();
    let asset = make_asset(3);
    ledger.fund("0xalice", 3);
    layer.wrap_asset(&asset).await.unwrap();
    let receipt = layer.lock_asset(&asset).await.unwrap();

    let proof: Value = serde_json::from_str(&receipt.proof).unwrap();
    assert_eq!(proof["signature"], "sig");
    assert_eq!(proof["view"]["snapshot"]["assets"], json!(["asset-1"]));
    assert_eq!(proof["view"]["snapshot"]["contract"], WRAPPER_NAME);
    assert_eq!(proof["view"]["ti"], "0");

    // Same asset, same view.
    let again = layer.leaf().get_proof(&asset, ClaimFormat::Bungee).await.unwrap();
    assert_eq!(again, receipt.proof);
}
