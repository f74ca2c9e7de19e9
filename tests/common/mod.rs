//! Shared fixtures for the integration tests: an in-memory wrapper ledger,
//! ontology documents and a pair of gateways wired to each other.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use satp_hermes::bridge::connector::{
    ConnectorError, EvmConnector, EvmDeployRequest, EvmDeployResponse, EvmInvokeRequest, EvmInvokeResponse,
    EvmTransactionReceipt,
};
use satp_hermes::bridge::{BesuLeafOptions, BridgeManager, LeafOptions};
use satp_hermes::bridge::connector::Web3SigningCredential;
use satp_hermes::ontology::{OntologyCheckLevel, OntologyManager};
use satp_hermes::recovery::{
    CounterpartyGateway, CrashManager, CrashManagerOptions, RecoverMessage, RecoverSuccessMessage,
    RecoverUpdateMessage, RecoveryError, RollbackAckMessage, RollbackMessage,
};
use satp_hermes::session::{MessageType, SessionAsset, SessionData, SessionRole};
use satp_hermes::store::{InMemoryLogRepository, LocalLog};
use satp_hermes::types::{Amount, InvocationType, LedgerType, NetworkId, TokenType};

pub const WRAPPER_NAME: &str = "satp-wrapper";
pub const WRAPPER_ADDRESS: &str = "0xwrapper";
pub const TOKEN_REFERENCE: &str = "token1";
pub const SESSION_ID: &str = "sess-1";

pub type Gateway = CrashManager<InMemoryLogRepository>;

// ─────────────────────────────────────────────────────────────────────────────
// Wrapper ledger
// ─────────────────────────────────────────────────────────────────────────────

/// A wrapped token as the fake wrapper contract stores it.
#[derive(Debug, Clone)]
pub struct WrappedToken {
    pub reference_id: String,
    pub owner: String,
    pub contract_name: String,
    pub contract_address: String,
    pub token_type: u64,
    /// Amount currently held by the wrapper.
    pub amount: u128,
}

#[derive(Default)]
struct LedgerState {
    tokens: BTreeMap<String, WrappedToken>,
    /// Underlying token balance per account, the wrapper included.
    balances: BTreeMap<String, u128>,
    transactions: u64,
    calls: Vec<String>,
    failing: BTreeSet<String>,
}

/// EVM connector backed by an in-memory wrapper contract over an ERC-20-style
/// balance table.
///
/// | Method | Wrapped amount | Balances |
/// |--------|----------------|----------|
/// | `lock` | `+n` | owner `-n`, wrapper `+n` |
/// | `unlock` | `-n` | wrapper `-n`, owner `+n` |
/// | `mint` | `+n` | wrapper `+n` |
/// | `burn` | `-n` | wrapper `-n` |
/// | `assign` | `-n` | wrapper `-n`, receiver `+n` |
///
/// Any step that would take a balance below zero reverts the whole call.
#[derive(Default)]
pub struct WrapperLedger {
    state: Mutex<LedgerState>,
}

impl WrapperLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Methods invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn token(&self, id: &str) -> Option<WrappedToken> {
        self.state.lock().tokens.get(id).cloned()
    }

    /// Underlying balance of `account`.
    pub fn balance(&self, account: &str) -> u128 {
        self.state.lock().balances.get(account).copied().unwrap_or_default()
    }

    /// Credit `account` with `amount` of the underlying token.
    pub fn fund(&self, account: &str, amount: u128) {
        *self.state.lock().balances.entry(account.to_string()).or_default() += amount;
    }

    /// Put a wrapped token holding `amount` on the ledger, backed by the
    /// wrapper's balance.
    pub fn seed_token(&self, id: &str, owner: &str, amount: u128) {
        let mut state = self.state.lock();
        *state.balances.entry(WRAPPER_ADDRESS.to_string()).or_default() += amount;
        state.tokens.insert(
            id.to_string(),
            WrappedToken {
                reference_id: TOKEN_REFERENCE.to_string(),
                owner: owner.to_string(),
                contract_name: "SATPTokenContract".to_string(),
                contract_address: "0xtoken".to_string(),
                token_type: u64::from(TokenType::NonstandardFungible.code()),
                amount,
            },
        );
    }

    /// Make every future `method` invocation fail.
    pub fn fail_on(&self, method: &str) {
        self.state.lock().failing.insert(method.to_string());
    }

    fn apply(state: &mut LedgerState, method: &str, params: &[Value]) -> Result<(), String> {
        let id = params.first().and_then(Value::as_str).unwrap_or_default().to_string();
        let quantity = |index: usize| {
            params
                .get(index)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<u128>().ok())
                .ok_or_else(|| format!("{method}: bad amount"))
        };
        match method {
            "wrap" => {
                let text = |index: usize| params.get(index).and_then(Value::as_str).unwrap_or_default().to_string();
                let token_id = text(3);
                if state.tokens.contains_key(&token_id) {
                    return Err(format!("token {token_id} already wrapped"));
                }
                state.tokens.insert(
                    token_id,
                    WrappedToken {
                        contract_name: text(0),
                        contract_address: text(1),
                        token_type: params.get(2).and_then(Value::as_u64).unwrap_or_default(),
                        reference_id: text(4),
                        owner: text(5),
                        amount: 0,
                    },
                );
                Ok(())
            }
            "unwrap" => match state.tokens.get(&id) {
                Some(token) if token.amount == 0 => {
                    state.tokens.remove(&id);
                    Ok(())
                }
                Some(_) => Err(format!("token {id} still holds funds")),
                None => Err(format!("token {id} not wrapped")),
            },
            "lock" | "mint" => {
                let amount = quantity(1)?;
                let token = state.tokens.get(&id).ok_or_else(|| format!("token {id} not wrapped"))?;
                let debit = (method == "lock").then(|| token.owner.clone());
                Self::transfer(state, method, debit.as_deref(), Some(WRAPPER_ADDRESS), amount)?;
                if let Some(token) = state.tokens.get_mut(&id) {
                    token.amount += amount;
                }
                Ok(())
            }
            "unlock" | "burn" | "assign" => {
                let index = if method == "assign" { 2 } else { 1 };
                let amount = quantity(index)?;
                let token = state.tokens.get(&id).ok_or_else(|| format!("token {id} not wrapped"))?;
                let remaining = token
                    .amount
                    .checked_sub(amount)
                    .ok_or_else(|| format!("{method}: insufficient wrapped amount"))?;
                let credit = match method {
                    "unlock" => Some(token.owner.clone()),
                    "assign" => params.get(1).and_then(Value::as_str).map(String::from),
                    _ => None,
                };
                Self::transfer(state, method, Some(WRAPPER_ADDRESS), credit.as_deref(), amount)?;
                if let Some(token) = state.tokens.get_mut(&id) {
                    token.amount = remaining;
                    if method == "assign" {
                        if let Some(to) = credit {
                            token.owner = to;
                        }
                    }
                }
                Ok(())
            }
            other => Err(format!("unknown method {other}")),
        }
    }

    /// Move `amount` between balances; `None` mints or burns on that side.
    fn transfer(
        state: &mut LedgerState,
        method: &str,
        from: Option<&str>,
        to: Option<&str>,
        amount: u128,
    ) -> Result<(), String> {
        if let Some(from) = from {
            let balance = state.balances.entry(from.to_string()).or_default();
            *balance = balance
                .checked_sub(amount)
                .ok_or_else(|| format!("{method}: {from} balance too low"))?;
        }
        if let Some(to) = to {
            *state.balances.entry(to.to_string()).or_default() += amount;
        }
        Ok(())
    }

    fn call(state: &LedgerState, method: &str, params: &[Value]) -> Value {
        match method {
            "getAllAssetsIDs" => json!(state.tokens.keys().collect::<Vec<_>>()),
            "getToken" => {
                let id = params.first().and_then(Value::as_str).unwrap_or_default();
                match state.tokens.get(id) {
                    Some(token) => json!({
                        "contractName": token.contract_name,
                        "tokenId": id,
                        "referenceId": token.reference_id,
                        "contractAddress": token.contract_address,
                        "tokenType": token.token_type.to_string(),
                        "owner": token.owner,
                        "amount": token.amount.to_string(),
                        "ercTokenStandard": 0
                    }),
                    None => Value::Null,
                }
            }
            _ => Value::Null,
        }
    }
}

#[async_trait]
impl EvmConnector for WrapperLedger {
    async fn deploy_contract(&self, _request: EvmDeployRequest) -> Result<EvmDeployResponse, ConnectorError> {
        Ok(EvmDeployResponse {
            transaction_receipt: Some(EvmTransactionReceipt {
                transaction_hash: "0xdeploy".to_string(),
                contract_address: Some(WRAPPER_ADDRESS.to_string()),
                ..Default::default()
            }),
        })
    }

    async fn invoke_contract(&self, request: EvmInvokeRequest) -> Result<EvmInvokeResponse, ConnectorError> {
        let mut state = self.state.lock();
        if state.failing.contains(&request.method_name) {
            return Err(ConnectorError::Rejected(format!("{} reverted", request.method_name)));
        }
        match request.invocation_type {
            InvocationType::Call => Ok(EvmInvokeResponse {
                success: true,
                transaction_receipt: None,
                call_output: Some(Self::call(&state, &request.method_name, &request.params)),
            }),
            InvocationType::Send => {
                Self::apply(&mut state, &request.method_name, &request.params).map_err(ConnectorError::Rejected)?;
                state.transactions += 1;
                state.calls.push(request.method_name.clone());
                Ok(EvmInvokeResponse {
                    success: true,
                    transaction_receipt: Some(EvmTransactionReceipt {
                        transaction_hash: format!("0x{:04x}", state.transactions),
                        ..Default::default()
                    }),
                    call_output: None,
                })
            }
        }
    }

    async fn get_transaction(&self, transaction_hash: &str) -> Result<Value, ConnectorError> {
        Ok(json!({"hash": transaction_hash, "status": true}))
    }

    async fn invoke_raw_web3_eth_method(&self, method: &str, _params: Vec<Value>) -> Result<Value, ConnectorError> {
        match method {
            "getCode" => Ok(json!("0x6080ab")),
            other => Err(ConnectorError::Rejected(format!("unsupported method {other}"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ontologies and bridges
// ─────────────────────────────────────────────────────────────────────────────

pub fn besu_network() -> NetworkId {
    NetworkId::new("BesuLedgerTestNetwork", LedgerType::Besu2X)
}

/// Unsigned BESU_2X ontology for `id`.
pub fn token_ontology(id: &str) -> Value {
    let function = |signature: &str, variables: &[&str]| {
        json!({"functionSignature": signature, "variables": variables, "available": true})
    };
    json!({
        "name": "SATPToken",
        "id": id,
        "type": "BESU_2X",
        "contract": "SATPTokenContract",
        "ontology": {
            "lock": [function("transfer(address,address,uint256)", &["owner", "bridge", "amount"])],
            "unlock": [function("transfer(address,address,uint256)", &["bridge", "owner", "amount"])],
            "mint": [function("mint(address,uint256)", &["bridge", "amount"])],
            "burn": [function("burn(address,uint256)", &["bridge", "amount"])],
            "assign": [function("assign(address,address,uint256)", &["bridge", "receiver", "amount"])],
            "checkPermission": [function("hasPermission(address)", &["bridge"])]
        },
        "bytecode": "0x6080AB",
        "hash": "",
        "signature": ""
    })
}

pub fn ontology_manager() -> Arc<OntologyManager> {
    let documents = vec![("token1.json", token_ontology(TOKEN_REFERENCE).to_string())];
    Arc::new(OntologyManager::from_documents(OntologyCheckLevel::Default, vec![], documents).unwrap())
}

pub fn credential() -> Web3SigningCredential {
    Web3SigningCredential::PrivateKeyHex {
        eth_account: "0xbridge".to_string(),
        secret: "00".to_string(),
    }
}

/// Bridge manager with one Besu leaf on `ledger`, wrapper already deployed.
pub async fn bridge_manager(ledger: Arc<WrapperLedger>) -> Arc<BridgeManager> {
    let manager = BridgeManager::with_ontology_manager(ontology_manager());
    let mut options = BesuLeafOptions::new(besu_network(), ledger, credential());
    options.leaf_id = Some("besu-leaf".to_string());
    options.wrapper_contract_name = Some(WRAPPER_NAME.to_string());
    options.wrapper_contract_address = Some(WRAPPER_ADDRESS.to_string());
    manager.deploy_leaf(LeafOptions::Besu(options)).await.unwrap();
    Arc::new(manager)
}

pub fn session_asset(id: &str, owner: &str, amount: u128) -> SessionAsset {
    SessionAsset {
        token_id: id.to_string(),
        reference_id: TOKEN_REFERENCE.to_string(),
        owner: owner.to_string(),
        contract_name: "SATPTokenContract".to_string(),
        contract_address: "0xtoken".to_string(),
        amount: Amount::new(amount),
        network_id: Some(besu_network()),
        token_type: Some(TokenType::NonstandardFungible),
        ..Default::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateways
// ─────────────────────────────────────────────────────────────────────────────

/// Counterparty that forwards every message to a peer crash manager.
#[derive(Default)]
pub struct PeerGateway {
    peer: RwLock<Weak<Gateway>>,
}

impl PeerGateway {
    pub fn connect(&self, peer: &Arc<Gateway>) {
        *self.peer.write() = Arc::downgrade(peer);
    }

    fn peer(&self) -> Result<Arc<Gateway>, RecoveryError> {
        self.peer.read().upgrade().ok_or_else(|| RecoveryError::Counterparty {
            context: "PeerGateway".to_string(),
            reason: "peer gateway is gone".to_string(),
        })
    }
}

#[async_trait]
impl CounterpartyGateway for PeerGateway {
    async fn recover(&self, message: RecoverMessage) -> Result<RecoverUpdateMessage, RecoveryError> {
        self.peer()?.handle_recover_request(message).await
    }

    async fn recover_success(&self, message: RecoverSuccessMessage) -> Result<(), RecoveryError> {
        self.peer()?.handle_recover_success(message).await
    }

    async fn rollback(&self, message: RollbackMessage) -> Result<RollbackAckMessage, RecoveryError> {
        self.peer()?.handle_rollback_request(message).await
    }
}

/// Client and server gateways connected to each other.
pub struct GatewayPair {
    pub client: Arc<Gateway>,
    pub server: Arc<Gateway>,
    pub client_ledger: Arc<WrapperLedger>,
    pub server_ledger: Arc<WrapperLedger>,
}

impl GatewayPair {
    pub async fn new() -> Self {
        let client_ledger = WrapperLedger::new();
        let server_ledger = WrapperLedger::new();
        let client_link = Arc::new(PeerGateway::default());
        let server_link = Arc::new(PeerGateway::default());

        let client = Arc::new(CrashManager::new(CrashManagerOptions::new(
            Arc::new(InMemoryLogRepository::new()),
            bridge_manager(client_ledger.clone()).await,
            client_link.clone(),
            SigningKey::from_bytes(&[1u8; 32]),
        )));
        let server = Arc::new(CrashManager::new(CrashManagerOptions::new(
            Arc::new(InMemoryLogRepository::new()),
            bridge_manager(server_ledger.clone()).await,
            server_link.clone(),
            SigningKey::from_bytes(&[2u8; 32]),
        )));
        client_link.connect(&server);
        server_link.connect(&client);

        Self {
            client,
            server,
            client_ledger,
            server_ledger,
        }
    }

    /// Session data for `role` with both gateway keys and both assets filled in.
    pub fn session_data(&self, role: SessionRole) -> SessionData {
        let mut data = SessionData::new(SESSION_ID, "ctx-1", role);
        data.digital_asset_id = "asset-1".to_string();
        data.client_gateway_pubkey = self.client.public_key();
        data.server_gateway_pubkey = self.server.public_key();
        data.sender_gateway_network_id = besu_network().id;
        data.recipient_gateway_network_id = besu_network().id;
        data.sender_asset = Some(session_asset("asset-1", "0xalice", 100));
        data.receiver_asset = Some(session_asset("asset-1", "0xbob", 100));
        data.max_retries = 2;
        data.max_timeout = 60_000;
        data
    }
}

/// Record `messages` as exchanged, each with a dummy hash.
pub fn exchange(data: &mut SessionData, messages: &[MessageType]) {
    for message in messages {
        data.save_hash(*message, format!("hash-{message:?}"));
    }
}

/// Log row holding `data`, stamped now.
pub fn log_row(data: &SessionData, log_type: &str, operation: &str, sequence_number: u64) -> LocalLog {
    LocalLog::new(
        data.id.clone(),
        log_type,
        operation,
        chrono::Utc::now().timestamp_millis().to_string(),
        serde_json::to_string(data).unwrap(),
        sequence_number,
    )
}
