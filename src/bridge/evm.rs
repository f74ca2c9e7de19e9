//! EVM wrapper-contract leaf, shared by Besu and Ethereum.
//!
//! The two EVM leaves drive the same `SATPWrapperContract` ABI and differ only
//! in a handful of ledger details, captured by [`EvmFlavor`]:
//!
//! | Detail | Besu | Ethereum |
//! |--------|------|----------|
//! | accepted ledgers | `BESU_1X`, `BESU_2X` | `ETHEREUM` |
//! | ontology ledger type | `BESU_2X` | `ETHEREUM` |
//! | receipt lookup | connector `getTransaction` | raw web3 `getTransaction` |
//! | Bungee strategy | Besu | Ethereum |
//!
//! Every invocation passes the wrapper's *name* as `contractName` and its
//! *address* as `contractAddress`.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::bungee::{BungeeFactory, BungeeHermes, BungeeStrategy, NetworkDetails, MAX_SAFE_INTEGER};
use super::connector::{
    EvmConnector, EvmDeployRequest, EvmInvokeRequest, EvmInvokeResponse, EvmTransactionReceipt,
    Web3SigningCredential,
};
use super::error::BridgeError;
use super::{create_leaf_id, proof_for, with_default_claim, BridgeLeaf};
use crate::canonical::stable_stringify;
use crate::ontology::{BytecodeSource, OntologyManager};
use crate::telemetry::SpanScope;
use crate::types::asset::{code_from_json, Amount, Asset, AssetAttribute, TokenResponse, TokenType, UniqueTokenId};
use crate::types::network::{ClaimFormat, LedgerType, NetworkId};
use crate::types::transaction::{InvocationType, TransactionResponse};

/// Gas limit used when none is configured.
pub const DEFAULT_GAS: u64 = 6_000_000;

/// Where an EVM leaf fetches transactions for `getReceipt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptSource {
    /// Connector `getTransaction`.
    ConnectorTransaction,
    /// Raw `web3.eth.getTransaction`.
    RawWeb3,
}

/// Ledger details that distinguish the EVM leaves.
pub trait EvmFlavor: Send + Sync + 'static {
    /// Name used in span tags and generated ids.
    const CLASS_NAME: &'static str;
    /// Bungee strategy registered for the network.
    const STRATEGY: BungeeStrategy;
    /// Receipt lookup path.
    const RECEIPT_SOURCE: ReceiptSource;

    /// Whether the leaf can serve `ledger_type`.
    fn accepts(ledger_type: LedgerType) -> bool;

    /// Ledger type under which this leaf's ontologies are registered.
    fn ontology_ledger(network: &NetworkId) -> LedgerType;
}

/// Gas configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasConfig {
    /// Explicit gas.
    Gas(u64),
    /// Gas limit.
    GasLimit(u64),
}

impl GasConfig {
    fn value(&self) -> u64 {
        match self {
            Self::Gas(g) | Self::GasLimit(g) => *g,
        }
    }
}

/// Construction options for an EVM leaf.
#[derive(Clone)]
pub struct EvmLeafOptions {
    /// Network the leaf serves.
    pub network_identification: NetworkId,
    /// Leaf id; generated when absent.
    pub leaf_id: Option<String>,
    /// Leaf key; generated when absent.
    pub key_pair: Option<SigningKey>,
    /// Ledger connector.
    pub connector: Option<Arc<dyn EvmConnector>>,
    /// Transaction signer.
    pub signing_credential: Web3SigningCredential,
    /// Gas configuration.
    pub gas_config: Option<GasConfig>,
    /// Claim formats besides `DEFAULT`.
    pub claim_formats: Vec<ClaimFormat>,
    /// Bungee factory, used when `BUNGEE` is enabled.
    pub bungee_factory: Option<Arc<dyn BungeeFactory>>,
    /// Existing wrapper contract name.
    pub wrapper_contract_name: Option<String>,
    /// Existing wrapper contract address.
    pub wrapper_contract_address: Option<String>,
}

impl EvmLeafOptions {
    /// Options with a connector and credential and everything else defaulted.
    pub fn new(
        network_identification: NetworkId,
        connector: Arc<dyn EvmConnector>,
        signing_credential: Web3SigningCredential,
    ) -> Self {
        Self {
            network_identification,
            leaf_id: None,
            key_pair: None,
            connector: Some(connector),
            signing_credential,
            gas_config: None,
            claim_formats: Vec::new(),
            bungee_factory: None,
            wrapper_contract_name: None,
            wrapper_contract_address: None,
        }
    }
}

#[derive(Debug, Clone)]
struct WrapperDeployment {
    name: String,
    address: String,
    receipt: Option<EvmTransactionReceipt>,
}

/// Bridge leaf for an EVM ledger.
pub struct EvmLeaf<F: EvmFlavor> {
    id: String,
    network_identification: NetworkId,
    key_pair: SigningKey,
    connector: Arc<dyn EvmConnector>,
    signing_credential: Web3SigningCredential,
    gas: u64,
    claim_formats: Vec<ClaimFormat>,
    bungee: Option<Arc<dyn BungeeHermes>>,
    ontology_manager: Arc<OntologyManager>,
    wrapper: RwLock<Option<WrapperDeployment>>,
    deploy_lock: tokio::sync::Mutex<()>,
    _flavor: PhantomData<F>,
}

impl<F: EvmFlavor> EvmLeaf<F> {
    fn tag(op: &str) -> String {
        format!("{}#{}", F::CLASS_NAME, op)
    }

    /// Validate options and build the leaf.
    pub fn new(options: EvmLeafOptions, ontology_manager: Arc<OntologyManager>) -> Result<Self, BridgeError> {
        let fn_tag = Self::tag("constructor");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            let ledger_type = options.network_identification.ledger_type;
            if !F::accepts(ledger_type) {
                return Err(BridgeError::UnsupportedNetwork {
                    context: fn_tag.clone(),
                    ledger_type,
                });
            }

            let id = options.leaf_id.clone().unwrap_or_else(|| create_leaf_id(F::CLASS_NAME));
            let key_pair = options
                .key_pair
                .clone()
                .unwrap_or_else(|| SigningKey::generate(&mut rand::rngs::OsRng));
            let claim_formats = with_default_claim(options.claim_formats.clone());

            let connector = options.connector.clone().ok_or_else(|| BridgeError::ConnectorOptions {
                context: fn_tag.clone(),
                reason: "an EVM connector is required".to_string(),
            })?;

            let gas = options.gas_config.map(|g| g.value()).unwrap_or(DEFAULT_GAS);

            if options.signing_credential.is_none() {
                return Err(BridgeError::NoSigningCredential { context: fn_tag.clone() });
            }

            let mut bungee = None;
            for claim in &claim_formats {
                match claim {
                    ClaimFormat::Bungee => match &options.bungee_factory {
                        Some(factory) => {
                            bungee = Some(factory.create(&options.network_identification.id, F::STRATEGY));
                        }
                        None => {
                            tracing::warn!(leaf_id = %id, "BUNGEE enabled without a factory, proofs will fail");
                        }
                    },
                    ClaimFormat::Default => {}
                    ClaimFormat::Unknown(_) => {
                        return Err(BridgeError::ClaimFormat {
                            context: fn_tag.clone(),
                            claim_format: claim.to_string(),
                        })
                    }
                }
            }

            let wrapper = match (&options.wrapper_contract_name, &options.wrapper_contract_address) {
                (Some(name), Some(address)) => Some(WrapperDeployment {
                    name: name.clone(),
                    address: address.clone(),
                    receipt: None,
                }),
                (None, None) => {
                    tracing::debug!(leaf_id = %id, "no wrapper contract provided, creation required");
                    None
                }
                _ => {
                    return Err(BridgeError::InvalidWrapperContract {
                        context: fn_tag.clone(),
                        reason: "contract name or contract address missing".to_string(),
                    })
                }
            };

            Ok(Self {
                id,
                network_identification: options.network_identification.clone(),
                key_pair,
                connector,
                signing_credential: options.signing_credential.clone(),
                gas,
                claim_formats,
                bungee,
                ontology_manager,
                wrapper: RwLock::new(wrapper),
                deploy_lock: tokio::sync::Mutex::new(()),
                _flavor: PhantomData,
            })
        })
    }

    /// Public half of the leaf key.
    pub fn public_key(&self) -> VerifyingKey {
        self.key_pair.verifying_key()
    }

    /// Configured gas limit.
    pub fn gas(&self) -> u64 {
        self.gas
    }

    /// Deploy the wrapper contract under `contract_name` or `{id}-wrapper-contract`.
    pub async fn deploy_wrapper_contract(&self, contract_name: Option<&str>) -> Result<(), BridgeError> {
        let fn_tag = Self::tag("deployWrapperContract");
        SpanScope::start(fn_tag.clone())
            .run(async {
                // Held across the connector await: the deployed contract is write-once.
                let _guard = self.deploy_lock.lock().await;
                if self.wrapper.read().is_some() {
                    return Err(BridgeError::WrapperContractAlreadyCreated { context: fn_tag.clone() });
                }

                let name = contract_name
                    .map(String::from)
                    .unwrap_or_else(|| format!("{}-wrapper-contract", self.id));
                let eth_account = self.signing_credential.eth_account().unwrap_or_default();

                let response = self
                    .connector
                    .deploy_contract(EvmDeployRequest {
                        contract_name: name.clone(),
                        constructor_args: vec![json!(eth_account)],
                        signing_credential: self.signing_credential.clone(),
                        gas: self.gas,
                    })
                    .await
                    .map_err(|e| BridgeError::connector(&fn_tag, e))?;

                let receipt = response
                    .transaction_receipt
                    .ok_or_else(|| BridgeError::TransactionReceipt { context: fn_tag.clone() })?;
                let address = receipt
                    .contract_address
                    .clone()
                    .ok_or_else(|| BridgeError::ContractAddress { context: fn_tag.clone() })?;

                tracing::info!(leaf_id = %self.id, contract = %name, address = %address, "wrapper contract deployed");
                *self.wrapper.write() = Some(WrapperDeployment {
                    name,
                    address,
                    receipt: Some(receipt),
                });
                Ok(())
            })
            .await
    }

    /// Receipt of the wrapper deployment.
    pub fn get_deploy_wrapper_contract_receipt(&self) -> Result<EvmTransactionReceipt, BridgeError> {
        self.wrapper
            .read()
            .as_ref()
            .and_then(|w| w.receipt.clone())
            .ok_or_else(|| BridgeError::Receipt {
                context: Self::tag("getDeployWrapperContractReceipt"),
            })
    }

    /// Deployed bytecode at `address`.
    pub async fn get_contract_bytecode(&self, address: &str) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getContractBytecode");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let code = self
                    .connector
                    .invoke_raw_web3_eth_method("getCode", vec![json!(address), json!("latest")])
                    .await
                    .map_err(|e| BridgeError::connector(&fn_tag, e))?;
                match code {
                    Value::String(s) => Ok(s),
                    other => Err(BridgeError::Serialization {
                        context: fn_tag.clone(),
                        reason: format!("unexpected getCode output: {other}"),
                    }),
                }
            })
            .await
    }

    fn deployed(&self, fn_tag: &str) -> Result<(String, String), BridgeError> {
        self.wrapper
            .read()
            .as_ref()
            .map(|w| (w.name.clone(), w.address.clone()))
            .ok_or_else(|| BridgeError::not_deployed(fn_tag))
    }

    async fn invoke(
        &self,
        fn_tag: &str,
        invocation_type: InvocationType,
        method_name: &str,
        params: Vec<Value>,
    ) -> Result<EvmInvokeResponse, BridgeError> {
        let (contract_name, contract_address) = self.deployed(fn_tag)?;
        let response = self
            .connector
            .invoke_contract(EvmInvokeRequest {
                contract_name,
                contract_address,
                invocation_type,
                method_name: method_name.to_string(),
                params,
                signing_credential: self.signing_credential.clone(),
                gas: self.gas,
            })
            .await
            .map_err(|e| BridgeError::transaction(fn_tag, e))?;

        if !response.success {
            return Err(BridgeError::Transaction {
                context: fn_tag.to_string(),
                reason: format!("{method_name} reported failure"),
            });
        }
        Ok(response)
    }

    async fn send(&self, op: &str, method_name: &str, params: Vec<Value>) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = Self::tag(op);
        SpanScope::start(fn_tag.clone())
            .run(async {
                tracing::debug!(leaf_id = %self.id, method = method_name, "sending wrapper transaction");
                let response = self.invoke(&fn_tag, InvocationType::Send, method_name, params).await?;
                Ok::<_, BridgeError>(send_response(response))
            })
            .await
    }

    fn address_for(&self, token_type: TokenType) -> Option<String> {
        match token_type {
            TokenType::NonstandardFungible | TokenType::NonstandardNonfungible => {
                self.wrapper.read().as_ref().map(|w| w.address.clone())
            }
            _ => None,
        }
    }
}

fn send_response(response: EvmInvokeResponse) -> TransactionResponse {
    let receipt = response.transaction_receipt.unwrap_or_default();
    TransactionResponse {
        transaction_id: receipt.transaction_hash.clone(),
        transaction_receipt: Some(stable_stringify(&receipt)),
        output: None,
    }
}

/// Map a raw `getToken` result onto the common asset shape.
pub(crate) fn token_to_asset(fn_tag: &str, token: TokenResponse, network: &NetworkId) -> Result<Asset, BridgeError> {
    let erc = token
        .erc_token_standard
        .as_ref()
        .and_then(code_from_json)
        .map(crate::types::asset::ErcTokenStandard::from_code)
        .unwrap_or_default();

    match code_from_json(&token.token_type).and_then(TokenType::from_code) {
        Some(TokenType::NonstandardFungible) => {
            let amount = Amount::from_json(&token.amount).ok_or_else(|| BridgeError::Serialization {
                context: fn_tag.to_string(),
                reason: format!("invalid amount {}", token.amount),
            })?;
            Ok(Asset::fungible(
                token.token_id,
                token.reference_id,
                token.owner,
                token.contract_name,
                network.clone(),
                amount,
            )
            .with_evm(token.contract_address, erc))
        }
        Some(TokenType::NonstandardNonfungible) => {
            let descriptor = match &token.amount {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(Asset::non_fungible(
                token.token_id,
                token.reference_id,
                token.owner,
                token.contract_name,
                network.clone(),
                UniqueTokenId::new(descriptor),
            )
            .with_evm(token.contract_address, erc))
        }
        _ => Err(BridgeError::UnexpectedTokenType {
            context: fn_tag.to_string(),
            token_type: token.token_type.to_string(),
        }),
    }
}

#[async_trait]
impl<F: EvmFlavor> BridgeLeaf for EvmLeaf<F> {
    fn id(&self) -> &str {
        &self.id
    }

    fn network_identification(&self) -> &NetworkId {
        &self.network_identification
    }

    fn supported_claim_formats(&self) -> &[ClaimFormat] {
        &self.claim_formats
    }

    async fn deploy_contracts(&self) -> Result<(), BridgeError> {
        let scope = SpanScope::start(Self::tag("deployContracts"));
        let result = tracing::Instrument::instrument(self.deploy_wrapper_contract(None), scope.span().clone()).await;
        match result {
            Err(err) if err.is_already_created() => {
                tracing::debug!(leaf_id = %self.id, "wrapper contract already deployed");
                scope.finish_ok_with(Err(err))
            }
            other => scope.finish(other),
        }
    }

    fn get_wrapper_contract(&self, token_type: TokenType) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getWrapperContract");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            self.address_for(token_type).ok_or_else(|| BridgeError::WrapperContract {
                context: fn_tag.clone(),
                reason: format!("no wrapper contract for token type {token_type}"),
            })
        })
    }

    fn get_approve_address(&self, token_type: TokenType) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getApproveAddress");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            self.address_for(token_type).ok_or_else(|| BridgeError::ApproveAddress {
                context: fn_tag.clone(),
                reason: format!("no approve address for token type {token_type}"),
            })
        })
    }

    async fn wrap_asset(&self, asset: &Asset) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = Self::tag("wrapAsset");
        SpanScope::start(fn_tag.clone())
            .run(async {
                tracing::debug!(leaf_id = %self.id, asset_id = %asset.id, owner = %asset.owner, "wrapping asset");

                let interactions = self
                    .ontology_manager
                    .get_ontology_interactions(F::ontology_ledger(&self.network_identification), &asset.reference_id)?;

                match asset.token_type {
                    TokenType::NonstandardFungible | TokenType::NonstandardNonfungible => {}
                    other => {
                        return Err(BridgeError::WrapperContract {
                            context: fn_tag.clone(),
                            reason: format!("token type {other} cannot be wrapped"),
                        })
                    }
                }

                let erc = match &asset.ledger {
                    crate::types::asset::LedgerDetails::Evm { erc_token_standard, .. } => *erc_token_standard,
                    _ => Default::default(),
                };
                let params = vec![
                    json!(asset.contract_name),
                    json!(asset.contract_address().unwrap_or_default()),
                    json!(asset.token_type.code()),
                    json!(asset.id),
                    json!(asset.reference_id),
                    json!(asset.owner),
                    serde_json::to_value(&interactions).map_err(|e| BridgeError::Serialization {
                        context: fn_tag.clone(),
                        reason: e.to_string(),
                    })?,
                    json!(erc.code()),
                ];

                let response = self.invoke(&fn_tag, InvocationType::Send, "wrap", params).await?;
                Ok(send_response(response))
            })
            .await
    }

    async fn unwrap_asset(&self, asset_id: &str) -> Result<TransactionResponse, BridgeError> {
        self.send("unwrapAsset", "unwrap", vec![json!(asset_id)]).await
    }

    async fn lock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("lockAsset", "lock", vec![json!(asset_id), attribute.to_param()]).await
    }

    async fn unlock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("unlockAsset", "unlock", vec![json!(asset_id), attribute.to_param()]).await
    }

    async fn mint_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("mintAsset", "mint", vec![json!(asset_id), attribute.to_param()]).await
    }

    async fn burn_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("burnAsset", "burn", vec![json!(asset_id), attribute.to_param()]).await
    }

    async fn assign_asset(
        &self,
        asset_id: &str,
        to: &str,
        attribute: &AssetAttribute,
    ) -> Result<TransactionResponse, BridgeError> {
        self.send("assignAsset", "assign", vec![json!(asset_id), json!(to), attribute.to_param()])
            .await
    }

    async fn get_assets(&self) -> Result<Vec<String>, BridgeError> {
        let fn_tag = Self::tag("getAssets");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let response = self.invoke(&fn_tag, InvocationType::Call, "getAllAssetsIDs", vec![]).await?;
                serde_json::from_value(response.call_output.unwrap_or(Value::Array(vec![]))).map_err(|e| {
                    BridgeError::Serialization {
                        context: fn_tag.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .await
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Asset, BridgeError> {
        let fn_tag = Self::tag("getAsset");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let response = self
                    .invoke(&fn_tag, InvocationType::Call, "getToken", vec![json!(asset_id)])
                    .await?;
                let token: TokenResponse = serde_json::from_value(response.call_output.unwrap_or(Value::Null))
                    .map_err(|e| BridgeError::Serialization {
                        context: fn_tag.clone(),
                        reason: e.to_string(),
                    })?;
                tracing::debug!(leaf_id = %self.id, asset_id, token_type = %token.token_type, "retrieved asset");
                token_to_asset(&fn_tag, token, &self.network_identification)
            })
            .await
    }

    async fn run_transaction(
        &self,
        method_name: &str,
        params: Vec<Value>,
        invocation_type: InvocationType,
    ) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = Self::tag("runTransaction");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let response = self.invoke(&fn_tag, invocation_type, method_name, params).await?;
                let output = response.call_output.clone();
                let mut out = match response.transaction_receipt {
                    Some(_) => send_response(response),
                    None => TransactionResponse::default(),
                };
                out.output = output;
                Ok::<_, BridgeError>(out)
            })
            .await
    }

    async fn get_receipt(&self, transaction_id: &str) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getReceipt");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let receipt = match F::RECEIPT_SOURCE {
                    ReceiptSource::ConnectorTransaction => self.connector.get_transaction(transaction_id).await,
                    ReceiptSource::RawWeb3 => {
                        self.connector
                            .invoke_raw_web3_eth_method("getTransaction", vec![json!(transaction_id)])
                            .await
                    }
                }
                .map_err(|e| BridgeError::connector(&fn_tag, e))?;
                Ok::<_, BridgeError>(stable_stringify(&receipt))
            })
            .await
    }

    async fn get_view(&self, asset_id: &str) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getView");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let (contract_name, contract_address) = self.deployed(&fn_tag)?;
                let bungee = self
                    .bungee
                    .as_ref()
                    .ok_or_else(|| BridgeError::Bungee { context: fn_tag.clone() })?;

                let details = NetworkDetails {
                    contract_name,
                    contract_address: Some(contract_address),
                    channel_name: None,
                    participant: self.id.clone(),
                };
                let snapshot = bungee
                    .generate_snapshot(vec![asset_id.to_string()], &self.network_identification.id, &details)
                    .await
                    .map_err(|e| BridgeError::connector(&fn_tag, e))?;
                let generated = bungee.generate_view(&snapshot, "0", &MAX_SAFE_INTEGER.to_string(), None);
                if generated.view.is_none() {
                    return Err(BridgeError::View { context: fn_tag.clone() });
                }
                Ok(stable_stringify(&generated))
            })
            .await
    }

    async fn get_proof(&self, asset: &Asset, claim_format: ClaimFormat) -> Result<String, BridgeError> {
        let fn_tag = Self::tag("getProof");
        let has_bungee = self.bungee.is_some();
        SpanScope::start(fn_tag.clone())
            .run(proof_for(self, &fn_tag, has_bungee, asset, claim_format))
            .await
    }
}

#[async_trait]
impl<F: EvmFlavor> BytecodeSource for EvmLeaf<F> {
    type Error = BridgeError;

    async fn get_contract_bytecode(&self, address: &str) -> Result<String, BridgeError> {
        EvmLeaf::get_contract_bytecode(self, address).await
    }
}
