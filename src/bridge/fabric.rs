//! Hyperledger Fabric leaf.
//!
//! Drives the fungible SATP wrapper chaincode. Every argument is passed as a
//! string, and a submitted transaction without a transaction id is a failure.
//!
//! Deployment goes through three extra steps after the chaincode is
//! committed: `Initialize[mspId]`, `ClientAccountID` (the leaf's own client id,
//! kept as the bridge id) and `setBridge[mspId, bridgeId]`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::RwLock;
use serde_json::Value;

use super::bungee::{BungeeFactory, BungeeHermes, BungeeStrategy, NetworkDetails, MAX_SAFE_INTEGER};
use super::connector::{
    FabricConnector, FabricDeployRequest, FabricDeployResponse, FabricSigningCredential, FabricTransactRequest,
    FabricTransactResponse, FileBase64,
};
use super::error::BridgeError;
use super::{create_leaf_id, proof_for, with_default_claim, BridgeLeaf};
use crate::canonical::stable_stringify;
use crate::ontology::OntologyManager;
use crate::telemetry::SpanScope;
use crate::types::asset::{
    code_from_json, Amount, Asset, AssetAttribute, FabricToken, LedgerDetails, TokenType, UniqueTokenId,
};
use crate::types::network::{ClaimFormat, LedgerType, NetworkId};
use crate::types::transaction::{InvocationType, TransactionResponse};

const CLASS_NAME: &str = "FabricLeaf";

/// Chaincode sources shipped on deployment, as `(directory, file)`.
const WRAPPER_SOURCE_FILES: [(&str, &str); 7] = [
    ("./", "tsconfig.json"),
    ("./", "package.json"),
    ("./src/", "index.ts"),
    ("./src/", "interaction-signature.ts"),
    ("./src/", "ITraceableContract.ts"),
    ("./src/", "satp-wrapper.ts"),
    ("./src/", "token.ts"),
];

/// Chaincode lifecycle parameters required to deploy the wrapper.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FabricDeployOptions {
    /// Organizations that approve the chaincode.
    pub target_organizations: Vec<Value>,
    /// Orderer TLS CA file.
    pub ca_file: String,
    /// Lifecycle sequence number.
    pub cc_sequence: u32,
    /// Orderer endpoint.
    pub orderer: String,
    /// Orderer TLS host override.
    pub orderer_tls_hostname_override: String,
    /// Connection timeout in seconds.
    pub conn_timeout: Option<u64>,
    /// Endorsement policy.
    pub signature_policy: Option<String>,
    /// Directory holding the wrapper chaincode sources.
    pub wrapper_contract_dir: Option<PathBuf>,
}

impl FabricDeployOptions {
    fn is_complete(&self) -> bool {
        !self.target_organizations.is_empty()
            && !self.ca_file.is_empty()
            && self.cc_sequence > 0
            && !self.orderer.is_empty()
            && !self.orderer_tls_hostname_override.is_empty()
    }
}

/// Construction options for [`FabricLeaf`].
#[derive(Clone)]
pub struct FabricLeafOptions {
    /// Network the leaf serves.
    pub network_identification: NetworkId,
    /// Leaf id; generated when absent.
    pub leaf_id: Option<String>,
    /// Leaf key; generated when absent.
    pub key_pair: Option<SigningKey>,
    /// Ledger connector.
    pub connector: Option<Arc<dyn FabricConnector>>,
    /// Transaction signer.
    pub signing_credential: FabricSigningCredential,
    /// Channel of the wrapper chaincode.
    pub channel_name: Option<String>,
    /// MSP of the bridge identity.
    pub msp_id: Option<String>,
    /// Lifecycle parameters, required when no wrapper is given.
    pub deploy: Option<FabricDeployOptions>,
    /// Claim formats besides `DEFAULT`.
    pub claim_formats: Vec<ClaimFormat>,
    /// Bungee factory, used when `BUNGEE` is enabled.
    pub bungee_factory: Option<Arc<dyn BungeeFactory>>,
    /// Existing wrapper chaincode name.
    pub wrapper_contract_name: Option<String>,
}

impl FabricLeafOptions {
    /// Options with a connector, credential and channel and everything else defaulted.
    pub fn new(
        network_identification: NetworkId,
        connector: Arc<dyn FabricConnector>,
        signing_credential: FabricSigningCredential,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            network_identification,
            leaf_id: None,
            key_pair: None,
            connector: Some(connector),
            signing_credential,
            channel_name: Some(channel_name.into()),
            msp_id: None,
            deploy: None,
            claim_formats: Vec::new(),
            bungee_factory: None,
            wrapper_contract_name: None,
        }
    }
}

#[derive(Debug, Default)]
struct WrapperState {
    name: Option<String>,
    bridge_id: Option<String>,
    deploy_receipt: Option<FabricDeployResponse>,
}

/// Bridge leaf for Fabric networks.
pub struct FabricLeaf {
    id: String,
    network_identification: NetworkId,
    key_pair: SigningKey,
    connector: Arc<dyn FabricConnector>,
    signing_credential: FabricSigningCredential,
    channel_name: String,
    msp_id: Option<String>,
    deploy_options: Option<FabricDeployOptions>,
    claim_formats: Vec<ClaimFormat>,
    bungee: Option<Arc<dyn BungeeHermes>>,
    ontology_manager: Arc<OntologyManager>,
    wrapper: RwLock<WrapperState>,
    deploy_lock: tokio::sync::Mutex<()>,
}

fn tag(op: &str) -> String {
    format!("{CLASS_NAME}#{op}")
}

impl FabricLeaf {
    /// Validate options and build the leaf.
    pub fn new(options: FabricLeafOptions, ontology_manager: Arc<OntologyManager>) -> Result<Self, BridgeError> {
        let fn_tag = tag("constructor");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            let ledger_type = options.network_identification.ledger_type;
            if ledger_type != LedgerType::Fabric2 {
                return Err(BridgeError::UnsupportedNetwork {
                    context: fn_tag.clone(),
                    ledger_type,
                });
            }

            let id = options.leaf_id.clone().unwrap_or_else(|| create_leaf_id(CLASS_NAME));
            let key_pair = options
                .key_pair
                .clone()
                .unwrap_or_else(|| SigningKey::generate(&mut rand::rngs::OsRng));
            let claim_formats = with_default_claim(options.claim_formats.clone());

            let connector = options.connector.clone().ok_or_else(|| BridgeError::ConnectorOptions {
                context: fn_tag.clone(),
                reason: "a Fabric connector is required".to_string(),
            })?;

            let mut bungee = None;
            for claim in &claim_formats {
                match claim {
                    ClaimFormat::Bungee => {
                        if let Some(factory) = &options.bungee_factory {
                            bungee = Some(factory.create(&options.network_identification.id, BungeeStrategy::Fabric));
                        }
                    }
                    ClaimFormat::Default => {}
                    ClaimFormat::Unknown(_) => {
                        return Err(BridgeError::ClaimFormat {
                            context: fn_tag.clone(),
                            claim_format: claim.to_string(),
                        })
                    }
                }
            }

            let channel_name = options
                .channel_name
                .clone()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| BridgeError::ChannelName { context: fn_tag.clone() })?;

            let can_deploy = options.msp_id.as_deref().is_some_and(|m| !m.is_empty())
                && options.deploy.as_ref().is_some_and(FabricDeployOptions::is_complete);
            if options.wrapper_contract_name.is_none() && !can_deploy {
                return Err(BridgeError::InvalidWrapperContract {
                    context: fn_tag.clone(),
                    reason: "missing variables necessary to deploy the wrapper contract".to_string(),
                });
            }
            if options.wrapper_contract_name.is_none() {
                tracing::debug!(leaf_id = %id, "no wrapper contract provided, creation required");
            }

            Ok(Self {
                id,
                network_identification: options.network_identification.clone(),
                key_pair,
                connector,
                signing_credential: options.signing_credential.clone(),
                channel_name,
                msp_id: options.msp_id.clone(),
                deploy_options: options.deploy.clone(),
                claim_formats,
                bungee,
                ontology_manager,
                wrapper: RwLock::new(WrapperState {
                    name: options.wrapper_contract_name.clone(),
                    ..Default::default()
                }),
                deploy_lock: tokio::sync::Mutex::new(()),
            })
        })
    }

    /// Public half of the leaf key.
    pub fn public_key(&self) -> VerifyingKey {
        self.key_pair.verifying_key()
    }

    /// Bridge client id set at deployment.
    pub fn bridge_id(&self) -> Option<String> {
        self.wrapper.read().bridge_id.clone()
    }

    /// Deploy the wrapper chaincode under `contract_name` or a generated name.
    pub async fn deploy_wrapper_contract(&self, contract_name: Option<&str>) -> Result<(), BridgeError> {
        let fn_tag = tag("deployWrapperContract");
        SpanScope::start(fn_tag.clone())
            .run(async {
                // Held across the connector await: the deployed contract is write-once.
                let _guard = self.deploy_lock.lock().await;
                if self.wrapper.read().name.is_some() {
                    return Err(BridgeError::WrapperContractAlreadyCreated { context: fn_tag.clone() });
                }
                let missing = || BridgeError::WrapperContract {
                    context: fn_tag.clone(),
                    reason: "missing variables for contract creation".to_string(),
                };
                let deploy = self.deploy_options.as_ref().ok_or_else(missing)?;
                let msp_id = self.msp_id.clone().ok_or_else(missing)?;

                let name = contract_name
                    .map(String::from)
                    .unwrap_or_else(|| format!("{}-fungible-wrapper-contract", uuid::Uuid::new_v4()));
                let source_files = self.load_wrapper_sources(&fn_tag, deploy).await?;

                let receipt = self
                    .connector
                    .deploy_contract(FabricDeployRequest {
                        channel_id: self.channel_name.clone(),
                        cc_name: name.clone(),
                        cc_version: "1.0.0".to_string(),
                        cc_label: "fungible-wrapper-contract".to_string(),
                        cc_sequence: deploy.cc_sequence,
                        source_files,
                        target_organizations: deploy.target_organizations.clone(),
                        ca_file: deploy.ca_file.clone(),
                        orderer: deploy.orderer.clone(),
                        orderer_tls_hostname_override: deploy.orderer_tls_hostname_override.clone(),
                        conn_timeout: deploy.conn_timeout,
                        signature_policy: deploy.signature_policy.clone(),
                    })
                    .await
                    .map_err(|e| BridgeError::connector(&fn_tag, e))?;
                if !receipt.success {
                    return Err(BridgeError::TransactionReceipt { context: fn_tag.clone() });
                }
                tracing::debug!(leaf_id = %self.id, contract = %name, "wrapper chaincode committed");

                let init = self
                    .transact_raw(&fn_tag, &name, "Initialize", vec![msp_id.clone()], InvocationType::Send)
                    .await?;
                if init.transaction_id.is_empty() {
                    return Err(BridgeError::WrapperContract {
                        context: fn_tag.clone(),
                        reason: "wrapper contract initialization failed".to_string(),
                    });
                }

                let bridge = self
                    .transact_raw(&fn_tag, &name, "ClientAccountID", vec![], InvocationType::Call)
                    .await?;
                if bridge.function_output.is_empty() {
                    return Err(BridgeError::WrapperContract {
                        context: fn_tag.clone(),
                        reason: "bridge id retrieval failed".to_string(),
                    });
                }
                let bridge_id = bridge.function_output;

                let set_bridge = self
                    .transact_raw(&fn_tag, &name, "setBridge", vec![msp_id, bridge_id.clone()], InvocationType::Send)
                    .await?;
                if set_bridge.transaction_id.is_empty() {
                    return Err(BridgeError::WrapperContract {
                        context: fn_tag.clone(),
                        reason: "wrapper contract bridge setting failed".to_string(),
                    });
                }

                // Deployed only once the bridge identity is registered on the contract.
                {
                    let mut state = self.wrapper.write();
                    state.name = Some(name.clone());
                    state.bridge_id = Some(bridge_id.clone());
                    state.deploy_receipt = Some(receipt);
                }
                tracing::debug!(leaf_id = %self.id, bridge_id = %bridge_id, "bridge id set");
                tracing::info!(leaf_id = %self.id, contract = %name, "wrapper contract deployed");
                Ok(())
            })
            .await
    }

    async fn load_wrapper_sources(
        &self,
        fn_tag: &str,
        deploy: &FabricDeployOptions,
    ) -> Result<Vec<FileBase64>, BridgeError> {
        let Some(dir) = &deploy.wrapper_contract_dir else {
            return Ok(Vec::new());
        };
        let mut files = Vec::with_capacity(WRAPPER_SOURCE_FILES.len());
        for (relative, filename) in WRAPPER_SOURCE_FILES {
            let path = dir.join(relative).join(filename);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| BridgeError::WrapperContract {
                    context: fn_tag.to_string(),
                    reason: format!("reading {}: {e}", path.display()),
                })?;
            files.push(FileBase64 {
                body: base64::engine::general_purpose::STANDARD.encode(bytes),
                filepath: relative.to_string(),
                filename: filename.to_string(),
            });
        }
        Ok(files)
    }

    /// Receipt of the chaincode deployment.
    pub fn get_deploy_wrapper_contract_receipt(&self) -> Result<FabricDeployResponse, BridgeError> {
        self.wrapper
            .read()
            .deploy_receipt
            .clone()
            .ok_or_else(|| BridgeError::Receipt {
                context: tag("getDeployWrapperContractReceipt"),
            })
    }

    /// Client id of the leaf identity.
    pub async fn get_client_id(&self) -> Result<String, BridgeError> {
        let fn_tag = tag("getClientId");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let name = self.deployed(&fn_tag)?;
                let response = self
                    .transact_raw(&fn_tag, &name, "ClientAccountID", vec![], InvocationType::Call)
                    .await?;
                Ok::<_, BridgeError>(response.function_output)
            })
            .await
    }

    fn deployed(&self, fn_tag: &str) -> Result<String, BridgeError> {
        self.wrapper
            .read()
            .name
            .clone()
            .ok_or_else(|| BridgeError::not_deployed(fn_tag))
    }

    async fn transact_raw(
        &self,
        fn_tag: &str,
        contract_name: &str,
        method_name: &str,
        params: Vec<String>,
        invocation_type: InvocationType,
    ) -> Result<FabricTransactResponse, BridgeError> {
        self.connector
            .transact(FabricTransactRequest {
                signing_credential: self.signing_credential.clone(),
                channel_name: self.channel_name.clone(),
                contract_name: contract_name.to_string(),
                method_name: method_name.to_string(),
                params,
                invocation_type,
            })
            .await
            .map_err(|e| BridgeError::transaction(fn_tag, e))
    }

    async fn send(&self, op: &str, method_name: &str, params: Vec<String>) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = tag(op);
        SpanScope::start(fn_tag.clone())
            .run(async {
                let name = self.deployed(&fn_tag)?;
                tracing::debug!(leaf_id = %self.id, method = method_name, "submitting wrapper transaction");
                let response = self
                    .transact_raw(&fn_tag, &name, method_name, params, InvocationType::Send)
                    .await?;
                submitted(&fn_tag, method_name, response)
            })
            .await
    }

    async fn evaluate(&self, fn_tag: &str, method_name: &str, params: Vec<String>) -> Result<Value, BridgeError> {
        let name = self.deployed(fn_tag)?;
        let response = self
            .transact_raw(fn_tag, &name, method_name, params, InvocationType::Call)
            .await?;
        serde_json::from_str(&response.function_output).map_err(|e| BridgeError::Serialization {
            context: fn_tag.to_string(),
            reason: e.to_string(),
        })
    }
}

fn submitted(fn_tag: &str, method_name: &str, response: FabricTransactResponse) -> Result<TransactionResponse, BridgeError> {
    if response.transaction_id.is_empty() {
        return Err(BridgeError::Transaction {
            context: fn_tag.to_string(),
            reason: format!("{method_name} returned no transaction id"),
        });
    }
    Ok(TransactionResponse {
        transaction_id: response.transaction_id,
        transaction_receipt: None,
        output: Some(Value::String(response.function_output)),
    })
}

fn param_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl BridgeLeaf for FabricLeaf {
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
        let scope = SpanScope::start(tag("deployContracts"));
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
        let fn_tag = tag("getWrapperContract");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            if token_type.is_fungible() {
                self.deployed(&fn_tag)
            } else {
                Err(BridgeError::InvalidWrapperContract {
                    context: fn_tag.clone(),
                    reason: format!("no wrapper contract for token type {token_type}"),
                })
            }
        })
    }

    fn get_approve_address(&self, token_type: TokenType) -> Result<String, BridgeError> {
        let fn_tag = tag("getApproveAddress");
        SpanScope::start(fn_tag.clone()).run_sync(|| {
            if !token_type.is_fungible() {
                return Err(BridgeError::ApproveAddress {
                    context: fn_tag.clone(),
                    reason: format!("no approve address for token type {token_type}"),
                });
            }
            self.bridge_id().ok_or_else(|| BridgeError::ApproveAddress {
                context: fn_tag.clone(),
                reason: "bridge id not available".to_string(),
            })
        })
    }

    async fn wrap_asset(&self, asset: &Asset) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = tag("wrapAsset");
        SpanScope::start(fn_tag.clone())
            .run(async {
                tracing::debug!(leaf_id = %self.id, asset_id = %asset.id, owner = %asset.owner, "wrapping asset");
                let interactions = self
                    .ontology_manager
                    .get_ontology_interactions(LedgerType::Fabric2, &asset.reference_id)?;
                let name = self.deployed(&fn_tag)?;

                let LedgerDetails::Fabric { msp_id, channel_name } = &asset.ledger else {
                    return Err(BridgeError::WrapperContract {
                        context: fn_tag.clone(),
                        reason: format!("asset {} carries no Fabric details", asset.id),
                    });
                };

                let params = vec![
                    asset.token_type.code().to_string(),
                    asset.id.clone(),
                    asset.reference_id.clone(),
                    asset.owner.clone(),
                    msp_id.clone(),
                    channel_name.clone(),
                    asset.contract_name.clone(),
                    stable_stringify(&interactions),
                ];
                let response = self
                    .transact_raw(&fn_tag, &name, "wrap", params, InvocationType::Send)
                    .await?;
                submitted(&fn_tag, "wrap", response)
            })
            .await
    }

    async fn unwrap_asset(&self, asset_id: &str) -> Result<TransactionResponse, BridgeError> {
        self.send("unwrapAsset", "unwrap", vec![asset_id.to_string()]).await
    }

    async fn lock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("lockAsset", "lock", vec![asset_id.to_string(), attribute.to_string()])
            .await
    }

    async fn unlock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("unlockAsset", "unlock", vec![asset_id.to_string(), attribute.to_string()])
            .await
    }

    async fn mint_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("mintAsset", "mint", vec![asset_id.to_string(), attribute.to_string()])
            .await
    }

    async fn burn_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError> {
        self.send("burnAsset", "burn", vec![asset_id.to_string(), attribute.to_string()])
            .await
    }

    async fn assign_asset(
        &self,
        asset_id: &str,
        to: &str,
        attribute: &AssetAttribute,
    ) -> Result<TransactionResponse, BridgeError> {
        self.send(
            "assignAsset",
            "assign",
            vec![asset_id.to_string(), to.to_string(), attribute.to_string()],
        )
        .await
    }

    async fn get_assets(&self) -> Result<Vec<String>, BridgeError> {
        let fn_tag = tag("getAssets");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let output = self.evaluate(&fn_tag, "GetAssets", vec![]).await?;
                serde_json::from_value(output).map_err(|e| BridgeError::Serialization {
                    context: fn_tag.clone(),
                    reason: e.to_string(),
                })
            })
            .await
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Asset, BridgeError> {
        let fn_tag = tag("getAsset");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let output = self.evaluate(&fn_tag, "GetAsset", vec![asset_id.to_string()]).await?;
                let token: FabricToken = serde_json::from_value(output).map_err(|e| BridgeError::Serialization {
                    context: fn_tag.clone(),
                    reason: e.to_string(),
                })?;
                let network = self.network_identification.clone();

                let asset = match code_from_json(&token.token_type).and_then(TokenType::from_code) {
                    Some(t) if t.is_fungible() => {
                        let amount = Amount::from_json(&token.amount).ok_or_else(|| BridgeError::Serialization {
                            context: fn_tag.clone(),
                            reason: format!("invalid amount {}", token.amount),
                        })?;
                        let mut asset = Asset::fungible(
                            token.token_id,
                            token.reference_id,
                            token.owner,
                            token.contract_name,
                            network,
                            amount,
                        );
                        asset.token_type = t;
                        asset
                    }
                    Some(t) if t.is_non_fungible() => {
                        let mut asset = Asset::non_fungible(
                            token.token_id,
                            token.reference_id,
                            token.owner,
                            token.contract_name,
                            network,
                            UniqueTokenId::new(param_string(token.amount)),
                        );
                        asset.token_type = t;
                        asset
                    }
                    _ => {
                        return Err(BridgeError::UnexpectedTokenType {
                            context: fn_tag.clone(),
                            token_type: token.token_type.to_string(),
                        })
                    }
                };
                Ok(asset.with_fabric(token.msp_id, token.channel_name))
            })
            .await
    }

    async fn run_transaction(
        &self,
        method_name: &str,
        params: Vec<Value>,
        invocation_type: InvocationType,
    ) -> Result<TransactionResponse, BridgeError> {
        let fn_tag = tag("runTransaction");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let name = self.deployed(&fn_tag)?;
                let params = params.into_iter().map(param_string).collect();
                let response = self
                    .transact_raw(&fn_tag, &name, method_name, params, invocation_type)
                    .await?;
                match invocation_type {
                    InvocationType::Send => submitted(&fn_tag, method_name, response),
                    InvocationType::Call => Ok(TransactionResponse {
                        transaction_id: response.transaction_id,
                        transaction_receipt: None,
                        output: Some(Value::String(response.function_output)),
                    }),
                }
            })
            .await
    }

    async fn get_receipt(&self, transaction_id: &str) -> Result<String, BridgeError> {
        let fn_tag = tag("getReceipt");
        SpanScope::start(fn_tag.clone())
            .run(async {
                self.deployed(&fn_tag)?;
                let response = self
                    .transact_raw(
                        &fn_tag,
                        "qscc",
                        "GetBlockByTxID",
                        vec![self.channel_name.clone(), transaction_id.to_string()],
                        InvocationType::Call,
                    )
                    .await?;
                Ok::<_, BridgeError>(stable_stringify(&response))
            })
            .await
    }

    async fn get_view(&self, asset_id: &str) -> Result<String, BridgeError> {
        let fn_tag = tag("getView");
        SpanScope::start(fn_tag.clone())
            .run(async {
                let contract_name = self.deployed(&fn_tag)?;
                let bungee = self
                    .bungee
                    .as_ref()
                    .ok_or_else(|| BridgeError::Bungee { context: fn_tag.clone() })?;

                let details = NetworkDetails {
                    contract_name,
                    contract_address: None,
                    channel_name: Some(self.channel_name.clone()),
                    participant: self.id.clone(),
                };
                // Snapshot failures yield an empty view rather than failing the proof.
                match bungee
                    .generate_snapshot(vec![asset_id.to_string()], &self.network_identification.id, &details)
                    .await
                {
                    Ok(snapshot) => {
                        let generated = bungee.generate_view(&snapshot, "0", &MAX_SAFE_INTEGER.to_string(), None);
                        Ok::<_, BridgeError>(stable_stringify(&generated))
                    }
                    Err(err) => {
                        tracing::warn!(leaf_id = %self.id, asset_id, error = %err, "snapshot failed, returning empty view");
                        Ok(String::new())
                    }
                }
            })
            .await
    }

    async fn get_proof(&self, asset: &Asset, claim_format: ClaimFormat) -> Result<String, BridgeError> {
        let fn_tag = tag("getProof");
        let has_bungee = self.bungee.is_some();
        SpanScope::start(fn_tag.clone())
            .run(proof_for(self, &fn_tag, has_bungee, asset, claim_format))
            .await
    }

    async fn shutdown_connection(&self) -> Result<(), BridgeError> {
        let fn_tag = tag("shutdownConnection");
        SpanScope::start(fn_tag.clone())
            .run(async {
                self.connector
                    .shutdown()
                    .await
                    .map_err(|e| BridgeError::connector(&fn_tag, e))
            })
            .await
    }
}
