//! Session data: the per-gateway record of one SATP transfer.
//!
//! ## Per-stage records
//!
//! Hashes, signatures and the processed/received timestamps share one shape,
//! [`MessageStages`], with one slot per protocol message:
//!
//! | Stage | Messages |
//! |-------|----------|
//! | 0 | new session request/response, pre-SATP transfer request/response |
//! | 1 | transfer proposal request/receipt/reject, transfer commence request/response |
//! | 2 | lock assertion request/receipt |
//! | 3 | commit preparation, commit ready, commit final assertion, commit final acknowledgement, transfer complete request/response |
//!
//! An empty string means the message has not been seen. The filled slots of
//! `hashes` form the session's hash chain, which crash recovery and rollback
//! read to locate the last durable step.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::asset::{Amount, Asset, ErcTokenStandard, TokenType, UniqueTokenId};
use crate::types::network::NetworkId;

/// Protocol version written into every session.
pub const SATP_VERSION: &str = "v02";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Not set.
    #[default]
    Unspecified,
    /// Transfer in progress.
    Ongoing,
    /// Transfer finished.
    Completed,
    /// Transfer rejected by a gateway or rolled back.
    Rejected,
    /// Rejected pending conditions.
    ConditionalRejected,
    /// A stage failed.
    Error,
    /// Crash recovery running.
    Recovering,
    /// Crash recovery finished.
    Recovered,
}

impl State {
    /// Parse from the wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "ONGOING" => Some(Self::Ongoing),
            "COMPLETED" => Some(Self::Completed),
            "REJECTED" => Some(Self::Rejected),
            "CONDITIONAL_REJECTED" => Some(Self::ConditionalRejected),
            "ERROR" => Some(Self::Error),
            "RECOVERING" => Some(Self::Recovering),
            "RECOVERED" => Some(Self::Recovered),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Ongoing => "ONGOING",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::ConditionalRejected => "CONDITIONAL_REJECTED",
            Self::Error => "ERROR",
            Self::Recovering => "RECOVERING",
            Self::Recovered => "RECOVERED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the transfer a gateway plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionRole {
    /// Not set; never valid for a live session.
    #[default]
    Unspecified,
    /// Originating gateway (holds the sender asset).
    Client,
    /// Receiving gateway (holds the receiver asset).
    Server,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Client => write!(f, "CLIENT"),
            Self::Server => write!(f, "SERVER"),
        }
    }
}

/// Signature scheme negotiated for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureAlgorithm {
    /// Not set.
    #[default]
    Unspecified,
    /// RSA.
    Rsa,
    /// ECDSA over secp256k1.
    Ecdsa,
    /// Ed25519.
    Ed25519,
}

/// Lock mechanism negotiated for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    /// Not set.
    #[default]
    Unspecified,
    /// Faucet lock.
    Faucet,
    /// Time lock.
    Timelock,
    /// Hash lock.
    Hashlock,
    /// Hash time lock.
    HashTimelock,
}

/// Protocol stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SatpStage {
    /// Session negotiation.
    Stage0,
    /// Transfer initiation.
    Stage1,
    /// Lock evidence.
    Stage2,
    /// Commitment.
    Stage3,
}

impl SatpStage {
    /// Stage number.
    pub fn number(&self) -> u8 {
        match self {
            Self::Stage0 => 0,
            Self::Stage1 => 1,
            Self::Stage2 => 2,
            Self::Stage3 => 3,
        }
    }
}

impl fmt::Display for SatpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SATP_STAGE_{}", self.number())
    }
}

/// Every message exchanged during a transfer, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Stage 0, client.
    NewSessionRequest,
    /// Stage 0, server.
    NewSessionResponse,
    /// Stage 0, client.
    PreSatpTransferRequest,
    /// Stage 0, server.
    PreSatpTransferResponse,
    /// Stage 1, client.
    InitProposal,
    /// Stage 1, server.
    InitReceipt,
    /// Stage 1, server.
    InitReject,
    /// Stage 1, client.
    TransferCommenceRequest,
    /// Stage 1, server.
    TransferCommenceResponse,
    /// Stage 2, client.
    LockAssert,
    /// Stage 2, server.
    AssertionReceipt,
    /// Stage 3, client.
    CommitPrepare,
    /// Stage 3, server.
    CommitReady,
    /// Stage 3, client.
    CommitFinal,
    /// Stage 3, server.
    AckCommitFinal,
    /// Stage 3, client.
    CommitTransferComplete,
    /// Stage 3, server.
    CommitTransferCompleteResponse,
}

impl MessageType {
    /// All messages in protocol order.
    pub const ALL: [MessageType; 17] = [
        Self::NewSessionRequest,
        Self::NewSessionResponse,
        Self::PreSatpTransferRequest,
        Self::PreSatpTransferResponse,
        Self::InitProposal,
        Self::InitReceipt,
        Self::InitReject,
        Self::TransferCommenceRequest,
        Self::TransferCommenceResponse,
        Self::LockAssert,
        Self::AssertionReceipt,
        Self::CommitPrepare,
        Self::CommitReady,
        Self::CommitFinal,
        Self::AckCommitFinal,
        Self::CommitTransferComplete,
        Self::CommitTransferCompleteResponse,
    ];

    /// Stage the message belongs to.
    pub fn stage(&self) -> SatpStage {
        match self {
            Self::NewSessionRequest
            | Self::NewSessionResponse
            | Self::PreSatpTransferRequest
            | Self::PreSatpTransferResponse => SatpStage::Stage0,
            Self::InitProposal
            | Self::InitReceipt
            | Self::InitReject
            | Self::TransferCommenceRequest
            | Self::TransferCommenceResponse => SatpStage::Stage1,
            Self::LockAssert | Self::AssertionReceipt => SatpStage::Stage2,
            Self::CommitPrepare
            | Self::CommitReady
            | Self::CommitFinal
            | Self::AckCommitFinal
            | Self::CommitTransferComplete
            | Self::CommitTransferCompleteResponse => SatpStage::Stage3,
        }
    }

    /// Role that sends the message.
    pub fn sender(&self) -> SessionRole {
        match self {
            Self::NewSessionRequest
            | Self::PreSatpTransferRequest
            | Self::InitProposal
            | Self::TransferCommenceRequest
            | Self::LockAssert
            | Self::CommitPrepare
            | Self::CommitFinal
            | Self::CommitTransferComplete => SessionRole::Client,
            _ => SessionRole::Server,
        }
    }
}

/// Stage 0 slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage0Record {
    /// New session request.
    pub new_session_request: String,
    /// New session response.
    pub new_session_response: String,
    /// Pre-SATP transfer request.
    pub pre_satp_transfer_request: String,
    /// Pre-SATP transfer response.
    pub pre_satp_transfer_response: String,
}

/// Stage 1 slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage1Record {
    /// Transfer proposal request.
    pub transfer_proposal_request: String,
    /// Transfer proposal receipt.
    pub transfer_proposal_receipt: String,
    /// Transfer proposal reject.
    pub transfer_proposal_reject: String,
    /// Transfer commence request.
    pub transfer_commence_request: String,
    /// Transfer commence response.
    pub transfer_commence_response: String,
}

/// Stage 2 slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage2Record {
    /// Lock assertion request.
    pub lock_assertion_request: String,
    /// Lock assertion receipt.
    pub lock_assertion_receipt: String,
}

/// Stage 3 slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage3Record {
    /// Commit preparation request.
    pub commit_preparation_request: String,
    /// Commit ready response.
    pub commit_ready_response: String,
    /// Commit final assertion request.
    pub commit_final_assertion_request: String,
    /// Commit final acknowledgement receipt.
    pub commit_final_acknowledgement_receipt: String,
    /// Transfer complete request.
    pub transfer_complete_request: String,
    /// Transfer complete response.
    pub transfer_complete_response: String,
}

/// One slot per protocol message, grouped by stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageStages {
    /// Stage 0.
    pub stage0: Stage0Record,
    /// Stage 1.
    pub stage1: Stage1Record,
    /// Stage 2.
    pub stage2: Stage2Record,
    /// Stage 3.
    pub stage3: Stage3Record,
}

impl MessageStages {
    /// Value recorded for `message` (empty when unseen).
    pub fn get(&self, message: MessageType) -> &str {
        use MessageType::*;
        match message {
            NewSessionRequest => &self.stage0.new_session_request,
            NewSessionResponse => &self.stage0.new_session_response,
            PreSatpTransferRequest => &self.stage0.pre_satp_transfer_request,
            PreSatpTransferResponse => &self.stage0.pre_satp_transfer_response,
            InitProposal => &self.stage1.transfer_proposal_request,
            InitReceipt => &self.stage1.transfer_proposal_receipt,
            InitReject => &self.stage1.transfer_proposal_reject,
            TransferCommenceRequest => &self.stage1.transfer_commence_request,
            TransferCommenceResponse => &self.stage1.transfer_commence_response,
            LockAssert => &self.stage2.lock_assertion_request,
            AssertionReceipt => &self.stage2.lock_assertion_receipt,
            CommitPrepare => &self.stage3.commit_preparation_request,
            CommitReady => &self.stage3.commit_ready_response,
            CommitFinal => &self.stage3.commit_final_assertion_request,
            AckCommitFinal => &self.stage3.commit_final_acknowledgement_receipt,
            CommitTransferComplete => &self.stage3.transfer_complete_request,
            CommitTransferCompleteResponse => &self.stage3.transfer_complete_response,
        }
    }

    /// Record `value` for `message`, replacing any earlier value.
    pub fn set(&mut self, message: MessageType, value: impl Into<String>) {
        use MessageType::*;
        let slot = match message {
            NewSessionRequest => &mut self.stage0.new_session_request,
            NewSessionResponse => &mut self.stage0.new_session_response,
            PreSatpTransferRequest => &mut self.stage0.pre_satp_transfer_request,
            PreSatpTransferResponse => &mut self.stage0.pre_satp_transfer_response,
            InitProposal => &mut self.stage1.transfer_proposal_request,
            InitReceipt => &mut self.stage1.transfer_proposal_receipt,
            InitReject => &mut self.stage1.transfer_proposal_reject,
            TransferCommenceRequest => &mut self.stage1.transfer_commence_request,
            TransferCommenceResponse => &mut self.stage1.transfer_commence_response,
            LockAssert => &mut self.stage2.lock_assertion_request,
            AssertionReceipt => &mut self.stage2.lock_assertion_receipt,
            CommitPrepare => &mut self.stage3.commit_preparation_request,
            CommitReady => &mut self.stage3.commit_ready_response,
            CommitFinal => &mut self.stage3.commit_final_assertion_request,
            AckCommitFinal => &mut self.stage3.commit_final_acknowledgement_receipt,
            CommitTransferComplete => &mut self.stage3.transfer_complete_request,
            CommitTransferCompleteResponse => &mut self.stage3.transfer_complete_response,
        };
        *slot = value.into();
    }

    /// Whether `message` has a recorded value.
    pub fn has(&self, message: MessageType) -> bool {
        !self.get(message).is_empty()
    }

    /// Whether any message of `stage` has a recorded value.
    pub fn stage_started(&self, stage: SatpStage) -> bool {
        MessageType::ALL
            .iter()
            .any(|m| m.stage() == stage && self.has(*m))
    }

    /// Copy every value of `other` into slots that are still empty here.
    ///
    /// Returns the messages that gained a value.
    pub fn merge_from(&mut self, other: &MessageStages) -> Vec<MessageType> {
        let mut changed = Vec::new();
        for message in MessageType::ALL {
            if !self.has(message) && other.has(message) {
                self.set(message, other.get(message));
                changed.push(message);
            }
        }
        changed
    }

    /// Latest message with a recorded value, in protocol order.
    pub fn latest(&self) -> Option<MessageType> {
        MessageType::ALL.iter().rev().copied().find(|m| self.has(*m))
    }
}

/// Which timestamp table a timestamp goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampType {
    /// When the gateway finished processing the message.
    Processed,
    /// When the gateway received the message.
    Received,
}

/// Asset as carried in session data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionAsset {
    /// Token id inside the wrapper.
    pub token_id: String,
    /// Ontology reference id.
    pub reference_id: String,
    /// Owner account.
    pub owner: String,
    /// Token contract name.
    pub contract_name: String,
    /// Token contract address (EVM).
    pub contract_address: String,
    /// Transferred amount.
    pub amount: Amount,
    /// Owner MSP (Fabric).
    pub msp_id: String,
    /// Channel (Fabric).
    pub channel_name: String,
    /// Network the asset lives on.
    pub network_id: Option<NetworkId>,
    /// Token type.
    pub token_type: Option<TokenType>,
    /// Unique descriptor of a non-fungible token, when it differs from
    /// `token_id`.
    pub unique_descriptor: Option<String>,
}

impl SessionAsset {
    /// Bridge-leaf view of the asset, or `None` without a network.
    ///
    /// Non-fungible assets use `unique_descriptor`, falling back to
    /// `token_id` when none was recorded.
    pub fn to_asset(&self) -> Option<Asset> {
        let network = self.network_id.clone()?;
        let token_type = self.token_type.unwrap_or(TokenType::NonstandardFungible);
        let mut asset = if token_type.is_non_fungible() {
            Asset::non_fungible(
                self.token_id.clone(),
                self.reference_id.clone(),
                self.owner.clone(),
                self.contract_name.clone(),
                network.clone(),
                UniqueTokenId::new(
                    self.unique_descriptor
                        .clone()
                        .unwrap_or_else(|| self.token_id.clone()),
                ),
            )
        } else {
            Asset::fungible(
                self.token_id.clone(),
                self.reference_id.clone(),
                self.owner.clone(),
                self.contract_name.clone(),
                network.clone(),
                self.amount,
            )
        };
        asset.token_type = token_type;
        if network.ledger_type.is_evm() {
            asset = asset.with_evm(self.contract_address.clone(), ErcTokenStandard::default());
        } else if !self.channel_name.is_empty() {
            asset = asset.with_fabric(self.msp_id.clone(), self.channel_name.clone());
        }
        Some(asset)
    }
}

/// Per-gateway record of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionData {
    /// Session id (`{uuid}-{contextId}`).
    pub id: String,
    /// Protocol version.
    pub version: String,
    /// Transfer context the session belongs to.
    pub transfer_context_id: String,
    /// Role of this gateway.
    pub role: SessionRole,
    /// Lifecycle state.
    pub state: State,
    /// Digital asset id negotiated at stage 0.
    pub digital_asset_id: String,
    /// Client gateway public key (hex).
    pub client_gateway_pubkey: String,
    /// Server gateway public key (hex).
    pub server_gateway_pubkey: String,
    /// Sender gateway owner id.
    pub sender_gateway_owner_id: String,
    /// Receiver gateway owner id.
    pub receiver_gateway_owner_id: String,
    /// Sender gateway network id.
    pub sender_gateway_network_id: String,
    /// Recipient gateway network id.
    pub recipient_gateway_network_id: String,
    /// Signature scheme.
    pub signature_algorithm: SignatureAlgorithm,
    /// Lock mechanism.
    pub lock_type: LockType,
    /// Lock expiration, in milliseconds.
    pub lock_expiration_time: u64,
    /// Recovery attempts before rollback.
    pub max_retries: u32,
    /// Inactivity window before rollback, in milliseconds.
    pub max_timeout: u64,
    /// Sequence number of the last message exchanged.
    pub last_sequence_number: u64,
    /// Asset leaving the client ledger.
    pub sender_asset: Option<SessionAsset>,
    /// Asset arriving on the server ledger.
    pub receiver_asset: Option<SessionAsset>,
    /// Message hash chain.
    pub hashes: MessageStages,
    /// Message signatures.
    pub signatures: MessageStages,
    /// Processing timestamps.
    pub processed_timestamps: MessageStages,
    /// Reception timestamps.
    pub received_timestamps: MessageStages,
    /// Timestamp of the last received message.
    pub last_message_received_timestamp: String,
    /// Message during which an error occurred.
    pub phase_error: Option<MessageType>,
    /// Error code of that failure.
    pub error_code: Option<String>,
}

impl SessionData {
    /// Fresh data for `role`: empty stage records, `ONGOING`, current version.
    pub fn new(id: impl Into<String>, transfer_context_id: impl Into<String>, role: SessionRole) -> Self {
        Self {
            id: id.into(),
            version: SATP_VERSION.to_string(),
            transfer_context_id: transfer_context_id.into(),
            role,
            state: State::Ongoing,
            ..Default::default()
        }
    }

    /// Record a message hash.
    pub fn save_hash(&mut self, message: MessageType, hash: impl Into<String>) {
        self.hashes.set(message, hash);
    }

    /// Record a message signature.
    pub fn save_signature(&mut self, message: MessageType, signature: impl Into<String>) {
        self.signatures.set(message, signature);
    }

    /// Record a timestamp (now, in epoch milliseconds, when `time` is `None`).
    pub fn save_timestamp(&mut self, message: MessageType, kind: TimestampType, time: Option<String>) {
        let timestamp = time.unwrap_or_else(|| chrono::Utc::now().timestamp_millis().to_string());
        match kind {
            TimestampType::Processed => self.processed_timestamps.set(message, timestamp),
            TimestampType::Received => {
                self.last_message_received_timestamp = timestamp.clone();
                self.received_timestamps.set(message, timestamp);
            }
        }
    }

    /// Hash recorded for `message`.
    pub fn message_hash(&self, message: MessageType) -> &str {
        self.hashes.get(message)
    }

    /// Timestamp recorded for `message`.
    pub fn message_timestamp(&self, message: MessageType, kind: TimestampType) -> &str {
        match kind {
            TimestampType::Processed => self.processed_timestamps.get(message),
            TimestampType::Received => self.received_timestamps.get(message),
        }
    }

    /// Message expected before `message`, or `None` for the first one.
    pub fn previous_message_type(&self, message: MessageType) -> Option<MessageType> {
        use MessageType::*;
        match message {
            NewSessionRequest => None,
            NewSessionResponse => Some(NewSessionRequest),
            PreSatpTransferRequest => Some(NewSessionResponse),
            PreSatpTransferResponse => Some(PreSatpTransferRequest),
            InitProposal => Some(PreSatpTransferResponse),
            InitReceipt | InitReject => Some(InitProposal),
            TransferCommenceRequest if self.hashes.has(InitReject) => Some(InitReject),
            TransferCommenceRequest => Some(InitReceipt),
            TransferCommenceResponse => Some(TransferCommenceRequest),
            LockAssert => Some(TransferCommenceResponse),
            AssertionReceipt => Some(LockAssert),
            CommitPrepare => Some(AssertionReceipt),
            CommitReady => Some(CommitPrepare),
            CommitFinal => Some(CommitReady),
            AckCommitFinal => Some(CommitFinal),
            CommitTransferComplete => Some(AckCommitFinal),
            CommitTransferCompleteResponse => Some(CommitTransferComplete),
        }
    }

    /// Latest stage with any hash, and the latest hashed message.
    pub fn actual_stage(&self) -> (SatpStage, Option<MessageType>) {
        match self.hashes.latest() {
            Some(message) => (message.stage(), Some(message)),
            None => (SatpStage::Stage0, None),
        }
    }

    /// First stage whose message exchange is incomplete, or `None` once every
    /// stage finished. A stage 1 rejection counts in place of the receipt.
    pub fn crashed_stage(&self) -> Option<SatpStage> {
        let h = &self.hashes;
        let stage_complete = |stage: SatpStage| {
            MessageType::ALL
                .iter()
                .filter(|m| m.stage() == stage)
                .all(|m| match m {
                    MessageType::InitReceipt | MessageType::InitReject => {
                        h.has(MessageType::InitReceipt) || h.has(MessageType::InitReject)
                    }
                    other => h.has(*other),
                })
        };
        [SatpStage::Stage0, SatpStage::Stage1, SatpStage::Stage2, SatpStage::Stage3]
            .into_iter()
            .find(|stage| !stage_complete(*stage))
    }

    /// Mark the session failed at `message`.
    pub fn set_error(&mut self, message: MessageType, code: impl Into<String>) {
        self.state = State::Error;
        self.phase_error = Some(message);
        self.error_code = Some(code.into());
    }

    /// Public key of the other gateway.
    pub fn counterparty_pubkey(&self) -> &str {
        match self.role {
            SessionRole::Server => &self.client_gateway_pubkey,
            _ => &self.server_gateway_pubkey,
        }
    }

    /// Asset on this gateway's own ledger.
    pub fn own_asset(&self) -> Option<&SessionAsset> {
        match self.role {
            SessionRole::Client => self.sender_asset.as_ref(),
            SessionRole::Server => self.receiver_asset.as_ref(),
            SessionRole::Unspecified => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::network::LedgerType;

    #[test]
    fn test_new_session_data_is_ongoing() {
        let data = SessionData::new("s-1", "ctx", SessionRole::Client);
        assert_eq!(data.state, State::Ongoing);
        assert_eq!(data.version, SATP_VERSION);
        assert_eq!(data.hashes, MessageStages::default());
        assert_eq!(data.actual_stage(), (SatpStage::Stage0, None));
    }

    #[test]
    fn test_hash_chain_tracks_latest_message() {
        let mut data = SessionData::new("s-1", "ctx", SessionRole::Client);
        data.save_hash(MessageType::NewSessionRequest, "h0");
        data.save_hash(MessageType::NewSessionResponse, "h1");
        data.save_hash(MessageType::LockAssert, "h2");

        assert_eq!(data.message_hash(MessageType::LockAssert), "h2");
        assert_eq!(data.hashes.stage2.lock_assertion_request, "h2");
        assert_eq!(
            data.actual_stage(),
            (SatpStage::Stage2, Some(MessageType::LockAssert))
        );
        assert!(data.hashes.stage_started(SatpStage::Stage2));
        assert!(!data.hashes.stage_started(SatpStage::Stage3));
    }

    #[test]
    fn test_previous_message_follows_reject_branch() {
        let mut data = SessionData::new("s-1", "ctx", SessionRole::Server);
        assert_eq!(
            data.previous_message_type(MessageType::TransferCommenceRequest),
            Some(MessageType::InitReceipt)
        );
        data.save_hash(MessageType::InitReject, "r");
        assert_eq!(
            data.previous_message_type(MessageType::TransferCommenceRequest),
            Some(MessageType::InitReject)
        );
        assert_eq!(data.previous_message_type(MessageType::NewSessionRequest), None);
    }

    #[test]
    fn test_received_timestamp_updates_last_received() {
        let mut data = SessionData::new("s-1", "ctx", SessionRole::Server);
        data.save_timestamp(MessageType::InitProposal, TimestampType::Received, Some("42".to_string()));
        assert_eq!(data.last_message_received_timestamp, "42");
        assert_eq!(data.message_timestamp(MessageType::InitProposal, TimestampType::Received), "42");
        assert_eq!(data.message_timestamp(MessageType::InitProposal, TimestampType::Processed), "");
    }

    #[test]
    fn test_session_data_json_uses_camel_case() {
        let mut data = SessionData::new("s-1", "ctx", SessionRole::Client);
        data.save_hash(MessageType::CommitFinal, "abc");
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["transferContextId"], "ctx");
        assert_eq!(json["role"], "CLIENT");
        assert_eq!(json["hashes"]["stage3"]["commitFinalAssertionRequest"], "abc");

        let parsed: SessionData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_crashed_stage_is_first_incomplete() {
        let mut data = SessionData::new("s-1", "ctx", SessionRole::Client);
        assert_eq!(data.crashed_stage(), Some(SatpStage::Stage0));
        for message in MessageType::ALL.iter().filter(|m| m.stage() == SatpStage::Stage0) {
            data.save_hash(*message, "h");
        }
        assert_eq!(data.crashed_stage(), Some(SatpStage::Stage1));
        for message in [
            MessageType::InitProposal,
            MessageType::InitReceipt,
            MessageType::TransferCommenceRequest,
            MessageType::TransferCommenceResponse,
        ] {
            data.save_hash(message, "h");
        }
        assert_eq!(data.crashed_stage(), Some(SatpStage::Stage2));
        for message in MessageType::ALL {
            if message != MessageType::InitReject {
                data.save_hash(message, "h");
            }
        }
        assert_eq!(data.crashed_stage(), None);
    }

    #[test]
    fn test_non_fungible_asset_descriptor() {
        let mut asset = SessionAsset {
            token_id: "nft-1".to_string(),
            owner: "0xowner".to_string(),
            network_id: Some(NetworkId::new("besu", LedgerType::Besu2X)),
            token_type: Some(TokenType::NonstandardNonfungible),
            ..Default::default()
        };
        let leaf_asset = asset.to_asset().unwrap();
        assert_eq!(leaf_asset.unique_descriptor().unwrap().as_str(), "nft-1");
        assert!(leaf_asset.amount().is_none());

        asset.unique_descriptor = Some("serial-42".to_string());
        let leaf_asset = asset.to_asset().unwrap();
        assert_eq!(leaf_asset.id, "nft-1");
        assert_eq!(leaf_asset.unique_descriptor().unwrap().as_str(), "serial-42");

        asset.network_id = None;
        assert!(asset.to_asset().is_none());
    }

    #[test]
    fn test_merge_keeps_local_values() {
        let mut local = MessageStages::default();
        local.set(MessageType::LockAssert, "mine");
        let mut remote = MessageStages::default();
        remote.set(MessageType::LockAssert, "theirs");
        remote.set(MessageType::AssertionReceipt, "receipt");

        let changed = local.merge_from(&remote);
        assert_eq!(changed, vec![MessageType::AssertionReceipt]);
        assert_eq!(local.get(MessageType::LockAssert), "mine");
        assert_eq!(local.get(MessageType::AssertionReceipt), "receipt");
    }

    #[test]
    fn test_message_sender_roles() {
        assert_eq!(MessageType::LockAssert.sender(), SessionRole::Client);
        assert_eq!(MessageType::CommitReady.sender(), SessionRole::Server);
        assert_eq!(MessageType::CommitReady.stage(), SatpStage::Stage3);
    }
}
