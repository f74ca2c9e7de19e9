//! Signed messages exchanged between gateways during recovery and rollback.
//!
//! Every message carries a `senderSignature`: an ed25519 signature (hex) over
//! the canonical JSON of the message with that field removed. The receiver
//! checks it against the counterparty public key recorded in its session data.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::error::RecoveryError;
use crate::store::LocalLog;

/// Wire name of the recover request.
pub const RECOVER_MESSAGE_TYPE: &str = "urn:ietf:satp:msgtype:recover-msg";
/// Wire name of the recover update.
pub const RECOVER_UPDATE_MESSAGE_TYPE: &str = "urn:ietf:satp:msgtype:recover-update-msg";
/// Wire name of the recover success acknowledgement.
pub const RECOVER_SUCCESS_MESSAGE_TYPE: &str = "urn:ietf:satp:msgtype:recover-success-msg";
/// Wire name of the rollback notification.
pub const ROLLBACK_MESSAGE_TYPE: &str = "urn:ietf:satp:msgtype:rollback-msg";
/// Wire name of the rollback acknowledgement.
pub const ROLLBACK_ACK_MESSAGE_TYPE: &str = "urn:ietf:satp:msgtype:rollback-ack-msg";

const SIGNATURE_FIELD: &str = "senderSignature";

/// Message that can carry a sender signature.
pub trait SignedMessage: Serialize {
    /// Session the message belongs to.
    fn session_id(&self) -> &str;
    /// Hex signature, empty while unsigned.
    fn signature(&self) -> &str;
    /// Replace the signature.
    fn set_signature(&mut self, signature: String);
}

macro_rules! signed_message {
    ($ty:ty) => {
        impl SignedMessage for $ty {
            fn session_id(&self) -> &str {
                &self.session_id
            }
            fn signature(&self) -> &str {
                &self.sender_signature
            }
            fn set_signature(&mut self, signature: String) {
                self.sender_signature = signature;
            }
        }
    };
}

/// Ask the counterparty for the log rows this gateway missed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverMessage {
    /// Session being recovered.
    pub session_id: String,
    /// Always [`RECOVER_MESSAGE_TYPE`].
    pub message_type: String,
    /// Stage this gateway reached.
    pub satp_phase: String,
    /// Last sequence number this gateway holds.
    pub sequence_number: u64,
    /// Whether a backup gateway is taking over.
    pub is_backup: bool,
    /// New public key when a backup takes over, else empty.
    pub new_identity_public_key: String,
    /// Timestamp of this gateway's latest log row.
    pub last_entry_timestamp: String,
    /// Signature of the sender.
    pub sender_signature: String,
}

/// Log rows the counterparty holds beyond the requested sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverUpdateMessage {
    /// Session being recovered.
    pub session_id: String,
    /// Always [`RECOVER_UPDATE_MESSAGE_TYPE`].
    pub message_type: String,
    /// Canonical hash of the recover request.
    pub hash_recover_message: String,
    /// Missing rows, in log order.
    pub recovered_logs: Vec<LocalLog>,
    /// Signature of the sender.
    pub sender_signature: String,
}

/// Acknowledge that the recovered rows were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverSuccessMessage {
    /// Session being recovered.
    pub session_id: String,
    /// Always [`RECOVER_SUCCESS_MESSAGE_TYPE`].
    pub message_type: String,
    /// Canonical hash of the recover update.
    pub hash_recover_update_message: String,
    /// Whether the rows were applied.
    pub success: bool,
    /// Keys of the rows that were added locally.
    pub entries_changed: Vec<String>,
    /// Signature of the sender.
    pub sender_signature: String,
}

/// Tell the counterparty that this gateway rolled its side back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackMessage {
    /// Session rolled back.
    pub session_id: String,
    /// Always [`ROLLBACK_MESSAGE_TYPE`].
    pub message_type: String,
    /// Whether the local rollback completed.
    pub success: bool,
    /// Compensating actions that ran.
    pub actions_performed: Vec<String>,
    /// Ledger receipts of those actions.
    pub proofs: Vec<String>,
    /// Signature of the sender.
    pub sender_signature: String,
}

/// Counterparty answer to a [`RollbackMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackAckMessage {
    /// Session rolled back.
    pub session_id: String,
    /// Always [`ROLLBACK_ACK_MESSAGE_TYPE`].
    pub message_type: String,
    /// Whether the counterparty finished its own side.
    pub success: bool,
    /// Signature of the sender.
    pub sender_signature: String,
}

signed_message!(RecoverMessage);
signed_message!(RecoverUpdateMessage);
signed_message!(RecoverSuccessMessage);
signed_message!(RollbackMessage);
signed_message!(RollbackAckMessage);

/// Canonical JSON of `message` without its signature.
pub fn signing_payload<M: SignedMessage>(message: &M) -> Result<String, RecoveryError> {
    let mut value = serde_json::to_value(message)
        .map_err(|e| RecoveryError::serialization("CrashManager#signingPayload", e))?;
    if let Some(map) = value.as_object_mut() {
        map.remove(SIGNATURE_FIELD);
    }
    Ok(value.to_string())
}

/// Sign `message` in place with `key`.
pub fn sign_message<M: SignedMessage>(message: &mut M, key: &SigningKey) -> Result<(), RecoveryError> {
    let payload = signing_payload(message)?;
    let signature = key.sign(payload.as_bytes());
    message.set_signature(hex::encode(signature.to_bytes()));
    Ok(())
}

/// Check the signature of `message` against a hex-encoded public key.
pub fn verify_message<M: SignedMessage>(message: &M, public_key_hex: &str) -> Result<(), RecoveryError> {
    let invalid = || RecoveryError::InvalidSignature {
        context: "CrashManager#verifySignature".to_string(),
        session_id: message.session_id().to_string(),
    };
    let key_bytes: [u8; 32] = hex::decode(public_key_hex.trim())
        .map_err(|_| invalid())?
        .try_into()
        .map_err(|_| invalid())?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| invalid())?;
    let sig_bytes: [u8; 64] = hex::decode(message.signature().trim())
        .map_err(|_| invalid())?
        .try_into()
        .map_err(|_| invalid())?;
    let payload = signing_payload(message)?;
    key.verify(payload.as_bytes(), &Signature::from_bytes(&sig_bytes))
        .map_err(|_| invalid())
}

/// Hex public key of a signing key.
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_bytes())
}

/// Canonical hash of a message, signature included.
pub fn message_hash<M: Serialize>(message: &M) -> String {
    crate::canonical::canonical_hash_hex(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn make_message() -> RollbackAckMessage {
        RollbackAckMessage {
            session_id: "s-1".to_string(),
            message_type: ROLLBACK_ACK_MESSAGE_TYPE.to_string(),
            success: true,
            sender_signature: String::new(),
        }
    }

    #[test]
    fn test_signed_message_verifies() {
        let key = SigningKey::generate(&mut OsRng);
        let mut message = make_message();
        sign_message(&mut message, &key).unwrap();
        assert_eq!(message.sender_signature.len(), 128);
        verify_message(&message, &public_key_hex(&key)).unwrap();
    }

    #[test]
    fn test_tampered_message_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let mut message = make_message();
        sign_message(&mut message, &key).unwrap();
        message.success = false;
        assert!(matches!(
            verify_message(&message, &public_key_hex(&key)),
            Err(RecoveryError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let mut message = make_message();
        sign_message(&mut message, &key).unwrap();
        assert!(verify_message(&message, &public_key_hex(&other)).is_err());
        assert!(verify_message(&message, "not-hex").is_err());
    }

    #[test]
    fn test_payload_excludes_signature() {
        let mut message = make_message();
        let before = signing_payload(&message).unwrap();
        message.sender_signature = "ab".to_string();
        assert_eq!(signing_payload(&message).unwrap(), before);
        assert!(!before.contains("senderSignature"));
    }
}
