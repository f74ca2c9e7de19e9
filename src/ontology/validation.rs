//! Ontology validation pipeline.
//!
//! ## Check levels
//!
//! | Level | Checks run, in order |
//! |-------|----------------------|
//! | `DEFAULT` | structure |
//! | `HASHED` | hash, structure |
//! | `HASHED_SIGNED` | signature, hash, structure |
//!
//! Integrity checks run first, strictest first, over the raw document. A
//! document altered after sealing fails on its hash or signature before any
//! structural rule can look at the altered content.
//!
//! ## Hash and signature
//!
//! The hash is the lowercase hex SHA-256 of the canonical JSON of the raw
//! document with `hash` and `signature` removed. The signature is an ed25519
//! signature over the ASCII bytes of that hex string, itself hex-encoded.
//! The signature is checked against the recomputed hash, never the stored one.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::document::{InteractionType, OntologyDocument};
use super::encoding::variable_code;
use super::error::OntologyError;
use crate::canonical::canonical_hash_without;

/// Fields excluded from the canonical hash.
pub const UNHASHED_FIELDS: [&str; 2] = ["hash", "signature"];

/// Trust level applied when loading ontologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OntologyCheckLevel {
    /// Structural checks only.
    #[default]
    Default,
    /// Also verify the stored hash.
    Hashed,
    /// Also verify the signature against a trusted key.
    HashedSigned,
}

impl OntologyCheckLevel {
    /// Numeric rank; higher is stricter.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Hashed => 1,
            Self::HashedSigned => 2,
        }
    }

    /// Parse from a config string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEFAULT" => Some(Self::Default),
            "HASHED" => Some(Self::Hashed),
            "HASHED_SIGNED" => Some(Self::HashedSigned),
            _ => None,
        }
    }
}

impl fmt::Display for OntologyCheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "DEFAULT"),
            Self::Hashed => write!(f, "HASHED"),
            Self::HashedSigned => write!(f, "HASHED_SIGNED"),
        }
    }
}

type IntegrityFn = fn(&Value, &[VerifyingKey]) -> Result<(), OntologyError>;

/// Integrity checks, strictest first: `(required from level, name, check)`.
const INTEGRITY: [(OntologyCheckLevel, &str, IntegrityFn); 2] = [
    (OntologyCheckLevel::HashedSigned, "signature", check_signature),
    (OntologyCheckLevel::Hashed, "hash", check_hash),
];

/// Run the integrity checks required by `level` against the raw document.
pub fn verify_integrity(
    level: OntologyCheckLevel,
    raw: &Value,
    trusted_keys: &[VerifyingKey],
) -> Result<(), OntologyError> {
    for (required_from, name, check) in INTEGRITY.iter() {
        if required_from.rank() > level.rank() {
            continue;
        }
        tracing::trace!(ontology_id = %raw_str(raw, "id"), check = *name, "running ontology check");
        check(raw, trusted_keys)?;
    }
    Ok(())
}

fn raw_str<'v>(raw: &'v Value, field: &str) -> &'v str {
    raw.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Canonical hash of a raw document.
pub fn compute_ontology_hash(raw: &Value) -> String {
    canonical_hash_without(raw, &UNHASHED_FIELDS)
}

/// Parse a hex-encoded 32-byte ed25519 verifying key.
pub fn parse_trusted_key(hex_key: &str) -> Result<VerifyingKey, OntologyError> {
    let fn_tag = "OntologyManager#parseTrustedKey";
    let invalid = |reason: String| OntologyError::InvalidTrustedKey {
        context: fn_tag.to_string(),
        reason,
    };
    let bytes = hex::decode(hex_key.trim()).map_err(|e| invalid(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| invalid(e.to_string()))
}

/// Structural rules: known interactions, non-empty function lists, available
/// EVM functions and ledger-appropriate variables.
pub fn check_structure(doc: &OntologyDocument) -> Result<(), OntologyError> {
    let fn_tag = "OntologyManager#validateOntology";

    for (name, functions) in &doc.ontology {
        if InteractionType::from_str(name).is_none() {
            return Err(OntologyError::UnknownInteraction {
                context: fn_tag.to_string(),
                interaction: name.clone(),
            });
        }
        if functions.is_empty() {
            return Err(OntologyError::InteractionWithoutFunction {
                context: fn_tag.to_string(),
                interaction: name.clone(),
            });
        }
        for function in functions {
            if doc.ledger_type.is_evm() && !function.is_available() {
                return Err(OntologyError::OntologyFunctionNotAvailable {
                    context: fn_tag.to_string(),
                    interaction: name.clone(),
                    function: function.function_signature.clone(),
                });
            }
            for variable in &function.variables {
                if variable_code(fn_tag, doc.ledger_type, variable)?.is_none() {
                    return Err(OntologyError::OntologyFunctionVariableNotSupported {
                        context: fn_tag.to_string(),
                        function: function.function_signature.clone(),
                        variable: variable.clone(),
                        ledger_type: doc.ledger_type,
                    });
                }
            }
        }
    }

    // A document with no interactions still has to name a supported ledger.
    variable_code(fn_tag, doc.ledger_type, "owner")?;
    Ok(())
}

fn check_hash(raw: &Value, _trusted_keys: &[VerifyingKey]) -> Result<(), OntologyError> {
    let computed = compute_ontology_hash(raw);
    let stored = raw_str(raw, "hash");
    if computed != stored.to_lowercase() {
        return Err(OntologyError::InvalidOntologyHash {
            context: "OntologyManager#verifyOntologyHash".to_string(),
            id: raw_str(raw, "id").to_string(),
            expected: stored.to_string(),
            computed,
        });
    }
    Ok(())
}

fn check_signature(raw: &Value, trusted_keys: &[VerifyingKey]) -> Result<(), OntologyError> {
    let invalid = || OntologyError::InvalidOntologySignature {
        context: "OntologyManager#verifyOntologySignature".to_string(),
        id: raw_str(raw, "id").to_string(),
    };

    let sig_bytes = hex::decode(raw_str(raw, "signature").trim()).map_err(|_| invalid())?;
    let sig_bytes: [u8; 64] = sig_bytes.try_into().map_err(|_| invalid())?;
    let signature = Signature::from_bytes(&sig_bytes);

    let message = compute_ontology_hash(raw);
    if trusted_keys
        .iter()
        .any(|key| key.verify(message.as_bytes(), &signature).is_ok())
    {
        Ok(())
    } else {
        Err(invalid())
    }
}
