//! Ontology document model.
//!
//! An ontology document lists, per interaction, the on-chain functions (and the
//! order of their arguments) a wrapper contract may call for one asset reference
//! on one ledger type:
//!
//! ```json
//! {
//!   "name": "SATPToken",
//!   "id": "token1",
//!   "type": "BESU_2X",
//!   "contract": "SATPTokenContract",
//!   "ontology": {
//!     "lock": [
//!       {
//!         "functionSignature": "transfer(address,address,uint256)",
//!         "variables": ["owner", "bridge", "amount"],
//!         "available": true
//!       }
//!     ]
//!   },
//!   "bytecode": "0x6080...",
//!   "hash": "…",
//!   "signature": "…"
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::OntologyError;
use crate::types::network::LedgerType;

/// Cross-chain interaction a wrapper contract performs on an asset.
///
/// Discriminants are the wire codes passed to the wrapper contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    /// Create tokens.
    Mint = 0,
    /// Destroy tokens.
    Burn = 1,
    /// Transfer tokens from the wrapper to a receiver.
    Assign = 2,
    /// Check the bridge may act on the token.
    Checkpermission = 3,
    /// Escrow tokens into the wrapper.
    Lock = 4,
    /// Release escrowed tokens to the owner.
    Unlock = 5,
}

impl InteractionType {
    /// Case-insensitive lookup from the document key.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MINT" => Some(Self::Mint),
            "BURN" => Some(Self::Burn),
            "ASSIGN" => Some(Self::Assign),
            "CHECKPERMISSION" => Some(Self::Checkpermission),
            "LOCK" => Some(Self::Lock),
            "UNLOCK" => Some(Self::Unlock),
            _ => None,
        }
    }

    /// Numeric wire code.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint => write!(f, "MINT"),
            Self::Burn => write!(f, "BURN"),
            Self::Assign => write!(f, "ASSIGN"),
            Self::Checkpermission => write!(f, "CHECKPERMISSION"),
            Self::Lock => write!(f, "LOCK"),
            Self::Unlock => write!(f, "UNLOCK"),
        }
    }
}

/// One permitted on-chain function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyFunction {
    /// Solidity-style signature or chaincode function name.
    pub function_signature: String,
    /// Argument names, in call order.
    pub variables: Vec<String>,
    /// Whether the function may be called (required on EVM ledgers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl OntologyFunction {
    /// Treat a missing flag as unavailable.
    pub fn is_available(&self) -> bool {
        self.available.unwrap_or(false)
    }
}

/// Parsed ontology document.
///
/// Interaction keys are kept as written; validation maps them onto
/// [`InteractionType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyDocument {
    /// Human-readable name.
    pub name: String,
    /// Asset reference id (token id) the document governs.
    pub id: String,
    /// Ledger type the document applies to.
    #[serde(rename = "type")]
    pub ledger_type: LedgerType,
    /// Token contract name.
    pub contract: String,
    /// Interaction name to permitted functions.
    pub ontology: BTreeMap<String, Vec<OntologyFunction>>,
    /// Expected deployed bytecode of the token contract.
    pub bytecode: String,
    /// Canonical hash of the document without `hash`/`signature`.
    pub hash: String,
    /// Signature over `hash`.
    pub signature: String,
}

/// Required top-level fields and whether each must be a string.
const REQUIRED_STRING_FIELDS: [&str; 7] =
    ["name", "id", "type", "contract", "bytecode", "hash", "signature"];

/// Check that a raw document has every required field with the right shape.
///
/// Runs before any content validation.
pub fn is_valid_ontology_json_format(value: &Value) -> Result<(), OntologyError> {
    let fn_tag = "OntologyManager#isValidOntologyJsonFormat";
    let invalid = |reason: String| OntologyError::InvalidOntologyFormat {
        context: fn_tag.to_string(),
        reason,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| invalid("document is not a JSON object".to_string()))?;

    for field in REQUIRED_STRING_FIELDS {
        match obj.get(field) {
            Some(Value::String(_)) => {}
            Some(_) => return Err(invalid(format!("field `{field}` must be a string"))),
            None => return Err(invalid(format!("missing field `{field}`"))),
        }
    }

    let ontology = obj
        .get("ontology")
        .ok_or_else(|| invalid("missing field `ontology`".to_string()))?
        .as_object()
        .ok_or_else(|| invalid("field `ontology` must be an object".to_string()))?;

    for (interaction, functions) in ontology {
        let functions = functions
            .as_array()
            .ok_or_else(|| invalid(format!("interaction `{interaction}` must be an array")))?;
        for function in functions {
            let function = function
                .as_object()
                .ok_or_else(|| invalid(format!("function in `{interaction}` must be an object")))?;
            if !matches!(function.get("functionSignature"), Some(Value::String(_))) {
                return Err(invalid(format!("function in `{interaction}` lacks `functionSignature`")));
            }
            match function.get("variables") {
                Some(Value::Array(vars)) if vars.iter().all(Value::is_string) => {}
                _ => return Err(invalid(format!("function in `{interaction}` has invalid `variables`"))),
            }
            if let Some(available) = function.get("available") {
                if !available.is_boolean() {
                    return Err(invalid(format!("`available` in `{interaction}` must be a boolean")));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_raw() -> Value {
        json!({
            "name": "SATPToken",
            "id": "token1",
            "type": "BESU_2X",
            "contract": "SATPTokenContract",
            "ontology": {
                "lock": [{
                    "functionSignature": "transfer(address,address,uint256)",
                    "variables": ["owner", "bridge", "amount"],
                    "available": true
                }]
            },
            "bytecode": "0x60",
            "hash": "",
            "signature": ""
        })
    }

    #[test]
    fn test_valid_format() {
        assert!(is_valid_ontology_json_format(&make_raw()).is_ok());
        let doc: OntologyDocument = serde_json::from_value(make_raw()).unwrap();
        assert_eq!(doc.ledger_type, LedgerType::Besu2X);
        assert!(doc.ontology["lock"][0].is_available());
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut raw = make_raw();
        raw.as_object_mut().unwrap().remove("bytecode");
        let err = is_valid_ontology_json_format(&raw).unwrap_err();
        assert!(matches!(err, OntologyError::InvalidOntologyFormat { .. }));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let mut raw = make_raw();
        raw["ontology"]["lock"][0]["variables"] = json!("owner");
        assert!(is_valid_ontology_json_format(&raw).is_err());

        let mut raw = make_raw();
        raw["hash"] = json!(12);
        assert!(is_valid_ontology_json_format(&raw).is_err());
    }

    #[test]
    fn test_interaction_lookup_case_insensitive() {
        assert_eq!(InteractionType::from_str("lock"), Some(InteractionType::Lock));
        assert_eq!(InteractionType::from_str("CheckPermission"), Some(InteractionType::Checkpermission));
        assert_eq!(InteractionType::from_str("teleport"), None);
        assert_eq!(InteractionType::Unlock.code(), 5);
    }
}
