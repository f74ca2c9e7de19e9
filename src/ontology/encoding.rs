//! Positional variable encodings and interaction signatures.
//!
//! Wrapper contracts never receive variable names. Each ontology variable is
//! replaced by a positional code the contract uses to build the call to the
//! token contract, so the contract can check call shape without trusting
//! caller-supplied data.
//!
//! | Ledger family | Enum | Codes |
//! |---------------|------|-------|
//! | EVM | [`VarType`] | 0..=7 |
//! | Fabric | [`AssetParameterIdentifier`] | 0..=12 |

use serde::{Deserialize, Serialize};

use super::document::{InteractionType, OntologyDocument};
use super::error::OntologyError;
use crate::types::network::{LedgerFamily, LedgerType};

/// Variable codes understood by the EVM wrapper contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarType {
    /// Token contract address.
    Contractaddress = 0,
    /// Token type code.
    Tokentype = 1,
    /// Token id.
    Tokenid = 2,
    /// Token owner.
    Owner = 3,
    /// Operation amount.
    Amount = 4,
    /// Wrapper (bridge) address.
    Bridge = 5,
    /// Assignment receiver.
    Receiver = 6,
    /// Non-fungible descriptor.
    Uniquedescriptor = 7,
}

impl VarType {
    /// Case-insensitive lookup.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CONTRACTADDRESS" => Some(Self::Contractaddress),
            "TOKENTYPE" => Some(Self::Tokentype),
            "TOKENID" => Some(Self::Tokenid),
            "OWNER" => Some(Self::Owner),
            "AMOUNT" => Some(Self::Amount),
            "BRIDGE" => Some(Self::Bridge),
            "RECEIVER" => Some(Self::Receiver),
            "UNIQUEDESCRIPTOR" => Some(Self::Uniquedescriptor),
            _ => None,
        }
    }
}

/// Variable codes understood by the Fabric wrapper chaincode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetParameterIdentifier {
    /// Token chaincode name.
    Contractname = 0,
    /// Channel of the token chaincode.
    Channelname = 1,
    /// Token id.
    Tokenid = 2,
    /// Token owner.
    Owner = 3,
    /// MSP of the owner.
    Ownermspid = 4,
    /// Wrapper client id.
    Bridge = 5,
    /// MSP of the wrapper.
    Bridgemspid = 6,
    /// Operation amount.
    Amount = 7,
    /// Assignment receiver.
    Receiver = 8,
    /// MSP of the invoking client.
    Mspid = 9,
    /// Token contract address.
    Contractaddress = 10,
    /// Token type code.
    Tokentype = 11,
    /// Non-fungible descriptor.
    Uniquedescriptor = 12,
}

impl AssetParameterIdentifier {
    /// Case-insensitive lookup.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CONTRACTNAME" => Some(Self::Contractname),
            "CHANNELNAME" => Some(Self::Channelname),
            "TOKENID" => Some(Self::Tokenid),
            "OWNER" => Some(Self::Owner),
            "OWNERMSPID" => Some(Self::Ownermspid),
            "BRIDGE" => Some(Self::Bridge),
            "BRIDGEMSPID" => Some(Self::Bridgemspid),
            "AMOUNT" => Some(Self::Amount),
            "RECEIVER" => Some(Self::Receiver),
            "MSPID" => Some(Self::Mspid),
            "CONTRACTADDRESS" => Some(Self::Contractaddress),
            "TOKENTYPE" => Some(Self::Tokentype),
            "UNIQUEDESCRIPTOR" => Some(Self::Uniquedescriptor),
            _ => None,
        }
    }
}

/// Resolve a variable name to its positional code for a ledger type.
///
/// Returns `Ok(None)` when the name is unknown on a supported ledger, and
/// `LedgerNotSupported` when the ledger has no encoding at all.
pub fn variable_code(
    context: &str,
    ledger_type: LedgerType,
    variable: &str,
) -> Result<Option<u8>, OntologyError> {
    match ledger_type.family() {
        LedgerFamily::Evm => Ok(VarType::from_str(variable).map(|v| v as u8)),
        LedgerFamily::Fabric => Ok(AssetParameterIdentifier::from_str(variable).map(|v| v as u8)),
        LedgerFamily::Unsupported => Err(OntologyError::LedgerNotSupported {
            context: context.to_string(),
            ledger_type,
        }),
    }
}

/// Encoded interaction passed to a wrapper contract's `wrap`.
///
/// `functions_signature[i]` is called with the arguments named by
/// `variables[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSignature {
    /// Interaction wire code.
    pub interaction_type: u8,
    /// Function signatures, in call order.
    pub functions_signature: Vec<String>,
    /// Positional variable codes per function.
    pub variables: Vec<Vec<u8>>,
    /// Always true once validated.
    pub available: bool,
}

impl InteractionSignature {
    /// Decoded interaction type.
    pub fn interaction(&self) -> Option<InteractionType> {
        match self.interaction_type {
            0 => Some(InteractionType::Mint),
            1 => Some(InteractionType::Burn),
            2 => Some(InteractionType::Assign),
            3 => Some(InteractionType::Checkpermission),
            4 => Some(InteractionType::Lock),
            5 => Some(InteractionType::Unlock),
            _ => None,
        }
    }
}

/// Encode every interaction of a document for its ledger type.
///
/// Interactions come out in document key order. Unknown interactions or
/// variables are errors here too, so encoding an unvalidated document cannot
/// silently drop entries.
pub fn encode_interactions(doc: &OntologyDocument) -> Result<Vec<InteractionSignature>, OntologyError> {
    let fn_tag = "OntologyManager#getOntologyInteractions";
    let mut out = Vec::with_capacity(doc.ontology.len());

    for (name, functions) in &doc.ontology {
        let interaction = InteractionType::from_str(name).ok_or_else(|| OntologyError::UnknownInteraction {
            context: fn_tag.to_string(),
            interaction: name.clone(),
        })?;

        let mut signatures = Vec::with_capacity(functions.len());
        let mut variables = Vec::with_capacity(functions.len());
        for function in functions {
            let mut codes = Vec::with_capacity(function.variables.len());
            for variable in &function.variables {
                let code = variable_code(fn_tag, doc.ledger_type, variable)?.ok_or_else(|| {
                    OntologyError::OntologyFunctionVariableNotSupported {
                        context: fn_tag.to_string(),
                        function: function.function_signature.clone(),
                        variable: variable.clone(),
                        ledger_type: doc.ledger_type,
                    }
                })?;
                codes.push(code);
            }
            signatures.push(function.function_signature.clone());
            variables.push(codes);
        }

        out.push(InteractionSignature {
            interaction_type: interaction.code(),
            functions_signature: signatures,
            variables,
            available: true,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::document::OntologyFunction;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn make_doc(ledger_type: LedgerType, variables: &[&str]) -> OntologyDocument {
        let mut ontology = BTreeMap::new();
        ontology.insert(
            "lock".to_string(),
            vec![OntologyFunction {
                function_signature: "transfer(address,address,uint256)".to_string(),
                variables: variables.iter().map(|v| v.to_string()).collect(),
                available: Some(true),
            }],
        );
        OntologyDocument {
            name: "SATPToken".to_string(),
            id: "token1".to_string(),
            ledger_type,
            contract: "SATPTokenContract".to_string(),
            ontology,
            bytecode: "0x".to_string(),
            hash: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn test_evm_encoding() {
        let doc = make_doc(LedgerType::Besu2X, &["owner", "bridge", "amount"]);
        let encoded = encode_interactions(&doc).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].interaction(), Some(InteractionType::Lock));
        assert_eq!(encoded[0].variables, vec![vec![3, 5, 4]]);
        assert!(encoded[0].available);
    }

    #[test]
    fn test_fabric_uses_its_own_codes() {
        let doc = make_doc(LedgerType::Fabric2, &["owner", "bridge", "amount", "channelName"]);
        let encoded = encode_interactions(&doc).unwrap();
        assert_eq!(encoded[0].variables, vec![vec![3, 5, 7, 1]]);
    }

    #[test]
    fn test_fabric_only_variable_rejected_on_evm() {
        let doc = make_doc(LedgerType::Ethereum, &["owner", "mspId"]);
        let err = encode_interactions(&doc).unwrap_err();
        assert!(matches!(err, OntologyError::OntologyFunctionVariableNotSupported { ref variable, .. } if variable == "mspId"));
    }

    #[test]
    fn test_unsupported_ledger() {
        let doc = make_doc(LedgerType::Corda4X, &["owner"]);
        assert!(matches!(
            encode_interactions(&doc),
            Err(OntologyError::LedgerNotSupported { .. })
        ));
    }

    #[test]
    fn test_wire_shape() {
        let doc = make_doc(LedgerType::Besu2X, &["owner"]);
        let encoded = encode_interactions(&doc).unwrap();
        assert_eq!(
            crate::canonical::stable_stringify(&encoded),
            r#"[{"available":true,"functionsSignature":["transfer(address,address,uint256)"],"interactionType":4,"variables":[[3]]}]"#
        );
    }

    const EVM_NAMES: [&str; 8] = [
        "contractAddress", "tokenType", "tokenId", "owner",
        "amount", "bridge", "receiver", "uniqueDescriptor",
    ];

    proptest! {
        #[test]
        fn prop_evm_lookup_ignores_case(idx in 0usize..8, upper in proptest::collection::vec(any::<bool>(), 16)) {
            let name = EVM_NAMES[idx];
            let mixed: String = name
                .chars()
                .zip(upper.iter().cycle())
                .map(|(c, u)| if *u { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                .collect();
            prop_assert_eq!(VarType::from_str(&mixed), VarType::from_str(name));
            prop_assert!(VarType::from_str(&mixed).is_some());
        }

        #[test]
        fn prop_encoding_preserves_variable_count(picks in proptest::collection::vec(0usize..8, 0..12)) {
            let names: Vec<&str> = picks.iter().map(|i| EVM_NAMES[*i]).collect();
            let doc = make_doc(LedgerType::Besu1X, &names);
            let encoded = encode_interactions(&doc).unwrap();
            prop_assert_eq!(encoded[0].variables[0].len(), names.len());
            for (code, idx) in encoded[0].variables[0].iter().zip(picks.iter()) {
                prop_assert_eq!(*code as usize, *idx);
            }
        }
    }
}
