//! Ontology registry.
//!
//! Loads every `*.json` document from a directory once, validates it at the
//! configured [`OntologyCheckLevel`], and serves it by `(ledgerType, tokenId)`.
//! The registry is read-only after construction, so it can be shared behind an
//! `Arc` without locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{is_valid_ontology_json_format, OntologyDocument};
use super::encoding::{encode_interactions, InteractionSignature};
use super::error::OntologyError;
use super::validation::{check_structure, parse_trusted_key, verify_integrity, OntologyCheckLevel};
use crate::telemetry::SpanScope;
use crate::types::network::{LedgerFamily, LedgerType};

/// Configuration for [`OntologyManager`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyManagerOptions {
    /// Directory scanned for `*.json` ontology documents.
    pub ontologies_path: Option<PathBuf>,
    /// Trust level applied to every document.
    #[serde(default)]
    pub check_level: OntologyCheckLevel,
    /// Hex-encoded ed25519 keys accepted as ontology signers.
    #[serde(default)]
    pub trusted_public_keys: Vec<String>,
}

impl OntologyManagerOptions {
    /// Load options from environment variables.
    ///
    /// - `SATP_ONTOLOGIES_PATH`: directory of ontology documents
    /// - `SATP_ONTOLOGY_CHECK_LEVEL`: `DEFAULT`, `HASHED` or `HASHED_SIGNED`
    /// - `SATP_ONTOLOGY_TRUSTED_KEYS`: comma-separated hex keys
    pub fn from_env() -> Self {
        let ontologies_path = std::env::var("SATP_ONTOLOGIES_PATH").ok().map(PathBuf::from);
        let check_level = std::env::var("SATP_ONTOLOGY_CHECK_LEVEL")
            .ok()
            .and_then(|s| OntologyCheckLevel::from_str(&s))
            .unwrap_or_default();
        let trusted_public_keys = std::env::var("SATP_ONTOLOGY_TRUSTED_KEYS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            ontologies_path,
            check_level,
            trusted_public_keys,
        }
    }
}

/// Source of deployed contract bytecode.
///
/// Implemented by the EVM leaves.
#[async_trait]
pub trait BytecodeSource: Send + Sync {
    /// Error type for bytecode lookups.
    type Error: std::error::Error + Send + Sync;

    /// Deployed bytecode at `address`, hex with `0x` prefix.
    async fn get_contract_bytecode(&self, address: &str) -> Result<String, Self::Error>;
}

#[derive(Debug, Clone)]
struct StoredOntology {
    raw: String,
    doc: OntologyDocument,
}

/// Registry of validated ontologies.
#[derive(Debug)]
pub struct OntologyManager {
    check_level: OntologyCheckLevel,
    trusted_keys: Vec<VerifyingKey>,
    ontologies: BTreeMap<(LedgerType, String), StoredOntology>,
}

impl OntologyManager {
    /// Build the registry, loading the configured directory if any.
    pub fn new(options: OntologyManagerOptions) -> Result<Self, OntologyError> {
        let scope = SpanScope::start("OntologyManager#constructor");
        scope.run_sync(|| {
            let trusted_keys = options
                .trusted_public_keys
                .iter()
                .map(|k| parse_trusted_key(k))
                .collect::<Result<Vec<_>, _>>()?;

            let mut manager = Self {
                check_level: options.check_level,
                trusted_keys,
                ontologies: BTreeMap::new(),
            };

            if let Some(path) = &options.ontologies_path {
                manager.load_directory(path)?;
            }

            tracing::info!(
                count = manager.ontologies.len(),
                check_level = %manager.check_level,
                "ontology manager initialized"
            );
            Ok(manager)
        })
    }

    /// Build a registry from in-memory documents as `(source name, raw JSON)`.
    pub fn from_documents<I, S>(
        check_level: OntologyCheckLevel,
        trusted_keys: Vec<VerifyingKey>,
        documents: I,
    ) -> Result<Self, OntologyError>
    where
        I: IntoIterator<Item = (S, String)>,
        S: AsRef<str>,
    {
        let mut manager = Self {
            check_level,
            trusted_keys,
            ontologies: BTreeMap::new(),
        };
        for (source, raw) in documents {
            manager.ingest(source.as_ref(), raw)?;
        }
        Ok(manager)
    }

    fn load_directory(&mut self, dir: &Path) -> Result<(), OntologyError> {
        let fn_tag = "OntologyManager#loadOntologies";
        let entries = std::fs::read_dir(dir).map_err(|e| OntologyError::io(fn_tag, dir, e))?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| OntologyError::io(fn_tag, dir, e))?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let raw = std::fs::read_to_string(&path).map_err(|e| OntologyError::io(fn_tag, &path, e))?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.ingest(&source, raw)?;
        }
        Ok(())
    }

    fn ingest(&mut self, source: &str, raw: String) -> Result<(), OntologyError> {
        let fn_tag = "OntologyManager#loadOntology";
        let parse_err = |reason: String| OntologyError::Parse {
            context: fn_tag.to_string(),
            source_name: source.to_string(),
            reason,
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))?;
        is_valid_ontology_json_format(&value)?;
        verify_integrity(self.check_level, &value, &self.trusted_keys)?;

        let ledger_str = value["type"].as_str().unwrap_or_default();
        if LedgerType::from_str(ledger_str).is_none() {
            return Err(OntologyError::UnsupportedLedger {
                context: fn_tag.to_string(),
                value: ledger_str.to_string(),
            });
        }

        let doc: OntologyDocument = serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
        check_structure(&doc)?;

        let key = (doc.ledger_type, doc.id.clone());
        if self.ontologies.contains_key(&key) {
            tracing::warn!(
                ledger_type = %doc.ledger_type,
                token_id = %doc.id,
                source,
                "duplicate ontology, overwriting"
            );
        }
        tracing::debug!(ledger_type = %doc.ledger_type, token_id = %doc.id, source, "ontology loaded");
        self.ontologies.insert(key, StoredOntology { raw, doc });
        Ok(())
    }

    fn lookup(&self, fn_tag: &str, ledger_type: LedgerType, token_id: &str) -> Result<&StoredOntology, OntologyError> {
        self.ontologies
            .get(&(ledger_type, token_id.to_string()))
            .ok_or_else(|| OntologyError::OntologyNotFound {
                context: fn_tag.to_string(),
                ledger_type,
                token_id: token_id.to_string(),
            })
    }

    /// Raw JSON of an ontology, exactly as loaded.
    pub fn get_ontology(&self, ledger_type: LedgerType, token_id: &str) -> Result<String, OntologyError> {
        let fn_tag = "OntologyManager#getOntology";
        SpanScope::start(fn_tag).run_sync(|| Ok(self.lookup(fn_tag, ledger_type, token_id)?.raw.clone()))
    }

    /// Parsed ontology document.
    pub fn get_ontology_document(
        &self,
        ledger_type: LedgerType,
        token_id: &str,
    ) -> Result<&OntologyDocument, OntologyError> {
        Ok(&self.lookup("OntologyManager#getOntologyDocument", ledger_type, token_id)?.doc)
    }

    /// Encoded interaction signatures for a ledger's wrapper contract.
    pub fn get_ontology_interactions(
        &self,
        ledger_type: LedgerType,
        token_id: &str,
    ) -> Result<Vec<InteractionSignature>, OntologyError> {
        let fn_tag = "OntologyManager#getOntologyInteractions";
        SpanScope::start(fn_tag).run_sync(|| {
            if ledger_type.family() == LedgerFamily::Unsupported {
                return Err(OntologyError::LedgerNotSupported {
                    context: fn_tag.to_string(),
                    ledger_type,
                });
            }
            let stored = self.lookup(fn_tag, ledger_type, token_id)?;
            encode_interactions(&stored.doc)
        })
    }

    /// Check that the contract at `address` runs the registered bytecode.
    pub async fn check_ontology_bytecode<S>(
        &self,
        ledger_type: LedgerType,
        token_id: &str,
        address: &str,
        source: &S,
    ) -> Result<bool, OntologyError>
    where
        S: BytecodeSource + ?Sized,
    {
        let fn_tag = "OntologyManager#checkOntologyBytecode";
        SpanScope::start(fn_tag)
            .run(async {
                match ledger_type.family() {
                    LedgerFamily::Evm => {}
                    LedgerFamily::Fabric | LedgerFamily::Unsupported => {
                        return Err(OntologyError::LedgerNotSupported {
                            context: fn_tag.to_string(),
                            ledger_type,
                        })
                    }
                }
                let stored = self.lookup(fn_tag, ledger_type, token_id)?;
                let onchain = source
                    .get_contract_bytecode(address)
                    .await
                    .map_err(|e| OntologyError::BytecodeLookup {
                        context: fn_tag.to_string(),
                        reason: e.to_string(),
                    })?;

                if normalize_bytecode(&onchain) != normalize_bytecode(&stored.doc.bytecode) {
                    return Err(OntologyError::InvalidBytecode {
                        context: fn_tag.to_string(),
                        token_id: token_id.to_string(),
                        address: address.to_string(),
                    });
                }
                Ok::<_, OntologyError>(true)
            })
            .await
    }

    /// Reserved: ontologies are fixed after construction.
    pub fn add_ontology(&self, _raw: &str) -> Result<(), OntologyError> {
        Err(OntologyError::UnsupportedOperation {
            context: "OntologyManager#addOntology".to_string(),
        })
    }

    /// Reserved: ontologies are fixed after construction.
    pub fn remove_ontology(&self, _ledger_type: LedgerType, _token_id: &str) -> Result<(), OntologyError> {
        Err(OntologyError::UnsupportedOperation {
            context: "OntologyManager#removeOntology".to_string(),
        })
    }

    /// Number of loaded ontologies.
    pub fn len(&self) -> usize {
        self.ontologies.len()
    }

    /// Whether no ontology is loaded.
    pub fn is_empty(&self) -> bool {
        self.ontologies.is_empty()
    }

    /// Check level in force.
    pub fn check_level(&self) -> OntologyCheckLevel {
        self.check_level
    }
}

fn normalize_bytecode(code: &str) -> String {
    code.trim().trim_start_matches("0x").to_lowercase()
}
