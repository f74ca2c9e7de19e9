//! Asset ontologies.
//!
//! ## Purpose
//!
//! An ontology is the signed, per-ledger list of functions a wrapper contract
//! may call for one asset reference. A bridge leaf never decides call shape on
//! its own: it asks the [`OntologyManager`] for the encoded
//! [`InteractionSignature`]s and hands them to the wrapper at `wrap` time.
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | `document` | document model, interaction types, format check |
//! | `encoding` | positional variable codes, interaction signatures |
//! | `validation` | check levels and the validation pipeline |
//! | `manager` | the registry |

pub mod document;
pub mod encoding;
pub mod error;
pub mod manager;
pub mod validation;

pub use document::{is_valid_ontology_json_format, InteractionType, OntologyDocument, OntologyFunction};
pub use encoding::{encode_interactions, AssetParameterIdentifier, InteractionSignature, VarType};
pub use error::OntologyError;
pub use manager::{BytecodeSource, OntologyManager, OntologyManagerOptions};
pub use validation::{compute_ontology_hash, OntologyCheckLevel};
