//! Ingestion of SIE exports.
//!
//! Submodules:
//! - `sie`: identification records (`#RAR`, `#ORGNR`, `#FNAMN`)
//! - `validate`: pre-flight year and company checks, upload roles
//! - `adapter`: read, validate, upload, extract
//! - `extract`: per-fact lookup cascades over the upload response
//! - `errors`: `IngestError` with typed codes

pub mod adapter;
pub mod errors;
pub mod extract;
pub mod sie;
pub mod validate;

// Re-exports for convenience
pub use adapter::{ingest, ingest_paths, prepare_upload, read_files, PreparedUpload, SelectedFile};
pub use errors::IngestError;
pub use extract::extract_facts;
pub use sie::{parse_header, SieHeader};
