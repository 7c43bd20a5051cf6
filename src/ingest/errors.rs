//! Ingestion error types.
//!
//! Every variant maps to a typed code (`code()`) and a Swedish toast text
//! (`user_message()`). Server-side validation failures carrying the same
//! codes as the pre-flight checks show the same text.

use thiserror::Error;

use crate::backend::BackendError;

pub const YEAR_MISMATCH: &str = "YEAR_MISMATCH";
pub const COMPANY_MISMATCH: &str = "COMPANY_MISMATCH";

/// Errors that can occur while reading, validating or uploading SIE files.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no files selected")]
    NoFiles,

    #[error("{count} files selected, at most 2 are supported")]
    TooManyFiles { count: usize },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    /// The two files are not consecutive fiscal years.
    #[error("fiscal years {first} and {second} are not consecutive")]
    YearMismatch { first: i32, second: i32 },

    /// The two files belong to different organisations.
    #[error("organisation numbers differ: {first} vs {second}")]
    CompanyMismatch { first: String, second: String },

    #[error("upload failed: {0}")]
    UploadFailed(#[source] BackendError),

    /// The backend refused the files, optionally with a typed code.
    #[error("upload rejected ({code:?}): {reason}")]
    Rejected { code: Option<String>, reason: String },
}

impl IngestError {
    /// Typed error code for the UI.
    pub fn code(&self) -> &str {
        match self {
            IngestError::NoFiles => "NO_FILES",
            IngestError::TooManyFiles { .. } => "TOO_MANY_FILES",
            IngestError::ReadFailed { .. } => "READ_FAILED",
            IngestError::YearMismatch { .. } => YEAR_MISMATCH,
            IngestError::CompanyMismatch { .. } => COMPANY_MISMATCH,
            IngestError::UploadFailed(_) => "UPLOAD_FAILED",
            IngestError::Rejected { code, .. } => code.as_deref().unwrap_or("REJECTED"),
        }
    }

    /// Whether this came from the pre-flight or server-side file validation.
    pub fn is_validation(&self) -> bool {
        matches!(self.code(), YEAR_MISMATCH | COMPANY_MISMATCH)
    }

    /// Swedish toast text.
    pub fn user_message(&self) -> String {
        match self.code() {
            YEAR_MISMATCH => {
                "Filerna måste avse två på varandra följande räkenskapsår.".to_string()
            }
            COMPANY_MISMATCH => {
                "Filerna tillhör olika företag. Kontrollera organisationsnumren.".to_string()
            }
            _ => match self {
                IngestError::NoFiles => "Välj minst en SIE-fil att ladda upp.".to_string(),
                IngestError::TooManyFiles { .. } => {
                    "Du kan ladda upp högst två SIE-filer: innevarande och föregående år."
                        .to_string()
                }
                IngestError::ReadFailed { path, .. } => {
                    format!("Filen {path} kunde inte läsas.")
                }
                IngestError::Rejected { reason, .. } => {
                    format!("Filen kunde inte behandlas: {reason}")
                }
                _ => "Uppladdningen misslyckades. Försök igen.".to_string(),
            },
        }
    }

    /// Map a backend failure, keeping typed validation codes.
    pub fn from_backend(err: BackendError) -> Self {
        match err.error_code() {
            Some(code) if code == YEAR_MISMATCH || code == COMPANY_MISMATCH => {
                IngestError::Rejected {
                    code: Some(code),
                    reason: err.error_body().unwrap_or_default().to_string(),
                }
            }
            _ => IngestError::UploadFailed(err),
        }
    }
}
