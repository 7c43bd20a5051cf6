//! Upload pipeline: read the selected files, run the pre-flight checks,
//! upload, and turn the response into [`IngestedFacts`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::errors::IngestError;
use super::extract::extract_facts;
use super::sie::{parse_header, SieHeader};
use super::validate::{assign_roles, validate_selection};
use crate::backend::{FileRole, FlowBackend, UploadFile};
use crate::model::IngestedFacts;

/// A file picked by the user, read into memory.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Files that passed the pre-flight checks, with their upload roles.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub files: Vec<UploadFile>,
    /// Header of the current-year file.
    pub identity: SieHeader,
}

/// Read the selected files from disk.
pub async fn read_files(paths: &[PathBuf]) -> Result<Vec<SelectedFile>, IngestError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IngestError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        files.push(SelectedFile {
            file_name: file_name(path),
            bytes,
        });
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse headers, validate the selection and assign current/previous year.
///
/// Nothing is uploaded when this fails.
pub fn prepare_upload(selected: Vec<SelectedFile>) -> Result<PreparedUpload, IngestError> {
    let headers: Vec<SieHeader> = selected.iter().map(|f| parse_header(&f.bytes)).collect();
    validate_selection(&headers)?;
    let roles = assign_roles(&headers);

    let identity = roles
        .iter()
        .position(|r| *r == FileRole::CurrentYear)
        .and_then(|i| headers.get(i).cloned())
        .unwrap_or_default();
    let files = selected
        .into_iter()
        .zip(roles)
        .map(|(file, role)| UploadFile {
            file_name: file.file_name,
            role,
            bytes: file.bytes,
        })
        .collect();

    Ok(PreparedUpload { files, identity })
}

/// Upload prepared files and extract the financial model from the response.
pub async fn ingest<B: FlowBackend>(
    backend: &B,
    upload: &PreparedUpload,
) -> Result<IngestedFacts, IngestError> {
    let response = backend
        .upload_files(&upload.files)
        .await
        .map_err(IngestError::from_backend)?;

    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let code = response_text(&response, &["error_code", "code"]);
        let reason = response_text(&response, &["message", "error", "detail"])
            .unwrap_or_else(|| "unknown error".to_string());
        tracing::warn!(code = ?code, reason = %reason, "upload rejected by backend");
        return Err(IngestError::Rejected { code, reason });
    }

    let mut facts = extract_facts(&response);
    let identity = &upload.identity;
    if facts.org_number.is_none() {
        facts.org_number = identity.org_number.clone();
    }
    if facts.fiscal_year.is_none() {
        facts.fiscal_year = identity.fiscal_year_end;
    }
    if facts.company_name.is_none() {
        facts.company_name = identity.company_name.clone();
    }

    tracing::info!(
        file_count = upload.files.len(),
        fiscal_year = ?facts.fiscal_year,
        "ingest complete"
    );
    Ok(facts)
}

/// Read, validate and upload in one go.
pub async fn ingest_paths<B: FlowBackend>(
    backend: &B,
    paths: &[PathBuf],
) -> Result<IngestedFacts, IngestError> {
    let selected = read_files(paths).await?;
    let prepared = prepare_upload(selected)?;
    ingest(backend, &prepared).await
}

fn response_text(response: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| response.get(*k).and_then(Value::as_str))
        .map(String::from)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
