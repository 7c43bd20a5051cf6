//! SIE upload entry point.
//!
//! Ingestion failures are returned as toast data in [`UploadOutcome`], not
//! as `Err`: the shell keeps the file selection so the user can fix it and
//! retry.

use std::path::PathBuf;

use serde::Serialize;

use super::flow::{FlowHandle, FlowSnapshot};
use crate::backend::FlowBackend;
use crate::ingest;

/// Result of an upload attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub ok: bool,
    /// Typed code (`YEAR_MISMATCH`, `COMPANY_MISMATCH`, ...) when `ok` is false.
    pub error_code: Option<String>,
    /// Swedish toast text when `ok` is false.
    pub message: Option<String>,
    /// Conversation state after a successful upload.
    pub snapshot: Option<FlowSnapshot>,
}

/// Read, validate and upload the selected files, then continue the chat.
pub async fn upload_files<B: FlowBackend>(
    handle: &FlowHandle<B>,
    paths: Vec<String>,
) -> Result<UploadOutcome, String> {
    let _guard = handle.begin().map_err(|e| e.to_string())?;
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
    tracing::info!(file_count = paths.len(), "bridge: upload requested");

    let mut flow = handle.flow().lock().await;
    let facts = match ingest::ingest_paths(flow.backend(), &paths).await {
        Ok(facts) => facts,
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "bridge: upload failed");
            return Ok(UploadOutcome {
                ok: false,
                error_code: Some(e.code().to_string()),
                message: Some(e.user_message()),
                snapshot: None,
            });
        }
    };

    match flow.complete_file_upload(facts).await {
        Err(e) if !e.is_reported_in_chat() => Err(e.to_string()),
        _ => Ok(UploadOutcome {
            ok: true,
            error_code: None,
            message: None,
            snapshot: Some(FlowSnapshot::capture(&flow)),
        }),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{option, step, with_options, Call, MockBackend};
    use crate::backend::{ActionType, ClientConfig, QuestionType, RevealPacing};
    use crate::flow::ChatFlow;
    use serde_json::json;

    fn write_sie(dir: &std::path::Path, name: &str, year: i32, org: &str) -> String {
        let path = dir.join(name);
        let body = format!("#FNAMN \"Exempel AB\"\n#ORGNR {org}\n#RAR 0 {year}0101 {year}1231\n");
        std::fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    fn handle(backend: MockBackend) -> FlowHandle<MockBackend> {
        let config = ClientConfig {
            reveal: RevealPacing::instant(),
            ..ClientConfig::default()
        };
        FlowHandle::new(ChatFlow::new(backend, config))
    }

    #[tokio::test]
    async fn test_year_mismatch_is_toast_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sie(dir.path(), "a.se", 2022, "5566778899");
        let b = write_sie(dir.path(), "b.se", 2024, "5566778899");
        let h = handle(MockBackend::new());

        let outcome = upload_files(&h, vec![a, b]).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.error_code.as_deref(), Some("YEAR_MISMATCH"));
        assert!(outcome.message.is_some());
        assert!(!h.is_busy());

        let flow = h.flow().lock().await;
        assert!(flow.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_loads_data_and_continues() {
        let mut upload_step = step(102, QuestionType::Options, "Ladda upp dina SIE-filer");
        let mut upload = option(1, "upload", Some(103));
        upload.action_type = ActionType::ShowFileUpload;
        upload_step = with_options(upload_step, vec![upload]);

        let backend = MockBackend::new()
            .with_step(upload_step)
            .with_step(step(103, QuestionType::Options, "Årets resultat: {net_result} kr"));
        backend.push_upload(Ok(json!({
            "success": true,
            "data": { "rr_data": [
                { "variable_name": "SumAretsResultat", "amount": 234567 }
            ]}
        })));
        let h = handle(backend);

        {
            let mut flow = h.flow().lock().await;
            flow.load_chat_step(102).await.unwrap();
        }
        // The show_file_upload option is resolved by the backend's action.
        {
            let flow = h.flow().lock().await;
            flow.backend().push_choice(Ok(crate::backend::ChoiceOutcome {
                action_type: ActionType::ShowFileUpload,
                action_data: None,
                next_step: Some(103),
            }));
        }
        let snap = crate::commands::flow::select_option(&h, 102, "upload".into())
            .await
            .unwrap();
        assert_eq!(snap.state, "file_upload");

        let dir = tempfile::tempdir().unwrap();
        let path = write_sie(dir.path(), "2023.se", 2023, "5566778899");
        let outcome = upload_files(&h, vec![path]).await.unwrap();

        assert!(outcome.ok);
        let snap = outcome.snapshot.unwrap();
        assert_eq!(snap.step, Some(103));
        assert_eq!(snap.fiscal_year, Some(2023));
        assert_eq!(snap.messages.last().unwrap().text, "Årets resultat: 234 567 kr");

        let flow = h.flow().lock().await;
        assert_eq!(flow.backend().count(|c| matches!(c, Call::Upload { .. })), 1);
    }
}
