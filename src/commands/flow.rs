//! Chat-flow entry points for the UI shell.
//!
//! The shell calls these and renders the returned [`FlowSnapshot`]. Errors
//! that the flow already posted as a bot message come back as a normal
//! snapshot; only UI-level rejections (busy, stale option) return `Err`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use uuid::Uuid;

use crate::backend::FlowBackend;
use crate::flow::{ChatFlow, ChatMessage, FlowError, FlowState, RevealState, UiEffect};
use crate::model::{FinancialFact, UiFlags};
use crate::TokioMutex;

// ─── Views ──────────────────────────────────────────────────────────────────

/// One conversation message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub text: String,
    pub is_bot: bool,
    pub icon: Option<String>,
    pub timestamp: String,
    pub revealing: bool,
}

impl From<&ChatMessage> for MessageView {
    fn from(m: &ChatMessage) -> Self {
        Self {
            id: m.id.to_string(),
            text: m.text.clone(),
            is_bot: m.is_bot,
            icon: m.icon.clone(),
            timestamp: m.timestamp.to_rfc3339(),
            revealing: m.reveal == RevealState::Typing,
        }
    }
}

/// A clickable option.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub value: String,
    pub text: String,
    pub order: u32,
}

/// Everything the shell needs to render the chat and the side panels.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    /// `idle`, `loading`, `options`, `input` or `file_upload`.
    pub state: String,
    pub step: Option<u32>,
    pub messages: Vec<MessageView>,
    pub options: Vec<OptionView>,
    pub input_type: Option<String>,
    pub input_placeholder: Option<String>,
    pub flags: UiFlags,
    pub ink2_rows: Vec<FinancialFact>,
    pub company_name: Option<String>,
    pub fiscal_year: Option<i32>,
}

impl FlowSnapshot {
    pub fn capture<B: FlowBackend>(flow: &ChatFlow<B>) -> Self {
        let state = flow.state();
        let options = match state {
            FlowState::AwaitingOptions { options, .. } => options
                .iter()
                .map(|o| OptionView {
                    value: o.option_value.clone(),
                    text: o
                        .option_text
                        .clone()
                        .unwrap_or_else(|| o.option_value.clone()),
                    order: o.option_order,
                })
                .collect(),
            _ => Vec::new(),
        };
        let (input_type, input_placeholder) = match state {
            FlowState::AwaitingInput {
                input_type,
                placeholder,
                ..
            } => (input_type.clone(), placeholder.clone()),
            _ => (None, None),
        };
        let data = flow.data();
        Self {
            state: state.kind().to_string(),
            step: state.step_number(),
            messages: flow.messages().iter().map(MessageView::from).collect(),
            options,
            input_type,
            input_placeholder,
            flags: data.flags,
            ink2_rows: data.ink2_data.clone(),
            company_name: data.company_name.clone(),
            fiscal_year: data.fiscal_year,
        }
    }
}

/// A UI side effect, flattened for the shell.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectView {
    pub kind: String,
    pub anchor: String,
    pub delay_ms: u64,
}

impl From<UiEffect> for EffectView {
    fn from(effect: UiEffect) -> Self {
        match effect {
            UiEffect::ScrollToAnchor { anchor, delay } => Self {
                kind: "scroll".into(),
                anchor,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

// ─── Handle ─────────────────────────────────────────────────────────────────

/// Shared chat session held by the UI shell.
///
/// One transition runs at a time. A second call while one is in flight is
/// rejected with [`FlowError::Busy`] instead of queueing behind the lock.
pub struct FlowHandle<B: FlowBackend> {
    flow: TokioMutex<ChatFlow<B>>,
    busy: AtomicBool,
}

/// Clears the busy flag when the transition ends, including on error.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: FlowBackend> FlowHandle<B> {
    pub fn new(flow: ChatFlow<B>) -> Self {
        Self {
            flow: TokioMutex::new(flow),
            busy: AtomicBool::new(false),
        }
    }

    pub(crate) fn begin(&self) -> Result<BusyGuard<'_>, FlowError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FlowError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn flow(&self) -> &TokioMutex<ChatFlow<B>> {
        &self.flow
    }
}

/// Turn a transition result into the bridge's return value.
fn settle<B: FlowBackend>(
    flow: &ChatFlow<B>,
    result: Result<(), FlowError>,
) -> Result<FlowSnapshot, String> {
    match result {
        Ok(()) => Ok(FlowSnapshot::capture(flow)),
        Err(e) if e.is_reported_in_chat() => {
            tracing::debug!(error = %e, "bridge: error already shown in chat");
            Ok(FlowSnapshot::capture(flow))
        }
        Err(e) => Err(e.to_string()),
    }
}

// ─── Entry points ───────────────────────────────────────────────────────────

/// Load the first step of the conversation.
pub async fn start_flow<B: FlowBackend>(handle: &FlowHandle<B>) -> Result<FlowSnapshot, String> {
    let _guard = handle.begin().map_err(|e| e.to_string())?;
    let mut flow = handle.flow.lock().await;
    let result = flow.start().await;
    settle(&flow, result)
}

/// The user clicked an option.
pub async fn select_option<B: FlowBackend>(
    handle: &FlowHandle<B>,
    step_number: u32,
    option_value: String,
) -> Result<FlowSnapshot, String> {
    let _guard = handle.begin().map_err(|e| e.to_string())?;
    let mut flow = handle.flow.lock().await;
    let result = flow.select_option(step_number, &option_value).await;
    settle(&flow, result)
}

/// The user submitted the input field.
pub async fn submit_input<B: FlowBackend>(
    handle: &FlowHandle<B>,
    value: String,
) -> Result<FlowSnapshot, String> {
    let _guard = handle.begin().map_err(|e| e.to_string())?;
    let mut flow = handle.flow.lock().await;
    let result = flow.submit_input(&value).await;
    settle(&flow, result)
}

/// The shell finished revealing a message.
pub async fn complete_reveal<B: FlowBackend>(
    handle: &FlowHandle<B>,
    message_id: String,
) -> Result<bool, String> {
    let id = Uuid::parse_str(&message_id).map_err(|e| format!("Invalid message id: {e}"))?;
    let mut flow = handle.flow.lock().await;
    Ok(flow.complete_reveal(id))
}

/// Current conversation and model state.
pub async fn flow_snapshot<B: FlowBackend>(
    handle: &FlowHandle<B>,
) -> Result<FlowSnapshot, String> {
    let flow = handle.flow.lock().await;
    Ok(FlowSnapshot::capture(&flow))
}

/// Drain queued scroll effects.
pub async fn take_ui_effects<B: FlowBackend>(
    handle: &FlowHandle<B>,
) -> Result<Vec<EffectView>, String> {
    let mut flow = handle.flow.lock().await;
    Ok(flow.take_effects().into_iter().map(EffectView::from).collect())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{option, step, with_options, MockBackend};
    use crate::backend::{BackendError, ClientConfig, QuestionType, RevealPacing};

    fn handle(backend: MockBackend) -> FlowHandle<MockBackend> {
        let config = ClientConfig {
            reveal: RevealPacing::instant(),
            ..ClientConfig::default()
        };
        FlowHandle::new(ChatFlow::new(backend, config))
    }

    fn first_step() -> crate::backend::ChatStep {
        with_options(
            step(101, QuestionType::Options, "Välkommen!"),
            vec![option(1, "start", Some(201))],
        )
    }

    #[tokio::test]
    async fn test_start_flow_snapshot() {
        let h = handle(MockBackend::new().with_step(first_step()));
        let snap = start_flow(&h).await.unwrap();
        assert_eq!(snap.state, "options");
        assert_eq!(snap.step, Some(101));
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.options[0].value, "start");
        assert!(!h.is_busy());

        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("inputPlaceholder").is_some());
        assert!(json["messages"][0].get("isBot").is_some());
    }

    #[tokio::test]
    async fn test_busy_rejects_second_call() {
        let h = handle(MockBackend::new().with_step(first_step()));
        let guard = h.begin().unwrap();
        let err = select_option(&h, 101, "start".into()).await.unwrap_err();
        assert_eq!(err, FlowError::Busy.to_string());
        drop(guard);
        assert!(!h.is_busy());
    }

    #[tokio::test]
    async fn test_stale_option_is_err() {
        let h = handle(MockBackend::new().with_step(first_step()));
        start_flow(&h).await.unwrap();
        let err = select_option(&h, 101, "missing".into()).await.unwrap_err();
        assert!(err.contains("missing"));
        assert!(!h.is_busy());
    }

    #[tokio::test]
    async fn test_backend_failure_comes_back_as_snapshot() {
        let backend = MockBackend::new().with_step(first_step());
        backend.push_choice(Err(BackendError::HttpError {
            status: 500,
            body: "fel".into(),
        }));
        let h = handle(backend);
        start_flow(&h).await.unwrap();
        // "start" has no special action, so the generic tier asks the backend.
        let snap = select_option(&h, 101, "start".into()).await.unwrap();
        assert_eq!(snap.step, Some(101));
        assert!(snap.messages.last().unwrap().icon.is_some());
    }

    #[tokio::test]
    async fn test_complete_reveal_and_effects() {
        let h = handle(MockBackend::new().with_step(first_step()));
        let snap = start_flow(&h).await.unwrap();
        let id = snap.messages[0].id.clone();
        assert!(snap.messages[0].revealing);
        assert!(complete_reveal(&h, id).await.unwrap());
        assert!(!flow_snapshot(&h).await.unwrap().messages[0].revealing);
        assert!(complete_reveal(&h, "not-a-uuid".into()).await.is_err());
        assert!(take_ui_effects(&h).await.unwrap().is_empty());
    }
}
