//! Step-number tables and the pure halves of option resolution.
//!
//! Everything here is a lookup: which option values get bespoke handling,
//! where an override choice goes when the server gave no `next_step`, which
//! steps count as tax-related, and which anchor a step scrolls to. The
//! orchestrator owns the effects.

use std::time::Duration;

use crate::backend::{ChatOption, UiConfig};
use crate::ledger::{normalize_variable, OverrideKey};

// ─── Tier 1: named options ──────────────────────────────────────────────────

/// Option values with client-side business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedOption {
    /// Keep the tax already booked in the statements.
    ApproveTax,
    /// Accept the calculated tax, syncing the statements when it differs.
    ApproveCalculated,
    /// Show the full tax computation.
    ReviewAdjustments,
    /// Open the INK2 rows for editing.
    AdjustCalculated,
    /// Discard unsaved overrides.
    KeepCurrent,
    /// "No unused tax loss" on the unused-loss question.
    NoUnusedLoss,
}

/// Step whose `none` answer means "no unused tax loss".
pub const UNUSED_LOSS_STEP: u32 = 301;

/// Tier 1: classify a named option value. `none` only counts on step 301.
pub fn named_option(option_value: &str, current_step: Option<u32>) -> Option<NamedOption> {
    match option_value {
        "approve_tax" => Some(NamedOption::ApproveTax),
        "approve_calculated" => Some(NamedOption::ApproveCalculated),
        "review_adjustments" => Some(NamedOption::ReviewAdjustments),
        "adjust_calculated" => Some(NamedOption::AdjustCalculated),
        "keep_current" => Some(NamedOption::KeepCurrent),
        "none" if current_step == Some(UNUSED_LOSS_STEP) => Some(NamedOption::NoUnusedLoss),
        _ => None,
    }
}

// ─── Tier 2: override variables ─────────────────────────────────────────────

/// Tier 2: the override key an option's `action_data.variable` targets.
pub fn override_target(option: &ChatOption) -> Option<OverrideKey> {
    option.action_str("variable").and_then(normalize_variable)
}

/// Conservative next steps for override choices without a `next_step`.
const OVERRIDE_FALLBACKS: &[(u32, u32)] = &[(301, 302), (302, 303), (420, 422), (421, 422)];

/// Where an override choice goes when the option names no next step.
pub fn override_fallback_step(current: u32) -> u32 {
    OVERRIDE_FALLBACKS
        .iter()
        .find(|(from, _)| *from == current)
        .map(|(_, to)| *to)
        .unwrap_or(current + 1)
}

// ─── Tier 3 helpers ─────────────────────────────────────────────────────────

/// Navigate targets that force the tax preview open.
pub const TAX_RELATED_STEPS: &[u32] = &[201, 301, 302, 401, 402, 420, 421, 422];

pub fn is_tax_related(step: u32) -> bool {
    TAX_RELATED_STEPS.contains(&step)
}

const DIVIDEND_VARIABLES: &[&str] = &["arets_utdelning", "aretsutdelning", "utdelning", "dividend"];

/// Whether a `set_variable` target is the dividend amount.
pub fn is_dividend_variable(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    DIVIDEND_VARIABLES.contains(&lowered.as_str())
}

// ─── Cross-cutting edit-mode rule ───────────────────────────────────────────

/// Step pair whose transition opens the INK2 editor.
const EDIT_MODE_PAIR: (u32, u32) = (401, 402);

/// Edit-mode side effect of a resolved transition, if any.
///
/// An explicit `edit_mode: "enable" | "disable"` in the action data wins;
/// otherwise moving from 401 to 402 turns editing on.
pub fn edit_mode_side_effect(
    from: Option<u32>,
    to: Option<u32>,
    action_data: Option<&serde_json::Value>,
) -> Option<bool> {
    let signalled = action_data
        .and_then(|d| d.get("edit_mode"))
        .and_then(|v| v.as_str());
    match signalled {
        Some("enable") => return Some(true),
        Some("disable") => return Some(false),
        _ => {}
    }
    (from == Some(EDIT_MODE_PAIR.0) && to == Some(EDIT_MODE_PAIR.1)).then_some(true)
}

// ─── Scroll anchors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollTiming {
    Standard,
    AutoAdvance,
}

const SCROLL_ANCHORS: &[(u32, &str, ScrollTiming)] = &[
    (201, "tax-section", ScrollTiming::Standard),
    (301, "unused-loss-row", ScrollTiming::Standard),
    (401, "ink2-section", ScrollTiming::Standard),
    (420, "payroll-tax-row", ScrollTiming::AutoAdvance),
    (501, "dividend-section", ScrollTiming::Standard),
    (601, "signature-section", ScrollTiming::Standard),
];

/// Anchor to scroll to after `step` renders, with its delay.
pub fn scroll_target(step: u32, ui: &UiConfig) -> Option<(&'static str, Duration)> {
    SCROLL_ANCHORS
        .iter()
        .find(|(s, _, _)| *s == step)
        .map(|(_, anchor, timing)| {
            let ms = match timing {
                ScrollTiming::Standard => ui.scroll_delay_ms,
                ScrollTiming::AutoAdvance => ui.auto_advance_scroll_delay_ms,
            };
            (*anchor, Duration::from_millis(ms))
        })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
