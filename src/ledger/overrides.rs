//! Manual-override bookkeeping for the two user-editable INK2 domains.
//!
//! Only the unused tax loss (`INK4.14a`) and the special payroll tax
//! adjustment (`justering_sarskild_loneskatt`) can be overridden from the
//! chat. Payroll adjustments are kept as positive magnitudes here and on the
//! wire; the INK2 row shows them negated because they reduce the taxable
//! result. [`OverrideLedger::display_manuals`] is the one place that flips
//! the sign.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Canonical override targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKey {
    UnusedTaxLoss,
    PayrollTaxAdjustment,
}

impl OverrideKey {
    /// INK2 variable name the override applies to.
    pub fn variable_name(self) -> &'static str {
        match self {
            OverrideKey::UnusedTaxLoss => "INK4.14a",
            OverrideKey::PayrollTaxAdjustment => "justering_sarskild_loneskatt",
        }
    }
}

const UNUSED_LOSS_ALIASES: &[&str] = &[
    "ink4.14a",
    "ink4_14a",
    "unused_tax_loss",
    "unusedtaxloss",
    "outnyttjat_underskott",
    "underskott",
];

const PAYROLL_ALIASES: &[&str] = &[
    "justering_sarskild_loneskatt",
    "sarskild_loneskatt",
    "sarskildloneskatt",
    "payroll_tax_adjustment",
    "sarskild_loneskatt_pension",
];

/// Map a historical or aliased action-data variable name onto an override key.
pub fn normalize_variable(name: &str) -> Option<OverrideKey> {
    let lowered = name.trim().to_ascii_lowercase();
    if UNUSED_LOSS_ALIASES.contains(&lowered.as_str()) {
        Some(OverrideKey::UnusedTaxLoss)
    } else if PAYROLL_ALIASES.contains(&lowered.as_str()) {
        Some(OverrideKey::PayrollTaxAdjustment)
    } else {
        None
    }
}

/// Pending and accepted manual overrides plus the recalculation guard.
#[derive(Debug, Clone, Default)]
pub struct OverrideLedger {
    /// What the user has entered, accepted or not.
    pending: BTreeMap<OverrideKey, f64>,
    /// Last set the user saved; `keep_current` reverts to it.
    accepted: BTreeMap<OverrideKey, f64>,
    /// Key set sent with the last recalculation.
    recalculated_keys: BTreeSet<OverrideKey>,
}

impl OverrideLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an override. Payroll adjustments are stored as magnitudes.
    pub fn set(&mut self, key: OverrideKey, value: f64) {
        let value = match key {
            OverrideKey::PayrollTaxAdjustment => value.abs(),
            OverrideKey::UnusedTaxLoss => value,
        };
        tracing::debug!(key = key.variable_name(), value, "manual override set");
        self.pending.insert(key, value);
    }

    pub fn remove(&mut self, key: OverrideKey) {
        self.pending.remove(&key);
    }

    pub fn get(&self, key: OverrideKey) -> Option<f64> {
        self.pending.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the pending key set differs from the last recalculated one.
    ///
    /// Only the key set counts: changing the value of an already-sent key
    /// does not trigger a new network call; the new value is merged locally.
    pub fn needs_recalculation(&self) -> bool {
        let keys: BTreeSet<OverrideKey> = self.pending.keys().copied().collect();
        keys != self.recalculated_keys
    }

    /// Remember the current key set as sent.
    pub fn mark_recalculated(&mut self) {
        self.recalculated_keys = self.pending.keys().copied().collect();
    }

    /// Overrides as sent to the recalculation endpoint (positive magnitudes).
    pub fn manual_amounts(&self) -> BTreeMap<String, f64> {
        self.pending
            .iter()
            .map(|(k, v)| (k.variable_name().to_string(), *v))
            .collect()
    }

    /// Overrides as shown in the INK2 rows.
    pub fn display_manuals(&self) -> BTreeMap<String, f64> {
        self.pending
            .iter()
            .map(|(k, v)| {
                let shown = match k {
                    OverrideKey::PayrollTaxAdjustment => -v.abs(),
                    OverrideKey::UnusedTaxLoss => *v,
                };
                (k.variable_name().to_string(), shown)
            })
            .collect()
    }

    /// Save the pending overrides.
    pub fn accept(&mut self) {
        self.accepted = self.pending.clone();
    }

    /// Drop unsaved overrides.
    pub fn revert(&mut self) {
        self.pending = self.accepted.clone();
    }

    /// Forget every override.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.accepted.clear();
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.pending != self.accepted
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
