//! Selective merge of INK2 row-sets.
//!
//! The recalculation endpoint is authoritative for derived totals but does not
//! know about overrides the user is still editing. The merge keeps manual
//! values visible across recalculations while the genuinely derived rows
//! always show the latest server numbers.
//!
//! Precedence for a row's amount, in order:
//! 1. calculated row with a server value → server value (even over a manual entry)
//! 2. manual override → manual value
//! 3. otherwise → the base row's existing amount

use std::collections::{BTreeMap, HashSet};

use crate::model::{FinancialFact, RowStyle};

/// Variables only the backend computes.
pub const CALC_ONLY_VARIABLES: &[&str] = &[
    "INK_skattemassigt_resultat",
    "INK_beraknad_skatt",
    "INK4.15",
    "INK4.16",
    "Arets_resultat_justerat",
];

/// Rows that are always derived from the statements.
pub const ALWAYS_DERIVED_VARIABLES: &[&str] = &["INK4.1", "INK4.2", "INK4.3a"];

/// Whether a variable name is in the fixed calculated set.
pub fn is_calc_only_variable(name: &str) -> bool {
    CALC_ONLY_VARIABLES.contains(&name) || ALWAYS_DERIVED_VARIABLES.contains(&name)
}

/// Whether a row must always come from the server.
///
/// Only the fixed calculated variables and headers qualify. A calculated
/// style code alone does not, so user-editable rows keep their overrides.
pub fn is_calculated_row(row: &FinancialFact) -> bool {
    is_calc_only_variable(&row.variable_name) || row.style == RowStyle::Header
}

/// Merge `next` into `previous`, honouring `manual_overrides`.
///
/// The result contains the union of names from all three inputs, sorted by
/// `order_index`. Base row metadata comes from `previous`, then `next`; names
/// only known from the overrides get a visible normal row placed after every
/// known row.
pub fn selective_merge(
    previous: &[FinancialFact],
    next: &[FinancialFact],
    manual_overrides: &BTreeMap<String, f64>,
) -> Vec<FinancialFact> {
    let prev_by_name: BTreeMap<&str, &FinancialFact> = previous
        .iter()
        .map(|r| (r.variable_name.as_str(), r))
        .collect();
    let next_by_name: BTreeMap<&str, &FinancialFact> = next
        .iter()
        .map(|r| (r.variable_name.as_str(), r))
        .collect();

    // Union in first-seen order so equal order indices keep a stable layout.
    let mut seen = HashSet::new();
    let names: Vec<&str> = previous
        .iter()
        .map(|r| r.variable_name.as_str())
        .chain(next.iter().map(|r| r.variable_name.as_str()))
        .chain(manual_overrides.keys().map(String::as_str))
        .filter(|name| seen.insert(*name))
        .collect();

    let mut next_synth_order = previous
        .iter()
        .chain(next.iter())
        .map(|r| r.order_index)
        .fold(0.0_f64, f64::max)
        + 1.0;

    let mut merged: Vec<FinancialFact> = names
        .into_iter()
        .map(|name| {
            let mut row = match prev_by_name.get(name).or_else(|| next_by_name.get(name)) {
                Some(base) => (*base).clone(),
                None => {
                    let row = FinancialFact::new(name, 0.0).with_order(next_synth_order);
                    next_synth_order += 1.0;
                    row
                }
            };

            let server_row = next_by_name.get(name);
            let calculated = is_calculated_row(&row)
                || server_row.map(|r| is_calculated_row(r)).unwrap_or(false);

            if calculated {
                if let Some(server_row) = server_row {
                    row.amount = server_row.amount;
                }
            } else if let Some(manual) = manual_overrides.get(name) {
                row.amount = *manual;
            }
            row
        })
        .collect();

    merged.sort_by(|a, b| a.order_index.total_cmp(&b.order_index));
    merged
}

/// Reconstruct the manual amounts implied by the rows currently on screen.
///
/// Every non-header, non-calculated row counts, so edits already visible in
/// the UI survive a fresh recalculation.
pub fn build_baseline_manuals_from_current(rows: &[FinancialFact]) -> BTreeMap<String, f64> {
    rows.iter()
        .filter(|r| !r.variable_name.is_empty() && !is_calculated_row(r))
        .map(|r| (r.variable_name.clone(), r.amount))
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
