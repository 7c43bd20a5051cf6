//! Tolerant extraction of financial facts from upload responses.
//!
//! The upload endpoints return row-sets whose shape depends on the parser
//! version that produced them: keys may be snake_case or camelCase, rows may
//! carry a canonical variable name, a legacy row id, or only a label, and
//! amounts may be numbers or Swedish-formatted strings.
//!
//! Each fact has its own lookup cascade, tried in order:
//! 1. a scalar field on the response
//! 2. canonical variable name
//! 3. legacy row id
//! 4. label substring, minus known false positives
//! 5. a fallback heuristic (usually an account range sum)
//!
//! A fact found nowhere stays `None`; zero is a real value.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{json_amount, FinancialFact, IngestedFacts};

// ─── Response view ──────────────────────────────────────────────────────────

/// One row as found in the response, before normalisation.
#[derive(Debug, Clone, Default)]
struct RawRow {
    variable_name: Option<String>,
    row_id: Option<String>,
    label: Option<String>,
    amount: Option<f64>,
}

impl RawRow {
    fn from_json(value: &Value) -> Self {
        Self {
            variable_name: text_field(value, &["variable_name", "variableName"]),
            row_id: text_field(value, &["id", "row_id", "rowId"]),
            label: text_field(value, &["label", "row_title", "rowTitle", "name"]),
            amount: amount_field(value, &["current_amount", "currentAmount", "amount", "value"]),
        }
    }
}

/// The parts of an upload response the cascades look at.
struct ResponseView<'a> {
    /// Objects searched for scalar fields, outermost first.
    scopes: Vec<&'a Value>,
    rr: Vec<RawRow>,
    br: Vec<RawRow>,
    ink2: Vec<RawRow>,
    accounts: BTreeMap<String, f64>,
}

impl<'a> ResponseView<'a> {
    fn new(root: &'a Value) -> Self {
        let mut scopes = vec![root];
        for key in ["data", "financial_data", "financialData"] {
            let nested: Vec<&Value> = scopes
                .iter()
                .filter_map(|s| s.get(key))
                .filter(|v| v.is_object())
                .collect();
            scopes.extend(nested);
        }
        let mut view = Self {
            scopes,
            rr: Vec::new(),
            br: Vec::new(),
            ink2: Vec::new(),
            accounts: BTreeMap::new(),
        };
        view.rr = view.raw_rows(RR_KEYS);
        view.br = view.raw_rows(BR_KEYS);
        view.ink2 = view.raw_rows(INK2_KEYS);
        view.accounts = view
            .field(ACCOUNT_KEYS)
            .map(parse_accounts)
            .unwrap_or_default();
        view
    }

    fn field(&self, keys: &[&str]) -> Option<&'a Value> {
        self.scopes
            .iter()
            .find_map(|scope| keys.iter().find_map(|k| scope.get(*k)))
            .filter(|v| !v.is_null())
    }

    fn scalar(&self, keys: &[&str]) -> Option<f64> {
        self.field(keys).and_then(json_amount)
    }

    fn rows(&self, keys: &[&str]) -> &'a [Value] {
        self.field(keys)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn raw_rows(&self, keys: &[&str]) -> Vec<RawRow> {
        self.rows(keys).iter().map(RawRow::from_json).collect()
    }
}

const RR_KEYS: &[&str] = &["rr_data", "rrData", "rr", "resultatrakning"];
const BR_KEYS: &[&str] = &["br_data", "brData", "br", "balansrakning"];
const INK2_KEYS: &[&str] = &["ink2_data", "ink2Data", "ink2_rows", "ink2"];
const NOTER_KEYS: &[&str] = &["noter_data", "noterData", "noter"];
const ACCOUNT_KEYS: &[&str] = &["accounts", "account_balances", "accountBalances", "saldon"];

/// Non-empty string or number as text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| value.get(*k).and_then(as_text))
}

fn amount_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| value.get(*k).and_then(json_amount))
}

/// Account balances as `{"7410": 1000}` or `[{"account": "7410", "balance": 1000}]`.
fn parse_accounts(value: &Value) -> BTreeMap<String, f64> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| json_amount(v).map(|a| (k.clone(), a)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let account = text_field(item, &["account", "konto", "number"])?;
                let balance = amount_field(item, &["balance", "saldo", "amount"])?;
                Some((account, balance))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

// ─── Lookup helpers ─────────────────────────────────────────────────────────

fn by_variable(rows: &[RawRow], names: &[&str]) -> Option<f64> {
    rows.iter()
        .find(|r| {
            r.variable_name
                .as_deref()
                .is_some_and(|v| names.iter().any(|n| n.eq_ignore_ascii_case(v)))
        })
        .and_then(|r| r.amount)
}

fn by_row_id(rows: &[RawRow], ids: &[&str]) -> Option<f64> {
    rows.iter()
        .find(|r| r.row_id.as_deref().is_some_and(|id| ids.contains(&id)))
        .and_then(|r| r.amount)
}

fn by_label(rows: &[RawRow], contains: &[&str], excludes: &[&str]) -> Option<f64> {
    rows.iter()
        .find(|r| {
            r.label.as_deref().is_some_and(|label| {
                let label = label.to_lowercase();
                contains.iter().any(|c| label.contains(c))
                    && !excludes.iter().any(|e| label.contains(e))
            })
        })
        .and_then(|r| r.amount)
}

/// Sum of balances for accounts in `from..=to`, if any exist.
fn sum_accounts(accounts: &BTreeMap<String, f64>, from: u32, to: u32) -> Option<f64> {
    let mut matched = accounts
        .iter()
        .filter(|(account, _)| {
            account
                .trim()
                .parse::<u32>()
                .is_ok_and(|n| (from..=to).contains(&n))
        })
        .map(|(_, balance)| *balance)
        .peekable();
    matched.peek()?;
    Some(matched.sum())
}

// ─── Per-fact cascades ──────────────────────────────────────────────────────

fn net_result(r: &ResponseView) -> Option<f64> {
    r.scalar(&["net_result", "netResult", "arets_resultat"])
        .or_else(|| by_variable(&r.rr, &["SumAretsResultat", "AretsResultat"]))
        .or_else(|| by_row_id(&r.rr, &["rr_arets_resultat", "arets_resultat"]))
        .or_else(|| by_label(&r.rr, &["årets resultat"], &["före", "justerat", "skatt"]))
        // Result accounts are credit-positive in the ledger.
        .or_else(|| sum_accounts(&r.accounts, 3000, 8999).map(|s| -s))
}

fn booked_tax(r: &ResponseView) -> Option<f64> {
    r.scalar(&["booked_tax", "bookedTax", "bokford_skatt"])
        .or_else(|| by_variable(&r.rr, &["SkattAretsResultat", "SkattPaAretsResultat"]))
        .or_else(|| by_row_id(&r.rr, &["rr_skatt", "skatt_arets_resultat"]))
        .or_else(|| by_label(&r.rr, &["skatt på årets resultat"], &["beräknad", "uppskjuten"]))
        .or_else(|| sum_accounts(&r.accounts, 8910, 8919))
        .map(f64::abs)
}

fn calculated_tax(r: &ResponseView) -> Option<f64> {
    r.scalar(&["calculated_tax", "calculatedTax", "beraknad_skatt"])
        .or_else(|| by_variable(&r.ink2, &["INK_beraknad_skatt"]))
        .or_else(|| by_row_id(&r.ink2, &["ink_beraknad_skatt"]))
        .or_else(|| by_label(&r.ink2, &["beräknad skatt"], &["underlag"]))
}

fn pension_premiums(r: &ResponseView) -> Option<f64> {
    r.scalar(&["pension_premiums", "pensionPremiums", "pensionskostnader"])
        .or_else(|| by_variable(&r.ink2, &["pension_premiums", "Pensionskostnader"]))
        .or_else(|| by_row_id(&r.rr, &["rr_pensionskostnader"]))
        .or_else(|| by_label(&r.rr, &["pensionskostnad", "pensionsförsäkring"], &["löneskatt"]))
        .or_else(|| sum_accounts(&r.accounts, 7410, 7419))
        .map(f64::abs)
}

fn payroll_tax_booked(r: &ResponseView) -> Option<f64> {
    r.scalar(&["payroll_tax_booked", "payrollTaxBooked", "sarskild_loneskatt_bokford"])
        .or_else(|| by_variable(&r.ink2, &["sarskild_loneskatt_bokford"]))
        .or_else(|| by_row_id(&r.rr, &["rr_sarskild_loneskatt"]))
        .or_else(|| by_label(&r.rr, &["särskild löneskatt"], &["justering", "beräknad"]))
        .or_else(|| sum_accounts(&r.accounts, 7530, 7539))
        .map(f64::abs)
}

fn unused_tax_loss(r: &ResponseView) -> Option<f64> {
    r.scalar(&["unused_tax_loss", "unusedTaxLoss", "outnyttjat_underskott"])
        .or_else(|| by_variable(&r.ink2, &["INK4.14a"]))
        .or_else(|| by_row_id(&r.ink2, &["ink4_14a", "4.14a"]))
        .or_else(|| by_label(&r.ink2, &["outnyttjat underskott"], &["kvarvarande"]))
        .map(f64::abs)
}

fn free_equity(r: &ResponseView) -> Option<f64> {
    r.scalar(&["free_equity", "sumFrittEgetKapital", "sum_fritt_eget_kapital"])
        .or_else(|| by_variable(&r.br, &["SumFrittEgetKapital"]))
        .or_else(|| by_row_id(&r.br, &["br_fritt_eget_kapital"]))
        .or_else(|| by_label(&r.br, &["fritt eget kapital"], &["bundet"]))
        // Equity accounts are credit-positive in the ledger.
        .or_else(|| sum_accounts(&r.accounts, 2090, 2099).map(|s| -s))
}

// ─── Rows and identity ──────────────────────────────────────────────────────

/// Normalise one response row into a `FinancialFact`.
fn fact_from_json(value: &Value, position: usize) -> Option<FinancialFact> {
    let raw = RawRow::from_json(value);
    let name = raw.variable_name.clone().or(raw.row_id.clone())?;
    let mut fact = serde_json::from_value::<FinancialFact>(value.clone()).unwrap_or_else(|_| {
        let order = amount_field(value, &["order_index", "orderIndex", "sort_order"])
            .unwrap_or(position as f64);
        FinancialFact::new(name.clone(), 0.0)
            .with_title(raw.label.clone().unwrap_or_default())
            .with_order(order)
    });
    fact.variable_name = name;
    if let Some(amount) = raw.amount {
        fact.amount = amount;
    }
    if fact.row_title.is_empty() {
        fact.row_title = raw.label.unwrap_or_default();
    }
    Some(fact)
}

fn facts(view: &ResponseView, keys: &[&str]) -> Vec<FinancialFact> {
    view.rows(keys)
        .iter()
        .enumerate()
        .filter_map(|(i, v)| fact_from_json(v, i))
        .collect()
}

fn fiscal_year(view: &ResponseView) -> Option<i32> {
    match view.field(&["fiscal_year", "fiscalYear", "year", "rakenskapsar"])? {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

fn warn_missing(fact: &str, value: Option<f64>) -> Option<f64> {
    if value.is_none() {
        tracing::warn!(fact, "fact not found in upload response");
    }
    value
}

/// Build the ingested model from an upload response.
pub fn extract_facts(response: &Value) -> IngestedFacts {
    let view = ResponseView::new(response);
    let text = |keys: &[&str]| view.field(keys).and_then(as_text);

    let extracted = IngestedFacts {
        org_number: text(&["org_number", "orgNumber", "organization_number", "orgnr"]),
        fiscal_year: fiscal_year(&view),
        company_name: text(&["company_name", "companyName", "foretagsnamn"]),
        rr_data: facts(&view, RR_KEYS),
        br_data: facts(&view, BR_KEYS),
        ink2_data: facts(&view, INK2_KEYS),
        noter_data: facts(&view, NOTER_KEYS),
        accounts: view.accounts.clone(),
        net_result: warn_missing("net_result", net_result(&view)),
        booked_tax: warn_missing("booked_tax", booked_tax(&view)),
        calculated_tax: warn_missing("calculated_tax", calculated_tax(&view)),
        pension_premiums: warn_missing("pension_premiums", pension_premiums(&view)),
        payroll_tax_booked: warn_missing("payroll_tax_booked", payroll_tax_booked(&view)),
        unused_tax_loss: warn_missing("unused_tax_loss", unused_tax_loss(&view)),
        free_equity: warn_missing("free_equity", free_equity(&view)),
    };
    tracing::info!(
        rr_rows = extracted.rr_data.len(),
        br_rows = extracted.br_data.len(),
        ink2_rows = extracted.ink2_data.len(),
        accounts = extracted.accounts.len(),
        "facts extracted from upload response"
    );
    extracted
}

// ─── Tests ──────────────────────────────────────────────────────────────────
