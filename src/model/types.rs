//! Financial data model shared by ingestion, the chat flow and the preview.
//!
//! Row-sets (`rr_data`, `br_data`, `ink2_data`, `noter_data`) are ordered
//! sequences of [`FinancialFact`] keyed by `variable_name`. The backend's
//! parsers have emitted several row shapes over time, so deserialization here
//! is deliberately tolerant: aliases for every key, `null` amounts read as
//! zero, and amounts sent as Swedish-formatted strings are parsed.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

// ─── Rows ───────────────────────────────────────────────────────────────────

/// Display style of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStyle {
    /// Section heading; never carries a user-editable amount.
    Header,
    /// Derived by the backend only.
    CalcOnly,
    #[default]
    Normal,
}

impl RowStyle {
    /// Map the backend's style codes onto the three styles the client cares about.
    ///
    /// `H`, `H0`..`H3`, `S` and `header` are headings; `TS`, `TH`, `calc` and
    /// `calc_only` mark derived sums. Anything else is a normal row.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        match code.to_ascii_lowercase().as_str() {
            "header" | "h" | "h0" | "h1" | "h2" | "h3" | "s" => RowStyle::Header,
            "calc" | "calc_only" | "calconly" | "ts" | "th" | "tnormal" => RowStyle::CalcOnly,
            _ => RowStyle::Normal,
        }
    }
}

impl<'de> Deserialize<'de> for RowStyle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.map(|s| RowStyle::from_code(&s)).unwrap_or_default())
    }
}

/// A single account contributing to a row's amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetail {
    #[serde(alias = "account_id", alias = "accountId")]
    pub account: String,
    #[serde(default, alias = "account_text", alias = "accountText")]
    pub name: String,
    #[serde(default, deserialize_with = "amount_or_zero")]
    pub balance: f64,
}

/// One row of a financial statement or tax form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialFact {
    #[serde(
        default,
        alias = "variableName",
        deserialize_with = "null_as_default"
    )]
    pub variable_name: String,
    #[serde(
        default,
        alias = "rowTitle",
        alias = "label",
        deserialize_with = "null_as_default"
    )]
    pub row_title: String,
    #[serde(
        default,
        alias = "current_amount",
        alias = "value",
        deserialize_with = "amount_or_zero"
    )]
    pub amount: f64,
    #[serde(default)]
    pub style: RowStyle,
    #[serde(default, alias = "alwaysShow", deserialize_with = "null_as_default")]
    pub always_show: bool,
    #[serde(
        default,
        alias = "orderIndex",
        alias = "order",
        deserialize_with = "amount_or_zero"
    )]
    pub order_index: f64,
    #[serde(
        default,
        alias = "accountDetails",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_details: Option<Vec<AccountDetail>>,
}

impl FinancialFact {
    /// A visible, normal-style row with the given amount.
    pub fn new(variable_name: impl Into<String>, amount: f64) -> Self {
        let variable_name = variable_name.into();
        Self {
            row_title: variable_name.clone(),
            variable_name,
            amount,
            style: RowStyle::Normal,
            always_show: true,
            order_index: 0.0,
            account_details: None,
        }
    }

    pub fn with_style(mut self, style: RowStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_order(mut self, order_index: f64) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.row_title = title.into();
        self
    }
}

/// Find a row by variable name.
pub fn find_row<'a>(rows: &'a [FinancialFact], variable_name: &str) -> Option<&'a FinancialFact> {
    rows.iter().find(|r| r.variable_name == variable_name)
}

/// Amount of a row, if present.
pub fn row_amount(rows: &[FinancialFact], variable_name: &str) -> Option<f64> {
    find_row(rows, variable_name).map(|r| r.amount)
}

// ─── Amount parsing ─────────────────────────────────────────────────────────

/// Parse an amount as written in Swedish reports and SIE exports.
///
/// Accepts `1234`, `1 234`, `1 234,50`, `-1234.5`, non-breaking spaces and a
/// trailing `kr`. Returns `None` for anything that is not a number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches("kr")
        .trim_end_matches("SEK")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .map(|c| match c {
            ',' => '.',
            '\u{2212}' => '-',
            other => other,
        })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a JSON value as an amount: numbers directly, strings via [`parse_amount`].
pub fn json_amount(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn amount_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(json_amount(&value).unwrap_or(0.0))
}

// ─── CompanyData ────────────────────────────────────────────────────────────

/// Boolean switches the UI shell reads to decide what to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiFlags {
    /// INK2 rows are editable.
    pub edit_mode: bool,
    /// The tax computation is shown next to the chat.
    pub show_tax_preview: bool,
    /// Zero-amount INK2 rows are listed too.
    pub show_all_tax_rows: bool,
    /// The income statement / balance sheet preview is shown.
    pub show_statement_preview: bool,
    /// The user has accepted a tax amount.
    pub tax_approved: bool,
    /// Manual INK2 edits were saved by the user.
    pub manual_tax_saved: bool,
}

/// Named UI flag, for actions that toggle exactly one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiFlag {
    EditMode,
    ShowTaxPreview,
    ShowAllTaxRows,
    ShowStatementPreview,
    TaxApproved,
    ManualTaxSaved,
}

impl UiFlags {
    pub fn set(&mut self, flag: UiFlag, value: bool) {
        match flag {
            UiFlag::EditMode => self.edit_mode = value,
            UiFlag::ShowTaxPreview => self.show_tax_preview = value,
            UiFlag::ShowAllTaxRows => self.show_all_tax_rows = value,
            UiFlag::ShowStatementPreview => self.show_statement_preview = value,
            UiFlag::TaxApproved => self.tax_approved = value,
            UiFlag::ManualTaxSaved => self.manual_tax_saved = value,
        }
    }
}

/// The session's financial model.
///
/// Created empty, populated by ingestion, and mutated only through
/// [`super::reduce`]. Scalars are `Option` where "not found" must stay
/// distinguishable from a genuine zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyData {
    pub org_number: Option<String>,
    pub fiscal_year: Option<i32>,
    pub company_name: Option<String>,

    pub rr_data: Vec<FinancialFact>,
    pub br_data: Vec<FinancialFact>,
    pub ink2_data: Vec<FinancialFact>,
    pub noter_data: Vec<FinancialFact>,
    /// Account number → closing balance, forwarded to tax recalculation.
    pub accounts: BTreeMap<String, f64>,

    pub net_result: Option<f64>,
    pub booked_tax: Option<f64>,
    pub calculated_tax: Option<f64>,
    pub approved_tax: Option<f64>,
    pub taxable_result: Option<f64>,
    pub pension_premiums: Option<f64>,
    pub payroll_tax_booked: Option<f64>,
    pub payroll_tax_calculated: Option<f64>,
    pub unused_tax_loss: Option<f64>,
    pub free_equity: Option<f64>,
    pub dividend: Option<f64>,
    pub carried_forward: Option<f64>,

    pub flags: UiFlags,
    /// Server variables set through `set_variable` with no typed field.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CompanyData {
    /// Name → value map of everything a step text may reference.
    ///
    /// Scalar facts appear under their field names; every INK2 row appears
    /// under its variable name; `extra` entries are included as-is.
    pub fn substitution_context(&self) -> BTreeMap<String, serde_json::Value> {
        let mut ctx = BTreeMap::new();
        let mut put = |name: &str, value: Option<f64>| {
            if let Some(v) = value {
                ctx.insert(name.to_string(), serde_json::Value::from(v));
            }
        };
        put("net_result", self.net_result);
        put("booked_tax", self.booked_tax);
        put("calculated_tax", self.calculated_tax);
        put("approved_tax", self.approved_tax);
        put("taxable_result", self.taxable_result);
        put("pension_premiums", self.pension_premiums);
        put("payroll_tax_booked", self.payroll_tax_booked);
        put("payroll_tax_calculated", self.payroll_tax_calculated);
        put("unused_tax_loss", self.unused_tax_loss);
        put("free_equity", self.free_equity);
        put("dividend", self.dividend);
        put("carried_forward", self.carried_forward);
        if let (Some(calc), Some(booked)) = (self.calculated_tax, self.booked_tax) {
            put("tax_difference", Some(calc - booked));
        }

        for row in &self.ink2_data {
            ctx.insert(row.variable_name.clone(), serde_json::Value::from(row.amount));
        }
        for (key, value) in &self.extra {
            ctx.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if let Some(name) = &self.company_name {
            ctx.insert("company_name".into(), serde_json::Value::from(name.clone()));
        }
        if let Some(year) = self.fiscal_year {
            ctx.insert("fiscal_year".into(), serde_json::Value::from(year));
        }
        ctx
    }

    /// Context bag sent with `process-choice` requests.
    pub fn tax_context(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        let mut put = |name: &str, value: Option<f64>| {
            map.insert(
                name.to_string(),
                value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
            );
        };
        put("calculated_tax", self.calculated_tax);
        put("booked_tax", self.booked_tax);
        put("taxable_result", self.taxable_result);
        put("unused_tax_loss", self.unused_tax_loss);
        put("payroll_tax_calculated", self.payroll_tax_calculated);
        put("payroll_tax_booked", self.payroll_tax_booked);
        put("free_equity", self.free_equity);
        map
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
