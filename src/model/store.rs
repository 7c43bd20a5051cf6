//! Typed reducer for [`CompanyData`].
//!
//! Every mutation the chat flow or ingestion performs is one
//! [`CompanyAction`] variant, applied by [`reduce`]. There is no open
//! "merge this partial object" path: adding an update means adding a variant.

use super::types::{row_amount, CompanyData, FinancialFact, UiFlag};

/// INK2 row holding the backend's computed corporate tax.
pub const CALCULATED_TAX_ROW: &str = "INK_beraknad_skatt";

/// INK2 row holding the taxable result.
pub const TAXABLE_RESULT_ROW: &str = "INK_skattemassigt_resultat";

/// Särskild löneskatt on pension premiums.
pub const PAYROLL_TAX_RATE: f64 = 0.2426;

/// Facts produced by file ingestion, loaded in one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestedFacts {
    pub org_number: Option<String>,
    pub fiscal_year: Option<i32>,
    pub company_name: Option<String>,
    pub rr_data: Vec<FinancialFact>,
    pub br_data: Vec<FinancialFact>,
    pub ink2_data: Vec<FinancialFact>,
    pub noter_data: Vec<FinancialFact>,
    pub accounts: std::collections::BTreeMap<String, f64>,
    pub net_result: Option<f64>,
    pub booked_tax: Option<f64>,
    pub calculated_tax: Option<f64>,
    pub pension_premiums: Option<f64>,
    pub payroll_tax_booked: Option<f64>,
    pub unused_tax_loss: Option<f64>,
    pub free_equity: Option<f64>,
}

/// One update to the financial model.
#[derive(Debug, Clone, PartialEq)]
pub enum CompanyAction {
    /// Replace identity, row-sets and extracted facts after an upload.
    LoadIngested(Box<IngestedFacts>),
    /// New INK2 rows (after a recalculation or a local merge).
    SetInk2Rows(Vec<FinancialFact>),
    /// New income statement / balance sheet rows (after a tax sync).
    SetStatementRows {
        rr: Option<Vec<FinancialFact>>,
        br: Option<Vec<FinancialFact>>,
    },
    /// Dividend chosen by the user; the rest of free equity is carried forward.
    SetDividend(f64),
    SetUnusedTaxLoss(f64),
    /// The user accepted this tax amount.
    ApproveTax(f64),
    /// Edit mode and show-all-rows always travel together.
    SetEditMode(bool),
    SetFlag(UiFlag, bool),
    /// A server-defined variable without a typed field.
    SetVariable {
        name: String,
        value: serde_json::Value,
    },
}

/// Apply one action.
pub fn reduce(data: &mut CompanyData, action: CompanyAction) {
    tracing::debug!(action = ?action_name(&action), "company data update");
    match action {
        CompanyAction::LoadIngested(facts) => {
            let facts = *facts;
            data.org_number = facts.org_number;
            data.fiscal_year = facts.fiscal_year;
            data.company_name = facts.company_name;
            data.rr_data = facts.rr_data;
            data.br_data = facts.br_data;
            data.ink2_data = facts.ink2_data;
            data.noter_data = facts.noter_data;
            data.accounts = facts.accounts;
            data.net_result = facts.net_result;
            data.booked_tax = facts.booked_tax;
            data.calculated_tax = facts
                .calculated_tax
                .or_else(|| row_amount(&data.ink2_data, CALCULATED_TAX_ROW));
            data.taxable_result = row_amount(&data.ink2_data, TAXABLE_RESULT_ROW);
            data.pension_premiums = facts.pension_premiums;
            data.payroll_tax_booked = facts.payroll_tax_booked;
            data.payroll_tax_calculated = facts
                .pension_premiums
                .map(|p| (p * PAYROLL_TAX_RATE).round());
            data.unused_tax_loss = facts.unused_tax_loss;
            data.free_equity = facts.free_equity;
            data.flags.show_statement_preview = true;
        }
        CompanyAction::SetInk2Rows(rows) => {
            if let Some(tax) = row_amount(&rows, CALCULATED_TAX_ROW) {
                data.calculated_tax = Some(tax);
            }
            if let Some(result) = row_amount(&rows, TAXABLE_RESULT_ROW) {
                data.taxable_result = Some(result);
            }
            data.ink2_data = rows;
        }
        CompanyAction::SetStatementRows { rr, br } => {
            if let Some(rr) = rr {
                data.rr_data = rr;
            }
            if let Some(br) = br {
                data.br_data = br;
            }
        }
        CompanyAction::SetDividend(amount) => {
            data.dividend = Some(amount);
            data.carried_forward = data.free_equity.map(|equity| equity - amount);
        }
        CompanyAction::SetUnusedTaxLoss(amount) => {
            data.unused_tax_loss = Some(amount);
        }
        CompanyAction::ApproveTax(amount) => {
            data.approved_tax = Some(amount);
            data.flags.tax_approved = true;
        }
        CompanyAction::SetEditMode(on) => {
            data.flags.edit_mode = on;
            data.flags.show_all_tax_rows = on;
        }
        CompanyAction::SetFlag(flag, value) => data.flags.set(flag, value),
        CompanyAction::SetVariable { name, value } => {
            data.extra.insert(name, value);
        }
    }
}

fn action_name(action: &CompanyAction) -> &'static str {
    match action {
        CompanyAction::LoadIngested(_) => "load_ingested",
        CompanyAction::SetInk2Rows(_) => "set_ink2_rows",
        CompanyAction::SetStatementRows { .. } => "set_statement_rows",
        CompanyAction::SetDividend(_) => "set_dividend",
        CompanyAction::SetUnusedTaxLoss(_) => "set_unused_tax_loss",
        CompanyAction::ApproveTax(_) => "approve_tax",
        CompanyAction::SetEditMode(_) => "set_edit_mode",
        CompanyAction::SetFlag(..) => "set_flag",
        CompanyAction::SetVariable { .. } => "set_variable",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dividend_derives_carried_forward() {
        let mut data = CompanyData {
            free_equity: Some(100_000.0),
            ..Default::default()
        };
        reduce(&mut data, CompanyAction::SetDividend(40_000.0));
        assert_eq!(data.dividend, Some(40_000.0));
        assert_eq!(data.carried_forward, Some(60_000.0));
    }

    #[test]
    fn test_dividend_without_known_equity_leaves_remainder_unknown() {
        let mut data = CompanyData::default();
        reduce(&mut data, CompanyAction::SetDividend(10.0));
        assert_eq!(data.carried_forward, None);
    }

    #[test]
    fn test_set_ink2_rows_refreshes_tax_scalars() {
        let mut data = CompanyData::default();
        reduce(
            &mut data,
            CompanyAction::SetInk2Rows(vec![
                FinancialFact::new(CALCULATED_TAX_ROW, 20_600.0),
                FinancialFact::new(TAXABLE_RESULT_ROW, 100_000.0),
            ]),
        );
        assert_eq!(data.calculated_tax, Some(20_600.0));
        assert_eq!(data.taxable_result, Some(100_000.0));
        assert_eq!(data.ink2_data.len(), 2);
    }

    #[test]
    fn test_load_ingested_derives_payroll_tax() {
        let mut data = CompanyData::default();
        let facts = IngestedFacts {
            pension_premiums: Some(10_000.0),
            ink2_data: vec![FinancialFact::new(CALCULATED_TAX_ROW, 5_000.0)],
            ..Default::default()
        };
        reduce(&mut data, CompanyAction::LoadIngested(Box::new(facts)));
        assert_eq!(data.payroll_tax_calculated, Some(2_426.0));
        assert_eq!(data.calculated_tax, Some(5_000.0));
        assert!(data.flags.show_statement_preview);
    }

    #[test]
    fn test_edit_mode_toggles_show_all_rows() {
        let mut data = CompanyData::default();
        reduce(&mut data, CompanyAction::SetEditMode(true));
        assert!(data.flags.edit_mode && data.flags.show_all_tax_rows);
        reduce(&mut data, CompanyAction::SetEditMode(false));
        assert!(!data.flags.edit_mode && !data.flags.show_all_tax_rows);
    }

    #[test]
    fn test_approve_tax_sets_flag() {
        let mut data = CompanyData::default();
        reduce(&mut data, CompanyAction::ApproveTax(1234.0));
        assert_eq!(data.approved_tax, Some(1234.0));
        assert!(data.flags.tax_approved);
    }
}
