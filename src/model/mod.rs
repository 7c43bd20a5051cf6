//! Financial data model: the state every other module reads or updates.
//!
//! Submodules:
//! - `types`: rows, `CompanyData`, UI flags, amount parsing
//! - `store`: the typed `CompanyAction` reducer

pub mod store;
pub mod types;

// Re-exports for convenience
pub use store::{reduce, CompanyAction, IngestedFacts, CALCULATED_TAX_ROW, TAXABLE_RESULT_ROW};
pub use types::{
    find_row, json_amount, parse_amount, row_amount, AccountDetail, CompanyData, FinancialFact,
    RowStyle, UiFlag, UiFlags,
};
