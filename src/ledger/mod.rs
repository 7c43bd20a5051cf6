//! Manual-override ledger: which INK2 rows the user overrode, and how
//! recalculated rows are merged without losing those overrides.
//!
//! Submodules:
//! - `merge`: `selective_merge`, calculated-row classification, baseline reconstruction
//! - `overrides`: override keys, alias normalizer, pending/accepted sets, recalculation guard

pub mod merge;
pub mod overrides;

// Re-exports for convenience
pub use merge::{
    build_baseline_manuals_from_current, is_calc_only_variable, is_calculated_row,
    selective_merge, ALWAYS_DERIVED_VARIABLES, CALC_ONLY_VARIABLES,
};
pub use overrides::{normalize_variable, OverrideKey, OverrideLedger};
