//! Override application and tax sync.
//!
//! `apply_overrides` is the single path by which manual overrides reach the
//! INK2 rows. It calls the recalculation endpoint only when the override key
//! set changed since the last call; otherwise the new values are merged into
//! the rows locally.

use serde_json::{Map, Value};

use crate::backend::{BackendError, FlowBackend, RecalculateRequest, TaxSyncRequest};
use crate::ledger::{
    build_baseline_manuals_from_current, selective_merge, OverrideKey, OverrideLedger,
};
use crate::model::{reduce, CompanyAction, CompanyData, FinancialFact};

/// How `apply_overrides` updated the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcOutcome {
    /// The backend recalculated and the response was merged.
    Recalculated,
    /// Key set unchanged; merged locally without a network call.
    MergedLocally,
}

/// Push the ledger's overrides into `data.ink2_data`.
///
/// `server_rows` is the last row-set the backend returned; it is replaced
/// when a recalculation happens. Non-empty `hints` force a recalculation.
pub async fn apply_overrides<B: FlowBackend>(
    backend: &B,
    data: &mut CompanyData,
    ledger: &mut OverrideLedger,
    server_rows: &mut Vec<FinancialFact>,
    hints: Map<String, Value>,
) -> Result<RecalcOutcome, BackendError> {
    let display_manuals = ledger.display_manuals();

    if hints.is_empty() && !ledger.needs_recalculation() {
        tracing::debug!(
            overrides = display_manuals.len(),
            "override key set unchanged, skipping recalculation"
        );
        let merged = selective_merge(&data.ink2_data, server_rows, &display_manuals);
        reduce(data, CompanyAction::SetInk2Rows(merged));
        return Ok(RecalcOutcome::MergedLocally);
    }

    // What is on screen is the baseline; the ledger wins over it.
    let mut manual_amounts = build_baseline_manuals_from_current(&data.ink2_data);
    let payroll = OverrideKey::PayrollTaxAdjustment.variable_name();
    if let Some(shown) = manual_amounts.get_mut(payroll) {
        *shown = shown.abs();
    }
    manual_amounts.extend(ledger.manual_amounts());

    let request = RecalculateRequest {
        accounts: data.accounts.clone(),
        fiscal_year: data.fiscal_year,
        rr_rows: data.rr_data.clone(),
        br_rows: data.br_data.clone(),
        manual_amounts,
        hints,
    };
    let response = backend.recalculate_tax(&request).await?;
    if !response.success {
        return Err(BackendError::Rejected {
            endpoint: "recalculate-tax".into(),
            reason: "success=false".into(),
        });
    }

    ledger.mark_recalculated();
    let merged = selective_merge(&data.ink2_data, &response.ink2_rows, &display_manuals);
    tracing::info!(
        rows = merged.len(),
        overrides = display_manuals.len(),
        "tax recalculated"
    );
    *server_rows = response.ink2_rows;
    reduce(data, CompanyAction::SetInk2Rows(merged));
    Ok(RecalcOutcome::Recalculated)
}

/// Result of syncing the calculated tax into the statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxSync {
    /// Calculated and booked tax agree (or one is unknown); nothing sent.
    Skipped,
    /// The statements were updated.
    Applied,
    /// The backend does not offer the endpoint (404).
    Unavailable,
}

/// Book the calculated tax into the income statement and balance sheet.
pub async fn sync_calculated_tax<B: FlowBackend>(
    backend: &B,
    data: &mut CompanyData,
) -> Result<TaxSync, BackendError> {
    let (Some(calculated), Some(booked)) = (data.calculated_tax, data.booked_tax) else {
        tracing::warn!(
            calculated = ?data.calculated_tax,
            booked = ?data.booked_tax,
            "tax amounts unknown, skipping tax sync"
        );
        return Ok(TaxSync::Skipped);
    };
    if calculated == booked {
        tracing::debug!(tax = calculated, "calculated tax equals booked tax");
        return Ok(TaxSync::Skipped);
    }

    let request = TaxSyncRequest {
        calculated_tax: calculated,
        booked_tax: booked,
        tax_difference: calculated - booked,
        rr_rows: data.rr_data.clone(),
        br_rows: data.br_data.clone(),
        org_number: data.org_number.clone(),
        fiscal_year: data.fiscal_year,
        payroll_tax_amount: data.payroll_tax_calculated,
    };
    match backend.update_tax_in_financial_data(&request).await {
        Ok(response) if response.success => {
            tracing::info!(difference = request.tax_difference, "tax synced into statements");
            reduce(
                data,
                CompanyAction::SetStatementRows {
                    rr: response.rr_data,
                    br: response.br_data,
                },
            );
            Ok(TaxSync::Applied)
        }
        Ok(_) => Err(BackendError::Rejected {
            endpoint: "update-tax-in-financial-data".into(),
            reason: "success=false".into(),
        }),
        Err(e) if e.is_not_found() => {
            tracing::info!("tax sync endpoint not available, ignoring");
            Ok(TaxSync::Unavailable)
        }
        Err(e) => Err(e),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Call, MockBackend};
    use crate::backend::TaxSyncResponse;
    use crate::model::row_amount;

    fn ink2() -> Vec<FinancialFact> {
        vec![
            FinancialFact::new("INK4.1", 100_000.0).with_order(1.0),
            FinancialFact::new("INK4.14a", 0.0).with_order(14.0),
            FinancialFact::new("justering_sarskild_loneskatt", -1_000.0).with_order(20.0),
            FinancialFact::new("INK_beraknad_skatt", 20_600.0).with_order(30.0),
        ]
    }

    fn data() -> CompanyData {
        let mut data = CompanyData::default();
        reduce(&mut data, CompanyAction::SetInk2Rows(ink2()));
        data
    }

    fn recalculated(tax: f64) -> Vec<FinancialFact> {
        let mut rows = ink2();
        rows[3].amount = tax;
        rows
    }

    #[tokio::test]
    async fn test_no_op_guard_single_network_call() {
        let backend = MockBackend::new();
        backend.push_recalculation(recalculated(17_500.0));
        let mut data = data();
        let mut ledger = OverrideLedger::new();
        let mut server = ink2();

        ledger.set(OverrideKey::UnusedTaxLoss, 15_000.0);
        let first = apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new())
            .await
            .unwrap();
        let second = apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new())
            .await
            .unwrap();

        assert_eq!(first, RecalcOutcome::Recalculated);
        assert_eq!(second, RecalcOutcome::MergedLocally);
        assert_eq!(backend.count(|c| matches!(c, Call::Recalculate { .. })), 1);
        assert_eq!(data.calculated_tax, Some(17_500.0));
        assert_eq!(row_amount(&data.ink2_data, "INK4.14a"), Some(15_000.0));
    }

    #[tokio::test]
    async fn test_value_change_with_same_keys_merges_locally() {
        let backend = MockBackend::new();
        backend.push_recalculation(recalculated(17_500.0));
        let mut data = data();
        let mut ledger = OverrideLedger::new();
        let mut server = ink2();

        ledger.set(OverrideKey::UnusedTaxLoss, 15_000.0);
        apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new())
            .await
            .unwrap();
        ledger.set(OverrideKey::UnusedTaxLoss, 5_000.0);
        apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new())
            .await
            .unwrap();

        assert_eq!(backend.count(|c| matches!(c, Call::Recalculate { .. })), 1);
        assert_eq!(row_amount(&data.ink2_data, "INK4.14a"), Some(5_000.0));
    }

    #[tokio::test]
    async fn test_payroll_sent_positive_shown_negative() {
        let backend = MockBackend::new();
        backend.push_recalculation(ink2());
        let mut data = data();
        let mut ledger = OverrideLedger::new();
        let mut server = ink2();

        ledger.set(OverrideKey::PayrollTaxAdjustment, 2_426.0);
        apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new())
            .await
            .unwrap();

        let calls = backend.calls();
        let Call::Recalculate { manual_amounts } = &calls[0] else {
            panic!("expected a recalculation call");
        };
        assert!(manual_amounts.contains(&("justering_sarskild_loneskatt".to_string(), 2_426.0)));
        // Baseline rows ride along, calculated rows do not.
        assert!(manual_amounts.contains(&("INK4.14a".to_string(), 0.0)));
        assert!(!manual_amounts.iter().any(|(k, _)| k == "INK_beraknad_skatt"));
        assert_eq!(
            row_amount(&data.ink2_data, "justering_sarskild_loneskatt"),
            Some(-2_426.0)
        );
    }

    #[tokio::test]
    async fn test_failed_recalculation_keeps_guard_open() {
        let backend = MockBackend::new();
        let mut data = data();
        let mut ledger = OverrideLedger::new();
        let mut server = ink2();

        ledger.set(OverrideKey::UnusedTaxLoss, 1.0);
        let result =
            apply_overrides(&backend, &mut data, &mut ledger, &mut server, Map::new()).await;
        assert!(result.is_err());
        assert!(ledger.needs_recalculation());
        assert_eq!(row_amount(&data.ink2_data, "INK4.14a"), Some(0.0));
    }

    #[tokio::test]
    async fn test_tax_sync_skipped_when_equal() {
        let backend = MockBackend::new();
        let mut data = data();
        data.booked_tax = Some(20_600.0);

        let result = sync_calculated_tax(&backend, &mut data).await.unwrap();
        assert_eq!(result, TaxSync::Skipped);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tax_sync_runs_for_sub_krona_difference() {
        let backend = MockBackend::new();
        backend.push_tax_sync(Err(BackendError::HttpError {
            status: 404,
            body: "Not Found".into(),
        }));
        let mut data = data();
        data.calculated_tax = Some(20_600.4);
        data.booked_tax = Some(20_600.0);

        let result = sync_calculated_tax(&backend, &mut data).await.unwrap();
        assert_eq!(result, TaxSync::Unavailable);
        assert_eq!(backend.count(|c| matches!(c, Call::TaxSync { .. })), 1);
    }

    #[tokio::test]
    async fn test_tax_sync_404_is_swallowed() {
        let backend = MockBackend::new();
        backend.push_tax_sync(Err(BackendError::HttpError {
            status: 404,
            body: "Not Found".into(),
        }));
        let mut data = data();
        data.booked_tax = Some(18_000.0);

        let result = sync_calculated_tax(&backend, &mut data).await.unwrap();
        assert_eq!(result, TaxSync::Unavailable);
        assert_eq!(
            backend.calls(),
            vec![Call::TaxSync {
                tax_difference: 2_600.0
            }]
        );
    }

    #[tokio::test]
    async fn test_tax_sync_applies_statements() {
        let backend = MockBackend::new();
        backend.push_tax_sync(Ok(TaxSyncResponse {
            success: true,
            rr_data: Some(vec![FinancialFact::new("SkattAretsResultat", -20_600.0)]),
            br_data: None,
        }));
        let mut data = data();
        data.booked_tax = Some(18_000.0);
        data.br_data = vec![FinancialFact::new("Skatteskulder", 18_000.0)];

        let result = sync_calculated_tax(&backend, &mut data).await.unwrap();
        assert_eq!(result, TaxSync::Applied);
        assert_eq!(row_amount(&data.rr_data, "SkattAretsResultat"), Some(-20_600.0));
        assert_eq!(row_amount(&data.br_data, "Skatteskulder"), Some(18_000.0));
    }

    #[tokio::test]
    async fn test_tax_sync_other_errors_propagate() {
        let backend = MockBackend::new();
        let mut data = data();
        data.booked_tax = Some(0.0);
        assert!(sync_calculated_tax(&backend, &mut data).await.is_err());
    }
}
