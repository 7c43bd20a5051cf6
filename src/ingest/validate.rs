//! Pre-flight validation of the selected SIE files.
//!
//! Runs before anything is uploaded. Two files must be consecutive fiscal
//! years of the same organisation. A record missing from either file skips
//! that check; the backend validates again.

use super::errors::IngestError;
use super::sie::SieHeader;
use crate::backend::FileRole;

/// Check the number of files and, for two, that they belong together.
pub fn validate_selection(headers: &[SieHeader]) -> Result<(), IngestError> {
    match headers {
        [] => Err(IngestError::NoFiles),
        [_] => Ok(()),
        [first, second] => validate_pair(first, second),
        _ => Err(IngestError::TooManyFiles {
            count: headers.len(),
        }),
    }
}

/// Year and company checks for a two-file upload.
pub fn validate_pair(first: &SieHeader, second: &SieHeader) -> Result<(), IngestError> {
    if let (Some(a), Some(b)) = (first.fiscal_year_end, second.fiscal_year_end) {
        if (a - b).abs() != 1 {
            tracing::info!(first = a, second = b, "pre-flight: fiscal years not consecutive");
            return Err(IngestError::YearMismatch {
                first: a,
                second: b,
            });
        }
    }
    if let (Some(a), Some(b)) = (first.org_digits(), second.org_digits()) {
        if !a.is_empty() && !b.is_empty() && a != b {
            tracing::info!(first = %a, second = %b, "pre-flight: organisation numbers differ");
            return Err(IngestError::CompanyMismatch {
                first: a,
                second: b,
            });
        }
    }
    Ok(())
}

/// Upload role of each file, in input order.
///
/// The file with the later fiscal year is the current year. Without years
/// the selection order decides: first file current, second previous.
pub fn assign_roles(headers: &[SieHeader]) -> Vec<FileRole> {
    match headers {
        [first, second] => match (first.fiscal_year_end, second.fiscal_year_end) {
            (Some(a), Some(b)) if a < b => vec![FileRole::PreviousYear, FileRole::CurrentYear],
            _ => vec![FileRole::CurrentYear, FileRole::PreviousYear],
        },
        _ => vec![FileRole::CurrentYear; headers.len()],
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header(year: Option<i32>, org: Option<&str>) -> SieHeader {
        SieHeader {
            fiscal_year_end: year,
            org_number: org.map(String::from),
            company_name: None,
        }
    }

    #[test]
    fn test_year_gap_of_two_rejected() {
        let err = validate_selection(&[
            header(Some(2022), Some("5566778899")),
            header(Some(2024), Some("5566778899")),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "YEAR_MISMATCH");
    }

    #[test]
    fn test_consecutive_years_accepted() {
        assert!(validate_selection(&[
            header(Some(2022), Some("5566778899")),
            header(Some(2023), Some("5566778899")),
        ])
        .is_ok());
    }

    #[test]
    fn test_same_year_rejected() {
        let err = validate_pair(&header(Some(2023), None), &header(Some(2023), None)).unwrap_err();
        assert!(matches!(err, IngestError::YearMismatch { .. }));
    }

    #[test]
    fn test_different_companies_rejected() {
        let err = validate_selection(&[
            header(Some(2023), Some("5566778899")),
            header(Some(2022), Some("5599887766")),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "COMPANY_MISMATCH");
    }

    #[test]
    fn test_company_formatting_ignored() {
        assert!(validate_selection(&[
            header(Some(2023), Some("556677-8899")),
            header(Some(2022), Some("5566778899")),
        ])
        .is_ok());
    }

    #[test]
    fn test_missing_records_skip_checks() {
        assert!(validate_selection(&[header(None, None), header(Some(2020), Some("1"))]).is_ok());
    }

    #[test]
    fn test_file_count_limits() {
        assert!(matches!(validate_selection(&[]), Err(IngestError::NoFiles)));
        assert!(validate_selection(&[header(Some(2022), None)]).is_ok());
        let three = vec![header(None, None); 3];
        assert!(matches!(
            validate_selection(&three),
            Err(IngestError::TooManyFiles { count: 3 })
        ));
    }

    #[test]
    fn test_roles_follow_fiscal_year() {
        let roles = assign_roles(&[header(Some(2022), None), header(Some(2023), None)]);
        assert_eq!(roles, vec![FileRole::PreviousYear, FileRole::CurrentYear]);
        let roles = assign_roles(&[header(None, None), header(None, None)]);
        assert_eq!(roles, vec![FileRole::CurrentYear, FileRole::PreviousYear]);
        assert_eq!(assign_roles(&[header(None, None)]), vec![FileRole::CurrentYear]);
    }
}
