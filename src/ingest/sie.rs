//! SIE header parsing.
//!
//! Only the identification records are read on the client:
//! - `#RAR 0 <start> <end>`: fiscal year of the file (index 0 is the current year)
//! - `#ORGNR <number>`: organisation number
//! - `#FNAMN "<name>"`: company name
//!
//! SIE files are usually CP437 or Latin-1. The records above are ASCII, so
//! bytes that are not valid UTF-8 are decoded one byte per character.

/// Identification records of one SIE file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SieHeader {
    /// Year of the fiscal year's end date.
    pub fiscal_year_end: Option<i32>,
    pub org_number: Option<String>,
    pub company_name: Option<String>,
}

impl SieHeader {
    /// Organisation number reduced to its digits.
    pub fn org_digits(&self) -> Option<String> {
        self.org_number.as_deref().map(digits_only)
    }
}

/// Strip hyphens, spaces and any other formatting from an organisation number.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Read the identification records from raw file bytes.
pub fn parse_header(bytes: &[u8]) -> SieHeader {
    let text = decode(bytes);
    let mut header = SieHeader::default();

    for line in text.lines() {
        let line = line.trim();
        let Some((tag, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let rest = rest.trim();
        match tag.to_ascii_uppercase().as_str() {
            "#RAR" => {
                let mut fields = rest.split_whitespace();
                if fields.next() != Some("0") {
                    continue;
                }
                let end = fields.nth(1);
                if let Some(year) = end.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok()) {
                    header.fiscal_year_end = Some(year);
                }
            }
            "#ORGNR" => {
                if let Some(number) = first_field(rest) {
                    header.org_number = Some(number);
                }
            }
            "#FNAMN" => {
                if let Some(name) = first_field(rest) {
                    header.company_name = Some(name);
                }
            }
            _ => {}
        }
    }
    header
}

/// First field of a record, honouring SIE double quotes.
fn first_field(rest: &str) -> Option<String> {
    let field = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or_default(),
        None => rest.split_whitespace().next().unwrap_or_default(),
    };
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_string())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
