use std::collections::HashSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::database_ops::companies::CompanyRecord;

const MAX_SLUG_LEN: usize = 255;
const SLUG_CHECKSUM_HEX_LEN: usize = 8;

/// One raw row of the registry dump, named the way the CSV names it.
///
/// The registry has shipped the same data under several header spellings
/// over the years; the aliases map all of them onto one struct.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCompanyRow {
    #[serde(alias = "CIN", alias = "CORPORATE_IDENTIFICATION_NUMBER")]
    pub cin: Option<String>,
    #[serde(alias = "COMPANY_NAME", alias = "CompanyName", alias = "NAME")]
    pub company_name: Option<String>,
    #[serde(alias = "COMPANY_STATUS", alias = "STATUS")]
    pub status: Option<String>,
    #[serde(alias = "COMPANY_CLASS", alias = "CLASS")]
    pub class: Option<String>,
    #[serde(alias = "COMPANY_CATEGORY", alias = "CATEGORY")]
    pub category: Option<String>,
    #[serde(alias = "DATE_OF_REGISTRATION", alias = "REGISTRATION_DATE")]
    pub date_of_registration: Option<String>,
    #[serde(alias = "AUTHORIZED_CAP", alias = "AUTHORIZED_CAPITAL")]
    pub authorized_capital: Option<String>,
    #[serde(alias = "PAIDUP_CAPITAL", alias = "PAID_UP_CAPITAL")]
    pub paidup_capital: Option<String>,
    #[serde(alias = "REGISTERED_STATE", alias = "STATE")]
    pub registered_state: Option<String>,
    #[serde(alias = "REGISTERED_OFFICE_ADDRESS", alias = "ADDRESS")]
    pub registered_office_address: Option<String>,
    #[serde(alias = "EMAIL_ADDR", alias = "EMAIL")]
    pub email: Option<String>,
}

/// Why a row was skipped instead of queued for insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The cin is already present in the store or earlier in this run.
    DuplicateCin,
    /// The cin or company name is empty after trimming.
    MissingRequiredField,
}

/// Outcome of normalizing a single raw row.
#[derive(Debug)]
pub enum NormalizedOutcome {
    Accepted(CompanyRecord),
    Skipped(SkipReason),
}

/// Map a raw row into a [`CompanyRecord`], running the required-field and
/// duplicate checks against `existing_cins`.
///
/// Accepted cins are added to `existing_cins` immediately, so rows later in
/// the same file dedupe against this run and not just against the store.
/// Optional fields that fail to parse become `None` rather than rejecting
/// the row.
pub fn normalize(row: &RawCompanyRow, existing_cins: &mut HashSet<String>) -> NormalizedOutcome {
    let cin = row.cin.as_deref().unwrap_or("").trim();
    let name = row.company_name.as_deref().unwrap_or("").trim();
    if cin.is_empty() || name.is_empty() {
        return NormalizedOutcome::Skipped(SkipReason::MissingRequiredField);
    }
    if existing_cins.contains(cin) {
        return NormalizedOutcome::Skipped(SkipReason::DuplicateCin);
    }
    existing_cins.insert(cin.to_string());

    NormalizedOutcome::Accepted(CompanyRecord {
        cin: cin.to_string(),
        name: name.to_string(),
        slug: company_slug(name, cin),
        status: clean_opt(&row.status),
        class: clean_opt(&row.class),
        category: clean_opt(&row.category),
        date_of_registration: row
            .date_of_registration
            .as_deref()
            .and_then(parse_registry_date),
        authorized_capital: row.authorized_capital.as_deref().and_then(parse_capital),
        paidup_capital: row.paidup_capital.as_deref().and_then(parse_capital),
        registered_state: clean_opt(&row.registered_state),
        registered_office_address: clean_opt(&row.registered_office_address),
        email: clean_opt(&row.email),
    })
}

fn clean_opt(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Deterministic slug for a company: the slugified name plus a checksum
/// fragment of the cin. Identical (name, cin) pairs always produce the same
/// slug across runs and restarts; distinct cins sharing a name diverge in
/// the fragment.
pub fn company_slug(name: &str, cin: &str) -> String {
    let mut base = slugify_token(name);
    if base.is_empty() {
        base = "company".to_string();
    }

    // Clamp base to leave room for checksum.
    let checksum = slug_checksum_fragment(cin);
    let max_base_chars = MAX_SLUG_LEN.saturating_sub(checksum.len() + 1).max(1);
    if base.chars().count() > max_base_chars {
        base = clamp_to_chars(&base, max_base_chars);
        base = base.trim_matches('-').to_string();
        if base.is_empty() {
            base = checksum.clone();
        }
    }

    format!("{}-{}", base, checksum)
}

fn slugify_token(input: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

fn slug_checksum_fragment(cin: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(cin.trim().as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex.chars().take(SLUG_CHECKSUM_HEX_LEN).collect::<String>()
}

fn clamp_to_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out = String::with_capacity(max_chars.min(input.len()));
    let mut count = 0;
    for ch in input.chars() {
        if count == max_chars {
            break;
        }
        out.push(ch);
        count += 1;
    }
    out
}

/// Dates appear in the dump as dd-mm-yyyy, dd/mm/yyyy, dd-Mon-yyyy or ISO.
fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%Y-%m-%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

/// Capital amounts ship with currency symbols and grouping commas; keep the
/// digits, dot and sign, drop the rest.
fn parse_capital(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cin: &str, name: &str) -> RawCompanyRow {
        RawCompanyRow {
            cin: Some(cin.to_string()),
            company_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn slug_is_deterministic() {
        let a = company_slug("Acme Widgets Pvt Ltd", "U74999DL2015PTC276785");
        let b = company_slug("Acme Widgets Pvt Ltd", "U74999DL2015PTC276785");
        assert_eq!(a, b);
        assert!(a.starts_with("acme-widgets-pvt-ltd-"));
    }

    #[test]
    fn same_name_distinct_cins_get_distinct_slugs() {
        let a = company_slug("Acme Trading", "U11111DL2015PTC000001");
        let b = company_slug("Acme Trading", "U11111DL2015PTC000002");
        assert_ne!(a, b);
    }

    #[test]
    fn slug_collapses_punctuation_runs() {
        let slug = company_slug("S. R. & Co. (India)", "U22222MH2010PTC000003");
        assert!(slug.starts_with("s-r-co-india-"), "{slug}");
        assert!(!slug.contains("--"));
    }

    #[test]
    fn slug_of_unusable_name_falls_back() {
        let slug = company_slug("***", "U33333KA2012PTC000004");
        assert!(slug.starts_with("company-"), "{slug}");
    }

    #[test]
    fn long_names_are_clamped_below_column_width() {
        let name = "a".repeat(400);
        let slug = company_slug(&name, "U44444TN2018PTC000005");
        assert!(slug.chars().count() <= MAX_SLUG_LEN);
        assert!(slug.contains('-'));
    }

    #[test]
    fn missing_cin_or_name_is_rejected() {
        let mut seen = HashSet::new();
        let no_cin = row("  ", "Acme");
        let no_name = row("U55555UP2019PTC000006", "");
        for r in [no_cin, no_name] {
            match normalize(&r, &mut seen) {
                NormalizedOutcome::Skipped(SkipReason::MissingRequiredField) => {}
                other => panic!("expected missing-field skip, got {other:?}"),
            }
        }
        assert!(seen.is_empty());
    }

    #[test]
    fn duplicate_cin_within_run_is_skipped() {
        let mut seen = HashSet::new();
        let first = row("U66666GJ2020PTC000007", "First Company");
        let second = row("U66666GJ2020PTC000007", "Second Spelling Of It");
        assert!(matches!(
            normalize(&first, &mut seen),
            NormalizedOutcome::Accepted(_)
        ));
        assert!(matches!(
            normalize(&second, &mut seen),
            NormalizedOutcome::Skipped(SkipReason::DuplicateCin)
        ));
    }

    #[test]
    fn cin_is_trimmed_before_dedup_and_storage() {
        let mut seen = HashSet::new();
        let padded = row("  U77777RJ2021PTC000008  ", "Padded Co");
        match normalize(&padded, &mut seen) {
            NormalizedOutcome::Accepted(rec) => assert_eq!(rec.cin, "U77777RJ2021PTC000008"),
            other => panic!("expected accept, got {other:?}"),
        }
        assert!(seen.contains("U77777RJ2021PTC000008"));
    }

    #[test]
    fn unparseable_optionals_become_none() {
        let mut seen = HashSet::new();
        let raw = RawCompanyRow {
            cin: Some("U88888WB2014PTC000009".into()),
            company_name: Some("Lenient Fields Ltd".into()),
            date_of_registration: Some("not a date".into()),
            authorized_capital: Some("n/a".into()),
            paidup_capital: Some("₹1,00,000.50".into()),
            ..Default::default()
        };
        match normalize(&raw, &mut seen) {
            NormalizedOutcome::Accepted(rec) => {
                assert_eq!(rec.date_of_registration, None);
                assert_eq!(rec.authorized_capital, None);
                assert_eq!(
                    rec.paidup_capital,
                    Some(BigDecimal::from_str("100000.50").unwrap())
                );
            }
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[test]
    fn registry_date_formats_parse() {
        for (raw, y, m, d) in [
            ("18-02-2015", 2015, 2, 18),
            ("18/02/2015", 2015, 2, 18),
            ("18-Feb-2015", 2015, 2, 18),
            ("2015-02-18", 2015, 2, 18),
        ] {
            assert_eq!(
                parse_registry_date(raw),
                NaiveDate::from_ymd_opt(y, m, d),
                "{raw}"
            );
        }
        assert_eq!(parse_registry_date(""), None);
        assert_eq!(parse_registry_date("31-31-2015"), None);
    }
}
