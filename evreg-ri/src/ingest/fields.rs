//! Column alias resolution
//!
//! Registration exports from different form tools name the same logical
//! column differently. Each logical field has an ordered alias list; the
//! first alias present with a non-empty value wins. Matching is
//! case-sensitive.

use super::records::CsvRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Referral code column aliases, in priority order
///
/// `referal_code_optional` is misspelled in some exports and must stay as is.
pub const REFERRAL_CODE_ALIASES: &[&str] = &[
    "referralCode",
    "ReferralCode",
    "Referral Code",
    "referral_code",
    "referral_code_optional",
    "referal_code_optional",
];

/// Registrant name column aliases, in priority order
pub const NAME_ALIASES: &[&str] = &["name", "Name", "Full Name"];

/// College name column aliases, in priority order
pub const COLLEGE_NAME_ALIASES: &[&str] = &["collegeName", "College", "College Name", "college_name"];

/// Column holding the registration timestamp
pub const REGISTERED_AT_FIELD: &str = "registeredAt";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Value of the first alias present with a non-empty (trimmed) value
pub fn resolve_field<'a>(record: &'a CsvRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|alias| record.get(alias))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Parse a registration timestamp
///
/// Naive values are read as UTC. Returns `None` for anything unrecognised so
/// the caller can fall back to the ingestion time.
pub fn parse_registered_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
