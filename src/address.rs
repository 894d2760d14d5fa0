//! Rewrites raw station addresses into queries a geocoder can resolve.

use once_cell::sync::Lazy;
use regex::Regex;

const COUNTRY_SUFFIX: &str = ", Romania";
const COUNTRY_SPELLINGS: &[&str] = &["Romania", "România"];

static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bSTR\.\s*", "Strada "),
        (r"(?i)\bSOS\.\s*", "Soseaua "),
        (r"(?i)\bBD\.\s*", "Bulevardul "),
        (r"(?i)\bJUD\.\s*", "judetul "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("abbreviation patterns are valid"),
            replacement,
        )
    })
    .collect()
});

static HOUSE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d+[A-Za-z]?\b").expect("house number pattern is valid"));

/// Normalizes a raw address into the query used for the cache and the geocoder.
///
/// A missing address yields an empty query, which no strategy can resolve.
pub fn normalize_address(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };

    let mut query = raw.trim().to_string();
    for (pattern, replacement) in ABBREVIATIONS.iter() {
        query = pattern.replace_all(&query, *replacement).into_owned();
    }

    if !COUNTRY_SPELLINGS
        .iter()
        .any(|spelling| query.contains(spelling))
    {
        query.push_str(COUNTRY_SUFFIX);
    }
    query
}

/// Drops street numbers (`5`, `12A`) from a normalized query.
pub fn strip_house_number(query: &str) -> String {
    HOUSE_NUMBER.replace_all(query, "").into_owned()
}
