//! Heuristics for normalizing provider records into `RawPaper` fields
//!
//! Scholar providers return publication metadata as a single free-text
//! summary ("A Author, B Author - Venue, 2021 - publisher.com"); these
//! helpers split it apart and fish structured fields out of links and
//! snippets.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DOI: Regex = Regex::new(r#"10\.\d{4,9}/[^\s"'<>]+"#).expect("doi regex");
    static ref YEAR: Regex = Regex::new(r"\b(19|20)\d{2}\b").expect("year regex");
    static ref HOSTNAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}$").expect("hostname regex");
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").expect("normalize regex");
}

/// Split a provider publication summary into authors, venue, and year
///
/// Segments are separated by `" - "`: authors first, then venue/year, then
/// usually the hosting site. Hostname-like tokens never become venues.
pub fn parse_publication_info(info: &str) -> (Vec<String>, Option<String>, Option<i32>) {
    let segments: Vec<&str> = info.split(" - ").map(str::trim).collect();

    let authors: Vec<String> = segments
        .first()
        .map(|segment| {
            segment
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty() && *name != "…" && !is_hostname_like(name))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let year = YEAR
        .find(info)
        .and_then(|m| m.as_str().parse::<i32>().ok());

    let venue = segments.get(1).and_then(|segment| {
        let cleaned = YEAR.replace_all(segment, "");
        let cleaned = cleaned.trim().trim_matches(',').trim();
        if cleaned.is_empty() || is_hostname_like(cleaned) {
            None
        } else {
            Some(cleaned.to_string())
        }
    });

    (authors, venue, year)
}

/// Whether a token looks like a web host rather than a venue or author
pub fn is_hostname_like(token: &str) -> bool {
    HOSTNAME.is_match(token.trim())
}

/// Pull the first DOI out of any of the given text fields
pub fn extract_doi<'a>(fields: impl IntoIterator<Item = &'a str>) -> Option<String> {
    for field in fields {
        if let Some(m) = DOI.find(field) {
            // Trailing punctuation from prose context is not part of the DOI
            let doi = m.as_str().trim_end_matches(['.', ',', ';', ')']);
            return Some(doi.to_string());
        }
    }
    None
}

/// Lowercase, strip punctuation, collapse whitespace; idempotent
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, " ")
        .trim()
        .to_string()
}
