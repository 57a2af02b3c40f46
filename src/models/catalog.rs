//! Catalog payload types
//!
//! Each upstream response shape has its own decode function. Decoders either
//! return a validated value or a [`DecodeError`]; nothing here guesses between
//! shapes.
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::BookCandidate;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

// ============================================================================
// Audible catalog API Types
// ============================================================================

/// Response from `/1.0/catalog/products` and `/1.0/catalog/products/{asin}/sims`
#[derive(Debug, Deserialize)]
struct ProductsResponse {
    #[serde(default)]
    products: Vec<ProductRef>,
}

#[derive(Debug, Deserialize)]
struct ProductRef {
    #[serde(default)]
    asin: Option<String>,
}

/// Decodes an Audible product listing into ASINs, preserving provider order
pub fn decode_products(body: &str) -> Result<Vec<String>, DecodeError> {
    let response: ProductsResponse = serde_json::from_str(body)?;
    Ok(response
        .products
        .into_iter()
        .filter_map(|p| p.asin)
        .filter(|asin| !asin.trim().is_empty())
        .collect())
}

// ============================================================================
// Metadata provider API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct NamedPerson {
    name: String,
}

/// Audimeta `GET /book/{asin}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudimetaBook {
    asin: Option<String>,
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<NamedPerson>,
    #[serde(default)]
    narrators: Vec<NamedPerson>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    length_minutes: Option<i32>,
}

/// Audnexus `GET /books/{asin}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudnexusBook {
    asin: Option<String>,
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<NamedPerson>,
    #[serde(default)]
    narrators: Vec<NamedPerson>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    runtime_length_min: Option<i32>,
}

/// Decodes an Audimeta book payload
pub fn decode_audimeta(body: &str) -> Result<BookCandidate, DecodeError> {
    let book: AudimetaBook = serde_json::from_str(body)?;
    Ok(BookCandidate {
        asin: required(book.asin, "asin")?,
        title: required(book.title, "title")?,
        subtitle: book.subtitle,
        authors: names(book.authors),
        narrators: names(book.narrators),
        cover_image: book.image_url,
        release_date: book.release_date.as_deref().and_then(parse_release_date),
        runtime_length_min: book.length_minutes.unwrap_or(0),
        downloaded: false,
    })
}

/// Decodes an Audnexus book payload
pub fn decode_audnexus(body: &str) -> Result<BookCandidate, DecodeError> {
    let book: AudnexusBook = serde_json::from_str(body)?;
    Ok(BookCandidate {
        asin: required(book.asin, "asin")?,
        title: required(book.title, "title")?,
        subtitle: book.subtitle,
        authors: names(book.authors),
        narrators: names(book.narrators),
        cover_image: book.image,
        release_date: book.release_date.as_deref().and_then(parse_release_date),
        runtime_length_min: book.runtime_length_min.unwrap_or(0),
        downloaded: false,
    })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DecodeError::MissingField(field))
}

fn names(people: Vec<NamedPerson>) -> Vec<String> {
    people.into_iter().map(|p| p.name).collect()
}

/// Parses either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date
///
/// Unparseable dates yield `None`; the scorer treats that as no recency bonus.
pub fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
