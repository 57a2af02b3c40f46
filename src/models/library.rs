//! Audiobookshelf library search and listing payloads
use serde::Deserialize;

use super::catalog::DecodeError;

/// A title/author pair found in the media server library
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryMatch {
    pub title: String,
    pub authors: Vec<String>,
}

/// A recently added library item; the ASIN is missing for some imports
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryItem {
    pub asin: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
}

/// Top-level search response; exactly one of the known keys is expected
#[derive(Debug, Deserialize)]
struct LibrarySearchResponse {
    #[serde(default)]
    book: Option<Vec<CurrentHit>>,
    #[serde(default)]
    results: Option<Vec<LegacyHit>>,
}

// Current servers: { "book": [ { "libraryItem": { "media": { "metadata": {..} } } } ] }
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentHit {
    library_item: CurrentItem,
}

#[derive(Debug, Deserialize)]
struct CurrentItem {
    media: CurrentMedia,
}

#[derive(Debug, Deserialize)]
struct CurrentMedia {
    metadata: CurrentMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
}

// Older servers: { "results": [ { "media": { "title": .., "authors": [..] } } ] }
#[derive(Debug, Deserialize)]
struct LegacyHit {
    media: LegacyMedia,
}

#[derive(Debug, Deserialize)]
struct LegacyMedia {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
}

// Listing: { "results": [ { "media": { "metadata": { "title", "asin", "authorName" | "authors" } } } ] }
#[derive(Debug, Deserialize)]
struct LibraryItemsResponse {
    #[serde(default)]
    results: Option<Vec<ListedItem>>,
}

#[derive(Debug, Deserialize)]
struct ListedItem {
    media: ListedMedia,
}

#[derive(Debug, Deserialize)]
struct ListedMedia {
    metadata: ListedMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    authors: Vec<NamedAuthor>,
}

#[derive(Debug, Deserialize)]
struct NamedAuthor {
    name: String,
}

fn split_author_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

/// Decodes a library items listing, skipping items without a title
pub fn decode_library_items(body: &str) -> Result<Vec<LibraryItem>, DecodeError> {
    let response: LibraryItemsResponse = serde_json::from_str(body)?;
    let items = response
        .results
        .ok_or(DecodeError::MissingField("results"))?;

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let metadata = item.media.metadata;
            let title = metadata.title.filter(|t| !t.trim().is_empty())?;
            let authors = match metadata.author_name {
                Some(names) => split_author_names(&names),
                None => metadata.authors.into_iter().map(|a| a.name).collect(),
            };
            Some(LibraryItem {
                asin: metadata
                    .asin
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty()),
                title,
                authors,
            })
        })
        .collect())
}

/// Decodes a library search response into title/author matches
pub fn decode_library_search(body: &str) -> Result<Vec<LibraryMatch>, DecodeError> {
    let response: LibrarySearchResponse = serde_json::from_str(body)?;
    match (response.book, response.results) {
        (Some(hits), _) => Ok(decode_current(hits)),
        (None, Some(hits)) => Ok(decode_legacy(hits)),
        (None, None) => Err(DecodeError::MissingField("book")),
    }
}

fn decode_current(hits: Vec<CurrentHit>) -> Vec<LibraryMatch> {
    hits.into_iter()
        .filter_map(|hit| {
            let metadata = hit.library_item.media.metadata;
            let title = metadata.title?;
            let authors = metadata
                .author_name
                .map(|names| split_author_names(&names))
                .unwrap_or_default();
            Some(LibraryMatch { title, authors })
        })
        .collect()
}

fn decode_legacy(hits: Vec<LegacyHit>) -> Vec<LibraryMatch> {
    hits.into_iter()
        .filter_map(|hit| {
            let title = hit.media.title?;
            Some(LibraryMatch {
                title,
                authors: hit.media.authors,
            })
        })
        .collect()
}

/// Lowercases and collapses everything that is not ASCII alphanumeric
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_current_shape() {
        let json = r#"{
            "book": [
                {"libraryItem": {"media": {"metadata": {
                    "title": "The Way of Kings",
                    "authorName": "Brandon Sanderson"
                }}}},
                {"libraryItem": {"media": {"metadata": {
                    "title": "Good Omens",
                    "authorName": "Terry Pratchett, Neil Gaiman"
                }}}}
            ],
            "authors": [],
            "series": []
        }"#;

        let matches = decode_library_search(json).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].title, "The Way of Kings");
        assert_eq!(
            matches[1].authors,
            vec!["Terry Pratchett".to_string(), "Neil Gaiman".to_string()]
        );
    }

    #[test]
    fn test_decode_legacy_shape() {
        let json = r#"{
            "results": [
                {"media": {"title": "Dune", "authors": ["Frank Herbert"]}},
                {"media": {"authors": ["No Title"]}}
            ]
        }"#;

        let matches = decode_library_search(json).unwrap();
        assert_eq!(
            matches,
            vec![LibraryMatch {
                title: "Dune".to_string(),
                authors: vec!["Frank Herbert".to_string()],
            }]
        );
    }

    #[test]
    fn test_decode_unknown_shape() {
        let result = decode_library_search(r#"{"items": []}"#);
        assert!(matches!(result, Err(DecodeError::MissingField(_))));
    }

    #[test]
    fn test_decode_library_items() {
        let json = r#"{
            "results": [
                {"media": {"metadata": {
                    "title": "Leviathan Wakes",
                    "asin": "B0058A1HFW",
                    "authorName": "James S. A. Corey"
                }}},
                {"media": {"metadata": {
                    "title": "Ripped From CD",
                    "asin": " ",
                    "authors": [{"id": "au_1", "name": "Some Author"}]
                }}},
                {"media": {"metadata": {"asin": "B000"}}}
            ],
            "total": 3,
            "limit": 24
        }"#;

        let items = decode_library_items(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].asin.as_deref(), Some("B0058A1HFW"));
        assert_eq!(items[0].authors, vec!["James S. A. Corey".to_string()]);
        assert_eq!(items[1].asin, None);
        assert_eq!(items[1].authors, vec!["Some Author".to_string()]);
    }

    #[test]
    fn test_decode_library_items_requires_results() {
        assert!(matches!(
            decode_library_items(r#"{"book": []}"#),
            Err(DecodeError::MissingField("results"))
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  The Way of Kings! "), "the way of kings");
        assert_eq!(normalize("Mistborn: The Final-Empire"), "mistborn the final empire");
        assert_eq!(normalize("***"), "");
    }
}
