use serde::{Deserialize, Serialize};

/// Sort order applied when a saved search does not specify one
pub const DEFAULT_SORT_BY: u32 = 3;

/// Tab value meaning "no tab filter"; never sent as a parameter
pub const ALL_TAB: &str = "all";

fn default_sort_by() -> u32 {
    DEFAULT_SORT_BY
}

/// A saved marketplace search, as stored under `SEARCH_ITEMS`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SearchSpec {
    /// URL that could not be decomposed; rendered as-is, never filtered
    FullUrl { full_url: String },
    Structured(StructuredSearch),
}

/// Search parameters for a category query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredSearch {
    /// Category path below `categories/`, may contain `/`
    pub category: String,
    /// Free-text query; also matched against listing titles
    pub query: String,
    #[serde(default = "default_sort_by")]
    pub sort_by: u32,
    /// Inclusive lower price bound
    #[serde(default)]
    pub price_start: Option<i64>,
    /// Inclusive upper price bound
    #[serde(default)]
    pub price_end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
}

impl SearchSpec {
    pub fn full_url(url: impl Into<String>) -> Self {
        SearchSpec::FullUrl {
            full_url: url.into(),
        }
    }

    /// Short human label for log lines
    pub fn label(&self) -> String {
        match self {
            SearchSpec::FullUrl { full_url } => full_url.clone(),
            SearchSpec::Structured(s) => format!("{} in {}", s.query, s.category),
        }
    }
}

impl StructuredSearch {
    pub fn new(category: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            query: query.into(),
            sort_by: DEFAULT_SORT_BY,
            price_start: None,
            price_end: None,
            tab: None,
        }
    }

    pub fn with_prices(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.price_start = start;
        self.price_end = end;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_items_deserialize_as_opaque() {
        let spec: SearchSpec =
            serde_json::from_str(r#"{"full_url": "https://www.carousell.sg/search/lego"}"#)
                .unwrap();
        assert_eq!(spec, SearchSpec::full_url("https://www.carousell.sg/search/lego"));
    }

    #[test]
    fn structured_items_default_sort_and_bounds() {
        let spec: SearchSpec =
            serde_json::from_str(r#"{"category": "mobile-phones", "query": "iphone"}"#).unwrap();
        match spec {
            SearchSpec::Structured(s) => {
                assert_eq!(s.sort_by, 3);
                assert_eq!(s.price_start, None);
                assert_eq!(s.price_end, None);
                assert_eq!(s.tab, None);
            }
            other => panic!("expected structured search, got {other:?}"),
        }
    }

    #[test]
    fn structured_items_accept_null_bounds() {
        let spec: SearchSpec = serde_json::from_str(
            r#"{"category": "bikes", "query": "brompton", "sort_by": 1,
                "price_start": null, "price_end": 900, "tab": "all"}"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            SearchSpec::Structured(StructuredSearch {
                category: "bikes".into(),
                query: "brompton".into(),
                sort_by: 1,
                price_start: None,
                price_end: Some(900),
                tab: Some("all".into()),
            })
        );
    }

    #[test]
    fn item_without_query_is_rejected() {
        let result: Result<SearchSpec, _> = serde_json::from_str(r#"{"category": "bikes"}"#);
        assert!(result.is_err());
    }
}
