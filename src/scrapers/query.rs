use std::collections::HashMap;

use url::Url;

use crate::error::ResolveError;
use crate::scrapers::types::{SearchSpec, StructuredSearch, ALL_TAB, DEFAULT_SORT_BY};

/// Query sources that mark a URL produced by the site's own search box.
/// Such URLs don't map onto category searches and are kept verbatim.
const OPAQUE_SOURCE_MARKERS: [&str; 2] = [
    "t-search_query_source=ss_dropdown",
    "t-search_query_source=direct_search",
];

/// Build the URL to render for a saved search.
///
/// Opaque searches pass through unchanged. Structured searches become
/// `{base}/categories/{category}/?search=..&price_start=..&price_end=..&sort_by=..[&tab=..]`,
/// leaving out absent bounds and the `all` tab.
pub fn resolve(spec: &SearchSpec, base_url: &str) -> Result<String, ResolveError> {
    let search = match spec {
        SearchSpec::FullUrl { full_url } => return Ok(full_url.clone()),
        SearchSpec::Structured(search) => search,
    };

    let category = search.category.trim_matches('/');
    if category.is_empty() {
        return Err(ResolveError::MissingField("category"));
    }
    if search.query.trim().is_empty() {
        return Err(ResolveError::MissingField("query"));
    }

    Url::parse(base_url).map_err(|e| ResolveError::BadBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let base = base_url.trim_end_matches('/');

    Ok(format!(
        "{base}/categories/{category}/?{}",
        encode_params(search)
    ))
}

fn encode_params(search: &StructuredSearch) -> String {
    let mut params: Vec<(&str, String)> = vec![("search", search.query.clone())];
    if let Some(start) = search.price_start {
        params.push(("price_start", start.to_string()));
    }
    if let Some(end) = search.price_end {
        params.push(("price_end", end.to_string()));
    }
    params.push(("sort_by", search.sort_by.to_string()));
    if let Some(tab) = search.tab.as_deref().filter(|tab| *tab != ALL_TAB) {
        params.push(("tab", tab.to_string()));
    }

    // Spaces become %20, matching what the browser puts in the address bar
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decompose a marketplace URL into a saved search.
///
/// Anything that can't be turned into a category + query search falls back
/// to the opaque form instead of being dropped.
pub fn parse_search_url(url: &str) -> SearchSpec {
    if OPAQUE_SOURCE_MARKERS.iter().any(|marker| url.contains(marker)) {
        return SearchSpec::full_url(url);
    }
    parse_structured(url)
        .map(SearchSpec::Structured)
        .unwrap_or_else(|| SearchSpec::full_url(url))
}

fn parse_structured(url: &str) -> Option<StructuredSearch> {
    let parsed = Url::parse(url).ok()?;

    let mut params: HashMap<String, String> = HashMap::new();
    for (key, value) in parsed.query_pairs() {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    let mut segments = parsed.path().trim_matches('/').split('/');
    if segments.next()? != "categories" {
        return None;
    }
    let category = segments.collect::<Vec<_>>().join("/");
    if category.is_empty() {
        return None;
    }

    let query = params.get("search").filter(|q| !q.is_empty())?.clone();

    let sort_by = match params.get("sort_by") {
        Some(raw) => raw.parse().ok()?,
        None => DEFAULT_SORT_BY,
    };

    Some(StructuredSearch {
        category,
        query,
        sort_by,
        price_start: optional_int(params.get("price_start"))?,
        price_end: optional_int(params.get("price_end"))?,
        tab: params.get("tab").cloned(),
    })
}

/// `Some(None)` for an absent or blank value, `None` when it isn't a number
fn optional_int(raw: Option<&String>) -> Option<Option<i64>> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Some(None),
        Some(value) => value.parse().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.carousell.sg/";

    fn phone_search() -> SearchSpec {
        SearchSpec::Structured(
            StructuredSearch::new("mobile-phones", "iphone").with_prices(Some(100), Some(500)),
        )
    }

    #[test]
    fn structured_search_builds_category_url() {
        let url = resolve(&phone_search(), BASE).unwrap();
        assert_eq!(
            url,
            "https://www.carousell.sg/categories/mobile-phones/?search=iphone&price_start=100&price_end=500&sort_by=3"
        );
    }

    #[test]
    fn absent_bounds_and_all_tab_are_omitted() {
        let mut search = StructuredSearch::new("bikes", "road bike");
        search.tab = Some("all".into());
        let url = resolve(&SearchSpec::Structured(search), "https://www.carousell.sg").unwrap();
        assert_eq!(
            url,
            "https://www.carousell.sg/categories/bikes/?search=road%20bike&sort_by=3"
        );
    }

    #[test]
    fn explicit_tab_is_appended() {
        let mut search = StructuredSearch::new("cameras", "fuji");
        search.tab = Some("marketplace".into());
        let url = resolve(&SearchSpec::Structured(search), BASE).unwrap();
        assert!(url.ends_with("&sort_by=3&tab=marketplace"));
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let search = StructuredSearch::new("audio", "b&o a/b?");
        let url = resolve(&SearchSpec::Structured(search), BASE).unwrap();
        assert!(url.contains("search=b%26o%20a%2Fb%3F&"));
    }

    #[test]
    fn opaque_url_passes_through() {
        let raw = "https://www.carousell.sg/search/ps5?t-search_query_source=direct_search";
        assert_eq!(resolve(&SearchSpec::full_url(raw), BASE).unwrap(), raw);
    }

    #[test]
    fn missing_query_is_signalled() {
        let search = StructuredSearch::new("bikes", "  ");
        assert_eq!(
            resolve(&SearchSpec::Structured(search), BASE),
            Err(ResolveError::MissingField("query"))
        );
        let search = StructuredSearch::new("", "bike");
        assert_eq!(
            resolve(&SearchSpec::Structured(search), BASE),
            Err(ResolveError::MissingField("category"))
        );
    }

    #[test]
    fn parsed_category_url_resolves_back_to_itself() {
        let urls = [
            "https://www.carousell.sg/categories/mobile-phones/?search=iphone&price_start=100&price_end=500&sort_by=3",
            "https://www.carousell.sg/categories/photography/cameras/?search=leica%20m6&sort_by=1&tab=marketplace",
            "https://www.carousell.sg/categories/bikes/?search=road%20bike&sort_by=3",
        ];
        for url in urls {
            let spec = parse_search_url(url);
            assert!(matches!(spec, SearchSpec::Structured(_)), "{url}");
            assert_eq!(resolve(&spec, BASE).unwrap(), url);
        }
    }

    #[test]
    fn plus_encoded_spaces_still_parse() {
        let spec = parse_search_url("https://www.carousell.sg/categories/bikes/?search=road+bike");
        assert_eq!(
            resolve(&spec, BASE).unwrap(),
            "https://www.carousell.sg/categories/bikes/?search=road%20bike&sort_by=3"
        );
    }

    #[test]
    fn parse_defaults_sort_and_joins_nested_category() {
        let spec = parse_search_url("https://www.carousell.sg/categories/photography/cameras/?search=leica");
        assert_eq!(
            spec,
            SearchSpec::Structured(StructuredSearch::new("photography/cameras", "leica"))
        );
    }

    #[test]
    fn search_box_urls_stay_opaque() {
        let raw = "https://www.carousell.sg/categories/bikes/?search=brompton&t-search_query_source=ss_dropdown";
        assert_eq!(parse_search_url(raw), SearchSpec::full_url(raw));
    }

    #[test]
    fn undecomposable_urls_fall_back_to_opaque() {
        for raw in [
            "https://www.carousell.sg/search/lego",
            "https://www.carousell.sg/categories/bikes/",
            "https://www.carousell.sg/categories/bikes/?search=bmx&price_start=cheap",
            "not a url",
        ] {
            assert_eq!(parse_search_url(raw), SearchSpec::full_url(raw), "{raw}");
        }
    }
}
