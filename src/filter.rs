use std::collections::HashSet;

use crate::models::Listing;
use crate::scrapers::types::SearchSpec;

/// Ids of every listing already persisted. Only grows.
#[derive(Debug, Default, Clone)]
pub struct SeenIds(HashSet<String>);

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns false if the id was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for SeenIds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for SeenIds {
    type Item = String;
    type IntoIter = std::collections::hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<String> for SeenIds {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Duplicate,
    TitleMismatch,
    UnparseablePrice,
    BelowMinimum(f64),
    AboveMaximum(f64),
}

/// Decide whether a listing is new and matches the search that found it.
///
/// Duplicates are rejected first. Opaque searches accept everything else.
/// Structured searches need the query in the title (case-insensitive) and
/// the price within the inclusive bounds. Accepted ids go into `seen`
/// right away so a repeat card later in the same run is a duplicate.
pub fn evaluate(listing: &Listing, spec: &SearchSpec, seen: &mut SeenIds) -> Verdict {
    if seen.contains(&listing.id) {
        return Verdict::Duplicate;
    }

    let verdict = match spec {
        SearchSpec::FullUrl { .. } => Verdict::Accepted,
        SearchSpec::Structured(search) => {
            if !listing
                .title
                .to_lowercase()
                .contains(&search.query.to_lowercase())
            {
                Verdict::TitleMismatch
            } else {
                match parse_price(&listing.price) {
                    None => Verdict::UnparseablePrice,
                    Some(price) if search.price_start.is_some_and(|min| price < min as f64) => {
                        Verdict::BelowMinimum(price)
                    }
                    Some(price) if search.price_end.is_some_and(|max| price > max as f64) => {
                        Verdict::AboveMaximum(price)
                    }
                    Some(_) => Verdict::Accepted,
                }
            }
        }
    };

    if verdict == Verdict::Accepted {
        seen.insert(listing.id.clone());
    }
    verdict
}

pub fn should_keep(listing: &Listing, spec: &SearchSpec, seen: &mut SeenIds) -> bool {
    evaluate(listing, spec, seen) == Verdict::Accepted
}

/// Numeric value of a displayed price such as `S$1,250.50`.
/// Leading currency text and thousands separators are dropped.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOT_FOUND;
    use crate::scrapers::types::StructuredSearch;

    fn listing(id: &str, title: &str, price: &str) -> Listing {
        Listing {
            id: id.into(),
            title: title.into(),
            price: price.into(),
            seller_name: "seller".into(),
            posted_time: "1 hour ago".into(),
            condition: "Like new".into(),
            image_url: NOT_FOUND.into(),
            href: Listing::listing_url(id),
        }
    }

    fn iphone_search() -> SearchSpec {
        SearchSpec::Structured(
            StructuredSearch::new("mobile-phones", "iphone").with_prices(Some(100), Some(500)),
        )
    }

    #[test]
    fn prices_parse_without_currency_or_separators() {
        assert_eq!(parse_price("S$450"), Some(450.0));
        assert_eq!(parse_price(" S$1,250.50 "), Some(1250.5));
        assert_eq!(parse_price("99.99"), Some(99.99));
        assert_eq!(parse_price("FREE"), None);
        assert_eq!(parse_price(NOT_FOUND), None);
        assert_eq!(parse_price("S$100 - S$200"), None);
    }

    #[test]
    fn matching_listing_is_accepted_and_remembered() {
        let mut seen = SeenIds::new();
        let item = listing("998877", "iPhone 12 128GB", "S$450");
        assert!(should_keep(&item, &iphone_search(), &mut seen));
        assert!(seen.contains("998877"));
        assert_eq!(evaluate(&item, &iphone_search(), &mut seen), Verdict::Duplicate);
    }

    #[test]
    fn bounds_are_inclusive() {
        let spec = iphone_search();
        let mut seen = SeenIds::new();
        assert!(should_keep(&listing("1", "iphone", "S$100"), &spec, &mut seen));
        assert!(should_keep(&listing("2", "iphone", "S$500"), &spec, &mut seen));
        assert!(should_keep(&listing("3", "iphone", "S$500.00"), &spec, &mut seen));
        assert_eq!(
            evaluate(&listing("4", "iphone", "S$99.99"), &spec, &mut seen),
            Verdict::BelowMinimum(99.99)
        );
        assert_eq!(
            evaluate(&listing("5", "iphone", "S$500.01"), &spec, &mut seen),
            Verdict::AboveMaximum(500.01)
        );
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn open_bounds_accept_any_price() {
        let spec = SearchSpec::Structured(StructuredSearch::new("bikes", "brompton"));
        let mut seen = SeenIds::new();
        assert!(should_keep(&listing("1", "Brompton C", "S$9,999"), &spec, &mut seen));
        assert!(should_keep(&listing("2", "BROMPTON bag", "S$0"), &spec, &mut seen));
    }

    #[test]
    fn title_must_contain_query() {
        let mut seen = SeenIds::new();
        assert_eq!(
            evaluate(&listing("1", "Samsung S21", "S$300"), &iphone_search(), &mut seen),
            Verdict::TitleMismatch
        );
        assert!(seen.is_empty());
    }

    #[test]
    fn unparseable_price_is_rejected() {
        let mut seen = SeenIds::new();
        assert_eq!(
            evaluate(&listing("1", "iPhone 11", NOT_FOUND), &iphone_search(), &mut seen),
            Verdict::UnparseablePrice
        );
    }

    #[test]
    fn opaque_search_accepts_anything_new() {
        let spec = SearchSpec::full_url("https://www.carousell.sg/search/anything");
        let mut seen: SeenIds = vec!["old".to_string()].into_iter().collect();
        assert!(should_keep(&listing("new", "whatever", NOT_FOUND), &spec, &mut seen));
        assert!(!should_keep(&listing("old", "whatever", "S$1"), &spec, &mut seen));
    }
}
