use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::models::{Listing, CONDITION_LABELS, NOT_FOUND};
use crate::scrapers::locator::{parse_selector, Locator, LocatorChain};

/// Container the renderer waits for before the page counts as loaded
pub const LISTING_CONTAINER: &str = "div[class*='browse-listings']";

/// Every listing card carries `data-testid="listing-card-<id>"`
pub const CARD_SELECTOR: &str = "div[data-testid^='listing-card-']";

const CARD_ID_ATTR: &str = "data-testid";
const CARD_ID_PREFIX: &str = "listing-card-";

/// Result of extracting all cards from one rendered page
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub listings: Vec<Listing>,
    pub cards_found: usize,
    pub skipped: usize,
}

/// Turns rendered Carousell search pages into listings
pub struct CardExtractor {
    card: Selector,
    title: LocatorChain,
    price: LocatorChain,
    posted_time: LocatorChain,
    seller: LocatorChain,
    condition: LocatorChain,
    image: LocatorChain,
}

impl CardExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            card: parse_selector(CARD_SELECTOR)?,
            title: LocatorChain::new(
                "title",
                vec![
                    Locator::text("p[class*='D_lO']")?,
                    Locator::text("a[class*='D_ml'] p[style*='max-line']")?,
                    Locator::text("p[class*='D_mb']:not([data-testid])")?,
                ],
            ),
            price: LocatorChain::new(
                "price",
                vec![
                    Locator::text("p[class*='D_ma']")?,
                    Locator::text("p[class*='D_mc']")?,
                    Locator::text_containing("p", "S$")?,
                ],
            ),
            posted_time: LocatorChain::new(
                "posted_time",
                vec![
                    Locator::text("p[class*='D_ow']")?,
                    Locator::text("p[class*='D_pc']")?,
                    Locator::text_containing("p", "ago")?,
                ],
            ),
            seller: LocatorChain::new(
                "seller_name",
                vec![Locator::text(
                    "p[data-testid='listing-card-text-seller-name']",
                )?],
            ),
            condition: LocatorChain::new(
                "condition",
                CONDITION_LABELS.iter().map(|label| Locator::label(label)).collect(),
            ),
            image: LocatorChain::new(
                "image_url",
                vec![
                    Locator::attr("img[class*='D_QJ']", "src")?,
                    Locator::attr("img[class*='D_SC']", "src")?,
                    Locator::attr("img", "src")?,
                ],
            ),
        })
    }

    /// Extract up to `limit` cards from a rendered page.
    ///
    /// A card that has no usable id is logged and skipped; it never
    /// aborts the rest of the page.
    pub fn extract_page(&self, html: &str, limit: usize) -> PageExtraction {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&self.card).collect();
        info!("Found {} listing cards", cards.len());

        let mut page = PageExtraction {
            cards_found: cards.len(),
            ..Default::default()
        };

        for (idx, card) in cards.into_iter().take(limit).enumerate() {
            match self.extract_card(card) {
                Ok(listing) => {
                    debug!(
                        card = idx + 1,
                        listing_id = %listing.id,
                        title = %listing.title,
                        price = %listing.price,
                        condition = %listing.condition,
                        "Extracted listing"
                    );
                    page.listings.push(listing);
                }
                Err(e) => {
                    warn!(card = idx + 1, error = %e, "Skipping listing card");
                    debug!(card = idx + 1, html = %card.html(), "Skipped card markup");
                    page.skipped += 1;
                }
            }
        }

        page
    }

    pub fn extract_card(&self, card: ElementRef<'_>) -> Result<Listing, ExtractError> {
        let id = card_id(card)?;

        Ok(Listing {
            title: self.field(&self.title, card, &id),
            price: self.field(&self.price, card, &id),
            seller_name: self.field(&self.seller, card, &id),
            posted_time: self.field(&self.posted_time, card, &id),
            condition: self.field(&self.condition, card, &id),
            image_url: self.field(&self.image, card, &id),
            href: Listing::listing_url(&id),
            id,
        })
    }

    fn field(&self, chain: &LocatorChain, card: ElementRef<'_>, id: &str) -> String {
        match chain.locate(card) {
            Some((0, value)) => value,
            Some((tier, value)) => {
                debug!(listing_id = id, field = chain.field(), tier, "Field found by fallback locator");
                value
            }
            None => {
                debug!(listing_id = id, field = chain.field(), "Field not found");
                NOT_FOUND.to_string()
            }
        }
    }
}

fn card_id(card: ElementRef<'_>) -> Result<String, ExtractError> {
    let raw = card
        .value()
        .attr(CARD_ID_ATTR)
        .ok_or(ExtractError::MissingIdAttribute)?;
    let id = raw.trim().trim_start_matches(CARD_ID_PREFIX);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ExtractError::InvalidId(raw.to_string()));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(cards: &[&str]) -> String {
        format!(
            r#"<html><body><div class="D_a browse-listings-wrapper">{}</div></body></html>"#,
            cards.join("")
        )
    }

    const IPHONE_CARD: &str = r#"
        <div data-testid="listing-card-998877">
          <p data-testid="listing-card-text-seller-name">gadget_sg</p>
          <p class="D_ow D_xy">2 hours ago</p>
          <a class="D_ml" href="/p/iphone-12-998877">
            <img class="D_QJ" src="https://media.example/998877.jpg">
            <p class="D_lO">iPhone 12 128GB</p>
            <p class="D_ma">S$450</p>
            <p class="D_mb">Like new</p>
          </a>
        </div>"#;

    #[test]
    fn extracts_all_fields_from_current_layout() {
        let extractor = CardExtractor::new().unwrap();
        let result = extractor.extract_page(&page(&[IPHONE_CARD]), 48);
        assert_eq!(result.cards_found, 1);
        assert_eq!(
            result.listings,
            vec![Listing {
                id: "998877".into(),
                title: "iPhone 12 128GB".into(),
                price: "S$450".into(),
                seller_name: "gadget_sg".into(),
                posted_time: "2 hours ago".into(),
                condition: "Like new".into(),
                image_url: "https://media.example/998877.jpg".into(),
                href: "https://www.carousell.sg/p/998877".into(),
            }]
        );
    }

    #[test]
    fn drifted_class_names_fall_back_to_text_locators() {
        let card = r#"
            <div data-testid="listing-card-123">
              <a class="D_zz">
                <img class="new-thumb" src="https://media.example/123.jpg">
                <p class="D_mb">Brompton M6L</p>
                <p class="D_q1">S$1,900</p>
                <p class="D_q2">5 days ago</p>
                <p class="D_q3">Well used</p>
              </a>
            </div>"#;
        let extractor = CardExtractor::new().unwrap();
        let listing = extractor.extract_page(&page(&[card]), 48).listings.remove(0);
        assert_eq!(listing.title, "Brompton M6L");
        assert_eq!(listing.price, "S$1,900");
        assert_eq!(listing.posted_time, "5 days ago");
        assert_eq!(listing.condition, "Well used");
        assert_eq!(listing.image_url, "https://media.example/123.jpg");
        assert_eq!(listing.seller_name, NOT_FOUND);
    }

    #[test]
    fn bare_card_keeps_id_and_sentinels() {
        let extractor = CardExtractor::new().unwrap();
        let listing = extractor
            .extract_page(&page(&[r#"<div data-testid="listing-card-555"></div>"#]), 48)
            .listings
            .remove(0);
        assert_eq!(listing.id, "555");
        assert_eq!(listing.href, "https://www.carousell.sg/p/555");
        for field in [
            &listing.title,
            &listing.price,
            &listing.seller_name,
            &listing.posted_time,
            &listing.condition,
            &listing.image_url,
        ] {
            assert_eq!(field, NOT_FOUND);
        }
    }

    #[test]
    fn condition_follows_label_priority() {
        let card = r#"<div data-testid="listing-card-7"><p>Heavily used</p><p>Brand new</p></div>"#;
        let extractor = CardExtractor::new().unwrap();
        let listing = extractor.extract_page(&page(&[card]), 48).listings.remove(0);
        assert_eq!(listing.condition, "Brand new");
    }

    #[test]
    fn card_without_usable_id_is_skipped() {
        let cards = [
            r#"<div data-testid="listing-card-"><p class="D_lO">Orphan</p></div>"#,
            IPHONE_CARD,
        ];
        let extractor = CardExtractor::new().unwrap();
        let result = extractor.extract_page(&page(&cards), 48);
        assert_eq!(result.cards_found, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.listings.len(), 1);
        assert_eq!(result.listings[0].id, "998877");
    }

    #[test]
    fn limit_caps_processed_cards() {
        let cards: Vec<String> = (1..=5)
            .map(|i| format!(r#"<div data-testid="listing-card-{i}"></div>"#))
            .collect();
        let refs: Vec<&str> = cards.iter().map(String::as_str).collect();
        let extractor = CardExtractor::new().unwrap();
        let result = extractor.extract_page(&page(&refs), 3);
        assert_eq!(result.cards_found, 5);
        let ids: Vec<_> = result.listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn card_id_errors() {
        let doc = Html::parse_fragment(r#"<div class="c"></div><div class="d" data-testid="listing-card-text-x"></div>"#);
        let c = doc.select(&Selector::parse("div.c").unwrap()).next().unwrap();
        assert_eq!(card_id(c), Err(ExtractError::MissingIdAttribute));
        let d = doc.select(&Selector::parse("div.d").unwrap()).next().unwrap();
        assert_eq!(
            card_id(d),
            Err(ExtractError::InvalidId("listing-card-text-x".into()))
        );
    }
}
