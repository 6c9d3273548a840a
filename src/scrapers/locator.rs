//! Ordered fallback locators for fields inside a rendered listing card.
//!
//! The site's presentation class names drift between releases, so each
//! field is found through a chain of independent strategies tried in
//! priority order. The first strategy producing non-empty text wins.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Selector};

/// One way of finding a field within a card
#[derive(Debug)]
pub enum Locator {
    /// Text of the first matching element with non-empty text
    Text(Selector),
    /// Text of the first matching element whose text contains `needle`
    TextContaining { selector: Selector, needle: String },
    /// Attribute of the first matching element that carries it
    Attr { selector: Selector, attr: String },
    /// `label` itself, if it appears anywhere in the card's text
    Label(String),
}

impl Locator {
    pub fn text(css: &str) -> Result<Self> {
        Ok(Locator::Text(parse_selector(css)?))
    }

    pub fn text_containing(css: &str, needle: &str) -> Result<Self> {
        Ok(Locator::TextContaining {
            selector: parse_selector(css)?,
            needle: needle.to_string(),
        })
    }

    pub fn attr(css: &str, attr: &str) -> Result<Self> {
        Ok(Locator::Attr {
            selector: parse_selector(css)?,
            attr: attr.to_string(),
        })
    }

    pub fn label(label: &str) -> Self {
        Locator::Label(label.to_string())
    }

    pub fn locate(&self, card: ElementRef<'_>) -> Option<String> {
        match self {
            Locator::Text(selector) => card
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty()),
            Locator::TextContaining { selector, needle } => card
                .select(selector)
                .map(element_text)
                .find(|text| text.contains(needle.as_str())),
            Locator::Attr { selector, attr } => card
                .select(selector)
                .filter_map(|el| el.value().attr(attr))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty()),
            Locator::Label(label) => {
                let text = card.text().collect::<String>();
                text.contains(label.as_str()).then(|| label.clone())
            }
        }
    }
}

/// Named, ordered list of locators for a single field
#[derive(Debug)]
pub struct LocatorChain {
    field: &'static str,
    locators: Vec<Locator>,
}

impl LocatorChain {
    pub fn new(field: &'static str, locators: Vec<Locator>) -> Self {
        Self { field, locators }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// First hit along with the index of the locator that produced it
    pub fn locate(&self, card: ElementRef<'_>) -> Option<(usize, String)> {
        self.locators
            .iter()
            .enumerate()
            .find_map(|(tier, locator)| locator.locate(card).map(|value| (tier, value)))
    }
}

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector `{css}`: {e:?}"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
