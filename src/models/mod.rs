/// Value stored for any field whose locators all came up empty
pub const NOT_FOUND: &str = "Not found";

/// Canonical listing link, built from the listing id rather than scraped
pub const LISTING_URL_PREFIX: &str = "https://www.carousell.sg/p/";

/// Condition labels in priority order; the first one present in a card wins
pub const CONDITION_LABELS: [&str; 5] = [
    "Brand new",
    "Like new",
    "Lightly used",
    "Well used",
    "Heavily used",
];

/// Column headers of the listing store, in row order
pub const STORE_HEADER: [&str; 8] = [
    "Listing ID",
    "Href",
    "Seller",
    "Time Posted",
    "Product Details",
    "Price",
    "Condition",
    "Image URL",
];

/// One marketplace listing extracted from a rendered card
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub title: String,
    /// Price exactly as displayed, currency symbol included
    pub price: String,
    pub seller_name: String,
    pub posted_time: String,
    pub condition: String,
    pub image_url: String,
    pub href: String,
}

impl Listing {
    pub fn listing_url(id: &str) -> String {
        format!("{LISTING_URL_PREFIX}{id}")
    }

    /// Row in store column order
    pub fn to_row(&self) -> [&str; 8] {
        [
            self.id.as_str(),
            self.href.as_str(),
            self.seller_name.as_str(),
            self.posted_time.as_str(),
            self.title.as_str(),
            self.price.as_str(),
            self.condition.as_str(),
            self.image_url.as_str(),
        ]
    }

    pub fn notification_text(&self) -> String {
        format!(
            "New listing found!\nTitle: {}\nPrice: {}\nCondition: {}\nSeller: {}\nPosted: {}\nLink: {}",
            self.title, self.price, self.condition, self.seller_name, self.posted_time, self.href
        )
    }
}
