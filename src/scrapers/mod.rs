pub mod browser;
pub mod carousell;
pub mod locator;
pub mod query;
pub mod traits;
pub mod types;
