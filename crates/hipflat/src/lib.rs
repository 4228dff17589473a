pub mod export;
pub mod fetcher;
mod parser;
pub mod scraper;
pub mod types;
pub mod utils;

pub use fetcher::{FetchError, PageFetcher, RenderOptions, ScrapingBee};
pub use parser::{ParseError, parse_detail_page, parse_listing_page, parse_total_pages};
pub use scraper::{HipflatScraper, ScrapeConfig, ScrapeReport};

pub(crate) const SITE_URL: &str = "https://www.hipflat.co.th";
pub const LISTING_URL: &str = "https://www.hipflat.co.th/ja/apartment-for-rent/pattaya";
