//! Hartford Institute megachurch database.

use std::sync::Arc;
use tracing::info;

use super::http_client::Pacer;
use super::pagination::{Harvest, Paginator};
use super::parsers::parse_megachurch_rows;
use super::PageFetcher;

pub struct MegachurchScraper {
    paginator: Paginator,
    base_url: String,
}

impl MegachurchScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer, base_url: &str) -> Self {
        Self {
            paginator: Paginator::new(fetcher, pacer, 1),
            base_url: base_url.to_string(),
        }
    }

    /// Listing page `n`, sorted by title so page boundaries are stable.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}?sort_order=title%20asc&sf_paged={}", self.base_url, page)
    }

    pub async fn scrape_all(&self) -> Harvest {
        info!("Scraping megachurch list from {}", self.base_url);
        let url_for = |page: u32| self.page_url(page);
        let harvest = self
            .paginator
            .by_page_count(&url_for, &parse_megachurch_rows)
            .await;
        info!(
            "Megachurch scrape: {} churches from {} pages ({} failed)",
            harvest.records.len(),
            harvest.units(),
            harvest.failed()
        );
        harvest
    }
}
