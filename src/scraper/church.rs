//! Church detail pages.

use crate::models::{PastorHistory, Record};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::cleaner::query_id;
use super::http_client::Pacer;
use super::parsers::parse_church_page;
use super::PageFetcher;

/// Unique church links out of scraped work histories, sorted, optionally capped.
pub fn church_urls(histories: &[PastorHistory], limit: Option<usize>) -> Vec<String> {
    let unique: BTreeSet<String> = histories
        .iter()
        .flat_map(|p| &p.work_history)
        .filter_map(|entry| entry.get_str("Appointment_URL"))
        .filter(|url| url.contains("church?"))
        .map(str::to_string)
        .collect();

    let take = limit.unwrap_or(usize::MAX);
    unique.into_iter().take(take).collect()
}

pub struct ChurchScraper {
    fetcher: Arc<dyn PageFetcher>,
    pacer: Pacer,
}

impl ChurchScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer) -> Self {
        Self { fetcher, pacer }
    }

    /// One church. A failure still yields a record carrying `Error`.
    pub async fn scrape_church(&self, url: &str) -> Record {
        let parsed = match self.fetcher.get(url).await {
            Ok(body) => parse_church_page(&body, url),
            Err(e) => Err(e),
        };

        parsed.unwrap_or_else(|e| {
            warn!("Error scraping church {}: {}", url, e);
            let mut record = Record::new();
            record.insert_opt("ChurchId", query_id(url, "church"));
            record.insert("URL", url);
            record.insert_opt("ChurchName", None);
            record.insert("Error", e.to_string());
            record
        })
    }

    pub async fn scrape_many(&self, urls: &[String]) -> Vec<Record> {
        let mut out = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            info!("Processing church {}/{}: {}", i + 1, urls.len(), url);
            out.push(self.scrape_church(url).await);
            if i + 1 < urls.len() {
                self.pacer.pause().await;
            }
        }
        out
    }
}
