//! Statistics page: jurisdictions, annual conferences, districts.
//!
//! The page itself only lists jurisdictions. Conferences and districts come
//! from HTML fragments served by `stats-conferences-ajax` and
//! `stats-districts-ajax`, keyed by the jurisdiction's dropdown id (not the id
//! in its link) or by conference id.

use crate::error::ScrapeResult;
use crate::models::{Conference, Record, Statistics};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::http_client::Pacer;
use super::pagination::{Harvest, PageOutcome};
use super::parsers::{parse_district_stats, parse_link_table, parse_statistics_page};
use super::PageFetcher;

pub struct StatsScraper {
    fetcher: Arc<dyn PageFetcher>,
    pacer: Pacer,
    base_url: Url,
    year: String,
}

impl StatsScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer, base_url: &str, year: &str) -> ScrapeResult<Self> {
        Ok(Self {
            fetcher,
            pacer,
            base_url: Url::parse(base_url)?,
            year: year.to_string(),
        })
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    fn endpoint(&self, path: &str, key: &str, id: &str) -> ScrapeResult<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair(key, id)
            .append_pair("year", &self.year);
        Ok(url)
    }

    async fn link_fragment(&self, url: Url) -> ScrapeResult<Vec<Record>> {
        let body = self.fetcher.get(url.as_str()).await?;
        parse_link_table(&body, &url)
    }

    /// Jurisdictions from the page, then conferences and districts for each
    /// one with a dropdown id. Only the page fetch itself is fatal.
    pub async fn scrape_statistics_page(&self) -> ScrapeResult<Statistics> {
        let page_url = self.base_url.join("/statistics")?;
        info!("Scraping statistics page {}", page_url);
        let body = self.fetcher.get(page_url.as_str()).await?;
        let (jurisdictions, dropdown_ids) = parse_statistics_page(&body, &page_url)?;

        info!("Fetching conferences and districts for {} jurisdictions", jurisdictions.len());
        let mut stats = Statistics {
            jurisdictions,
            ..Default::default()
        };

        for jur in &stats.jurisdictions {
            let name = jur.text("name").unwrap_or_default();
            let Some(jur_id) = dropdown_ids.get(&name) else {
                warn!("No dropdown ID found for {}", name);
                continue;
            };
            info!("  Processing {} (ID: {})", name, jur_id);
            self.pacer.pause().await;

            match self.conferences_for_jurisdiction(jur_id).await {
                Ok(rows) => stats.annual_conferences.extend(rows),
                Err(e) => warn!("Error fetching conferences for jurisdiction {}: {}", jur_id, e),
            }
            match self.districts_for_jurisdiction(jur_id).await {
                Ok(rows) => stats.districts.extend(rows),
                Err(e) => warn!("Error fetching districts for jurisdiction {}: {}", jur_id, e),
            }
        }

        info!(
            "Statistics: {} jurisdictions, {} conferences, {} districts",
            stats.jurisdictions.len(),
            stats.annual_conferences.len(),
            stats.districts.len()
        );
        Ok(stats)
    }

    pub async fn conferences_for_jurisdiction(&self, jur_id: &str) -> ScrapeResult<Vec<Record>> {
        self.link_fragment(self.endpoint("/stats-conferences-ajax", "jur", jur_id)?)
            .await
    }

    pub async fn districts_for_jurisdiction(&self, jur_id: &str) -> ScrapeResult<Vec<Record>> {
        self.link_fragment(self.endpoint("/stats-districts-ajax", "jur", jur_id)?)
            .await
    }

    /// Districts of a conference with their membership statistics.
    pub async fn districts_with_stats(&self, conf: &Conference) -> ScrapeResult<Vec<Record>> {
        let url = self.endpoint("/stats-districts-ajax", "conf", &conf.id)?;
        let body = self.fetcher.get(url.as_str()).await?;
        parse_district_stats(&body, &url, &conf.id, &conf.name, &self.year)
    }

    /// District statistics for every conference that has an id.
    pub async fn scrape_districts_from_conferences(&self, conferences: &[Conference]) -> Harvest {
        let mut harvest = Harvest::default();
        info!(
            "Scraping districts from {} conferences for year {}",
            conferences.len(),
            self.year
        );

        let mut first = true;
        for (i, conf) in conferences.iter().enumerate() {
            if conf.id.is_empty() {
                warn!("  {}/{}: {} - No conference ID found", i + 1, conferences.len(), conf.name);
                continue;
            }
            if !first {
                self.pacer.pause().await;
            }
            first = false;

            info!("  {}/{}: {} (ID: {})", i + 1, conferences.len(), conf.name, conf.id);
            let outcome = PageOutcome::from_result(self.districts_with_stats(conf).await);
            harvest.absorb(&format!("conference {}", conf.id), outcome);
        }

        info!("Total districts found: {}", harvest.records.len());
        harvest
    }
}
