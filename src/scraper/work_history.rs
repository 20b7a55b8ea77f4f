//! Pastor pages: name plus appointment history.

use crate::models::PastorHistory;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::cleaner::query_id;
use super::http_client::Pacer;
use super::parsers::parse_pastor_page;
use super::PageFetcher;

pub struct WorkHistoryScraper {
    fetcher: Arc<dyn PageFetcher>,
    pacer: Pacer,
}

impl WorkHistoryScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer) -> Self {
        Self { fetcher, pacer }
    }

    /// One pastor. Failures land in `Error` instead of propagating.
    pub async fn scrape_pastor(&self, url: &str) -> PastorHistory {
        let mut history = PastorHistory {
            gcfa_id: query_id(url, "pastor"),
            url: url.to_string(),
            ..Default::default()
        };

        let parsed = match self.fetcher.get(url).await {
            Ok(body) => Url::parse(url)
                .map_err(Into::into)
                .and_then(|base| parse_pastor_page(&body, &base)),
            Err(e) => Err(e),
        };

        match parsed {
            Ok((name, entries)) => {
                history.name = name;
                history.work_history = entries;
            }
            Err(e) if e.is_transport() => {
                warn!("Error fetching {}: {}", url, e);
                history.error = Some(e.to_string());
            }
            Err(e) => {
                warn!("Error parsing {}: {}", url, e);
                history.error = Some(e.to_string());
            }
        }
        history
    }

    /// Pastors in order, pausing between requests.
    pub async fn scrape_many(&self, urls: &[String]) -> Vec<PastorHistory> {
        let mut out = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            info!("Processing {}/{}: {}", i + 1, urls.len(), url);
            let history = self.scrape_pastor(url).await;
            info!(
                "  {} entries for {}",
                history.work_history.len(),
                history.name.as_deref().unwrap_or("unknown")
            );
            out.push(history);

            if i + 1 < urls.len() {
                self.pacer.pause().await;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::fake::FakeSite;

    const PASTOR_PAGE: &str = r#"<html><body>
        <h1>  Jane
              Q. Doe </h1>
        <table>
          <thead><tr><th>Dates</th><th>Appointment</th><th>View Charts</th></tr></thead>
          <tbody>
            <tr><td>7/1/2018 -Present</td>
                <td><a href="/church?church=950642">Grace UMC</a></td>
                <td><a href="/charts?church=950642">View</a></td></tr>
            <tr><td>1/1/2015 - 6/30/2018</td><td>First UMC</td><td></td></tr>
          </tbody>
        </table></body></html>"#;

    fn site() -> Arc<FakeSite> {
        Arc::new(FakeSite::new(|req| {
            req.url.ends_with("pastor=0124740").then(|| PASTOR_PAGE.to_string())
        }))
    }

    #[tokio::test]
    async fn test_scrape_pastor() {
        let scraper = WorkHistoryScraper::new(site(), Pacer::none());
        let p = scraper
            .scrape_pastor("https://www.umdata.org/pastor?pastor=0124740")
            .await;

        assert_eq!(p.gcfa_id.as_deref(), Some("0124740"));
        assert_eq!(p.name.as_deref(), Some("Jane Q. Doe"));
        assert!(p.error.is_none());
        assert_eq!(p.work_history.len(), 2);

        let current = &p.work_history[0];
        assert_eq!(current.get_str("StartDate"), Some("2018-07-01"));
        assert_eq!(current.get("EndDate"), Some(&serde_json::Value::Null));
        assert_eq!(
            current.get_str("Appointment_URL"),
            Some("https://www.umdata.org/church?church=950642")
        );
        assert!(current.get("View Charts").is_none());
        assert!(current.contains_key("View Charts_URL"));
        assert_eq!(p.work_history[1].get_str("EndDate"), Some("2018-06-30"));
    }

    #[tokio::test]
    async fn test_failed_pastor_keeps_error() {
        let scraper = WorkHistoryScraper::new(site(), Pacer::none());
        let all = scraper
            .scrape_many(&[
                "https://www.umdata.org/pastor?pastor=999".to_string(),
                "https://www.umdata.org/pastor?pastor=0124740".to_string(),
            ])
            .await;

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].gcfa_id.as_deref(), Some("999"));
        assert!(all[0].error.as_deref().unwrap().contains("404"));
        assert!(all[0].work_history.is_empty());
        assert!(all[1].error.is_none());
    }
}
