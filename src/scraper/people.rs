//! Clergy listing per annual conference.

use crate::error::ScrapeResult;
use crate::models::{Conference, Record};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::http_client::Pacer;
use super::pagination::{Harvest, PageOutcome, Paginator, query_form};
use super::PageFetcher;

pub struct PeopleScraper {
    fetcher: Arc<dyn PageFetcher>,
    paginator: Paginator,
    pacer: Pacer,
    base_url: String,
}

impl PeopleScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer, base_url: &str) -> Self {
        Self {
            paginator: Paginator::new(fetcher.clone(), pacer, 1),
            fetcher,
            pacer,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Listing URL for one conference, historic clergy included.
    pub fn people_url(&self, conference_id: &str) -> String {
        format!(
            "{}/people?confType=us&lastName=&firstName=&middleName=&gcfaId=&jur=all&conf={}&historic=true",
            self.base_url, conference_id
        )
    }

    pub fn pastor_url(&self, gcfa_id: &str) -> String {
        format!("{}/pastor?pastor={}", self.base_url, gcfa_id)
    }

    /// Everyone listed for one conference, each with a pastor-page `URL`.
    /// The listing page is loaded first so the session carries its cookies
    /// into the POST.
    pub async fn scrape_conference(&self, conference_id: &str) -> ScrapeResult<Vec<Record>> {
        let listing = url::Url::parse(&self.people_url(conference_id))?;
        self.fetcher.get(listing.as_str()).await?;
        let endpoint = format!("{}/people-ajax", self.base_url);

        let mut people = self
            .paginator
            .people_ajax(&endpoint, &query_form(&listing))
            .await?;
        people.retain(|p| p.has_identity(&["GCFAId", "Name"]));
        for person in &mut people {
            let url = person.text("GCFAId").map(|id| self.pastor_url(&id));
            person.insert_opt("URL", url);
        }
        Ok(people)
    }

    /// Every conference in turn, tagged with `ConferenceId`/`ConferenceName`.
    /// A failed conference is logged and skipped.
    pub async fn scrape_all(&self, conferences: &[Conference]) -> Harvest {
        let mut harvest = Harvest::default();
        let between = self.pacer.scaled(2);

        for (i, conf) in conferences.iter().enumerate() {
            if conf.id.is_empty() {
                warn!("Skipping conference {} - no ID found", conf.name);
                continue;
            }
            info!(
                "Processing conference {}/{}: {} (ID: {})",
                i + 1,
                conferences.len(),
                conf.name,
                conf.id
            );

            let outcome = match self.scrape_conference(&conf.id).await {
                Ok(mut people) => {
                    for person in &mut people {
                        person.insert("ConferenceId", conf.id.as_str());
                        person.insert("ConferenceName", conf.name.as_str());
                    }
                    PageOutcome::from_records(people)
                }
                Err(e) => {
                    error!("Error processing conference {}: {}", conf.name, e);
                    PageOutcome::Failed(e.to_string())
                }
            };
            harvest.absorb(&format!("conference {}", conf.id), outcome);

            if i + 1 < conferences.len() {
                between.pause().await;
            }
        }
        harvest
    }
}
