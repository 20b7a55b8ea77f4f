//! Pipeline orchestrator: one run per CLI command, scraper → storage.
//!
//! Every run shares one HTTP session and one pacer. Unit-level failures are
//! already folded into a [`Harvest`] by the scrapers; what reaches this layer
//! as an error is either a failed initial fetch or a failed write, and is
//! returned with context. Missing input files are logged and end the run
//! without an error.

use crate::config::AppConfig;
use crate::loader::{
    WORK_HISTORY_MAIN_FIELDS, flatten_work_history, load_conferences, load_pastor_urls,
    load_work_history,
};
use crate::models::Record;
use crate::scraper::PageFetcher;
use crate::scraper::church::{ChurchScraper, church_urls};
use crate::scraper::http_client::{HttpClient, Pacer};
use crate::scraper::megachurch::MegachurchScraper;
use crate::scraper::pagination::{Harvest, PageOutcome, Paginator};
use crate::scraper::parsers::MEGACHURCH_COLUMNS;
use crate::scraper::people::PeopleScraper;
use crate::scraper::stats::StatsScraper;
use crate::scraper::work_history::WorkHistoryScraper;
use crate::storage::{csv_sibling, write_csv, write_json};
use crate::utils::fmt_count;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// CSV columns leading a church export.
const CHURCH_MAIN_FIELDS: [&str; 4] = ["ChurchId", "URL", "ChurchName", "QuickFactsYear"];

/// Which conferences a people run covers.
#[derive(Debug, Clone)]
pub enum PeopleScope {
    One(String),
    /// Every conference in this conferences file.
    All(PathBuf),
}

/// Where a church run gets its URLs.
#[derive(Debug, Clone)]
pub enum ChurchSource {
    Url(String),
    /// A work-history JSON export.
    WorkHistory(PathBuf),
}

#[derive(Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub units: usize,
    pub records: usize,
    pub failed: usize,
}

impl PipelineStats {
    fn from_harvest(h: &Harvest) -> Self {
        Self {
            units: h.units(),
            records: h.records.len(),
            failed: h.failed(),
        }
    }

    fn skipped() -> Self {
        Self::default()
    }
}

pub struct Pipeline {
    config: AppConfig,
    fetcher: Arc<dyn PageFetcher>,
    pacer: Pacer,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
        Ok(Self::with_fetcher(config, Arc::new(client)))
    }

    pub fn with_fetcher(config: AppConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        let pacer = Pacer::from_config(&config.scraper);
        Self {
            config,
            fetcher,
            pacer,
        }
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.config.storage.data_dir.join(name)
    }

    // ── Megachurches ──────────────────────────────────────────────────────────

    pub async fn run_megachurches(&self, output: Option<PathBuf>) -> Result<PipelineStats> {
        let output = output.unwrap_or_else(|| self.data_path("megachurches.csv"));
        let scraper = MegachurchScraper::new(
            self.fetcher.clone(),
            self.pacer,
            &self.config.scraper.megachurch_url,
        );

        let harvest = scraper.scrape_all().await;
        if harvest.records.is_empty() {
            warn!("No churches were scraped");
        } else {
            write_csv(&output, &harvest.records, &MEGACHURCH_COLUMNS)
                .with_context(|| format!("Failed to write {:?}", output))?;
        }
        log_failures(&harvest);
        Ok(PipelineStats::from_harvest(&harvest))
    }

    // ── People ────────────────────────────────────────────────────────────────

    pub async fn run_people(&self, scope: PeopleScope, output_dir: Option<PathBuf>) -> Result<PipelineStats> {
        let output_dir = output_dir.unwrap_or_else(|| self.config.storage.data_dir.clone());
        let scraper = PeopleScraper::new(
            self.fetcher.clone(),
            self.pacer,
            &self.config.scraper.umdata_base_url,
        );

        let (stem, harvest) = match scope {
            PeopleScope::One(conf_id) => {
                info!("Scraping people for conference {}", conf_id);
                let result = scraper.scrape_conference(&conf_id).await;
                if let Err(e) = &result {
                    error!("Error scraping conference {}: {}", conf_id, e);
                }
                let mut harvest = Harvest::default();
                harvest.absorb(&format!("conference {}", conf_id), PageOutcome::from_result(result));
                (format!("umdata_people_{}", conf_id), harvest)
            }
            PeopleScope::All(conferences_file) => {
                if !conferences_file.exists() {
                    warn!(
                        "{} not found. Run the stats command first to create the conferences file.",
                        conferences_file.display()
                    );
                    return Ok(PipelineStats::skipped());
                }
                let conferences = load_conferences(&conferences_file)?;
                info!("Found {} conferences to scrape", conferences.len());
                ("umdata_people_all".to_string(), scraper.scrape_all(&conferences).await)
            }
        };

        if harvest.records.is_empty() {
            warn!("No records were scraped");
        } else {
            self.save_both(&output_dir.join(format!("{}.json", stem)), &harvest.records, &[])?;
            info!("Total records scraped: {}", fmt_count(harvest.records.len()));
        }
        log_failures(&harvest);
        Ok(PipelineStats::from_harvest(&harvest))
    }

    // ── Work history ──────────────────────────────────────────────────────────

    pub async fn run_work_history(
        &self,
        input: &Path,
        output: &Path,
        limit: Option<usize>,
        csv: bool,
    ) -> Result<PipelineStats> {
        if !input.exists() {
            warn!("Input file {} not found", input.display());
            return Ok(PipelineStats::skipped());
        }
        if let Some(n) = limit {
            info!("Limited to {} records", n);
        }

        let urls = load_pastor_urls(input, limit)?;
        let scraper = WorkHistoryScraper::new(self.fetcher.clone(), self.pacer);
        let histories = scraper.scrape_many(&urls).await;

        write_json(output, &histories).with_context(|| format!("Failed to write {:?}", output))?;
        if csv {
            let rows = flatten_work_history(&histories);
            let path = csv_sibling(output);
            write_csv(&path, &rows, &WORK_HISTORY_MAIN_FIELDS)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }

        let failed = histories.iter().filter(|h| h.error.is_some()).count();
        let entries: usize = histories.iter().map(|h| h.work_history.len()).sum();
        info!(
            "Scraped {} pastors, {} work history entries, {} errors",
            histories.len(),
            fmt_count(entries),
            failed
        );
        Ok(PipelineStats {
            units: histories.len(),
            records: entries,
            failed,
        })
    }

    // ── Churches ──────────────────────────────────────────────────────────────

    pub async fn run_churches(
        &self,
        source: ChurchSource,
        output: Option<PathBuf>,
        limit: Option<usize>,
        csv: bool,
    ) -> Result<PipelineStats> {
        let urls = match source {
            ChurchSource::Url(url) => vec![url],
            ChurchSource::WorkHistory(path) => {
                if !path.exists() {
                    warn!("Input file {} not found", path.display());
                    return Ok(PipelineStats::skipped());
                }
                let histories = load_work_history(&path)?;
                let urls = church_urls(&histories, limit);
                info!("Found {} unique church URLs to scrape", urls.len());
                urls
            }
        };

        let scraper = ChurchScraper::new(self.fetcher.clone(), self.pacer);
        let churches = scraper.scrape_many(&urls).await;
        let failed = churches.iter().filter(|c| c.contains_key("Error")).count();

        let output = output.unwrap_or_else(|| self.data_path("churches.json"));
        if csv {
            self.save_both(&output, &churches, &CHURCH_MAIN_FIELDS)?;
        } else {
            write_json(&output, &churches).with_context(|| format!("Failed to write {:?}", output))?;
        }

        info!("Scraped {} churches, {} errors", churches.len(), failed);
        Ok(PipelineStats {
            units: urls.len(),
            records: churches.len() - failed,
            failed,
        })
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    /// Statistics page once, sections saved once, then district statistics
    /// for every conference in `conferences_file`.
    pub async fn run_stats(
        &self,
        year: Option<String>,
        output_dir: Option<PathBuf>,
        conferences_file: Option<PathBuf>,
    ) -> Result<PipelineStats> {
        let output_dir = output_dir.unwrap_or_else(|| self.config.storage.data_dir.clone());
        let year = year.unwrap_or_else(|| self.config.scraper.stats_year.clone());
        let scraper = StatsScraper::new(
            self.fetcher.clone(),
            self.pacer,
            &self.config.scraper.umdata_base_url,
            &year,
        )?;

        info!("Scraping statistics page for year {}...", year);
        let stats = scraper
            .scrape_statistics_page()
            .await
            .context("Failed to scrape statistics page")?;

        write_json(&output_dir.join("statistics_all.json"), &stats)?;
        for (section, rows) in stats.sections() {
            write_json(&output_dir.join(format!("{}.json", section)), rows)?;
            info!("Saved {} records to {}.json", rows.len(), section);
        }

        let conferences_file = conferences_file.unwrap_or_else(|| output_dir.join("conferences.json"));
        if !conferences_file.exists() {
            warn!(
                "{} not found. Skipping district scraping.",
                conferences_file.display()
            );
            return Ok(PipelineStats {
                units: 1,
                records: stats.jurisdictions.len(),
                failed: 0,
            });
        }

        let conferences = load_conferences(&conferences_file)?;
        let harvest = scraper.scrape_districts_from_conferences(&conferences).await;
        if harvest.records.is_empty() {
            warn!("No districts were found");
        } else {
            let path = output_dir.join(format!("districts_{}.json", scraper.year()));
            write_json(&path, &harvest.records).with_context(|| format!("Failed to write {:?}", path))?;
        }
        log_failures(&harvest);
        Ok(PipelineStats::from_harvest(&harvest))
    }

    // ── Generic listing ───────────────────────────────────────────────────────

    pub async fn run_table(&self, url: &str, max_pages: Option<u32>, output: Option<PathBuf>) -> Result<PipelineStats> {
        let paginator = Paginator::new(self.fetcher.clone(), self.pacer, self.config.scraper.page_size);
        let harvest = paginator
            .listing(url, max_pages)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if harvest.records.is_empty() {
            warn!("No records extracted from {}", url);
        } else {
            let output = output.unwrap_or_else(|| self.data_path("table.json"));
            self.save_both(&output, &harvest.records, &[])?;
        }
        log_failures(&harvest);
        Ok(PipelineStats::from_harvest(&harvest))
    }

    /// `json_path` plus its CSV sibling.
    fn save_both(&self, json_path: &Path, records: &[Record], preferred: &[&str]) -> Result<()> {
        write_json(json_path, records).with_context(|| format!("Failed to write {:?}", json_path))?;
        let csv_path = csv_sibling(json_path);
        write_csv(&csv_path, records, preferred)
            .with_context(|| format!("Failed to write {:?}", csv_path))?;
        Ok(())
    }
}

fn log_failures(harvest: &Harvest) {
    if harvest.failures.is_empty() {
        return;
    }
    warn!("{} units failed and were skipped:", harvest.failed());
    for failure in &harvest.failures {
        warn!("  {}", failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::scraper::fake::FakeSite;
    use crate::storage::{read_csv, read_json};
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use tokio_test::assert_ok;

    fn pipeline(site: Arc<FakeSite>, dir: &TempDir) -> Pipeline {
        let mut config = AppConfig {
            storage: StorageConfig {
                data_dir: dir.path().to_path_buf(),
            },
            ..Default::default()
        };
        config.scraper.request_delay_ms = 0;
        config.scraper.umdata_base_url = "https://www.umdata.org".into();
        Pipeline::with_fetcher(config, site)
    }

    const PASTOR_PAGE: &str = r#"<h1>Ann Lee</h1><table>
        <thead><tr><th>Dates</th><th>Appointment</th></tr></thead>
        <tbody><tr><td>7/1/2018 -Present</td><td><a href="/church?church=5">Grace</a></td></tr>
               <tr><td>1/1/2010 - 6/30/2018</td><td><a href="/church?church=3">First</a></td></tr></tbody>
        </table>"#;

    #[tokio::test]
    async fn test_work_history_json_and_csv() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("people.json");
        write_json(
            &input,
            &json!([
                {"Name": "Ann", "URL": "https://www.umdata.org/pastor?pastor=1"},
                {"Name": "Bo", "URL": "https://www.umdata.org/pastor?pastor=2"}
            ]),
        )
        .unwrap();

        let site = Arc::new(FakeSite::new(|req| {
            req.url.ends_with("pastor=1").then(|| PASTOR_PAGE.to_string())
        }));
        let output = dir.path().join("out/work_history.json");
        let stats = pipeline(site, &dir)
            .run_work_history(&input, &output, None, true)
            .await
            .unwrap();

        assert_eq!(stats, PipelineStats { units: 2, records: 2, failed: 1 });

        let saved: Vec<Value> = read_json(&output).unwrap();
        assert_eq!(saved[0]["Name"], "Ann Lee");
        assert!(saved[1]["Error"].is_string());

        let rows = read_csv(&dir.path().join("out/work_history.csv")).unwrap();
        assert_eq!(rows.len(), 3);
        let header: Vec<&String> = rows[0].keys().take(3).collect();
        assert_eq!(header, ["GCFAId", "PastorURL", "Name"]);
        assert_eq!(rows[1].get_str("EndDate"), Some("2018-06-30"));
        assert_eq!(rows[2].get_str("GCFAId"), Some("2"));
    }

    #[tokio::test]
    async fn test_missing_input_is_not_an_error() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|_| None));
        let p = pipeline(site.clone(), &dir);

        let stats = p
            .run_work_history(&dir.path().join("none.json"), &dir.path().join("o.json"), None, false)
            .await
            .unwrap();
        assert_eq!(stats, PipelineStats::default());

        let stats = p
            .run_churches(ChurchSource::WorkHistory(dir.path().join("none.json")), None, None, false)
            .await
            .unwrap();
        assert_eq!(stats, PipelineStats::default());
        assert!(site.requests().is_empty());
    }

    #[tokio::test]
    async fn test_churches_from_work_history() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("wh.json");
        write_json(
            &input,
            &json!([{
                "GCFAId": "1", "URL": "u", "Name": "Ann",
                "WorkHistory": [
                    {"Appointment_URL": "https://www.umdata.org/church?church=5"},
                    {"Appointment_URL": "https://www.umdata.org/church?church=3"},
                    {"Appointment_URL": "https://www.umdata.org/church?church=5"}
                ]
            }]),
        )
        .unwrap();

        let site = Arc::new(FakeSite::new(|req| {
            req.url.ends_with("church=3").then(|| "<h1>First UMC</h1>".to_string())
        }));
        let stats = pipeline(site.clone(), &dir)
            .run_churches(ChurchSource::WorkHistory(input), None, None, true)
            .await
            .unwrap();

        assert_eq!(stats, PipelineStats { units: 2, records: 1, failed: 1 });
        assert_eq!(
            site.urls(),
            [
                "https://www.umdata.org/church?church=3",
                "https://www.umdata.org/church?church=5"
            ]
        );
        let rows = read_csv(&dir.path().join("churches.csv")).unwrap();
        assert_eq!(rows[0].get_str("ChurchName"), Some("First UMC"));
        let header: Vec<&String> = rows[0].keys().take(4).collect();
        assert_eq!(header, CHURCH_MAIN_FIELDS);
    }

    #[tokio::test]
    async fn test_people_single_conference_files() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|req| match req.method {
            "POST" => Some("[{&quot;GCFAId&quot;:&quot;9&quot;}]".to_string()),
            _ => Some("<html></html>".to_string()),
        }));
        let stats = pipeline(site, &dir)
            .run_people(PeopleScope::One("42".into()), None)
            .await
            .unwrap();

        assert_eq!(stats.records, 1);
        let saved: Vec<Record> = read_json(&dir.path().join("umdata_people_42.json")).unwrap();
        assert_eq!(saved[0].get_str("URL"), Some("https://www.umdata.org/pastor?pastor=9"));
        assert!(dir.path().join("umdata_people_42.csv").exists());
    }

    #[tokio::test]
    async fn test_people_single_conference_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|req| {
            (req.method == "GET").then(|| "<html></html>".to_string())
        }));
        let stats = assert_ok!(
            pipeline(site, &dir)
                .run_people(PeopleScope::One("42".into()), None)
                .await
        );

        assert_eq!(stats, PipelineStats { units: 1, records: 0, failed: 1 });
        assert!(!dir.path().join("umdata_people_42.json").exists());
        assert!(!dir.path().join("umdata_people_42.csv").exists());
    }

    #[tokio::test]
    async fn test_people_all_without_conferences_file() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|_| None));
        let stats = pipeline(site, &dir)
            .run_people(PeopleScope::All(dir.path().join("conferences.json")), None)
            .await
            .unwrap();
        assert_eq!(stats, PipelineStats::default());
    }

    #[tokio::test]
    async fn test_stats_writes_sections_and_skips_districts() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|req| {
            req.url.ends_with("/statistics").then(|| {
                r#"<div><h2>Jurisdictions</h2><table>
                    <tr><td><a href="/jurisdiction?jur=1">Western</a></td></tr></table></div>"#
                    .to_string()
            })
        }));
        let stats = pipeline(site.clone(), &dir)
            .run_stats(Some("2022".into()), None, None)
            .await
            .unwrap();

        assert_eq!(stats.records, 1);
        assert_eq!(site.requests().len(), 1);
        for name in ["statistics_all", "jurisdictions", "annual_conferences", "districts"] {
            assert!(dir.path().join(format!("{}.json", name)).exists(), "{}", name);
        }
        assert!(!dir.path().join("districts_2022.json").exists());
    }

    #[tokio::test]
    async fn test_table_listing_writes_both() {
        let dir = tempdir().unwrap();
        let site = Arc::new(FakeSite::new(|_| {
            Some("<table><tr><th>Name</th></tr><tr><td>A</td></tr><tr><td>B</td></tr></table>".to_string())
        }));
        let output = dir.path().join("listing.json");
        let stats = pipeline(site, &dir)
            .run_table("https://example.org/clergy", None, Some(output.clone()))
            .await
            .unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(read_csv(&dir.path().join("listing.csv")).unwrap().len(), 2);
    }
}
