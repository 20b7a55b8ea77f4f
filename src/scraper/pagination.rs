//! Pagination driver.
//!
//! Decides how a listing is paged and walks it until exhaustion:
//!
//! 1. **Page count**: "Page N of M" text (with widget/link fallbacks), then
//!    pages `1..=M`.
//! 2. **DataTables offset**: an `ajax: { url: ... }` endpoint found in inline
//!    script, walked with `draw`/`start`/`length` until `recordsTotal`.
//! 3. **Next link**: follow the "next" anchor until there is none.
//!
//! The people listing is a special case: one POST returns every row as an
//! HTML-entity-encoded JSON array.
//!
//! Every unit of work (page, offset window) ends up as a [`PageOutcome`] and
//! is folded into a [`Harvest`], so callers can report what was skipped.

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::Record;
use html_escape::decode_html_entities;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

use super::cleaner::resolve_url;
use super::http_client::Pacer;
use super::parsers::{TableExtractor, element_text, json_row_to_record, selector};
use super::PageFetcher;

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Result of one unit of work.
#[derive(Debug)]
pub enum PageOutcome {
    Records(Vec<Record>),
    Empty,
    Failed(String),
}

impl PageOutcome {
    pub fn from_records(records: Vec<Record>) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Records(records)
        }
    }

    pub fn from_result(result: ScrapeResult<Vec<Record>>) -> Self {
        match result {
            Ok(records) => Self::from_records(records),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Records gathered by a driver plus a tally of how each unit went.
#[derive(Debug, Default)]
pub struct Harvest {
    pub records: Vec<Record>,
    pub units_ok: usize,
    pub units_empty: usize,
    pub failures: Vec<String>,
}

impl Harvest {
    /// Fold one unit's outcome in; returns how many records it added.
    pub fn absorb(&mut self, unit: &str, outcome: PageOutcome) -> usize {
        match outcome {
            PageOutcome::Records(records) => {
                let n = records.len();
                info!("  {}: {} records", unit, n);
                self.units_ok += 1;
                self.records.extend(records);
                n
            }
            PageOutcome::Empty => {
                info!("  {}: no records", unit);
                self.units_empty += 1;
                0
            }
            PageOutcome::Failed(msg) => {
                warn!("  {}: {}", unit, msg);
                self.failures.push(format!("{}: {}", unit, msg));
                0
            }
        }
    }

    pub fn units(&self) -> usize {
        self.units_ok + self.units_empty + self.failures.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// ── Sniffing ──────────────────────────────────────────────────────────────────

static PAGE_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Page\s+\d+\s+of\s+(\d+)").unwrap());

static AJAX_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"ajax:\s*\{\s*url:\s*["']([^"']+)["']"#).unwrap());

static NEXT_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(next\b.*|»|>|›)\s*$").unwrap());

/// M from "Page N of M" anywhere in `text`.
pub fn page_count_in_text(text: &str) -> Option<u32> {
    PAGE_OF.captures(text)?[1].parse().ok()
}

/// Page count from the parsed document: body text, then the pagination
/// widget, then the highest numbered `a.page-numbers` link.
pub fn page_count_in_document(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);

    let body_text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    if let Some(n) = page_count_in_text(&body_text) {
        return Some(n);
    }

    if let Ok(sel) = selector("div.pagination") {
        if let Some(n) = doc
            .select(&sel)
            .find_map(|widget| page_count_in_text(&element_text(widget)))
        {
            return Some(n);
        }
    }

    let sel = selector("a.page-numbers").ok()?;
    doc.select(&sel)
        .filter_map(|a| element_text(a).parse::<u32>().ok())
        .max()
}

/// Total pages of a listing: raw text, then the parsed document, then 1.
pub fn detect_page_count(html: &str) -> u32 {
    if let Some(n) = page_count_in_text(html) {
        debug!("page count {} from raw text", n);
        return n;
    }
    if let Some(n) = page_count_in_document(html) {
        debug!("page count {} from document", n);
        return n;
    }
    warn!("Could not determine total pages, defaulting to 1");
    1
}

/// The `ajax: { url: '...' }` literal of a DataTables init script.
pub fn ajax_url_in_script(script: &str) -> Option<String> {
    if !script.contains("DataTable") {
        return None;
    }
    AJAX_URL.captures(script).map(|c| c[1].to_string())
}

/// First DataTables AJAX endpoint declared by any inline `<script>`.
pub fn detect_ajax_url(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("script").ok()?;
    doc.select(&sel)
        .find_map(|s| ajax_url_in_script(&s.text().collect::<String>()))
}

/// Href of the "next page" control, made absolute.
///
/// A DataTables pager decides alone (a disabled next button ends paging);
/// otherwise any anchor labelled Next, » or > is taken.
pub fn find_next_link(html: &str, base: &Url) -> Option<String> {
    let doc = Html::parse_document(html);

    let pager_sel = selector("div.dataTables_paginate").ok()?;
    let next_sel = selector("a.paginate_button.next").ok()?;
    if let Some(pager) = doc.select(&pager_sel).next() {
        let next = pager.select(&next_sel).next()?;
        if next.value().classes().any(|c| c == "disabled") {
            return None;
        }
        return next.value().attr("href").map(|h| resolve_url(base, h));
    }

    let a_sel = selector("a[href]").ok()?;
    doc.select(&a_sel)
        .filter(|a| !a.value().classes().any(|c| c == "disabled"))
        .find(|a| NEXT_TEXT.is_match(&element_text(*a)))
        .and_then(|a| a.value().attr("href"))
        .map(|h| resolve_url(base, h))
}

// ── Strategy selection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// One POST of the listing's query to `<site>/people-ajax`.
    PeopleAjax {
        endpoint: String,
        form: Vec<(String, String)>,
    },
    /// DataTables server-side endpoint.
    DataTables { endpoint: String },
    NextLink,
}

fn is_people_listing(url: &Url) -> bool {
    url.path().trim_end_matches('/').ends_with("/people")
}

/// Query pairs of `url`, first value per key, blanks dropped.
pub fn query_form(url: &Url) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = Vec::new();
    for (k, v) in url.query_pairs() {
        if v.is_empty() || form.iter().any(|(seen, _)| *seen == k) {
            continue;
        }
        form.push((k.into_owned(), v.into_owned()));
    }
    form
}

/// People listing first, then a DataTables endpoint, then next links.
pub fn select_strategy(page_url: &Url, html: &str) -> Strategy {
    if is_people_listing(page_url) {
        return Strategy::PeopleAjax {
            endpoint: resolve_url(page_url, "/people-ajax"),
            form: query_form(page_url),
        };
    }
    if let Some(ajax) = detect_ajax_url(html) {
        return Strategy::DataTables {
            endpoint: resolve_url(page_url, &ajax),
        };
    }
    Strategy::NextLink
}

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DataTablesPage {
    #[serde(rename = "recordsTotal", default)]
    records_total: Value,
    data: Option<Vec<Value>>,
}

/// `recordsTotal` arrives as a number or a numeric string.
fn as_count(v: &Value) -> usize {
    match v {
        Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Decode the people endpoint's body: HTML entities first, then a JSON array.
/// Non-object entries are dropped; a non-array payload yields nothing.
pub fn decode_people_payload(body: &str) -> ScrapeResult<Vec<Record>> {
    let decoded = decode_html_entities(body);
    match serde_json::from_str::<Value>(&decoded)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(Record::from(map)),
                _ => None,
            })
            .collect()),
        other => {
            warn!("Unexpected people payload: {}", json_kind(&other));
            Ok(Vec::new())
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn with_query(endpoint: &str, params: &[(&str, String)]) -> ScrapeResult<String> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url.to_string())
}

/// Listing page parse: table rows plus the next-page link.
pub fn parse_listing_page(html: &str, page_url: &Url) -> ScrapeResult<(Vec<Record>, Option<String>)> {
    let records = TableExtractor::new(page_url.clone())
        .extract_first(html)?
        .unwrap_or_else(|| {
            warn!("No table found on {}", page_url);
            Vec::new()
        });
    Ok((records, find_next_link(html, page_url)))
}

// ── Driver ────────────────────────────────────────────────────────────────────

type PageParser<'p> = &'p (dyn Fn(&str, &Url) -> ScrapeResult<Vec<Record>> + Sync);

pub struct Paginator {
    fetcher: Arc<dyn PageFetcher>,
    pacer: Pacer,
    page_size: usize,
}

impl Paginator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, pacer: Pacer, page_size: usize) -> Self {
        Self {
            fetcher,
            pacer,
            page_size: page_size.max(1),
        }
    }

    /// Walk pages `1..=M`, where M comes from the first page's text.
    ///
    /// The first page's body is reused for page 1. An empty page ends the
    /// walk; a failed page is recorded and the walk goes on.
    pub async fn by_page_count(&self, url_for: &(dyn Fn(u32) -> String + Sync), parse: PageParser<'_>) -> Harvest {
        let mut harvest = Harvest::default();

        let first_url = url_for(1);
        let first = self.fetcher.get(&first_url).await;
        let total = match &first {
            Ok(body) => detect_page_count(body),
            Err(e) => {
                warn!("Error getting total pages: {}", e);
                1
            }
        };
        info!("Found {} pages to scrape", total);

        let mut first = Some(first);
        for page in 1..=total {
            let url = url_for(page);
            let body = match first.take() {
                Some(body) => body,
                None => self.fetcher.get(&url).await,
            };
            let outcome = match body {
                Ok(body) => PageOutcome::from_result(
                    Url::parse(&url)
                        .map_err(ScrapeError::from)
                        .and_then(|base| parse(&body, &base)),
                ),
                Err(e) => PageOutcome::Failed(e.to_string()),
            };

            let exhausted = matches!(outcome, PageOutcome::Empty);
            harvest.absorb(&format!("page {}/{}", page, total), outcome);
            if exhausted {
                info!("Page {} returned no rows, stopping", page);
                break;
            }
            if page < total {
                self.pacer.pause().await;
            }
        }
        harvest
    }

    /// Walk a DataTables endpoint in windows of `page_size`.
    ///
    /// Stops once `start + returned >= recordsTotal`, on an empty window, on a
    /// response without `data`, or on the first failure. A window starting at
    /// or past `recordsTotal` is never requested.
    pub async fn by_offset(&self, endpoint: &str) -> Harvest {
        let mut harvest = Harvest::default();
        let mut start = 0usize;
        let mut draw = 1u32;

        info!("Scraping data via AJAX endpoint: {}", endpoint);
        loop {
            let unit = format!("records {}..{}", start, start + self.page_size);
            let page = match self.fetch_window(endpoint, draw, start).await {
                Ok(page) => page,
                Err(e) => {
                    harvest.absorb(&unit, PageOutcome::Failed(e.to_string()));
                    break;
                }
            };

            let total = as_count(&page.records_total);
            let Some(rows) = page.data else {
                warn!("No data found in response");
                harvest.absorb(&unit, PageOutcome::Empty);
                break;
            };
            let returned = rows.len();
            let records = rows.into_iter().filter_map(json_row_to_record).collect();
            harvest.absorb(&unit, PageOutcome::from_records(records));
            debug!("window at {}: {} rows (total {})", start, returned, total);

            if returned == 0 || start + returned >= total {
                break;
            }
            start += self.page_size;
            draw += 1;
            if start >= total {
                break;
            }
            self.pacer.pause().await;
        }
        harvest
    }

    async fn fetch_window(&self, endpoint: &str, draw: u32, start: usize) -> ScrapeResult<DataTablesPage> {
        let url = with_query(
            endpoint,
            &[
                ("draw", draw.to_string()),
                ("start", start.to_string()),
                ("length", self.page_size.to_string()),
            ],
        )?;
        let body = self.fetcher.get(&url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Follow next links from `start_url`. `first_body` saves refetching a
    /// page the caller already holds.
    pub async fn by_next_link(&self, start_url: &str, first_body: Option<String>, max_pages: Option<u32>) -> Harvest {
        let mut harvest = Harvest::default();
        let mut url = start_url.to_string();
        let mut pending = first_body;
        let mut page = 1u32;

        info!("Scraping data via HTML pagination...");
        loop {
            let body = match pending.take() {
                Some(body) => Ok(body),
                None => self.fetcher.get(&url).await,
            };
            let parsed = body.and_then(|body| {
                let base = Url::parse(&url)?;
                parse_listing_page(&body, &base)
            });
            let (records, next) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    harvest.absorb(&format!("page {}", page), PageOutcome::Failed(e.to_string()));
                    break;
                }
            };
            harvest.absorb(&format!("page {}", page), PageOutcome::from_records(records));

            let Some(next) = next else {
                info!("No more pages found");
                break;
            };
            if next == url {
                warn!("Next link points back at {}, stopping", url);
                break;
            }
            if max_pages.is_some_and(|max| page >= max) {
                info!("Reached page limit ({}), stopping", page);
                break;
            }
            url = next;
            page += 1;
            self.pacer.pause().await;
        }
        harvest
    }

    /// The people endpoint: everything in one POST.
    pub async fn people_ajax(&self, endpoint: &str, form: &[(String, String)]) -> ScrapeResult<Vec<Record>> {
        info!("Fetching data from {}...", endpoint);
        let body = self.fetcher.post_form(endpoint, form).await?;
        let records = decode_people_payload(&body)?;
        info!("Retrieved {} records", records.len());
        Ok(records)
    }

    /// Fetch `url`, pick a strategy from what it contains, and walk it.
    /// Only the initial fetch is fatal.
    pub async fn listing(&self, url: &str, max_pages: Option<u32>) -> ScrapeResult<Harvest> {
        let page_url = Url::parse(url)?;
        let body = self.fetcher.get(url).await?;

        match select_strategy(&page_url, &body) {
            Strategy::PeopleAjax { endpoint, form } => {
                info!("Detected people endpoint, using: {}", endpoint);
                let records = self.people_ajax(&endpoint, &form).await?;
                let mut harvest = Harvest::default();
                harvest.absorb("people-ajax", PageOutcome::from_records(records));
                Ok(harvest)
            }
            Strategy::DataTables { endpoint } => {
                info!("Detected AJAX endpoint: {}", endpoint);
                self.pacer.pause().await;
                Ok(self.by_offset(&endpoint).await)
            }
            Strategy::NextLink => {
                info!("No AJAX endpoint detected, using HTML pagination");
                Ok(self.by_next_link(url, Some(body), max_pages).await)
            }
        }
    }
}
