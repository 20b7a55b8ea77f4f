use crate::error::{ScrapeError, ScrapeResult};
use crate::models::Record;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use super::cleaner::{
    clean_count, clean_currency, normalise_whitespace, parse_date_range, query_id, resolve_url,
    strip_site_suffix,
};

pub(crate) fn selector(css: &str) -> ScrapeResult<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::parse(format!("selector {:?}: {:?}", css, e)))
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    normalise_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// First non-empty text node under `el`.
fn first_text(el: ElementRef<'_>) -> Option<String> {
    el.text()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

fn child_elements<'a>(el: ElementRef<'a>, names: &'a [&'a str]) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| names.contains(&c.value().name()))
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn first_href(el: ElementRef<'_>) -> ScrapeResult<Option<String>> {
    let a_sel = selector("a[href]")?;
    Ok(el
        .select(&a_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

// ── Generic table extraction ──────────────────────────────────────────────────

/// Turns an HTML `<table>` into records keyed by its header cells.
///
/// Headers come from `thead`, or from a leading row made only of `th` cells;
/// without either, cells are keyed `Column_<i>`. Any cell holding a link also
/// yields `<Header>_URL` with the link made absolute against `base`.
#[derive(Debug, Clone)]
pub struct TableExtractor {
    base: Url,
    /// Columns whose text is dropped; only their `_URL` is kept.
    link_only: Vec<String>,
    /// Column split into `StartDate` / `EndDate`.
    date_range_column: Option<String>,
}

impl TableExtractor {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            link_only: Vec::new(),
            date_range_column: None,
        }
    }

    pub fn with_link_only(mut self, column: &str) -> Self {
        self.link_only.push(column.to_string());
        self
    }

    pub fn with_date_range_column(mut self, column: &str) -> Self {
        self.date_range_column = Some(column.to_string());
        self
    }

    /// Records from the first `<table>` in `html`; `None` when there is no table.
    pub fn extract_first(&self, html: &str) -> ScrapeResult<Option<Vec<Record>>> {
        let doc = Html::parse_document(html);
        let table_sel = selector("table")?;
        match doc.select(&table_sel).next() {
            Some(table) => self.extract(table).map(Some),
            None => Ok(None),
        }
    }

    pub fn extract(&self, table: ElementRef<'_>) -> ScrapeResult<Vec<Record>> {
        let (headers, rows) = split_header(table);
        debug!("table headers: {:?}", headers);

        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = self.extract_row(&headers, row)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn extract_row(&self, headers: &[String], row: ElementRef<'_>) -> ScrapeResult<Option<Record>> {
        let mut record = Record::new();

        for (i, cell) in child_elements(row, &["td", "th"]).enumerate() {
            let header = headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Column_{}", i));

            if let Some(href) = first_href(cell)? {
                record.insert(format!("{}_URL", header), resolve_url(&self.base, &href));
            }

            let text = element_text(cell);
            if !self.link_only.contains(&header) {
                record.insert(header.clone(), text.clone());
            }

            if self.date_range_column.as_deref() == Some(header.as_str()) && !text.is_empty() {
                let (start, end) = parse_date_range(&text);
                record.insert_opt("StartDate", start);
                record.insert_opt("EndDate", end);
            }
        }

        Ok(if record.is_blank() { None } else { Some(record) })
    }
}

/// Header names plus the data rows of `table`.
fn split_header<'a>(table: ElementRef<'a>) -> (Vec<String>, Vec<ElementRef<'a>>) {
    let mut header_rows = Vec::new();
    let mut body_rows = Vec::new();

    for section in child_elements(table, &["thead", "tbody", "tfoot", "tr"]) {
        match section.value().name() {
            "thead" => header_rows.extend(child_elements(section, &["tr"])),
            "tr" => body_rows.push(section),
            _ => body_rows.extend(child_elements(section, &["tr"])),
        }
    }

    let cells_of = |row: ElementRef<'_>| -> Vec<String> {
        child_elements(row, &["td", "th"]).map(element_text).collect()
    };

    if let Some(head) = header_rows.first() {
        return (cells_of(*head), body_rows);
    }

    let leading_th_row = body_rows.first().is_some_and(|row| {
        let cells: Vec<ElementRef<'_>> = child_elements(*row, &["td", "th"]).collect();
        !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th")
    });
    if leading_th_row {
        let head = body_rows.remove(0);
        return (cells_of(head), body_rows);
    }

    (Vec::new(), body_rows)
}

/// DataTables rows come as objects (kept) or arrays (keyed `Column_<i>`).
pub fn json_row_to_record(row: Value) -> Option<Record> {
    match row {
        Value::Object(map) => Some(Record::from(map)),
        Value::Array(cells) => Some(
            cells
                .into_iter()
                .enumerate()
                .map(|(i, v)| (format!("Column_{}", i), v))
                .collect(),
        ),
        _ => None,
    }
}

// ── Section lookup ────────────────────────────────────────────────────────────

/// Table under the `h2` whose text contains `section` (case-insensitive).
///
/// Looks in the heading's enclosing `div`/`section`, else its next sibling
/// element, then inside an accordion block of that container.
pub fn find_section_table<'a>(doc: &'a Html, section: &str) -> ScrapeResult<Option<ElementRef<'a>>> {
    let h2_sel = selector("h2")?;
    let table_sel = selector("table")?;
    let div_sel = selector("div")?;
    let wanted = section.to_lowercase();

    let Some(heading) = doc
        .select(&h2_sel)
        .find(|h| element_text(*h).to_lowercase().contains(&wanted))
    else {
        warn!("Section '{}' not found", section);
        return Ok(None);
    };

    let container = heading
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| matches!(a.value().name(), "div" | "section"))
        .or_else(|| heading.next_siblings().filter_map(ElementRef::wrap).next());

    let Some(container) = container else {
        warn!("Container for '{}' not found", section);
        return Ok(None);
    };

    if container.value().name() == "table" {
        return Ok(Some(container));
    }
    if let Some(table) = container.select(&table_sel).next() {
        return Ok(Some(table));
    }

    let accordion = container.select(&div_sel).find(|d| {
        d.value()
            .attr("class")
            .is_some_and(|c| c.to_lowercase().contains("accordion"))
    });
    let table = accordion.and_then(|a| a.select(&table_sel).next());
    if table.is_none() {
        warn!("Table for '{}' not found", section);
    }
    Ok(table)
}

// ── Link tables (statistics fragments) ────────────────────────────────────────

/// `{name, url}` for every row whose first cell holds a link.
pub fn link_rows(table: ElementRef<'_>, base: &Url) -> ScrapeResult<Vec<Record>> {
    let tr_sel = selector("tr")?;
    let a_sel = selector("a")?;
    let mut out = Vec::new();

    for row in table.select(&tr_sel) {
        let Some(first) = child_elements(row, &["td", "th"]).next() else {
            continue;
        };
        let Some(link) = first.select(&a_sel).next() else {
            continue;
        };
        let name = element_text(link);
        let url = link.value().attr("href").map(|h| resolve_url(base, h));

        let mut record = Record::new();
        record.insert("name", name);
        record.insert_opt("url", url);
        out.push(record);
    }
    Ok(out)
}

/// `{name, url}` rows from the first table of an HTML fragment.
pub fn parse_link_table(html: &str, base: &Url) -> ScrapeResult<Vec<Record>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    match doc.select(&table_sel).next() {
        Some(table) => link_rows(table, base),
        None => Ok(Vec::new()),
    }
}

/// Statistics page: jurisdiction links plus the dropdown ids the AJAX
/// fragments are keyed on (these differ from the ids in the links).
pub fn parse_statistics_page(html: &str, base: &Url) -> ScrapeResult<(Vec<Record>, HashMap<String, String>)> {
    let doc = Html::parse_document(html);

    let jurisdictions = match find_section_table(&doc, "Jurisdictions")? {
        Some(table) => link_rows(table, base)?,
        None => Vec::new(),
    };

    let option_sel = selector("select#jurConferences option")?;
    let ids = doc
        .select(&option_sel)
        .filter_map(|opt| {
            let value = opt.value().attr("value")?.trim();
            let text = element_text(opt);
            (!value.is_empty() && !text.is_empty()).then(|| (text, value.to_string()))
        })
        .collect();

    Ok((jurisdictions, ids))
}

/// Column order of the per-conference district statistics fragment.
const DISTRICT_STAT_COLUMNS: [&str; 8] = [
    "professing_members",
    "avg_attendance",
    "professions_of_faith",
    "baptized_members",
    "children_baptized",
    "adults_baptized",
    "total_baptized",
    "constituent_members",
];

/// District rows with their statistics; rows with fewer than 9 cells or
/// without a district link are skipped.
pub fn parse_district_stats(
    html: &str,
    base: &Url,
    conference_id: &str,
    conference: &str,
    year: &str,
) -> ScrapeResult<Vec<Record>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let a_sel = selector("a")?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for row in table.select(&tr_sel) {
        let cells: Vec<ElementRef<'_>> = child_elements(row, &["td", "th"]).collect();
        if cells.len() < 1 + DISTRICT_STAT_COLUMNS.len() {
            continue;
        }
        let Some(link) = cells[0].select(&a_sel).next() else {
            continue;
        };

        let mut record = Record::new();
        record.insert("conference_id", conference_id);
        record.insert("conference", conference);
        record.insert("year", year);
        record.insert("district", element_text(link));
        record.insert_opt(
            "district_url",
            link.value().attr("href").map(|h| resolve_url(base, h)),
        );
        for (col, cell) in DISTRICT_STAT_COLUMNS.iter().zip(&cells[1..]) {
            record.insert(*col, clean_count(&element_text(*cell)));
        }
        out.push(record);
    }
    Ok(out)
}

// ── Megachurch listing ────────────────────────────────────────────────────────

pub const MEGACHURCH_COLUMNS: [&str; 6] = [
    "church_name",
    "church_url",
    "city",
    "state",
    "size",
    "denomination",
];

/// Rows of the megachurch list. Cells are addressed by `data-label` because
/// the listing nests mismatched `<td>` tags around `City`.
///
/// Errors when the page has no table at all.
pub fn parse_megachurch_rows(html: &str, base: &Url) -> ScrapeResult<Vec<Record>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    let tr_sel = selector("tr")?;
    let name_sel = selector(r#"td[data-label="Church Name"]"#)?;
    let city_sel = selector(r#"td[data-label="City"]"#)?;
    let state_sel = selector(r#"td[data-label="State"]"#)?;
    let size_sel = selector(r#"td[data-label="Size"]"#)?;
    let denom_sel = selector(r#"td[data-label="Denomination"]"#)?;

    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| ScrapeError::parse("no table on listing page"))?;

    let mut out = Vec::new();
    for row in table.select(&tr_sel) {
        // Header rows carry no labelled name cell
        let Some(name_cell) = row.select(&name_sel).next() else {
            continue;
        };
        let name = element_text(name_cell);
        if name.is_empty() {
            continue;
        }

        let labelled = |sel: &Selector| {
            row.select(sel)
                .next()
                .map(element_text)
                .unwrap_or_default()
        };

        let mut record = Record::new();
        record.insert("church_name", name);
        record.insert(
            "church_url",
            first_href(name_cell)?
                .map(|h| resolve_url(base, &h))
                .unwrap_or_default(),
        );
        record.insert(
            "city",
            row.select(&city_sel)
                .next()
                .and_then(first_text)
                .unwrap_or_default(),
        );
        record.insert("state", labelled(&state_sel));
        record.insert("size", labelled(&size_sel));
        record.insert("denomination", labelled(&denom_sel));
        out.push(record);
    }
    Ok(out)
}

// ── Pastor page ───────────────────────────────────────────────────────────────

/// Pastor name and work-history entries from a pastor page.
pub fn parse_pastor_page(html: &str, page_url: &Url) -> ScrapeResult<(Option<String>, Vec<Record>)> {
    let doc = Html::parse_document(html);
    let h1_sel = selector("h1")?;
    let alt_sel = selector("div.pastor-name")?;
    let table_sel = selector("table")?;

    let name = doc
        .select(&h1_sel)
        .next()
        .or_else(|| doc.select(&alt_sel).next())
        .map(element_text)
        .filter(|n| !n.is_empty());

    let history = match doc.select(&table_sel).next() {
        Some(table) => TableExtractor::new(page_url.clone())
            .with_link_only("View Charts")
            .with_date_range_column("Dates")
            .extract(table)?,
        None => Vec::new(),
    };

    Ok((name, history))
}

// ── Church page ───────────────────────────────────────────────────────────────

static YEAR_IN_PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());

/// Church details: id, name, quick-facts year, HCI flag, then every quick fact.
pub fn parse_church_page(html: &str, church_url: &str) -> ScrapeResult<Record> {
    let doc = Html::parse_document(html);
    let h1_sel = selector("h1")?;
    let title_sel = selector("title")?;
    let h3_sel = selector("h3")?;
    let hci_sel = selector("table#hci-download")?;

    let name = match doc.select(&h1_sel).next() {
        Some(h1) => first_text(h1),
        None => doc
            .select(&title_sel)
            .next()
            .map(|t| strip_site_suffix(&element_text(t))),
    };

    let facts_heading = doc
        .select(&h3_sel)
        .find(|h| element_text(*h).to_lowercase().contains("quick facts"));

    let year = facts_heading.and_then(|h| {
        YEAR_IN_PARENS
            .captures(&element_text(h))
            .map(|c| c[1].to_string())
    });

    let mut record = Record::new();
    record.insert_opt("ChurchId", query_id(church_url, "church"));
    record.insert("URL", church_url);
    record.insert_opt("ChurchName", name);
    record.insert_opt("QuickFactsYear", year);
    record.insert("HCI_DataAvailable", doc.select(&hci_sel).next().is_some());

    if let Some(heading) = facts_heading {
        for (label, value) in quick_facts(heading)? {
            record.insert(label, value);
        }
    }
    Ok(record)
}

/// `li.list-group-item` label/value pairs from the card around `heading`.
fn quick_facts(heading: ElementRef<'_>) -> ScrapeResult<Vec<(String, String)>> {
    let body_sel = selector("div.card-body")?;
    let item_sel = selector("li.list-group-item")?;
    let span_sel = selector("span")?;

    let Some(card) = heading
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "div" && has_class(*a, "card"))
    else {
        return Ok(Vec::new());
    };
    let Some(body) = card.select(&body_sel).next() else {
        return Ok(Vec::new());
    };

    let mut facts = Vec::new();
    for item in body.select(&item_sel) {
        let Some(span) = item.select(&span_sel).next() else {
            continue;
        };
        let raw_value = element_text(span);
        let label = element_text(item).replace(&raw_value, "").trim().to_string();
        let value = clean_currency(&raw_value);
        if !label.is_empty() && !value.is_empty() {
            facts.push((label, value));
        }
    }
    Ok(facts)
}
