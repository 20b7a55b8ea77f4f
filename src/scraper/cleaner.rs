use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use url::{Url, form_urlencoded};

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Strip a leading `$` and thousands separators.
/// "$12,345" → "12345" | "1,000" → "1000" | "42" → "42"
pub fn clean_currency(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('$') {
        rest.replace(',', "")
    } else if s.contains(',') {
        s.replace(',', "")
    } else {
        s.to_string()
    }
}

/// Statistic cell: separators removed, empty → "0".
pub fn clean_count(s: &str) -> String {
    let s = s.trim().replace(',', "");
    if s.is_empty() { "0".to_string() } else { s }
}

// ── Dates ─────────────────────────────────────────────────────────────────────

static US_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap());

/// "7/1/2018" → "2018-07-01". Anything else, two-digit years included, is
/// returned unchanged.
pub fn to_iso_date(s: &str) -> String {
    let s = s.trim();
    if !US_DATE.is_match(s) {
        return s.to_string();
    }
    match NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(_) => s.to_string(),
    }
}

static RANGE_SEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").unwrap());

/// Split an appointment range into (start, end).
/// "7/1/2018 -Present" → ("2018-07-01", None)
/// "1/1/2015 - 6/30/2018" → ("2015-01-01", "2018-06-30")
pub fn parse_date_range(s: &str) -> (Option<String>, Option<String>) {
    let s = s.trim();
    if s.is_empty() {
        return (None, None);
    }

    let parts: Vec<&str> = RANGE_SEP.split(s).collect();
    match parts.as_slice() {
        [single] => (Some(to_iso_date(single)), None),
        [start, end] if end.trim().eq_ignore_ascii_case("present") => {
            (Some(to_iso_date(start)), None)
        }
        [start, end] => (Some(to_iso_date(start)), Some(to_iso_date(end))),
        _ => (Some(s.to_string()), None),
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

/// Collapse whitespace runs (including newlines) into single spaces.
pub fn normalise_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Page titles carry a site suffix: "Grace UMC - UMData" → "Grace UMC".
pub fn strip_site_suffix(title: &str) -> String {
    title.replace(" - UMData", "").trim().to_string()
}

// ── URLs ──────────────────────────────────────────────────────────────────────

/// Resolve `href` against the page it was found on.
/// Absolute links pass through; unparseable ones are returned as-is.
pub fn resolve_url(base: &Url, href: &str) -> String {
    let href = href.trim();
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Pull the digits of `key=<digits>` out of a URL.
/// ("https://www.umdata.org/church?church=950642", "church") → "950642"
pub fn query_id(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.chars().take_while(char::is_ascii_digit).collect::<String>())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_currency() {
        assert_eq!(clean_currency("$12,345"), "12345");
        assert_eq!(clean_currency("1,000"), "1000");
        assert_eq!(clean_currency("42"), "42");
        assert_eq!(clean_currency(" $7 "), "7");
    }

    #[test]
    fn test_clean_count() {
        assert_eq!(clean_count("12,004"), "12004");
        assert_eq!(clean_count("  "), "0");
    }

    #[test]
    fn test_to_iso_date() {
        assert_eq!(to_iso_date("7/1/2018"), "2018-07-01");
        assert_eq!(to_iso_date("12/31/1999"), "1999-12-31");
        assert_eq!(to_iso_date("07/04/2020"), "2020-07-04");
        assert_eq!(to_iso_date("Summer 2019"), "Summer 2019");
        assert_eq!(to_iso_date("2/30/2019"), "2/30/2019");
        assert_eq!(to_iso_date("7/1/18"), "7/1/18");
        assert_eq!(to_iso_date("7/1/02018"), "7/1/02018");
    }

    #[test]
    fn test_parse_date_range() {
        assert_eq!(
            parse_date_range("7/1/2018 -Present"),
            (Some("2018-07-01".into()), None)
        );
        assert_eq!(
            parse_date_range("1/1/2015 - 6/30/2018"),
            (Some("2015-01-01".into()), Some("2018-06-30".into()))
        );
        assert_eq!(parse_date_range(""), (None, None));
        assert_eq!(
            parse_date_range("6/1/2001"),
            (Some("2001-06-01".into()), None)
        );
        assert_eq!(
            parse_date_range("7/1/2018 - PRESENT"),
            (Some("2018-07-01".into()), None)
        );
        assert_eq!(
            parse_date_range("1/1/2000 - 1/1/2001 - 1/1/2002"),
            (Some("1/1/2000 - 1/1/2001 - 1/1/2002".into()), None)
        );
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://www.umdata.org/statistics").unwrap();
        assert_eq!(
            resolve_url(&base, "/church?church=950642"),
            "https://www.umdata.org/church?church=950642"
        );
        assert_eq!(
            resolve_url(&base, "https://example.org/x"),
            "https://example.org/x"
        );
    }

    #[test]
    fn test_query_id() {
        assert_eq!(
            query_id("https://www.umdata.org/pastor?pastor=0124740", "pastor"),
            Some("0124740".into())
        );
        assert_eq!(query_id("https://www.umdata.org/pastor", "pastor"), None);
        assert_eq!(query_id("/church?year=2023&church=77#facts", "church"), Some("77".into()));
        assert_eq!(query_id("https://www.umdata.org/church?xchurch=5", "church"), None);
        assert_eq!(query_id("https://www.umdata.org/church?church=abc", "church"), None);
    }

    #[test]
    fn test_whitespace_and_suffix() {
        assert_eq!(normalise_whitespace("Jane\n   Q.  Doe"), "Jane Q. Doe");
        assert_eq!(strip_site_suffix("Grace UMC - UMData"), "Grace UMC");
    }
}
