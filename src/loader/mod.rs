//! Worklist inputs produced by earlier runs (people, work history,
//! conferences) and the flattening used when work history goes to CSV.

use crate::models::{Conference, PastorHistory, Record};
use crate::storage::read_json;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// CSV columns leading a flattened work-history export.
pub const WORK_HISTORY_MAIN_FIELDS: [&str; 3] = ["GCFAId", "PastorURL", "Name"];

pub fn load_conferences(path: &Path) -> Result<Vec<Conference>> {
    let conferences: Vec<Conference> =
        read_json(path).with_context(|| format!("Failed to read conferences from {:?}", path))?;
    info!("Loaded {} conferences from {}", conferences.len(), path.display());
    Ok(conferences)
}

/// Pastor-page `URL`s out of a people export, in file order.
pub fn load_pastor_urls(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    info!("Loading people data from {}...", path.display());
    let people: Vec<Record> =
        read_json(path).with_context(|| format!("Failed to read people from {:?}", path))?;

    let urls: Vec<String> = people
        .iter()
        .filter_map(|p| p.get_str("URL"))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    debug!("{} of {} people have a URL", urls.len(), people.len());
    info!("Found {} pastor URLs to scrape", urls.len());
    Ok(urls)
}

pub fn load_work_history(path: &Path) -> Result<Vec<PastorHistory>> {
    info!("Loading work history data from {}...", path.display());
    read_json(path).with_context(|| format!("Failed to read work history from {:?}", path))
}

/// One row per work-history entry, each prefixed with its pastor's
/// `GCFAId`/`PastorURL`/`Name`. Pastors without entries still get a row.
pub fn flatten_work_history(histories: &[PastorHistory]) -> Vec<Record> {
    let mut rows = Vec::new();

    for pastor in histories {
        let mut head = Record::new();
        head.insert("GCFAId", pastor.gcfa_id.clone().unwrap_or_default());
        head.insert("PastorURL", pastor.url.as_str());
        head.insert("Name", pastor.name.clone().map(Value::String).unwrap_or_default());

        if pastor.work_history.is_empty() {
            rows.push(head);
            continue;
        }
        for entry in &pastor.work_history {
            let mut row = head.clone();
            for (k, v) in entry.iter() {
                row.insert(k.as_str(), v.clone());
            }
            rows.push(row);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::write_json;
    use serde_json::json;
    use tempfile::tempdir;

    fn pastor(id: &str, entries: Vec<Record>) -> PastorHistory {
        PastorHistory {
            gcfa_id: Some(id.into()),
            url: format!("https://www.umdata.org/pastor?pastor={}", id),
            name: Some(format!("Pastor {}", id)),
            work_history: entries,
            error: None,
        }
    }

    #[test]
    fn test_flatten_work_history() {
        let entry = |appt: &str| -> Record { [("Appointment", json!(appt))].into_iter().collect() };
        let rows = flatten_work_history(&[
            pastor("1", vec![entry("Grace UMC"), entry("First UMC")]),
            pastor("2", vec![]),
        ]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get_str("GCFAId"), Some("1"));
        assert_eq!(rows[1].get_str("Appointment"), Some("First UMC"));
        assert_eq!(
            rows[2].get_str("PastorURL"),
            Some("https://www.umdata.org/pastor?pastor=2")
        );
        assert!(!rows[2].contains_key("Appointment"));
    }

    #[test]
    fn test_load_pastor_urls_with_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.json");
        write_json(
            &path,
            &json!([
                {"Name": "A", "URL": "https://www.umdata.org/pastor?pastor=1"},
                {"Name": "B", "URL": ""},
                {"Name": "C"},
                {"Name": "D", "URL": "https://www.umdata.org/pastor?pastor=4"},
                {"Name": "E", "URL": "https://www.umdata.org/pastor?pastor=5"}
            ]),
        )
        .unwrap();

        assert_eq!(load_pastor_urls(&path, None).unwrap().len(), 3);
        assert_eq!(
            load_pastor_urls(&path, Some(2)).unwrap(),
            vec![
                "https://www.umdata.org/pastor?pastor=1",
                "https://www.umdata.org/pastor?pastor=4",
            ]
        );
    }

    #[test]
    fn test_load_conferences_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        write_json(&path, &json!([{"id": 3067919, "name": "North Texas"}])).unwrap();

        let confs = load_conferences(&path).unwrap();
        assert_eq!(confs[0].id, "3067919");
        assert!(load_conferences(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_work_history_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wh.json");
        let histories = vec![pastor("7", vec![])];
        write_json(&path, &histories).unwrap();
        assert_eq!(load_work_history(&path).unwrap(), histories);
    }
}
