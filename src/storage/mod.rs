//! Flat-file persistence: CSV and pretty-printed JSON, overwritten each run.

use crate::error::ScrapeResult;
use crate::models::Record;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

// ── Column layout ─────────────────────────────────────────────────────────────

/// `preferred` columns first (whether or not any record has them), then the
/// union of every other key, sorted.
pub fn column_order(records: &[Record], preferred: &[&str]) -> Vec<String> {
    let rest: BTreeSet<&String> = records
        .iter()
        .flat_map(Record::keys)
        .filter(|k| !preferred.contains(&k.as_str()))
        .collect();

    preferred
        .iter()
        .map(|s| s.to_string())
        .chain(rest.into_iter().cloned())
        .collect()
}

/// One CSV cell. Lists collapse to their first element's `label`, else its
/// `Name`, else its JSON text; null is empty.
pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => match items.first() {
            None => String::new(),
            Some(Value::Object(first)) => first
                .get("label")
                .or_else(|| first.get("Name"))
                .map(flatten_value)
                .unwrap_or_else(|| Value::Object(first.clone()).to_string()),
            Some(first) => flatten_value(first),
        },
        Value::Object(_) => value.to_string(),
    }
}

// ── Writers ───────────────────────────────────────────────────────────────────

fn ensure_parent(path: &Path) -> ScrapeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write `records` as CSV; returns the number of data rows.
pub fn write_csv(path: &Path, records: &[Record], preferred: &[&str]) -> ScrapeResult<usize> {
    ensure_parent(path)?;
    let columns = column_order(records, preferred);
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(
            columns
                .iter()
                .map(|c| record.get(c).map(flatten_value).unwrap_or_default()),
        )?;
    }
    writer.flush()?;

    info!("Saved {} records to {}", records.len(), path.display());
    Ok(records.len())
}

/// Pretty-printed JSON (2-space indent, UTF-8 as-is).
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> ScrapeResult<()> {
    ensure_parent(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, data)?;
    out.write_all(b"\n")?;
    out.flush()?;
    info!("Data saved to {}", path.display());
    Ok(())
}

// ── Readers ───────────────────────────────────────────────────────────────────

/// Every CSV row as a string-valued record keyed by the header.
pub fn read_csv(path: &Path) -> ScrapeResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut out: Vec<Record> = Vec::new();
    for row in reader.records() {
        let row = row?;
        out.push(headers.iter().zip(row.iter()).collect());
    }
    Ok(out)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> ScrapeResult<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// `out/history.json` → `out/history.csv`.
pub fn csv_sibling(path: &Path) -> PathBuf {
    path.with_extension("csv")
}
