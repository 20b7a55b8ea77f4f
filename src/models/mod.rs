use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Record ────────────────────────────────────────────────────────────────────

/// One scraped row. Keys are discovered at scrape time (table headers, JSON
/// keys) and keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert a string, or `null` when absent.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<String>) {
        let value = value.map(Value::String).unwrap_or(Value::Null);
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Scalar text for `key`: strings as-is, numbers/bools rendered.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// True when any of `keys` holds a non-empty scalar.
    pub fn has_identity(&self, keys: &[&str]) -> bool {
        keys.iter()
            .filter_map(|k| self.text(k))
            .any(|v| !v.trim().is_empty())
    }

    /// True when no field holds a non-empty value.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|v| match v {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        })
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ── Pastor work history ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PastorHistory {
    #[serde(rename = "GCFAId")]
    pub gcfa_id: Option<String>,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "WorkHistory", default)]
    pub work_history: Vec<Record>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Statistics page ───────────────────────────────────────────────────────────

/// Jurisdiction / conference / district link lists. Each entry is a
/// `{name, url}` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub jurisdictions: Vec<Record>,
    pub annual_conferences: Vec<Record>,
    pub districts: Vec<Record>,
}

impl Statistics {
    /// Sections paired with the file stem they are saved under.
    pub fn sections(&self) -> [(&'static str, &[Record]); 3] {
        [
            ("jurisdictions", &self.jurisdictions),
            ("annual_conferences", &self.annual_conferences),
            ("districts", &self.districts),
        ]
    }
}

// ── Worklist inputs ───────────────────────────────────────────────────────────

/// Entry of the conference list (`conferences.json`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Conference {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Conference ids show up both as numbers and as strings.
fn id_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}
