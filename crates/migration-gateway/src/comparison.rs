//! Shadow-mode comparison records and body diffing.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status recorded for a backend that produced no response.
pub const UNAVAILABLE_STATUS: u16 = 0;

/// Key used when two bodies differ and cannot be diffed field by field.
pub const WHOLE_BODY_KEY: &str = "$body";

/// One field-level difference between the legacy and new responses.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Difference {
    /// Value in the legacy response; `None` when the field is absent.
    pub legacy: Option<Value>,

    /// Value in the new response; `None` when the field is absent.
    pub new: Option<Value>,
}

/// Outcome of comparing one shadowed request. Written once, never updated.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResponseComparison {
    /// Request path, without the query string.
    pub path: String,

    /// Request method.
    pub method: String,

    /// When the comparison was made.
    pub timestamp: DateTime<Utc>,

    /// Legacy status, or [`UNAVAILABLE_STATUS`].
    pub legacy_status: u16,

    /// New-system status, or [`UNAVAILABLE_STATUS`].
    pub new_status: u16,

    /// Whether both backends answered with the same status.
    pub status_match: bool,

    /// Field-level differences keyed by JSON pointer; `None` when the bodies
    /// agree or were not compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differences: Option<BTreeMap<String, Difference>>,
}

impl ResponseComparison {
    /// Build a comparison stamped with the current time. Statuses match only
    /// when both backends answered with the same code.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        method: impl Into<String>,
        legacy_status: u16,
        new_status: u16,
        differences: Option<BTreeMap<String, Difference>>,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            timestamp: Utc::now(),
            legacy_status,
            new_status,
            status_match: legacy_status == new_status && legacy_status != UNAVAILABLE_STATUS,
            differences,
        }
    }

    /// Whether the two responses are considered equivalent.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.status_match && self.differences.is_none()
    }
}

/// Computes body differences between a legacy and a new response.
pub trait BodyComparator: Send + Sync + 'static {
    /// Differences between the two bodies; `None` when they are equivalent.
    fn compare(&self, legacy: &Bytes, new: &Bytes) -> Option<BTreeMap<String, Difference>>;
}

/// Structural JSON diff keyed by JSON pointer. Bodies that are not both JSON
/// are compared byte for byte under [`WHOLE_BODY_KEY`].
#[derive(Clone, Copy, Debug)]
pub struct JsonBodyComparator {
    max_differences: usize,
}

impl Default for JsonBodyComparator {
    fn default() -> Self {
        Self {
            max_differences: 100,
        }
    }
}

impl JsonBodyComparator {
    /// Comparator reporting at most `max_differences` fields.
    #[must_use]
    pub const fn new(max_differences: usize) -> Self {
        Self { max_differences }
    }

    fn diff(&self, pointer: &mut String, legacy: Option<&Value>, new: Option<&Value>, out: &mut BTreeMap<String, Difference>) {
        if out.len() >= self.max_differences {
            return;
        }

        match (legacy, new) {
            (Some(Value::Object(l)), Some(Value::Object(n))) => {
                let mut keys: Vec<&String> = l.keys().chain(n.keys()).collect();
                keys.sort();
                keys.dedup();
                for key in keys {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape(key));
                    self.diff(pointer, l.get(key), n.get(key), out);
                    pointer.truncate(len);
                }
            }
            (Some(Value::Array(l)), Some(Value::Array(n))) => {
                for index in 0..l.len().max(n.len()) {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&index.to_string());
                    self.diff(pointer, l.get(index), n.get(index), out);
                    pointer.truncate(len);
                }
            }
            (l, n) if l != n => {
                out.insert(
                    pointer.clone(),
                    Difference {
                        legacy: l.cloned(),
                        new: n.cloned(),
                    },
                );
            }
            _ => {}
        }
    }
}

/// RFC 6901 reference token escaping.
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

impl BodyComparator for JsonBodyComparator {
    fn compare(&self, legacy: &Bytes, new: &Bytes) -> Option<BTreeMap<String, Difference>> {
        if legacy == new {
            return None;
        }

        let parsed = (
            serde_json::from_slice::<Value>(legacy),
            serde_json::from_slice::<Value>(new),
        );

        let mut out = BTreeMap::new();
        if let (Ok(legacy), Ok(new)) = parsed {
            self.diff(&mut String::new(), Some(&legacy), Some(&new), &mut out);
        } else {
            out.insert(
                WHOLE_BODY_KEY.to_string(),
                Difference {
                    legacy: Some(Value::String(String::from_utf8_lossy(legacy).into_owned())),
                    new: Some(Value::String(String::from_utf8_lossy(new).into_owned())),
                },
            );
        }

        if out.is_empty() { None } else { Some(out) }
    }
}
