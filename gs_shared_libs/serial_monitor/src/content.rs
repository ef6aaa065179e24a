use std::collections::HashMap;

use chrono::{DateTime, Local};

use telemetry_db::Value;

use crate::monitor::TelemetryRecord;

/// In-memory history of every telemetry argument seen so far, keyed
/// format -> telemetry type -> leaf field path. Struct fields flatten to
/// dotted paths ("position.latitude"); enums, arrays and scalars are leaves.
/// Consumers read value histories back out for display.
#[derive(Debug, Default)]
pub struct ContentStore {
    formats: HashMap<String, HashMap<String, HashMap<String, Vec<(DateTime<Local>, Value)>>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        ContentStore::default()
    }

    /// File every leaf value of a decoded record under its path
    pub fn append(&mut self, record: &TelemetryRecord) {
        let fields = self
            .formats
            .entry(record.parser.clone())
            .or_default()
            .entry(record.type_name.clone())
            .or_default();
        for (name, value) in &record.values {
            append_leaves(fields, name, value, record.timestamp);
        }
    }

    pub fn formats(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }

    pub fn telemetry_names(&self, format: &str) -> Vec<&str> {
        self.formats
            .get(format)
            .map(|types| types.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn fields(&self, format: &str, telemetry: &str) -> Vec<&str> {
        self.formats
            .get(format)
            .and_then(|types| types.get(telemetry))
            .map(|fields| fields.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Value history for one leaf field, oldest first
    pub fn history(
        &self,
        format: &str,
        telemetry: &str,
        field: &str,
    ) -> &[(DateTime<Local>, Value)] {
        self.formats
            .get(format)
            .and_then(|types| types.get(telemetry))
            .and_then(|fields| fields.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.formats.clear();
    }
}

fn append_leaves(
    fields: &mut HashMap<String, Vec<(DateTime<Local>, Value)>>,
    path: &str,
    value: &Value,
    timestamp: DateTime<Local>,
) {
    match value {
        Value::Struct(children) => {
            for (name, child) in children {
                append_leaves(fields, &format!("{}.{}", path, name), child, timestamp);
            }
        }
        leaf => fields
            .entry(path.to_string())
            .or_default()
            .push((timestamp, leaf.clone())),
    }
}
