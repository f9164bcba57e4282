//! CRDB Response Codec
//!
//! Decodes the columnar response returned by the query endpoint into records
//! keyed by group.
//!
//! Two layouts exist, told apart by the presence of `objects`:
//!
//! ```text
//! object mode:    {"columns": ["size"],
//!                  "objects": [["*", [[16, 2]]]],
//!                  "values":  [["*", [[100, 3]]]]}
//!
//! aggregate mode: {"columns": ["hostname;unique"],
//!                  "values":  [["fp1", [[3]], 12]]}
//! ```

use crate::crdb::error::{CrdbError, CrdbResult};
use crate::crdb::rle::{object_runs, value_runs, ColumnCursor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A decoded record: field name to value
pub type Record = Map<String, Value>;

/// Field holding the synthetic object id in object mode
pub const OBJECT_FIELD: &str = "object";

/// Request-level failure reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// The response payload as sent by the service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub objects: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

impl RawResponse {
    /// Parse a payload from JSON text
    pub fn from_json(text: &str) -> CrdbResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether the response carries materialized objects
    pub fn is_object_mode(&self) -> bool {
        self.objects.is_some()
    }
}

/// One aggregate bucket
///
/// Serializes as `{"count": n, "fields": {...}}`; a column named `count`
/// stays inside `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub fields: Record,
}

/// Records decoded for one group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupBody {
    Objects(Vec<Record>),
    Aggregate(AggregateRecord),
}

impl GroupBody {
    /// Rows this group contributes
    pub fn row_count(&self) -> usize {
        match self {
            Self::Objects(rows) => rows.len(),
            Self::Aggregate(_) => 1,
        }
    }
}

/// A decoded group
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub body: GroupBody,
}

/// Decoded response, groups kept in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl ResultSet {
    /// Columns the response was decoded against
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// No groups: the query matched nothing
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&GroupBody> {
        self.index.get(key).map(|&i| &self.groups[i].body)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Group> {
        self.groups.iter()
    }

    /// Total rows across all groups
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.body.row_count()).sum()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn insert(&mut self, key: String, body: GroupBody) -> usize {
        let position = self.groups.len();
        self.index.insert(key.clone(), position);
        self.groups.push(Group { key, body });
        position
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.key, &group.body)?;
        }
        map.end()
    }
}

/// Group labels are usually strings; numeric factors are rendered as text
pub(crate) fn group_label(value: &Value) -> CrdbResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(CrdbError::Malformed(format!("invalid group label {}", other))),
    }
}

/// Decode a JSON payload
pub fn decode_value(value: Value) -> CrdbResult<ResultSet> {
    let raw: RawResponse = serde_json::from_value(value)?;
    decode(&raw)
}

/// Decode a response into records keyed by group
pub fn decode(raw: &RawResponse) -> CrdbResult<ResultSet> {
    if let Some(error) = &raw.error {
        return Err(CrdbError::Upstream(error.message.clone()));
    }

    let result = match &raw.objects {
        Some(objects) => decode_objects(&raw.columns, objects, &raw.values)?,
        None => decode_aggregate(&raw.columns, &raw.values)?,
    };

    tracing::debug!(
        groups = result.len(),
        rows = result.row_count(),
        object_mode = raw.is_object_mode(),
        "decoded response"
    );
    Ok(result)
}

fn decode_objects(columns: &[String], objects: &[Value], values: &[Value]) -> CrdbResult<ResultSet> {
    let mut result = ResultSet {
        columns: columns.to_vec(),
        ..Default::default()
    };

    for entry in objects {
        let (label, runs) = match entry.as_array().map(Vec::as_slice) {
            Some([label, runs, ..]) => (group_label(label)?, object_runs(runs)?),
            _ => return Err(CrdbError::Malformed(format!("invalid objects entry {}", entry))),
        };

        let position = match result.position(&label) {
            Some(position) => position,
            None => result.insert(label, GroupBody::Objects(Vec::new())),
        };
        let GroupBody::Objects(rows) = &mut result.groups[position].body else {
            continue;
        };

        for id in runs.iter().flat_map(|run| run.ids()) {
            let mut record = Record::new();
            record.insert(OBJECT_FIELD.to_string(), Value::from(id));
            rows.push(record);
        }
    }

    if columns.is_empty() {
        return Ok(result);
    }

    let mut cursors: HashMap<(usize, usize), ColumnCursor> = HashMap::new();

    for chunk in values.chunks(columns.len()) {
        for (column_index, element) in chunk.iter().enumerate() {
            let column = &columns[column_index];
            let (label, runs) = match element.as_array().map(Vec::as_slice) {
                Some([label, runs, ..]) => (group_label(label)?, value_runs(runs)?),
                _ => return Err(CrdbError::Malformed(format!("invalid values entry {}", element))),
            };

            let Some(position) = result.position(&label) else {
                // TODO: decide whether unknown groups mean server-side truncation
                // and should fail the decode instead.
                tracing::warn!(group = %label, column = %column, "values reference a group missing from objects, skipping");
                continue;
            };
            let GroupBody::Objects(rows) = &mut result.groups[position].body else {
                continue;
            };

            let cursor = cursors.entry((position, column_index)).or_default();
            let mut overflow = 0;
            for run in runs {
                overflow += cursor.fill(rows, column, run);
            }
            if overflow > 0 {
                tracing::warn!(group = %label, column = %column, overflow, "value runs exceed object count, truncating");
            }
        }
    }

    Ok(result)
}

fn decode_aggregate(columns: &[String], values: &[Value]) -> CrdbResult<ResultSet> {
    let mut result = ResultSet {
        columns: columns.to_vec(),
        ..Default::default()
    };

    for entry in values {
        let (label, record) = aggregate_entry(columns, entry)?;

        let position = match result.position(&label) {
            Some(position) => position,
            None => result.insert(label, GroupBody::Aggregate(AggregateRecord::default())),
        };
        if let GroupBody::Aggregate(existing) = &mut result.groups[position].body {
            if record.count.is_some() {
                existing.count = record.count;
            }
            existing.fields.extend(record.fields);
        }
    }

    Ok(result)
}

/// Decode one aggregate `[group_label, column_values, count?]` entry
pub(crate) fn aggregate_entry(columns: &[String], entry: &Value) -> CrdbResult<(String, AggregateRecord)> {
    let parts = entry
        .as_array()
        .filter(|parts| parts.len() >= 2)
        .ok_or_else(|| CrdbError::Malformed(format!("invalid values entry {}", entry)))?;

    let label = group_label(&parts[0])?;
    let column_values = parts[1]
        .as_array()
        .ok_or_else(|| CrdbError::Malformed(format!("column values must be an array in {}", entry)))?;

    if column_values.len() != columns.len() {
        tracing::warn!(
            group = %label,
            expected = columns.len(),
            found = column_values.len(),
            "column count mismatch"
        );
    }

    let fields = columns
        .iter()
        .zip(column_values)
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    Ok((
        label,
        AggregateRecord {
            count: parts.get(2).and_then(Value::as_u64),
            fields,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_json(value: Value) -> ResultSet {
        decode_value(value).unwrap()
    }

    fn objects(result: &ResultSet, key: &str) -> Vec<Record> {
        match result.get(key) {
            Some(GroupBody::Objects(rows)) => rows.clone(),
            other => panic!("expected object rows for {key}, got {other:?}"),
        }
    }

    #[test]
    fn test_object_mode_single_group() {
        let result = decode_json(json!({
            "columns": ["size"],
            "objects": [["*", [[16, 2]]]],
            "values": [["*", [[100, 3]]]]
        }));

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"*": [
                {"object": 16, "size": 100},
                {"object": 17, "size": 100},
                {"object": 18, "size": 100}
            ]})
        );
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_object_mode_multiple_columns_and_groups() {
        let result = decode_json(json!({
            "columns": ["hostname", "size"],
            "objects": [
                ["web", [[1, 1], [10]]],
                ["db", [[20, 0]]]
            ],
            "values": [
                ["web", [["web-1", 2], ["web-2", 1]]],
                ["web", [[5, 3]]],
                ["db", [["db-1", 1]]],
                ["db", [[7, 1]]]
            ]
        }));

        assert_eq!(result.len(), 2);
        let keys: Vec<&str> = result.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["web", "db"]);

        assert_eq!(
            objects(&result, "web"),
            vec![
                json!({"object": 1, "hostname": "web-1", "size": 5}),
                json!({"object": 2, "hostname": "web-1", "size": 5}),
                json!({"object": 10, "hostname": "web-2", "size": 5}),
            ]
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect::<Vec<_>>()
        );
        assert_eq!(
            serde_json::to_value(objects(&result, "db")).unwrap(),
            json!([{"object": 20, "hostname": "db-1", "size": 7}])
        );
    }

    #[test]
    fn test_unknown_group_is_skipped() {
        let result = decode_json(json!({
            "columns": ["size"],
            "objects": [["a", [[1, 0]]]],
            "values": [["ghost", [[9, 1]]], ["a", [[4, 1]]]]
        }));

        assert!(result.get("ghost").is_none());
        assert_eq!(
            serde_json::to_value(objects(&result, "a")).unwrap(),
            json!([{"object": 1, "size": 4}])
        );
    }

    #[test]
    fn test_overflowing_runs_are_truncated() {
        let result = decode_json(json!({
            "columns": ["size"],
            "objects": [["*", [[1, 1]]]],
            "values": [["*", [[4, 5]]]]
        }));
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_aggregate_mode() {
        let result = decode_json(json!({
            "columns": ["count"],
            "values": [["*", [5], 1]]
        }));

        assert_eq!(
            result.get("*"),
            Some(&GroupBody::Aggregate(AggregateRecord {
                count: Some(1),
                fields: json!({"count": 5}).as_object().unwrap().clone(),
            }))
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"*": {"count": 1, "fields": {"count": 5}}})
        );
    }

    #[test]
    fn test_aggregate_mode_grouped() {
        let result = decode_json(json!({
            "columns": ["hostname;unique", "timestamp;range"],
            "values": [
                ["fp1", [[3], [100, 200]], 12],
                ["fp2", [[1], [150, 150]]]
            ]
        }));

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "fp1": {
                    "count": 12,
                    "fields": {"hostname;unique": [3], "timestamp;range": [100, 200]}
                },
                "fp2": {"fields": {"hostname;unique": [1], "timestamp;range": [150, 150]}}
            })
        );
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_empty_values_is_zero_results() {
        let result = decode_json(json!({"columns": ["size"], "values": []}));
        assert!(result.is_empty());

        let result = decode_json(json!({"columns": ["size"], "objects": [], "values": []}));
        assert!(result.is_empty());
    }

    #[test]
    fn test_error_short_circuits() {
        let err = decode_value(json!({
            "error": {"message": "invalid column", "code": 4},
            "values": [["*", [1], 1]]
        }))
        .unwrap_err();
        assert!(matches!(err, CrdbError::Upstream(msg) if msg == "invalid column"));
    }

    #[test]
    fn test_malformed_entries() {
        assert!(matches!(
            decode_value(json!({"columns": ["a"], "values": [42]})),
            Err(CrdbError::Malformed(_))
        ));
        assert!(matches!(
            decode_value(json!({"columns": ["a"], "objects": [["*"]], "values": []})),
            Err(CrdbError::Malformed(_))
        ));
        assert!(matches!(
            RawResponse::from_json("{\"columns\": 3}"),
            Err(CrdbError::Json(_))
        ));
    }

    #[test]
    fn test_numeric_group_labels() {
        let result = decode_json(json!({
            "columns": ["c"],
            "values": [[3, ["x"], 2]]
        }));
        assert!(result.get("3").is_some());
    }
}
