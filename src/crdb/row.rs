//! Positional row access over an aggregate response

use crate::crdb::codec::{aggregate_entry, RawResponse, Record};
use crate::crdb::error::{CrdbError, CrdbResult};
use serde_json::Value;

/// Prefix of columns produced by the `unique` fold
const UNIQUE_PREFIX: &str = "unique(";

/// One row of `values`, with `unique(...)` fields unwrapped
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub group: String,
    pub count: Option<u64>,
    pub fields: Record,
}

/// Reads rows of a raw response by index
pub struct RowAccessor<'a> {
    raw: &'a RawResponse,
}

impl<'a> RowAccessor<'a> {
    pub fn new(raw: &'a RawResponse) -> Self {
        Self { raw }
    }

    /// Number of addressable rows
    pub fn len(&self) -> usize {
        self.raw.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.values.is_empty()
    }

    /// Row `id`, or `None` past the end
    ///
    /// Only aggregate responses are addressable by row; object-mode `values`
    /// hold per-column runs.
    pub fn row(&self, id: usize) -> CrdbResult<Option<Row>> {
        if self.raw.is_object_mode() {
            return Err(CrdbError::Malformed(
                "row access requires an aggregate response".to_string(),
            ));
        }
        let Some(entry) = self.raw.values.get(id) else {
            return Ok(None);
        };

        let (group, record) = aggregate_entry(&self.raw.columns, entry)?;
        let fields = record
            .fields
            .into_iter()
            .map(|(name, value)| {
                let value = unwrap_unique(&name, &value).clone();
                (name, value)
            })
            .collect();

        Ok(Some(Row {
            group,
            count: record.count,
            fields,
        }))
    }

    /// Every row in order
    pub fn rows(&self) -> CrdbResult<Vec<Row>> {
        (0..self.len())
            .filter_map(|id| self.row(id).transpose())
            .collect()
    }
}

/// The single element of a one-element `unique(...)` column, else `value`
pub fn unwrap_unique<'v>(column: &str, value: &'v Value) -> &'v Value {
    match value {
        Value::Array(items) if items.len() == 1 && column.starts_with(UNIQUE_PREFIX) => &items[0],
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> RawResponse {
        serde_json::from_value(json!({
            "columns": ["unique(hostname)", "range(timestamp)"],
            "values": [
                ["fp1", [[4], [100, 200]], 9],
                ["fp2", [[2, 3], [150, 150]]]
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_row_unwraps_unique() {
        let raw = response();
        let rows = RowAccessor::new(&raw);

        let row = rows.row(0).unwrap().unwrap();
        assert_eq!(row.group, "fp1");
        assert_eq!(row.count, Some(9));
        assert_eq!(row.fields["unique(hostname)"], json!(4));
        assert_eq!(row.fields["range(timestamp)"], json!([100, 200]));
    }

    #[test]
    fn test_row_keeps_multi_element_unique() {
        let raw = response();
        let row = RowAccessor::new(&raw).row(1).unwrap().unwrap();
        assert_eq!(row.count, None);
        assert_eq!(row.fields["unique(hostname)"], json!([2, 3]));
    }

    #[test]
    fn test_row_out_of_range() {
        let raw = response();
        let rows = RowAccessor::new(&raw);
        assert_eq!(rows.len(), 2);
        assert!(rows.row(2).unwrap().is_none());
        assert_eq!(rows.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_row_rejects_object_mode() {
        let raw: RawResponse = serde_json::from_value(json!({
            "columns": ["size"],
            "objects": [["*", [[16, 1]]]],
            "values": [["*", [[100, 2]]]]
        }))
        .unwrap();
        let rows = RowAccessor::new(&raw);

        assert!(matches!(rows.row(0), Err(CrdbError::Malformed(_))));
        assert!(rows.rows().is_err());
    }

    #[test]
    fn test_unwrap_unique_only_matches_prefix() {
        let single = json!([4]);
        assert_eq!(unwrap_unique("unique(hostname)", &single), &json!(4));
        assert_eq!(unwrap_unique("hostname;unique", &single), &single);
        assert_eq!(unwrap_unique("unique(hostname)", &json!([1, 2])), &json!([1, 2]));
    }
}
