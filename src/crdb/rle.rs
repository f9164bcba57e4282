//! Run-length encoded columns
//!
//! The same `[a, b]` tuple means two different things depending on where it
//! appears:
//!
//! - in `objects`, `[base, span]` covers the ids `base ..= base + span`
//! - in `values`, `[value, count]` repeats `value` over `count` rows
//!
//! Both are decoded through explicit run types and a per-column cursor rather
//! than shared index arithmetic.

use crate::crdb::error::{CrdbError, CrdbResult};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;

/// A contiguous range of object ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRun {
    pub base: u64,
    /// Number of ids after `base`
    pub span: u64,
}

impl ObjectRun {
    /// Decode `[base, span?]`; a bare integer is accepted as a single id
    pub fn from_value(value: &Value) -> CrdbResult<Self> {
        let (base, span) = match value {
            Value::Array(parts) => (
                parts.first().and_then(Value::as_u64),
                match parts.get(1) {
                    None | Some(Value::Null) => Some(0),
                    Some(v) => v.as_u64(),
                },
            ),
            Value::Number(n) => (n.as_u64(), Some(0)),
            _ => (None, None),
        };

        match (base, span) {
            (Some(base), Some(span)) if base.checked_add(span).is_some() => {
                Ok(Self { base, span })
            }
            _ => Err(CrdbError::Malformed(format!("invalid object run {}", value))),
        }
    }

    /// Ids covered by this run, ascending
    pub fn ids(&self) -> RangeInclusive<u64> {
        self.base..=self.base + self.span
    }

    /// Number of ids covered
    pub fn id_count(&self) -> u64 {
        self.span + 1
    }
}

/// Decode a list of object runs
pub fn object_runs(value: &Value) -> CrdbResult<Vec<ObjectRun>> {
    value
        .as_array()
        .ok_or_else(|| CrdbError::Malformed(format!("object runs must be an array, got {}", value)))?
        .iter()
        .map(ObjectRun::from_value)
        .collect()
}

/// A value repeated over consecutive rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRun<'a> {
    pub value: &'a Value,
    pub count: usize,
}

impl<'a> ValueRun<'a> {
    /// Decode `[value, count?]`; a missing count means one row
    pub fn from_value(run: &'a Value) -> CrdbResult<Self> {
        let parts = run
            .as_array()
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| CrdbError::Malformed(format!("invalid value run {}", run)))?;

        let count = match parts.get(1) {
            None | Some(Value::Null) => 1,
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| CrdbError::Malformed(format!("invalid run length in {}", run)))?,
        };

        Ok(Self {
            value: &parts[0],
            count,
        })
    }
}

/// Decode a list of value runs
pub fn value_runs(value: &Value) -> CrdbResult<Vec<ValueRun<'_>>> {
    value
        .as_array()
        .ok_or_else(|| CrdbError::Malformed(format!("value runs must be an array, got {}", value)))?
        .iter()
        .map(ValueRun::from_value)
        .collect()
}

/// Write position of one column within one group's rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnCursor {
    next: usize,
}

impl ColumnCursor {
    /// Rows already filled
    pub fn position(&self) -> usize {
        self.next
    }

    /// Assign `run.value` to the next `run.count` rows
    ///
    /// Returns how many repetitions did not fit.
    pub fn fill(&mut self, rows: &mut [Map<String, Value>], column: &str, run: ValueRun<'_>) -> usize {
        let start = self.next.min(rows.len());
        let end = start.saturating_add(run.count).min(rows.len());

        for row in &mut rows[start..end] {
            row.insert(column.to_string(), run.value.clone());
        }

        self.next = end;
        run.count - (end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_run_expansion() {
        let run = ObjectRun::from_value(&json!([16, 2])).unwrap();
        assert_eq!(run.ids().collect::<Vec<_>>(), vec![16, 17, 18]);
        assert_eq!(run.id_count(), 3);

        let single = ObjectRun::from_value(&json!([7])).unwrap();
        assert_eq!(single.ids().collect::<Vec<_>>(), vec![7]);

        let bare = ObjectRun::from_value(&json!(9)).unwrap();
        assert_eq!(bare, ObjectRun { base: 9, span: 0 });
    }

    #[test]
    fn test_object_run_rejects_garbage() {
        assert!(ObjectRun::from_value(&json!(["a", 1])).is_err());
        assert!(ObjectRun::from_value(&json!([1, -1])).is_err());
        assert!(ObjectRun::from_value(&json!([u64::MAX, 1])).is_err());
        assert!(object_runs(&json!({"base": 1})).is_err());
    }

    #[test]
    fn test_value_run() {
        let raw = json!(["linux", 4]);
        let run = ValueRun::from_value(&raw).unwrap();
        assert_eq!(run.value, &json!("linux"));
        assert_eq!(run.count, 4);

        let raw = json!([null]);
        assert_eq!(ValueRun::from_value(&raw).unwrap().count, 1);

        assert!(ValueRun::from_value(&json!([])).is_err());
        assert!(ValueRun::from_value(&json!(["x", "many"])).is_err());
    }

    #[test]
    fn test_cursor_fills_in_order_and_reports_overflow() {
        let mut rows = vec![Map::new(), Map::new(), Map::new()];
        let mut cursor = ColumnCursor::default();

        let a = json!(["a", 2]);
        let b = json!(["b", 2]);
        assert_eq!(cursor.fill(&mut rows, "col", ValueRun::from_value(&a).unwrap()), 0);
        assert_eq!(cursor.fill(&mut rows, "col", ValueRun::from_value(&b).unwrap()), 1);
        assert_eq!(cursor.position(), 3);

        let column: Vec<&Value> = rows.iter().map(|r| &r["col"]).collect();
        assert_eq!(column, vec![&json!("a"), &json!("a"), &json!("b")]);
    }
}
