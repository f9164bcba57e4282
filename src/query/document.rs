//! Query Document
//!
//! The canonical JSON document sent to the query endpoint. Field names are
//! part of the wire contract; optional clauses are omitted when empty.
//!
//! ```text
//! {
//!   "filter": [{"timestamp": [["at-least", 1700000000]]}],
//!   "order": [{"name": "count", "ordering": "descending"}],
//!   "group": ["fingerprint"],
//!   "fold": {"timestamp": [["range"], ["bin"]]}
//! }
//! ```

use crate::query::error::{QueryError, QueryResult};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Column name to predicate list; predicates on one column are ANDed
pub type FilterGroup = BTreeMap<String, Vec<Predicate>>;

/// A single `[operator, operand?, flags?]` filter tuple
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub operator: String,
    pub operand: Option<Value>,
    pub flags: BTreeSet<FilterFlag>,
}

impl Predicate {
    /// Create a predicate without an operand
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            operand: None,
            flags: BTreeSet::new(),
        }
    }

    /// Attach an operand
    pub fn with_operand(mut self, operand: impl Into<Value>) -> Self {
        self.operand = Some(operand.into());
        self
    }

    /// Attach a flag
    pub fn with_flag(mut self, flag: FilterFlag) -> Self {
        self.flags.insert(flag);
        self
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if !self.flags.is_empty() {
            3
        } else if self.operand.is_some() {
            2
        } else {
            1
        };

        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.operator)?;
        if len >= 2 {
            seq.serialize_element(self.operand.as_ref().unwrap_or(&Value::Null))?;
        }
        if len == 3 {
            seq.serialize_element(&FlagSet(&self.flags))?;
        }
        seq.end()
    }
}

/// Modifier flags accepted after the operand of a filter term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterFlag {
    CaseInsensitive,
}

impl FilterFlag {
    /// Parse a flag token; hyphens and underscores are interchangeable
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().replace('-', "_").as_str() {
            "case_insensitive" => Some(Self::CaseInsensitive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseInsensitive => "case_insensitive",
        }
    }
}

struct FlagSet<'a>(&'a BTreeSet<FilterFlag>);

impl Serialize for FlagSet<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for flag in self.0 {
            map.serialize_entry(flag.as_str(), &true)?;
        }
        map.end()
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordering {
    Ascending,
    Descending,
}

/// An `order` clause entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortTerm {
    pub name: String,
    pub ordering: Ordering,
}

impl SortTerm {
    /// Parse a CLI sort token; a leading `-` selects descending order
    pub fn parse(token: &str) -> QueryResult<Self> {
        let (name, ordering) = match token.strip_prefix('-') {
            Some(name) => (name, Ordering::Descending),
            None => (token, Ordering::Ascending),
        };
        if name.trim().is_empty() {
            return Err(QueryError::InvalidSortTerm(token.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            ordering,
        })
    }
}

/// Aggregation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    Head,
    Tail,
    Unique,
    Histogram,
    Distribution,
    Sum,
    Range,
    Bin,
    Min,
    Max,
    Mean,
}

impl FoldOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Tail => "tail",
            Self::Unique => "unique",
            Self::Histogram => "histogram",
            Self::Distribution => "distribution",
            Self::Sum => "sum",
            Self::Range => "range",
            Self::Bin => "bin",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
        }
    }
}

impl std::fmt::Display for FoldOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fold tuple `[operator, args...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub op: FoldOp,
    pub args: Vec<Value>,
}

impl Fold {
    pub fn new(op: FoldOp) -> Self {
        Self {
            op,
            args: Vec::new(),
        }
    }
}

impl Serialize for Fold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(1 + self.args.len()))?;
        seq.serialize_element(self.op.as_str())?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

/// Parameters of a `quantize_uint` virtual column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuantizeUint {
    pub backing_column: String,
    pub size: u64,
    pub offset: u64,
}

/// A derived column computed server-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub quantize_uint: QuantizeUint,
}

impl VirtualColumn {
    pub fn quantize_uint(name: impl Into<String>, quantize: QuantizeUint) -> Self {
        Self {
            name: name.into(),
            kind: "quantize_uint",
            quantize_uint: quantize,
        }
    }
}

/// The compiled query sent to the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDocument {
    pub filter: Vec<FilterGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<SortTerm>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fold: BTreeMap<String, Vec<Fold>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub virtual_columns: Vec<VirtualColumn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl QueryDocument {
    /// An empty document; `filter[0]` always exists
    pub fn new() -> Self {
        Self {
            filter: vec![FilterGroup::new()],
            order: Vec::new(),
            group: Vec::new(),
            fold: BTreeMap::new(),
            select: Vec::new(),
            virtual_columns: Vec::new(),
            limit: None,
            offset: None,
            template: None,
            set: BTreeMap::new(),
            table: None,
        }
    }

    /// The primary filter group
    pub fn primary_filter(&self) -> &FilterGroup {
        &self.filter[0]
    }

    pub fn primary_filter_mut(&mut self) -> &mut FilterGroup {
        &mut self.filter[0]
    }

    /// Append a fold to a column
    pub fn add_fold(&mut self, column: impl Into<String>, fold: Fold) {
        self.fold.entry(column.into()).or_default().push(fold);
    }
}

impl Default for QueryDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// What gets sent: either a compiled document or a caller-supplied raw query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryRequest {
    Document(QueryDocument),
    Raw(Value),
}

impl QueryRequest {
    /// The compiled document, if this is not a raw passthrough
    pub fn document(&self) -> Option<&QueryDocument> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_document_serializes_filter_only() {
        let doc = QueryDocument::new();
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"filter": [{}]}));
    }

    #[test]
    fn test_predicate_shapes() {
        let bare = Predicate::new("is-set");
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!(["is-set"]));

        let with_operand = Predicate::new("equal").with_operand("linux");
        assert_eq!(
            serde_json::to_value(&with_operand).unwrap(),
            json!(["equal", "linux"])
        );

        let flagged = Predicate::new("contains")
            .with_operand("Crash")
            .with_flag(FilterFlag::CaseInsensitive);
        assert_eq!(
            serde_json::to_value(&flagged).unwrap(),
            json!(["contains", "Crash", {"case_insensitive": true}])
        );
    }

    #[test]
    fn test_sort_term_parse() {
        assert_eq!(
            SortTerm::parse("-count").unwrap(),
            SortTerm {
                name: "count".to_string(),
                ordering: Ordering::Descending
            }
        );
        assert_eq!(SortTerm::parse("count").unwrap().ordering, Ordering::Ascending);
        assert_eq!(
            serde_json::to_value(SortTerm::parse("-count").unwrap()).unwrap(),
            json!({"name": "count", "ordering": "descending"})
        );
    }

    #[test]
    fn test_sort_term_requires_name() {
        for token in ["", "-", " ", "- "] {
            assert_eq!(
                SortTerm::parse(token),
                Err(QueryError::InvalidSortTerm(token.to_string()))
            );
        }
    }

    #[test]
    fn test_fold_and_virtual_column_shapes() {
        let mut fold = Fold::new(FoldOp::Bin);
        fold.args = vec![json!(32), json!(100), json!(200)];
        assert_eq!(serde_json::to_value(&fold).unwrap(), json!(["bin", 32, 100, 200]));

        let column = VirtualColumn::quantize_uint(
            "day",
            QuantizeUint {
                backing_column: "timestamp".to_string(),
                size: 86400,
                offset: 0,
            },
        );
        assert_eq!(
            serde_json::to_value(&column).unwrap(),
            json!({
                "name": "day",
                "type": "quantize_uint",
                "quantize_uint": {"backing_column": "timestamp", "size": 86400, "offset": 0}
            })
        );
    }

    #[test]
    fn test_flag_tokens() {
        assert_eq!(
            FilterFlag::from_token("case-insensitive"),
            Some(FilterFlag::CaseInsensitive)
        );
        assert_eq!(
            FilterFlag::from_token("case_insensitive"),
            Some(FilterFlag::CaseInsensitive)
        );
        assert_eq!(FilterFlag::from_token("loud"), None);
    }

    #[test]
    fn test_raw_request_serializes_verbatim() {
        let raw = json!({"filter": [{"x": [["equal", "1"]]}], "custom": true});
        let request = QueryRequest::Raw(raw.clone());
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
        assert!(request.document().is_none());
    }
}
