//! Compiles CLI options into a query document
//!
//! Compiles CLI-level query options into a [`QueryDocument`] plus the
//! [`QueryContext`] the presentation step needs.
//!
//! # Example
//!
//! ```rust
//! use crashq::query::{QueryBuilder, QueryOptions};
//!
//! let options = QueryOptions {
//!     filters: vec!["hostname,equal,web-1".to_string()],
//!     sort: vec!["-count".to_string()],
//!     factor: Some("fingerprint".to_string()),
//!     age: Some("7d".to_string()),
//!     ..Default::default()
//! };
//!
//! let compiled = QueryBuilder::new(options).build().unwrap();
//! let document = compiled.request.document().unwrap();
//! assert_eq!(document.group, vec!["fingerprint".to_string()]);
//! ```

use crate::query::document::{
    Fold, FoldOp, Predicate, QuantizeUint, QueryDocument, QueryRequest, SortTerm, VirtualColumn,
};
use crate::query::error::{QueryError, QueryResult};
use crate::query::filter::parse_filters;
use crate::query::time::{
    timespec_to_seconds, NaturalRangeSource, RangeSource, TimeRangeResolver, TimeWindow,
    TIMESTAMP_COLUMN,
};
use crate::query::DEFAULT_TABLE;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Number of histogram buckets spread across a resolved time window
pub const BIN_BUCKETS: u64 = 32;

/// Column targeted by the fingerprint convenience filter
const FINGERPRINT_COLUMN: &str = "fingerprint";

/// Raw query options as collected from the command line
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// JSON document sent verbatim, bypassing every other option
    pub raw_query: Option<String>,
    pub table: Option<String>,
    /// `column,operator[,value[,flags...]]` terms
    pub filters: Vec<String>,
    pub age: Option<String>,
    pub time: Option<String>,
    /// `[-]column` terms
    pub sort: Vec<String>,
    pub select: Vec<String>,
    pub factor: Option<String>,
    /// Explicit `(operator, column)` folds
    pub folds: Vec<(FoldOp, String)>,
    pub fingerprint: Option<String>,
    /// `name,backing_column,size[,offset]` terms
    pub quantize_uint: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub template: Option<String>,
    /// `column=value` set-mutation clauses
    pub set: Vec<String>,
    pub reverse: bool,
}

/// Rendering state produced alongside the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub range_start: Option<i64>,
    pub range_stop: Option<i64>,
    pub reverse: bool,
}

impl QueryContext {
    /// The resolved time window, when one is active
    pub fn window(&self) -> Option<TimeWindow> {
        match (self.range_start, self.range_stop) {
            (Some(start), Some(stop)) => Some(TimeWindow { start, stop }),
            _ => None,
        }
    }
}

/// Result of compiling query options
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub request: QueryRequest,
    pub context: QueryContext,
}

/// Builds a query document from [`QueryOptions`]
pub struct QueryBuilder<'a> {
    options: QueryOptions,
    now: DateTime<Utc>,
    source: &'a dyn RangeSource,
}

impl QueryBuilder<'static> {
    /// Create a builder using the current time and the default range parser
    pub fn new(options: QueryOptions) -> Self {
        Self {
            options,
            now: Utc::now(),
            source: &NaturalRangeSource,
        }
    }
}

impl<'a> QueryBuilder<'a> {
    /// Evaluate relative times against a fixed instant
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Use a different `--time` parser
    pub fn range_source<'b>(self, source: &'b dyn RangeSource) -> QueryBuilder<'b> {
        QueryBuilder {
            options: self.options,
            now: self.now,
            source,
        }
    }

    /// Compile the options
    pub fn build(self) -> QueryResult<CompiledQuery> {
        let options = &self.options;

        if let Some(raw) = &options.raw_query {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| QueryError::InvalidRawQuery(e.to_string()))?;
            tracing::debug!("using raw query");
            return Ok(CompiledQuery {
                request: QueryRequest::Raw(value),
                context: QueryContext {
                    reverse: options.reverse,
                    ..Default::default()
                },
            });
        }

        let table = options.table.as_deref().unwrap_or(DEFAULT_TABLE);
        let mut doc = QueryDocument::new();
        if table != DEFAULT_TABLE {
            doc.table = Some(table.to_string());
        }

        let filter = doc.primary_filter_mut();
        parse_filters(options.filters.iter().map(String::as_str), filter)?;
        if let Some(fingerprint) = &options.fingerprint {
            filter
                .entry(FINGERPRINT_COLUMN.to_string())
                .or_default()
                .push(fingerprint_predicate(fingerprint));
        }

        let window = TimeRangeResolver::new(self.source, self.now).resolve(
            options.age.as_deref(),
            options.time.as_deref(),
            table,
            filter,
        )?;

        doc.select = split_list(&options.select);

        for (op, column) in &options.folds {
            doc.add_fold(column.clone(), Fold::new(*op));
        }
        if table == DEFAULT_TABLE && doc.select.is_empty() && options.folds.is_empty() {
            doc.add_fold(TIMESTAMP_COLUMN, Fold::new(FoldOp::Range));
            doc.add_fold(TIMESTAMP_COLUMN, Fold::new(FoldOp::Bin));
        }

        doc.order = options
            .sort
            .iter()
            .map(|s| SortTerm::parse(s))
            .collect::<QueryResult<_>>()?;

        if let Some(factor) = &options.factor {
            doc.group = vec![factor.clone()];
        }

        doc.virtual_columns = options
            .quantize_uint
            .iter()
            .map(|spec| parse_quantize_uint(spec))
            .collect::<QueryResult<_>>()?;

        doc.limit = options.limit;
        doc.offset = options.offset;
        doc.template = options.template.clone();

        for clause in &options.set {
            let (column, value) = parse_set_clause(clause)?;
            doc.set.insert(column, value);
        }

        if let Some(window) = window {
            extend_bin_fold(&mut doc, window);
        }

        let context = QueryContext {
            range_start: window.map(|w| w.start),
            range_stop: window.map(|w| w.stop),
            reverse: options.reverse,
        };

        Ok(CompiledQuery {
            request: QueryRequest::Document(doc),
            context,
        })
    }
}

/// Full fingerprints match exactly; anything shorter is a prefix search
fn fingerprint_predicate(fingerprint: &str) -> Predicate {
    let is_full = fingerprint.len() == 64 && fingerprint.chars().all(|c| c.is_ascii_hexdigit());
    if is_full {
        Predicate::new("equal").with_operand(fingerprint)
    } else {
        Predicate::new("regular-expression").with_operand(format!("^{}", fingerprint))
    }
}

/// Parse `name,backing_column,size[,offset]`
pub fn parse_quantize_uint(spec: &str) -> QueryResult<VirtualColumn> {
    let segments: Vec<&str> = spec.split(',').map(str::trim).collect();
    if segments.len() < 3 || segments.len() > 4 {
        return Err(QueryError::InvalidVirtualColumn(format!(
            "'{}' must be of form name,backing_column,size[,offset]",
            spec
        )));
    }
    if segments[0].is_empty() || segments[1].is_empty() {
        return Err(QueryError::InvalidVirtualColumn(format!(
            "'{}' is missing a column name",
            spec
        )));
    }

    let size = timespec_to_seconds(segments[2])
        .map_err(|_| QueryError::InvalidVirtualColumn(format!("invalid size '{}'", segments[2])))?;
    let offset = match segments.get(3) {
        Some(raw) => timespec_to_seconds(raw)
            .map_err(|_| QueryError::InvalidVirtualColumn(format!("invalid offset '{}'", raw)))?,
        None => 0,
    };

    Ok(VirtualColumn::quantize_uint(
        segments[0],
        QuantizeUint {
            backing_column: segments[1].to_string(),
            size,
            offset,
        },
    ))
}

/// Parse `column=value`; integer values are sent as numbers
fn parse_set_clause(clause: &str) -> QueryResult<(String, Value)> {
    let (column, value) = clause
        .split_once('=')
        .ok_or_else(|| QueryError::InvalidSetClause(clause.to_string()))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(QueryError::InvalidSetClause(clause.to_string()));
    }

    let value = match value.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(value),
    };
    Ok((column.to_string(), value))
}

/// Spread a parameterless `bin` fold on timestamp over the window
fn extend_bin_fold(doc: &mut QueryDocument, window: TimeWindow) {
    let Some(folds) = doc.fold.get_mut(TIMESTAMP_COLUMN) else {
        return;
    };
    for fold in folds
        .iter_mut()
        .filter(|f| f.op == FoldOp::Bin && f.args.is_empty())
    {
        fold.args = vec![
            Value::from(BIN_BUCKETS),
            Value::from(window.start),
            Value::from(window.stop),
        ];
    }
}

fn split_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
