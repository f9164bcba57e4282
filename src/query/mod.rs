//! Query compilation
//!
//! Turns command-line query options into the canonical query document sent
//! to the service:
//!
//! - **Filter**: `column,operator[,value[,flags...]]` terms
//! - **Time**: `--age`/`--time` resolution and timespec conversion
//! - **Builder**: grouping, folds, sorting, virtual columns, set clauses
//! - **Document**: the serialized wire shape
//!
//! # Example
//!
//! ```rust
//! use crashq::query::{QueryBuilder, QueryOptions};
//!
//! let compiled = QueryBuilder::new(QueryOptions {
//!     filters: vec!["callstack,contains,abort".to_string()],
//!     ..Default::default()
//! })
//! .build()
//! .unwrap();
//!
//! let json = serde_json::to_string(&compiled.request).unwrap();
//! assert!(json.contains("callstack"));
//! ```

mod builder;
mod document;
mod error;
mod filter;
mod time;

/// Table queried when none is given
pub const DEFAULT_TABLE: &str = "objects";

pub use builder::{
    parse_quantize_uint, CompiledQuery, QueryBuilder, QueryContext, QueryOptions, BIN_BUCKETS,
};
pub use document::{
    FilterFlag, FilterGroup, Fold, FoldOp, Ordering, Predicate, QuantizeUint, QueryDocument,
    QueryRequest, SortTerm, VirtualColumn,
};
pub use error::{QueryError, QueryResult};
pub use filter::{parse_filter, parse_filters};
pub use time::{
    seconds_to_timespec, timespec_to_seconds, CandidateRange, NaturalRangeSource, RangeSource,
    TimeRangeResolver, TimeWindow, DEFAULT_AGE, UNITS,
};
