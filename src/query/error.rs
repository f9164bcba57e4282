//! Query error types
//!
//! Usage errors raised while compiling CLI options into a query document.
//! All of them are fatal for the invocation.

use thiserror::Error;

/// Errors that can occur while building a query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Filter string did not have at least a column and an operator
    #[error("Filter must be of form column,operation[,value]")]
    FilterForm,

    /// Unrecognized filter flag token
    #[error("Unknown filter flag: {0}")]
    UnknownFilterFlag(String),

    /// `_tx` hex operand could not be decoded
    #[error("Invalid transaction id: {0}")]
    InvalidTransaction(String),

    /// Duration string could not be parsed
    #[error("Invalid timespec: {0}")]
    InvalidTimespec(String),

    /// `--time`/`--age` mixed with an explicit timestamp filter, or with each other
    #[error("Conflicting time constraints: {0}")]
    TimeConflict(String),

    /// Natural-language range could not be resolved to exactly one bounded range
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// `--sort` term with no column name
    #[error("Invalid sort term: '{0}'")]
    InvalidSortTerm(String),

    /// Malformed `--quantize-uint` value
    #[error("Invalid virtual column: {0}")]
    InvalidVirtualColumn(String),

    /// Malformed `key=value` set clause
    #[error("Invalid set clause: {0}")]
    InvalidSetClause(String),

    /// `--raw-query` did not contain valid JSON
    #[error("Invalid raw query: {0}")]
    InvalidRawQuery(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
