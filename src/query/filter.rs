//! Filter Term Parser
//!
//! Parses CLI filter terms of the form
//!
//! ```text
//! column,operator[,value[,flags...]]
//! ```
//!
//! into predicates appended to a filter group. Terms on the same column
//! accumulate and are ANDed by the service.

use crate::query::document::{FilterFlag, FilterGroup, Predicate};
use crate::query::error::{QueryError, QueryResult};

/// Column holding transaction ids; accepts `0x` hex operands
const TRANSACTION_COLUMN: &str = "_tx";

/// Parse one filter term and append the resulting predicate to `group`
pub fn parse_filter(term: &str, group: &mut FilterGroup) -> QueryResult<()> {
    let segments: Vec<&str> = term.split(',').collect();
    if segments.len() < 2 {
        return Err(QueryError::FilterForm);
    }

    let column = segments[0].trim();
    let operator = segments[1].trim();
    if column.is_empty() || operator.is_empty() {
        return Err(QueryError::FilterForm);
    }

    let mut predicate = Predicate::new(operator);

    if let Some(&operand) = segments.get(2) {
        let operand = if column == TRANSACTION_COLUMN {
            transaction_operand(operand)?
        } else {
            operand.to_string()
        };
        predicate = predicate.with_operand(operand);
    }

    for token in segments.iter().skip(3) {
        let flag = FilterFlag::from_token(token)
            .ok_or_else(|| QueryError::UnknownFilterFlag(token.trim().to_string()))?;
        predicate = predicate.with_flag(flag);
    }

    tracing::debug!(column, operator, "parsed filter term");
    group.entry(column.to_string()).or_default().push(predicate);
    Ok(())
}

/// Parse a list of filter terms into `group`, stopping at the first error
pub fn parse_filters<'a, I>(terms: I, group: &mut FilterGroup) -> QueryResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    for term in terms {
        parse_filter(term, group)?;
    }
    Ok(())
}

/// `0xHEX` transaction ids are sent as decimal strings
fn transaction_operand(raw: &str) -> QueryResult<String> {
    let trimmed = raw.trim();
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map(|id| id.to_string())
            .map_err(|_| QueryError::InvalidTransaction(raw.to_string())),
        None => Ok(raw.to_string()),
    }
}
