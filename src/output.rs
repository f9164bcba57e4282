//! Result rendering
//!
//! Plain table, CSV and JSON renderings of a decoded [`ResultSet`].

use crate::crdb::{unwrap_unique, GroupBody, Record, ResultSet, OBJECT_FIELD};
use crate::query::QueryContext;
use chrono::DateTime;
use serde_json::Value;
use std::fmt::{self, Write as _};

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

/// Render in the requested format
pub fn render(result: &ResultSet, context: &QueryContext, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Table => render_table(result, context),
        Format::Json => Ok(serde_json::to_string_pretty(result)? + "\n"),
        Format::Csv => render_csv(result, context),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn format_epoch(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn ordered_groups<'a>(
    result: &'a ResultSet,
    context: &QueryContext,
) -> Box<dyn Iterator<Item = &'a crate::crdb::Group> + 'a> {
    if context.reverse {
        Box::new(result.iter().rev())
    } else {
        Box::new(result.iter())
    }
}

/// Human-readable table
pub fn render_table(result: &ResultSet, context: &QueryContext) -> anyhow::Result<String> {
    let mut out = String::new();
    write_table(&mut out, result, context)?;
    Ok(out)
}

fn write_table(out: &mut String, result: &ResultSet, context: &QueryContext) -> fmt::Result {
    if let Some(window) = context.window() {
        writeln!(
            out,
            "Range: {} .. {}",
            format_epoch(window.start),
            format_epoch(window.stop)
        )?;
    }

    if result.is_empty() {
        return writeln!(out, "No results");
    }

    for group in ordered_groups(result, context) {
        match &group.body {
            GroupBody::Objects(rows) => {
                writeln!(out, "{} ({} objects)", group.key, rows.len())?;
                write_object_rows(out, result.columns(), rows)?;
            }
            GroupBody::Aggregate(record) => {
                match record.count {
                    Some(count) => writeln!(out, "{} (count {})", group.key, count)?,
                    None => writeln!(out, "{}", group.key)?,
                }
                for (name, value) in &record.fields {
                    writeln!(out, "  {:<24} {}", name, display(unwrap_unique(name, value)))?;
                }
            }
        }
    }

    Ok(())
}

fn write_object_rows(out: &mut String, columns: &[String], rows: &[Record]) -> fmt::Result {
    write!(out, "  {:<12}", OBJECT_FIELD)?;
    for column in columns {
        write!(out, " | {:<16}", column)?;
    }
    writeln!(out)?;
    writeln!(out, "  {}", "-".repeat(12 + columns.len() * 19))?;

    for row in rows {
        let id = row
            .get(OBJECT_FIELD)
            .and_then(Value::as_u64)
            .map(|id| format!("{:x}", id))
            .unwrap_or_else(|| "-".to_string());
        write!(out, "  {:<12}", id)?;
        for column in columns {
            write!(out, " | {:<16}", row.get(column).map(display).unwrap_or_default())?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// One CSV line per row, prefixed by the group key
pub fn render_csv(result: &ResultSet, context: &QueryContext) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let object_mode = result
        .iter()
        .any(|g| matches!(g.body, GroupBody::Objects(_)));

    let id_column = if object_mode { OBJECT_FIELD } else { "count" };
    let mut header = vec!["group".to_string(), id_column.to_string()];
    header.extend(result.columns().iter().cloned());
    writer.write_record(&header)?;

    for group in ordered_groups(result, context) {
        match &group.body {
            GroupBody::Objects(rows) => {
                for row in rows {
                    let mut line = vec![group.key.clone()];
                    line.push(row.get(OBJECT_FIELD).map(display).unwrap_or_default());
                    line.extend(
                        result
                            .columns()
                            .iter()
                            .map(|c| row.get(c).map(display).unwrap_or_default()),
                    );
                    writer.write_record(&line)?;
                }
            }
            GroupBody::Aggregate(record) => {
                let mut line = vec![group.key.clone()];
                line.push(record.count.map(|c| c.to_string()).unwrap_or_default());
                line.extend(
                    result
                        .columns()
                        .iter()
                        .map(|c| {
                            record
                                .fields
                                .get(c)
                                .map(|value| display(unwrap_unique(c, value)))
                                .unwrap_or_default()
                        }),
                );
                writer.write_record(&line)?;
            }
        }
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
