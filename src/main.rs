//! crashq CLI
//!
//! Command-line interface for the crash-analytics query service:
//! - List crashes and aggregates
//! - Apply set mutations to matching objects
//! - Convert timespecs
//! - Generate a config file

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crashq::client::ServiceClient;
use crashq::config::{Config, LoggingConfig};
use crashq::output::{render, Format};
use crashq::query::{seconds_to_timespec, timespec_to_seconds, FoldOp, QueryBuilder, QueryOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crashq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query a crash-analytics service from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/crashq/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Query service URL
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Universe (tenant) name
    #[arg(long, global = true)]
    pub universe: Option<String>,

    /// API token
    #[arg(long, global = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List objects or aggregates matching a query
    List {
        /// Project name (default: from config)
        project: Option<String>,
        #[command(flatten)]
        query: QueryArgs,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: Format,
        /// Print the compiled query document instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Set attributes on objects matching a query
    Set {
        /// Project name
        project: String,
        /// Assignments in column=value format
        #[arg(required = true)]
        assignments: Vec<String>,
        #[command(flatten)]
        query: QueryArgs,
        /// Print the compiled query document instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Convert a timespec (e.g. 1d12h) to seconds and canonical form
    Timespec {
        value: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Query options shared by every querying command
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Filter in column,operator[,value[,flags...]] format (repeatable)
    #[arg(short, long = "filter")]
    pub filter: Vec<String>,
    /// Only objects younger than this (e.g. 7d, 12h); default 1M
    #[arg(long)]
    pub age: Option<String>,
    /// Explicit range, e.g. "2024-01-01 to 2024-02-01"
    #[arg(long)]
    pub time: Option<String>,
    /// Sort column; prefix with - for descending (repeatable)
    #[arg(long)]
    pub sort: Vec<String>,
    /// Columns to project (repeatable, comma-separated)
    #[arg(long)]
    pub select: Vec<String>,
    /// Group results by this column
    #[arg(long)]
    pub factor: Option<String>,
    /// Fingerprint or fingerprint prefix
    #[arg(long)]
    pub fingerprint: Option<String>,
    /// Virtual column: name,backing_column,size[,offset]
    #[arg(long = "quantize-uint")]
    pub quantize_uint: Vec<String>,
    #[arg(long)]
    pub head: Vec<String>,
    #[arg(long)]
    pub tail: Vec<String>,
    #[arg(long)]
    pub unique: Vec<String>,
    #[arg(long)]
    pub histogram: Vec<String>,
    #[arg(long)]
    pub distribution: Vec<String>,
    #[arg(long)]
    pub sum: Vec<String>,
    #[arg(long)]
    pub range: Vec<String>,
    #[arg(long)]
    pub bin: Vec<String>,
    #[arg(long)]
    pub min: Vec<String>,
    #[arg(long)]
    pub max: Vec<String>,
    #[arg(long)]
    pub mean: Vec<String>,
    #[arg(long)]
    pub limit: Option<u64>,
    #[arg(long)]
    pub offset: Option<u64>,
    #[arg(long)]
    pub template: Option<String>,
    /// Table to query (default: objects)
    #[arg(long)]
    pub table: Option<String>,
    /// Send this JSON query verbatim
    #[arg(long = "raw-query")]
    pub raw_query: Option<String>,
    /// Reverse group order in output
    #[arg(long)]
    pub reverse: bool,
}

impl QueryArgs {
    fn into_options(self, set: Vec<String>) -> QueryOptions {
        let fold_lists = [
            (FoldOp::Head, self.head),
            (FoldOp::Tail, self.tail),
            (FoldOp::Unique, self.unique),
            (FoldOp::Histogram, self.histogram),
            (FoldOp::Distribution, self.distribution),
            (FoldOp::Sum, self.sum),
            (FoldOp::Range, self.range),
            (FoldOp::Bin, self.bin),
            (FoldOp::Min, self.min),
            (FoldOp::Max, self.max),
            (FoldOp::Mean, self.mean),
        ];
        let folds = fold_lists
            .into_iter()
            .flat_map(|(op, columns)| columns.into_iter().map(move |column| (op, column)))
            .collect();

        QueryOptions {
            raw_query: self.raw_query,
            table: self.table,
            filters: self.filter,
            age: self.age,
            time: self.time,
            sort: self.sort,
            select: self.select,
            factor: self.factor,
            folds,
            fingerprint: self.fingerprint,
            quantize_uint: self.quantize_uint,
            limit: self.limit,
            offset: self.offset,
            template: self.template,
            set,
            reverse: self.reverse,
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("crashq={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.service.endpoint = endpoint;
    }
    if let Some(universe) = cli.universe {
        config.service.universe = universe;
    }
    if let Some(token) = cli.token {
        config.service.token = Some(token);
    }
    init_logging(&config.logging);

    match cli.command {
        Commands::List {
            project,
            query,
            format,
            dry_run,
        } => {
            let compiled = QueryBuilder::new(query.into_options(Vec::new())).build()?;

            if dry_run {
                println!("{}", serde_json::to_string_pretty(&compiled.request)?);
                return Ok(());
            }

            let project = project
                .or_else(|| config.service.project.clone())
                .context("no project given and none configured")?;

            let client = ServiceClient::new(config.service)?;
            let raw = client.query(&project, &compiled.request).await?;
            let result = crashq::crdb::decode(&raw)?;
            print!("{}", render(&result, &compiled.context, format)?);
        }

        Commands::Set {
            project,
            assignments,
            query,
            dry_run,
        } => {
            let compiled = QueryBuilder::new(query.into_options(assignments)).build()?;

            if dry_run {
                println!("{}", serde_json::to_string_pretty(&compiled.request)?);
                return Ok(());
            }

            let client = ServiceClient::new(config.service)?;
            let raw = client.query(&project, &compiled.request).await?;
            let result = crashq::crdb::decode(&raw)?;
            println!("Updated {} objects in {} groups", result.row_count(), result.len());
        }

        Commands::Timespec { value } => {
            let seconds = timespec_to_seconds(&value)?;
            println!("{} seconds ({})", seconds, seconds_to_timespec(seconds));
        }

        Commands::Config { output } => {
            let config = crashq::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_list() {
        let cli = Cli::try_parse_from([
            "crashq",
            "list",
            "mobile",
            "--filter",
            "hostname,equal,web-1",
            "--sort=-count",
            "--unique",
            "hostname",
            "--age",
            "7d",
            "--format",
            "csv",
        ])
        .unwrap();

        let Commands::List { project, query, format, .. } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(project.as_deref(), Some("mobile"));
        assert_eq!(format, Format::Csv);

        let options = query.into_options(Vec::new());
        assert_eq!(options.filters, vec!["hostname,equal,web-1".to_string()]);
        assert_eq!(options.sort, vec!["-count".to_string()]);
        assert_eq!(options.folds, vec![(FoldOp::Unique, "hostname".to_string())]);
        assert_eq!(options.age.as_deref(), Some("7d"));
    }

    #[test]
    fn test_cli_parses_set() {
        let cli = Cli::try_parse_from([
            "crashq",
            "set",
            "mobile",
            "state=resolved",
            "--fingerprint",
            "abc",
        ])
        .unwrap();

        let Commands::Set { assignments, query, .. } = cli.command else {
            panic!("expected set");
        };
        let options = query.into_options(assignments);
        assert_eq!(options.set, vec!["state=resolved".to_string()]);
        assert_eq!(options.fingerprint.as_deref(), Some("abc"));
    }
}
