//! # crashq
//!
//! Command-line client for a crash-analytics query service.
//!
//! ## Modules
//!
//! - [`query`]: compile CLI filters, time ranges and folds into a query document
//! - [`crdb`]: decode the run-length encoded columnar response
//! - [`client`]: HTTP transport to the query endpoint
//! - [`output`]: table, CSV and JSON rendering
//! - [`config`]: TOML config with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crashq::client::ServiceClient;
//! use crashq::config::Config;
//! use crashq::query::{QueryBuilder, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let client = ServiceClient::new(config.service)?;
//!
//!     let compiled = QueryBuilder::new(QueryOptions {
//!         age: Some("7d".to_string()),
//!         factor: Some("fingerprint".to_string()),
//!         ..Default::default()
//!     })
//!     .build()?;
//!
//!     let raw = client.query("mobile", &compiled.request).await?;
//!     let result = crashq::crdb::decode(&raw)?;
//!     println!("{} groups", result.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod crdb;
pub mod output;
pub mod query;

// Re-export top-level types for convenience
pub use client::{ClientError, ServiceClient};
pub use config::{Config, ConfigError, LoggingConfig, ServiceConfig};
pub use crdb::{decode, CrdbError, GroupBody, RawResponse, ResultSet, RowAccessor};
pub use query::{CompiledQuery, QueryBuilder, QueryContext, QueryDocument, QueryError, QueryOptions};
