//! Table connector that enriches rows with Xray Cloud test counts.
//!
//! For every row whose `AUTO_DATA_AUTOMATICALLY` flag is `Y`, the configured
//! input column is parsed as `[project_id, folder_path, jql_query]`, turned
//! into a `getTests` GraphQL query and sent to Xray Cloud. The returned
//! `total` (or an error marker) lands in the configured output column.
//!
//! This crate provides:
//! - Parameter parsing ([`params`]) and query building ([`query`])
//! - An Xray client with a shared token cache and retry loop ([`client`])
//! - Per-row processing ([`processor`]) and the pipeline driver ([`pipeline`])
//! - CSV table I/O and the component data directory ([`table`], [`datadir`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xray_counter::client::{ClientOptions, Credentials, XrayClient};
//! use xray_counter::pipeline::Pipeline;
//! use xray_counter::processor::{ColumnPair, RowProcessor};
//! use xray_counter::table::Table;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = XrayClient::new(Credentials::new("id", "secret"), ClientOptions::default())?;
//! let processor = RowProcessor::new(Arc::new(client), vec![ColumnPair::new("PARAMS", "TEST_COUNT")]);
//! let input = Table::read_csv("rows.csv".as_ref())?;
//! let (_output, summary) = Pipeline::new(processor).run(&input).await?;
//! println!("{} rows counted", summary.counted);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod component;
pub mod config;
pub mod datadir;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod processor;
pub mod query;
pub mod table;

pub use client::{TestCountApi, XrayClient};
pub use config::{ComponentConfig, Configuration, ErrorOutput};
pub use error::{ApiError, AuthError, ConfigError, CountError, RowError, RunError, TableError};
pub use params::{ParameterShape, RowParameters};
pub use pipeline::{Pipeline, RunSummary};
pub use processor::{ColumnPair, RowOutcome, RowProcessor};
pub use query::{build_query, QueryBuilder};
pub use table::{CellValue, OutputTable, Table};
