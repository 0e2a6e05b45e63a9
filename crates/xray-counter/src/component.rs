//! End-to-end component run: config → input table → pipeline → output table.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::client::{TestCountApi, XrayClient};
use crate::config::{ComponentConfig, Configuration};
use crate::datadir::DataDir;
use crate::pipeline::{Pipeline, RunSummary};
use crate::processor::RowProcessor;
use crate::table::Table;

/// Build the row processor described by the configuration.
#[must_use]
pub fn processor(config: &Configuration, api: Arc<dyn TestCountApi>) -> RowProcessor {
    RowProcessor::new(api, config.columns.clone())
        .with_shape(config.shape.clone())
        .with_query_builder(config.query_builder())
        .with_error_output(config.error_output)
}

/// Build the Xray client and authenticate once, so bad credentials fail
/// before any row is read.
pub async fn connect(config: &Configuration) -> Result<Arc<XrayClient>> {
    let client = XrayClient::new(config.credentials.clone(), config.client_options())
        .context("Failed to initialize Xray API client")?;
    client
        .authenticate()
        .await
        .context("API Authentication/Initialization Error")?;
    Ok(Arc::new(client))
}

/// Run the component against a data directory.
pub async fn run(
    data_dir: &DataDir,
    component: &ComponentConfig,
    config: &Configuration,
) -> Result<RunSummary> {
    let client = connect(config).await?;
    run_with_api(data_dir, component, config, client).await
}

/// Run the component with an already constructed API client.
pub async fn run_with_api(
    data_dir: &DataDir,
    component: &ComponentConfig,
    config: &Configuration,
    api: Arc<dyn TestCountApi>,
) -> Result<RunSummary> {
    let input_path = data_dir.input_table()?;
    let output = data_dir.output_table(&component.storage.output.tables, &input_path, config.incremental);
    output.validate()?;

    let input = Table::read_csv(&input_path)?;
    info!(path = %input_path.display(), rows = input.len(), "Input table loaded");

    let pipeline = Pipeline::new(processor(config, api)).with_concurrency(config.concurrency);
    let (table, summary) = pipeline.run(&input).await?;

    output.write(&table)?;
    info!(path = %output.path.display(), "Output table written");

    Ok(summary)
}
