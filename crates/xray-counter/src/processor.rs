//! Per-row processing: flag check, parameter parsing, query, result mapping.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::TestCountApi;
use crate::config::ErrorOutput;
use crate::error::{AuthError, CountError, RowError};
use crate::params::ParameterShape;
use crate::query::QueryBuilder;
use crate::table::{CellValue, Record};

/// Column gating which rows are queried.
pub const AUTOMATION_FLAG_COLUMN: &str = "AUTO_DATA_AUTOMATICALLY";

/// Flag value that enables a row.
pub const AUTOMATION_FLAG_ENABLED: &str = "Y";

/// An input column and the column its result is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPair {
    pub input: String,
    pub output: String,
}

impl ColumnPair {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Final state of one column pair in one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Flag was not `Y`; nothing was attempted.
    Skipped,
    Counted(u64),
    Failed(RowError),
}

impl RowOutcome {
    /// Render into an output cell under the given error policy.
    #[must_use]
    pub fn into_cell(self, policy: ErrorOutput) -> CellValue {
        match self {
            Self::Skipped => CellValue::Null,
            Self::Counted(total) => CellValue::Count(total),
            Self::Failed(err) => match policy {
                ErrorOutput::Marker => CellValue::Text(err.to_string()),
                ErrorOutput::Null => CellValue::Null,
            },
        }
    }
}

/// Whether the row's automation flag enables processing.
#[must_use]
pub fn is_enabled(record: &Record<'_>) -> bool {
    record
        .get(AUTOMATION_FLAG_COLUMN)
        .is_some_and(|flag| flag.trim() == AUTOMATION_FLAG_ENABLED)
}

/// Turns one input record into one outcome per configured column pair.
pub struct RowProcessor {
    api: Arc<dyn TestCountApi>,
    pairs: Vec<ColumnPair>,
    shape: ParameterShape,
    builder: QueryBuilder,
    error_output: ErrorOutput,
}

impl RowProcessor {
    pub fn new(api: Arc<dyn TestCountApi>, pairs: Vec<ColumnPair>) -> Self {
        Self {
            api,
            pairs,
            shape: ParameterShape::Triple,
            builder: QueryBuilder::new(),
            error_output: ErrorOutput::default(),
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ParameterShape) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn with_query_builder(mut self, builder: QueryBuilder) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_error_output(mut self, error_output: ErrorOutput) -> Self {
        self.error_output = error_output;
        self
    }

    #[must_use]
    pub fn pairs(&self) -> &[ColumnPair] {
        &self.pairs
    }

    #[must_use]
    pub fn error_output(&self) -> ErrorOutput {
        self.error_output
    }

    /// Process every column pair of a row. Pairs are independent: a failure
    /// in one does not affect the other.
    ///
    /// # Errors
    /// Returns [`AuthError`] when credentials are rejected; the run must stop.
    pub async fn process(&self, row: usize, record: Record<'_>) -> Result<Vec<RowOutcome>, AuthError> {
        if !is_enabled(&record) {
            debug!(row, "Automation flag not set, skipping row");
            return Ok(vec![RowOutcome::Skipped; self.pairs.len()]);
        }

        let mut outcomes = Vec::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            outcomes.push(self.process_pair(row, pair, record.get(&pair.input)).await?);
        }
        Ok(outcomes)
    }

    async fn process_pair(
        &self,
        row: usize,
        pair: &ColumnPair,
        cell: Option<&str>,
    ) -> Result<RowOutcome, AuthError> {
        let params = match self.shape.parse(cell) {
            Ok(params) => params,
            Err(err) => {
                warn!(row, column = %pair.input, error = %err, "Failed to parse input data");
                return Ok(RowOutcome::Failed(err));
            }
        };

        debug!(
            row,
            project_id = %params.project_id,
            folder_path = %params.folder_path,
            jql = %params.jql_query,
            "Parsed parameters"
        );

        let query = self.builder.build(&params);
        match self.api.count_tests(&query).await {
            Ok(total) => {
                debug!(row, column = %pair.output, total, "Xray API success");
                Ok(RowOutcome::Counted(total))
            }
            Err(CountError::Auth(err)) => Err(err),
            Err(CountError::Api(err)) => {
                warn!(
                    row,
                    project_id = %params.project_id,
                    folder_path = %params.folder_path,
                    jql = %params.jql_query,
                    error = %err,
                    "Error calling Xray API"
                );
                Ok(RowOutcome::Failed(RowError::Api(err.to_string())))
            }
        }
    }
}
