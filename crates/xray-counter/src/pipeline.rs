//! Pipeline driver: runs every row through the processor and assembles the
//! output table.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::error::RunError;
use crate::processor::{RowOutcome, RowProcessor, AUTOMATION_FLAG_COLUMN};
use crate::table::{CellValue, OutputTable, Table};

/// Counts of per-pair outcomes for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub skipped: usize,
    pub counted: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Counted(_) => self.counted += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Drives a [`RowProcessor`] over a table with a bounded number of rows in
/// flight. Output order always matches input order.
pub struct Pipeline {
    processor: RowProcessor,
    concurrency: usize,
}

impl Pipeline {
    #[must_use]
    pub fn new(processor: RowProcessor) -> Self {
        Self {
            processor,
            concurrency: 1,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Process every row of `input`.
    ///
    /// # Errors
    /// Fails if an input column is missing or authentication fails; in the
    /// latter case no further rows are started.
    pub async fn run(&self, input: &Table) -> Result<(OutputTable, RunSummary), RunError> {
        for pair in self.processor.pairs() {
            input.require_column(&pair.input)?;
        }
        if !input.has_column(AUTOMATION_FLAG_COLUMN) {
            warn!(
                column = AUTOMATION_FLAG_COLUMN,
                "Input table has no automation flag column, every row will be skipped"
            );
        }

        info!(rows = input.len(), concurrency = self.concurrency, "Processing rows");

        let outcomes: Vec<Vec<RowOutcome>> = stream::iter(input.records().enumerate())
            .map(|(index, record)| self.processor.process(index + 1, record))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut summary = RunSummary {
            rows: outcomes.len(),
            ..RunSummary::default()
        };
        let policy = self.processor.error_output();
        let cells: Vec<Vec<CellValue>> = outcomes
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|outcome| {
                        summary.record(&outcome);
                        outcome.into_cell(policy)
                    })
                    .collect()
            })
            .collect();

        let output_columns: Vec<String> = self
            .processor
            .pairs()
            .iter()
            .map(|pair| pair.output.clone())
            .collect();

        info!(
            rows = summary.rows,
            skipped = summary.skipped,
            counted = summary.counted,
            failed = summary.failed,
            "Finished processing rows"
        );

        Ok((OutputTable::from_input(input, &output_columns, cells), summary))
    }
}
