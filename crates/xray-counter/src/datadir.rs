//! Component data directory layout.
//!
//! ```text
//! <data>/config.json
//! <data>/in/tables/*.csv
//! <data>/out/tables/<source>.csv
//! <data>/out/tables/<source>.csv.manifest
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ComponentConfig, OutputMapping};
use crate::error::{ConfigError, TableError};
use crate::table::OutputTable;

/// Environment variable pointing at the data directory.
pub const DATA_DIR_ENV: &str = "KBC_DATADIR";

/// Default data directory inside the component container.
pub const DEFAULT_DATA_DIR: &str = "/data";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    #[must_use]
    pub fn input_tables_dir(&self) -> PathBuf {
        self.root.join("in").join("tables")
    }

    #[must_use]
    pub fn output_tables_dir(&self) -> PathBuf {
        self.root.join("out").join("tables")
    }

    pub fn load_config(&self) -> Result<ComponentConfig, ConfigError> {
        ComponentConfig::load(&self.config_path())
    }

    /// The first input table by file name. Extra tables are ignored.
    pub fn input_table(&self) -> Result<PathBuf, TableError> {
        let dir = self.input_tables_dir();
        let entries = fs::read_dir(&dir).map_err(|source| TableError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut tables: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        tables.sort();

        if tables.len() > 1 {
            warn!(
                count = tables.len(),
                "More than one input table mapped, processing the first one"
            );
        }

        let table = tables
            .into_iter()
            .next()
            .ok_or_else(|| TableError::NoInputTable(dir.clone()))?;
        debug!(path = %table.display(), "Input table");
        Ok(table)
    }

    /// Resolve where the output goes, from the first output mapping or,
    /// without one, the input table's file name.
    #[must_use]
    pub fn output_table(
        &self,
        mappings: &[OutputMapping],
        input: &Path,
        incremental: bool,
    ) -> OutputTableDefinition {
        if mappings.len() > 1 {
            warn!(
                count = mappings.len(),
                "More than one output table defined, using the first one"
            );
        }

        let (file_name, destination, primary_key) = match mappings.first() {
            Some(mapping) => (
                mapping.source.clone(),
                mapping.destination.clone(),
                mapping.primary_key.clone(),
            ),
            None => (
                input
                    .file_name()
                    .map_or_else(|| "output.csv".to_string(), |n| n.to_string_lossy().into_owned()),
                None,
                Vec::new(),
            ),
        };

        OutputTableDefinition {
            path: self.output_tables_dir().join(file_name),
            destination,
            primary_key,
            incremental,
        }
    }
}

/// Where and how the output table is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTableDefinition {
    pub path: PathBuf,
    pub destination: Option<String>,
    pub primary_key: Vec<String>,
    pub incremental: bool,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<&'a str>,
    incremental: bool,
    primary_key: &'a [String],
    has_header: bool,
}

impl OutputTableDefinition {
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".manifest");
        PathBuf::from(name)
    }

    /// Check the definition before any row is processed.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.incremental && self.primary_key.is_empty() {
            return Err(TableError::IncrementalWithoutPrimaryKey);
        }
        Ok(())
    }

    /// Write the CSV and its manifest.
    pub fn write(&self, table: &OutputTable) -> Result<(), TableError> {
        self.validate()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!(path = %self.path.display(), rows = table.rows().len(), "Writing output table");
        table.write_csv(&self.path)?;

        let manifest = Manifest {
            destination: self.destination.as_deref(),
            incremental: self.incremental,
            primary_key: &self.primary_key,
            has_header: true,
        };
        let manifest_path = self.manifest_path();
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?).map_err(|source| {
            TableError::Io {
                path: manifest_path.clone(),
                source,
            }
        })?;
        debug!(path = %manifest_path.display(), "Manifest written");
        Ok(())
    }
}
