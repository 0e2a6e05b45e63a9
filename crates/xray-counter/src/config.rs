//! Component configuration.
//!
//! `config.json` carries a `parameters` object (validated into
//! [`Configuration`]) and a `storage` object with the output table mapping.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{redact, ClientOptions, Credentials, Endpoints, RetryPolicy, XRAY_BASE_URL};
use crate::error::ConfigError;
use crate::params::ParameterShape;
use crate::processor::ColumnPair;
use crate::query::QueryBuilder;

pub const DEFAULT_PROXY_ADDRESS: &str = "10.254.0.12";
pub const DEFAULT_PROXY_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on rows in flight, to stay within Xray rate limits.
pub const MAX_CONCURRENCY: usize = 10;

/// What a failed row writes into its output column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOutput {
    /// The error string, e.g. `API_ERROR: ...`.
    #[default]
    Marker,
    /// An empty cell.
    Null,
}

/// Top-level `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentConfig {
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ComponentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn configuration(&self) -> Result<Configuration, ConfigError> {
        Configuration::from_parameters(self.parameters.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub output: OutputStorage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputStorage {
    #[serde(default)]
    pub tables: Vec<OutputMapping>,
}

/// One entry of the output table mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputMapping {
    /// File name under `out/tables`.
    pub source: String,
    /// Destination table id in storage.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

/// Parameters as written by the user, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameters {
    #[serde(rename = "#xray_client_id")]
    xray_client_id: Option<String>,
    #[serde(rename = "#xray_client_secret")]
    xray_client_secret: Option<String>,
    #[serde(alias = "jql_input_column")]
    input_column_name: Option<String>,
    #[serde(alias = "result_output_column")]
    output_column_name: Option<String>,
    input_column_name_2: Option<String>,
    output_column_name_2: Option<String>,
    project_id: Option<String>,
    folder_path: Option<String>,
    include_descendants: bool,
    use_proxy: bool,
    proxy_address: Option<String>,
    proxy_port: Option<u16>,
    incremental: bool,
    debug: bool,
    error_output: ErrorOutput,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
    xray_base_url: Option<String>,
}

/// HTTP proxy for API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub address: String,
    pub port: u16,
}

impl ProxyConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Validated component parameters.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub credentials: Credentials,
    /// One or two input/output column pairs.
    pub columns: Vec<ColumnPair>,
    pub shape: ParameterShape,
    pub include_descendants: bool,
    pub proxy: Option<ProxyConfig>,
    pub incremental: bool,
    pub debug: bool,
    pub error_output: ErrorOutput,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout: Duration,
    pub xray_base_url: String,
    client_id_hint: String,
    client_secret_hint: String,
}

impl Configuration {
    /// Validate a `parameters` object, reporting every problem at once.
    pub fn from_parameters(parameters: Value) -> Result<Self, ConfigError> {
        let raw: RawParameters = if parameters.is_null() {
            RawParameters::default()
        } else {
            serde_json::from_value(parameters)?
        };

        let mut problems = Vec::new();
        let client_id = required(raw.xray_client_id, "#xray_client_id", &mut problems);
        let client_secret = required(raw.xray_client_secret, "#xray_client_secret", &mut problems);
        let input = required(raw.input_column_name, "input_column_name", &mut problems);
        let output = required(raw.output_column_name, "output_column_name", &mut problems);

        let mut columns = vec![ColumnPair::new(input, output)];
        match (non_empty(raw.input_column_name_2), non_empty(raw.output_column_name_2)) {
            (Some(input), Some(output)) => columns.push(ColumnPair::new(input, output)),
            (None, None) => {}
            _ => problems.push(
                "input_column_name_2: must be set together with output_column_name_2".to_string(),
            ),
        }
        if columns.len() == 2 && !columns[0].output.is_empty() && columns[0].output == columns[1].output {
            problems.push("output_column_name_2: must differ from output_column_name".to_string());
        }

        let shape = match (non_empty(raw.project_id), non_empty(raw.folder_path)) {
            (Some(project_id), folder_path) => ParameterShape::Global {
                project_id,
                folder_path: folder_path.unwrap_or_default(),
            },
            (None, Some(_)) => {
                problems.push("folder_path: requires project_id".to_string());
                ParameterShape::Triple
            }
            (None, None) => ParameterShape::Triple,
        };

        let concurrency = raw.concurrency.unwrap_or(1);
        if !(1..=MAX_CONCURRENCY).contains(&concurrency) {
            problems.push(format!("concurrency: must be between 1 and {MAX_CONCURRENCY}"));
        }

        let timeout_secs = raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            problems.push("timeout_secs: must be greater than 0".to_string());
        }

        let proxy = raw.use_proxy.then(|| ProxyConfig {
            address: non_empty(raw.proxy_address).unwrap_or_else(|| DEFAULT_PROXY_ADDRESS.to_string()),
            port: raw.proxy_port.unwrap_or(DEFAULT_PROXY_PORT),
        });

        if !problems.is_empty() {
            return Err(ConfigError::Validation(problems));
        }

        Ok(Self {
            client_id_hint: redact(&client_id),
            client_secret_hint: redact(&client_secret),
            credentials: Credentials::new(client_id, client_secret),
            columns,
            shape,
            include_descendants: raw.include_descendants,
            proxy,
            incremental: raw.incremental,
            debug: raw.debug,
            error_output: raw.error_output,
            concurrency,
            max_retries: raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            timeout: Duration::from_secs(timeout_secs),
            xray_base_url: non_empty(raw.xray_base_url).unwrap_or_else(|| XRAY_BASE_URL.to_string()),
        })
    }

    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            endpoints: Endpoints::from_base(&self.xray_base_url),
            timeout: self.timeout,
            proxy: self.proxy.as_ref().map(ProxyConfig::url),
            retry: RetryPolicy::default().with_max_retries(self.max_retries),
            log_responses: self.debug,
            ..ClientOptions::default()
        }
    }

    #[must_use]
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new().include_descendants(self.include_descendants)
    }

    /// Output column names in pair order.
    #[must_use]
    pub fn output_columns(&self) -> Vec<String> {
        self.columns.iter().map(|pair| pair.output.clone()).collect()
    }

    /// Log the effective parameters. Secrets only show their last characters.
    pub fn log_summary(&self) {
        info!(
            debug = self.debug,
            incremental = self.incremental,
            concurrency = self.concurrency,
            error_output = ?self.error_output,
            "Loaded parameters"
        );
        for pair in &self.columns {
            info!(input = %pair.input, output = %pair.output, "Column mapping");
        }
        if let ParameterShape::Global {
            project_id,
            folder_path,
        } = &self.shape
        {
            info!(project_id = %project_id, folder_path = %folder_path, "Using global project parameters");
        }
        if let Some(proxy) = &self.proxy {
            info!(proxy = %proxy.url(), "Using HTTP proxy");
        }
        debug!(
            client_id = %self.client_id_hint,
            client_secret = %self.client_secret_hint,
            "Xray credentials"
        );
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &str, problems: &mut Vec<String>) -> String {
    non_empty(value).unwrap_or_else(|| {
        problems.push(format!("{name}: field required"));
        String::new()
    })
}
