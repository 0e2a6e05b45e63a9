//! Error types for the Xray test counter.
//!
//! Errors are split by blast radius: [`RowError`] is recorded in the output
//! column and never stops a run, while [`AuthError`], [`ConfigError`] and
//! [`TableError`] abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

/// Per-row failure, rendered verbatim into the output column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// The input cell was missing or blank.
    #[error("ERROR: Empty input data")]
    EmptyInput,

    /// The input cell was not a valid parameter triple.
    #[error("PARSE_ERROR: {0}")]
    Parse(String),

    /// The API call failed after retries.
    #[error("API_ERROR: {0}")]
    Api(String),
}

/// Failure of a single request against the Xray API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request hit the client timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or broke mid-request.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport-level failure (invalid request, redirect loop...).
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("Xray API returned error status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response carried a top-level `errors` array.
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// The body was not the JSON we expected.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// `data.getTests.total` was absent or null.
    #[error("response does not contain data.getTests.total")]
    MissingTotal,

    /// `data.getTests.total` was present but not a non-negative integer.
    #[error("invalid total in response: {0}")]
    InvalidTotal(String),
}

impl ApiError {
    /// Whether another attempt may succeed: timeouts, connection failures,
    /// rate limiting and server errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the bearer token was rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Connect(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The client-credentials exchange failed. Fatal for the run.
#[derive(Debug, Error)]
#[error("Xray authentication failed: {0}")]
pub struct AuthError(pub String);

/// Why a count call produced no total.
#[derive(Debug, Error)]
pub enum CountError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Configuration could not be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Every validation problem found, reported together.
    #[error("Validation Error: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// Row source or sink failure.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("input table is missing the required column '{column}'. Available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("no input table found in {0}. Please map exactly one input table")]
    NoInputTable(PathBuf),

    #[error("incremental loading requested but no primary key is defined in the output table mapping")]
    IncrementalWithoutPrimaryKey,

    #[error("failed to write manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Run-level failure of the pipeline driver.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_markers() {
        assert_eq!(RowError::EmptyInput.to_string(), "ERROR: Empty input data");
        assert_eq!(
            RowError::Parse("bad".to_string()).to_string(),
            "PARSE_ERROR: bad"
        );
        assert_eq!(
            RowError::Api("GraphQL errors: boom".to_string()).to_string(),
            "API_ERROR: GraphQL errors: boom"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Connect("reset".into()).is_transient());
        for status in [429, 500, 502, 503, 504] {
            let err = ApiError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
        for status in [400, 401, 403, 404] {
            let err = ApiError::Status {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "{status} should be permanent");
        }
        assert!(!ApiError::GraphQl("x".into()).is_transient());
        assert!(!ApiError::MissingTotal.is_transient());
    }

    #[test]
    fn test_unauthorized() {
        let err = ApiError::Status {
            status: 401,
            body: String::new(),
        };
        assert!(err.is_unauthorized());
        assert!(!ApiError::Timeout.is_unauthorized());
    }

    #[test]
    fn test_validation_message_joins_problems() {
        let err = ConfigError::Validation(vec![
            "#xray_client_id: field required".to_string(),
            "output_column_name: field required".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation Error: #xray_client_id: field required, output_column_name: field required"
        );
    }
}
