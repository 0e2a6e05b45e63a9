//! Decoding of the per-row parameter cell.
//!
//! The primary shape is a JSON array `[project_id, folder_path, jql_query]`
//! in every row. A reduced shape takes project and folder from configuration
//! and reads only the JQL fragment from the cell.

use serde_json::Value;

use crate::error::RowError;

const ARITY_MESSAGE: &str = "Input must be JSON array with exactly 3 elements";

/// Validated query parameters for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowParameters {
    /// Jira project id or key. Never empty.
    pub project_id: String,
    /// Xray repository folder. Empty means no folder filter.
    pub folder_path: String,
    /// JQL filter. Empty means no JQL filter.
    pub jql_query: String,
}

impl RowParameters {
    pub fn new(
        project_id: impl Into<String>,
        folder_path: impl Into<String>,
        jql_query: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            folder_path: folder_path.into(),
            jql_query: jql_query.into(),
        }
    }

    #[must_use]
    pub fn folder(&self) -> Option<&str> {
        (!self.folder_path.is_empty()).then_some(self.folder_path.as_str())
    }

    #[must_use]
    pub fn jql(&self) -> Option<&str> {
        (!self.jql_query.is_empty()).then_some(self.jql_query.as_str())
    }
}

/// How an input cell is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParameterShape {
    /// Each cell holds the full JSON triple.
    #[default]
    Triple,
    /// Project and folder are fixed for the run; the cell holds only JQL.
    Global {
        project_id: String,
        folder_path: String,
    },
}

impl ParameterShape {
    /// Parse a raw cell. `None` means the column was absent from the row.
    pub fn parse(&self, cell: Option<&str>) -> Result<RowParameters, RowError> {
        let raw = cell
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RowError::EmptyInput)?;

        match self {
            Self::Triple => parse_triple(raw),
            Self::Global {
                project_id,
                folder_path,
            } => Ok(RowParameters::new(
                project_id.clone(),
                folder_path.clone(),
                raw,
            )),
        }
    }
}

/// Decode a `[project_id, folder_path, jql_query]` JSON array. Blank cells
/// are rejected by [`ParameterShape::parse`] before this runs.
fn parse_triple(raw: &str) -> Result<RowParameters, RowError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| RowError::Parse(format!("invalid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(RowError::Parse(ARITY_MESSAGE.to_string()));
    };

    let [project, folder, jql]: [Value; 3] = items
        .try_into()
        .map_err(|_| RowError::Parse(ARITY_MESSAGE.to_string()))?;

    let project_id = string_element(project, "project_id")?;
    if project_id.is_empty() {
        return Err(RowError::Parse(
            "Project ID is required and cannot be empty".to_string(),
        ));
    }

    Ok(RowParameters {
        project_id,
        folder_path: string_element(folder, "folder_path")?,
        jql_query: string_element(jql, "jql_query")?,
    })
}

fn string_element(value: Value, name: &str) -> Result<String, RowError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        other => Err(RowError::Parse(format!(
            "{name} must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_folder_without_jql() {
        let params = parse_triple(r#"["10074", "/CoE Testy/Adam - Test Import", ""]"#).unwrap();
        assert_eq!(params.project_id, "10074");
        assert_eq!(params.folder_path, "/CoE Testy/Adam - Test Import");
        assert_eq!(params.jql_query, "");
        assert_eq!(params.folder(), Some("/CoE Testy/Adam - Test Import"));
        assert_eq!(params.jql(), None);
    }

    #[test]
    fn test_parse_trims_elements() {
        let params = parse_triple(r#"[" PROJ ", " /a ", " status = Done "]"#).unwrap();
        assert_eq!(params, RowParameters::new("PROJ", "/a", "status = Done"));
    }

    #[test]
    fn test_wrong_arity_is_parse_error() {
        for raw in ["[1,2]", r#"["a", "b"]"#, r#"["a", "b", "c", "d"]"#, "[]"] {
            match parse_triple(raw) {
                Err(RowError::Parse(msg)) => assert_eq!(msg, ARITY_MESSAGE),
                other => panic!("expected parse error for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_not_an_array_is_parse_error() {
        assert!(matches!(
            parse_triple(r#"{"project": "X"}"#),
            Err(RowError::Parse(_))
        ));
        assert!(matches!(parse_triple("\"PROJ\""), Err(RowError::Parse(_))));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse_triple(r#"["PROJ", "", "#).unwrap_err();
        assert!(err.to_string().starts_with("PARSE_ERROR: invalid JSON"));
    }

    #[test]
    fn test_non_string_element_is_parse_error() {
        let err = parse_triple(r#"[10074, "", ""]"#).unwrap_err();
        assert_eq!(
            err,
            RowError::Parse("project_id must be a string, got 10074".to_string())
        );
        assert!(matches!(
            parse_triple(r#"["PROJ", null, ""]"#),
            Err(RowError::Parse(_))
        ));
    }

    #[test]
    fn test_blank_project_is_parse_error() {
        let err = parse_triple(r#"["   ", "/f", ""]"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "PARSE_ERROR: Project ID is required and cannot be empty"
        );
    }

    #[test]
    fn test_empty_cell() {
        let shape = ParameterShape::Triple;
        assert_eq!(shape.parse(None), Err(RowError::EmptyInput));
        assert_eq!(shape.parse(Some("")), Err(RowError::EmptyInput));
        assert_eq!(shape.parse(Some("  \t")), Err(RowError::EmptyInput));
    }

    #[test]
    fn test_global_shape_reads_jql_only() {
        let shape = ParameterShape::Global {
            project_id: "PROJ".to_string(),
            folder_path: "/Regression".to_string(),
        };
        let params = shape.parse(Some(" labels = smoke ")).unwrap();
        assert_eq!(params, RowParameters::new("PROJ", "/Regression", "labels = smoke"));
        assert_eq!(shape.parse(Some("")), Err(RowError::EmptyInput));
    }
}
