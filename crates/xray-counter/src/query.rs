//! GraphQL query construction for `getTests`.

use serde_json::Value;

use crate::params::RowParameters;

/// Page size requested from `getTests`. Only `total` is read, so this never
/// needs to change with the size of the result.
pub const PAGE_LIMIT: u32 = 100;

/// Builds `getTests` queries with only the applicable filter clauses.
///
/// Clause order is fixed: `projectId`, `folder`, `jql`, `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    include_descendants: bool,
}

impl QueryBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            include_descendants: false,
        }
    }

    /// Also count tests in subfolders of the folder filter.
    #[must_use]
    pub const fn include_descendants(mut self, enabled: bool) -> Self {
        self.include_descendants = enabled;
        self
    }

    #[must_use]
    pub fn build(&self, params: &RowParameters) -> String {
        let mut args = vec![format!("projectId: {}", literal(&params.project_id))];

        if let Some(folder) = params.folder() {
            if self.include_descendants {
                args.push(format!(
                    "folder: {{ path: {}, includeDescendants: true }}",
                    literal(folder)
                ));
            } else {
                args.push(format!("folder: {{ path: {} }}", literal(folder)));
            }
        }

        if let Some(jql) = params.jql() {
            args.push(format!("jql: {}", literal(jql)));
        }

        args.push(format!("limit: {PAGE_LIMIT}"));

        format!("{{ getTests({}) {{ total }} }}", args.join(", "))
    }
}

/// Build a query with the default builder.
#[must_use]
pub fn build_query(params: &RowParameters) -> String {
    QueryBuilder::new().build(params)
}

/// Render a GraphQL string literal. JSON string escaping is a subset of
/// GraphQL's, so quotes, backslashes and control characters come out valid.
fn literal(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_clauses_in_order() {
        let query = build_query(&RowParameters::new("p", "f", "j"));
        assert_eq!(
            query,
            r#"{ getTests(projectId: "p", folder: { path: "f" }, jql: "j", limit: 100) { total } }"#
        );

        let project = query.find(r#"projectId: "p""#).unwrap();
        let folder = query.find(r#"folder: { path: "f" }"#).unwrap();
        let jql = query.find(r#"jql: "j""#).unwrap();
        assert!(project < folder && folder < jql);
    }

    #[test]
    fn test_project_only() {
        let query = build_query(&RowParameters::new("PROJ-999", "", ""));
        assert!(query.contains(r#"getTests(projectId: "PROJ-999", limit: 100) { total }"#));
        assert!(!query.contains("folder"));
        assert!(!query.contains("jql"));
    }

    #[test]
    fn test_folder_omitted_when_empty() {
        let query = build_query(&RowParameters::new("P", "", "status = Done"));
        assert!(!query.contains("folder"));
        assert!(query.contains(r#"jql: "status = Done""#));
    }

    #[test]
    fn test_jql_omitted_when_empty() {
        let query = build_query(&RowParameters::new("10074", "/CoE Testy/Adam - Test Import", ""));
        assert_eq!(
            query,
            r#"{ getTests(projectId: "10074", folder: { path: "/CoE Testy/Adam - Test Import" }, limit: 100) { total } }"#
        );
    }

    #[test]
    fn test_embedded_quotes_are_escaped() {
        let query = build_query(&RowParameters::new(
            "P",
            r"/Team\Suite",
            r#"summary ~ "login" AND labels = "a b""#,
        ));
        assert!(query.contains(r#"folder: { path: "/Team\\Suite" }"#));
        assert!(query.contains(r#"jql: "summary ~ \"login\" AND labels = \"a b\"""#));
    }

    #[test]
    fn test_include_descendants() {
        let query = QueryBuilder::new()
            .include_descendants(true)
            .build(&RowParameters::new("P", "/Root", ""));
        assert!(query.contains(r#"folder: { path: "/Root", includeDescendants: true }"#));

        let without_folder = QueryBuilder::new()
            .include_descendants(true)
            .build(&RowParameters::new("P", "", ""));
        assert!(!without_folder.contains("includeDescendants"));
    }
}
