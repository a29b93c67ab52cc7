use crate::error::AnalysisError;
use crate::lineage::analyze_lineage;
use crate::model::ParseResult;
use crate::parser::{Frontend, MySqlFrontend};
use crate::stats::calculate_statistics;
use crate::tree_builder::build_tree;

/// Longest accepted input, in characters.
pub const MAX_SQL_LENGTH: usize = 50_000;

/// Entry point of the analysis.
///
/// Holds nothing but an immutable front-end, so one analyzer can be shared
/// by any number of threads. Every call to [`SqlAnalyzer::analyze`] owns its
/// own traversal state.
#[derive(Debug, Clone, Default)]
pub struct SqlAnalyzer<F: Frontend = MySqlFrontend> {
    frontend: F,
}

impl SqlAnalyzer<MySqlFrontend> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: Frontend> SqlAnalyzer<F> {
    pub fn with_frontend(frontend: F) -> Self {
        Self { frontend }
    }

    /// Analyzes one SELECT statement. Never panics on bad input: syntax
    /// errors come back as a failed [`ParseResult`].
    pub fn analyze(&self, sql: &str) -> ParseResult {
        let cleaned = match clean_sql(sql) {
            Ok(cleaned) => cleaned,
            Err(err) => {
                log::warn!("{}", err);
                return ParseResult::failure(sql, err.to_string());
            }
        };

        let statement = match self.frontend.parse(cleaned) {
            Ok(statement) => statement,
            Err(err) => {
                let err = AnalysisError::Syntax(err.to_string());
                log::warn!("{}", err);
                return ParseResult::failure(sql, err.to_string());
            }
        };

        let tree = build_tree(&statement, cleaned);
        let lineage = analyze_lineage(&tree);
        let statistics = calculate_statistics(&tree, &lineage);
        log::debug!(
            "Analyzed statement: {} levels, {} subqueries, {} fields",
            statistics.total_levels,
            statistics.total_subqueries,
            statistics.total_fields
        );

        ParseResult::success(sql, tree, lineage, statistics)
    }
}

/// Trims the statement and drops one trailing semicolon.
fn clean_sql(sql: &str) -> Result<&str, AnalysisError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::Syntax("SQL must not be empty".to_owned()));
    }
    if trimmed.chars().count() > MAX_SQL_LENGTH {
        return Err(AnalysisError::Syntax(format!(
            "SQL length exceeds limit ({} characters)",
            MAX_SQL_LENGTH
        )));
    }
    let cleaned = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    Ok(cleaned)
}

/// Analyzes `sql` with the built-in MySQL front-end.
pub fn analyze_sql(sql: &str) -> ParseResult {
    SqlAnalyzer::new().analyze(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SqlNode;

    #[test]
    fn strips_one_trailing_semicolon() {
        assert_eq!(clean_sql("  SELECT 1 ; ").unwrap(), "SELECT 1");
        assert_eq!(clean_sql("SELECT 1;;").unwrap(), "SELECT 1;");
        assert!(!analyze_sql("SELECT 1;;").success);
    }

    #[test]
    fn rejects_empty_and_oversized_input() {
        assert!(matches!(clean_sql(" \n "), Err(AnalysisError::Syntax(_))));
        let sql = format!("SELECT {}", "1".repeat(MAX_SQL_LENGTH));
        let result = analyze_sql(&sql);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("50000"));
    }

    struct FailingFrontend;

    impl Frontend for FailingFrontend {
        fn parse(&self, _sql: &str) -> anyhow::Result<SqlNode> {
            Err(anyhow::anyhow!("unsupported dialect"))
        }
    }

    #[test]
    fn frontend_errors_become_failed_results() {
        let result = SqlAnalyzer::with_frontend(FailingFrontend).analyze("SELECT 1");
        assert!(!result.success);
        assert_eq!(result.original_sql, "SELECT 1");
        assert_eq!(
            result.error.as_deref(),
            Some("SQL parse error: unsupported dialect")
        );
        assert!(result.tree.is_none() && result.lineage.is_none());
    }
}
