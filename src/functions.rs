use crate::model::ExpressionType;

/// A function the analyzer knows how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub kind: ExpressionType,
    pub is_aggregate: bool,
    /// Null-handling functions get the `IFNULL` transformation tag.
    pub is_null_handling: bool,
    /// Result type when it can be told from the function alone.
    pub data_type: Option<&'static str>,
}

const fn aggregate(name: &'static str, data_type: Option<&'static str>) -> FunctionSpec {
    FunctionSpec {
        name,
        kind: ExpressionType::Aggregate,
        is_aggregate: true,
        is_null_handling: false,
        data_type,
    }
}

const fn scalar(name: &'static str, data_type: Option<&'static str>) -> FunctionSpec {
    FunctionSpec {
        name,
        kind: ExpressionType::Function,
        is_aggregate: false,
        is_null_handling: false,
        data_type,
    }
}

const fn null_handling(name: &'static str) -> FunctionSpec {
    FunctionSpec {
        name,
        kind: ExpressionType::Function,
        is_aggregate: false,
        is_null_handling: true,
        data_type: None,
    }
}

/// The function allow-list shared by the expression classifier, the tree
/// builder and the lineage analyzer.
pub const FUNCTIONS: [FunctionSpec; 18] = [
    aggregate("SUM", Some("DECIMAL")),
    aggregate("AVG", Some("DECIMAL")),
    aggregate("COUNT", Some("BIGINT")),
    aggregate("MIN", None),
    aggregate("MAX", None),
    null_handling("IFNULL"),
    null_handling("COALESCE"),
    null_handling("NVL"),
    scalar("SUBSTR", Some("VARCHAR")),
    scalar("SUBSTRING", Some("VARCHAR")),
    scalar("CONCAT", Some("VARCHAR")),
    scalar("LENGTH", Some("BIGINT")),
    scalar("ABS", None),
    scalar("ROUND", None),
    scalar("FLOOR", None),
    scalar("CEIL", None),
    scalar("SQRT", Some("DOUBLE")),
    scalar("POWER", Some("DOUBLE")),
];

/// Looks up a function by name, case-insensitively.
pub fn find_function(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS
        .iter()
        .find(|function| function.name.eq_ignore_ascii_case(name))
}

pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT",
    "FROM",
    "WHERE",
    "AND",
    "OR",
    "ON",
    "IN",
    "NOT",
    "GROUP",
    "BY",
    "ORDER",
    "HAVING",
    "CASE",
    "WHEN",
    "THEN",
    "ELSE",
    "END",
    "NULL",
    "AS",
    "IS",
    "LIKE",
    "BETWEEN",
    "EXISTS",
    "JOIN",
    "LEFT",
    "RIGHT",
    "INNER",
    "OUTER",
    "CROSS",
    "FULL",
    "UNION",
    "INSERT",
    "INTO",
    "VALUES",
    "UPDATE",
    "SET",
    "DELETE",
    "CREATE",
    "TABLE",
    "DROP",
    "ALTER",
    "INDEX",
    "VIEW",
    "TRIGGER",
    "PROCEDURE",
    "FUNCTION",
    "DATABASE",
    "SCHEMA",
    "TRUE",
    "FALSE",
    "USING",
    "LIMIT",
    "OFFSET",
    "DISTINCT",
    "INTERSECT",
    "EXCEPT",
];

pub fn is_sql_keyword(word: &str) -> bool {
    SQL_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(word))
}

/// A plausible column reference: no parentheses, commas or spaces, at most
/// 100 characters and not a reserved keyword.
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= 100
        && !name.contains([' ', '(', ')', ','])
        && !is_sql_keyword(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_functions_ignoring_case() {
        let count = find_function("count").unwrap();
        assert!(count.is_aggregate);
        assert_eq!(count.data_type, Some("BIGINT"));

        let coalesce = find_function("Coalesce").unwrap();
        assert_eq!(coalesce.kind, ExpressionType::Function);
        assert!(coalesce.is_null_handling);

        assert!(find_function("upper").is_none());
    }

    #[test]
    fn validates_field_names() {
        assert!(is_valid_field_name("o.amount"));
        assert!(!is_valid_field_name("select"));
        assert!(!is_valid_field_name("a b"));
        assert!(!is_valid_field_name("f(x)"));
        assert!(!is_valid_field_name(&"x".repeat(101)));
    }
}
