use std::sync::LazyLock;

use regex::Regex;

use crate::classifier::extract_all_fields;
use crate::functions::{FUNCTIONS, find_function, is_sql_keyword};
use crate::model::{FieldInfo, FieldLineage, LineageStep, QueryTreeNode, SourceField, TableReference};
use crate::render::truncate;
use crate::text::{calls_function, functions_in_text, mask_string_literals, mentions_case};

/// Table every output field is attributed to.
pub const OUTPUT_TABLE: &str = "RESULT";

const MAX_FALLBACK_SOURCE_LENGTH: usize = 50;

/// Function keywords checked, in order, to name the operation of an
/// aggregated field. IFNULL also stands for COALESCE and NVL.
const OPERATION_PRIORITY: [(&str, &[&str]); 10] = [
    ("SUM", &["SUM"]),
    ("AVG", &["AVG"]),
    ("COUNT", &["COUNT"]),
    ("MAX", &["MAX"]),
    ("MIN", &["MIN"]),
    ("CASE", &[]),
    ("IFNULL", &["IFNULL", "COALESCE", "NVL"]),
    ("LENGTH", &["LENGTH"]),
    ("SUBSTR", &["SUBSTR", "SUBSTRING"]),
    ("CONCAT", &["CONCAT"]),
];

// keyword, optional qualifier, bare identifier
static SOURCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let functions = FUNCTIONS
        .iter()
        .map(|function| function.name)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)\b(?:{}|WHEN|THEN|ELSE)\b\s*\(?\s*(?:DISTINCT\s+)?(?:[A-Za-z_][A-Za-z0-9_]*\.)?([A-Za-z_][A-Za-z0-9_]*)",
        functions
    ))
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transformation {
    Direct,
    Aggregate,
    CaseWhen,
    IfNull,
    Function,
}

impl Transformation {
    fn as_str(&self) -> &'static str {
        match self {
            Transformation::Direct => "DIRECT",
            Transformation::Aggregate => "AGGREGATE",
            Transformation::CaseWhen => "CASE_WHEN",
            Transformation::IfNull => "IFNULL",
            Transformation::Function => "FUNCTION",
        }
    }
}

/// Lineage of every field of `tree`, parent fields before the fields of
/// nested subqueries.
pub fn analyze_lineage(tree: &QueryTreeNode) -> Vec<FieldLineage> {
    let lineage: Vec<FieldLineage> = tree
        .iter()
        .flat_map(|node| {
            node.fields
                .iter()
                .map(|field| field_lineage(field, &node.tables))
        })
        .collect();
    log::debug!("Computed lineage of {} fields", lineage.len());
    lineage
}

fn field_lineage(field: &FieldInfo, tables: &[TableReference]) -> FieldLineage {
    let expression = field.expression.as_str();
    let select_from = if expression.is_empty() {
        field.name.clone()
    } else {
        field.expression.clone()
    };

    let mut path = vec![LineageStep {
        from: select_from,
        to: field.name.clone(),
        operation: "SELECT".to_owned(),
    }];

    let operation = detect_operation(expression);
    if field.aggregated && !expression.is_empty() {
        let recovered = recover_source_identifiers(expression);
        let from = if recovered.is_empty() {
            truncate(expression, MAX_FALLBACK_SOURCE_LENGTH)
        } else {
            recovered.join(", ")
        };
        path.push(LineageStep {
            from,
            to: field.expression.clone(),
            operation: operation.unwrap_or("AGGREGATE").to_owned(),
        });
    }

    let function = operation
        .map(str::to_owned)
        .or_else(|| functions_in_text(expression).first().map(|f| f.name.to_owned()));

    FieldLineage {
        output_field: field.name.clone(),
        output_table: OUTPUT_TABLE.to_owned(),
        expression: (!expression.is_empty()).then(|| field.expression.clone()),
        function,
        source_fields: source_names(field)
            .iter()
            .map(|source| resolve_source(source, tables))
            .collect(),
        path,
        transformations: transformations(field)
            .iter()
            .map(|t| t.as_str().to_owned())
            .collect(),
    }
}

/// Classified sources of `field`, or every column-shaped token of its
/// expression when classification found none.
fn source_names(field: &FieldInfo) -> Vec<String> {
    if !field.source_fields.is_empty() {
        return field.source_fields.clone();
    }
    extract_all_fields(&field.expression)
        .into_iter()
        .filter(|name| find_function(name).is_none())
        .collect()
}

/// First operation keyword of `expression` by fixed priority.
///
/// Expressions calling several functions resolve to the first match, so
/// `SUM(a) + COUNT(b)` is reported as `SUM`.
pub fn detect_operation(expression: &str) -> Option<&'static str> {
    OPERATION_PRIORITY
        .iter()
        .find(|(operation, functions)| {
            if functions.is_empty() {
                *operation == "CASE" && mentions_case(expression)
            } else {
                functions
                    .iter()
                    .any(|function| calls_function(expression, function))
            }
        })
        .map(|(operation, _)| *operation)
}

/// Bare identifiers that directly follow a function keyword or a CASE branch
/// keyword, first seen first.
pub fn recover_source_identifiers(expression: &str) -> Vec<String> {
    let masked = mask_string_literals(expression);
    let mut identifiers: Vec<String> = vec![];
    let mut pos = 0;
    while let Some(captures) = SOURCE_PATTERN.captures_at(&masked, pos) {
        let (Some(whole), Some(identifier)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        // nested calls and keywords such as SUM(ABS(x)) or THEN CASE WHEN x
        // are searched again from their own start
        let name = identifier.as_str();
        let rescan = masked[whole.end()..].trim_start().starts_with('(')
            || find_function(name).is_some()
            || is_sql_keyword(name);
        if rescan {
            pos = identifier.start();
            continue;
        }
        pos = whole.end();

        if !identifiers.iter().any(|i| i == name) {
            identifiers.push(name.to_owned());
        }
    }
    identifiers
}

fn resolve_source(source: &str, tables: &[TableReference]) -> SourceField {
    match source.rsplit_once('.') {
        Some((table, field)) => SourceField {
            table: table.to_owned(),
            field: field.to_owned(),
            alias: None,
        },
        None => {
            let table = tables.first();
            SourceField {
                table: table.map_or(String::new(), |t| t.reference_name().to_owned()),
                field: source.to_owned(),
                alias: table.and_then(|t| t.alias.clone()),
            }
        }
    }
}

fn transformations(field: &FieldInfo) -> Vec<Transformation> {
    let functions = functions_in_text(&field.expression);
    let mut tags = vec![];
    if functions.iter().any(|f| f.is_aggregate) {
        tags.push(Transformation::Aggregate);
    }
    if field.case_when {
        tags.push(Transformation::CaseWhen);
    }
    if field.if_null {
        tags.push(Transformation::IfNull);
    }
    if functions.iter().any(|f| !f.is_aggregate && !f.is_null_handling) {
        tags.push(Transformation::Function);
    }
    let is_plain_column =
        matches!(field.source_fields.as_slice(), [source] if *source == field.expression);
    if tags.is_empty() && is_plain_column {
        tags.push(Transformation::Direct);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, expression: &str, aggregated: bool, sources: &[&str]) -> FieldInfo {
        FieldInfo {
            name: name.to_owned(),
            expression: expression.to_owned(),
            aggregated,
            case_when: mentions_case(expression),
            if_null: calls_function(expression, "IFNULL") || calls_function(expression, "COALESCE"),
            source_fields: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn detects_operation_by_priority() {
        assert_eq!(detect_operation("SUM(a) + COUNT(b)"), Some("SUM"));
        assert_eq!(detect_operation("COUNT(b) + SUM(a)"), Some("SUM"));
        assert_eq!(detect_operation("MIN(a) + MAX(b)"), Some("MAX"));
        assert_eq!(detect_operation("CASE WHEN COALESCE(a, 0) > 1 THEN 1 END"), Some("CASE"));
        assert_eq!(detect_operation("COALESCE(a, 0)"), Some("IFNULL"));
        assert_eq!(detect_operation("SUBSTRING(a, 1, 2)"), Some("SUBSTR"));
        assert_eq!(detect_operation("ROUND(a)"), None);
        assert_eq!(detect_operation("'SUM(a)'"), None);
    }

    #[test]
    fn recovers_identifiers_after_keywords() {
        assert_eq!(
            recover_source_identifiers("SUM(o.amount) + COUNT(DISTINCT o.id) + SUM(ABS(o.amount))"),
            vec!["amount", "id"]
        );
        assert_eq!(
            recover_source_identifiers("CASE WHEN status = 'x' THEN price ELSE cost END"),
            vec!["status", "price", "cost"]
        );
        assert!(recover_source_identifiers("COUNT(*)").is_empty());
    }

    #[test]
    fn aggregated_field_gets_two_steps() {
        let tables = [TableReference {
            name: "orders".to_owned(),
            alias: Some("o".to_owned()),
            ..Default::default()
        }];
        let lineage = field_lineage(&field("total", "SUM(amount)", true, &["amount"]), &tables);
        assert_eq!(lineage.output_table, OUTPUT_TABLE);
        assert_eq!(lineage.function.as_deref(), Some("SUM"));
        let steps: Vec<_> = lineage
            .path
            .iter()
            .map(|s| (s.from.as_str(), s.to.as_str(), s.operation.as_str()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("SUM(amount)", "total", "SELECT"),
                ("amount", "SUM(amount)", "SUM"),
            ]
        );
        assert_eq!(
            lineage.source_fields,
            vec![SourceField {
                table: "o".to_owned(),
                field: "amount".to_owned(),
                alias: Some("o".to_owned()),
            }]
        );
        assert_eq!(lineage.transformations, vec!["AGGREGATE"]);
    }

    #[test]
    fn fallback_source_is_truncated_expression() {
        let expression = format!("COUNT(*) + {}", "1 + ".repeat(20));
        let lineage = field_lineage(&field("n", &expression, true, &[]), &[]);
        assert_eq!(lineage.path[1].from, truncate(&expression, 50));
        assert_eq!(lineage.path[1].operation, "COUNT");
    }

    #[test]
    fn plain_column_is_direct() {
        let lineage = field_lineage(&field("b.name", "b.name", false, &["b.name"]), &[]);
        assert_eq!(lineage.path.len(), 1);
        assert_eq!(lineage.function, None);
        assert_eq!(lineage.source_fields[0].table, "b");
        assert_eq!(lineage.transformations, vec!["DIRECT"]);

        let lineage = field_lineage(&field("x", "x", false, &["x"]), &[]);
        assert_eq!(lineage.source_fields[0].table, "");
    }

    #[test]
    fn sources_fall_back_to_expression_text() {
        let tables = [TableReference {
            name: "items".to_owned(),
            ..Default::default()
        }];
        let expression = format!("{}price{}", "ABS(".repeat(12), ")".repeat(12));
        let lineage = field_lineage(&field("p", &expression, true, &[]), &tables);
        assert_eq!(
            lineage.source_fields,
            vec![SourceField {
                table: "items".to_owned(),
                field: "price".to_owned(),
                alias: None,
            }]
        );
        assert_eq!(lineage.path[1].from, "price");

        let lineage = field_lineage(&field("n", "COUNT(*)", true, &[]), &tables);
        assert!(lineage.source_fields.is_empty());
    }

    #[test]
    fn non_aggregate_function_is_tagged() {
        let lineage = field_lineage(&field("r", "ROUND(a)", true, &["a"]), &[]);
        assert_eq!(lineage.function.as_deref(), Some("ROUND"));
        assert_eq!(lineage.path[1].operation, "AGGREGATE");
        assert_eq!(lineage.transformations, vec!["FUNCTION"]);
    }
}
