use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Call, Operator, SqlNode};
use crate::functions::{find_function, is_sql_keyword, is_valid_field_name};
use crate::model::{ExpressionInfo, ExpressionType};
use crate::render::safe_to_string;
use crate::text::mask_string_literals;

/// Deepest expression level the classifier descends into. Deeper nodes are
/// dropped without error.
pub const MAX_EXPRESSION_DEPTH: usize = 10;

static FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?").unwrap()
});

/// Classifies an expression into a tree of [`ExpressionInfo`].
///
/// The returned root is untyped and sits at depth 0; typed nodes (function
/// calls, CASE, boolean connectives, sub-selects) hang below it. Column
/// references are collected into the source fields of the closest enclosing
/// typed node.
pub fn classify(node: &SqlNode) -> ExpressionInfo {
    let mut root = ExpressionInfo::new(None, safe_to_string(node), 0);
    classify_into(node, &mut root, 1);
    root
}

fn classify_into(node: &SqlNode, parent: &mut ExpressionInfo, depth: usize) {
    if depth > MAX_EXPRESSION_DEPTH {
        return;
    }

    match node {
        SqlNode::Call(call) => {
            if is_case_shaped(call) {
                classify_case(node, call, parent, depth);
            } else if let Some(function) = function_name(call).and_then(find_function) {
                let mut function_expr = ExpressionInfo::new(
                    Some(function.kind),
                    safe_to_string(node),
                    depth,
                );
                function_expr.function = Some(function.name.to_owned());
                for operand in &call.operands {
                    classify_into(operand, &mut function_expr, depth + 1);
                }
                parent.nested_expressions.push(function_expr);
            } else {
                match call.operator {
                    Operator::As => {
                        if let Some(inner) = call.operand(0) {
                            classify_into(inner, parent, depth);
                        }
                    }
                    Operator::And | Operator::Or => {
                        let mut logical_expr = ExpressionInfo::new(
                            Some(ExpressionType::Logical),
                            safe_to_string(node),
                            depth,
                        );
                        logical_expr.function = Some(call.operator.name());
                        for operand in &call.operands {
                            classify_into(operand, &mut logical_expr, depth + 1);
                        }
                        parent.nested_expressions.push(logical_expr);
                    }
                    _ => {
                        for operand in &call.operands {
                            classify_into(operand, parent, depth + 1);
                        }
                    }
                }
            }
        }
        SqlNode::NodeList(nodes) => {
            for node in nodes {
                classify_into(node, parent, depth + 1);
            }
        }
        SqlNode::Identifier(ident) => {
            if ident.is_star() {
                return;
            }
            let field_name = safe_to_string(node);
            if is_valid_field_name(&field_name) {
                parent.add_source_field(&field_name);
            }
        }
        SqlNode::Select(_) => {
            parent.nested_expressions.push(ExpressionInfo::new(
                Some(ExpressionType::Subquery),
                safe_to_string(node),
                depth,
            ));
        }
        SqlNode::Literal(_) => {}
    }
}

fn function_name(call: &Call) -> Option<&str> {
    match &call.operator {
        Operator::Function { name, .. } => Some(name),
        _ => None,
    }
}

fn is_case_shaped(call: &Call) -> bool {
    if matches!(call.operator, Operator::Case { .. }) {
        return true;
    }
    // Front-ends without a dedicated CASE operator
    function_name(call).is_some_and(|name| name.eq_ignore_ascii_case("CASE"))
}

fn classify_case(node: &SqlNode, call: &Call, parent: &mut ExpressionInfo, depth: usize) {
    let mut case_expr =
        ExpressionInfo::new(Some(ExpressionType::CaseWhen), safe_to_string(node), depth);
    case_expr.function = Some("CASE".to_owned());
    for operand in &call.operands {
        classify_into(operand, &mut case_expr, depth + 1);
    }
    for field in identifiers_in_text(&case_expr.expression) {
        parent.add_source_field(&field);
    }
    parent.nested_expressions.push(case_expr);
}

/// Identifier-shaped matches, skipping the tails of numbers such as `1e5`.
fn identifier_tokens(masked: &str) -> impl Iterator<Item = regex::Match<'_>> {
    let bytes = masked.as_bytes();
    FIELD_PATTERN.find_iter(masked).filter(move |m| {
        m.start() == 0 || {
            let prev = bytes[m.start() - 1];
            !(prev.is_ascii_digit() || prev == b'.')
        }
    })
}

/// Identifier-shaped tokens of `text` that are plausibly column references:
/// string literals, function names, keywords and number fragments are skipped.
fn identifiers_in_text(text: &str) -> Vec<String> {
    let masked = mask_string_literals(text);
    let mut fields: Vec<String> = vec![];
    for m in identifier_tokens(&masked) {
        let followed_by_paren = masked[m.end()..].trim_start().starts_with('(');
        let field = m.as_str();
        if followed_by_paren || is_sql_keyword(field) || !is_valid_field_name(field) {
            continue;
        }
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_owned());
        }
    }
    fields
}

/// Fallback extraction of every identifier-shaped token from free text,
/// deduplicated case-insensitively in first-seen order.
pub fn extract_all_fields(text: &str) -> Vec<String> {
    let masked = mask_string_literals(text);
    let mut seen = HashSet::new();
    let mut fields = vec![];
    for m in identifier_tokens(&masked) {
        let field = m.as_str();
        if is_valid_field_name(field) && seen.insert(field.to_lowercase()) {
            fields.push(field.to_owned());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SelectNode;
    use crate::parser::parse_sql;

    fn first_item(sql: &str) -> SqlNode {
        match parse_sql(sql).unwrap() {
            SqlNode::Select(select) => {
                let SelectNode { select_list, .. } = *select;
                select_list.into_iter().next().unwrap()
            }
            other => panic!("not a select: {:?}", other),
        }
    }

    #[test]
    fn classifies_aggregate_under_alias() {
        let info = classify(&first_item("select sum(o.amount) as total from orders o"));
        assert_eq!(info.expression_type, None);
        assert_eq!(info.depth, 0);
        assert_eq!(info.nested_expressions.len(), 1);
        let sum = &info.nested_expressions[0];
        assert_eq!(sum.expression_type, Some(ExpressionType::Aggregate));
        assert_eq!(sum.function.as_deref(), Some("SUM"));
        assert_eq!(sum.depth, 1);
        assert_eq!(sum.source_fields, vec!["o.amount"]);
        assert_eq!(info.all_source_fields(), vec!["o.amount"]);
    }

    #[test]
    fn case_merges_text_identifiers_into_parent() {
        let info = classify(&first_item(
            "select case when status = 'open' then price else fallback(cost) end from t",
        ));
        let case = &info.nested_expressions[0];
        assert_eq!(case.expression_type, Some(ExpressionType::CaseWhen));
        assert_eq!(case.function.as_deref(), Some("CASE"));
        assert_eq!(info.source_fields, vec!["status", "price", "cost"]);
    }

    #[test]
    fn logical_and_unknown_calls() {
        let info = classify(&first_item("select a > 1 and upper(b) = c from t"));
        let logical = &info.nested_expressions[0];
        assert_eq!(logical.expression_type, Some(ExpressionType::Logical));
        assert_eq!(logical.function.as_deref(), Some("AND"));
        // upper is not in the allow-list, its operands are flattened
        assert!(logical.nested_expressions.is_empty());
        assert_eq!(logical.source_fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn subquery_is_a_leaf() {
        let info = classify(&first_item("select (select max(x) from u) from t"));
        let sub = &info.nested_expressions[0];
        assert_eq!(sub.expression_type, Some(ExpressionType::Subquery));
        assert!(sub.nested_expressions.is_empty());
        assert!(info.all_source_fields().is_empty());
    }

    #[test]
    fn drops_nodes_past_max_depth() {
        let mut sql = "x".to_owned();
        for _ in 0..15 {
            sql = format!("abs({})", sql);
        }
        let info = classify(&first_item(&format!("select {} from t", sql)));
        let mut depth = 0;
        let mut curr = &info;
        while let Some(next) = curr.nested_expressions.first() {
            depth = next.depth;
            curr = next;
        }
        assert_eq!(depth, MAX_EXPRESSION_DEPTH);
        assert!(info.all_source_fields().is_empty());
    }

    #[test]
    fn extracts_all_fields_case_insensitively() {
        assert_eq!(
            extract_all_fields("a.id = B.ID and A.ID = c and 'lit' = d"),
            vec!["a.id", "B.ID", "c", "d"]
        );
    }
}
