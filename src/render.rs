use crate::ast::{Call, Identifier, JoinKind, Literal, Operator, SelectNode, SqlNode};
use crate::error::AnalysisError;
use crate::functions::is_sql_keyword;

/// Nested frames a single rendering may use before giving up.
pub const MAX_RENDER_DEPTH: usize = 512;

/// Text used in place of a node that could not be rendered.
pub const FALLBACK_TEXT: &str = "[complex expression]";

/// Longest text kept by [`safe_to_string`].
pub const MAX_TEXT_LENGTH: usize = 200;

/// Renders a node as canonical single-line SQL.
pub fn render(node: &SqlNode) -> Result<String, AnalysisError> {
    let mut out = String::new();
    render_node(node, &mut out, 0)?;
    Ok(out)
}

pub fn render_query(select: &SelectNode) -> Result<String, AnalysisError> {
    let mut out = String::new();
    render_select(select, &mut out, 0)?;
    Ok(out)
}

/// Renders the content of a FROM clause, without the keyword.
pub fn render_from(from: &SqlNode) -> Result<String, AnalysisError> {
    let mut out = String::new();
    render_from_item(from, false, &mut out, 0)?;
    Ok(out)
}

/// Renders a node with quoting characters removed and truncated to
/// [`MAX_TEXT_LENGTH`] characters. Never fails: a node that cannot be
/// rendered becomes [`FALLBACK_TEXT`].
pub fn safe_to_string(node: &SqlNode) -> String {
    match render(node) {
        Ok(text) => truncate(&strip_quotes(&text), MAX_TEXT_LENGTH),
        Err(err) => {
            log::warn!("{}", err);
            FALLBACK_TEXT.to_owned()
        }
    }
}

pub fn strip_quotes(text: &str) -> String {
    text.replace(['`', '"'], "")
}

/// Keeps the first `max` characters, appending `...` when something was cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_owned(),
    }
}

fn check_depth(depth: usize) -> Result<(), AnalysisError> {
    if depth > MAX_RENDER_DEPTH {
        return Err(AnalysisError::Rendering(format!(
            "Rendering exceeds {} nested frames.",
            MAX_RENDER_DEPTH
        )));
    }
    Ok(())
}

fn precedence(node: &SqlNode) -> u8 {
    match node {
        SqlNode::Call(call) => call.operator.precedence(),
        _ => u8::MAX,
    }
}

fn is_query(node: &SqlNode) -> bool {
    match node {
        SqlNode::Select(_) => true,
        SqlNode::Call(call) => matches!(
            call.operator,
            Operator::Set(_) | Operator::OrderBy | Operator::With { .. } | Operator::ElidedQuery
        ),
        _ => false,
    }
}

/// Whether an identifier part can be written without backticks.
fn is_plain_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !is_sql_keyword(part)
}

fn render_identifier(ident: &Identifier, out: &mut String) {
    for (i, part) in ident.parts.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        if part == "*" || is_plain_identifier(part) {
            out.push_str(part);
        } else {
            out.push('`');
            out.push_str(&part.replace('`', "``"));
            out.push('`');
        }
    }
}

/// Renders an operand, wrapping it in parentheses when it is a query or when
/// it binds looser than `min_precedence`.
fn render_operand(
    node: &SqlNode,
    min_precedence: u8,
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    if is_query(node) || precedence(node) < min_precedence {
        out.push('(');
        render_node(node, out, depth + 1)?;
        out.push(')');
    } else {
        render_node(node, out, depth + 1)?;
    }
    Ok(())
}

fn render_list(
    nodes: &[SqlNode],
    separator: &str,
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        render_operand(node, 0, out, depth)?;
    }
    Ok(())
}

fn render_literal(literal: &Literal, out: &mut String) {
    match literal {
        Literal::Number(num) => out.push_str(num),
        Literal::String(str) => {
            out.push('\'');
            out.push_str(&str.replace('\'', "''"));
            out.push('\'');
        }
        Literal::Bool(true) => out.push_str("TRUE"),
        Literal::Bool(false) => out.push_str("FALSE"),
        Literal::Null => out.push_str("NULL"),
    }
}

fn render_node(node: &SqlNode, out: &mut String, depth: usize) -> Result<(), AnalysisError> {
    check_depth(depth)?;
    match node {
        SqlNode::Identifier(ident) => render_identifier(ident, out),
        SqlNode::Literal(literal) => render_literal(literal, out),
        SqlNode::NodeList(nodes) => render_list(nodes, ", ", out, depth)?,
        SqlNode::Select(select) => render_select(select, out, depth)?,
        SqlNode::Call(call) => render_call(call, out, depth)?,
    }
    Ok(())
}

fn render_select(select: &SelectNode, out: &mut String, depth: usize) -> Result<(), AnalysisError> {
    out.push_str("SELECT ");
    if select.distinct {
        out.push_str("DISTINCT ");
    }
    render_list(&select.select_list, ", ", out, depth)?;
    if let Some(from) = &select.from {
        out.push_str(" FROM ");
        render_from_item(from, false, out, depth)?;
    }
    if let Some(r#where) = &select.r#where {
        out.push_str(" WHERE ");
        render_node(r#where, out, depth + 1)?;
    }
    if !select.group_by.is_empty() {
        out.push_str(" GROUP BY ");
        render_list(&select.group_by, ", ", out, depth)?;
    }
    if let Some(having) = &select.having {
        out.push_str(" HAVING ");
        render_node(having, out, depth + 1)?;
    }
    if !select.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        render_list(&select.order_by, ", ", out, depth)?;
    }
    if let Some(limit) = &select.limit {
        out.push_str(" LIMIT ");
        render_node(limit, out, depth + 1)?;
    }
    if let Some(offset) = &select.offset {
        out.push_str(" OFFSET ");
        render_node(offset, out, depth + 1)?;
    }
    Ok(())
}

fn render_call(call: &Call, out: &mut String, depth: usize) -> Result<(), AnalysisError> {
    let own_precedence = call.operator.precedence();
    let operands = &call.operands;

    match &call.operator {
        Operator::Function { name, distinct } => {
            out.push_str(&name.to_uppercase());
            out.push('(');
            if *distinct {
                out.push_str("DISTINCT ");
            }
            render_list(operands, ", ", out, depth)?;
            out.push(')');
        }
        Operator::As => {
            if let Some(expr) = operands.first() {
                render_operand(expr, 0, out, depth)?;
            }
            if let Some(alias) = operands.get(1) {
                out.push_str(" AS ");
                render_node(alias, out, depth + 1)?;
            }
        }
        Operator::Case { simple, has_else } => {
            out.push_str("CASE");
            let mut rest = operands.as_slice();
            if *simple {
                if let Some((value, tail)) = rest.split_first() {
                    out.push(' ');
                    render_operand(value, 0, out, depth)?;
                    rest = tail;
                }
            }
            let mut else_branch = None;
            if *has_else {
                if let Some((last, tail)) = rest.split_last() {
                    else_branch = Some(last);
                    rest = tail;
                }
            }
            for pair in rest.chunks(2) {
                out.push_str(" WHEN ");
                render_operand(&pair[0], 0, out, depth)?;
                if let Some(then) = pair.get(1) {
                    out.push_str(" THEN ");
                    render_operand(then, 0, out, depth)?;
                }
            }
            if let Some(else_branch) = else_branch {
                out.push_str(" ELSE ");
                render_operand(else_branch, 0, out, depth)?;
            }
            out.push_str(" END");
        }
        Operator::Cast { target } => {
            out.push_str("CAST(");
            render_list(operands, ", ", out, depth)?;
            out.push_str(" AS ");
            out.push_str(target);
            out.push(')');
        }
        Operator::Interval { unit } => {
            out.push_str("INTERVAL ");
            render_list(operands, ", ", out, depth)?;
            out.push(' ');
            out.push_str(unit);
        }
        Operator::And | Operator::Or | Operator::Xor => {
            let separator = format!(" {} ", call.operator.name());
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    out.push_str(&separator);
                }
                render_operand(operand, own_precedence + 1, out, depth)?;
            }
        }
        Operator::Not => {
            out.push_str("NOT ");
            render_list_operands(operands, own_precedence, out, depth)?;
        }
        Operator::UnaryMinus | Operator::UnaryPlus | Operator::BitwiseNot => {
            out.push_str(match call.operator {
                Operator::UnaryMinus => "-",
                Operator::UnaryPlus => "+",
                _ => "~",
            });
            render_list_operands(operands, own_precedence, out, depth)?;
        }
        Operator::In | Operator::NotIn => {
            if let Some(expr) = operands.first() {
                render_operand(expr, own_precedence + 1, out, depth)?;
            }
            out.push_str(if call.operator == Operator::In {
                " IN ("
            } else {
                " NOT IN ("
            });
            if let Some(values) = operands.get(1) {
                render_node(values, out, depth + 1)?;
            }
            out.push(')');
        }
        Operator::Between | Operator::NotBetween => {
            if let [expr, low, high] = operands.as_slice() {
                render_operand(expr, own_precedence + 1, out, depth)?;
                out.push_str(if call.operator == Operator::Between {
                    " BETWEEN "
                } else {
                    " NOT BETWEEN "
                });
                render_operand(low, own_precedence + 1, out, depth)?;
                out.push_str(" AND ");
                render_operand(high, own_precedence + 1, out, depth)?;
            }
        }
        Operator::Exists => {
            out.push_str("EXISTS ");
            render_list_operands(operands, u8::MAX, out, depth)?;
        }
        Operator::Join(kind) => render_join(*kind, operands, out, depth)?,
        Operator::On => {
            out.push_str("ON ");
            render_list(operands, ", ", out, depth)?;
        }
        Operator::Using => {
            out.push_str("USING (");
            render_list(operands, ", ", out, depth)?;
            out.push(')');
        }
        Operator::Set(set_operator) => {
            if let [left, right] = operands.as_slice() {
                render_set_operand(left, false, out, depth)?;
                out.push(' ');
                out.push_str(set_operator.as_str());
                out.push(' ');
                render_set_operand(right, true, out, depth)?;
            }
        }
        Operator::OrderBy => {
            if let Some(query) = operands.first() {
                render_set_operand(query, false, out, depth)?;
            }
            if let Some(SqlNode::NodeList(items)) = operands.get(1) {
                if !items.is_empty() {
                    out.push_str(" ORDER BY ");
                    render_list(items, ", ", out, depth)?;
                }
            }
            if let Some(limit) = operands.get(2) {
                out.push_str(" LIMIT ");
                render_node(limit, out, depth + 1)?;
            }
        }
        Operator::Descending => {
            render_list_operands(operands, 0, out, depth)?;
            out.push_str(" DESC");
        }
        Operator::With { recursive } => {
            out.push_str("WITH ");
            if *recursive {
                out.push_str("RECURSIVE ");
            }
            if let [SqlNode::NodeList(ctes), body] = operands.as_slice() {
                for (i, cte) in ctes.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match cte {
                        SqlNode::Call(named) if named.operator == Operator::As => {
                            if let [query, name] = named.operands.as_slice() {
                                render_node(name, out, depth + 1)?;
                                out.push_str(" AS (");
                                render_node(query, out, depth + 1)?;
                                out.push(')');
                            }
                        }
                        other => render_node(other, out, depth + 1)?,
                    }
                }
                out.push(' ');
                render_node(body, out, depth + 1)?;
            }
        }
        Operator::ElidedQuery => out.push_str("SELECT ..."),
        operator => {
            if let Some(symbol) = operator.postfix_symbol() {
                render_list_operands(operands, own_precedence + 1, out, depth)?;
                out.push(' ');
                out.push_str(symbol);
            } else if let (Some(symbol), [left, right]) =
                (operator.binary_symbol(), operands.as_slice())
            {
                // Left-associative: only the right side needs parentheses at equal precedence
                render_operand(left, own_precedence, out, depth)?;
                out.push(' ');
                out.push_str(symbol);
                out.push(' ');
                render_operand(right, own_precedence + 1, out, depth)?;
            } else {
                return Err(AnalysisError::Rendering(format!(
                    "Cannot render operator {} with {} operands.",
                    operator.name(),
                    operands.len()
                )));
            }
        }
    }
    Ok(())
}

fn render_list_operands(
    operands: &[SqlNode],
    min_precedence: u8,
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_operand(operand, min_precedence, out, depth)?;
    }
    Ok(())
}

fn render_set_operand(
    node: &SqlNode,
    parenthesize_sets: bool,
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    let needs_parens = match node {
        SqlNode::Select(select) => {
            !select.order_by.is_empty() || select.limit.is_some()
        }
        SqlNode::Call(call) => match call.operator {
            Operator::OrderBy => true,
            Operator::Set(_) => parenthesize_sets,
            _ => false,
        },
        _ => false,
    };
    if needs_parens {
        out.push('(');
        render_node(node, out, depth + 1)?;
        out.push(')');
    } else {
        render_node(node, out, depth + 1)?;
    }
    Ok(())
}

fn render_join(
    kind: JoinKind,
    operands: &[SqlNode],
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    let (left, right, condition) = match operands {
        [left, right] => (left, right, None),
        [left, right, condition] => (left, right, Some(condition)),
        _ => {
            return Err(AnalysisError::Rendering(format!(
                "Join with {} operands.",
                operands.len()
            )));
        }
    };
    render_from_item(left, false, out, depth)?;
    out.push_str(match kind {
        JoinKind::Inner => " INNER JOIN ",
        JoinKind::Left => " LEFT JOIN ",
        JoinKind::Right => " RIGHT JOIN ",
        JoinKind::Full => " FULL JOIN ",
        JoinKind::Cross => " CROSS JOIN ",
        JoinKind::Comma => ", ",
    });
    render_from_item(right, true, out, depth)?;
    if let Some(condition) = condition {
        out.push(' ');
        render_node(condition, out, depth + 1)?;
    }
    Ok(())
}

fn render_from_item(
    node: &SqlNode,
    parenthesize_joins: bool,
    out: &mut String,
    depth: usize,
) -> Result<(), AnalysisError> {
    let is_join = matches!(node, SqlNode::Call(call) if matches!(call.operator, Operator::Join(_)));
    if (is_join && parenthesize_joins) || is_query(node) {
        out.push('(');
        render_node(node, out, depth + 1)?;
        out.push(')');
    } else {
        render_node(node, out, depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql;

    fn roundtrip(sql: &str) -> String {
        render(&parse_sql(sql).unwrap()).unwrap()
    }

    #[test]
    fn renders_canonical_text() {
        assert_eq!(
            roundtrip("select `a`.id, sum(x) total from t a where a.id > 1 and b = 'it''s'"),
            "SELECT a.id, SUM(x) AS total FROM t AS a WHERE a.id > 1 AND b = 'it''s'"
        );
        assert_eq!(
            roundtrip("select (a + b) * c, a - (b - c), not (x or y) from t"),
            "SELECT (a + b) * c, a - (b - c), NOT (x OR y) FROM t"
        );
        assert_eq!(
            roundtrip("select case when x is null then 0 else x end from t"),
            "SELECT CASE WHEN x IS NULL THEN 0 ELSE x END FROM t"
        );
        assert_eq!(
            roundtrip("select * from a left outer join (select id from b) c on a.id = c.id"),
            "SELECT * FROM a LEFT JOIN (SELECT id FROM b) AS c ON a.id = c.id"
        );
        assert_eq!(
            roundtrip("with recursive r as (select 1) select * from r"),
            "WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r"
        );
    }

    #[test]
    fn quotes_identifiers_only_when_needed() {
        assert_eq!(
            roundtrip("select `t q`.`a``b`, `from`, `päid_1` from `s p`.`t q`"),
            "SELECT `t q`.`a``b`, `from`, päid_1 FROM `s p`.`t q`"
        );
        assert_eq!(
            safe_to_string(&parse_sql("select `x,y` from t").unwrap()),
            "SELECT x,y FROM t"
        );
    }

    #[test]
    fn truncates_and_strips_quotes() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(strip_quotes("`a`.\"b\""), "a.b");
        let sql = format!("select {} from t", ["some_long_column_name"; 20].join(" + "));
        let text = safe_to_string(&parse_sql(&sql).unwrap());
        assert_eq!(text.chars().count(), MAX_TEXT_LENGTH + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn falls_back_when_too_deep() {
        let mut node = SqlNode::Identifier(crate::ast::Identifier::simple("x"));
        for _ in 0..(MAX_RENDER_DEPTH + 10) {
            node = SqlNode::Call(Call::new(Operator::UnaryMinus, vec![node]));
        }
        assert!(matches!(render(&node), Err(AnalysisError::Rendering(_))));
        assert_eq!(safe_to_string(&node), FALLBACK_TEXT);
    }
}
