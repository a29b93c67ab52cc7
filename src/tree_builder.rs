use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Literal, Operator, SelectNode, SqlNode};
use crate::classifier::{classify, extract_all_fields};
use crate::error::AnalysisError;
use crate::functions::{find_function, is_sql_keyword};
use crate::model::{
    ExpressionInfo, ExpressionType, FieldInfo, JoinInfo, NodeType, QueryTreeNode, TableReference,
};
use crate::render::{
    FALLBACK_TEXT, render_from, render_query, safe_to_string, strip_quotes, truncate,
};
use crate::text::{
    calls_function, functions_in_text, mask_parenthesized, mask_quoted_identifiers,
    mask_string_literals, mentions_case,
};

/// Deepest nesting level that gets a fully built node.
pub const MAX_TREE_DEPTH: usize = 20;

/// Subqueries descended into per statement.
pub const MAX_SUBQUERIES: usize = 100;

const ELIDED_CONDITION: &str = "[condition elided]";
const ELIDED_ORDER_BY: &str = "[ORDER BY elided]";
const DEPTH_LIMIT_REACHED: &str = "depth limit reached";
const CYCLIC_REFERENCE: &str = "cyclic reference";
const WITH_STATEMENT: &str = "WITH statement not analyzed";
const MAX_GROUP_BY_LENGTH: usize = 50;

// plain or backtick quoted name part
const NAME_PART: &str = r"(?:[\p{L}_][\w$]*|(?:`[^`]*`)+)";

static TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:\b(FROM|JOIN|INNER\s+JOIN|CROSS\s+JOIN|(?:LEFT|RIGHT|FULL)(?:\s+OUTER)?\s+JOIN)\b|(,))\s*({part}(?:\.{part})*|\()",
        part = NAME_PART
    ))
    .unwrap()
});

static ALIAS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s+(?:(?i:AS)\s+)?({})", NAME_PART)).unwrap()
});

/// State shared by one tree building invocation.
#[derive(Debug, Default)]
pub struct BuildContext {
    /// Keys of the nodes on the current descent path.
    visited: HashSet<u64>,
    subqueries: usize,
    next_id: usize,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> String {
        let id = format!("node_{}", self.next_id);
        self.next_id += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubqueryOrigin {
    From,
    Where,
}

impl SubqueryOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            SubqueryOrigin::From => "FROM",
            SubqueryOrigin::Where => "WHERE",
        }
    }
}

struct FoundSubquery<'a> {
    select: &'a SelectNode,
    origin: SubqueryOrigin,
    alias: Option<String>,
}

/// Builds the tree of a whole statement. `sql` is the statement text kept on
/// the top-level node.
pub fn build_tree(statement: &SqlNode, sql: &str) -> QueryTreeNode {
    let mut ctx = BuildContext::new();
    build_statement(statement, sql, &mut ctx)
}

fn build_statement(statement: &SqlNode, sql: &str, ctx: &mut BuildContext) -> QueryTreeNode {
    match statement {
        SqlNode::Select(select) => {
            let mut node = build(select, 0, ctx);
            node.sql = sql.to_owned();
            node
        }
        SqlNode::Call(call) if call.operator == Operator::OrderBy => {
            let mut node = match call.operand(0) {
                Some(query) => build_statement(query, sql, ctx),
                None => unsupported_statement(sql, ctx),
            };
            let has_order_by = matches!(call.operand(1), Some(SqlNode::NodeList(items)) if !items.is_empty());
            if has_order_by && node.order_by.is_empty() {
                node.order_by = vec![ELIDED_ORDER_BY.to_owned()];
            }
            node
        }
        SqlNode::Call(call) if matches!(call.operator, Operator::Set(_)) => {
            build_set_operation(statement, sql, ctx)
        }
        SqlNode::Call(call) if matches!(call.operator, Operator::With { .. }) => {
            log::warn!("Common table expressions are not analyzed, building an empty root node");
            let mut node = QueryTreeNode::new(ctx.next_id(), NodeType::Root, 0);
            node.sql = sql.to_owned();
            node.description = Some(WITH_STATEMENT.to_owned());
            node
        }
        _ => unsupported_statement(sql, ctx),
    }
}

fn unsupported_statement(sql: &str, ctx: &mut BuildContext) -> QueryTreeNode {
    log::warn!("Statement is not a query, building an empty root node");
    let mut node = QueryTreeNode::new(ctx.next_id(), NodeType::Root, 0);
    node.sql = sql.to_owned();
    node.description = Some("unsupported statement".to_owned());
    node
}

fn collect_branches<'a>(node: &'a SqlNode, branches: &mut Vec<&'a SqlNode>, operators: &mut Vec<String>) {
    match node {
        SqlNode::Call(call) => match &call.operator {
            Operator::Set(set_operator) => {
                if let [left, right] = call.operands.as_slice() {
                    collect_branches(left, branches, operators);
                    operators.push(set_operator.as_str().to_owned());
                    collect_branches(right, branches, operators);
                }
            }
            Operator::OrderBy => {
                if let Some(query) = call.operand(0) {
                    collect_branches(query, branches, operators);
                }
            }
            _ => branches.push(node),
        },
        _ => branches.push(node),
    }
}

fn build_set_operation(statement: &SqlNode, sql: &str, ctx: &mut BuildContext) -> QueryTreeNode {
    let mut root = QueryTreeNode::new(ctx.next_id(), NodeType::Root, 0);
    root.sql = sql.to_owned();

    let mut branches = vec![];
    let mut operators = vec![];
    collect_branches(statement, &mut branches, &mut operators);

    root.description = Some(format!(
        "set operation over {} branches ({})",
        branches.len(),
        operators.join(", ")
    ));
    root.metadata.insert(
        "setOperators".to_owned(),
        serde_json::Value::from(operators.clone()),
    );

    for (i, branch) in branches.into_iter().enumerate() {
        match branch {
            SqlNode::Select(select) => {
                let mut child = build(select, 1, ctx);
                child.node_type = NodeType::Select;
                child.alias = Some(format!("BRANCH{}", i));
                if child.description.is_none() {
                    child.description = Some(format!("set operation branch #{}", i));
                }
                root.children.push(child);
            }
            other => log::warn!("Skipping set operation branch that is not a SELECT: {:?}", other),
        }
    }

    root
}

fn cycle_key(level: usize, text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    level.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}

/// Builds the node of one SELECT at `level`, recursing into its FROM and
/// WHERE subqueries.
///
/// Past [`MAX_TREE_DEPTH`] or when the same query is met again on the
/// current descent path a placeholder node is returned instead.
pub fn build(select: &SelectNode, level: usize, ctx: &mut BuildContext) -> QueryTreeNode {
    if level > MAX_TREE_DEPTH {
        log::warn!(
            "{}",
            AnalysisError::RecursionLimitReached(format!(
                "Query nesting exceeds {} levels, not descending.",
                MAX_TREE_DEPTH
            ))
        );
        return QueryTreeNode::placeholder(ctx.next_id(), level, DEPTH_LIMIT_REACHED, "truncated");
    }

    let sql = match render_query(select) {
        Ok(sql) => strip_quotes(&sql),
        Err(err) => {
            log::warn!("{}", err);
            FALLBACK_TEXT.to_owned()
        }
    };

    let key = cycle_key(level, &sql);
    if !ctx.visited.insert(key) {
        log::warn!(
            "{}",
            AnalysisError::CyclicReference(format!(
                "Query at level {} is already on the descent path.",
                level
            ))
        );
        return QueryTreeNode::placeholder(ctx.next_id(), level, CYCLIC_REFERENCE, "cyclic");
    }

    let node = build_select_node(select, level, sql, ctx);
    ctx.visited.remove(&key);
    node
}

fn build_select_node(
    select: &SelectNode,
    level: usize,
    sql: String,
    ctx: &mut BuildContext,
) -> QueryTreeNode {
    let mut node = QueryTreeNode::new(ctx.next_id(), NodeType::Select, level);
    node.sql = sql;
    log::debug!("[level {}] Building node {}", level, node.id);

    if let Some(from) = &select.from {
        node.tables = extract_tables(from, level);
        node.joins = extract_joins(from);
    }
    if node.joins.iter().any(|join| join.condition.is_some()) {
        node.join_condition = Some(ELIDED_CONDITION.to_owned());
    }
    if select.r#where.is_some() {
        node.where_condition = Some(ELIDED_CONDITION.to_owned());
    }
    node.group_by = select
        .group_by
        .iter()
        .map(|item| truncate(&safe_to_string(item), MAX_GROUP_BY_LENGTH))
        .collect();
    if !select.order_by.is_empty() {
        node.order_by = vec![ELIDED_ORDER_BY.to_owned()];
    }

    node.fields = select
        .select_list
        .iter()
        .map(|item| extract_field(item, &node.tables))
        .collect();
    node.expressions = select
        .select_list
        .iter()
        .flat_map(shallow_expressions)
        .collect();

    let found = find_subqueries(select);
    log::debug!("[level {}] Found {} subqueries", level, found.len());
    if found.is_empty() {
        return node;
    }

    if level >= MAX_TREE_DEPTH {
        log::warn!(
            "{}",
            AnalysisError::RecursionLimitReached(format!(
                "Skipping {} subqueries below level {}.",
                found.len(),
                level
            ))
        );
        node.description = Some(DEPTH_LIMIT_REACHED.to_owned());
        node.metadata
            .insert("truncated".to_owned(), serde_json::Value::Bool(true));
        return node;
    }

    for (i, subquery) in found.into_iter().enumerate() {
        if ctx.subqueries >= MAX_SUBQUERIES {
            log::warn!(
                "{}",
                AnalysisError::RecursionLimitReached(format!(
                    "More than {} subqueries in statement, skipping the rest.",
                    MAX_SUBQUERIES
                ))
            );
            node.metadata
                .insert("subqueryLimitReached".to_owned(), serde_json::Value::Bool(true));
            break;
        }
        ctx.subqueries += 1;

        let mut child = build(subquery.select, level + 1, ctx);
        child.node_type = NodeType::Subquery;
        child.alias = Some(format!("SUB{}", i));
        if child.description.is_none() {
            child.description = Some(format!("{} subquery #{}", subquery.origin.as_str(), i));
        }
        if let Some(alias) = subquery.alias {
            child
                .metadata
                .insert("sourceAlias".to_owned(), serde_json::Value::String(alias));
        }
        node.children.push(child);
    }

    node
}

/// Sub-selects of the FROM clause, then of the WHERE clause, in depth-first order.
fn find_subqueries(select: &SelectNode) -> Vec<FoundSubquery<'_>> {
    let mut found = vec![];
    if let Some(from) = &select.from {
        scan_for_subqueries(from, SubqueryOrigin::From, None, &mut found);
    }
    if let Some(r#where) = &select.r#where {
        scan_for_subqueries(r#where, SubqueryOrigin::Where, None, &mut found);
    }
    found
}

fn scan_for_subqueries<'a>(
    node: &'a SqlNode,
    origin: SubqueryOrigin,
    alias: Option<String>,
    found: &mut Vec<FoundSubquery<'a>>,
) {
    match node {
        SqlNode::Select(select) => found.push(FoundSubquery {
            select,
            origin,
            alias,
        }),
        SqlNode::Call(call) if call.operator == Operator::As => {
            let alias = call.operand(1).map(safe_to_string);
            if let Some(inner) = call.operand(0) {
                scan_for_subqueries(inner, origin, alias, found);
            }
        }
        SqlNode::Call(call) => {
            for operand in &call.operands {
                scan_for_subqueries(operand, origin, None, found);
            }
        }
        SqlNode::NodeList(nodes) => {
            for node in nodes {
                scan_for_subqueries(node, origin, None, found);
            }
        }
        SqlNode::Identifier(_) | SqlNode::Literal(_) => {}
    }
}

/// Table references of a FROM clause, matched on its rendered text.
pub fn extract_tables(from: &SqlNode, level: usize) -> Vec<TableReference> {
    let text = match render_from(from) {
        Ok(text) => format!("FROM {}", text),
        Err(err) => {
            log::warn!("{}", err);
            return vec![];
        }
    };

    let mut tables = vec![];
    tables_in_text(&text, level, &mut tables);

    let mut seen = HashSet::new();
    tables.retain(|table: &TableReference| {
        let key = match (&table.subquery, &table.schema) {
            (Some(_), _) => format!("{} {}", table.name, table.reference_name()),
            (None, Some(schema)) => format!("{}.{}", schema, table.name),
            (None, None) => table.name.clone(),
        };
        seen.insert(key.to_lowercase())
    });
    tables
}

fn join_type_of(keyword: &str) -> Option<&'static str> {
    let keyword = keyword.to_uppercase();
    let keyword = keyword.split_whitespace().collect::<Vec<_>>();
    match keyword.first().copied() {
        Some("FROM") => None,
        Some(",") | Some("CROSS") => Some("CROSS"),
        Some("LEFT") => Some("LEFT"),
        Some("RIGHT") => Some("RIGHT"),
        Some("FULL") => Some("FULL"),
        _ => Some("INNER"),
    }
}

/// Unquoted parts of a possibly qualified name such as `` `s p`.t ``.
fn name_parts(name: &str) -> Vec<String> {
    let mut parts = vec![];
    let mut part = String::new();
    let mut quoted = false;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' if quoted && chars.peek() == Some(&'`') => {
                chars.next();
                part.push('`');
            }
            '`' => quoted = !quoted,
            '.' if !quoted => parts.push(std::mem::take(&mut part)),
            _ => part.push(c),
        }
    }
    parts.push(part);
    parts
}

/// Alias following position `start`. Matching runs on `masked`, the text is
/// taken from `text`.
fn alias_after(text: &str, masked: &str, start: usize) -> Option<String> {
    let alias = ALIAS_PATTERN.captures(masked.get(start..)?)?.get(1)?;
    let raw = text.get(start + alias.start()..start + alias.end())?;
    if raw.starts_with('`') {
        name_parts(raw).pop()
    } else if is_sql_keyword(raw) {
        None
    } else {
        Some(raw.to_owned())
    }
}

fn tables_in_text(text: &str, level: usize, tables: &mut Vec<TableReference>) {
    let masked = mask_parenthesized(&mask_string_literals(&mask_quoted_identifiers(text)));

    for captures in TABLE_PATTERN.captures_iter(&masked) {
        let Some(target) = captures.get(3) else {
            continue;
        };
        let keyword = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map_or("FROM", |m| m.as_str());
        let join_type = join_type_of(keyword).map(str::to_owned);
        let joined_with = tables.last().map(|table: &TableReference| table.name.clone());

        if target.as_str() == "(" {
            let open = target.start();
            let Some(close) = masked[open + 1..].find(')').map(|i| open + 1 + i) else {
                continue;
            };
            let Some(inner) = text.get(open + 1..close).map(str::trim) else {
                continue;
            };
            let is_query = inner
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
            if is_query {
                tables.push(TableReference {
                    name: format!("SUBQUERY_{}", level),
                    alias: Some(
                        alias_after(text, &masked, close + 1)
                            .unwrap_or_else(|| "SUBQUERY".to_owned()),
                    ),
                    schema: None,
                    subquery: Some(strip_quotes(inner)),
                    join_type: Some("FROM_SUBQUERY".to_owned()),
                    joined_with,
                });
            } else {
                // Parenthesized join
                let first_nested = tables.len();
                tables_in_text(&format!("FROM {}", inner), level, tables);
                if let Some(table) = tables.get_mut(first_nested) {
                    table.join_type = join_type;
                    table.joined_with = joined_with;
                }
            }
            continue;
        }

        let Some(full_name) = text.get(target.range()) else {
            continue;
        };
        if is_sql_keyword(full_name) {
            continue;
        }
        let mut parts = name_parts(full_name);
        let name = parts.pop().unwrap_or_default();
        let schema = (!parts.is_empty()).then(|| parts.join("."));
        tables.push(TableReference {
            name,
            alias: alias_after(text, &masked, target.end()),
            schema,
            subquery: None,
            join_type,
            joined_with,
        });
    }
}

/// Join clauses of a FROM tree, left to right.
pub fn extract_joins(from: &SqlNode) -> Vec<JoinInfo> {
    let mut joins = vec![];
    collect_joins(from, &mut joins);
    joins
}

fn collect_joins(node: &SqlNode, joins: &mut Vec<JoinInfo>) {
    let SqlNode::Call(call) = node else {
        return;
    };
    let Operator::Join(kind) = call.operator else {
        return;
    };
    let (Some(left), Some(right)) = (call.operand(0), call.operand(1)) else {
        return;
    };

    collect_joins(left, joins);

    let (condition, columns) = match call.operand(2) {
        Some(SqlNode::Call(cond)) if cond.operator == Operator::On => {
            let condition = cond.operand(0).map(safe_to_string).unwrap_or_default();
            let columns = extract_all_fields(&condition);
            (Some(condition), columns)
        }
        Some(SqlNode::Call(cond)) if cond.operator == Operator::Using => {
            let columns = match cond.operand(0) {
                Some(SqlNode::NodeList(columns)) => columns.iter().map(safe_to_string).collect(),
                _ => vec![],
            };
            (Some(format!("USING ({})", columns.join(", "))), columns)
        }
        _ => (None, vec![]),
    };

    joins.push(JoinInfo {
        join_type: kind.as_str().to_owned(),
        left_table: adjacent_table_name(left, true),
        right_table: adjacent_table_name(right, false),
        condition,
        columns,
    });

    collect_joins(right, joins);
}

/// Name of the table next to a join keyword: the rightmost table of its
/// left operand or the leftmost table of its right operand.
fn adjacent_table_name(node: &SqlNode, rightmost: bool) -> String {
    match node {
        SqlNode::Identifier(ident) => ident.name(),
        SqlNode::Select(_) => "SUBQUERY".to_owned(),
        SqlNode::Call(call) => match call.operator {
            Operator::As => call
                .operand(1)
                .map(safe_to_string)
                .unwrap_or_else(|| "UNKNOWN".to_owned()),
            Operator::Join(_) => {
                let side = if rightmost { call.operand(1) } else { call.operand(0) };
                side.map_or_else(|| "UNKNOWN".to_owned(), |side| adjacent_table_name(side, rightmost))
            }
            Operator::Set(_) | Operator::OrderBy => "SUBQUERY".to_owned(),
            _ => "UNKNOWN".to_owned(),
        },
        _ => "UNKNOWN".to_owned(),
    }
}

fn extract_field(item: &SqlNode, tables: &[TableReference]) -> FieldInfo {
    let (expr, alias) = match item {
        SqlNode::Call(call) if call.operator == Operator::As => (
            call.operand(0).unwrap_or(item),
            call.operand(1).map(safe_to_string),
        ),
        _ => (item, None),
    };

    let expression = safe_to_string(expr);
    let name = alias.clone().unwrap_or_else(|| expression.clone());
    let case_when = mentions_case(&expression);
    let if_null = ["IFNULL", "COALESCE", "NVL"]
        .iter()
        .any(|function| calls_function(&expression, function));
    let aggregated = case_when || !functions_in_text(&expression).is_empty();
    let source_fields = classify(item).all_source_fields();

    FieldInfo {
        table: owning_table(&source_fields, &expression, tables),
        data_type: infer_data_type(expr),
        name,
        alias,
        aggregated,
        expression,
        source_fields,
        case_when,
        if_null,
    }
}

fn owning_table(
    source_fields: &[String],
    expression: &str,
    tables: &[TableReference],
) -> Option<String> {
    let qualifiers: Vec<&str> = source_fields
        .iter()
        .filter_map(|field| field.rsplit_once('.').map(|(qualifier, _)| qualifier))
        .collect();
    let unqualified = source_fields.len() - qualifiers.len();

    match qualifiers.first() {
        Some(first) if unqualified == 0 && qualifiers.iter().all(|q| q == first) => {
            Some((*first).to_owned())
        }
        Some(_) => None,
        None => {
            let references_columns = unqualified > 0 || expression.contains('*');
            match tables {
                [table] if references_columns => Some(table.name.clone()),
                _ => None,
            }
        }
    }
}

fn infer_data_type(expr: &SqlNode) -> Option<String> {
    match expr {
        SqlNode::Literal(Literal::Number(_)) => Some("NUMERIC".to_owned()),
        SqlNode::Literal(Literal::String(_)) => Some("VARCHAR".to_owned()),
        SqlNode::Literal(Literal::Bool(_)) => Some("BOOLEAN".to_owned()),
        SqlNode::Call(call) => match &call.operator {
            Operator::Function { name, .. } => {
                find_function(name).and_then(|function| function.data_type.map(str::to_owned))
            }
            Operator::Cast { target } => Some(target.clone()),
            Operator::Concat => Some("VARCHAR".to_owned()),
            Operator::And | Operator::Or | Operator::Xor | Operator::Not | Operator::Exists => {
                Some("BOOLEAN".to_owned())
            }
            operator if operator.precedence() == 5 => Some("BOOLEAN".to_owned()),
            _ => None,
        },
        _ => None,
    }
}

/// Text-matched CASE and function leaves of one select item.
fn shallow_expressions(item: &SqlNode) -> Vec<ExpressionInfo> {
    let text = safe_to_string(item);
    let mut expressions = vec![];

    if mentions_case(&text) {
        let mut case_expr = ExpressionInfo::new(Some(ExpressionType::CaseWhen), text.clone(), 1);
        case_expr.function = Some("CASE".to_owned());
        expressions.push(case_expr);
    }
    for function in functions_in_text(&text) {
        let mut function_expr = ExpressionInfo::new(Some(function.kind), text.clone(), 1);
        function_expr.function = Some(function.name.to_owned());
        expressions.push(function_expr);
    }

    expressions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql;

    fn tree(sql: &str) -> QueryTreeNode {
        build_tree(&parse_sql(sql).unwrap(), sql)
    }

    #[test]
    fn extracts_tables_with_aliases_and_join_types() {
        let node = tree(
            "select * from db.orders o inner join customers as c on o.cid = c.id, items \
             left outer join (select 1 as x) s on true cross join z",
        );
        let summary: Vec<_> = node
            .tables
            .iter()
            .map(|t| {
                (
                    t.name.as_str(),
                    t.alias.as_deref(),
                    t.schema.as_deref(),
                    t.join_type.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("orders", Some("o"), Some("db"), None),
                ("customers", Some("c"), None, Some("INNER")),
                ("items", None, None, Some("CROSS")),
                ("SUBQUERY_0", Some("s"), None, Some("FROM_SUBQUERY")),
                ("z", None, None, Some("CROSS")),
            ]
        );
        assert_eq!(node.tables[1].joined_with.as_deref(), Some("orders"));
        assert_eq!(node.tables[3].subquery.as_deref(), Some("SELECT 1 AS x"));
    }

    #[test]
    fn keeps_quoted_names_whole() {
        let node = tree("select * from `tä,ble` t join `s p`.`t q` on true");
        let summary: Vec<_> = node
            .tables
            .iter()
            .map(|t| (t.name.as_str(), t.alias.as_deref(), t.schema.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![("tä,ble", Some("t"), None), ("t q", None, Some("s p"))]
        );

        let node = tree("select * from (select 1) as `weird alias`, `a``b` as `from`");
        assert_eq!(node.tables[0].name, "SUBQUERY_0");
        assert_eq!(node.tables[0].alias.as_deref(), Some("weird alias"));
        assert_eq!(node.tables[1].name, "a`b");
        assert_eq!(node.tables[1].alias.as_deref(), Some("from"));
        assert_eq!(node.tables[1].join_type.as_deref(), Some("CROSS"));
    }

    #[test]
    fn deduplicates_tables_case_insensitively() {
        let node = tree("select * from t join T on true");
        assert_eq!(node.tables.len(), 1);
    }

    #[test]
    fn extracts_structural_joins() {
        let node = tree("select * from a join b using (id, k) left join (select 1) s on s.x = b.y");
        assert_eq!(node.joins.len(), 2);
        assert_eq!(node.joins[0].join_type, "INNER");
        assert_eq!(node.joins[0].left_table, "a");
        assert_eq!(node.joins[0].right_table, "b");
        assert_eq!(node.joins[0].condition.as_deref(), Some("USING (id, k)"));
        assert_eq!(node.joins[0].columns, vec!["id", "k"]);
        assert_eq!(node.joins[1].join_type, "LEFT");
        assert_eq!(node.joins[1].left_table, "b");
        assert_eq!(node.joins[1].right_table, "s");
        assert_eq!(node.joins[1].columns, vec!["s.x", "b.y"]);
        assert_eq!(node.join_condition.as_deref(), Some(ELIDED_CONDITION));
    }

    #[test]
    fn fields_and_shallow_expressions() {
        let node = tree(
            "select o.id, count(*) as n, ifnull(o.note, 'none') note, \
             case when o.total > 10 then 'big' end as size, 1 \
             from orders o group by o.id order by n",
        );
        let id = &node.fields[0];
        assert_eq!((id.name.as_str(), id.aggregated), ("o.id", false));
        assert_eq!(id.table.as_deref(), Some("o"));

        let n = &node.fields[1];
        assert_eq!((n.name.as_str(), n.expression.as_str()), ("n", "COUNT(*)"));
        assert!(n.aggregated);
        assert_eq!(n.data_type.as_deref(), Some("BIGINT"));
        assert_eq!(n.table.as_deref(), Some("orders"));

        let note = &node.fields[2];
        assert!(note.if_null && note.aggregated && !note.case_when);
        assert_eq!(note.source_fields, vec!["o.note"]);

        let size = &node.fields[3];
        assert!(size.case_when && size.aggregated);
        assert_eq!(size.source_fields, vec!["o.total"]);

        let constant = &node.fields[4];
        assert_eq!(constant.name, "1");
        assert_eq!(constant.data_type.as_deref(), Some("NUMERIC"));

        let kinds: Vec<_> = node
            .expressions
            .iter()
            .map(|e| (e.expression_type, e.function.as_deref()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Some(ExpressionType::Aggregate), Some("COUNT")),
                (Some(ExpressionType::Function), Some("IFNULL")),
                (Some(ExpressionType::CaseWhen), Some("CASE")),
            ]
        );
        assert_eq!(node.group_by, vec!["o.id"]);
        assert_eq!(node.order_by, vec![ELIDED_ORDER_BY]);
    }

    #[test]
    fn where_and_from_subqueries() {
        let node = tree(
            "select * from (select id from a) x where id in (select id from b) \
             and exists (select 1 from c where c.id = x.id)",
        );
        assert_eq!(node.where_condition.as_deref(), Some(ELIDED_CONDITION));
        let children: Vec<_> = node
            .children
            .iter()
            .map(|c| (c.alias.as_deref(), c.description.as_deref(), c.level))
            .collect();
        assert_eq!(
            children,
            vec![
                (Some("SUB0"), Some("FROM subquery #0"), 1),
                (Some("SUB1"), Some("WHERE subquery #1"), 1),
                (Some("SUB2"), Some("WHERE subquery #2"), 1),
            ]
        );
        assert_eq!(
            node.children[0].metadata.get("sourceAlias"),
            Some(&serde_json::Value::String("x".to_owned()))
        );
        assert!(node.children.iter().all(|c| c.node_type == NodeType::Subquery));
    }

    #[test]
    fn set_operations_become_branches() {
        let node = tree("select a from t union all select b from u order by 1");
        assert_eq!(node.node_type, NodeType::Root);
        assert_eq!(node.order_by, vec![ELIDED_ORDER_BY]);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].alias.as_deref(), Some("BRANCH1"));
        assert_eq!(node.children[1].level, 1);
        assert_eq!(node.children[1].node_type, NodeType::Select);
    }

    #[test]
    fn with_statement_is_an_empty_root() {
        let node = tree("with t as (select a from u) select a from t");
        assert_eq!(node.node_type, NodeType::Root);
        assert_eq!(node.description.as_deref(), Some(WITH_STATEMENT));
        assert!(node.children.is_empty() && node.fields.is_empty());
    }

    #[test]
    fn placeholder_past_max_depth() {
        let select = match parse_sql("select 1").unwrap() {
            SqlNode::Select(select) => select,
            _ => unreachable!(),
        };
        let mut ctx = BuildContext::new();
        let node = build(&select, MAX_TREE_DEPTH + 1, &mut ctx);
        assert!(node.is_placeholder());
        assert_eq!(node.description.as_deref(), Some(DEPTH_LIMIT_REACHED));
        assert!(node.fields.is_empty());
    }

    #[test]
    fn detects_cycles_on_the_descent_path() {
        let select = match parse_sql("select 1").unwrap() {
            SqlNode::Select(select) => select,
            _ => unreachable!(),
        };
        let mut ctx = BuildContext::new();
        ctx.visited.insert(cycle_key(3, "SELECT 1"));
        let node = build(&select, 3, &mut ctx);
        assert!(node.is_placeholder());
        assert_eq!(node.description.as_deref(), Some(CYCLIC_REFERENCE));

        // same text at another level is a different key
        let node = build(&select, 4, &mut ctx);
        assert!(!node.is_placeholder());
        assert!(!ctx.visited.contains(&cycle_key(4, "SELECT 1")));
    }
}
