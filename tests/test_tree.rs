use std::sync::Arc;

use sqlineage::{
    analyzer::{SqlAnalyzer, analyze_sql},
    model::{NodeType, ParseResult, QueryTreeNode},
    parser::{MAX_QUERY_DEPTH, parse_sql},
    render::render,
    tree_builder::{MAX_SUBQUERIES, MAX_TREE_DEPTH},
};

fn analyze_ok(sql: &str) -> ParseResult {
    let result = analyze_sql(sql);
    assert!(result.success, "{:?}", result.error);
    result
}

fn nested_from_subqueries(depth: usize) -> String {
    let mut sql = "select id from base".to_owned();
    for i in 0..depth {
        sql = format!("select * from ({}) t{}", sql, i);
    }
    sql
}

#[test]
fn test_subquery_free_select_is_one_node() {
    for sql in [
        "select 1",
        "select a, b from t where a > 1 group by a, b order by a",
        "select a.id, b.name from a left join b on a.id = b.a_id",
    ] {
        let result = analyze_ok(sql);
        let tree = result.tree.unwrap();
        assert_eq!(tree.iter().count(), 1);
        assert_eq!(tree.level, 0);
        assert_eq!(tree.node_type, NodeType::Select);
        assert_eq!(result.statistics.unwrap().total_subqueries, 0);
    }
}

#[test]
fn test_single_from_subquery() {
    let result = analyze_ok("select x.n from (select count(*) as n from t) x");
    let tree = result.tree.unwrap();
    assert_eq!(tree.children.len(), 1);
    let child = &tree.children[0];
    assert_eq!(child.node_type, NodeType::Subquery);
    assert_eq!(child.level, 1);
    assert_eq!(child.alias.as_deref(), Some("SUB0"));
    assert_eq!(child.sql, "SELECT COUNT(*) AS n FROM t");
    assert_eq!(result.statistics.unwrap().total_subqueries, 1);

    let derived = &tree.tables[0];
    assert_eq!(derived.name, "SUBQUERY_0");
    assert_eq!(derived.alias.as_deref(), Some("x"));
    assert_eq!(derived.join_type.as_deref(), Some("FROM_SUBQUERY"));
}

#[test]
fn test_levels_increase_with_nesting() {
    let result = analyze_ok(&nested_from_subqueries(5));
    let tree = result.tree.unwrap();
    fn check(node: &QueryTreeNode) {
        for child in &node.children {
            assert_eq!(child.level, node.level + 1);
            check(child);
        }
    }
    check(&tree);
    assert_eq!(result.statistics.unwrap().total_levels, 6);
}

#[test]
fn test_depth_bound() {
    let result = analyze_ok(&nested_from_subqueries(25));
    let tree = result.tree.unwrap();

    let deepest = tree.iter().max_by_key(|node| node.level).unwrap();
    assert_eq!(deepest.level, MAX_TREE_DEPTH);
    assert!(deepest.is_truncated());
    assert_eq!(deepest.description.as_deref(), Some("depth limit reached"));
    assert!(deepest.children.is_empty());

    let statistics = result.statistics.unwrap();
    assert_eq!(statistics.total_levels, MAX_TREE_DEPTH + 1);
    assert_eq!(statistics.total_subqueries, MAX_TREE_DEPTH);
}

fn nested_where_subqueries(depth: usize, predicate: fn(&str) -> String) -> String {
    let mut sql = "select a from base".to_owned();
    for i in 0..depth {
        sql = format!("select a from t{} where {}", i, predicate(&sql));
    }
    sql
}

#[test]
fn test_deep_where_subqueries() {
    let predicates: [fn(&str) -> String; 3] = [
        |q| format!("a in ({})", q),
        |q| format!("exists ({})", q),
        |q| format!("a = ({})", q),
    ];
    for predicate in predicates {
        let result = analyze_ok(&nested_where_subqueries(25, predicate));
        let tree = result.tree.unwrap();

        let deepest = tree.iter().max_by_key(|node| node.level).unwrap();
        assert_eq!(deepest.level, MAX_TREE_DEPTH);
        assert!(deepest.is_truncated());
        assert_eq!(result.statistics.unwrap().total_levels, MAX_TREE_DEPTH + 1);
    }
}

#[test]
fn test_very_deep_subqueries_are_analyzed() {
    let from = analyze_ok(&nested_from_subqueries(40));
    assert_eq!(from.statistics.unwrap().total_levels, MAX_TREE_DEPTH + 1);

    let sql = nested_where_subqueries(1_000, |q| format!("a in ({})", q));
    let parsed = parse_sql(&sql).unwrap();
    let rendered = render(&parsed).unwrap();
    assert_eq!(rendered.matches("SELECT ...").count(), 1);
    assert_eq!(rendered.matches("SELECT a FROM").count(), MAX_QUERY_DEPTH);
    let result = analyze_ok(&sql);
    assert_eq!(result.statistics.unwrap().total_levels, MAX_TREE_DEPTH + 1);
}

#[test]
fn test_with_statement_has_empty_root() {
    let result = analyze_ok("with c as (select a from t) select a from c");
    let tree = result.tree.unwrap();
    assert_eq!(tree.node_type, NodeType::Root);
    assert!(tree.children.is_empty());
    assert!(result.lineage.unwrap().is_empty());
}

#[test]
fn test_subquery_cap() {
    // 11 subqueries with 11 subqueries each
    let inner = |i: usize| {
        (0..11)
            .map(|j| format!("c{} in (select c from u{}_{})", j, i, j))
            .collect::<Vec<_>>()
            .join(" and ")
    };
    let predicates = (0..11)
        .map(|i| format!("k{} in (select k from s{} where {})", i, i, inner(i)))
        .collect::<Vec<_>>()
        .join(" and ");
    let result = analyze_ok(&format!("select a from t where {}", predicates));
    let tree = result.tree.unwrap();

    let subqueries = tree
        .iter()
        .filter(|node| node.node_type == NodeType::Subquery)
        .count();
    assert_eq!(subqueries, MAX_SUBQUERIES);
    assert_eq!(result.statistics.unwrap().total_subqueries, MAX_SUBQUERIES);
    assert_eq!(tree.children.len(), 9);
    assert_eq!(
        tree.metadata.get("subqueryLimitReached"),
        Some(&serde_json::Value::Bool(true))
    );
    assert_eq!(tree.children[8].children.len(), 3);
    assert!(tree.children[8].metadata.contains_key("subqueryLimitReached"));
}

#[test]
fn test_identical_sibling_subqueries_are_not_cycles() {
    let result = analyze_ok(
        "select * from (select id from t) a join (select id from t) b on a.id = b.id",
    );
    let tree = result.tree.unwrap();
    assert_eq!(tree.children.len(), 2);
    assert!(tree.children.iter().all(|child| !child.is_placeholder()));
    assert_eq!(tree.children[0].sql, tree.children[1].sql);
}

#[test]
fn test_sum_property() {
    let result = analyze_ok("SELECT SUM(amount) AS total FROM orders");
    let tree = result.tree.unwrap();
    assert_eq!(tree.fields.len(), 1);
    assert_eq!(tree.fields[0].name, "total");
    assert!(tree.fields[0].aggregated);

    let lineage = result.lineage.unwrap();
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].output_field, "total");
    let operations = lineage[0]
        .path
        .iter()
        .map(|step| step.operation.as_str())
        .collect::<Vec<_>>();
    assert_eq!(operations, vec!["SELECT", "SUM"]);
    assert_eq!(lineage[0].path[1].from, "amount");
}

#[test]
fn test_left_join_property() {
    let result = analyze_ok("SELECT a.id, b.name FROM a LEFT JOIN b ON a.id=b.a_id");
    let tree = result.tree.unwrap();
    let tables = tree
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t.join_type.as_deref()))
        .collect::<Vec<_>>();
    assert_eq!(tables, vec![("a", None), ("b", Some("LEFT"))]);
    assert_eq!(tree.fields.len(), 2);
    assert!(tree.fields.iter().all(|f| !f.aggregated));

    assert_eq!(tree.joins.len(), 1);
    assert_eq!(tree.joins[0].condition.as_deref(), Some("a.id = b.a_id"));
    assert_eq!(result.statistics.unwrap().total_joins, 1);
}

#[test]
fn test_trailing_semicolon_is_stripped() {
    let with_semicolon = analyze_ok("SELECT 1;");
    let without = analyze_ok("SELECT 1");
    assert_eq!(with_semicolon.tree, without.tree);
    assert_eq!(with_semicolon.lineage, without.lineage);
    assert_eq!(with_semicolon.original_sql, "SELECT 1;");
}

#[test]
fn test_garbage_input_fails() {
    for sql in ["", "   ", "this is not sql", "select from where", "select 1 +"] {
        let result = analyze_sql(sql);
        assert!(!result.success);
        assert_eq!(result.original_sql, sql);
        assert!(result.tree.is_none());
        assert!(result.lineage.is_none());
        assert!(result.statistics.is_none());
        let error = result.error.unwrap();
        assert!(error.starts_with("SQL parse error: "), "{}", error);
    }
}

#[test]
fn test_concurrent_analyses_are_independent() {
    let analyzer = Arc::new(SqlAnalyzer::new());
    let sqls = [
        nested_from_subqueries(3),
        "select sum(a) as s from t".to_owned(),
        "select x from (select x from y) z where x in (select x from w)".to_owned(),
        "select 1 from".to_owned(),
    ];
    let expected = sqls.iter().map(|sql| analyzer.analyze(sql)).collect::<Vec<_>>();

    let handles = (0..8)
        .map(|_| {
            let analyzer = Arc::clone(&analyzer);
            let sqls = sqls.clone();
            std::thread::spawn(move || {
                sqls.iter()
                    .map(|sql| analyzer.analyze(sql))
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
