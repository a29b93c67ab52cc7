use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlineage::{
    analyzer::SqlAnalyzer,
    ast::SqlNode,
    lineage::analyze_lineage,
    parser::parse_sql,
    test_utils::{LINEAGE_TESTS_FILE, TestLineageData},
    tree_builder::build_tree,
};

fn build_lineage_tests(asts: &[(SqlNode, String)]) {
    for (ast, sql) in asts {
        let tree = build_tree(ast, sql);
        let _ = analyze_lineage(&tree);
    }
}

fn analyze_tests(analyzer: &SqlAnalyzer, sqls: &[String]) {
    for sql in sqls {
        let _ = analyzer.analyze(sql);
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    let sqls = test_lineage_data
        .tests
        .iter()
        .map(|test| test.sql.trim().trim_end_matches(';').to_owned())
        .collect::<Vec<_>>();
    let asts = sqls
        .iter()
        .map(|sql| {
            let ast = parse_sql(sql)
                .unwrap_or_else(|err| panic!("Could not parse sql due to: {:?}", &err));
            (ast, sql.clone())
        })
        .collect::<Vec<_>>();

    c.bench_function("bench tree and lineage tests", |b| {
        b.iter(|| build_lineage_tests(black_box(&asts)))
    });

    let analyzer = SqlAnalyzer::new();
    c.bench_function("bench analysis tests", |b| {
        b.iter(|| analyze_tests(black_box(&analyzer), black_box(&sqls)))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(1000);
    targets = criterion_benchmark
);
criterion_main!(benches);
