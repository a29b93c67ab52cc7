use sqlineage::{
    analyzer::analyze_sql,
    test_utils::{LINEAGE_TESTS_FILE, TestLineageData},
};

#[test]
fn test_lineage() {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    for test in test_lineage_data.tests {
        println!("Testing lineage for SQL: {}", &test.sql);
        let result = analyze_sql(&test.sql);
        assert!(
            result.success,
            "Could not analyze sql due to: {:?}",
            result.error
        );

        let statistics = result.statistics.unwrap();
        assert_eq!(statistics.total_levels, test.total_levels);
        assert_eq!(statistics.total_subqueries, test.total_subqueries);

        let lineage = result.lineage.unwrap();
        assert_eq!(
            lineage
                .iter()
                .map(|l| l.output_field.as_str())
                .collect::<Vec<_>>(),
            test.lineage
                .iter()
                .map(|l| l.output_field.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(statistics.total_fields, lineage.len());

        for (field_lineage, expected) in lineage.iter().zip(&test.lineage) {
            println!("Checking lineage of field: {}", expected.output_field);
            assert_eq!(field_lineage.output_table, "RESULT");
            assert_eq!(field_lineage.function, expected.function);
            assert_eq!(
                field_lineage
                    .path
                    .iter()
                    .map(|step| step.operation.as_str())
                    .collect::<Vec<_>>(),
                expected.operations
            );
            assert_eq!(field_lineage.path[0].to, field_lineage.output_field);
            assert_eq!(expected.sources, field_lineage.source_fields);
            assert_eq!(field_lineage.transformations, expected.transformations);
        }
    }
}

#[test]
fn test_lineage_is_idempotent() {
    let sql = "select s.k, sum(s.v) as total from (select k, v from t where v > 0) s group by s.k";
    let first = analyze_sql(sql);
    let second = analyze_sql(sql);
    assert_eq!(first, second);
    assert_eq!(
        sqlineage::lineage::analyze_lineage(first.tree.as_ref().unwrap()),
        first.lineage.unwrap()
    );
}

#[test]
fn test_serialized_field_names() {
    let result = analyze_sql("select count(*) as n from t");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["originalSql"], "select count(*) as n from t");
    assert!(json["error"].is_null());
    assert_eq!(json["tree"]["type"], "SELECT");
    assert_eq!(json["tree"]["fields"][0]["isAggregated"], true);
    assert_eq!(json["tree"]["expressions"][0]["type"], "AGGREGATE");
    assert_eq!(json["lineage"][0]["outputField"], "n");
    assert_eq!(json["lineage"][0]["outputTable"], "RESULT");
    assert_eq!(json["statistics"]["totalLevels"], 1);
    assert_eq!(json["statistics"]["totalFields"], 1);
}
