use serde::Deserialize;

pub const PARSING_TESTS_FILE: &str = "tests/parsing_tests.toml";
pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsing {
    pub sql: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestParsingData {
    pub tests: Vec<TestParsing>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestSource {
    pub table: String,
    pub field: String,
}

impl PartialEq<crate::model::SourceField> for TestSource {
    fn eq(&self, other: &crate::model::SourceField) -> bool {
        self.table == other.table && self.field == other.field
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestFieldLineage {
    pub output_field: String,
    pub function: Option<String>,
    pub operations: Vec<String>,
    #[serde(default)]
    pub sources: Vec<TestSource>,
    #[serde(default)]
    pub transformations: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub sql: String,
    pub total_levels: usize,
    pub total_subqueries: usize,
    pub lineage: Vec<TestFieldLineage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}
