use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Top of a set operation, its children are the branches. Statements
    /// that are not analyzed are a childless root.
    Root,
    Select,
    Subquery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpressionType {
    Aggregate,
    Function,
    CaseWhen,
    Logical,
    Subquery,
}

/// One structural node: a SELECT construct, top-level or nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTreeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub level: usize,
    pub sql: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub tables: Vec<TableReference>,
    pub joins: Vec<JoinInfo>,
    pub fields: Vec<FieldInfo>,
    pub expressions: Vec<ExpressionInfo>,
    pub children: Vec<QueryTreeNode>,
    pub join_condition: Option<String>,
    pub where_condition: Option<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl QueryTreeNode {
    pub fn new(id: String, node_type: NodeType, level: usize) -> Self {
        Self {
            id,
            node_type,
            level,
            sql: String::new(),
            alias: None,
            description: None,
            tables: vec![],
            joins: vec![],
            fields: vec![],
            expressions: vec![],
            children: vec![],
            join_condition: None,
            where_condition: None,
            group_by: vec![],
            order_by: vec![],
            metadata: IndexMap::new(),
        }
    }

    /// A node standing in for a subtree that was not built.
    pub fn placeholder(id: String, level: usize, description: &str, marker: &str) -> Self {
        let mut node = Self::new(id, NodeType::Select, level);
        node.description = Some(description.to_owned());
        node.metadata
            .insert("placeholder".to_owned(), serde_json::Value::Bool(true));
        node.metadata
            .insert(marker.to_owned(), serde_json::Value::Bool(true));
        node
    }

    pub fn is_placeholder(&self) -> bool {
        self.metadata
            .get("placeholder")
            .is_some_and(|value| value == &serde_json::Value::Bool(true))
    }

    pub fn is_truncated(&self) -> bool {
        self.metadata
            .get("truncated")
            .is_some_and(|value| value == &serde_json::Value::Bool(true))
    }

    /// Pre-order iterator over this node and all of its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &QueryTreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Number of edges on the longest path down to a leaf.
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.height() + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub name: String,
    pub alias: Option<String>,
    pub schema: Option<String>,
    /// Text of a derived table.
    pub subquery: Option<String>,
    pub join_type: Option<String>,
    /// Table this one is joined to.
    pub joined_with: Option<String>,
}

impl TableReference {
    /// Alias if present, name otherwise.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinInfo {
    pub join_type: String,
    pub left_table: String,
    pub right_table: String,
    pub condition: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub alias: Option<String>,
    pub table: Option<String>,
    pub data_type: Option<String>,
    #[serde(rename = "isAggregated")]
    pub aggregated: bool,
    pub expression: String,
    pub source_fields: Vec<String>,
    pub case_when: bool,
    pub if_null: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionInfo {
    #[serde(rename = "type")]
    pub expression_type: Option<ExpressionType>,
    pub expression: String,
    pub function: Option<String>,
    pub condition: Option<String>,
    pub nested_expressions: Vec<ExpressionInfo>,
    pub source_fields: Vec<String>,
    pub depth: usize,
}

impl ExpressionInfo {
    pub fn new(expression_type: Option<ExpressionType>, expression: String, depth: usize) -> Self {
        Self {
            expression_type,
            expression,
            depth,
            ..Default::default()
        }
    }

    pub fn add_source_field(&mut self, field: &str) {
        if !self.source_fields.iter().any(|f| f == field) {
            self.source_fields.push(field.to_owned());
        }
    }

    /// Source fields of this expression and of every nested one, first seen first.
    pub fn all_source_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = vec![];
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            for field in &expr.source_fields {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
            stack.extend(expr.nested_expressions.iter().rev());
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceField {
    pub table: String,
    pub field: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageStep {
    pub from: String,
    pub to: String,
    pub operation: String,
}

/// Provenance of one output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLineage {
    pub output_field: String,
    pub output_table: String,
    pub expression: Option<String>,
    pub function: Option<String>,
    pub source_fields: Vec<SourceField>,
    pub path: Vec<LineageStep>,
    pub transformations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStatistics {
    pub total_levels: usize,
    pub total_tables: usize,
    pub total_joins: usize,
    pub total_subqueries: usize,
    pub total_fields: usize,
}

/// Outcome of one analysis. Either `tree` and `lineage` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub success: bool,
    pub original_sql: String,
    pub tree: Option<QueryTreeNode>,
    pub lineage: Option<Vec<FieldLineage>>,
    pub statistics: Option<ParseStatistics>,
    pub error: Option<String>,
}

impl ParseResult {
    pub fn success(
        sql: &str,
        tree: QueryTreeNode,
        lineage: Vec<FieldLineage>,
        statistics: ParseStatistics,
    ) -> Self {
        Self {
            success: true,
            original_sql: sql.to_owned(),
            tree: Some(tree),
            lineage: Some(lineage),
            statistics: Some(statistics),
            error: None,
        }
    }

    pub fn failure(sql: &str, error: String) -> Self {
        Self {
            success: false,
            original_sql: sql.to_owned(),
            tree: None,
            lineage: None,
            statistics: None,
            error: Some(error),
        }
    }
}
