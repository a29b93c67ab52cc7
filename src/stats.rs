use crate::model::{FieldLineage, NodeType, ParseStatistics, QueryTreeNode};

pub fn calculate_statistics(tree: &QueryTreeNode, lineage: &[FieldLineage]) -> ParseStatistics {
    let mut statistics = ParseStatistics {
        total_levels: 1 + tree.height(),
        total_fields: lineage.len(),
        ..Default::default()
    };
    for node in tree.iter() {
        statistics.total_tables += node.tables.len();
        statistics.total_joins += node.joins.len();
        if node.node_type == NodeType::Subquery {
            statistics.total_subqueries += 1;
        }
    }
    statistics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JoinInfo, TableReference};

    #[test]
    fn counts_over_the_whole_tree() {
        let mut root = QueryTreeNode::new("node_0".to_owned(), NodeType::Select, 0);
        root.tables.push(TableReference::default());
        root.joins.push(JoinInfo::default());
        let mut child = QueryTreeNode::new("node_1".to_owned(), NodeType::Subquery, 1);
        child.tables.push(TableReference::default());
        child
            .children
            .push(QueryTreeNode::new("node_2".to_owned(), NodeType::Subquery, 2));
        root.children.push(child);

        let statistics = calculate_statistics(&root, &[]);
        assert_eq!(
            statistics,
            ParseStatistics {
                total_levels: 3,
                total_tables: 2,
                total_joins: 1,
                total_subqueries: 2,
                total_fields: 0,
            }
        );
    }
}
