//! # sqlineage
//!
//! A library for breaking MySQL-style SELECT statements into a tree of nested
//! queries and reverse-deriving field-level lineage.
//!
//! # Features
//!
//! - Parse a SELECT statement (joins, set operations, CASE, casts, sub-selects) into a small typed syntax tree.
//! - Build one tree node per SELECT construct, with its tables, joins, projected fields and expressions.
//! - Trace every projected field back to its source columns and the functions applied to them.
//! - Bound the work on adversarial input: nesting depth, subquery count and input size are capped.
//! - Plug in another SQL front-end through the [`parser::Frontend`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlineage::analyzer::SqlAnalyzer;
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let sql = r#"
//!         select o.customer_id, sum(o.amount) as total
//!         from orders o
//!         where o.status in (select status from open_statuses)
//!         group by o.customer_id;
//!     "#;
//!     let result = SqlAnalyzer::new().analyze(sql);
//!     println!("Tree: {:?}", result.tree);
//!
//!     for field in result.lineage.unwrap_or_default() {
//!         println!("{} <- {:?}", field.output_field, field.source_fields);
//!     }
//!     println!("{}", serde_json::to_string_pretty(&result.statistics)?);
//!     Ok(())
//! }
//! ```
pub mod analyzer;
pub mod ast;
pub mod classifier;
pub mod error;
pub mod functions;
pub mod lineage;
pub mod model;
pub mod parser;
pub mod render;
pub mod scanner;
pub mod stats;
pub mod text;
pub mod tree_builder;

#[doc(hidden)]
pub mod test_utils;
