//! Translation of Cypher filter expressions into SQL expressions against
//! the store, plus three-valued constant folding used by the planner to
//! prune per-label queries.

mod from_cypher;
mod sql_expr;

pub use from_cypher::{to_sql_tree, VarQueryInfo, VarsQueryInfo};
pub use sql_expr::{
    comparison_str, CountLabelsPerElement, Evaluation, ParamValue, QueryParams, SqlAggregator,
    SqlExpr, TypeIndex,
};
