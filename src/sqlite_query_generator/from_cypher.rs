use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::graph_catalog::IndexedLabels;
use crate::open_cypher_parser::ast::{
    AggregateExpression, Aggregator, Atom, Expression, InListExpression, Literal,
    NonArithmeticOperatorExpression, Variable,
};

use super::sql_expr::{SqlAggregator, SqlExpr, TypeIndex};

/// How an openCypher variable is addressed while building one SQL query.
///
/// For the relationship-index scan only `property_columns` (mapping the ID
/// property to its scan column) and `type_index_column` are populated; for
/// a per-label property-table query only `variable_labels` is.
#[derive(Debug, Clone)]
pub struct VarQueryInfo<'q> {
    /// Property key -> the column name it is addressed by in this query.
    /// Properties absent here render under their own name.
    pub property_columns: BTreeMap<&'q str, String>,
    /// Column holding the element's type index, when the query exposes it.
    pub type_index_column: Option<String>,
    /// When known, the labels the variable's elements are guaranteed to
    /// carry in this query.
    pub variable_labels: Option<BTreeSet<String>>,
    /// All indexed labels for the variable's element kind.
    pub element_types: &'q IndexedLabels,
}

pub type VarsQueryInfo<'q> = BTreeMap<Variable<'q>, VarQueryInfo<'q>>;

/// Translates a Cypher filter expression into a relational expression
/// against one query's columns. Properties that are not declared fields of
/// the target table become NULL, matching Cypher's missing-property
/// semantics.
pub fn to_sql_tree(
    expression: &Expression<'_>,
    sql_fields: &BTreeSet<String>,
    vars_info: &VarsQueryInfo<'_>,
) -> Result<SqlExpr> {
    match expression {
        Expression::Aggregate(aggregate) => aggregate_to_sql(aggregate, sql_fields, vars_info),
        Expression::Comparison(comparison) => {
            let left = operand_to_sql(&comparison.left, sql_fields, vars_info)?;
            let right = operand_to_sql(&comparison.right, sql_fields, vars_info)?;
            Ok(SqlExpr::Comparison {
                left: Box::new(left),
                comparison: comparison.comparison,
                right: Box::new(right),
            })
        }
        Expression::InList(InListExpression { left, list }) => {
            let left = operand_to_sql(left, sql_fields, vars_info)?;
            let list = operand_to_sql(list, sql_fields, vars_info)?;
            Ok(SqlExpr::InList {
                left: Box::new(left),
                list: Box::new(list),
            })
        }
        Expression::Operand(operand) => operand_to_sql(operand, sql_fields, vars_info),
    }
}

fn aggregate_to_sql(
    aggregate: &AggregateExpression<'_>,
    sql_fields: &BTreeSet<String>,
    vars_info: &VarsQueryInfo<'_>,
) -> Result<SqlExpr> {
    let aggregator = match aggregate.aggregator {
        Aggregator::And => SqlAggregator::And,
        Aggregator::Or => SqlAggregator::Or,
        Aggregator::Xor => return Err(Error::unsupported("XOR expressions")),
    };
    let mut children = Vec::with_capacity(aggregate.children.len());
    for child in &aggregate.children {
        children.push(to_sql_tree(child, sql_fields, vars_info)?);
    }
    Ok(SqlExpr::Aggregate {
        aggregator,
        children,
    })
}

fn operand_to_sql(
    operand: &NonArithmeticOperatorExpression<'_>,
    sql_fields: &BTreeSet<String>,
    vars_info: &VarsQueryInfo<'_>,
) -> Result<SqlExpr> {
    match &operand.atom {
        Atom::Variable(var) => {
            let info = vars_info.get(var).ok_or_else(|| {
                Error::internal(format!("no query info for variable '{}'", var))
            })?;

            let Some(property) = &operand.property else {
                if operand.labels.is_empty() {
                    return Err(Error::unsupported(format!(
                        "using the bare variable '{}' in a predicate",
                        var
                    )));
                }
                return labels_to_sql(operand, info);
            };

            if !sql_fields.contains(property.0) {
                // Not a column of the target table: reads as null.
                return Ok(SqlExpr::Null);
            }
            if let Some(column) = info.property_columns.get(property.0) {
                return Ok(SqlExpr::Column(column.clone()));
            }
            // By convention the caller projects the property under its own name.
            Ok(SqlExpr::Column(property.0.to_string()))
        }
        Atom::Literal(literal) => {
            if operand.property.is_some() {
                return Err(Error::internal("a literal cannot have a property"));
            }
            Ok(match literal {
                Literal::Scalar(value) => SqlExpr::ScalarLiteral(value.clone()),
                Literal::List(list) => SqlExpr::ListLiteral(list.clone()),
            })
        }
        Atom::Aggregate(aggregate) => aggregate_to_sql(aggregate, sql_fields, vars_info),
        Atom::Parameter(name) => Err(Error::internal(format!(
            "unresolved parameter ${} reached the SQL generator",
            name
        ))),
    }
}

/// A label constraint on a variable: TRUE/FALSE when the variable's labels
/// are known for this query, a type-index constraint otherwise.
fn labels_to_sql(
    operand: &NonArithmeticOperatorExpression<'_>,
    info: &VarQueryInfo<'_>,
) -> Result<SqlExpr> {
    if let Some(known_labels) = &info.variable_labels {
        let satisfied = operand
            .labels
            .iter()
            .all(|required| known_labels.contains(required.0));
        return Ok(if satisfied { SqlExpr::True } else { SqlExpr::False });
    }

    let type_column = info.type_index_column.as_ref().ok_or_else(|| {
        Error::internal("variable query info has neither labels nor a type-index column")
    })?;

    let mut indices = BTreeSet::<TypeIndex>::new();
    for label in &operand.labels {
        match info.element_types.get_index(label.0) {
            Some(index) => {
                indices.insert(index);
            }
            // A required label that is not a registered type can never match.
            None => return Ok(SqlExpr::False),
        }
    }
    Ok(SqlExpr::LabelsConstraint {
        type_column: type_column.clone(),
        indices,
    })
}
