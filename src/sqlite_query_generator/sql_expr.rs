use std::collections::BTreeSet;
use std::fmt::Write;

use crate::open_cypher_parser::ast::Comparison;
use crate::value::{Value, ValueList};

/// Index a label maps to in the catalog; stored in the system tables.
pub type TypeIndex = i64;

/// Whether an element may carry multiple labels. The store schema allows
/// exactly one label per element, which lets a constraint requiring two
/// labels fold to FALSE statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountLabelsPerElement {
    One,
    Multi,
}

/// Three-valued result of constant folding, mirroring SQL's WHERE logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    False,
    Unknown,
    True,
}

impl Evaluation {
    pub fn negated(self) -> Self {
        match self {
            Evaluation::False => Evaluation::True,
            Evaluation::True => Evaluation::False,
            Evaluation::Unknown => Evaluation::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlAggregator {
    And,
    Or,
}

impl SqlAggregator {
    fn as_str(&self) -> &'static str {
        match self {
            SqlAggregator::And => "AND",
            SqlAggregator::Or => "OR",
        }
    }
}

pub fn comparison_str(c: Comparison) -> &'static str {
    match c {
        Comparison::Eq => "=",
        Comparison::Ne => "<>",
        Comparison::Lt => "<",
        Comparison::Le => "<=",
        Comparison::Gt => ">",
        Comparison::Ge => ">=",
    }
}

/// A positional parameter bound to a statement: a scalar, or a typed list
/// bound through the store's array interface.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Value),
    List(ValueList),
}

/// Parameters collected while rendering a statement. Placeholder numbers
/// follow render order, so the statement text and this table stay in sync.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct QueryParams {
    values: Vec<ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        QueryParams::default()
    }

    /// Adds a scalar parameter, returning its 1-based placeholder index.
    pub fn push_scalar(&mut self, value: Value) -> usize {
        self.values.push(ParamValue::Scalar(value));
        self.values.len()
    }

    /// Adds an array parameter, returning its 1-based placeholder index.
    pub fn push_list(&mut self, list: ValueList) -> usize {
        self.values.push(ParamValue::List(list));
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ParamValue)> {
        self.values.iter().enumerate().map(|(i, v)| (i + 1, v))
    }
}

/// A relational filter expression, rendered into the WHERE clause of a
/// statement against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    ScalarLiteral(Value),
    ListLiteral(ValueList),
    Column(String),
    Null,
    True,
    False,
    Not(Box<SqlExpr>),
    /// `<type_column> IN (i1, i2, ...)`: the element's label must be one
    /// of the listed type indices. The indices are AND-ed constraints that
    /// have already been resolved; requiring two at once is unsatisfiable
    /// when elements carry a single label.
    LabelsConstraint {
        type_column: String,
        indices: BTreeSet<TypeIndex>,
    },
    Comparison {
        left: Box<SqlExpr>,
        comparison: Comparison,
        right: Box<SqlExpr>,
    },
    InList {
        left: Box<SqlExpr>,
        list: Box<SqlExpr>,
    },
    Aggregate {
        aggregator: SqlAggregator,
        children: Vec<SqlExpr>,
    },
}

impl SqlExpr {
    /// Constant-folds the expression over {False, Unknown, True}.
    /// `None` means the expression cannot be evaluated statically.
    pub fn try_evaluate(&self, labels_per_element: CountLabelsPerElement) -> Option<Evaluation> {
        match self {
            SqlExpr::ScalarLiteral(_) | SqlExpr::ListLiteral(_) | SqlExpr::Column(_) => None,
            SqlExpr::Null => Some(Evaluation::Unknown),
            SqlExpr::True => Some(Evaluation::True),
            SqlExpr::False => Some(Evaluation::False),
            SqlExpr::Not(inner) => inner
                .try_evaluate(labels_per_element)
                .map(Evaluation::negated),
            SqlExpr::LabelsConstraint { indices, .. } => {
                if labels_per_element == CountLabelsPerElement::One && indices.len() >= 2 {
                    return Some(Evaluation::False);
                }
                None
            }
            SqlExpr::Comparison {
                left,
                comparison,
                right,
            } => {
                let left_eval = left.try_evaluate(labels_per_element);
                let right_eval = right.try_evaluate(labels_per_element);
                if left_eval == Some(Evaluation::Unknown) || right_eval == Some(Evaluation::Unknown)
                {
                    return Some(Evaluation::Unknown);
                }
                if let (Some(left_eval), Some(right_eval)) = (left_eval, right_eval) {
                    let l = left_eval == Evaluation::True;
                    let r = right_eval == Evaluation::True;
                    match comparison {
                        Comparison::Eq => {
                            return Some(if l == r { Evaluation::True } else { Evaluation::False })
                        }
                        Comparison::Ne => {
                            return Some(if l != r { Evaluation::True } else { Evaluation::False })
                        }
                        _ => {}
                    }
                }
                None
            }
            SqlExpr::InList { left, list } => {
                let left_eval = left.try_evaluate(labels_per_element);
                let right_eval = list.try_evaluate(labels_per_element);
                if left_eval == Some(Evaluation::Unknown) || right_eval == Some(Evaluation::Unknown)
                {
                    return Some(Evaluation::Unknown);
                }
                None
            }
            SqlExpr::Aggregate {
                aggregator,
                children,
            } => match aggregator {
                SqlAggregator::And => {
                    let mut has_unknown = false;
                    let mut has_non_evaluated = false;
                    for child in children {
                        match child.try_evaluate(labels_per_element) {
                            Some(Evaluation::False) => return Some(Evaluation::False),
                            Some(Evaluation::Unknown) => has_unknown = true,
                            Some(Evaluation::True) => {}
                            None => has_non_evaluated = true,
                        }
                    }
                    if has_unknown {
                        return Some(Evaluation::Unknown);
                    }
                    if has_non_evaluated {
                        return None;
                    }
                    Some(Evaluation::True)
                }
                SqlAggregator::Or => {
                    let mut has_unknown = false;
                    let mut has_non_evaluated = false;
                    for child in children {
                        match child.try_evaluate(labels_per_element) {
                            Some(Evaluation::True) => return Some(Evaluation::True),
                            Some(Evaluation::Unknown) => has_unknown = true,
                            Some(Evaluation::False) => {}
                            None => has_non_evaluated = true,
                        }
                    }
                    if has_non_evaluated {
                        return None;
                    }
                    if has_unknown {
                        return Some(Evaluation::Unknown);
                    }
                    Some(Evaluation::False)
                }
            },
        }
    }

    /// Renders the expression, appending placeholder values to `params`.
    /// Numeric literals are inlined; strings, blobs and lists are bound.
    pub fn to_sql(&self, sql: &mut String, params: &mut QueryParams) {
        match self {
            SqlExpr::ScalarLiteral(value) => match value {
                Value::Null => sql.push_str("NULL"),
                Value::Integer(i) => {
                    let _ = write!(sql, "{}", i);
                }
                Value::Float(x) => {
                    let _ = write!(sql, "{:?}", x);
                }
                owned => {
                    let index = params.push_scalar(owned.clone());
                    let _ = write!(sql, "?{}", index);
                }
            },
            SqlExpr::ListLiteral(list) => {
                let index = params.push_list(list.clone());
                let _ = write!(sql, "rarray(?{})", index);
            }
            SqlExpr::Column(name) => sql.push_str(name),
            SqlExpr::Null => sql.push_str("NULL"),
            SqlExpr::True => sql.push_str("TRUE"),
            SqlExpr::False => sql.push_str("FALSE"),
            SqlExpr::Not(inner) => {
                sql.push_str("NOT (");
                inner.to_sql(sql, params);
                sql.push(')');
            }
            SqlExpr::LabelsConstraint {
                type_column,
                indices,
            } => {
                sql.push_str(type_column);
                sql.push_str(" IN (");
                for (i, index) in indices.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    let _ = write!(sql, "{}", index);
                }
                sql.push(')');
            }
            SqlExpr::Comparison {
                left,
                comparison,
                right,
            } => {
                sql.push('(');
                left.to_sql(sql, params);
                sql.push_str(") ");
                sql.push_str(comparison_str(*comparison));
                sql.push_str(" (");
                right.to_sql(sql, params);
                sql.push(')');
            }
            SqlExpr::InList { left, list } => {
                left.to_sql(sql, params);
                sql.push_str(" IN ");
                list.to_sql(sql, params);
            }
            SqlExpr::Aggregate {
                aggregator,
                children,
            } => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push(' ');
                        sql.push_str(aggregator.as_str());
                        sql.push(' ');
                    }
                    sql.push('(');
                    child.to_sql(sql, params);
                    sql.push(')');
                }
            }
        }
    }

    /// Convenience wrapper over `to_sql` for a standalone predicate.
    pub fn render(&self, params: &mut QueryParams) -> String {
        let mut sql = String::new();
        self.to_sql(&mut sql, params);
        sql
    }

    /// AND-aggregates expressions; a single expression stays as-is.
    pub fn and_all(mut exprs: Vec<SqlExpr>) -> SqlExpr {
        if exprs.len() == 1 {
            return exprs.pop().expect("one expression");
        }
        SqlExpr::Aggregate {
            aggregator: SqlAggregator::And,
            children: exprs,
        }
    }
}
