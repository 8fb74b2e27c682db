use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Value, ValueList};

/// Name of the system ID property carried by every node and relationship.
/// `id(v)` in a query is sugar for `v.SYS__ID`.
pub const SYS_ID: &str = "SYS__ID";

/// A variable bound in a pattern, e.g. `n` in `(n:Person)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable<'a>(pub &'a str);

impl fmt::Display for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A property key, e.g. `age` in `n.age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKey<'a>(pub &'a str);

impl PropertyKey<'_> {
    pub fn is_id(&self) -> bool {
        self.0 == SYS_ID
    }
}

impl fmt::Display for PropertyKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node or relationship label, e.g. `Person` in `(n:Person)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label<'a>(pub &'a str);

impl fmt::Display for Label<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label constraints are AND-ed: an element must carry every listed label.
/// Empty means unconstrained.
pub type Labels<'a> = BTreeSet<Label<'a>>;

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern<'a> {
    pub variable: Option<Variable<'a>>,
    pub labels: Labels<'a>,
}

impl NodePattern<'_> {
    /// A trivial node pattern binds nothing: `()`.
    pub fn is_trivial(&self) -> bool {
        self.variable.is_none() && self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Any,
    Forward,
    Backward,
}

impl TraversalDirection {
    /// The direction as seen from the other end of the relationship.
    pub fn mirrored(self) -> Self {
        match self {
            TraversalDirection::Any => TraversalDirection::Any,
            TraversalDirection::Forward => TraversalDirection::Backward,
            TraversalDirection::Backward => TraversalDirection::Forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern<'a> {
    pub direction: TraversalDirection,
    pub variable: Option<Variable<'a>>,
    pub labels: Labels<'a>,
}

/// One `-[r]-(m)` link in a pattern element.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternElementChain<'a> {
    pub relationship: RelationshipPattern<'a>,
    pub node: NodePattern<'a>,
}

/// A pattern element: a first node followed by a chain of relationship/node
/// links, e.g. `(a)-[r]->(b)<-[s]-(c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternElement<'a> {
    pub first_node: NodePattern<'a>,
    pub chain: Vec<PatternElementChain<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause<'a> {
    pub pattern: PatternElement<'a>,
    pub where_clause: Option<Expression<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause<'a> {
    pub items: Vec<NonArithmeticOperatorExpression<'a>>,
    pub limit: Option<Limit>,
}

/// A single-part query: `MATCH ... [WHERE ...] RETURN ... [LIMIT n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePartQuery<'a> {
    pub match_clause: Option<MatchClause<'a>>,
    pub return_clause: ReturnClause<'a>,
}

/// A literal value appearing in an expression: either a scalar or a
/// homogeneous list (the only list shape the store can bind).
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Scalar(Value),
    List(ValueList),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    And,
    Or,
    Xor,
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregator::And => "AND",
            Aggregator::Or => "OR",
            Aggregator::Xor => "XOR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The atom of a non-arithmetic operator expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom<'a> {
    Variable(Variable<'a>),
    Literal(Literal),
    /// A parenthesized sub-expression, e.g. `(a.x = 1 OR a.x = 2)`.
    Aggregate(Box<AggregateExpression<'a>>),
    /// A `$name` placeholder. Resolved against the query's parameter map
    /// before the query reaches the planner.
    Parameter(&'a str),
}

/// An atom with an optional property lookup and an optional label
/// constraint. Valid shapes are: a variable with labels (a label
/// predicate), a variable with a property (a property read), and a bare
/// literal.
#[derive(Debug, Clone, PartialEq)]
pub struct NonArithmeticOperatorExpression<'a> {
    pub atom: Atom<'a>,
    pub property: Option<PropertyKey<'a>>,
    pub labels: Labels<'a>,
}

impl<'a> NonArithmeticOperatorExpression<'a> {
    pub fn property_of(variable: Variable<'a>, property: PropertyKey<'a>) -> Self {
        NonArithmeticOperatorExpression {
            atom: Atom::Variable(variable),
            property: Some(property),
            labels: Labels::new(),
        }
    }

    pub fn literal(literal: Literal) -> Self {
        NonArithmeticOperatorExpression {
            atom: Atom::Literal(literal),
            property: None,
            labels: Labels::new(),
        }
    }
}

/// Guaranteed by construction to hold two or more children.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpression<'a> {
    pub aggregator: Aggregator,
    pub children: Vec<Expression<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonExpression<'a> {
    pub left: NonArithmeticOperatorExpression<'a>,
    pub comparison: Comparison,
    pub right: NonArithmeticOperatorExpression<'a>,
}

/// The list-membership form of the string/list/null predicate family.
/// Only `lhs IN [literals]` is supported.
#[derive(Debug, Clone, PartialEq)]
pub struct InListExpression<'a> {
    pub left: NonArithmeticOperatorExpression<'a>,
    pub list: NonArithmeticOperatorExpression<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression<'a> {
    Aggregate(AggregateExpression<'a>),
    Comparison(ComparisonExpression<'a>),
    InList(InListExpression<'a>),
    Operand(NonArithmeticOperatorExpression<'a>),
}

/// How one variable is used inside an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarUsage<'a> {
    pub label_constrained: bool,
    pub properties: BTreeSet<PropertyKey<'a>>,
}

impl VarUsage<'_> {
    /// Whether the usage touches any property other than the system ID.
    pub fn uses_non_id_property(&self) -> bool {
        self.properties.iter().any(|p| !p.is_id())
    }
}

pub type VarsUsages<'a> = BTreeMap<Variable<'a>, VarUsage<'a>>;

/// Per-variable union of properties, OR of the label-constraint flag.
pub fn merge_usages<'a>(into: &mut VarsUsages<'a>, from: VarsUsages<'a>) {
    for (var, usage) in from {
        let entry = into.entry(var).or_default();
        entry.label_constrained |= usage.label_constrained;
        entry.properties.extend(usage.properties);
    }
}

/// Leaves of the maximal AND-decomposition, grouped by their variable
/// usage. The original expression is equivalent to the AND-aggregation of
/// all referenced leaves.
pub type ExpressionsByVarsUsages<'e, 'a> = BTreeMap<VarsUsages<'a>, Vec<&'e Expression<'a>>>;

impl<'a> NonArithmeticOperatorExpression<'a> {
    pub fn vars_usages(&self) -> VarsUsages<'a> {
        match &self.atom {
            Atom::Variable(var) => {
                let mut usage = VarUsage::default();
                if let Some(property) = &self.property {
                    usage.properties.insert(*property);
                }
                usage.label_constrained = !self.labels.is_empty();
                let mut res = VarsUsages::new();
                res.insert(*var, usage);
                res
            }
            Atom::Literal(_) | Atom::Parameter(_) => VarsUsages::new(),
            Atom::Aggregate(aggregate) => aggregate.vars_usages(),
        }
    }
}

impl<'a> AggregateExpression<'a> {
    pub fn vars_usages(&self) -> VarsUsages<'a> {
        let mut res = VarsUsages::new();
        for child in &self.children {
            merge_usages(&mut res, child.vars_usages());
        }
        res
    }
}

impl<'a> Expression<'a> {
    pub fn vars_usages(&self) -> VarsUsages<'a> {
        match self {
            Expression::Aggregate(aggregate) => aggregate.vars_usages(),
            Expression::Comparison(comparison) => {
                let mut res = comparison.left.vars_usages();
                merge_usages(&mut res, comparison.right.vars_usages());
                res
            }
            Expression::InList(in_list) => in_list.left.vars_usages(),
            Expression::Operand(operand) => operand.vars_usages(),
        }
    }

    /// Decomposes the expression into the deepest list of leaves connected
    /// by contiguous AND-aggregation from the root, grouped by variable
    /// usage. OR-aggregates stay atomic; XOR cannot be compiled.
    pub fn maximal_and_decomposition<'e>(&'e self) -> Result<ExpressionsByVarsUsages<'e, 'a>> {
        let mut exprs = ExpressionsByVarsUsages::new();
        self.collect_and_leaves(&mut exprs)?;
        Ok(exprs)
    }

    fn collect_and_leaves<'e>(&'e self, exprs: &mut ExpressionsByVarsUsages<'e, 'a>) -> Result<()> {
        match self {
            Expression::Aggregate(aggregate) => match aggregate.aggregator {
                Aggregator::Xor => Err(Error::unsupported("XOR expressions")),
                Aggregator::Or => {
                    exprs.entry(self.vars_usages()).or_default().push(self);
                    Ok(())
                }
                Aggregator::And => {
                    for child in &aggregate.children {
                        child.collect_and_leaves(exprs)?;
                    }
                    Ok(())
                }
            },
            Expression::Comparison(_) | Expression::InList(_) => {
                exprs.entry(self.vars_usages()).or_default().push(self);
                Ok(())
            }
            Expression::Operand(operand) => match &operand.atom {
                Atom::Variable(_) => {
                    if operand.property.is_some() {
                        // A bare property read is not a boolean term.
                        return Err(Error::unsupported(
                            "a property access cannot be used as a WHERE term by itself",
                        ));
                    }
                    if operand.labels.is_empty() {
                        return Err(Error::unsupported(
                            "a bare variable cannot be used as a WHERE term",
                        ));
                    }
                    exprs.entry(self.vars_usages()).or_default().push(self);
                    Ok(())
                }
                Atom::Literal(_) | Atom::Parameter(_) => Err(Error::unsupported(
                    "a literal cannot be used as a WHERE term by itself",
                )),
                Atom::Aggregate(aggregate) => {
                    if operand.property.is_some() || !operand.labels.is_empty() {
                        return Err(Error::unsupported(
                            "property access on a parenthesized expression",
                        ));
                    }
                    match aggregate.aggregator {
                        Aggregator::Xor => Err(Error::unsupported("XOR expressions")),
                        Aggregator::Or => {
                            exprs.entry(self.vars_usages()).or_default().push(self);
                            Ok(())
                        }
                        Aggregator::And => {
                            for child in &aggregate.children {
                                child.collect_and_leaves(exprs)?;
                            }
                            Ok(())
                        }
                    }
                }
            },
        }
    }
}
