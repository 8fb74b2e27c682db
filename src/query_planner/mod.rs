//! The query planner: turns a parsed single-part query into relational
//! queries against the store and streams assembled rows back.
//!
//! Two execution shapes exist. A scalar pattern (`MATCH (v)` or
//! `MATCH ()-[v]-()`) projects one variable straight off its per-label
//! property tables. A path pattern scans the relationship index for
//! candidate rows first, then joins per-position property lookups back
//! onto them.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::graph_catalog::{ElementKind, GraphCatalog};
use crate::graph_db::ResultHandler;
use crate::open_cypher_parser::ast::{
    Atom, ExpressionsByVarsUsages, NodePattern, RelationshipPattern, SinglePartQuery, Variable,
};

pub mod filters;
mod path;
mod result_order;
mod scalar;

pub use result_order::{compute_result_order, ResultOrder, ReturnClauseTerm};

use filters::partition_filters;
use path::{run_path_query, PathPosition, PathQuery};
use scalar::{run_scalar_query, ScalarQuery};

/// Plans and executes one query. `on_order_and_column_names` is invoked
/// before any row, even when no row is produced.
pub fn run_single_query(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &SinglePartQuery<'_>,
    handler: &mut dyn ResultHandler,
) -> Result<()> {
    let Some(match_clause) = &query.match_clause else {
        return Err(Error::unsupported("queries without a MATCH clause"));
    };
    let pattern = &match_clause.pattern;

    // Group the projection by variable, keeping RETURN positions.
    let mut projections: BTreeMap<Variable<'_>, Vec<ReturnClauseTerm<'_>>> = BTreeMap::new();
    for (position, item) in query.return_clause.items.iter().enumerate() {
        let (Atom::Variable(var), Some(property)) = (&item.atom, item.property) else {
            return Err(Error::internal(
                "projection items are validated to be variable properties",
            ));
        };
        projections
            .entry(*var)
            .or_default()
            .push(ReturnClauseTerm { position, property });
    }

    let decomposition: ExpressionsByVarsUsages<'_, '_> = match &match_clause.where_clause {
        Some(where_clause) => where_clause.maximal_and_decomposition()?,
        None => ExpressionsByVarsUsages::new(),
    };

    validate_variables(pattern, &projections, &decomposition)?;

    // MATCH (v): one node variable.
    if pattern.chain.is_empty() {
        let node = &pattern.first_node;
        let Some(variable) = node.variable else {
            return Err(Error::unsupported("a pattern that binds no variable"));
        };
        let scalar = ScalarQuery {
            variable,
            kind: ElementKind::Node,
            labels: node.labels.iter().map(|label| label.0).collect(),
            terms: projections.remove(&variable).unwrap_or_default(),
            filters: decomposition.values().flatten().copied().collect(),
            limit: query.return_clause.limit,
        };
        return run_scalar_query(conn, catalog, &scalar, handler);
    }

    // MATCH ()-[v]-(): one relationship variable between anonymous nodes.
    if pattern.chain.len() == 1
        && pattern.first_node.is_trivial()
        && pattern.chain[0].node.is_trivial()
        && pattern.chain[0].relationship.variable.is_some()
    {
        let relationship = &pattern.chain[0].relationship;
        let variable = relationship.variable.expect("checked above");
        let scalar = ScalarQuery {
            variable,
            kind: ElementKind::Relationship,
            labels: relationship.labels.iter().map(|label| label.0).collect(),
            terms: projections.remove(&variable).unwrap_or_default(),
            filters: decomposition.values().flatten().copied().collect(),
            limit: query.return_clause.limit,
        };
        return run_scalar_query(conn, catalog, &scalar, handler);
    }

    // A path of one or more relationships.
    let mut positions: Vec<PathPosition<'_>> = Vec::with_capacity(2 * pattern.chain.len() + 1);
    positions.push(node_position(&pattern.first_node));
    for link in &pattern.chain {
        positions.push(relationship_position(&link.relationship));
        positions.push(node_position(&link.node));
    }
    let directions = pattern
        .chain
        .iter()
        .map(|link| link.relationship.direction)
        .collect();

    check_variable_kinds(&positions)?;

    let mut terms: Vec<Vec<ReturnClauseTerm<'_>>> = Vec::with_capacity(positions.len());
    for (i, position) in positions.iter().enumerate() {
        let is_owner = position.variable.is_some_and(|var| {
            !positions[..i]
                .iter()
                .any(|earlier| earlier.variable == Some(var))
        });
        let position_terms = match (is_owner, position.variable) {
            (true, Some(var)) => projections.remove(&var).unwrap_or_default(),
            _ => Vec::new(),
        };
        terms.push(position_terms);
    }

    let path = PathQuery {
        positions,
        directions,
        terms,
        filters: partition_filters(&decomposition)?,
        limit: query.return_clause.limit,
    };
    run_path_query(conn, catalog, &path, handler)
}

fn node_position<'q>(node: &NodePattern<'q>) -> PathPosition<'q> {
    PathPosition {
        kind: ElementKind::Node,
        variable: node.variable,
        labels: node.labels.iter().map(|label| label.0).collect(),
    }
}

fn relationship_position<'q>(relationship: &RelationshipPattern<'q>) -> PathPosition<'q> {
    PathPosition {
        kind: ElementKind::Relationship,
        variable: relationship.variable,
        labels: relationship.labels.iter().map(|label| label.0).collect(),
    }
}

/// Every variable used in RETURN or WHERE must be bound by the pattern.
fn validate_variables(
    pattern: &crate::open_cypher_parser::ast::PatternElement<'_>,
    projections: &BTreeMap<Variable<'_>, Vec<ReturnClauseTerm<'_>>>,
    decomposition: &ExpressionsByVarsUsages<'_, '_>,
) -> Result<()> {
    let mut bound: BTreeSet<Variable<'_>> = BTreeSet::new();
    bound.extend(pattern.first_node.variable);
    for link in &pattern.chain {
        bound.extend(link.relationship.variable);
        bound.extend(link.node.variable);
    }

    for var in projections.keys() {
        if !bound.contains(var) {
            return Err(Error::Parse(format!(
                "variable '{}' used in RETURN is not defined in the pattern",
                var
            )));
        }
    }
    for usages in decomposition.keys() {
        for var in usages.keys() {
            if !bound.contains(var) {
                return Err(Error::Parse(format!(
                    "variable '{}' used in WHERE is not defined in the pattern",
                    var
                )));
            }
        }
    }
    Ok(())
}

/// A variable may repeat across node positions (the plan pins them to the
/// same element), but a relationship variable binding two pattern
/// relationships would always violate relationship uniqueness, and one
/// variable cannot name both a node and a relationship.
fn check_variable_kinds(positions: &[PathPosition<'_>]) -> Result<()> {
    let mut kinds: BTreeMap<Variable<'_>, (ElementKind, usize)> = BTreeMap::new();
    for position in positions {
        let Some(var) = position.variable else {
            continue;
        };
        match kinds.get_mut(&var) {
            None => {
                kinds.insert(var, (position.kind, 1));
            }
            Some((kind, occurrences)) => {
                if *kind != position.kind {
                    return Err(Error::Parse(format!(
                        "variable '{}' is used both as a node and as a relationship",
                        var
                    )));
                }
                *occurrences += 1;
                if position.kind == ElementKind::Relationship {
                    return Err(Error::Parse(format!(
                        "relationship variable '{}' cannot be bound twice in one pattern",
                        var
                    )));
                }
            }
        }
    }
    Ok(())
}
