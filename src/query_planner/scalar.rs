use rusqlite::Connection;

use crate::error::Result;
use crate::graph_catalog::{ElementKind, GraphCatalog};
use crate::graph_db::{ResultHandler, RowAction};
use crate::graph_store::{query_rows, StatementMode};
use crate::open_cypher_parser::ast::{Expression, Limit, Variable};
use crate::sqlite_query_generator::{QueryParams, VarQueryInfo, VarsQueryInfo};
use crate::value::Value;

use super::filters::{fold_filter, FilterOutcome};
use super::result_order::{compute_result_order, ReturnClauseTerm};

/// A scalar pattern: a single node or relationship variable, e.g.
/// `MATCH (v:Label) ...` or `MATCH ()-[v]-() ...`.
pub struct ScalarQuery<'e, 'q> {
    pub variable: Variable<'q>,
    pub kind: ElementKind,
    pub labels: Vec<&'q str>,
    pub terms: Vec<ReturnClauseTerm<'q>>,
    pub filters: Vec<&'e Expression<'q>>,
    pub limit: Option<Limit>,
}

/// Plans and runs a scalar query: one SELECT per candidate label over that
/// label's property table, UNION-ALL-joined, filters constant-folded per
/// label, unknown properties projected as NULL.
pub fn run_scalar_query(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &ScalarQuery<'_, '_>,
    handler: &mut dyn ResultHandler,
) -> Result<()> {
    let column_names: Vec<String> = query
        .terms
        .iter()
        .map(|term| term.property.0.to_string())
        .collect();
    let order = compute_result_order(&[&query.terms]);
    handler.on_order_and_column_names(&order, &[Some(query.variable.0)], &[column_names.clone()]);

    let mut sql = String::new();
    let mut params = QueryParams::new();

    for label in catalog.candidate_labels(query.kind, &query.labels) {
        let Some(schema) = catalog.label_schema(&label) else {
            // The declared label was never registered.
            continue;
        };
        if schema.kind != query.kind {
            continue;
        }

        let outcome = if query.filters.is_empty() {
            FilterOutcome::Always
        } else {
            let mut vars_info = VarsQueryInfo::new();
            vars_info.insert(
                query.variable,
                VarQueryInfo {
                    property_columns: Default::default(),
                    type_index_column: None,
                    variable_labels: Some([label.clone()].into()),
                    element_types: catalog.element_types(query.kind),
                },
            );
            fold_filter(&query.filters, schema.field_names(), &vars_info)?
        };
        let predicate = match outcome {
            FilterOutcome::Skip => {
                log::trace!("label '{}' excluded by constant-folded filter", label);
                continue;
            }
            FilterOutcome::Always => None,
            FilterOutcome::Predicate(predicate) => Some(predicate),
        };

        if !sql.is_empty() {
            sql.push_str(" UNION ALL ");
        }
        sql.push_str("SELECT ");
        for (i, term) in query.terms.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            if !schema.contains(term.property.0) {
                sql.push_str("NULL as ");
            }
            sql.push_str(term.property.0);
        }
        sql.push_str(" FROM ");
        sql.push_str(&label);
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            let rendered = predicate.render(&mut params);
            sql.push_str(&rendered);
        }
    }

    if sql.is_empty() {
        return Ok(());
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max_rows));
    }

    let column_count = query.terms.len();
    query_rows(conn, &sql, &params, StatementMode::Cached, |row| {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: rusqlite::types::Value = row.get(i)?;
            values.push(Value::from(value));
        }
        Ok(handler.on_row(&[values.as_slice()]) == RowAction::Continue)
    })?;
    Ok(())
}
