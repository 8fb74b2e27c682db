use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::open_cypher_parser::ast::{
    Expression, ExpressionsByVarsUsages, PropertyKey, Variable,
};
use crate::sqlite_query_generator::{
    to_sql_tree, CountLabelsPerElement, Evaluation, SqlExpr, VarsQueryInfo,
};

/// Result of compiling a list of AND-ed filter leaves against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// The filter is statically FALSE or UNKNOWN: the table contributes no
    /// rows and can be skipped entirely.
    Skip,
    /// The filter is statically TRUE: no WHERE clause is needed.
    Always,
    /// The filter must be evaluated by the store.
    Predicate(SqlExpr),
}

/// Compiles filter leaves to a single relational predicate and
/// constant-folds it. Missing properties have already been replaced by
/// NULL by the translation, which is what makes the fold meaningful.
pub fn fold_filter(
    filters: &[&Expression<'_>],
    sql_fields: &BTreeSet<String>,
    vars_info: &VarsQueryInfo<'_>,
) -> Result<FilterOutcome> {
    if filters.is_empty() {
        return Err(Error::internal("expected at least one filter expression"));
    }
    let mut children = Vec::with_capacity(filters.len());
    for filter in filters {
        children.push(to_sql_tree(filter, sql_fields, vars_info)?);
    }
    let predicate = SqlExpr::and_all(children);

    match predicate.try_evaluate(CountLabelsPerElement::One) {
        Some(Evaluation::False) | Some(Evaluation::Unknown) => Ok(FilterOutcome::Skip),
        Some(Evaluation::True) => Ok(FilterOutcome::Always),
        None => Ok(FilterOutcome::Predicate(predicate)),
    }
}

/// Filters that could not be applied during the relationship-index scan;
/// evaluated later against the variable's per-label property tables.
#[derive(Debug, Default)]
pub struct VariablePostFilters<'e, 'q> {
    /// The properties the filters mention.
    pub properties: BTreeSet<PropertyKey<'q>>,
    pub filters: Vec<&'e Expression<'q>>,
}

/// The WHERE leaves of a path query, split by where they can be applied.
#[derive(Debug, Default)]
pub struct PartitionedFilters<'e, 'q> {
    /// Leaves mentioning only system IDs; applied during the
    /// relationship-index scan.
    pub id_filters: Vec<&'e Expression<'q>>,
    /// Per-variable leaves involving non-ID properties or label
    /// constraints; applied in the per-label property queries.
    pub post_filters: BTreeMap<Variable<'q>, VariablePostFilters<'e, 'q>>,
}

impl<'e, 'q> PartitionedFilters<'e, 'q> {
    pub fn post_filter(&self, var: &Variable<'q>) -> Option<&VariablePostFilters<'e, 'q>> {
        self.post_filters.get(var)
    }
}

/// Splits decomposed WHERE leaves into scan-time ID filters and deferred
/// per-variable post-filters. Leaves that relate several variables through
/// anything but their IDs cannot be pushed into either query shape.
pub fn partition_filters<'e, 'q>(
    decomposition: &ExpressionsByVarsUsages<'e, 'q>,
) -> Result<PartitionedFilters<'e, 'q>> {
    let mut partitioned = PartitionedFilters::default();

    for (usages, expressions) in decomposition {
        if usages.is_empty() {
            return Err(Error::internal("a filter expression mentions no variable"));
        }

        let uses_non_id = usages
            .values()
            .any(|usage| usage.uses_non_id_property() || usage.label_constrained);

        if usages.len() >= 2 {
            if uses_non_id {
                return Err(Error::unsupported(
                    "predicates relating several variables through non-ID properties",
                ));
            }
            partitioned.id_filters.extend(expressions.iter().copied());
            continue;
        }

        let (var, usage) = usages.iter().next().expect("one entry");
        if uses_non_id {
            let post = partitioned.post_filters.entry(*var).or_default();
            post.properties.extend(usage.properties.iter().copied());
            post.filters.extend(expressions.iter().copied());
        } else if usage.properties.iter().any(PropertyKey::is_id) {
            partitioned.id_filters.extend(expressions.iter().copied());
        } else {
            return Err(Error::internal("a filter expression has no property"));
        }
    }
    Ok(partitioned)
}
