use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use log::trace;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::graph_catalog::{ElementKind, GraphCatalog};
use crate::graph_db::{ResultHandler, RowAction};
use crate::graph_store::{query_rows, StatementMode};
use crate::open_cypher_parser::ast::{Limit, TraversalDirection, Variable, SYS_ID};
use crate::sqlite_query_generator::{QueryParams, TypeIndex, VarQueryInfo, VarsQueryInfo};
use crate::value::Value;

use super::filters::{fold_filter, FilterOutcome, PartitionedFilters};
use super::result_order::{compute_result_order, ReturnClauseTerm};

/// One position of a path pattern. Positions alternate node and
/// relationship: position `2j` is node `j`, position `2j+1` is
/// relationship `j`.
pub struct PathPosition<'q> {
    pub kind: ElementKind,
    pub variable: Option<Variable<'q>>,
    pub labels: Vec<&'q str>,
}

/// A path pattern of `k >= 1` relationships with its partitioned filters.
pub struct PathQuery<'e, 'q> {
    pub positions: Vec<PathPosition<'q>>,
    /// Traversal direction of each relationship, as written.
    pub directions: Vec<TraversalDirection>,
    /// Projection terms per position. Terms of a variable are attached to
    /// its first (owning) position only.
    pub terms: Vec<Vec<ReturnClauseTerm<'q>>>,
    pub filters: PartitionedFilters<'e, 'q>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Copy, Default)]
struct IdAndType {
    id: i64,
    type_index: TypeIndex,
}

/// A row of the relationship-index scan: IDs and, where requested, type
/// indices of every pattern position. Unused fields stay zeroed.
type CandidateRow = Vec<IdAndType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

/// Runs a path query: for every resolved direction combination, scan the
/// relationship index for candidate rows, collect per-position properties,
/// and assemble result rows in scan order until the limit is reached.
pub fn run_path_query(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &PathQuery<'_, '_>,
    handler: &mut dyn ResultHandler,
) -> Result<()> {
    let plan = PositionPlan::new(query);

    let segments: Vec<&[ReturnClauseTerm<'_>]> =
        query.terms.iter().map(|terms| terms.as_slice()).collect();
    let order = compute_result_order(&segments);
    let variables: Vec<Option<&str>> = query
        .positions
        .iter()
        .map(|position| position.variable.map(|var| var.0))
        .collect();
    let column_names: Vec<Vec<String>> = query
        .terms
        .iter()
        .map(|terms| terms.iter().map(|t| t.property.0.to_string()).collect())
        .collect();
    handler.on_order_and_column_names(&order, &variables, &column_names);

    let mut emitter = RowEmitter {
        handler,
        emitted: 0,
        limit: query.limit,
    };

    // An undirected relationship runs the plan once per direction; the
    // combinations multiply. Duplicates across combinations are genuine
    // distinct matches unless the relationship is a loop.
    let any_positions: Vec<usize> = query
        .directions
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == TraversalDirection::Any)
        .map(|(j, _)| j)
        .collect();

    for combination in 0..(1usize << any_positions.len()) {
        let mut directions: Vec<TraversalDirection> = query.directions.clone();
        for (bit, j) in any_positions.iter().enumerate() {
            directions[*j] = if combination & (1 << bit) == 0 {
                TraversalDirection::Forward
            } else {
                TraversalDirection::Backward
            };
        }
        trace!("path plan directions: {:?}", directions);
        if run_directed(conn, catalog, query, &plan, &directions, &mut emitter)? == Flow::Done {
            break;
        }
    }
    Ok(())
}

/// Per-position planning facts that do not depend on direction.
struct PositionPlan {
    /// Index of the position owning each position's variable (first
    /// occurrence); positions without a variable own themselves.
    owner: Vec<usize>,
    /// Whether this position's properties must be looked up.
    lookup: Vec<bool>,
    /// Whether the scan must report this position's type index.
    needs_type: Vec<bool>,
}

impl PositionPlan {
    fn new(query: &PathQuery<'_, '_>) -> PositionPlan {
        let count = query.positions.len();
        let mut owner = Vec::with_capacity(count);
        for (i, position) in query.positions.iter().enumerate() {
            let first = position.variable.and_then(|var| {
                query.positions[..i]
                    .iter()
                    .position(|earlier| earlier.variable == Some(var))
            });
            owner.push(first.unwrap_or(i));
        }

        let mut lookup = vec![false; count];
        let mut needs_type = vec![false; count];
        for (i, position) in query.positions.iter().enumerate() {
            if owner[i] != i {
                continue;
            }
            let post_filtered = position
                .variable
                .is_some_and(|var| query.filters.post_filter(&var).is_some());
            lookup[i] = !query.terms[i].is_empty() || post_filtered;
            needs_type[i] =
                post_filtered || query.terms[i].iter().any(|term| !term.property.is_id());
        }
        PositionPlan {
            owner,
            lookup,
            needs_type,
        }
    }
}

/// Column expressions of one directed plan.
struct ScanColumns {
    /// ID column expression per position.
    id_exprs: Vec<String>,
    /// Type column expression per position.
    type_exprs: Vec<String>,
}

impl ScanColumns {
    fn new(query: &PathQuery<'_, '_>, directions: &[TraversalDirection]) -> ScanColumns {
        let k = directions.len();
        let count = query.positions.len();
        let mut id_exprs = Vec::with_capacity(count);
        let mut type_exprs = Vec::with_capacity(count);
        for i in 0..count {
            if i % 2 == 0 {
                let j = i / 2;
                id_exprs.push(node_id_expr(j, k, directions));
                type_exprs.push(format!("n{}.NodeType", j));
            } else {
                let j = i / 2;
                id_exprs.push(format!("r{}.{}", j, SYS_ID));
                type_exprs.push(format!("r{}.RelationshipType", j));
            }
        }
        ScanColumns {
            id_exprs,
            type_exprs,
        }
    }
}

fn start_col(direction: TraversalDirection) -> &'static str {
    match direction {
        TraversalDirection::Forward => "OriginID",
        TraversalDirection::Backward => "DestinationID",
        TraversalDirection::Any => unreachable!("directions are resolved before planning"),
    }
}

fn end_col(direction: TraversalDirection) -> &'static str {
    match direction {
        TraversalDirection::Forward => "DestinationID",
        TraversalDirection::Backward => "OriginID",
        TraversalDirection::Any => unreachable!("directions are resolved before planning"),
    }
}

/// The scan column holding the ID of node position `j` in a chain of `k`
/// relationships.
fn node_id_expr(j: usize, k: usize, directions: &[TraversalDirection]) -> String {
    if j < k {
        format!("r{}.{}", j, start_col(directions[j]))
    } else {
        format!("r{}.{}", k - 1, end_col(directions[k - 1]))
    }
}

struct RowEmitter<'h> {
    handler: &'h mut dyn ResultHandler,
    emitted: usize,
    limit: Option<Limit>,
}

impl RowEmitter<'_> {
    fn emit(&mut self, values: &[&[Value]]) -> Flow {
        if self
            .limit
            .is_some_and(|limit| self.emitted >= limit.max_rows)
        {
            return Flow::Done;
        }
        self.emitted += 1;
        let action = self.handler.on_row(values);
        if action == RowAction::Stop
            || self
                .limit
                .is_some_and(|limit| self.emitted >= limit.max_rows)
        {
            Flow::Done
        } else {
            Flow::Continue
        }
    }
}

fn run_directed(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &PathQuery<'_, '_>,
    plan: &PositionPlan,
    directions: &[TraversalDirection],
    emitter: &mut RowEmitter<'_>,
) -> Result<Flow> {
    let columns = ScanColumns::new(query, directions);

    // Resolve declared labels to type-index filters. A filter equal to the
    // full label set of its kind is dropped; an empty resolution means the
    // pattern can never match.
    let mut type_filters: Vec<Option<BTreeSet<TypeIndex>>> = Vec::new();
    for position in &query.positions {
        if position.labels.is_empty() {
            type_filters.push(None);
            continue;
        }
        let indices = catalog.labels_to_type_indices(position.kind, &position.labels);
        if indices.is_empty() {
            trace!("declared labels resolve to no registered type; no matches");
            return Ok(Flow::Continue);
        }
        if indices.len() == catalog.element_types(position.kind).len() {
            type_filters.push(None);
        } else {
            type_filters.push(Some(indices));
        }
    }

    let candidate_rows = scan_relationship_index(
        conn,
        catalog,
        query,
        plan,
        &columns,
        &type_filters,
        directions,
    )?;

    // Property collection, one position at a time.
    let mut properties: Vec<HashMap<i64, Vec<Value>>> =
        (0..query.positions.len()).map(|_| HashMap::new()).collect();

    for (i, position) in query.positions.iter().enumerate() {
        if !plan.lookup[i] {
            continue;
        }
        if !plan.needs_type[i] {
            // Only the ID is projected and nothing filters this position:
            // synthesize the rows without querying.
            if query.terms[i].is_empty() || query.terms[i].iter().any(|t| !t.property.is_id()) {
                return Err(Error::internal(
                    "a position without type information projects non-ID properties",
                ));
            }
            for row in &candidate_rows {
                let id = row[i].id;
                properties[i]
                    .entry(id)
                    .or_insert_with(|| vec![Value::Integer(id); query.terms[i].len()]);
            }
            continue;
        }

        let mut buckets: BTreeMap<TypeIndex, BTreeSet<i64>> = BTreeMap::new();
        for row in &candidate_rows {
            buckets.entry(row[i].type_index).or_default().insert(row[i].id);
        }
        gather_property_values(conn, catalog, query, position, i, buckets, &mut properties[i])?;
    }

    // Assemble rows in scan order; a candidate missing any required
    // per-position row is dropped.
    const NO_VALUES: &[Value] = &[];
    let mut values: Vec<&[Value]> = vec![NO_VALUES; query.positions.len()];
    'candidates: for row in &candidate_rows {
        for i in 0..query.positions.len() {
            values[i] = NO_VALUES;
            if plan.lookup[i] {
                match properties[i].get(&row[i].id) {
                    Some(found) => values[i] = found,
                    None => continue 'candidates,
                }
            }
        }
        if emitter.emit(&values) == Flow::Done {
            return Ok(Flow::Done);
        }
    }
    Ok(Flow::Continue)
}

fn scan_relationship_index(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &PathQuery<'_, '_>,
    plan: &PositionPlan,
    columns: &ScanColumns,
    type_filters: &[Option<BTreeSet<TypeIndex>>],
    directions: &[TraversalDirection],
) -> Result<Vec<CandidateRow>> {
    let count = query.positions.len();
    let k = directions.len();

    // SELECT list: the ID of every position whose properties are looked
    // up, the type index of every position that needs type information.
    let mut select = String::from("SELECT ");
    let mut id_column: Vec<Option<usize>> = vec![None; count];
    let mut type_column: Vec<Option<usize>> = vec![None; count];
    let mut next_column = 0usize;
    for i in 0..count {
        if plan.lookup[i] {
            if next_column > 0 {
                select.push_str(", ");
            }
            select.push_str(&columns.id_exprs[i]);
            id_column[i] = Some(next_column);
            next_column += 1;
        }
        if plan.needs_type[i] {
            if next_column > 0 {
                select.push_str(", ");
            }
            select.push_str(&columns.type_exprs[i]);
            type_column[i] = Some(next_column);
            next_column += 1;
        }
    }
    if next_column == 0 {
        return Err(Error::internal("the scan query projects no columns"));
    }

    let mut sql = select;
    sql.push_str(" FROM relationships r0");
    for j in 1..k {
        let _ = write!(
            sql,
            " INNER JOIN relationships r{} ON r{}.{} = r{}.{}",
            j,
            j,
            start_col(directions[j]),
            j - 1,
            end_col(directions[j - 1]),
        );
    }
    for i in (0..count).step_by(2) {
        if type_filters[i].is_some() || plan.needs_type[i] {
            let j = i / 2;
            let _ = write!(
                sql,
                " INNER JOIN nodes n{} ON n{}.{} = {}",
                j, j, SYS_ID, columns.id_exprs[i]
            );
        }
    }

    let mut params = QueryParams::new();
    let mut where_terms: Vec<String> = Vec::new();

    if !query.filters.id_filters.is_empty() {
        let mut vars_info = VarsQueryInfo::new();
        for (i, position) in query.positions.iter().enumerate() {
            if plan.owner[i] != i {
                continue;
            }
            if let Some(var) = position.variable {
                let mut property_columns = BTreeMap::new();
                property_columns.insert(SYS_ID, columns.id_exprs[i].clone());
                vars_info.insert(
                    var,
                    VarQueryInfo {
                        property_columns,
                        type_index_column: None,
                        variable_labels: None,
                        element_types: catalog.element_types(position.kind),
                    },
                );
            }
        }
        let fields = [SYS_ID.to_string()].into();
        match fold_filter(&query.filters.id_filters, &fields, &vars_info)? {
            FilterOutcome::Skip => {
                // ID filters address real scan columns; they can never fold
                // to a constant.
                return Err(Error::internal("an ID filter folded to a constant"));
            }
            FilterOutcome::Always => {}
            FilterOutcome::Predicate(predicate) => {
                where_terms.push(format!("( {} )", predicate.render(&mut params)));
            }
        }
    }

    // A repeated variable pins its positions to the same element.
    for i in 0..count {
        if plan.owner[i] != i {
            where_terms.push(format!(
                "( {} = {} )",
                columns.id_exprs[i], columns.id_exprs[plan.owner[i]]
            ));
        }
    }

    // Two relationship positions never bind the same relationship.
    for i in (1..count).step_by(2) {
        for j in (i + 2..count).step_by(2) {
            where_terms.push(format!(
                "( {} <> {} )",
                columns.id_exprs[i], columns.id_exprs[j]
            ));
        }
    }

    for (i, filter) in type_filters.iter().enumerate() {
        if let Some(indices) = filter {
            let mut term = format!("{} IN (", columns.type_exprs[i]);
            for (n, index) in indices.iter().enumerate() {
                if n > 0 {
                    term.push(',');
                }
                let _ = write!(term, "{}", index);
            }
            term.push(')');
            where_terms.push(term);
        }
    }

    for (n, term) in where_terms.iter().enumerate() {
        sql.push_str(if n == 0 { " WHERE " } else { " AND " });
        sql.push_str(term);
    }

    let mut candidate_rows: Vec<CandidateRow> = Vec::new();
    query_rows(conn, &sql, &params, StatementMode::Cached, |row| {
        let mut candidate = vec![IdAndType::default(); count];
        for i in 0..count {
            if let Some(column) = id_column[i] {
                candidate[i].id = row.get(column)?;
            }
            if let Some(column) = type_column[i] {
                candidate[i].type_index = row.get(column)?;
            }
        }
        candidate_rows.push(candidate);
        Ok(true)
    })?;
    Ok(candidate_rows)
}

/// Collects property values of one position, bucketed by type: one
/// UNION-ALL statement over the label property tables, post-filters
/// compiled and folded per label, buckets whose projection reduces to IDs
/// synthesized in memory.
fn gather_property_values(
    conn: &Connection,
    catalog: &GraphCatalog,
    query: &PathQuery<'_, '_>,
    position: &PathPosition<'_>,
    index: usize,
    buckets: BTreeMap<TypeIndex, BTreeSet<i64>>,
    properties: &mut HashMap<i64, Vec<Value>>,
) -> Result<()> {
    let terms = &query.terms[index];
    let post_filters = position
        .variable
        .and_then(|var| query.filters.post_filter(&var));
    let element_types = catalog.element_types(position.kind);

    let mut sql = String::new();
    let mut params = QueryParams::new();

    for (type_index, ids) in buckets {
        let label = element_types.get_label(type_index).ok_or_else(|| {
            Error::internal(format!("type index {} has no label", type_index))
        })?;
        let Some(schema) = catalog.label_schema(label) else {
            continue;
        };

        let outcome = match post_filters {
            Some(post) if !post.filters.is_empty() => {
                let mut vars_info = VarsQueryInfo::new();
                vars_info.insert(
                    position.variable.expect("post-filtered position has a variable"),
                    VarQueryInfo {
                        property_columns: Default::default(),
                        type_index_column: None,
                        variable_labels: Some([label.to_string()].into()),
                        element_types,
                    },
                );
                fold_filter(&post.filters, schema.field_names(), &vars_info)?
            }
            _ => FilterOutcome::Always,
        };
        let predicate = match outcome {
            FilterOutcome::Skip => {
                trace!("bucket '{}' excluded by constant-folded filter", label);
                continue;
            }
            FilterOutcome::Always => None,
            FilterOutcome::Predicate(predicate) => Some(predicate),
        };

        let valid: Vec<bool> = terms
            .iter()
            .map(|term| schema.contains(term.property.0))
            .collect();

        if predicate.is_none() {
            let has_valid_non_id = terms
                .iter()
                .zip(&valid)
                .any(|(term, valid)| *valid && !term.property.is_id());
            if !has_valid_non_id {
                // Every projected property is the ID or missing, and there
                // is no filter: the rows are known without querying.
                for id in ids {
                    let row = terms
                        .iter()
                        .zip(&valid)
                        .map(|(term, valid)| {
                            if *valid && term.property.is_id() {
                                Value::Integer(id)
                            } else {
                                Value::Null
                            }
                        })
                        .collect();
                    properties.insert(id, row);
                }
                continue;
            }
        }

        if !sql.is_empty() {
            sql.push_str(" UNION ALL ");
        }
        let _ = write!(sql, "SELECT {}", SYS_ID);
        for (term, valid) in terms.iter().zip(&valid) {
            sql.push_str(", ");
            if !valid {
                sql.push_str("NULL as ");
            }
            sql.push_str(term.property.0);
        }
        let ids_param = params.push_list(ids.into_iter().collect());
        let _ = write!(sql, " FROM {} WHERE {} IN rarray(?{})", label, SYS_ID, ids_param);
        if let Some(predicate) = predicate {
            let rendered = predicate.render(&mut params);
            let _ = write!(sql, " AND ( {} )", rendered);
        }
    }

    if sql.is_empty() {
        return Ok(());
    }
    let column_count = terms.len();
    query_rows(conn, &sql, &params, StatementMode::Volatile, |row| {
        let id: i64 = row.get(0)?;
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: rusqlite::types::Value = row.get(i + 1)?;
            values.push(Value::from(value));
        }
        properties.insert(id, values);
        Ok(true)
    })?;
    Ok(())
}
