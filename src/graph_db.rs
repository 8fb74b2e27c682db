//! The driver: owns the store connection and the catalog, exposes the
//! write path (types, nodes, relationships), the transaction bracket, and
//! `run`, which glues parser output to the planner and streams result rows
//! to a caller-provided handler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::graph_catalog::{ElementKind, GraphCatalog, PropertySchema};
use crate::graph_store::{self, query_rows, query_scalar, StatementMode};
use crate::open_cypher_parser::{self, ParseFailureKind};
use crate::query_planner::{run_single_query, ResultOrder};
use crate::sqlite_query_generator::QueryParams;
use crate::value::{Value, ValueList};

/// Node and relationship IDs.
pub type ElementId = i64;

/// Query parameters: `$name` placeholders bound to homogeneous lists.
pub type Parameters = BTreeMap<String, ValueList>;

const DEFAULT_DB_PATH: &str = "default.sqlite3db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Yes,
    No,
}

/// What the row callback wants next. After `Stop`, no further rows are
/// emitted; any in-flight store statement finishes normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Continue,
    Stop,
}

/// Receives the results of one `run` call.
///
/// `on_order_and_column_names` is called exactly once per query, before
/// any `on_row`, even when the query produces no rows. `values` in
/// `on_row` holds one slice per segment; `order` maps every RETURN
/// position to its (segment, offset).
pub trait ResultHandler {
    fn on_query_start(&mut self, _text: &str) {}

    fn on_order_and_column_names(
        &mut self,
        order: &ResultOrder,
        variables: &[Option<&str>],
        column_names: &[Vec<String>],
    );

    fn on_row(&mut self, values: &[&[Value]]) -> RowAction;

    fn on_query_end(&mut self) {}
}

pub struct GraphDb {
    conn: Connection,
    catalog: GraphCatalog,
    id_property: PropertySchema,
}

impl GraphDb {
    /// Opens a file-backed store.
    ///
    /// Without an explicit `overwrite` policy, the file is overwritten iff
    /// no path was given. An existing store that is not overwritten has
    /// its schema reloaded from the catalog tables.
    pub fn open(path: Option<&Path>, overwrite: Option<Overwrite>) -> Result<GraphDb> {
        let effective_path: PathBuf = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let overwrite = match overwrite {
            Some(Overwrite::Yes) => true,
            Some(Overwrite::No) => false,
            None => path.is_none(),
        };
        if overwrite && effective_path.exists() {
            std::fs::remove_file(&effective_path).map_err(|e| {
                Error::Internal(format!(
                    "cannot remove '{}': {}",
                    effective_path.display(),
                    e
                ))
            })?;
        }
        let fresh = !effective_path.exists();
        let conn = graph_store::open_file(&effective_path)?;
        let catalog = if fresh {
            GraphCatalog::create_system_tables(&conn)?;
            GraphCatalog::default()
        } else {
            debug!("inferring graph schema from '{}'", effective_path.display());
            GraphCatalog::load(&conn)?
        };
        Ok(GraphDb {
            conn,
            catalog,
            id_property: PropertySchema::id_property(),
        })
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> Result<GraphDb> {
        let conn = graph_store::open_memory()?;
        GraphCatalog::create_system_tables(&conn)?;
        Ok(GraphDb {
            conn,
            catalog: GraphCatalog::default(),
            id_property: PropertySchema::id_property(),
        })
    }

    /// Closes the store, reporting a failure to flush instead of
    /// swallowing it the way dropping would.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Store(e))
    }

    /// The system property holding element IDs; `id(v)` reads it.
    pub fn id_property(&self) -> &PropertySchema {
        &self.id_property
    }

    /// Registers a node or relationship label with its property schemas.
    pub fn add_type(
        &mut self,
        label: &str,
        kind: ElementKind,
        properties: &[PropertySchema],
    ) -> Result<()> {
        self.catalog.add_type(&self.conn, label, kind, properties)
    }

    /// Registered labels with their property schemas, sorted by property
    /// key. The system ID property is part of every schema set.
    pub fn types_and_properties(
        &self,
    ) -> impl Iterator<Item = (&str, ElementKind, Vec<&PropertySchema>)> {
        self.catalog
            .iter()
            .map(|(label, schema)| (label, schema.kind, schema.properties().collect()))
    }

    /// Bundling many inserts in one transaction makes them considerably
    /// cheaper.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    pub fn end_transaction(&self) -> Result<()> {
        self.conn.execute_batch("END TRANSACTION")?;
        Ok(())
    }

    pub fn add_node(&mut self, label: &str, values: &[(&str, Value)]) -> Result<ElementId> {
        let type_index = self
            .catalog
            .element_types(ElementKind::Node)
            .get_index(label)
            .ok_or_else(|| Error::schema(format!("unknown node type: {}", label)))?;
        self.validate_property_values(label, values)?;

        let mut params = QueryParams::new();
        params.push_scalar(Value::Integer(type_index));
        let id = query_scalar(
            &self.conn,
            "INSERT INTO nodes (NodeType) VALUES (?1) RETURNING SYS__ID",
            &params,
            StatementMode::Cached,
        )?
        .ok_or_else(|| Error::internal("no id returned for the new node"))?;

        self.add_element(label, id, values)?;
        Ok(id)
    }

    /// Adds a relationship between two nodes. With `verify_endpoints`
    /// (the recommended default), missing endpoints fail instead of
    /// producing a dangling edge.
    pub fn add_relationship(
        &mut self,
        label: &str,
        origin: ElementId,
        destination: ElementId,
        values: &[(&str, Value)],
        verify_endpoints: bool,
    ) -> Result<ElementId> {
        let type_index = self
            .catalog
            .element_types(ElementKind::Relationship)
            .get_index(label)
            .ok_or_else(|| Error::schema(format!("unknown relationship type: {}", label)))?;
        self.validate_property_values(label, values)?;

        if verify_endpoints {
            self.verify_nodes_exist(origin, destination)?;
        }

        let mut params = QueryParams::new();
        params.push_scalar(Value::Integer(type_index));
        params.push_scalar(Value::Integer(origin));
        params.push_scalar(Value::Integer(destination));
        let id = query_scalar(
            &self.conn,
            "INSERT INTO relationships (RelationshipType, OriginID, DestinationID) \
             VALUES (?1, ?2, ?3) RETURNING SYS__ID",
            &params,
            StatementMode::Cached,
        )?
        .ok_or_else(|| Error::internal("no id returned for the new relationship"))?;

        self.add_element(label, id, values)?;
        Ok(id)
    }

    /// Parses and runs a Cypher query, forwarding rows to `handler`.
    pub fn run(
        &self,
        cypher: &str,
        params: &Parameters,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let query = open_cypher_parser::parse_query(cypher, params).map_err(|e| match e.kind {
            ParseFailureKind::Unsupported => Error::Unsupported(e.to_string()),
            ParseFailureKind::Syntax => Error::Parse(e.to_string()),
        })?;

        handler.on_query_start(cypher);
        let result = run_single_query(&self.conn, &self.catalog, &query, handler);
        handler.on_query_end();
        result
    }

    fn verify_nodes_exist(&self, origin: ElementId, destination: ElementId) -> Result<()> {
        let mut params = QueryParams::new();
        params.push_scalar(Value::Integer(origin));
        let (sql, expected) = if origin == destination {
            ("SELECT SYS__ID FROM nodes WHERE SYS__ID IN (?1)", 1)
        } else {
            params.push_scalar(Value::Integer(destination));
            ("SELECT SYS__ID FROM nodes WHERE SYS__ID IN (?1, ?2)", 2)
        };
        let mut matches = 0usize;
        query_rows(&self.conn, sql, &params, StatementMode::Cached, |_| {
            matches += 1;
            Ok(true)
        })?;
        if matches != expected {
            return Err(Error::Referential(format!(
                "origin or destination node not found (origin {}, destination {})",
                origin, destination
            )));
        }
        Ok(())
    }

    fn validate_property_values(&self, label: &str, values: &[(&str, Value)]) -> Result<()> {
        let schema = self
            .catalog
            .label_schema(label)
            .ok_or_else(|| Error::schema(format!("unknown type: {}", label)))?;

        for (name, value) in values {
            let Some(property) = schema.get(name) else {
                return Err(Error::schema(format!(
                    "property '{}' does not exist on type '{}'",
                    name, label
                )));
            };
            if property.name == self.id_property.name {
                return Err(Error::schema(format!(
                    "the system property '{}' cannot be written",
                    property.name
                )));
            }
            match value.value_type() {
                None => {
                    if !property.nullable {
                        return Err(Error::schema(format!(
                            "property '{}.{}' is not nullable",
                            label, name
                        )));
                    }
                }
                Some(value_type) => {
                    if value_type != property.value_type {
                        return Err(Error::schema(format!(
                            "property '{}.{}' expects {} but got {}",
                            label, name, property.value_type, value_type
                        )));
                    }
                }
            }
        }

        // Non-nullable properties without a declared default must be given.
        for property in schema.properties() {
            if property.nullable
                || property.default.is_some()
                || property.name == self.id_property.name
            {
                continue;
            }
            let provided = values
                .iter()
                .any(|(name, value)| *name == property.name && !value.is_null());
            if !provided {
                return Err(Error::schema(format!(
                    "property '{}.{}' is not nullable and has no default",
                    label, property.name
                )));
            }
        }
        Ok(())
    }

    /// Inserts the per-label property row. The statement text is a
    /// function of the label and the ordered property keys, so repeated
    /// inserts of the same shape reuse the compiled statement.
    fn add_element(&self, label: &str, id: ElementId, values: &[(&str, Value)]) -> Result<()> {
        let mut sql = format!("INSERT INTO {} (SYS__ID", label);
        for (name, _) in values {
            sql.push_str(", ");
            sql.push_str(name);
        }
        sql.push_str(") VALUES (?1");
        let mut params = QueryParams::new();
        params.push_scalar(Value::Integer(id));
        for (_, value) in values {
            let index = params.push_scalar(value.clone());
            sql.push_str(&format!(", ?{}", index));
        }
        sql.push(')');
        query_rows(&self.conn, &sql, &params, StatementMode::Cached, |_| Ok(false))?;
        Ok(())
    }
}
