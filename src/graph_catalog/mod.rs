//! The schema catalog: label ↔ type-index mappings for nodes and
//! relationships, per-label property schemas, and the system tables that
//! persist them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use log::debug;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::open_cypher_parser::ast::SYS_ID;
use crate::sqlite_query_generator::TypeIndex;
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementKind {
    Node,
    Relationship,
}

impl ElementKind {
    /// Kind tag persisted in the `namedTypes` table.
    pub fn code(&self) -> &'static str {
        match self {
            ElementKind::Node => "E",
            ElementKind::Relationship => "R",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "E" => Some(ElementKind::Node),
            "R" => Some(ElementKind::Relationship),
            _ => None,
        }
    }
}

/// Declared schema of one property on one label.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub name: String,
    pub value_type: ValueType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl PropertySchema {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        PropertySchema {
            name: name.into(),
            value_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// The system ID property present on every label.
    pub fn id_property() -> Self {
        PropertySchema::new(SYS_ID, ValueType::Integer).not_null()
    }
}

/// Bijection between label names and compact type indices for one element
/// kind. Indices are assigned contiguously from 0 in registration order and
/// never reused.
#[derive(Debug, Clone, Default)]
pub struct IndexedLabels {
    by_name: BTreeMap<String, TypeIndex>,
    by_index: BTreeMap<TypeIndex, String>,
}

impl IndexedLabels {
    pub fn add(&mut self, index: TypeIndex, name: &str) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(Error::schema(format!("duplicate type '{}'", name)));
        }
        self.by_name.insert(name.to_string(), index);
        self.by_index.insert(index, name.to_string());
        Ok(())
    }

    pub fn next_index(&self) -> TypeIndex {
        self.by_index
            .last_key_value()
            .map(|(index, _)| index + 1)
            .unwrap_or(0)
    }

    pub fn get_index(&self, name: &str) -> Option<TypeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn get_label(&self, index: TypeIndex) -> Option<&str> {
        self.by_index.get(&index).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Label names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }
}

/// Everything the catalog knows about one registered label.
#[derive(Debug, Clone)]
pub struct LabelSchema {
    pub kind: ElementKind,
    pub type_index: TypeIndex,
    properties: BTreeMap<String, PropertySchema>,
    field_names: BTreeSet<String>,
}

impl LabelSchema {
    fn new(kind: ElementKind, type_index: TypeIndex, schemas: Vec<PropertySchema>) -> Self {
        let properties: BTreeMap<String, PropertySchema> = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), schema))
            .collect();
        let field_names = properties.keys().cloned().collect();
        LabelSchema {
            kind,
            type_index,
            properties,
            field_names,
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.values()
    }

    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Property names as a set, the shape the SQL generator consumes.
    pub fn field_names(&self) -> &BTreeSet<String> {
        &self.field_names
    }
}

#[derive(Debug, Default)]
pub struct GraphCatalog {
    node_types: IndexedLabels,
    relationship_types: IndexedLabels,
    labels: BTreeMap<String, LabelSchema>,
}

impl GraphCatalog {
    /// Creates the system tables in a fresh store: the node and
    /// relationship index tables, their secondary indices, and the type
    /// catalog table.
    pub fn create_system_tables(conn: &Connection) -> Result<()> {
        debug!("creating system tables");
        conn.execute_batch(&format!(
            "CREATE TABLE nodes ({SYS_ID} INTEGER PRIMARY KEY, NodeType INTEGER);\n\
             CREATE INDEX NodeTypeIndex ON nodes(NodeType);\n\
             CREATE TABLE relationships ({SYS_ID} INTEGER PRIMARY KEY, RelationshipType INTEGER, \
             OriginID INTEGER, DestinationID INTEGER);\n\
             CREATE INDEX RelationshipTypeIndex ON relationships(RelationshipType);\n\
             CREATE INDEX originIDIndex ON relationships(OriginID);\n\
             CREATE INDEX destinationIDIndex ON relationships(DestinationID);\n\
             CREATE TABLE namedTypes (TypeIdx INTEGER, Kind TEXT, NamedType TEXT, \
             PRIMARY KEY (Kind, TypeIdx));"
        ))?;
        Ok(())
    }

    /// Rebuilds the catalog from an existing store: the label ↔ index
    /// mapping from `namedTypes`, each label's property schemas from the
    /// table layout.
    pub fn load(conn: &Connection) -> Result<GraphCatalog> {
        let mut catalog = GraphCatalog::default();

        let mut stmt =
            conn.prepare("SELECT TypeIdx, Kind, NamedType FROM namedTypes ORDER BY Kind, TypeIdx")?;
        let rows: Vec<(TypeIndex, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        for (type_index, kind_code, label) in rows {
            let kind = ElementKind::from_code(&kind_code).ok_or_else(|| {
                Error::schema(format!("unknown kind '{}' in type catalog", kind_code))
            })?;
            let schemas = load_label_schemas(conn, &label)?;
            catalog.element_types_mut(kind).add(type_index, &label)?;
            catalog
                .labels
                .insert(label.clone(), LabelSchema::new(kind, type_index, schemas));
            debug!("loaded label '{}' ({:?}, type index {})", label, kind, type_index);
        }
        Ok(catalog)
    }

    /// Registers a label: creates its property table (system ID column plus
    /// one column per declared property) and persists the label ↔ index
    /// mapping. Fails if the label already exists.
    pub fn add_type(
        &mut self,
        conn: &Connection,
        label: &str,
        kind: ElementKind,
        properties: &[PropertySchema],
    ) -> Result<()> {
        if self.labels.contains_key(label) {
            return Err(Error::schema(format!("type '{}' already exists", label)));
        }
        validate_identifier(label)?;
        let mut seen = BTreeSet::new();
        for schema in properties {
            validate_identifier(&schema.name)?;
            if schema.name == SYS_ID {
                return Err(Error::schema(format!(
                    "property '{}' is reserved for the system ID",
                    SYS_ID
                )));
            }
            if !seen.insert(schema.name.as_str()) {
                return Err(Error::schema(format!(
                    "duplicate property '{}' on type '{}'",
                    schema.name, label
                )));
            }
            if let Some(default) = &schema.default {
                if default.value_type() != Some(schema.value_type) {
                    return Err(Error::schema(format!(
                        "default value for '{}.{}' does not have type {}",
                        label, schema.name, schema.value_type
                    )));
                }
            }
        }

        let mut ddl = format!("CREATE TABLE {} ({} INTEGER PRIMARY KEY", label, SYS_ID);
        for schema in properties {
            let _ = write!(ddl, ", {} {}", schema.name, schema.value_type.sql_type());
            if let Some(default) = &schema.default {
                let _ = write!(ddl, " DEFAULT {}", default_sql(default));
            }
            if !schema.nullable {
                ddl.push_str(" NOT NULL");
            }
        }
        ddl.push(')');
        debug!("sql: {}", ddl);
        conn.execute(&ddl, [])?;

        let type_index = self.element_types(kind).next_index();
        conn.execute(
            "INSERT INTO namedTypes (TypeIdx, Kind, NamedType) VALUES (?1, ?2, ?3)",
            rusqlite::params![type_index, kind.code(), label],
        )?;

        self.element_types_mut(kind).add(type_index, label)?;
        let mut schemas = properties.to_vec();
        schemas.push(PropertySchema::id_property());
        self.labels
            .insert(label.to_string(), LabelSchema::new(kind, type_index, schemas));
        Ok(())
    }

    pub fn element_types(&self, kind: ElementKind) -> &IndexedLabels {
        match kind {
            ElementKind::Node => &self.node_types,
            ElementKind::Relationship => &self.relationship_types,
        }
    }

    fn element_types_mut(&mut self, kind: ElementKind) -> &mut IndexedLabels {
        match kind {
            ElementKind::Node => &mut self.node_types,
            ElementKind::Relationship => &mut self.relationship_types,
        }
    }

    pub fn label_schema(&self, label: &str) -> Option<&LabelSchema> {
        self.labels.get(label)
    }

    /// All registered labels with their schemas, in lexical label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelSchema)> {
        self.labels.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// The candidate labels for a pattern position: the declared ones, or
    /// every label of the kind when the pattern leaves them open.
    pub fn candidate_labels(&self, kind: ElementKind, declared: &[&str]) -> Vec<String> {
        if declared.is_empty() {
            self.element_types(kind).names().map(String::from).collect()
        } else {
            declared.iter().map(|s| s.to_string()).collect()
        }
    }

    /// Resolves labels to type indices, dropping names that are not
    /// registered for the kind.
    pub fn labels_to_type_indices(&self, kind: ElementKind, labels: &[&str]) -> BTreeSet<TypeIndex> {
        let types = self.element_types(kind);
        labels
            .iter()
            .filter_map(|label| types.get_index(label))
            .collect()
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::schema(format!(
            "'{}' is not a valid label or property name",
            name
        )));
    }
    Ok(())
}

/// Renders a default value for a column declaration.
fn default_sql(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(x) => format!("{:?}", x),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => {
            let mut out = String::from("X'");
            for byte in b {
                let _ = write!(out, "{:02X}", byte);
            }
            out.push('\'');
            out
        }
    }
}

/// Reads one label's property schemas back from the table layout.
fn load_label_schemas(conn: &Connection, label: &str) -> Result<Vec<PropertySchema>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{}')", label))?;
    let rows: Vec<(String, String, bool, Option<String>)> = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)? != 0,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;

    if rows.is_empty() {
        return Err(Error::schema(format!(
            "type '{}' is in the catalog but has no backing table",
            label
        )));
    }

    let mut schemas = Vec::with_capacity(rows.len());
    for (name, sql_type, not_null, default_text) in rows {
        let value_type = match sql_type.to_ascii_uppercase().as_str() {
            "INTEGER" => ValueType::Integer,
            "REAL" => ValueType::Float,
            "TEXT" => ValueType::String,
            "BLOB" => ValueType::Bytes,
            other => {
                return Err(Error::schema(format!(
                    "column '{}.{}' has unexpected type '{}'",
                    label, name, other
                )))
            }
        };
        let default = match default_text {
            None => None,
            Some(text) => parse_default(&text, value_type)?,
        };
        schemas.push(PropertySchema {
            name,
            value_type,
            nullable: !not_null,
            default,
        });
    }
    Ok(schemas)
}

/// Parses the textual default reported by `PRAGMA table_info`.
fn parse_default(text: &str, value_type: ValueType) -> Result<Option<Value>> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("NULL") {
        return Ok(None);
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Some(Value::String(inner.replace("''", "'"))));
    }
    if let Some(hex) = text
        .strip_prefix("X'")
        .or_else(|| text.strip_prefix("x'"))
        .and_then(|t| t.strip_suffix('\''))
    {
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        let chars: Vec<char> = hex.chars().collect();
        for pair in chars.chunks(2) {
            let byte = u8::from_str_radix(&pair.iter().collect::<String>(), 16)
                .map_err(|_| Error::schema(format!("invalid blob default '{}'", text)))?;
            bytes.push(byte);
        }
        return Ok(Some(Value::Bytes(bytes)));
    }
    match value_type {
        ValueType::Float => text
            .parse::<f64>()
            .map(|x| Some(Value::Float(x)))
            .map_err(|_| Error::schema(format!("invalid float default '{}'", text))),
        _ => text
            .parse::<i64>()
            .map(|i| Some(Value::Integer(i)))
            .map_err(|_| Error::schema(format!("invalid default '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        GraphCatalog::create_system_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_type_indices_are_contiguous_per_kind() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        catalog
            .add_type(&conn, "Person", ElementKind::Node, &[])
            .unwrap();
        catalog
            .add_type(&conn, "Knows", ElementKind::Relationship, &[])
            .unwrap();
        catalog
            .add_type(&conn, "Movie", ElementKind::Node, &[])
            .unwrap();

        let nodes = catalog.element_types(ElementKind::Node);
        assert_eq!(nodes.get_index("Person"), Some(0));
        assert_eq!(nodes.get_index("Movie"), Some(1));
        let rels = catalog.element_types(ElementKind::Relationship);
        assert_eq!(rels.get_index("Knows"), Some(0));
    }

    #[test]
    fn test_duplicate_label_fails_and_leaves_catalog_unchanged() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        catalog
            .add_type(&conn, "Person", ElementKind::Node, &[])
            .unwrap();
        let err = catalog.add_type(&conn, "Person", ElementKind::Node, &[]);
        assert!(matches!(err, Err(Error::Schema(_))));
        assert_eq!(catalog.element_types(ElementKind::Node).len(), 1);
    }

    #[test]
    fn test_id_property_is_reserved() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        let err = catalog.add_type(
            &conn,
            "Person",
            ElementKind::Node,
            &[PropertySchema::new(SYS_ID, ValueType::Integer)],
        );
        assert!(matches!(err, Err(Error::Schema(_))));
    }

    #[test]
    fn test_label_schema_contains_implicit_id() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        catalog
            .add_type(
                &conn,
                "Person",
                ElementKind::Node,
                &[PropertySchema::new("age", ValueType::Integer)],
            )
            .unwrap();
        let schema = catalog.label_schema("Person").unwrap();
        assert!(schema.contains("age"));
        assert!(schema.contains(SYS_ID));
        assert!(!schema.get(SYS_ID).unwrap().nullable);
    }

    #[test]
    fn test_catalog_round_trip_through_store() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        catalog
            .add_type(
                &conn,
                "Person",
                ElementKind::Node,
                &[
                    PropertySchema::new("age", ValueType::Integer).not_null(),
                    PropertySchema::new("name", ValueType::String)
                        .with_default(Value::String("unknown".into())),
                    PropertySchema::new("score", ValueType::Float)
                        .with_default(Value::Float(0.5)),
                    PropertySchema::new("tag", ValueType::Bytes)
                        .with_default(Value::Bytes(vec![0x0a, 0xff])),
                ],
            )
            .unwrap();

        let reloaded = GraphCatalog::load(&conn).unwrap();
        let schema = reloaded.label_schema("Person").unwrap();
        assert_eq!(schema.kind, ElementKind::Node);
        assert_eq!(schema.type_index, 0);
        let age = schema.get("age").unwrap();
        assert_eq!(age.value_type, ValueType::Integer);
        assert!(!age.nullable);
        assert_eq!(
            schema.get("name").unwrap().default,
            Some(Value::String("unknown".into()))
        );
        assert_eq!(schema.get("score").unwrap().default, Some(Value::Float(0.5)));
        assert_eq!(
            schema.get("tag").unwrap().default,
            Some(Value::Bytes(vec![0x0a, 0xff]))
        );
    }

    #[test]
    fn test_candidate_labels_enumerate_all_when_unconstrained() {
        let conn = fresh_conn();
        let mut catalog = GraphCatalog::default();
        catalog
            .add_type(&conn, "Person", ElementKind::Node, &[])
            .unwrap();
        catalog
            .add_type(&conn, "Movie", ElementKind::Node, &[])
            .unwrap();
        assert_eq!(
            catalog.candidate_labels(ElementKind::Node, &[]),
            vec!["Movie".to_string(), "Person".to_string()]
        );
        assert_eq!(
            catalog.candidate_labels(ElementKind::Node, &["Person"]),
            vec!["Person".to_string()]
        );
    }
}
