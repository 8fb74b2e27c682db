use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Scalar type of a property column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    Integer,
    Float,
    String,
    Bytes,
}

impl ValueType {
    /// The SQLite column type used when declaring a property of this type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ValueType::Integer => "INTEGER",
            ValueType::Float => "REAL",
            ValueType::String => "TEXT",
            ValueType::Bytes => "BLOB",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Integer => "Integer",
            ValueType::Float => "Float",
            ValueType::String => "String",
            ValueType::Bytes => "Bytes",
        };
        write!(f, "{}", s)
    }
}

/// A property value: null or one of the four scalar types.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type of a non-null value.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Float(_) => Some(ValueType::Float),
            Value::String(_) => Some(ValueType::String),
            Value::Bytes(_) => Some(ValueType::Bytes),
        }
    }

    // Rank used to order values of distinct variants: null < float < int < string < bytes.
    fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Float(_) => 1,
            Value::Integer(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<Value> for rusqlite::types::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => rusqlite::types::Value::Null,
            Value::Integer(i) => rusqlite::types::Value::Integer(i),
            Value::Float(x) => rusqlite::types::Value::Real(x),
            Value::String(s) => rusqlite::types::Value::Text(s),
            Value::Bytes(b) => rusqlite::types::Value::Blob(b),
        }
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(v: rusqlite::types::Value) -> Self {
        match v {
            rusqlite::types::Value::Null => Value::Null,
            rusqlite::types::Value::Integer(i) => Value::Integer(i),
            rusqlite::types::Value::Real(x) => Value::Float(x),
            rusqlite::types::Value::Text(s) => Value::String(s),
            rusqlite::types::Value::Blob(b) => Value::Bytes(b),
        }
    }
}

/// A homogeneous list of non-null values, the shape required for bulk
/// binding (`x IN $param`) against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueList {
    Empty,
    Integers(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl Default for ValueList {
    fn default() -> Self {
        ValueList::Empty
    }
}

impl ValueList {
    pub fn len(&self) -> usize {
        match self {
            ValueList::Empty => 0,
            ValueList::Integers(v) => v.len(),
            ValueList::Floats(v) => v.len(),
            ValueList::Strings(v) => v.len(),
            ValueList::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            ValueList::Empty => None,
            ValueList::Integers(_) => Some(ValueType::Integer),
            ValueList::Floats(_) => Some(ValueType::Float),
            ValueList::Strings(_) => Some(ValueType::String),
            ValueList::Bytes(_) => Some(ValueType::Bytes),
        }
    }

    /// Appends a value. Fails for null values and for values whose type
    /// disagrees with the list's element type once the list is non-empty.
    pub fn push(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Err(Error::schema("null values are not allowed in lists"));
        }
        if matches!(self, ValueList::Empty) {
            *self = match value {
                Value::Integer(i) => ValueList::Integers(vec![i]),
                Value::Float(x) => ValueList::Floats(vec![x]),
                Value::String(s) => ValueList::Strings(vec![s]),
                Value::Bytes(b) => ValueList::Bytes(vec![b]),
                Value::Null => unreachable!("null rejected above"),
            };
            return Ok(());
        }
        match (self, value) {
            (ValueList::Integers(v), Value::Integer(i)) => v.push(i),
            (ValueList::Floats(v), Value::Float(x)) => v.push(x),
            (ValueList::Strings(v), Value::String(s)) => v.push(s),
            (ValueList::Bytes(v), Value::Bytes(b)) => v.push(b),
            (list, value) => {
                return Err(Error::schema(format!(
                    "cannot append a {} value to a list of {}",
                    value.value_type().expect("null rejected above"),
                    list.value_type().expect("empty handled above"),
                )))
            }
        }
        Ok(())
    }

    /// The list as store values, for array binding.
    pub fn to_sql_values(&self) -> Vec<rusqlite::types::Value> {
        match self {
            ValueList::Empty => Vec::new(),
            ValueList::Integers(v) => v
                .iter()
                .map(|i| rusqlite::types::Value::Integer(*i))
                .collect(),
            ValueList::Floats(v) => v.iter().map(|x| rusqlite::types::Value::Real(*x)).collect(),
            ValueList::Strings(v) => v
                .iter()
                .map(|s| rusqlite::types::Value::Text(s.clone()))
                .collect(),
            ValueList::Bytes(v) => v
                .iter()
                .map(|b| rusqlite::types::Value::Blob(b.clone()))
                .collect(),
        }
    }
}

impl FromIterator<i64> for ValueList {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        ValueList::Integers(iter.into_iter().collect())
    }
}
