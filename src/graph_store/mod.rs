//! Thin glue over the SQLite connection: opening stores, running
//! statements with positional scalar and array parameters, and streaming
//! rows back through callbacks.
//!
//! Statements come in two flavors. Cached statements go through the
//! connection's prepared-statement cache, keyed by statement text; the
//! planner emits identical text for identical plans, so the text is the
//! template identity. Volatile statements are prepared per execution, for
//! shapes that depend on runtime data.

use std::path::Path;
use std::rc::Rc;

use log::debug;
use rusqlite::{Connection, Statement};

use crate::error::Result;
use crate::sqlite_query_generator::{ParamValue, QueryParams};

/// How many compiled statements the connection keeps around for reuse.
const STATEMENT_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementMode {
    Cached,
    Volatile,
}

/// Opens a file-backed store and installs the array-binding module.
pub fn open_file(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Opens an in-memory store and installs the array-binding module.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    rusqlite::vtab::array::load_module(conn)?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    Ok(())
}

/// Runs a statement and walks its rows. The callback returns `false` to
/// stop early; the in-flight statement still finalizes normally.
pub fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &QueryParams,
    mode: StatementMode,
    mut on_row: impl FnMut(&rusqlite::Row<'_>) -> Result<bool>,
) -> Result<()> {
    debug!("sql: {}", sql);
    match mode {
        StatementMode::Cached => {
            let mut stmt = conn.prepare_cached(sql)?;
            bind_and_walk(&mut stmt, params, &mut on_row)
        }
        StatementMode::Volatile => {
            let mut stmt = conn.prepare(sql)?;
            bind_and_walk(&mut stmt, params, &mut on_row)
        }
    }
}

/// Runs a statement for its side effect or its single scalar result, e.g.
/// `INSERT ... RETURNING SYS__ID`.
pub fn query_scalar(
    conn: &Connection,
    sql: &str,
    params: &QueryParams,
    mode: StatementMode,
) -> Result<Option<i64>> {
    let mut result = None;
    query_rows(conn, sql, params, mode, |row| {
        result = Some(row.get::<_, i64>(0)?);
        Ok(false)
    })?;
    Ok(result)
}

fn bind_and_walk(
    stmt: &mut Statement<'_>,
    params: &QueryParams,
    on_row: &mut impl FnMut(&rusqlite::Row<'_>) -> Result<bool>,
) -> Result<()> {
    for (index, param) in params.iter() {
        match param {
            ParamValue::Scalar(value) => {
                let value: rusqlite::types::Value = value.clone().into();
                stmt.raw_bind_parameter(index, value)?;
            }
            ParamValue::List(list) => {
                stmt.raw_bind_parameter(index, Rc::new(list.to_sql_values()))?;
            }
        }
    }
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        if !on_row(row)? {
            break;
        }
    }
    Ok(())
}
