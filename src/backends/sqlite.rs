//! SQLite transport
//!
//! Everything that touches `rusqlite` directly lives here: opening and
//! configuring connections, converting between `DatabaseValue` and SQLite's
//! storage classes, binding parameters, and enforcing command timeouts.

use crate::core::{
    command::Parameter,
    config::ConnectionConfig,
    error::{DatabaseError, Result},
    row::{DatabaseRow, RowSchema},
    value::{DatabaseValue, TIMESTAMP_FORMAT},
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, Row, Statement};
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Virtual machine steps between deadline checks
const PROGRESS_STEPS: c_int = 1_000;

/// Prefixes SQLite accepts for named parameters
const NAMED_PREFIXES: [char; 3] = [':', '@', '$'];

/// Open a connection and apply the session pragmas from `config`
pub(crate) fn open_connection(config: &ConnectionConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(&config.connection_string)?;
    conn.busy_timeout(config.busy_timeout())?;
    if config.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
    }
    Ok(conn)
}

/// Convert a rusqlite Row to a DatabaseRow
pub(crate) fn read_row(row: &Row<'_>, schema: &Arc<RowSchema>) -> rusqlite::Result<DatabaseRow> {
    let mut values = Vec::with_capacity(schema.len());

    for i in 0..schema.len() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(v) => DatabaseValue::Long(v),
            ValueRef::Real(v) => DatabaseValue::Double(v),
            // Text that is not UTF-8 is surfaced as bytes rather than repaired.
            ValueRef::Text(v) => match std::str::from_utf8(v) {
                Ok(text) => DatabaseValue::String(text.to_string()),
                Err(_) => DatabaseValue::Bytes(v.to_vec()),
            },
            ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        };
        values.push(value);
    }

    Ok(DatabaseRow::new(Arc::clone(schema), values))
}

/// Convert DatabaseValue to an owned rusqlite value
pub(crate) fn value_to_param(value: &DatabaseValue) -> Value {
    match value {
        DatabaseValue::Null => Value::Null,
        DatabaseValue::Bool(v) => Value::Integer(i64::from(*v)),
        DatabaseValue::Int(v) => Value::Integer(i64::from(*v)),
        DatabaseValue::Long(v) => Value::Integer(*v),
        DatabaseValue::Float(v) => Value::Real(f64::from(*v)),
        DatabaseValue::Double(v) => Value::Real(*v),
        DatabaseValue::String(v) => Value::Text(v.clone()),
        DatabaseValue::Bytes(v) => Value::Blob(v.clone()),
        DatabaseValue::Timestamp(v) => Value::Text(v.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Bind command parameters to one prepared statement.
///
/// Named parameters go to the slot with that name, if the statement has one.
/// Positional parameters fill the anonymous (`?`, `?NNN`) slots in order,
/// starting from the `first_positional`-th one; earlier statements of the same
/// command have consumed the ones before it. Slots left unbound read as NULL.
///
/// Returns the number of anonymous slots in the statement.
pub(crate) fn bind_parameters(
    stmt: &mut Statement<'_>,
    params: &[Parameter],
    first_positional: usize,
) -> rusqlite::Result<usize> {
    let anonymous: Vec<usize> = (1..=stmt.parameter_count())
        .filter(|&idx| {
            stmt.parameter_name(idx)
                .map_or(true, |name| name.starts_with('?'))
        })
        .collect();
    let slots = anonymous.len();

    let positional = params
        .iter()
        .filter(|param| param.name().is_none())
        .skip(first_positional);
    for (idx, param) in anonymous.into_iter().zip(positional) {
        stmt.raw_bind_parameter(idx, value_to_param(param.value()))?;
    }

    for param in params {
        let Some(name) = param.name() else { continue };
        if let Some(idx) = named_slot(stmt, name)? {
            stmt.raw_bind_parameter(idx, value_to_param(param.value()))?;
        }
    }

    Ok(slots)
}

fn named_slot(stmt: &Statement<'_>, name: &str) -> rusqlite::Result<Option<usize>> {
    if name.starts_with(NAMED_PREFIXES) {
        return stmt.parameter_index(name);
    }
    for prefix in NAMED_PREFIXES {
        if let Some(idx) = stmt.parameter_index(&format!("{}{}", prefix, name))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

/// Time budget of one command.
///
/// Only time spent inside the database counts: the budget is charged while a
/// statement executes or fetches a row, never while the caller holds an idle
/// cursor.
#[derive(Debug, Clone)]
pub(crate) struct CommandTimer {
    limit: Option<Duration>,
    spent: Duration,
}

impl CommandTimer {
    /// A zero timeout disables the limit
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            limit: (!timeout.is_zero()).then_some(timeout),
            spent: Duration::ZERO,
        }
    }

    fn timeout_error(&self, command: &str) -> DatabaseError {
        let timeout_ms = self.limit.map_or(0, |limit| limit.as_millis() as u64);
        warn!(timeout_ms, command, "command timed out");
        DatabaseError::command_timeout(command, timeout_ms)
    }

    /// Run one database operation for `command` within the remaining budget
    pub(crate) fn run<T>(
        &mut self,
        conn: &Connection,
        command: &str,
        op: impl FnOnce() -> rusqlite::Result<T>,
    ) -> Result<T> {
        let Some(limit) = self.limit else {
            return op().map_err(|e| DatabaseError::execution(command, e));
        };

        let remaining = limit.saturating_sub(self.spent);
        if remaining.is_zero() {
            return Err(self.timeout_error(command));
        }

        let started = Instant::now();
        let deadline = started + remaining;
        conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
        let result = op();
        conn.progress_handler(0, None::<fn() -> bool>);
        self.spent += started.elapsed();

        match result {
            Ok(value) => Ok(value),
            Err(e) if is_interrupt(&e) => Err(self.timeout_error(command)),
            Err(e) => Err(DatabaseError::execution(command, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ColumnMatching;

    fn memory() -> Connection {
        open_connection(&ConnectionConfig::new(":memory:")).unwrap()
    }

    fn query_one(conn: &Connection, sql: &str, params: &[Parameter]) -> Result<DatabaseRow> {
        let mut stmt = conn.prepare(sql)?;
        bind_parameters(&mut stmt, params, 0)?;
        let schema = Arc::new(RowSchema::new(
            stmt.column_names().into_iter().map(String::from).collect(),
            ColumnMatching::CaseInsensitive,
        ));
        let mut rows = stmt.raw_query();
        let row = rows.next()?.ok_or(DatabaseError::CursorExhausted)?;
        Ok(read_row(row, &schema)?)
    }

    #[test]
    fn test_storage_classes() -> Result<()> {
        let conn = memory();
        let row = query_one(
            &conn,
            "SELECT NULL AS n, 7 AS i, 1.5 AS r, 'txt' AS t, X'00FF' AS b",
            &[],
        )?;

        assert_eq!(row.value("n")?, &DatabaseValue::Null);
        assert_eq!(row.value("i")?, &DatabaseValue::Long(7));
        assert_eq!(row.value("r")?, &DatabaseValue::Double(1.5));
        assert_eq!(row.value("t")?, &DatabaseValue::from("txt"));
        assert_eq!(row.value("b")?, &DatabaseValue::Bytes(vec![0, 255]));
        Ok(())
    }

    #[test]
    fn test_positional_and_named_binding() -> Result<()> {
        let conn = memory();
        let params = [
            Parameter::named("name", DatabaseValue::from("Bob")),
            Parameter::positional(DatabaseValue::Int(3)),
            Parameter::positional(DatabaseValue::Bool(true)),
        ];
        let row = query_one(&conn, "SELECT ? AS a, :name AS b, ? AS c", &params)?;

        assert_eq!(row.value("a")?, &DatabaseValue::Long(3));
        assert_eq!(row.value("b")?, &DatabaseValue::from("Bob"));
        assert_eq!(row.value("c")?, &DatabaseValue::Long(1));
        Ok(())
    }

    #[test]
    fn test_positional_offset() -> Result<()> {
        let conn = memory();
        let params = [
            Parameter::positional(DatabaseValue::Int(1)),
            Parameter::positional(DatabaseValue::Int(2)),
        ];
        let mut stmt = conn.prepare("SELECT ? AS a")?;
        assert_eq!(bind_parameters(&mut stmt, &params, 1)?, 1);
        let mut rows = stmt.raw_query();
        let value: Option<i64> = rows.next()?.map(|row| row.get(0)).transpose()?;
        assert_eq!(value, Some(2));
        Ok(())
    }

    #[test]
    fn test_unbound_slots_are_null() -> Result<()> {
        let conn = memory();
        let params = [Parameter::named(":absent", DatabaseValue::Int(1))];
        let row = query_one(&conn, "SELECT ? AS a, @other AS b", &params)?;

        assert!(row.is_null("a")?);
        assert!(row.is_null("b")?);
        Ok(())
    }

    #[test]
    fn test_timer_interrupts_runaway_statement() {
        let conn = memory();
        let mut timer = CommandTimer::new(Duration::from_millis(50));
        let sql = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT count(*) FROM c";

        let result = timer.run(&conn, sql, || {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        });
        assert!(matches!(
            result,
            Err(DatabaseError::CommandTimeout { timeout_ms: 50, .. })
        ));

        // The handler is removed afterwards; ordinary statements run again.
        let mut timer = CommandTimer::new(Duration::ZERO);
        let one = timer.run(&conn, "SELECT 1", || {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        });
        assert_eq!(one.unwrap(), 1);
    }
}
