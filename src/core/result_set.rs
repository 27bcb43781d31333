//! Forward-only cursor over the batches of one executed command

use super::command::{Command, Parameter};
use super::config::ColumnMatching;
use super::error::{DatabaseError, Result};
use super::row::{DatabaseRow, RowSchema};
use super::transaction::ScopeState;
use crate::backends::sqlite::{bind_parameters, read_row, CommandTimer};
use rusqlite::{Batch, Connection, Rows, Statement};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

struct Cursor<'a> {
    rows: Rows<'a>,
    schema: Arc<RowSchema>,
}

/// Rows of an executed command, read one at a time.
///
/// Each statement of the command that projects columns is one batch. Rows
/// are fetched from the database only as the caller advances; nothing is
/// buffered beyond a single look-ahead row for [`has_next`](Self::has_next).
/// Statements without a projection run while the cursor moves past them, and
/// their change counts add up in [`affected_rows`](Self::affected_rows).
/// A statement is compiled only after the ones before it have run, so it can
/// use tables they created.
///
/// Dropping the result set closes the cursor. Statements after the current
/// batch that were never reached are neither compiled nor run.
pub struct ResultSet<'a, 'c> {
    conn: &'c Connection,
    scope: Option<Rc<ScopeState>>,
    command: String,
    matching: ColumnMatching,
    timer: CommandTimer,
    current: Option<Cursor<'a>>,
    columns: Option<Arc<RowSchema>>,
    peeked: Option<DatabaseRow>,
    affected: u64,
    statements: Batch<'c, 'a>,
    parameters: &'a [Parameter],
    positional: usize,
    slots: &'a mut [Option<Statement<'c>>],
    compiled: usize,
}

impl<'a, 'c> ResultSet<'a, 'c> {
    /// Run `command`, whose body is already resolved, up to its first batch
    pub(crate) fn open(command: &'a mut Command<'c>, rendered: String) -> Result<Self> {
        let conn = command.conn;
        let scope = command.scope.clone();
        let matching = command.matching;
        let timer = CommandTimer::new(command.timeout());

        let Command {
            sql,
            parameters,
            slots,
            ..
        } = command;
        let sql: &'a String = sql;
        let parameters: &'a [Parameter] = parameters;
        let slots: &'a mut [Option<Statement<'c>>] = slots;

        let mut results = ResultSet {
            conn,
            scope,
            command: rendered,
            matching,
            timer,
            current: None,
            columns: None,
            peeked: None,
            affected: 0,
            statements: Batch::new(conn, sql),
            parameters,
            positional: 0,
            slots,
            compiled: 0,
        };
        results.advance()?;
        Ok(results)
    }

    fn check_open(&self) -> Result<()> {
        match &self.scope {
            Some(scope) if !scope.is_open() => Err(DatabaseError::TransactionClosed),
            _ => Ok(()),
        }
    }

    /// Close the owning scope if a failure made SQLite abandon its
    /// transaction, then hand the failure back
    fn failed(&self, err: DatabaseError) -> DatabaseError {
        if let Some(scope) = &self.scope {
            scope.close_if_ended(self.conn);
        }
        err
    }

    /// Compile the next statement of the body and bind its parameters.
    ///
    /// Positional parameters continue where the previous statement stopped.
    fn compile_next(&mut self) -> Result<Option<&'a mut Statement<'c>>> {
        let next = self
            .statements
            .next()
            .map_err(|e| DatabaseError::execution(self.command.as_str(), e))?;
        let Some(mut stmt) = next else {
            return Ok(None);
        };
        self.positional += bind_parameters(&mut stmt, self.parameters, self.positional)
            .map_err(|e| DatabaseError::execution(self.command.as_str(), e))?;

        let slots = mem::take(&mut self.slots);
        let Some((slot, rest)) = slots.split_first_mut() else {
            return Err(DatabaseError::execution_message(
                self.command.as_str(),
                "more statements than reserved",
            ));
        };
        self.slots = rest;
        self.compiled += 1;
        Ok(Some(slot.insert(stmt)))
    }

    /// Move to the next statement with a projection, running the ones
    /// without on the way
    fn advance(&mut self) -> Result<bool> {
        self.current = None;
        self.columns = None;
        self.peeked = None;

        loop {
            let Some(stmt) = self.compile_next()? else {
                return Ok(false);
            };

            if stmt.column_count() == 0 {
                let changes = self
                    .timer
                    .run(self.conn, &self.command, || stmt.raw_execute())
                    .map_err(|e| self.failed(e))?;
                self.affected += changes as u64;
                continue;
            }

            let names = stmt.column_names().into_iter().map(String::from).collect();
            let schema = Arc::new(RowSchema::new(names, self.matching));
            self.columns = Some(Arc::clone(&schema));
            self.current = Some(Cursor {
                rows: stmt.raw_query(),
                schema,
            });
            return Ok(true);
        }
    }

    fn fetch(&mut self) -> Result<Option<DatabaseRow>> {
        self.check_open()?;
        if let Some(row) = self.peeked.take() {
            return Ok(Some(row));
        }
        let Some(cursor) = self.current.as_mut() else {
            return Ok(None);
        };

        let rows = &mut cursor.rows;
        let schema = &cursor.schema;
        let fetched = self.timer.run(self.conn, &self.command, || match rows.next()? {
            Some(row) => read_row(row, schema).map(Some),
            None => Ok(None),
        });

        match fetched {
            Ok(Some(row)) => Ok(Some(row)),
            // Exhausted or failed: the cursor is not stepped again either way.
            Ok(None) => {
                self.current = None;
                Ok(None)
            }
            Err(e) => {
                self.current = None;
                Err(self.failed(e))
            }
        }
    }

    /// Whether another row is available in the current batch.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` if the owning scope was released, or the
    /// error raised while fetching the row.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_none() {
            self.peeked = self.fetch()?;
        }
        Ok(self.peeked.is_some())
    }

    /// Next row of the current batch.
    ///
    /// # Errors
    ///
    /// Returns `CursorExhausted` once the batch has no more rows.
    pub fn next_row(&mut self) -> Result<DatabaseRow> {
        self.fetch()?.ok_or(DatabaseError::CursorExhausted)
    }

    /// Next row of the current batch, or `None` once it is exhausted
    pub fn try_next_row(&mut self) -> Result<Option<DatabaseRow>> {
        self.fetch()
    }

    /// Skip the rest of the current batch and move to the next one.
    ///
    /// Returns `false` when the command has no further batches.
    pub fn next_result_set(&mut self) -> Result<bool> {
        self.check_open()?;
        self.advance()
    }

    /// Column names of the current batch, in projection order
    pub fn columns(&self) -> &[String] {
        match &self.columns {
            Some(schema) => schema.names(),
            None => &[],
        }
    }

    /// Rows changed by statements without a projection run so far
    pub fn affected_rows(&self) -> u64 {
        self.affected
    }

    /// The command as rendered for diagnostics
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Close the cursor without reading further
    pub fn release(self) {}
}

impl Iterator for ResultSet<'_, '_> {
    type Item = Result<DatabaseRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch().transpose()
    }
}

impl fmt::Debug for ResultSet<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("command", &self.command)
            .field("columns", &self.columns())
            .field("affected", &self.affected)
            .field("statements_compiled", &self.compiled)
            .finish()
    }
}
