//! Commands built on a scoped connection
//!
//! A command is text (or a procedure name), its parameters, a timeout, and the
//! transaction it belongs to. It keeps the SQL body of its last execution and
//! one slot per statement of that body; the result set compiles each
//! statement into its slot only once the statements before it have run.

use super::config::ColumnMatching;
use super::error::{DatabaseError, Result};
use super::procedure::ProcedureCatalog;
use super::transaction::ScopeState;
use super::value::DatabaseValue;
use rusqlite::{Connection, Statement};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// What the command text names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// SQL text, possibly several statements
    #[default]
    Text,
    /// Name of a procedure in the connection's catalog
    StoredProcedure,
}

/// A value bound to a command
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: Option<String>,
    value: DatabaseValue,
}

impl Parameter {
    /// A value for the next anonymous (`?`) slot
    pub fn positional(value: impl Into<DatabaseValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    /// A value for a named slot; the `:`, `@` or `$` prefix is optional
    pub fn named(name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> &DatabaseValue {
        &self.value
    }
}

/// A command ready to be run by a [`CommandExecutor`](crate::CommandExecutor)
pub struct Command<'c> {
    pub(super) conn: &'c Connection,
    pub(super) scope: Option<Rc<ScopeState>>,
    text: String,
    kind: CommandKind,
    pub(super) parameters: Vec<Parameter>,
    timeout: Duration,
    pub(super) matching: ColumnMatching,
    /// Body resolved by the last execution
    pub(super) sql: String,
    pub(super) slots: Vec<Option<Statement<'c>>>,
}

impl<'c> Command<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        scope: Option<Rc<ScopeState>>,
        text: String,
        kind: CommandKind,
        timeout: Duration,
        matching: ColumnMatching,
    ) -> Self {
        Self {
            conn,
            scope,
            text,
            kind,
            parameters: Vec::new(),
            timeout,
            matching,
            sql: String::new(),
            slots: Vec::new(),
        }
    }

    /// Bind the next positional parameter
    pub fn bind(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.parameters.push(Parameter::positional(value));
        self
    }

    /// Bind a named parameter
    pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.parameters.push(Parameter::named(name, value));
        self
    }

    /// Replace the timeout; zero disables it
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Id of the transaction the command runs in, if any
    pub fn transaction_id(&self) -> Option<u64> {
        self.scope.as_ref().map(|scope| scope.id())
    }

    /// Describe the command with its parameter values, for diagnostics.
    ///
    /// ```text
    /// SELECT * FROM users WHERE id = ? AND name = :name -- ?1 = 42, :name = 'Bob'
    /// EXEC list_orders :customer = 7
    /// ```
    ///
    /// Values are rendered as SQL literals and are not redacted.
    pub fn render(&self) -> String {
        let mut position = 0;
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|param| match param.name() {
                Some(name) => format!("{} = {}", name, param.value().to_sql_literal()),
                None => {
                    position += 1;
                    format!("?{} = {}", position, param.value().to_sql_literal())
                }
            })
            .collect();

        match (self.kind, params.is_empty()) {
            (CommandKind::Text, true) => self.text.clone(),
            (CommandKind::Text, false) => format!("{} -- {}", self.text, params.join(", ")),
            (CommandKind::StoredProcedure, true) => format!("EXEC {}", self.text),
            (CommandKind::StoredProcedure, false) => {
                format!("EXEC {} {}", self.text, params.join(", "))
            }
        }
    }

    pub(super) fn check_open(&self) -> Result<()> {
        match &self.scope {
            Some(scope) if !scope.is_open() => Err(DatabaseError::TransactionClosed),
            _ => Ok(()),
        }
    }

    /// Resolve the SQL body to run and reserve a statement slot for each of
    /// its statements, dropping statements left from an earlier execution.
    ///
    /// Nothing is compiled here: a statement may depend on objects created by
    /// the ones before it.
    pub(super) fn resolve(&mut self, procedures: &ProcedureCatalog) -> Result<()> {
        self.check_open()?;
        self.slots.clear();

        self.sql = match self.kind {
            CommandKind::Text => self.text.clone(),
            CommandKind::StoredProcedure => procedures
                .get(&self.text)
                .map(str::to_string)
                .ok_or_else(|| DatabaseError::ProcedureNotFound(self.text.clone()))?,
        };

        // Every statement but the last ends with a semicolon.
        let statements = self.sql.matches(';').count() + 1;
        self.slots.resize_with(statements, || None);
        Ok(())
    }
}

impl fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("timeout", &self.timeout)
            .field("transaction_id", &self.transaction_id())
            .finish()
    }
}
