//! Command execution

use super::command::Command;
use super::error::{DatabaseError, Result};
use super::procedure::ProcedureCatalog;
use super::result_set::ResultSet;
use super::value::DatabaseValue;
use std::sync::Arc;
use tracing::debug;

/// Runs commands built on scoped connections.
///
/// The executor holds no connection of its own; a command carries the
/// connection and transaction it was built on. It does not retry.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    procedures: Arc<ProcedureCatalog>,
}

impl CommandExecutor {
    /// Create an executor resolving stored procedures through `procedures`
    pub fn new(procedures: Arc<ProcedureCatalog>) -> Self {
        Self { procedures }
    }

    pub fn procedures(&self) -> &ProcedureCatalog {
        &self.procedures
    }

    /// Execute a command and return a lazy cursor over its rows.
    ///
    /// Statements that precede the first projection run before this returns.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` if the command's scope was released,
    /// `ProcedureNotFound` for an unknown procedure, `CommandTimeout` when the
    /// timeout elapses, and `Execution` for any database failure.
    pub fn execute<'a, 'c>(&self, command: &'a mut Command<'c>) -> Result<ResultSet<'a, 'c>> {
        let rendered = command.render();
        debug!(
            transaction_id = ?command.transaction_id(),
            command = %rendered,
            "executing command"
        );

        command.resolve(&self.procedures)?;
        ResultSet::open(command, rendered)
    }

    /// Execute a command and return the first column of its first row.
    ///
    /// # Errors
    ///
    /// Returns `NoRows` if the first batch is empty or the command projects
    /// nothing, plus everything [`execute`](Self::execute) can return.
    pub fn execute_scalar(&self, command: &mut Command<'_>) -> Result<DatabaseValue> {
        let mut results = self.execute(command)?;
        match results.try_next_row()? {
            Some(row) => Ok(row.get_by_index(0).cloned().unwrap_or(DatabaseValue::Null)),
            None => Err(DatabaseError::no_rows(results.command())),
        }
    }

    /// Execute every statement of a command and return the number of rows
    /// changed by the ones without a projection.
    ///
    /// Rows of projecting statements are read and discarded.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn execute_non_query(&self, command: &mut Command<'_>) -> Result<u64> {
        let mut results = self.execute(command)?;
        loop {
            while results.try_next_row()?.is_some() {}
            if !results.next_result_set()? {
                break;
            }
        }
        Ok(results.affected_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::CommandKind;
    use crate::core::config::SessionOptions;
    use crate::core::connection::ScopedConnection;
    use crate::core::transaction::{TransactionOutcome, TransactionScope};
    use rusqlite::Connection;
    use std::time::Duration;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();
        conn
    }

    fn executor() -> CommandExecutor {
        let mut catalog = ProcedureCatalog::new();
        catalog.register(
            "add_user",
            "INSERT INTO users (name) VALUES (:name); SELECT last_insert_rowid() AS id;",
        );
        CommandExecutor::new(Arc::new(catalog))
    }

    #[test]
    fn test_non_query_and_scalar() -> Result<()> {
        let raw = setup();
        let conn = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());
        let executor = executor();

        let mut insert = conn
            .new_command("INSERT INTO users (name) VALUES (?), (?)", CommandKind::Text, None)?
            .bind("alice")
            .bind("bob");
        assert_eq!(executor.execute_non_query(&mut insert)?, 2);

        let mut count = conn.new_command("SELECT COUNT(*) FROM users", CommandKind::Text, None)?;
        assert_eq!(executor.execute_scalar(&mut count)?, DatabaseValue::Long(2));

        // The same command runs again from scratch.
        assert_eq!(executor.execute_scalar(&mut count)?, DatabaseValue::Long(2));
        Ok(())
    }

    #[test]
    fn test_scalar_without_rows() -> Result<()> {
        let raw = setup();
        let conn = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());

        let mut query = conn
            .new_command("SELECT name FROM users WHERE id = ?", CommandKind::Text, None)?
            .bind(99);
        match executor().execute_scalar(&mut query) {
            Err(DatabaseError::NoRows { command }) => {
                assert_eq!(command, "SELECT name FROM users WHERE id = ? -- ?1 = 99");
            }
            other => panic!("expected NoRows, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_stored_procedure() -> Result<()> {
        let raw = setup();
        let conn = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());

        let mut add = conn
            .new_command("add_user", CommandKind::StoredProcedure, None)?
            .bind_named("name", "carol");
        let id = executor().execute_scalar(&mut add)?;
        assert_eq!(id, DatabaseValue::Long(1));
        Ok(())
    }

    #[test]
    fn test_multi_statement_ddl() -> Result<()> {
        let raw = setup();
        let conn = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());
        let executor = executor();

        let mut create = conn.new_command(
            "CREATE TABLE t (a); INSERT INTO t VALUES (1);",
            CommandKind::Text,
            None,
        )?;
        assert_eq!(executor.execute_non_query(&mut create)?, 1);

        let mut temp = conn.new_command(
            "CREATE TEMP TABLE tmp AS SELECT 1 AS x; SELECT x FROM tmp;",
            CommandKind::Text,
            None,
        )?;
        assert_eq!(executor.execute_scalar(&mut temp)?, DatabaseValue::Long(1));
        Ok(())
    }

    #[test]
    fn test_failure_that_ends_transaction_closes_scope() -> Result<()> {
        let raw = Connection::open_in_memory().unwrap();
        raw.execute_batch("CREATE TABLE strict (v TEXT NOT NULL ON CONFLICT ROLLBACK)")
            .unwrap();
        let scope = TransactionScope::begin(raw, Duration::ZERO, SessionOptions::default())?;
        let executor = executor();
        {
            let conn = scope.connection();
            let mut ok = conn
                .new_command("INSERT INTO strict (v) VALUES (?)", CommandKind::Text, None)?
                .bind("a");
            executor.execute_non_query(&mut ok)?;

            let mut bad = conn
                .new_command("INSERT INTO strict (v) VALUES (?)", CommandKind::Text, None)?
                .bind(None::<String>);
            assert!(matches!(
                executor.execute_non_query(&mut bad),
                Err(DatabaseError::Execution { .. })
            ));

            // SQLite rolled the transaction back; nothing may run in autocommit.
            assert!(!scope.is_open());
            assert!(matches!(
                conn.new_command("INSERT INTO strict (v) VALUES ('late')", CommandKind::Text, None),
                Err(DatabaseError::ConnectionClosed)
            ));
            assert!(matches!(
                executor.execute_non_query(&mut ok),
                Err(DatabaseError::TransactionClosed)
            ));
        }

        assert_eq!(scope.finish()?, TransactionOutcome::RolledBack);
        Ok(())
    }

    #[test]
    fn test_execution_error_carries_command() -> Result<()> {
        let raw = setup();
        let conn = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());

        let mut insert = conn
            .new_command("INSERT INTO users (name) VALUES (?)", CommandKind::Text, None)?
            .bind(None::<String>);
        match executor().execute_non_query(&mut insert) {
            Err(DatabaseError::Execution { command, message, .. }) => {
                assert_eq!(command, "INSERT INTO users (name) VALUES (?) -- ?1 = NULL");
                assert!(message.contains("NOT NULL"));
            }
            other => panic!("expected Execution, got {:?}", other),
        }
        Ok(())
    }
}
