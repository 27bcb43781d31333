//! Caller-facing connection façade

use super::command::{Command, CommandKind};
use super::config::{RollbackWithoutTransaction, SessionOptions};
use super::error::{DatabaseError, Result};
use super::transaction::ScopeState;
use rusqlite::Connection;
use std::rc::Rc;
use std::time::Duration;
use tracing::warn;

/// A borrowed connection, optionally bound to a transaction scope.
///
/// Clones share the scope's rollback flag, so a helper handed a clone can
/// flag rollback for the whole unit of work. Never owns the physical
/// connection.
#[derive(Debug, Clone)]
pub struct ScopedConnection<'c> {
    conn: &'c Connection,
    scope: Option<Rc<ScopeState>>,
    timeout: Duration,
    options: SessionOptions,
}

impl<'c> ScopedConnection<'c> {
    pub(crate) fn transacted(
        conn: &'c Connection,
        scope: Rc<ScopeState>,
        timeout: Duration,
        options: SessionOptions,
    ) -> Self {
        Self {
            conn,
            scope: Some(scope),
            timeout,
            options,
        }
    }

    pub(crate) fn untransacted(conn: &'c Connection, timeout: Duration, options: SessionOptions) -> Self {
        Self {
            conn,
            scope: None,
            timeout,
            options,
        }
    }

    /// Whether commands built here run inside a transaction scope
    pub fn in_transaction(&self) -> bool {
        self.scope.is_some()
    }

    /// Id of the owning transaction scope, if any
    pub fn transaction_id(&self) -> Option<u64> {
        self.scope.as_ref().map(|scope| scope.id())
    }

    /// Default command timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn check_open(&self) -> Result<()> {
        match &self.scope {
            Some(scope) if !scope.is_open() => Err(DatabaseError::ConnectionClosed),
            _ => Ok(()),
        }
    }

    /// Build a command on this connection.
    ///
    /// `timeout` overrides the connection default when given.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the owning scope was released.
    pub fn new_command(
        &self,
        text: impl Into<String>,
        kind: CommandKind,
        timeout: Option<Duration>,
    ) -> Result<Command<'c>> {
        self.check_open()?;
        Ok(Command::new(
            self.conn,
            self.scope.clone(),
            text.into(),
            kind,
            timeout.unwrap_or(self.timeout),
            self.options.column_matching,
        ))
    }

    /// Flag the owning transaction for rollback.
    ///
    /// Without an owning transaction the configured
    /// [`RollbackWithoutTransaction`] policy applies.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the owning scope was released, or
    /// `NoActiveTransaction` when there is none and the policy is `Error`.
    pub fn request_rollback(&self) -> Result<()> {
        self.check_open()?;
        match &self.scope {
            Some(scope) => {
                scope.request_rollback();
                Ok(())
            }
            None => self.without_transaction("rollback request ignored", ()),
        }
    }

    /// Whether the owning transaction will roll back at release
    ///
    /// # Errors
    ///
    /// Same as [`request_rollback`](Self::request_rollback).
    pub fn will_roll_back(&self) -> Result<bool> {
        self.check_open()?;
        match &self.scope {
            Some(scope) => Ok(scope.will_roll_back()),
            None => self.without_transaction("rollback state queried", false),
        }
    }

    fn without_transaction<T>(&self, event: &str, value: T) -> Result<T> {
        match self.options.rollback_without_transaction {
            RollbackWithoutTransaction::Ignore => {
                warn!("{}: connection has no transaction", event);
                Ok(value)
            }
            RollbackWithoutTransaction::Error => Err(DatabaseError::NoActiveTransaction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionScope;

    fn scope() -> TransactionScope {
        let conn = Connection::open_in_memory().unwrap();
        TransactionScope::begin(conn, Duration::from_secs(1), SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_flag_is_shared_between_clones() {
        let scope = scope();
        let outer = scope.connection();
        let inner = outer.clone();

        assert!(!outer.will_roll_back().unwrap());
        inner.request_rollback().unwrap();
        assert!(outer.will_roll_back().unwrap());
        assert!(scope.will_roll_back());
        assert_eq!(outer.transaction_id(), Some(scope.id()));
    }

    #[test]
    fn test_closed_after_release() {
        let scope = scope();
        let conn = scope.connection();
        scope.release().unwrap();

        assert!(matches!(
            conn.new_command("SELECT 1", CommandKind::Text, None),
            Err(DatabaseError::ConnectionClosed)
        ));
        assert!(matches!(
            conn.request_rollback(),
            Err(DatabaseError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_untransacted_rollback_policy() {
        let raw = Connection::open_in_memory().unwrap();

        let lenient = ScopedConnection::untransacted(&raw, Duration::ZERO, SessionOptions::default());
        assert!(!lenient.in_transaction());
        assert!(lenient.request_rollback().is_ok());
        assert!(!lenient.will_roll_back().unwrap());

        let strict = SessionOptions {
            rollback_without_transaction: RollbackWithoutTransaction::Error,
            ..SessionOptions::default()
        };
        let strict = ScopedConnection::untransacted(&raw, Duration::ZERO, strict);
        assert!(matches!(
            strict.request_rollback(),
            Err(DatabaseError::NoActiveTransaction)
        ));
    }

    #[test]
    fn test_command_inherits_timeout() {
        let scope = scope();
        let conn = scope.connection();

        let cmd = conn.new_command("SELECT 1", CommandKind::Text, None).unwrap();
        assert_eq!(cmd.timeout(), Duration::from_secs(1));

        let cmd = conn
            .new_command("SELECT 1", CommandKind::Text, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(cmd.timeout(), Duration::from_millis(10));
    }
}
