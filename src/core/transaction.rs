//! Transaction scope with deferred rollback intent
//!
//! A [`TransactionScope`] owns one physical connection and the transaction
//! open on it. Participants never end the transaction themselves; they can only
//! flag that it must be undone. The flag is read once, when the scope is
//! released, and decides between `COMMIT` and `ROLLBACK`.
//!
//! Release happens exactly once: explicitly through [`TransactionScope::release`]
//! or [`TransactionScope::finish`], and otherwise when the scope is dropped.

use super::command::{Command, CommandKind};
use super::config::SessionOptions;
use super::connection::ScopedConnection;
use super::error::{DatabaseError, Result};
use rusqlite::Connection;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// How a transaction scope was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by a scope and every façade derived from it
#[derive(Debug)]
pub(crate) struct ScopeState {
    id: u64,
    open: Cell<bool>,
    rollback_requested: Cell<bool>,
    outcome: Cell<Option<TransactionOutcome>>,
}

impl ScopeState {
    fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            open: Cell::new(true),
            rollback_requested: Cell::new(false),
            outcome: Cell::new(None),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    pub(crate) fn will_roll_back(&self) -> bool {
        self.rollback_requested.get()
    }

    /// Flag the transaction for rollback. Callers check the scope is open.
    pub(crate) fn request_rollback(&self) {
        if !self.rollback_requested.replace(true) {
            warn!(transaction_id = self.id, "transaction flagged for rollback");
        }
    }

    /// Close the scope if the database left the transaction on its own.
    ///
    /// SQLite rolls the whole transaction back when a write is interrupted
    /// and on some other failures. Commands after that would run in
    /// autocommit mode, so the scope closes as rolled back and release has
    /// nothing left to issue.
    pub(crate) fn close_if_ended(&self, conn: &Connection) -> bool {
        if !self.is_open() || !conn.is_autocommit() {
            return false;
        }
        self.open.set(false);
        self.outcome.set(Some(TransactionOutcome::RolledBack));
        error!(
            transaction_id = self.id,
            outcome = TransactionOutcome::RolledBack.as_str(),
            "transaction rolled back by the database; scope closed"
        );
        true
    }
}

/// A physical transaction over one owned connection.
///
/// The scope is `!Send`: it and the façades borrowed from it stay on the
/// thread that began the transaction.
///
/// # Example
///
/// ```rust,no_run
/// use rust_scoped_db::prelude::*;
///
/// fn transfer(provider: &ConnectionProvider) -> Result<()> {
///     let executor = provider.executor();
///     let scope = provider.begin_transaction(None)?;
///     {
///         let conn = scope.connection();
///         let mut debit = conn
///             .new_command("UPDATE accounts SET balance = balance - ? WHERE id = ?", CommandKind::Text, None)?
///             .bind(100)
///             .bind(1);
///         if let Err(e) = executor.execute_non_query(&mut debit) {
///             conn.request_rollback()?;
///             return Err(e);
///         }
///     }
///     scope.finish()?;
///     Ok(())
/// }
/// ```
pub struct TransactionScope {
    conn: Connection,
    state: Rc<ScopeState>,
    timeout: Duration,
    options: SessionOptions,
    started: Instant,
}

impl TransactionScope {
    /// Start a transaction on `conn`, taking ownership of it.
    ///
    /// `timeout` becomes the default timeout of commands built through this
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns `TransactionStart` if a transaction is already active on the
    /// connection or `BEGIN` fails.
    pub fn begin(conn: Connection, timeout: Duration, options: SessionOptions) -> Result<Self> {
        if !conn.is_autocommit() {
            return Err(DatabaseError::transaction_start(
                "a transaction is already active on this connection",
            ));
        }

        conn.execute_batch(options.begin_mode.begin_sql())
            .map_err(DatabaseError::transaction_start_with_source)?;

        let state = Rc::new(ScopeState::new());
        info!(
            transaction_id = state.id(),
            begin_mode = ?options.begin_mode,
            "transaction started"
        );

        Ok(Self {
            conn,
            state,
            timeout,
            options,
            started: Instant::now(),
        })
    }

    /// Identifier used in log events
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Whether the scope has not been released yet
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Default command timeout of this scope
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolution of the scope, once it has been released
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.state.outcome.get()
    }

    /// A façade sharing this scope's transaction and rollback flag.
    ///
    /// Every connection returned here observes the same flag. Once the scope
    /// is released they fail with `ConnectionClosed`.
    pub fn connection(&self) -> ScopedConnection<'_> {
        ScopedConnection::transacted(&self.conn, Rc::clone(&self.state), self.timeout, self.options)
    }

    /// Build a command bound to this transaction.
    ///
    /// `timeout` overrides the scope default when given.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` if the scope was released.
    pub fn new_command(
        &self,
        text: impl Into<String>,
        kind: CommandKind,
        timeout: Option<Duration>,
    ) -> Result<Command<'_>> {
        self.check_open()?;
        Ok(Command::new(
            &self.conn,
            Some(Rc::clone(&self.state)),
            text.into(),
            kind,
            timeout.unwrap_or(self.timeout),
            self.options.column_matching,
        ))
    }

    /// Flag the transaction to be rolled back at release. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` if the scope was released.
    pub fn request_rollback(&self) -> Result<()> {
        self.check_open()?;
        self.state.request_rollback();
        Ok(())
    }

    /// Whether release will roll the transaction back
    pub fn will_roll_back(&self) -> bool {
        self.state.will_roll_back()
    }

    fn check_open(&self) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(DatabaseError::TransactionClosed)
        }
    }

    /// Resolve the transaction: roll back if flagged, commit otherwise.
    ///
    /// Only the first call does anything; later calls return `Ok(())`. The
    /// scope is closed even when resolution fails, in which case the
    /// transaction is rolled back if it is still active.
    ///
    /// # Errors
    ///
    /// Returns `Execution` if `COMMIT` or `ROLLBACK` fails.
    pub fn release(&self) -> Result<()> {
        if !self.state.open.replace(false) {
            return Ok(());
        }

        let outcome = if self.state.will_roll_back() {
            TransactionOutcome::RolledBack
        } else {
            TransactionOutcome::Committed
        };
        let sql = match outcome {
            TransactionOutcome::Committed => "COMMIT",
            TransactionOutcome::RolledBack => "ROLLBACK",
        };

        let result = self.conn.execute_batch(sql);
        let resolved = match &result {
            Ok(()) => {
                info!(transaction_id = self.id(), "transaction {}", outcome);
                Some(outcome)
            }
            Err(e) => {
                error!(transaction_id = self.id(), error = %e, "{} failed", sql);
                self.abandon()
            }
        };
        self.state.outcome.set(resolved);

        info!(
            transaction_id = self.id(),
            outcome = resolved.map_or("unresolved", |o| o.as_str()),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "transaction scope ended"
        );

        result.map_err(|e| DatabaseError::execution(sql, e))
    }

    /// Make sure nothing of a transaction whose resolution failed survives
    fn abandon(&self) -> Option<TransactionOutcome> {
        if self.conn.is_autocommit() {
            // SQLite already rolled it back
            return Some(TransactionOutcome::RolledBack);
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => Some(TransactionOutcome::RolledBack),
            Err(e) => {
                error!(transaction_id = self.id(), error = %e, "ROLLBACK failed");
                None
            }
        }
    }

    /// Release the scope and close its connection
    ///
    /// # Errors
    ///
    /// Same as [`release`](Self::release).
    pub fn finish(self) -> Result<TransactionOutcome> {
        self.release()?;
        self.outcome()
            .ok_or_else(|| DatabaseError::other("transaction scope has no outcome"))
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id())
            .field("open", &self.is_open())
            .field("will_roll_back", &self.will_roll_back())
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!(
                transaction_id = self.id(),
                error = %e,
                "failed to resolve transaction scope on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        conn
    }

    fn begin(conn: Connection) -> TransactionScope {
        TransactionScope::begin(conn, Duration::from_secs(5), SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_begin_rejects_active_transaction() {
        let conn = setup();
        conn.execute_batch("BEGIN").unwrap();

        let err = TransactionScope::begin(conn, Duration::ZERO, SessionOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionStart { .. }));
    }

    #[test]
    fn test_release_commits_by_default() {
        let scope = begin(setup());
        scope.conn.execute_batch("INSERT INTO t (v) VALUES ('a')").unwrap();

        scope.release().unwrap();
        assert_eq!(scope.outcome(), Some(TransactionOutcome::Committed));
        assert!(scope.conn.is_autocommit());

        let count: i64 = scope
            .conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_release_rolls_back_when_flagged() {
        let scope = begin(setup());
        scope.conn.execute_batch("INSERT INTO t (v) VALUES ('a')").unwrap();
        scope.request_rollback().unwrap();
        scope.request_rollback().unwrap();
        assert!(scope.will_roll_back());

        scope.release().unwrap();
        assert_eq!(scope.outcome(), Some(TransactionOutcome::RolledBack));

        let count: i64 = scope
            .conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let scope = begin(setup());
        scope.release().unwrap();

        // A second resolution would issue COMMIT with no transaction and fail.
        scope.release().unwrap();
        assert_eq!(scope.outcome(), Some(TransactionOutcome::Committed));
    }

    #[test]
    fn test_closed_scope_rejects_use() {
        let scope = begin(setup());
        scope.release().unwrap();

        assert!(!scope.is_open());
        assert!(matches!(
            scope.request_rollback(),
            Err(DatabaseError::TransactionClosed)
        ));
        assert!(matches!(
            scope.new_command("SELECT 1", CommandKind::Text, None),
            Err(DatabaseError::TransactionClosed)
        ));
    }

    #[test]
    fn test_failed_commit_closes_scope() {
        let scope = begin(setup());
        // End the transaction behind the scope's back so COMMIT fails.
        scope.conn.execute_batch("ROLLBACK").unwrap();

        let err = scope.release().unwrap_err();
        assert!(matches!(err, DatabaseError::Execution { .. }));
        assert!(!scope.is_open());
        assert_eq!(scope.outcome(), Some(TransactionOutcome::RolledBack));
    }

    #[test]
    fn test_transaction_ended_by_database_closes_scope() {
        let scope = begin(setup());
        assert!(!scope.state.close_if_ended(&scope.conn));
        assert!(scope.is_open());

        scope.conn.execute_batch("ROLLBACK").unwrap();
        assert!(scope.state.close_if_ended(&scope.conn));
        assert!(!scope.is_open());
        assert_eq!(scope.outcome(), Some(TransactionOutcome::RolledBack));
        assert!(matches!(
            scope.new_command("SELECT 1", CommandKind::Text, None),
            Err(DatabaseError::TransactionClosed)
        ));

        // Nothing is left to resolve.
        scope.release().unwrap();
        assert_eq!(scope.outcome(), Some(TransactionOutcome::RolledBack));
    }

    #[test]
    fn test_scope_ids_are_distinct() {
        let a = begin(setup());
        let b = begin(setup());
        assert_ne!(a.id(), b.id());
        assert_eq!(TransactionOutcome::RolledBack.to_string(), "rolled_back");
    }
}
