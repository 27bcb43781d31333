//! # Rust Scoped DB
//!
//! A synchronous, transactional data-access layer over SQLite. Work happens
//! inside a transaction scope that owns one physical connection; participants
//! share a rollback-intent flag, and the scope commits or rolls back exactly
//! once when it is released. Commands return lazy, forward-only result sets
//! whose rows expose typed, NULL-aware column accessors.
//!
//! ## Features
//!
//! - **Deferred rollback**: any participant can flag rollback; the decision is
//!   taken once, at scope release, and release is idempotent
//! - **Guaranteed release**: scopes resolve on drop, result sets close their
//!   cursor on drop
//! - **Lazy cursors**: rows are fetched as the caller advances, across
//!   several result batches per command
//! - **Typed rows**: string, integer, float, decimal, bool, timestamp,
//!   duration, GUID, bytes and enum accessors, each with an `_or_null` form
//! - **Command timeouts**: counted against time spent in the database
//! - **Stored procedures**: named command bodies registered in the
//!   configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_scoped_db::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let provider = ConnectionProvider::new("app.db")?;
//!     let executor = provider.executor();
//!
//!     let scope = provider.begin_transaction(None)?;
//!     {
//!         let conn = scope.connection();
//!
//!         let mut insert = conn
//!             .new_command("INSERT INTO users (name) VALUES (?)", CommandKind::Text, None)?
//!             .bind("Alice");
//!         if let Err(e) = executor.execute_non_query(&mut insert) {
//!             conn.request_rollback()?;
//!             return Err(e);
//!         }
//!
//!         let mut query = conn.new_command("SELECT id, name FROM users", CommandKind::Text, None)?;
//!         let mut users = executor.execute(&mut query)?;
//!         while users.has_next()? {
//!             let row = users.next_row()?;
//!             println!("{}: {}", row.get_i64("id")?, row.get_string("name")?);
//!         }
//!     }
//!
//!     scope.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Enum columns
//!
//! ```rust
//! use rust_scoped_db::prelude::*;
//! use rust_scoped_db::db_enum;
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! enum Status {
//!     Unknown,
//!     Active,
//! }
//! db_enum!(Status { Unknown, Active });
//!
//! let row = DatabaseRow::from_pairs(
//!     [("Status", DatabaseValue::from("Active")), ("Previous", DatabaseValue::Null)],
//!     ColumnMatching::CaseInsensitive,
//! );
//! assert_eq!(row.get_enum::<Status>("Status").unwrap(), Status::Active);
//! assert_eq!(
//!     row.get_enum_or_default("Previous", Status::Unknown).unwrap(),
//!     Status::Unknown
//! );
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── config.rs       # Connection configuration
//! │   ├── error.rs        # Error types
//! │   ├── value.rs        # Raw column values
//! │   ├── decode.rs       # Typed decoding, enums, timestamps
//! │   ├── row.rs          # Rows and column accessors
//! │   ├── transaction.rs  # Transaction scope
//! │   ├── connection.rs   # Scoped connection façade
//! │   ├── command.rs      # Commands and parameters
//! │   ├── executor.rs     # Command execution
//! │   ├── result_set.rs   # Lazy multi-batch cursor
//! │   ├── procedure.rs    # Stored procedure catalog
//! │   └── provider.rs     # Connection provider
//! ├── backends/
//! │   └── sqlite.rs       # rusqlite glue
//! └── lib.rs
//! ```

/// Core data-access types
pub mod core;

mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_scoped_db::prelude::*;
///
/// fn main() -> Result<()> {
///     let provider = ConnectionProvider::new(":memory:")?;
///     let scope = provider.begin_transaction(None)?;
///     assert_eq!(scope.finish()?, TransactionOutcome::Committed);
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        ColumnMatching, Command, CommandExecutor, CommandKind, ConnectionConfig,
        ConnectionProvider, DatabaseError, DatabaseRow, DatabaseValue, DateTimeKind, DbEnum,
        Result, ResultSet, ScopedConnection, TransactionOutcome, TransactionScope,
    };
}

// Re-export at root level for convenience
pub use self::core::{
    BeginMode, ColumnMatching, Command, CommandExecutor, CommandKind, ConnectionConfig,
    ConnectionProvider, DatabaseError, DatabaseRow, DatabaseValue, DateTimeKind, DbEnum,
    FromDatabaseValue, Parameter, ProcedureCatalog, Result, ResultSet,
    RollbackWithoutTransaction, RowSchema, ScopedConnection, SessionOptions, Timestamp,
    TransactionOutcome, TransactionScope,
};
