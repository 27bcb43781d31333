//! Core data-access types
//!
//! This module provides the building blocks of the layer: errors, values and
//! typed decoding, configuration, transaction scopes, connection façades,
//! commands, execution and result cursors.

pub mod command;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod executor;
pub mod procedure;
pub mod provider;
pub mod result_set;
pub mod row;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use command::{Command, CommandKind, Parameter};
pub use config::{
    BeginMode, ColumnMatching, ConnectionConfig, RollbackWithoutTransaction, SessionOptions,
    DEFAULT_BUSY_TIMEOUT, DEFAULT_COMMAND_TIMEOUT,
};
pub use connection::ScopedConnection;
pub use decode::{DateTimeKind, DbEnum, FromDatabaseValue, Timestamp};
pub use error::{DatabaseError, Result};
pub use executor::CommandExecutor;
pub use procedure::ProcedureCatalog;
pub use provider::ConnectionProvider;
pub use result_set::ResultSet;
pub use row::{DatabaseRow, RowSchema};
pub use transaction::{TransactionOutcome, TransactionScope};
pub use value::DatabaseValue;
