//! Error types for the data-access layer
//!
//! This module defines every error that scope management, command execution
//! and row decoding can surface. Nothing is swallowed internally; each failing
//! operation returns exactly one of these kinds.

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A transaction could not be started on the connection
    #[error("Cannot start transaction: {message}")]
    TransactionStart {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Operation attempted through a transaction scope that was already released
    #[error("Transaction scope is closed")]
    TransactionClosed,

    /// Operation attempted through a connection whose owning scope was released
    #[error("Connection is closed: its transaction scope was released")]
    ConnectionClosed,

    /// Rollback requested on a connection that has no owning transaction
    #[error("No active transaction on this connection")]
    NoActiveTransaction,

    /// The database failed while executing a command
    #[error("Execution of `{command}` failed: {message}")]
    Execution {
        command: String,
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A command ran past its timeout
    #[error("Command `{command}` timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    /// `next_row` was called after the cursor returned its last row
    #[error("Result set cursor is exhausted")]
    CursorExhausted,

    /// A scalar was requested from a command that produced no rows
    #[error("Command `{command}` returned no rows")]
    NoRows { command: String },

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// The column holds NULL but a value was required
    #[error("Column {column} is NULL")]
    NullValue { column: String },

    /// The column value cannot be represented as the requested type
    #[error("Column {column}: cannot convert {actual} to {expected}")]
    TypeConversion {
        column: String,
        expected: &'static str,
        actual: String,
    },

    /// The column value names no case of the requested enum
    #[error("Column {column}: {value} is not a valid {enum_name}")]
    InvalidEnumValue {
        column: String,
        enum_name: &'static str,
        value: String,
    },

    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Invalid connection string
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Stored procedure name not present in the catalog
    #[error("Stored procedure not found: {0}")]
    ProcedureNotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration document could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a transaction start error without an underlying driver error
    pub fn transaction_start<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionStart {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a transaction start error caused by a driver error
    pub fn transaction_start_with_source(source: rusqlite::Error) -> Self {
        DatabaseError::TransactionStart {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an execution error for the rendered command
    pub fn execution<S: Into<String>>(command: S, source: rusqlite::Error) -> Self {
        DatabaseError::Execution {
            command: command.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an execution error that has no driver error behind it
    pub fn execution_message<C: Into<String>, M: Into<String>>(command: C, message: M) -> Self {
        DatabaseError::Execution {
            command: command.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a command timeout error
    pub fn command_timeout<S: Into<String>>(command: S, timeout_ms: u64) -> Self {
        DatabaseError::CommandTimeout {
            command: command.into(),
            timeout_ms,
        }
    }

    /// Create a no-rows error
    pub fn no_rows<S: Into<String>>(command: S) -> Self {
        DatabaseError::NoRows {
            command: command.into(),
        }
    }

    /// Create a NULL value error
    pub fn null_value<S: Into<String>>(column: S) -> Self {
        DatabaseError::NullValue {
            column: column.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion<S: Into<String>, A: Into<String>>(
        column: S,
        expected: &'static str,
        actual: A,
    ) -> Self {
        DatabaseError::TypeConversion {
            column: column.into(),
            expected,
            actual: actual.into(),
        }
    }

    /// Create an invalid enum value error
    pub fn invalid_enum<S: Into<String>, V: Into<String>>(
        column: S,
        enum_name: &'static str,
        value: V,
    ) -> Self {
        DatabaseError::InvalidEnumValue {
            column: column.into(),
            enum_name,
            value: value.into(),
        }
    }

    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Config(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }
}
