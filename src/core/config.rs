//! Connection and session configuration
//!
//! `ConnectionConfig` is plain data: it can be built in code with the `with_*`
//! methods or deserialized from JSON. Loading it from files or environment is
//! left to the application.

use super::error::{DatabaseError, Result};
use super::procedure::ProcedureCatalog;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for commands (30 seconds)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time SQLite waits on a locked database (5 seconds)
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How row accessors match column names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatching {
    /// Exact match first, then ASCII case-insensitive
    #[default]
    CaseInsensitive,
    /// Exact match only
    CaseSensitive,
}

/// What `request_rollback` does on a connection with no owning transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackWithoutTransaction {
    /// Log and carry on
    #[default]
    Ignore,
    /// Fail with `NoActiveTransaction`
    Error,
}

/// Locking behaviour of `BEGIN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeginMode {
    /// Locks are taken on first read/write
    #[default]
    Deferred,
    /// Write lock taken immediately
    Immediate,
    /// Exclusive lock taken immediately
    Exclusive,
}

impl BeginMode {
    /// The statement that opens a transaction in this mode
    pub fn begin_sql(&self) -> &'static str {
        match self {
            BeginMode::Deferred => "BEGIN DEFERRED",
            BeginMode::Immediate => "BEGIN IMMEDIATE",
            BeginMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Per-session behaviour carried from the configuration into every façade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub column_matching: ColumnMatching,
    pub rollback_without_transaction: RollbackWithoutTransaction,
    pub begin_mode: BeginMode,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// SQLite path, `:memory:` or `file:` URI
    pub connection_string: String,
    /// Default per-command timeout in milliseconds (0 disables it)
    pub command_timeout_ms: u64,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Enforce foreign keys on every new connection
    pub foreign_keys: bool,
    pub begin_mode: BeginMode,
    pub column_matching: ColumnMatching,
    pub rollback_without_transaction: RollbackWithoutTransaction,
    /// Named command bodies reachable through `CommandKind::StoredProcedure`
    pub procedures: ProcedureCatalog,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            foreign_keys: true,
            begin_mode: BeginMode::default(),
            column_matching: ColumnMatching::default(),
            rollback_without_transaction: RollbackWithoutTransaction::default(),
            procedures: ProcedureCatalog::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new configuration for the given connection string
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from a JSON document; absent fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration can be used to open connections
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(DatabaseError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }
        if let Some(name) = self.procedures.names().find(|name| name.trim().is_empty()) {
            return Err(DatabaseError::config(format!(
                "procedure name {:?} is blank",
                name
            )));
        }
        Ok(())
    }

    /// Set the default command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable foreign key enforcement
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the `BEGIN` mode
    pub fn with_begin_mode(mut self, mode: BeginMode) -> Self {
        self.begin_mode = mode;
        self
    }

    /// Set column name matching
    pub fn with_column_matching(mut self, matching: ColumnMatching) -> Self {
        self.column_matching = matching;
        self
    }

    /// Set the policy for rollback requests without a transaction
    pub fn with_rollback_without_transaction(mut self, policy: RollbackWithoutTransaction) -> Self {
        self.rollback_without_transaction = policy;
        self
    }

    /// Register a stored procedure body
    pub fn with_procedure(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.procedures.register(name, body);
        self
    }

    /// Default command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Busy timeout
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Session behaviour derived from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            column_matching: self.column_matching,
            rollback_without_transaction: self.rollback_without_transaction,
            begin_mode: self.begin_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("app.db");
        assert_eq!(config.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.busy_timeout(), DEFAULT_BUSY_TIMEOUT);
        assert!(config.foreign_keys);
        assert_eq!(config.column_matching, ColumnMatching::CaseInsensitive);
        assert_eq!(
            config.rollback_without_transaction,
            RollbackWithoutTransaction::Ignore
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::new(":memory:")
            .with_command_timeout(Duration::from_millis(250))
            .with_begin_mode(BeginMode::Immediate)
            .with_column_matching(ColumnMatching::CaseSensitive)
            .with_rollback_without_transaction(RollbackWithoutTransaction::Error)
            .with_procedure("list_users", "SELECT * FROM users");

        assert_eq!(config.command_timeout_ms, 250);
        assert_eq!(config.begin_mode.begin_sql(), "BEGIN IMMEDIATE");
        assert_eq!(
            config.procedures.get("list_users"),
            Some("SELECT * FROM users")
        );

        let options = config.session_options();
        assert_eq!(options.column_matching, ColumnMatching::CaseSensitive);
        assert_eq!(
            options.rollback_without_transaction,
            RollbackWithoutTransaction::Error
        );
    }

    #[test]
    fn test_from_json_fills_defaults() -> Result<()> {
        let config = ConnectionConfig::from_json(
            r#"{
                "connection_string": "data/app.db",
                "command_timeout_ms": 1000,
                "column_matching": "case_sensitive",
                "procedures": { "count_users": "SELECT COUNT(*) FROM users" }
            }"#,
        )?;

        assert_eq!(config.connection_string, "data/app.db");
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
        assert_eq!(config.busy_timeout(), DEFAULT_BUSY_TIMEOUT);
        assert_eq!(config.column_matching, ColumnMatching::CaseSensitive);
        assert!(config.procedures.contains("count_users"));
        Ok(())
    }

    #[test]
    fn test_validation() {
        let err = ConnectionConfig::from_json(r#"{ "command_timeout_ms": 5 }"#).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidConnectionString(_)));

        let err = ConnectionConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, DatabaseError::ConfigParse(_)));
    }
}
