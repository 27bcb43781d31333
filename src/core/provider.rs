//! Physical connections and transaction scopes from a configuration

use super::config::ConnectionConfig;
use super::connection::ScopedConnection;
use super::error::{DatabaseError, Result};
use super::executor::CommandExecutor;
use super::procedure::ProcedureCatalog;
use super::transaction::TransactionScope;
use crate::backends::sqlite::open_connection;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Entry point: opens connections and begins transactions.
///
/// Holds nothing but the configuration; every call opens a new physical
/// connection.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    config: ConnectionConfig,
    procedures: Arc<ProcedureCatalog>,
}

impl ConnectionProvider {
    /// Create a provider with default settings
    ///
    /// # Errors
    ///
    /// Returns `InvalidConnectionString` if the string is empty.
    pub fn new(connection_string: impl Into<String>) -> Result<Self> {
        Self::with_config(ConnectionConfig::new(connection_string))
    }

    /// Create a provider from a full configuration
    ///
    /// # Errors
    ///
    /// Returns the validation error of the configuration.
    pub fn with_config(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let procedures = Arc::new(config.procedures.clone());
        Ok(Self { config, procedures })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a physical connection with the configured session pragmas
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the database cannot be opened.
    pub fn connect(&self) -> Result<Connection> {
        let conn = open_connection(&self.config).map_err(|e| {
            DatabaseError::connection(format!(
                "cannot open {}: {}",
                self.config.connection_string, e
            ))
        })?;
        debug!(
            connection_string = %self.config.connection_string,
            "connection opened"
        );
        Ok(conn)
    }

    /// Open a connection and begin a transaction on it.
    ///
    /// `timeout` is the default timeout of commands built in the scope; the
    /// configured command timeout applies when it is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` or `TransactionStart`.
    pub fn begin_transaction(&self, timeout: Option<Duration>) -> Result<TransactionScope> {
        let conn = self.connect()?;
        TransactionScope::begin(
            conn,
            timeout.unwrap_or_else(|| self.config.command_timeout()),
            self.config.session_options(),
        )
    }

    /// A façade over a connection the caller owns, outside any transaction
    pub fn untransacted<'c>(&self, conn: &'c Connection) -> ScopedConnection<'c> {
        ScopedConnection::untransacted(conn, self.config.command_timeout(), self.config.session_options())
    }

    /// An executor resolving this configuration's stored procedures
    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(Arc::clone(&self.procedures))
    }
}
