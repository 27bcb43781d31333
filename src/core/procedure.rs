//! Stored procedure catalog
//!
//! SQLite has no server-side procedures, so a procedure is a named command
//! body registered up front. Bodies may hold several statements; each
//! statement with a projection becomes one result batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named command bodies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureCatalog {
    procedures: BTreeMap<String, String>,
}

impl ProcedureCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a procedure body
    pub fn register(&mut self, name: impl Into<String>, body: impl Into<String>) -> &mut Self {
        self.procedures.insert(name.into(), body.into());
        self
    }

    /// Body of the named procedure
    pub fn get(&self, name: &str) -> Option<&str> {
        self.procedures.get(name).map(String::as_str)
    }

    /// Whether a procedure is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = ProcedureCatalog::new();
        catalog
            .register("b_proc", "SELECT 2")
            .register("a_proc", "SELECT 1");

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("a_proc"), Some("SELECT 1"));
        assert_eq!(catalog.get("A_PROC"), None);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["a_proc", "b_proc"]);

        catalog.register("a_proc", "SELECT 3");
        assert_eq!(catalog.get("a_proc"), Some("SELECT 3"));
        assert_eq!(catalog.len(), 2);
    }
}
