//! Database transport
//!
//! Glue between the core types and the physical driver. SQLite through
//! `rusqlite` is the only transport.

pub(crate) mod sqlite;
