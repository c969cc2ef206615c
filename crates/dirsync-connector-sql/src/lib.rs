//! # SQL Connector
//!
//! Extracts directory records by calling a stored procedure, then stages
//! the full result set in fixed-size batch files.
//!
//! Unlike the LDAP connector there is no server-side cursor: the procedure
//! is called once, the rows are materialized, and chunking happens on the
//! client.

pub mod config;
pub mod connector;

pub use config::SqlConfig;
pub use connector::{
    procedure_call_sql, PgConnectionFactory, SqlConnectionFactory, SqlConnector, SqlSession,
};
