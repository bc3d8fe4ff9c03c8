//! SQLite persistence layer.
//!
//! This module provides:
//! - Database initialization and schema migrations
//! - SQLite pragma configuration
//! - The repository used by the ledger orchestrator and the API

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{NewAccount, NewSecurity, NewTransactionRow, PositionRow, Repository};
