pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fx;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Account, AccountId, AccountKind, Currency, Decimal, Security, SecurityId, SecurityKind,
    Transaction, TransactionId, TransactionType,
};
pub use error::AppError;
pub use orchestration::{CreateTransactionInput, LedgerService, TransactionPatch};
