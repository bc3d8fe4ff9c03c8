//! Mutation orchestration: the ledger service and per-series locking.

pub mod ledger;
pub mod locks;

pub use ledger::{CreateTransactionInput, LedgerError, LedgerService, TransactionPatch};
pub use locks::SeriesLocks;
