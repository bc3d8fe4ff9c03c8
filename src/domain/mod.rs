//! Domain types for the ACB ledger.
//!
//! This module provides:
//! - Fixed-precision decimal arithmetic with the CRA rounding profiles
//! - Entity types: Security, Account, Transaction, audit trail
//! - The stable series-ordering key used for deterministic replay

pub mod account;
pub mod audit;
pub mod decimal;
pub mod ordering;
pub mod primitives;
pub mod security;
pub mod transaction;

pub use account::{Account, AccountKind};
pub use audit::{AuditStep, AuditTrail, SuperficialLossReview};
pub use decimal::{Decimal, DecimalError};
pub use ordering::{sort_series, SeriesOrderingKey};
pub use primitives::{AccountId, Currency, SecurityId, TimestampMs, TransactionId};
pub use security::{Security, SecurityKind};
pub use transaction::{Transaction, TransactionFlag, TransactionType};
