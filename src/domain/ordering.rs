//! Stable series ordering for deterministic replay.

use crate::domain::Transaction;
use chrono::NaiveDate;

/// Ordering key for transactions within one (security, account) series.
///
/// Trade date first, then creation instant, then id. A backdated insert gets
/// a fresh creation timestamp, so it sorts after previously existing rows on
/// the same date; the id key makes same-millisecond inserts deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesOrderingKey {
    pub trade_date: NaiveDate,
    pub created_at_ms: i64,
    pub id: i64,
}

impl SeriesOrderingKey {
    pub fn of(tx: &Transaction) -> Self {
        SeriesOrderingKey {
            trade_date: tx.trade_date,
            created_at_ms: tx.created_at_ms.as_i64(),
            id: tx.id.as_i64(),
        }
    }
}

/// Sort a series into replay order.
pub fn sort_series(transactions: &mut [Transaction]) {
    transactions.sort_by_key(SeriesOrderingKey::of);
}
