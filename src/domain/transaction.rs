//! The ledger row: one transaction on a (security, account) series.

use crate::domain::{
    AccountId, AuditTrail, Decimal, SecurityId, TimestampMs, TransactionId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eleven supported transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    Drip,
    Roc,
    Split,
    Consolidation,
    Merger,
    Spinoff,
    TransferIn,
    TransferOut,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
            TransactionType::Dividend => "dividend",
            TransactionType::Drip => "drip",
            TransactionType::Roc => "roc",
            TransactionType::Split => "split",
            TransactionType::Consolidation => "consolidation",
            TransactionType::Merger => "merger",
            TransactionType::Spinoff => "spinoff",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
        }
    }

    /// Whether the superficial-loss rule treats this as an acquiring event.
    /// Transfers are not counted.
    pub fn is_acquisition(&self) -> bool {
        matches!(self, TransactionType::Buy | TransactionType::Drip)
    }

    /// Types that dispose of shares and must satisfy `quantity <= shares`.
    pub fn is_disposition(&self) -> bool {
        matches!(self, TransactionType::Sell | TransactionType::TransferOut)
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            "dividend" => Ok(TransactionType::Dividend),
            "drip" => Ok(TransactionType::Drip),
            "roc" => Ok(TransactionType::Roc),
            "split" => Ok(TransactionType::Split),
            "consolidation" => Ok(TransactionType::Consolidation),
            "merger" => Ok(TransactionType::Merger),
            "spinoff" => Ok(TransactionType::Spinoff),
            "transfer_in" => Ok(TransactionType::TransferIn),
            "transfer_out" => Ok(TransactionType::TransferOut),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flags attached to a transaction after recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFlag {
    SuperficialLoss,
}

impl TransactionFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionFlag::SuperficialLoss => "superficial_loss",
        }
    }
}

impl FromStr for TransactionFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superficial_loss" => Ok(TransactionFlag::SuperficialLoss),
            other => Err(format!("unknown flag: {}", other)),
        }
    }
}

/// A persisted ledger transaction, snapshots included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub security_id: SecurityId,
    pub account_id: AccountId,
    /// Calendar date of the trade; no time-of-day component.
    pub trade_date: NaiveDate,
    /// Defaults to the trade date.
    pub settlement_date: NaiveDate,
    /// Insert instant; used only to break same-day ordering ties.
    pub created_at_ms: TimestampMs,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Non-negative in storage; the sign is implied by the type.
    pub quantity: Decimal,
    /// Per-share price in the security's denominating currency.
    pub price: Decimal,
    /// Fees in CAD.
    pub fees: Decimal,
    /// CAD per unit of the security's currency; 1 for CAD securities.
    pub fx_rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_per_share: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_per_share: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_security_acb_percent: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_security_id: Option<SecurityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub shares_before: Decimal,
    pub shares_after: Decimal,
    pub acb_before: Decimal,
    pub acb_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capital_gain: Option<Decimal>,
    pub flags: Vec<TransactionFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_details: Option<AuditTrail>,
}

impl Transaction {
    /// ACB per share after this transaction, display scale.
    pub fn acb_per_share(&self) -> Decimal {
        self.acb_after.safe_div(self.shares_after).round_per_share()
    }

    pub fn has_flag(&self, flag: TransactionFlag) -> bool {
        self.flags.contains(&flag)
    }
}
