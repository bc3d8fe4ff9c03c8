//! Security master record.

use crate::domain::{Currency, SecurityId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A listed instrument. Immutable once referenced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub id: SecurityId,
    pub symbol: String,
    pub name: String,
    /// Denominating currency of the security's prices.
    pub currency: Currency,
    #[serde(rename = "type")]
    pub kind: SecurityKind,
    pub exchange: Option<String>,
}

/// Instrument category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityKind {
    Stock,
    Etf,
    Bond,
    MutualFund,
}

impl SecurityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityKind::Stock => "stock",
            SecurityKind::Etf => "etf",
            SecurityKind::Bond => "bond",
            SecurityKind::MutualFund => "mutual-fund",
        }
    }
}

impl FromStr for SecurityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(SecurityKind::Stock),
            "etf" => Ok(SecurityKind::Etf),
            "bond" => Ok(SecurityKind::Bond),
            "mutual-fund" => Ok(SecurityKind::MutualFund),
            other => Err(format!("unknown security kind: {}", other)),
        }
    }
}

impl fmt::Display for SecurityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
