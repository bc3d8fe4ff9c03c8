//! Investment account record.

use crate::domain::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
}

impl Account {
    /// Registered accounts exempt their sells from capital-gain reporting
    /// and from superficial-loss denial.
    pub fn is_registered(&self) -> bool {
        self.kind.is_registered()
    }
}

/// CRA registration kind of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    #[serde(rename = "non-registered")]
    NonRegistered,
    #[serde(rename = "TFSA")]
    Tfsa,
    #[serde(rename = "RRSP")]
    Rrsp,
    #[serde(rename = "RESP")]
    Resp,
    #[serde(rename = "LIRA")]
    Lira,
    #[serde(rename = "RRIF")]
    Rrif,
}

impl AccountKind {
    pub fn is_registered(&self) -> bool {
        !matches!(self, AccountKind::NonRegistered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::NonRegistered => "non-registered",
            AccountKind::Tfsa => "TFSA",
            AccountKind::Rrsp => "RRSP",
            AccountKind::Resp => "RESP",
            AccountKind::Lira => "LIRA",
            AccountKind::Rrif => "RRIF",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "non-registered" => Ok(AccountKind::NonRegistered),
            "TFSA" => Ok(AccountKind::Tfsa),
            "RRSP" => Ok(AccountKind::Rrsp),
            "RESP" => Ok(AccountKind::Resp),
            "LIRA" => Ok(AccountKind::Lira),
            "RRIF" => Ok(AccountKind::Rrif),
            other => Err(format!("unknown account kind: {}", other)),
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
