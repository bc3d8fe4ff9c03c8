//! Calculation audit trail embedded in each transaction.
//!
//! Purely informational; the presentation layer renders it and the engine
//! must be able to reproduce it bit-for-bit from the stored inputs.

use crate::domain::{Decimal, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One computed intermediate, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStep {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Input labels to canonical decimal strings. BTreeMap keeps the
    /// serialized key order stable across runs.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub values: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl AuditStep {
    pub fn new(description: impl Into<String>) -> Self {
        AuditStep {
            description: description.into(),
            formula: None,
            values: BTreeMap::new(),
            result: None,
        }
    }

    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn value(mut self, label: impl Into<String>, value: Decimal) -> Self {
        self.values.insert(label.into(), value.to_canonical_string());
        self
    }

    pub fn result(mut self, result: Decimal) -> Self {
        self.result = Some(result.to_canonical_string());
        self
    }
}

/// Outcome of a superficial-loss review attached to a loss-producing sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperficialLossReview {
    pub is_superficial: bool,
    /// Denied amount, CAD, non-negative.
    pub loss_amount: Decimal,
    pub related_transaction_ids: Vec<TransactionId>,
    pub explanation: String,
    pub adjustment_required: String,
}

/// Typed calculation breakdown for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    /// Transaction type tag the breakdown belongs to.
    #[serde(rename = "type")]
    pub calc_type: String,
    pub steps: Vec<AuditStep>,
    /// One-sentence human synopsis.
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superficial_loss: Option<SuperficialLossReview>,
}

impl AuditTrail {
    pub fn new(calc_type: impl Into<String>) -> Self {
        AuditTrail {
            calc_type: calc_type.into(),
            steps: Vec::new(),
            summary: String::new(),
            superficial_loss: None,
        }
    }

    pub fn push(&mut self, step: AuditStep) {
        self.steps.push(step);
    }
}
