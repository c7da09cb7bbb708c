use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{Address, LifecycleStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ProductStateChanged")]
    StateChanged,
    #[serde(rename = "PaymentProcessed")]
    PaymentProcessed,
}

impl EventKind {
    /// Event name as emitted by the contract.
    pub fn ledger_name(self) -> &'static str {
        match self {
            EventKind::StateChanged => "ProductStateChanged",
            EventKind::PaymentProcessed => "PaymentProcessed",
        }
    }
}

/// History entry rebuilt from the ledger's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub kind: EventKind,
    pub product_id: Option<u64>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub amount: Option<BigDecimal>,
    pub resulting_state: Option<LifecycleStage>,
    /// `None` when the containing block could not be read.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    /// Per-product timelines.
    #[default]
    OldestFirst,
    /// Dashboard feeds.
    NewestFirst,
}

impl FromStr for HistoryOrder {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "oldest" | "oldest_first" => Ok(HistoryOrder::OldestFirst),
            "desc" | "newest" | "newest_first" => Ok(HistoryOrder::NewestFirst),
            other => Err(format!("unknown order '{}', expected asc or desc", other)),
        }
    }
}
