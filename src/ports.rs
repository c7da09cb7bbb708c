//! Boundaries to the outside world: the product ledger and the wallet that
//! authorises writes against it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Address, EventKind, Wei};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Product {0} not found")]
    ProductNotFound(u64),
    #[error("Block {0} not found")]
    BlockNotFound(u64),
    /// A reverted or refused write. The message is the ledger's own, verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid response from ledger: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl LedgerError {
    /// Errors that say the ledger itself is unreachable, as opposed to a
    /// well-formed answer we did not like.
    pub fn is_outage(&self) -> bool {
        matches!(
            self,
            LedgerError::Request(_)
                | LedgerError::Unavailable(_)
                | LedgerError::CircuitBreakerOpen(_)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// `getProductBasicInfo` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBasicInfo {
    pub id: u64,
    pub name: String,
    pub base_price: Wei,
    /// Stage ordinal, 0 (Created) to 5 (Sold).
    pub state: u8,
    pub is_valid: bool,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub local_body: String,
    #[serde(default)]
    pub distance: u64,
}

/// `getProductFees` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFees {
    pub collector_fee: Wei,
    pub transporter_fee: Wei,
    pub distributor_fee: Wei,
    pub retailer_fee: Wei,
}

/// `getProductActors` record. Unfilled slots hold the zero address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductActors {
    pub farmer: String,
    pub collector: String,
    pub transporter: String,
    pub distributor: String,
    pub retailer: String,
    pub consumer: String,
}

/// One entry of the contract's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub transaction_hash: String,
    pub block_number: u64,
    /// Position within the block. Ties on `block_number` are broken by it.
    #[serde(default)]
    pub log_index: u64,
    pub event: EventKind,
    #[serde(default)]
    pub product_id: Option<u64>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<Wei>,
    #[serde(default)]
    pub new_state: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// `None` asks for every event kind.
    pub kind: Option<EventKind>,
    pub product_id: Option<u64>,
    pub from_block: u64,
    /// `None` means the latest block.
    pub to_block: Option<u64>,
}

impl EventQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn for_product(mut self, product_id: Option<u64>) -> Self {
        self.product_id = product_id;
        self
    }
}

/// Contract methods this client writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum ContractCall {
    #[serde(rename_all = "camelCase")]
    CreateProduct { name: String, base_price: Wei },
    #[serde(rename_all = "camelCase")]
    CollectProduct {
        product_id: u64,
        collector_fee: Wei,
        district: String,
        local_body: String,
        distance: u64,
    },
    #[serde(rename_all = "camelCase")]
    TransportProduct { product_id: u64, transporter_fee: Wei },
    #[serde(rename_all = "camelCase")]
    DistributeProduct { product_id: u64, distributor_fee: Wei },
    #[serde(rename_all = "camelCase")]
    SendToRetailer { product_id: u64, retailer_fee: Wei },
    #[serde(rename_all = "camelCase")]
    PurchaseProduct { product_id: u64 },
    #[serde(rename_all = "camelCase")]
    RevertTransaction { product_id: u64 },
}

impl ContractCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            ContractCall::CreateProduct { .. } => "createProduct",
            ContractCall::CollectProduct { .. } => "collectProduct",
            ContractCall::TransportProduct { .. } => "transportProduct",
            ContractCall::DistributeProduct { .. } => "distributeProduct",
            ContractCall::SendToRetailer { .. } => "sendToRetailer",
            ContractCall::PurchaseProduct { .. } => "purchaseProduct",
            ContractCall::RevertTransaction { .. } => "revertTransaction",
        }
    }

    pub fn product_id(&self) -> Option<u64> {
        match self {
            ContractCall::CreateProduct { .. } => None,
            ContractCall::CollectProduct { product_id, .. }
            | ContractCall::TransportProduct { product_id, .. }
            | ContractCall::DistributeProduct { product_id, .. }
            | ContractCall::SendToRetailer { product_id, .. }
            | ContractCall::PurchaseProduct { product_id }
            | ContractCall::RevertTransaction { product_id } => Some(*product_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub from: Address,
    /// Value attached to the transaction.
    pub value: Wei,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Read and write access to the product ledger. Writes resolve once the
/// transaction is mined or rejected.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Running counter of created products; ids are `1..=count`.
    async fn product_count(&self) -> LedgerResult<u64>;

    async fn product_basic_info(&self, id: u64) -> LedgerResult<ProductBasicInfo>;

    async fn product_fees(&self, id: u64) -> LedgerResult<ProductFees>;

    async fn product_actors(&self, id: u64) -> LedgerResult<ProductActors>;

    /// Role string the ledger records for an address, empty when unregistered.
    async fn user_role(&self, address: &Address) -> LedgerResult<String>;

    async fn past_events(&self, query: &EventQuery) -> LedgerResult<Vec<RawEvent>>;

    async fn block_timestamp(&self, block_number: u64) -> LedgerResult<DateTime<Utc>>;

    async fn estimate_gas(&self, call: &ContractCall, from: &Address) -> LedgerResult<u64>;

    async fn submit(&self, call: &ContractCall, options: &SendOptions) -> LedgerResult<TxReceipt>;

    /// `"closed"` or `"open"` for ledgers behind a circuit breaker.
    fn circuit_state(&self) -> Option<String> {
        None
    }
}

/// Supplies the active account. Key material stays with the provider.
pub trait Signer: Send + Sync {
    fn account(&self) -> Option<Address>;
}
