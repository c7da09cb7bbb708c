//! Write side of the marketplace: pays for cart lines one at a time.
//!
//! Purchases are value-bearing transactions from a single account, so they
//! are never submitted concurrently and the run stops at the first failure.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{Address, Cart, Wei};
use crate::ports::{ContractCall, Ledger, LedgerResult, SendOptions, Signer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResult {
    pub success: bool,
    pub purchased_product_ids: Vec<u64>,
    pub message: String,
}

impl CheckoutResult {
    fn refused(message: &str) -> Self {
        Self {
            success: false,
            purchased_product_ids: Vec::new(),
            message: message.to_string(),
        }
    }
}

/// Clears the in-flight flag however checkout returns.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CheckoutSequencer {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn Signer>,
    in_flight: AtomicBool,
}

impl CheckoutSequencer {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn Signer>) -> Self {
        Self {
            ledger,
            signer,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Buys every line in cart order. Purchased lines leave the cart; on a
    /// failure the failing line and everything after it stay where they are.
    pub async fn checkout(&self, cart: &mut Cart) -> CheckoutResult {
        let Some(account) = self.signer.account() else {
            return CheckoutResult::refused("Wallet not connected");
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CheckoutResult::refused("Checkout already in progress");
        }
        let _in_flight = InFlight(&self.in_flight);

        if cart.is_empty() {
            return CheckoutResult::refused("Cart is empty");
        }

        let mut purchased = Vec::new();
        for product_id in cart.product_ids() {
            match self.purchase(product_id, &account).await {
                Ok(paid) => {
                    info!(
                        product_id,
                        retailer_fee = %paid.to_display(),
                        "Purchased product"
                    );
                    cart.remove_line(product_id);
                    purchased.push(product_id);
                }
                Err(e) => {
                    error!(product_id, error = %e, "Checkout aborted");
                    return CheckoutResult {
                        success: false,
                        purchased_product_ids: purchased,
                        message: format!("Checkout failed at product {}: {}", product_id, e),
                    };
                }
            }
        }

        CheckoutResult {
            message: format!(
                "Purchase completed successfully! Only retailer fees were paid. Product IDs: {}",
                purchased
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            success: true,
            purchased_product_ids: purchased,
        }
    }

    /// Pays exactly the retailer fee the ledger holds right now.
    async fn purchase(&self, product_id: u64, account: &Address) -> LedgerResult<Wei> {
        let fees = self.ledger.product_fees(product_id).await?;
        let options = SendOptions {
            from: account.clone(),
            value: fees.retailer_fee,
            gas: None,
        };
        self.ledger
            .submit(&ContractCall::PurchaseProduct { product_id }, &options)
            .await?;
        Ok(fees.retailer_fee)
    }
}
