use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Role, Wei};
use crate::ports::{ContractCall, Ledger, SendOptions, Signer, TxReceipt};
use crate::services::stage_actions::ActionError;

pub const DEFAULT_GAS_BUFFER_PERCENT: u64 = 20;

/// Marks the product being reverted; `0` means idle. Product ids start at 1.
struct Reverting<'a>(&'a AtomicU64);

impl Drop for Reverting<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

pub struct AdminService {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn Signer>,
    gas_buffer_percent: u64,
    reverting: AtomicU64,
}

impl AdminService {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn Signer>, gas_buffer_percent: u64) -> Self {
        Self {
            ledger,
            signer,
            gas_buffer_percent,
            reverting: AtomicU64::new(0),
        }
    }

    /// Product currently being reverted, if any.
    pub fn reverting(&self) -> Option<u64> {
        match self.reverting.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Steps a product back one stage. Only accounts the ledger itself
    /// records as admin may do this; local role overrides do not count.
    pub async fn revert(&self, product_id: u64) -> Result<TxReceipt, ActionError> {
        if product_id == 0 {
            return Err(ActionError::Guard("Please select a product first".to_string()));
        }
        let account = self
            .signer
            .account()
            .ok_or_else(|| ActionError::Guard("Wallet not connected".to_string()))?;

        let role = self.ledger.user_role(&account).await?;
        if role.parse::<Role>().ok() != Some(Role::Admin) {
            warn!(account = %account, role = %role, "Refusing revert from non-admin");
            return Err(ActionError::Guard(
                "Only admin can revert transactions".to_string(),
            ));
        }

        if self
            .reverting
            .compare_exchange(0, product_id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ActionError::Guard("A revert is already in progress".to_string()));
        }
        let _reverting = Reverting(&self.reverting);

        let call = ContractCall::RevertTransaction { product_id };
        let estimate = self.ledger.estimate_gas(&call, &account).await?;
        let gas = with_buffer(estimate, self.gas_buffer_percent);

        let options = SendOptions {
            from: account,
            value: Wei::ZERO,
            gas: Some(gas),
        };
        let receipt = self.ledger.submit(&call, &options).await?;

        info!(
            product_id,
            gas,
            tx = %receipt.transaction_hash,
            "Product reverted one stage"
        );
        Ok(receipt)
    }
}

fn with_buffer(estimate: u64, percent: u64) -> u64 {
    estimate.saturating_add(estimate.saturating_mul(percent) / 100)
}
