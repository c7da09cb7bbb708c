//! Role-specific writes that move a product one stage forward.
//!
//! Every action runs the same guard before touching the ledger: a product is
//! selected and sits at the right stage, the stage's inputs are filled in, and
//! a wallet is connected. The transaction value is always the fee of the
//! previous stage; the actor's own fee travels as a call argument.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::domain::{compute_transport_fee, Address, LifecycleStage, Product, Wei};
use crate::ports::{ContractCall, Ledger, LedgerError, SendOptions, Signer, TxReceipt};
use crate::validation::{
    parse_amount, parse_distance_km, validate_location_field, validate_product_name,
    ValidationError,
};

#[derive(Error, Debug)]
pub enum ActionError {
    /// A precondition failed; nothing was sent.
    #[error("{0}")]
    Guard(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ValidationError> for ActionError {
    fn from(err: ValidationError) -> Self {
        ActionError::Guard(err.to_string())
    }
}

/// Collector form. Fields are raw user input.
#[derive(Debug, Clone, Default)]
pub struct CollectForm {
    pub collector_fee: String,
    pub district: String,
    pub local_body: String,
    pub distance_km: String,
}

pub struct StageActions {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn Signer>,
}

impl StageActions {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn Signer>) -> Self {
        Self { ledger, signer }
    }

    pub async fn create_product(
        &self,
        name: &str,
        base_price: &str,
    ) -> Result<TxReceipt, ActionError> {
        let name = validate_product_name(name)?;
        let base_price = to_wei(&parse_amount("base_price", base_price)?)?;
        let account = self.account()?;

        self.send(
            ContractCall::CreateProduct { name, base_price },
            account,
            Wei::ZERO,
        )
        .await
    }

    pub async fn collect_product(
        &self,
        selected: Option<&Product>,
        form: &CollectForm,
    ) -> Result<TxReceipt, ActionError> {
        let product = require_stage(selected, LifecycleStage::Created)?;

        if [&form.district, &form.local_body, &form.distance_km]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(ActionError::Guard(
                "Please fill in all location details".to_string(),
            ));
        }
        let collector_fee = to_wei(&parse_amount("collector_fee", &form.collector_fee)?)?;
        let district = validate_location_field("district", &form.district)?;
        let local_body = validate_location_field("local_body", &form.local_body)?;
        let distance = parse_distance_km("distance", &form.distance_km)?;
        let value = to_wei(&product.base_price)?;
        let account = self.account()?;

        self.send(
            ContractCall::CollectProduct {
                product_id: product.id,
                collector_fee,
                district,
                local_body,
                distance,
            },
            account,
            value,
        )
        .await
    }

    /// The transporter does not name a price: the fee follows from the
    /// distance recorded at collection.
    pub async fn transport_product(
        &self,
        selected: Option<&Product>,
    ) -> Result<TxReceipt, ActionError> {
        let product = require_stage(selected, LifecycleStage::CollectedByCollector)?;
        let location = product.location.as_ref().ok_or_else(|| {
            ActionError::Guard("Product or transporter fee is not defined".to_string())
        })?;

        let transporter_fee = to_wei(&compute_transport_fee(location.distance_km))?;
        let value = to_wei(&product.fees.collector_fee)?;
        let account = self.account()?;

        self.send(
            ContractCall::TransportProduct {
                product_id: product.id,
                transporter_fee,
            },
            account,
            value,
        )
        .await
    }

    pub async fn distribute_product(
        &self,
        selected: Option<&Product>,
        distributor_fee: &str,
    ) -> Result<TxReceipt, ActionError> {
        let product = require_stage(selected, LifecycleStage::WithTransporter)?;
        let distributor_fee = to_wei(&parse_amount("distributor_fee", distributor_fee)?)?;
        let value = to_wei(&product.fees.transporter_fee)?;
        let account = self.account()?;

        self.send(
            ContractCall::DistributeProduct {
                product_id: product.id,
                distributor_fee,
            },
            account,
            value,
        )
        .await
    }

    pub async fn send_to_retailer(
        &self,
        selected: Option<&Product>,
        retailer_fee: &str,
    ) -> Result<TxReceipt, ActionError> {
        let product = require_stage(selected, LifecycleStage::WithDistributor)?;
        let retailer_fee = to_wei(&parse_amount("retailer_fee", retailer_fee)?)?;
        let value = to_wei(&product.fees.distributor_fee)?;
        let account = self.account()?;

        self.send(
            ContractCall::SendToRetailer {
                product_id: product.id,
                retailer_fee,
            },
            account,
            value,
        )
        .await
    }

    fn account(&self) -> Result<Address, ActionError> {
        self.signer
            .account()
            .ok_or_else(|| ActionError::Guard("Wallet not connected".to_string()))
    }

    async fn send(
        &self,
        call: ContractCall,
        from: Address,
        value: Wei,
    ) -> Result<TxReceipt, ActionError> {
        let options = SendOptions {
            from,
            value,
            gas: None,
        };
        let receipt = self.ledger.submit(&call, &options).await?;

        info!(
            method = call.method_name(),
            product_id = ?call.product_id(),
            tx = %receipt.transaction_hash,
            "Ledger transaction confirmed"
        );
        Ok(receipt)
    }
}

fn require_stage(
    selected: Option<&Product>,
    expected: LifecycleStage,
) -> Result<&Product, ActionError> {
    let product =
        selected.ok_or_else(|| ActionError::Guard("Please select a product first".to_string()))?;

    if product.stage != expected {
        return Err(ActionError::Guard(format!(
            "Product {} is {}, expected {}",
            product.id,
            product.stage.label(),
            expected.label()
        )));
    }
    Ok(product)
}

fn to_wei(amount: &bigdecimal::BigDecimal) -> Result<Wei, ActionError> {
    Wei::from_display(amount).map_err(|e| ActionError::Guard(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Actors, FeeComponents, Location};
    use crate::ledger::{ConfiguredAccount, InMemoryLedger};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dec(raw: &str) -> BigDecimal {
        BigDecimal::from_str(raw).unwrap()
    }

    fn product(stage: LifecycleStage) -> Product {
        Product {
            id: 1,
            name: "Rice".into(),
            base_price: dec("1.0"),
            stage,
            fees: FeeComponents::default(),
            location: None,
            actors: Actors::default(),
        }
    }

    fn actions(ledger: Arc<InMemoryLedger>) -> StageActions {
        let account = Address::parse("0x00000000000000000000000000000000000000c1").unwrap();
        StageActions::new(ledger, Arc::new(ConfiguredAccount::new(Some(account))))
    }

    fn filled_form() -> CollectForm {
        CollectForm {
            collector_fee: "0.2".into(),
            district: "Kailali".into(),
            local_body: "Dhangadhi".into(),
            distance_km: "250".into(),
        }
    }

    #[tokio::test]
    async fn guard_requires_selection() {
        let ledger = Arc::new(InMemoryLedger::new());
        let err = actions(ledger.clone())
            .collect_product(None, &filled_form())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Please select a product first");
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn guard_requires_location_details() {
        let ledger = Arc::new(InMemoryLedger::new());
        let form = CollectForm {
            local_body: "  ".into(),
            ..filled_form()
        };
        let err = actions(ledger.clone())
            .collect_product(Some(&product(LifecycleStage::Created)), &form)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Please fill in all location details");
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn guard_requires_fee() {
        let ledger = Arc::new(InMemoryLedger::new());
        let err = actions(ledger.clone())
            .distribute_product(Some(&product(LifecycleStage::WithTransporter)), "")
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Guard(_)));
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn guard_requires_matching_stage() {
        let ledger = Arc::new(InMemoryLedger::new());
        let err = actions(ledger.clone())
            .send_to_retailer(Some(&product(LifecycleStage::WithTransporter)), "0.05")
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Guard(_)));
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn guard_requires_wallet() {
        let ledger = Arc::new(InMemoryLedger::new());
        let actions =
            StageActions::new(ledger.clone(), Arc::new(ConfiguredAccount::disconnected()));
        let err = actions
            .create_product("Rice", "1.0")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Wallet not connected");
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn transport_fee_comes_from_distance() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut collected = product(LifecycleStage::CollectedByCollector);
        collected.fees.collector_fee = dec("0.2");
        collected.location = Some(Location {
            district: "Kailali".into(),
            local_body: "Dhangadhi".into(),
            distance_km: 250,
        });

        // Not registered as a transporter, so the ledger refuses; the call
        // itself is what we inspect.
        let err = actions(ledger.clone())
            .transport_product(Some(&collected))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Ledger(LedgerError::Rejected(_))));

        let submitted = ledger.submitted().await;
        assert_eq!(submitted.len(), 1);
        let (call, options) = &submitted[0];
        assert_eq!(
            call,
            &ContractCall::TransportProduct {
                product_id: 1,
                transporter_fee: Wei(2_500_000_000_000_000_000),
            }
        );
        assert_eq!(options.value, Wei(200_000_000_000_000_000));
    }

    #[tokio::test]
    async fn transport_without_location_is_refused() {
        let ledger = Arc::new(InMemoryLedger::new());
        let err = actions(ledger.clone())
            .transport_product(Some(&product(LifecycleStage::CollectedByCollector)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Product or transporter fee is not defined");
        assert!(ledger.submitted().await.is_empty());
    }
}
