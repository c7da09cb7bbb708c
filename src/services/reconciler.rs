//! Read side: rebuilds product snapshots and history from ledger reads.
//!
//! Every dashboard used to run its own "enumerate 1..count, read three
//! records, filter by stage" loop. They now all go through
//! [`LedgerReconciler::list_products`] with a [`ProductFilter`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    Actors, Address, EventKind, FeeComponents, HistoryOrder, LifecycleStage, Location, Product,
    Role, TransactionEvent,
};
use crate::ports::{
    EventQuery, Ledger, LedgerError, LedgerResult, ProductActors, ProductBasicInfo, ProductFees,
    RawEvent,
};
use crate::validation::ValidationError;

pub use crate::domain::{compute_total_fee, compute_transport_fee};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// `None` accepts every stage.
    pub stages: Option<Vec<LifecycleStage>>,
    /// Restrict to products created by this farmer.
    pub farmer: Option<Address>,
}

impl ProductFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn stage(stage: LifecycleStage) -> Self {
        Self::stages([stage])
    }

    pub fn stages(stages: impl IntoIterator<Item = LifecycleStage>) -> Self {
        Self {
            stages: Some(stages.into_iter().collect()),
            farmer: None,
        }
    }

    /// Retailer-held and sold goods, as the marketplace lists them.
    pub fn marketplace() -> Self {
        Self::stages([LifecycleStage::WithRetailer, LifecycleStage::Sold])
    }

    /// The "available work" view of a role. Farmers get their own products,
    /// so the farmer view fails without the caller's account.
    pub fn for_role(role: Role, account: Option<&Address>) -> Result<Self, ValidationError> {
        match (role.expected_stage(), role) {
            (Some(stage), _) => Ok(Self::stage(stage)),
            (None, Role::Farmer) => account
                .map(|farmer| Self::any().owned_by(farmer.clone()))
                .ok_or_else(|| {
                    ValidationError::new("farmer", "farmer view requires an account address")
                }),
            (None, _) => Ok(Self::any()),
        }
    }

    pub fn owned_by(mut self, farmer: Address) -> Self {
        self.farmer = Some(farmer);
        self
    }

    pub fn matches_stage(&self, stage: LifecycleStage) -> bool {
        self.stages
            .as_ref()
            .map_or(true, |stages| stages.contains(&stage))
    }

    fn matches_farmer(&self, actors: &Actors) -> bool {
        match &self.farmer {
            Some(farmer) => actors.farmer.as_ref() == Some(farmer),
            None => true,
        }
    }
}

pub struct LedgerReconciler {
    ledger: Arc<dyn Ledger>,
}

impl LedgerReconciler {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Current valid products matching `filter`, ordered by id.
    ///
    /// A product whose reads fail is logged and left out; only a failure to
    /// read the product counter fails the call.
    pub async fn list_products(&self, filter: &ProductFilter) -> LedgerResult<Vec<Product>> {
        let count = self.ledger.product_count().await?;
        let mut products = Vec::new();

        for id in 1..=count {
            match self.load_product(id, filter).await {
                Ok(Some(product)) => products.push(product),
                Ok(None) => {}
                Err(e) => warn!(product_id = id, error = %e, "Skipping unreadable product"),
            }
        }

        debug!(count, matched = products.len(), "Reconciled product list");
        Ok(products)
    }

    pub async fn get_product(&self, id: u64) -> LedgerResult<Product> {
        self.load_product(id, &ProductFilter::any())
            .await?
            .ok_or(LedgerError::ProductNotFound(id))
    }

    async fn load_product(&self, id: u64, filter: &ProductFilter) -> LedgerResult<Option<Product>> {
        let basic = self.ledger.product_basic_info(id).await?;
        if !basic.is_valid {
            return Ok(None);
        }
        let stage = stage_of(&basic)?;
        if !filter.matches_stage(stage) {
            return Ok(None);
        }

        let fees = self.ledger.product_fees(id).await?;
        let actors = self.ledger.product_actors(id).await?;

        let product = assemble(basic, stage, fees, actors);
        if !filter.matches_farmer(&product.actors) {
            return Ok(None);
        }
        Ok(Some(product))
    }

    /// State changes and payments, for one product or the whole ledger.
    pub async fn fetch_history(
        &self,
        product_id: Option<u64>,
        order: HistoryOrder,
    ) -> LedgerResult<Vec<TransactionEvent>> {
        let mut raw = Vec::new();
        for kind in [EventKind::StateChanged, EventKind::PaymentProcessed] {
            let query = EventQuery::of_kind(kind).for_product(product_id);
            raw.extend(self.ledger.past_events(&query).await?);
        }

        let mut timestamps = HashMap::new();
        let mut events = Vec::with_capacity(raw.len());
        for event in raw {
            let timestamp = match timestamps.get(&event.block_number) {
                Some(cached) => *cached,
                None => {
                    let resolved = match self.ledger.block_timestamp(event.block_number).await {
                        Ok(ts) => Some(ts),
                        Err(e) => {
                            warn!(
                                block_number = event.block_number,
                                error = %e,
                                "Could not resolve block timestamp"
                            );
                            None
                        }
                    };
                    timestamps.insert(event.block_number, resolved);
                    resolved
                }
            };
            events.push(to_transaction_event(event, timestamp));
        }

        events.sort_by_key(|e| (e.block_number, e.log_index));
        if order == HistoryOrder::NewestFirst {
            events.reverse();
        }
        Ok(events)
    }
}

fn stage_of(basic: &ProductBasicInfo) -> LedgerResult<LifecycleStage> {
    LifecycleStage::from_ordinal(basic.state).ok_or_else(|| {
        LedgerError::InvalidResponse(format!(
            "product {} has unknown state {}",
            basic.id, basic.state
        ))
    })
}

fn assemble(
    basic: ProductBasicInfo,
    stage: LifecycleStage,
    fees: ProductFees,
    actors: ProductActors,
) -> Product {
    let location = (stage >= LifecycleStage::CollectedByCollector).then(|| Location {
        district: basic.district,
        local_body: basic.local_body,
        distance_km: basic.distance,
    });

    Product {
        id: basic.id,
        name: basic.name,
        base_price: basic.base_price.to_display(),
        stage,
        fees: FeeComponents {
            collector_fee: fees.collector_fee.to_display(),
            transporter_fee: fees.transporter_fee.to_display(),
            distributor_fee: fees.distributor_fee.to_display(),
            retailer_fee: fees.retailer_fee.to_display(),
        },
        location,
        actors: Actors {
            farmer: Address::from_wire(&actors.farmer),
            collector: Address::from_wire(&actors.collector),
            transporter: Address::from_wire(&actors.transporter),
            distributor: Address::from_wire(&actors.distributor),
            retailer: Address::from_wire(&actors.retailer),
            consumer: Address::from_wire(&actors.consumer),
        },
    }
}

fn to_transaction_event(
    raw: RawEvent,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
) -> TransactionEvent {
    TransactionEvent {
        transaction_hash: raw.transaction_hash,
        block_number: raw.block_number,
        log_index: raw.log_index,
        kind: raw.event,
        product_id: raw.product_id,
        from: raw.from.as_deref().and_then(Address::from_wire),
        to: raw.to.as_deref().and_then(Address::from_wire),
        amount: raw.amount.map(|amount| amount.to_display()),
        resulting_state: raw.new_state.and_then(LifecycleStage::from_ordinal),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(suffix: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", suffix)).unwrap()
    }

    #[test]
    fn role_filters_follow_predecessor_stage() {
        assert_eq!(
            ProductFilter::for_role(Role::Distributor, None).unwrap(),
            ProductFilter::stage(LifecycleStage::WithTransporter)
        );

        let farmer = address("f1");
        let own = ProductFilter::for_role(Role::Farmer, Some(&farmer)).unwrap();
        assert_eq!(own.farmer, Some(farmer));
        assert!(own.matches_stage(LifecycleStage::Sold));

        assert_eq!(
            ProductFilter::for_role(Role::Admin, None).unwrap(),
            ProductFilter::any()
        );
    }

    #[test]
    fn farmer_view_needs_an_account() {
        let err = ProductFilter::for_role(Role::Farmer, None).unwrap_err();
        assert_eq!(err.field, "farmer");
    }

    #[test]
    fn marketplace_shows_retail_and_sold() {
        let filter = ProductFilter::marketplace();
        assert!(filter.matches_stage(LifecycleStage::WithRetailer));
        assert!(filter.matches_stage(LifecycleStage::Sold));
        assert!(!filter.matches_stage(LifecycleStage::WithDistributor));
    }

    #[test]
    fn location_only_exists_after_collection() {
        let basic = ProductBasicInfo {
            id: 1,
            name: "Rice".into(),
            base_price: crate::domain::Wei(1),
            state: 0,
            is_valid: true,
            district: String::new(),
            local_body: String::new(),
            distance: 0,
        };
        let product = assemble(
            basic.clone(),
            LifecycleStage::Created,
            ProductFees::default(),
            ProductActors::default(),
        );
        assert!(product.location.is_none());
        assert!(product.actors.farmer.is_none());

        let collected = assemble(
            ProductBasicInfo {
                district: "Kailali".into(),
                distance: 120,
                ..basic
            },
            LifecycleStage::CollectedByCollector,
            ProductFees::default(),
            ProductActors::default(),
        );
        assert_eq!(collected.location.unwrap().distance_km, 120);
    }
}
