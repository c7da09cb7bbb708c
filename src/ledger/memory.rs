//! In-process ledger that enforces the contract's stage order, role checks and
//! exact forward payments. Backs the test suite and the `demo` command.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::domain::{Address, EventKind, LifecycleStage, Role, Wei};
use crate::ports::{
    ContractCall, EventQuery, Ledger, LedgerError, LedgerResult, ProductActors, ProductBasicInfo,
    ProductFees, RawEvent, SendOptions, TxReceipt,
};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const GENESIS_TIMESTAMP: i64 = 1_700_000_000;
const BLOCK_TIME_SECS: i64 = 12;
const GAS_ESTIMATE: u64 = 51_000;

struct ProductRecord {
    info: ProductBasicInfo,
    fees: ProductFees,
    actors: ProductActors,
}

impl ProductRecord {
    fn stage(&self) -> LedgerResult<LifecycleStage> {
        LifecycleStage::from_ordinal(self.info.state).ok_or_else(|| {
            LedgerError::InvalidResponse(format!("unknown state {}", self.info.state))
        })
    }

    /// What the next actor owes, and to whom.
    fn forward_payment(&self, stage: LifecycleStage) -> Option<(Wei, &str)> {
        match stage {
            LifecycleStage::Created => Some((self.info.base_price, &self.actors.farmer)),
            LifecycleStage::CollectedByCollector => {
                Some((self.fees.collector_fee, &self.actors.collector))
            }
            LifecycleStage::WithTransporter => {
                Some((self.fees.transporter_fee, &self.actors.transporter))
            }
            LifecycleStage::WithDistributor => {
                Some((self.fees.distributor_fee, &self.actors.distributor))
            }
            LifecycleStage::WithRetailer => Some((self.fees.retailer_fee, &self.actors.retailer)),
            LifecycleStage::Sold => None,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    products: Vec<ProductRecord>,
    roles: HashMap<Address, Role>,
    events: Vec<RawEvent>,
    block_number: u64,
    submitted: Vec<(ContractCall, SendOptions)>,
    unreadable: HashSet<u64>,
    rejections: HashMap<u64, String>,
    missing_blocks: HashSet<u64>,
}

impl LedgerState {
    fn record(&self, id: u64) -> LedgerResult<&ProductRecord> {
        if self.unreadable.contains(&id) {
            return Err(LedgerError::Unavailable(format!(
                "read of product {} timed out",
                id
            )));
        }
        id.checked_sub(1)
            .and_then(|index| self.products.get(index as usize))
            .ok_or(LedgerError::ProductNotFound(id))
    }

    fn record_mut(&mut self, id: u64) -> LedgerResult<&mut ProductRecord> {
        id.checked_sub(1)
            .and_then(|index| self.products.get_mut(index as usize))
            .ok_or_else(|| LedgerError::Rejected(format!("Product {} does not exist", id)))
    }

    fn require_role(&self, caller: &Address, role: Role) -> LedgerResult<()> {
        match self.roles.get(caller) {
            Some(registered) if *registered == role => Ok(()),
            _ => Err(LedgerError::Rejected(format!(
                "Only {} can perform this action",
                role.as_str().to_lowercase()
            ))),
        }
    }

    fn mine(&mut self) -> TxReceipt {
        self.block_number += 1;
        TxReceipt {
            transaction_hash: format!("0x{:064x}", self.block_number),
            block_number: self.block_number,
        }
    }

    fn emit(
        &mut self,
        receipt: &TxReceipt,
        event: EventKind,
        product_id: u64,
        fields: EventFields,
    ) {
        let log_index = self
            .events
            .iter()
            .filter(|e| e.block_number == receipt.block_number)
            .count() as u64;
        self.events.push(RawEvent {
            transaction_hash: receipt.transaction_hash.clone(),
            block_number: receipt.block_number,
            log_index,
            event,
            product_id: Some(product_id),
            from: Some(fields.from),
            to: fields.to,
            amount: fields.amount,
            new_state: fields.new_state,
        });
    }

    /// Moves a product one stage forward on behalf of `role`, collecting the
    /// forward payment and letting `update` record the actor's own data.
    fn advance<F>(
        &mut self,
        id: u64,
        role: Role,
        options: &SendOptions,
        update: F,
    ) -> LedgerResult<TxReceipt>
    where
        F: FnOnce(&mut ProductRecord, String),
    {
        self.require_role(&options.from, role)?;
        let expected = role
            .expected_stage()
            .ok_or_else(|| LedgerError::Rejected(format!("{} cannot advance products", role)))?;

        let (payee, amount, next) = {
            let record = self.record_mut(id)?;
            if !record.info.is_valid {
                return Err(LedgerError::Rejected(format!("Product {} is not valid", id)));
            }
            let stage = record.stage()?;
            if stage != expected {
                return Err(LedgerError::Rejected(
                    "Product is not in the expected state".to_string(),
                ));
            }
            let (due, payee) = record
                .forward_payment(stage)
                .map(|(due, payee)| (due, payee.to_string()))
                .ok_or_else(|| LedgerError::Rejected("Product already sold".to_string()))?;
            if options.value != due {
                return Err(LedgerError::Rejected("Incorrect payment amount".to_string()));
            }
            let next = stage
                .next()
                .ok_or_else(|| LedgerError::Rejected("Product already sold".to_string()))?;

            update(record, options.from.to_string());
            record.info.state = next.ordinal();
            (payee, due, next)
        };

        let receipt = self.mine();
        self.emit(
            &receipt,
            EventKind::PaymentProcessed,
            id,
            EventFields {
                from: options.from.to_string(),
                to: Some(payee),
                amount: Some(amount),
                new_state: None,
            },
        );
        self.emit(
            &receipt,
            EventKind::StateChanged,
            id,
            EventFields {
                from: options.from.to_string(),
                to: None,
                amount: None,
                new_state: Some(next.ordinal()),
            },
        );
        Ok(receipt)
    }

    fn apply(&mut self, call: &ContractCall, options: &SendOptions) -> LedgerResult<TxReceipt> {
        match call {
            ContractCall::CreateProduct { name, base_price } => {
                self.require_role(&options.from, Role::Farmer)?;
                let id = self.products.len() as u64 + 1;
                self.products.push(ProductRecord {
                    info: ProductBasicInfo {
                        id,
                        name: name.clone(),
                        base_price: *base_price,
                        state: LifecycleStage::Created.ordinal(),
                        is_valid: true,
                        district: String::new(),
                        local_body: String::new(),
                        distance: 0,
                    },
                    fees: ProductFees::default(),
                    actors: ProductActors {
                        farmer: options.from.to_string(),
                        collector: ZERO_ADDRESS.to_string(),
                        transporter: ZERO_ADDRESS.to_string(),
                        distributor: ZERO_ADDRESS.to_string(),
                        retailer: ZERO_ADDRESS.to_string(),
                        consumer: ZERO_ADDRESS.to_string(),
                    },
                });
                let receipt = self.mine();
                self.emit(
                    &receipt,
                    EventKind::StateChanged,
                    id,
                    EventFields {
                        from: options.from.to_string(),
                        to: None,
                        amount: None,
                        new_state: Some(LifecycleStage::Created.ordinal()),
                    },
                );
                Ok(receipt)
            }
            ContractCall::CollectProduct {
                product_id,
                collector_fee,
                district,
                local_body,
                distance,
            } => self.advance(*product_id, Role::Collector, options, |record, caller| {
                record.fees.collector_fee = *collector_fee;
                record.info.district = district.clone();
                record.info.local_body = local_body.clone();
                record.info.distance = *distance;
                record.actors.collector = caller;
            }),
            ContractCall::TransportProduct {
                product_id,
                transporter_fee,
            } => self.advance(*product_id, Role::Transporter, options, |record, caller| {
                record.fees.transporter_fee = *transporter_fee;
                record.actors.transporter = caller;
            }),
            ContractCall::DistributeProduct {
                product_id,
                distributor_fee,
            } => self.advance(*product_id, Role::Distributor, options, |record, caller| {
                record.fees.distributor_fee = *distributor_fee;
                record.actors.distributor = caller;
            }),
            ContractCall::SendToRetailer {
                product_id,
                retailer_fee,
            } => self.advance(*product_id, Role::Retailer, options, |record, caller| {
                record.fees.retailer_fee = *retailer_fee;
                record.actors.retailer = caller;
            }),
            ContractCall::PurchaseProduct { product_id } => {
                if let Some(reason) = self.rejections.get(product_id) {
                    return Err(LedgerError::Rejected(reason.clone()));
                }
                self.advance(*product_id, Role::Consumer, options, |record, caller| {
                    record.actors.consumer = caller;
                })
            }
            ContractCall::RevertTransaction { product_id } => {
                self.require_role(&options.from, Role::Admin)?;
                let previous = {
                    let record = self.record_mut(*product_id)?;
                    let stage = record.stage()?;
                    let previous = LifecycleStage::ALL
                        .into_iter()
                        .find(|candidate| candidate.can_transition_to(stage))
                        .ok_or_else(|| {
                            LedgerError::Rejected("Nothing to revert".to_string())
                        })?;
                    record.info.state = previous.ordinal();
                    previous
                };
                let receipt = self.mine();
                self.emit(
                    &receipt,
                    EventKind::StateChanged,
                    *product_id,
                    EventFields {
                        from: options.from.to_string(),
                        to: None,
                        amount: None,
                        new_state: Some(previous.ordinal()),
                    },
                );
                Ok(receipt)
            }
        }
    }
}

struct EventFields {
    from: String,
    to: Option<String>,
    amount: Option<Wei>,
    new_state: Option<u8>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, address: &Address, role: Role) {
        self.state.lock().await.roles.insert(address.clone(), role);
    }

    /// Flags a product record invalid, as the contract does for withdrawn items.
    pub async fn invalidate(&self, id: u64) {
        if let Ok(record) = self.state.lock().await.record_mut(id) {
            record.info.is_valid = false;
        }
    }

    /// Makes every read of this product fail as if the node timed out.
    pub async fn make_unreadable(&self, id: u64) {
        self.state.lock().await.unreadable.insert(id);
    }

    pub async fn reject_purchases_of(&self, id: u64, reason: &str) {
        self.state
            .lock()
            .await
            .rejections
            .insert(id, reason.to_string());
    }

    /// Makes the block header for `block_number` unreadable.
    pub async fn forget_block(&self, block_number: u64) {
        self.state.lock().await.missing_blocks.insert(block_number);
    }

    /// Every write attempted so far, accepted or not, in submission order.
    pub async fn submitted(&self) -> Vec<(ContractCall, SendOptions)> {
        self.state.lock().await.submitted.clone()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn product_count(&self) -> LedgerResult<u64> {
        Ok(self.state.lock().await.products.len() as u64)
    }

    async fn product_basic_info(&self, id: u64) -> LedgerResult<ProductBasicInfo> {
        Ok(self.state.lock().await.record(id)?.info.clone())
    }

    async fn product_fees(&self, id: u64) -> LedgerResult<ProductFees> {
        Ok(self.state.lock().await.record(id)?.fees.clone())
    }

    async fn product_actors(&self, id: u64) -> LedgerResult<ProductActors> {
        Ok(self.state.lock().await.record(id)?.actors.clone())
    }

    async fn user_role(&self, address: &Address) -> LedgerResult<String> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .get(address)
            .map(|role| role.as_str().to_string())
            .unwrap_or_default())
    }

    async fn past_events(&self, query: &EventQuery) -> LedgerResult<Vec<RawEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|event| query.kind.map_or(true, |kind| event.event == kind))
            .filter(|event| query.product_id.map_or(true, |id| event.product_id == Some(id)))
            .filter(|event| event.block_number >= query.from_block)
            .filter(|event| query.to_block.map_or(true, |to| event.block_number <= to))
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_number: u64) -> LedgerResult<DateTime<Utc>> {
        let state = self.state.lock().await;
        if block_number > state.block_number || state.missing_blocks.contains(&block_number) {
            return Err(LedgerError::BlockNotFound(block_number));
        }
        Utc.timestamp_opt(
            GENESIS_TIMESTAMP + block_number as i64 * BLOCK_TIME_SECS,
            0,
        )
        .single()
        .ok_or(LedgerError::BlockNotFound(block_number))
    }

    async fn estimate_gas(&self, _call: &ContractCall, _from: &Address) -> LedgerResult<u64> {
        Ok(GAS_ESTIMATE)
    }

    async fn submit(&self, call: &ContractCall, options: &SendOptions) -> LedgerResult<TxReceipt> {
        let mut state = self.state.lock().await;
        state.submitted.push((call.clone(), options.clone()));
        state.apply(call, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(suffix: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", suffix)).unwrap()
    }

    fn send(from: &Address, value: u128) -> SendOptions {
        SendOptions {
            from: from.clone(),
            value: Wei(value),
            gas: None,
        }
    }

    #[tokio::test]
    async fn enforces_roles_stage_order_and_payment() {
        let ledger = InMemoryLedger::new();
        let farmer = address("f1");
        let collector = address("c1");
        ledger.register(&farmer, Role::Farmer).await;
        ledger.register(&collector, Role::Collector).await;

        ledger
            .submit(
                &ContractCall::CreateProduct {
                    name: "Rice".into(),
                    base_price: Wei(100),
                },
                &send(&farmer, 0),
            )
            .await
            .unwrap();

        let collect = ContractCall::CollectProduct {
            product_id: 1,
            collector_fee: Wei(20),
            district: "Kailali".into(),
            local_body: "Dhangadhi".into(),
            distance: 250,
        };

        let wrong_caller = ledger.submit(&collect, &send(&farmer, 100)).await;
        assert!(matches!(wrong_caller, Err(LedgerError::Rejected(_))));

        let underpaid = ledger.submit(&collect, &send(&collector, 99)).await;
        assert!(matches!(
            underpaid,
            Err(LedgerError::Rejected(ref m)) if m == "Incorrect payment amount"
        ));

        ledger.submit(&collect, &send(&collector, 100)).await.unwrap();
        let info = ledger.product_basic_info(1).await.unwrap();
        assert_eq!(info.state, LifecycleStage::CollectedByCollector.ordinal());
        assert_eq!(info.distance, 250);

        let again = ledger.submit(&collect, &send(&collector, 100)).await;
        assert!(matches!(again, Err(LedgerError::Rejected(_))));
        assert_eq!(ledger.submitted().await.len(), 5);
    }

    #[tokio::test]
    async fn emits_payment_and_state_events() {
        let ledger = InMemoryLedger::new();
        let farmer = address("f1");
        let collector = address("c1");
        ledger.register(&farmer, Role::Farmer).await;
        ledger.register(&collector, Role::Collector).await;

        ledger
            .submit(
                &ContractCall::CreateProduct {
                    name: "Wheat".into(),
                    base_price: Wei(10),
                },
                &send(&farmer, 0),
            )
            .await
            .unwrap();
        ledger
            .submit(
                &ContractCall::CollectProduct {
                    product_id: 1,
                    collector_fee: Wei(2),
                    district: "Jhapa".into(),
                    local_body: "Damak".into(),
                    distance: 40,
                },
                &send(&collector, 10),
            )
            .await
            .unwrap();

        let payments = ledger
            .past_events(&EventQuery::of_kind(EventKind::PaymentProcessed))
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, Some(Wei(10)));
        assert_eq!(payments[0].to.as_deref(), Some(farmer.as_str()));

        let all = ledger.past_events(&EventQuery::all()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(ledger.block_timestamp(2).await.is_ok());
        assert!(matches!(
            ledger.block_timestamp(99).await,
            Err(LedgerError::BlockNotFound(99))
        ));
    }
}
