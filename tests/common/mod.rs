#![allow(dead_code)]

use agrichain_core::domain::{Address, Role};
use agrichain_core::ledger::{ConfiguredAccount, InMemoryLedger};
use agrichain_core::ports::{Ledger, Signer};
use agrichain_core::services::{CollectForm, LedgerReconciler, StageActions};
use std::sync::Arc;

/// An in-memory ledger with one registered account per role.
pub struct Pipeline {
    pub ledger: Arc<InMemoryLedger>,
    pub reconciler: LedgerReconciler,
}

impl Pipeline {
    pub async fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        for role in Role::ALL {
            ledger.register(&Self::address_of(role), role).await;
        }
        Self {
            reconciler: LedgerReconciler::new(ledger.clone()),
            ledger,
        }
    }

    pub fn address_of(role: Role) -> Address {
        let index = Role::ALL.iter().position(|r| *r == role).unwrap() + 1;
        Address::parse(&format!("0x{:040x}", index)).unwrap()
    }

    pub fn signer(role: Role) -> Arc<dyn Signer> {
        Arc::new(ConfiguredAccount::new(Some(Self::address_of(role))))
    }

    pub fn actions(&self, role: Role) -> StageActions {
        StageActions::new(self.ledger.clone(), Self::signer(role))
    }

    pub async fn create(&self, name: &str, base_price: &str) -> u64 {
        self.actions(Role::Farmer)
            .create_product(name, base_price)
            .await
            .unwrap();
        self.ledger.product_count().await.unwrap()
    }

    pub async fn collect(&self, id: u64, fee: &str, distance_km: u64) {
        let product = self.reconciler.get_product(id).await.unwrap();
        let form = CollectForm {
            collector_fee: fee.to_string(),
            district: "Kailali".to_string(),
            local_body: "Dhangadhi".to_string(),
            distance_km: distance_km.to_string(),
        };
        self.actions(Role::Collector)
            .collect_product(Some(&product), &form)
            .await
            .unwrap();
    }

    pub async fn transport(&self, id: u64) {
        let product = self.reconciler.get_product(id).await.unwrap();
        self.actions(Role::Transporter)
            .transport_product(Some(&product))
            .await
            .unwrap();
    }

    pub async fn distribute(&self, id: u64, fee: &str) {
        let product = self.reconciler.get_product(id).await.unwrap();
        self.actions(Role::Distributor)
            .distribute_product(Some(&product), fee)
            .await
            .unwrap();
    }

    pub async fn send_to_retailer(&self, id: u64, fee: &str) {
        let product = self.reconciler.get_product(id).await.unwrap();
        self.actions(Role::Retailer)
            .send_to_retailer(Some(&product), fee)
            .await
            .unwrap();
    }

    /// The Rice walk-through: base 1.0, fees 0.2 / 0.1 / 0.15 / 0.05.
    pub async fn rice_on_shelf(&self) -> u64 {
        self.product_on_shelf("Rice", "1.0", "0.2", 10, "0.15", "0.05")
            .await
    }

    pub async fn product_on_shelf(
        &self,
        name: &str,
        base_price: &str,
        collector_fee: &str,
        distance_km: u64,
        distributor_fee: &str,
        retailer_fee: &str,
    ) -> u64 {
        let id = self.create(name, base_price).await;
        self.collect(id, collector_fee, distance_km).await;
        self.transport(id).await;
        self.distribute(id, distributor_fee).await;
        self.send_to_retailer(id, retailer_fee).await;
        id
    }
}
