//! Product snapshot as reconstructed from the ledger.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::Address;

/// Kilometres covered by one currency unit of transport fee.
pub const TRANSPORT_KM_PER_UNIT: i64 = 100;

/// Position of a product in the supply chain. Declaration order is ledger
/// ordinal order, so `Ord` follows the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleStage {
    Created,
    CollectedByCollector,
    WithTransporter,
    WithDistributor,
    WithRetailer,
    Sold,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 6] = [
        LifecycleStage::Created,
        LifecycleStage::CollectedByCollector,
        LifecycleStage::WithTransporter,
        LifecycleStage::WithDistributor,
        LifecycleStage::WithRetailer,
        LifecycleStage::Sold,
    ];

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// Stages only ever advance by one step.
    pub fn can_transition_to(self, next: LifecycleStage) -> bool {
        self.next() == Some(next)
    }

    pub fn label(self) -> &'static str {
        match self {
            LifecycleStage::Created => "Created",
            LifecycleStage::CollectedByCollector => "Collected",
            LifecycleStage::WithTransporter => "In Transit",
            LifecycleStage::WithDistributor => "With Distributor",
            LifecycleStage::WithRetailer => "With Retailer",
            LifecycleStage::Sold => "Sold",
        }
    }

    fn name(self) -> &'static str {
        match self {
            LifecycleStage::Created => "Created",
            LifecycleStage::CollectedByCollector => "CollectedByCollector",
            LifecycleStage::WithTransporter => "WithTransporter",
            LifecycleStage::WithDistributor => "WithDistributor",
            LifecycleStage::WithRetailer => "WithRetailer",
            LifecycleStage::Sold => "Sold",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleStage {
    type Err = String;

    /// Accepts the stage name in any case (`with_retailer` too) or its ordinal.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        if let Ok(ordinal) = wanted.parse::<u8>() {
            return Self::from_ordinal(ordinal).ok_or_else(|| format!("unknown stage {}", ordinal));
        }

        let squashed = wanted.replace(['_', '-', ' '], "");
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(&squashed))
            .ok_or_else(|| format!("unknown stage '{}'", wanted))
    }
}

/// The four per-stage fees. Values for stages not yet reached are zero on the
/// ledger; use [`Product::known_fees`] to get only the ones that are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeComponents {
    pub collector_fee: BigDecimal,
    pub transporter_fee: BigDecimal,
    pub distributor_fee: BigDecimal,
    pub retailer_fee: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub district: String,
    pub local_body: String,
    pub distance_km: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actors {
    pub farmer: Option<Address>,
    pub collector: Option<Address>,
    pub transporter: Option<Address>,
    pub distributor: Option<Address>,
    pub retailer: Option<Address>,
    pub consumer: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub base_price: BigDecimal,
    pub stage: LifecycleStage,
    pub fees: FeeComponents,
    pub location: Option<Location>,
    pub actors: Actors,
}

impl Product {
    /// Fee components whose setting stage has been reached, in pipeline order.
    pub fn known_fees(&self) -> Vec<BigDecimal> {
        [
            (LifecycleStage::CollectedByCollector, &self.fees.collector_fee),
            (LifecycleStage::WithTransporter, &self.fees.transporter_fee),
            (LifecycleStage::WithDistributor, &self.fees.distributor_fee),
            (LifecycleStage::WithRetailer, &self.fees.retailer_fee),
        ]
        .into_iter()
        .filter(|(set_at, _)| self.stage >= *set_at)
        .map(|(_, fee)| fee.clone())
        .collect()
    }

    pub fn total_fee(&self) -> BigDecimal {
        compute_total_fee(&self.known_fees())
    }

    /// Base price plus all four fees; only defined once the retailer has set
    /// the last one.
    pub fn total_price(&self) -> Option<BigDecimal> {
        if self.stage < LifecycleStage::WithRetailer {
            return None;
        }
        Some(self.base_price.clone() + self.total_fee())
    }

    /// The amount the next actor pays forward to move this product on: the
    /// fee set at the current stage (the base price for a fresh product).
    pub fn forward_payment(&self) -> Option<BigDecimal> {
        match self.stage {
            LifecycleStage::Created => Some(self.base_price.clone()),
            LifecycleStage::CollectedByCollector => Some(self.fees.collector_fee.clone()),
            LifecycleStage::WithTransporter => Some(self.fees.transporter_fee.clone()),
            LifecycleStage::WithDistributor => Some(self.fees.distributor_fee.clone()),
            LifecycleStage::WithRetailer => Some(self.fees.retailer_fee.clone()),
            LifecycleStage::Sold => None,
        }
    }
}

/// Transport is charged at one currency unit per 100 km, exactly.
pub fn compute_transport_fee(distance_km: u64) -> BigDecimal {
    BigDecimal::new(BigInt::from(distance_km), 2)
}

pub fn compute_total_fee(components: &[BigDecimal]) -> BigDecimal {
    components
        .iter()
        .cloned()
        .fold(BigDecimal::from(0), |acc, fee| acc + fee)
}
