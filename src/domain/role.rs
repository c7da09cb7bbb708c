use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::product::LifecycleStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Farmer,
    Collector,
    Transporter,
    Distributor,
    Retailer,
    Consumer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Farmer,
        Role::Collector,
        Role::Transporter,
        Role::Distributor,
        Role::Retailer,
        Role::Consumer,
        Role::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Farmer => "FARMER",
            Role::Collector => "COLLECTOR",
            Role::Transporter => "TRANSPORTER",
            Role::Distributor => "DISTRIBUTOR",
            Role::Retailer => "RETAILER",
            Role::Consumer => "CONSUMER",
            Role::Admin => "ADMIN",
        }
    }

    /// The stage a product must be in to show up as this role's available work.
    /// Farmers see their own products and admins see everything.
    pub fn expected_stage(self) -> Option<LifecycleStage> {
        match self {
            Role::Collector => Some(LifecycleStage::Created),
            Role::Transporter => Some(LifecycleStage::CollectedByCollector),
            Role::Distributor => Some(LifecycleStage::WithTransporter),
            Role::Retailer => Some(LifecycleStage::WithDistributor),
            Role::Consumer => Some(LifecycleStage::WithRetailer),
            Role::Farmer | Role::Admin => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown role '{}', expected one of: {}",
                    wanted,
                    Role::ALL.map(Role::as_str).join(", ")
                )
            })
    }
}
