//! Two-tier role lookup: roles the ledger reports, patched by local overrides.
//!
//! Overrides live in a JSON file and are never written back to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{Address, Role};
use crate::ports::{EventQuery, Ledger, LedgerError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum RoleError {
    #[error("Role override store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Role override store is malformed: {0}")]
    Format(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleOverride {
    pub address: Address,
    pub role: Role,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Ledger,
    LocalOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAssignment {
    pub address: Address,
    pub role: Role,
    pub source: RoleSource,
}

/// Overrides persisted as a JSON array. A missing file is an empty store.
pub struct RoleOverrideStore {
    path: PathBuf,
    cache: RwLock<Option<Vec<RoleOverride>>>,
}

impl RoleOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub async fn load(&self) -> Result<Vec<RoleOverride>, RoleError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let overrides = match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<RoleOverride>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %self.path.display(), count = overrides.len(), "Loaded role overrides");

        *self.cache.write().await = Some(overrides.clone());
        Ok(overrides)
    }

    async fn save(&self, overrides: Vec<RoleOverride>) -> Result<(), RoleError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&overrides)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).await?;
        fs::rename(&staging, &self.path).await?;

        *self.cache.write().await = Some(overrides);
        Ok(())
    }

    /// Replaces any earlier override for the same address.
    pub async fn upsert(&self, entry: RoleOverride) -> Result<(), RoleError> {
        let mut overrides = self.load().await?;
        overrides.retain(|o| o.address != entry.address);
        overrides.push(entry);
        self.save(overrides).await
    }

    /// Returns whether an override was removed.
    pub async fn remove(&self, address: &Address) -> Result<bool, RoleError> {
        let mut overrides = self.load().await?;
        let before = overrides.len();
        overrides.retain(|o| &o.address != address);
        if overrides.len() == before {
            return Ok(false);
        }
        self.save(overrides).await?;
        Ok(true)
    }
}

pub struct RoleDirectory {
    ledger: Arc<dyn Ledger>,
    store: Arc<RoleOverrideStore>,
}

impl RoleDirectory {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<RoleOverrideStore>) -> Self {
        Self { ledger, store }
    }

    /// Roles the ledger holds for every account that ever sent a product
    /// transaction. Accounts without a role, or with one we do not know, are
    /// left out.
    pub async fn ledger_roles(&self) -> Result<Vec<(Address, Role)>, RoleError> {
        let events = self.ledger.past_events(&EventQuery::all()).await?;
        let senders: BTreeSet<Address> = events
            .iter()
            .filter_map(|event| event.from.as_deref().and_then(Address::from_wire))
            .collect();

        let mut roles = Vec::with_capacity(senders.len());
        for address in senders {
            let raw = self.ledger.user_role(&address).await?;
            if raw.trim().is_empty() {
                continue;
            }
            match raw.parse::<Role>() {
                Ok(role) => roles.push((address, role)),
                Err(e) => {
                    warn!(address = %address, error = %e, "Ignoring unrecognised ledger role")
                }
            }
        }
        Ok(roles)
    }

    pub async fn list_users(&self) -> Result<Vec<RoleAssignment>, RoleError> {
        let ledger = self.ledger_roles().await?;
        let overrides = self.store.load().await?;
        Ok(merge_roles(&ledger, &overrides))
    }

    pub async fn set_override(&self, address: &str, role: &str) -> Result<RoleOverride, RoleError> {
        let address = Address::parse(address)?;
        let role = role
            .parse::<Role>()
            .map_err(|message| ValidationError::new("role", message))?;

        let entry = RoleOverride {
            address,
            role,
            modified_at: Utc::now(),
        };
        self.store.upsert(entry.clone()).await?;
        info!(address = %entry.address, role = %entry.role, "Role override saved");
        Ok(entry)
    }

    pub async fn clear_override(&self, address: &str) -> Result<bool, RoleError> {
        let address = Address::parse(address)?;
        let removed = self.store.remove(&address).await?;
        if removed {
            info!(address = %address, "Role override cleared");
        }
        Ok(removed)
    }

    /// Override first, then the ledger. `None` when neither knows the account.
    pub async fn role_of(&self, address: &Address) -> Result<Option<Role>, RoleError> {
        let overrides = self.store.load().await?;
        if let Some(entry) = overrides.iter().find(|o| &o.address == address) {
            return Ok(Some(entry.role));
        }
        let raw = self.ledger.user_role(address).await?;
        Ok(raw.parse::<Role>().ok())
    }
}

/// Overrides replace the ledger role for their address; overrides for
/// accounts the ledger has not seen are added. Sorted by address.
pub fn merge_roles(ledger: &[(Address, Role)], overrides: &[RoleOverride]) -> Vec<RoleAssignment> {
    let mut merged: BTreeMap<Address, RoleAssignment> = ledger
        .iter()
        .map(|(address, role)| {
            (
                address.clone(),
                RoleAssignment {
                    address: address.clone(),
                    role: *role,
                    source: RoleSource::Ledger,
                },
            )
        })
        .collect();

    for entry in overrides {
        merged.insert(
            entry.address.clone(),
            RoleAssignment {
                address: entry.address.clone(),
                role: entry.role,
                source: RoleSource::LocalOverride,
            },
        );
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(suffix: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", suffix)).unwrap()
    }

    fn patch(suffix: &str, role: Role) -> RoleOverride {
        RoleOverride {
            address: address(suffix),
            role,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn overrides_replace_and_extend_ledger_roles() {
        let ledger = vec![(address("b2"), Role::Collector), (address("a1"), Role::Farmer)];
        let overrides = vec![patch("b2", Role::Transporter), patch("c3", Role::Retailer)];

        let merged = merge_roles(&ledger, &overrides);
        let summary: Vec<_> = merged
            .iter()
            .map(|a| (a.address.as_str().to_string(), a.role, a.source))
            .collect();

        assert_eq!(
            summary,
            vec![
                (address("a1").to_string(), Role::Farmer, RoleSource::Ledger),
                (address("b2").to_string(), Role::Transporter, RoleSource::LocalOverride),
                (address("c3").to_string(), Role::Retailer, RoleSource::LocalOverride),
            ]
        );
    }

    #[test]
    fn merge_without_overrides_is_ledger_view() {
        let ledger = vec![(address("a1"), Role::Consumer)];
        let merged = merge_roles(&ledger, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, RoleSource::Ledger);
    }

    #[tokio::test]
    async fn store_treats_missing_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RoleOverrideStore::new(dir.path().join("overrides.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_upsert_replaces_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("overrides.json");
        let store = RoleOverrideStore::new(&path);

        store.upsert(patch("a1", Role::Farmer)).await.unwrap();
        store.upsert(patch("a1", Role::Distributor)).await.unwrap();

        let reopened = RoleOverrideStore::new(&path);
        let overrides = reopened.load().await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].role, Role::Distributor);

        assert!(reopened.remove(&address("a1")).await.unwrap());
        assert!(!reopened.remove(&address("a1")).await.unwrap());
    }

    #[tokio::test]
    async fn store_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = RoleOverrideStore::new(&path);
        assert!(matches!(store.load().await, Err(RoleError::Format(_))));
    }
}
