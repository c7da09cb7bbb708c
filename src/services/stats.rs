//! Activity counts for the admin overview, built from the history feed and
//! the merged user list.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Address, Role, TransactionEvent};
use crate::services::RoleAssignment;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub transactions_by_sender: BTreeMap<Address, usize>,
    /// Keyed by UTC calendar day. Events without a timestamp are not counted.
    pub transactions_by_day: BTreeMap<NaiveDate, usize>,
    pub users_by_role: BTreeMap<Role, usize>,
}

impl ActivityStats {
    pub fn summarize(events: &[TransactionEvent], users: &[RoleAssignment]) -> Self {
        let mut stats = Self::default();

        for event in events {
            if let Some(from) = &event.from {
                *stats.transactions_by_sender.entry(from.clone()).or_default() += 1;
            }
            if let Some(timestamp) = event.timestamp {
                *stats
                    .transactions_by_day
                    .entry(timestamp.date_naive())
                    .or_default() += 1;
            }
        }

        for user in users {
            *stats.users_by_role.entry(user.role).or_default() += 1;
        }

        stats
    }

    pub fn total_transactions(&self) -> usize {
        self.transactions_by_sender.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;
    use crate::services::RoleSource;
    use chrono::{TimeZone, Utc};

    fn address(suffix: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", suffix)).unwrap()
    }

    fn event(from: Option<&str>, timestamp: Option<i64>) -> TransactionEvent {
        TransactionEvent {
            transaction_hash: "0x01".to_string(),
            block_number: 1,
            log_index: 0,
            kind: EventKind::StateChanged,
            product_id: Some(1),
            from: from.map(address),
            to: None,
            amount: None,
            resulting_state: None,
            timestamp: timestamp.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }

    fn user(suffix: &str, role: Role) -> RoleAssignment {
        RoleAssignment {
            address: address(suffix),
            role,
            source: RoleSource::Ledger,
        }
    }

    #[test]
    fn counts_by_sender_and_utc_day() {
        // 2024-03-01T23:59:59Z, 2024-03-02T00:00:00Z
        let late = 1_709_337_599;
        let midnight = 1_709_337_600;
        let events = vec![
            event(Some("a1"), Some(late)),
            event(Some("a1"), Some(midnight)),
            event(Some("b2"), Some(midnight)),
            event(None, Some(midnight)),
        ];

        let stats = ActivityStats::summarize(&events, &[]);

        assert_eq!(stats.transactions_by_sender[&address("a1")], 2);
        assert_eq!(stats.transactions_by_sender[&address("b2")], 1);
        assert_eq!(stats.total_transactions(), 3);

        let days: Vec<_> = stats
            .transactions_by_day
            .iter()
            .map(|(day, count)| (day.to_string(), *count))
            .collect();
        assert_eq!(
            days,
            vec![("2024-03-01".to_string(), 1), ("2024-03-02".to_string(), 3)]
        );
    }

    #[test]
    fn events_without_timestamp_skip_day_buckets() {
        let events = vec![event(Some("a1"), None), event(Some("a1"), Some(0))];

        let stats = ActivityStats::summarize(&events, &[]);

        assert_eq!(stats.transactions_by_sender[&address("a1")], 2);
        assert_eq!(stats.transactions_by_day.len(), 1);
        assert_eq!(stats.transactions_by_day.values().sum::<usize>(), 1);
    }

    #[test]
    fn counts_users_per_role() {
        let users = vec![
            user("a1", Role::Farmer),
            user("b2", Role::Farmer),
            user("c3", Role::Consumer),
        ];

        let stats = ActivityStats::summarize(&[], &users);

        assert_eq!(stats.users_by_role[&Role::Farmer], 2);
        assert_eq!(stats.users_by_role[&Role::Consumer], 1);
        assert!(!stats.users_by_role.contains_key(&Role::Admin));

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["users_by_role"]["FARMER"], 2);
    }
}
