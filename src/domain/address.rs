use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::{validate_address, ValidationError};

/// A ledger account address, normalised to lowercase so lookups are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate_address("address", raw)?;
        Ok(Self(raw.trim().to_ascii_lowercase()))
    }

    /// Actor slots the ledger has not filled yet come back as the zero
    /// address (or an empty string).
    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::parse(raw).ok().filter(|address| !address.is_zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0[2..].chars().all(|ch| ch == '0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_case() {
        let upper = Address::parse("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
        let lower = Address::parse("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn treats_zero_address_as_absent() {
        let zero = format!("0x{}", "0".repeat(40));
        assert!(Address::from_wire(&zero).is_none());
        assert!(Address::from_wire("").is_none());
        assert!(Address::from_wire("0x00000000000000000000000000000000000000a1").is_some());
    }
}
