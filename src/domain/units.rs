//! Ledger amounts are integers in base units; everything shown to a user is
//! a decimal at a fixed 10^18 scale.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::validation::AMOUNT_MAX_DECIMALS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("Invalid base-unit amount: {0}")]
    Parse(String),
    #[error("Amount must not be negative: {0}")]
    Negative(String),
    #[error("Amount has more than 18 decimal places: {0}")]
    TooPrecise(String),
    #[error("Amount out of range: {0}")]
    Overflow(String),
}

/// An amount in ledger base units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_display(self) -> BigDecimal {
        BigDecimal::new(BigInt::from(self.0), AMOUNT_MAX_DECIMALS).normalized()
    }

    pub fn from_display(amount: &BigDecimal) -> Result<Self, UnitError> {
        if *amount < BigDecimal::from(0) {
            return Err(UnitError::Negative(amount.to_string()));
        }

        let (_, scale) = amount.normalized().as_bigint_and_exponent();
        if scale > AMOUNT_MAX_DECIMALS {
            return Err(UnitError::TooPrecise(amount.to_string()));
        }

        let (digits, _) = amount.with_scale(AMOUNT_MAX_DECIMALS).as_bigint_and_exponent();
        digits
            .to_u128()
            .map(Wei)
            .ok_or_else(|| UnitError::Overflow(amount.to_string()))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = UnitError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim()
            .parse::<u128>()
            .map(Wei)
            .map_err(|_| UnitError::Parse(raw.to_string()))
    }
}

impl From<Wei> for String {
    fn from(value: Wei) -> Self {
        value.0.to_string()
    }
}

impl TryFrom<String> for Wei {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
