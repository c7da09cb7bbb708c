use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_HEX_LEN: usize = 40;
pub const PRODUCT_NAME_MAX_LEN: usize = 128;
pub const LOCATION_FIELD_MAX_LEN: usize = 128;
pub const AMOUNT_INPUT_MAX_LEN: usize = 64;
/// Fractional digits carried by the ledger's base unit.
pub const AMOUNT_MAX_DECIMALS: i64 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control() || ch.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Checks a `0x`-prefixed, 20-byte hex account address.
pub fn validate_address(field: &'static str, address: &str) -> ValidationResult {
    let address = address.trim();
    validate_required(field, address)?;

    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::new(field, "must start with '0x'"))?;

    if digits.len() != ADDRESS_HEX_LEN {
        return Err(ValidationError::new(
            field,
            format!("must contain exactly {} hex digits", ADDRESS_HEX_LEN),
        ));
    }

    if hex::decode(digits).is_err() {
        return Err(ValidationError::new(field, "must contain only hex digits"));
    }

    Ok(())
}

/// Parses a user-entered display amount: non-negative, at most 18 decimals.
pub fn parse_amount(field: &'static str, raw: &str) -> Result<BigDecimal, ValidationError> {
    let raw = sanitize_string(raw);
    validate_required(field, &raw)?;
    validate_max_len(field, &raw, AMOUNT_INPUT_MAX_LEN)?;

    let amount = BigDecimal::from_str(&raw)
        .map_err(|_| ValidationError::new(field, "must be a decimal number"))?;

    if amount < BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > AMOUNT_MAX_DECIMALS {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", AMOUNT_MAX_DECIMALS),
        ));
    }

    Ok(amount)
}

pub fn parse_distance_km(field: &'static str, raw: &str) -> Result<u64, ValidationError> {
    let raw = sanitize_string(raw);
    validate_required(field, &raw)?;

    raw.parse::<u64>()
        .map_err(|_| ValidationError::new(field, "must be a whole number of kilometres"))
}

pub fn validate_product_name(name: &str) -> Result<String, ValidationError> {
    let name = sanitize_string(name);
    validate_required("name", &name)?;
    validate_max_len("name", &name, PRODUCT_NAME_MAX_LEN)?;
    Ok(name)
}

pub fn validate_location_field(
    field: &'static str,
    value: &str,
) -> Result<String, ValidationError> {
    let value = sanitize_string(value);
    validate_required(field, &value)?;
    validate_max_len(field, &value, LOCATION_FIELD_MAX_LEN)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_address() -> String {
        "0x".to_owned() + &"ab".repeat(20)
    }

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  Basmati\tRice  "), "Basmati Rice");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ri\u{0000}ce"), "rice");
        assert_eq!(sanitize_string("Basmati\nRice\r\n"), "Basmati Rice");
    }

    #[test]
    fn validates_address() {
        assert!(validate_address("address", &valid_address()).is_ok());
        assert!(validate_address("address", &format!(" {} ", valid_address())).is_ok());
        assert!(validate_address("address", &"ab".repeat(21)).is_err());
        assert!(validate_address("address", "0x1234").is_err());
        assert!(validate_address("address", &("0x".to_owned() + &"zz".repeat(20))).is_err());
        assert!(validate_address("address", "").is_err());
    }

    #[test]
    fn parses_amounts() {
        assert_eq!(
            parse_amount("fee", " 0.05 ").unwrap(),
            BigDecimal::from_str("0.05").unwrap()
        );
        assert!(parse_amount("fee", "0").is_ok());
        assert!(parse_amount("fee", "-1").is_err());
        assert!(parse_amount("fee", "abc").is_err());
        assert!(parse_amount("fee", "").is_err());
        assert!(parse_amount("fee", "0.0000000000000000001").is_err());
        assert!(parse_amount("fee", "1.500000000000000000000").is_ok());
    }

    #[test]
    fn parses_distance() {
        assert_eq!(parse_distance_km("distance", "250").unwrap(), 250);
        assert!(parse_distance_km("distance", "12.5").is_err());
        assert!(parse_distance_km("distance", "-3").is_err());
        assert!(parse_distance_km("distance", " ").is_err());
    }

    #[test]
    fn validates_product_name() {
        assert_eq!(validate_product_name("  Rice ").unwrap(), "Rice");
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"a".repeat(PRODUCT_NAME_MAX_LEN + 1)).is_err());
    }
}
