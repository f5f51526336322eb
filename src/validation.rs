// Validation utilities module
// Custom validator functions for request DTOs

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::booking_rules::error::{BRResult, BookingRulesError};

/// Highest base nightly rate a room can be saved with
pub const MAX_NIGHTLY_RATE: Decimal = Decimal::from_parts(10_000_000, 0, 0, false, 0);

/// Most points a single earn or redeem request can move
pub const MAX_POINTS_PER_TRANSACTION: i64 = 1_000_000_000;

/// Attach a field name to a custom validator result
pub fn ensure(field: &str, result: Result<(), ValidationError>) -> BRResult<()> {
    result.map_err(|err| BookingRulesError::ValidationError(format!("{}: {}", field, err.code)))
}

/// Validates that an identifier uses only letters, digits, '-' and '_'
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_identifier"))
    }
}

/// Validates that a nightly rate is between 0 and `MAX_NIGHTLY_RATE`
pub fn validate_nightly_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO {
        Err(ValidationError::new("rate_must_not_be_negative"))
    } else if *rate > MAX_NIGHTLY_RATE {
        Err(ValidationError::new("rate_too_large"))
    } else {
        Ok(())
    }
}

/// Validates that a points amount is positive and at most `MAX_POINTS_PER_TRANSACTION`
pub fn validate_points(points: i64) -> Result<(), ValidationError> {
    if points <= 0 {
        Err(ValidationError::new("points_must_be_positive"))
    } else if points > MAX_POINTS_PER_TRANSACTION {
        Err(ValidationError::new("points_too_large"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_identifier() {
        assert!(validate_identifier("villa-1").is_ok());
        assert!(validate_identifier("pool_villa_A").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("villa 1").is_err());
        assert!(validate_identifier("../etc").is_err());
    }

    #[test]
    fn test_nightly_rate_bounds() {
        assert!(validate_nightly_rate(&dec!(0)).is_ok());
        assert!(validate_nightly_rate(&dec!(3000)).is_ok());
        assert!(validate_nightly_rate(&dec!(10000000)).is_ok());
        assert!(validate_nightly_rate(&dec!(-0.01)).is_err());

        let err = validate_nightly_rate(&dec!(10000000.01)).unwrap_err();
        assert_eq!(err.code, "rate_too_large");
        assert!(validate_nightly_rate(&Decimal::MAX).is_err());
    }

    #[test]
    fn test_ensure_names_field() {
        let err = ensure("room_id", validate_identifier("bad id")).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: room_id: invalid_identifier");
    }

    #[test]
    fn test_points_bounds() {
        assert!(validate_points(1).is_ok());
        assert!(validate_points(MAX_POINTS_PER_TRANSACTION).is_ok());
        assert!(validate_points(0).is_err());
        assert!(validate_points(-5).is_err());
        assert_eq!(validate_points(i64::MAX).unwrap_err().code, "points_too_large");
    }
}
