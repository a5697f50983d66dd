//! Fee schedule arithmetic
//!
//! Credits are integral; fee rates are exact decimals. For a gross transfer
//! `G` at rate `f`, the payee receives `floor(G * (1 - f))` and the
//! difference is platform revenue, credited to no account.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Net amount credited to the payee for a gross transfer at the given rate
pub fn net_after_fee(gross: i64, fee_rate: Decimal) -> Result<i64> {
    validate_rate(fee_rate)?;
    if gross <= 0 {
        return Err(Error::Validation(format!(
            "transfer amount must be positive, got {}",
            gross
        )));
    }

    let net = (Decimal::from(gross) * (Decimal::ONE - fee_rate)).floor();
    net.to_i64()
        .ok_or_else(|| Error::Validation("net amount out of range".to_string()))
}

/// Reject rates outside [0, 1); a 100% fee would be a transfer with no payee
pub fn validate_rate(fee_rate: Decimal) -> Result<()> {
    if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
        return Err(Error::Validation(format!(
            "fee rate must be in [0, 1), got {}",
            fee_rate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(n: i64, scale: u32) -> Decimal {
        Decimal::new(n, scale)
    }

    #[test]
    fn test_tip_fee_five_percent() {
        // 100 at 5% -> 95 net, 5 fee
        assert_eq!(net_after_fee(100, rate(5, 2)).unwrap(), 95);
        // Floor, never round up: 99 * 0.95 = 94.05
        assert_eq!(net_after_fee(99, rate(5, 2)).unwrap(), 94);
        assert_eq!(net_after_fee(1, rate(5, 2)).unwrap(), 0);
    }

    #[test]
    fn test_subscription_fee_ten_percent() {
        assert_eq!(net_after_fee(50, rate(10, 2)).unwrap(), 45);
        assert_eq!(net_after_fee(100, rate(10, 2)).unwrap(), 90);
        assert_eq!(net_after_fee(200, rate(10, 2)).unwrap(), 180);
    }

    #[test]
    fn test_zero_rate_passes_through() {
        assert_eq!(net_after_fee(1234, Decimal::ZERO).unwrap(), 1234);
    }

    #[test]
    fn test_fee_never_exceeds_gross() {
        for gross in [1i64, 7, 19, 100, 999, 1000] {
            for basis_points in [0i64, 500, 1000, 2500, 9999] {
                let net = net_after_fee(gross, rate(basis_points, 4)).unwrap();
                assert!(net >= 0);
                assert!(net <= gross);
            }
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(net_after_fee(0, rate(5, 2)).is_err());
        assert!(net_after_fee(-10, rate(5, 2)).is_err());
        assert!(net_after_fee(100, Decimal::ONE).is_err());
        assert!(net_after_fee(100, rate(-5, 2)).is_err());
    }
}
