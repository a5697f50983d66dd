//! Monthly earning cap enforcement
//!
//! The cap applies only to earning-type credits (posting, rating, check-ins).
//! Rollover is lazy: the period is evaluated at the moment of the next earning
//! credit, so `monthly_earned` never reflects a period that has already
//! elapsed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Account;

/// Length of one earning period
pub const PERIOD_DAYS: i64 = 30;

/// What happens when an earning credit would exceed the cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapPolicy {
    /// Reject the whole credit with `CapExceeded`
    Reject,
    /// Grant only the remaining allowance
    Clamp,
}

/// Roll the period over if it has elapsed, then charge `amount` against the
/// cap under the given policy.
///
/// Returns the granted amount: `amount` when it fits, the remaining allowance
/// under [`CapPolicy::Clamp`]. A zero remaining allowance fails with
/// `CapExceeded` under either policy.
pub fn apply_earning(
    account: &mut Account,
    amount: i64,
    now: DateTime<Utc>,
    cap: i64,
    policy: CapPolicy,
) -> Result<i64> {
    if now >= account.monthly_cap_reset_at {
        account.monthly_earned = 0;
        account.monthly_cap_reset_at = now + Duration::days(PERIOD_DAYS);
        tracing::debug!(account = %account.id, "monthly earning period rolled over");
    }

    let remaining = (cap - account.monthly_earned).max(0);
    let granted = match policy {
        _ if amount <= remaining => amount,
        CapPolicy::Clamp if remaining > 0 => remaining,
        _ => {
            return Err(Error::CapExceeded {
                account: account.id.to_string(),
                cap,
                remaining,
            });
        }
    };

    account.monthly_earned += granted;
    Ok(granted)
}
