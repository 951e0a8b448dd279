//! Decides whether a vehicle should start charging now.
//!
//! The planner assumes a full charge takes [`MAX_CHARGE_HOURS`] and that the
//! charge needed scales linearly with the missing state of charge. Charging
//! should happen in the cheapest hours before the deadline.

use crate::{
    prices::{PriceEntry, find_cheapest_start},
    vehicle_data::ChargeState,
};
use chrono::{DateTime, Utc};

/// Hours needed to charge from empty to full
pub const MAX_CHARGE_HOURS: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeDecision {
    /// The cheapest window starts later
    Wait { start: DateTime<Utc> },
    /// Battery is already at or above the limit
    NoNeed,
    AlreadyCharging,
    Disconnected,
    /// The cheapest window has started
    StartNow { hours: i32 },
}

/// Earliest start among the cheapest windows of every possible charge length,
/// never later than the deadline.
///
/// If even this is in the future, no charge can be due yet and the vehicle
/// does not need to be woken.
pub fn potential_start(prices: &[PriceEntry], deadline: DateTime<Utc>) -> DateTime<Utc> {
    (1..=MAX_CHARGE_HOURS)
        .map(|hours| find_cheapest_start(prices, hours as usize, deadline))
        .fold(deadline, DateTime::min)
}

/// Hours needed to charge from `level` to `limit` percent, rounded up.
///
/// The +90 rounds up while keeping a full charge within [`MAX_CHARGE_HOURS`].
pub fn charge_hours(limit: i32, level: i32) -> i32 {
    ((limit - level) * MAX_CHARGE_HOURS + 90) / 100
}

pub fn decide(
    prices: &[PriceEntry],
    charge: &ChargeState,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ChargeDecision {
    if charge.battery_level >= charge.charge_limit_soc {
        return ChargeDecision::NoNeed;
    }
    if charge.is_charging() {
        return ChargeDecision::AlreadyCharging;
    }
    if charge.is_disconnected() {
        return ChargeDecision::Disconnected;
    }

    let hours = charge_hours(charge.charge_limit_soc, charge.battery_level);
    let start = find_cheapest_start(prices, hours.max(0) as usize, deadline);
    if start > now {
        ChargeDecision::Wait { start }
    } else {
        ChargeDecision::StartNow { hours }
    }
}
