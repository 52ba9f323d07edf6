//! Monthly cost guesstimate for metered message sinks.
//!
//! Purely informational: computed once from static configuration and logged
//! at startup. Bad inputs count as zero rather than failing.

use std::time::Duration;

/// Seconds in a 30-day month.
pub const SECONDS_PER_MONTH: f64 = 60.0 * 60.0 * 24.0 * 30.0;

/// Inputs to [`guess_monthly_cost`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Price of a single published message.
    pub message_unit_cost: f64,
    /// Expected state changes per second, per line.
    pub estimated_change_freq: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            message_unit_cost: 5e-6,
            estimated_change_freq: 0.0,
        }
    }
}

/// Estimate the monthly messaging cost of monitoring `lines` lines.
///
/// Each line publishes on every change and once per heartbeat.
#[must_use]
pub fn guess_monthly_cost(model: &CostModel, lines: usize, heartbeat: Option<Duration>) -> f64 {
    let lines = f64::from(u32::try_from(lines).unwrap_or(u32::MAX));
    let heartbeat_rate = heartbeat
        .filter(|period| !period.is_zero())
        .map_or(0.0, |period| 1.0 / period.as_secs_f64());
    let rate = lines * (non_negative(model.estimated_change_freq) + heartbeat_rate);
    non_negative(rate * SECONDS_PER_MONTH * non_negative(model.message_unit_cost))
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn should_cost_nothing_without_changes_or_heartbeat() {
        let cost = guess_monthly_cost(&CostModel::default(), 3, None);
        assert!(close(cost, 0.0));
    }

    #[test]
    fn should_scale_with_change_frequency() {
        let model = CostModel {
            message_unit_cost: 5e-6,
            estimated_change_freq: 1.0,
        };
        let cost = guess_monthly_cost(&model, 1, None);
        assert!(close(cost, SECONDS_PER_MONTH * 5e-6));
    }

    #[test]
    fn should_include_heartbeat_for_every_line() {
        let model = CostModel {
            message_unit_cost: 1.0,
            estimated_change_freq: 0.0,
        };
        let cost = guess_monthly_cost(&model, 2, Some(Duration::from_secs(60)));
        assert!(close(cost, 2.0 * SECONDS_PER_MONTH / 60.0));
    }

    #[test]
    fn should_ignore_zero_heartbeat() {
        let model = CostModel {
            message_unit_cost: 1.0,
            estimated_change_freq: 0.0,
        };
        assert!(close(guess_monthly_cost(&model, 2, Some(Duration::ZERO)), 0.0));
    }

    #[test]
    fn should_treat_nonsense_inputs_as_zero() {
        let model = CostModel {
            message_unit_cost: f64::NAN,
            estimated_change_freq: -4.0,
        };
        assert!(close(guess_monthly_cost(&model, 5, None), 0.0));
    }
}
