//! Per-turn action selection.
//!
//! The policy is a pure function of the turn prompt and two static
//! thresholds, so the same prompt always yields the same action.

use crate::messages::{PlayerAction, TurnPrompt};

/// Calls at or below this amount are always taken.
pub const DEFAULT_SMALL_CALL_THRESHOLD: f64 = 50.0;

/// Calls at or below this amount may be raised over instead of folded.
pub const DEFAULT_RAISE_ELIGIBLE_THRESHOLD: f64 = 100.0;

/// Tunable thresholds for [`decide`].
///
/// # Examples
///
/// ```
/// use pp_harness::decision::DecisionThresholds;
///
/// let thresholds = DecisionThresholds::default();
/// assert_eq!(thresholds.small_call_threshold, 50.0);
/// assert_eq!(thresholds.raise_eligible_threshold, 100.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionThresholds {
    pub small_call_threshold: f64,
    pub raise_eligible_threshold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            small_call_threshold: DEFAULT_SMALL_CALL_THRESHOLD,
            raise_eligible_threshold: DEFAULT_RAISE_ELIGIBLE_THRESHOLD,
        }
    }
}

/// Choose exactly one action for a turn prompt.
///
/// 1. Check when checking is allowed.
/// 2. Call when the call is small.
/// 3. Raise to the minimum when the call is moderate and a raise is offered.
/// 4. Fold otherwise.
pub fn decide(prompt: &TurnPrompt, thresholds: &DecisionThresholds) -> PlayerAction {
    if prompt.can_check {
        PlayerAction::Check
    } else if prompt.call_amount <= thresholds.small_call_threshold {
        PlayerAction::Call
    } else if prompt.call_amount <= thresholds.raise_eligible_threshold
        && prompt.min_raise_to_total_bet > 0.0
    {
        PlayerAction::Raise {
            amount: prompt.min_raise_to_total_bet,
        }
    } else {
        PlayerAction::Fold
    }
}
