//! Status condition ledger.
//!
//! Conditions are stored as an ordered list but keyed by `type`. All
//! mutation goes through [`upsert_condition`], which keeps one entry per
//! type and only rewrites an entry when its reason changes, so repeated
//! identical observations never produce a status write.

use crate::crd::{Condition, ConditionStatus};

/// Current time in the second-precision RFC 3339 form used for
/// `lastTransitionTime`.
pub fn transition_timestamp() -> String {
    jiff::Timestamp::now()
        .strftime("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Insert or update the condition of `condition_type`.
///
/// - Same type, same reason: untouched (status and message included).
/// - Same type, different reason: replaced in place with a fresh timestamp.
/// - Type absent: appended.
///
/// Returns `true` when the list changed.
pub fn upsert_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> bool {
    let fresh = || Condition {
        r#type: condition_type.to_string(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: transition_timestamp(),
    };

    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) if existing.reason == reason => false,
        Some(existing) => {
            *existing = fresh();
            true
        }
        None => {
            conditions.push(fresh());
            true
        }
    }
}

/// Look up the condition of a given type
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Get the reason for a condition
pub fn get_condition_reason<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a str> {
    find_condition(conditions, condition_type).map(|c| c.reason.as_str())
}
