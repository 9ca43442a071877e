use chrono::{DateTime, Utc};

/// Compute the new day-streak value after a completion at `now`.
///
/// Days are compared at UTC midnight so the result does not depend on the
/// server's local zone:
///
/// - no prior completion: the streak starts at `1`
/// - same calendar day: the streak is unchanged (repeat completions do not
///   inflate it)
/// - exactly one day later: the streak increments
/// - a gap of more than one day, or a last completion in the future (clock
///   skew): the streak resets to `1`
///
/// Pure function; the caller is expected to set `last_completed_at = now`
/// immediately after.
///
/// # Examples
///
/// ```
/// # use hub_core::streak::update_streak;
/// # use hub_core::time::fixed_now;
/// let now = fixed_now();
/// assert_eq!(update_streak(None, 0, now), 1);
/// assert_eq!(update_streak(Some(now - chrono::Duration::days(1)), 2, now), 3);
/// ```
#[must_use]
pub fn update_streak(
    last_completed_at: Option<DateTime<Utc>>,
    current_streak: u32,
    now: DateTime<Utc>,
) -> u32 {
    let Some(last) = last_completed_at else {
        return 1;
    };

    let day_diff = now
        .date_naive()
        .signed_duration_since(last.date_naive())
        .num_days();

    match day_diff {
        0 => current_streak,
        1 => current_streak + 1,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn starts_streak_without_prior_completion() {
        assert_eq!(update_streak(None, 0, fixed_now()), 1);
    }

    #[test]
    fn keeps_streak_for_same_day_completion() {
        let now = fixed_now();
        assert_eq!(update_streak(Some(now), 3, now), 3);

        // Earlier the same UTC day still counts as "today".
        let this_morning = now - Duration::hours(3);
        assert_eq!(update_streak(Some(this_morning), 3, now), 3);
    }

    #[test]
    fn increments_streak_for_consecutive_day() {
        let now = fixed_now();
        let yesterday = now - Duration::days(1);
        assert_eq!(update_streak(Some(yesterday), 2, now), 3);
    }

    #[test]
    fn resets_streak_after_gap() {
        let now = fixed_now();
        let last_week = now - Duration::days(8);
        assert_eq!(update_streak(Some(last_week), 5, now), 1);
    }

    #[test]
    fn resets_streak_on_clock_skew() {
        let now = fixed_now();
        let tomorrow = now + Duration::days(1);
        assert_eq!(update_streak(Some(tomorrow), 4, now), 1);
    }

    #[test]
    fn day_boundary_beats_elapsed_hours() {
        // 23:00 UTC to 01:00 UTC the next day is two hours apart but still
        // a consecutive-day completion.
        let late = DateTime::parse_from_rfc3339("2024-03-01T23:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let early_next = DateTime::parse_from_rfc3339("2024-03-02T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(update_streak(Some(late), 1, early_next), 2);
    }
}
