//! Baseline-relative progress computation.

use crate::types::{AggregateCounters, Baseline, Goal, GoalPeriod, GoalType};

/// Current progress for a goal.
///
/// Only the three (type, period) combinations the service exposes counters
/// for are derived locally, relative to the goal's baseline. Everything else
/// (yearly goals, books-per-day, and so on) passes the service-reported
/// `current` through verbatim.
pub fn compute_current(goal: &Goal, baseline: &Baseline, counters: &AggregateCounters) -> i64 {
    match (goal.goal_type, goal.period) {
        (GoalType::Minutes, GoalPeriod::Day) => {
            (counters.daily_minutes - baseline.daily_minutes_at_creation).max(0)
        }
        (GoalType::Books, GoalPeriod::Week) => {
            (counters.weekly_books - baseline.weekly_books_at_creation).max(0)
        }
        (GoalType::Books, GoalPeriod::Month) => {
            (counters.monthly_books - baseline.monthly_books_at_creation).max(0)
        }
        _ => goal.current.unwrap_or(0),
    }
}

/// Progress percentage, capped at 100. Zero when target is non-positive
/// (the goal invariant prevents that upstream).
pub fn percentage(target: i64, current: i64) -> u8 {
    if target <= 0 {
        return 0;
    }
    let pct = (current as f64 / target as f64 * 100.0).round();
    pct.min(100.0).max(0.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn goal(goal_type: GoalType, period: GoalPeriod, current: Option<i64>) -> Goal {
        Goal {
            id: "g1".to_string(),
            title: "Test goal".to_string(),
            goal_type,
            period,
            target: 3,
            active: true,
            created_at: Utc::now(),
            server_confirmed: true,
            current,
        }
    }

    fn baseline(daily: i64, weekly: i64, monthly: i64) -> Baseline {
        Baseline {
            goal_id: "g1".to_string(),
            daily_minutes_at_creation: daily,
            weekly_books_at_creation: weekly,
            monthly_books_at_creation: monthly,
        }
    }

    fn counters(daily: i64, weekly: i64, monthly: i64) -> AggregateCounters {
        AggregateCounters {
            daily_minutes: daily,
            weekly_books: weekly,
            monthly_books: monthly,
        }
    }

    #[test]
    fn test_weekly_books_relative_to_baseline() {
        let g = goal(GoalType::Books, GoalPeriod::Week, None);
        let b = baseline(0, 4, 0);
        assert_eq!(compute_current(&g, &b, &counters(0, 5, 0)), 1);
        assert_eq!(compute_current(&g, &b, &counters(0, 6, 0)), 2);
    }

    #[test]
    fn test_daily_minutes_relative_to_baseline() {
        let g = goal(GoalType::Minutes, GoalPeriod::Day, None);
        let b = baseline(15, 0, 0);
        assert_eq!(compute_current(&g, &b, &counters(45, 0, 0)), 30);
    }

    #[test]
    fn test_counter_reset_clamps_to_zero() {
        // Period rolled over: the counter dropped below the baseline.
        let g = goal(GoalType::Books, GoalPeriod::Month, None);
        let b = baseline(0, 0, 6);
        assert_eq!(compute_current(&g, &b, &counters(0, 0, 1)), 0);
    }

    #[test]
    fn test_unbacked_combination_passes_through() {
        let g = goal(GoalType::Books, GoalPeriod::Year, Some(17));
        let b = baseline(0, 0, 0);
        assert_eq!(compute_current(&g, &b, &counters(500, 9, 9)), 17);

        let g = goal(GoalType::Books, GoalPeriod::Day, None);
        assert_eq!(compute_current(&g, &b, &counters(500, 9, 9)), 0);
    }

    #[test]
    fn test_percentage_rounds_and_caps() {
        assert_eq!(percentage(3, 0), 0);
        assert_eq!(percentage(3, 1), 33);
        assert_eq!(percentage(3, 2), 67);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(3, 50), 100);
    }

    #[test]
    fn test_percentage_defensive_on_bad_target() {
        assert_eq!(percentage(0, 5), 0);
        assert_eq!(percentage(-2, 5), 0);
    }

    #[test]
    fn test_percentage_monotonic_under_increasing_counters() {
        let g = goal(GoalType::Minutes, GoalPeriod::Day, None);
        let b = baseline(10, 0, 0);
        let mut last = 0;
        for minutes in 10..90 {
            let current = compute_current(&g, &b, &counters(minutes, 0, 0));
            let pct = percentage(g.target, current);
            assert!(pct >= last, "percentage regressed at {minutes} minutes");
            last = pct;
        }
    }
}
