//! 1-parameter logistic (Rasch) item response model (C7)
//!
//! All functions here are pure: no I/O, no persistence. The only observable
//! state is the AbilityRecord the caller threads through.

/// P(correct | theta, difficulty), the Rasch 1PL probability model
pub fn probability_correct(theta: f64, difficulty: i32) -> f64 {
    1.0 / (1.0 + (-(theta - difficulty as f64)).exp())
}

/// Round half away from zero (not banker's rounding)
fn round_half_away_from_zero(x: f64) -> i64 {
    if x >= 0.0 {
        (x + 0.5).floor() as i64
    } else {
        (x - 0.5).ceil() as i64
    }
}

/// d_target = clamp(round(grade + theta), min_difficulty, max_difficulty)
pub fn target_difficulty(grade: i32, theta: f64, min_difficulty: i32, max_difficulty: i32) -> i32 {
    let raw = round_half_away_from_zero(grade as f64 + theta) as i32;
    raw.clamp(min_difficulty, max_difficulty)
}

/// theta_new = clamp(theta + eta * (y - p), -clamp_bound, +clamp_bound)
///
/// Returns (theta_new, delta) so the caller can preserve the exact delta
/// applied even though clamping is idempotent and may not equal the
/// unclamped step.
pub fn update_ability(
    theta: f64,
    difficulty: i32,
    correct: bool,
    learning_rate: f64,
    clamp_bound: f64,
) -> (f64, f64) {
    let p = probability_correct(theta, difficulty);
    let y = if correct { 1.0 } else { 0.0 };
    let delta = learning_rate * (y - p);
    let theta_new = (theta + delta).clamp(-clamp_bound, clamp_bound);
    (theta_new, delta)
}

/// Recompute mastery = correct / attempted after incrementing both counters
pub fn update_mastery(attempted: u32, correct: u32, answer_correct: bool) -> (u32, u32, f64) {
    let new_attempted = attempted + 1;
    let new_correct = correct + if answer_correct { 1 } else { 0 };
    let mastery = new_correct as f64 / new_attempted as f64;
    (new_attempted, new_correct, mastery)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_symmetric_at_equal_ability_and_difficulty() {
        let p = probability_correct(2.0, 2);
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_probability_increases_with_ability() {
        let low = probability_correct(0.0, 3);
        let high = probability_correct(2.0, 3);
        assert!(high > low);
    }

    #[test]
    fn test_target_difficulty_initial_call_yields_grade_clamped() {
        assert_eq!(target_difficulty(3, 0.0, 1, 5), 3);
        assert_eq!(target_difficulty(6, 0.0, 1, 5), 5);
        assert_eq!(target_difficulty(0, 0.0, 1, 5), 1);
    }

    #[test]
    fn test_target_difficulty_rounds_half_away_from_zero() {
        assert_eq!(target_difficulty(2, 0.5, 1, 5), 3);
        assert_eq!(target_difficulty(2, -0.5, 1, 5), 2);
    }

    #[test]
    fn test_update_ability_correct_on_hard_item_yields_large_positive_delta() {
        let (_, delta_hard) = update_ability(0.0, 5, true, 0.3, 3.0);
        let (_, delta_easy) = update_ability(0.0, 1, true, 0.3, 3.0);
        assert!(delta_hard > delta_easy);
        assert!(delta_hard > 0.0);
    }

    #[test]
    fn test_update_ability_incorrect_yields_negative_delta() {
        let (theta_new, delta) = update_ability(0.0, 3, false, 0.3, 3.0);
        assert!(delta < 0.0);
        assert!(theta_new < 0.0);
    }

    #[test]
    fn test_update_ability_clamped_at_bounds() {
        let (theta_new, _) = update_ability(2.95, 5, true, 0.3, 3.0);
        assert!(theta_new <= 3.0);
    }

    #[test]
    fn test_update_mastery_recomputes_ratio() {
        let (attempted, correct, mastery) = update_mastery(3, 2, true);
        assert_eq!(attempted, 4);
        assert_eq!(correct, 3);
        assert!((mastery - 0.75).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn prop_ability_always_stays_within_clamp(
            theta in -3.0f64..3.0,
            difficulty in 1i32..=5,
            correct in proptest::bool::ANY,
            eta in 0.01f64..1.0,
        ) {
            let (theta_new, _) = update_ability(theta, difficulty, correct, eta, 3.0);
            proptest::prop_assert!(theta_new >= -3.0 && theta_new <= 3.0);
        }

        #[test]
        fn prop_target_difficulty_always_within_bounds(
            grade in 1i32..=5,
            theta in -3.0f64..3.0,
        ) {
            let d = target_difficulty(grade, theta, 1, 5);
            proptest::prop_assert!(d >= 1 && d <= 5);
        }

        #[test]
        fn prop_probability_between_zero_and_one(theta in -5.0f64..5.0, difficulty in 1i32..=5) {
            let p = probability_correct(theta, difficulty);
            proptest::prop_assert!(p > 0.0 && p < 1.0);
        }
    }
}
