use marksync_core::grading::{
    best_three_points, calculate_grade, compute_division, Division, GradeResult, SubjectResult,
    Tier, WeightClass,
};
use proptest::prelude::*;
use proptest::test_runner::Config;

fn tier() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Lower), Just(Tier::Upper)]
}

fn weight() -> impl Strategy<Value = WeightClass> {
    prop_oneof![Just(WeightClass::Primary), Just(WeightClass::Subsidiary)]
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn grading_is_deterministic(mark in 0.0_f64..=100.0, tier in tier(), weight in weight()) {
        let a = calculate_grade(mark, tier, weight).expect("in range");
        let b = calculate_grade(mark, tier, weight).expect("in range");
        prop_assert_eq!(a, b);
    }

    #[test]
    fn higher_marks_never_earn_more_points(
        low in 0.0_f64..=100.0,
        delta in 0.0_f64..=100.0,
        tier in tier(),
    ) {
        let high = (low + delta).min(100.0);
        let lo = calculate_grade(low, tier, WeightClass::Primary).expect("in range");
        let hi = calculate_grade(high, tier, WeightClass::Primary).expect("in range");
        prop_assert!(hi.points <= lo.points);
    }

    #[test]
    fn out_of_range_marks_are_rejected(mark in prop_oneof![-1000.0_f64..-0.001, 100.001_f64..1000.0]) {
        prop_assert!(calculate_grade(mark, Tier::Lower, WeightClass::Primary).is_err());
        prop_assert!(calculate_grade(mark, Tier::Upper, WeightClass::Primary).is_err());
    }

    #[test]
    fn subsidiary_subjects_carry_no_points(mark in 0.0_f64..=100.0) {
        let result = calculate_grade(mark, Tier::Upper, WeightClass::Subsidiary).expect("in range");
        prop_assert_eq!(result.points, 0);
    }

    #[test]
    fn division_uses_best_three_primary_subjects(
        marks in proptest::collection::vec(0.0_f64..=100.0, 3..9),
        subsidiary in 0.0_f64..=100.0,
    ) {
        let mut results: Vec<SubjectResult> = marks
            .iter()
            .enumerate()
            .map(|(i, m)| SubjectResult {
                subject_id: format!("p{i}"),
                weight_class: WeightClass::Primary,
                result: calculate_grade(*m, Tier::Upper, WeightClass::Primary).expect("in range"),
            })
            .collect();
        results.push(SubjectResult {
            subject_id: "gp".into(),
            weight_class: WeightClass::Subsidiary,
            result: calculate_grade(subsidiary, Tier::Upper, WeightClass::Subsidiary).expect("in range"),
        });

        let expected = best_three_points(
            results
                .iter()
                .filter(|r| r.weight_class == WeightClass::Primary)
                .map(|r| r.result.points),
        )
        .expect("three primaries");
        let summary = compute_division(&results).expect("division");

        prop_assert_eq!(summary.best_three_points, expected);
        prop_assert!((3..=21).contains(&summary.best_three_points));
        prop_assert!(!summary.counted_subjects.contains(&"gp".to_string()));
        if summary.best_three_points <= 9 {
            prop_assert_eq!(summary.division, Division::I);
        }
    }
}

#[test]
fn lower_tier_boundaries() {
    let grade = |m: f64| -> GradeResult {
        calculate_grade(m, Tier::Lower, WeightClass::Primary).expect("in range")
    };
    let cases = [(81.0, "A"), (80.0, "B"), (41.0, "C"), (40.0, "D"), (21.0, "D"), (20.0, "F")];
    for (mark, expected) in cases {
        assert_eq!(grade(mark).grade.to_string(), expected, "mark {mark}");
    }
}
