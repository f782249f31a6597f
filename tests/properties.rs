//! Property-based tests for filter compilation and evaluation.

mod common;

use common::{Pair, User};
use proptest::prelude::*;
use queryx::{apply, apply_filter, compile, QueryMappingConfig};

// ============================================================================
// Strategies
// ============================================================================

fn pair_strategy() -> impl Strategy<Value = Pair> {
    (-5i32..5, -5i32..5).prop_map(|(a, b)| Pair { a, b })
}

fn comparison_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("a"), Just("b")],
        prop_oneof![Just("=="), Just("!="), Just(">"), Just(">="), Just("<"), Just("<=")],
        -5i32..5,
    )
        .prop_map(|(field, op, value)| format!("{field}{op}{value}"))
}

/// Random filters built from comparisons, `&`, `|`, `!` and groups.
fn filter_strategy() -> impl Strategy<Value = String> {
    comparison_strategy().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l}&{r}")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l}|{r}")),
            inner.clone().prop_map(|f| format!("!({f})")),
            inner.prop_map(|f| format!("({f})")),
        ]
    })
}

fn user_strategy() -> impl Strategy<Value = User> {
    (0i32..1000, "[A-Za-z]{1,8}", 0i32..100)
        .prop_map(|(id, name, age)| User::new(id, &name, age))
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Compiling twice yields predicates that accept the same records.
    #[test]
    fn compile_is_deterministic(
        filter in filter_strategy(),
        rows in prop::collection::vec(pair_strategy(), 0..40),
    ) {
        let config = QueryMappingConfig::new();
        let first = compile::<Pair>(&filter, &config).unwrap();
        let second = compile::<Pair>(&filter, &config).unwrap();
        prop_assert_eq!(&first, &second);

        let once = apply_filter(rows.clone(), &filter, &config).unwrap();
        let twice = apply_filter(rows, &filter, &config).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// A negated group accepts exactly the records the group rejects.
    #[test]
    fn negated_group_is_complement(
        filter in filter_strategy(),
        rows in prop::collection::vec(pair_strategy(), 0..40),
    ) {
        let config = QueryMappingConfig::new();
        let accepted = apply_filter(rows.clone(), &format!("({filter})"), &config).unwrap();
        let rejected = apply_filter(rows.clone(), &format!("!({filter})"), &config).unwrap();

        prop_assert_eq!(accepted.len() + rejected.len(), rows.len());
        for row in &rejected {
            let single = apply_filter(vec![*row], &filter, &config).unwrap();
            prop_assert!(single.is_empty());
        }
    }

    /// Filtering never grows the input and keeps source order.
    #[test]
    fn filter_keeps_subsequence(
        filter in filter_strategy(),
        rows in prop::collection::vec(pair_strategy(), 0..40),
    ) {
        let config = QueryMappingConfig::new();
        let out = apply_filter(rows.clone(), &filter, &config).unwrap();
        prop_assert!(out.len() <= rows.len());

        let mut remaining = rows.iter();
        for row in &out {
            prop_assert!(remaining.any(|r| r == row));
        }
    }

    /// Ordering by age then id sorts every page consistently.
    #[test]
    fn ordering_and_paging_agree(
        users in prop::collection::vec(user_strategy(), 0..30),
        offset in -2i64..10,
        limit in -2i64..10,
    ) {
        let config = QueryMappingConfig::new();
        let sorted = apply(users.clone(), "", "-age,id", None, None, &config).unwrap();
        for window in sorted.windows(2) {
            prop_assert!(
                window[0].age > window[1].age
                    || (window[0].age == window[1].age && window[0].id <= window[1].id)
            );
        }

        let page = apply(users, "", "-age,id", Some(offset), Some(limit), &config).unwrap();
        let skip = if offset > 0 { offset as usize } else { 0 };
        let expected: Vec<_> = sorted
            .into_iter()
            .skip(skip)
            .take(if limit > 0 { limit as usize } else { usize::MAX })
            .collect();
        prop_assert_eq!(page, expected);
    }

    /// Case-insensitive equality matches regardless of the literal's case.
    #[test]
    fn case_insensitive_equality(name in "[A-Za-z]{1,8}") {
        let config = QueryMappingConfig::new();
        let users = vec![User::new(1, &name, 1)];
        let upper = format!("name==*'{}'", name.to_uppercase());
        let lower = format!("name==*'{}'", name.to_lowercase());
        let upper = apply_filter(users.clone(), &upper, &config).unwrap();
        let lower = apply_filter(users, &lower, &config).unwrap();
        prop_assert_eq!(upper.len(), 1);
        prop_assert_eq!(lower.len(), 1);
    }
}
