//! Property-based tests using proptest
//!
//! These tests verify the name filter against randomized inventories
//! and queries.

use proptest::prelude::*;
use vmctl::resource::{filter_resources, ManagedResource, PowerState};

/// Generate arbitrary VM data for testing
fn arb_resource() -> impl Strategy<Value = ManagedResource> {
    (
        "[a-zA-Z][a-zA-Z0-9 -]{0,20}", // name
        prop_oneof![
            Just(PowerState::On),
            Just(PowerState::Off),
            Just(PowerState::Transitioning)
        ],
        any::<bool>(),
    )
        .prop_map(|(name, state, snapshot)| {
            let res = ManagedResource::new(&format!("vm-{}", name), &name, state);
            if snapshot {
                res.with_snapshot("base")
            } else {
                res
            }
        })
}

/// Generate an inventory
fn arb_inventory() -> impl Strategy<Value = Vec<ManagedResource>> {
    prop::collection::vec(arb_resource(), 0..100)
}

/// Check that `sub` appears in `full` in the same relative order
fn is_subsequence(sub: &[ManagedResource], full: &[ManagedResource]) -> bool {
    let mut it = full.iter();
    sub.iter().all(|s| it.any(|f| f == s))
}

proptest! {
    /// Empty query returns all items, in order
    #[test]
    fn empty_query_returns_all(items in arb_inventory()) {
        prop_assert_eq!(filter_resources(&items, None), items.clone());
        prop_assert_eq!(filter_resources(&items, Some("")), items);
    }

    /// Filtering is idempotent
    #[test]
    fn filter_is_idempotent(items in arb_inventory(), query in "[a-zA-Z0-9-]{0,6}") {
        let once = filter_resources(&items, Some(&query));
        let twice = filter_resources(&once, Some(&query));
        prop_assert_eq!(once, twice);
    }

    /// Result is exactly the ordered subsequence of matching names
    #[test]
    fn filter_selects_exactly_matching(items in arb_inventory(), query in "[a-zA-Z0-9 -]{1,4}") {
        let filtered = filter_resources(&items, Some(&query));
        let needle = query.to_lowercase();

        prop_assert!(is_subsequence(&filtered, &items));
        let expected = items
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .count();
        prop_assert_eq!(filtered.len(), expected);
        for res in &filtered {
            prop_assert!(res.name.to_lowercase().contains(&needle));
        }
    }

    /// Query case does not matter
    #[test]
    fn filter_is_case_insensitive(items in arb_inventory(), query in "[a-zA-Z]{1,5}") {
        let lower = filter_resources(&items, Some(&query.to_lowercase()));
        let upper = filter_resources(&items, Some(&query.to_uppercase()));
        prop_assert_eq!(lower, upper);
    }

    /// Leading and trailing spaces are matched, never stripped
    #[test]
    fn padded_query_matches_only_padded_names(
        items in arb_inventory(),
        word in "[a-zA-Z0-9-]{1,4}",
        pad in " {1,2}",
    ) {
        let query = format!("{}{}", pad, word);
        let needle = query.to_lowercase();
        let filtered = filter_resources(&items, Some(&query));
        for res in &filtered {
            prop_assert!(res.name.to_lowercase().contains(&needle));
        }
        let expected = items
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .count();
        prop_assert_eq!(filtered.len(), expected);
    }

    /// A whitespace-only query is not an empty query
    #[test]
    fn blank_query_selects_names_with_spaces(items in arb_inventory(), query in " {1,3}") {
        let filtered = filter_resources(&items, Some(&query));
        let expected: Vec<_> = items.iter().filter(|r| r.name.contains(&query)).cloned().collect();
        prop_assert_eq!(filtered, expected);
    }

    /// Every name matches itself
    #[test]
    fn every_resource_found_by_own_name(items in arb_inventory()) {
        for res in &items {
            let filtered = filter_resources(&items, Some(&res.name));
            prop_assert!(filtered.contains(res));
        }
    }
}
