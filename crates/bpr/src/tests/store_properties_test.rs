//! Store invariants under random edit sequences

use std::collections::BTreeSet;

use crate::store::InteractionStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Apply a random mix of inserts and removals to both the store and a plain set
fn random_edits(seed: u64, steps: usize) -> (InteractionStore, BTreeSet<(usize, usize)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = InteractionStore::new();
    let mut reference = BTreeSet::new();

    for _ in 0..steps {
        let user = rng.gen_range(0..12);
        let item = rng.gen_range(0..12);
        match rng.gen_range(0..10) {
            0..=5 => {
                assert_eq!(store.add(user, item), reference.insert((user, item)));
            }
            6..=8 => {
                assert_eq!(store.remove(user, item), reference.remove(&(user, item)));
            }
            _ => {
                let removed = store.remove_user(user);
                for item in removed {
                    assert!(reference.remove(&(user, item)));
                }
                assert!(reference.iter().all(|&(u, _)| u != user));
            }
        }
    }

    (store, reference)
}

#[test]
fn test_views_mirror_each_other_after_random_edits() {
    for seed in 0..25 {
        let (store, reference) = random_edits(seed, 400);

        store.check_consistency().unwrap();
        assert_eq!(store.len(), reference.len());

        let pairs: BTreeSet<(usize, usize)> = store.pairs().iter().copied().collect();
        assert_eq!(pairs, reference);

        for &(user, item) in &reference {
            assert!(store.contains(user, item));
            assert!(store.items_of(user).contains(item));
            assert!(store.users_of(item).contains(user));
        }

        let user_total: usize = (0..store.num_users()).map(|u| store.items_of(u).len()).sum();
        let item_total: usize = (0..store.num_items()).map(|i| store.users_of(i).len()).sum();
        assert_eq!(user_total, store.len());
        assert_eq!(item_total, store.len());
    }
}

#[test]
fn test_watermarks_cover_every_live_id() {
    for seed in 0..25 {
        let (store, _) = random_edits(seed, 300);

        for user in store.users() {
            assert!(store.max_user_id().is_some_and(|max| user <= max));
        }
        for item in store.items() {
            assert!(store.max_item_id().is_some_and(|max| item <= max));
        }
        if let Some(max) = store.max_user_id() {
            assert!(store.is_user_live(max));
        }
    }
}

#[test]
fn test_repeated_add_and_remove_are_idempotent() {
    let (mut store, reference) = random_edits(99, 200);
    let before: BTreeSet<(usize, usize)> = store.pairs().iter().copied().collect();

    for &(user, item) in &reference {
        assert!(!store.add(user, item));
    }
    assert!(!store.remove(50, 50));
    assert!(!store.remove(50, 50));

    let after: BTreeSet<(usize, usize)> = store.pairs().iter().copied().collect();
    assert_eq!(before, after);
    store.check_consistency().unwrap();
}

#[test]
fn test_snapshot_agrees_with_store() {
    let (store, reference) = random_edits(7, 300);
    let snapshot = store.snapshot();

    assert_eq!(snapshot.len(), store.len());
    assert_eq!(snapshot.num_users(), store.num_users());
    assert_eq!(snapshot.num_items(), store.num_items());

    for user in 0..store.num_users() {
        assert_eq!(snapshot.items_of(user), store.items_of(user).as_slice());
    }
    for index in 0..snapshot.len() {
        let (user, item) = snapshot.pair(index);
        assert!(reference.contains(&(user, item)));
        assert!(snapshot.contains(user, item));
    }
}
