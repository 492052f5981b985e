// adapted from: https://github.com/jonhoo/flurry/blob/main/tests/basic.rs

use genmap::{HashMap, ReclaimPolicy, ReserveError, MIN_CAPACITY};

mod common;
use common::{with_map, with_policy, Constant, Identity};

use std::hash::{BuildHasher, BuildHasherDefault, Hasher};
use std::sync::Arc;

#[test]
fn new() {
    with_map::<usize, usize>(|map| drop(map()));
}

#[test]
fn default() {
    let map: HashMap<usize, usize> = HashMap::default();
    assert!(map.is_empty());
    assert_eq!(map.capacity(), MIN_CAPACITY);
    assert_eq!(map.reclaim_policy(), ReclaimPolicy::Wise);

    map.insert(42, 0);
    assert_eq!(map.find(&42), Some(0));
}

#[test]
fn insert() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.insert(42, 0));
        assert_eq!(map.size(), 1);
    });
}

#[test]
fn find_empty() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert_eq!(map.find(&42), None);
        assert!(!map.contains_key(&42));
    });
}

#[test]
fn erase_empty() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(!map.erase(&42));
        assert_eq!(map.remove(&42), None);
    });
}

#[test]
fn insert_and_remove() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.insert(42, 0);
        assert_eq!(map.remove(&42), Some(0));
        assert_eq!(map.find(&42), None);
        assert!(map.is_empty());
    });
}

#[test]
fn insert_and_find() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.insert(42, 0);
        assert_eq!(map.find(&42), Some(0));
        assert!(map.contains_key(&42));
    });
}

#[test]
fn insert_duplicate() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.insert(42, 0));
        assert!(!map.insert(42, 1));

        // The existing value is left untouched.
        assert_eq!(map.find(&42), Some(0));
        assert_eq!(map.size(), 1);
    });
}

#[test]
fn insert_or_update() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert_eq!(map.insert_or_update(42, 0), None);
        assert_eq!(map.insert_or_update(42, 1), Some(0));
        assert_eq!(map.find(&42), Some(1));
        assert_eq!(map.size(), 1);
    });
}

#[test]
fn erase_twice() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.insert(42, 0);
        assert!(map.erase(&42));
        assert!(!map.erase(&42));
        assert_eq!(map.size(), 0);
    });
}

#[test]
fn reinsert_after_erase() {
    with_map::<usize, usize>(|map| {
        let map = map();
        for round in 0..10 {
            assert!(map.insert(42, round));
            assert_eq!(map.find(&42), Some(round));
            assert!(map.erase(&42));
            assert_eq!(map.find(&42), None);
        }

        // Reusing the same slot never counts against the load factor.
        assert_eq!(map.capacity(), MIN_CAPACITY);
    });
}

#[test]
fn borrowed_lookup() {
    with_map::<String, usize>(|map| {
        let map = map();
        map.insert("foo".to_owned(), 1);

        assert_eq!(map.find("foo"), Some(1));
        assert!(map.contains_key("foo"));
        assert!(!map.contains_key("bar"));
        assert_eq!(map.remove("foo"), Some(1));
    });
}

#[test]
fn grows_past_double_capacity() {
    with_policy(|policy| {
        const CAPACITY: i64 = 100;

        let map: HashMap<i64, i64> = HashMap::builder()
            .capacity(CAPACITY as usize)
            .reclaim(policy)
            .build();

        for i in 1..=(2 * CAPACITY + 1) {
            assert!(map.insert(i, i * 10));
        }

        assert!(map.capacity() > 2 * CAPACITY as usize);
        assert_eq!(map.size(), (2 * CAPACITY + 1) as usize);

        for i in 1..=(2 * CAPACITY + 1) {
            assert_eq!(map.find(&i), Some(i * 10));
        }
        assert_eq!(map.find(&-1), None);
    });
}

#[test]
fn capacity_doubles() {
    with_policy(|policy| {
        let map: HashMap<u64, u64, Identity> = HashMap::builder()
            .capacity(10)
            .hasher(Identity::default())
            .reclaim(policy)
            .build();

        let mut capacities = vec![map.capacity()];
        for i in 0..1000 {
            map.insert(i, i);

            let capacity = map.capacity();
            if capacity != *capacities.last().unwrap() {
                capacities.push(capacity);
            }
        }

        assert_eq!(capacities, [10, 20, 40, 80, 160, 320, 640, 1280, 2560]);
    });
}

#[test]
fn retained_generations() {
    let mut map: HashMap<usize, usize> = HashMap::builder()
        .reclaim(ReclaimPolicy::Greedy)
        .build();

    assert_eq!(map.retained(), Some(0));
    for i in 0..100 {
        map.insert(i, i);
    }

    // 8 -> 16 -> 32 -> 64 -> 128 -> 256
    assert_eq!(map.retained(), Some(5));

    let mut map: HashMap<usize, usize> = HashMap::builder()
        .reclaim(ReclaimPolicy::Wise)
        .build();
    map.insert(1, 1);
    assert_eq!(map.retained(), None);
}

#[test]
fn reserve() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.reserve(1000).unwrap();

        let capacity = map.capacity();
        assert!(capacity * 7 / 10 > 1000);

        for i in 0..1000 {
            map.insert(i, i);
        }
        assert_eq!(map.capacity(), capacity);
    });
}

#[test]
fn reserve_overflow() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.insert(1, 1);

        assert_eq!(map.reserve(usize::MAX), Err(ReserveError::CapacityOverflow));
        assert_eq!(map.reserve(usize::MAX / 2), Err(ReserveError::CapacityOverflow));

        // The map is left as it was.
        assert_eq!(map.capacity(), MIN_CAPACITY);
        assert_eq!(map.find(&1), Some(1));
        assert!(map.insert(2, 2));
        assert!(map.erase(&1));
    });
}

#[test]
fn snapshot() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let len = if cfg!(miri) { 100 } else { 10_000 };
        for i in 0..len {
            map.insert(i, i + 1);
        }
        for i in (0..len).step_by(2) {
            map.erase(&i);
        }

        let mut got = map.snapshot();
        got.sort();

        let expected: Vec<_> = (1..len).step_by(2).map(|i| (i, i + 1)).collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn concurrent_insert() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                map1.insert(i, 0);
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                map2.insert(i, 1);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        assert_eq!(map.size(), 64);
        for i in 0..64 {
            let v = map.find(&i).unwrap();
            assert!(v == 0 || v == 1);
        }
    });
}

#[test]
fn concurrent_insert_unique() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let threads = common::threads();

        // Exactly one thread wins each key.
        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let map = &map;
                    s.spawn(move || (0..1024).filter(|&i| map.insert(i, t)).count())
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(wins, 1024);
        assert_eq!(map.size(), 1024);
    });
}

#[test]
fn concurrent_remove() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        for i in 0..64 {
            map.insert(i, i);
        }

        let remove = |map: Arc<HashMap<usize, usize>>| {
            move || {
                let mut removed = 0;
                for i in 0..64 {
                    if let Some(v) = map.remove(&i) {
                        assert_eq!(v, i);
                        removed += 1;
                    }
                }
                removed
            }
        };

        let t1 = std::thread::spawn(remove(map.clone()));
        let t2 = std::thread::spawn(remove(map.clone()));

        // Every key is removed exactly once.
        assert_eq!(t1.join().unwrap() + t2.join().unwrap(), 64);

        assert!(map.is_empty());
        for i in 0..64 {
            assert_eq!(map.find(&i), None);
        }
    });
}

#[test]
fn concurrent_update() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        for i in 0..64 {
            map.insert(i, 0);
        }

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                let old = map1.insert_or_update(i, 1).unwrap();
                assert!(old == 0 || old == 2);
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                let old = map2.insert_or_update(i, 2).unwrap();
                assert!(old == 0 || old == 1);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        for i in 0..64 {
            let v = map.find(&i).unwrap();
            assert!(v == 1 || v == 2);
        }
    });
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_resize_and_find() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        for i in 0..1024 {
            map.insert(i, i);
        }

        let map1 = map.clone();
        // t1 is using reserve to trigger a bunch of resizes
        let t1 = std::thread::spawn(move || {
            for power in 11..16 {
                map1.reserve(1 << power).unwrap();
            }
        });
        let map2 = map.clone();
        // t2 is reading existing keys while the table is replaced underneath it
        let t2 = std::thread::spawn(move || {
            for _ in 0..32 {
                for i in 0..1024 {
                    assert_eq!(map2.find(&i), Some(i));
                }
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        // make sure all the entries still exist after all the resizes
        for i in 0..1024 {
            assert_eq!(map.find(&i), Some(i));
        }
    });
}

#[test]
fn current_kv_dropped() {
    let dropped1 = Arc::new(0);
    let dropped2 = Arc::new(0);

    with_map::<Arc<usize>, Arc<usize>>(|map| {
        let map = map();
        map.insert(dropped1.clone(), dropped2.clone());
        assert_eq!(Arc::strong_count(&dropped1), 2);
        assert_eq!(Arc::strong_count(&dropped2), 2);

        drop(map);

        // dropping the map should immediately drop (not deferred) all keys and values
        assert_eq!(Arc::strong_count(&dropped1), 1);
        assert_eq!(Arc::strong_count(&dropped2), 1);
    });
}

#[test]
fn resized_kv_dropped() {
    let value = Arc::new(0);

    with_map::<usize, Arc<usize>>(|map| {
        let map = map();
        for i in 0..256 {
            map.insert(i, value.clone());
        }
        for i in 0..128 {
            assert!(map.erase(&i));
        }
        drop(map);

        // Copies left behind in replaced tables are freed as well.
        assert_eq!(Arc::strong_count(&value), 1);
    });
}

#[test]
fn custom_key_equality() {
    // Keys that compare and hash without regard to ASCII case.
    #[derive(Clone, Debug)]
    struct Caseless(String);

    impl PartialEq for Caseless {
        fn eq(&self, other: &Self) -> bool {
            self.0.eq_ignore_ascii_case(&other.0)
        }
    }

    impl Eq for Caseless {}

    impl std::hash::Hash for Caseless {
        fn hash<H: Hasher>(&self, state: &mut H) {
            for byte in self.0.bytes() {
                state.write_u8(byte.to_ascii_lowercase());
            }
        }
    }

    with_map::<Caseless, usize>(|map| {
        let map = map();
        assert!(map.insert(Caseless("Key".to_owned()), 1));
        assert!(!map.insert(Caseless("KEY".to_owned()), 2));
        assert_eq!(map.find(&Caseless("key".to_owned())), Some(1));
        assert!(map.erase(&Caseless("kEy".to_owned())));
        assert!(map.is_empty());
    });
}

#[test]
fn replaced_kv_freed_while_live() {
    let value = Arc::new(0);

    let map: HashMap<usize, Arc<usize>> = HashMap::builder()
        .reclaim(ReclaimPolicy::Wise)
        .build();

    for i in 0..256 {
        map.insert(i, value.clone());
    }
    assert!(map.capacity() > MIN_CAPACITY);

    // Tables replaced by a resize are freed once no lookup can be reading them.
    assert_eq!(Arc::strong_count(&value), 256 + 1);

    for i in 0..128 {
        assert!(map.erase(&i));
    }
    assert_eq!(Arc::strong_count(&value), 128 + 1);

    drop(map);
    assert_eq!(Arc::strong_count(&value), 1);
}

#[test]
fn debug() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.insert(42, 0);
        map.insert(16, 8);

        let formatted = format!("{:?}", map);

        assert!(formatted == "{42: 0, 16: 8}" || formatted == "{16: 8, 42: 0}");
    });
}

#[test]
fn extend() {
    with_map::<usize, usize>(|map| {
        let map = map();

        let mut entries: Vec<(usize, usize)> = vec![(42, 0), (16, 6), (38, 42)];
        entries.sort_unstable();

        (&map).extend(entries.clone().into_iter());

        let mut collected = map.snapshot();
        collected.sort_unstable();

        assert_eq!(entries, collected);
    });
}

#[test]
fn extend_ref() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let entries: Vec<(&usize, &usize)> = vec![(&42, &0), (&16, &6), (&38, &42)];

        (&map).extend(entries.clone().into_iter());

        let mut collected = map.snapshot();
        collected.sort();

        assert_eq!(collected, [(16, 6), (38, 42), (42, 0)]);
    });
}

#[test]
fn from_iter_empty() {
    let entries: Vec<(usize, usize)> = Vec::new();
    let map: HashMap<usize, usize> = HashMap::from_iter(entries);

    assert_eq!(map.size(), 0)
}

#[test]
fn from_array() {
    let map = HashMap::from([(1, "a"), (2, "b")]);
    assert_eq!(map.size(), 2);
    assert_eq!(map.find(&2), Some("b"));
}

#[test]
fn mixed() {
    const LEN: usize = if cfg!(miri) { 48 } else { 1024 };
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.find(&100).is_none());
        map.insert(100, 101);
        assert_eq!(map.find(&100), Some(101));
        map.insert_or_update(100, 103);
        assert_eq!(map.find(&100), Some(103));

        assert!(map.find(&200).is_none());
        map.insert(200, 202);
        assert_eq!(map.find(&200), Some(202));

        assert!(map.find(&300).is_none());

        assert_eq!(map.remove(&100), Some(103));
        assert_eq!(map.remove(&200), Some(202));
        assert!(map.remove(&300).is_none());

        assert!(map.find(&100).is_none());
        assert!(map.find(&200).is_none());
        assert!(map.find(&300).is_none());

        for i in 0..LEN {
            assert!(map.insert(i, i + 1));
        }

        for i in 0..LEN {
            assert_eq!(map.find(&i), Some(i + 1));
        }

        for i in 0..LEN {
            assert_eq!(map.insert_or_update(i, i), Some(i + 1));
        }

        for i in 0..LEN {
            assert_eq!(map.find(&i), Some(i));
        }

        for i in 0..LEN {
            assert_eq!(map.remove(&i), Some(i));
        }

        for i in 0..LEN {
            assert_eq!(map.find(&i), None);
        }

        for i in 0..(LEN * 2) {
            assert!(map.insert(i, i + 1));
        }

        for i in 0..(LEN * 2) {
            assert_eq!(map.find(&i), Some(i + 1));
        }
    });
}

// run tests with hashers that create unrealistically long probe sequences
mod hasher {
    use super::*;

    fn check<S: BuildHasher + Default>() {
        let range = if cfg!(miri) { 0..16 } else { 0..100 };

        with_policy(|policy| {
            let map: HashMap<i32, i32, S> = HashMap::builder()
                .hasher(S::default())
                .reclaim(policy)
                .build();

            for i in range.clone() {
                map.insert(i, i);
            }

            assert!(!map.contains_key(&i32::MIN));
            assert!(!map.contains_key(&(range.start - 1)));
            for i in range.clone() {
                assert!(map.contains_key(&i));
            }
            assert!(!map.contains_key(&range.end));
            assert!(!map.contains_key(&i32::MAX));

            for i in range.clone().step_by(2) {
                assert!(map.erase(&i));
            }
            for i in range.clone() {
                assert_eq!(map.find(&i), (i % 2 == 1).then_some(i));
            }
        });
    }

    #[test]
    fn test_zero_hasher() {
        check::<Constant>();
    }

    #[test]
    fn test_max_hasher() {
        #[derive(Default)]
        struct MaxHasher;

        impl Hasher for MaxHasher {
            fn finish(&self) -> u64 {
                u64::MAX
            }

            fn write(&mut self, _: &[u8]) {}
        }

        check::<BuildHasherDefault<MaxHasher>>();
    }
}
