#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use genmap::{HashMap as GenHashMap, ReclaimPolicy};
use std::collections::HashMap as StdHashMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Insert(K, V),
    InsertOrUpdate(K, V),
    Remove(K),
    Erase(K),
    Find(K),
    Contains(K),
    Reserve(u16),
    Size,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    greedy: bool,
    colliding: bool,
    capacity: u8,
    operations: Vec<Operation<u32, u32>>,
}

// Sends every key down the same probe sequence.
#[derive(Default)]
struct ZeroHasher;

impl Hasher for ZeroHasher {
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, _: &[u8]) {}
}

fn fuzz_hashmap(input: FuzzInput) {
    let policy = if input.greedy {
        ReclaimPolicy::Greedy
    } else {
        ReclaimPolicy::Wise
    };

    let builder = GenHashMap::builder()
        .capacity(input.capacity as usize)
        .reclaim(policy);

    if input.colliding {
        let map = builder
            .hasher(BuildHasherDefault::<ZeroHasher>::default())
            .build();
        check(map, input.operations);
    } else {
        check(builder.build(), input.operations);
    }
}

fn check<S: BuildHasher>(gen_map: GenHashMap<u32, u32, S>, operations: Vec<Operation<u32, u32>>) {
    let mut std_map = StdHashMap::new();

    for op in operations {
        match op {
            Operation::Insert(k, v) => {
                let std_result = !std_map.contains_key(&k);
                std_map.entry(k).or_insert(v);
                assert_eq!(std_result, gen_map.insert(k, v));
            }
            Operation::InsertOrUpdate(k, v) => {
                assert_eq!(std_map.insert(k, v), gen_map.insert_or_update(k, v));
            }
            Operation::Remove(k) => {
                assert_eq!(std_map.remove(&k), gen_map.remove(&k));
            }
            Operation::Erase(k) => {
                assert_eq!(std_map.remove(&k).is_some(), gen_map.erase(&k));
            }
            Operation::Find(k) => {
                assert_eq!(std_map.get(&k).copied(), gen_map.find(&k));
            }
            Operation::Contains(k) => {
                assert_eq!(std_map.contains_key(&k), gen_map.contains_key(&k));
            }
            Operation::Reserve(additional) => {
                gen_map.reserve(additional as usize).unwrap();
            }
            Operation::Size => {
                assert_eq!(std_map.len(), gen_map.size());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), gen_map.is_empty());
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        assert_eq!(Some(*v), gen_map.find(k));
    }
    assert_eq!(std_map.len(), gen_map.size());
    assert_eq!(std_map.len(), gen_map.snapshot().len());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashmap(data);
});
