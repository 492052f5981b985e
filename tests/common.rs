#![allow(dead_code)]

use genmap::{HashMap, HashSet, ReclaimPolicy};

use std::hash::{BuildHasherDefault, Hasher};

// Run the test on different configurations of a `HashMap`.
pub fn with_map<K, V>(mut test: impl FnMut(&dyn Fn() -> HashMap<K, V>)) {
    // Retired tables are kept until the map is dropped.
    test(&(|| HashMap::builder().reclaim(ReclaimPolicy::Greedy).build()));

    // Retired tables are freed by the collector.
    test(&(|| HashMap::builder().reclaim(ReclaimPolicy::Wise).build()));
}

// Run the test on different configurations of a `HashSet`.
pub fn with_set<K>(mut test: impl FnMut(&dyn Fn() -> HashSet<K>)) {
    test(&(|| HashSet::builder().reclaim(ReclaimPolicy::Greedy).build()));
    test(&(|| HashSet::builder().reclaim(ReclaimPolicy::Wise).build()));
}

// Run the test under both reclamation policies.
pub fn with_policy(mut test: impl FnMut(ReclaimPolicy)) {
    test(ReclaimPolicy::Greedy);
    test(ReclaimPolicy::Wise);
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}

// A hasher that sends every key to the same slot.
#[derive(Default)]
pub struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, _: &[u8]) {}
}

pub type Constant = BuildHasherDefault<ConstantHasher>;

// A hasher that maps integer keys to themselves, for predictable probe sequences.
#[derive(Default)]
pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 << 8) | u64::from(byte);
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }

    fn write_i64(&mut self, n: i64) {
        self.0 = n as u64;
    }
}

pub type Identity = BuildHasherDefault<IdentityHasher>;
