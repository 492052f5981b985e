#![doc = include_str!("../README.md")]
#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod map;
mod raw;
mod set;

pub use error::ReserveError;
pub use map::{HashMap, HashMapBuilder};
pub use raw::{ReclaimPolicy, MIN_CAPACITY};
pub use set::{HashSet, HashSetBuilder};
