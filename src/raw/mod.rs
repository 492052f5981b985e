mod generation;
mod lock;
mod probe;
mod reclaim;
mod slot;
mod table;
mod utils;

pub use generation::MIN_CAPACITY;
pub use reclaim::ReclaimPolicy;
pub use table::{HashTable, InsertResult};
