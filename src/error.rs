use std::collections::TryReserveError;

/// The error returned when a table fails to grow.
///
/// A failed resize leaves the table unchanged: the previous generation stays in place and
/// every operation keeps working, although probe lengths may degrade until a later resize
/// succeeds.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReserveError {
    /// The requested capacity does not fit in memory.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// The allocator failed to provide memory for a new generation.
    #[error("failed to allocate a table of {capacity} slots")]
    AllocError {
        /// The capacity of the generation that could not be allocated.
        capacity: usize,
        /// The underlying allocation failure.
        #[source]
        source: TryReserveError,
    },
}
