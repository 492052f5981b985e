use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};

use seize::{AsLink, Collector, Guard, Link, LocalGuard};

use super::generation::Generation;
use super::utils::{trace, Stack};

/// The strategy used to free generations that were replaced by a resize.
///
/// A retired generation can still be in use by readers that loaded it before the resize
/// was published, so its memory cannot be returned immediately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Keep every retired generation until the table is dropped.
    ///
    /// Readers load the current generation without registering with a collector, at the
    /// cost of holding on to every previous generation. Because capacity doubles on each resize,
    /// the retired generations together take up at most as much memory as the current one.
    Greedy,

    /// Free a retired generation as soon as no thread can still be reading it.
    ///
    /// Readers are tracked with a [`seize::Collector`], which frees a retired generation
    /// once every guard that could have observed it is released. This is the default.
    #[default]
    Wise,
}

/// Reclamation state for the retired generations of a table.
///
/// Every generation is linked to the collector when it is allocated, which is what lets
/// the wise policy hand it to [`Collector::retire`]. The greedy policy never retires
/// through the collector.
pub struct Reclaim<K, V> {
    collector: Collector,
    policy: ReclaimPolicy,
    retired: Stack<*mut Generation<K, V>>,
}

/// Protection for the current generation, held for the duration of a read.
pub enum ReadGuard<'a> {
    Greedy,
    Wise(LocalGuard<'a>),
}

impl<K, V> Reclaim<K, V> {
    pub fn new(policy: ReclaimPolicy) -> Reclaim<K, V> {
        Reclaim {
            // Generations are large and retired rarely, each one is reclaimed on its own.
            collector: Collector::new().batch_size(1),
            policy,
            retired: Stack::new(),
        }
    }

    #[inline]
    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    /// Create a link for a new generation.
    #[inline]
    pub fn link(&self) -> Link {
        self.collector.link()
    }

    /// Mark the current thread as reading.
    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        match self.policy {
            ReclaimPolicy::Greedy => ReadGuard::Greedy,
            ReclaimPolicy::Wise => ReadGuard::Wise(self.collector.enter()),
        }
    }

    /// Retire a generation that is no longer reachable from the table.
    ///
    /// # Safety
    ///
    /// The generation must have been allocated with `Box` and linked to this collector,
    /// unlinked from the table, and no writer may still be operating on it. It must not be
    /// retired twice.
    pub unsafe fn retire(&self, generation: *mut Generation<K, V>) {
        match self.policy {
            ReclaimPolicy::Greedy => {
                trace!("linking retired generation {generation:p}");
                self.retired.push(generation);
            }
            ReclaimPolicy::Wise => {
                trace!("retiring generation {generation:p}");

                // Safety: Guaranteed by caller. Readers only access generations through
                // guards protected by this collector.
                unsafe {
                    self.collector
                        .retire(generation, seize::reclaim::boxed::<Generation<K, V>>)
                }
            }
        }
    }

    /// Returns the number of retired generations still held in memory, if tracked.
    pub fn retained(&mut self) -> Option<usize> {
        match self.policy {
            ReclaimPolicy::Greedy => Some(self.retired.len()),
            ReclaimPolicy::Wise => None,
        }
    }
}

impl<K, V> Drop for Reclaim<K, V> {
    fn drop(&mut self) {
        // The collector frees its own retired values when dropped.

        // Safety: We have `&mut self`, no readers can be active.
        self.retired.drain(|generation| unsafe { drop(Box::from_raw(generation)) });
    }
}

impl<K, V> fmt::Debug for Reclaim<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reclaim").field(&self.policy()).finish()
    }
}

impl ReadGuard<'_> {
    /// Load a generation pointer, protecting it for the lifetime of the guard.
    #[inline]
    pub fn protect<T: AsLink>(&self, ptr: &AtomicPtr<T>) -> *mut T {
        match self {
            ReadGuard::Greedy => ptr.load(Ordering::Acquire),
            ReadGuard::Wise(guard) => guard.protect(ptr, Ordering::Acquire),
        }
    }
}
