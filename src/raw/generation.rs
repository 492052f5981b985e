use std::alloc::Layout;
use std::sync::atomic::{AtomicUsize, Ordering};

use seize::{AsLink, Link};

use super::probe::{self, Probe};
use super::slot::{ReaderGuard, Slot, State, Tag};
use super::utils::CachePadded;
use crate::ReserveError;

/// The smallest capacity a generation is allocated with.
pub const MIN_CAPACITY: usize = 8;

/// One complete instance of the hash table.
///
/// A generation is a fixed-capacity slot array. When it fills up past its watermark it is
/// replaced wholesale by a generation of twice the capacity.
#[repr(C)]
pub struct Generation<K, V> {
    // Must be the first field, see `AsLink`.
    #[allow(dead_code)]
    link: Link,

    slots: Box<[Slot<K, V>]>,

    /// The number of slots.
    pub capacity: usize,

    /// The load threshold that triggers a resize.
    pub high_watermark: usize,

    /// The number of live entries.
    size: CachePadded<AtomicUsize>,

    /// The number of slots that ever left `Unused`.
    ///
    /// Tombstones keep counting towards this, so a table that churns through keys
    /// still resizes before its probe sequences degrade.
    used: CachePadded<AtomicUsize>,
}

// Safety: `Generation` is `repr(C)` and `seize::Link` is the first field.
unsafe impl<K, V> AsLink for Generation<K, V> {}

// Safety: The link is only accessed by the collector. Slots synchronize access to their
// contents through their tags.
unsafe impl<K: Send, V: Send> Send for Generation<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Generation<K, V> {}

impl<K, V> Generation<K, V> {
    /// Allocate an empty generation, linked to a reclamation collector.
    ///
    /// Allocation failures are returned instead of aborting, so a failed resize can
    /// fall back to the previous generation.
    pub fn alloc(capacity: usize, link: Link) -> Result<Generation<K, V>, ReserveError> {
        let capacity = capacity.max(MIN_CAPACITY);

        if Layout::array::<Slot<K, V>>(capacity).is_err() {
            return Err(ReserveError::CapacityOverflow);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|source| ReserveError::AllocError { capacity, source })?;
        slots.resize_with(capacity, Slot::new);

        Ok(Generation {
            link,
            slots: slots.into_boxed_slice(),
            capacity,
            high_watermark: high_watermark(capacity),
            size: CachePadded::new(AtomicUsize::new(0)),
            used: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the slot at the given index.
    #[inline]
    pub fn slot(&self, i: usize) -> &Slot<K, V> {
        debug_assert!(i < self.capacity);

        // Safety: Probe indices are always reduced modulo the capacity.
        unsafe { self.slots.get_unchecked(i) }
    }

    /// Start a probe sequence for the given hash.
    #[inline]
    pub fn probe(&self, hash: u64) -> Probe {
        Probe::start(hash, self.capacity)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Record a first insert into an unused slot.
    #[inline]
    pub fn record_insert(&self) {
        self.size.fetch_add(1, Ordering::Relaxed);
        self.used.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a re-insert into a tombstone, which was already counted as used.
    #[inline]
    pub fn record_reinsert(&self) {
        self.size.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_erase(&self) {
        self.size.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns `true` if this generation should be replaced before inserting.
    ///
    /// `reservations` is the number of inserts currently in flight. Counting them keeps
    /// concurrent inserters from collectively overshooting the watermark.
    #[inline]
    pub fn should_grow(&self, reservations: usize) -> bool {
        self.used().saturating_add(reservations) >= self.high_watermark
    }

    /// Insert a key that is known not to be present into a generation that is not shared
    /// with any other thread.
    pub fn place(&mut self, hash: u64, key: K, value: V) {
        let fingerprint = Tag::fingerprint(hash);
        let mut probe = self.probe(hash);

        loop {
            if probe.exhausted() {
                probe::exhausted(self.capacity);
            }

            let slot = &mut self.slots[probe.i];
            if slot.tag(Ordering::Relaxed).state() == State::Unused {
                slot.place(fingerprint, key, value);
                *self.size.get_mut() += 1;
                *self.used.get_mut() += 1;
                return;
            }

            probe.next();
        }
    }

    /// Returns an iterator over reader guards for every live entry.
    ///
    /// Entries that are being written to are waited on rather than skipped.
    pub fn entries(&self) -> impl Iterator<Item = ReaderGuard<'_, K, V>> {
        self.slots.iter().filter_map(Slot::read_settled)
    }
}

// `capacity * 0.7`, without overflowing.
#[inline]
pub fn high_watermark(capacity: usize) -> usize {
    (capacity / 10) * 7 + (capacity % 10) * 7 / 10
}
