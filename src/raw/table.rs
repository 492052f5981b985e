use std::borrow::Borrow;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::generation::{high_watermark, Generation};
use super::lock::{PhaseLock, Reservations};
use super::probe;
use super::reclaim::{Reclaim, ReclaimPolicy};
use super::slot::{ReaderGuard, State, Tag};
use super::utils::{debug, warning, Backoff};
use crate::ReserveError;

/// A concurrent open-addressing hash table.
///
/// The table is made up of a single live [`Generation`]. Readers probe the generation
/// without any locking. Writers claim slots with compare-and-swap while holding the
/// shared phase of a [`PhaseLock`], and a resize takes the exclusive phase to copy the
/// generation into one of twice the capacity.
///
/// Hashing is left to the caller: operations take the hash of the key, and inserts take
/// a hasher to re-derive the hashes of existing keys when resizing.
pub struct HashTable<K, V> {
    /// The generation that readers probe.
    current: AtomicPtr<Generation<K, V>>,

    /// The generation that writers operate on.
    ///
    /// This is the same as `current`, except while a resize is in progress, during which
    /// it is null.
    mutable: AtomicPtr<Generation<K, V>>,

    /// Separates writers from the resizing thread.
    lock: PhaseLock,

    /// The number of inserts in flight.
    reservations: Reservations,

    /// Retired generations.
    reclaim: Reclaim<K, V>,

    _generations: PhantomData<Box<Generation<K, V>>>,
}

/// The result of an insert operation.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertResult<K, V> {
    /// The key was not present.
    Inserted,

    /// The key was present and its value was replaced.
    Replaced(V),

    /// The key was present and the entry was not inserted.
    Rejected(K, V),
}

impl<K, V> HashTable<K, V> {
    /// Creates a new table with the given initial capacity and reclamation policy.
    pub fn new(capacity: usize, policy: ReclaimPolicy) -> HashTable<K, V> {
        let reclaim = Reclaim::new(policy);

        let generation = match Generation::alloc(capacity, reclaim.link()) {
            Ok(generation) => generation,
            Err(err) => panic!("failed to allocate hash table: {err}"),
        };

        let generation = Box::into_raw(Box::new(generation));

        HashTable {
            current: AtomicPtr::new(generation),
            mutable: AtomicPtr::new(generation),
            lock: PhaseLock::new(),
            reservations: Reservations::new(),
            reclaim,
            _generations: PhantomData,
        }
    }

    /// Returns the reclamation policy of this table.
    #[inline]
    pub fn policy(&self) -> ReclaimPolicy {
        self.reclaim.policy()
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.with_current(Generation::size)
    }

    /// Returns the capacity of the current generation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.with_current(|generation| generation.capacity)
    }

    /// Returns the watermark of the current generation.
    #[cfg(test)]
    pub fn high_watermark(&self) -> usize {
        self.with_current(|generation| generation.high_watermark)
    }

    /// Returns the number of retired generations kept in memory, under the greedy policy.
    pub fn retained(&mut self) -> Option<usize> {
        self.reclaim.retained()
    }

    // Run a closure with a protected reference to the current generation.
    #[inline]
    fn with_current<T>(&self, f: impl FnOnce(&Generation<K, V>) -> T) -> T {
        let guard = self.reclaim.read();

        // Safety: The current generation is never null, and the guard keeps it from being
        // reclaimed until it is dropped.
        let generation = unsafe { &*guard.protect(&self.current) };

        f(generation)
    }

    /// Call a closure with every live entry of the current generation.
    ///
    /// Entries inserted or removed concurrently may or may not be observed.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        self.with_current(|generation| {
            for entry in generation.entries() {
                f(entry.key(), entry.value());
            }
        })
    }

    /// Collect every live entry of the current generation.
    pub fn snapshot<T>(&self, mut f: impl FnMut(&K, &V) -> T) -> Vec<T> {
        let mut entries = Vec::with_capacity(self.len());
        self.for_each(|key, value| entries.push(f(key, value)));
        entries
    }
}

impl<K, V> HashTable<K, V>
where
    K: Eq,
{
    /// Find the entry for a key, calling the given closure with it.
    #[inline]
    pub fn find<Q, T>(&self, hash: u64, key: &Q, f: impl FnOnce(&K, &V) -> T) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.with_current(|generation| {
            Self::find_in(generation, hash, key).map(|entry| f(entry.key(), entry.value()))
        })
    }

    // Probe a generation for a key, returning a guard for its value if it is present.
    fn find_in<'g, Q>(
        generation: &'g Generation<K, V>,
        hash: u64,
        key: &Q,
    ) -> Option<ReaderGuard<'g, K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let fingerprint = Tag::fingerprint(hash);
        let mut probe = generation.probe(hash);
        let mut backoff = Backoff::new();

        loop {
            if probe.exhausted() {
                probe::exhausted(generation.capacity);
            }

            let slot = generation.slot(probe.i);
            let tag = slot.tag(Ordering::Acquire);

            match tag.state() {
                // The key cannot be further along the probe sequence.
                State::Unused => return None,

                // A different key.
                _ if tag.hash() != fingerprint => {}

                // The key for this slot is not yet known, wait for the insert to complete.
                State::Pending => {
                    backoff.snooze();
                    continue;
                }

                state => {
                    // Safety: The key is initialized past `Pending`, and we loaded the tag
                    // with `Acquire`.
                    if unsafe { slot.key() }.borrow() == key {
                        match state {
                            State::Allocated => match slot.read() {
                                Ok(guard) => return Some(guard),

                                // Lost a race with an erase or update, re-examine the slot.
                                Err(_) => {
                                    backoff.snooze();
                                    continue;
                                }
                            },

                            // The value is being written to.
                            State::Pending2 => {
                                backoff.snooze();
                                continue;
                            }

                            // The key was erased.
                            _ => return None,
                        }
                    }
                }
            }

            probe.next();
        }
    }

    /// Remove a key from the table, returning its value if it was present.
    pub fn remove<Q>(&self, hash: u64, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.write(|generation| Self::remove_in(generation, hash, key))
    }

    fn remove_in<Q>(generation: &Generation<K, V>, hash: u64, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let fingerprint = Tag::fingerprint(hash);
        let mut probe = generation.probe(hash);
        let mut backoff = Backoff::new();

        loop {
            if probe.exhausted() {
                probe::exhausted(generation.capacity);
            }

            let slot = generation.slot(probe.i);
            let tag = slot.tag(Ordering::Acquire);

            match tag.state() {
                State::Unused => return None,

                _ if tag.hash() != fingerprint => {}

                State::Pending => {
                    backoff.snooze();
                    continue;
                }

                state => {
                    // Safety: The key is initialized past `Pending`.
                    if unsafe { slot.key() }.borrow() == key {
                        match state {
                            State::Allocated => match slot.try_claim_value(tag) {
                                Ok(()) => {
                                    // Readers that started before the claim may still hold
                                    // a reference to the value.
                                    slot.wait_for_readers();

                                    // Safety: We claimed the slot from `Allocated` and all
                                    // readers have drained.
                                    let value = unsafe { slot.take_value() };
                                    generation.record_erase();
                                    slot.publish(fingerprint, State::Touched);
                                    return Some(value);
                                }

                                // Lost to a concurrent writer, re-examine the slot.
                                Err(_) => continue,
                            },

                            State::Pending2 => {
                                backoff.snooze();
                                continue;
                            }

                            // Already erased.
                            _ => return None,
                        }
                    }
                }
            }

            probe.next();
        }
    }

    // Run a write operation against the mutable generation.
    //
    // Holds the shared phase of the lock for the duration of the operation, waiting out any
    // resize in progress.
    #[inline]
    fn write<T>(&self, f: impl FnOnce(&Generation<K, V>) -> T) -> T {
        let mut backoff = Backoff::new();

        loop {
            let _shared = self.lock.shared();

            let generation = self.mutable.load(Ordering::SeqCst);

            // A resize is in progress.
            if generation.is_null() {
                drop(_shared);
                backoff.snooze();
                continue;
            }

            // Safety: The mutable generation cannot be retired while we hold the shared
            // phase of the lock.
            return f(unsafe { &*generation });
        }
    }
}

impl<K, V> HashTable<K, V>
where
    K: Eq + Clone,
    V: Clone,
{
    /// Insert a key-value pair into the table.
    ///
    /// If the key is present the value is replaced if `replace` is `true`, and the entry is
    /// rejected otherwise. `hasher` is used to rehash existing keys if the table resizes.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn insert(
        &self,
        hash: u64,
        key: K,
        value: V,
        replace: bool,
        hasher: impl Fn(&K) -> u64,
    ) -> InsertResult<K, V> {
        let _reservation = self.reservations.reserve();
        let mut backoff = Backoff::new();

        // Set if a resize failed, in which case we insert into the current generation anyway.
        let mut degraded = false;

        loop {
            let shared = self.lock.shared();

            let generation = self.mutable.load(Ordering::SeqCst);

            // A resize is in progress.
            if generation.is_null() {
                drop(shared);
                backoff.snooze();
                continue;
            }

            // Safety: The mutable generation cannot be retired while we hold the shared
            // phase of the lock.
            let current = unsafe { &*generation };

            if !degraded && current.should_grow(self.reservations.count()) {
                // The resize has to wait for all writers, including us. `current` must not
                // be touched once the shared phase is released, as it may be retired.
                drop(shared);

                let grown = self.grow(generation, &hasher, |old| {
                    if !old.should_grow(self.reservations.count()) {
                        return Ok(None);
                    }

                    match old.capacity.checked_mul(2) {
                        Some(capacity) => Ok(Some(capacity)),
                        None => Err(ReserveError::CapacityOverflow),
                    }
                });

                if let Err(err) = grown {
                    warning!("failed to grow hash table, continuing with the current table: {err}");
                    degraded = true;
                }

                continue;
            }

            return Self::insert_in(current, hash, key, value, replace);
        }
    }

    fn insert_in(
        generation: &Generation<K, V>,
        hash: u64,
        key: K,
        value: V,
        replace: bool,
    ) -> InsertResult<K, V> {
        let fingerprint = Tag::fingerprint(hash);
        let mut probe = generation.probe(hash);
        let mut backoff = Backoff::new();

        loop {
            if probe.exhausted() {
                probe::exhausted(generation.capacity);
            }

            let slot = generation.slot(probe.i);
            let tag = slot.tag(Ordering::Acquire);

            match tag.state() {
                State::Unused => match slot.try_claim_insert(fingerprint) {
                    Ok(()) => {
                        // Safety: We claimed the slot from `Unused`.
                        unsafe {
                            slot.write_key(key);
                            slot.write_value(value);
                        }

                        generation.record_insert();
                        slot.publish(fingerprint, State::Allocated);
                        return InsertResult::Inserted;
                    }

                    // Lost the slot to a concurrent insert, which may be for the same key.
                    Err(_) => continue,
                },

                _ if tag.hash() != fingerprint => {}

                // Wait until we know which key is being inserted.
                State::Pending => {
                    backoff.snooze();
                    continue;
                }

                state => {
                    // Safety: The key is initialized past `Pending`.
                    if unsafe { slot.key() } == &key {
                        match state {
                            State::Allocated if !replace => {
                                return InsertResult::Rejected(key, value);
                            }

                            State::Allocated => match slot.try_claim_value(tag) {
                                Ok(()) => {
                                    slot.wait_for_readers();

                                    // Safety: We claimed the slot from `Allocated` and all
                                    // readers have drained.
                                    let previous = unsafe { slot.replace_value(value) };
                                    slot.publish(fingerprint, State::Allocated);
                                    return InsertResult::Replaced(previous);
                                }

                                Err(_) => continue,
                            },

                            // Reuse the tombstone left by an erase of this key.
                            State::Touched => match slot.try_claim_reinsert(tag) {
                                Ok(()) => {
                                    // Safety: We claimed the slot from `Touched`.
                                    unsafe { slot.write_value(value) };
                                    generation.record_reinsert();
                                    slot.publish(fingerprint, State::Allocated);
                                    return InsertResult::Inserted;
                                }

                                Err(_) => continue,
                            },

                            // Someone else is writing to this key.
                            _ => {
                                backoff.snooze();
                                continue;
                            }
                        }
                    }
                }
            }

            probe.next();
        }
    }

    /// Grow the table so that `additional` more keys can be inserted without a resize.
    pub fn reserve(
        &self,
        additional: usize,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<(), ReserveError> {
        loop {
            let target = self.write(|generation| -> Result<_, ReserveError> {
                let needed = generation
                    .used()
                    .checked_add(additional)
                    .ok_or(ReserveError::CapacityOverflow)?;

                if needed < generation.high_watermark {
                    return Ok(None);
                }

                // Resizing clears tombstones, so only live entries need room.
                let needed = generation.size() + additional;
                let mut capacity = generation.capacity;
                loop {
                    capacity = capacity
                        .checked_mul(2)
                        .ok_or(ReserveError::CapacityOverflow)?;

                    if needed < high_watermark(capacity) {
                        break;
                    }
                }

                let generation = (generation as *const Generation<K, V>).cast_mut();
                Ok(Some((generation, capacity)))
            })?;

            match target {
                None => return Ok(()),
                Some((generation, capacity)) => {
                    self.grow(generation, &hasher, |old| {
                        Ok((old.capacity < capacity).then_some(capacity))
                    })?
                }
            }
        }
    }

    // Replace the given generation with a larger one.
    //
    // Only one thread can replace a generation. If another thread wins the race, or the
    // generation was already replaced, this returns immediately and the caller should
    // retry its operation. The decision to grow was made without exclusive access, so
    // `target` is asked for the new capacity only after winning, and returns `None` if the
    // generation no longer needs to grow.
    //
    // `generation` is only compared against the mutable pointer until the race is won, it
    // may already have been retired.
    fn grow(
        &self,
        generation: *mut Generation<K, V>,
        hasher: &impl Fn(&K) -> u64,
        target: impl FnOnce(&Generation<K, V>) -> Result<Option<usize>, ReserveError>,
    ) -> Result<(), ReserveError> {
        // Detach the mutable generation, new writers will wait for us to publish.
        if self
            .mutable
            .compare_exchange(generation, ptr::null_mut(), Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return Ok(());
        }

        // Restores the generation if we bail out early, or panic.
        let detached = Detached {
            mutable: &self.mutable,
            generation,
        };

        // Wait for writers that loaded the generation before we detached it.
        let exclusive = self.lock.exclusive();

        // Safety: We detached the generation and it can only be retired by us.
        let old = unsafe { &*generation };

        let Some(capacity) = target(old)? else {
            // Another thread already made room.
            detached.restore();
            return Ok(());
        };

        let next = self.migrate(old, capacity, hasher)?;

        // Publish the new generation.
        self.current.store(next, Ordering::SeqCst);
        detached.publish(next);
        drop(exclusive);

        // Safety: The old generation is no longer reachable, and all writers have moved on
        // to the new generation.
        unsafe { self.reclaim.retire(generation) };

        Ok(())
    }

    // Copy the live entries of a generation into a new generation of the given capacity.
    //
    // Requires exclusive access to the old generation, no writers may be active.
    fn migrate(
        &self,
        old: &Generation<K, V>,
        capacity: usize,
        hasher: &impl Fn(&K) -> u64,
    ) -> Result<*mut Generation<K, V>, ReserveError> {
        debug!(
            from = old.capacity,
            to = capacity,
            size = old.size(),
            used = old.used(),
            "resizing hash table"
        );

        let mut next = Generation::alloc(capacity, self.reclaim.link())?;

        // Entries are cloned rather than moved, as readers may still be accessing the
        // old generation.
        for entry in old.entries() {
            let key = entry.key();
            next.place(hasher(key), key.clone(), entry.value().clone());
        }

        debug_assert_eq!(next.size(), old.size());
        debug!(capacity, size = next.size(), "resized hash table");

        Ok(Box::into_raw(Box::new(next)))
    }
}

// A generation detached from the mutable pointer during a resize.
struct Detached<'a, K, V> {
    mutable: &'a AtomicPtr<Generation<K, V>>,
    generation: *mut Generation<K, V>,
}

impl<K, V> Detached<'_, K, V> {
    // Publish the generation that replaces the detached one.
    fn publish(self, next: *mut Generation<K, V>) {
        self.mutable.store(next, Ordering::SeqCst);
        std::mem::forget(self);
    }

    // Re-attach the generation, which did not need to grow after all.
    fn restore(self) {
        self.mutable.store(self.generation, Ordering::SeqCst);
        std::mem::forget(self);
    }
}

impl<K, V> Drop for Detached<'_, K, V> {
    fn drop(&mut self) {
        // The resize failed or panicked, restore the old generation unchanged.
        debug!("resize aborted, restoring generation {:p}", self.generation);
        self.mutable.store(self.generation, Ordering::SeqCst);
    }
}

impl<K, V> Drop for HashTable<K, V> {
    fn drop(&mut self) {
        let current = *self.current.get_mut();
        debug_assert_eq!(current, *self.mutable.get_mut());

        // Safety: We have `&mut self` and the current generation is never retired. Retired
        // generations are freed by the reclamation policy.
        unsafe { drop(Box::from_raw(current)) }
    }
}
