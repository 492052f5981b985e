use std::sync::atomic::{AtomicUsize, Ordering};

use super::utils::{Backoff, CachePadded};

/// A two-phase lock separating concurrent writers from a single resizer.
///
/// Any number of writers hold the lock in the shared phase at once. The exclusive phase is
/// taken only while a generation is being replaced: it blocks new shared acquisitions and
/// waits for the existing ones to drain. Readers never touch this lock.
///
/// All waiting is done by spinning.
pub struct PhaseLock {
    // The top bit marks a pending or held exclusive phase, the rest count shared holders.
    state: CachePadded<AtomicUsize>,
}

impl PhaseLock {
    const EXCLUSIVE: usize = 1 << (usize::BITS - 1);

    pub fn new() -> PhaseLock {
        PhaseLock {
            state: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire the lock in the shared phase.
    ///
    /// Spins while an exclusive phase is pending.
    #[inline]
    pub fn shared(&self) -> Shared<'_> {
        let mut backoff = Backoff::new();
        let mut state = self.state.load(Ordering::Relaxed);

        loop {
            if state & PhaseLock::EXCLUSIVE != 0 {
                backoff.snooze();
                state = self.state.load(Ordering::Relaxed);
                continue;
            }

            // `SeqCst` orders the increment before the caller's load of the mutable
            // generation, see `HashTable::grow`.
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Shared { lock: self },
                Err(found) => state = found,
            }
        }
    }

    /// Acquire the lock in the exclusive phase.
    ///
    /// Blocks new shared acquisitions immediately, then spins until every existing shared
    /// holder has released the lock.
    pub fn exclusive(&self) -> Exclusive<'_> {
        let mut backoff = Backoff::new();

        // Announce the exclusive phase.
        while self.state.fetch_or(PhaseLock::EXCLUSIVE, Ordering::SeqCst) & PhaseLock::EXCLUSIVE
            != 0
        {
            // Someone else is in the exclusive phase.
            backoff.snooze();
        }

        let exclusive = Exclusive { lock: self };

        // Wait for in-flight writers to drain.
        let mut backoff = Backoff::new();
        while self.state.load(Ordering::SeqCst) != PhaseLock::EXCLUSIVE {
            backoff.snooze();
        }

        exclusive
    }

    /// Returns the number of shared holders.
    #[cfg(test)]
    fn holders(&self) -> usize {
        self.state.load(Ordering::Relaxed) & !PhaseLock::EXCLUSIVE
    }
}

/// The shared phase of a [`PhaseLock`], released on drop.
pub struct Shared<'a> {
    lock: &'a PhaseLock,
}

impl Drop for Shared<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::Release);
    }
}

/// The exclusive phase of a [`PhaseLock`], released on drop.
pub struct Exclusive<'a> {
    lock: &'a PhaseLock,
}

impl Drop for Exclusive<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock
            .state
            .fetch_and(!PhaseLock::EXCLUSIVE, Ordering::SeqCst);
    }
}

/// The number of inserts currently in flight.
///
/// Inserters hold a [`Reservation`] for the whole operation, and the watermark check adds
/// the count to the generation's usage.
pub struct Reservations(CachePadded<AtomicUsize>);

impl Reservations {
    pub fn new() -> Reservations {
        Reservations(CachePadded::new(AtomicUsize::new(0)))
    }

    /// Reserve room for one insert.
    #[inline]
    pub fn reserve(&self) -> Reservation<'_> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Reservation { counter: self }
    }

    /// Returns the number of outstanding reservations.
    #[inline]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// An in-flight insert, released on drop.
pub struct Reservation<'a> {
    counter: &'a Reservations,
}

impl Drop for Reservation<'_> {
    #[inline]
    fn drop(&mut self) {
        self.counter.0.fetch_sub(1, Ordering::Relaxed);
    }
}
