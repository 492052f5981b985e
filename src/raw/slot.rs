use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::{fmt, ptr};

use super::utils::Backoff;

/// The lifecycle state of a slot.
///
/// A slot moves through the states in a fixed order:
///
/// ```text
/// UNUSED -> PENDING -> ALLOCATED -> PENDING2 -> TOUCHED -> PENDING2 -> ALLOCATED -> ...
/// ```
///
/// Once a slot leaves `Unused` its key stays initialized until the generation is dropped,
/// which is what allows readers to compare keys without synchronizing with writers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// The slot has never been claimed. The hash, key, and value are uninitialized.
    Unused = 0,

    /// A writer claimed the slot for a first insert and is constructing the key and value.
    Pending = 1,

    /// The key and value are initialized and visible.
    Allocated = 2,

    /// A writer claimed the slot to erase, update, or re-insert the value. The key is valid,
    /// the value is not.
    Pending2 = 3,

    /// The key is valid, the value was erased.
    Touched = 4,
}

/// A `(hash, state)` pair that is read and updated as one atomic unit.
///
/// The low bits hold the [`State`], the rest hold a fingerprint of the key's hash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u64);

impl Tag {
    // Mask for the state bits.
    const STATE: u64 = 0b111;

    /// The tag of a slot that was never claimed.
    pub const UNUSED: Tag = Tag(0);

    /// Returns the fingerprint stored for the given hash.
    #[inline]
    pub fn fingerprint(hash: u64) -> u64 {
        hash & !Tag::STATE
    }

    #[inline]
    pub fn new(fingerprint: u64, state: State) -> Tag {
        debug_assert_eq!(fingerprint & Tag::STATE, 0);
        Tag(fingerprint | state as u64)
    }

    #[inline]
    pub fn state(self) -> State {
        match self.0 & Tag::STATE {
            0 => State::Unused,
            1 => State::Pending,
            2 => State::Allocated,
            3 => State::Pending2,
            4 => State::Touched,
            _ => unreachable!("invalid slot state"),
        }
    }

    #[inline]
    pub fn hash(self) -> u64 {
        self.0 & !Tag::STATE
    }

    #[inline]
    pub fn with_state(self, state: State) -> Tag {
        Tag::new(self.hash(), state)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("hash", &format_args!("{:#x}", self.hash()))
            .field("state", &self.state())
            .finish()
    }
}

/// A single cell of a generation.
///
/// The key and value are constructed and destroyed explicitly as the slot changes state.
/// Slots never move, so references into a slot are valid for as long as the generation is.
pub struct Slot<K, V> {
    tag: AtomicU64,
    readers: AtomicUsize,
    key: UnsafeCell<MaybeUninit<K>>,
    value: UnsafeCell<MaybeUninit<V>>,
}

// Safety: Keys and values are shared between readers and moved between threads by writers,
// all access is synchronized through the slot tag and reader count.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Slot<K, V> {}

impl<K, V> Slot<K, V> {
    pub fn new() -> Slot<K, V> {
        Slot {
            tag: AtomicU64::new(Tag::UNUSED.0),
            readers: AtomicUsize::new(0),
            key: UnsafeCell::new(MaybeUninit::uninit()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Load the tag of this slot.
    #[inline]
    pub fn tag(&self, ordering: Ordering) -> Tag {
        Tag(self.tag.load(ordering))
    }

    /// Claim an unused slot for a first insert, moving it to `Pending`.
    ///
    /// On success the caller owns the key and value storage and must initialize both
    /// before calling [`Slot::publish`] with `Allocated`.
    #[inline]
    pub fn try_claim_insert(&self, fingerprint: u64) -> Result<(), Tag> {
        self.tag
            .compare_exchange(
                Tag::UNUSED.0,
                Tag::new(fingerprint, State::Pending).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(drop)
            .map_err(Tag)
    }

    /// Claim a tombstone for a re-insert, moving it from `Touched` to `Pending2`.
    ///
    /// On success the caller must initialize the value before publishing `Allocated`.
    #[inline]
    pub fn try_claim_reinsert(&self, current: Tag) -> Result<(), Tag> {
        debug_assert_eq!(current.state(), State::Touched);
        self.claim(current)
    }

    /// Claim a live slot for an erase or update, moving it from `Allocated` to `Pending2`.
    ///
    /// On success the caller must call [`Slot::wait_for_readers`] before touching the value.
    #[inline]
    pub fn try_claim_value(&self, current: Tag) -> Result<(), Tag> {
        debug_assert_eq!(current.state(), State::Allocated);
        self.claim(current)
    }

    #[inline]
    fn claim(&self, current: Tag) -> Result<(), Tag> {
        // `SeqCst` pairs with the reader count handshake in `Slot::read`.
        self.tag
            .compare_exchange(
                current.0,
                current.with_state(State::Pending2).0,
                Ordering::SeqCst,
                Ordering::Acquire,
            )
            .map(drop)
            .map_err(Tag)
    }

    /// Publish a new state for a slot claimed by this thread.
    #[inline]
    pub fn publish(&self, fingerprint: u64, state: State) {
        debug_assert!(matches!(state, State::Allocated | State::Touched));
        self.tag
            .store(Tag::new(fingerprint, state).0, Ordering::Release);
    }

    /// Spin until every reader that observed the value before it was claimed has let go.
    #[inline]
    pub fn wait_for_readers(&self) {
        let mut backoff = Backoff::new();

        while self.readers.load(Ordering::SeqCst) != 0 {
            backoff.snooze();
        }
    }

    /// Acquire a reader guard for the value of this slot.
    ///
    /// Fails with the current tag if the slot is no longer `Allocated`, in which case the value
    /// must not be accessed.
    #[inline]
    pub fn read(&self) -> Result<ReaderGuard<'_, K, V>, Tag> {
        self.readers.fetch_add(1, Ordering::SeqCst);
        let guard = ReaderGuard { slot: self };

        // Any erase that claimed the slot before our increment is visible here, and any
        // erase that claims it after will wait for us to release the guard.
        let tag = self.tag(Ordering::SeqCst);
        if tag.state() != State::Allocated {
            return Err(tag);
        }

        Ok(guard)
    }

    /// Acquire a reader guard, waiting out any in-flight transition of this slot.
    ///
    /// Returns `None` if the slot holds no value.
    pub fn read_settled(&self) -> Option<ReaderGuard<'_, K, V>> {
        let mut backoff = Backoff::new();

        loop {
            match self.tag(Ordering::Acquire).state() {
                State::Unused | State::Touched => return None,
                State::Pending | State::Pending2 => backoff.snooze(),
                State::Allocated => match self.read() {
                    Ok(guard) => return Some(guard),
                    Err(_) => backoff.snooze(),
                },
            }
        }
    }

    /// Returns a reference to the key.
    ///
    /// # Safety
    ///
    /// The slot must have been observed with `Acquire` in a state other than `Unused` or
    /// `Pending`.
    #[inline]
    pub unsafe fn key(&self) -> &K {
        unsafe { (*self.key.get()).assume_init_ref() }
    }

    /// Initialize the key.
    ///
    /// # Safety
    ///
    /// The slot must be claimed from `Unused` by this thread.
    #[inline]
    pub unsafe fn write_key(&self, key: K) {
        unsafe { (*self.key.get()).write(key) };
    }

    /// Initialize the value.
    ///
    /// # Safety
    ///
    /// The slot must be claimed from `Unused` or `Touched` by this thread.
    #[inline]
    pub unsafe fn write_value(&self, value: V) {
        unsafe { (*self.value.get()).write(value) };
    }

    /// Move the value out of the slot.
    ///
    /// # Safety
    ///
    /// The slot must be claimed from `Allocated` by this thread, with all readers drained.
    #[inline]
    pub unsafe fn take_value(&self) -> V {
        unsafe { ptr::read((*self.value.get()).as_ptr()) }
    }

    /// Replace the value, returning the previous one.
    ///
    /// # Safety
    ///
    /// Same as [`Slot::take_value`].
    #[inline]
    pub unsafe fn replace_value(&self, value: V) -> V {
        unsafe {
            let previous = self.take_value();
            self.write_value(value);
            previous
        }
    }

    /// Initialize an unused slot that is not yet shared with other threads.
    pub fn place(&mut self, fingerprint: u64, key: K, value: V) {
        debug_assert_eq!(Tag(*self.tag.get_mut()).state(), State::Unused);

        self.key.get_mut().write(key);
        self.value.get_mut().write(value);
        *self.tag.get_mut() = Tag::new(fingerprint, State::Allocated).0;
    }
}

impl<K, V> Drop for Slot<K, V> {
    fn drop(&mut self) {
        let state = Tag(*self.tag.get_mut()).state();

        // Generations are only dropped once no thread can reach them, by which point
        // every in-flight transition has been published.
        debug_assert!(!matches!(state, State::Pending | State::Pending2));

        // Safety: The key is initialized in every state past `Pending`, and the value
        // is initialized in `Allocated`.
        unsafe {
            match state {
                State::Allocated => {
                    self.key.get_mut().assume_init_drop();
                    self.value.get_mut().assume_init_drop();
                }
                State::Touched => self.key.get_mut().assume_init_drop(),
                _ => {}
            }
        }
    }
}

/// A guard that keeps the value of a slot alive while it is being read.
///
/// Erase and update wait for every outstanding guard on the slot before destroying the value.
pub struct ReaderGuard<'g, K, V> {
    slot: &'g Slot<K, V>,
}

impl<K, V> ReaderGuard<'_, K, V> {
    #[inline]
    pub fn key(&self) -> &K {
        // Safety: The slot was `Allocated` when the guard was acquired.
        unsafe { self.slot.key() }
    }

    #[inline]
    pub fn value(&self) -> &V {
        // Safety: The slot was `Allocated` when the guard was acquired, and the value
        // cannot be destroyed until the guard is dropped.
        unsafe { (*self.slot.value.get()).assume_init_ref() }
    }
}

impl<K, V> Drop for ReaderGuard<'_, K, V> {
    #[inline]
    fn drop(&mut self) {
        self.slot.readers.fetch_sub(1, Ordering::Release);
    }
}
