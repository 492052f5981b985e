use crate::raw::{self, InsertResult, ReclaimPolicy};
use crate::ReserveError;

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

/// A concurrent hash set.
///
/// A set is a [`HashMap`](crate::HashMap) with unit values, and shares its concurrency
/// guarantees. See the [crate-level documentation](crate) for details.
pub struct HashSet<K, S = RandomState> {
    raw: raw::HashTable<K, ()>,
    hash_builder: S,
}

/// A builder for a [`HashSet`].
///
/// # Examples
///
/// ```rust
/// use genmap::{HashSet, ReclaimPolicy};
/// use std::collections::hash_map::RandomState;
///
/// let set: HashSet<i32> = HashSet::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Set the reclamation policy.
///     .reclaim(ReclaimPolicy::Wise)
///     // Construct the hash set.
///     .build();
/// ```
pub struct HashSetBuilder<K, S = RandomState> {
    hasher: S,
    capacity: usize,
    reclaim: ReclaimPolicy,
    _k: PhantomData<K>,
}

impl<K> HashSetBuilder<K> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashSets to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashSetBuilder<K, S> {
        HashSetBuilder {
            hasher,
            capacity: self.capacity,
            reclaim: self.reclaim,
            _k: PhantomData,
        }
    }
}

impl<K, S> HashSetBuilder<K, S> {
    /// Set the initial number of slots in the set.
    ///
    /// Capacities smaller than [`MIN_CAPACITY`](crate::MIN_CAPACITY) are rounded up.
    pub fn capacity(self, capacity: usize) -> HashSetBuilder<K, S> {
        HashSetBuilder {
            capacity,
            hasher: self.hasher,
            reclaim: self.reclaim,
            _k: PhantomData,
        }
    }

    /// Set the policy used to free tables that were replaced by a resize.
    /// See [`ReclaimPolicy`] for details.
    pub fn reclaim(self, reclaim: ReclaimPolicy) -> HashSetBuilder<K, S> {
        HashSetBuilder {
            reclaim,
            hasher: self.hasher,
            capacity: self.capacity,
            _k: PhantomData,
        }
    }

    /// Construct a [`HashSet`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the initial table cannot be allocated.
    pub fn build(self) -> HashSet<K, S> {
        HashSet {
            raw: raw::HashTable::new(self.capacity, self.reclaim),
            hash_builder: self.hasher,
        }
    }
}

impl<K, S> fmt::Debug for HashSetBuilder<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashSetBuilder")
            .field("capacity", &self.capacity)
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

impl<K> HashSet<K> {
    /// Creates an empty `HashSet` with the smallest capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashSet;
    /// let set: HashSet<&str> = HashSet::new();
    /// ```
    pub fn new() -> HashSet<K> {
        HashSet::with_capacity_and_hasher(0, RandomState::new())
    }

    /// Creates an empty `HashSet` with the given number of slots.
    pub fn with_capacity(capacity: usize) -> HashSet<K> {
        HashSet::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Returns a builder for a `HashSet`.
    pub fn builder() -> HashSetBuilder<K> {
        HashSetBuilder {
            capacity: 0,
            hasher: RandomState::default(),
            reclaim: ReclaimPolicy::default(),
            _k: PhantomData,
        }
    }
}

impl<K, S> Default for HashSet<K, S>
where
    S: Default,
{
    fn default() -> Self {
        HashSet::with_hasher(S::default())
    }
}

impl<K, S> HashSet<K, S> {
    /// Creates an empty `HashSet` which will use the given hash builder to hash
    /// keys.
    pub fn with_hasher(hash_builder: S) -> HashSet<K, S> {
        HashSet::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty `HashSet` with the given number of slots, using
    /// `hash_builder` to hash the keys.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashSet<K, S> {
        HashSet {
            raw: raw::HashTable::new(capacity, ReclaimPolicy::default()),
            hash_builder,
        }
    }

    /// Returns a reference to the set's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the reclamation policy of the set.
    #[inline]
    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        self.raw.policy()
    }

    /// Returns the number of keys in the set.
    #[inline]
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the set is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashSet;
    ///
    /// let set = HashSet::new();
    /// assert!(set.is_empty());
    /// set.insert("a");
    /// assert!(!set.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the number of slots in the current table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the number of replaced tables still held in memory, under
    /// [`ReclaimPolicy::Greedy`].
    pub fn retained(&mut self) -> Option<usize> {
        self.raw.retained()
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the set contains the specified key.
    ///
    /// The key may be any borrowed form of the set's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashSet;
    ///
    /// let set = HashSet::new();
    /// set.insert(1);
    /// assert_eq!(set.contains(&1), true);
    /// assert_eq!(set.contains(&2), false);
    /// ```
    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.raw.find(hash, key, |_, _| ()).is_some()
    }

    /// Removes a key from the set, returning `true` if it was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashSet;
    ///
    /// let set = HashSet::new();
    /// set.insert(1);
    /// assert_eq!(set.erase(&1), true);
    /// assert_eq!(set.erase(&1), false);
    /// ```
    #[inline]
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.raw.remove(hash, key).is_some()
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    /// Adds a key to the set.
    ///
    /// Returns `true` if the key was not already present.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashSet;
    ///
    /// let set = HashSet::new();
    /// assert_eq!(set.insert(37), true);
    /// assert_eq!(set.insert(37), false);
    /// assert_eq!(set.size(), 1);
    /// ```
    #[inline]
    pub fn insert(&self, key: K) -> bool {
        let hash = self.hash_builder.hash_one(&key);

        match self.raw.insert(hash, key, (), false, self.hash_fn()) {
            InsertResult::Inserted => true,
            InsertResult::Rejected(..) => false,
            InsertResult::Replaced(_) => unreachable!("value replaced without `replace`"),
        }
    }

    /// Grows the set so that at least `additional` more keys can be inserted
    /// without a resize.
    ///
    /// The set is left unchanged on failure.
    pub fn reserve(&self, additional: usize) -> Result<(), ReserveError> {
        self.raw.reserve(additional, self.hash_fn())
    }

    /// Returns a point-in-time copy of the keys in the set.
    pub fn snapshot(&self) -> Vec<K> {
        self.raw.snapshot(|key, _| key.clone())
    }

    #[inline]
    fn hash_fn(&self) -> impl Fn(&K) -> u64 + '_ {
        move |key| self.hash_builder.hash_one(key)
    }
}

impl<K, S> fmt::Debug for HashSet<K, S>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        self.raw.for_each(|key, _| {
            set.entry(key);
        });
        set.finish()
    }
}

impl<K, S> Extend<K> for &HashSet<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = K>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        let reserve = if self.is_empty() {
            iter.size_hint().0
        } else {
            (iter.size_hint().0 + 1) / 2
        };

        // Inserts grow the set on their own if this fails.
        let _ = self.reserve(reserve);

        for key in iter {
            self.insert(key);
        }
    }
}

impl<'a, K, S> Extend<&'a K> for &HashSet<K, S>
where
    K: Copy + Hash + Eq + 'a,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = &'a K>>(&mut self, iter: T) {
        self.extend(iter.into_iter().copied());
    }
}

impl<K, const N: usize> From<[K; N]> for HashSet<K, RandomState>
where
    K: Hash + Eq + Clone,
{
    fn from(arr: [K; N]) -> Self {
        HashSet::from_iter(arr)
    }
}

impl<K, S> FromIterator<K> for HashSet<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();

        let set = HashSet::with_hasher(S::default());
        let _ = set.reserve(lower);

        for key in iter {
            set.insert(key);
        }

        set
    }
}
