use crate::raw::{self, InsertResult, ReclaimPolicy};
use crate::ReserveError;

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

/// A concurrent hash map.
///
/// Every operation takes `&self` and can be called from any number of threads at once.
/// Lookups take no locks and only wait on a write in progress to the slot they read.
/// Inserts and removals wait on other writers to the same slot or on a resize in progress. See the [crate-level documentation](crate) for details.
///
/// Values are returned by clone rather than by reference, as a concurrent update or
/// removal may free the value as soon as the lookup returns.
pub struct HashMap<K, V, S = RandomState> {
    raw: raw::HashTable<K, V>,
    hash_builder: S,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use genmap::{HashMap, ReclaimPolicy};
/// use std::collections::hash_map::RandomState;
///
/// let map: HashMap<i32, i32> = HashMap::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Set the reclamation policy.
///     .reclaim(ReclaimPolicy::Greedy)
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder<K, V, S = RandomState> {
    hasher: S,
    capacity: usize,
    reclaim: ReclaimPolicy,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> HashMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashMaps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            hasher,
            capacity: self.capacity,
            reclaim: self.reclaim,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> HashMapBuilder<K, V, S> {
    /// Set the initial number of slots in the map.
    ///
    /// The map resizes once 70% of its slots have been used, so it can hold about
    /// `capacity * 7 / 10` entries before the first resize. Capacities smaller than
    /// [`MIN_CAPACITY`](crate::MIN_CAPACITY) are rounded up.
    pub fn capacity(self, capacity: usize) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            capacity,
            hasher: self.hasher,
            reclaim: self.reclaim,
            _kv: PhantomData,
        }
    }

    /// Set the policy used to free tables that were replaced by a resize.
    /// See [`ReclaimPolicy`] for details.
    pub fn reclaim(self, reclaim: ReclaimPolicy) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            reclaim,
            hasher: self.hasher,
            capacity: self.capacity,
            _kv: PhantomData,
        }
    }

    /// Construct a [`HashMap`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the initial table cannot be allocated.
    pub fn build(self) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashTable::new(self.capacity, self.reclaim),
            hash_builder: self.hasher,
        }
    }
}

impl<K, V, S> fmt::Debug for HashMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("capacity", &self.capacity)
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

impl<K, V> HashMap<K, V> {
    /// Creates an empty `HashMap` with the smallest capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::new();
    /// ```
    pub fn new() -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(0, RandomState::new())
    }

    /// Creates an empty `HashMap` with the given number of slots.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::with_capacity(64);
    /// assert_eq!(map.capacity(), 64);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Returns a builder for a `HashMap`.
    ///
    /// The builder can be used for more complex configuration, such as choosing
    /// a [`ReclaimPolicy`].
    pub fn builder() -> HashMapBuilder<K, V> {
        HashMapBuilder {
            capacity: 0,
            hasher: RandomState::default(),
            reclaim: ReclaimPolicy::default(),
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        HashMap::with_hasher(S::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` which will use the given hash builder to hash
    /// keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let map = HashMap::with_hasher(RandomState::new());
    /// map.insert(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> HashMap<K, V, S> {
        HashMap::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty `HashMap` with the given number of slots, using
    /// `hash_builder` to hash the keys.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashTable::new(capacity, ReclaimPolicy::default()),
            hash_builder,
        }
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the reclamation policy of the map.
    #[inline]
    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        self.raw.policy()
    }

    /// Returns the number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    /// assert_eq!(map.size(), 2);
    /// ```
    #[inline]
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the number of slots in the current table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the number of replaced tables still held in memory.
    ///
    /// This is only tracked under [`ReclaimPolicy::Greedy`], and `None` is returned
    /// otherwise.
    pub fn retained(&mut self) -> Option<usize> {
        self.raw.retained()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.contains_key(&1), true);
    /// assert_eq!(map.contains_key(&2), false);
    /// ```
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.raw.find(hash, key, |_, _| ()).is_some()
    }

    /// Returns a clone of the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.find(&1), Some("a"));
    /// assert_eq!(map.find(&2), None);
    /// ```
    #[inline]
    pub fn find<Q>(&self, key: &Q) -> Option<V>
    where
        V: Clone,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.raw.find(hash, key, |_, value| value.clone())
    }

    /// Removes a key from the map, returning `true` if it was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.erase(&1), true);
    /// assert_eq!(map.erase(&1), false);
    /// ```
    #[inline]
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Removes a key from the map, returning the value at the key if it was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.raw.remove(hash, key)
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Inserts a key-value pair into the map, unless the key is already present.
    ///
    /// Returns `true` if the entry was inserted. If the key is already present,
    /// `false` is returned and the existing value is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), true);
    /// assert_eq!(map.insert(37, "b"), false);
    /// assert_eq!(map.find(&37), Some("a"));
    /// ```
    #[inline]
    pub fn insert(&self, key: K, value: V) -> bool {
        let hash = self.hash_builder.hash_one(&key);

        match self.raw.insert(hash, key, value, false, self.hash_fn()) {
            InsertResult::Inserted => true,
            InsertResult::Rejected(..) => false,
            InsertResult::Replaced(_) => unreachable!("value replaced without `replace`"),
        }
    }

    /// Inserts a key-value pair into the map, replacing the value if the key is
    /// already present.
    ///
    /// Returns the previous value, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert_eq!(map.insert_or_update(37, "a"), None);
    /// assert_eq!(map.insert_or_update(37, "b"), Some("a"));
    /// assert_eq!(map.find(&37), Some("b"));
    /// ```
    #[inline]
    pub fn insert_or_update(&self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);

        match self.raw.insert(hash, key, value, true, self.hash_fn()) {
            InsertResult::Inserted => None,
            InsertResult::Replaced(previous) => Some(previous),
            InsertResult::Rejected(..) => unreachable!("entry rejected with `replace`"),
        }
    }

    /// Grows the map so that at least `additional` more entries can be inserted
    /// without a resize.
    ///
    /// Unlike the implicit resize performed by inserts, allocation failures are
    /// reported to the caller. The map is left unchanged on failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::{HashMap, ReserveError};
    ///
    /// let map: HashMap<i32, i32> = HashMap::new();
    /// map.reserve(100).unwrap();
    /// assert!(map.capacity() * 7 / 10 > 100);
    ///
    /// assert_eq!(map.reserve(usize::MAX), Err(ReserveError::CapacityOverflow));
    /// ```
    pub fn reserve(&self, additional: usize) -> Result<(), ReserveError> {
        self.raw.reserve(additional, self.hash_fn())
    }

    /// Returns a point-in-time copy of the entries in the map.
    ///
    /// Entries inserted or removed while the snapshot is being taken may or may
    /// not be included.
    ///
    /// # Examples
    ///
    /// ```
    /// use genmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let mut entries = map.snapshot();
    /// entries.sort();
    /// assert_eq!(entries, [(1, "a"), (2, "b")]);
    /// ```
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.raw.snapshot(|key, value| (key.clone(), value.clone()))
    }

    // Rehashes existing keys during a resize.
    #[inline]
    fn hash_fn(&self) -> impl Fn(&K) -> u64 + '_ {
        move |key| self.hash_builder.hash_one(key)
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.raw.for_each(|key, value| {
            map.entry(key, value);
        });
        map.finish()
    }
}

impl<K, V, S> Extend<(K, V)> for &HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        // Keys may be already present or show up multiple times in the iterator.
        // Reserve the entire hint lower bound if the map is empty, otherwise
        // reserve half the hint, rounded up.
        let iter = iter.into_iter();
        let reserve = if self.is_empty() {
            iter.size_hint().0
        } else {
            (iter.size_hint().0 + 1) / 2
        };

        // Inserts grow the map on their own if this fails.
        let _ = self.reserve(reserve);

        for (key, value) in iter {
            self.insert_or_update(key, value);
        }
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for &HashMap<K, V, S>
where
    K: Copy + Hash + Eq + 'a,
    V: Copy + 'a,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for HashMap<K, V, RandomState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn from(arr: [(K, V); N]) -> Self {
        HashMap::from_iter(arr)
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();

        let map = HashMap::with_hasher(S::default());
        let _ = map.reserve(lower);

        for (key, value) in iter {
            map.insert_or_update(key, value);
        }

        map
    }
}
