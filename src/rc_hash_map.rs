//! A hash map with an explicit reference count per entry.
//!
//! Entries aren't removed when their count reaches zero. They stay available for reuse until [`RcHashMap::drain_weak`] evicts them,
//! which lets callers batch cleanup.

use core::{
	borrow::Borrow,
	fmt::{self, Debug, Formatter},
	hash::{BuildHasher, Hash},
};
use hashbrown::{
	hash_map::{DefaultHashBuilder, DrainFilter, Entry},
	HashMap,
};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};
use thiserror::Error;

pub struct RcHashMap<K, C, V, S = DefaultHashBuilder>(HashMap<K, (C, V), S>)
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher;
impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, C, V, S> Debug for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RcHashMap").field("len", &self.0.len()).field("capacity", &self.0.capacity()).finish()
	}
}
impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Increments the count of `k`'s entry, or inserts a new entry with count one.
	///
	/// # Errors
	///
	/// Iff the count would overflow `C`.
	pub fn increment_or_insert_with<F: FnOnce() -> V>(&mut self, k: K, v: F) -> Result<&mut V, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let (c, v) = occupied.into_mut();
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(v)
			}
			Entry::Vacant(vacant) => {
				let (_, v) = vacant.insert((C::one(), v()));
				Ok(v)
			}
		}
	}

	/// Decrements the count of `k`'s entry without removing it.
	///
	/// # Errors
	///
	/// Iff the count is already zero.
	pub fn weak_decrement<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<&mut V>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some((c, v)) => {
				*c = c.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	#[must_use]
	pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<(&C, &V)>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.get(k).map(|(c, v)| (c, v))
	}

	#[must_use]
	pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.contains_key(k)
	}

	/// Removes and yields all entries with a count of zero.
	///
	/// Entries are removed even if the returned iterator isn't consumed.
	pub fn drain_weak(&mut self) -> DrainWeak<'_, K, C, V> {
		DrainWeak(self.0.drain_filter(DrainWeak::<K, C, V>::weak_filter as fn(&K, &mut (C, V)) -> bool))
	}

	/// The number of entries, including those with a count of zero.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}

pub struct DrainWeak<'a, K, C, V>(DrainFilter<'a, K, (C, V), fn(&K, &mut (C, V)) -> bool>);
impl<'a, K, C, V> DrainWeak<'a, K, C, V>
where
	C: Zero,
{
	fn weak_filter(_: &K, (c, _): &mut (C, V)) -> bool {
		c.is_zero()
	}
}
impl<'a, K, C, V> Iterator for DrainWeak<'a, K, C, V> {
	type Item = (K, V);

	fn next(&mut self) -> Option<Self::Item> {
		self.0.next().map(|(k, (_, v))| (k, v))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.0.size_hint()
	}
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("reference count saturated")]
pub struct CountSaturatedError;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counts_and_drains() {
		let mut map = RcHashMap::<&str, u8, usize>::new();
		assert_eq!(*map.increment_or_insert_with("a", || 1).unwrap(), 1);
		assert_eq!(*map.increment_or_insert_with("a", || 2).unwrap(), 1);
		map.increment_or_insert_with("b", || 3).unwrap();

		map.weak_decrement("a").unwrap();
		map.weak_decrement("b").unwrap();
		assert_eq!(map.drain_weak().map(|(k, _)| k).collect::<Vec<_>>(), ["b"]);
		assert_eq!(map.len(), 1);

		map.weak_decrement("a").unwrap();
		assert_eq!(map.weak_decrement("a"), Err(CountSaturatedError));
		assert_eq!(map.drain_weak().count(), 1);
		assert!(map.is_empty());
	}

	#[test]
	fn saturates() {
		let mut map = RcHashMap::<(), u8, ()>::new();
		for _ in 0..u8::MAX {
			map.increment_or_insert_with((), || ()).unwrap();
		}
		assert_eq!(map.increment_or_insert_with((), || ()), Err(CountSaturatedError));
	}
}
