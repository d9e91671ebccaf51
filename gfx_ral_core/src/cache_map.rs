//! Fixed-capacity open-addressed hash table with linear probing (§4.11).
//!
//! No keys are stored — only the caller-supplied hash. A hash collision is
//! therefore treated as equality; callers (the root-signature cache, in
//! particular) are responsible for choosing a hash with enough domain
//! separation that this is an acceptable risk. Value slot addresses are
//! stable for the lifetime of the map (until [`CacheMap::clear`]).

pub type Hash = u64;

const TOMBSTONE: Hash = Hash::MAX;

pub struct CacheMap<V> {
    hashes: Vec<Hash>,
    values: Vec<Option<V>>,
}

impl<V> CacheMap<V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache map capacity must be non-zero");
        let mut values = Vec::with_capacity(capacity);
        values.resize_with(capacity, || None);
        Self { hashes: vec![TOMBSTONE; capacity], values }
    }

    pub fn capacity(&self) -> usize {
        self.hashes.len()
    }

    pub fn contains(&self, hash: Hash) -> bool {
        self.find(hash).is_some()
    }

    /// Returns a reference that stays valid until the next `clear`.
    pub fn look_up(&self, hash: Hash) -> Option<&V> {
        let idx = self.find(hash)?;
        self.values[idx].as_ref()
    }

    pub fn look_up_mut(&mut self, hash: Hash) -> Option<&mut V> {
        let idx = self.find(hash)?;
        self.values[idx].as_mut()
    }

    /// Insert `value` under `hash`, returning a stable reference to it.
    ///
    /// Capacity exhaustion (no tombstone found after a full probe cycle) is
    /// fatal: the map's size is a configured promise.
    pub fn insert(&mut self, hash: Hash, value: V) -> &mut V {
        assert_ne!(hash, TOMBSTONE, "illegal hash value (reserved as the tombstone marker)");
        let cap = self.hashes.len();
        let mut index = (hash as usize) % cap;
        for _ in 0..cap {
            index = (index + 1) % cap;
            if self.hashes[index] == TOMBSTONE {
                self.hashes[index] = hash;
                self.values[index] = Some(value);
                return self.values[index].as_mut().unwrap();
            }
        }
        panic!("cache map full (capacity {cap})");
    }

    pub fn iterate(&self, mut f: impl FnMut(&V)) {
        for (h, v) in self.hashes.iter().zip(self.values.iter()) {
            if *h != TOMBSTONE {
                f(v.as_ref().unwrap());
            }
        }
    }

    pub fn clear(&mut self) {
        for h in &mut self.hashes {
            *h = TOMBSTONE;
        }
        for v in &mut self.values {
            *v = None;
        }
    }

    fn find(&self, hash: Hash) -> Option<usize> {
        assert_ne!(hash, TOMBSTONE, "illegal hash value (reserved as the tombstone marker)");
        let cap = self.hashes.len();
        let mut index = (hash as usize) % cap;
        for _ in 0..cap {
            index = (index + 1) % cap;
            if self.hashes[index] == hash {
                return Some(index);
            }
            if self.hashes[index] == TOMBSTONE {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_look_up() {
        let mut map = CacheMap::new(8);
        let ptr_before = map.insert(42, "root-sig-a".to_string()) as *mut String;
        let ptr_after = map.look_up(42).unwrap() as *const String as *mut String;
        assert_eq!(ptr_before, ptr_after);
        assert_eq!(map.look_up(42).unwrap(), "root-sig-a");
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut map: CacheMap<u32> = CacheMap::new(4);
        map.insert(1, 100);
        map.clear();
        assert!(map.look_up(1).is_none());
    }

    #[test]
    #[should_panic(expected = "full")]
    fn exhaustion_is_fatal() {
        let mut map: CacheMap<u32> = CacheMap::new(2);
        map.insert(1, 1);
        map.insert(2, 2);
        map.insert(3, 3);
    }

    #[test]
    fn linear_probing_resolves_collision() {
        // both hash to bucket index 0 before probing.
        let mut map: CacheMap<u32> = CacheMap::new(4);
        map.insert(4, 10);
        map.insert(8, 20);
        assert_eq!(*map.look_up(4).unwrap(), 10);
        assert_eq!(*map.look_up(8).unwrap(), 20);
    }
}
