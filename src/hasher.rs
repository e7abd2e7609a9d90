//! `std::hash` adapters, for using the digest as a `HashMap` hasher or to
//! build cache keys from several fields.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hasher};

use crate::city::hash64;

/// Buffers everything written to it and hashes the whole buffer on `finish`.
///
/// The digest therefore depends only on the concatenation of the written
/// bytes: one `write(b"ab")` and two writes `b"a"`, `b"b"` finish the same.
#[derive(Debug, Default, Clone)]
pub struct CityHasher {
    buffer: Vec<u8>,
}

impl CityHasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for CityHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    #[inline]
    fn finish(&self) -> u64 {
        hash64(&self.buffer)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CityBuildHasher;

impl BuildHasher for CityBuildHasher {
    type Hasher = CityHasher;

    fn build_hasher(&self) -> CityHasher {
        CityHasher::new()
    }
}

pub type CityHashMap<K, V> = HashMap<K, V, CityBuildHasher>;
pub type CityHashSet<T> = HashSet<T, CityBuildHasher>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hash;

    #[test]
    fn single_write_matches_hash64() {
        for data in [&b""[..], b"A", b"hello world", &[0xab; 200][..]] {
            let mut hasher = CityHasher::new();
            hasher.write(data);
            assert_eq!(hasher.finish(), hash64(data));
        }
    }

    #[test]
    fn split_writes_match_single_write() {
        let data: Vec<u8> = (0..150u8).collect();
        let mut whole = CityHasher::new();
        whole.write(&data);

        let mut pieces = CityHasher::new();
        for chunk in data.chunks(7) {
            pieces.write(chunk);
        }
        assert_eq!(whole.finish(), pieces.finish());
    }

    #[test]
    fn finish_does_not_consume() {
        let mut hasher = CityHasher::new();
        hasher.write(b"abc");
        assert_eq!(hasher.finish(), hasher.finish());
        hasher.write(b"d");
        assert_eq!(hasher.finish(), hash64(b"abcd"));
    }

    #[test]
    fn build_hasher_is_deterministic() {
        let a = CityBuildHasher.hash_one(("key", 7u32));
        let b = CityBuildHasher.hash_one(("key", 7u32));
        let c = CityBuildHasher.hash_one(("key", 8u32));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_map_round_trip() {
        let mut map: CityHashMap<String, usize> = CityHashMap::default();
        for i in 0..1000 {
            map.insert(format!("entry-{}", i), i);
        }
        assert_eq!(map.len(), 1000);
        assert_eq!(map.get("entry-512"), Some(&512));

        let mut set: CityHashSet<u64> = CityHashSet::default();
        assert!(set.insert(1));
        assert!(!set.insert(1));
    }

    #[test]
    fn derived_hash_feeds_the_buffer() {
        #[derive(Hash)]
        struct Key {
            name: &'static str,
            id: u32,
        }
        let mut hasher = CityHasher::new();
        Key { name: "a", id: 1 }.hash(&mut hasher);

        let mut manual = CityHasher::new();
        "a".hash(&mut manual);
        1u32.hash(&mut manual);
        assert_eq!(hasher.finish(), manual.finish());
    }
}
