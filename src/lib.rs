//! A 64-bit, CityHash-style, non-cryptographic hash, plus the tooling used to
//! measure its avalanche behaviour.

pub mod city;
pub mod hasher;
pub mod report;
pub mod stats;

pub use city::{hash64, hash64_prefix, hash64_str, hash64_str_prefix, Bucket};
pub use hasher::{CityBuildHasher, CityHashMap, CityHashSet, CityHasher};
