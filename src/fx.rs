//! Fast, non-cryptographic hash collections, re-exported under one name so the rest of the
//! crate doesn't care which hasher backs them.

pub use rustc_hash::{FxHashMap, FxHashSet};