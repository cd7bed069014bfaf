//! Space-filling-curve spatial index (`spec.md` §4.2).
//!
//! Maps a mesh's world-space centroid to a 63-bit Morton code, and a
//! Morton code to an owning worker, during scene distribution.

mod morton;

pub use morton::{bucket_of, encode, MAX, MIN};
