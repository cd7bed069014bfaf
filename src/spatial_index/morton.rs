//! Morton (Z-order curve) space encoding, ported from
//! `examples/original_source/src/shared/utils/spacecode.cpp`: 21 bits per
//! axis, x interleaved highest and z lowest, MSB-first.

use glam::Vec3;

const BITS_PER_COMPONENT: u32 = 21;

/// Minimum possible space code.
pub const MIN: u64 = 0;

/// Maximum possible space code: msb = 0, every other bit set (63 bits).
pub const MAX: u64 = 0x7fff_ffff_ffff_ffff;

/// Encodes `point` (within the scene's `[min, max]` bounds) into a 63-bit
/// Morton code.
pub fn encode(point: Vec3, min: Vec3, max: Vec3) -> u64 {
    let scaled = (point - min) / (max - min);

    let factor = (1u32 << BITS_PER_COMPONENT) as f32;
    let discrete_x = (scaled.x * factor) as u32;
    let discrete_y = (scaled.y * factor) as u32;
    let discrete_z = (scaled.z * factor) as u32;

    let mut morton: u64 = 0;
    for bit in (0..BITS_PER_COMPONENT).rev() {
        let mask = 1u32 << bit;
        let bit_x = (discrete_x & mask) >> bit;
        let bit_y = (discrete_y & mask) >> bit;
        let bit_z = (discrete_z & mask) >> bit;

        morton <<= 3;
        morton |= ((bit_x << 2) | (bit_y << 1) | bit_z) as u64;
    }

    morton
}

/// Partitions the code range `[MIN, MAX)` into `worker_count` equal
/// chunks and returns the 1-based worker id owning `code` (worker ids are
/// 1-based; 0 is the miss sentinel, `spec.md` §4.2).
pub fn bucket_of(code: u64, worker_count: u32) -> u32 {
    assert!(worker_count > 0, "at least one worker is required");
    let bucket_size = (MAX + 1).div_ceil(worker_count as u64);
    ((code / bucket_size) as u32) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_of_min_corner_is_zero() {
        let min = Vec3::ZERO;
        let max = Vec3::splat(10.0);
        assert_eq!(encode(min, min, max), 0);
    }

    #[test]
    fn encode_is_monotonic_along_x() {
        let min = Vec3::ZERO;
        let max = Vec3::splat(10.0);
        let a = encode(Vec3::new(1.0, 0.0, 0.0), min, max);
        let b = encode(Vec3::new(9.0, 0.0, 0.0), min, max);
        assert!(b > a);
    }

    #[test]
    fn every_point_maps_to_exactly_one_worker_bucket() {
        let min = Vec3::ZERO;
        let max = Vec3::splat(10.0);
        let workers = 4u32;
        for i in 0..50 {
            let p = Vec3::splat(i as f32 * 0.2);
            let code = encode(p, min, max);
            let worker = bucket_of(code, workers);
            assert!(worker >= 1 && worker <= workers);
        }
    }

    #[test]
    fn bucket_of_max_code_is_last_worker() {
        let worker = bucket_of(MAX, 3);
        assert_eq!(worker, 3);
    }
}
