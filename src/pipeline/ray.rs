//! The ray-kind tagged union and the owning-worker hit record
//! (`spec.md` §3, §9: "FatRay's `kind` becomes a variant with three
//! payloads").

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::traversal::TraversalState;

/// The result of traversal-so-far: which worker owns the closest hit (0
/// is the miss sentinel, `spec.md` §3), which mesh, and the local
/// shading geometry at the hit point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitRecord {
    pub worker: u32,
    pub mesh: u32,
    pub t: f32,
    pub normal: Vec3,
    pub texcoord: Vec2,
}

impl Default for HitRecord {
    fn default() -> Self {
        Self {
            worker: 0,
            mesh: 0,
            t: f32::INFINITY,
            normal: Vec3::ZERO,
            texcoord: Vec2::ZERO,
        }
    }
}

impl HitRecord {
    pub fn is_miss(&self) -> bool {
        self.worker == 0
    }

    /// Invariant 2 (`spec.md` §3): a hit is never replaced by one with
    /// equal-or-greater `t`.
    pub fn consider(&mut self, worker: u32, mesh: u32, t: f32, normal: Vec3, texcoord: Vec2) -> bool {
        if worker != 0 && t < self.t {
            self.worker = worker;
            self.mesh = mesh;
            self.t = t;
            self.normal = normal;
            self.texcoord = texcoord;
            true
        } else {
            false
        }
    }
}

/// The three ray kinds of the pipeline state machine (`spec.md` §4.4).
/// `Illuminate` carries no payload of its own: it reuses the common
/// `hit` field (inherited from the terminating INTERSECT ray it was
/// copied from) to recover the hit point `P`. `Light` carries the
/// explicit occlusion target since by the time it is constructed the
/// common `hit` field has been reset for a fresh traversal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RayKind {
    Intersect,
    Illuminate,
    Light { target: Vec3, emission: Vec3 },
}

/// A ray carrying its full pipeline state, suspendable and resumable
/// across worker boundaries (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatRay {
    pub kind: RayKind,
    pub pixel: (u32, u32),
    pub bounces: u16,
    pub origin: Vec3,
    pub direction: Vec3,
    pub transmittance: f32,
    pub hit: HitRecord,
    pub traversal: TraversalState,
    pub current_worker: u32,
    pub workers_touched: u32,
}

impl FatRay {
    /// Builds a fresh INTERSECT ray, as emitted by the camera iterator or
    /// by `shader.trace` (`spec.md` §4.4).
    pub fn intersect(pixel: (u32, u32), bounces: u16, origin: Vec3, direction: Vec3, transmittance: f32) -> Self {
        Self {
            kind: RayKind::Intersect,
            pixel,
            bounces,
            origin,
            direction,
            transmittance,
            hit: HitRecord::default(),
            traversal: TraversalState::default(),
            current_worker: 0,
            workers_touched: 0,
        }
    }

    /// The world-space point this ray's recorded hit occurred at.
    pub fn hit_point(&self) -> Vec3 {
        self.origin + self.direction * self.hit.t
    }

    /// Resets traversal-related state so the ray can be sent through a
    /// fresh cluster-BVH pass (used when converting INTERSECT→ILLUMINATE
    /// and when constructing a LIGHT ray).
    pub fn reset_traversal(&mut self) {
        self.traversal = TraversalState::default();
        self.hit = HitRecord::default();
        self.workers_touched = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_record_rejects_farther_candidate() {
        let mut hit = HitRecord::default();
        assert!(hit.consider(1, 1, 5.0, Vec3::Z, Vec2::ZERO));
        assert!(!hit.consider(2, 2, 6.0, Vec3::Z, Vec2::ZERO));
        assert_eq!(hit.worker, 1);
    }

    #[test]
    fn hit_record_accepts_closer_candidate() {
        let mut hit = HitRecord::default();
        hit.consider(1, 1, 5.0, Vec3::Z, Vec2::ZERO);
        assert!(hit.consider(2, 2, 3.0, Vec3::Z, Vec2::ZERO));
        assert_eq!(hit.worker, 2);
        assert_eq!(hit.t, 3.0);
    }

    #[test]
    fn worker_zero_never_replaces_an_existing_hit() {
        let mut hit = HitRecord::default();
        assert!(!hit.consider(0, 0, 0.1, Vec3::Z, Vec2::ZERO));
        assert!(hit.is_miss());
    }
}
