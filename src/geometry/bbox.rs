use glam::Vec3;
use serde::{Deserialize, Serialize};

/// An axis of 3D space, used to pick BVH split axes and extract vector
/// components without a match at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn component(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// An axis-aligned bounding box. Defaults to the degenerate box
/// `min = +inf, max = -inf` so that `union`/`absorb` on an empty box behave
/// correctly (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }
}

impl BoundingBox {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Expands the bounding box to include `point`.
    pub fn absorb(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Returns a new bounding box enclosing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    pub fn longest_axis(&self) -> Axis {
        let d = self.max - self.min;
        if d.x > d.y && d.x > d.z {
            Axis::X
        } else if d.y > d.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    pub fn centroid(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Slab test against a ray given its origin and precomputed reciprocal
    /// direction. Returns `(hit, t_enter)`; `t_enter` is only meaningful
    /// when `hit` is true.
    pub fn intersect(&self, origin: Vec3, inv_dir: Vec3) -> (bool, f32) {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let tsmaller = t0.min(t1);
        let tbigger = t0.max(t1);

        let tmin = tsmaller.x.max(tsmaller.y).max(tsmaller.z).max(0.0);
        let tmax = tbigger.x.min(tbigger.y).min(tbigger.z);

        if tmin > tmax || tmax < 0.0 {
            (false, tmin)
        } else {
            (true, tmin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_degenerate_for_union() {
        let empty = BoundingBox::default();
        let b = BoundingBox::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(empty.union(&b), b);
    }

    #[test]
    fn absorb_expands_extents() {
        let mut b = BoundingBox::default();
        b.absorb(Vec3::new(1.0, -1.0, 2.0));
        b.absorb(Vec3::new(-1.0, 3.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn intersect_hits_centered_box() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let origin = Vec3::new(0.0, 0.0, -5.0);
        let dir = Vec3::new(0.0, 0.0, 1.0);
        let (hit, t) = b.intersect(origin, dir.recip());
        assert!(hit);
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn intersect_misses_box_behind_ray() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let origin = Vec3::new(0.0, 0.0, -5.0);
        let dir = Vec3::new(0.0, 0.0, -1.0);
        let (hit, _) = b.intersect(origin, dir.recip());
        assert!(!hit);
    }

    #[test]
    fn longest_axis_picks_largest_extent() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::new(1.0, 5.0, 2.0));
        assert_eq!(b.longest_axis(), Axis::Y);
    }
}
