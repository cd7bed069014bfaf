use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;

/// A point within a mesh: object-space position, normal (unit length not
/// enforced, per `spec.md` §3), and 2D texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub const fn new(position: Vec3, normal: Vec3, texcoord: Vec2) -> Self {
        Self {
            position,
            normal,
            texcoord,
        }
    }
}

/// The local shading geometry recorded at a triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalGeometry {
    pub normal: Vec3,
    pub texcoord: Vec2,
}

/// Three vertex indices into the parent mesh's vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub verts: [u32; 3],
}

impl Triangle {
    pub const fn new(v0: u32, v1: u32, v2: u32) -> Self {
        Self {
            verts: [v0, v1, v2],
        }
    }

    #[inline]
    fn positions(self, vertices: &[Vertex]) -> (Vec3, Vec3, Vec3) {
        (
            vertices[self.verts[0] as usize].position,
            vertices[self.verts[1] as usize].position,
            vertices[self.verts[2] as usize].position,
        )
    }

    /// World-space bounds of this triangle after applying `xform`.
    pub fn world_bounds(self, vertices: &[Vertex], xform: Mat4) -> BoundingBox {
        let (v0, v1, v2) = self.positions(vertices);
        let mut bounds = BoundingBox::default();
        bounds.absorb(xform.transform_point3(v0));
        bounds.absorb(xform.transform_point3(v1));
        bounds.absorb(xform.transform_point3(v2));
        bounds
    }

    fn interpolate_normal(self, vertices: &[Vertex], u: f32, v: f32) -> Vec3 {
        let w = 1.0 - u - v;
        let n0 = vertices[self.verts[0] as usize].normal;
        let n1 = vertices[self.verts[1] as usize].normal;
        let n2 = vertices[self.verts[2] as usize].normal;
        w * n0 + u * n1 + v * n2
    }

    fn interpolate_texcoord(self, vertices: &[Vertex], u: f32, v: f32) -> Vec2 {
        let w = 1.0 - u - v;
        let t0 = vertices[self.verts[0] as usize].texcoord;
        let t1 = vertices[self.verts[1] as usize].texcoord;
        let t2 = vertices[self.verts[2] as usize].texcoord;
        w * t0 + u * t1 + v * t2
    }

    /// Object-space edge/cross barycentric intersection (Möller–Trumbore),
    /// following `examples/original_source/src/shared/types/triangle.cpp`
    /// exactly: zero-divisor, barycentric range, epsilon, then back-face
    /// rejection, in that order.
    pub fn intersect(
        self,
        vertices: &[Vertex],
        origin: Vec3,
        direction: Vec3,
    ) -> Option<(f32, LocalGeometry)> {
        let (v0, v1, v2) = self.positions(vertices);

        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let s1 = direction.cross(e2);
        let divisor = s1.dot(e1);
        if divisor == 0.0 {
            return None;
        }
        let inv_divisor = 1.0 / divisor;

        let d = origin - v0;
        let b1 = d.dot(s1) * inv_divisor;
        if !(0.0..=1.0).contains(&b1) {
            return None;
        }

        let s2 = d.cross(e1);
        let b2 = direction.dot(s2) * inv_divisor;
        if b2 < 0.0 || b1 + b2 > 1.0 {
            return None;
        }

        let t = e2.dot(s2) * inv_divisor;
        if t < super::bvh::SELF_INTERSECT_EPSILON {
            return None;
        }

        let normal = self.interpolate_normal(vertices, b1, b2).normalize();
        if normal.dot(direction) > 0.0 {
            return None;
        }

        let texcoord = self.interpolate_texcoord(vertices, b1, b2);
        Some((t, LocalGeometry { normal, texcoord }))
    }

    /// Uniformly samples a point on the triangle in object space using
    /// Shirley's square-to-triangle mapping (PBRT p.671): `u = 1 - sqrt(r1)`,
    /// `v = r2 * sqrt(r1)`.
    pub fn sample(self, vertices: &[Vertex], r1: f32, r2: f32) -> (Vec3, Vec3, Vec2) {
        let sqr1 = r1.sqrt();
        let u = 1.0 - sqr1;
        let v = r2 * sqr1;
        let w = 1.0 - u - v;

        let (v0, v1, v2) = self.positions(vertices);
        let position = w * v0 + u * v1 + v * v2;
        let normal = self.interpolate_normal(vertices, u, v).normalize();
        let texcoord = self.interpolate_texcoord(vertices, u, v);
        (position, normal, texcoord)
    }
}
