use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::bvh::Bvh;
use super::vertex::{Triangle, Vertex};

/// A mesh: vertex/triangle arrays, object-to-world transform, and the
/// derived per-mesh BVH built once the mesh is received by a worker
/// (`spec.md` §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub id: u32,
    pub material_id: u32,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub xform: Mat4,
    xform_inv_transpose: Mat4,

    #[serde(skip)]
    bvh: Option<Bvh>,
}

impl Mesh {
    pub fn new(
        id: u32,
        material_id: u32,
        vertices: Vec<Vertex>,
        triangles: Vec<Triangle>,
        xform: Mat4,
    ) -> Self {
        let xform_inv_transpose = xform.inverse().transpose();
        Self {
            id,
            material_id,
            vertices,
            triangles,
            xform,
            xform_inv_transpose,
            bvh: None,
        }
    }

    pub fn xform_inv_transpose(&self) -> Mat4 {
        self.xform_inv_transpose
    }

    /// World-space bounds: the union of every triangle's transformed
    /// bounds.
    pub fn world_bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::default();
        for tri in &self.triangles {
            bounds = bounds.union(&tri.world_bounds(&self.vertices, self.xform));
        }
        bounds
    }

    /// World-space centroid, used by the spatial index to decide mesh
    /// ownership (`spec.md` §4.2).
    pub fn centroid(&self) -> Vec3 {
        self.world_bounds().centroid()
    }

    /// Builds the per-mesh BVH over world-space triangle bounds. Called
    /// once after the mesh is received by its owning worker (the
    /// `BUILD_BVH` protocol step, `spec.md` §4.5).
    pub fn build_bvh(&mut self) {
        let items: Vec<(u32, BoundingBox)> = self
            .triangles
            .iter()
            .enumerate()
            .map(|(i, tri)| (i as u32, tri.world_bounds(&self.vertices, self.xform)))
            .collect();
        self.bvh = Some(Bvh::build(&items));
    }

    pub fn bvh(&self) -> Option<&Bvh> {
        self.bvh.as_ref()
    }

    /// Intersects a world-space ray against this mesh's per-mesh BVH
    /// (whose bounds are world-space, via `xform`), terminating in
    /// triangle intersection against the mesh's object-space vertices
    /// (`spec.md` §4.1). The ray is transformed into object space for the
    /// triangle test and the hit normal is mapped back with
    /// `xform_inv_transpose`; `t` itself is invariant under the affine
    /// transform, so the BVH's world-space box traversal still prunes
    /// correctly against it. Returns the closest hit's `(t,
    /// triangle_index, local_geometry)`.
    pub fn intersect(
        &self,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<(f32, u32, super::vertex::LocalGeometry)> {
        let bvh = self.bvh.as_ref()?;
        let inv_xform = self.xform_inv_transpose.transpose();
        let local_origin = inv_xform.transform_point3(origin);
        let local_direction = inv_xform.transform_vector3(direction);
        let mut best: Option<(f32, u32, super::vertex::LocalGeometry)> = None;

        bvh.traverse(origin, direction, f32::INFINITY, |tri_index, best_t| {
            let tri = self.triangles[tri_index as usize];
            if let Some((t, mut geom)) = tri.intersect(&self.vertices, local_origin, local_direction) {
                if t < best_t {
                    geom.normal = self
                        .xform_inv_transpose
                        .transform_vector3(geom.normal)
                        .normalize();
                    best = Some((t, tri_index, geom));
                    return Some(t);
                }
            }
            None
        });

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn triangle_mesh() -> Mesh {
        let vertices = vec![
            Vertex::new(
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::Z,
                Vec2::ZERO,
            ),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, Vec2::new(0.5, 1.0)),
        ];
        let triangles = vec![Triangle::new(0, 1, 2)];
        let mut mesh = Mesh::new(1, 1, vertices, triangles, Mat4::IDENTITY);
        mesh.build_bvh();
        mesh
    }

    #[test]
    fn single_triangle_mesh_has_one_leaf_bvh() {
        let mesh = triangle_mesh();
        let bvh = mesh.bvh().unwrap();
        assert_eq!(bvh.nodes().len(), 1);
        assert!(bvh.nodes()[0].is_leaf);
    }

    #[test]
    fn intersect_hits_the_triangle() {
        let mesh = triangle_mesh();
        let hit = mesh.intersect(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().1, 0);
    }

    #[test]
    fn centroid_matches_world_bounds_midpoint() {
        let mesh = triangle_mesh();
        let centroid = mesh.centroid();
        assert!((centroid.z - 0.0).abs() < 1e-5);
    }
}
