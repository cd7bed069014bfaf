//! Geometry & per-mesh BVH (`spec.md` §4.1).
//!
//! Triangles, meshes, bounding boxes, and the per-mesh bounding volume
//! hierarchy build + local traversal.

mod bbox;
mod bvh;
mod camera;
mod material;
mod mesh;
mod vertex;

pub use bbox::{Axis, BoundingBox};
pub use bvh::{Bvh, LinearNode, SELF_INTERSECT_EPSILON};
pub use camera::{Camera, PrimaryRay};
pub use material::{Material, Shader, Texture};
pub use mesh::Mesh;
pub use vertex::{LocalGeometry, Triangle, Vertex};
