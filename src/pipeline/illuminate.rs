//! Emissive-triangle sampling for the ILLUMINATE → LIGHT transition
//! (`spec.md` §4.4), grounded on
//! `examples/original_source/src/shared/types/triangle.cpp`'s `Sample`.

use glam::{Vec2, Vec3};

use crate::geometry::{Mesh, Triangle};

use super::ray::{FatRay, RayKind};

/// Uniformly samples a point on `triangle` of `mesh` and transforms it
/// (position and normal) into world space.
pub fn sample_world_point(mesh: &Mesh, triangle: Triangle, r1: f32, r2: f32) -> (Vec3, Vec3, Vec2) {
    let (position, normal, texcoord) = triangle.sample(&mesh.vertices, r1, r2);
    let world_position = mesh.xform.transform_point3(position);
    let world_normal = mesh.xform_inv_transpose().transform_vector3(normal).normalize();
    (world_position, world_normal, texcoord)
}

/// Builds the LIGHT ray for one emissive sample, or `None` if the sample
/// faces away from the target point (`spec.md` §4.4: "skip if
/// `dot(normal, direction_to_target) < 0`").
pub fn try_spawn_light_ray(
    origin_ray: &FatRay,
    sample_position: Vec3,
    sample_normal: Vec3,
    emission: Vec3,
    target: Vec3,
    samples: u32,
) -> Option<FatRay> {
    let direction_to_target = (target - sample_position).normalize();
    if sample_normal.dot(direction_to_target) < 0.0 {
        return None;
    }

    let mut ray = FatRay::intersect(
        origin_ray.pixel,
        origin_ray.bounces,
        sample_position,
        direction_to_target,
        origin_ray.transmittance / samples.max(1) as f32,
    );
    ray.kind = RayKind::Light { target, emission };
    Some(ray)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vertex;
    use glam::Mat4;

    fn upward_facing_mesh() -> Mesh {
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, 0.0, -0.5), Vec3::Y, Vec2::ZERO),
            Vertex::new(Vec3::new(0.5, 0.0, -0.5), Vec3::Y, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.0, 0.0, 0.5), Vec3::Y, Vec2::new(0.5, 1.0)),
        ];
        let triangles = vec![Triangle::new(0, 1, 2)];
        Mesh::new(1, 1, vertices, triangles, Mat4::IDENTITY)
    }

    #[test]
    fn sample_lands_on_the_mesh_plane() {
        let mesh = upward_facing_mesh();
        let (p, n, _) = sample_world_point(&mesh, mesh.triangles[0], 0.3, 0.4);
        assert!((p.y - 0.0).abs() < 1e-5);
        assert!(n.dot(Vec3::Y) > 0.99);
    }

    #[test]
    fn light_ray_skipped_when_sample_faces_away_from_target() {
        let origin_ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        let ray = try_spawn_light_ray(
            &origin_ray,
            Vec3::ZERO,
            Vec3::Y,
            Vec3::ONE,
            Vec3::new(0.0, -1.0, 0.0),
            4,
        );
        assert!(ray.is_none());
    }

    #[test]
    fn light_ray_carries_divided_transmittance_and_target() {
        let mut origin_ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        origin_ray.transmittance = 0.8;
        let target = Vec3::new(0.0, 2.0, 0.0);
        let ray = try_spawn_light_ray(&origin_ray, Vec3::ZERO, Vec3::Y, Vec3::ONE, target, 4).unwrap();
        assert!((ray.transmittance - 0.2).abs() < 1e-6);
        match ray.kind {
            RayKind::Light { target: t, emission } => {
                assert_eq!(t, target);
                assert_eq!(emission, Vec3::ONE);
            }
            _ => panic!("expected a LIGHT ray"),
        }
    }
}
