//! The per-ray pipeline job: one `FatRay` in, one `WorkResults` out,
//! run on a `pipeline::ThreadPool` worker thread against a frozen,
//! `Arc`-shared snapshot of this worker's library (`spec.md` §4.3, §4.4,
//! §5 — jobs never touch shared mutable state).

use glam::Vec3;
use rand::Rng;

use crate::geometry::Mesh;
use crate::pipeline::{
    sample_world_point, try_spawn_light_ray, Forward, FatRay, RayKind, Shader, WorkResults,
};
use crate::traversal::{AutomatonState, StepOutcome, TraversalState};

use super::library::Library;
use super::shader_registry::ShaderRegistry;

/// Distance tolerance between a LIGHT ray's final hit and its recorded
/// target point, beyond which the sample is occluded (`spec.md` §4.4).
pub const TARGET_INTERSECT_EPSILON: f32 = 1e-4;

/// The frozen, read-only state every job in one render needs: installed
/// once at `RENDER_START` and shared across the thread pool via `Arc`
/// (`spec.md` §5: library/BVHs are read-only once rendering begins).
pub struct RenderContext<R: ShaderRegistry> {
    pub worker_id: u32,
    pub worker_count: u32,
    pub bounce_limit: u16,
    pub threshold: f32,
    pub samples: u16,
    pub library: Library,
    pub registry: R,
}

/// One traversal hop's outcome, unifying the cluster-BVH and
/// linear-scan-fallback paths (`spec.md` §4.3).
enum Hop {
    Leaf { worker: u32, resume: TraversalState },
    Forward(u32),
    Done,
}

/// Runs one ray to the point it either finishes locally or must cross
/// the network, implementing the full distributed traversal +
/// shading pipeline (`spec.md` §4.3, §4.4).
pub fn run_ray_job<R: ShaderRegistry>(mut ray: FatRay, ctx: &RenderContext<R>) -> WorkResults {
    let mut results = WorkResults::new(ray.transmittance, ray.pixel);

    if matches!(ray.kind, RayKind::Illuminate) {
        handle_illuminate(&ray, ctx, &mut results);
        results.killed.illuminate += 1;
        return results;
    }

    loop {
        let hop = next_hop(&mut ray, ctx);
        match hop {
            Hop::Leaf { worker, resume } => {
                ray.traversal = resume;
                ray.workers_touched += 1;
                test_local_hit(&mut ray, worker, ctx);
                if worker == ctx.worker_id {
                    continue;
                }
                results.record_touched(ray.workers_touched);
                results.forward(ray, Forward::Remote(worker));
                return results;
            }
            Hop::Forward(next) => {
                ray.current_worker = next;
                results.record_touched(ray.workers_touched);
                results.forward(ray, Forward::Remote(next));
                return results;
            }
            Hop::Done => {
                results.record_touched(ray.workers_touched);
                finalize(ray, ctx, &mut results);
                return results;
            }
        }
    }
}

/// Advances the distributed traversal one step, preferring the cluster
/// BVH and degrading to the linear-scan ring-visit when none has been
/// installed yet (`spec.md` §4.3).
fn next_hop<R: ShaderRegistry>(ray: &mut FatRay, ctx: &RenderContext<R>) -> Hop {
    match ctx.library.cluster_bvh() {
        Some(cluster) => match cluster.step(ray.origin, ray.direction, ray.hit.t, ray.traversal) {
            StepOutcome::Leaf { worker, resume } => Hop::Leaf { worker, resume },
            StepOutcome::Done => Hop::Done,
        },
        None => {
            if ray.current_worker == 0 {
                ray.current_worker = ctx.worker_id;
            }
            ray.workers_touched += 1;
            test_local_hit(ray, ctx.worker_id, ctx);
            match crate::traversal::linear_scan_next(ray.current_worker, ctx.worker_count) {
                crate::traversal::LeafOutcome::Forward(next) => Hop::Forward(next),
                crate::traversal::LeafOutcome::Done => Hop::Done,
            }
        }
    }
}

/// Local MBVH → per-mesh BVH → triangle test, run only when `worker`
/// names this job's own worker (`spec.md` §4.3).
fn test_local_hit<R: ShaderRegistry>(ray: &mut FatRay, worker: u32, ctx: &RenderContext<R>) {
    if worker != ctx.worker_id {
        return;
    }
    if let Some((mesh, t, normal, texcoord)) = ctx.library.intersect_local(ray.origin, ray.direction, ray.hit.t) {
        ray.hit.consider(worker, mesh, t, normal, texcoord);
    }
}

/// The sentinel traversal state meaning "fully done": re-entering
/// `ClusterBvh::step` with this resume returns `Done` immediately,
/// without retraversing (`spec.md` §4.3 — a ray forwarded for shading
/// after traversal completes must not be retraversed on arrival).
fn done_sentinel() -> TraversalState {
    TraversalState {
        current: 0,
        state: AutomatonState::FromChild,
    }
}

/// Resolves a completed traversal: shade locally if this worker owns
/// the best hit, forward once more for shading otherwise, or kill the
/// ray on a miss (`spec.md` §4.4).
fn finalize<R: ShaderRegistry>(mut ray: FatRay, ctx: &RenderContext<R>, results: &mut WorkResults) {
    match ray.kind {
        RayKind::Illuminate => unreachable!("ILLUMINATE never enters distributed traversal"),
        RayKind::Intersect => {
            if ray.hit.is_miss() {
                results.killed.intersect += 1;
            } else if ray.hit.worker == ctx.worker_id {
                shade_intersect_hit(&ray, ctx, results);
                results.killed.intersect += 1;
            } else {
                ray.traversal = done_sentinel();
                results.forward(ray, Forward::Remote(ray.hit.worker));
            }
        }
        RayKind::Light { target, emission } => {
            if ray.hit.is_miss() {
                results.killed.light += 1;
            } else if ray.hit.worker == ctx.worker_id {
                let hit_point = ray.hit_point();
                if (hit_point - target).length() > TARGET_INTERSECT_EPSILON {
                    results.killed.light += 1;
                } else {
                    shade_light_hit(&ray, emission, ctx, results);
                    results.killed.light += 1;
                }
            } else {
                ray.traversal = done_sentinel();
                results.forward(ray, Forward::Remote(ray.hit.worker));
            }
        }
    }
}

/// Cosine-weighted hemisphere sample around `normal`, used to give the
/// recursive bounce ray a direction: the shader trait's closed
/// enumeration (`spec.md` §4.4, §9) has no parameter for it, so the
/// pipeline — not the shader — supplies the bounce geometry.
fn cosine_sample_hemisphere(normal: Vec3) -> Vec3 {
    let mut rng = rand::rng();
    let r1: f32 = rng.random();
    let r2: f32 = rng.random();
    let r = r1.sqrt();
    let theta = 2.0 * std::f32::consts::PI * r2;
    let x = r * theta.cos();
    let y = r * theta.sin();
    let z = (1.0 - r1).max(0.0).sqrt();

    let up = if normal.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    (tangent * x + bitangent * y + normal * z).normalize()
}

/// Shades an INTERSECT ray's final hit: indirect contribution, one
/// recursive bounce ray (pipeline-driven, see `cosine_sample_hemisphere`),
/// and one ILLUMINATE ray per emissive worker (`spec.md` §4.4).
fn shade_intersect_hit<R: ShaderRegistry>(ray: &FatRay, ctx: &RenderContext<R>, results: &mut WorkResults) {
    let Some(shader) = resolve_shader_for_mesh(ctx, ray.hit.mesh) else {
        return;
    };

    let view = -ray.direction;
    shader.indirect(view, ray.hit.normal, ray.hit.texcoord, results);

    let direction = cosine_sample_hemisphere(ray.hit.normal);
    let transmittance = ray.transmittance * 0.5;
    results.trace(
        ray.pixel,
        ray.bounces + 1,
        ray.hit_point(),
        direction,
        transmittance,
        ctx.bounce_limit,
        ctx.threshold,
    );

    for &light_worker in ctx.library.light_list() {
        let mut illuminate = *ray;
        illuminate.kind = RayKind::Illuminate;
        illuminate.reset_traversal();
        results.produced.illuminate += 1;
        results.forward(illuminate, Forward::Remote(light_worker));
    }
}

/// Shades a LIGHT ray's confirmed, unoccluded hit (`spec.md` §4.4).
/// `view` approximates the true camera-view direction with the LIGHT
/// ray's own incoming direction reversed, since a `FatRay` does not
/// carry the originating surface's view vector (see `DESIGN.md`).
fn shade_light_hit<R: ShaderRegistry>(ray: &FatRay, emission: Vec3, ctx: &RenderContext<R>, results: &mut WorkResults) {
    let Some(shader) = resolve_shader_for_mesh(ctx, ray.hit.mesh) else {
        return;
    };
    let light_dir = -ray.direction;
    let view = -ray.direction;
    shader.direct(view, ray.hit.normal, ray.hit.texcoord, light_dir, emission, results);
}

fn resolve_shader_for_mesh<'a, R: ShaderRegistry>(ctx: &'a RenderContext<R>, mesh_id: u32) -> Option<&'a dyn Shader> {
    let shader_record = ctx.library.shader_for_mesh(mesh_id)?;
    ctx.registry.resolve(shader_record.id)
}

/// Processes an ILLUMINATE ray on arrival at an emissive worker: for
/// every emissive mesh/triangle this worker owns, draws `samples`
/// points and spawns a LIGHT ray toward the terminating hit point
/// (`spec.md` §4.4). The ray is routed directly by its `Forward::Remote`
/// destination, never through cluster-BVH traversal.
fn handle_illuminate<R: ShaderRegistry>(ray: &FatRay, ctx: &RenderContext<R>, results: &mut WorkResults) {
    let target = ray.hit_point();

    for mesh in ctx.library.meshes() {
        if !is_emissive_mesh(ctx, mesh) {
            continue;
        }
        let Some(shader) = resolve_shader_for_mesh(ctx, mesh.id) else {
            continue;
        };

        for triangle in &mesh.triangles {
            for _ in 0..ctx.samples.max(1) {
                let mut rng = rand::rng();
                let r1: f32 = rng.random();
                let r2: f32 = rng.random();
                let (position, normal, texcoord) = sample_world_point(mesh, *triangle, r1, r2);
                let emission = shader.emissive(texcoord);

                if let Some(light_ray) =
                    try_spawn_light_ray(ray, position, normal, emission, target, ctx.samples as u32)
                {
                    results.produced.light += 1;
                    results.forward(light_ray, Forward::Local);
                }
            }
        }
    }
}

fn is_emissive_mesh<R: ShaderRegistry>(ctx: &RenderContext<R>, mesh: &Mesh) -> bool {
    ctx.library
        .material(mesh.material_id)
        .map(|material| material.emissive)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Material, Shader as ShaderRecord, Vertex};
    use glam::{Mat4, Vec2};
    use std::collections::HashMap;

    struct NullShader;
    impl Shader for NullShader {
        fn direct(&self, _: Vec3, _: Vec3, _: Vec2, _: Vec3, illumination: Vec3, results: &mut WorkResults) {
            results.accumulate3("R", illumination);
        }
        fn indirect(&self, _: Vec3, _: Vec3, _: Vec2, results: &mut WorkResults) {
            results.accumulate("R", 0.1);
        }
        fn emissive(&self, _: Vec2) -> Vec3 {
            Vec3::ONE
        }
        fn texture(&self, _: &str, _: Vec2) -> [f32; 4] {
            [1.0, 1.0, 1.0, 1.0]
        }
    }

    struct SingleShaderRegistry(NullShader);
    impl ShaderRegistry for SingleShaderRegistry {
        fn resolve(&self, _shader_id: u32) -> Option<&dyn Shader> {
            Some(&self.0)
        }
    }

    fn triangle_mesh(id: u32) -> Mesh {
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, Vec2::new(0.5, 1.0)),
        ];
        let triangles = vec![crate::geometry::Triangle::new(0, 1, 2)];
        Mesh::new(id, 1, vertices, triangles, Mat4::IDENTITY)
    }

    fn single_worker_ctx() -> RenderContext<SingleShaderRegistry> {
        let mut library = Library::new(1);
        library.insert_mesh(triangle_mesh(1));
        library.insert_material(Material {
            id: 1,
            shader_id: 1,
            samplers: HashMap::new(),
            emissive: false,
        });
        library.insert_shader(ShaderRecord {
            id: 1,
            code: String::new(),
        });
        library.build_bvhs();
        RenderContext {
            worker_id: 1,
            worker_count: 1,
            bounce_limit: 0,
            threshold: 0.01,
            samples: 1,
            library,
            registry: SingleShaderRegistry(NullShader),
        }
    }

    #[test]
    fn intersect_ray_with_no_cluster_bvh_shades_locally_on_single_worker() {
        let ctx = single_worker_ctx();
        let ray = FatRay::intersect((0, 0), 0, Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 1.0);
        let results = run_ray_job(ray, &ctx);
        assert_eq!(results.killed.intersect, 1);
        assert!(results.buffer_ops.iter().any(|op| op.name() == "R"));
    }

    #[test]
    fn intersect_ray_missing_everything_is_killed_with_no_shading() {
        let ctx = single_worker_ctx();
        let ray = FatRay::intersect((0, 0), 0, Vec3::new(100.0, 100.0, 100.0), Vec3::Z, 1.0);
        let results = run_ray_job(ray, &ctx);
        assert_eq!(results.killed.intersect, 1);
        assert!(results.buffer_ops.is_empty());
    }

    #[test]
    fn unoccluded_light_ray_invokes_direct_shading() {
        let ctx = single_worker_ctx();
        let mut ray = FatRay::intersect((0, 0), 0, Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 1.0);
        ray.kind = RayKind::Light {
            target: Vec3::ZERO,
            emission: Vec3::ONE,
        };
        let results = run_ray_job(ray, &ctx);
        assert_eq!(results.killed.light, 1);
        assert!(results.buffer_ops.iter().any(|op| op.name() == "R"));
    }

    #[test]
    fn light_ray_far_from_its_target_is_discarded_as_occluded() {
        let ctx = single_worker_ctx();
        let mut ray = FatRay::intersect((0, 0), 0, Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 1.0);
        ray.kind = RayKind::Light {
            target: Vec3::new(10.0, 10.0, 10.0),
            emission: Vec3::ONE,
        };
        let results = run_ray_job(ray, &ctx);
        assert_eq!(results.killed.light, 1);
        assert!(results.buffer_ops.is_empty());
    }

    #[test]
    fn illuminate_ray_spawns_light_rays_from_emissive_meshes() {
        let mut ctx = single_worker_ctx();
        let material = ctx.library.material(1).cloned().unwrap();
        let mut emissive_material = material;
        emissive_material.emissive = true;
        ctx.library.insert_material(emissive_material);

        let mut ray = FatRay::intersect((0, 0), 0, Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 1.0);
        ray.kind = RayKind::Illuminate;
        ray.hit.consider(1, 1, 5.0, Vec3::Z, Vec2::ZERO);

        let results = run_ray_job(ray, &ctx);
        assert_eq!(results.killed.illuminate, 1);
        assert!(results.produced.light > 0);
        assert!(results
            .forwards
            .iter()
            .all(|(forwarded, dest)| matches!(forwarded.kind, RayKind::Light { .. }) && *dest == Forward::Local));
    }
}
