//! The per-worker scene library: every asset this worker owns, and the
//! two local levels of the distributed BVH (per-mesh, then this worker's
//! own mesh-bounds BVH) built from them (`spec.md` §3, §4.1, §4.5
//! `BUILD_BVH`). Owned exclusively by the event loop thread (`spec.md`
//! §5) — jobs only ever read through `&Library`.

use std::collections::HashMap;

use crate::geometry::{BoundingBox, Bvh, Camera, Material, Mesh, Shader as ShaderRecord, Texture};
use crate::image::Image;
use crate::protocol::LightList;
use crate::traversal::ClusterBvh;

/// All assets and derived acceleration structures a worker holds after
/// `SYNCING_ASSETS`/`SYNCING_EMISSIVE`/`BUILD_BVH` (`spec.md` §4.5).
/// Cloned once into an `Arc` at `RENDER_START` so pipeline jobs can share
/// it read-only across threads (`spec.md` §5: read-only after sync).
#[derive(Debug, Default, Clone)]
pub struct Library {
    pub worker_id: u32,
    meshes: HashMap<u32, Mesh>,
    materials: HashMap<u32, Material>,
    shaders: HashMap<u32, ShaderRecord>,
    textures: HashMap<u32, Texture>,
    light_list: LightList,

    /// The worker-level BVH (MBVH): leaves are this worker's own mesh
    /// bounds. Built by `build_bvhs`.
    worker_bvh: Option<Bvh>,
    /// The cluster BVH (WBVH): leaves are worker bounds, identical on
    /// every worker. Installed by `SYNC_WBVH`.
    cluster_bvh: Option<ClusterBvh>,

    pub camera: Option<Camera>,
    pub image: Option<Image>,
}

impl Library {
    pub fn new(worker_id: u32) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    /// Resets everything but `worker_id`, for the `SYNCING_IMAGES →
    /// CONFIGURING` loop back into a fresh `INIT` (`spec.md` §4.5).
    pub fn reset(&mut self) {
        let worker_id = self.worker_id;
        *self = Self::new(worker_id);
    }

    pub fn insert_mesh(&mut self, mesh: Mesh) {
        self.meshes.insert(mesh.id, mesh);
    }

    pub fn insert_material(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    pub fn insert_shader(&mut self, shader: ShaderRecord) {
        self.shaders.insert(shader.id, shader);
    }

    pub fn insert_texture(&mut self, texture: Texture) {
        self.textures.insert(texture.id(), texture);
    }

    pub fn set_light_list(&mut self, list: LightList) {
        self.light_list = list;
    }

    pub fn light_list(&self) -> &[u32] {
        &self.light_list
    }

    pub fn is_emissive_worker(&self) -> bool {
        self.light_list.contains(&self.worker_id)
    }

    pub fn mesh(&self, id: u32) -> Option<&Mesh> {
        self.meshes.get(&id)
    }

    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.values()
    }

    pub fn material(&self, id: u32) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn shader_record(&self, id: u32) -> Option<&ShaderRecord> {
        self.shaders.get(&id)
    }

    pub fn texture(&self, id: u32) -> Option<&Texture> {
        self.textures.get(&id)
    }

    /// Follows mesh → material → shader, used before every `shader.*`
    /// call (`spec.md` §4.4).
    pub fn shader_for_mesh(&self, mesh_id: u32) -> Option<&ShaderRecord> {
        let mesh = self.mesh(mesh_id)?;
        let material = self.material(mesh.material_id)?;
        self.shader_record(material.shader_id)
    }

    /// The `BUILD_BVH` step (`spec.md` §4.5): builds every owned mesh's
    /// per-mesh BVH, then this worker's own MBVH over mesh bounds.
    /// Returns this worker's resulting bounding box, reported back to the
    /// renderer in the `OK` reply.
    pub fn build_bvhs(&mut self) -> BoundingBox {
        for mesh in self.meshes.values_mut() {
            mesh.build_bvh();
        }

        let items: Vec<(u32, BoundingBox)> = self
            .meshes
            .values()
            .map(|mesh| (mesh.id, mesh.world_bounds()))
            .collect();

        let mut bounds = BoundingBox::default();
        for (_, b) in &items {
            bounds = bounds.union(b);
        }

        self.worker_bvh = Some(Bvh::build(&items));
        bounds
    }

    pub fn worker_bvh(&self) -> Option<&Bvh> {
        self.worker_bvh.as_ref()
    }

    pub fn set_cluster_bvh(&mut self, bvh: ClusterBvh) {
        self.cluster_bvh = Some(bvh);
    }

    pub fn cluster_bvh(&self) -> Option<&ClusterBvh> {
        self.cluster_bvh.as_ref()
    }

    pub fn worker_count(&self) -> u32 {
        self.cluster_bvh.as_ref().map(|b| b.worker_count()).unwrap_or(0)
    }

    /// Local MBVH → per-mesh BVH → triangle intersection, used once a
    /// cluster-BVH leaf names this worker (`spec.md` §4.3, §4.4). Returns
    /// the closest hit's `(mesh_id, t, normal, texcoord)`.
    pub fn intersect_local(
        &self,
        origin: glam::Vec3,
        direction: glam::Vec3,
        best_t: f32,
    ) -> Option<(u32, f32, glam::Vec3, glam::Vec2)> {
        let worker_bvh = self.worker_bvh.as_ref()?;
        let mut best: Option<(u32, f32, glam::Vec3, glam::Vec2)> = None;

        worker_bvh.traverse(origin, direction, best_t, |mesh_id, current_best| {
            let mesh = self.meshes.get(&mesh_id)?;
            if let Some((t, _tri_index, geom)) = mesh.intersect(origin, direction) {
                if t < current_best {
                    best = Some((mesh_id, t, geom.normal, geom.texcoord));
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
    use glam::{Mat4, Vec2, Vec3};

    fn triangle_mesh(id: u32, offset: f32) -> Mesh {
        let vertices = vec![
            crate::geometry::Vertex::new(Vec3::new(-0.5 + offset, -0.5, 0.0), Vec3::Z, Vec2::ZERO),
            crate::geometry::Vertex::new(Vec3::new(0.5 + offset, -0.5, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
            crate::geometry::Vertex::new(Vec3::new(0.0 + offset, 0.5, 0.0), Vec3::Z, Vec2::new(0.5, 1.0)),
        ];
        let triangles = vec![crate::geometry::Triangle::new(0, 1, 2)];
        Mesh::new(id, 1, vertices, triangles, Mat4::IDENTITY)
    }

    #[test]
    fn build_bvhs_unions_owned_mesh_bounds() {
        let mut lib = Library::new(1);
        lib.insert_mesh(triangle_mesh(1, 0.0));
        lib.insert_mesh(triangle_mesh(2, 10.0));
        let bounds = lib.build_bvhs();
        assert!(bounds.max.x > 9.0);
        assert!(lib.worker_bvh().is_some());
    }

    #[test]
    fn shader_for_mesh_follows_material_chain() {
        let mut lib = Library::new(1);
        lib.insert_mesh(triangle_mesh(1, 0.0));
        lib.insert_material(Material {
            id: 1,
            shader_id: 42,
            samplers: HashMap::new(),
            emissive: false,
        });
        lib.insert_shader(ShaderRecord {
            id: 42,
            code: "x".into(),
        });
        assert_eq!(lib.shader_for_mesh(1).unwrap().id, 42);
    }

    #[test]
    fn intersect_local_finds_the_closer_of_two_meshes() {
        let mut lib = Library::new(1);
        lib.insert_mesh(triangle_mesh(1, 0.0));
        lib.build_bvhs();
        let hit = lib.intersect_local(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), f32::INFINITY);
        assert_eq!(hit.unwrap().0, 1);
    }

    #[test]
    fn is_emissive_worker_checks_the_light_list() {
        let mut lib = Library::new(3);
        assert!(!lib.is_emissive_worker());
        lib.set_light_list(vec![1, 3]);
        assert!(lib.is_emissive_worker());
    }
}
