//! The renderer/coordinator: dials every worker, drives each through the
//! protocol state machine, partitions the scene by spatial index, builds
//! and distributes the cluster BVH, assigns camera sub-ranges, and
//! assembles the final image (`spec.md` §4.2, §4.5, §6).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::info;

use crate::config::Config;
use crate::error::{FlexError, ProtocolError};
use crate::geometry::BoundingBox;
use crate::image::{Image, ImageSink, PngSink};
use crate::protocol::{LightList, Message, MeshAssets, RenderRange};
use crate::spatial_index::{bucket_of, encode};
use crate::traversal::ClusterBvh;
use crate::worker::PeerConn;

use super::scene::Scene;

/// How long to wait between poll attempts while blocking on a worker's
/// reply (`spec.md` §5: the coordinator drives this handshake
/// sequentially, not from an event loop).
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Default `-i`/`--intervals` value: seconds between "still waiting on
/// worker N" log lines during a long handshake step (`spec.md` §6).
const DEFAULT_STATS_INTERVAL_SECS: u64 = 5;

/// Dials and drives the worker cluster through one full render.
pub struct Coordinator {
    workers: Vec<PeerConn>,
    config: Config,
    stats_interval: Duration,
}

impl Coordinator {
    /// Dials every address in `config.workers`, in order; worker ids are
    /// the 1-based position of each address in that list (`spec.md` §4.2).
    pub fn connect(config: Config) -> Result<Self, FlexError> {
        config.validate()?;
        let mut workers = Vec::with_capacity(config.workers.len());
        for addr in &config.workers {
            workers.push(PeerConn::connect(addr).map_err(ProtocolError::Io)?);
        }
        Ok(Self {
            workers,
            config,
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
        })
    }

    /// Sets the `-i`/`--intervals` cadence for "still waiting" log lines
    /// while blocked on a worker reply.
    pub fn set_stats_interval(&mut self, interval: Duration) {
        self.stats_interval = interval;
    }

    fn send(&mut self, worker: usize, message: &Message) -> Result<Message, ProtocolError> {
        self.workers[worker].queue(message)?;
        self.workers[worker].flush()?;
        let started = Instant::now();
        let mut last_logged = started;
        loop {
            if let Some(reply) = self.workers[worker].poll()? {
                return Ok(reply);
            }
            if last_logged.elapsed() >= self.stats_interval {
                info!("still waiting on worker {} after {:?}", worker + 1, started.elapsed());
                last_logged = Instant::now();
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Sends `message` to `worker` and requires an `OK` in return — the
    /// shape every synchronous protocol step but `RENDER_STOP` takes
    /// (`spec.md` §4.5).
    fn expect_ok(&mut self, worker: usize, message: Message) -> Result<(), ProtocolError> {
        match self.send(worker, &message)? {
            Message::Ok => Ok(()),
            Message::Error(reason) => Err(ProtocolError::UnexpectedMessage {
                kind: message.kind().as_u32(),
                state: reason,
            }),
            other => Err(ProtocolError::UnexpectedMessage {
                kind: other.kind().as_u32(),
                state: "awaiting OK".to_string(),
            }),
        }
    }

    /// Runs one full render: `INIT` through `RENDER_STOP`, writing the
    /// final image to `<config.output_name>.png` (`spec.md` §6; EXR
    /// output is out of scope, see `image::PngSink`).
    pub fn render(&mut self, scene: Scene) -> Result<(), FlexError> {
        let worker_count = self.workers.len() as u32;

        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::Init { worker_id: (i + 1) as u32 })?;
        }
        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::SyncConfig(self.config.clone()))?;
        }

        let assignment = self.assign_meshes(&scene);
        let light_list = self.distribute_assets(&scene, &assignment)?;

        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::SyncEmissive(light_list.clone()))?;
        }
        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::BuildBvh)?;
        }

        let cluster_bvh = self.build_cluster_bvh(&scene, &assignment, worker_count);
        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::SyncWbvh(cluster_bvh.clone()))?;
        }
        for i in 0..self.workers.len() {
            self.expect_ok(i, Message::SyncCamera(scene.camera.clone()))?;
        }

        self.start_render(worker_count)?;

        let mut image = Image::new(self.config.width, self.config.height, &self.config.all_buffers());
        for i in 0..self.workers.len() {
            loop {
                match self.send(i, &Message::RenderStop)? {
                    Message::SyncImage(partial) => {
                        image.merge(&partial);
                        break;
                    }
                    Message::RenderStats(stats) => {
                        info!("worker {} stats at stop: {:?}", i + 1, stats);
                    }
                    other => {
                        return Err(ProtocolError::UnexpectedMessage {
                            kind: other.kind().as_u32(),
                            state: "awaiting SYNC_IMAGE".to_string(),
                        }
                        .into());
                    }
                }
            }
        }

        let path = format!("{}.png", self.config.output_name);
        PngSink::write(&image, std::path::Path::new(&path))?;
        Ok(())
    }

    /// Splits the image width into `worker_count` contiguous column
    /// ranges and issues `RENDER_START` to each worker with its share
    /// (`spec.md` §4.5 "offset/chunk"). Ray forwarding, not this split,
    /// is what lets any worker shade any pixel.
    fn start_render(&mut self, worker_count: u32) -> Result<(), ProtocolError> {
        let width = self.config.width;
        let chunk = width.div_ceil(worker_count.max(1));
        for i in 0..self.workers.len() {
            let offset = (i as u32) * chunk;
            let this_chunk = chunk.min(width.saturating_sub(offset));
            let range = RenderRange {
                offset: offset as u16,
                chunk: this_chunk as u16,
            };
            self.expect_ok(i, Message::RenderStart(range))?;
        }
        Ok(())
    }

    /// Assigns every mesh to the worker owning its centroid's Morton
    /// bucket (`spec.md` §4.2).
    fn assign_meshes(&self, scene: &Scene) -> HashMap<u32, u32> {
        let worker_count = self.workers.len() as u32;
        scene
            .meshes
            .iter()
            .map(|mesh| {
                let code = encode(mesh.centroid(), self.config.scene_min, self.config.scene_max);
                (mesh.id, bucket_of(code, worker_count))
            })
            .collect()
    }

    /// Sends each mesh, bundled with its material/shader/textures, to its
    /// assigned worker, returning the resulting light list — the set of
    /// worker ids owning at least one emissive material (`spec.md` §3,
    /// §4.5). Every `SYNC_MESH` carries its own material/shader/texture
    /// copies rather than being split against the standalone
    /// `SYNC_MATERIAL`/`SYNC_SHADER`/`SYNC_TEXTURE` messages and the
    /// worker-side dedup sets those exist for — see `DESIGN.md`.
    fn distribute_assets(&mut self, scene: &Scene, assignment: &HashMap<u32, u32>) -> Result<LightList, FlexError> {
        let materials: HashMap<u32, _> = scene.materials.iter().map(|m| (m.id, m.clone())).collect();
        let shaders: HashMap<u32, _> = scene.shaders.iter().map(|s| (s.id, s.clone())).collect();
        let textures: HashMap<u32, _> = scene.textures.iter().map(|t| (t.id(), t.clone())).collect();

        let mut light_list = Vec::new();

        for mesh in &scene.meshes {
            let worker_id = assignment[&mesh.id];
            let worker_index = (worker_id - 1) as usize;

            let material = materials.get(&mesh.material_id).cloned().ok_or(crate::error::AssetError::UnknownResource {
                kind: "material",
                id: mesh.material_id,
            })?;
            let shader = shaders.get(&material.shader_id).cloned().ok_or(crate::error::AssetError::UnknownResource {
                kind: "shader",
                id: material.shader_id,
            })?;
            let mesh_textures: Vec<_> = material.samplers.values().filter_map(|id| textures.get(id).cloned()).collect();

            if material.emissive && !light_list.contains(&worker_id) {
                light_list.push(worker_id);
            }

            self.expect_ok(
                worker_index,
                Message::SyncMesh(MeshAssets {
                    mesh: mesh.clone(),
                    material,
                    shader,
                    textures: mesh_textures,
                }),
            )?;
        }

        Ok(light_list)
    }

    /// Builds the cluster BVH over each worker's bounding box, computed
    /// here from the scene directly rather than waited on from a
    /// `BUILD_BVH` reply payload — that reply carries no body on this
    /// wire catalog (`spec.md` §4.5, §6), and the coordinator already has
    /// every mesh's world bounds before distributing it.
    fn build_cluster_bvh(&self, scene: &Scene, assignment: &HashMap<u32, u32>, worker_count: u32) -> ClusterBvh {
        let mut worker_bounds: HashMap<u32, BoundingBox> = HashMap::new();
        for mesh in &scene.meshes {
            let worker_id = assignment[&mesh.id];
            let bounds = worker_bounds.entry(worker_id).or_default();
            *bounds = bounds.union(&mesh.world_bounds());
        }

        let items: Vec<(u32, BoundingBox)> = (1..=worker_count)
            .map(|id| (id, worker_bounds.get(&id).copied().unwrap_or_default()))
            .collect();
        ClusterBvh::build(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use std::net::TcpListener;
    use std::thread;

    use crate::geometry::{Camera, Mesh, Triangle, Vertex};

    fn test_config(worker_addrs: Vec<String>) -> Config {
        Config {
            output_name: "out".into(),
            width: 2,
            height: 2,
            scene_min: Vec3::splat(-10.0),
            scene_max: Vec3::splat(10.0),
            antialiasing: 1,
            samples: 1,
            bounces: 0,
            threshold: 0.0,
            workers: worker_addrs,
            buffers: vec![],
        }
    }

    /// A minimal fake worker that accepts a connection and replies `OK`
    /// to everything it's sent, letting `start_render`/`assign_meshes`
    /// unit tests exercise the coordinator's handshake logic without a
    /// real `EventLoop`.
    fn spawn_fake_worker() -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut peer = PeerConn::from_stream(stream);
            loop {
                let message = loop {
                    match peer.poll() {
                        Ok(Some(message)) => break message,
                        Ok(None) => {
                            std::thread::sleep(Duration::from_millis(1));
                            continue;
                        }
                        Err(_) => return,
                    }
                };
                let reply = match message {
                    Message::RenderStop => Message::SyncImage(Image::new(2, 2, &["R".to_string(), "G".to_string(), "B".to_string()])),
                    _ => Message::Ok,
                };
                peer.queue(&reply).unwrap();
                peer.flush().unwrap();
                if matches!(reply, Message::SyncImage(_)) {
                    return;
                }
            }
        });
        (addr, handle)
    }

    #[test]
    fn assigns_every_mesh_to_a_valid_worker() {
        let (addr, handle) = spawn_fake_worker();
        let config = test_config(vec![addr]);
        let coordinator = Coordinator::connect(config).unwrap();

        let mesh = Mesh::new(
            1,
            1,
            vec![
                Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, glam::Vec2::ZERO),
                Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, glam::Vec2::ZERO),
                Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, glam::Vec2::ZERO),
            ],
            vec![Triangle::new(0, 1, 2)],
            Mat4::IDENTITY,
        );
        let scene = Scene {
            camera: Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 2, 2, 1),
            meshes: vec![mesh],
            materials: vec![],
            shaders: vec![],
            textures: vec![],
        };

        let assignment = coordinator.assign_meshes(&scene);
        assert_eq!(assignment[&1], 1);
        drop(coordinator);
        handle.join().unwrap();
    }

    #[test]
    fn render_end_to_end_against_fake_single_worker() {
        let (addr, handle) = spawn_fake_worker();
        let config = test_config(vec![addr]);
        let mut coordinator = Coordinator::connect(config).unwrap();

        let scene = Scene {
            camera: Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 2, 2, 1),
            meshes: vec![],
            materials: vec![],
            shaders: vec![],
            textures: vec![],
        };

        coordinator.render(scene).unwrap();
        handle.join().unwrap();
        std::fs::remove_file("out.png").ok();
    }
}
