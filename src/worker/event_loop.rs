//! The worker's single-threaded event loop (`spec.md` §4.5, §5): owns the
//! listening socket, every peer connection, the scene library, and the
//! bounded job pool, driving all of them from one thread. No locks, no
//! shared mutable state outside this loop — the job pool only ever sees a
//! frozen, `Arc`-shared [`RenderContext`] snapshot.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::Config;
use crate::image::Image;
use crate::pipeline::{FatRay, Forward, PopResult, RayQueue, RenderStats, ThreadPool, DEFAULT_JOBS};
use crate::protocol::{Message, WorkerState};

use super::job::{run_ray_job, RenderContext};
use super::library::Library;
use super::net::{log_disconnect, PeerConn};
use super::shader_registry::ShaderRegistry;

const STATS_INTERVAL: Duration = Duration::from_millis(250);
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// The worker process, generic over the shader-scripting runtime plugged
/// in through [`ShaderRegistry`] (`spec.md` §9). Cloned once per render
/// into every [`RenderContext`], so `R` must be cheaply `Clone`.
pub struct EventLoop<R: ShaderRegistry + Clone> {
    listener: TcpListener,
    /// The first socket accepted; by protocol construction that is always
    /// the renderer's control connection (peers only start dialing in
    /// once `SYNC_CONFIG` has been processed, which cannot happen before
    /// the renderer has connected and sent `INIT`).
    renderer: Option<PeerConn>,
    /// Outbound connections this worker dialed during `SYNC_CONFIG`,
    /// keyed by peer worker id (`spec.md` §4.5).
    peers: HashMap<u32, PeerConn>,
    /// Sockets peers dialed to us. Only ever read from; a reply to a peer
    /// always goes out over our own outbound connection to it instead.
    inbound: Vec<PeerConn>,

    state: WorkerState,
    worker_id: u32,
    config: Option<Config>,
    library: Library,
    queue: Option<RayQueue>,
    pool: Option<ThreadPool>,
    registry: R,
    stats: RenderStats,

    last_socket_flush: Instant,
    last_stats_flush: Instant,
}

impl<R: ShaderRegistry + Clone + 'static> EventLoop<R> {
    pub fn bind(port: u16, registry: R) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let now = Instant::now();
        Ok(Self {
            listener,
            renderer: None,
            peers: HashMap::new(),
            inbound: Vec::new(),
            state: WorkerState::None,
            worker_id: 0,
            config: None,
            library: Library::default(),
            queue: None,
            pool: None,
            registry,
            stats: RenderStats::new(),
            last_socket_flush: now,
            last_stats_flush: now,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs forever, servicing sockets and the job pool. Only returns on
    /// an unrecoverable error accepting on the listener itself.
    pub fn run(&mut self) -> std::io::Result<()> {
        loop {
            self.tick()?;
        }
    }

    /// One iteration of the loop: drain the listener, poll every socket,
    /// pump the job pool, and service the flush/stats timers. Exposed
    /// separately from `run` so tests can step the loop deterministically.
    pub fn tick(&mut self) -> std::io::Result<()> {
        self.accept_incoming()?;
        self.poll_renderer();
        self.poll_peers();
        self.pump_pipeline();
        self.tick_timers();
        if self.renderer.is_none() {
            std::thread::sleep(IDLE_SLEEP);
        }
        Ok(())
    }

    fn accept_incoming(&mut self) -> std::io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!("accepted connection from {addr}");
                    let conn = PeerConn::from_stream(stream);
                    if self.renderer.is_none() {
                        self.renderer = Some(conn);
                    } else {
                        self.inbound.push(conn);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn poll_renderer(&mut self) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match renderer.poll() {
            Ok(Some(message)) => self.handle_renderer_message(message),
            Ok(None) => {}
            Err(err) => {
                log_disconnect("renderer", &err);
                self.abort_render();
                self.renderer = None;
            }
        }
    }

    fn handle_renderer_message(&mut self, message: Message) {
        let kind = message.kind();
        let reply = match self.apply_renderer_message(message) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("rejecting {kind:?} in state {:?}: {err}", self.state);
                Message::Error(err.to_string())
            }
        };
        if let Some(renderer) = &mut self.renderer {
            let _ = renderer.queue(&reply);
        }
    }

    fn apply_renderer_message(&mut self, message: Message) -> Result<Message, crate::error::ProtocolError> {
        let kind = message.kind();
        match message {
            Message::Init { worker_id } => {
                self.state = self.state.transition(kind)?;
                self.worker_id = worker_id;
                self.library = Library::new(worker_id);
                self.config = None;
                self.queue = None;
                self.pool = None;
                self.peers.clear();
                self.inbound.clear();
                Ok(Message::Ok)
            }
            Message::SyncConfig(config) => {
                self.state = self.state.transition(kind)?;
                self.library.image = Some(Image::new(config.width, config.height, &config.all_buffers()));
                self.dial_peers(&config);
                self.config = Some(config);
                Ok(Message::Ok)
            }
            Message::SyncMesh(assets) => {
                self.state = self.state.transition(kind)?;
                self.library.insert_mesh(assets.mesh);
                self.library.insert_material(assets.material);
                self.registry.install(&assets.shader);
                self.library.insert_shader(assets.shader);
                for texture in assets.textures {
                    self.library.insert_texture(texture);
                }
                Ok(Message::Ok)
            }
            Message::SyncMaterial(material) => {
                self.state = self.state.transition(kind)?;
                self.library.insert_material(material);
                Ok(Message::Ok)
            }
            Message::SyncShader(shader) => {
                self.state = self.state.transition(kind)?;
                self.registry.install(&shader);
                self.library.insert_shader(shader);
                Ok(Message::Ok)
            }
            Message::SyncTexture(texture) => {
                self.state = self.state.transition(kind)?;
                self.library.insert_texture(texture);
                Ok(Message::Ok)
            }
            Message::SyncEmissive(list) => {
                self.state = self.state.transition(kind)?;
                self.library.set_light_list(list);
                Ok(Message::Ok)
            }
            Message::BuildBvh => {
                self.state = self.state.transition(kind)?;
                // The OK reply carries no payload on this wire catalog; the
                // renderer derives each worker's bounding box from the mesh
                // bounds it already distributed in SYNC_MESH instead of
                // waiting on one here.
                self.library.build_bvhs();
                Ok(Message::Ok)
            }
            Message::SyncWbvh(bvh) => {
                self.state = self.state.transition(kind)?;
                self.library.set_cluster_bvh(bvh);
                Ok(Message::Ok)
            }
            Message::SyncCamera(camera) => {
                self.state = self.state.transition(kind)?;
                self.library.camera = Some(camera.clone());
                self.queue = Some(RayQueue::new(camera));
                Ok(Message::Ok)
            }
            Message::RenderStart(range) => {
                self.state = self.state.transition(kind)?;
                if let Some(queue) = &mut self.queue {
                    queue.set_range(range.offset as u32, range.chunk as u32);
                }
                self.stats = RenderStats::new();
                self.start_pool();
                Ok(Message::Ok)
            }
            Message::RenderPause => {
                self.state = self.state.transition(kind)?;
                if let Some(queue) = &mut self.queue {
                    queue.pause();
                }
                Ok(Message::Ok)
            }
            Message::RenderResume => {
                self.state = self.state.transition(kind)?;
                if let Some(queue) = &mut self.queue {
                    queue.resume();
                }
                Ok(Message::Ok)
            }
            Message::RenderStop => {
                self.state = self.state.transition(kind)?;
                self.drain_pool_fully();
                self.pool = None;
                let image = self.library.image.clone().unwrap_or_else(|| Image::new(0, 0, &[]));
                Ok(Message::SyncImage(image))
            }
            other => Err(crate::error::ProtocolError::UnexpectedMessage {
                kind: other.kind().as_u32(),
                state: format!("{:?}", self.state),
            }),
        }
    }

    /// Opens a client socket to every peer address in `config.workers`
    /// except this worker's own (`spec.md` §4.5: "opens client sockets to
    /// every other worker"). Worker ids are the 1-based position in that
    /// list, matching the id this worker was itself assigned over `INIT`.
    fn dial_peers(&mut self, config: &Config) {
        for (index, addr) in config.workers.iter().enumerate() {
            let peer_id = (index + 1) as u32;
            if peer_id == self.worker_id {
                continue;
            }
            match PeerConn::connect(addr) {
                Ok(conn) => {
                    self.peers.insert(peer_id, conn);
                }
                Err(err) => warn!("failed to dial worker {peer_id} at {addr}: {err}"),
            }
        }
    }

    fn start_pool(&mut self) {
        let worker_count = self.config.as_ref().map(|c| c.workers.len() as u32).unwrap_or(0);
        let bounce_limit = self.config.as_ref().map(|c| c.bounces.max(0) as u16).unwrap_or(0);
        let threshold = self.config.as_ref().map(|c| c.threshold).unwrap_or(0.0);
        let samples = self.config.as_ref().map(|c| c.samples).unwrap_or(1);

        let ctx = Arc::new(RenderContext {
            worker_id: self.worker_id,
            worker_count,
            bounce_limit,
            threshold,
            samples,
            library: self.library.clone(),
            registry: self.registry.clone(),
        });
        self.pool = Some(ThreadPool::new(DEFAULT_JOBS, move |ray| run_ray_job(ray, &ctx)));
    }

    fn poll_peers(&mut self) {
        let mut incoming = Vec::new();

        let ids: Vec<u32> = self.peers.keys().copied().collect();
        for id in ids {
            let outcome = self.peers.get_mut(&id).unwrap().poll();
            match outcome {
                Ok(Some(Message::Ray(ray))) => incoming.push(ray),
                Ok(Some(other)) => warn!("unexpected {:?} on peer {id}'s socket", other.kind()),
                Ok(None) => {}
                Err(err) => {
                    log_disconnect(&format!("worker {id}"), &err);
                    self.peers.remove(&id);
                }
            }
        }

        let mut dead = Vec::new();
        for (i, conn) in self.inbound.iter_mut().enumerate() {
            match conn.poll() {
                Ok(Some(Message::Ray(ray))) => incoming.push(ray),
                Ok(Some(other)) => warn!("unexpected {:?} on an inbound peer socket", other.kind()),
                Ok(None) => {}
                Err(err) => {
                    log_disconnect("inbound peer", &err);
                    dead.push(i);
                }
            }
        }
        for i in dead.into_iter().rev() {
            self.inbound.remove(i);
        }

        for ray in incoming {
            self.stats.record_rx(std::mem::size_of::<FatRay>());
            if let Some(queue) = &mut self.queue {
                queue.push(ray);
            }
        }
    }

    fn pump_pipeline(&mut self) {
        if !self.state.is_rendering() {
            return;
        }
        self.dispatch_to_pool();
        self.drain_pool_results();
    }

    fn dispatch_to_pool(&mut self) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        let Some(pool) = self.pool.as_mut() else {
            return;
        };
        while pool.has_capacity() {
            match queue.pop() {
                Some(PopResult::Ray(ray)) => pool.submit(ray),
                Some(PopResult::EndOfStream) | None => break,
            }
        }
        let (intersect, illuminate, light) = queue.depths();
        self.stats.set_queue_depths(intersect, illuminate, light);
    }

    fn drain_pool_results(&mut self) {
        let mut results = Vec::new();
        if let Some(pool) = self.pool.as_mut() {
            while let Some(result) = pool.try_recv() {
                results.push(result);
            }
        }
        for result in results {
            self.apply_result(result);
        }
    }

    /// Flushes every in-flight job before reporting the final image at
    /// `RENDER_STOP`; rays these jobs spawn are routed on as usual, best
    /// effort, since the queue and peer sockets are about to be torn down.
    fn drain_pool_fully(&mut self) {
        loop {
            let in_flight = match &self.pool {
                Some(pool) => pool.in_flight(),
                None => return,
            };
            if in_flight == 0 {
                return;
            }
            match self.pool.as_mut().and_then(|pool| pool.try_recv()) {
                Some(result) => self.apply_result(result),
                None => std::thread::sleep(IDLE_SLEEP),
            }
        }
    }

    fn apply_result(&mut self, results: crate::pipeline::WorkResults) {
        self.stats.merge_work_results(&results);
        for touched in &results.workers_touched {
            let _ = touched;
        }
        if let Some(image) = &mut self.library.image {
            let (x, y) = results.pixel;
            for op in &results.buffer_ops {
                image.apply(x, y, op);
            }
        }
        for (ray, dest) in results.forwards {
            self.route_ray(ray, dest);
        }
    }

    fn route_ray(&mut self, ray: FatRay, dest: Forward) {
        match dest {
            Forward::Local => {
                if let Some(queue) = &mut self.queue {
                    queue.push(ray);
                }
            }
            Forward::Remote(worker_id) if worker_id == self.worker_id => {
                if let Some(queue) = &mut self.queue {
                    queue.push(ray);
                }
            }
            Forward::Remote(worker_id) => {
                if let Some(peer) = self.peers.get_mut(&worker_id) {
                    if peer.queue(&Message::Ray(ray)).is_ok() {
                        self.stats.record_tx();
                    }
                } else {
                    warn!("no connection to worker {worker_id}, dropping ray");
                }
            }
        }
    }

    fn tick_timers(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_socket_flush) >= FLUSH_INTERVAL {
            self.flush_all_peers();
            self.last_socket_flush = now;
        }
        if self.state.is_rendering() && now.duration_since(self.last_stats_flush) >= STATS_INTERVAL {
            if let Some(renderer) = &mut self.renderer {
                let _ = renderer.queue(&Message::RenderStats(self.stats.clone()));
            }
            self.last_stats_flush = now;
        }
    }

    fn flush_all_peers(&mut self) {
        if let Some(renderer) = &mut self.renderer {
            let _ = renderer.flush();
        }
        for peer in self.peers.values_mut() {
            let _ = peer.flush();
        }
    }

    /// Tears down all render state on a protocol error or renderer
    /// disconnect (`spec.md` §7: "protocol errors close the offending
    /// connection and abort the render").
    fn abort_render(&mut self) {
        self.pool = None;
        self.queue = None;
        self.peers.clear();
        self.inbound.clear();
        self.state = WorkerState::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[derive(Debug, Clone, Default)]
    struct NullRegistry;

    impl ShaderRegistry for NullRegistry {
        fn resolve(&self, _shader_id: u32) -> Option<&dyn crate::pipeline::Shader> {
            None
        }
    }

    fn recv_reply(conn: &mut PeerConn) -> Message {
        for _ in 0..2000 {
            if let Some(message) = conn.poll().unwrap() {
                return message;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("no reply arrived in time");
    }

    /// Drives one worker through a full single-worker render: INIT through
    /// RENDER_STOP, with a 1x1, no-antialiasing camera so exactly one
    /// primary ray fires and the queue reaches end-of-stream immediately.
    #[test]
    fn single_worker_render_round_trips_to_an_image() {
        let mut worker = EventLoop::bind(0, NullRegistry).unwrap();
        let addr = worker.local_addr().unwrap();
        let mut renderer = PeerConn::connect(&addr.to_string()).unwrap();
        worker.accept_incoming().unwrap();

        let config = Config {
            output_name: "out".into(),
            width: 1,
            height: 1,
            scene_min: Vec3::splat(-1.0),
            scene_max: Vec3::splat(1.0),
            antialiasing: 1,
            samples: 1,
            bounces: 0,
            threshold: 0.0,
            workers: vec![addr.to_string()],
            buffers: vec![],
        };

        renderer.queue(&Message::Init { worker_id: 1 }).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        renderer.queue(&Message::SyncConfig(config)).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        renderer.queue(&Message::SyncEmissive(vec![])).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        renderer.queue(&Message::BuildBvh).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        let camera = crate::geometry::Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 1, 1, 1);
        renderer.queue(&Message::SyncCamera(camera)).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        renderer
            .queue(&Message::RenderStart(crate::protocol::RenderRange { offset: 0, chunk: 0 }))
            .unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        assert!(matches!(recv_reply(&mut renderer), Message::Ok));

        for _ in 0..50 {
            worker.pump_pipeline();
            std::thread::sleep(Duration::from_millis(2));
        }

        renderer.queue(&Message::RenderStop).unwrap();
        renderer.flush().unwrap();
        worker.poll_renderer();
        match recv_reply(&mut renderer) {
            Message::SyncImage(image) => {
                assert_eq!(image.width(), 1);
                assert_eq!(image.height(), 1);
            }
            other => panic!("expected SyncImage, got {other:?}"),
        }
    }

    #[test]
    fn dial_peers_skips_its_own_address() {
        let mut worker = EventLoop::bind(0, NullRegistry).unwrap();
        worker.worker_id = 1;
        let config = Config {
            output_name: "out".into(),
            width: 1,
            height: 1,
            scene_min: Vec3::splat(-1.0),
            scene_max: Vec3::splat(1.0),
            antialiasing: 1,
            samples: 1,
            bounces: 0,
            threshold: 0.0,
            workers: vec!["127.0.0.1:1".into(), "127.0.0.1:2".into()],
            buffers: vec![],
        };
        worker.dial_peers(&config);
        assert!(!worker.peers.contains_key(&1));
    }
}
