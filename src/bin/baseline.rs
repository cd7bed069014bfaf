//! The `baseline` binary: a single-process render of the whole scene on
//! one simulated worker, with no network hop (`spec.md` §6 CLI surface).
//! Useful for correctness comparison against the distributed path and
//! for scenes too small to justify a cluster.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};

use flexrender::config::{Config, ConfigSource, JsonConfigSource};
use flexrender::image::{Image, ImageSink, PngSink};
use flexrender::pipeline::{Forward, PopResult, RayQueue, ThreadPool, DEFAULT_JOBS};
use flexrender::renderer::{JsonSceneSource, Scene, SceneSource};
use flexrender::worker::{run_ray_job, BuiltinRegistry, Library, RenderContext, ShaderRegistry};

/// `baseline <config> <scene> [-i intervals] [-j jobs] [-o offset] [-c chunk-size]`
#[derive(Parser, Debug)]
#[command(name = "baseline", about = "FlexRender single-process render")]
struct Args {
    config: PathBuf,
    scene: PathBuf,

    /// Idle-stats window, in seconds.
    #[arg(short = 'i', long = "intervals", default_value_t = 5)]
    intervals: u64,

    /// Worker thread count.
    #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_JOBS)]
    jobs: usize,

    /// First camera column to render.
    #[arg(short = 'o', long = "offset", default_value_t = 0)]
    offset: u32,

    /// Column count to render; 0 means "to the image edge".
    #[arg(short = 'c', long = "chunk-size", default_value_t = 0)]
    chunk: u32,
}

const WORKER_ID: u32 = 1;

fn build_library(config: &Config, scene: Scene, registry: &mut BuiltinRegistry) -> Library {
    let mut library = Library::new(WORKER_ID);
    for shader in &scene.shaders {
        registry.install(shader);
        library.insert_shader(shader.clone());
    }
    for material in scene.materials {
        library.insert_material(material);
    }
    for texture in scene.textures {
        library.insert_texture(texture);
    }
    for mesh in scene.meshes {
        library.insert_mesh(mesh);
    }

    let is_emissive = library_has_emissive_material(&library);
    if is_emissive {
        library.set_light_list(vec![WORKER_ID]);
    }

    library.build_bvhs();
    library.camera = Some({
        let mut camera = scene.camera;
        camera.set_range(0, 0);
        camera
    });
    library.image = Some(Image::new(config.width, config.height, &config.all_buffers()));
    library
}

fn library_has_emissive_material(library: &Library) -> bool {
    library.meshes().any(|mesh| {
        library
            .material(mesh.material_id)
            .map(|material| material.emissive)
            .unwrap_or(false)
    })
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = JsonConfigSource::from_file(&args.config)?;
    let scene = JsonSceneSource::from_file(&args.scene)?;

    let mut registry = BuiltinRegistry::new();
    let mut library = build_library(&config, scene, &mut registry);
    if let Some(camera) = &mut library.camera {
        camera.set_range(args.offset, args.chunk);
    }
    let camera = library.camera.clone().expect("camera installed above");
    let mut queue = RayQueue::new(camera);

    let ctx = Arc::new(RenderContext {
        worker_id: WORKER_ID,
        worker_count: 1,
        bounce_limit: config.bounces.max(0) as u16,
        threshold: config.threshold,
        samples: config.samples,
        library: library.clone(),
        registry: registry.clone(),
    });
    let mut pool = ThreadPool::new(args.jobs, move |ray| run_ray_job(ray, &ctx));

    let stats_interval = Duration::from_secs(args.intervals);
    let mut last_logged = Instant::now();
    let mut end_of_stream = false;

    loop {
        if !end_of_stream {
            while pool.has_capacity() {
                match queue.pop() {
                    Some(PopResult::Ray(ray)) => pool.submit(ray),
                    Some(PopResult::EndOfStream) => {
                        end_of_stream = true;
                        break;
                    }
                    None => break,
                }
            }
        }

        let mut drained_any = false;
        while let Some(results) = pool.try_recv() {
            drained_any = true;
            if let Some(image) = &mut library.image {
                let (x, y) = results.pixel;
                for op in &results.buffer_ops {
                    image.apply(x, y, op);
                }
            }
            for (ray, dest) in results.forwards {
                match dest {
                    Forward::Local | Forward::Remote(WORKER_ID) => queue.push(ray),
                    Forward::Remote(other) => {
                        log::warn!("dropping ray forwarded to nonexistent worker {other}");
                    }
                }
            }
        }

        if end_of_stream && pool.in_flight() == 0 {
            break;
        }
        if !drained_any {
            std::thread::sleep(Duration::from_millis(1));
        }
        if last_logged.elapsed() >= stats_interval {
            let (intersect, illuminate, light) = queue.depths();
            info!(
                "in flight: {}, queued: intersect={intersect} illuminate={illuminate} light={light}",
                pool.in_flight()
            );
            last_logged = Instant::now();
        }
    }

    drop(pool);

    let image = library.image.take().unwrap_or_else(|| Image::new(0, 0, &[]));
    let output_path = PathBuf::from(format!("{}.png", config.output_name));
    PngSink::write(&image, &output_path)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("baseline render failed: {err}");
            ExitCode::FAILURE
        }
    }
}
