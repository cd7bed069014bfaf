//! The `renderer` binary: dials every worker, drives the cluster through
//! one render, and writes the final image (`spec.md` §6 CLI surface).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::error;

use flexrender::config::{ConfigSource, JsonConfigSource};
use flexrender::renderer::{Coordinator, JsonSceneSource, SceneSource};

/// `renderer <config> <scene> [-i intervals]`
#[derive(Parser, Debug)]
#[command(name = "renderer", about = "FlexRender cluster coordinator")]
struct Args {
    /// Path to the render configuration (JSON; `spec.md` §6 "Config
    /// script contract").
    config: PathBuf,

    /// Path to the scene description (JSON; `spec.md` §6 "Scene script
    /// contract").
    scene: PathBuf,

    /// Idle-stats window, in seconds: how often to log while blocked
    /// waiting on a worker reply.
    #[arg(short = 'i', long = "intervals", default_value_t = 5)]
    intervals: u64,
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = JsonConfigSource::from_file(&args.config)?;
    let scene = JsonSceneSource::from_file(&args.scene)?;

    let mut coordinator = Coordinator::connect(config)?;
    coordinator.set_stats_interval(Duration::from_secs(args.intervals));
    coordinator.render(scene)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("renderer failed: {err}");
            ExitCode::FAILURE
        }
    }
}
