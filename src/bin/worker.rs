//! The `worker` binary: binds a listening socket and runs the event loop
//! forever, driven entirely by the renderer over the wire (`spec.md` §6
//! CLI surface, §4.5).

use std::process::ExitCode;

use clap::Parser;
use log::error;

use flexrender::worker::{BuiltinRegistry, EventLoop};

/// `worker [-p port]`
#[derive(Parser, Debug)]
#[command(name = "worker", about = "FlexRender worker process")]
struct Args {
    /// Port to bind on `0.0.0.0` (`spec.md` §6 "Environment").
    #[arg(short = 'p', long = "port", default_value_t = 19400)]
    port: u16,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut event_loop = match EventLoop::bind(args.port, BuiltinRegistry::new()) {
        Ok(event_loop) => event_loop,
        Err(err) => {
            error!("failed to bind port {}: {err}", args.port);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = event_loop.run() {
        error!("worker event loop failed: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
