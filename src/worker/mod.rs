//! The worker process (`spec.md` §2, §4.5, §5): scene library and local
//! BVHs, the shader-registry boundary, per-peer networking, the ray
//! pipeline job, and the event loop that ties them together.

mod builtin_shaders;
mod event_loop;
mod job;
mod library;
mod net;
mod shader_registry;

pub use builtin_shaders::BuiltinRegistry;
pub use event_loop::EventLoop;
pub use job::{run_ray_job, RenderContext, TARGET_INTERSECT_EPSILON};
pub use library::Library;
pub use net::PeerConn;
pub use shader_registry::ShaderRegistry;
