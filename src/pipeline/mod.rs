//! The kind-tagged ray pipeline: the FatRay state machine, shading
//! continuations, the per-worker ray queue, and bounded thread-pool
//! dispatch (`spec.md` §4.4).

mod dispatch;
mod illuminate;
mod queue;
mod ray;
mod shading;
mod stats;

pub use dispatch::{ThreadPool, DEFAULT_JOBS};
pub use illuminate::{sample_world_point, try_spawn_light_ray};
pub use queue::{PopResult, RayQueue};
pub use ray::{FatRay, HitRecord, RayKind};
pub use shading::{BufferOp, BufferOpKind, Forward, RayKindCounters, Shader, WorkResults};
pub use stats::RenderStats;
