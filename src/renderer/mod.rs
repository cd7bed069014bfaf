//! The renderer (coordinator) side of the cluster (`spec.md` §2, §4.2,
//! §4.5, §6): the in-crate scene representation and the driver that dials
//! every worker, partitions the scene, and assembles the final image.

mod coordinator;
mod scene;

pub use coordinator::Coordinator;
pub use scene::{JsonSceneSource, Scene, SceneSource};
