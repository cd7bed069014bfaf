//! FlexRender: a distributed path-tracing renderer.
//!
//! A scene is partitioned across a cluster of worker processes, each owning
//! a disjoint subset of meshes. A coordinator (the `renderer` binary) drives
//! configuration, asset distribution, camera synchronization and final
//! image assembly; workers cooperatively trace rays that may cross worker
//! boundaries via a two-level bounding volume hierarchy.
//!
//! See `SPEC_FULL.md` at the repository root for the full design.

pub mod config;
pub mod error;
pub mod geometry;
pub mod image;
pub mod pipeline;
pub mod protocol;
pub mod renderer;
pub mod spatial_index;
pub mod traversal;
pub mod worker;

pub use error::{AssetError, ConfigError, FlexError, ProtocolError};
