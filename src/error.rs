//! Error taxonomy for FlexRender (see `spec.md` §7).
//!
//! Configuration and asset errors are fatal and fail fast in the
//! coordinator. Protocol errors close the offending connection and abort
//! the render. Shader runtime errors are logged and only drop the
//! offending ray; they are not represented here since they never
//! propagate past the pipeline.

use thiserror::Error;

/// Errors parsing or validating a scene/render configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("no workers configured")]
    NoWorkers,
    #[error("failed to read config source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config body: {0}")]
    Parse(String),
}

/// Errors distributing or resolving scene assets (meshes, materials,
/// textures, shaders).
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unknown resource id {kind} #{id}")]
    UnknownResource { kind: &'static str, id: u32 },
    #[error("malformed mesh #{id}: {reason}")]
    MalformedMesh { id: u32, reason: String },
    #[error("mesh #{id} has no triangles")]
    EmptyMesh { id: u32 },
}

/// Errors in the wire protocol: an unexpected message for the current
/// worker state, a truncated body, or an unknown message kind.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected message kind {kind} in state {state:?}")]
    UnexpectedMessage { kind: u32, state: String },
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("truncated message body: expected {expected} bytes, got {got}")]
    Truncated { expected: u32, got: usize },
    #[error("peer closed the connection")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("body encoding error: {0}")]
    Encoding(#[from] Box<bincode::ErrorKind>),
}

/// Umbrella error used at CLI/event-loop boundaries that need to report,
/// not match on, a failure.
#[derive(Debug, Error)]
pub enum FlexError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
