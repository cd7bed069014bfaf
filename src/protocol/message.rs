//! The wire message catalog (`spec.md` §6). This table supersedes
//! `examples/original_source/src/shared/types/message.hpp`'s smaller,
//! earlier enum (see `SPEC_FULL.md`).

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ProtocolError;
use crate::geometry::{Camera, Material, Mesh, Shader, Texture};
use crate::image::Image;
use crate::pipeline::{FatRay, RenderStats};
use crate::traversal::ClusterBvh;

/// Stable message kind IDs (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageKind {
    None = 0,
    Ok = 1,
    Error = 2,
    Init = 100,
    SyncConfig = 200,
    SyncShader = 201,
    SyncTexture = 202,
    SyncMaterial = 203,
    SyncMesh = 204,
    SyncCamera = 205,
    SyncEmissive = 206,
    SyncWbvh = 207,
    BuildBvh = 208,
    SyncImage = 295,
    RenderStart = 300,
    RenderStop = 301,
    RenderPause = 302,
    RenderResume = 303,
    RenderStats = 400,
    Ray = 500,
}

impl MessageKind {
    pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Self::None,
            1 => Self::Ok,
            2 => Self::Error,
            100 => Self::Init,
            200 => Self::SyncConfig,
            201 => Self::SyncShader,
            202 => Self::SyncTexture,
            203 => Self::SyncMaterial,
            204 => Self::SyncMesh,
            205 => Self::SyncCamera,
            206 => Self::SyncEmissive,
            207 => Self::SyncWbvh,
            208 => Self::BuildBvh,
            295 => Self::SyncImage,
            300 => Self::RenderStart,
            301 => Self::RenderStop,
            302 => Self::RenderPause,
            303 => Self::RenderResume,
            400 => Self::RenderStats,
            500 => Self::Ray,
            other => return Err(ProtocolError::UnknownKind(other)),
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// The packed `RENDER_START` payload: `offset` in the low 16 bits,
/// `chunk` in the high 16 bits (`spec.md` §4.5: "offset:i16 | chunk:u16
/// packed as u32").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRange {
    pub offset: u16,
    pub chunk: u16,
}

impl RenderRange {
    pub fn pack(self) -> u32 {
        (self.offset as u32) | ((self.chunk as u32) << 16)
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            offset: (word & 0xffff) as u16,
            chunk: (word >> 16) as u16,
        }
    }
}

/// One emissive material's mesh, material, and texture assets, sent
/// together and deduplicated per peer (`spec.md` §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshAssets {
    pub mesh: Mesh,
    pub material: Material,
    pub shader: Shader,
    pub textures: Vec<Texture>,
}

/// The set of worker ids known to own at least one emissive material
/// (`spec.md` §3 "emissive worker").
pub type LightList = Vec<u32>;

/// Every distinct message body the protocol exchanges (`spec.md` §4.5,
/// §6). `None`, `Ok`, `BuildBvh`, `RenderStop`, `RenderPause`, and
/// `RenderResume` carry no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    None,
    Ok,
    Error(String),
    Init { worker_id: u32 },
    SyncConfig(Config),
    SyncShader(Shader),
    SyncTexture(Texture),
    SyncMaterial(Material),
    SyncMesh(MeshAssets),
    SyncCamera(Camera),
    SyncEmissive(LightList),
    SyncWbvh(ClusterBvh),
    BuildBvh,
    SyncImage(Image),
    RenderStart(RenderRange),
    RenderStop,
    RenderPause,
    RenderResume,
    RenderStats(RenderStats),
    Ray(FatRay),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::None => MessageKind::None,
            Message::Ok => MessageKind::Ok,
            Message::Error(_) => MessageKind::Error,
            Message::Init { .. } => MessageKind::Init,
            Message::SyncConfig(_) => MessageKind::SyncConfig,
            Message::SyncShader(_) => MessageKind::SyncShader,
            Message::SyncTexture(_) => MessageKind::SyncTexture,
            Message::SyncMaterial(_) => MessageKind::SyncMaterial,
            Message::SyncMesh(_) => MessageKind::SyncMesh,
            Message::SyncCamera(_) => MessageKind::SyncCamera,
            Message::SyncEmissive(_) => MessageKind::SyncEmissive,
            Message::SyncWbvh(_) => MessageKind::SyncWbvh,
            Message::BuildBvh => MessageKind::BuildBvh,
            Message::SyncImage(_) => MessageKind::SyncImage,
            Message::RenderStart(_) => MessageKind::RenderStart,
            Message::RenderStop => MessageKind::RenderStop,
            Message::RenderPause => MessageKind::RenderPause,
            Message::RenderResume => MessageKind::RenderResume,
            Message::RenderStats(_) => MessageKind::RenderStats,
            Message::Ray(_) => MessageKind::Ray,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_round_trips_through_u32() {
        for kind in [
            MessageKind::None,
            MessageKind::Ok,
            MessageKind::Error,
            MessageKind::Init,
            MessageKind::SyncConfig,
            MessageKind::SyncShader,
            MessageKind::SyncTexture,
            MessageKind::SyncMaterial,
            MessageKind::SyncMesh,
            MessageKind::SyncCamera,
            MessageKind::SyncEmissive,
            MessageKind::SyncWbvh,
            MessageKind::BuildBvh,
            MessageKind::SyncImage,
            MessageKind::RenderStart,
            MessageKind::RenderStop,
            MessageKind::RenderPause,
            MessageKind::RenderResume,
            MessageKind::RenderStats,
            MessageKind::Ray,
        ] {
            assert_eq!(MessageKind::from_u32(kind.as_u32()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(MessageKind::from_u32(999).is_err());
    }

    #[test]
    fn render_range_packs_offset_and_chunk() {
        let range = RenderRange { offset: 120, chunk: 64 };
        let packed = range.pack();
        assert_eq!(RenderRange::unpack(packed), range);
    }
}
