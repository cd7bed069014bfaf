use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A material: shader binding, named texture samplers, and an emissive
/// flag (`spec.md` §3). Materials and shaders are data; their *behavior*
/// is reached through the [`crate::pipeline::shading::Shader`] trait,
/// which is the abstract scripting interface this crate treats as an
/// external collaborator (`spec.md` §1, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: u32,
    pub shader_id: u32,
    pub samplers: HashMap<String, u32>,
    pub emissive: bool,
}

impl Material {
    pub fn new(id: u32, shader_id: u32, emissive: bool) -> Self {
        Self {
            id,
            shader_id,
            samplers: HashMap::new(),
            emissive,
        }
    }
}

/// Source record for a shader or procedural texture program. The scripting
/// language that interprets `code` is explicitly out of scope (`spec.md`
/// §1); this crate only needs the id to route `Shader` trait calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shader {
    pub id: u32,
    pub code: String,
}

/// Texture is a tagged union (`spec.md` §9): either procedural source code
/// evaluated per-sample, or a flat image buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Texture {
    Procedural { id: u32, code: String },
    Image {
        id: u32,
        width: u32,
        height: u32,
        data: Vec<f32>,
    },
}

impl Texture {
    pub fn id(&self) -> u32 {
        match self {
            Texture::Procedural { id, .. } => *id,
            Texture::Image { id, .. } => *id,
        }
    }

    /// Nearest-neighbor sample of an image texture at normalized `(u, v)`.
    /// Procedural textures have no intrinsic samples here; they are
    /// evaluated by the shader runtime.
    pub fn sample_image(&self, u: f32, v: f32) -> Option<[f32; 4]> {
        match self {
            Texture::Image {
                width,
                height,
                data,
                ..
            } => {
                let x = ((u.clamp(0.0, 1.0)) * (*width as f32 - 1.0)).round() as u32;
                let y = ((v.clamp(0.0, 1.0)) * (*height as f32 - 1.0)).round() as u32;
                let stride = 4usize;
                let idx = ((y * width + x) as usize) * stride;
                if idx + stride <= data.len() {
                    Some([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]])
                } else {
                    None
                }
            }
            Texture::Procedural { .. } => None,
        }
    }
}
