//! The in-crate scene representation the renderer partitions across
//! workers (`spec.md` §6 "Scene script contract"). The scripting language
//! that actually evaluates a scene file is an external collaborator
//! (`spec.md` §1, §9); `SceneSource` is the abstract boundary and
//! `JsonSceneSource` the built-in implementation, mirroring
//! `config::ConfigSource`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{Camera, Material, Mesh, Shader, Texture};

/// Everything the coordinator needs before it can dial a single worker:
/// the camera and every mesh/material/shader/texture in the scene, still
/// unpartitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub camera: Camera,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub shaders: Vec<Shader>,
    pub textures: Vec<Texture>,
}

/// The scene-source contract, parallel to `config::ConfigSource`: a scene
/// arrives either inline or from a file, in whatever serde-deserializable
/// shape `from_str` understands. A real scripting front-end is a
/// different implementation of this trait (`spec.md` §9).
pub trait SceneSource {
    fn from_str(body: &str) -> Result<Scene, ConfigError>;

    fn from_file(path: &Path) -> Result<Scene, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Self::from_str(&body)
    }
}

/// JSON-backed `SceneSource`, standing in for the embedded scripting
/// front-end until one is plugged in.
pub struct JsonSceneSource;

impl SceneSource for JsonSceneSource {
    fn from_str(body: &str) -> Result<Scene, ConfigError> {
        serde_json::from_str(body).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    use crate::geometry::Mesh as GeomMesh;

    fn empty_scene() -> Scene {
        Scene {
            camera: Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 4, 4, 1),
            meshes: vec![GeomMesh::new(1, 1, vec![], vec![], Mat4::IDENTITY)],
            materials: vec![],
            shaders: vec![],
            textures: vec![],
        }
    }

    #[test]
    fn round_trips_through_json() {
        let scene = empty_scene();
        let body = serde_json::to_string(&scene).unwrap();
        let parsed = JsonSceneSource::from_str(&body).unwrap();
        assert_eq!(parsed.meshes[0].id, 1);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(JsonSceneSource::from_str("not json"), Err(ConfigError::Parse(_))));
    }
}
