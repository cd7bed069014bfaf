//! A minimal built-in `ShaderRegistry` requiring no embedded scripting
//! runtime: it interprets a `Shader::code` record as one of two keywords,
//! `lambert r,g,b` or `emissive r,g,b`, standing in for the real
//! interpreter (`spec.md` §1, §9) the same way `JsonConfigSource` and
//! `JsonSceneSource` stand in for the config/scene scripting front ends.
//!
//! Texture sampling is not implemented here: the `Shader` trait resolves
//! purely by `shader_id` (`spec.md` §9), with no channel for the
//! per-material sampler bindings a real scripting runtime would close
//! over, so `texture()` always returns zero.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::geometry::Shader as ShaderRecord;
use crate::pipeline::{Shader, WorkResults};

use super::shader_registry::ShaderRegistry;

fn parse_rgb(rest: &str) -> Vec3 {
    let mut parts = rest.split(',').filter_map(|p| p.trim().parse::<f32>().ok());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(r), Some(g), Some(b)) => Vec3::new(r, g, b),
        _ => Vec3::splat(0.8),
    }
}

fn write_rgb(results: &mut WorkResults, color: Vec3) {
    results.accumulate("R", color.x);
    results.accumulate("G", color.y);
    results.accumulate("B", color.z);
}

/// The two built-in programs, held by value so `BuiltinRegistry` stays
/// plainly `Clone` without a boxed-trait-object clone impl.
#[derive(Debug, Clone, Copy)]
enum BuiltinShader {
    /// Diffuse surface: direct contribution scaled by the light's cosine
    /// term, plus a flat ambient term standing in for indirect light.
    Lambert { albedo: Vec3 },
    /// Self-illuminating surface: emits `radiance` uniformly, reflects
    /// nothing of its own.
    Emissive { radiance: Vec3 },
}

impl Shader for BuiltinShader {
    fn direct(&self, _view: Vec3, normal: Vec3, _texcoord: Vec2, light_dir: Vec3, illumination: Vec3, results: &mut WorkResults) {
        if let BuiltinShader::Lambert { albedo } = self {
            let cos_theta = normal.dot(light_dir).max(0.0);
            write_rgb(results, *albedo * illumination * cos_theta);
        }
    }

    fn indirect(&self, _view: Vec3, _normal: Vec3, _texcoord: Vec2, results: &mut WorkResults) {
        if let BuiltinShader::Lambert { albedo } = self {
            write_rgb(results, *albedo * 0.1);
        }
    }

    fn emissive(&self, _texcoord: Vec2) -> Vec3 {
        match self {
            BuiltinShader::Emissive { radiance } => *radiance,
            BuiltinShader::Lambert { .. } => Vec3::ZERO,
        }
    }

    fn texture(&self, _sampler: &str, _texcoord: Vec2) -> [f32; 4] {
        [0.0; 4]
    }
}

fn compile(record: &ShaderRecord) -> BuiltinShader {
    if let Some(rest) = record.code.strip_prefix("emissive ") {
        BuiltinShader::Emissive { radiance: parse_rgb(rest) }
    } else if let Some(rest) = record.code.strip_prefix("lambert ") {
        BuiltinShader::Lambert { albedo: parse_rgb(rest) }
    } else {
        BuiltinShader::Lambert { albedo: Vec3::splat(0.8) }
    }
}

/// Compiles every `Shader` source record delivered over the wire into one
/// of the two built-in programs, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    shaders: HashMap<u32, BuiltinShader>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShaderRegistry for BuiltinRegistry {
    fn resolve(&self, shader_id: u32) -> Option<&dyn Shader> {
        self.shaders.get(&shader_id).map(|s| s as &dyn Shader)
    }

    fn install(&mut self, record: &ShaderRecord) {
        self.shaders.insert(record.id, compile(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lambert_code_parses_albedo() {
        let mut registry = BuiltinRegistry::new();
        registry.install(&ShaderRecord { id: 1, code: "lambert 0.2,0.4,0.6".to_string() });
        let shader = registry.resolve(1).unwrap();
        let mut results = WorkResults::new(1.0, (0, 0));
        shader.indirect(Vec3::Z, Vec3::Y, Vec2::ZERO, &mut results);
        assert_eq!(results.buffer_ops.len(), 3);
    }

    #[test]
    fn emissive_code_parses_radiance() {
        let mut registry = BuiltinRegistry::new();
        registry.install(&ShaderRecord { id: 2, code: "emissive 1.0,1.0,1.0".to_string() });
        let shader = registry.resolve(2).unwrap();
        assert_eq!(shader.emissive(Vec2::ZERO), Vec3::ONE);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = BuiltinRegistry::new();
        assert!(registry.resolve(99).is_none());
    }

    #[test]
    fn registry_clone_carries_installed_shaders() {
        let mut registry = BuiltinRegistry::new();
        registry.install(&ShaderRecord { id: 3, code: "emissive 2.0,2.0,2.0".to_string() });
        let cloned = registry.clone();
        assert!(cloned.resolve(3).is_some());
    }
}
