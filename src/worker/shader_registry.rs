//! The boundary between asset records and the shader scripting runtime
//! (`spec.md` §1, §9: "an implementation using an embedded interpreter is
//! one choice; precompiled shaders are another"). A `ShaderRegistry`
//! resolves a shader id, received as a [`crate::geometry::Shader`] source
//! record over `SYNC_SHADER`, into a callable [`pipeline::Shader`] — the
//! same externally-pluggable-contract shape as [`crate::config::ConfigSource`].

use crate::geometry::Shader as ShaderRecord;
use crate::pipeline::Shader;

/// Compiles/looks up shader programs for the event loop. The core only
/// ever calls through the returned trait object (`spec.md` §9); it never
/// inspects `Shader::code` itself.
pub trait ShaderRegistry: Send + Sync {
    fn resolve(&self, shader_id: u32) -> Option<&dyn Shader>;

    /// Registers or replaces the program behind `record.id`, called
    /// whenever `SYNC_SHADER`/`SYNC_MESH` delivers a shader record
    /// (`spec.md` §4.5). The default no-op suits a registry compiled out
    /// of band ahead of the render; [`super::builtin_shaders::BuiltinRegistry`]
    /// overrides this to compile the wire-synced `code` directly.
    fn install(&mut self, _record: &ShaderRecord) {}
}
