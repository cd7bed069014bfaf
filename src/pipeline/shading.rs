//! The shader-to-pipeline interface and the per-job result buffer
//! (`spec.md` §4.4 "Shader-to-pipeline interface", §9: "a side-effect
//! channel for appending buffer ops and spawning rays").
//!
//! The scripting runtime that actually evaluates shader programs is an
//! external collaborator (`spec.md` §1, §9); this module only defines the
//! closed enumeration of calls a shader implementation may make and the
//! buffer this crate collects them into.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::ray::FatRay;

/// Where a forwarded ray should go next: re-enter this worker's own
/// queue (for a freshly spawned ray that needs a new distributed-
/// traversal pass), or cross the network to a specific worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Forward {
    Local,
    Remote(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferOpKind {
    Write,
    Accumulate,
}

/// One pending write to the local [`crate::image::Image`], already
/// scaled by the emitting ray's transmittance (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferOp {
    pub kind: BufferOpKind,
    pub buffer: [u8; 16],
    pub buffer_len: u8,
    pub value: [f32; 4],
    pub channels: u8,
}

impl BufferOp {
    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.buffer[..self.buffer_len as usize]).unwrap_or("")
    }

    pub fn new(kind: BufferOpKind, name: &str, value: [f32; 4], channels: u8) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(16);
        let mut buffer = [0u8; 16];
        buffer[..len].copy_from_slice(&bytes[..len]);
        Self {
            kind,
            buffer,
            buffer_len: len as u8,
            value,
            channels,
        }
    }
}

/// Per-ray-kind counters, tracked separately for "produced" and "killed"
/// (`spec.md` §3, §8 invariant: rays killed across the cluster equals
/// rays produced).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RayKindCounters {
    pub intersect: u64,
    pub illuminate: u64,
    pub light: u64,
}

/// The owned output of a single pipeline job: one ray in, one
/// `WorkResults` out (`spec.md` §3, §5 — jobs never touch shared state
/// directly).
#[derive(Debug, Clone, Default)]
pub struct WorkResults {
    transmittance: f32,
    /// The pixel every `buffer_ops` entry belongs to: one job always
    /// shades exactly one ray, so one `WorkResults` never mixes pixels.
    pub pixel: (u32, u32),
    pub forwards: Vec<(FatRay, Forward)>,
    pub buffer_ops: Vec<BufferOp>,
    pub produced: RayKindCounters,
    pub killed: RayKindCounters,
    /// One entry per ray that finished this job, recording how many
    /// distinct workers it touched (`spec.md` §3 "workers-touched
    /// histogram").
    pub workers_touched: Vec<u32>,
}

impl WorkResults {
    /// `transmittance` is the emitting ray's current transmittance: every
    /// `accumulate`/`write` call below is scaled by it, matching the
    /// shader-facing contract in `spec.md` §4.4. `pixel` is the pixel the
    /// emitting ray belongs to, stamped onto every `buffer_ops` entry
    /// produced during this job.
    pub fn new(transmittance: f32, pixel: (u32, u32)) -> Self {
        Self {
            transmittance,
            pixel,
            ..Default::default()
        }
    }

    fn push(&mut self, kind: BufferOpKind, name: &str, value: [f32; 4], channels: u8) {
        let scaled = [
            value[0] * self.transmittance,
            value[1] * self.transmittance,
            value[2] * self.transmittance,
            value[3] * self.transmittance,
        ];
        self.buffer_ops.push(BufferOp::new(kind, name, scaled, channels));
    }

    pub fn accumulate(&mut self, name: &str, v: f32) {
        self.push(BufferOpKind::Accumulate, name, [v, 0.0, 0.0, 0.0], 1);
    }
    pub fn accumulate2(&mut self, name: &str, v: Vec2) {
        self.push(BufferOpKind::Accumulate, name, [v.x, v.y, 0.0, 0.0], 2);
    }
    pub fn accumulate3(&mut self, name: &str, v: Vec3) {
        self.push(BufferOpKind::Accumulate, name, [v.x, v.y, v.z, 0.0], 3);
    }
    pub fn accumulate4(&mut self, name: &str, v: [f32; 4]) {
        self.push(BufferOpKind::Accumulate, name, v, 4);
    }

    pub fn write(&mut self, name: &str, v: f32) {
        self.push(BufferOpKind::Write, name, [v, 0.0, 0.0, 0.0], 1);
    }
    pub fn write2(&mut self, name: &str, v: Vec2) {
        self.push(BufferOpKind::Write, name, [v.x, v.y, 0.0, 0.0], 2);
    }
    pub fn write3(&mut self, name: &str, v: Vec3) {
        self.push(BufferOpKind::Write, name, [v.x, v.y, v.z, 0.0], 3);
    }
    pub fn write4(&mut self, name: &str, v: [f32; 4]) {
        self.push(BufferOpKind::Write, name, v, 4);
    }

    /// `shader.trace`: spawns a bounced INTERSECT ray, dropping it per
    /// the bounce/transmittance limits instead of the shader
    /// implementation having to check them itself (`spec.md` §4.4).
    pub fn trace(
        &mut self,
        pixel: (u32, u32),
        bounces: u16,
        origin: Vec3,
        direction: Vec3,
        transmittance: f32,
        bounce_limit: u16,
        threshold: f32,
    ) {
        if bounces > bounce_limit || transmittance < threshold {
            self.killed.intersect += 1;
            return;
        }
        let ray = FatRay::intersect(pixel, bounces, origin, direction, transmittance);
        self.forwards.push((ray, Forward::Local));
        self.produced.intersect += 1;
    }

    pub fn forward(&mut self, ray: FatRay, dest: Forward) {
        self.forwards.push((ray, dest));
    }

    pub fn record_touched(&mut self, count: u32) {
        self.workers_touched.push(count);
    }
}

/// The abstract scripting interface a worker invokes to shade a hit
/// (`spec.md` §9: "the core sees only `shader.direct / .indirect /
/// .emissive` and `texture.sample`"). Implementations are not safe to
/// call concurrently with themselves (`spec.md` §5); the worker
/// serializes calls into a given shader with a per-shader mutex.
pub trait Shader: Send + Sync {
    /// Computes direct lighting contribution for a LIGHT ray's final
    /// hit and records buffer ops into `results`.
    fn direct(
        &self,
        view: Vec3,
        normal: Vec3,
        texcoord: Vec2,
        light_dir: Vec3,
        illumination: Vec3,
        results: &mut WorkResults,
    );

    /// Computes indirect (bounce) contribution for an INTERSECT ray's
    /// final hit, possibly spawning further INTERSECT rays via
    /// `results.trace`.
    fn indirect(&self, view: Vec3, normal: Vec3, texcoord: Vec2, results: &mut WorkResults);

    /// The emitted radiance of an emissive surface at `texcoord`.
    fn emissive(&self, texcoord: Vec2) -> Vec3;

    /// Samples a bound texture by name; the arity suffix on the
    /// spec-level call (`texture`/`texture2`/`texture3`/`texture4`) only
    /// changes how many of the four returned channels the caller reads.
    fn texture(&self, sampler: &str, texcoord: Vec2) -> [f32; 4];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_is_scaled_by_transmittance() {
        let mut results = WorkResults::new(0.5, (0, 0));
        results.accumulate3("color", Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(results.buffer_ops[0].value[0], 1.0);
        assert_eq!(results.buffer_ops[0].channels, 3);
        assert_eq!(results.buffer_ops[0].name(), "color");
    }

    #[test]
    fn trace_drops_ray_past_bounce_limit() {
        let mut results = WorkResults::new(1.0, (0, 0));
        results.trace((0, 0), 5, Vec3::ZERO, Vec3::Z, 1.0, 4, 0.01);
        assert!(results.forwards.is_empty());
        assert_eq!(results.killed.intersect, 1);
    }

    #[test]
    fn trace_drops_ray_below_transmittance_threshold() {
        let mut results = WorkResults::new(1.0, (0, 0));
        results.trace((0, 0), 0, Vec3::ZERO, Vec3::Z, 0.001, 4, 0.01);
        assert!(results.forwards.is_empty());
        assert_eq!(results.killed.intersect, 1);
    }

    #[test]
    fn trace_forwards_locally_within_limits() {
        let mut results = WorkResults::new(1.0, (0, 0));
        results.trace((0, 0), 1, Vec3::ZERO, Vec3::Z, 0.5, 4, 0.01);
        assert_eq!(results.forwards.len(), 1);
        assert_eq!(results.forwards[0].1, Forward::Local);
        assert_eq!(results.produced.intersect, 1);
    }
}
