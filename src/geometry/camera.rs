//! The camera and its primary-ray iterator (`spec.md` §3, §4.4).
//!
//! Basis construction and the per-pixel/sub-sample advance order are
//! carried over verbatim from
//! `examples/original_source/src/shared/types/camera.cpp`.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A primary ray freshly synthesized by the camera iterator, not yet
/// wrapped into a [`crate::pipeline::ray::FatRay`] (that's the queue's
/// job — this type only knows about screen space and world space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryRay {
    pub x: u32,
    pub y: u32,
    pub origin: Vec3,
    pub direction: Vec3,
    pub transmittance: f32,
}

/// Eye/look/up/rotation plus the derived `(u, v, w)` screen basis and the
/// iterator state needed to emit primary rays in order
/// (`spec.md` §3: "once `set_range` is called, `generate_primary` yields
/// each (pixel, sub-sample) ... exactly once in lexicographic order").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub eye: Vec3,
    pub look: Vec3,
    pub up: Vec3,
    /// Degrees of counter-clockwise rotation about the gaze vector
    /// (`spec.md` §9 locks this to degrees).
    pub rotation: f32,
    pub ratio: f32,

    width: u32,
    height: u32,
    antialiasing: u16,

    #[serde(skip)]
    basis: Option<(Vec3, Vec3, Vec3)>,

    #[serde(skip)]
    x: u32,
    #[serde(skip)]
    y: u32,
    #[serde(skip)]
    i: u16,
    #[serde(skip)]
    j: u16,
    #[serde(skip)]
    end_x: u32,
}

impl Camera {
    pub fn new(eye: Vec3, look: Vec3, up: Vec3, rotation: f32, width: u32, height: u32, antialiasing: u16) -> Self {
        Self {
            eye,
            look,
            up,
            rotation,
            ratio: width as f32 / height as f32,
            width,
            height,
            antialiasing: antialiasing.max(1),
            basis: None,
            x: 0,
            y: 0,
            i: 0,
            j: 0,
            end_x: width,
        }
    }

    /// Restricts primary-ray generation to the pixel column range
    /// `[offset, offset+chunk)`. `chunk == 0` means "to the image width".
    /// An `offset` at or past the image width produces zero primary rays
    /// (`spec.md` §8 boundaries).
    pub fn set_range(&mut self, offset: u32, chunk: u32) {
        self.x = offset;
        self.y = 0;
        self.i = 0;
        self.j = 0;
        self.end_x = if chunk == 0 {
            self.width
        } else {
            (offset + chunk).min(self.width)
        };
    }

    fn ensure_basis(&mut self) -> (Vec3, Vec3, Vec3) {
        if let Some(basis) = self.basis {
            return basis;
        }

        let w = (self.look - self.eye).normalize();
        let temp = w.cross(self.up).normalize();
        let v_unrotated = temp.cross(w).normalize();

        let v_pt = self.eye + v_unrotated;
        let theta = self.rotation * std::f32::consts::PI / 180.0;
        let (sin_t, cos_t) = theta.sin_cos();
        let dot = w.x * v_pt.x + w.y * v_pt.y + w.z * v_pt.z;

        let rotated = Vec3::new(
            w.x * dot
                + (v_pt.x * (w.y * w.y + w.z * w.z) - w.x * (w.y * v_pt.y + w.z * v_pt.z)) * cos_t
                + (-w.z * v_pt.y + w.y * v_pt.z) * sin_t,
            w.y * dot
                + (v_pt.y * (w.x * w.x + w.z * w.z) - w.y * (w.x * v_pt.x + w.z * v_pt.z)) * cos_t
                + (w.z * v_pt.x - w.x * v_pt.z) * sin_t,
            w.z * dot
                + (v_pt.z * (w.x * w.x + w.y * w.y) - w.z * (w.x * v_pt.x + w.y * v_pt.y)) * cos_t
                + (-w.y * v_pt.x + w.x * v_pt.y) * sin_t,
        );

        let v = (rotated - self.eye).normalize();
        let u = w.cross(v).normalize();

        let basis = (u, v, w);
        self.basis = Some(basis);
        basis
    }

    /// Yields the next primary ray in lexicographic `(x, y, i, j)` order
    /// (`j` fastest), or `None` once the assigned x-range is exhausted.
    pub fn generate_primary(&mut self) -> Option<PrimaryRay> {
        let (u, v, w) = self.ensure_basis();

        if self.x >= self.end_x {
            return None;
        }

        let l = self.ratio / -2.0;
        let b = -0.5;

        let (us, vs, transmittance) = if self.antialiasing <= 1 {
            let us = l + (self.ratio * (self.x as f32 + 0.5) / self.width as f32);
            let vs = b + (self.y as f32 + 0.5) / self.height as f32;
            (us, vs, 1.0)
        } else {
            let a = self.antialiasing as f32;
            let cell = 1.0 / a;
            let mut rng = rand::rng();
            let us = l
                + (self.ratio * (self.x as f32 + (self.i as f32 * cell) + rng.random::<f32>() * cell)
                    / self.width as f32);
            let vs = b
                + ((self.y as f32 + (self.j as f32 * cell) + rng.random::<f32>() * cell) / self.height as f32);
            (us, vs, 1.0 / (a * a))
        };

        let screen_pt = self.eye + u * us + v * vs + w;
        let origin = self.eye;
        let direction = (screen_pt - self.eye).normalize();
        let primary = PrimaryRay {
            x: self.x,
            y: self.y,
            origin,
            direction,
            transmittance,
        };

        self.j += 1;
        if self.j >= self.antialiasing {
            self.j = 0;
            self.i += 1;
            if self.i >= self.antialiasing {
                self.i = 0;
                self.y += 1;
                if self.y >= self.height {
                    self.y = 0;
                    self.x += 1;
                }
            }
        }

        Some(primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::new(
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::ZERO,
            Vec3::Y,
            0.0,
            4,
            2,
            1,
        )
    }

    #[test]
    fn no_antialiasing_gives_full_transmittance() {
        let mut cam = test_camera();
        cam.set_range(0, 0);
        let ray = cam.generate_primary().unwrap();
        assert_eq!(ray.transmittance, 1.0);
    }

    #[test]
    fn yields_pixels_in_lexicographic_order() {
        let mut cam = test_camera();
        cam.set_range(0, 0);
        let mut pixels = Vec::new();
        while let Some(ray) = cam.generate_primary() {
            pixels.push((ray.x, ray.y));
        }
        let mut expected = Vec::new();
        for x in 0..4 {
            for y in 0..2 {
                expected.push((x, y));
            }
        }
        assert_eq!(pixels, expected);
    }

    #[test]
    fn chunk_zero_runs_to_image_width() {
        let mut cam = test_camera();
        cam.set_range(2, 0);
        let mut count = 0;
        while cam.generate_primary().is_some() {
            count += 1;
        }
        assert_eq!(count, (4 - 2) * 2);
    }

    #[test]
    fn offset_past_width_yields_no_rays() {
        let mut cam = test_camera();
        cam.set_range(10, 0);
        assert!(cam.generate_primary().is_none());
    }

    #[test]
    fn stratified_samples_have_reduced_transmittance() {
        let mut cam = Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 2, 2, 2);
        cam.set_range(0, 0);
        let ray = cam.generate_primary().unwrap();
        assert!((ray.transmittance - 0.25).abs() < 1e-6);
    }
}
