//! The per-worker ray queue: three priority sub-queues plus a primary-ray
//! fallback through the camera iterator (`spec.md` §4.4, confirmed
//! against `examples/original_source/src/worker/ray_queue.cpp`).

use std::collections::VecDeque;

use crate::geometry::Camera;

use super::ray::{FatRay, RayKind};

/// The result of a [`RayQueue::pop`]: either a ray ready to dispatch, or
/// "no more primary rays will ever be generated" once the camera is
/// exhausted.
#[derive(Debug)]
pub enum PopResult {
    Ray(FatRay),
    EndOfStream,
}

/// Three FIFO sub-queues with strict pop priority LIGHT > ILLUMINATE >
/// INTERSECT (shorter-lived work first, reducing in-flight ray count).
/// When every sub-queue is empty, a new primary ray is synthesized from
/// the camera; when the camera is exhausted, `pop` reports end-of-stream.
pub struct RayQueue {
    intersect: VecDeque<FatRay>,
    illuminate: VecDeque<FatRay>,
    light: VecDeque<FatRay>,
    camera: Camera,
    paused: bool,
}

impl RayQueue {
    pub fn new(camera: Camera) -> Self {
        Self {
            intersect: VecDeque::new(),
            illuminate: VecDeque::new(),
            light: VecDeque::new(),
            camera,
            paused: false,
        }
    }

    pub fn push(&mut self, ray: FatRay) {
        match ray.kind {
            RayKind::Light { .. } => self.light.push_back(ray),
            RayKind::Illuminate => self.illuminate.push_back(ray),
            RayKind::Intersect => self.intersect.push_back(ray),
        }
    }

    /// Queues still drain in-flight work while paused; only new-primary
    /// synthesis is suppressed (`spec.md` §4.4, renderer flow control).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `(intersect, illuminate, light)` queue depths, for `RenderStats`.
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.intersect.len(), self.illuminate.len(), self.light.len())
    }

    pub fn set_range(&mut self, offset: u32, chunk: u32) {
        self.camera.set_range(offset, chunk);
    }

    pub fn pop(&mut self) -> Option<PopResult> {
        if let Some(ray) = self.light.pop_front() {
            return Some(PopResult::Ray(ray));
        }
        if let Some(ray) = self.illuminate.pop_front() {
            return Some(PopResult::Ray(ray));
        }
        if let Some(ray) = self.intersect.pop_front() {
            return Some(PopResult::Ray(ray));
        }
        if self.paused {
            return None;
        }
        match self.camera.generate_primary() {
            Some(primary) => Some(PopResult::Ray(FatRay::intersect(
                (primary.x, primary.y),
                0,
                primary.origin,
                primary.direction,
                primary.transmittance,
            ))),
            None => Some(PopResult::EndOfStream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera() -> Camera {
        let mut cam = Camera::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y, 0.0, 2, 2, 1);
        cam.set_range(0, 0);
        cam
    }

    #[test]
    fn light_beats_illuminate_beats_intersect() {
        let mut q = RayQueue::new(camera());
        q.push(FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0));
        let mut illuminate_ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        illuminate_ray.kind = RayKind::Illuminate;
        q.push(illuminate_ray);
        let mut light_ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        light_ray.kind = RayKind::Light {
            target: Vec3::ZERO,
            emission: Vec3::ONE,
        };
        q.push(light_ray);

        match q.pop().unwrap() {
            PopResult::Ray(ray) => assert!(matches!(ray.kind, RayKind::Light { .. })),
            PopResult::EndOfStream => panic!("expected a ray"),
        }
        match q.pop().unwrap() {
            PopResult::Ray(ray) => assert!(matches!(ray.kind, RayKind::Illuminate)),
            PopResult::EndOfStream => panic!("expected a ray"),
        }
        match q.pop().unwrap() {
            PopResult::Ray(ray) => assert!(matches!(ray.kind, RayKind::Intersect)),
            PopResult::EndOfStream => panic!("expected a ray"),
        }
    }

    #[test]
    fn empty_queues_synthesize_primaries_then_end_of_stream() {
        let mut q = RayQueue::new(camera());
        let mut count = 0;
        loop {
            match q.pop().unwrap() {
                PopResult::Ray(_) => count += 1,
                PopResult::EndOfStream => break,
            }
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn paused_queue_drains_but_does_not_synthesize() {
        let mut q = RayQueue::new(camera());
        q.push(FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0));
        q.pause();
        assert!(matches!(q.pop(), Some(PopResult::Ray(_))));
        assert!(q.pop().is_none());
    }
}
