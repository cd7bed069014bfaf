//! The `RAY` message body (`spec.md` §6: "the in-memory byte image of a
//! FatRay", not msgpack like every other body). [`WireRay`] is a
//! `#[repr(C)]`, all-`f32`/`u32` flattening of [`FatRay`] that
//! `bytemuck` can cast straight to and from a byte slice — no `serde`,
//! no length-prefixed sub-fields, a fixed size known at compile time.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::pipeline::{FatRay, HitRecord, RayKind};
use crate::traversal::{AutomatonState, TraversalState};

const KIND_INTERSECT: u32 = 0;
const KIND_ILLUMINATE: u32 = 1;
const KIND_LIGHT: u32 = 2;

const AUTOMATON_NONE: u32 = 0;
const AUTOMATON_FROM_PARENT: u32 = 1;
const AUTOMATON_FROM_SIBLING: u32 = 2;
const AUTOMATON_FROM_CHILD: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WireRay {
    kind_tag: u32,
    pixel_x: u32,
    pixel_y: u32,
    bounces: u32,
    origin: [f32; 3],
    direction: [f32; 3],
    transmittance: f32,
    hit_worker: u32,
    hit_mesh: u32,
    hit_t: f32,
    hit_normal: [f32; 3],
    hit_texcoord: [f32; 2],
    traversal_current: u32,
    traversal_state: u32,
    current_worker: u32,
    workers_touched: u32,
    light_target: [f32; 3],
    light_emission: [f32; 3],
}

fn automaton_tag(state: AutomatonState) -> u32 {
    match state {
        AutomatonState::None => AUTOMATON_NONE,
        AutomatonState::FromParent => AUTOMATON_FROM_PARENT,
        AutomatonState::FromSibling => AUTOMATON_FROM_SIBLING,
        AutomatonState::FromChild => AUTOMATON_FROM_CHILD,
    }
}

fn automaton_from_tag(tag: u32) -> AutomatonState {
    match tag {
        AUTOMATON_FROM_PARENT => AutomatonState::FromParent,
        AUTOMATON_FROM_SIBLING => AutomatonState::FromSibling,
        AUTOMATON_FROM_CHILD => AutomatonState::FromChild,
        _ => AutomatonState::None,
    }
}

impl From<&FatRay> for WireRay {
    fn from(ray: &FatRay) -> Self {
        let (kind_tag, light_target, light_emission) = match ray.kind {
            RayKind::Intersect => (KIND_INTERSECT, Vec3::ZERO, Vec3::ZERO),
            RayKind::Illuminate => (KIND_ILLUMINATE, Vec3::ZERO, Vec3::ZERO),
            RayKind::Light { target, emission } => (KIND_LIGHT, target, emission),
        };

        Self {
            kind_tag,
            pixel_x: ray.pixel.0,
            pixel_y: ray.pixel.1,
            bounces: ray.bounces as u32,
            origin: ray.origin.into(),
            direction: ray.direction.into(),
            transmittance: ray.transmittance,
            hit_worker: ray.hit.worker,
            hit_mesh: ray.hit.mesh,
            hit_t: ray.hit.t,
            hit_normal: ray.hit.normal.into(),
            hit_texcoord: ray.hit.texcoord.into(),
            traversal_current: ray.traversal.current,
            traversal_state: automaton_tag(ray.traversal.state),
            current_worker: ray.current_worker,
            workers_touched: ray.workers_touched,
            light_target: light_target.into(),
            light_emission: light_emission.into(),
        }
    }
}

impl From<WireRay> for FatRay {
    fn from(wire: WireRay) -> Self {
        let kind = match wire.kind_tag {
            KIND_ILLUMINATE => RayKind::Illuminate,
            KIND_LIGHT => RayKind::Light {
                target: Vec3::from(wire.light_target),
                emission: Vec3::from(wire.light_emission),
            },
            _ => RayKind::Intersect,
        };

        FatRay {
            kind,
            pixel: (wire.pixel_x, wire.pixel_y),
            bounces: wire.bounces as u16,
            origin: Vec3::from(wire.origin),
            direction: Vec3::from(wire.direction),
            transmittance: wire.transmittance,
            hit: HitRecord {
                worker: wire.hit_worker,
                mesh: wire.hit_mesh,
                t: wire.hit_t,
                normal: Vec3::from(wire.hit_normal),
                texcoord: Vec2::from(wire.hit_texcoord),
            },
            traversal: TraversalState {
                current: wire.traversal_current,
                state: automaton_from_tag(wire.traversal_state),
            },
            current_worker: wire.current_worker,
            workers_touched: wire.workers_touched,
        }
    }
}

pub fn encode(ray: &FatRay) -> Vec<u8> {
    bytemuck::bytes_of(&WireRay::from(ray)).to_vec()
}

pub fn decode(bytes: &[u8]) -> Option<FatRay> {
    bytemuck::try_from_bytes::<WireRay>(bytes).ok().copied().map(FatRay::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_ray_round_trips() {
        let ray = FatRay::intersect((3, 4), 2, Vec3::new(1.0, 2.0, 3.0), Vec3::Z, 0.75);
        let bytes = encode(&ray);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.pixel, (3, 4));
        assert_eq!(back.bounces, 2);
        assert_eq!(back.origin, ray.origin);
        assert!(matches!(back.kind, RayKind::Intersect));
    }

    #[test]
    fn light_ray_round_trips_target_and_emission() {
        let mut ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        ray.kind = RayKind::Light {
            target: Vec3::new(1.0, 0.0, 0.0),
            emission: Vec3::new(0.2, 0.4, 0.6),
        };
        let back = decode(&encode(&ray)).unwrap();
        match back.kind {
            RayKind::Light { target, emission } => {
                assert_eq!(target, Vec3::new(1.0, 0.0, 0.0));
                assert_eq!(emission, Vec3::new(0.2, 0.4, 0.6));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let ray = FatRay::intersect((0, 0), 0, Vec3::ZERO, Vec3::Z, 1.0);
        let mut bytes = encode(&ray);
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes).is_none());
    }
}
