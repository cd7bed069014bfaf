//! The cluster BVH (WBVH): leaves are worker bounds, identical on every
//! worker. Traversal here never performs a primitive intersection — a hit
//! leaf means "forward the ray to this worker", and the resumption token
//! (`TraversalState`) is handed back to the caller so the ray can be sent
//! across the network and the exact same traversal continued on the
//! other side (`spec.md` §4.3).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Bvh};

use super::state::{AutomatonState, TraversalState};

/// Result of a single suspendable traversal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The traversal reached a worker leaf closer than the ray's current
    /// best hit. `worker` owns that leaf; `resume` is the state to save
    /// on the ray before running the local pipeline and (if `worker` is
    /// some other node) sending it across the network.
    Leaf { worker: u32, resume: TraversalState },
    /// The automaton returned to the root in `FromChild` state: no more
    /// worker volumes remain to test.
    Done,
}

/// Outcome of testing a single leaf without a cluster BVH available (the
/// linear-scan fallback, `spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    Forward(u32),
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterBvh {
    bvh: Bvh,
    worker_count: u32,
}

#[derive(PartialEq)]
enum RunState {
    FromParent,
    FromSibling,
    FromChild,
}

impl ClusterBvh {
    /// Builds the cluster BVH over `(worker_id, worker_bounds)` pairs.
    pub fn build(worker_bounds: &[(u32, BoundingBox)]) -> Self {
        Self {
            bvh: Bvh::build(worker_bounds),
            worker_count: worker_bounds.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bvh.is_empty()
    }

    fn advance_after_leaf(&self, current: u32) -> TraversalState {
        if current == 0 {
            TraversalState {
                current: 0,
                state: AutomatonState::FromChild,
            }
        } else {
            TraversalState {
                current: self.bvh.sibling(current),
                state: AutomatonState::FromSibling,
            }
        }
    }

    /// Runs (or resumes) the stackless automaton until it either hits a
    /// worker leaf closer than `best_t`, or returns to the root with
    /// nothing left to visit.
    pub fn step(&self, origin: Vec3, direction: Vec3, best_t: f32, resume: TraversalState) -> StepOutcome {
        if self.bvh.is_empty() {
            return StepOutcome::Done;
        }

        let inv_dir = direction.recip();
        let (mut current, mut state) = match resume.state {
            AutomatonState::None => (0u32, RunState::FromParent),
            AutomatonState::FromParent => (resume.current, RunState::FromParent),
            AutomatonState::FromSibling => (resume.current, RunState::FromSibling),
            AutomatonState::FromChild => (resume.current, RunState::FromChild),
        };

        loop {
            match state {
                RunState::FromParent | RunState::FromSibling => {
                    let node = &self.bvh.nodes()[current as usize];
                    let (hit, t_enter) = node.bounds.intersect(origin, inv_dir);

                    if !hit || t_enter >= best_t {
                        if current == 0 {
                            return StepOutcome::Done;
                        }
                        if state == RunState::FromParent {
                            current = self.bvh.sibling(current);
                            state = RunState::FromSibling;
                        } else {
                            current = self.bvh.nodes()[current as usize].parent;
                            state = RunState::FromChild;
                        }
                        continue;
                    }

                    if node.is_leaf {
                        let resume = self.advance_after_leaf(current);
                        return StepOutcome::Leaf {
                            worker: node.primitive,
                            resume,
                        };
                    }

                    current = self.bvh.near_child(current, direction);
                    state = RunState::FromParent;
                }
                RunState::FromChild => {
                    if current == 0 {
                        return StepOutcome::Done;
                    }
                    let parent = self.bvh.nodes()[current as usize].parent;
                    if self.bvh.near_child(parent, direction) == current {
                        current = self.bvh.far_child(parent, direction);
                        state = RunState::FromSibling;
                    } else {
                        current = parent;
                        state = RunState::FromChild;
                    }
                }
            }
        }
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }
}

/// Degrades to a ring-visit when no cluster BVH is available: advance to
/// the next worker in sequence, or terminate after all have been visited.
pub fn linear_scan_next(current_worker: u32, worker_count: u32) -> LeafOutcome {
    let next = current_worker + 1;
    if next > worker_count {
        LeafOutcome::Done
    } else {
        LeafOutcome::Forward(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn two_worker_cluster() -> ClusterBvh {
        ClusterBvh::build(&[
            (1, BoundingBox::new(Vec3::new(-2.0, -1.0, -1.0), Vec3::new(0.0, 1.0, 1.0))),
            (2, BoundingBox::new(Vec3::new(0.0, -1.0, -1.0), Vec3::new(2.0, 1.0, 1.0))),
        ])
    }

    #[test]
    fn ray_visits_only_its_own_worker_first() {
        let cluster = two_worker_cluster();
        let origin = Vec3::new(-5.0, 0.0, 0.0);
        let direction = Vec3::new(1.0, 0.0, 0.0);
        let outcome = cluster.step(origin, direction, f32::INFINITY, TraversalState::start());
        match outcome {
            StepOutcome::Leaf { worker, .. } => assert_eq!(worker, 1),
            StepOutcome::Done => panic!("expected a leaf hit"),
        }
    }

    #[test]
    fn resuming_after_first_leaf_visits_second_worker() {
        let cluster = two_worker_cluster();
        let origin = Vec3::new(-5.0, 0.0, 0.0);
        let direction = Vec3::new(1.0, 0.0, 0.0);
        let first = cluster.step(origin, direction, f32::INFINITY, TraversalState::start());
        let (worker1, resume) = match first {
            StepOutcome::Leaf { worker, resume } => (worker, resume),
            StepOutcome::Done => panic!("expected a leaf hit"),
        };
        assert_eq!(worker1, 1);

        let second = cluster.step(origin, direction, f32::INFINITY, resume);
        match second {
            StepOutcome::Leaf { worker, .. } => assert_eq!(worker, 2),
            StepOutcome::Done => panic!("expected a second leaf hit"),
        }
    }

    #[test]
    fn traversal_terminates_after_visiting_both_workers() {
        let cluster = two_worker_cluster();
        let origin = Vec3::new(-5.0, 0.0, 0.0);
        let direction = Vec3::new(1.0, 0.0, 0.0);

        let mut resume = TraversalState::start();
        let mut visited = Vec::new();
        loop {
            match cluster.step(origin, direction, f32::INFINITY, resume) {
                StepOutcome::Leaf { worker, resume: next } => {
                    visited.push(worker);
                    resume = next;
                }
                StepOutcome::Done => break,
            }
        }
        assert_eq!(visited, vec![1, 2]);
    }

    #[test]
    fn linear_scan_visits_every_worker_then_terminates() {
        assert_eq!(linear_scan_next(0, 3), LeafOutcome::Forward(1));
        assert_eq!(linear_scan_next(1, 3), LeafOutcome::Forward(2));
        assert_eq!(linear_scan_next(2, 3), LeafOutcome::Forward(3));
        assert_eq!(linear_scan_next(3, 3), LeafOutcome::Done);
    }
}
