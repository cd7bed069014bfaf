//! Distributed traversal: the two-level BVH across workers and the
//! stackless, suspendable traversal that yields a "forward to worker"
//! continuation (`spec.md` §4.3).

mod cluster;
mod state;

pub use cluster::{linear_scan_next, ClusterBvh, LeafOutcome, StepOutcome};
pub use state::{AutomatonState, TraversalState};
