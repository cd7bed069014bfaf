//! The per-mesh bounding volume hierarchy: SAH build, flattening to a
//! linear array, and the stackless local traversal used once a leaf is
//! reached by the distributed traversal (`spec.md` §4.1, §4.3).
//!
//! The construction is modeled on Physically Based Rendering §4.4 with
//! modifications for stackless traversal, matching
//! `examples/original_source/src/shared/types/bvh.cpp`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::bbox::{Axis, BoundingBox};

/// Rays that self-intersect the surface they just left are rejected below
/// this `t`. Also used as the minimum triangle-hit `t`.
pub const SELF_INTERSECT_EPSILON: f32 = 1e-4;

const NUM_BUCKETS: usize = 12;

/// One node of the flattened, depth-first, left-first BVH array. The left
/// child of an interior node is always `self_index + 1`; `right` names the
/// right subtree root. Leaves carry a `primitive` index into whatever
/// leaf-item list the caller built the tree from (triangle index, mesh id,
/// or worker id, depending on which level of the two-level hierarchy this
/// `Bvh` represents).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearNode {
    pub bounds: BoundingBox,
    pub parent: u32,
    pub right: u32,
    pub axis: Axis,
    pub is_leaf: bool,
    pub primitive: u32,
}

/// A flattened bounding volume hierarchy over generic, pre-bounded
/// primitives. One `Bvh` instance is built per mesh (leaves = triangles),
/// per worker (leaves = owned mesh bounds), and once for the whole cluster
/// (leaves = worker bounds); the traversal shape is identical at every
/// level, only what a "leaf" means differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bvh {
    nodes: Vec<LinearNode>,
}

struct PrimitiveInfo {
    index: u32,
    bounds: BoundingBox,
    centroid: Vec3,
}

/// Build-time node; arena-free recursive tree collapsed into `Bvh::nodes`
/// by `flatten` (`spec.md` §9: "collapse to an arena of LinearNode").
enum BuildNode {
    Leaf {
        bounds: BoundingBox,
        primitive: u32,
    },
    Interior {
        bounds: BoundingBox,
        axis: Axis,
        left: Box<BuildNode>,
        right: Box<BuildNode>,
    },
}

impl BuildNode {
    fn bounds(&self) -> BoundingBox {
        match self {
            BuildNode::Leaf { bounds, .. } => *bounds,
            BuildNode::Interior { bounds, .. } => *bounds,
        }
    }
}

impl Bvh {
    /// Builds a BVH over `items`: pairs of (primitive index, world-space
    /// bounds). Empty input produces an empty BVH (no root).
    pub fn build(items: &[(u32, BoundingBox)]) -> Self {
        if items.is_empty() {
            return Self { nodes: Vec::new() };
        }

        let mut build_data: Vec<PrimitiveInfo> = items
            .iter()
            .map(|(index, bounds)| PrimitiveInfo {
                index: *index,
                bounds: *bounds,
                centroid: bounds.centroid(),
            })
            .collect();

        let root = Self::recursive_build(&mut build_data);

        let mut nodes = Vec::with_capacity(Self::count_nodes(&root));
        Self::flatten(&root, u32::MAX, &mut nodes);
        Self { nodes }
    }

    fn count_nodes(node: &BuildNode) -> usize {
        match node {
            BuildNode::Leaf { .. } => 1,
            BuildNode::Interior { left, right, .. } => {
                1 + Self::count_nodes(left) + Self::count_nodes(right)
            }
        }
    }

    fn recursive_build(build_data: &mut [PrimitiveInfo]) -> BuildNode {
        let mut bounds = BoundingBox::default();
        for p in build_data.iter() {
            bounds = bounds.union(&p.bounds);
        }

        if build_data.len() == 1 {
            return BuildNode::Leaf {
                bounds,
                primitive: build_data[0].index,
            };
        }

        let mut centroid_bounds = BoundingBox::default();
        for p in build_data.iter() {
            centroid_bounds.absorb(p.centroid);
        }

        let axis = centroid_bounds.longest_axis();
        let split_min = axis.component(centroid_bounds.min);
        let split_max = axis.component(centroid_bounds.max);

        let mid = if build_data.len() <= 4 || split_min == split_max {
            let mid = build_data.len() / 2;
            build_data.select_nth_unstable_by(mid, |a, b| {
                axis.component(a.centroid)
                    .partial_cmp(&axis.component(b.centroid))
                    .unwrap()
            });
            mid
        } else {
            Self::sah_partition(build_data, axis, split_min, split_max, bounds.surface_area())
        };

        let (left_data, right_data) = build_data.split_at_mut(mid);
        let left = Box::new(Self::recursive_build(left_data));
        let right = Box::new(Self::recursive_build(right_data));

        BuildNode::Interior {
            bounds,
            axis,
            left,
            right,
        }
    }

    fn bucket_of(centroid: Vec3, axis: Axis, min: f32, max: f32) -> usize {
        let t = (axis.component(centroid) - min) / (max - min);
        let bucket = (NUM_BUCKETS as f32 * t) as usize;
        bucket.min(NUM_BUCKETS - 1)
    }

    /// Surface Area Heuristic over `NUM_BUCKETS` equal-width buckets,
    /// matching `spec.md` §4.1 step 5 (the corrected left/right partition
    /// sums — see `DESIGN.md` for the bug in the original C++ this
    /// diverges from).
    fn sah_partition(
        build_data: &mut [PrimitiveInfo],
        axis: Axis,
        min: f32,
        max: f32,
        surface_area: f32,
    ) -> usize {
        #[derive(Clone, Copy)]
        struct Bucket {
            count: usize,
            bounds: BoundingBox,
        }
        let mut buckets = [Bucket {
            count: 0,
            bounds: BoundingBox::default(),
        }; NUM_BUCKETS];

        for p in build_data.iter() {
            let b = Self::bucket_of(p.centroid, axis, min, max);
            buckets[b].count += 1;
            buckets[b].bounds = buckets[b].bounds.union(&p.bounds);
        }

        let mut best_split = 0usize;
        let mut best_cost = f32::INFINITY;
        for split in 0..NUM_BUCKETS - 1 {
            let mut left_bounds = BoundingBox::default();
            let mut left_count = 0usize;
            for b in &buckets[..=split] {
                left_bounds = left_bounds.union(&b.bounds);
                left_count += b.count;
            }

            let mut right_bounds = BoundingBox::default();
            let mut right_count = 0usize;
            for b in &buckets[split + 1..] {
                right_bounds = right_bounds.union(&b.bounds);
                right_count += b.count;
            }

            let cost = 0.125
                + (left_count as f32 * left_bounds.surface_area()
                    + right_count as f32 * right_bounds.surface_area())
                    / surface_area;

            if cost < best_cost {
                best_cost = cost;
                best_split = split;
            }
        }

        let k: usize = buckets[..=best_split].iter().map(|b| b.count).sum();

        let mut i = 0usize;
        for j in 0..build_data.len() {
            if Self::bucket_of(build_data[j].centroid, axis, min, max) <= best_split {
                build_data.swap(i, j);
                i += 1;
            }
        }
        debug_assert_eq!(i, k);
        k
    }

    fn flatten(node: &BuildNode, parent: u32, nodes: &mut Vec<LinearNode>) -> u32 {
        let my_index = nodes.len() as u32;
        match node {
            BuildNode::Leaf { bounds, primitive } => {
                nodes.push(LinearNode {
                    bounds: *bounds,
                    parent,
                    right: 0,
                    axis: Axis::X,
                    is_leaf: true,
                    primitive: *primitive,
                });
            }
            BuildNode::Interior {
                bounds,
                axis,
                left,
                right,
            } => {
                nodes.push(LinearNode {
                    bounds: *bounds,
                    parent,
                    right: 0,
                    axis: *axis,
                    is_leaf: false,
                    primitive: 0,
                });
                Self::flatten(left, my_index, nodes);
                let right_index = Self::flatten(right, my_index, nodes);
                nodes[my_index as usize].right = right_index;
            }
        }
        my_index
    }

    pub fn nodes(&self) -> &[LinearNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounds of the whole tree (the root's bounds), or `None` if empty.
    pub fn extents(&self) -> Option<BoundingBox> {
        self.nodes.first().map(|n| n.bounds)
    }

    /// The sibling of `current`: if its parent's `right` points at
    /// `current`, the sibling is the parent's left child (`parent + 1`);
    /// otherwise the sibling is the parent's `right`.
    pub fn sibling(&self, current: u32) -> u32 {
        let parent = self.nodes[current as usize].parent;
        let parent_node = &self.nodes[parent as usize];
        if parent_node.right == current {
            parent + 1
        } else {
            parent_node.right
        }
    }

    /// The child on the side of the split axis matching `direction`'s
    /// sign — visited first so traversal can early-out.
    pub fn near_child(&self, current: u32, direction: Vec3) -> u32 {
        let node = &self.nodes[current as usize];
        if node.axis.component(direction) < 0.0 {
            node.right
        } else {
            current + 1
        }
    }

    pub fn far_child(&self, current: u32, direction: Vec3) -> u32 {
        let node = &self.nodes[current as usize];
        if node.axis.component(direction) < 0.0 {
            current + 1
        } else {
            node.right
        }
    }

    /// A complete, non-suspendable traversal of this single-level BVH: the
    /// three-state stackless automaton of `spec.md` §4.3, run to
    /// completion. `intersector` is called on every leaf whose bounds are
    /// hit closer than the current best `t`; it returns an updated best
    /// `t` (or leaves it unchanged by returning the same value back).
    /// `initial_best_t` seeds the pruning distance, so a caller that
    /// already knows a closer hit (e.g. from a previous ray segment) can
    /// skip bounds farther than that without waiting for this traversal
    /// to discover one itself.
    pub fn traverse(
        &self,
        origin: Vec3,
        direction: Vec3,
        initial_best_t: f32,
        mut intersector: impl FnMut(u32, f32) -> Option<f32>,
    ) -> Option<f32> {
        if self.nodes.is_empty() {
            return None;
        }

        let inv_dir = direction.recip();
        let mut best_t = initial_best_t;
        let mut best = false;

        #[derive(PartialEq)]
        enum State {
            FromParent,
            FromSibling,
            FromChild,
        }

        let mut current = 0u32;
        let mut state = State::FromParent;

        loop {
            match state {
                State::FromParent | State::FromSibling => {
                    let node = &self.nodes[current as usize];
                    let (hit, t_enter) = node.bounds.intersect(origin, inv_dir);

                    if !hit || t_enter >= best_t {
                        if current == 0 {
                            break;
                        }
                        state = if state == State::FromParent {
                            current = self.sibling(current);
                            State::FromSibling
                        } else {
                            current = self.nodes[current as usize].parent;
                            State::FromChild
                        };
                        continue;
                    }

                    if node.is_leaf {
                        if let Some(updated) = intersector(node.primitive, best_t) {
                            best_t = updated;
                            best = true;
                        }
                        if current == 0 {
                            break;
                        }
                        current = self.sibling(current);
                        state = State::FromSibling;
                    } else {
                        current = self.near_child(current, direction);
                        state = State::FromParent;
                    }
                }
                State::FromChild => {
                    if current == 0 {
                        break;
                    }
                    let parent = self.nodes[current as usize].parent;
                    let is_near = self.near_child(parent, direction) == current;
                    if is_near {
                        current = self.far_child(parent, direction);
                        state = State::FromSibling;
                    } else {
                        current = parent;
                        state = State::FromChild;
                    }
                }
            }
        }

        best.then_some(best_t)
    }
}
