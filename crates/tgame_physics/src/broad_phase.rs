//! Dynamic bounding volume tree broad phase
//!
//! A self-balancing binary tree of fat AABBs, one leaf per body:
//!
//! - **Fat leaves**: each leaf box is the body's box plus a static margin,
//!   swept along the body's velocity for one step. Bodies moving inside
//!   their fat box cost nothing to update.
//! - **Perimeter heuristic**: insertion descends towards the sibling whose
//!   box grows least.
//! - **Rotations**: ancestors are rebalanced on the way up after every
//!   insertion and removal, keeping the height logarithmic.
//!
//! Pair queries report sorted, deduplicated handle pairs so a step does not
//! depend on hash or allocation order.

use crate::body::{Body, BodyHandle};
use std::collections::HashMap;
use tgame_math::{Vec2, AABB};

/// Null node sentinel
pub const NULL_NODE: u32 = u32::MAX;

/// A node in the tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    /// Fat AABB for leaves, union of the children otherwise
    pub aabb: AABB,
    /// Parent node index (`NULL_NODE` for the root)
    pub parent: u32,
    /// Left child (`NULL_NODE` for leaves)
    pub left: u32,
    /// Right child (`NULL_NODE` for leaves)
    pub right: u32,
    /// 0 for leaves, `-1` for nodes on the free list
    pub height: i32,
    /// Owning body for leaves
    pub body: Option<BodyHandle>,
}

impl TreeNode {
    fn free() -> Self {
        Self {
            aabb: AABB::EMPTY,
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: -1,
            body: None,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic AABB tree over world bodies
#[derive(Debug, Clone)]
pub struct BroadPhaseTree {
    nodes: Vec<TreeNode>,
    free_list: Vec<u32>,
    root: u32,
    leaves: HashMap<BodyHandle, u32>,
    margin: f32,
    velocity_multiplier: f32,
}

impl Default for BroadPhaseTree {
    fn default() -> Self {
        Self::new(0.1, 1.0)
    }
}

impl BroadPhaseTree {
    /// Create an empty tree with the given static margin and predictive
    /// fattening multiplier
    pub fn new(margin: f32, velocity_multiplier: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            leaves: HashMap::new(),
            margin,
            velocity_multiplier,
        }
    }

    /// Change fattening for leaves inserted from now on
    pub fn set_margins(&mut self, margin: f32, velocity_multiplier: f32) {
        self.margin = margin;
        self.velocity_multiplier = velocity_multiplier;
    }

    // ==================== Leaves ====================

    /// Insert a leaf for `handle`. An existing leaf is refattened in place.
    pub fn insert(&mut self, handle: BodyHandle, body: &Body, dt: f32) -> u32 {
        if let Some(&leaf) = self.leaves.get(&handle) {
            self.reinsert(leaf, self.fat_box(body, dt));
            return leaf;
        }

        let fat = self.fat_box(body, dt);
        let leaf = self.alloc_node();
        let node = &mut self.nodes[leaf as usize];
        node.aabb = fat;
        node.height = 0;
        node.body = Some(handle);
        self.leaves.insert(handle, leaf);
        self.insert_leaf(leaf);
        leaf
    }

    /// Remove the leaf of `handle`. Returns `false` if it had none.
    pub fn remove(&mut self, handle: BodyHandle) -> bool {
        let Some(leaf) = self.leaves.remove(&handle) else {
            return false;
        };
        self.remove_leaf(leaf);
        self.free_node(leaf);
        true
    }

    /// Refresh the leaf of `handle`, reinserting it only when the body's
    /// box escaped its fat box. Returns whether the tree changed.
    pub fn update(&mut self, handle: BodyHandle, body: &Body, dt: f32) -> bool {
        let Some(&leaf) = self.leaves.get(&handle) else {
            self.insert(handle, body, dt);
            return true;
        };

        let tight = body.aabb(0.0);
        if self.nodes[leaf as usize].aabb.contains_aabb(&tight) {
            return false;
        }

        log::debug!("broad phase: reinserting {:?}", handle);
        let fat = self.fat_box(body, dt);
        self.reinsert(leaf, fat);
        true
    }

    /// Remove every leaf
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.leaves.clear();
        self.root = NULL_NODE;
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.leaves.contains_key(&handle)
    }

    /// Fat box stored for `handle`
    pub fn fat_aabb(&self, handle: BodyHandle) -> Option<AABB> {
        self.leaves
            .get(&handle)
            .map(|&leaf| self.nodes[leaf as usize].aabb)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL_NODE
    }

    /// Height of the root, 0 for an empty tree or a single leaf
    pub fn height(&self) -> u32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height as u32
        }
    }

    /// Root node index
    pub fn root(&self) -> Option<u32> {
        (self.root != NULL_NODE).then_some(self.root)
    }

    /// All node slots, including free ones (`height == -1`)
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    // ==================== Queries ====================

    /// Every pair of bodies whose fat boxes overlap, each pair ordered and
    /// the list sorted
    pub fn query_overlaps(&self) -> Vec<(BodyHandle, BodyHandle)> {
        let mut pairs = Vec::new();
        if self.root == NULL_NODE {
            return pairs;
        }

        // Every leaf pair meets exactly once, at the children of its
        // lowest common ancestor.
        let mut candidates = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.is_leaf() {
                continue;
            }
            candidates.push((node.left, node.right));
            stack.push(node.left);
            stack.push(node.right);
        }

        while let Some((a, b)) = candidates.pop() {
            let (na, nb) = (&self.nodes[a as usize], &self.nodes[b as usize]);
            if !na.aabb.intersects(&nb.aabb) {
                continue;
            }
            match (na.is_leaf(), nb.is_leaf()) {
                (true, true) => {
                    if let (Some(x), Some(y)) = (na.body, nb.body) {
                        pairs.push(if x < y { (x, y) } else { (y, x) });
                    }
                }
                (true, false) => {
                    candidates.push((a, nb.left));
                    candidates.push((a, nb.right));
                }
                (false, true) => {
                    candidates.push((na.left, b));
                    candidates.push((na.right, b));
                }
                (false, false) => {
                    if na.height >= nb.height {
                        candidates.push((na.left, b));
                        candidates.push((na.right, b));
                    } else {
                        candidates.push((a, nb.left));
                        candidates.push((a, nb.right));
                    }
                }
            }
        }

        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Bodies whose fat boxes overlap `aabb`, sorted
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<BodyHandle> {
        let mut result = self.collect_leaves(|node_aabb| node_aabb.intersects(aabb));
        result.sort_unstable();
        result
    }

    /// Bodies whose fat boxes contain `point`, sorted
    pub fn query_point(&self, point: Vec2) -> Vec<BodyHandle> {
        let mut result = self.collect_leaves(|node_aabb| node_aabb.contains_point(point));
        result.sort_unstable();
        result
    }

    /// Bodies whose fat boxes the segment `origin + t * direction`,
    /// `t` in `[0, max_t]`, passes through, nearest first
    pub fn raycast(&self, origin: Vec2, direction: Vec2, max_t: f32) -> Vec<(BodyHandle, f32)> {
        let mut hits = Vec::new();
        if self.root == NULL_NODE {
            return hits;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            let Some(t) = node.aabb.raycast(origin, direction, max_t) else {
                continue;
            };
            if node.is_leaf() {
                hits.extend(node.body.map(|handle| (handle, t)));
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits
    }

    fn collect_leaves(&self, mut accept: impl FnMut(&AABB) -> bool) -> Vec<BodyHandle> {
        let mut result = Vec::new();
        if self.root == NULL_NODE {
            return result;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !accept(&node.aabb) {
                continue;
            }
            if node.is_leaf() {
                result.extend(node.body);
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        result
    }

    // ==================== Invariants ====================

    /// Check structural invariants, panicking on the first violation
    pub fn validate(&self) {
        if self.root == NULL_NODE {
            assert!(self.leaves.is_empty(), "empty tree with registered leaves");
            return;
        }
        assert_eq!(self.nodes[self.root as usize].parent, NULL_NODE, "root has a parent");

        let mut reached = 0;
        let mut leaf_count = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            reached += 1;
            let node = &self.nodes[index as usize];
            assert!(node.height >= 0, "free node {index} reachable");

            if node.is_leaf() {
                leaf_count += 1;
                assert_eq!(node.right, NULL_NODE, "leaf {index} has one child");
                assert_eq!(node.height, 0, "leaf {index} height");
                let handle = node.body.expect("leaf without body");
                assert_eq!(self.leaves.get(&handle), Some(&index), "leaf map out of sync");
                continue;
            }

            let (left, right) = (&self.nodes[node.left as usize], &self.nodes[node.right as usize]);
            assert_eq!(left.parent, index, "bad parent link");
            assert_eq!(right.parent, index, "bad parent link");
            assert!(node.body.is_none(), "internal node {index} owns a body");
            assert_eq!(node.height, 1 + left.height.max(right.height), "height of {index}");
            assert_eq!(node.aabb, left.aabb.union(&right.aabb), "box of {index}");
            stack.push(node.left);
            stack.push(node.right);
        }

        assert_eq!(leaf_count, self.leaves.len(), "unreachable leaves");
        assert_eq!(reached + self.free_list.len(), self.nodes.len(), "leaked nodes");
    }

    // ==================== Internal ====================

    fn fat_box(&self, body: &Body, dt: f32) -> AABB {
        body.aabb(self.margin)
            .sweep(body.velocity * (dt * self.velocity_multiplier))
    }

    fn reinsert(&mut self, leaf: u32, fat: AABB) {
        self.remove_leaf(leaf);
        self.nodes[leaf as usize].aabb = fat;
        self.insert_leaf(leaf);
    }

    fn alloc_node(&mut self) -> u32 {
        if let Some(index) = self.free_list.pop() {
            self.nodes[index as usize] = TreeNode::free();
            index
        } else {
            self.nodes.push(TreeNode::free());
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, index: u32) {
        self.nodes[index as usize] = TreeNode::free();
        self.free_list.push(index);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find the best sibling
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let node = &self.nodes[index as usize];
            let perimeter = node.aabb.perimeter();
            let combined = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of a new parent for this node and the leaf
            let cost = 2.0 * combined;
            // Minimum cost of pushing the leaf further down
            let inheritance = 2.0 * (combined - perimeter);

            let descend_cost = |child: u32| {
                let child = &self.nodes[child as usize];
                let grown = child.aabb.union(&leaf_aabb).perimeter();
                if child.is_leaf() {
                    grown + inheritance
                } else {
                    grown - child.aabb.perimeter() + inheritance
                }
            };
            let cost_left = descend_cost(node.left);
            let cost_right = descend_cost(node.right);

            if cost < cost_left && cost < cost_right {
                break;
            }
            index = if cost_left < cost_right { node.left } else { node.right };
        }
        let sibling = index;

        // Splice in a new parent
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.union(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let node = &mut self.nodes[new_parent as usize];
            node.parent = old_parent;
            node.aabb = aabb;
            node.height = height;
            node.left = sibling;
            node.right = leaf;
        }
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, sibling, new_parent);
        }

        self.refit_upwards(new_parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        } else {
            self.replace_child(grand_parent, parent, sibling);
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);
            self.refit_upwards(grand_parent);
        }
        self.nodes[leaf as usize].parent = NULL_NODE;
    }

    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        let node = &mut self.nodes[parent as usize];
        if node.left == old {
            node.left = new;
        } else {
            node.right = new;
        }
    }

    /// Rebalance and refit every ancestor from `start` to the root
    fn refit_upwards(&mut self, start: u32) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            self.refit(index);
            index = self.nodes[index as usize].parent;
        }
    }

    fn refit(&mut self, index: u32) {
        let (left, right) = {
            let node = &self.nodes[index as usize];
            (node.left, node.right)
        };
        let (l, r) = (&self.nodes[left as usize], &self.nodes[right as usize]);
        let aabb = l.aabb.union(&r.aabb);
        let height = 1 + l.height.max(r.height);
        let node = &mut self.nodes[index as usize];
        node.aabb = aabb;
        node.height = height;
    }

    /// Rotate the taller child of `a` above it when the children's heights
    /// differ by more than one. Returns the index now at `a`'s position.
    fn balance(&mut self, a: u32) -> u32 {
        let node_a = &self.nodes[a as usize];
        if node_a.is_leaf() || node_a.height < 2 {
            return a;
        }

        let (b, c) = (node_a.left, node_a.right);
        let skew = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if skew > 1 {
            self.rotate_up(a, c, b, true)
        } else if skew < -1 {
            self.rotate_up(a, b, c, false)
        } else {
            a
        }
    }

    /// Lift `up` (a child of `a`) into `a`'s place. `other` is `a`'s
    /// remaining child. `up_was_right` tells which side `up` hung on.
    fn rotate_up(&mut self, a: u32, up: u32, other: u32, up_was_right: bool) -> u32 {
        let (f, g) = {
            let node = &self.nodes[up as usize];
            (node.left, node.right)
        };

        // `up` takes `a`'s place under `a`'s parent
        let a_parent = self.nodes[a as usize].parent;
        self.nodes[up as usize].parent = a_parent;
        self.nodes[a as usize].parent = up;
        if a_parent == NULL_NODE {
            self.root = up;
        } else {
            self.replace_child(a_parent, a, up);
        }

        // The taller grandchild stays with `up`, the shorter moves to `a`
        let (keep, give) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };

        if up_was_right {
            self.nodes[up as usize].left = a;
            self.nodes[up as usize].right = keep;
            self.nodes[a as usize].left = other;
            self.nodes[a as usize].right = give;
        } else {
            self.nodes[up as usize].left = keep;
            self.nodes[up as usize].right = a;
            self.nodes[a as usize].left = give;
            self.nodes[a as usize].right = other;
        }
        self.nodes[give as usize].parent = a;
        self.nodes[keep as usize].parent = up;

        self.refit(a);
        self.refit(up);
        up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyId, BodySet};
    use crate::shape::Shape;

    /// Deterministic pseudo-random sequence for tree stress tests
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as f32) / (u32::MAX >> 1) as f32
        }
    }

    fn circle_at(bodies: &mut BodySet, id: u32, position: Vec2) -> BodyHandle {
        let mut body = Body::new(BodyId(id));
        body.set_shape(Shape::circle(0.5)).unwrap();
        body.position = position;
        BodyHandle(bodies.insert(body))
    }

    #[test]
    fn test_insert_remove_round_trip() {
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::default();
        let handles: Vec<_> = (0..32)
            .map(|i| circle_at(&mut bodies, i, Vec2::new(i as f32 * 1.5, 0.0)))
            .collect();

        for &h in &handles {
            tree.insert(h, &bodies[h.0], 0.016);
        }
        tree.validate();
        assert_eq!(tree.leaf_count(), 32);

        for &h in &handles {
            assert!(tree.remove(h));
        }
        tree.validate();
        assert!(tree.is_empty());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.root().is_none());
        assert!(!tree.remove(handles[0]));
    }

    #[test]
    fn test_update_without_motion_is_idempotent() {
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::default();
        let a = circle_at(&mut bodies, 1, Vec2::ZERO);
        let b = circle_at(&mut bodies, 2, Vec2::new(3.0, 0.0));
        tree.insert(a, &bodies[a.0], 0.016);
        tree.insert(b, &bodies[b.0], 0.016);

        let before = tree.nodes().to_vec();
        assert!(!tree.update(a, &bodies[a.0], 0.016));
        assert!(!tree.update(a, &bodies[a.0], 0.016));
        assert_eq!(tree.nodes(), &before[..]);

        bodies[b.0].position = Vec2::new(10.0, 0.0);
        assert!(tree.update(b, &bodies[b.0], 0.016));
        assert!(!tree.update(b, &bodies[b.0], 0.016));
        tree.validate();
    }

    #[test]
    fn test_leaf_contains_margin_and_sweep() {
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::new(0.1, 2.0);
        let a = circle_at(&mut bodies, 1, Vec2::ZERO);
        bodies[a.0].velocity = Vec2::new(10.0, 0.0);
        tree.insert(a, &bodies[a.0], 0.1);

        let fat = tree.fat_aabb(a).unwrap();
        assert!(fat.contains_aabb(&bodies[a.0].aabb(0.1)));
        // Swept ahead by v * dt * multiplier = 2.0
        assert!((fat.max.x - 2.6).abs() < 1e-5);
        assert!((fat.min.x + 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_height_stays_logarithmic() {
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::default();
        for i in 0..256 {
            let h = circle_at(&mut bodies, i, Vec2::new(i as f32 * 2.0, 0.0));
            tree.insert(h, &bodies[h.0], 0.016);
        }
        tree.validate();
        assert!(tree.height() <= 24, "height {}", tree.height());
    }

    #[test]
    fn test_random_operations_match_brute_force() {
        let mut rng = Lcg(7);
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::default();
        let mut live = Vec::new();

        for i in 0..80 {
            let p = Vec2::new(rng.next_f32() * 20.0, rng.next_f32() * 20.0);
            let h = circle_at(&mut bodies, i, p);
            tree.insert(h, &bodies[h.0], 0.016);
            live.push(h);
        }
        tree.validate();

        for round in 0..5 {
            for &h in live.iter().step_by(3) {
                let p = Vec2::new(rng.next_f32() * 20.0, rng.next_f32() * 20.0);
                bodies[h.0].position = p;
                tree.update(h, &bodies[h.0], 0.016);
            }
            let removed = live.remove((round * 7) % live.len());
            assert!(tree.remove(removed));
            tree.validate();

            let mut brute = Vec::new();
            for (i, &x) in live.iter().enumerate() {
                for &y in &live[i + 1..] {
                    let (fx, fy) = (tree.fat_aabb(x).unwrap(), tree.fat_aabb(y).unwrap());
                    if fx.intersects(&fy) {
                        brute.push(if x < y { (x, y) } else { (y, x) });
                    }
                }
            }
            brute.sort_unstable();
            assert_eq!(tree.query_overlaps(), brute);
        }
    }

    #[test]
    fn test_point_aabb_and_ray_queries() {
        let mut bodies = BodySet::new();
        let mut tree = BroadPhaseTree::new(0.0, 0.0);
        let a = circle_at(&mut bodies, 1, Vec2::new(0.0, 0.0));
        let b = circle_at(&mut bodies, 2, Vec2::new(5.0, 0.0));
        let c = circle_at(&mut bodies, 3, Vec2::new(0.0, 5.0));
        for h in [a, b, c] {
            tree.insert(h, &bodies[h.0], 0.016);
        }

        assert_eq!(tree.query_point(Vec2::new(5.2, 0.1)), vec![b]);
        assert!(tree.query_point(Vec2::new(2.5, 2.5)).is_empty());

        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(
            tree.query_aabb(&AABB::new(Vec2::new(-1.0, -1.0), Vec2::new(6.0, 1.0))),
            expected
        );

        let hits = tree.raycast(Vec2::new(-5.0, 0.0), Vec2::X, 20.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, a);
        assert!((hits[0].1 - 4.5).abs() < 1e-5);
        assert_eq!(hits[1].0, b);
        assert!(tree.query_overlaps().is_empty());
    }
}
