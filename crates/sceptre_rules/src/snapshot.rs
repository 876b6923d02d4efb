//! Snapshot trees.
//!
//! A snapshot is a point in a trace at which a cell is claimed to hold a
//! value. The snapshots of one rule live together in a small arena — a
//! `Vec` indexed by [`SnapshotId`] — and ordering links are indices into
//! that arena, so a tree can be cloned, substituted and merged without
//! touching any shared structure.
//!
//! Two ordering strengths exist between snapshots of the same cell:
//!
//! - `LaterThan` (`=<` in the textual form): reflexive-transitive order;
//! - `ModifiedOnce` (`<@`): exactly one transition lies between the two,
//!   which is strictly stronger and therefore also implies `LaterThan`.
//!
//! A snapshot may additionally carry a `transfers_to` state; such
//! snapshots are the mutation points of state-transferring rules.

use sceptre_algebra::{SigmaMap, State};

use crate::error::{RuleConstructionError, RuleResult};

/// Index of a snapshot within its rule's arena.
pub type SnapshotId = usize;

/// Strength of an ordering link between two snapshots of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraceLink {
    /// The later snapshot is at or after the earlier one.
    LaterThan,
    /// Exactly one transition separates the two snapshots.
    ModifiedOnce,
}

/// One node of a snapshot tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The state claimed at this point of the trace.
    pub state: State,
    /// Links to snapshots known to be earlier, with their strength.
    pub predecessors: Vec<(SnapshotId, TraceLink)>,
    /// Set when a transferring rule mutates the cell away from `state`.
    pub transfers_to: Option<State>,
}

impl Snapshot {
    fn new(state: State) -> Snapshot {
        Snapshot {
            state,
            predecessors: Vec::new(),
            transfers_to: None,
        }
    }
}

/// The arena of snapshots belonging to a single rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotTree {
    nodes: Vec<Snapshot>,
}

impl SnapshotTree {
    /// An empty tree.
    pub fn new() -> SnapshotTree {
        SnapshotTree::default()
    }

    /// Adds a snapshot for `state` and returns its handle.
    pub fn register(&mut self, state: State) -> SnapshotId {
        self.nodes.push(Snapshot::new(state));
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: SnapshotId) -> &Snapshot {
        &self.nodes[id]
    }

    /// Checked lookup, for callers holding ids of unknown provenance.
    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SnapshotId, &Snapshot)> {
        self.nodes.iter().enumerate()
    }

    /// Records that `earlier` precedes `later` with the given strength.
    pub fn link(&mut self, earlier: SnapshotId, later: SnapshotId, strength: TraceLink) -> RuleResult<()> {
        if earlier >= self.nodes.len() {
            return Err(RuleConstructionError::UnknownSnapshot { id: earlier });
        }
        if later >= self.nodes.len() {
            return Err(RuleConstructionError::UnknownSnapshot { id: later });
        }
        let entry = (earlier, strength);
        let preds = &mut self.nodes[later].predecessors;
        if !preds.contains(&entry) {
            preds.push(entry);
        }
        Ok(())
    }

    /// Declares that the cell at `id` is mutated to `target`.
    pub fn set_transfer(&mut self, id: SnapshotId, target: State) -> RuleResult<()> {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.transfers_to = Some(target);
                Ok(())
            }
            None => Err(RuleConstructionError::UnknownSnapshot { id }),
        }
    }

    /// The snapshots that carry a transfer, with their targets.
    pub fn transfers(&self) -> impl Iterator<Item = (SnapshotId, &State, &State)> {
        self.nodes.iter().enumerate().filter_map(|(id, node)| {
            node.transfers_to
                .as_ref()
                .map(|target| (id, &node.state, target))
        })
    }

    /// Is `earlier` at or before `later`? Reflexive; follows links of
    /// either strength transitively.
    pub fn reaches(&self, earlier: SnapshotId, later: SnapshotId) -> bool {
        if earlier == later {
            return true;
        }
        self.nodes[later]
            .predecessors
            .iter()
            .any(|(pred, _)| self.reaches(earlier, *pred))
    }

    /// Is there a single-transition step from `earlier` to `later`?
    ///
    /// `ModifiedOnce` does not decompose, so only a direct link counts.
    pub fn reaches_modified_once(&self, earlier: SnapshotId, later: SnapshotId) -> bool {
        self.nodes[later]
            .predecessors
            .iter()
            .any(|(pred, strength)| *pred == earlier && *strength == TraceLink::ModifiedOnce)
    }

    /// Fails if the ordering links contain a cycle.
    pub fn assert_acyclic(&self) -> RuleResult<()> {
        // 0 = unvisited, 1 = on stack, 2 = done.
        let mut mark = vec![0u8; self.nodes.len()];
        for id in 0..self.nodes.len() {
            if mark[id] == 0 && self.dfs_cycle(id, &mut mark) {
                return Err(RuleConstructionError::OrderingCycle);
            }
        }
        Ok(())
    }

    fn dfs_cycle(&self, id: SnapshotId, mark: &mut [u8]) -> bool {
        mark[id] = 1;
        for (pred, _) in &self.nodes[id].predecessors {
            match mark[*pred] {
                1 => return true,
                0 => {
                    if self.dfs_cycle(*pred, mark) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        mark[id] = 2;
        false
    }

    /// Returns the tree with a substitution applied to every state.
    pub fn substituted(&self, sigma: &SigmaMap) -> SnapshotTree {
        SnapshotTree {
            nodes: self
                .nodes
                .iter()
                .map(|node| Snapshot {
                    state: node.state.substituted(sigma),
                    predecessors: node.predecessors.clone(),
                    transfers_to: node.transfers_to.as_ref().map(|t| t.substituted(sigma)),
                })
                .collect(),
        }
    }

    /// Appends a clone of `other`; returns the offset to add to `other`'s
    /// snapshot ids to address them in `self`.
    pub fn merge(&mut self, other: &SnapshotTree) -> usize {
        let offset = self.nodes.len();
        for node in &other.nodes {
            self.nodes.push(Snapshot {
                state: node.state.clone(),
                predecessors: node
                    .predecessors
                    .iter()
                    .map(|(pred, strength)| (pred + offset, *strength))
                    .collect(),
                transfers_to: node.transfers_to.clone(),
            });
        }
        offset
    }

    /// The snapshots nothing orders itself after (trace endpoints).
    pub fn latest(&self) -> Vec<SnapshotId> {
        let mut has_successor = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for (pred, _) in &node.predecessors {
                has_successor[*pred] = true;
            }
        }
        (0..self.nodes.len()).filter(|id| !has_successor[*id]).collect()
    }

    /// Compresses syntactically equal sibling snapshots of one cell.
    ///
    /// When two snapshots claim the same cell, the same state and the same
    /// transfer, they describe one point of the trace; the later-registered
    /// one is removed and every reference redirected. Returns the id
    /// remapping so premise attachments can follow.
    pub fn compress(&mut self) -> Vec<SnapshotId> {
        let mut remap: Vec<SnapshotId> = (0..self.nodes.len()).collect();
        for i in 0..self.nodes.len() {
            if remap[i] != i {
                continue;
            }
            for j in (i + 1)..self.nodes.len() {
                if remap[j] != j {
                    continue;
                }
                if self.nodes[i].state == self.nodes[j].state
                    && self.nodes[i].transfers_to == self.nodes[j].transfers_to
                    && !self.reaches(i, j)
                    && !self.reaches(j, i)
                {
                    remap[j] = i;
                }
            }
        }
        if remap.iter().enumerate().all(|(i, &m)| i == m) {
            return remap;
        }
        // Fold predecessor lists of merged nodes into their survivor.
        for j in 0..self.nodes.len() {
            if remap[j] != j {
                let preds = self.nodes[j].predecessors.clone();
                let target = remap[j];
                for (pred, strength) in preds {
                    let entry = (remap[pred], strength);
                    if entry.0 != target && !self.nodes[target].predecessors.contains(&entry) {
                        self.nodes[target].predecessors.push(entry);
                    }
                }
            }
        }
        // Rebuild the arena densely.
        let mut dense: Vec<SnapshotId> = vec![usize::MAX; self.nodes.len()];
        let mut new_nodes = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if remap[i] == i {
                dense[i] = new_nodes.len();
                new_nodes.push(node.clone());
            }
        }
        for (i, slot) in dense.clone().iter().enumerate() {
            if *slot == usize::MAX {
                dense[i] = dense[remap[i]];
            }
        }
        for node in &mut new_nodes {
            for entry in &mut node.predecessors {
                entry.0 = dense[entry.0];
            }
            node.predecessors.sort();
            node.predecessors.dedup();
        }
        // Drop self-references introduced by merging.
        for (id, node) in new_nodes.iter_mut().enumerate() {
            node.predecessors.retain(|(pred, _)| *pred != id);
        }
        self.nodes = new_nodes;
        dense
    }

    /// Removes snapshots that constrain nothing: no transfer, no ordering
    /// links in either direction, and not referenced by `keep`.
    ///
    /// Returns the id remapping (removed ids map to `usize::MAX`).
    pub fn prune_trivial(&mut self, keep: &[SnapshotId]) -> Vec<SnapshotId> {
        let mut referenced = vec![false; self.nodes.len()];
        for id in keep {
            referenced[*id] = true;
        }
        for node in &self.nodes {
            for (pred, _) in &node.predecessors {
                referenced[*pred] = true;
            }
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if node.transfers_to.is_some() || !node.predecessors.is_empty() {
                referenced[id] = true;
            }
        }
        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut new_nodes = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if referenced[id] {
                remap[id] = new_nodes.len();
                new_nodes.push(node.clone());
            }
        }
        for node in &mut new_nodes {
            for entry in &mut node.predecessors {
                entry.0 = remap[entry.0];
            }
        }
        self.nodes = new_nodes;
        remap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceptre_algebra::Message;

    fn st(cell: &str, value: Message) -> State {
        State::new(cell, value)
    }

    #[test]
    fn register_returns_sequential_ids() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("x")));
        let b = tree.register(st("c", Message::name("y")));
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn reaches_is_reflexive_and_transitive() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("b")));
        let c = tree.register(st("c", Message::name("d")));
        tree.link(a, b, TraceLink::LaterThan).unwrap();
        tree.link(b, c, TraceLink::ModifiedOnce).unwrap();
        assert!(tree.reaches(a, a));
        assert!(tree.reaches(a, b));
        assert!(tree.reaches(a, c));
        assert!(!tree.reaches(c, a));
    }

    #[test]
    fn modified_once_implies_later_than() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("b")));
        tree.link(a, b, TraceLink::ModifiedOnce).unwrap();
        assert!(tree.reaches_modified_once(a, b));
        assert!(tree.reaches(a, b));
    }

    #[test]
    fn modified_once_does_not_decompose() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("b")));
        let c = tree.register(st("c", Message::name("d")));
        tree.link(a, b, TraceLink::LaterThan).unwrap();
        tree.link(b, c, TraceLink::ModifiedOnce).unwrap();
        assert!(!tree.reaches_modified_once(a, c));
    }

    #[test]
    fn cycle_is_detected() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("b")));
        tree.link(a, b, TraceLink::LaterThan).unwrap();
        tree.link(b, a, TraceLink::LaterThan).unwrap();
        assert_eq!(tree.assert_acyclic(), Err(RuleConstructionError::OrderingCycle));
    }

    #[test]
    fn linking_unknown_id_fails() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        assert!(matches!(
            tree.link(a, 7, TraceLink::LaterThan),
            Err(RuleConstructionError::UnknownSnapshot { id: 7 })
        ));
    }

    #[test]
    fn merge_offsets_ids() {
        let mut left = SnapshotTree::new();
        left.register(st("c", Message::name("a")));
        let mut right = SnapshotTree::new();
        let r0 = right.register(st("d", Message::name("b")));
        let r1 = right.register(st("d", Message::name("e")));
        right.link(r0, r1, TraceLink::LaterThan).unwrap();
        let offset = left.merge(&right);
        assert_eq!(offset, 1);
        assert_eq!(left.len(), 3);
        assert!(left.reaches(r0 + offset, r1 + offset));
    }

    #[test]
    fn compress_merges_equal_snapshots() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("a")));
        let later = tree.register(st("c", Message::name("z")));
        tree.link(a, later, TraceLink::LaterThan).unwrap();
        tree.link(b, later, TraceLink::LaterThan).unwrap();
        let remap = tree.compress();
        assert_eq!(tree.len(), 2);
        assert_eq!(remap[a], remap[b]);
        assert!(tree.reaches(remap[a], remap[later]));
    }

    #[test]
    fn prune_drops_unconstrained_nodes() {
        let mut tree = SnapshotTree::new();
        let kept = tree.register(st("c", Message::name("a")));
        let _idle = tree.register(st("d", Message::name("b")));
        let remap = tree.prune_trivial(&[kept]);
        assert_eq!(tree.len(), 1);
        assert_eq!(remap[kept], 0);
        assert_eq!(remap[1], usize::MAX);
    }

    #[test]
    fn latest_finds_trace_endpoints() {
        let mut tree = SnapshotTree::new();
        let a = tree.register(st("c", Message::name("a")));
        let b = tree.register(st("c", Message::name("b")));
        tree.link(a, b, TraceLink::LaterThan).unwrap();
        assert_eq!(tree.latest(), vec![b]);
    }
}
