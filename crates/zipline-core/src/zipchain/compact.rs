//! Structural rewrites that keep the zip-chain tree small.
//!
//! Compaction walks the tree top-down and visits only nodes flagged dirty.
//! Per node, the first applicable rule wins:
//!
//! | node shape | rule |
//! |---|---|
//! | one child | duplicate chain: the same chain already hangs under a sibling |
//! | one child | scattered chain: the chain's tokens also hang off the parent |
//! | leaves only | suffix wildcard: interchangeable leaves become one `*` leaf |
//! | height 3 | common grandchild: children become `*`, grandchildren merge |
//!
//! Every rule folds nodes together with [`ZipChainIndex::absorb`], which sums
//! encounters and merges children by token, so the tree's total encounter
//! count is exactly the same before and after. Passes repeat until one
//! makes no rewrite; every rewrite removes at least one node, so this
//! terminates.

use tracing::trace;

use super::ZipChainIndex;
use super::node::{NodeId, NodeToken};

enum Rewrite {
    None,
    /// The visited node itself was folded into another node.
    Removed,
    Changed,
}

impl ZipChainIndex {
    /// Compact the tree until no rule applies. Returns the rewrite count.
    pub fn compact(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut total = 0;
        loop {
            let rewrites = self.compact_node(root);
            if rewrites == 0 {
                break;
            }
            total += rewrites;
        }
        if total > 0 {
            trace!(rewrites = total, nodes = self.arena.len(), "zip chain compacted");
        }
        total
    }

    fn compact_node(&mut self, id: NodeId) -> usize {
        let node = &mut self.arena[id];
        if !node.dirty {
            return 0;
        }
        node.dirty = false;
        if node.is_leaf() {
            return 0;
        }

        let mut rewrites = 0;
        match self.rewrite(id) {
            Rewrite::Removed => return 1,
            Rewrite::Changed => rewrites += 1,
            Rewrite::None => {}
        }

        // children may disappear while siblings compact; skipped ones stay
        // dirty and are picked up by the next pass
        let mut i = 0;
        while let Some(child) = self.arena[id].children.get(i).copied() {
            i += 1;
            rewrites += self.compact_node(child);
        }
        rewrites
    }

    fn rewrite(&mut self, id: NodeId) -> Rewrite {
        let node = &self.arena[id];
        if node.children.len() == 1 {
            if let Some(copy) = self.duplicate_chain(id) {
                self.arena.detach(id);
                self.absorb(id, copy);
                return Rewrite::Removed;
            }
            if let Some(pairs) = self.scattered_chain(id) {
                for (sibling, chain_node) in pairs {
                    self.arena.detach(sibling);
                    self.absorb(sibling, chain_node);
                }
                return Rewrite::Changed;
            }
        } else if node.height == 1 {
            if self.merge_suffix(id) {
                return Rewrite::Changed;
            }
        } else if node.height == 3 && self.merge_common_grandchild(id) {
            return Rewrite::Changed;
        }
        Rewrite::None
    }

    /// A copy of the chain rooted at `id` under one of its siblings.
    ///
    /// The copy must carry the same token, height and pre-order token shape
    /// and have at least as many encounters.
    fn duplicate_chain(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.arena[id];
        let parent = node.parent?;
        if node.height <= 1 {
            return None;
        }

        let shape = self.arena.shape_of(id);
        self.arena[parent]
            .children
            .iter()
            .filter(|sibling| **sibling != id)
            .filter_map(|sibling| self.arena[*sibling].child(node.token))
            .find(|copy| {
                let c = &self.arena[*copy];
                c.height == node.height
                    && c.encounters >= node.encounters
                    && self.arena.shape_of(*copy) == shape
            })
    }

    /// Siblings that were left scattered next to a linear chain.
    ///
    /// `id` heads a linear chain and every chain node's token also sits
    /// directly under the parent, with `sibling + chain node == head`
    /// encounters. Returns `(sibling, chain node)` pairs to fold.
    fn scattered_chain(&self, id: NodeId) -> Option<Vec<(NodeId, NodeId)>> {
        let node = &self.arena[id];
        let parent = &self.arena[node.parent?];
        if node.height <= 1
            || node.descendants != node.height
            || parent.children.len() < node.descendants as usize
        {
            return None;
        }

        let mut pairs = Vec::with_capacity(node.descendants as usize);
        for chain_node in self.arena.descendants_of(id) {
            let dn = &self.arena[chain_node];
            let sibling = parent.child(dn.token)?;
            if sibling == id
                || pairs.iter().any(|(s, _)| *s == sibling)
                || self.arena[sibling].encounters + dn.encounters != node.encounters
            {
                return None;
            }
            pairs.push((sibling, chain_node));
        }
        Some(pairs)
    }

    /// Replace interchangeable leaves with a single wildcard leaf.
    fn merge_suffix(&mut self, id: NodeId) -> bool {
        let node = &self.arena[id];
        if node.parent.is_none() {
            return false;
        }
        let children = &node.children;
        let sum: u32 = children.iter().map(|c| self.arena[*c].encounters).sum();
        // +1: the node was first reached before it had any children
        if node.encounters != sum + 1 {
            return false;
        }
        if children.iter().any(|c| {
            let token = self.arena[*c].token;
            token == node.token || token.is_wildcard()
        }) {
            return false;
        }

        let weighted: f32 = children
            .iter()
            .map(|c| {
                let child = &self.arena[*c];
                child.encounters as f32 * child.weight
            })
            .sum();
        let weight = weighted / sum as f32;

        for child in self.arena.take_children(id) {
            self.arena.release(child);
        }
        let star = self.arena.alloc(NodeToken::Wildcard, weight, sum);
        self.arena.attach(id, star);
        true
    }

    /// Collapse children that all lead to the same grandchild token.
    fn merge_common_grandchild(&mut self, id: NodeId) -> bool {
        let node = &self.arena[id];
        if node.encounters == 0
            || node.children.iter().any(|c| self.arena[*c].height != 2)
        {
            return false;
        }

        let grandchildren: Vec<NodeId> = node
            .children
            .iter()
            .flat_map(|c| self.arena[*c].children.iter().copied())
            .collect();
        let Some(first) = grandchildren.first().map(|gc| self.arena[*gc].token) else {
            return false;
        };
        if node.children.iter().any(|c| self.arena[*c].token == first)
            || grandchildren.iter().any(|gc| self.arena[*gc].token != first)
        {
            return false;
        }

        let gc_sum: u32 = grandchildren.iter().map(|gc| self.arena[*gc].encounters).sum();
        let child_sum: u32 = node.children.iter().map(|c| self.arena[*c].encounters).sum();
        if gc_sum != child_sum || (node.parent.is_some() && node.encounters != gc_sum) {
            return false;
        }

        let encounters = node.encounters as f32;
        let weight = node
            .children
            .iter()
            .map(|c| {
                let child = &self.arena[*c];
                child.encounters as f32 * child.weight / encounters
            })
            .sum::<f32>()
            / node.children.len() as f32;

        let mut merged: Option<NodeId> = None;
        for child in self.arena.take_children(id) {
            for gc in self.arena.take_children(child) {
                match merged {
                    Some(target) => self.absorb(gc, target),
                    None => merged = Some(gc),
                }
            }
            self.arena.release(child);
        }

        let star = self.arena.alloc(NodeToken::Wildcard, weight, child_sum);
        self.arena.attach(id, star);
        if let Some(gc) = merged {
            self.arena.attach(star, gc);
        }
        true
    }

    /// Fold the detached subtree `source` into `target`.
    ///
    /// Encounters are summed; children are merged by token, recursively.
    pub(super) fn absorb(&mut self, source: NodeId, target: NodeId) {
        self.arena[target].encounters += self.arena[source].encounters;
        for child in self.arena.take_children(source) {
            let token = self.arena[child].token;
            match self.arena[target].child(token) {
                Some(existing) => self.absorb(child, existing),
                None => self.arena.attach(target, child),
            }
        }
        self.arena.release(source);
        self.arena.refresh_upward(target);
    }
}
