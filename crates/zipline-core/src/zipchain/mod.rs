//! Zip-chain index: a per-cluster tree of token subsequences.
//!
//! # Overview
//!
//! Every admitted item appends its distinct tokens to the tree. A traversal
//! step either follows an existing child (a wildcard child always matches)
//! or creates the missing child and jumps back to the root for the next
//! token. Each traversed node counts one more *encounter*. Chains shared by
//! many items therefore grow long and carry high encounter counts, while
//! one-off tokens stay as short, rarely encountered branches.
//!
//! After each append the tree is compacted (see [`compact`](ZipChainIndex::compact))
//! and can then be queried with [`score`](ZipChainIndex::score).
//!
//! # Invariants
//!
//! - the root is created lazily, on the first append;
//! - the total encounter count of the tree only changes during append;
//! - a leaf has height 0 and the root has depth 0;
//! - cached heights and descendant counts are exact at all times.

mod compact;
mod node;
mod score;
mod snapshot;

pub use node::{NodeId, NodeToken};
pub use snapshot::NodeSnapshot;

use node::Arena;

use crate::token::Token;

/// Weight of the root sentinel. It never contributes to a score.
const ROOT_WEIGHT: f32 = 0.0;

#[derive(Debug, Clone, Default)]
pub struct ZipChainIndex {
    arena: Arena,
    root: Option<NodeId>,
}

impl ZipChainIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` until the first append.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Live nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        if self.root.is_some() { self.arena.len() } else { 0 }
    }

    /// Number of traversal steps that started at the root.
    #[must_use]
    pub fn root_encounters(&self) -> u64 {
        self.root.map_or(0, |r| u64::from(self.arena[r].encounters))
    }

    /// Sum of encounters over every node of the tree.
    #[must_use]
    pub fn total_encounters(&self) -> u64 {
        self.root.map_or(0, |root| {
            std::iter::once(root)
                .chain(self.arena.descendants_of(root))
                .map(|id| u64::from(self.arena[id].encounters))
                .sum()
        })
    }

    /// Height of the tree; 0 when empty or when the root has no children.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.root.map_or(0, |r| self.arena[r].height)
    }

    /// Token paths from the root (excluded) down to every leaf.
    #[must_use]
    pub fn chains(&self) -> Vec<Vec<NodeToken>> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, Vec<NodeToken>)> = self.arena[root]
            .children
            .iter()
            .rev()
            .map(|c| (*c, vec![self.arena[*c].token]))
            .collect();
        while let Some((id, path)) = stack.pop() {
            let node = &self.arena[id];
            if node.is_leaf() {
                out.push(path);
                continue;
            }
            for child in node.children.iter().rev() {
                let mut next = path.clone();
                next.push(self.arena[*child].token);
                stack.push((*child, next));
            }
        }
        out
    }

    /// Record one item's distinct tokens, in order.
    pub fn append(&mut self, tokens: &[Token]) {
        let root = self.ensure_root();
        let mut step = root;
        for token in tokens {
            self.arena[step].encounters += 1;
            let node = &self.arena[step];
            let existing = node
                .child(NodeToken::Wildcard)
                .or_else(|| node.child(NodeToken::Token(token.id)));

            step = if let Some(child) = existing {
                child
            } else {
                let child = self.arena.alloc(NodeToken::Token(token.id), token.weight, 1);
                self.arena.attach(step, child);
                root
            };
        }
        if step != root {
            self.arena[step].encounters += 1;
        }
    }

    fn ensure_root(&mut self) -> NodeId {
        if let Some(root) = self.root {
            return root;
        }
        let root = self.arena.alloc(NodeToken::Root, ROOT_WEIGHT, 0);
        self.root = Some(root);
        root
    }
}
