//! Index-addressed node storage for the zip-chain tree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. Parent links
//! are plain indices and never own anything; ownership flows from a node to
//! its `children` list. Released slots are recycled through a free list.
//!
//! Cached shape data (`height`, `descendants`) is kept exact: every
//! structural change calls [`Arena::refresh_upward`], which recomputes the
//! changed node and each ancestor from their children.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::error::ClusterError;
use crate::token::TokenId;

/// Slot index of a node inside its [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeToken {
    /// The tree's sentinel root.
    Root,
    /// Stands in for any token.
    Wildcard,
    Token(TokenId),
}

impl NodeToken {
    /// Persisted code of [`NodeToken::Wildcard`].
    pub const WILDCARD_CODE: i64 = -7;
    /// Persisted code of [`NodeToken::Root`].
    pub const ROOT_CODE: i64 = -99;

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Root => Self::ROOT_CODE,
            Self::Wildcard => Self::WILDCARD_CODE,
            Self::Token(id) => i64::from(id.0),
        }
    }

    /// Decode a persisted token code.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Persistence`] for negative codes other than
    /// the two sentinels and for codes that do not fit a token id.
    pub fn from_code(code: i64) -> Result<Self, ClusterError> {
        match code {
            Self::ROOT_CODE => Ok(Self::Root),
            Self::WILDCARD_CODE => Ok(Self::Wildcard),
            _ => u32::try_from(code)
                .map(|id| Self::Token(TokenId(id)))
                .map_err(|_| ClusterError::Persistence(format!("invalid node token code {code}"))),
        }
    }

    #[must_use]
    pub const fn token_id(self) -> Option<TokenId> {
        match self {
            Self::Token(id) => Some(id),
            Self::Root | Self::Wildcard => None,
        }
    }

    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub token: NodeToken,
    pub weight: f32,
    pub encounters: u32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    by_token: HashMap<NodeToken, NodeId>,
    /// Distance to the farthest leaf below; 0 for a leaf.
    pub height: u32,
    /// Distance to the root; 0 for the root.
    pub depth: u32,
    pub descendants: u32,
    /// Compaction has to look at this node again.
    pub dirty: bool,
    live: bool,
}

impl Node {
    fn new(token: NodeToken, weight: f32, encounters: u32) -> Self {
        Self {
            token,
            weight,
            encounters,
            parent: None,
            children: Vec::new(),
            by_token: HashMap::new(),
            height: 0,
            depth: 0,
            descendants: 0,
            dirty: true,
            live: true,
        }
    }

    #[must_use]
    pub fn child(&self, token: NodeToken) -> Option<NodeId> {
        self.by_token.get(&token).copied()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Node>,
    free: Vec<usize>,
}

impl Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Arena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

impl Arena {
    /// Store a detached node and return its id.
    pub fn alloc(&mut self, token: NodeToken, weight: f32, encounters: u32) -> NodeId {
        let node = Node::new(token, weight, encounters);
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            NodeId(slot)
        } else {
            self.nodes.push(node);
            NodeId(self.nodes.len() - 1)
        }
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Link a detached `child` under `parent`.
    ///
    /// The caller guarantees `parent` has no child with the same token.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        let token = self[child].token;
        debug_assert!(self[parent].child(token).is_none(), "duplicate child token");

        let depth = self[parent].depth + 1;
        self[child].parent = Some(parent);
        self.set_depth(child, depth);

        let node = &mut self[parent];
        node.children.push(child);
        node.by_token.insert(token, child);
        self.refresh_upward(parent);
    }

    /// Unlink `child` from its parent. The child subtree stays allocated.
    pub fn detach(&mut self, child: NodeId) {
        let Some(parent) = self[child].parent.take() else {
            return;
        };
        let token = self[child].token;
        let node = &mut self[parent];
        node.children.retain(|c| *c != child);
        node.by_token.remove(&token);
        self.refresh_upward(parent);
    }

    /// Take the children of `id`, leaving it a leaf.
    ///
    /// The returned nodes still carry `id` as their parent until they are
    /// attached elsewhere or released.
    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let node = &mut self[id];
        node.by_token.clear();
        let children = std::mem::take(&mut node.children);
        for child in &children {
            self[*child].parent = None;
        }
        self.refresh_upward(id);
        children
    }

    /// Free a detached node and everything below it.
    pub fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = &mut self[next];
            if !node.live {
                continue;
            }
            node.live = false;
            node.by_token.clear();
            stack.append(&mut node.children);
            self.free.push(next.0);
        }
    }

    /// Recompute shape data of `from` and its ancestors and mark them dirty.
    ///
    /// The direct children of `from` are marked dirty as well, since their
    /// sibling context changed.
    pub fn refresh_upward(&mut self, from: NodeId) {
        let children = self[from].children.clone();
        for child in children {
            self[child].dirty = true;
        }

        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let (height, descendants) = self[id].children.iter().fold((0, 0), |(h, d), c| {
                let child = &self[*c];
                (h.max(child.height + 1), d + child.descendants + 1)
            });
            let node = &mut self[id];
            node.height = height;
            node.descendants = descendants;
            node.dirty = true;
            cursor = node.parent;
        }
    }

    /// Clear the dirty flag of every live node.
    pub fn settle(&mut self) {
        for node in self.nodes.iter_mut().filter(|n| n.live) {
            node.dirty = false;
        }
    }

    fn set_depth(&mut self, id: NodeId, depth: u32) {
        let mut stack = vec![(id, depth)];
        while let Some((next, d)) = stack.pop() {
            self[next].depth = d;
            stack.extend(self[next].children.iter().map(|c| (*c, d + 1)));
        }
    }

    /// Pre-order ids of the subtree below `id`, excluding `id`.
    #[must_use]
    pub fn descendants_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self[id].descendants as usize);
        let mut stack: Vec<NodeId> = self[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self[next].children.iter().rev().copied());
        }
        out
    }

    /// Pre-order tokens of the subtree rooted at `id`, `id` included.
    #[must_use]
    pub fn shape_of(&self, id: NodeId) -> Vec<NodeToken> {
        std::iter::once(self[id].token)
            .chain(self.descendants_of(id).into_iter().map(|d| self[d].token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(id: u32) -> NodeToken {
        NodeToken::Token(TokenId(id))
    }

    #[test]
    fn codes_round_trip() {
        for token in [NodeToken::Root, NodeToken::Wildcard, tok(0), tok(42)] {
            assert_eq!(NodeToken::from_code(token.code()), Ok(token));
        }
        assert!(NodeToken::from_code(-1).is_err());
        assert!(NodeToken::from_code(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn attach_maintains_shape_and_depth() {
        let mut arena = Arena::default();
        let root = arena.alloc(NodeToken::Root, 0.0, 1);
        let a = arena.alloc(tok(1), 1.0, 1);
        let b = arena.alloc(tok(2), 1.0, 1);
        let c = arena.alloc(tok(3), 1.0, 1);
        arena.attach(root, a);
        arena.attach(a, b);
        arena.attach(root, c);

        assert_eq!(arena[root].height, 2);
        assert_eq!(arena[root].descendants, 3);
        assert_eq!(arena[b].depth, 2);
        assert_eq!(arena[root].child(tok(3)), Some(c));
        assert_eq!(arena.shape_of(root), vec![NodeToken::Root, tok(1), tok(2), tok(3)]);

        arena.detach(a);
        assert_eq!(arena[root].height, 1);
        assert_eq!(arena[root].descendants, 1);
        arena.release(a);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn released_slots_are_reused() {
        let mut arena = Arena::default();
        let root = arena.alloc(NodeToken::Root, 0.0, 1);
        let a = arena.alloc(tok(1), 1.0, 1);
        arena.attach(root, a);
        arena.detach(a);
        arena.release(a);
        let b = arena.alloc(tok(2), 1.0, 1);
        assert_eq!(a, b);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn reattaching_updates_subtree_depths() {
        let mut arena = Arena::default();
        let root = arena.alloc(NodeToken::Root, 0.0, 1);
        let a = arena.alloc(tok(1), 1.0, 1);
        let b = arena.alloc(tok(2), 1.0, 1);
        let c = arena.alloc(tok(3), 1.0, 1);
        arena.attach(root, a);
        arena.attach(root, b);
        arena.attach(b, c);

        arena.detach(b);
        arena.attach(a, b);
        assert_eq!(arena[b].depth, 2);
        assert_eq!(arena[c].depth, 3);
        assert_eq!(arena[root].height, 3);
    }
}
