//! Compact persisted form of the zip-chain tree.
//!
//! ```json
//! {"t":-99,"w":0.0,"e":12,"c":[{"t":4,"e":3,"c":[{"t":-7,"w":1.5}]}]}
//! ```
//!
//! `w` is omitted for the default weight, `e` for a single encounter and
//! `c` for leaves.

use serde::{Deserialize, Serialize};

use super::ZipChainIndex;
use super::node::{NodeId, NodeToken};
use crate::error::ClusterError;
use crate::token::DEFAULT_WEIGHT;
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(rename = "t")]
    pub token: i64,

    #[serde(rename = "w", default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: f32,

    #[serde(rename = "e", default = "default_encounters", skip_serializing_if = "is_single")]
    pub encounters: u32,

    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

const fn default_weight() -> f32 {
    DEFAULT_WEIGHT
}

const fn default_encounters() -> u32 {
    1
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_default_weight(weight: &f32) -> bool {
    (weight - DEFAULT_WEIGHT).abs() <= 0.0001
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_single(encounters: &u32) -> bool {
    *encounters == 1
}

impl ZipChainIndex {
    /// Persisted form of the tree, `None` before the first append.
    #[must_use]
    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        self.root.map(|root| self.snapshot_node(root))
    }

    fn snapshot_node(&self, id: NodeId) -> NodeSnapshot {
        let node = &self.arena[id];
        NodeSnapshot {
            token: node.token.code(),
            weight: node.weight,
            encounters: node.encounters,
            children: node.children.iter().map(|c| self.snapshot_node(*c)).collect(),
        }
    }

    /// Rebuild a tree, checking every token id against `vocabulary`.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::TokenNotFound`] for a token id the vocabulary lacks.
    /// - [`ClusterError::Persistence`] when the top node is not a root, a
    ///   root appears deeper in the tree, or a token code is invalid.
    /// - [`ClusterError::InconsistentState`] when two siblings share a token.
    pub fn restore(snapshot: &NodeSnapshot, vocabulary: &Vocabulary) -> Result<Self, ClusterError> {
        if NodeToken::from_code(snapshot.token)? != NodeToken::Root {
            return Err(ClusterError::Persistence(format!(
                "zip chain must start at a root node, found token code {}",
                snapshot.token
            )));
        }

        let mut index = Self::new();
        let root = index
            .arena
            .alloc(NodeToken::Root, snapshot.weight, snapshot.encounters);
        index.root = Some(root);

        let mut pending: Vec<(NodeId, &NodeSnapshot)> = vec![(root, snapshot)];
        while let Some((parent, node)) = pending.pop() {
            for child in &node.children {
                let token = NodeToken::from_code(child.token)?;
                match token {
                    NodeToken::Root => {
                        return Err(ClusterError::Persistence(
                            "root token below the top of a zip chain".to_string(),
                        ));
                    }
                    NodeToken::Token(id) => {
                        vocabulary.resolve(id)?;
                    }
                    NodeToken::Wildcard => {}
                }
                if index.arena[parent].child(token).is_some() {
                    return Err(ClusterError::InconsistentState(format!(
                        "zip chain node has two children with token code {}",
                        child.token
                    )));
                }
                let id = index.arena.alloc(token, child.weight, child.encounters);
                index.arena.attach(parent, id);
                pending.push((id, child));
            }
        }
        // saved trees are compacted; only later appends reopen nodes
        index.arena.settle();
        Ok(index)
    }
}
