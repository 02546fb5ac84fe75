//! Affinity of a token sequence against a zip-chain tree.
//!
//! The walk carries, per chain, the set of item positions where the chain
//! can still continue. A child token present in the item seeds that set with
//! its positions, or removes `{p + depth}` from a set already seeded; a
//! missing token leaves it empty (no match); a wildcard passes the parent's
//! state through and always matches.
//!
//! Node weight is `token weight * depth * encounters / item count`. Chains
//! that match up to a leaf are boosted by `ln(depth + 1)`. Children whose
//! `encounters + depth` stay below `floor(item count * min_affinity²)` are
//! left out of both totals.
//!
//! The tree walk records which concrete tokens matched. A second scan over
//! the item's own tokens adds 1 per matched token and `streak^1.25` per
//! unmatched one, where the streak counts consecutive misses:
//!
//! ```text
//! affinity = (tree matched + seq matched) / (tree total + seq matched + seq unmatched)
//! ```

use std::collections::HashSet;

use super::ZipChainIndex;
use super::node::{Arena, NodeId, NodeToken};
use crate::token::{TokenId, TokenSequence};

const MISS_STREAK_EXPONENT: f32 = 1.25;

struct Walk<'a> {
    arena: &'a Arena,
    tokens: &'a TokenSequence,
    item_count: f32,
    threshold: u32,
    found: HashSet<TokenId>,
}

impl Walk<'_> {
    /// Returns `(matched weight, total weight)` of the subtree at `id`.
    fn visit(&mut self, id: NodeId, depth: u32, potential: Option<&HashSet<usize>>) -> (f32, f32) {
        let arena = self.arena;
        let node = &arena[id];
        let matches = potential.is_none_or(|p| !p.is_empty());
        if let (true, Some(token)) = (matches, node.token.token_id()) {
            self.found.insert(token);
        }

        let bonus = (depth as f32 + 1.0).ln();
        let weight = node.weight * depth as f32 * node.encounters as f32 / self.item_count;

        if node.is_leaf() {
            return if matches {
                (weight * bonus, weight * bonus)
            } else {
                (0.0, weight)
            };
        }

        let mut matched = 0.0;
        let mut total = 0.0;
        for child_id in &node.children {
            let child = &arena[*child_id];
            let next = self.next_potential(child.token, depth, potential);
            let (child_matched, child_total) = self.visit(*child_id, depth + 1, next.as_ref());

            if child.encounters + child.depth >= self.threshold {
                if child.token.is_wildcard() || next.as_ref().is_some_and(|p| !p.is_empty()) {
                    matched += child_matched;
                }
                total += child_total;
            }
        }

        if matched > 0.0 {
            (matched + weight, total + weight)
        } else if node.encounters + depth >= self.threshold {
            (weight * bonus, total + weight * bonus)
        } else {
            (0.0, 0.0)
        }
    }

    fn next_potential(
        &self,
        token: NodeToken,
        depth: u32,
        potential: Option<&HashSet<usize>>,
    ) -> Option<HashSet<usize>> {
        let id = match token {
            NodeToken::Wildcard => return None,
            NodeToken::Root => return Some(HashSet::new()),
            NodeToken::Token(id) => id,
        };
        let Some(places) = self.tokens.positions(id) else {
            return Some(HashSet::new());
        };
        Some(match potential {
            Some(p) if !p.is_empty() => {
                let shifted: HashSet<usize> = places.iter().map(|x| x + depth as usize).collect();
                p.difference(&shifted).copied().collect()
            }
            _ => places.iter().copied().collect(),
        })
    }
}

impl ZipChainIndex {
    /// Affinity in `[0, 1]` of `tokens` to a cluster of `item_count` items.
    #[must_use]
    pub fn score(&self, tokens: &TokenSequence, item_count: usize, min_affinity: f32) -> f32 {
        let item_count = item_count.max(1) as f32;
        let threshold = (item_count * min_affinity * min_affinity).floor() as u32;

        let mut walk = Walk {
            arena: &self.arena,
            tokens,
            item_count,
            threshold,
            found: HashSet::new(),
        };
        let (tree_matched, tree_total) = self
            .root
            .map_or((0.0, 0.0), |root| walk.visit(root, 0, None));

        let mut seq_matched = 0.0;
        let mut seq_unmatched = 0.0;
        let mut streak = 1u32;
        for token in tokens.tokens() {
            if walk.found.contains(&token.id) {
                streak = 1;
                seq_matched += 1.0;
            } else {
                seq_unmatched += (streak as f32).powf(MISS_STREAK_EXPONENT);
                streak += 1;
            }
        }

        let denominator = tree_total + seq_matched + seq_unmatched;
        if denominator <= 0.0 {
            return 0.0;
        }
        (tree_matched + seq_matched) / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zipchain::tests::toks;

    fn sequence(ids: &[u32]) -> TokenSequence {
        TokenSequence::new(toks(ids))
    }

    fn trained(items: &[&[u32]]) -> ZipChainIndex {
        let mut index = ZipChainIndex::new();
        for ids in items {
            index.append(&toks(ids));
            index.compact();
        }
        index
    }

    #[test]
    fn empty_tree_and_empty_item_score_zero() {
        let index = ZipChainIndex::new();
        assert!(index.score(&sequence(&[]), 1, 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn known_item_scores_one_against_single_item_tree() {
        let index = trained(&[&[1, 2, 3]]);
        // every node is a matched leaf, every token is found
        let score = index.score(&sequence(&[1, 2, 3]), 1, 0.75);
        assert!((score - 1.0).abs() < 1e-6, "{score}");
    }

    #[test]
    fn foreign_item_scores_zero() {
        let index = trained(&[&[1, 2, 3]]);
        let score = index.score(&sequence(&[7, 8, 9]), 1, 0.75);
        assert!(score.abs() < f32::EPSILON, "{score}");
    }

    #[test]
    fn partial_overlap_scores_in_between() {
        let index = trained(&[&[1, 2, 3, 4], &[1, 2, 3, 4]]);
        let full = index.score(&sequence(&[1, 2, 3, 4]), 2, 0.75);
        let half = index.score(&sequence(&[1, 2, 8, 9]), 2, 0.75);
        let none = index.score(&sequence(&[5, 6, 8, 9]), 2, 0.75);
        assert!(full > half, "{full} vs {half}");
        assert!(half > none, "{half} vs {none}");
        assert!((0.0..=1.0).contains(&full));
    }

    #[test]
    fn consecutive_misses_cost_more_than_scattered_ones() {
        let index = trained(&[&[1, 2, 3, 4, 5, 6]]);
        let clustered = index.score(&sequence(&[1, 2, 3, 7, 8, 9]), 1, 0.75);
        let scattered = index.score(&sequence(&[1, 7, 2, 8, 3, 9]), 1, 0.75);
        assert!(scattered > clustered, "{scattered} vs {clustered}");
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let index = trained(&[&[1, 2, 3], &[1, 2, 4], &[1, 3, 5, 6], &[2, 3, 4, 5]]);
        for ids in [&[1, 2, 3][..], &[4, 5, 6], &[1], &[9, 9, 9], &[3, 2, 1, 3, 2, 1]] {
            let score = index.score(&sequence(ids), 4, 0.75);
            assert!((0.0..=1.0001).contains(&score), "{ids:?}: {score}");
        }
    }
}
