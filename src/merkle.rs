//! Deterministic Merkle tree over a bundle's asset entries (§3, §4.F).
//!
//! Leaves are sorted by `(relative_path, locale)` ASCII order before
//! hashing, so the tree — and its root — is independent of the order
//! assets were discovered or written in (§8 invariant 3). Odd-count levels
//! promote their last element unchanged rather than duplicating it.

use serde::{Deserialize, Serialize};

use crate::hash::{hash_asset_record, hash_interior, hex_lower, Digest32};

/// One leaf's identifying key, used only to build and sort the tree —
/// the tree itself stores only digests.
#[derive(Debug, Clone)]
pub struct MerkleLeafInput<'a> {
    pub relative_path: &'a str,
    pub locale: &'a str,
    pub content_hash: &'a str,
}

/// The full tree, levels stored leaves-first so patch verification can
/// re-derive the root without rebuilding from raw asset bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleTree {
    /// `levels[0]` is the leaf level; `levels.last()` is `[root]`.
    pub levels: Vec<Vec<String>>,
}

impl MerkleTree {
    pub fn root(&self) -> &str {
        self.levels
            .last()
            .and_then(|lvl| lvl.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn root_bytes(&self) -> Option<Digest32> {
        let root_hex = self.root();
        if root_hex.is_empty() {
            return None;
        }
        let bytes = crate::hash::parse_hex(root_hex)?;
        bytes.try_into().ok()
    }
}

/// Builds the tree from a set of leaf inputs. The caller does not need to
/// pre-sort — sorting happens internally, which is what makes the root
/// order-independent (§8 invariant 3).
pub fn build_tree(mut leaves: Vec<MerkleLeafInput>) -> MerkleTree {
    leaves.sort_by(|a, b| {
        (a.relative_path, a.locale).cmp(&(b.relative_path, b.locale))
    });

    if leaves.is_empty() {
        // An empty asset set has no well-defined root; the Manifest Builder
        // rejects empty bundles before this is ever reached (S1), so this
        // branch exists only so the function is total.
        return MerkleTree { levels: vec![vec![]] };
    }

    let leaf_digests: Vec<Digest32> = leaves
        .iter()
        .map(|l| hash_asset_record(l.relative_path, l.locale, l.content_hash))
        .collect();

    let mut levels: Vec<Vec<Digest32>> = vec![leaf_digests];

    while levels.last().unwrap().len() > 1 {
        let prev = levels.last().unwrap();
        let mut next = Vec::with_capacity((prev.len() + 1) / 2);
        let mut i = 0;
        while i < prev.len() {
            if i + 1 < prev.len() {
                next.push(hash_interior(&prev[i], &prev[i + 1]));
            } else {
                // Odd count: promote the last element unchanged, don't duplicate it.
                next.push(prev[i]);
            }
            i += 2;
        }
        levels.push(next);
    }

    MerkleTree {
        levels: levels
            .into_iter()
            .map(|lvl| lvl.iter().map(|d| hex_lower(d)).collect())
            .collect(),
    }
}
