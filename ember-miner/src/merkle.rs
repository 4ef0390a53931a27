//! Transaction merkle tree construction.
//!
//! The tree is stored as a linear array, which uses about half the memory of
//! a pointer-based tree. For leaves `[h1 h2 h3 h4]` the array is
//! `[h1 h2 h3 h4 h12 h34 root]`; the root is always the last element. When
//! the leaf count is not a power of two, missing leaves are `None`: a parent
//! with no left child is `None`, and a parent with only a left child hashes
//! the left child concatenated with itself.
//!
//! Pure functions over their inputs; safe to call concurrently.

use crate::types::Hash32;

/// Transaction hashes as they appear in a block body.
///
/// `id` is the transaction's identity hash; `witness` is the full hash
/// including witness data. Which one becomes the leaf depends on the tree
/// being built.
#[derive(Debug, Clone, Copy)]
pub struct TxHashes {
    pub id: Hash32,
    pub witness: Hash32,
}

/// Parent node: double SHA-256 of the left and right child bytes, in order.
fn hash_merkle_branches(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Hash32::double_sha256(&buf)
}

fn next_power_of_two(n: usize) -> usize {
    if n.is_power_of_two() {
        n
    } else {
        n.next_power_of_two()
    }
}

/// Build the full merkle tree as a linear array.
///
/// In witness mode the first leaf is forced to the zero hash and the
/// remaining leaves use the witness-inclusive hash; otherwise every leaf is
/// the transaction id. An empty transaction list yields a single zero root.
pub fn build_merkle_tree(transactions: &[TxHashes], witness: bool) -> Vec<Option<Hash32>> {
    if transactions.is_empty() {
        return vec![Some(Hash32::ZERO)];
    }

    let next_pot = next_power_of_two(transactions.len());
    let array_size = next_pot * 2 - 1;
    let mut merkles: Vec<Option<Hash32>> = vec![None; array_size];

    for (i, tx) in transactions.iter().enumerate() {
        merkles[i] = match (witness, i) {
            (true, 0) => Some(Hash32::ZERO),
            (true, _) => Some(tx.witness),
            (false, _) => Some(tx.id),
        };
    }

    // Parents start right after the padded leaf row.
    let mut offset = next_pot;
    for i in (0..array_size - 1).step_by(2) {
        merkles[offset] = match (&merkles[i], &merkles[i + 1]) {
            (None, _) => None,
            (Some(left), None) => Some(hash_merkle_branches(left, left)),
            (Some(left), Some(right)) => Some(hash_merkle_branches(left, right)),
        };
        offset += 1;
    }

    merkles
}

/// Convenience variant returning only the root.
pub fn merkle_root(transactions: &[TxHashes], witness: bool) -> Hash32 {
    let tree = build_merkle_tree(transactions, witness);
    // The builder always fills the final element.
    tree.last()
        .copied()
        .flatten()
        .unwrap_or(Hash32::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(seed: u8) -> TxHashes {
        TxHashes {
            id: Hash32::double_sha256(&[seed]),
            witness: Hash32::double_sha256(&[seed, 0xff]),
        }
    }

    #[test]
    fn test_empty_list_yields_zero_root() {
        assert_eq!(merkle_root(&[], false), Hash32::ZERO);
        let tree = build_merkle_tree(&[], false);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let t = tx(1);
        assert_eq!(merkle_root(&[t], false), t.id);
    }

    #[test]
    fn test_root_is_deterministic() {
        let txs = [tx(1), tx(2), tx(3), tx(4), tx(5)];
        assert_eq!(merkle_root(&txs, false), merkle_root(&txs, false));
        assert_eq!(merkle_root(&txs, true), merkle_root(&txs, true));
    }

    #[test]
    fn test_two_leaves() {
        let (a, b) = (tx(1), tx(2));
        let expected = hash_merkle_branches(&a.id, &b.id);
        assert_eq!(merkle_root(&[a, b], false), expected);
    }

    #[test]
    fn test_three_leaves_duplicate_left_rule() {
        let (a, b, c) = (tx(1), tx(2), tx(3));
        // [a b c _] -> [H(a,b) H(c,c)] -> H(H(a,b), H(c,c))
        let h_ab = hash_merkle_branches(&a.id, &b.id);
        let h_cc = hash_merkle_branches(&c.id, &c.id);
        let expected = hash_merkle_branches(&h_ab, &h_cc);
        assert_eq!(merkle_root(&[a, b, c], false), expected);
    }

    #[test]
    fn test_tree_layout_power_of_two() {
        let txs = [tx(1), tx(2), tx(3), tx(4)];
        let tree = build_merkle_tree(&txs, false);
        // [h1 h2 h3 h4 h12 h34 root]
        assert_eq!(tree.len(), 7);
        assert!(tree.iter().all(Option::is_some));
        assert_eq!(tree[6], Some(merkle_root(&txs, false)));
    }

    #[test]
    fn test_absent_leaves_produce_absent_parents() {
        // Five leaves pad to eight; the padded right half of the leaf row
        // must produce a None parent, not a hashed one.
        let txs = [tx(1), tx(2), tx(3), tx(4), tx(5)];
        let tree = build_merkle_tree(&txs, false);
        assert_eq!(tree.len(), 15);
        assert!(tree[5].is_none() && tree[6].is_none() && tree[7].is_none());
        assert!(tree[11].is_none());
        assert!(tree[14].is_some());
    }

    #[test]
    fn test_witness_mode_forces_zero_first_leaf() {
        let txs = [tx(1), tx(2)];
        let tree = build_merkle_tree(&txs, true);
        assert_eq!(tree[0], Some(Hash32::ZERO));
        assert_eq!(tree[1], Some(txs[1].witness));
        assert_ne!(merkle_root(&txs, true), merkle_root(&txs, false));
    }
}
