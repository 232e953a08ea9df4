//! Merkle aggregation of many timestamps under one tip
//!
//! Leaves are paired left to right. For each pair the left side receives
//! `append(right) + sha256` and the right side `prepend(left) + sha256`, so
//! both reach the same parent message. An unpaired leaf is carried to the end
//! of the next level.

use ots_types::{Error, Op, Result};

use crate::timestamp::Timestamp;

/// One node of a level under construction: its message and the leaves below.
struct LevelNode {
    msg: Vec<u8>,
    leaves: Vec<usize>,
}

/// Join `leaves` into a single tree and return a timestamp for its tip.
///
/// Every leaf gains the edges leading to the tip. The returned timestamp
/// is empty; proofs attached to it later must be grafted back into the
/// leaves with [`Timestamp::merge_at`].
pub fn make_merkle_tree(leaves: &mut [&mut Timestamp]) -> Result<Timestamp> {
    if leaves.is_empty() {
        return Err(Error::InvariantViolation(
            "merkle tree needs at least one timestamp".to_string(),
        ));
    }

    let mut paths: Vec<Vec<Op>> = vec![Vec::new(); leaves.len()];
    let mut level: Vec<LevelNode> = leaves
        .iter()
        .enumerate()
        .map(|(i, leaf)| LevelNode {
            msg: leaf.msg().to_vec(),
            leaves: vec![i],
        })
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut nodes = level.into_iter();
        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => next.push(join(left, right, &mut paths)?),
                None => next.push(left),
            }
        }
        level = next;
    }

    // Apply the accumulated edges only once every level succeeded.
    for (leaf, path) in leaves.iter_mut().zip(paths) {
        let mut node: &mut Timestamp = leaf;
        for op in path {
            node = node.add_op(op)?;
        }
    }

    let tip = level
        .pop()
        .ok_or_else(|| Error::InvariantViolation("merkle tree has no tip".to_string()))?;
    Ok(Timestamp::new(tip.msg))
}

fn join(left: LevelNode, right: LevelNode, paths: &mut [Vec<Op>]) -> Result<LevelNode> {
    let append = Op::append(right.msg.clone())?;
    let prepend = Op::prepend(left.msg.clone())?;
    for &i in &left.leaves {
        paths[i].push(append.clone());
        paths[i].push(Op::sha256());
    }
    for &i in &right.leaves {
        paths[i].push(prepend.clone());
        paths[i].push(Op::sha256());
    }

    let msg = Op::sha256().apply(&append.apply(&left.msg));
    let mut leaves = left.leaves;
    leaves.extend(right.leaves);
    Ok(LevelNode { msg, leaves })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_types::HashAlgorithm;

    fn leaves(n: u8) -> Vec<Timestamp> {
        (0..n).map(|i| Timestamp::new(vec![i; 32])).collect()
    }

    fn cat_sha256(left: &[u8], right: &[u8]) -> Vec<u8> {
        HashAlgorithm::Sha256.hash(&[left, right].concat())
    }

    #[test]
    fn test_empty_rejected() {
        let mut none: Vec<&mut Timestamp> = Vec::new();
        assert!(matches!(
            make_merkle_tree(&mut none),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_single_leaf_is_its_own_tip() {
        let mut stamps = leaves(1);
        let mut refs: Vec<&mut Timestamp> = stamps.iter_mut().collect();
        let tip = make_merkle_tree(&mut refs).unwrap();
        assert_eq!(tip.msg(), &[0u8; 32]);
        assert!(stamps[0].ops().is_empty());
    }

    #[test]
    fn test_two_leaves() {
        let mut stamps = leaves(2);
        let mut refs: Vec<&mut Timestamp> = stamps.iter_mut().collect();
        let tip = make_merkle_tree(&mut refs).unwrap();

        assert_eq!(tip.msg(), cat_sha256(&[0u8; 32], &[1u8; 32]).as_slice());
        assert!(stamps[0].ops().contains_key(&Op::Append(vec![1u8; 32])));
        assert!(stamps[1].ops().contains_key(&Op::Prepend(vec![0u8; 32])));
    }

    #[test]
    fn test_odd_leaf_carried_to_next_level() {
        let mut stamps = leaves(3);
        let mut refs: Vec<&mut Timestamp> = stamps.iter_mut().collect();
        let tip = make_merkle_tree(&mut refs).unwrap();

        let ab = cat_sha256(&[0u8; 32], &[1u8; 32]);
        let expected = cat_sha256(&ab, &[2u8; 32]);
        assert_eq!(tip.msg(), expected.as_slice());
        // The carried leaf is only one level deep
        assert_eq!(stamps[2].depth(), 2);
        assert_eq!(stamps[0].depth(), 4);
    }

    #[test]
    fn test_every_leaf_reaches_tip() {
        for n in 1..=17u8 {
            let mut stamps = leaves(n);
            let mut refs: Vec<&mut Timestamp> = stamps.iter_mut().collect();
            let tip = make_merkle_tree(&mut refs).unwrap();
            for (i, leaf) in stamps.iter().enumerate() {
                let tips = leaf.all_tips();
                assert_eq!(tips.len(), 1, "leaf {} of {}", i, n);
                assert!(tips.contains(tip.msg()), "leaf {} of {}", i, n);
            }
        }
    }

    #[test]
    fn test_duplicate_leaves_share_tip() {
        let mut stamps = vec![Timestamp::new(vec![5u8; 32]), Timestamp::new(vec![5u8; 32])];
        let mut refs: Vec<&mut Timestamp> = stamps.iter_mut().collect();
        let tip = make_merkle_tree(&mut refs).unwrap();
        assert!(stamps[0].all_tips().contains(tip.msg()));
        assert!(stamps[1].all_tips().contains(tip.msg()));
    }
}
