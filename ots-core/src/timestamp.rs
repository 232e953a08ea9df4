//! The timestamp proof DAG
//!
//! A [`Timestamp`] holds a message and the ways it is committed onward:
//! operation edges leading to child timestamps, and attestations that
//! terminate the proof at this node. Children are owned by exactly one edge,
//! so the structure is a tree by construction.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ots_types::ops::MAX_MSG_LENGTH;
use ots_types::{Attestation, ByteReader, ByteWriter, Error, FormatError, Op, Result};

/// Maximum nesting depth accepted when reading or writing a proof.
pub const RECURSION_LIMIT: usize = 256;

const FORK_MARKER: u8 = 0xff;
const ATTESTATION_MARKER: u8 = 0x00;

#[derive(Clone, PartialEq, Eq)]
pub struct Timestamp {
    msg: Vec<u8>,
    attestations: BTreeSet<Attestation>,
    ops: BTreeMap<Op, Timestamp>,
}

/// A pending attestation that still needs its calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingTarget {
    /// Message of the node carrying the attestation
    pub commitment: Vec<u8>,
    pub calendar_url: String,
}

impl Timestamp {
    pub fn new(msg: impl Into<Vec<u8>>) -> Self {
        Self {
            msg: msg.into(),
            attestations: BTreeSet::new(),
            ops: BTreeMap::new(),
        }
    }

    pub fn msg(&self) -> &[u8] {
        &self.msg
    }

    /// Attestations directly on this node
    pub fn attestations(&self) -> &BTreeSet<Attestation> {
        &self.attestations
    }

    pub fn ops(&self) -> &BTreeMap<Op, Timestamp> {
        &self.ops
    }

    pub fn child_mut(&mut self, op: &Op) -> Option<&mut Timestamp> {
        self.ops.get_mut(op)
    }

    /// True for a node without edges or attestations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.attestations.is_empty()
    }

    pub fn add_attestation(&mut self, attestation: Attestation) -> bool {
        self.attestations.insert(attestation)
    }

    pub fn remove_attestation(&mut self, attestation: &Attestation) -> bool {
        self.attestations.remove(attestation)
    }

    /// Add the edge `op` and return its child.
    ///
    /// An existing identical edge is reused, so adding the same operation
    /// twice yields a single child.
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp> {
        op.validate()?;
        match self.ops.entry(op) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let child_msg = entry.key().apply(&self.msg);
                if child_msg.len() > MAX_MSG_LENGTH {
                    return Err(Error::InvariantViolation(format!(
                        "{} yields a {} byte message, limit is {}",
                        entry.key().name(),
                        child_msg.len(),
                        MAX_MSG_LENGTH
                    )));
                }
                Ok(entry.insert(Timestamp::new(child_msg)))
            }
        }
    }

    /// Merge another proof for the same message into this one.
    ///
    /// Returns true if any edge or attestation was added.
    pub fn merge(&mut self, other: Timestamp) -> Result<bool> {
        if self.msg != other.msg {
            return Err(Error::InvariantViolation(format!(
                "cannot merge timestamp for {} into timestamp for {}",
                hex::encode(&other.msg),
                hex::encode(&self.msg)
            )));
        }
        Ok(self.merge_unchecked(other))
    }

    // Child messages are a function of the parent message and the op, so
    // equal roots imply equal children.
    fn merge_unchecked(&mut self, other: Timestamp) -> bool {
        let mut changed = false;
        for attestation in other.attestations {
            changed |= self.attestations.insert(attestation);
        }
        for (op, child) in other.ops {
            match self.ops.entry(op) {
                Entry::Occupied(mut entry) => changed |= entry.get_mut().merge_unchecked(child),
                Entry::Vacant(entry) => {
                    entry.insert(child);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Merge a copy of `other` into every node whose message equals its root.
    ///
    /// Fails if no such node exists.
    pub fn merge_at(&mut self, other: &Timestamp) -> Result<bool> {
        let mut found = false;
        let changed = self.merge_at_inner(other, &mut found);
        if !found {
            return Err(Error::InvariantViolation(format!(
                "no node for message {} in timestamp",
                hex::encode(&other.msg)
            )));
        }
        Ok(changed)
    }

    fn merge_at_inner(&mut self, other: &Timestamp, found: &mut bool) -> bool {
        if self.msg == other.msg {
            *found = true;
            return self.merge_unchecked(other.clone());
        }
        let mut changed = false;
        for child in self.ops.values_mut() {
            changed |= child.merge_at_inner(other, found);
        }
        changed
    }

    /// Remove `attestation` from every node whose message is `msg`.
    pub fn remove_attestation_at(&mut self, msg: &[u8], attestation: &Attestation) -> bool {
        let mut changed = false;
        if self.msg == msg {
            changed |= self.attestations.remove(attestation);
        }
        for child in self.ops.values_mut() {
            changed |= child.remove_attestation_at(msg, attestation);
        }
        changed
    }

    /// Every attestation in the DAG with the message it attests.
    pub fn all_attestations(&self) -> Vec<(&[u8], &Attestation)> {
        let mut out = Vec::new();
        self.collect_attestations(&mut out);
        out
    }

    fn collect_attestations<'a>(&'a self, out: &mut Vec<(&'a [u8], &'a Attestation)>) {
        for attestation in &self.attestations {
            out.push((&self.msg, attestation));
        }
        for child in self.ops.values() {
            child.collect_attestations(out);
        }
    }

    /// Distinct attestations reachable from this node
    pub fn attestation_set(&self) -> BTreeSet<&Attestation> {
        self.all_attestations().into_iter().map(|(_, a)| a).collect()
    }

    /// Messages of all nodes without outgoing edges
    pub fn all_tips(&self) -> BTreeSet<Vec<u8>> {
        let mut tips = BTreeSet::new();
        self.collect_tips(&mut tips);
        tips
    }

    fn collect_tips(&self, tips: &mut BTreeSet<Vec<u8>>) {
        if self.ops.is_empty() {
            tips.insert(self.msg.clone());
        }
        for child in self.ops.values() {
            child.collect_tips(tips);
        }
    }

    /// True once a blockchain attestation is reachable.
    pub fn is_complete(&self) -> bool {
        self.attestations.iter().any(Attestation::is_blockchain)
            || self.ops.values().any(Timestamp::is_complete)
    }

    /// Pending attestations whose node has no blockchain attestation below it.
    pub fn pending_targets(&self) -> Vec<PendingTarget> {
        let mut targets = Vec::new();
        self.collect_pending(&mut targets);
        targets
    }

    fn collect_pending(&self, targets: &mut Vec<PendingTarget>) {
        let pending = self.attestations.iter().filter_map(|a| match a {
            Attestation::Pending { uri } => Some(uri),
            _ => None,
        });
        let mut pending = pending.peekable();
        if pending.peek().is_some() && !self.is_complete() {
            for uri in pending {
                targets.push(PendingTarget {
                    commitment: self.msg.clone(),
                    calendar_url: uri.clone(),
                });
            }
        }
        for child in self.ops.values() {
            child.collect_pending(targets);
        }
    }

    /// Length of the longest edge chain below this node
    pub fn depth(&self) -> usize {
        self.ops.values().map(|c| c.depth() + 1).max().unwrap_or(0)
    }

    pub fn serialize(&self, w: &mut ByteWriter) -> Result<()> {
        self.serialize_at(w, RECURSION_LIMIT)
    }

    fn serialize_at(&self, w: &mut ByteWriter, depth_left: usize) -> Result<()> {
        if depth_left == 0 {
            return Err(FormatError::RecursionLimit.into());
        }
        if self.is_empty() {
            return Err(FormatError::EmptyTimestamp.into());
        }

        let total = self.attestations.len() + self.ops.len();
        let mut written = 0;
        for attestation in &self.attestations {
            written += 1;
            if written < total {
                w.write_u8(FORK_MARKER);
            }
            w.write_u8(ATTESTATION_MARKER);
            attestation.serialize(w);
        }
        for (op, child) in &self.ops {
            written += 1;
            if written < total {
                w.write_u8(FORK_MARKER);
            }
            op.serialize(w);
            child.serialize_at(w, depth_left - 1)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new();
        self.serialize(&mut w)?;
        Ok(w.into_inner())
    }

    /// Read a timestamp whose root message is `msg`.
    pub fn deserialize(r: &mut ByteReader<'_>, msg: impl Into<Vec<u8>>) -> Result<Self> {
        Self::deserialize_at(r, msg.into(), RECURSION_LIMIT)
    }

    /// Read a complete buffer, rejecting trailing bytes.
    pub fn from_bytes(bytes: &[u8], msg: impl Into<Vec<u8>>) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let timestamp = Self::deserialize(&mut r, msg)?;
        r.assert_eof()?;
        Ok(timestamp)
    }

    fn deserialize_at(r: &mut ByteReader<'_>, msg: Vec<u8>, depth_left: usize) -> Result<Self> {
        if depth_left == 0 {
            return Err(FormatError::RecursionLimit.into());
        }
        if msg.len() > MAX_MSG_LENGTH {
            return Err(FormatError::MessageTooLong {
                len: msg.len(),
                max: MAX_MSG_LENGTH,
            }
            .into());
        }

        let mut timestamp = Timestamp::new(msg);
        let mut tag = r.read_u8()?;
        while tag == FORK_MARKER {
            let edge_tag = r.read_u8()?;
            timestamp.read_edge(r, edge_tag, depth_left)?;
            tag = r.read_u8()?;
        }
        timestamp.read_edge(r, tag, depth_left)?;
        Ok(timestamp)
    }

    fn read_edge(&mut self, r: &mut ByteReader<'_>, tag: u8, depth_left: usize) -> Result<()> {
        if tag == ATTESTATION_MARKER {
            self.attestations.insert(Attestation::deserialize(r)?);
        } else {
            let op = Op::deserialize_with_tag(r, tag)?;
            let child_msg = op.apply(&self.msg);
            let child = Self::deserialize_at(r, child_msg, depth_left - 1)?;
            self.ops.insert(op, child);
        }
        Ok(())
    }

    /// Prune the DAG down to the path of its preferred attestation.
    ///
    /// Blockchain attestations are preferred over pending ones, lower block
    /// heights over higher ones, then shorter paths. Edges leaving the chosen
    /// path are removed; attestations on nodes of the path are kept.
    ///
    /// Nothing is pruned unless a blockchain attestation is reachable: every
    /// pending calendar is still a way to complete the proof. A DAG with a
    /// single distinct attestation is also left untouched.
    pub fn shrink(&mut self) -> Result<Attestation> {
        let mut candidates = Vec::new();
        self.collect_candidates(&mut Vec::new(), &mut candidates);

        let distinct: BTreeSet<&Attestation> = candidates.iter().map(|c| &c.attestation).collect();
        let prune = distinct.len() > 1
            && candidates.iter().any(|c| c.attestation.is_blockchain());

        let best = candidates
            .into_iter()
            .min_by_key(|c| c.rank())
            .ok_or(FormatError::EmptyTimestamp)?;
        if prune {
            self.prune_to(&best.path);
        }
        Ok(best.attestation)
    }

    fn collect_candidates(&self, path: &mut Vec<Op>, out: &mut Vec<Candidate>) {
        for attestation in &self.attestations {
            out.push(Candidate {
                path: path.clone(),
                attestation: attestation.clone(),
            });
        }
        for (op, child) in &self.ops {
            path.push(op.clone());
            child.collect_candidates(path, out);
            path.pop();
        }
    }

    fn prune_to(&mut self, path: &[Op]) {
        match path.split_first() {
            Some((next, rest)) => {
                self.ops.retain(|op, _| op == next);
                if let Some(child) = self.ops.get_mut(next) {
                    child.prune_to(rest);
                }
            }
            None => self.ops.clear(),
        }
    }
}

struct Candidate {
    path: Vec<Op>,
    attestation: Attestation,
}

impl Candidate {
    // Lowest wins. Bitcoin's tag sorts before Litecoin's.
    fn rank(&self) -> (u8, u64, [u8; 8], usize, Attestation) {
        let (kind, height) = match &self.attestation {
            Attestation::Blockchain { height, .. } => (0, *height),
            Attestation::Pending { .. } => (1, 0),
            Attestation::Unknown(_) => (2, 0),
        };
        (
            kind,
            height,
            self.attestation.tag(),
            self.path.len(),
            self.attestation.clone(),
        )
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timestamp")
            .field("msg", &hex::encode(&self.msg))
            .field("attestations", &self.attestations)
            .field("ops", &self.ops)
            .finish()
    }
}
