//! Node layout, hashing and block encoding.
//!
//! A node holds a bitmap of occupied slots and one pointer per set bit, in
//! slot order. A pointer is either an inline bucket of entries sorted by key
//! or a link to a child node one level deeper. Slot indices come from
//! consecutive `bit_width`-bit slices of the BLAKE3 hash of the key, most
//! significant bits first.

use std::collections::BTreeMap;
use std::io::Write;

use hamt_crypto::ContentHasher;
use hamt_store::{StoreError, Storage};
use hamt_types::ContentAddress;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{TrieError, TrieResult};
use crate::node::Node;
use crate::params::TrieParams;

const HASH_BITS: usize = 256;

pub(crate) type KeyHash = [u8; 32];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct BucketEntry {
    pub(crate) key: String,
    pub(crate) value: Node,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) enum Pointer {
    Bucket(Vec<BucketEntry>),
    Link(ContentAddress),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct HamtNode {
    pub(crate) bitmap: Vec<u8>,
    pub(crate) pointers: Vec<Pointer>,
}

/// The root block records the shape parameters so a reader needs nothing
/// but the address to navigate the trie.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct RootNode {
    pub(crate) params: TrieParams,
    pub(crate) hamt: HamtNode,
}

pub(crate) fn key_hash(key: &str) -> KeyHash {
    *blake3::hash(key.as_bytes()).as_bytes()
}

/// Slot index of `hash` at `depth`, or `None` once the hash is exhausted.
pub(crate) fn slot_index(hash: &KeyHash, depth: usize, bit_width: u8) -> Option<usize> {
    let width = usize::from(bit_width);
    let start = depth * width;
    if start + width > HASH_BITS {
        return None;
    }
    let mut index = 0usize;
    for bit in start..start + width {
        let byte = hash[bit / 8];
        let set = (byte >> (7 - bit % 8)) & 1;
        index = (index << 1) | usize::from(set);
    }
    Some(index)
}

impl HamtNode {
    pub(crate) fn empty(params: &TrieParams) -> Self {
        Self {
            bitmap: vec![0; params.fanout().div_ceil(8)],
            pointers: Vec::new(),
        }
    }

    pub(crate) fn has_slot(&self, index: usize) -> bool {
        self.bitmap
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    fn set_slot(&mut self, index: usize) {
        self.bitmap[index / 8] |= 1 << (index % 8);
    }

    /// Position in `pointers` of the pointer for an occupied slot.
    pub(crate) fn pointer_position(&self, index: usize) -> usize {
        let full_bytes = index / 8;
        let mut count: usize = self.bitmap[..full_bytes]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum();
        let mask = (1u8 << (index % 8)) - 1;
        count += (self.bitmap[full_bytes] & mask).count_ones() as usize;
        count
    }
}

/// Entry staged for layout: `(hash, key, value)`.
pub(crate) type Staged = (KeyHash, String, Node);

/// Lay out `entries` into a node at `depth`, persisting any overflowing slot
/// as a child block first.
pub(crate) fn build_node(
    entries: Vec<Staged>,
    depth: usize,
    params: &TrieParams,
    storage: &dyn Storage,
) -> TrieResult<HamtNode> {
    let mut slots: BTreeMap<usize, Vec<Staged>> = BTreeMap::new();
    for entry in entries {
        // Depth is bounded by the caller, so the slot always exists here.
        let index = slot_index(&entry.0, depth, params.bit_width).unwrap_or(0);
        slots.entry(index).or_default().push(entry);
    }

    let can_descend = slot_index(&[0; 32], depth + 1, params.bit_width).is_some();
    let mut node = HamtNode::empty(params);
    for (index, mut group) in slots {
        node.set_slot(index);
        if group.len() > params.bucket_size && can_descend {
            let child = build_node(group, depth + 1, params, storage)?;
            let address = write_block(storage, &child)?;
            node.pointers.push(Pointer::Link(address));
        } else {
            group.sort_by(|a, b| a.1.cmp(&b.1));
            let bucket = group
                .into_iter()
                .map(|(_, key, value)| BucketEntry { key, value })
                .collect();
            node.pointers.push(Pointer::Bucket(bucket));
        }
    }
    Ok(node)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> TrieResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| TrieError::Serialization(e.to_string()))
}

/// Serialize and persist a block, returning its content address.
pub(crate) fn write_block<T: Serialize>(storage: &dyn Storage, value: &T) -> TrieResult<ContentAddress> {
    let data = encode(value)?;
    let address = ContentHasher::NODE.hash(&data);
    let mut sink = storage.begin_write()?;
    sink.write_all(&data).map_err(StoreError::from)?;
    sink.commit(&address)?;
    Ok(address)
}

/// Read, verify and decode a block.
pub(crate) fn read_block<T: DeserializeOwned>(
    storage: &dyn Storage,
    address: &ContentAddress,
) -> TrieResult<T> {
    let data = storage.read(address)?;
    if !ContentHasher::NODE.verify(&data, address) {
        return Err(TrieError::HashMismatch { address: *address });
    }
    bincode::deserialize(&data).map_err(|e| TrieError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_reads_msb_first() {
        let mut hash = [0u8; 32];
        hash[0] = 0b1010_0000;
        assert_eq!(slot_index(&hash, 0, 3), Some(0b101));
        assert_eq!(slot_index(&hash, 1, 3), Some(0));
        assert_eq!(slot_index(&hash, 0, 8), Some(0b1010_0000));
    }

    #[test]
    fn slot_index_spans_byte_boundaries() {
        let mut hash = [0u8; 32];
        hash[0] = 0b0000_0001;
        hash[1] = 0b1000_0000;
        // bits 6..9 with width 3 at depth 2
        assert_eq!(slot_index(&hash, 2, 3), Some(0b011));
    }

    #[test]
    fn slot_index_exhausts() {
        let hash = [0xff; 32];
        assert_eq!(slot_index(&hash, 84, 3), Some(7));
        assert_eq!(slot_index(&hash, 85, 3), None);
        assert_eq!(slot_index(&hash, 31, 8), Some(255));
        assert_eq!(slot_index(&hash, 32, 8), None);
    }

    #[test]
    fn pointer_position_counts_lower_bits() {
        let params = TrieParams::new(4, 1).unwrap();
        let mut node = HamtNode::empty(&params);
        for i in [1, 3, 9, 15] {
            node.set_slot(i);
        }
        assert!(node.has_slot(9));
        assert!(!node.has_slot(2));
        assert_eq!(node.pointer_position(1), 0);
        assert_eq!(node.pointer_position(3), 1);
        assert_eq!(node.pointer_position(9), 2);
        assert_eq!(node.pointer_position(15), 3);
    }
}
