use std::collections::BTreeMap;
use std::sync::Arc;

use hamt_store::Storage;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::error::{TrieError, TrieResult};
use crate::hamt::{build_node, key_hash, write_block, RootNode};
use crate::node::Node;
use crate::params::TrieParams;
use crate::trie::Trie;

/// An in-progress structural build targeting one storage binding.
pub struct TrieBuilder {
    params: TrieParams,
    storage: Arc<dyn Storage>,
    entries: Vec<(String, Node)>,
}

impl TrieBuilder {
    /// Begin a structural build with the given shape.
    pub fn new(params: TrieParams, storage: Arc<dyn Storage>) -> TrieResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            storage,
            entries: Vec::new(),
        })
    }

    /// Start assembling map entries. `size_hint` pre-sizes the entry buffer.
    pub fn begin_map(&mut self, size_hint: usize) -> MapAssembler<'_> {
        self.entries.reserve(size_hint);
        MapAssembler {
            entries: &mut self.entries,
            pending_key: None,
        }
    }

    pub fn params(&self) -> TrieParams {
        self.params
    }

    /// Lay out, persist and return the finished trie.
    pub fn finalize(self) -> TrieResult<Trie> {
        finalize(self)
    }
}

impl std::fmt::Debug for TrieBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieBuilder")
            .field("params", &self.params)
            .field("backend", &self.storage.backend())
            .field("assigned", &self.entries.len())
            .finish()
    }
}

/// Key/value assembler for a map under construction.
///
/// Keys and values are assigned in alternation. Assigning a key that was
/// already assigned earlier in the same build overwrites the earlier value.
#[derive(Debug)]
pub struct MapAssembler<'b> {
    entries: &'b mut Vec<(String, Node)>,
    pending_key: Option<String>,
}

impl MapAssembler<'_> {
    pub fn assign_key(&mut self, key: impl Into<String>) -> TrieResult<()> {
        if self.pending_key.is_some() {
            return Err(TrieError::AssemblerState("key assigned twice without a value"));
        }
        self.pending_key = Some(key.into());
        Ok(())
    }

    pub fn assign_text(&mut self, value: impl Into<String>) -> TrieResult<()> {
        self.assign_node(Node::Text(value.into()))
    }

    pub fn assign_bytes(&mut self, value: impl Into<Vec<u8>>) -> TrieResult<()> {
        self.assign_node(Node::Bytes(value.into()))
    }

    pub fn assign_link(&mut self, address: ContentAddress) -> TrieResult<()> {
        self.assign_node(Node::Link(address))
    }

    /// Assign any value to the pending key.
    pub fn assign_node(&mut self, value: Node) -> TrieResult<()> {
        let key = self
            .pending_key
            .take()
            .ok_or(TrieError::AssemblerState("value assigned without a key"))?;
        self.entries.push((key, value));
        Ok(())
    }

    /// Assign a key and its value in one step.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> TrieResult<()> {
        self.assign_key(key)?;
        self.assign_node(value)
    }

    /// Close the map. Fails if a key is still waiting for its value.
    pub fn finish(self) -> TrieResult<()> {
        match self.pending_key {
            Some(_) => Err(TrieError::AssemblerState("map finished with a dangling key")),
            None => Ok(()),
        }
    }
}

/// Turn a finished build into an immutable, persisted trie.
///
/// Child blocks are written before their parents and the root last, so every
/// link in a persisted block already resolves when the root address is
/// returned.
pub fn finalize(builder: TrieBuilder) -> TrieResult<Trie> {
    let TrieBuilder {
        params,
        storage,
        entries,
    } = builder;

    // Last assignment wins.
    let merged: BTreeMap<String, Node> = entries.into_iter().collect();
    let count = merged.len();
    let staged = merged
        .into_iter()
        .map(|(key, value)| (key_hash(&key), key, value))
        .collect();

    let hamt = build_node(staged, 0, &params, storage.as_ref())?;
    let root = RootNode { params, hamt };
    let address = write_block(storage.as_ref(), &root)?;
    debug!(
        address = %address.short_hex(),
        entries = count,
        backend = storage.backend(),
        "trie finalized"
    );
    Ok(Trie::from_parts(address, root, storage))
}
