use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hamt_store::Storage;
use hamt_trie::{Node, Trie, TrieBuilder, TrieParams};
use hamt_types::ContentAddress;
use tracing::{debug, warn};

use crate::error::{ContainerError, ContainerResult};
use crate::key::{denormalize_key, display_key, normalize_key, RESERVED_KEY};
use crate::value::{decode, Staged, Value, ValueKind};

/// A write applied to the build of one commit only.
///
/// Extra writes run once, in order, before the build starts and with no
/// lock held, so they may read the container they are committing. Their
/// entries land after the merged entries and win over anything staged or
/// inherited under the same key.
pub type ExtraWrite<'a> = Box<dyn FnOnce(&mut EntryWriter<'_>) -> ContainerResult<()> + 'a>;

/// Handle given to an [`ExtraWrite`].
pub struct EntryWriter<'m> {
    entries: &'m mut Vec<(String, Node)>,
    owner: &'m Container,
}

impl EntryWriter<'_> {
    /// Write `value` under `key` into the build. A later write to the same
    /// key in the same commit overwrites this one.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl Into<Staged>) -> ContainerResult<()> {
        let staged = value.into();
        self.owner.check_stageable(&staged)?;
        let node = encode(&staged)?;
        self.entries.push((normalize_key(key.as_ref()), node));
        Ok(())
    }
}

impl fmt::Debug for EntryWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryWriter").finish_non_exhaustive()
    }
}

struct State {
    identity: Vec<u8>,
    params: TrieParams,
    pending: BTreeMap<String, Pending>,
    /// Sequence number handed to the next staged write.
    next_seq: u64,
    committed: Option<Trie>,
    /// Bumped each time a snapshot is installed.
    generation: u64,
}

struct Pending {
    seq: u64,
    staged: Staged,
}

/// What one commit attempt builds from, copied out of the lock.
struct Basis {
    identity: Vec<u8>,
    params: TrieParams,
    pending: Vec<(String, Staged)>,
    committed: Option<Trie>,
    generation: u64,
    /// Every pending write with a lower sequence number is in `pending`.
    watermark: u64,
}

/// A persistent, content-addressed key-value container.
///
/// Writes are staged in memory and folded into a new immutable snapshot on
/// [`commit`](Self::commit). Reads go against the last committed or loaded
/// snapshot. All methods take `&self`; the mutable state sits behind one
/// reader/writer lock, so a container can be shared across threads in an
/// `Arc`. The lock is never held while a commit builds or while another
/// container is consulted.
pub struct Container {
    storage: Arc<dyn Storage>,
    auto_commit: bool,
    state: RwLock<State>,
}

impl Container {
    pub(crate) fn new(
        identity: Vec<u8>,
        storage: Arc<dyn Storage>,
        params: TrieParams,
        auto_commit: bool,
    ) -> Self {
        Self {
            storage,
            auto_commit,
            state: RwLock::new(State {
                identity,
                params,
                pending: BTreeMap::new(),
                next_seq: 0,
                committed: None,
                generation: 0,
            }),
        }
    }

    fn read_state(&self) -> ContainerResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| ContainerError::LockPoisoned(e.to_string()))
    }

    fn write_state(&self) -> ContainerResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| ContainerError::LockPoisoned(e.to_string()))
    }

    /// The name this container records in every snapshot.
    pub fn identity(&self) -> Vec<u8> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity
            .clone()
    }

    /// The storage binding snapshots are persisted through.
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Trie shape used for the next commit.
    pub fn params(&self) -> TrieParams {
        self.state.read().unwrap_or_else(PoisonError::into_inner).params
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Whether writes are staged but not yet committed.
    pub fn has_pending(&self) -> bool {
        !self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .committed
            .is_some()
    }

    /// Address of the current snapshot.
    pub fn content_address(&self) -> ContainerResult<ContentAddress> {
        self.commit_if_stale()?;
        self.committed_address()
    }

    fn committed_address(&self) -> ContainerResult<ContentAddress> {
        let state = self.read_state()?;
        match &state.committed {
            Some(trie) => Ok(trie.address()),
            None => Err(not_committed(&state.identity)),
        }
    }

    /// Replace the current snapshot with the one stored at `address`.
    ///
    /// The identity and trie shape are taken from the snapshot. Pending
    /// writes are kept and will be merged on top of it at the next commit.
    pub fn load(&self, address: &ContentAddress) -> ContainerResult<()> {
        let trie = Trie::load(Arc::clone(&self.storage), address)?;
        let identity = match trie.lookup(RESERVED_KEY)? {
            Some(Node::Bytes(b)) => b,
            Some(Node::Text(s)) => s.into_bytes(),
            _ => return Err(ContainerError::MissingIdentity { address: *address }),
        };

        let mut state = self.write_state()?;
        debug!(
            address = %address.short_hex(),
            identity = %display_key(&identity),
            backend = self.storage.backend(),
            "container loaded"
        );
        state.identity = identity;
        state.params = trie.params();
        state.committed = Some(trie);
        state.generation += 1;
        Ok(())
    }

    /// Record `value` under `key` for the next commit. Never touches storage.
    pub fn stage(&self, key: impl AsRef<[u8]>, value: impl Into<Staged>) -> ContainerResult<()> {
        let staged = value.into();
        self.check_stageable(&staged)?;
        let mut state = self.write_state()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .pending
            .insert(normalize_key(key.as_ref()), Pending { seq, staged });
        Ok(())
    }

    fn check_stageable(&self, staged: &Staged) -> ContainerResult<()> {
        staged.check_encodable()?;
        if let Staged::Nested(child) = staged {
            if std::ptr::eq(Arc::as_ptr(child), self) {
                return Err(ContainerError::UnsupportedValueKind(
                    "container nested in itself".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Merge pending writes into a new snapshot and persist it.
    pub fn commit(&self) -> ContainerResult<ContentAddress> {
        self.commit_with(Vec::new())
    }

    /// Like [`commit`](Self::commit), applying `extra` to the build after the
    /// merged entries.
    ///
    /// On failure nothing is installed: the previous snapshot stays current
    /// and the pending writes are kept for a retry. Writes staged while the
    /// build runs stay pending for the next commit.
    pub fn commit_with(&self, extra: Vec<ExtraWrite<'_>>) -> ContainerResult<ContentAddress> {
        let result = self.try_commit(extra);
        if let Err(e) = &result {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            warn!(
                identity = %display_key(&state.identity),
                pending = state.pending.len(),
                error = %e,
                "commit aborted, pending writes retained"
            );
        }
        result
    }

    fn try_commit(&self, extra: Vec<ExtraWrite<'_>>) -> ContainerResult<ContentAddress> {
        let mut extras = Vec::new();
        let mut writer = EntryWriter {
            entries: &mut extras,
            owner: self,
        };
        for write in extra {
            write(&mut writer)?;
        }

        loop {
            let basis = self.basis()?;
            let trie = self.rebuild(&basis, &extras)?;

            let mut state = self.write_state()?;
            if state.generation != basis.generation {
                // Another commit or load got in first; build again on top of it.
                debug!(
                    identity = %display_key(&basis.identity),
                    "snapshot moved during commit, rebuilding"
                );
                continue;
            }
            let address = trie.address();
            debug!(
                address = %address.short_hex(),
                identity = %display_key(&basis.identity),
                pending = basis.pending.len(),
                extra = extras.len(),
                backend = self.storage.backend(),
                "container committed"
            );
            state.pending.retain(|_, p| p.seq >= basis.watermark);
            state.committed = Some(trie);
            state.generation += 1;
            return Ok(address);
        }
    }

    fn basis(&self) -> ContainerResult<Basis> {
        let state = self.read_state()?;
        Ok(Basis {
            identity: state.identity.clone(),
            params: state.params,
            pending: state
                .pending
                .iter()
                .map(|(key, p)| (key.clone(), p.staged.clone()))
                .collect(),
            committed: state.committed.clone(),
            generation: state.generation,
            watermark: state.next_seq,
        })
    }

    fn rebuild(&self, basis: &Basis, extras: &[(String, Node)]) -> ContainerResult<Trie> {
        let mut merged: BTreeMap<String, Node> = BTreeMap::new();
        if let Some(previous) = &basis.committed {
            for entry in previous.entries() {
                let (key, node) = entry?;
                if key != RESERVED_KEY {
                    merged.insert(key, node);
                }
            }
        }
        // Staged writes are newer than anything inherited.
        for (key, staged) in &basis.pending {
            merged.insert(key.clone(), encode(staged)?);
        }

        let mut builder = TrieBuilder::new(basis.params, Arc::clone(&self.storage))?;
        let mut map = builder.begin_map(merged.len() + extras.len() + 1);
        map.assign_key(RESERVED_KEY)?;
        map.assign_bytes(basis.identity.clone())?;
        for (key, node) in merged {
            map.insert(key, node)?;
        }
        for (key, node) in extras {
            map.insert(key.clone(), node.clone())?;
        }
        map.finish()?;
        Ok(builder.finalize()?)
    }

    fn commit_if_stale(&self) -> ContainerResult<()> {
        if !self.auto_commit {
            return Ok(());
        }
        let stale = {
            let state = self.read_state()?;
            state.committed.is_none() || !state.pending.is_empty()
        };
        if stale {
            self.commit()?;
        }
        Ok(())
    }

    /// The current snapshot. The trie is immutable, so traversal happens
    /// outside the lock.
    fn snapshot(&self) -> ContainerResult<Trie> {
        self.commit_if_stale()?;
        let state = self.read_state()?;
        state
            .committed
            .clone()
            .ok_or_else(|| not_committed(&state.identity))
    }

    /// Value stored under `key` in the current snapshot.
    pub fn get(&self, key: impl AsRef<[u8]>) -> ContainerResult<Value> {
        let key = key.as_ref();
        let trie = self.snapshot()?;
        match trie.lookup(&normalize_key(key))? {
            Some(node) => Ok(decode(&node)?),
            None => Err(ContainerError::NotFound {
                key: display_key(key),
            }),
        }
    }

    pub fn get_as_link(&self, key: impl AsRef<[u8]>) -> ContainerResult<ContentAddress> {
        match self.get(key)? {
            Value::Link(address) => Ok(address),
            other => Err(mismatch(ValueKind::Link, &other)),
        }
    }

    pub fn get_as_bytes(&self, key: impl AsRef<[u8]>) -> ContainerResult<Vec<u8>> {
        match self.get(key)? {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch(ValueKind::Bytes, &other)),
        }
    }

    /// Text stored under `key`. Bytes are not reinterpreted as text.
    pub fn get_as_text(&self, key: impl AsRef<[u8]>) -> ContainerResult<String> {
        match self.get(key)? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(ValueKind::Text, &other)),
        }
    }

    /// Visit every entry of the current snapshot in trie order, stopping at
    /// the first error `visit` returns.
    pub fn view<F>(&self, mut visit: F) -> ContainerResult<()>
    where
        F: FnMut(&[u8], Value) -> ContainerResult<()>,
    {
        let trie = self.snapshot()?;
        for entry in trie.entries() {
            let (key, node) = entry?;
            if key == RESERVED_KEY {
                continue;
            }
            let raw = denormalize_key(&key).ok_or(ContainerError::CorruptKey(key))?;
            visit(&raw, decode(&node)?)?;
        }
        Ok(())
    }

    /// Open the container whose snapshot is linked under `key`.
    ///
    /// The child shares this container's storage binding. Fails with
    /// [`ContainerError::NoNestedFound`] if this container has no snapshot
    /// or holds no link under `key`.
    pub fn resolve_nested(&self, key: impl AsRef<[u8]>) -> ContainerResult<Container> {
        self.open_nested(key.as_ref(), self.auto_commit)
    }

    pub(crate) fn open_nested(&self, key: &[u8], auto_commit: bool) -> ContainerResult<Container> {
        let address = match self.get_as_link(key) {
            Ok(address) => address,
            Err(
                ContainerError::NotFound { .. }
                | ContainerError::NotCommitted { .. }
                | ContainerError::KindMismatch { .. },
            ) => {
                return Err(ContainerError::NoNestedFound {
                    key: display_key(key),
                })
            }
            Err(e) => return Err(e),
        };
        let child = Container::new(Vec::new(), self.storage(), self.params(), auto_commit);
        child.load(&address)?;
        debug!(
            key = %display_key(key),
            address = %address.short_hex(),
            "nested container resolved"
        );
        Ok(child)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Container");
        s.field("backend", &self.storage.backend());
        match self.state.try_read() {
            Ok(state) => {
                s.field("identity", &display_key(&state.identity))
                    .field("pending", &state.pending.len())
                    .field("address", &state.committed.as_ref().map(Trie::address));
            }
            Err(_) => {
                s.field("state", &"<locked>");
            }
        }
        s.finish()
    }
}

fn encode(staged: &Staged) -> ContainerResult<Node> {
    match staged {
        Staged::Value(value) => value.to_node(),
        Staged::Nested(child) => Ok(Node::Link(child.committed_address()?)),
    }
}

fn not_committed(identity: &[u8]) -> ContainerError {
    ContainerError::NotCommitted {
        identity: display_key(identity),
    }
}

fn mismatch(expected: ValueKind, found: &Value) -> ContainerError {
    ContainerError::KindMismatch {
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use hamt_store::{InMemoryKvService, MemoryStorage, RemoteKvStorage, StoreError};
    use proptest::prelude::*;

    use super::*;
    use crate::builder::ContainerBuilder;

    fn container(identity: &str) -> Container {
        ContainerBuilder::new().identity(identity).build().unwrap()
    }

    fn extra<'a>(
        f: impl FnOnce(&mut EntryWriter<'_>) -> ContainerResult<()> + 'a,
    ) -> ExtraWrite<'a> {
        Box::new(f)
    }

    fn listing(c: &Container) -> BTreeMap<Vec<u8>, Value> {
        let mut out = BTreeMap::new();
        c.view(|k, v| {
            out.insert(k.to_vec(), v);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn uncommitted_container_has_no_address() {
        let c = container("fresh");
        assert!(matches!(
            c.content_address(),
            Err(ContainerError::NotCommitted { .. })
        ));
        assert!(matches!(c.get("x"), Err(ContainerError::NotCommitted { .. })));
        assert!(!c.is_committed());
    }

    #[test]
    fn commit_yields_address() {
        let c = container("a");
        c.stage("k", "v").unwrap();
        let address = c.commit().unwrap();
        assert_eq!(c.content_address().unwrap(), address);
        assert!(c.is_committed());
        assert!(!c.has_pending());
    }

    #[test]
    fn staged_kinds_roundtrip() {
        let c = container("kinds");
        let link = ContentAddress::digest(b"elsewhere");
        c.stage("text", "hello").unwrap();
        c.stage("bytes", vec![0u8, 159, 146, 150]).unwrap();
        c.stage("link", link).unwrap();
        c.commit().unwrap();

        assert_eq!(c.get("text").unwrap(), Value::Text("hello".into()));
        assert_eq!(c.get_as_bytes("bytes").unwrap(), vec![0u8, 159, 146, 150]);
        assert_eq!(c.get_as_link("link").unwrap(), link);
        assert_eq!(c.get_as_text("text").unwrap(), "hello");
    }

    #[test]
    fn recommit_without_changes_is_idempotent() {
        let c = container("same");
        c.stage("a", "1").unwrap();
        let first = c.commit().unwrap();
        let second = c.commit().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overwrite_replaces_value_and_address() {
        let c = container("over");
        c.stage("k", "v1").unwrap();
        let first = c.commit().unwrap();
        c.stage("k", "v2").unwrap();
        let second = c.commit().unwrap();
        assert_eq!(c.get_as_text("k").unwrap(), "v2");
        assert_ne!(first, second);
    }

    #[test]
    fn identity_is_part_of_the_address() {
        let a = container("left");
        let b = container("right");
        assert_ne!(a.commit().unwrap(), b.commit().unwrap());
    }

    #[test]
    fn view_hides_reserved_entry() {
        let c = container("hidden");
        c.stage("visible", "yes").unwrap();
        c.commit().unwrap();
        let seen = listing(&c);
        assert_eq!(seen.len(), 1);
        assert!(seen.contains_key(b"visible".as_slice()));
        assert!(!seen.contains_key(RESERVED_KEY.as_bytes()));
        assert!(matches!(
            c.get(RESERVED_KEY),
            Err(ContainerError::NotFound { .. })
        ));
    }

    #[test]
    fn kind_mismatch_is_not_not_found() {
        let c = container("typed");
        c.stage("name", "text").unwrap();
        c.commit().unwrap();
        let err = c.get_as_link("name").unwrap_err();
        assert!(err.is_kind_mismatch());
        assert!(matches!(
            err,
            ContainerError::KindMismatch {
                expected: ValueKind::Link,
                found: ValueKind::Text
            }
        ));
        assert!(c.get_as_link("absent").unwrap_err().is_not_found());
    }

    #[test]
    fn loading_absent_address_is_storage_not_found() {
        let c = container("loader");
        let err = c.load(&ContentAddress::digest(b"never written")).unwrap_err();
        assert!(matches!(err, ContainerError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn empty_root_container() {
        let c = container("root");
        c.commit().unwrap();
        assert!(c.get("x").unwrap_err().is_not_found());
        assert!(listing(&c).is_empty());
    }

    #[test]
    fn second_commit_merges_with_first() {
        let c = container("merge");
        c.stage("foo", "bar").unwrap();
        let first = c.commit().unwrap();
        c.stage("zoo", "zar").unwrap();
        let second = c.commit().unwrap();
        assert_ne!(first, second);

        let seen = listing(&c);
        let expected: BTreeMap<Vec<u8>, Value> = [
            (b"foo".to_vec(), Value::Text("bar".into())),
            (b"zoo".to_vec(), Value::Text("zar".into())),
        ]
        .into_iter()
        .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn binary_keys_survive_view() {
        let c = container("binary");
        let key = [0u8, 1, 255, b'\n'];
        c.stage(key, "raw").unwrap();
        c.commit().unwrap();
        assert_eq!(c.get_as_text(key).unwrap(), "raw");
        assert!(listing(&c).contains_key(key.as_slice()));
    }

    #[test]
    fn load_restores_identity_and_entries() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let first = ContainerBuilder::new()
            .identity("persisted")
            .storage(Arc::clone(&storage))
            .build()
            .unwrap();
        first.stage("foo", "bar").unwrap();
        let address = first.commit().unwrap();

        let reopened = ContainerBuilder::new()
            .storage(storage)
            .identity("ignored")
            .build()
            .unwrap();
        reopened.load(&address).unwrap();
        reopened.load(&address).unwrap();
        assert_eq!(reopened.identity(), b"persisted");
        assert_eq!(reopened.content_address().unwrap(), address);
        assert_eq!(reopened.get_as_text("foo").unwrap(), "bar");

        // A re-commit after load keeps what was loaded.
        reopened.stage("zoo", "zar").unwrap();
        reopened.commit().unwrap();
        assert_eq!(reopened.get_as_text("foo").unwrap(), "bar");
        assert_eq!(reopened.get_as_text("zoo").unwrap(), "zar");
    }

    #[test]
    fn snapshot_without_identity_is_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut builder = TrieBuilder::new(TrieParams::default(), Arc::clone(&storage)).unwrap();
        let mut map = builder.begin_map(1);
        map.insert(normalize_key(b"k"), Node::Text("v".into())).unwrap();
        map.finish().unwrap();
        let trie = builder.finalize().unwrap();

        let c = ContainerBuilder::new().storage(storage).build().unwrap();
        let err = c.load(&trie.address()).unwrap_err();
        assert!(matches!(err, ContainerError::MissingIdentity { .. }));
        assert!(!c.is_committed());
    }

    #[test]
    fn nested_container_resolves() {
        let child = Arc::new(container("child"));
        child.stage("foo", "bar").unwrap();
        let child_address = child.commit().unwrap();

        let parent = ContainerBuilder::new()
            .identity("parent")
            .storage(child.storage())
            .build()
            .unwrap();
        parent.stage("child", &child).unwrap();
        parent.commit().unwrap();
        assert_eq!(parent.get_as_link("child").unwrap(), child_address);

        let resolved = parent.resolve_nested("child").unwrap();
        assert_eq!(resolved.identity(), b"child");
        assert_eq!(resolved.get_as_text("foo").unwrap(), "bar");
    }

    #[test]
    fn nested_resolution_failures() {
        let parent = container("parent");
        assert!(matches!(
            parent.resolve_nested("child"),
            Err(ContainerError::NoNestedFound { .. })
        ));
        parent.stage("text", "not a link").unwrap();
        parent.commit().unwrap();
        for key in ["child", "text"] {
            assert!(matches!(
                parent.resolve_nested(key),
                Err(ContainerError::NoNestedFound { .. })
            ));
        }
    }

    #[test]
    fn uncommitted_child_aborts_commit() {
        let c = container("parent");
        c.stage("keep", "me").unwrap();
        let before = c.commit().unwrap();

        let child = Arc::new(container("child"));
        c.stage("child", &child).unwrap();
        c.stage("other", "value").unwrap();
        let err = c.commit().unwrap_err();
        assert!(matches!(err, ContainerError::NotCommitted { .. }));
        assert!(c.has_pending());
        assert_eq!(c.content_address().unwrap(), before);

        // The retry succeeds once the child has a snapshot.
        child.commit().unwrap();
        c.commit().unwrap();
        assert!(!c.has_pending());
        assert_eq!(c.get_as_text("other").unwrap(), "value");
        assert_eq!(c.get_as_text("keep").unwrap(), "me");
    }

    #[test]
    fn unencodable_values_are_rejected_when_staged() {
        let c = container("strict");
        for value in [Value::Null, Value::Bool(true), Value::Int(3), Value::Float(2.5)] {
            assert!(matches!(
                c.stage("k", value),
                Err(ContainerError::UnsupportedValueKind(_))
            ));
        }
        assert!(!c.has_pending());
    }

    #[test]
    fn container_cannot_nest_itself() {
        let c = Arc::new(container("ouroboros"));
        assert!(matches!(
            c.stage("me", &c),
            Err(ContainerError::UnsupportedValueKind(_))
        ));

        let inner = Arc::clone(&c);
        assert!(matches!(
            c.commit_with(vec![extra(move |w| w.set("me", inner))]),
            Err(ContainerError::UnsupportedValueKind(_))
        ));
    }

    #[test]
    fn extra_writes_apply_last_and_in_order() {
        let c = container("extras");
        c.stage("k", "staged").unwrap();
        c.stage("untouched", "kept").unwrap();
        let extras = vec![
            extra(|w| w.set("k", "first")),
            extra(|w| w.set("k", "second")),
            extra(|w| w.set("added", vec![1u8, 2])),
        ];
        c.commit_with(extras).unwrap();
        assert_eq!(c.get_as_text("k").unwrap(), "second");
        assert_eq!(c.get_as_text("untouched").unwrap(), "kept");
        assert_eq!(c.get_as_bytes("added").unwrap(), vec![1, 2]);

        // Extra writes become part of the snapshot and survive a re-commit.
        c.commit().unwrap();
        assert_eq!(c.get_as_text("k").unwrap(), "second");
    }

    #[test]
    fn failing_extra_write_keeps_state() {
        let c = container("extras");
        c.stage("k", "v").unwrap();
        assert!(c
            .commit_with(vec![extra(|w| w.set("bad", Value::Int(1)))])
            .is_err());
        assert!(c.has_pending());
        assert!(!c.is_committed());
    }

    #[test]
    fn reserved_key_is_the_only_raw_key_persisted() {
        let c = container("layout");
        c.stage("a", "1").unwrap();
        c.stage(vec![0u8, 1], "2").unwrap();
        c.commit().unwrap();

        let keys: Vec<String> = c
            .snapshot()
            .unwrap()
            .entries()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(keys.len(), 3);
        let raw: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|k| denormalize_key(k).is_none())
            .collect();
        assert_eq!(raw, vec![RESERVED_KEY]);
    }

    #[test]
    fn extra_write_can_use_its_own_container() {
        let c = Arc::new(container("reentrant"));
        c.stage("k", "v").unwrap();
        c.commit().unwrap();

        let inner = Arc::clone(&c);
        c.commit_with(vec![extra(move |w| {
            let v = inner.get_as_text("k")?;
            inner.stage("side", "staged inside")?;
            inner.commit()?;
            w.set("k2", v)
        })])
        .unwrap();
        assert_eq!(c.get_as_text("k2").unwrap(), "v");
        assert_eq!(c.get_as_text("side").unwrap(), "staged inside");
        assert!(!c.has_pending());
    }

    #[test]
    fn mutually_nested_containers_commit_concurrently() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let open = |identity: &str| {
            Arc::new(
                ContainerBuilder::new()
                    .identity(identity)
                    .storage(Arc::clone(&storage))
                    .build()
                    .unwrap(),
            )
        };
        let a = open("a");
        let b = open("b");
        a.commit().unwrap();
        b.commit().unwrap();

        let (done, finished) = mpsc::channel();
        for (x, y) in [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))] {
            let done = done.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    x.stage("peer", &y).unwrap();
                    x.stage(format!("n{i}"), "v").unwrap();
                    x.commit().unwrap();
                }
                done.send(()).unwrap();
            });
        }
        for _ in 0..2 {
            finished
                .recv_timeout(Duration::from_secs(30))
                .expect("cross-nested commits stalled");
        }

        for c in [&a, &b] {
            assert!(!c.has_pending());
            assert!(c.get_as_link("peer").is_ok());
            assert_eq!(listing(c).len(), 201);
        }
    }

    #[test]
    fn auto_commit_on_access() {
        let c = ContainerBuilder::new()
            .identity("auto")
            .auto_commit(true)
            .build()
            .unwrap();
        c.stage("k", "v").unwrap();
        assert_eq!(c.get_as_text("k").unwrap(), "v");
        assert!(!c.has_pending());

        let before = c.content_address().unwrap();
        c.stage("k", "w").unwrap();
        assert_ne!(c.content_address().unwrap(), before);

        let empty = ContainerBuilder::new().auto_commit(true).build().unwrap();
        assert!(empty.content_address().is_ok());
    }

    #[test]
    fn concurrent_staging_and_commits() {
        let c = Arc::new(container("shared"));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for i in 0..25 {
                        c.stage(format!("t{t}-{i}"), format!("{t}:{i}")).unwrap();
                    }
                    c.commit().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        c.commit().unwrap();
        assert_eq!(listing(&c).len(), 200);
        assert_eq!(c.get_as_text("t3-7").unwrap(), "3:7");
    }

    #[test]
    fn remote_kv_backend_roundtrip_and_outage() {
        let service = Arc::new(InMemoryKvService::new());
        let storage: Arc<dyn Storage> = Arc::new(RemoteKvStorage::new(Arc::clone(&service)));
        let c = ContainerBuilder::new()
            .identity("remote")
            .storage(Arc::clone(&storage))
            .build()
            .unwrap();
        c.stage("foo", "bar").unwrap();
        let address = c.commit().unwrap();
        assert!(!service.is_empty());

        let reopened = ContainerBuilder::new()
            .storage(Arc::clone(&storage))
            .from_address(address)
            .build()
            .unwrap();
        assert_eq!(reopened.get_as_text("foo").unwrap(), "bar");

        service.set_available(false);
        c.stage("zoo", "zar").unwrap();
        let err = c.commit().unwrap_err();
        assert!(matches!(err, ContainerError::Store(StoreError::Unavailable { .. })));
        assert!(c.has_pending());
        assert_eq!(c.content_address().unwrap(), address);

        service.set_available(true);
        assert_ne!(c.commit().unwrap(), address);
    }

    proptest! {
        #[test]
        fn address_depends_only_on_content(
            entries in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..40),
        ) {
            let forward = container("prop");
            for (k, v) in &entries {
                forward.stage(k, v.as_str()).unwrap();
            }
            let backward = container("prop");
            for (k, v) in entries.iter().rev() {
                backward.stage(k, v.as_str()).unwrap();
            }
            // Split the same content over two commits.
            let split = container("prop");
            for (i, (k, v)) in entries.iter().enumerate() {
                split.stage(k, v.as_str()).unwrap();
                if i == entries.len() / 2 {
                    split.commit().unwrap();
                }
            }
            let a = forward.commit().unwrap();
            prop_assert_eq!(a, backward.commit().unwrap());
            prop_assert_eq!(a, split.commit().unwrap());
        }
    }
}
