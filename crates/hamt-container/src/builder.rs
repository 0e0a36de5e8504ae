use std::sync::Arc;

use hamt_store::{MemoryStorage, Storage};
use hamt_trie::TrieParams;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::container::Container;
use crate::error::{ContainerError, ContainerResult};
use crate::key::display_key;

/// Identity given to containers built without one.
pub const DEFAULT_IDENTITY: &[u8] = b"hamt";

/// Options collected by a [`ContainerBuilder`].
///
/// Storage and parent are mutually exclusive, as are address and parent: a
/// nested container always lives in its parent's storage and takes its
/// initial state from the parent's link.
#[derive(Debug, Default)]
pub struct ContainerConfig<'p> {
    pub identity: Option<Vec<u8>>,
    pub storage: Option<Arc<dyn Storage>>,
    pub address: Option<ContentAddress>,
    /// Parent container and the key its child is linked under.
    pub parent: Option<(&'p Container, Vec<u8>)>,
    pub auto_commit: bool,
    pub trie: Option<TrieParams>,
}

enum Source<'p> {
    Fresh,
    Address(ContentAddress),
    Nested(&'p Container, Vec<u8>),
}

struct Plan<'p> {
    identity: Vec<u8>,
    storage: Arc<dyn Storage>,
    params: TrieParams,
    auto_commit: bool,
    source: Source<'p>,
}

/// Validate a configuration once and resolve defaults.
fn parse_configuration(config: ContainerConfig<'_>) -> ContainerResult<Plan<'_>> {
    let ContainerConfig {
        identity,
        storage,
        address,
        parent,
        auto_commit,
        trie,
    } = config;

    if storage.is_some() && parent.is_some() {
        return Err(ContainerError::ConfigurationConflict(
            "a nested container inherits its parent's storage",
        ));
    }
    if address.is_some() && parent.is_some() {
        return Err(ContainerError::ConfigurationConflict(
            "initial state comes from either an address or a parent",
        ));
    }
    let params = trie.unwrap_or_default();
    params.validate()?;

    let identity = identity.unwrap_or_else(|| DEFAULT_IDENTITY.to_vec());
    let (storage, source) = match (parent, address) {
        (Some((parent, key)), _) => (parent.storage(), Source::Nested(parent, key)),
        (None, Some(address)) => (
            storage.unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            Source::Address(address),
        ),
        (None, None) => (
            storage.unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            Source::Fresh,
        ),
    };

    Ok(Plan {
        identity,
        storage,
        params,
        auto_commit,
        source,
    })
}

/// Chained construction of a [`Container`].
///
/// ```
/// use hamt_container::ContainerBuilder;
///
/// let c = ContainerBuilder::new().identity("notes").build()?;
/// assert_eq!(c.identity(), b"notes");
/// # Ok::<(), hamt_container::ContainerError>(())
/// ```
#[derive(Debug, Default)]
pub struct ContainerBuilder<'p> {
    config: ContainerConfig<'p>,
}

impl<'p> ContainerBuilder<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a fully populated configuration.
    pub fn from_config(config: ContainerConfig<'p>) -> Self {
        Self { config }
    }

    /// Name for a fresh container. Ignored when state is loaded, since the
    /// snapshot records its own identity.
    pub fn identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.config.identity = Some(identity.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.config.storage = Some(storage);
        self
    }

    /// Load the snapshot at `address` on build.
    pub fn from_address(mut self, address: ContentAddress) -> Self {
        self.config.address = Some(address);
        self
    }

    /// Open the child linked under `key` in `parent` on build.
    pub fn from_nested(mut self, parent: &'p Container, key: impl AsRef<[u8]>) -> Self {
        self.config.parent = Some((parent, key.as_ref().to_vec()));
        self
    }

    /// Commit pending writes implicitly before reads. Off by default.
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.config.auto_commit = enabled;
        self
    }

    /// Trie shape for fresh containers. Loaded containers keep the shape
    /// recorded in their snapshot.
    pub fn trie_params(mut self, params: TrieParams) -> Self {
        self.config.trie = Some(params);
        self
    }

    pub fn build(self) -> ContainerResult<Container> {
        let plan = parse_configuration(self.config)?;
        let container = match plan.source {
            Source::Fresh => {
                Container::new(plan.identity, plan.storage, plan.params, plan.auto_commit)
            }
            Source::Address(address) => {
                let c = Container::new(plan.identity, plan.storage, plan.params, plan.auto_commit);
                c.load(&address)?;
                c
            }
            Source::Nested(parent, key) => parent.open_nested(&key, plan.auto_commit)?,
        };
        debug!(
            identity = %display_key(&container.identity()),
            backend = container.storage().backend(),
            committed = container.is_committed(),
            "container built"
        );
        Ok(container)
    }
}
