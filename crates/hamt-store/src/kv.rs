//! Remote key-value cache binding.
//!
//! [`RemoteKvStorage`] persists each block as a base64 string under its hex
//! address in a string-valued key-value service such as Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::error::{StoreError, StoreResult, TransportError};
use crate::traits::{BlockWrite, Storage};

/// Client for a remote string key-value service.
pub trait KvService: Send + Sync + std::fmt::Debug {
    /// `Ok(None)` means the key is not set.
    fn get(&self, key: &str) -> Result<Option<String>, TransportError>;

    fn set(&self, key: &str, value: String) -> Result<(), TransportError>;
}

impl<S: KvService + ?Sized> KvService for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), TransportError> {
        (**self).set(key, value)
    }
}

/// [`Storage`] backed by a remote key-value service.
#[derive(Debug)]
pub struct RemoteKvStorage<S> {
    service: S,
    namespace: String,
}

impl<S: KvService> RemoteKvStorage<S> {
    const BACKEND: &'static str = "remote-kv";

    pub fn new(service: S) -> Self {
        Self {
            service,
            namespace: String::new(),
        }
    }

    /// Prefix every key with `namespace` so several stores can share one
    /// keyspace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The underlying service client.
    pub fn service(&self) -> &S {
        &self.service
    }

    fn key(&self, address: &ContentAddress) -> String {
        format!("{}{}", self.namespace, address.to_hex())
    }

    fn unavailable(err: TransportError) -> StoreError {
        StoreError::Unavailable {
            backend: Self::BACKEND,
            reason: err.0,
        }
    }
}

impl<S: KvService> Storage for RemoteKvStorage<S> {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn read(&self, address: &ContentAddress) -> StoreResult<Bytes> {
        let encoded = self
            .service
            .get(&self.key(address))
            .map_err(Self::unavailable)?
            .ok_or(StoreError::NotFound(*address))?;
        let data = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| StoreError::Encoding {
                address: *address,
                reason: e.to_string(),
            })?;
        Ok(Bytes::from(data))
    }

    fn begin_write(&self) -> StoreResult<BlockWrite<'_>> {
        Ok(BlockWrite::new(move |address, data| {
            let key = self.key(address);
            self.service
                .set(&key, STANDARD.encode(&data))
                .map_err(Self::unavailable)?;
            debug!(key = %key, len = data.len(), "block cached");
            Ok(())
        }))
    }
}

/// In-memory key-value remote.
///
/// Stands in for a networked cache in tests and single-process setups, and
/// can simulate an outage with [`InMemoryKvService::set_available`].
#[derive(Debug)]
pub struct InMemoryKvService {
    entries: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl InMemoryKvService {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of keys currently set.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::new("connection refused"))
        }
    }
}

impl Default for InMemoryKvService {
    fn default() -> Self {
        Self::new()
    }
}

impl KvService for InMemoryKvService {
    fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        self.check_available()?;
        let entries = self
            .entries
            .read()
            .map_err(|e| TransportError::new(format!("lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), TransportError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| TransportError::new(format!("lock poisoned: {e}")))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
