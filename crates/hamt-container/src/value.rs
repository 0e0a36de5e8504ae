//! Value kinds and the node decoder.
//!
//! [`decode`] classifies a persisted [`Node`] into a [`Value`]. [`Staged`] is
//! what a caller hands to [`Container::stage`](crate::Container::stage):
//! either a plain value or another container whose committed snapshot is
//! written as a link.

use std::fmt;
use std::sync::Arc;

use hamt_trie::Node;
use hamt_types::ContentAddress;

use crate::container::Container;
use crate::error::{ContainerError, ContainerResult, DecodeError};

/// A basic value read out of a container.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Link(ContentAddress),
}

/// Kind tag of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Link,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Link(_) => ValueKind::Link,
        }
    }

    /// The persisted form of this value. Only text, bytes and links can be
    /// written into a container.
    pub(crate) fn to_node(&self) -> ContainerResult<Node> {
        match self {
            Self::Text(s) => Ok(Node::Text(s.clone())),
            Self::Bytes(b) => Ok(Node::Bytes(b.clone())),
            Self::Link(address) => Ok(Node::Link(*address)),
            other => Err(ContainerError::UnsupportedValueKind(other.kind().to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Link => "link",
        };
        f.write_str(name)
    }
}

/// Classify a persisted node. Lists and maps are not basic values.
pub fn decode(node: &Node) -> Result<Value, DecodeError> {
    match node {
        Node::Null => Ok(Value::Null),
        Node::Bool(b) => Ok(Value::Bool(*b)),
        Node::Int(i) => Ok(Value::Int(*i)),
        Node::Float(f) => Ok(Value::Float(*f)),
        Node::Text(s) => Ok(Value::Text(s.clone())),
        Node::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Node::Link(address) => Ok(Value::Link(*address)),
        Node::List(_) | Node::Map(_) => Err(DecodeError::UnsupportedKind(node.kind())),
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<ContentAddress> for Value {
    fn from(address: ContentAddress) -> Self {
        Self::Link(address)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// A value waiting in a container's pending writes.
#[derive(Clone, Debug)]
pub enum Staged {
    Value(Value),
    /// Written as a link to the container's content address at commit time.
    Nested(Arc<Container>),
}

impl Staged {
    /// Reject kinds that can never be encoded, before they reach a commit.
    pub(crate) fn check_encodable(&self) -> ContainerResult<()> {
        match self {
            Self::Value(value) => value.to_node().map(|_| ()),
            Self::Nested(_) => Ok(()),
        }
    }
}

impl From<Value> for Staged {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Staged {
    fn from(s: &str) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<String> for Staged {
    fn from(s: String) -> Self {
        Self::Value(Value::Text(s))
    }
}

impl From<Vec<u8>> for Staged {
    fn from(b: Vec<u8>) -> Self {
        Self::Value(Value::Bytes(b))
    }
}

impl From<&[u8]> for Staged {
    fn from(b: &[u8]) -> Self {
        Self::Value(Value::from(b))
    }
}

impl From<ContentAddress> for Staged {
    fn from(address: ContentAddress) -> Self {
        Self::Value(Value::Link(address))
    }
}

impl From<Arc<Container>> for Staged {
    fn from(container: Arc<Container>) -> Self {
        Self::Nested(container)
    }
}

impl From<&Arc<Container>> for Staged {
    fn from(container: &Arc<Container>) -> Self {
        Self::Nested(Arc::clone(container))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use hamt_trie::NodeKind;

    use super::*;

    #[test]
    fn decode_basic_kinds() {
        assert_eq!(decode(&Node::Null).unwrap(), Value::Null);
        assert_eq!(decode(&Node::Bool(true)).unwrap(), Value::Bool(true));
        assert_eq!(decode(&Node::Int(-3)).unwrap(), Value::Int(-3));
        assert_eq!(decode(&Node::Float(0.5)).unwrap(), Value::Float(0.5));
        assert_eq!(decode(&Node::Text("t".into())).unwrap(), Value::Text("t".into()));
        assert_eq!(decode(&Node::Bytes(vec![7])).unwrap(), Value::Bytes(vec![7]));
        let address = ContentAddress::digest(b"x");
        assert_eq!(decode(&Node::Link(address)).unwrap(), Value::Link(address));
    }

    #[test]
    fn decode_rejects_composites() {
        assert_eq!(
            decode(&Node::List(vec![])),
            Err(DecodeError::UnsupportedKind(NodeKind::List))
        );
        assert_eq!(
            decode(&Node::Map(BTreeMap::new())),
            Err(DecodeError::UnsupportedKind(NodeKind::Map))
        );
    }

    #[test]
    fn only_text_bytes_and_links_encode() {
        assert!(Value::from("a").to_node().is_ok());
        assert!(Value::from(vec![1u8]).to_node().is_ok());
        assert!(Value::from(ContentAddress::digest(b"l")).to_node().is_ok());
        for value in [Value::Null, Value::Bool(false), Value::Int(1), Value::Float(1.0)] {
            let err = value.to_node().unwrap_err();
            assert!(matches!(err, ContainerError::UnsupportedValueKind(_)));
        }
    }

    #[test]
    fn staged_conversions() {
        assert!(matches!(Staged::from("s"), Staged::Value(Value::Text(_))));
        assert!(matches!(Staged::from(&b"raw"[..]), Staged::Value(Value::Bytes(_))));
        assert!(Staged::from(Value::Int(42)).check_encodable().is_err());
        assert!(Staged::from("ok").check_encodable().is_ok());
    }
}
