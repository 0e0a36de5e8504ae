use std::collections::BTreeMap;
use std::fmt;

use hamt_types::ContentAddress;
use serde::{Deserialize, Serialize};

/// A persisted value.
///
/// This is the full data model the trie can carry. Containers only ever
/// write text, bytes and links, but a block produced elsewhere may hold any
/// of these kinds, so readers classify rather than assume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Link(ContentAddress),
    List(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

/// Kind tag of a [`Node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Link,
    List,
    Map,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Null => NodeKind::Null,
            Self::Bool(_) => NodeKind::Bool,
            Self::Int(_) => NodeKind::Int,
            Self::Float(_) => NodeKind::Float,
            Self::Text(_) => NodeKind::Text,
            Self::Bytes(_) => NodeKind::Bytes,
            Self::Link(_) => NodeKind::Link,
            Self::List(_) => NodeKind::List,
            Self::Map(_) => NodeKind::Map,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&ContentAddress> {
        match self {
            Self::Link(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Link => "link",
            Self::List => "list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}
