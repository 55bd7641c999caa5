//! OPC UA NodeId — the key of every cache entry.
//!
//! Textual form: `ns=<index>;i=<u32>` or `ns=<index>;s=<text>`. The
//! `ns=<index>;` prefix may be omitted on input (namespace 0); it is always
//! emitted on output so cache keys have a single canonical spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when parsing the textual NodeId form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeIdParseError {
    /// Input was empty.
    #[error("empty NodeId")]
    Empty,

    /// The `ns=` part is not a valid u16.
    #[error("invalid namespace index in '{0}'")]
    InvalidNamespace(String),

    /// Identifier kind is neither `i=` nor `s=`.
    #[error("unsupported identifier type in '{0}' (expected i= or s=)")]
    UnsupportedIdentifier(String),

    /// The `i=` part is not a valid u32.
    #[error("invalid numeric identifier in '{0}'")]
    InvalidNumeric(String),

    /// The `s=` part is empty.
    #[error("empty string identifier in '{0}'")]
    EmptyString(String),
}

/// Variable identifier: numeric or string, within a namespace.
///
/// Equality and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeId {
    /// `ns=<ns>;i=<id>`
    Numeric {
        /// Namespace index.
        ns: u16,
        /// Numeric identifier.
        id: u32,
    },
    /// `ns=<ns>;s=<id>`
    String {
        /// Namespace index.
        ns: u16,
        /// String identifier.
        id: String,
    },
}

impl NodeId {
    /// Numeric NodeId.
    pub const fn numeric(ns: u16, id: u32) -> Self {
        Self::Numeric { ns, id }
    }

    /// String NodeId.
    pub fn string(ns: u16, id: impl Into<String>) -> Self {
        Self::String { ns, id: id.into() }
    }

    /// Namespace index.
    pub fn namespace(&self) -> u16 {
        match self {
            Self::Numeric { ns, .. } | Self::String { ns, .. } => *ns,
        }
    }

    /// String identifier, if this is a String NodeId.
    pub fn as_str_id(&self) -> Option<&str> {
        match self {
            Self::String { id, .. } => Some(id),
            Self::Numeric { .. } => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { ns, id } => write!(f, "ns={ns};i={id}"),
            Self::String { ns, id } => write!(f, "ns={ns};s={id}"),
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(NodeIdParseError::Empty);
        }

        let (ns, ident) = match text.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, ident) = rest
                    .split_once(';')
                    .ok_or_else(|| NodeIdParseError::InvalidNamespace(s.to_string()))?;
                let ns = ns_str
                    .parse::<u16>()
                    .map_err(|_| NodeIdParseError::InvalidNamespace(s.to_string()))?;
                (ns, ident)
            }
            None => (0, text),
        };

        if let Some(num) = ident.strip_prefix("i=") {
            let id = num
                .parse::<u32>()
                .map_err(|_| NodeIdParseError::InvalidNumeric(s.to_string()))?;
            Ok(Self::Numeric { ns, id })
        } else if let Some(name) = ident.strip_prefix("s=") {
            if name.is_empty() {
                return Err(NodeIdParseError::EmptyString(s.to_string()));
            }
            Ok(Self::String {
                ns,
                id: name.to_string(),
            })
        } else {
            Err(NodeIdParseError::UnsupportedIdentifier(s.to_string()))
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}
