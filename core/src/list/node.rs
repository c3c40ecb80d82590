//! Node identity and link contracts shared by the list layer

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// Primary key of a list node, assigned by the store on creation.
///
/// `NodeKey::NULLISH` is a reserved in-domain value meaning "no such
/// neighbor"; the store never assigns it to a real record, so the link
/// indexes can index it like any other key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// Sentinel key: "no predecessor" / "no successor"
    pub const NULLISH: NodeKey = NodeKey(0);

    pub fn is_nullish(&self) -> bool {
        *self == Self::NULLISH
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction for full-collection retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A record that can participate in a linked list: any serializable
/// payload carrying the two link fields. The list layer mutates only the
/// links; everything else is opaque domain payload.
pub trait LinkedRecord: Serialize + DeserializeOwned + Clone {
    fn prev_key(&self) -> NodeKey;
    fn next_key(&self) -> NodeKey;
    fn set_prev_key(&mut self, key: NodeKey);
    fn set_next_key(&mut self, key: NodeKey);
}
