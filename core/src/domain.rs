//! Application record types kept in the ordered collections
//!
//! The link fields are private: callers reorder through the repository,
//! never by editing links on a record they hold.

use crate::list::{LinkedRecord, NodeKey};
use serde::{Deserialize, Serialize};

/// A monetary amount row: value, currency code and a free-form comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountRecord {
    pub value: f64,
    pub currency: String,
    pub comment: String,
    prev_node_key: NodeKey,
    next_node_key: NodeKey,
}

impl AmountRecord {
    pub fn new(value: f64, currency: String, comment: String) -> Self {
        Self {
            value,
            currency,
            comment,
            prev_node_key: NodeKey::NULLISH,
            next_node_key: NodeKey::NULLISH,
        }
    }
}

impl LinkedRecord for AmountRecord {
    fn prev_key(&self) -> NodeKey {
        self.prev_node_key
    }

    fn next_key(&self) -> NodeKey {
        self.next_node_key
    }

    fn set_prev_key(&mut self, key: NodeKey) {
        self.prev_node_key = key;
    }

    fn set_next_key(&mut self, key: NodeKey) {
        self.next_node_key = key;
    }
}

/// A favorite currency pair, e.g. EUR/USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPairRecord {
    pub base: String,
    pub quote: String,
    prev_node_key: NodeKey,
    next_node_key: NodeKey,
}

impl CurrencyPairRecord {
    pub fn new(base: String, quote: String) -> Self {
        Self {
            base,
            quote,
            prev_node_key: NodeKey::NULLISH,
            next_node_key: NodeKey::NULLISH,
        }
    }
}

impl LinkedRecord for CurrencyPairRecord {
    fn prev_key(&self) -> NodeKey {
        self.prev_node_key
    }

    fn next_key(&self) -> NodeKey {
        self.next_node_key
    }

    fn set_prev_key(&mut self, key: NodeKey) {
        self.prev_node_key = key;
    }

    fn set_next_key(&mut self, key: NodeKey) {
        self.next_node_key = key;
    }
}
