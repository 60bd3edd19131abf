use serde::{Deserialize, Serialize};

use super::key::Key;
use super::node::LeafNode;

/// Pre-order snapshot of a B+ tree for diagnostics
///
/// Internal nodes list their separators and children. Leaf nodes list one
/// entry per distinct key in the form `key:[(page,slot),...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDump {
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeDump>,
}

impl TreeDump {
    pub(crate) fn internal(keys: &[Key], children: Vec<TreeDump>) -> Self {
        Self {
            keys: keys.iter().map(Key::to_string).collect(),
            children,
        }
    }

    pub(crate) fn leaf(leaf: &LeafNode) -> Self {
        let mut keys: Vec<String> = Vec::new();
        let mut i = 0;
        while i < leaf.len() {
            let key = &leaf.keys[i];
            let run = leaf.keys[i..].iter().take_while(|k| *k == key).count();
            let rids: Vec<String> = leaf.rids[i..i + run].iter().map(|r| r.to_string()).collect();
            keys.push(format!("{}:[{}]", key, rids.join(",")));
            i += run;
        }
        Self {
            keys,
            children: Vec::new(),
        }
    }

    /// Number of leaf entries (distinct keys) reachable from this node
    pub fn leaf_key_count(&self) -> usize {
        if self.children.is_empty() {
            self.keys.len()
        } else {
            self.children.iter().map(TreeDump::leaf_key_count).sum()
        }
    }

    /// Render as compact JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
