use crate::file::{PAGE_SIZE, PageNum};
use crate::record::RecordId;

use super::key::Key;

/// metadata word + prev + next
pub const LEAF_HEADER_SIZE: usize = 12;
/// metadata word + leftmost child
pub const INTERNAL_HEADER_SIZE: usize = 8;
/// page number + slot number stored after each leaf key
pub const RID_SIZE: usize = 8;
/// child pointer stored after each internal key
pub const CHILD_SIZE: usize = 4;

/// Internal node: `children[i]` holds keys below `keys[i]`,
/// `children[i + 1]` holds keys at or above it
///
/// Always `children.len() == keys.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    pub keys: Vec<Key>,
    pub children: Vec<PageNum>,
}

impl InternalNode {
    /// Create an internal node with a single child and no keys
    pub fn new(child: PageNum) -> Self {
        Self {
            keys: Vec::new(),
            children: vec![child],
        }
    }

    /// Child to follow for an exact search: equal keys route right
    pub fn child_index(&self, key: &Key) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Child holding the first entry that could be `>= key`
    pub fn lower_child_index(&self, key: &Key) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Insert a separator and the page split off to the right of `children[index]`
    pub fn insert_child(&mut self, index: usize, separator: Key, right: PageNum) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, right);
    }

    pub fn encoded_size(&self) -> usize {
        INTERNAL_HEADER_SIZE
            + self
                .keys
                .iter()
                .map(|k| k.encoded_len() + CHILD_SIZE)
                .sum::<usize>()
    }

    pub fn fits(&self) -> bool {
        self.encoded_size() <= PAGE_SIZE
    }

    /// Split around the size midpoint, returning the promoted key and right half
    ///
    /// The promoted key leaves this node and is not copied into the right half.
    /// Nodes with fewer than three keys cannot be split.
    pub fn split(&mut self) -> Option<(Key, InternalNode)> {
        if self.keys.len() < 3 {
            return None;
        }
        let sizes: Vec<usize> = self
            .keys
            .iter()
            .map(|k| k.encoded_len() + CHILD_SIZE)
            .collect();
        let mid = size_midpoint(&sizes).clamp(1, self.keys.len() - 2);

        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let promoted = self.keys.pop()?;
        Some((
            promoted,
            InternalNode {
                keys: right_keys,
                children: right_children,
            },
        ))
    }
}

/// Leaf node: sorted entries plus sibling links
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafNode {
    pub keys: Vec<Key>,
    pub rids: Vec<RecordId>,
    pub prev: Option<PageNum>,
    pub next: Option<PageNum>,
}

impl LeafNode {
    /// Create a new empty leaf node
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert after any entries with an equal key
    pub fn insert(&mut self, key: Key, rid: RecordId) {
        let pos = self.keys.partition_point(|k| k <= &key);
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);
    }

    /// Remove the exact `(key, rid)` pair
    pub fn remove(&mut self, key: &Key, rid: RecordId) -> bool {
        let start = self.keys.partition_point(|k| k < key);
        let found = (start..self.len())
            .take_while(|&i| &self.keys[i] == key)
            .find(|&i| self.rids[i] == rid);
        match found {
            Some(i) => {
                self.keys.remove(i);
                self.rids.remove(i);
                true
            }
            None => false,
        }
    }

    fn entry_size(key: &Key) -> usize {
        key.encoded_len() + RID_SIZE
    }

    pub fn encoded_size(&self) -> usize {
        LEAF_HEADER_SIZE + self.keys.iter().map(Self::entry_size).sum::<usize>()
    }

    pub fn fits(&self) -> bool {
        self.encoded_size() <= PAGE_SIZE
    }

    /// Move the upper half to a new right sibling
    ///
    /// The split lands on the size midpoint, moved to the edge of a run of
    /// equal keys when both halves still fit a page. Sibling links are left
    /// for the caller, who knows the new page number.
    pub fn split(&mut self) -> LeafNode {
        let sizes: Vec<usize> = self.keys.iter().map(Self::entry_size).collect();
        let len = self.keys.len();
        let mut mid = size_midpoint(&sizes).clamp(1, len.saturating_sub(1).max(1)).min(len);

        if mid < len && self.keys[mid - 1] == self.keys[mid] {
            let run_start = self.keys[..mid].partition_point(|k| k < &self.keys[mid]);
            let run_end = mid + self.keys[mid..].partition_point(|k| k == &self.keys[mid]);
            let fits = |at: usize| {
                let left: usize = sizes[..at].iter().sum();
                let right: usize = sizes[at..].iter().sum();
                LEAF_HEADER_SIZE + left <= PAGE_SIZE && LEAF_HEADER_SIZE + right <= PAGE_SIZE
            };
            let mut candidates = [run_start, run_end];
            candidates.sort_by_key(|&at| at.abs_diff(mid));
            if let Some(&at) = candidates
                .iter()
                .find(|&&at| at >= 1 && at < len && fits(at))
            {
                mid = at;
            }
        }

        LeafNode {
            keys: self.keys.split_off(mid),
            rids: self.rids.split_off(mid),
            prev: None,
            next: None,
        }
    }
}

/// B+ tree node (either internal or leaf)
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

/// Index of the first entry whose cumulative size passes half the total
fn size_midpoint(sizes: &[usize]) -> usize {
    let half = sizes.iter().sum::<usize>() / 2;
    let mut acc = 0;
    for (i, size) in sizes.iter().enumerate() {
        acc += size;
        if acc > half {
            return i;
        }
    }
    sizes.len() / 2
}
