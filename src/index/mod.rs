//! Index management module
//!
//! A B+ tree over one attribute, stored one node per page. Page 0 is
//! always the root and always an internal node; a fresh index holds a root
//! with a single child pointing at an empty leaf on page 1.

mod dump;
mod error;
mod key;
mod node;
mod scan;
mod serialization;
#[cfg(test)]
mod tests;

pub use dump::TreeDump;
pub use error::{IndexError, IndexResult};
pub use key::Key;
pub use node::{InternalNode, LeafNode, Node};
pub use scan::IndexScan;
pub use serialization::{deserialize_node, serialize_node};

use std::path::Path;

use tracing::{debug, trace};

use crate::file::{FileHandle, PAGE_SIZE, PageCounters, PageNum, PagedFileManager};
use crate::record::{Attribute, RecordId};

/// Largest encoded key accepted by an index
pub const MAX_KEY_SIZE: usize = 1000;

/// Page holding the root node
pub const ROOT_PAGE: PageNum = 0;

/// Page holding the first leaf of a fresh index
const FIRST_LEAF_PAGE: PageNum = 1;

/// Maintains B+ tree index files
///
/// Like the record manager it keeps no per-file state; every call reads the
/// nodes it needs through the caller's handle.
#[derive(Debug, Default)]
pub struct IndexManager {
    pfm: PagedFileManager,
}

impl IndexManager {
    /// Create a new index manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index file holding an empty tree
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> IndexResult<()> {
        let path = path.as_ref();
        self.pfm.create_file(path)?;

        let mut handle = FileHandle::new();
        self.pfm.open_file(path, &mut handle)?;
        append_node(&mut handle, &Node::Internal(InternalNode::new(FIRST_LEAF_PAGE)))?;
        append_node(&mut handle, &Node::Leaf(LeafNode::new()))?;
        self.pfm.close_file(&mut handle)?;
        Ok(())
    }

    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> IndexResult<()> {
        Ok(self.pfm.destroy_file(path)?)
    }

    pub fn open_file<P: AsRef<Path>>(&self, path: P, handle: &mut FileHandle) -> IndexResult<()> {
        Ok(self.pfm.open_file(path, handle)?)
    }

    pub fn close_file(&self, handle: &mut FileHandle) -> IndexResult<()> {
        Ok(self.pfm.close_file(handle)?)
    }

    /// Pages visited from the root down to the leaf that should hold `key`
    pub fn search(
        &self,
        handle: &mut FileHandle,
        attr: &Attribute,
        key: &[u8],
    ) -> IndexResult<Vec<PageNum>> {
        let key = parse_key(attr, key)?;
        descend(handle, attr, &key)
    }

    /// Add a `(key, rid)` entry, splitting nodes up to the root as needed
    pub fn insert_entry(
        &self,
        handle: &mut FileHandle,
        attr: &Attribute,
        key: &[u8],
        rid: RecordId,
    ) -> IndexResult<()> {
        let key = parse_key(attr, key)?;
        let path = descend(handle, attr, &key)?;
        let Some((&leaf_page, parents)) = path.split_last() else {
            return Err(IndexError::corruption(ROOT_PAGE, "empty search path"));
        };

        let mut leaf = read_leaf(handle, attr, leaf_page)?;
        leaf.insert(key, rid);
        if leaf.fits() {
            return write_node(handle, leaf_page, &Node::Leaf(leaf));
        }

        let (separator, right_page) = split_leaf(handle, attr, leaf_page, leaf)?;
        let mut pending = (separator, leaf_page, right_page);

        for &parent_page in parents.iter().rev() {
            let (separator, left, right) = pending;
            let mut node = read_internal(handle, attr, parent_page)?;
            let index = node
                .children
                .iter()
                .position(|&child| child == left)
                .ok_or_else(|| {
                    IndexError::corruption(parent_page, format!("page {} is not a child", left))
                })?;
            node.insert_child(index, separator, right);
            if node.fits() {
                return write_node(handle, parent_page, &Node::Internal(node));
            }

            let (promoted, right_node) = node.split().ok_or_else(|| {
                IndexError::corruption(parent_page, "overflowing node has too few keys to split")
            })?;

            if parent_page == ROOT_PAGE {
                let left_page = append_node(handle, &Node::Internal(node))?;
                let right_page = append_node(handle, &Node::Internal(right_node))?;
                let root = InternalNode {
                    keys: vec![promoted],
                    children: vec![left_page, right_page],
                };
                write_node(handle, ROOT_PAGE, &Node::Internal(root))?;
                debug!(left_page, right_page, "root split, tree grew one level");
                return Ok(());
            }

            let new_page = append_node(handle, &Node::Internal(right_node))?;
            write_node(handle, parent_page, &Node::Internal(node))?;
            debug!(page_num = parent_page, new_page, "split internal node");
            pending = (promoted, parent_page, new_page);
        }

        Err(IndexError::corruption(ROOT_PAGE, "split propagated past the root"))
    }

    /// Remove the exact `(key, rid)` entry
    ///
    /// Leaves are never merged; under-full and empty leaves stay linked.
    pub fn delete_entry(
        &self,
        handle: &mut FileHandle,
        attr: &Attribute,
        key: &[u8],
        rid: RecordId,
    ) -> IndexResult<()> {
        let key = parse_key(attr, key)?;
        let limit = handle.page_count()?;
        let mut page_num = lower_leaf(handle, attr, &key)?;

        for _ in 0..limit {
            let mut leaf = read_leaf(handle, attr, page_num)?;
            if leaf.remove(&key, rid) {
                trace!(page_num, %key, %rid, "deleted index entry");
                return write_node(handle, page_num, &Node::Leaf(leaf));
            }
            let past_key = leaf.keys.last().is_some_and(|last| last > &key);
            match leaf.next {
                Some(next) if !past_key => page_num = next,
                _ => break,
            }
        }

        Err(IndexError::EntryNotFound {
            key: key.to_string(),
            rid,
        })
    }

    /// Start a range scan; absent bounds are open
    pub fn scan<'a>(
        &self,
        handle: &'a mut FileHandle,
        attr: &Attribute,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> IndexResult<IndexScan<'a>> {
        IndexScan::new(handle, attr, low, high, low_inclusive, high_inclusive)
    }

    /// Pre-order snapshot of the whole tree
    pub fn dump(&self, handle: &mut FileHandle, attr: &Attribute) -> IndexResult<TreeDump> {
        let depth_limit = handle.page_count()?;
        dump_subtree(handle, attr, ROOT_PAGE, depth_limit)
    }

    /// Page reads, writes and appends made through `handle`
    pub fn collect_counter_values(&self, handle: &FileHandle) -> PageCounters {
        handle.counters()
    }
}

/// Parse a key buffer and enforce the size limit
fn parse_key(attr: &Attribute, bytes: &[u8]) -> IndexResult<Key> {
    let key = Key::from_key_bytes(attr, bytes)?;
    let size = key.encoded_len();
    if size > MAX_KEY_SIZE {
        return Err(IndexError::KeyTooLarge {
            size,
            max: MAX_KEY_SIZE,
        });
    }
    Ok(key)
}

/// Move the upper half of an overflowing leaf to a new page
///
/// Returns the separator for the parent and the new page number.
fn split_leaf(
    handle: &mut FileHandle,
    attr: &Attribute,
    leaf_page: PageNum,
    mut leaf: LeafNode,
) -> IndexResult<(Key, PageNum)> {
    let mut right = leaf.split();
    let separator = right
        .keys
        .first()
        .cloned()
        .ok_or_else(|| IndexError::corruption(leaf_page, "leaf split left the right half empty"))?;

    let right_page = handle.page_count()?;
    right.prev = Some(leaf_page);
    right.next = leaf.next;
    leaf.next = Some(right_page);

    if let Some(next_page) = right.next {
        let mut neighbour = read_leaf(handle, attr, next_page)?;
        neighbour.prev = Some(right_page);
        write_node(handle, next_page, &Node::Leaf(neighbour))?;
    }

    let appended = append_node(handle, &Node::Leaf(right))?;
    if appended != right_page {
        return Err(IndexError::corruption(
            appended,
            format!("expected new leaf at page {}", right_page),
        ));
    }
    write_node(handle, leaf_page, &Node::Leaf(leaf))?;
    debug!(page_num = leaf_page, right_page, %separator, "split leaf");
    Ok((separator, right_page))
}

/// Root-to-leaf path for `key`; equal keys route right
fn descend(handle: &mut FileHandle, attr: &Attribute, key: &Key) -> IndexResult<Vec<PageNum>> {
    let depth_limit = handle.page_count()? as usize;
    let mut path = Vec::new();
    let mut page_num = ROOT_PAGE;

    while path.len() <= depth_limit {
        path.push(page_num);
        match read_node(handle, attr, page_num)? {
            Node::Leaf(_) => return Ok(path),
            Node::Internal(node) => page_num = node.children[node.child_index(key)],
        }
    }
    Err(IndexError::corruption(page_num, "descent does not reach a leaf"))
}

/// Leftmost leaf that may hold an entry equal to `key`
fn lower_leaf(handle: &mut FileHandle, attr: &Attribute, key: &Key) -> IndexResult<PageNum> {
    let depth_limit = handle.page_count()?;
    let mut page_num = ROOT_PAGE;

    for _ in 0..=depth_limit {
        match read_node(handle, attr, page_num)? {
            Node::Leaf(_) => return Ok(page_num),
            Node::Internal(node) => page_num = node.children[node.lower_child_index(key)],
        }
    }
    Err(IndexError::corruption(page_num, "descent does not reach a leaf"))
}

fn dump_subtree(
    handle: &mut FileHandle,
    attr: &Attribute,
    page_num: PageNum,
    depth_left: PageNum,
) -> IndexResult<TreeDump> {
    match read_node(handle, attr, page_num)? {
        Node::Leaf(leaf) => Ok(TreeDump::leaf(&leaf)),
        Node::Internal(node) => {
            let depth_left = depth_left
                .checked_sub(1)
                .ok_or_else(|| IndexError::corruption(page_num, "tree deeper than the file"))?;
            let children = node
                .children
                .iter()
                .map(|&child| dump_subtree(handle, attr, child, depth_left))
                .collect::<IndexResult<Vec<_>>>()?;
            Ok(TreeDump::internal(&node.keys, children))
        }
    }
}

pub(crate) fn read_node(
    handle: &mut FileHandle,
    attr: &Attribute,
    page_num: PageNum,
) -> IndexResult<Node> {
    let mut buffer = vec![0u8; PAGE_SIZE];
    handle.read_page(page_num, &mut buffer)?;
    deserialize_node(&buffer, attr.attr_type, page_num)
}

pub(crate) fn read_leaf(
    handle: &mut FileHandle,
    attr: &Attribute,
    page_num: PageNum,
) -> IndexResult<LeafNode> {
    match read_node(handle, attr, page_num)? {
        Node::Leaf(leaf) => Ok(leaf),
        Node::Internal(_) => Err(IndexError::corruption(page_num, "expected a leaf node")),
    }
}

fn read_internal(
    handle: &mut FileHandle,
    attr: &Attribute,
    page_num: PageNum,
) -> IndexResult<InternalNode> {
    match read_node(handle, attr, page_num)? {
        Node::Internal(node) => Ok(node),
        Node::Leaf(_) => Err(IndexError::corruption(page_num, "expected an internal node")),
    }
}

fn write_node(handle: &mut FileHandle, page_num: PageNum, node: &Node) -> IndexResult<()> {
    let buffer = serialize_node(node)?;
    handle.write_page(page_num, &buffer)?;
    Ok(())
}

fn append_node(handle: &mut FileHandle, node: &Node) -> IndexResult<PageNum> {
    let buffer = serialize_node(node)?;
    Ok(handle.append_page(&buffer)?)
}
