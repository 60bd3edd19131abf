use crate::file::{FileHandle, PageNum};
use crate::record::{Attribute, RecordId};

use super::error::{IndexError, IndexResult};
use super::key::Key;
use super::node::{LeafNode, Node};
use super::{ROOT_PAGE, read_leaf, read_node};

/// One end of a key range
#[derive(Debug, Clone)]
struct Bound {
    key: Key,
    inclusive: bool,
}

/// Lazy range scan over the leaf chain yielding `(rid, key buffer)`
///
/// Entries come out in ascending key order. The scan stops at the first
/// key past the high bound or at the end of the chain.
pub struct IndexScan<'a> {
    handle: &'a mut FileHandle,
    attr: Attribute,
    low: Option<Bound>,
    high: Option<Bound>,
    next_page: Option<PageNum>,
    leaf: Option<LeafNode>,
    pos: usize,
    leaves_seen: u64,
    done: bool,
}

impl<'a> IndexScan<'a> {
    pub(crate) fn new(
        handle: &'a mut FileHandle,
        attr: &Attribute,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> IndexResult<Self> {
        let low = low
            .map(|bytes| Key::from_key_bytes(attr, bytes))
            .transpose()?
            .map(|key| Bound {
                key,
                inclusive: low_inclusive,
            });
        let high = high
            .map(|bytes| Key::from_key_bytes(attr, bytes))
            .transpose()?
            .map(|key| Bound {
                key,
                inclusive: high_inclusive,
            });

        let start = first_leaf(handle, attr, low.as_ref().map(|b| &b.key))?;
        Ok(Self {
            handle,
            attr: attr.clone(),
            low,
            high,
            next_page: Some(start),
            leaf: None,
            pos: 0,
            leaves_seen: 0,
            done: false,
        })
    }

    fn below_low(&self, key: &Key) -> bool {
        match &self.low {
            Some(bound) if bound.inclusive => key < &bound.key,
            Some(bound) => key <= &bound.key,
            None => false,
        }
    }

    fn above_high(&self, key: &Key) -> bool {
        match &self.high {
            Some(bound) if bound.inclusive => key > &bound.key,
            Some(bound) => key >= &bound.key,
            None => false,
        }
    }

    fn advance(&mut self) -> IndexResult<Option<(RecordId, Vec<u8>)>> {
        loop {
            let Some(leaf) = &self.leaf else {
                let Some(page_num) = self.next_page else {
                    return Ok(None);
                };
                self.leaves_seen += 1;
                if self.leaves_seen > self.handle.page_count()? as u64 {
                    return Err(IndexError::corruption(page_num, "leaf chain loops"));
                }
                let leaf = read_leaf(self.handle, &self.attr, page_num)?;
                self.next_page = leaf.next;
                self.leaf = Some(leaf);
                self.pos = 0;
                continue;
            };

            let Some(key) = leaf.keys.get(self.pos) else {
                self.leaf = None;
                continue;
            };
            let rid = leaf.rids[self.pos];
            self.pos += 1;

            if self.below_low(key) {
                continue;
            }
            if self.above_high(key) {
                return Ok(None);
            }
            return Ok(Some((rid, key.to_key_bytes())));
        }
    }
}

impl Iterator for IndexScan<'_> {
    type Item = IndexResult<(RecordId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Leaf where a scan starts: leftmost, or the first that may hold `low`
fn first_leaf(handle: &mut FileHandle, attr: &Attribute, low: Option<&Key>) -> IndexResult<PageNum> {
    let depth_limit = handle.page_count()?;
    let mut page_num = ROOT_PAGE;
    for _ in 0..=depth_limit {
        match read_node(handle, attr, page_num)? {
            Node::Leaf(_) => return Ok(page_num),
            Node::Internal(node) => {
                let index = low.map_or(0, |key| node.lower_child_index(key));
                page_num = node.children[index];
            }
        }
    }
    Err(IndexError::corruption(page_num, "descent does not reach a leaf"))
}
