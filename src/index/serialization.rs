//! Serialization and deserialization for B+ tree nodes
//!
//! Every node page starts with a `u32` metadata word: the top bit marks a
//! leaf, the low 31 bits hold the end offset of the used bytes.
//!
//! Leaf: `[meta][prev i32][next i32]` then `(key, page u32, slot u32)` entries.
//! Internal: `[meta][child0 u32]` then `(key, child u32)` pairs.

use crate::file::{ByteReader, ByteWriter, PAGE_SIZE, PageNum};
use crate::record::{AttrType, RecordId, SlotNum};

use super::error::{IndexError, IndexResult};
use super::key::Key;
use super::node::{INTERNAL_HEADER_SIZE, InternalNode, LEAF_HEADER_SIZE, LeafNode, Node};

const LEAF_FLAG: u32 = 0x8000_0000;
const NO_SIBLING: i32 = -1;

fn sibling_to_disk(page: Option<PageNum>) -> i32 {
    page.map_or(NO_SIBLING, |p| p as i32)
}

fn sibling_from_disk(raw: i32, page_num: PageNum) -> IndexResult<Option<PageNum>> {
    match raw {
        NO_SIBLING => Ok(None),
        p if p >= 0 => Ok(Some(p as PageNum)),
        other => Err(IndexError::corruption(
            page_num,
            format!("invalid sibling pointer {}", other),
        )),
    }
}

/// Serialize a leaf node to a full page
pub fn serialize_leaf_node(node: &LeafNode) -> IndexResult<Vec<u8>> {
    let mut buf = vec![0u8; PAGE_SIZE];
    buf.put_i32(4, sibling_to_disk(node.prev))?;
    buf.put_i32(8, sibling_to_disk(node.next))?;

    let mut offset = LEAF_HEADER_SIZE;
    for (key, rid) in node.keys.iter().zip(&node.rids) {
        offset += key.write_at(&mut buf, offset)?;
        buf.put_u32(offset, rid.page_num)?;
        buf.put_u32(offset + 4, rid.slot_num as u32)?;
        offset += 8;
    }

    buf.put_u32(0, LEAF_FLAG | offset as u32)?;
    Ok(buf)
}

/// Serialize an internal node to a full page
pub fn serialize_internal_node(node: &InternalNode) -> IndexResult<Vec<u8>> {
    let mut buf = vec![0u8; PAGE_SIZE];
    let Some((&child0, rest)) = node.children.split_first() else {
        return Err(IndexError::corruption(0, "internal node without children"));
    };
    buf.put_u32(4, child0)?;

    let mut offset = INTERNAL_HEADER_SIZE;
    for (key, &child) in node.keys.iter().zip(rest) {
        offset += key.write_at(&mut buf, offset)?;
        buf.put_u32(offset, child)?;
        offset += 4;
    }

    buf.put_u32(0, offset as u32)?;
    Ok(buf)
}

/// Serialize a B+ tree node to bytes
pub fn serialize_node(node: &Node) -> IndexResult<Vec<u8>> {
    match node {
        Node::Internal(internal) => serialize_internal_node(internal),
        Node::Leaf(leaf) => serialize_leaf_node(leaf),
    }
}

/// Deserialize the node stored on `page_num`
pub fn deserialize_node(buf: &[u8], attr_type: AttrType, page_num: PageNum) -> IndexResult<Node> {
    let meta = buf.u32_at(0)?;
    let end = (meta & !LEAF_FLAG) as usize;
    let is_leaf = meta & LEAF_FLAG != 0;
    let header = if is_leaf {
        LEAF_HEADER_SIZE
    } else {
        INTERNAL_HEADER_SIZE
    };
    if end < header || end > PAGE_SIZE || end > buf.len() {
        return Err(IndexError::corruption(
            page_num,
            format!("used-bytes offset {} out of range", end),
        ));
    }

    let corrupt = |e: crate::file::FileError| IndexError::corruption(page_num, e.to_string());
    let mut offset = header;

    if is_leaf {
        let mut leaf = LeafNode {
            prev: sibling_from_disk(buf.i32_at(4)?, page_num)?,
            next: sibling_from_disk(buf.i32_at(8)?, page_num)?,
            ..LeafNode::default()
        };
        while offset < end {
            let (key, len) = Key::read_at(attr_type, &buf[..end], offset).map_err(corrupt)?;
            offset += len;
            let page = buf[..end].u32_at(offset).map_err(corrupt)?;
            let slot = buf[..end].u32_at(offset + 4).map_err(corrupt)?;
            offset += 8;
            let slot = SlotNum::try_from(slot).map_err(|_| {
                IndexError::corruption(page_num, format!("slot number {} out of range", slot))
            })?;
            leaf.keys.push(key);
            leaf.rids.push(RecordId::new(page, slot));
        }
        Ok(Node::Leaf(leaf))
    } else {
        let mut node = InternalNode::new(buf.u32_at(4)?);
        while offset < end {
            let (key, len) = Key::read_at(attr_type, &buf[..end], offset).map_err(corrupt)?;
            offset += len;
            let child = buf[..end].u32_at(offset).map_err(corrupt)?;
            offset += 4;
            node.keys.push(key);
            node.children.push(child);
        }
        Ok(Node::Internal(node))
    }
}
