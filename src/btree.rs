//! Just enough B-tree to find the first leaf and walk leaves forward.
//!
//! Node layout, from TN1150 > B-Trees:
//!
//! ```text
//! +-----------------+----------+-----+----------+------------+----------------------+
//! | node descriptor | record 0 | ... | record n | free space | offsets n+1, n .. 0  |
//! +-----------------+----------+-----+----------+------------+----------------------+
//! ```
//!
//! The offset trailer grows backwards from the end of the node, and its last
//! entry (`n + 1`) points at the free space.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::extents::SpecialFile;
use deku::prelude::*;
use hfs_types::{BTreeHeaderRecord, BTreeNodeDescriptor, HFS_BLOCK_SIZE};
use itertools::Itertools;
use log::debug;
use std::io::{Read, Seek};

/// What the name resolver needs from a tree's header node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeInfo {
    pub node_size: u16,
    /// Zero when the tree holds no leaf records.
    pub first_leaf_node: u32,
}

/// Reads the header node of the tree stored in `file`.
///
/// Only the first 512 bytes of node 0 are read; the header record fits in
/// them regardless of the node size.
pub fn read_btree_info<F: Read + Seek>(
    device: &mut Device<F>,
    file: &SpecialFile,
) -> Result<BTreeInfo> {
    let mut buf = [0u8; HFS_BLOCK_SIZE as usize];
    file.read_at(device, &mut buf, 0)?;

    let (_rest, descriptor) = BTreeNodeDescriptor::from_bytes((&buf, 0))?;
    if !descriptor.is_header() {
        return Err(Error::Unrecognized(format!(
            "node 0 has kind {}, expected header",
            descriptor.kind
        )));
    }

    let header_bytes = &buf[BTreeNodeDescriptor::SIZE..];
    let (_rest, header) = BTreeHeaderRecord::from_bytes((header_bytes, 0))?;
    let first_leaf_node = if header.leaf_records == 0 {
        0
    } else {
        header.first_leaf_node
    };
    debug!(
        "btree node size {}, {} leaf records, first leaf {first_leaf_node}",
        header.node_size, header.leaf_records
    );

    Ok(BTreeInfo {
        node_size: header.node_size,
        first_leaf_node,
    })
}

/// One B-tree node held in memory.
#[derive(Debug, Clone)]
pub struct Node {
    pub number: u32,
    pub descriptor: BTreeNodeDescriptor,
    bytes: Vec<u8>,
}

impl Node {
    /// Reads node `number` of the tree stored in `file`.
    pub fn read<F: Read + Seek>(
        device: &mut Device<F>,
        file: &SpecialFile,
        number: u32,
        node_size: u16,
    ) -> Result<Self> {
        if (node_size as usize) < BTreeNodeDescriptor::SIZE {
            return Err(Error::Corrupt(format!("node size {node_size}")));
        }
        let mut bytes = vec![0u8; node_size as usize];
        file.read_at(device, &mut bytes, number as u64 * node_size as u64)?;
        Self::parse(number, bytes)
    }

    pub fn parse(number: u32, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < BTreeNodeDescriptor::SIZE {
            return Err(Error::Corrupt(format!(
                "node {number} is only {} bytes",
                bytes.len()
            )));
        }
        let (_rest, descriptor) = BTreeNodeDescriptor::from_bytes((&bytes, 0))?;
        Ok(Self {
            number,
            descriptor,
            bytes,
        })
    }

    pub fn num_records(&self) -> usize {
        self.descriptor.num_records as usize
    }

    pub fn forward_link(&self) -> u32 {
        self.descriptor.forward_link
    }

    /// The offset trailer in record order, free space offset last.
    fn offsets(&self) -> Result<Vec<u16>> {
        let count = self.num_records() + 1;
        let trailer = 2 * count;
        let node_size = self.bytes.len();
        if BTreeNodeDescriptor::SIZE + trailer > node_size {
            return Err(Error::Corrupt(format!(
                "node {} claims {} records",
                self.number,
                self.num_records()
            )));
        }

        let mut offsets: Vec<u16> = self.bytes[node_size - trailer..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        offsets.reverse();
        Ok(offsets)
    }

    /// Every record's bytes, checked against the node bounds.
    pub fn records(&self) -> Result<Vec<&[u8]>> {
        let offsets = self.offsets()?;
        let limit = self.bytes.len() - 2 * offsets.len();

        let mut records = Vec::with_capacity(offsets.len() - 1);
        for (start, end) in offsets.into_iter().tuple_windows() {
            let (start, end) = (start as usize, end as usize);
            if start < BTreeNodeDescriptor::SIZE || start > end || end > limit {
                return Err(Error::Corrupt(format!(
                    "node {} record spans {start}..{end}",
                    self.number
                )));
            }
            records.push(&self.bytes[start..end]);
        }
        Ok(records)
    }

    pub fn record(&self, index: usize) -> Result<&[u8]> {
        self.records()?.get(index).copied().ok_or_else(|| {
            Error::Corrupt(format!("node {} has no record {index}", self.number))
        })
    }
}

/// Builds a node of `size` bytes holding `records` back to back.
#[cfg(test)]
pub(crate) fn build_node(size: usize, kind: i8, flink: u32, records: &[&[u8]]) -> Vec<u8> {
    let mut node = vec![0u8; size];
    node[0..4].copy_from_slice(&flink.to_be_bytes());
    node[8] = kind as u8;
    node[10..12].copy_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = BTreeNodeDescriptor::SIZE;
    for (i, record) in records.iter().enumerate() {
        let slot = size - 2 * (i + 1);
        node[slot..slot + 2].copy_from_slice(&(offset as u16).to_be_bytes());
        node[offset..offset + record.len()].copy_from_slice(record);
        offset += record.len();
    }
    let free_space = size - 2 * (records.len() + 1);
    node[free_space..free_space + 2].copy_from_slice(&(offset as u16).to_be_bytes());
    node
}
