//! Catalog extents that did not fit in the volume header.
//!
//! When the eighth inline catalog extent is in use, later extents are kept in
//! the Extents Overflow B-tree under the catalog's file ID. Those records
//! sort first among the leaves we care about, so the walk stops at the first
//! record belonging to any other file.

use crate::btree::{Node, read_btree_info};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::extents::{ExtentList, SpecialFile};
use deku::prelude::*;
use hfs_types::{CATALOG_FILE_ID, ExtentDataRecord, ExtentKey, VolumeHeader};
use log::debug;
use std::collections::HashSet;
use std::io::{Read, Seek};

/// Splits an Extents Overflow leaf record into its key and extent record.
fn parse_extent_record(record: &[u8]) -> Result<(ExtentKey, ExtentDataRecord)> {
    let (_rest, key) = ExtentKey::from_bytes((record, 0))?;
    let data_start = 2 + key.key_length as usize;
    let data = record
        .get(data_start..data_start + ExtentDataRecord::SIZE)
        .ok_or_else(|| {
            Error::Corrupt(format!(
                "extent record of {} bytes with key length {}",
                record.len(),
                key.key_length
            ))
        })?;
    let (_rest, extents) = ExtentDataRecord::from_bytes((data, 0))?;
    Ok((key, extents))
}

/// Returns the complete catalog extent list for the volume at
/// `volume_offset`.
pub fn resolve_catalog_extents<F: Read + Seek>(
    device: &mut Device<F>,
    volume_offset: u64,
    header: &VolumeHeader,
) -> Result<ExtentList> {
    let mut catalog = ExtentList::from_inline(header.catalog_file.extents);
    if !header.catalog_file.inline_extents_full() {
        return Ok(catalog);
    }

    let extents_file = SpecialFile {
        volume_offset,
        block_size: header.block_size,
        extents: ExtentList::from_inline(header.extents_file.extents),
    };

    let info = read_btree_info(device, &extents_file)?;
    let mut node_number = info.first_leaf_node;
    if node_number == 0 {
        debug!("extents overflow file is empty");
        return Ok(catalog);
    }

    let mut visited = HashSet::new();
    while node_number != 0 {
        if !visited.insert(node_number) {
            return Err(Error::Corrupt(format!(
                "extents overflow leaf chain loops at node {node_number}"
            )));
        }

        let node = Node::read(device, &extents_file, node_number, info.node_size)?;
        if !node.descriptor.is_leaf() {
            return Err(Error::Unrecognized(format!(
                "extents overflow node {node_number} is not a leaf"
            )));
        }

        for record in node.records()? {
            let (key, data) = parse_extent_record(record)?;
            if key.file_id != CATALOG_FILE_ID {
                debug!(
                    "catalog has {} overflow extent records",
                    catalog.overflow_records()
                );
                return Ok(catalog);
            }
            catalog.push_record(data.extents);
        }

        node_number = node.forward_link();
    }

    Ok(catalog)
}
