//! Reading the volume name from the Catalog B-tree without mounting.
//!
//! The root folder's thread-less folder record is keyed by the root parent
//! ID (1) with the volume name as its node name, so it sorts first in the
//! first leaf node.

use crate::btree::{Node, read_btree_info};
use crate::device::Device;
use crate::error::{ConfirmedFormat, Error, Result};
use crate::extents::SpecialFile;
use crate::overflow::resolve_catalog_extents;
use crate::volume::{locate_hfs_plus, read_volume_header};
use deku::prelude::*;
use hfs_types::{CatalogKey, MAX_NAME_LENGTH, ROOT_PARENT_ID, VolumeHeader};
use log::{debug, info};
use std::io::{Read, Seek};

/// Upper bound of a volume name once transcoded to UTF-8, terminator
/// included.
pub const MAX_VOLUME_NAME_BYTES: usize = 3 * MAX_NAME_LENGTH + 1;

/// Extracts the volume name from the first record of the first catalog leaf.
pub fn root_name(node: &Node) -> Result<String> {
    if node.num_records() < 1 {
        return Err(Error::Unrecognized(format!(
            "catalog leaf {} has no records",
            node.number
        )));
    }

    let record = node.record(0)?;
    let (_rest, key) = CatalogKey::from_bytes((record, 0)).map_err(|e| {
        Error::Unrecognized(format!(
            "first catalog key in a {} byte record: {e}",
            record.len()
        ))
    })?;
    if key.parent_id != ROOT_PARENT_ID {
        return Err(Error::Unrecognized(format!(
            "first catalog record has parent {}",
            key.parent_id
        )));
    }

    let length = key.node_name.length as usize;
    if length > MAX_NAME_LENGTH {
        return Err(Error::Unrecognized(format!("name length {length}")));
    }

    let name = String::from(&key.node_name);
    debug_assert!(name.len() < MAX_VOLUME_NAME_BYTES);
    Ok(name)
}

/// Resolves the name of the HFS Plus volume at `volume_offset`.
pub fn volume_name_at<F: Read + Seek>(
    device: &mut Device<F>,
    volume_offset: u64,
) -> Result<String> {
    let header = read_volume_header(device, volume_offset).confirmed()?;
    resolve_name(device, volume_offset, &header).confirmed()
}

fn resolve_name<F: Read + Seek>(
    device: &mut Device<F>,
    volume_offset: u64,
    header: &VolumeHeader,
) -> Result<String> {
    let extents = resolve_catalog_extents(device, volume_offset, header)?;
    let catalog = SpecialFile {
        volume_offset,
        block_size: header.block_size,
        extents,
    };

    let info = read_btree_info(device, &catalog)?;
    if info.first_leaf_node == 0 {
        return Err(Error::NotFound("catalog has no leaf records".to_string()));
    }
    debug!("first catalog leaf is node {}", info.first_leaf_node);

    let leaf = Node::read(device, &catalog, info.first_leaf_node, info.node_size)?;
    root_name(&leaf)
}

/// Finds the HFS Plus volume on `device` and returns its name.
///
/// A device that holds no HFS Plus volume is reported as unrecognized; any
/// problem after that point is a failure.
pub fn volume_name<F: Read + Seek>(device: &mut Device<F>) -> Result<String> {
    let volume_offset = locate_hfs_plus(device)?;
    let name = volume_name_at(device, volume_offset)?;
    info!("volume name {name:?}");
    Ok(name)
}
