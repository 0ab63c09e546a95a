//! Synthetic HFS Plus images for end-to-end tests.
//!
//! Every volume uses 512-byte allocation blocks and 512-byte B-tree nodes:
//!
//! - blocks 8..16: Extents Overflow file
//! - blocks 16..24: Catalog file
//! - blocks 40..42: overflow catalog extent, when requested

#![allow(dead_code)]

use hfsutil::mounts::{MountEntry, MountTable, Unsupported};
use hfsutil::{Config, Host};
use std::io::Write;
use tempfile::NamedTempFile;

pub const BLOCK: usize = 512;
pub const NODE: usize = 512;
pub const VOLUME_BLOCKS: usize = 64;

const EXTENTS_START: u32 = 8;
const CATALOG_START: u32 = 16;
const OVERFLOW_START: u32 = 40;

/// Offset of the embedded volume in [`wrapped_image`].
pub const WRAPPED_OFFSET: usize = 12 * BLOCK + 4 * BLOCK;

const LEAF: u8 = 0xFF;
const HEADER: u8 = 1;

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn node(kind: u8, flink: u32, records: &[Vec<u8>]) -> Vec<u8> {
    let mut node = vec![0u8; NODE];
    put_u32(&mut node, 0, flink);
    node[8] = kind;
    put_u16(&mut node, 10, records.len() as u16);

    let mut offset = 14;
    for (i, record) in records.iter().enumerate() {
        put_u16(&mut node, NODE - 2 * (i + 1), offset as u16);
        node[offset..offset + record.len()].copy_from_slice(record);
        offset += record.len();
    }
    put_u16(&mut node, NODE - 2 * (records.len() + 1), offset as u16);
    node
}

fn header_node(leaf_records: u32, first_leaf: u32, total_nodes: u32) -> Vec<u8> {
    let mut header = vec![0u8; 106];
    put_u16(&mut header, 0, if leaf_records > 0 { 1 } else { 0 });
    put_u32(&mut header, 2, first_leaf);
    put_u32(&mut header, 6, leaf_records);
    put_u32(&mut header, 10, first_leaf);
    put_u32(&mut header, 14, first_leaf);
    put_u16(&mut header, 18, NODE as u16);
    put_u16(&mut header, 20, 516);
    put_u32(&mut header, 22, total_nodes);
    node(HEADER, 0, &[header])
}

fn root_folder_record(name: &str) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut record = Vec::new();
    record.extend((6 + 2 * units.len() as u16).to_be_bytes());
    record.extend(1u32.to_be_bytes());
    record.extend((units.len() as u16).to_be_bytes());
    for unit in units {
        record.extend(unit.to_be_bytes());
    }
    // kHFSPlusFolderRecord, folder ID 2, rest of the 88-byte record zeroed.
    let mut folder = vec![0u8; 88];
    put_u16(&mut folder, 0, 1);
    put_u32(&mut folder, 8, 2);
    record.extend(folder);
    record
}

fn catalog_overflow_record(start_block: u32, first: (u32, u32)) -> Vec<u8> {
    let mut record = vec![0u8; 12 + 64];
    put_u16(&mut record, 0, 10);
    put_u32(&mut record, 4, 4);
    put_u32(&mut record, 8, start_block);
    put_u32(&mut record, 12, first.0);
    put_u32(&mut record, 16, first.1);
    record
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Catalog fits in one inline extent.
    Inline,
    /// All eight inline catalog extents are used and the first leaf lives in
    /// an extent recorded in the Extents Overflow file.
    Overflow,
    /// Catalog with a header node but no leaf records.
    EmptyCatalog,
}

/// A bare HFS Plus volume of [`VOLUME_BLOCKS`] blocks.
pub fn hfs_plus_volume(name: &str, signature: &[u8; 2], layout: Layout) -> Vec<u8> {
    let mut volume = vec![0u8; VOLUME_BLOCKS * BLOCK];

    let header = &mut volume[1024..1536];
    header[0..2].copy_from_slice(signature);
    put_u16(header, 2, if signature == b"HX" { 5 } else { 4 });
    put_u32(header, 40, BLOCK as u32);
    put_u32(header, 44, VOLUME_BLOCKS as u32);

    // Extents Overflow fork.
    put_u32(header, 192 + 12, 8);
    put_u32(header, 192 + 16, EXTENTS_START);
    put_u32(header, 192 + 20, 8);

    // Catalog fork.
    match layout {
        Layout::Inline | Layout::EmptyCatalog => {
            put_u32(header, 272 + 12, 8);
            put_u32(header, 272 + 16, CATALOG_START);
            put_u32(header, 272 + 20, 8);
        }
        Layout::Overflow => {
            put_u32(header, 272 + 12, 10);
            for slot in 0..8 {
                let at = 272 + 16 + 8 * slot;
                put_u32(header, at, CATALOG_START + slot as u32);
                put_u32(header, at + 4, 1);
            }
        }
    }

    let mut place = |block: u32, node: Vec<u8>| {
        let at = block as usize * BLOCK;
        volume[at..at + NODE].copy_from_slice(&node);
    };

    match layout {
        Layout::Inline => {
            place(EXTENTS_START, header_node(0, 0, 8));
            place(CATALOG_START, header_node(1, 1, 8));
            place(CATALOG_START + 1, node(LEAF, 0, &[root_folder_record(name)]));
        }
        Layout::EmptyCatalog => {
            place(EXTENTS_START, header_node(0, 0, 8));
            place(CATALOG_START, header_node(0, 0, 8));
        }
        Layout::Overflow => {
            place(EXTENTS_START, header_node(1, 1, 8));
            place(
                EXTENTS_START + 1,
                node(LEAF, 0, &[catalog_overflow_record(8, (OVERFLOW_START, 2))]),
            );
            place(CATALOG_START, header_node(1, 9, 10));
            place(OVERFLOW_START + 1, node(LEAF, 0, &[root_folder_record(name)]));
        }
    }

    volume
}

/// An HFS wrapper whose embedded HFS Plus volume starts at
/// [`WRAPPED_OFFSET`].
pub fn wrapped_image(name: &str) -> Vec<u8> {
    let mut image = vec![0u8; WRAPPED_OFFSET];
    {
        let mdb = &mut image[1024..1536];
        mdb[0..2].copy_from_slice(b"BD");
        put_u32(mdb, 20, BLOCK as u32);
        put_u16(mdb, 28, 4);
        mdb[124..126].copy_from_slice(b"H+");
        put_u16(mdb, 126, 12);
        put_u16(mdb, 128, VOLUME_BLOCKS as u16);
    }
    image.extend(hfs_plus_volume(name, b"H+", Layout::Inline));
    image
}

/// A classic HFS volume without an embedded HFS Plus volume.
pub fn plain_hfs_image() -> Vec<u8> {
    let mut image = vec![0u8; VOLUME_BLOCKS * BLOCK];
    image[1024..1026].copy_from_slice(b"BD");
    put_u32(&mut image, 1024 + 20, BLOCK as u32);
    image
}

pub fn write_image(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create image");
    file.write_all(bytes).expect("write image");
    file.flush().expect("flush image");
    file
}

pub fn path_arg(file: &NamedTempFile) -> String {
    file.path().to_str().expect("utf-8 temp path").to_string()
}

pub struct NothingMounted;

impl MountTable for NothingMounted {
    fn entries(&self) -> hfsutil::Result<Vec<MountEntry>> {
        Ok(Vec::new())
    }
}

pub fn with_host<T>(f: impl FnOnce(&Host) -> T) -> T {
    let config = Config::default();
    let host = Host {
        config: &config,
        mounts: &NothingMounted,
        attributes: &Unsupported,
    };
    f(&host)
}
