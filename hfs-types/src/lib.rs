//! On-disk structures from Apple's [TN1150 - HFS Plus Volume Format](https://developer.apple.com/library/archive/technotes/tn/tn1150.html)
//! and the classic HFS Master Directory Block, with Rust-friendly naming.
//!
//! Everything on disk is big-endian. Structures are decoded into native
//! integers with [`DekuContainerRead::from_bytes`] and encoded back with
//! [`DekuContainerWrite::to_bytes`]; raw memory is never reinterpreted.

#![forbid(unsafe_code)]

use deku::ctx::Endian;
use deku::prelude::*;

/// Classic HFS signature, `kHFSSigWord`.
pub const HFS_SIG_WORD: u16 = u16::from_be_bytes(*b"BD");
/// HFS Plus signature, `kHFSPlusSigWord`.
pub const HFS_PLUS_SIG_WORD: u16 = u16::from_be_bytes(*b"H+");
/// Case-sensitive HFS Plus signature, `kHFSXSigWord`.
pub const HFSX_SIG_WORD: u16 = u16::from_be_bytes(*b"HX");

/// Sector size used by every fixed HFS offset, independent of the device.
pub const HFS_BLOCK_SIZE: u64 = 512;

/// Both the MDB and the Volume Header live in sector 2 of their volume.
pub const VOLUME_HEADER_OFFSET: u64 = 2 * HFS_BLOCK_SIZE;

/// Size of the sector holding the MDB or Volume Header.
pub const VOLUME_HEADER_SIZE: usize = 512;

/// Extent descriptors per extent record, `kHFSPlusExtentDensity`.
pub const EXTENT_DENSITY: usize = 8;

/// Maximum number of UTF-16 units in an `HFSUniStr255`.
pub const MAX_NAME_LENGTH: usize = 255;

/// Catalog Node ID.
///
/// Described in TN1150 [Catalog File](https://developer.apple.com/library/archive/technotes/tn/tn1150.html#CatalogFile)
pub type CatalogNodeId = u32;

/// Parent of the root folder; the root folder's own record is keyed by it.
pub const ROOT_PARENT_ID: CatalogNodeId = 1;
pub const ROOT_FOLDER_ID: CatalogNodeId = 2;
pub const EXTENTS_FILE_ID: CatalogNodeId = 3;
pub const CATALOG_FILE_ID: CatalogNodeId = 4;

/// Extent information. Defined as `struct HFSPlusExtentDescriptor` in
/// TN1150 > Fork Data Structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
pub struct ExtentDescriptor {
    pub start_block: u32,
    pub block_count: u32,
}

impl ExtentDescriptor {
    pub const SIZE: usize = 8;

    pub const fn new(start_block: u32, block_count: u32) -> Self {
        Self {
            start_block,
            block_count,
        }
    }

    /// Unused descriptors are zeroed.
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// A file's extent record is 8 Extent Descriptors.
pub type ExtentRecord = [ExtentDescriptor; EXTENT_DENSITY];

/// Resource and Data Fork contents. Defined as `struct HFSPlusForkData` in
/// TN1150 > Fork Data Structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
pub struct ForkData {
    pub logical_size: u64,
    pub clump_size: u32,
    pub total_blocks: u32,

    pub extents: ExtentRecord,
}

impl ForkData {
    /// The inline record is full when its last slot is in use, meaning the
    /// remaining extents live in the Extents Overflow file.
    pub fn inline_extents_full(&self) -> bool {
        !self.extents[EXTENT_DENSITY - 1].is_empty()
    }
}

/// Volume Header, stored at 1024 bytes from start, and secondary header at 512
/// bytes from the end. Defined as `struct HFSPlusVolumeHeader` in
/// TN1150 > Volume Header.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct VolumeHeader {
    pub signature: u16,
    pub version: u16,
    pub attributes: u32,
    pub last_mounted_version: u32,
    pub journal_info_block: u32,

    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub checked_date: u32,

    pub file_count: u32,
    pub folder_count: u32,

    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,

    pub next_allocation: u32,
    pub rsrc_clump_size: u32,
    pub data_clump_size: u32,
    pub next_catalog_id: CatalogNodeId,

    pub write_count: u32,
    pub encodings_bitmap: u64,

    /// Words 6 and 7 hold the volume's legacy 64-bit UUID.
    pub finder_info: [u32; 8],

    pub allocation_file: ForkData,
    pub extents_file: ForkData,
    pub catalog_file: ForkData,
    pub attributes_file: ForkData,
    pub startup_file: ForkData,
}

impl VolumeHeader {
    pub const SIZE: usize = 512;

    pub fn is_hfs_plus(&self) -> bool {
        self.signature == HFS_PLUS_SIG_WORD || self.signature == HFSX_SIG_WORD
    }
}

/// Classic HFS extent descriptor, `struct HFSExtentDescriptor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
pub struct HfsExtentDescriptor {
    pub start_block: u16,
    pub block_count: u16,
}

/// Classic HFS Master Directory Block, `struct HFSMasterDirectoryBlock` in
/// Inside Macintosh: Files. Occupies the first 162 bytes of sector 2.
///
/// A wrapper volume carries an embedded HFS Plus volume described by
/// `embed_signature` and `embed_extent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct MasterDirectoryBlock {
    pub signature: u16,
    pub create_date: u32,
    pub modify_date: u32,
    pub attributes: u16,
    pub root_file_count: u16,
    pub bitmap_start: u16,
    pub allocation_ptr: u16,
    pub allocation_block_count: u16,
    pub allocation_block_size: u32,
    pub clump_size: u32,
    /// First allocation block, in 512-byte sectors.
    pub first_allocation_block: u16,
    pub next_catalog_id: u32,
    pub free_blocks: u16,
    /// Pascal string, length byte first.
    pub volume_name: [u8; 28],
    pub backup_date: u32,
    pub backup_sequence: u16,
    pub write_count: u32,
    pub extents_clump_size: u32,
    pub catalog_clump_size: u32,
    pub root_dir_count: u16,
    pub file_count: u32,
    pub dir_count: u32,
    /// Words 6 and 7 hold the volume's legacy 64-bit UUID.
    pub finder_info: [u32; 8],
    pub embed_signature: u16,
    pub embed_extent: HfsExtentDescriptor,
    pub extents_file_size: u32,
    pub extents_file_record: [HfsExtentDescriptor; 3],
    pub catalog_file_size: u32,
    pub catalog_file_record: [HfsExtentDescriptor; 3],
}

impl MasterDirectoryBlock {
    pub const SIZE: usize = 162;

    pub fn is_wrapper(&self) -> bool {
        self.signature == HFS_SIG_WORD && self.embed_signature == HFS_PLUS_SIG_WORD
    }
}

/// Known values for [`BTreeNodeDescriptor::kind`].
/// Defined in docs for `struct BTNodeDescriptor` in TN1150 > Node Structure.
pub mod node_kind {
    pub const LEAF: i8 = -1;
    pub const INDEX: i8 = 0;
    pub const HEADER: i8 = 1;
    pub const MAP: i8 = 2;
}

/// BTree Node Descriptor.
/// Defined as `struct BTNodeDescriptor` in TN1150 > Node Structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct BTreeNodeDescriptor {
    pub forward_link: u32,
    pub backward_link: u32,
    pub kind: i8,
    pub height: u8,
    pub num_records: u16,
    pub reserved: u16,
}

impl BTreeNodeDescriptor {
    pub const SIZE: usize = 14;

    pub fn is_leaf(&self) -> bool {
        self.kind == node_kind::LEAF
    }

    pub fn is_header(&self) -> bool {
        self.kind == node_kind::HEADER
    }
}

/// BTree Header describing upcoming BTree Structure. First record of node 0.
/// Defined as `struct BTHeaderRec` in TN1150 > Header Record.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct BTreeHeaderRecord {
    pub tree_depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub reserved_1: u16,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
    pub reserved_3: [u32; 16],
}

impl BTreeHeaderRecord {
    pub const SIZE: usize = 106;
}

/// Defined as `struct HFSPlusExtentKey` in TN1150 > Extents Overflow File
/// Key.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct ExtentKey {
    pub key_length: u16,
    /// 0x00 for the data fork, 0xFF for the resource fork.
    pub fork_type: u8,
    pub pad: u8,
    pub file_id: CatalogNodeId,
    pub start_block: u32,
}

impl ExtentKey {
    pub const SIZE: usize = 12;
}

/// Payload of an Extents Overflow leaf record.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct ExtentDataRecord {
    pub extents: ExtentRecord,
}

impl ExtentDataRecord {
    pub const SIZE: usize = EXTENT_DENSITY * ExtentDescriptor::SIZE;
}

/// Unicode 2.0 String. Defined in TN1150 > HFS Plus Names.
/// Strings are stored fully-decomposed in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "endian", ctx = "endian: Endian")]
pub struct HfsUniStr255 {
    pub length: u16,
    #[deku(count = "length")]
    pub unicode: Vec<u16>,
}

impl From<&HfsUniStr255> for String {
    fn from(name: &HfsUniStr255) -> Self {
        String::from_utf16_lossy(&name.unicode)
    }
}

/// Catalog File key. Defined as `struct HFSPlusCatalogKey` in
/// TN1150 > Catalog File Key.
#[derive(Debug, Clone, Default, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct CatalogKey {
    pub key_length: u16,
    pub parent_id: CatalogNodeId,
    pub node_name: HfsUniStr255,
}
