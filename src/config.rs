//! Runtime configuration, passed by reference into every operation.

use std::path::PathBuf;

/// Block size assumed for regular files holding a disk image.
pub const DEFAULT_IMAGE_BLOCK_SIZE: u32 = 512;

/// Mount table consulted when deciding whether a device is in use.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/self/mounts";

/// Where `diskN` style arguments are resolved.
pub const DEFAULT_DEVICE_DIR: &str = "/dev";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Block size used for regular files, which have no device geometry.
    pub image_block_size: u32,

    pub mount_table: PathBuf,

    /// Filesystem type names that count as HFS in the mount table.
    pub hfs_fs_types: Vec<String>,

    pub device_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_block_size: DEFAULT_IMAGE_BLOCK_SIZE,
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            hfs_fs_types: vec!["hfs".to_string(), "hfsplus".to_string()],
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
        }
    }
}

impl Config {
    pub fn is_hfs_fs_type(&self, fs_type: &str) -> bool {
        self.hfs_fs_types.iter().any(|t| t == fs_type)
    }
}
