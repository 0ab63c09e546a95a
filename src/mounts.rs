//! Deciding whether a device is mounted, and reaching mounted volumes.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::LegacyUuid;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

pub trait MountTable {
    fn entries(&self) -> Result<Vec<MountEntry>>;
}

/// The kernel's mount table in `/proc/self/mounts` format.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    path: PathBuf,
}

impl ProcMounts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.mount_table)
    }
}

impl MountTable for ProcMounts {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_mounts(&text))
    }
}

/// Undoes the `\ooo` octal escapes used for spaces, tabs and backslashes.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(value) = bytes.get(i + 1..i + 4).and_then(octal_byte) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    let value = digits.iter().try_fold(0u16, |acc, &d| match d {
        b'0'..=b'7' => Some(acc * 8 + (d - b'0') as u16),
        _ => None,
    })?;
    u8::try_from(value).ok()
}

/// Parses mount table text; malformed lines are skipped.
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                source: PathBuf::from(unescape(source)),
                mount_point: PathBuf::from(unescape(mount_point)),
                fs_type: unescape(fs_type),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    /// Mounted as HFS at the given path.
    Hfs(PathBuf),
}

/// Follows symlinks such as `/dev/disk/by-label/...` to the device node.
/// Paths that cannot be resolved are compared as written.
fn resolve(path: &Path) -> PathBuf {
    if !path.is_absolute() {
        return path.to_path_buf();
    }
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Looks `device` up in the mount table.
///
/// A device mounted with a non-HFS filesystem is unrecognized.
pub fn mount_state(table: &dyn MountTable, device: &Path, config: &Config) -> Result<MountState> {
    let entries = table.entries()?;
    let target = resolve(device);
    let Some(entry) = entries
        .iter()
        .find(|e| e.source == device || resolve(&e.source) == target)
    else {
        return Ok(MountState::Unmounted);
    };

    if !config.is_hfs_fs_type(&entry.fs_type) {
        return Err(Error::Unrecognized(format!(
            "{} is mounted as {}",
            device.display(),
            entry.fs_type
        )));
    }
    debug!(
        "{} is mounted at {}",
        device.display(),
        entry.mount_point.display()
    );
    Ok(MountState::Hfs(entry.mount_point.clone()))
}

/// Attribute access for mounted volumes, provided by the host platform.
pub trait VolumeAttributes {
    fn volume_name(&self, mount_point: &Path) -> Result<String>;

    /// The legacy UUID stored in the volume's finder info.
    fn finder_uuid(&self, mount_point: &Path) -> Result<LegacyUuid>;

    /// The full UUID the filesystem reports for the volume.
    fn volume_uuid(&self, mount_point: &Path) -> Result<Uuid>;

    fn set_finder_uuid(&self, mount_point: &Path, uuid: LegacyUuid) -> Result<()>;
}

/// Used where the platform offers no attribute interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl Unsupported {
    fn fail<T>(what: &str, mount_point: &Path) -> Result<T> {
        Err(Error::Unsupported(format!(
            "{what} of mounted volume {}",
            mount_point.display()
        )))
    }
}

impl VolumeAttributes for Unsupported {
    fn volume_name(&self, mount_point: &Path) -> Result<String> {
        Self::fail("name", mount_point)
    }

    fn finder_uuid(&self, mount_point: &Path) -> Result<LegacyUuid> {
        Self::fail("finder info", mount_point)
    }

    fn volume_uuid(&self, mount_point: &Path) -> Result<Uuid> {
        Self::fail("UUID", mount_point)
    }

    fn set_finder_uuid(&self, mount_point: &Path, _uuid: LegacyUuid) -> Result<()> {
        Self::fail("setting finder info", mount_point)
    }
}

/// Full UUID of a mounted volume. An unset legacy UUID gives the nil UUID
/// whatever the filesystem reports.
pub fn mounted_volume_uuid(attributes: &dyn VolumeAttributes, mount_point: &Path) -> Result<Uuid> {
    if attributes.finder_uuid(mount_point)?.is_unset() {
        return Ok(Uuid::nil());
    }
    attributes.volume_uuid(mount_point)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb2 /media/Mac\\040HD hfsplus rw,nosuid 0 0
/dev/sdc1 /mnt/old hfs ro 0 0
broken-line
";

    struct Fixed(Vec<MountEntry>);

    impl MountTable for Fixed {
        fn entries(&self) -> Result<Vec<MountEntry>> {
            Ok(self.0.clone())
        }
    }

    struct Unreadable;

    impl MountTable for Unreadable {
        fn entries(&self) -> Result<Vec<MountEntry>> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into())
        }
    }

    #[test]
    fn parses_proc_mounts() {
        let entries = parse_mounts(TABLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[2],
            MountEntry {
                source: PathBuf::from("/dev/sdb2"),
                mount_point: PathBuf::from("/media/Mac HD"),
                fs_type: "hfsplus".to_string(),
            }
        );
    }

    #[test]
    fn octal_escapes() {
        assert_eq!(unescape("a\\040b\\011c\\134d"), "a b\tc\\d");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
        assert_eq!(unescape("not\\9999octal"), "not\\9999octal");
    }

    #[test]
    fn classifies_devices() {
        let table = Fixed(parse_mounts(TABLE));
        let config = Config::default();

        assert_eq!(
            mount_state(&table, Path::new("/dev/sdb2"), &config).unwrap(),
            MountState::Hfs(PathBuf::from("/media/Mac HD"))
        );
        assert_eq!(
            mount_state(&table, Path::new("/dev/sdc1"), &config).unwrap(),
            MountState::Hfs(PathBuf::from("/mnt/old"))
        );
        assert_eq!(
            mount_state(&table, Path::new("/dev/sdz9"), &config).unwrap(),
            MountState::Unmounted
        );
        assert!(matches!(
            mount_state(&table, Path::new("/dev/sda1"), &config),
            Err(Error::Unrecognized(_))
        ));
        assert!(matches!(
            mount_state(&Unreadable, Path::new("/dev/sda1"), &config),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn symlinked_device_is_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("disk.img");
        fs::write(&device, [0u8; 16]).unwrap();
        let link = dir.path().join("by-label-Mac");
        std::os::unix::fs::symlink(&device, &link).unwrap();

        let table = Fixed(vec![MountEntry {
            source: device.clone(),
            mount_point: PathBuf::from("/media/Mac"),
            fs_type: "hfsplus".to_string(),
        }]);
        let config = Config::default();
        assert_eq!(
            mount_state(&table, &link, &config).unwrap(),
            MountState::Hfs(PathBuf::from("/media/Mac"))
        );

        // And the other way round: the table names the link.
        let table = Fixed(vec![MountEntry {
            source: link,
            mount_point: PathBuf::from("/media/Mac"),
            fs_type: "hfs".to_string(),
        }]);
        assert_eq!(
            mount_state(&table, &device, &config).unwrap(),
            MountState::Hfs(PathBuf::from("/media/Mac"))
        );
    }

    #[test]
    fn reads_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mounts");
        fs::write(&path, TABLE).unwrap();
        let entries = ProcMounts::new(&path).entries().unwrap();
        assert_eq!(entries.len(), 4);

        assert!(ProcMounts::new(dir.path().join("missing")).entries().is_err());
    }

    struct Mounted {
        legacy: LegacyUuid,
    }

    impl VolumeAttributes for Mounted {
        fn volume_name(&self, _mount_point: &Path) -> Result<String> {
            Ok("Mounted".to_string())
        }

        fn finder_uuid(&self, _mount_point: &Path) -> Result<LegacyUuid> {
            Ok(self.legacy)
        }

        fn volume_uuid(&self, _mount_point: &Path) -> Result<Uuid> {
            Ok(self.legacy.to_full_uuid())
        }

        fn set_finder_uuid(&self, _mount_point: &Path, _uuid: LegacyUuid) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn mounted_uuid() {
        let path = Path::new("/mnt");
        let unset = Mounted {
            legacy: LegacyUuid::new(0, 9),
        };
        assert!(mounted_volume_uuid(&unset, path).unwrap().is_nil());

        let set = Mounted {
            legacy: LegacyUuid::new(0x12345678, 0x9ABCDEF0),
        };
        assert_eq!(
            mounted_volume_uuid(&set, path).unwrap(),
            LegacyUuid::new(0x12345678, 0x9ABCDEF0).to_full_uuid()
        );

        assert!(matches!(
            mounted_volume_uuid(&Unsupported, path),
            Err(Error::Unsupported(_))
        ));
    }
}
