//! Entry points invoked by the disk arbitration daemon.
//!
//! Each operation owns its device handle for its whole duration; nothing is
//! shared between calls beyond the [`Host`] collaborators passed in.

use crate::catalog;
use crate::config::Config;
use crate::device::Device;
use crate::error::{ConfirmedFormat, Error, Result, Status};
use crate::identity::{LegacyUuid, format_uuid, generate_legacy_uuid};
use crate::mounts::{MountState, MountTable, VolumeAttributes, mount_state, mounted_volume_uuid};
use crate::volume::HeaderBlock;
use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix of daemon-supplied device names such as `disk0s2`.
const DISK_PREFIX: &str = "disk";

/// Prefix of an inherited descriptor, such as `/dev/fd/3`.
const DESCRIPTOR_PREFIX: &str = "/dev/fd/";

/// Longest descriptor number accepted after [`DESCRIPTOR_PREFIX`].
const MAX_DESCRIPTOR_DIGITS: usize = 10;

/// Volume status bit: honour on-disk ownership and permissions.
pub const VOLUME_USE_PERMISSIONS: u32 = 0x0000_0001;

/// Status bits preserved when updating an entry.
pub const VOLUME_VALID_STATUS_BITS: u32 = VOLUME_USE_PERMISSIONS;

/// The device argument, resolved to the paths an operation opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// `diskN...`: raw and block nodes under the device directory.
    Disk { raw: PathBuf, block: PathBuf },
    /// `/dev/fd/N`: an already-open descriptor, readable only.
    Descriptor(PathBuf),
    /// Any other absolute path: an image file or block device.
    Path(PathBuf),
}

impl DeviceSpec {
    pub fn parse(arg: &str, config: &Config) -> Result<Self> {
        if arg.starts_with(DISK_PREFIX) {
            return Ok(DeviceSpec::Disk {
                raw: config.device_dir.join(format!("r{arg}")),
                block: config.device_dir.join(arg),
            });
        }

        if let Some(number) = arg.strip_prefix(DESCRIPTOR_PREFIX) {
            let valid = !number.is_empty()
                && number.len() <= MAX_DESCRIPTOR_DIGITS
                && number.bytes().all(|b| b.is_ascii_digit());
            if !valid {
                return Err(Error::InvalidArgument(format!("bad descriptor {arg}")));
            }
            return Ok(DeviceSpec::Descriptor(PathBuf::from(arg)));
        }

        if Path::new(arg).is_absolute() {
            return Ok(DeviceSpec::Path(PathBuf::from(arg)));
        }

        Err(Error::InvalidArgument(format!("unknown device {arg:?}")))
    }

    /// The node opened for reading metadata.
    pub fn raw_path(&self) -> &Path {
        match self {
            DeviceSpec::Disk { raw, .. } => raw,
            DeviceSpec::Descriptor(path) | DeviceSpec::Path(path) => path,
        }
    }

    /// The node looked up in the mount table and opened for writing.
    pub fn block_path(&self) -> Option<&Path> {
        match self {
            DeviceSpec::Disk { block, .. } => Some(block),
            DeviceSpec::Descriptor(_) => None,
            DeviceSpec::Path(path) => Some(path),
        }
    }

    pub fn is_descriptor(&self) -> bool {
        matches!(self, DeviceSpec::Descriptor(_))
    }
}

/// Platform collaborators an operation may consult.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub config: &'a Config,
    pub mounts: &'a dyn MountTable,
    pub attributes: &'a dyn VolumeAttributes,
}

impl Host<'_> {
    /// Mount state of the device; descriptors are treated as unmounted.
    fn mount_state(&self, spec: &DeviceSpec) -> Result<MountState> {
        match spec.block_path() {
            Some(block) => mount_state(self.mounts, block, self.config),
            None => Ok(MountState::Unmounted),
        }
    }

    fn block_path<'s>(&self, spec: &'s DeviceSpec) -> Result<&'s Path> {
        spec.block_path().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} cannot be opened for writing",
                spec.raw_path().display()
            ))
        })
    }
}

/// Writes the volume name, without a trailing newline, to `out`.
pub fn probe(host: &Host, spec: &DeviceSpec, out: &mut dyn Write) -> Result<()> {
    let name = match host.mount_state(spec)? {
        MountState::Hfs(mount_point) => host.attributes.volume_name(&mount_point)?,
        MountState::Unmounted => {
            let mut device = Device::open(spec.raw_path(), false, host.config)?;
            catalog::volume_name(&mut device)?
        }
    };
    out.write_all(name.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn read_raw_uuid(path: &Path, config: &Config) -> Result<Uuid> {
    let read = || -> Result<Uuid> {
        let mut device = Device::open(path, false, config)?;
        let block = HeaderBlock::read(&mut device)?;
        Ok(block.legacy_uuid()?.to_full_uuid())
    };
    read().confirmed()
}

fn write_raw_uuid(path: &Path, config: &Config, uuid: LegacyUuid) -> Result<()> {
    let write = || -> Result<()> {
        let mut device = Device::open(path, true, config)?;
        let block = HeaderBlock::read(&mut device)?;
        block.with_legacy_uuid(uuid)?.write(&mut device)
    };
    write().confirmed()
}

/// Full UUID of the volume, nil when none is assigned.
///
/// With `generate`, a volume without a UUID is given a fresh one and the
/// UUID derived from it is returned.
pub fn get_volume_uuid(host: &Host, spec: &DeviceSpec, generate: bool) -> Result<Uuid> {
    let state = host.mount_state(spec)?;
    let uuid = match &state {
        MountState::Hfs(mount_point) => mounted_volume_uuid(host.attributes, mount_point)?,
        MountState::Unmounted => read_raw_uuid(spec.raw_path(), host.config)?,
    };

    if !generate || !uuid.is_nil() {
        return Ok(uuid);
    }

    let legacy = generate_legacy_uuid();
    info!("assigning new volume UUID {legacy}");
    match &state {
        MountState::Hfs(mount_point) => host.attributes.set_finder_uuid(mount_point, legacy)?,
        MountState::Unmounted => write_raw_uuid(host.block_path(spec)?, host.config, legacy)?,
    }
    Ok(legacy.to_full_uuid())
}

/// Writes the volume's full UUID, uppercase and without a newline, to `out`.
pub fn get_uuid_key(host: &Host, spec: &DeviceSpec, out: &mut dyn Write) -> Result<()> {
    let uuid = get_volume_uuid(host, spec, false)?;
    out.write_all(format_uuid(&uuid).as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Stores `uuid` as the volume's legacy UUID.
pub fn set_volume_uuid(host: &Host, spec: &DeviceSpec, uuid: LegacyUuid) -> Result<()> {
    let block = host.block_path(spec)?;
    match host.mount_state(spec)? {
        MountState::Hfs(mount_point) => host.attributes.set_finder_uuid(&mount_point, uuid),
        MountState::Unmounted => write_raw_uuid(block, host.config, uuid),
    }
}

/// Gives the volume a freshly generated UUID.
pub fn change_uuid_key(host: &Host, spec: &DeviceSpec) -> Result<LegacyUuid> {
    let uuid = generate_legacy_uuid();
    set_volume_uuid(host, spec, uuid)?;
    debug!("volume UUID changed to {uuid}");
    Ok(uuid)
}

/// The volume status database, keyed by full volume UUID.
///
/// The database file and its locking live outside this crate; the host
/// that owns them implements this trait and calls [`adopt`] or [`disown`].
pub trait VolumeStatusStore {
    /// Current status bits, `None` when the volume has no entry.
    fn status(&mut self, uuid: &Uuid) -> Result<Option<u32>>;

    fn set_status(&mut self, uuid: &Uuid, status: u32) -> Result<()>;
}

fn update_status(
    host: &Host,
    spec: &DeviceSpec,
    store: &mut dyn VolumeStatusStore,
    update: impl FnOnce(u32) -> u32,
) -> Result<u32> {
    let uuid = get_volume_uuid(host, spec, true)?;

    let current = match store.status(&uuid) {
        Ok(status) => status.unwrap_or(0),
        Err(e) => {
            warn!("status lookup for {} failed: {e}", format_uuid(&uuid));
            0
        }
    };
    let status = update(current & VOLUME_VALID_STATUS_BITS);
    store
        .set_status(&uuid, status)
        .map_err(|e| Error::StatusStore(e.to_string()))?;
    Ok(status)
}

/// Marks the volume's ownership and permissions as honoured.
///
/// Library entry point only: the command line has no status database to
/// hand in, so it offers no adopt action.
pub fn adopt(host: &Host, spec: &DeviceSpec, store: &mut dyn VolumeStatusStore) -> Result<u32> {
    update_status(host, spec, store, |status| status | VOLUME_USE_PERMISSIONS)
}

/// Marks the volume's ownership and permissions as ignored. Library entry
/// point only, like [`adopt`].
pub fn disown(host: &Host, spec: &DeviceSpec, store: &mut dyn VolumeStatusStore) -> Result<u32> {
    update_status(host, spec, store, |status| status & !VOLUME_USE_PERMISSIONS)
}

/// Actions available from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Probe,
    GetUuid,
    SetUuid,
}

impl Action {
    fn allows_descriptor(self) -> bool {
        matches!(self, Action::Probe | Action::GetUuid)
    }

    fn success(self) -> Status {
        match self {
            Action::Probe => Status::Recognized,
            Action::GetUuid | Action::SetUuid => Status::IoSuccess,
        }
    }
}

/// Runs `action` against the device named by `arg` and reports the status
/// code for the daemon.
pub fn run(host: &Host, action: Action, arg: &str, out: &mut dyn Write) -> Status {
    let result = DeviceSpec::parse(arg, host.config).and_then(|spec| {
        if spec.is_descriptor() && !action.allows_descriptor() {
            return Err(Error::InvalidArgument(format!(
                "{action:?} needs a device, not {arg}"
            )));
        }
        match action {
            Action::Probe => probe(host, &spec, out),
            Action::GetUuid => get_uuid_key(host, &spec, out),
            Action::SetUuid => change_uuid_key(host, &spec).map(|_| ()),
        }
    });

    if let Err(e) = &result {
        warn!("{action:?} {arg}: {e}");
    }
    Status::of(&result, action.success())
}
