//! Locating the HFS Plus volume on a device and reading its header sector.
//!
//! A device holds either a plain HFS volume, a native HFS Plus / HFSX volume,
//! or an HFS Plus volume embedded inside an HFS wrapper. In every case the
//! header of interest lives 1024 bytes into its volume.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::identity::LegacyUuid;
use deku::prelude::*;
use hfs_types::{
    HFS_BLOCK_SIZE, HFS_PLUS_SIG_WORD, HFS_SIG_WORD, HFSX_SIG_WORD, MasterDirectoryBlock,
    VOLUME_HEADER_OFFSET, VOLUME_HEADER_SIZE, VolumeHeader,
};
use log::debug;
use std::io::{Read, Seek, Write};

/// Finder info words holding the legacy UUID.
const UUID_WORDS: std::ops::Range<usize> = 6..8;

fn signature_of(sector: &[u8; VOLUME_HEADER_SIZE]) -> u16 {
    u16::from_be_bytes([sector[0], sector[1]])
}

fn read_sector<F: Read + Seek>(
    device: &mut Device<F>,
    volume_offset: u64,
) -> Result<[u8; VOLUME_HEADER_SIZE]> {
    let mut sector = [0u8; VOLUME_HEADER_SIZE];
    device.read_at(&mut sector, volume_offset + VOLUME_HEADER_OFFSET)?;
    Ok(sector)
}

/// Byte offset of the HFS Plus volume embedded in an HFS wrapper.
pub fn embedded_volume_offset(mdb: &MasterDirectoryBlock) -> u64 {
    mdb.embed_extent.start_block as u64 * mdb.allocation_block_size as u64
        + mdb.first_allocation_block as u64 * HFS_BLOCK_SIZE
}

/// Finds the start of the HFS Plus volume whose name can be resolved.
///
/// Plain HFS volumes are reported as unrecognized.
pub fn locate_hfs_plus<F: Read + Seek>(device: &mut Device<F>) -> Result<u64> {
    let sector = read_sector(device, 0)?;
    match signature_of(&sector) {
        HFS_PLUS_SIG_WORD | HFSX_SIG_WORD => Ok(0),
        HFS_SIG_WORD => {
            let (_rest, mdb) = MasterDirectoryBlock::from_bytes((&sector, 0))?;
            if mdb.embed_signature != HFS_PLUS_SIG_WORD {
                return Err(Error::Unrecognized("plain HFS volume".to_string()));
            }
            let offset = embedded_volume_offset(&mdb);
            debug!("HFS wrapper, embedded HFS Plus volume at {offset}");
            Ok(offset)
        }
        other => Err(Error::Unrecognized(format!("signature {other:#06x}"))),
    }
}

/// Reads the HFS Plus / HFSX header of the volume at `volume_offset`.
pub fn read_volume_header<F: Read + Seek>(
    device: &mut Device<F>,
    volume_offset: u64,
) -> Result<VolumeHeader> {
    let sector = read_sector(device, volume_offset)?;
    let (_rest, header) = VolumeHeader::from_bytes((&sector, 0))?;
    if !header.is_hfs_plus() {
        return Err(Error::Unrecognized(format!(
            "signature {:#06x} at volume offset {volume_offset}",
            header.signature
        )));
    }
    if header.block_size < HFS_BLOCK_SIZE as u32 || !header.block_size.is_power_of_two() {
        return Err(Error::Corrupt(format!(
            "allocation block size {} at volume offset {volume_offset}",
            header.block_size
        )));
    }
    Ok(header)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    Hfs,
    HfsPlus,
    HfsX,
}

/// The raw header sector of a volume, kept byte-exact so it can be patched
/// and written back.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    /// Byte offset of the volume the sector belongs to.
    pub volume_offset: u64,
    pub format: VolumeFormat,
    bytes: [u8; VOLUME_HEADER_SIZE],
}

impl HeaderBlock {
    /// Reads the MDB or Volume Header, descending into an HFS wrapper.
    pub fn read<F: Read + Seek>(device: &mut Device<F>) -> Result<Self> {
        let mut volume_offset = 0;
        let mut bytes = read_sector(device, 0)?;

        if signature_of(&bytes) == HFS_SIG_WORD {
            let (_rest, mdb) = MasterDirectoryBlock::from_bytes((&bytes, 0))?;
            if mdb.embed_signature == HFS_PLUS_SIG_WORD {
                volume_offset = embedded_volume_offset(&mdb);
                bytes = read_sector(device, volume_offset)?;
            }
        }

        let format = match signature_of(&bytes) {
            HFS_SIG_WORD => VolumeFormat::Hfs,
            HFS_PLUS_SIG_WORD => VolumeFormat::HfsPlus,
            HFSX_SIG_WORD => VolumeFormat::HfsX,
            other => {
                return Err(Error::Unrecognized(format!("signature {other:#06x}")));
            }
        };
        debug!("{format:?} header at volume offset {volume_offset}");

        Ok(Self {
            volume_offset,
            format,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8; VOLUME_HEADER_SIZE] {
        &self.bytes
    }

    pub fn legacy_uuid(&self) -> Result<LegacyUuid> {
        let finder_info = match self.format {
            VolumeFormat::Hfs => {
                MasterDirectoryBlock::from_bytes((&self.bytes, 0))?
                    .1
                    .finder_info
            }
            VolumeFormat::HfsPlus | VolumeFormat::HfsX => {
                VolumeHeader::from_bytes((&self.bytes, 0))?.1.finder_info
            }
        };
        Ok(LegacyUuid::new(finder_info[6], finder_info[7]))
    }

    /// Returns a copy carrying `uuid` in its finder info; every other byte
    /// is unchanged.
    pub fn with_legacy_uuid(&self, uuid: LegacyUuid) -> Result<Self> {
        let words = [uuid.high, uuid.low];
        let mut bytes = self.bytes;
        match self.format {
            VolumeFormat::Hfs => {
                let (_rest, mut mdb) = MasterDirectoryBlock::from_bytes((&self.bytes, 0))?;
                mdb.finder_info[UUID_WORDS].copy_from_slice(&words);
                let encoded = mdb.to_bytes()?;
                bytes[..encoded.len()].copy_from_slice(&encoded);
            }
            VolumeFormat::HfsPlus | VolumeFormat::HfsX => {
                let (_rest, mut header) = VolumeHeader::from_bytes((&self.bytes, 0))?;
                header.finder_info[UUID_WORDS].copy_from_slice(&words);
                let encoded = header.to_bytes()?;
                bytes[..encoded.len()].copy_from_slice(&encoded);
            }
        }
        Ok(Self { bytes, ..*self })
    }

    /// Writes the sector back where it was read from.
    pub fn write<F: Read + Write + Seek>(&self, device: &mut Device<F>) -> Result<()> {
        device.write_at(&self.bytes, self.volume_offset + VOLUME_HEADER_OFFSET)
    }
}
