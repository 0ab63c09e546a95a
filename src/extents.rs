//! Extent lists and the logical to physical offset mapper.

use crate::device::Device;
use crate::error::{Error, Result};
use hfs_types::{ExtentDescriptor, ExtentRecord};
use std::io::{Read, Seek};

/// All extents of one fork: the inline record from the volume header
/// followed by any records found in the Extents Overflow file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentList {
    inline: ExtentRecord,
    overflow: Vec<ExtentRecord>,
}

impl ExtentList {
    pub fn from_inline(inline: ExtentRecord) -> Self {
        Self {
            inline,
            overflow: Vec::new(),
        }
    }

    /// Appends one whole overflow record.
    pub fn push_record(&mut self, record: ExtentRecord) {
        self.overflow.push(record);
    }

    pub fn inline(&self) -> &ExtentRecord {
        &self.inline
    }

    pub fn overflow_records(&self) -> usize {
        self.overflow.len()
    }

    /// Every descriptor in file order.
    pub fn iter(&self) -> impl Iterator<Item = &ExtentDescriptor> {
        self.inline.iter().chain(self.overflow.iter().flatten())
    }

    pub fn len(&self) -> usize {
        self.inline.len() + self.overflow.len() * self.inline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(ExtentDescriptor::is_empty)
    }
}

/// A contiguous run of bytes on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalRun {
    /// Byte offset from the start of the volume.
    pub offset: u64,
    /// Bytes available before the run ends.
    pub length: u64,
}

fn beyond_u64(extent: &ExtentDescriptor) -> Error {
    Error::Corrupt(format!(
        "extent at block {} of {} blocks lies beyond any device",
        extent.start_block, extent.block_count
    ))
}

/// Maps `logical_offset` within a fork to its position on the volume.
///
/// The returned run length is the smaller of `length` and the bytes left in
/// the extent holding `logical_offset`.
pub fn logical_to_physical(
    logical_offset: u64,
    length: u64,
    block_size: u32,
    extents: &ExtentList,
) -> Result<PhysicalRun> {
    if block_size == 0 {
        return Err(Error::Corrupt("allocation block size is zero".to_string()));
    }
    let block_size = block_size as u64;
    let mut remaining = logical_offset / block_size;

    for extent in extents.iter() {
        if extent.is_empty() {
            break;
        }
        let count = extent.block_count as u64;
        if remaining < count {
            let block = extent.start_block as u64 + remaining;
            let within = logical_offset % block_size;
            let offset = block
                .checked_mul(block_size)
                .and_then(|start| start.checked_add(within))
                .ok_or_else(|| beyond_u64(extent))?;
            let available = (count - remaining)
                .checked_mul(block_size)
                .ok_or_else(|| beyond_u64(extent))?
                - within;
            return Ok(PhysicalRun {
                offset,
                length: length.min(available),
            });
        }
        remaining -= count;
    }

    Err(Error::MapPastEnd {
        offset: logical_offset,
    })
}

/// A metadata file (catalog, extents overflow) addressed through its extents.
#[derive(Debug, Clone)]
pub struct SpecialFile {
    /// Byte offset of the HFS Plus volume on the device.
    pub volume_offset: u64,
    pub block_size: u32,
    pub extents: ExtentList,
}

impl SpecialFile {
    /// Reads `buf.len()` bytes of the file starting at `logical_offset`,
    /// following extent boundaries.
    pub fn read_at<F: Read + Seek>(
        &self,
        device: &mut Device<F>,
        buf: &mut [u8],
        logical_offset: u64,
    ) -> Result<()> {
        let mut done = 0usize;
        while done < buf.len() {
            let wanted = (buf.len() - done) as u64;
            let run = logical_to_physical(
                logical_offset + done as u64,
                wanted,
                self.block_size,
                &self.extents,
            )?;
            let run_length = run.length as usize;
            let offset = self.volume_offset.checked_add(run.offset).ok_or_else(|| {
                Error::Corrupt(format!(
                    "run at {} past volume offset {}",
                    run.offset, self.volume_offset
                ))
            })?;
            device.read_at(&mut buf[done..done + run_length], offset)?;
            done += run_length;
        }
        Ok(())
    }
}
