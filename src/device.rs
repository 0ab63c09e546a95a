//! Block-aligned access to raw devices and disk images.
//!
//! Raw character devices only accept transfers that start and end on a
//! physical block boundary. [`Device`] widens every request to the enclosing
//! aligned range and copies the caller's bytes in or out of a scratch buffer.

use crate::config::Config;
use crate::error::{Error, Result};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

/// A byte stream addressed in whole physical blocks.
#[derive(Debug)]
pub struct Device<F> {
    inner: F,
    block_size: u32,
}

/// Aligned span covering `offset..offset + length`.
fn aligned_range(offset: u64, length: usize, block_size: u32) -> Result<(u64, usize)> {
    let block_size = block_size as u64;
    let raw_offset = offset / block_size * block_size;
    let end = offset.checked_add(length as u64).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{length} bytes at {offset} end past the largest offset"),
        ))
    })?;
    let raw_length = (end - raw_offset).div_ceil(block_size) * block_size;
    Ok((raw_offset, raw_length as usize))
}

impl<F> Device<F> {
    /// Wraps a stream whose physical block size is already known.
    pub fn new(inner: F, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(Error::Geometry(format!(
                "block size {block_size} is not a power of two"
            )));
        }
        Ok(Self { inner, block_size })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Read + Seek> Device<F> {
    /// Fills `buf` with the bytes starting at `offset`.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let (raw_offset, raw_length) = aligned_range(offset, buf.len(), self.block_size)?;
        let mut scratch = vec![0u8; raw_length];
        self.read_raw(&mut scratch, raw_offset)?;

        let start = (offset - raw_offset) as usize;
        buf.copy_from_slice(&scratch[start..start + buf.len()]);
        Ok(())
    }

    fn read_raw(&mut self, scratch: &mut [u8], raw_offset: u64) -> Result<()> {
        let position = self.inner.seek(SeekFrom::Start(raw_offset))?;
        if position != raw_offset {
            return Err(Error::Io(std::io::Error::other(format!(
                "seek to {raw_offset} landed at {position}"
            ))));
        }
        self.inner.read_exact(scratch)?;
        Ok(())
    }
}

impl<F: Read + Write + Seek> Device<F> {
    /// Writes `buf` at `offset`, preserving the rest of any partially
    /// covered block.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let (raw_offset, raw_length) = aligned_range(offset, buf.len(), self.block_size)?;
        let block_size = self.block_size as u64;
        let end = offset + buf.len() as u64;

        let mut scratch = vec![0u8; raw_length];
        if offset % block_size != 0 || end % block_size != 0 {
            debug!("read-modify-write of {raw_length} bytes at {raw_offset}");
            self.read_raw(&mut scratch, raw_offset)?;
        }

        let start = (offset - raw_offset) as usize;
        scratch[start..start + buf.len()].copy_from_slice(buf);

        let position = self.inner.seek(SeekFrom::Start(raw_offset))?;
        if position != raw_offset {
            return Err(Error::Io(std::io::Error::other(format!(
                "seek to {raw_offset} landed at {position}"
            ))));
        }
        self.inner.write_all(&scratch)?;
        self.inner.flush()?;
        Ok(())
    }
}

impl Device<File> {
    /// Opens a device node or image file and discovers its block size.
    pub fn open(path: &Path, writable: bool, config: &Config) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        let block_size = block_size_of(&file, config)?;
        debug!(
            "opened {} ({}) with block size {block_size}",
            path.display(),
            if writable { "rw" } else { "ro" }
        );
        Self::new(file, block_size)
    }

    /// Wraps an already-open descriptor, such as one inherited from the
    /// daemon as `/dev/fd/N`.
    pub fn from_file(file: File, config: &Config) -> Result<Self> {
        let block_size = block_size_of(&file, config)?;
        Self::new(file, block_size)
    }
}

fn block_size_of(file: &File, config: &Config) -> Result<u32> {
    let metadata = file.metadata()?;
    let file_type = metadata.file_type();

    if file_type.is_file() {
        return Ok(config.image_block_size);
    }

    if file_type.is_block_device() {
        let dev = metadata.rdev();
        return sysfs_block_size(libc::major(dev), libc::minor(dev));
    }

    if file_type.is_char_device() {
        // Character device numbers are not block device numbers; Linux has no
        // raw disk nodes to query.
        return Err(Error::Geometry("character devices are not supported".to_string()));
    }

    Err(Error::Geometry("not a block device or image file".to_string()))
}

fn sysfs_block_size(major: u32, minor: u32) -> Result<u32> {
    let base = format!("/sys/dev/block/{major}:{minor}");
    // Partitions keep their queue parameters on the parent disk.
    let candidates = [
        format!("{base}/queue/logical_block_size"),
        format!("{base}/../queue/logical_block_size"),
    ];

    for candidate in &candidates {
        if let Ok(text) = fs::read_to_string(candidate) {
            return text.trim().parse::<u32>().map_err(|e| {
                Error::Geometry(format!("unreadable block size in {candidate}: {e}"))
            });
        }
    }

    Err(Error::Geometry(format!(
        "no logical block size for device {major}:{minor}"
    )))
}
