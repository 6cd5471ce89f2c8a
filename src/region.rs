use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{Ordering, fence};

use crate::error::{Error, Result};

enum Mapping {
  ReadWrite(MmapMut),
  ReadOnly(Mmap),
}

/// A memory-mapped file region with typed little-endian accessors.
///
/// The writer and every reader hold their own mapping of the same file; the only
/// bytes they share are the file's pages. `load_acquire_i32` / `store_release_i32`
/// are the publication primitives used on the frame checksum field.
pub struct MappedRegion {
  // Keep the file handle alive for the lifetime of the map
  _file: File,
  map: Mapping,
}

impl MappedRegion {
  /// Opens (or creates) `path` for writing, growing it to at least `min_len` bytes.
  /// An existing larger file keeps its size.
  pub fn open_writable(path: &Path, min_len: u64) -> Result<Self> {
    let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;

    let current = file.metadata()?.len();
    if current < min_len {
      // set_len zero-fills, so every unwritten frame slot reads as "not ready".
      file.set_len(min_len)?;
    }

    // Safety: segment files are only ever mutated through this mapping by the
    // single writer. Truncating the file externally would SIGBUS us.
    let map = unsafe { MmapMut::map_mut(&file)? };

    Ok(Self {
      _file: file,
      map: Mapping::ReadWrite(map),
    })
  }

  /// Maps an existing file read-only.
  pub fn open_read_only(path: &Path) -> Result<Self> {
    let file = File::open(path)?;

    // Safety: see `open_writable`. Readers never mutate the file.
    let map = unsafe { Mmap::map(&file)? };

    Ok(Self {
      _file: file,
      map: Mapping::ReadOnly(map),
    })
  }

  pub fn len(&self) -> usize {
    self.as_slice().len()
  }

  pub fn as_slice(&self) -> &[u8] {
    match &self.map {
      Mapping::ReadWrite(m) => &m[..],
      Mapping::ReadOnly(m) => &m[..],
    }
  }

  fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
    match &mut self.map {
      Mapping::ReadWrite(m) => Ok(&mut m[..]),
      Mapping::ReadOnly(_) => Err(Error::ProtocolViolation("write to a read-only segment mapping".into())),
    }
  }

  pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
    &self.as_slice()[offset..offset + len]
  }

  pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
    Ok(&mut self.as_mut_slice()?[offset..offset + len])
  }

  pub fn get_i32(&self, offset: usize) -> i32 {
    LittleEndian::read_i32(self.bytes(offset, 4))
  }

  pub fn put_i32(&mut self, offset: usize, value: i32) -> Result<()> {
    LittleEndian::write_i32(self.bytes_mut(offset, 4)?, value);
    Ok(())
  }

  pub fn zero(&mut self, offset: usize, len: usize) -> Result<()> {
    self.bytes_mut(offset, len)?.fill(0);
    Ok(())
  }

  /// Reads an int32 that another mapping may be writing concurrently, then issues
  /// an acquire fence so bytes published before it are visible.
  pub fn load_acquire_i32(&self, offset: usize) -> i32 {
    let bytes = self.bytes(offset, 4);
    // Safety: the slice above bounds-checked the 4 bytes; [u8; 4] has alignment 1.
    let raw = unsafe { ptr::read_volatile(bytes.as_ptr() as *const [u8; 4]) };
    fence(Ordering::Acquire);
    i32::from_le_bytes(raw)
  }

  /// Issues a release fence, then writes an int32 that readers poll.
  pub fn store_release_i32(&mut self, offset: usize, value: i32) -> Result<()> {
    let bytes = self.bytes_mut(offset, 4)?;
    fence(Ordering::Release);
    // Safety: the slice above bounds-checked the 4 bytes; [u8; 4] has alignment 1.
    unsafe { ptr::write_volatile(bytes.as_mut_ptr() as *mut [u8; 4], value.to_le_bytes()) };
    Ok(())
  }

  /// Flushes dirty pages to stable storage. A no-op for read-only mappings.
  pub fn flush(&self) -> Result<()> {
    if let Mapping::ReadWrite(m) = &self.map {
      fence(Ordering::Release);
      m.flush()?;
    }
    Ok(())
  }
}
