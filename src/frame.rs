use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::config::ChecksumType;
use crate::error::{Error, Result};

/// Size of the segment header: [Version: 2][First Message Seq: 8].
pub const SEGMENT_HEADER_SIZE: usize = 2 + 8;

/// Size of a frame header: [Payload Length: 4][Checksum: 4].
pub const FRAME_HEADER_SIZE: usize = 4 + 4;

/// Offset of the checksum field within a frame header.
pub const CHECKSUM_OFFSET: usize = 4;

/// `payloadLength` (and checksum) value marking the end of a segment.
pub const EOF_SENTINEL: i32 = -1;

/// Checksum value of a frame that was reserved but not yet completed.
pub const UNCOMMITTED: i32 = 0;

pub const FORMAT_VERSION_STRIDED: u16 = 1;
pub const FORMAT_VERSION_CRC32: u16 = 2;

impl ChecksumType {
  /// The format version recorded in the header of segments using this checksum.
  pub fn format_version(self) -> u16 {
    match self {
      ChecksumType::Strided => FORMAT_VERSION_STRIDED,
      ChecksumType::Crc32 => FORMAT_VERSION_CRC32,
    }
  }

  pub fn from_format_version(version: u16) -> Result<Self> {
    match version {
      FORMAT_VERSION_STRIDED => Ok(ChecksumType::Strided),
      FORMAT_VERSION_CRC32 => Ok(ChecksumType::Crc32),
      v => Err(Error::UnsupportedVersion(v)),
    }
  }

  /// Computes the publishable checksum of `payload`. Never returns [`UNCOMMITTED`].
  pub fn checksum(self, payload: &[u8]) -> i32 {
    let raw = match self {
      ChecksumType::Strided => strided_checksum(payload),
      ChecksumType::Crc32 => crc32fast::hash(payload) as i32,
    };
    publishable(raw)
  }
}

/// The exact binary layout of a segment header on disk (10 bytes).
///
/// [Version: 2]
/// [First Message Seq: 8]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
  pub version: u16,
  pub first_message_seq: u64,
}

impl SegmentHeader {
  pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
    writer.write_u16::<LittleEndian>(self.version)?;
    writer.write_i64::<LittleEndian>(self.first_message_seq as i64)?;
    Ok(())
  }

  pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
    let version = reader.read_u16::<LittleEndian>()?;
    ChecksumType::from_format_version(version)?;

    let first_message_seq = reader.read_i64::<LittleEndian>()?;
    if first_message_seq < 0 {
      return Err(Error::Corruption(format!(
        "Negative firstMessageSeq in segment header: {}",
        first_message_seq
      )));
    }

    Ok(Self {
      version,
      first_message_seq: first_message_seq as u64,
    })
  }
}

/// Sum over 8-byte little-endian strides of the payload, folded to 32 bits.
///
/// Up to 7 trailing bytes are not covered.
pub fn strided_checksum(payload: &[u8]) -> i32 {
  let mut sum: i64 = 7;
  for stride in payload.chunks_exact(8) {
    let mut word = [0u8; 8];
    word.copy_from_slice(stride);
    sum = sum.wrapping_add(i64::from_le_bytes(word));
    sum = sum.wrapping_add(sum);
  }
  (sum ^ (sum >> 32)) as i32
}

/// A checksum of 0 doubles as "not yet committed", so a genuine 0 is perturbed.
pub fn publishable(checksum: i32) -> i32 {
  if checksum == UNCOMMITTED { 1 } else { checksum }
}
