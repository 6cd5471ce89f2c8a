use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::frame::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
use crate::util;

/// Defines how often the writer flushes mapped pages to the physical disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// `msync` after every single append.
  /// Safest, but highest latency.
  Strict,

  /// `msync` only when a segment is closed (rollover or stop).
  /// Appended data is visible to readers immediately through the shared mapping.
  OnRollover,

  /// Never flush explicitly. Relies on the OS background writeback.
  /// Fastest, but risks data loss on power failure.
  Async,
}

/// Checksum algorithm written into new segments.
///
/// The algorithm is recorded in each segment's format version, so a journal may
/// contain segments of both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
  /// Sum over 8-byte strides of the payload. Up to 7 trailing bytes are not
  /// covered. Format version 1.
  Strided,

  /// CRC32 over the whole payload. Format version 2.
  Crc32,
}

/// Policy for handling corrupted frames found by the writer's recovery scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
  /// Discard the segment tail starting at the corrupt frame and log a warning.
  /// Allows the writer to start, losing only the corrupted tail.
  Truncate,

  /// Return a fatal error. The writer will not start until the file is fixed.
  Error,
}

#[derive(Debug, Clone)]
pub struct JournalOptions {
  /// Directory holding the segment files. Several journals may share it.
  pub root_path: PathBuf,

  /// Logical journal name, used as the segment filename prefix.
  /// Must not end in a digit, so `<name><seq>.data` parses unambiguously.
  pub name: String,

  // --- Segments ---
  /// Capacity of newly created segment files in bytes.
  /// Existing larger files keep their size.
  /// Default: 64 MB.
  pub segment_capacity: u64,

  /// Largest payload a single message may carry.
  /// A segment must hold its header plus one frame of this size.
  /// Default: 1 MB.
  pub max_message_size: usize,

  // --- Behavior ---
  pub sync_mode: SyncMode,
  pub checksum: ChecksumType,
  pub on_corruption: CorruptionPolicy,

  /// If true, readers verify every frame's checksum before exposing the payload.
  /// Default: true.
  pub verify_checksums: bool,
}

impl Default for JournalOptions {
  fn default() -> Self {
    Self {
      root_path: PathBuf::from("./journal_data"),
      name: "journal".to_string(),
      segment_capacity: 64 * 1024 * 1024, // 64 MB
      max_message_size: 1024 * 1024,      // 1 MB
      sync_mode: SyncMode::OnRollover,
      checksum: ChecksumType::Strided,
      on_corruption: CorruptionPolicy::Truncate,
      verify_checksums: true,
    }
  }
}

impl JournalOptions {
  pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
    Self {
      root_path: path.into(),
      name: name.into(),
      ..Default::default()
    }
  }

  /// Largest payload that fits in an empty segment of the configured capacity.
  pub fn max_payload_per_segment(&self) -> u64 {
    self
      .segment_capacity
      .saturating_sub((SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE) as u64)
  }

  pub fn validate(&self) -> Result<()> {
    util::validate_journal_name(&self.name)?;

    // payloadLength is an int32 on disk
    if self.max_message_size > i32::MAX as usize {
      return Err(Error::Config(format!(
        "max_message_size {} exceeds the int32 frame length field",
        self.max_message_size
      )));
    }

    if self.max_message_size as u64 > self.max_payload_per_segment() {
      return Err(Error::Config(format!(
        "segment_capacity {} cannot hold a header plus one message of {} bytes",
        self.segment_capacity, self.max_message_size
      )));
    }

    Ok(())
  }
}
