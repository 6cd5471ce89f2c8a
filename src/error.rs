use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Journal not found: {0}")]
  JournalNotFound(String),

  #[error("Segment not found: {0}")]
  SegmentNotFound(u64),

  #[error("Message of {size} bytes exceeds the maximum of {max} bytes")]
  MessageTooLarge { size: usize, max: usize },

  /// `reserve`/`complete` were called out of order. This is a caller bug.
  #[error("Protocol Violation: {0}")]
  ProtocolViolation(String),

  #[error("Corrupt frame in segment {segment} at offset {offset}: {reason}")]
  CorruptFrame { segment: u64, offset: u64, reason: String },

  #[error("Checksum Mismatch: expected {expected:#x}, got {actual:#x} at offset {offset}")]
  ChecksumMismatch { expected: i32, actual: i32, offset: u64 },

  #[error("Unsupported segment format version: {0}")]
  UnsupportedVersion(u16),

  #[error("Journal handle has not been started")]
  NotStarted,
}
