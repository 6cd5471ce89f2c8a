//! # IronJournal
//!
//! `ironjournal` is a segmented, append-only binary journal: a named sequence of
//! length-framed, checksummed messages spread over fixed-capacity segment files,
//! appended by exactly one writer and consumed by any number of independent
//! readers without locks.
//!
//! ## Key Features
//!
//! * **Lock-free publication**: A frame's checksum field doubles as its commit flag.
//!   The writer stores it with release ordering; readers load it with acquire ordering.
//! * **Zero-copy**: Writers fill payloads in place; readers get a borrowed view of the
//!   mapped segment.
//! * **Crash recovery**: On start the writer rescans its last segment; reservations
//!   that were never completed are dropped.
//! * **Rollover**: A full segment is sealed with an EOF sentinel and the next one
//!   records the first message sequence it holds.
//!
//! ## Segment Format
//!
//! All integers are little-endian.
//!
//! ```text
//! bytes [0,2)  : format version     (uint16; 1 = strided checksum, 2 = CRC32)
//! bytes [2,10) : firstMessageSeq    (int64)
//! repeating from byte 10:
//!   payloadLength : int32   (-1 => end-of-segment sentinel)
//!   checksum      : int32   (0  => reserved but not yet committed)
//!   payload       : byte[payloadLength]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ironjournal::{Journal, JournalOptions};
//!
//! # fn main() -> ironjournal::Result<()> {
//! let journal = Journal::open(JournalOptions::new("./journal_data", "orders"))?;
//!
//! let mut writer = journal.writer();
//! writer.start()?;
//! let seq = writer.append(b"order_created")?;
//!
//! // Fill the payload in place
//! writer.append_with(8, |buf| {
//!   buf.copy_from_slice(&42u64.to_le_bytes());
//!   Ok(())
//! })?;
//!
//! let mut reader = journal.reader();
//! reader.start(seq)?;
//! while reader.read_next(|seq, payload| println!("{}: {} bytes", seq, payload.len()))? {}
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod frame;
mod journal;
mod reader;
mod region;
mod segment;
mod util;
mod writer;

pub use config::{ChecksumType, CorruptionPolicy, JournalOptions, SyncMode};
pub use error::{Error, Result};
pub use frame::{EOF_SENTINEL, FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE, SegmentHeader};
pub use journal::{Journal, SegmentInfo};
pub use reader::JournalReader;
pub use segment::{FrameState, RecoveryReport, Segment};
pub use writer::JournalWriter;
