use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::{ChecksumType, CorruptionPolicy};
use crate::error::{Error, Result};
use crate::frame::{
  CHECKSUM_OFFSET, EOF_SENTINEL, FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE, SegmentHeader, UNCOMMITTED,
};
use crate::region::MappedRegion;
use crate::util::{segment_filename, temp_segment_filename};

/// What the slot at a segment's cursor currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
  /// A completed frame with a payload of `len` bytes.
  Ready { len: usize },
  /// The EOF sentinel, or no room left for another frame header.
  EndOfSegment,
  /// Nothing has been published here yet.
  Pending,
}

/// Outcome of the writer's recovery scan over one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
  pub segment: u64,
  /// Completed messages found in this segment.
  pub messages: u64,
  /// Byte offset where the next frame will be written.
  pub end_offset: u64,
  /// A reserved-but-never-completed frame was found at `end_offset` and dropped.
  pub discarded_reservation: bool,
  /// A corrupt frame was found at `end_offset` and the tail was discarded.
  pub truncated_corrupt: bool,
  /// The previous segment was missing its EOF sentinel and has been sealed.
  pub sealed_previous: bool,
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
  seq: u64,
  offset: usize,
  len: usize,
}

/// One segment file: a 10 byte header followed by contiguous frames.
///
/// A writable segment tracks a commit cursor and at most one outstanding
/// reservation. A read-only segment tracks a read cursor. In both cases
/// `next_message_seq` is the sequence of the frame at the cursor.
pub struct Segment {
  seq: u64,
  path: PathBuf,
  region: MappedRegion,
  header: SegmentHeader,
  checksum: ChecksumType,
  position: usize,
  next_message_seq: u64,
  pending: Option<Reservation>,
  full: bool,
}

impl Segment {
  /// Creates segment `seq` of journal `name` in `dir`.
  ///
  /// The file is sized and its header written under a temporary name, then renamed
  /// into place, so readers never observe a half-initialised segment.
  pub fn create(
    dir: &Path,
    name: &str,
    seq: u64,
    capacity: u64,
    first_message_seq: u64,
    checksum: ChecksumType,
  ) -> Result<Self> {
    let final_path = dir.join(segment_filename(name, seq));
    if final_path.exists() {
      return Err(Error::Corruption(format!(
        "Segment {} already exists: {}",
        seq,
        final_path.display()
      )));
    }

    let temp_path = dir.join(temp_segment_filename(name, seq));
    if temp_path.exists() {
      fs::remove_file(&temp_path)?;
    }

    let mut region = MappedRegion::open_writable(&temp_path, capacity)?;
    let header = SegmentHeader {
      version: checksum.format_version(),
      first_message_seq,
    };
    header.write(&mut region.bytes_mut(0, SEGMENT_HEADER_SIZE)?)?;
    region.flush()?;

    fs::rename(&temp_path, &final_path)?;
    // fsync the directory so the rename survives a crash
    File::open(dir)?.sync_all()?;

    Ok(Self::from_parts(seq, final_path, region, header, checksum))
  }

  /// Opens an existing segment for appending. The cursor sits at the first frame;
  /// call [`Segment::seek_to_end`] before reserving.
  pub fn open_writable(path: &Path, seq: u64, capacity: u64) -> Result<Self> {
    let region = MappedRegion::open_writable(path, capacity)?;
    Self::open_region(path, seq, region)
  }

  /// Opens an existing segment for reading, positioned at its first frame.
  pub fn open_read_only(path: &Path, seq: u64) -> Result<Self> {
    let region = MappedRegion::open_read_only(path)?;
    Self::open_region(path, seq, region)
  }

  fn open_region(path: &Path, seq: u64, region: MappedRegion) -> Result<Self> {
    if region.len() < SEGMENT_HEADER_SIZE {
      return Err(Error::Corruption(format!(
        "Segment {} is shorter than its header: {} bytes",
        path.display(),
        region.len()
      )));
    }

    let header = SegmentHeader::read(&mut region.bytes(0, SEGMENT_HEADER_SIZE))?;
    let checksum = ChecksumType::from_format_version(header.version)?;

    Ok(Self::from_parts(seq, path.to_path_buf(), region, header, checksum))
  }

  fn from_parts(seq: u64, path: PathBuf, region: MappedRegion, header: SegmentHeader, checksum: ChecksumType) -> Self {
    Self {
      seq,
      path,
      region,
      header,
      checksum,
      position: SEGMENT_HEADER_SIZE,
      next_message_seq: header.first_message_seq,
      pending: None,
      full: false,
    }
  }

  pub fn seq(&self) -> u64 {
    self.seq
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn capacity(&self) -> usize {
    self.region.len()
  }

  pub fn header(&self) -> SegmentHeader {
    self.header
  }

  pub fn first_message_seq(&self) -> u64 {
    self.header.first_message_seq
  }

  /// Byte offset of the cursor.
  pub fn position(&self) -> usize {
    self.position
  }

  /// Sequence of the frame at the cursor.
  pub fn next_message_seq(&self) -> u64 {
    self.next_message_seq
  }

  /// True once the EOF sentinel has been written or found.
  pub fn is_full(&self) -> bool {
    self.full
  }

  // --- Reader side ---

  /// Inspects the slot at the cursor.
  ///
  /// The checksum is loaded with acquire ordering before anything else in the
  /// frame is trusted. A length that does not fit in the segment is reported as
  /// [`Error::CorruptFrame`].
  pub fn poll(&self) -> Result<FrameState> {
    let pos = self.position;
    let capacity = self.capacity();
    if pos + FRAME_HEADER_SIZE > capacity {
      return Ok(FrameState::EndOfSegment);
    }

    if self.region.load_acquire_i32(pos + CHECKSUM_OFFSET) == UNCOMMITTED {
      return Ok(FrameState::Pending);
    }

    let len = self.region.get_i32(pos);
    if len == EOF_SENTINEL {
      return Ok(FrameState::EndOfSegment);
    }
    if len < 0 || pos + FRAME_HEADER_SIZE + len as usize > capacity {
      return Err(self.corrupt(format!("frame length {} exceeds segment capacity {}", len, capacity)));
    }

    Ok(FrameState::Ready { len: len as usize })
  }

  pub fn is_ready_to_read_next_message(&self) -> bool {
    matches!(self.poll(), Ok(FrameState::Ready { .. }))
  }

  /// Zero-copy view of the payload of the ready frame at the cursor.
  pub fn payload(&self, len: usize) -> &[u8] {
    self.region.bytes(self.position + FRAME_HEADER_SIZE, len)
  }

  /// Recomputes the checksum of the ready frame at the cursor.
  pub fn verify(&self, len: usize) -> Result<()> {
    let stored = self.region.get_i32(self.position + CHECKSUM_OFFSET);
    let actual = self.checksum.checksum(self.payload(len));
    if stored != actual {
      return Err(Error::ChecksumMismatch {
        expected: stored,
        actual,
        offset: self.position as u64,
      });
    }
    Ok(())
  }

  /// Moves the cursor past the ready frame at the cursor.
  pub fn advance(&mut self) -> Result<()> {
    match self.poll()? {
      FrameState::Ready { len } => {
        self.position += FRAME_HEADER_SIZE + len;
        self.next_message_seq += 1;
        Ok(())
      }
      state => Err(Error::ProtocolViolation(format!(
        "advance called on segment {} at offset {} with no ready frame ({:?})",
        self.seq, self.position, state
      ))),
    }
  }

  /// Moves the cursor back to the first frame.
  pub fn rewind(&mut self) {
    self.position = SEGMENT_HEADER_SIZE;
    self.next_message_seq = self.header.first_message_seq;
    self.full = false;
  }

  /// Restores a cursor previously obtained from `position`/`next_message_seq`.
  pub(crate) fn reposition(&mut self, position: usize, next_message_seq: u64) {
    self.position = position;
    self.next_message_seq = next_message_seq;
  }

  // --- Writer side ---

  /// Checks whether a frame with a `size` byte payload fits at the cursor.
  ///
  /// If it does not, the EOF sentinel is published at the cursor (when a frame
  /// header still fits) and the segment is marked full.
  pub fn try_fit(&mut self, size: usize) -> Result<bool> {
    self.ensure_no_pending("try_fit")?;
    if self.full {
      return Ok(false);
    }

    if self.position + FRAME_HEADER_SIZE + size <= self.capacity() {
      return Ok(true);
    }

    self.seal()?;
    Ok(false)
  }

  /// Publishes the EOF sentinel at the cursor, if a frame header still fits, and
  /// marks the segment full. No-op on a segment that is already full.
  pub fn seal(&mut self) -> Result<()> {
    self.ensure_no_pending("seal")?;
    if self.full {
      return Ok(());
    }

    let pos = self.position;
    if pos + FRAME_HEADER_SIZE <= self.capacity() {
      self.region.put_i32(pos, EOF_SENTINEL)?;
      self.region.store_release_i32(pos + CHECKSUM_OFFSET, EOF_SENTINEL)?;
    }
    self.full = true;
    Ok(())
  }

  /// Reserves a frame for a `size` byte payload at the cursor and returns the
  /// sequence it will carry. The frame stays invisible to readers until
  /// [`Segment::complete`].
  pub fn reserve(&mut self, size: usize) -> Result<u64> {
    self.ensure_no_pending("reserve")?;
    if self.full || self.position + FRAME_HEADER_SIZE + size > self.capacity() {
      return Err(Error::ProtocolViolation(format!(
        "reserve of {} bytes at offset {} does not fit segment {}",
        size, self.position, self.seq
      )));
    }

    // The checksum field is still 0 here, so readers keep treating the slot as pending.
    self.region.put_i32(self.position, size as i32)?;
    self.pending = Some(Reservation {
      seq: self.next_message_seq,
      offset: self.position,
      len: size,
    });

    Ok(self.next_message_seq)
  }

  /// Writable payload region of the outstanding reservation `seq`.
  pub fn payload_mut(&mut self, seq: u64) -> Result<&mut [u8]> {
    let reservation = self.pending_for(seq, "payload_mut")?;
    self
      .region
      .bytes_mut(reservation.offset + FRAME_HEADER_SIZE, reservation.len)
  }

  /// Checksums and publishes reservation `seq`.
  pub fn complete(&mut self, seq: u64) -> Result<()> {
    let reservation = self.pending_for(seq, "complete")?;
    let payload_start = reservation.offset + FRAME_HEADER_SIZE;
    let next = payload_start + reservation.len;

    let checksum = self
      .checksum
      .checksum(self.region.bytes(payload_start, reservation.len));

    // The next slot may hold bytes of an abandoned, longer reservation. It must
    // read as pending before this frame becomes visible.
    if next + FRAME_HEADER_SIZE <= self.capacity() {
      self.region.zero(next, FRAME_HEADER_SIZE)?;
    }

    self
      .region
      .store_release_i32(reservation.offset + CHECKSUM_OFFSET, checksum)?;

    self.pending = None;
    self.position = next;
    self.next_message_seq += 1;
    Ok(())
  }

  /// Withdraws reservation `seq` without publishing it. The slot is reused by the
  /// next reservation.
  pub fn abandon(&mut self, seq: u64) -> Result<()> {
    let reservation = self.pending_for(seq, "abandon")?;
    self.region.put_i32(reservation.offset, 0)?;
    self.pending = None;
    Ok(())
  }

  /// Recovery scan: replays the segment from its first frame and leaves the cursor
  /// at the first slot that holds no completed frame.
  ///
  /// A dangling reservation from a crashed writer is dropped silently. A corrupt
  /// frame is handled according to `policy`.
  pub fn seek_to_end(&mut self, policy: CorruptionPolicy) -> Result<RecoveryReport> {
    self.ensure_no_pending("seek_to_end")?;
    self.rewind();

    let mut discarded_reservation = false;
    let mut truncated_corrupt = false;

    loop {
      let state = self.poll().and_then(|state| {
        if let FrameState::Ready { len } = state {
          self.verify(len)?;
        }
        Ok(state)
      });

      match state {
        Ok(FrameState::Ready { .. }) => self.advance()?,
        Ok(FrameState::EndOfSegment) => {
          self.full = true;
          break;
        }
        Ok(FrameState::Pending) => {
          if self.region.get_i32(self.position) != 0 {
            warn!(target: "ironjournal", "Discarding uncompleted reservation in {} at offset {}", self.path.display(), self.position);
            self.region.put_i32(self.position, 0)?;
            discarded_reservation = true;
          }
          break;
        }
        Err(e @ (Error::CorruptFrame { .. } | Error::ChecksumMismatch { .. })) => {
          if policy == CorruptionPolicy::Error {
            return Err(e);
          }
          warn!(target: "ironjournal", "Truncating corrupt tail of {} at offset {}: {}", self.path.display(), self.position, e);
          self.region.zero(self.position, FRAME_HEADER_SIZE)?;
          truncated_corrupt = true;
          break;
        }
        Err(e) => return Err(e),
      }
    }

    Ok(RecoveryReport {
      segment: self.seq,
      messages: self.next_message_seq - self.header.first_message_seq,
      end_offset: self.position as u64,
      discarded_reservation,
      truncated_corrupt,
      sealed_previous: false,
    })
  }

  // --- Lifecycle ---

  pub fn flush(&self) -> Result<()> {
    self.region.flush()
  }

  /// Flushes and releases the mapping and file handle.
  pub fn close(self) -> Result<()> {
    self.flush()
  }

  // --- Helpers ---

  fn ensure_no_pending(&self, op: &str) -> Result<()> {
    match self.pending {
      Some(r) => Err(Error::ProtocolViolation(format!(
        "{} called while message {} is reserved but not completed",
        op, r.seq
      ))),
      None => Ok(()),
    }
  }

  fn pending_for(&self, seq: u64, op: &str) -> Result<Reservation> {
    match self.pending {
      Some(r) if r.seq == seq => Ok(r),
      Some(r) => Err(Error::ProtocolViolation(format!(
        "{} called with sequence {} but {} is reserved",
        op, seq, r.seq
      ))),
      None => Err(Error::ProtocolViolation(format!(
        "{} called with sequence {} but nothing is reserved",
        op, seq
      ))),
    }
  }

  fn corrupt(&self, reason: String) -> Error {
    Error::CorruptFrame {
      segment: self.seq,
      offset: self.position as u64,
      reason,
    }
  }
}
