use tracing::{error, info, warn};

use crate::config::SyncMode;
use crate::error::{Error, Result};
use crate::frame::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
use crate::journal::Journal;
use crate::segment::{RecoveryReport, Segment};

/// The exclusive appender of a journal.
///
/// Only one writer may be started per journal at a time; this is not enforced
/// across processes. Appends take `&mut self`, so a writer shared between threads
/// needs external synchronisation.
pub struct JournalWriter {
  journal: Journal,
  segment: Option<Segment>,
}

impl JournalWriter {
  pub fn new(journal: Journal) -> Self {
    Self { journal, segment: None }
  }

  pub fn journal(&self) -> &Journal {
    &self.journal
  }

  pub fn is_started(&self) -> bool {
    self.segment.is_some()
  }

  /// Opens the last segment (creating segment 0 for a new journal) and runs the
  /// recovery scan to find the true write position.
  pub fn start(&mut self) -> Result<RecoveryReport> {
    if self.segment.is_some() {
      return Err(Error::ProtocolViolation("writer already started".into()));
    }

    let opts = self.journal.options();
    self.journal.remove_stale_temp_files()?;

    let seq = self.journal.select_last_segment_for_write()?;
    let path = self.journal.segment_path(seq);

    let (segment, mut report) = if path.exists() {
      let mut segment = Segment::open_writable(&path, seq, opts.segment_capacity)?;
      let report = segment.seek_to_end(opts.on_corruption)?;
      (segment, report)
    } else {
      let segment = Segment::create(
        self.journal.dir(),
        self.journal.name(),
        seq,
        opts.segment_capacity,
        0,
        opts.checksum,
      )?;
      let report = RecoveryReport {
        segment: seq,
        messages: 0,
        end_offset: SEGMENT_HEADER_SIZE as u64,
        discarded_reservation: false,
        truncated_corrupt: false,
        sealed_previous: false,
      };
      (segment, report)
    };

    if seq > 0 {
      report.sealed_previous = self.seal_previous(seq - 1)?;
    }

    info!(
      target: "ironjournal",
      "Writer started on {} segment {} at offset {}, next message {}",
      self.journal.name(), seq, report.end_offset, segment.next_message_seq()
    );

    self.segment = Some(segment);
    Ok(report)
  }

  /// Sequence the next appended message will receive.
  pub fn next_message_seq(&self) -> Result<u64> {
    Ok(self.current()?.next_message_seq())
  }

  /// Sequence number of the segment currently appended to.
  pub fn current_segment(&self) -> Result<u64> {
    Ok(self.current()?.seq())
  }

  /// Appends `payload` as one message and returns its sequence.
  pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
    self.append_with(payload.len(), |buf| {
      buf.copy_from_slice(payload);
      Ok(())
    })
  }

  /// Reserves a `size` byte message, lets `fill` write its payload in place, then
  /// publishes it.
  ///
  /// If `fill` returns an error the reservation is withdrawn and nothing is
  /// published. If `fill` panics the reservation stays dangling: every later call
  /// on this writer fails with [`Error::ProtocolViolation`] until the journal is
  /// reopened and recovery discards it.
  pub fn append_with<F>(&mut self, size: usize, fill: F) -> Result<u64>
  where
    F: FnOnce(&mut [u8]) -> Result<()>,
  {
    let max = self.journal.options().max_message_size;
    if size > max {
      return Err(Error::MessageTooLarge { size, max });
    }

    if !self.current_mut()?.try_fit(size)? {
      self.roll()?;
      // A fresh segment always holds one maximum-size message.
      let segment = self.current_mut()?;
      if !segment.try_fit(size)? {
        return Err(Error::MessageTooLarge {
          size,
          max: segment.capacity() - SEGMENT_HEADER_SIZE - FRAME_HEADER_SIZE,
        });
      }
    }

    let segment = self.current_mut()?;
    let seq = segment.reserve(size)?;
    let filled = fill(segment.payload_mut(seq)?);
    if let Err(e) = filled {
      segment.abandon(seq)?;
      return Err(e);
    }
    segment.complete(seq)?;

    if self.journal.options().sync_mode == SyncMode::Strict {
      self.current()?.flush()?;
    }

    Ok(seq)
  }

  pub fn flush(&mut self) -> Result<()> {
    self.current()?.flush()
  }

  /// Flushes and closes the current segment. The writer may be started again.
  pub fn stop(&mut self) -> Result<()> {
    match self.segment.take() {
      Some(segment) => segment.close(),
      None => Ok(()),
    }
  }

  /// A crash between creating a segment and flushing its predecessor can leave the
  /// predecessor without an EOF sentinel, and readers would wait in it forever.
  /// Scans segment `seq` and seals it if needed. Returns true if it was repaired.
  fn seal_previous(&self, seq: u64) -> Result<bool> {
    let path = self.journal.segment_path(seq);
    if !path.exists() {
      return Ok(false);
    }

    // min_len 0: never grow a retired segment
    let mut previous = Segment::open_writable(&path, seq, 0)?;
    let report = previous.seek_to_end(self.journal.options().on_corruption)?;
    if previous.is_full() {
      return Ok(false);
    }

    warn!(
      target: "ironjournal",
      "Segment {} of {} was not sealed before segment {} was created, sealing at offset {}",
      seq, self.journal.name(), seq + 1, report.end_offset
    );
    previous.seal()?;
    previous.close()?;
    Ok(true)
  }

  /// Creates the next segment, starting at the running message counter, then
  /// retires the full one. On failure the full segment stays current.
  ///
  /// The sentinel written by `try_fit` is flushed before the next segment exists on
  /// disk, unless the sync mode is `Async`.
  fn roll(&mut self) -> Result<()> {
    let (next_seq, first_message_seq) = {
      let full = self.current()?;
      (full.seq() + 1, full.next_message_seq())
    };

    let opts = self.journal.options();
    if opts.sync_mode != SyncMode::Async {
      self.current()?.flush()?;
    }

    let next = Segment::create(
      self.journal.dir(),
      self.journal.name(),
      next_seq,
      opts.segment_capacity,
      first_message_seq,
      opts.checksum,
    )?;

    info!(
      target: "ironjournal",
      "Rolled {} to segment {} starting at message {}",
      self.journal.name(), next_seq, first_message_seq
    );

    // Already flushed above when durability matters
    drop(self.segment.replace(next));
    Ok(())
  }

  fn current(&self) -> Result<&Segment> {
    self.segment.as_ref().ok_or(Error::NotStarted)
  }

  fn current_mut(&mut self) -> Result<&mut Segment> {
    self.segment.as_mut().ok_or(Error::NotStarted)
  }
}

impl Drop for JournalWriter {
  fn drop(&mut self) {
    if let Some(segment) = self.segment.take() {
      let path = segment.path().to_path_buf();
      if let Err(e) = segment.close() {
        error!(target: "ironjournal", "Failed to flush segment on close. Data loss possible. Path: {:?}, Error: {}", path, e);
      }
    }
  }
}
