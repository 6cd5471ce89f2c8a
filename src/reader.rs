use std::fs;

use tracing::debug;

use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::segment::{FrameState, Segment};

/// Where a reader stands, so a failed seek can put it back.
#[derive(Debug, Clone, Copy)]
struct Cursor {
  segment: u64,
  position: usize,
  next_message_seq: u64,
  skip_until: u64,
}

/// An independent, non-blocking cursor over a journal.
///
/// Each reader owns its own mapping of the segment it is on and shares nothing
/// with the writer or other readers except the file contents.
pub struct JournalReader {
  journal: Journal,
  segment: Option<Segment>,
  /// Messages below this sequence are skipped rather than delivered. Set when the
  /// requested start position has not been written yet.
  skip_until: u64,
}

impl JournalReader {
  pub fn new(journal: Journal) -> Self {
    Self {
      journal,
      segment: None,
      skip_until: 0,
    }
  }

  pub fn journal(&self) -> &Journal {
    &self.journal
  }

  /// Opens the segment that may contain `from_seq` and scans forward to it.
  ///
  /// Fails with [`Error::JournalNotFound`] if the journal has no segments. If
  /// `from_seq` has not been written yet, the reader waits at the end and delivers
  /// `from_seq` once it appears.
  pub fn start(&mut self, from_seq: u64) -> Result<()> {
    let seq = self.journal.select_segment_containing(from_seq)?;
    self.segment = Some(self.open(seq)?);
    self.skip_until = from_seq;
    self.scan_to(from_seq)?;
    debug!(target: "ironjournal", "Reader on {} started at message {} (segment {})", self.journal.name(), from_seq, seq);
    Ok(())
  }

  /// Releases the current segment.
  pub fn stop(&mut self) {
    self.segment = None;
  }

  pub fn is_started(&self) -> bool {
    self.segment.is_some()
  }

  /// Sequence of the next message `read_next` will deliver.
  pub fn position(&self) -> Result<u64> {
    Ok(self.current()?.next_message_seq().max(self.skip_until))
  }

  /// Sequence number of the segment the reader is on.
  pub fn current_segment(&self) -> Result<u64> {
    Ok(self.current()?.seq())
  }

  /// Delivers the next message to `f` as `(seq, payload)` and advances.
  ///
  /// The payload borrows the segment mapping and is only valid during the call.
  /// Returns `Ok(false)` when nothing new has been published yet.
  pub fn read_next<F>(&mut self, f: F) -> Result<bool>
  where
    F: FnOnce(u64, &[u8]),
  {
    let verify = self.journal.options().verify_checksums;
    loop {
      let Some(len) = self.next_ready()? else {
        return Ok(false);
      };

      let skip_until = self.skip_until;
      let segment = self.current_mut()?;
      let seq = segment.next_message_seq();
      if seq < skip_until {
        segment.advance()?;
        continue;
      }

      if verify {
        segment.verify(len)?;
      }
      f(seq, segment.payload(len));
      segment.advance()?;
      return Ok(true);
    }
  }

  /// Like `read_next`, but copies the payload out.
  pub fn read_next_owned(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
    let mut out = None;
    self.read_next(|seq, payload| out = Some((seq, payload.to_vec())))?;
    Ok(out)
  }

  /// Positions the reader so the next delivered message is `target`.
  ///
  /// Returns `Ok(false)` and leaves the position unchanged if `target` has not
  /// been written. Seeking backwards, or into a later segment, reopens the
  /// segment that contains `target` and scans it from the start.
  pub fn seek_to(&mut self, target: u64) -> Result<bool> {
    let saved = self.cursor()?;

    let containing = self.journal.select_segment_containing(target)?;
    if target < saved.next_message_seq || containing != saved.segment {
      debug!(target: "ironjournal", "Reader on {} reopening segment {} to seek to {}", self.journal.name(), containing, target);
      self.segment = Some(self.open(containing)?);
    }
    self.skip_until = 0;

    if self.scan_to(target)? && self.next_ready()?.is_some() {
      return Ok(true);
    }

    self.restore(saved)?;
    Ok(false)
  }

  /// Advances over completed frames below `target`, following rollovers.
  /// Returns true if the cursor ends on `target`.
  fn scan_to(&mut self, target: u64) -> Result<bool> {
    loop {
      if self.next_ready()?.is_none() {
        return Ok(self.current()?.next_message_seq() == target);
      }
      let segment = self.current_mut()?;
      if segment.next_message_seq() >= target {
        return Ok(segment.next_message_seq() == target);
      }
      segment.advance()?;
    }
  }

  /// Length of the ready frame at the cursor, rolling into the next segment at
  /// end of segment. `None` if nothing new is available.
  fn next_ready(&mut self) -> Result<Option<usize>> {
    loop {
      match self.current()?.poll()? {
        FrameState::Ready { len } => return Ok(Some(len)),
        FrameState::Pending => return Ok(None),
        FrameState::EndOfSegment => {
          if !self.roll_to_next()? {
            return Ok(None);
          }
        }
      }
    }
  }

  /// Moves to the next segment if the writer has created it.
  fn roll_to_next(&mut self) -> Result<bool> {
    let (seq, position, expected_first, mapped, path) = {
      let current = self.current()?;
      (
        current.seq(),
        current.position(),
        current.next_message_seq(),
        current.capacity(),
        current.path().to_path_buf(),
      )
    };

    // A restarted writer may have grown the file past our mapping.
    if fs::metadata(&path)?.len() as usize > mapped {
      let mut remapped = self.open(seq)?;
      remapped.reposition(position, expected_first);
      self.segment = Some(remapped);
      return Ok(true);
    }

    let next_seq = seq + 1;

    // The writer publishes the sentinel before creating the next segment.
    if !self.journal.segment_path(next_seq).exists() {
      return Ok(false);
    }

    let next = self.open(next_seq)?;
    if next.first_message_seq() != expected_first {
      return Err(Error::Corruption(format!(
        "Segment {} of {} starts at message {}, expected {}",
        next_seq,
        self.journal.name(),
        next.first_message_seq(),
        expected_first
      )));
    }

    debug!(target: "ironjournal", "Reader on {} rolled to segment {}", self.journal.name(), next_seq);
    self.segment = Some(next);
    Ok(true)
  }

  fn open(&self, seq: u64) -> Result<Segment> {
    let path = self.journal.segment_path(seq);
    if !path.exists() {
      return Err(Error::SegmentNotFound(seq));
    }
    Segment::open_read_only(&path, seq)
  }

  fn cursor(&self) -> Result<Cursor> {
    let segment = self.current()?;
    Ok(Cursor {
      segment: segment.seq(),
      position: segment.position(),
      next_message_seq: segment.next_message_seq(),
      skip_until: self.skip_until,
    })
  }

  fn restore(&mut self, saved: Cursor) -> Result<()> {
    if self.current()?.seq() != saved.segment {
      self.segment = Some(self.open(saved.segment)?);
    }
    self
      .current_mut()?
      .reposition(saved.position, saved.next_message_seq);
    self.skip_until = saved.skip_until;
    Ok(())
  }

  fn current(&self) -> Result<&Segment> {
    self.segment.as_ref().ok_or(Error::NotStarted)
  }

  fn current_mut(&mut self) -> Result<&mut Segment> {
    self.segment.as_mut().ok_or(Error::NotStarted)
  }
}
