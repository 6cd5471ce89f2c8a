use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::JournalOptions;
use crate::error::{Error, Result};
use crate::frame::SegmentHeader;
use crate::reader::JournalReader;
use crate::util::{self, segment_filename};
use crate::writer::JournalWriter;

/// Metadata of one segment file, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
  pub seq: u64,
  pub first_message_seq: u64,
  pub version: u16,
  pub path: PathBuf,
  pub file_size: u64,
}

/// A named journal inside a directory.
///
/// Holds no state beyond its options: every selection below lists the directory
/// afresh, so a reader sees segments created by a writer in another process.
#[derive(Debug, Clone)]
pub struct Journal {
  options: JournalOptions,
}

impl Journal {
  /// Validates `options` and ensures the journal directory exists.
  pub fn open(options: JournalOptions) -> Result<Self> {
    options.validate()?;
    fs::create_dir_all(&options.root_path)?;
    Ok(Self { options })
  }

  pub fn options(&self) -> &JournalOptions {
    &self.options
  }

  pub fn name(&self) -> &str {
    &self.options.name
  }

  pub fn dir(&self) -> &Path {
    &self.options.root_path
  }

  pub fn segment_path(&self, seq: u64) -> PathBuf {
    self.dir().join(segment_filename(self.name(), seq))
  }

  /// A writer handle. Call [`JournalWriter::start`] before appending.
  pub fn writer(&self) -> JournalWriter {
    JournalWriter::new(self.clone())
  }

  /// A reader handle. Call [`JournalReader::start`] before reading.
  pub fn reader(&self) -> JournalReader {
    JournalReader::new(self.clone())
  }

  /// Sequence numbers of this journal's segment files, ascending.
  pub fn list_segments(&self) -> Result<Vec<u64>> {
    let mut seqs = Vec::new();
    for entry in fs::read_dir(self.dir())? {
      let entry = entry?;
      let filename = entry.file_name().to_string_lossy().to_string();
      if let Some(seq) = util::parse_segment_seq(self.name(), &filename) {
        seqs.push(seq);
      }
    }
    seqs.sort_unstable();
    Ok(seqs)
  }

  /// The segment to append to: the highest existing one, or 0 for a new journal.
  /// The write offset inside it is unknown until the recovery scan runs.
  pub fn select_last_segment_for_write(&self) -> Result<u64> {
    Ok(self.list_segments()?.last().copied().unwrap_or(0))
  }

  pub fn select_first_segment_for_read(&self) -> Result<u64> {
    self
      .list_segments()?
      .first()
      .copied()
      .ok_or_else(|| Error::JournalNotFound(self.name().to_string()))
  }

  /// The segment whose range may contain `message_seq`: the last one whose header
  /// `firstMessageSeq` is not greater than it. The caller scans forward from there.
  pub fn select_segment_containing(&self, message_seq: u64) -> Result<u64> {
    let seqs = self.list_segments()?;
    let first = *seqs
      .first()
      .ok_or_else(|| Error::JournalNotFound(self.name().to_string()))?;

    for &seq in seqs.iter().rev() {
      if self.read_header(seq)?.first_message_seq <= message_seq {
        return Ok(seq);
      }
    }
    Ok(first)
  }

  pub fn read_header(&self, seq: u64) -> Result<SegmentHeader> {
    let path = self.segment_path(seq);
    let file = match File::open(&path) {
      Ok(f) => f,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::SegmentNotFound(seq)),
      Err(e) => return Err(Error::Io(e)),
    };
    SegmentHeader::read(&mut BufReader::new(file))
  }

  /// Describes every segment of this journal, ascending.
  pub fn segments(&self) -> Result<Vec<SegmentInfo>> {
    self
      .list_segments()?
      .into_iter()
      .map(|seq| {
        let header = self.read_header(seq)?;
        let path = self.segment_path(seq);
        let file_size = fs::metadata(&path)?.len();
        Ok(SegmentInfo {
          seq,
          first_message_seq: header.first_message_seq,
          version: header.version,
          path,
          file_size,
        })
      })
      .collect()
  }

  /// Deletes segment files left half-initialised by a crash during creation.
  /// Returns the number of files removed.
  pub(crate) fn remove_stale_temp_files(&self) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(self.dir())? {
      let entry = entry?;
      let filename = entry.file_name().to_string_lossy().to_string();
      if util::is_temp_segment(self.name(), &filename) {
        warn!(target: "ironjournal", "Removing stale temporary segment {}", entry.path().display());
        fs::remove_file(entry.path())?;
        removed += 1;
      }
    }
    Ok(removed)
  }
}
