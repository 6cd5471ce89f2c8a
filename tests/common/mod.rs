#![allow(dead_code)]

use ironjournal::{Journal, JournalOptions, JournalWriter};
use tempfile::TempDir;

pub struct TestEnv {
  pub journal: Journal,
  pub writer: JournalWriter,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub root: std::path::PathBuf,
}

impl TestEnv {
  pub fn new(mut options: JournalOptions) -> Self {
    let dir = tempfile::tempdir().unwrap();
    options.root_path = dir.path().to_path_buf();
    let root = options.root_path.clone();

    let journal = Journal::open(options).unwrap();
    let mut writer = journal.writer();
    writer.start().unwrap();

    Self {
      journal,
      writer,
      _dir: dir,
      root,
    }
  }

  pub fn with_default() -> Self {
    Self::new(small_options())
  }

  /// Options with a capacity that fits exactly `count` frames of `payload_size`.
  pub fn with_capacity_for(count: u64, payload_size: usize) -> Self {
    let mut opts = small_options();
    opts.segment_capacity = segment_capacity_for(count, payload_size);
    opts.max_message_size = payload_size;
    Self::new(opts)
  }

  /// Opens and starts a fresh reader at `from_seq`.
  pub fn reader_at(&self, from_seq: u64) -> ironjournal::JournalReader {
    let mut reader = self.journal.reader();
    reader.start(from_seq).unwrap();
    reader
  }

  /// Reads everything currently published.
  pub fn read_all(&self, from_seq: u64) -> Vec<(u64, Vec<u8>)> {
    let mut reader = self.reader_at(from_seq);
    let mut out = Vec::new();
    while let Some(item) = reader.read_next_owned().unwrap() {
      out.push(item);
    }
    out
  }
}

pub fn small_options() -> JournalOptions {
  let mut opts = JournalOptions::new("", "test");
  opts.segment_capacity = 1024 * 1024; // 1 MB
  opts.max_message_size = 64 * 1024; // 64 KB
  opts
}

pub fn segment_capacity_for(count: u64, payload_size: usize) -> u64 {
  let header = ironjournal::SEGMENT_HEADER_SIZE as u64;
  let frame = (ironjournal::FRAME_HEADER_SIZE + payload_size) as u64;
  header + count * frame
}
