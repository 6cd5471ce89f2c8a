mod common;
use common::TestEnv;
use ironjournal::{ChecksumType, Error, Journal, SyncMode};

#[test]
fn test_single_append_read() {
  let mut env = TestEnv::with_default();

  // Write sequential items
  let id1 = env.writer.append(b"item_1").unwrap();
  let id2 = env.writer.append(b"item_2").unwrap();

  // Verify sequence IDs
  assert_eq!(id1, 0);
  assert_eq!(id2, 1);

  // Read back
  let items = env.read_all(0);
  assert_eq!(items, vec![(0, b"item_1".to_vec()), (1, b"item_2".to_vec())]);
}

#[test]
fn test_round_trip_payload_sizes() {
  let mut env = TestEnv::with_default();
  let max = env.journal.options().max_message_size;

  let sizes = [0, 1, 7, 8, 9, 15, 16, 17, 255, 4096, max];
  for (i, &size) in sizes.iter().enumerate() {
    let payload: Vec<u8> = (0..size).map(|b| (b * 31 + i) as u8).collect();
    assert_eq!(env.writer.append(&payload).unwrap(), i as u64);
  }

  let items = env.read_all(0);
  assert_eq!(items.len(), sizes.len());
  for (i, (seq, payload)) in items.iter().enumerate() {
    assert_eq!(*seq, i as u64);
    let expected: Vec<u8> = (0..sizes[i]).map(|b| (b * 31 + i) as u8).collect();
    assert_eq!(payload, &expected, "Mismatch for size {}", sizes[i]);
  }
}

#[test]
fn test_append_with_fills_in_place() {
  let mut env = TestEnv::with_default();

  let seq = env
    .writer
    .append_with(8, |buf| {
      buf.copy_from_slice(&0xDEADBEEFu64.to_le_bytes());
      Ok(())
    })
    .unwrap();
  assert_eq!(seq, 0);

  let mut reader = env.reader_at(0);
  let mut seen = None;
  assert!(
    reader
      .read_next(|seq, payload| seen = Some((seq, u64::from_le_bytes(payload.try_into().unwrap()))))
      .unwrap()
  );
  assert_eq!(seen, Some((0, 0xDEADBEEF)));
}

#[test]
fn test_failed_fill_publishes_nothing() {
  let mut env = TestEnv::with_default();
  env.writer.append(b"before").unwrap();

  let result = env.writer.append_with(32, |buf| {
    buf.fill(0xEE);
    Err(Error::Io(std::io::Error::other("encoder failed")))
  });
  assert!(matches!(result, Err(Error::Io(_))));

  // The slot is reused and the sequence is not consumed.
  assert_eq!(env.writer.append(b"after").unwrap(), 1);
  let items = env.read_all(0);
  assert_eq!(items, vec![(0, b"before".to_vec()), (1, b"after".to_vec())]);
}

#[test]
fn test_message_too_large() {
  let mut env = TestEnv::with_default();
  let max = env.journal.options().max_message_size;

  let result = env.writer.append(&vec![0u8; max + 1]);
  assert!(matches!(result, Err(Error::MessageTooLarge { .. })));
  assert_eq!(env.writer.next_message_seq().unwrap(), 0);
}

#[test]
fn test_restart_consistency() {
  // Create a persistent directory path outside the TestEnv scope
  let dir = tempfile::tempdir().unwrap();
  let mut opts = common::small_options();
  opts.root_path = dir.path().to_path_buf();
  opts.sync_mode = SyncMode::Strict; // Ensure flush to disk

  // Phase 1: Write data and drop the writer
  {
    let journal = Journal::open(opts.clone()).unwrap();
    let mut writer = journal.writer();
    writer.start().unwrap();
    writer.append(b"persistent_data").unwrap();
    // writer dropped here
  }

  // Phase 2: Open a new writer on the same directory
  {
    let journal = Journal::open(opts).unwrap();
    let mut writer = journal.writer();
    let report = writer.start().unwrap();
    assert_eq!(report.messages, 1);
    assert!(!report.discarded_reservation);

    // Verify sequence ID continued correctly
    let id = writer.append(b"new_data").unwrap();
    assert_eq!(id, 1);

    let mut reader = journal.reader();
    reader.start(0).unwrap();
    assert_eq!(reader.read_next_owned().unwrap(), Some((0, b"persistent_data".to_vec())));
    assert_eq!(reader.read_next_owned().unwrap(), Some((1, b"new_data".to_vec())));
  }
}

#[test]
fn test_journals_sharing_a_directory_are_isolated() {
  let env = TestEnv::with_default();
  let mut opts_a = env.journal.options().clone();
  opts_a.name = "alpha".into();
  let mut opts_b = opts_a.clone();
  opts_b.name = "alphabet".into();

  let a = Journal::open(opts_a).unwrap();
  let b = Journal::open(opts_b).unwrap();
  let mut wa = a.writer();
  let mut wb = b.writer();
  wa.start().unwrap();
  wb.start().unwrap();

  wa.append(b"A1").unwrap();
  wb.append(b"B1").unwrap();

  // Sequence IDs should be independent
  assert_eq!(wa.append(b"A2").unwrap(), 1);
  assert_eq!(wb.append(b"B2").unwrap(), 1);

  let mut ra = a.reader();
  ra.start(1).unwrap();
  assert_eq!(ra.read_next_owned().unwrap(), Some((1, b"A2".to_vec())));
  assert_eq!(a.list_segments().unwrap(), vec![0]);
  assert_eq!(b.list_segments().unwrap(), vec![0]);
}

#[test]
fn test_crc32_segments() {
  let mut opts = common::small_options();
  opts.checksum = ChecksumType::Crc32;
  let mut env = TestEnv::new(opts);

  env.writer.append(b"crc protected").unwrap();
  assert_eq!(env.journal.segments().unwrap()[0].version, 2);
  assert_eq!(env.read_all(0), vec![(0, b"crc protected".to_vec())]);
}

#[test]
fn test_reader_on_missing_journal() {
  let dir = tempfile::tempdir().unwrap();
  let mut opts = common::small_options();
  opts.root_path = dir.path().to_path_buf();
  let journal = Journal::open(opts).unwrap();

  let mut reader = journal.reader();
  assert!(matches!(reader.start(0), Err(Error::JournalNotFound(_))));
}

#[test]
fn test_unstarted_handles() {
  let env = TestEnv::with_default();
  let mut writer = env.journal.writer();
  assert!(matches!(writer.append(b"x"), Err(Error::NotStarted)));

  let mut reader = env.journal.reader();
  assert!(matches!(reader.read_next(|_, _| {}), Err(Error::NotStarted)));
}
