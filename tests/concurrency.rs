mod common;
use common::TestEnv;
use ironjournal::SyncMode;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const MESSAGES: u64 = 2_000;

fn message(i: u64) -> Vec<u8> {
  // Variable length so frames land on odd offsets
  let len = 8 + (i % 57) as usize;
  let mut buf = vec![(i % 251) as u8; len];
  buf[..8].copy_from_slice(&i.to_le_bytes());
  buf
}

fn tail(mut reader: ironjournal::JournalReader, from: u64) -> Vec<u64> {
  let deadline = Instant::now() + Duration::from_secs(30);
  let mut seen = Vec::new();
  let mut expected = from;

  while expected < MESSAGES {
    assert!(Instant::now() < deadline, "Reader stalled at {}", expected);
    let got = reader
      .read_next(|seq, payload| {
        assert_eq!(payload, message(seq).as_slice(), "Payload mismatch at {}", seq);
        seen.push(seq);
      })
      .unwrap();

    if got {
      expected += 1;
    } else {
      thread::yield_now();
    }
  }
  seen
}

#[test]
fn test_concurrent_writer_and_readers() {
  let mut opts = common::small_options();
  opts.sync_mode = SyncMode::Async; // Speed up test, rely on publication ordering
  opts.segment_capacity = 4096; // Force many rollovers
  opts.max_message_size = 128;
  let TestEnv {
    journal,
    mut writer,
    _dir,
    ..
  } = TestEnv::new(opts);

  // Seed data so readers can start at 0 and 5
  for i in 0..10 {
    writer.append(&message(i)).unwrap();
  }

  let barrier = Arc::new(Barrier::new(3));
  let mut handles = Vec::new();

  for from in [0u64, 5] {
    let mut reader = journal.reader();
    reader.start(from).unwrap();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait(); // Synchronize start
      (from, tail(reader, from))
    }));
  }

  let writer_handle = thread::spawn(move || {
    barrier.wait();
    for i in 10..MESSAGES {
      assert_eq!(writer.append(&message(i)).unwrap(), i);
    }
    writer
  });

  let writer = writer_handle.join().unwrap();
  for h in handles {
    let (from, seen) = h.join().unwrap();
    let expected: Vec<u64> = (from..MESSAGES).collect();
    assert_eq!(seen, expected, "Reader from {} saw gaps or reordering", from);
  }

  assert!(journal.list_segments().unwrap().len() > 1);
  drop(writer);
}

#[test]
fn test_reader_started_before_writer_appends() {
  let env = TestEnv::with_default();
  let journal = env.journal.clone();
  let TestEnv { mut writer, _dir, .. } = env;

  // Segment 0 exists but is empty
  let mut reader = journal.reader();
  reader.start(0).unwrap();
  let handle = thread::spawn(move || tail(reader, 0));

  for i in 0..MESSAGES {
    writer.append(&message(i)).unwrap();
  }

  let seen = handle.join().unwrap();
  assert_eq!(seen.len() as u64, MESSAGES);
}
