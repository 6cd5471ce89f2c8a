use crate::error::{Error, Result};

pub const SEGMENT_SUFFIX: &str = ".data";
pub const TEMP_SUFFIX: &str = ".tmp";

/// Checks that a journal name is safe to use as a filename prefix.
///
/// The name must not end in a digit: `log1` + segment `2` and `log` + segment `12`
/// would both produce `log12.data`.
pub fn validate_journal_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Config("Journal name cannot be empty".into()));
  }

  if let Some(c) = name
    .chars()
    .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'))
  {
    return Err(Error::Config(format!("Invalid character {:?} in journal name: {}", c, name)));
  }

  // Prevent directory traversal
  if name == ".." || name == "." {
    return Err(Error::Config(format!("Invalid journal name: {}", name)));
  }

  if name.ends_with(|c: char| c.is_ascii_digit()) {
    return Err(Error::Config(format!("Journal name must not end in a digit: {}", name)));
  }

  Ok(())
}

/// Generates a segment filename.
/// Format: `<name><seq>.data`, seq in bare decimal without leading zeros.
pub fn segment_filename(name: &str, seq: u64) -> String {
  format!("{}{}{}", name, seq, SEGMENT_SUFFIX)
}

/// Filename a segment is initialised under before it is renamed into place.
pub fn temp_segment_filename(name: &str, seq: u64) -> String {
  format!("{}{}", segment_filename(name, seq), TEMP_SUFFIX)
}

/// Parses the segment sequence from a filename belonging to journal `name`.
pub fn parse_segment_seq(name: &str, filename: &str) -> Option<u64> {
  let digits = filename.strip_prefix(name)?.strip_suffix(SEGMENT_SUFFIX)?;
  // Reject "+1", "01" and other forms `segment_filename` never produces.
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || (digits.len() > 1 && digits.starts_with('0')) {
    return None;
  }
  digits.parse::<u64>().ok()
}

/// True if `filename` is a leftover temporary segment of journal `name`.
pub fn is_temp_segment(name: &str, filename: &str) -> bool {
  filename
    .strip_suffix(TEMP_SUFFIX)
    .is_some_and(|base| parse_segment_seq(name, base).is_some())
}
