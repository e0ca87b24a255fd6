//! Incremental file tailer.
//!
//! Reads the bytes appended to a file since a caller-held offset and hands
//! them out chunk by chunk. Detects truncation (file shorter than the
//! offset) and restarts from the beginning. All I/O failures map to status
//! codes; tailing a file that a writer is appending to, renaming, or
//! deleting concurrently must never raise.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Chunk size used when the caller passes 0.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Terminal status of one tail call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStatus {
    /// Nothing new past the offset.
    NoData,
    /// At least one chunk was delivered.
    ReadSome,
    FileNotFound,
    AccessDenied,
    IoError,
    /// The file shrank below the offset; reading restarted from zero.
    /// Reported even when the shrunken file had nothing to read yet.
    TruncatedReset,
}

impl TailStatus {
    /// True for outcomes that leave the caller's offset trustworthy.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TailStatus::NoData | TailStatus::ReadSome | TailStatus::TruncatedReset
        )
    }
}

/// Reads from `path` starting at `*offset`, delivering chunks of at most
/// `chunk_size` bytes to `on_chunk`. Each chunk slice is valid only for the
/// duration of its callback.
///
/// `*offset` is advanced by the exact number of bytes delivered, and only on
/// a successful call; a failure status leaves it untouched so the next call
/// retries the same range. On truncation the effective offset is reset to
/// zero before any bytes are delivered.
pub fn tail_since<F: FnMut(&[u8])>(
    path: &Path,
    offset: &mut u64,
    chunk_size: usize,
    mut on_chunk: F,
) -> TailStatus {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => return map_io_error(&e),
    };

    let mut effective = *offset;
    let mut truncated = false;
    if metadata.len() < effective {
        effective = 0;
        truncated = true;
    }

    if metadata.len() == effective {
        if truncated {
            *offset = 0;
            return TailStatus::TruncatedReset;
        }
        return TailStatus::NoData;
    }

    // Plain read-only open: concurrent appends, renames, and unlinks by the
    // writer are all tolerated on every supported platform.
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return map_io_error(&e),
    };
    if let Err(e) = file.seek(SeekFrom::Start(effective)) {
        return map_io_error(&e);
    }

    let mut buf = vec![0u8; chunk_size];
    let mut delivered: u64 = 0;
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                on_chunk(&buf[..n]);
                delivered += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return map_io_error(&e),
        }
    }

    *offset = effective + delivered;
    if truncated {
        TailStatus::TruncatedReset
    } else if delivered > 0 {
        TailStatus::ReadSome
    } else {
        TailStatus::NoData
    }
}

fn map_io_error(e: &io::Error) -> TailStatus {
    match e.kind() {
        io::ErrorKind::NotFound => TailStatus::FileNotFound,
        io::ErrorKind::PermissionDenied => TailStatus::AccessDenied,
        _ => TailStatus::IoError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_all(path: &Path, offset: &mut u64, chunk_size: usize) -> (TailStatus, Vec<u8>) {
        let mut data = Vec::new();
        let status = tail_since(path, offset, chunk_size, |chunk| {
            data.extend_from_slice(chunk);
        });
        (status, data)
    }

    #[test]
    fn test_reads_appended_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "first\n").unwrap();

        let mut offset = 0;
        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::ReadSome);
        assert_eq!(data, b"first\n");
        assert_eq!(offset, 6);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"second\n").unwrap();
        drop(f);

        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::ReadSome);
        assert_eq!(data, b"second\n");
        assert_eq!(offset, 13);
    }

    #[test]
    fn test_no_data_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "abc").unwrap();

        let mut offset = 3;
        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::NoData);
        assert!(data.is_empty());
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_small_chunks_deliver_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        std::fs::write(&path, &content).unwrap();

        let mut offset = 0;
        let mut chunks = 0;
        let mut data = Vec::new();
        let status = tail_since(&path, &mut offset, 64, |chunk| {
            assert!(chunk.len() <= 64);
            chunks += 1;
            data.extend_from_slice(chunk);
        });
        assert_eq!(status, TailStatus::ReadSome);
        assert_eq!(data, content);
        assert!(chunks >= 1000 / 64);
        assert_eq!(offset, 1000);
    }

    #[test]
    fn test_truncation_resets_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "a long first generation\n").unwrap();

        let mut offset = 24;
        std::fs::write(&path, "new\n").unwrap();

        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::TruncatedReset);
        assert_eq!(data, b"new\n");
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_truncation_with_no_new_bytes_still_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "").unwrap();

        let mut offset = 100;
        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::TruncatedReset);
        assert!(data.is_empty());
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_missing_file_leaves_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.log");

        let mut offset = 42;
        let (status, data) = read_all(&path, &mut offset, 0);
        assert_eq!(status, TailStatus::FileNotFound);
        assert!(data.is_empty());
        assert_eq!(offset, 42);
    }

    #[test]
    fn test_success_statuses() {
        assert!(TailStatus::NoData.is_success());
        assert!(TailStatus::ReadSome.is_success());
        assert!(TailStatus::TruncatedReset.is_success());
        assert!(!TailStatus::FileNotFound.is_success());
        assert!(!TailStatus::AccessDenied.is_success());
        assert!(!TailStatus::IoError.is_success());
    }
}
