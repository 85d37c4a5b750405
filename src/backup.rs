//! sdmmc-datalogger - Backup copy
//!
//! Streams one open file into another through a fixed buffer, so the size of
//! the log never matters.

use crate::error::CopyError;
use crate::storage::StorageFile;

/// One block at a time.
pub const COPY_CHUNK: usize = 512;

/// Copy everything left in `from` into `to`. Each chunk is handed to
/// `observe` after it has been written. Returns the number of bytes copied.
pub fn copy<R, W, F>(from: &mut R, to: &mut W, mut observe: F) -> Result<u64, CopyError<R::Error>>
where
    R: StorageFile,
    W: StorageFile<Error = R::Error>,
    F: FnMut(&[u8]),
{
    let mut buffer = [0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = from.read(&mut buffer).map_err(CopyError::Read)?;
        if n == 0 {
            break;
        }
        let chunk = &buffer[..n];
        to.write_all(chunk).map_err(CopyError::Write)?;
        observe(chunk);
        total += n as u64;
    }
    trace!("copied {} bytes", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenMode, Storage, StorageError};
    use crate::test::{Fault, MemStorage};

    #[test]
    fn copies_more_than_one_chunk() {
        let storage = MemStorage::new();
        let contents: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
        storage.insert("failed.txt", &contents);

        let mut from = storage.open("failed.txt", OpenMode::Read).unwrap();
        let mut to = storage.open("backup.txt", OpenMode::Truncate).unwrap();
        let mut seen = Vec::new();
        let total = copy(&mut from, &mut to, |chunk| {
            assert!(chunk.len() <= COPY_CHUNK);
            seen.extend_from_slice(chunk);
        })
        .unwrap();
        drop(to);

        assert_eq!(total, 1300);
        assert_eq!(seen, contents);
        assert_eq!(storage.contents("backup.txt").unwrap(), contents);
    }

    #[test]
    fn empty_source_copies_nothing() {
        let storage = MemStorage::new();
        storage.insert("failed.txt", b"");

        let mut from = storage.open("failed.txt", OpenMode::Read).unwrap();
        let mut to = storage.open("backup.txt", OpenMode::Truncate).unwrap();
        let mut calls = 0;
        assert_eq!(copy(&mut from, &mut to, |_| calls += 1), Ok(0));
        assert_eq!(calls, 0);
    }

    #[test]
    fn write_failure_stops_the_copy() {
        let storage = MemStorage::new();
        storage.insert("failed.txt", &[b'x'; 1024]);
        storage.inject(Fault::WriteLimit {
            name: "backup.txt",
            bytes: 600,
        });

        let mut from = storage.open("failed.txt", OpenMode::Read).unwrap();
        let mut to = storage.open("backup.txt", OpenMode::Truncate).unwrap();
        let mut seen = 0;
        let result = copy(&mut from, &mut to, |chunk| seen += chunk.len());
        assert_eq!(result, Err(CopyError::Write(StorageError::NoSpace)));
        // Only the first chunk was reported.
        assert_eq!(seen, COPY_CHUNK);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
