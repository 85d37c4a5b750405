//! sdmmc-datalogger - Storage
//!
//! A mounted volume is anything that can open, read, write and remove flat
//! files by name. The SD card backend lives in [`sdcard`].
//!
//! Volumes unmount themselves when dropped, files close themselves when
//! dropped. Calling [`StorageFile::close`] explicitly is still preferred
//! because it reports errors.

use core::fmt::Debug;

use crate::config::MountConfig;

pub mod sdcard;

/// How a file is opened.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start. The file must exist.
    Read,
    /// Create the file, or empty it if it exists, and write from the start.
    Truncate,
    /// Create the file if needed and write after its current end.
    Append,
}

/// Errors from file operations on a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError<E> {
    /// No file by that name.
    NotFound,
    /// The volume's open file limit was reached.
    TooManyOpenFiles,
    /// The name cannot be stored on this filesystem.
    InvalidName,
    /// The volume is full.
    NoSpace,
    /// The file was already closed.
    Closed,
    /// The file is open and cannot be opened again or removed.
    InUse,
    /// The filesystem or block device failed.
    Io(E),
}

/// Errors from mounting a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError<E> {
    /// The card did not respond or could not be initialized.
    CardInit(E),
    /// The card works but holds no filesystem we can mount.
    Filesystem(E),
    /// Putting a new filesystem on the card failed.
    Format(E),
}

/// What was learnt while mounting.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountInfo {
    /// Size of the whole card.
    pub capacity_bytes: u64,
    /// The card was formatted during this mount.
    pub formatted: bool,
}

/// An open file.
pub trait StorageFile {
    type Error: Debug;

    /// Read up to `buffer.len()` bytes. `Ok(0)` means end of file.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StorageError<Self::Error>>;

    /// Write all of `data` at the current position.
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError<Self::Error>>;

    /// Close the file, committing its size and contents.
    fn close(self) -> Result<(), StorageError<Self::Error>>;
}

/// A mounted volume.
pub trait Storage {
    type Error: Debug;
    type File<'s>: StorageFile<Error = Self::Error>
    where
        Self: 's;

    fn open(&self, name: &str, mode: OpenMode) -> Result<Self::File<'_>, StorageError<Self::Error>>;

    /// Remove a file. The file must not be open.
    fn remove(&self, name: &str) -> Result<(), StorageError<Self::Error>>;
}

/// A medium that can be mounted.
pub trait Mount {
    type Error: Debug;
    type Volume<'m>: Storage<Error = Self::Error>
    where
        Self: 'm;

    /// Bring up the card and mount its filesystem. Dropping the returned
    /// volume unmounts it.
    fn mount(
        &mut self,
        config: &MountConfig,
    ) -> Result<(Self::Volume<'_>, MountInfo), MountError<Self::Error>>;
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
