//! sdmmc-datalogger - Errors
//!
//! Every step of a run reports failure through one of these. Anything that
//! reaches the caller as an `Err` ended the run; conditions the run could
//! carry on from are reported as [`RunStatus`](crate::RunStatus) flags
//! instead.

use crate::storage::{MountError, StorageError};

/// Why a run stopped.
///
/// `BusE` comes from the board, `StorageE` from the storage backend and
/// `ClockE` from the I2C bus.
#[derive(Debug)]
pub enum Error<BusE, StorageE, ClockE> {
    /// A bus could not be brought up.
    Bus(BusE),
    /// The card could not be mounted.
    Mount(MountError<StorageE>),
    /// The RTC did not answer, and the clock policy requires it.
    Clock(ClockE),
    /// The log could not be updated.
    Log(LogError<StorageE>),
}

/// Failures while appending to the log. After `LogOpen` or `Write` the
/// backup file is left on the card holding the previous log.
#[derive(Debug, PartialEq, Eq)]
pub enum LogError<E> {
    /// The backup file could not be created. Nothing was touched.
    BackupOpen(StorageError<E>),
    /// The existing log could not be opened or read.
    LogRead(StorageError<E>),
    /// Copying into the backup failed.
    BackupWrite(StorageError<E>),
    /// The log could not be opened for appending.
    LogOpen(StorageError<E>),
    /// The readings do not fit in a log line. Nothing was touched.
    LineTooLong,
    /// Writing the new line failed. The log may hold a partial line.
    Write(StorageError<E>),
    /// The line was stored but the backup could not be removed.
    Cleanup(StorageError<E>),
}

/// Failures while streaming one file into another.
#[derive(Debug, PartialEq, Eq)]
pub enum CopyError<E> {
    Read(StorageError<E>),
    Write(StorageError<E>),
}

impl<E> From<CopyError<E>> for LogError<E> {
    fn from(e: CopyError<E>) -> Self {
        match e {
            CopyError::Read(e) => LogError::LogRead(e),
            CopyError::Write(e) => LogError::BackupWrite(e),
        }
    }
}

impl<BusE, StorageE, ClockE> From<LogError<StorageE>> for Error<BusE, StorageE, ClockE> {
    fn from(e: LogError<StorageE>) -> Self {
        Error::Log(e)
    }
}

impl<BusE, StorageE, ClockE> From<MountError<StorageE>> for Error<BusE, StorageE, ClockE> {
    fn from(e: MountError<StorageE>) -> Self {
        Error::Mount(e)
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
