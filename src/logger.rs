//! sdmmc-datalogger - Appending a log entry
//!
//! Before the log is touched it is copied in full to a backup file. Only
//! once the new line is safely written is the backup removed again, so at
//! every moment at least one complete copy of the old log exists on the card.

use crate::{
    backup,
    config::LogFiles,
    error::LogError,
    record::{self, LogLine},
    rtc::TimeRecord,
    sensor::SensorReading,
    storage::{OpenMode, Storage, StorageError, StorageFile},
};

/// What [`append_entry`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    /// The line that was added, newline included.
    pub line: LogLine,
    /// Size of the log before the line was added.
    pub backed_up: u64,
    /// The log did not exist and was created.
    pub first_run: bool,
}

/// Back up the log, append one line for `time` and `reading`, then remove
/// the backup.
///
/// Every byte of the existing log is passed to `echo` as it is copied.
pub fn append_entry<S, F>(
    volume: &S,
    files: &LogFiles,
    time: &TimeRecord,
    reading: &SensorReading,
    echo: F,
) -> Result<Appended, LogError<S::Error>>
where
    S: Storage,
    F: FnMut(&[u8]),
{
    let line = record::format_line(time, reading).map_err(|_| LogError::LineTooLong)?;

    let mut backup_file = volume
        .open(files.backup, OpenMode::Truncate)
        .map_err(|e| {
            error!("Failed to open {} for writing", files.backup);
            LogError::BackupOpen(e)
        })?;

    let (backed_up, first_run) = match volume.open(files.log, OpenMode::Read) {
        Ok(mut log_file) => {
            let total = backup::copy(&mut log_file, &mut backup_file, echo)?;
            log_file.close().map_err(LogError::LogRead)?;
            (total, false)
        }
        Err(StorageError::NotFound) => {
            info!("data file does not exist");
            (0, true)
        }
        Err(e) => {
            error!("Failed to open {} for reading", files.log);
            return Err(LogError::LogRead(e));
        }
    };
    backup_file.close().map_err(LogError::BackupWrite)?;
    debug!("{} bytes backed up to {}", backed_up, files.backup);

    let mut log_file = volume.open(files.log, OpenMode::Append).map_err(|e| {
        error!("Failed to open {} for appending", files.log);
        LogError::LogOpen(e)
    })?;
    log_file
        .write_all(line.as_bytes())
        .map_err(LogError::Write)?;
    log_file.close().map_err(LogError::Write)?;
    info!("File written");

    volume.remove(files.backup).map_err(|e| {
        warn!("Failed to remove {}", files.backup);
        LogError::Cleanup(e)
    })?;

    Ok(Appended {
        line,
        backed_up,
        first_run,
    })
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
