//! sdmmc-datalogger - SD card storage
//!
//! Mounts the first partition of an SD card (or any other
//! `embedded_sdmmc::BlockDevice`) and exposes its root directory as flat
//! [`Storage`]. File names are stored as upper-case 8.3 short names.

use core::cell::RefCell;
use core::fmt::Debug;

use embedded_sdmmc::{
    Block, BlockCount, BlockDevice, BlockIdx, Directory, Error, File, Mode, TimeSource, Timestamp,
    Volume, VolumeIdx, VolumeManager,
};

use super::{Mount, MountError, MountInfo, OpenMode, Storage, StorageError, StorageFile};
use crate::{
    config::MountConfig,
    fat::{self, FormatError, FormatOptions},
    fmt::Dbg,
};

/// `NAME.EXT` at its longest.
const SHORT_NAME_LEN: usize = 12;

/// Files open at once on one volume, whatever `MountConfig::max_files` asks
/// for.
pub const MAX_OPEN_FILES: usize = 8;

type ShortName = heapless::String<SHORT_NAME_LEN>;

/// Errors from the filesystem on block device `D`.
pub type SdError<D> = Error<<D as BlockDevice>::Error>;

/// A time source that always gives the same moment, for boards without a
/// clock the filesystem can query.
#[derive(Debug, Clone)]
pub struct FixedClock(pub Timestamp);

impl TimeSource for FixedClock {
    fn get_timestamp(&self) -> Timestamp {
        self.0.clone()
    }
}

/// A borrowed block device or time source.
struct Shared<'a, X>(&'a X);

impl<'a, D> BlockDevice for Shared<'a, D>
where
    D: BlockDevice,
{
    type Error = D::Error;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        self.0.read(blocks, start_block_idx, reason)
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.0.write(blocks, start_block_idx)
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        self.0.num_blocks()
    }
}

impl<'a, T> TimeSource for Shared<'a, T>
where
    T: TimeSource,
{
    fn get_timestamp(&self) -> Timestamp {
        self.0.get_timestamp()
    }
}

/// A `VolumeManager` lives for a single call only.
///
/// `embedded-sdmmc` 0.5 remembers open files by their first cluster, and an
/// empty file gets its first cluster on the first write, after the table
/// entry was made. Such an entry never clears and later makes the library
/// refuse to delete or open unrelated empty files. Open files are tracked by
/// name in [`SdVolume`] instead.
type Manager<'a, D, T> = VolumeManager<Shared<'a, D>, Shared<'a, T>, 1, 1>;

fn manager<'a, D, T>(device: &'a D, clock: &'a T) -> Manager<'a, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    VolumeManager::new_with_limits(Shared(device), Shared(clock))
}

/// An unmounted card.
pub struct SdMedium<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    device: D,
    clock: T,
}

impl<D, T> SdMedium<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn new(block_device: D, time_source: T) -> Self {
        SdMedium {
            device: block_device,
            clock: time_source,
        }
    }

    /// Give back the block device and time source.
    pub fn release(self) -> (D, T) {
        (self.device, self.clock)
    }
}

impl<D, T> Mount for SdMedium<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Error = SdError<D>;
    type Volume<'m> = SdVolume<'m, D, T> where Self: 'm;

    fn mount(
        &mut self,
        config: &MountConfig,
    ) -> Result<(SdVolume<'_, D, T>, MountInfo), MountError<Self::Error>> {
        // Asking for the size brings the card out of idle.
        let blocks = self
            .device
            .num_blocks()
            .map_err(|e| MountError::CardInit(Error::DeviceError(e)))?;
        let mut info = MountInfo {
            capacity_bytes: u64::from(blocks.0) * Block::LEN as u64,
            formatted: false,
        };

        let volume = match manager(&self.device, &self.clock).get_volume(VolumeIdx(0)) {
            Ok(volume) => volume,
            // A card that could not be read may still hold the log.
            Err(Error::DeviceError(e)) => {
                error!("Reading the partition table failed: {:?}", Dbg(&e));
                return Err(MountError::CardInit(Error::DeviceError(e)));
            }
            Err(e) if config.format_if_mount_failed && no_filesystem(&e) => {
                warn!("No usable filesystem ({:?}), formatting card", Dbg(&e));
                let options = FormatOptions::new(config.allocation_unit_size);
                fat::format_volume(&self.device, &options).map_err(|e| {
                    error!("Format failed: {:?}", Dbg(&e));
                    MountError::Format(format_error(e))
                })?;
                info.formatted = true;
                manager(&self.device, &self.clock)
                    .get_volume(VolumeIdx(0))
                    .map_err(MountError::Filesystem)?
            }
            Err(e) => return Err(MountError::Filesystem(e)),
        };

        let mut volume_mgr = manager(&self.device, &self.clock);
        let root = volume_mgr
            .open_root_dir(&volume)
            .map_err(MountError::Filesystem)?;
        volume_mgr.close_dir(&volume, root);

        if config.max_files > MAX_OPEN_FILES {
            warn!(
                "{} files requested, at most {} can be open",
                config.max_files, MAX_OPEN_FILES
            );
        }
        debug!("{} mounted", config.mount_point);
        Ok((
            SdVolume {
                device: &self.device,
                clock: &self.clock,
                mounted: RefCell::new(Mounted {
                    volume,
                    open: heapless::Vec::new(),
                }),
                max_files: config.max_files.min(MAX_OPEN_FILES),
                mount_point: config.mount_point,
            },
            info,
        ))
    }
}

/// Errors after which the card is worth formatting: it was read fine but
/// holds nothing we can mount.
fn no_filesystem<E: Debug>(e: &Error<E>) -> bool {
    matches!(
        e,
        Error::FormatError(_) | Error::NoSuchVolume | Error::BadBlockSize(_)
    )
}

fn format_error<E>(e: FormatError<E>) -> Error<E>
where
    E: Debug,
{
    match e {
        FormatError::DeviceError(e) => Error::DeviceError(e),
        FormatError::InvalidAllocationUnit(_) => Error::FormatError("invalid allocation unit size"),
        FormatError::TooSmall { .. } => Error::FormatError("card too small to format"),
        _ => Error::FormatError("formatted card failed verification"),
    }
}

fn storage_error<E>(e: Error<E>) -> StorageError<Error<E>>
where
    E: Debug,
{
    match e {
        Error::FileNotFound => StorageError::NotFound,
        Error::TooManyOpenFiles => StorageError::TooManyOpenFiles,
        Error::FilenameError(_) => StorageError::InvalidName,
        Error::NotEnoughSpace => StorageError::NoSpace,
        other => StorageError::Io(other),
    }
}

fn short_name<E>(name: &str) -> Result<ShortName, StorageError<E>> {
    let mut short = heapless::String::new();
    for c in name.chars() {
        short
            .push(c.to_ascii_uppercase())
            .map_err(|_| StorageError::InvalidName)?;
    }
    Ok(short)
}

impl From<OpenMode> for Mode {
    fn from(mode: OpenMode) -> Self {
        match mode {
            OpenMode::Read => Mode::ReadOnly,
            OpenMode::Truncate => Mode::ReadWriteCreateOrTruncate,
            OpenMode::Append => Mode::ReadWriteCreateOrAppend,
        }
    }
}

struct Mounted {
    volume: Volume,
    open: heapless::Vec<ShortName, MAX_OPEN_FILES>,
}

/// A mounted card. Dropping it unmounts.
pub struct SdVolume<'m, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    device: &'m D,
    clock: &'m T,
    mounted: RefCell<Mounted>,
    max_files: usize,
    mount_point: &'static str,
}

impl<'m, D, T> SdVolume<'m, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn manager(&self) -> Manager<'m, D, T> {
        manager(self.device, self.clock)
    }

    /// Run `f` with the root directory open. The directory is always
    /// closed again, even if an error occurred in `f`.
    fn in_root<F, R>(&self, f: F) -> Result<R, SdError<D>>
    where
        F: FnOnce(&mut Manager<'m, D, T>, &mut Volume, &Directory) -> Result<R, SdError<D>>,
    {
        let mut volume_mgr = self.manager();
        let mut guard = self.mounted.borrow_mut();
        let volume = &mut guard.volume;
        let root = volume_mgr.open_root_dir(volume)?;
        let result = f(&mut volume_mgr, &mut *volume, &root);
        volume_mgr.close_dir(volume, root);
        result
    }

    fn is_open(&self, name: &ShortName) -> bool {
        self.mounted.borrow().open.contains(name)
    }
}

impl<'m, D, T> Drop for SdVolume<'m, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn drop(&mut self) {
        info!("{} unmounted", self.mount_point);
    }
}

impl<'m, D, T> Storage for SdVolume<'m, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Error = SdError<D>;
    type File<'s> = SdFile<'s, 'm, D, T> where Self: 's;

    fn open(
        &self,
        name: &str,
        mode: OpenMode,
    ) -> Result<SdFile<'_, 'm, D, T>, StorageError<Self::Error>> {
        let name = short_name(name)?;
        if self.is_open(&name) {
            return Err(StorageError::InUse);
        }
        if self.mounted.borrow().open.len() >= self.max_files {
            return Err(StorageError::TooManyOpenFiles);
        }

        let file = self
            .in_root(|volume_mgr, volume, root| {
                volume_mgr.open_file_in_dir(volume, root, name.as_str(), mode.into())
            })
            .map_err(storage_error)?;
        self.mounted
            .borrow_mut()
            .open
            .push(name.clone())
            .map_err(|_| StorageError::TooManyOpenFiles)?;
        trace!("opened {} as {:?}", name.as_str(), mode);

        Ok(SdFile {
            volume: self,
            name,
            file: Some(file),
        })
    }

    fn remove(&self, name: &str) -> Result<(), StorageError<Self::Error>> {
        let name = short_name(name)?;
        if self.is_open(&name) {
            return Err(StorageError::InUse);
        }
        self.in_root(|volume_mgr, volume, root| {
            // Deleting only marks the entry free. Truncating first gives
            // back all clusters but the first.
            let file =
                volume_mgr.open_file_in_dir(volume, root, name.as_str(), Mode::ReadWriteTruncate)?;
            volume_mgr.close_file(volume, file)?;
            volume_mgr.delete_file_in_dir(volume, root, name.as_str())
        })
        .map_err(storage_error)
    }
}

/// An open file on a mounted card. Closes itself when dropped.
pub struct SdFile<'s, 'm, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume: &'s SdVolume<'m, D, T>,
    name: ShortName,
    file: Option<File>,
}

impl<'s, 'm, D, T> SdFile<'s, 'm, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn finish(&mut self) -> Result<(), StorageError<SdError<D>>> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let mut mounted = self.volume.mounted.borrow_mut();
        if let Some(idx) = mounted.open.iter().position(|n| *n == self.name) {
            mounted.open.swap_remove(idx);
        }
        // Sizes are written with every write, closing only updates the
        // bookkeeping.
        self.volume
            .manager()
            .close_file(&mounted.volume, file)
            .map_err(storage_error)
    }
}

impl<'s, 'm, D, T> Drop for SdFile<'s, 'm, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Closing file failed: {:?}", Dbg(&e));
        }
    }
}

impl<'s, 'm, D, T> StorageFile for SdFile<'s, 'm, D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Error = SdError<D>;

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StorageError<Self::Error>> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        if file.eof() {
            return Ok(0);
        }
        let mounted = self.volume.mounted.borrow();
        self.volume
            .manager()
            .read(&mounted.volume, file, buffer)
            .map_err(storage_error)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError<Self::Error>> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        let mut mounted = self.volume.mounted.borrow_mut();
        let written = self
            .volume
            .manager()
            .write(&mut mounted.volume, file, data)
            .map_err(storage_error)?;
        if written < data.len() {
            Err(StorageError::NoSpace)
        } else {
            Ok(())
        }
    }

    fn close(mut self) -> Result<(), StorageError<Self::Error>> {
        self.finish()
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
