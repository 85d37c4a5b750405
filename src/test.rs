//! Test doubles shared by the unit tests.
//!
//! Everything here records what happened into one shared [`Event`] log, so
//! tests can check the order in which buses, mounts and files were used.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use embedded_hal::blocking::i2c::{Write, WriteRead};
use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

use crate::{
    block_device::{MemoryBlockDevice, MemoryError},
    board::Board,
    config::{I2cBusConfig, MountConfig, SpiBusConfig},
    sensor::{Sensor, SensorReading},
    storage::{Mount, MountError, MountInfo, OpenMode, Storage, StorageError, StorageFile},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SpiInit,
    SpiFree,
    I2cInit,
    I2cFree,
    Mount,
    Unmount,
    Open(String, OpenMode),
    Close(String),
    Remove(String),
}

pub type Events = Rc<RefCell<Vec<Event>>>;

// ****************************************************************************
//
// I2C
//
// ****************************************************************************

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack;

/// An RTC that answers every read with the same registers.
#[derive(Debug, Clone)]
pub struct MockI2c {
    registers: [u8; 7],
    fail: bool,
    /// `(address, bytes written, bytes read)` for every write-read.
    pub transactions: Vec<(u8, Vec<u8>, usize)>,
    /// `(address, bytes)` for every plain write.
    pub writes: Vec<(u8, Vec<u8>)>,
}

impl MockI2c {
    pub fn new(registers: [u8; 7]) -> Self {
        MockI2c {
            registers,
            fail: false,
            transactions: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Nobody home: every transaction fails.
    pub fn failing() -> Self {
        MockI2c {
            fail: true,
            ..MockI2c::new([0; 7])
        }
    }
}

impl WriteRead for MockI2c {
    type Error = Nack;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Nack> {
        self.transactions
            .push((address, bytes.to_vec(), buffer.len()));
        if self.fail {
            return Err(Nack);
        }
        for (dst, src) in buffer.iter_mut().zip(self.registers.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

impl Write for MockI2c {
    type Error = Nack;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nack> {
        self.writes.push((address, bytes.to_vec()));
        if self.fail {
            Err(Nack)
        } else {
            Ok(())
        }
    }
}

// ****************************************************************************
//
// Storage
//
// ****************************************************************************

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    Injected,
    ReadOnly,
    WriteOnly,
}

/// A failure to inject into [`MemStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Opening `name` in `mode` fails.
    Open {
        name: &'static str,
        mode: OpenMode,
    },
    /// Each handle on `name` accepts `bytes` bytes, then reports a full
    /// volume. Like a power cut mid-write, the bytes before the limit stay.
    WriteLimit { name: &'static str, bytes: usize },
    /// Removing `name` fails.
    Remove { name: &'static str },
}

/// A flat in-memory volume.
#[derive(Debug, Default)]
pub struct MemStorage {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    faults: RefCell<Vec<Fault>>,
    events: Events,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Events) -> Self {
        MemStorage {
            events,
            ..Self::default()
        }
    }

    pub fn insert(&self, name: &str, contents: &[u8]) {
        self.files
            .borrow_mut()
            .insert(name.to_string(), contents.to_vec());
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(name).cloned()
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.borrow_mut().push(fault);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn write_limit(&self, file: &str) -> Option<usize> {
        self.faults.borrow().iter().find_map(|f| match f {
            Fault::WriteLimit { name, bytes } if *name == file => Some(*bytes),
            _ => None,
        })
    }
}

impl Storage for MemStorage {
    type Error = MemError;
    type File<'s> = MemFile<'s> where Self: 's;

    fn open(&self, name: &str, mode: OpenMode) -> Result<MemFile<'_>, StorageError<MemError>> {
        if self.faults.borrow().iter().any(
            |f| matches!(f, Fault::Open { name: n, mode: m } if *n == name && *m == mode),
        ) {
            return Err(StorageError::Io(MemError::Injected));
        }

        let mut files = self.files.borrow_mut();
        let pos = match mode {
            OpenMode::Read => {
                if !files.contains_key(name) {
                    return Err(StorageError::NotFound);
                }
                0
            }
            OpenMode::Truncate => {
                files.insert(name.to_string(), Vec::new());
                0
            }
            OpenMode::Append => files.entry(name.to_string()).or_default().len(),
        };
        drop(files);

        self.record(Event::Open(name.to_string(), mode));
        Ok(MemFile {
            storage: self,
            name: name.to_string(),
            mode,
            pos,
            written: 0,
            limit: self.write_limit(name),
            closed: false,
        })
    }

    fn remove(&self, name: &str) -> Result<(), StorageError<MemError>> {
        if self
            .faults
            .borrow()
            .iter()
            .any(|f| matches!(f, Fault::Remove { name: n } if *n == name))
        {
            return Err(StorageError::Io(MemError::Injected));
        }
        if self.files.borrow_mut().remove(name).is_none() {
            return Err(StorageError::NotFound);
        }
        self.record(Event::Remove(name.to_string()));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemFile<'s> {
    storage: &'s MemStorage,
    name: String,
    mode: OpenMode,
    pos: usize,
    written: usize,
    limit: Option<usize>,
    closed: bool,
}

impl<'s> MemFile<'s> {
    fn finish(&mut self) {
        if !self.closed {
            self.closed = true;
            self.storage.record(Event::Close(self.name.clone()));
        }
    }
}

impl<'s> Drop for MemFile<'s> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<'s> StorageFile for MemFile<'s> {
    type Error = MemError;

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, StorageError<MemError>> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if self.mode != OpenMode::Read {
            return Err(StorageError::Io(MemError::WriteOnly));
        }
        let files = self.storage.files.borrow();
        let contents = files.get(&self.name).ok_or(StorageError::NotFound)?;
        let remaining = contents.get(self.pos..).unwrap_or(&[]);
        let n = remaining.len().min(buffer.len());
        buffer[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError<MemError>> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if self.mode == OpenMode::Read {
            return Err(StorageError::Io(MemError::ReadOnly));
        }
        let allowed = self
            .limit
            .map(|limit| limit.saturating_sub(self.written))
            .unwrap_or(usize::MAX);
        let n = data.len().min(allowed);

        let mut files = self.storage.files.borrow_mut();
        let contents = files.entry(self.name.clone()).or_default();
        let end = (self.pos + n).min(contents.len());
        contents.splice(self.pos..end, data[..n].iter().copied());
        self.pos += n;
        self.written += n;

        if n < data.len() {
            Err(StorageError::NoSpace)
        } else {
            Ok(())
        }
    }

    fn close(mut self) -> Result<(), StorageError<MemError>> {
        self.finish();
        Ok(())
    }
}

/// A card slot holding a [`MemStorage`].
#[derive(Debug)]
pub struct MemMedium {
    pub storage: MemStorage,
    /// Make every mount fail with this.
    pub failure: Option<MountError<MemError>>,
    pub formatted: bool,
}

impl MemMedium {
    pub fn new(storage: MemStorage) -> Self {
        MemMedium {
            storage,
            failure: None,
            formatted: false,
        }
    }
}

impl Mount for MemMedium {
    type Error = MemError;
    type Volume<'m> = MemVolume<'m> where Self: 'm;

    fn mount(
        &mut self,
        _config: &MountConfig,
    ) -> Result<(MemVolume<'_>, MountInfo), MountError<MemError>> {
        self.storage.record(Event::Mount);
        if let Some(e) = self.failure.clone() {
            return Err(e);
        }
        let info = MountInfo {
            capacity_bytes: 8 * 1024 * 1024,
            formatted: self.formatted,
        };
        Ok((
            MemVolume {
                storage: &self.storage,
            },
            info,
        ))
    }
}

#[derive(Debug)]
pub struct MemVolume<'m> {
    storage: &'m MemStorage,
}

impl<'m> Drop for MemVolume<'m> {
    fn drop(&mut self) {
        self.storage.record(Event::Unmount);
    }
}

impl<'m> Storage for MemVolume<'m> {
    type Error = MemError;
    type File<'s> = MemFile<'s> where Self: 's;

    fn open(&self, name: &str, mode: OpenMode) -> Result<MemFile<'_>, StorageError<MemError>> {
        self.storage.open(name, mode)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError<MemError>> {
        self.storage.remove(name)
    }
}

// ****************************************************************************
//
// Board
//
// ****************************************************************************

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    Spi,
    I2c,
}

/// A board with a [`MemMedium`] in the card slot and a [`MockI2c`] RTC.
#[derive(Debug)]
pub struct TestBoard {
    events: Events,
    medium: Option<MemMedium>,
    i2c: Option<MockI2c>,
    pub fail_storage_bus: bool,
}

impl TestBoard {
    pub fn new(rtc: MockI2c) -> Self {
        let events = Events::default();
        let storage = MemStorage::with_events(events.clone());
        TestBoard {
            events,
            medium: Some(MemMedium::new(storage)),
            i2c: Some(rtc),
            fail_storage_bus: false,
        }
    }

    /// The medium, once the run has handed it back.
    pub fn medium(&mut self) -> &mut MemMedium {
        self.medium.as_mut().expect("storage bus still in use")
    }

    pub fn storage(&mut self) -> &MemStorage {
        &self.medium().storage
    }

    pub fn rtc(&self) -> &MockI2c {
        self.i2c.as_ref().expect("clock bus still in use")
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl Board for TestBoard {
    type Error = BoardError;
    type Medium = MemMedium;
    type I2c = MockI2c;
    type I2cError = Nack;

    fn init_storage_bus(&mut self, _config: &SpiBusConfig) -> Result<MemMedium, BoardError> {
        self.record(Event::SpiInit);
        if self.fail_storage_bus {
            return Err(BoardError::Spi);
        }
        self.medium.take().ok_or(BoardError::Spi)
    }

    fn free_storage_bus(&mut self, medium: MemMedium) {
        self.record(Event::SpiFree);
        self.medium = Some(medium);
    }

    fn init_clock_bus(&mut self, _config: &I2cBusConfig) -> Result<MockI2c, BoardError> {
        self.record(Event::I2cInit);
        self.i2c.take().ok_or(BoardError::I2c)
    }

    fn free_clock_bus(&mut self, i2c: MockI2c) {
        self.record(Event::I2cFree);
        self.i2c = Some(i2c);
    }
}

// ****************************************************************************
//
// Block devices
//
// ****************************************************************************

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakyError {
    Glitch,
    Memory(MemoryError),
}

/// A RAM card whose next few reads fail.
pub struct FlakyBlockDevice<'a> {
    inner: MemoryBlockDevice<'a>,
    failing_reads: Cell<usize>,
}

impl<'a> FlakyBlockDevice<'a> {
    pub fn new(memory: &'a mut [u8], failing_reads: usize) -> Self {
        FlakyBlockDevice {
            inner: MemoryBlockDevice::new(memory),
            failing_reads: Cell::new(failing_reads),
        }
    }
}

impl<'a> BlockDevice for FlakyBlockDevice<'a> {
    type Error = FlakyError;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), FlakyError> {
        let failing = self.failing_reads.get();
        if failing > 0 {
            self.failing_reads.set(failing - 1);
            return Err(FlakyError::Glitch);
        }
        self.inner
            .read(blocks, start_block_idx, reason)
            .map_err(FlakyError::Memory)
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), FlakyError> {
        self.inner
            .write(blocks, start_block_idx)
            .map_err(FlakyError::Memory)
    }

    fn num_blocks(&self) -> Result<BlockCount, FlakyError> {
        self.inner.num_blocks().map_err(FlakyError::Memory)
    }
}

/// Always reads the same.
#[derive(Debug, Clone, Copy)]
pub struct FixedSensor(pub SensorReading);

impl Sensor for FixedSensor {
    fn sample(&mut self) -> SensorReading {
        self.0
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
