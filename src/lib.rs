//! # sdmmc-datalogger
//!
//! > A run-once SD card datalogger written in Embedded Rust
//!
//! Each run mounts a FAT filesystem on an SD card, reads the time from a
//! DS1307 real-time clock, and appends one line of sensor readings to
//! `failed.txt`. Before the log is touched it is copied to `backup.txt`, and
//! the copy is only removed once the new line has been written, so a power
//! cut at any point never loses what was already logged.
//!
//! ## Using the crate
//!
//! You provide a [`Board`]: something that can bring up the SPI bus the card
//! sits on (as a [`storage::Mount`], usually an [`SdMedium`] over
//! `embedded_sdmmc::SdCard`) and the I2C bus the clock sits on.
//!
//! ```rust,ignore
//! let mut board = MyBoard::take();
//! let config = sdmmc_datalogger::Config::default();
//! let mut sensor = sdmmc_datalogger::SimulatedSensor::seeded(board.boot_count());
//! match sdmmc_datalogger::run(&mut board, &config, &mut sensor, |bytes| {
//!     board.console().write_all(bytes)
//! }) {
//!     Ok(entry) => info!("Logged {}", entry.line.as_str()),
//!     Err(e) => error!("Run failed: {:?}", e),
//! }
//! ```
//!
//! The log line is
//!
//! ```text
//! HH:MM:SS  DD/MM/YY ,TEMP,PRESSURE \n
//! ```
//!
//! with the time and date fields printed as the raw RTC registers in hex.
//!
//! ## Features
//!
//! * `format-if-mount-failed`: partition and format the card if it holds no
//! filesystem that can be mounted.
//! * `defmt-log`: By turning off the default features and enabling the `defmt-log` feature you can
//! configure this crate to log messages over defmt instead.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is enabled.

#![cfg_attr(not(test), no_std)]
// #![deny(missing_docs)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

#[macro_use]
mod fmt;

#[macro_use]
mod structure;

#[cfg(test)]
mod test;

pub mod backup;
pub mod block_device;
pub mod board;
pub mod config;
pub mod error;
pub mod fat;
pub mod logger;
pub mod mbr;
pub mod record;
pub mod rtc;
pub mod sensor;
pub mod storage;
pub mod workflow;

pub use embedded_sdmmc;

pub use crate::block_device::MemoryBlockDevice;
pub use crate::board::Board;
pub use crate::config::{ClockPolicy, Config};
pub use crate::error::{Error, LogError};
pub use crate::rtc::{Ds1307, TimeRecord};
pub use crate::sensor::{Sensor, SensorReading, SimulatedSensor};
pub use crate::storage::sdcard::{FixedClock, SdMedium};
pub use crate::workflow::{run, Entry, RunError, RunStatus};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
