//! sdmmc-datalogger - Board support
//!
//! The run never touches pins or peripherals directly. A [`Board`] turns bus
//! configuration into a mountable medium and an I2C bus, and takes them back
//! once the run is done with them.

use core::fmt::Debug;

use embedded_hal::blocking::i2c::WriteRead;

use crate::{
    config::{I2cBusConfig, SpiBusConfig},
    storage::Mount,
};

/// The hardware a run uses.
pub trait Board {
    /// Failure to bring up a bus.
    type Error: Debug;
    /// The SD card slot on its SPI bus.
    type Medium: Mount;
    /// The bus the RTC sits on.
    type I2c: WriteRead<Error = Self::I2cError>;
    type I2cError: Debug;

    /// Initialize the SPI bus and attach the card slot to it.
    ///
    /// The frequency and maximum transfer size come from `config`. Blocking
    /// calls on the returned bus are expected to give up after their own
    /// timeout rather than hang.
    fn init_storage_bus(&mut self, config: &SpiBusConfig) -> Result<Self::Medium, Self::Error>;

    /// Detach the card slot and free the SPI bus. Called exactly once for
    /// every successful [`Board::init_storage_bus`].
    fn free_storage_bus(&mut self, medium: Self::Medium);

    /// Initialize the I2C bus. Every transaction on it must complete or fail
    /// within `config.timeout_ms`.
    fn init_clock_bus(&mut self, config: &I2cBusConfig) -> Result<Self::I2c, Self::Error>;

    /// Free the I2C bus.
    fn free_clock_bus(&mut self, i2c: Self::I2c) {
        drop(i2c);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
