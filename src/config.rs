//! sdmmc-datalogger - Configuration
//!
//! Everything the run needs to know about the board and the card. The
//! defaults describe the reference board: SD card on SPI (MISO 37, MOSI 35,
//! SCLK 36, CS 38) and a DS1307 on I2C (SDA 4, SCL 5).

/// SPI frequency used when [`SpiBusConfig::frequency_khz`] is `None`.
pub const DEFAULT_SPI_FREQUENCY_KHZ: u32 = 20_000;

/// Everything one run of the logger needs.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bus the SD card sits on.
    pub spi: SpiBusConfig,
    /// Bus the RTC sits on.
    pub i2c: I2cBusConfig,
    /// 7-bit I2C address of the RTC.
    pub rtc_address: u8,
    /// How the card gets mounted.
    pub mount: MountConfig,
    /// Which files on the card are used.
    pub files: LogFiles,
    /// What to do with recoverable failures.
    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spi: SpiBusConfig::default(),
            i2c: I2cBusConfig::default(),
            rtc_address: crate::rtc::DS1307_ADDRESS,
            mount: MountConfig::default(),
            files: LogFiles::default(),
            policy: Policy::default(),
        }
    }
}

/// SPI bus and SD card slot wiring. Pins are GPIO numbers.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiBusConfig {
    pub miso: u8,
    pub mosi: u8,
    pub sclk: u8,
    /// Chip select of the card slot.
    pub cs: u8,
    /// Largest single DMA transfer in bytes.
    pub max_transfer_size: usize,
    /// Overrides the default SPI clock.
    pub frequency_khz: Option<u32>,
}

impl SpiBusConfig {
    /// The SPI clock to use, in kHz.
    pub fn frequency_khz(&self) -> u32 {
        self.frequency_khz.unwrap_or(DEFAULT_SPI_FREQUENCY_KHZ)
    }
}

impl Default for SpiBusConfig {
    fn default() -> Self {
        SpiBusConfig {
            miso: 37,
            mosi: 35,
            sclk: 36,
            cs: 38,
            max_transfer_size: 4000,
            frequency_khz: None,
        }
    }
}

/// I2C master bus wiring and timing.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cBusConfig {
    pub sda: u8,
    pub scl: u8,
    /// Enable the internal pull-ups on SDA and SCL.
    pub pullups: bool,
    pub frequency_hz: u32,
    /// Upper bound for one bus transaction.
    pub timeout_ms: u32,
}

impl Default for I2cBusConfig {
    fn default() -> Self {
        I2cBusConfig {
            sda: 4,
            scl: 5,
            pullups: true,
            frequency_hz: 400_000,
            timeout_ms: 1000,
        }
    }
}

/// Filesystem mount options.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Where the volume appears. Only used for diagnostics on targets
    /// without a VFS.
    pub mount_point: &'static str,
    /// Partition and format the card if no filesystem can be mounted.
    pub format_if_mount_failed: bool,
    /// Files that may be open at the same time on the mounted volume. The
    /// SD card backend caps this at
    /// [`MAX_OPEN_FILES`](crate::storage::sdcard::MAX_OPEN_FILES).
    pub max_files: usize,
    /// Cluster size in bytes used when formatting.
    pub allocation_unit_size: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            mount_point: "/sdcard",
            format_if_mount_failed: cfg!(feature = "format-if-mount-failed"),
            max_files: 5,
            allocation_unit_size: 16 * 1024,
        }
    }
}

/// File names, relative to the mount point.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    /// The append-only data log.
    pub log: &'static str,
    /// Copy of the log taken before each append.
    pub backup: &'static str,
}

impl Default for LogFiles {
    fn default() -> Self {
        LogFiles {
            log: "failed.txt",
            backup: "backup.txt",
        }
    }
}

/// How recoverable failures are treated.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    pub clock: ClockPolicy,
}

/// What a failed RTC read means for the run.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPolicy {
    /// Abort the run.
    #[default]
    Required,
    /// Log a zeroed timestamp and flag the run.
    BestEffort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_board() {
        let config = Config::default();
        assert_eq!(config.rtc_address, 0x68);
        assert_eq!(config.i2c.frequency_hz, 400_000);
        assert_eq!(config.i2c.timeout_ms, 1000);
        assert_eq!((config.spi.miso, config.spi.mosi), (37, 35));
        assert_eq!((config.spi.sclk, config.spi.cs), (36, 38));
        assert_eq!(config.mount.mount_point, "/sdcard");
        assert_eq!(config.mount.max_files, 5);
        assert_eq!(config.mount.allocation_unit_size, 16384);
        assert_eq!(
            config.mount.format_if_mount_failed,
            cfg!(feature = "format-if-mount-failed")
        );
        assert_eq!(config.policy.clock, ClockPolicy::Required);
    }

    #[test]
    fn spi_frequency_override() {
        let mut spi = SpiBusConfig::default();
        assert_eq!(spi.frequency_khz(), DEFAULT_SPI_FREQUENCY_KHZ);
        spi.frequency_khz = Some(400);
        assert_eq!(spi.frequency_khz(), 400);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
