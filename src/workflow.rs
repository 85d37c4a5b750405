//! sdmmc-datalogger - The run
//!
//! One run brings up the SPI bus, mounts the card, reads the clock, appends
//! a line to the log and tears everything down again. Whatever happens, the
//! volume is unmounted before the SPI bus is freed, and every bus that was
//! brought up is freed exactly once.

use bitflags::bitflags;

use crate::{
    board::Board,
    config::{ClockPolicy, Config},
    error::Error,
    fmt::Dbg,
    logger,
    record::LogLine,
    rtc::{Ds1307, TimeRecord},
    sensor::{Sensor, SensorReading},
    storage::{Mount, MountError, MountInfo},
};

bitflags! {
    /// Things worth knowing about a run that still succeeded.
    #[derive(Default)]
    pub struct RunStatus: u8 {
        /// There was no log yet; it was created.
        const FIRST_RUN = 1 << 0;
        /// The card was formatted before mounting.
        const FORMATTED = 1 << 1;
        /// The RTC could not be read and a zeroed time was logged.
        const CLOCK_UNAVAILABLE = 1 << 2;
        /// The RTC answered, but not with a valid date and time.
        const INVALID_TIME = 1 << 3;
    }
}

/// The error a run on board `B` can fail with.
pub type RunError<B> = Error<
    <B as Board>::Error,
    <<B as Board>::Medium as Mount>::Error,
    <B as Board>::I2cError,
>;

/// What a successful run logged.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub time: TimeRecord,
    pub reading: SensorReading,
    /// Exactly as written to the log.
    pub line: LogLine,
    pub mount: MountInfo,
    /// Bytes of the log that were backed up and echoed.
    pub backed_up: u64,
    pub status: RunStatus,
}

/// Log one entry.
///
/// Bytes of the existing log are passed to `echo` while it is being backed
/// up.
pub fn run<B, S, F>(
    board: &mut B,
    config: &Config,
    sensor: &mut S,
    echo: F,
) -> Result<Entry, RunError<B>>
where
    B: Board,
    S: Sensor,
    F: FnMut(&[u8]),
{
    info!(
        "Initializing SPI bus at {} kHz",
        config.spi.frequency_khz()
    );
    let mut medium = board.init_storage_bus(&config.spi).map_err(|e| {
        error!("Failed to initialize bus: {:?}", Dbg(&e));
        Error::Bus(e)
    })?;

    let result = session(board, &mut medium, config, sensor, echo);

    board.free_storage_bus(medium);
    debug!("SPI bus freed");
    result
}

/// Everything that happens while the card is mounted. The volume is dropped,
/// and so unmounted, before this returns.
fn session<B, S, F>(
    board: &mut B,
    medium: &mut B::Medium,
    config: &Config,
    sensor: &mut S,
    echo: F,
) -> Result<Entry, RunError<B>>
where
    B: Board,
    S: Sensor,
    F: FnMut(&[u8]),
{
    info!("Mounting filesystem");
    let (volume, mount) = medium.mount(&config.mount).map_err(|e| {
        report_mount_error(&e);
        Error::Mount(e)
    })?;
    info!("Filesystem mounted");
    info!("Card capacity: {} MiB", mount.capacity_bytes / (1024 * 1024));

    let mut status = RunStatus::empty();
    status.set(RunStatus::FORMATTED, mount.formatted);

    let time = read_clock(board, config, &mut status)?;
    let reading = sensor.sample();
    debug!(
        "Sampled temperature {} pressure {}",
        reading.temperature,
        reading.pressure
    );

    let appended = logger::append_entry(&volume, &config.files, &time, &reading, echo)?;
    status.set(RunStatus::FIRST_RUN, appended.first_run);
    drop(volume);

    Ok(Entry {
        time,
        reading,
        line: appended.line,
        mount,
        backed_up: appended.backed_up,
        status,
    })
}

fn read_clock<B>(
    board: &mut B,
    config: &Config,
    status: &mut RunStatus,
) -> Result<TimeRecord, RunError<B>>
where
    B: Board,
{
    let i2c = board.init_clock_bus(&config.i2c).map_err(|e| {
        error!("Failed to initialize I2C bus: {:?}", Dbg(&e));
        Error::Bus(e)
    })?;
    let mut rtc = Ds1307::new(i2c, config.rtc_address);
    let result = rtc.read_time();
    board.free_clock_bus(rtc.release());

    let time = match (result, config.policy.clock) {
        (Ok(time), _) => time,
        (Err(e), ClockPolicy::Required) => {
            error!("Failed to read RTC: {:?}", Dbg(&e));
            return Err(Error::Clock(e));
        }
        (Err(e), ClockPolicy::BestEffort) => {
            warn!("Failed to read RTC ({:?}), logging a zero time", Dbg(&e));
            status.insert(RunStatus::CLOCK_UNAVAILABLE);
            return Ok(TimeRecord::default());
        }
    };

    match time.datetime() {
        Ok(now) => debug!(
            "RTC time {}-{}-{} {}:{}:{}",
            now.year,
            now.month,
            now.day,
            now.hours,
            now.minutes,
            now.seconds
        ),
        Err(e) => {
            warn!("RTC does not hold a valid time: {:?}", Dbg(&e));
            status.insert(RunStatus::INVALID_TIME);
        }
    }
    Ok(time)
}

fn report_mount_error<E>(e: &MountError<E>)
where
    E: core::fmt::Debug,
{
    match e {
        MountError::CardInit(e) => error!(
            "Failed to initialize the card ({:?}). Make sure SD card lines have pull-up resistors in place.",
            Dbg(e)
        ),
        MountError::Filesystem(e) => error!(
            "Failed to mount filesystem ({:?}). If you want the card to be formatted, enable the format-if-mount-failed feature.",
            Dbg(e)
        ),
        MountError::Format(e) => error!("Failed to format the card ({:?})", Dbg(e)),
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
