//! sdmmc-datalogger - Log line format
//!
//! One line per run:
//!
//! ```text
//! HH:MM:SS  DD/MM/YY ,TEMP,PRESSURE \n
//! ```
//!
//! The time and date fields are the raw RTC registers printed as two hex
//! digits. For a BCD clock that reads as decimal, and it keeps the file
//! identical to what older firmware wrote.

use core::fmt::Write;

use crate::{rtc::TimeRecord, sensor::SensorReading};

/// Longest line the formatter will produce.
pub const MAX_LINE_LEN: usize = 96;

/// A formatted log line, newline included.
pub type LogLine = heapless::String<MAX_LINE_LEN>;

/// Render one log line. Fails only if the readings are so large the line
/// does not fit in [`MAX_LINE_LEN`].
pub fn format_line(time: &TimeRecord, reading: &SensorReading) -> Result<LogLine, core::fmt::Error> {
    let mut line = LogLine::new();
    writeln!(
        line,
        "{:02x}:{:02x}:{:02x}  {:02x}/{:02x}/{:02x} ,{:.2},{:.2} ",
        time.hours(),
        time.minutes(),
        time.seconds(),
        time.day(),
        time.month(),
        time.year(),
        reading.temperature,
        reading.pressure,
    )?;
    Ok(line)
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
