//! sdmmc-datalogger - DS1307 real-time clock
//!
//! The DS1307 keeps time in seven BCD registers starting at address 0. One
//! combined write-then-read transaction (register pointer, then seven bytes)
//! fetches all of them.

use embedded_hal::blocking::i2c::{Write, WriteRead};

/// Fixed 7-bit bus address of the DS1307.
pub const DS1307_ADDRESS: u8 = 0x68;

const TIME_REGISTER: u8 = 0x00;

/// Clock halt flag in the seconds register.
const CH_BIT: u8 = 0x80;
/// 12-hour mode select in the hours register.
const HOUR_12_BIT: u8 = 0x40;
/// PM flag in the hours register, 12-hour mode only.
const PM_BIT: u8 = 0x20;

/// The seven timekeeping registers, as read from the device.
///
/// Index order: seconds, minutes, hours, weekday, day, month, year. No
/// interpretation happens on construction, so any byte pattern is a record.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeRecord(pub [u8; 7]);

impl TimeRecord {
    pub const LEN: usize = 7;

    pub fn seconds(&self) -> u8 {
        self.0[0]
    }

    pub fn minutes(&self) -> u8 {
        self.0[1]
    }

    pub fn hours(&self) -> u8 {
        self.0[2]
    }

    pub fn weekday(&self) -> u8 {
        self.0[3]
    }

    pub fn day(&self) -> u8 {
        self.0[4]
    }

    pub fn month(&self) -> u8 {
        self.0[5]
    }

    pub fn year(&self) -> u8 {
        self.0[6]
    }

    /// Decode the BCD registers into a calendar date and time.
    pub fn datetime(&self) -> Result<DateTime, BcdError> {
        let seconds = bcd(self.seconds() & !CH_BIT, 59, BcdError::Seconds)?;
        let minutes = bcd(self.minutes(), 59, BcdError::Minutes)?;

        let raw_hours = self.hours();
        let hours = if raw_hours & HOUR_12_BIT != 0 {
            let hour = bcd(raw_hours & 0x1F, 12, BcdError::Hours)?;
            if hour == 0 {
                return Err(BcdError::Hours(raw_hours));
            }
            match (hour, raw_hours & PM_BIT != 0) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            }
        } else {
            bcd(raw_hours & 0x3F, 23, BcdError::Hours)?
        };

        let weekday = bcd(self.weekday(), 7, BcdError::Weekday)?;
        let day = bcd(self.day(), 31, BcdError::Day)?;
        let month = bcd(self.month(), 12, BcdError::Month)?;
        let year = bcd(self.year(), 99, BcdError::Year)?;

        if weekday == 0 {
            return Err(BcdError::Weekday(self.weekday()));
        }
        if day == 0 {
            return Err(BcdError::Day(self.day()));
        }
        if month == 0 {
            return Err(BcdError::Month(self.month()));
        }

        Ok(DateTime {
            year: 2000 + year as u16,
            month,
            day,
            weekday,
            hours,
            minutes,
            seconds,
        })
    }
}

fn bcd(value: u8, max: u8, err: fn(u8) -> BcdError) -> Result<u8, BcdError> {
    let (tens, units) = (value >> 4, value & 0x0F);
    if tens > 9 || units > 9 {
        return Err(err(value));
    }
    let decoded = tens * 10 + units;
    if decoded > max {
        Err(err(value))
    } else {
        Ok(decoded)
    }
}

/// A decoded timestamp, 24-hour clock.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// 1 to 7, the meaning of day 1 is up to whoever set the clock.
    pub weekday: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// A register held something that is not a valid BCD value for its field.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcdError {
    Seconds(u8),
    Minutes(u8),
    Hours(u8),
    Weekday(u8),
    Day(u8),
    Month(u8),
    Year(u8),
}

/// A DS1307 on some I2C bus.
pub struct Ds1307<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> Ds1307<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Ds1307 { i2c, address }
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> Ds1307<I2C>
where
    I2C: WriteRead,
{
    /// Read all seven timekeeping registers in one transaction.
    pub fn read_time(&mut self) -> Result<TimeRecord, I2C::Error> {
        let mut registers = [0u8; TimeRecord::LEN];
        self.i2c
            .write_read(self.address, &[TIME_REGISTER], &mut registers)?;
        trace!("rtc registers: {:?}", registers);
        Ok(TimeRecord(registers))
    }
}

impl<I2C> Ds1307<I2C>
where
    I2C: Write,
{
    /// Load all seven timekeeping registers. Writing the seconds register
    /// with bit 7 clear also starts the oscillator.
    pub fn set_time(&mut self, time: &TimeRecord) -> Result<(), I2C::Error> {
        let mut frame = [0u8; TimeRecord::LEN + 1];
        frame[0] = TIME_REGISTER;
        frame[1..].copy_from_slice(&time.0);
        self.i2c.write(self.address, &frame)
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
