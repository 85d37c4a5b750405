//! sdmmc-datalogger - Sensor readings
//!
//! The board has no real environmental sensor yet, so readings come from a
//! seeded pseudo-random source in a plausible range.

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

/// One sample from the environmental sensors.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: f32,
    pub pressure: f32,
}

/// Something that can be sampled once per run.
pub trait Sensor {
    fn sample(&mut self) -> SensorReading;
}

/// Pseudo-random readings: temperature in `[20, 29]`, pressure in `[5, 24]`,
/// both whole numbers.
pub struct SimulatedSensor<R> {
    rng: R,
}

impl<R> SimulatedSensor<R>
where
    R: RngCore,
{
    pub fn new(rng: R) -> Self {
        SimulatedSensor { rng }
    }
}

impl SimulatedSensor<ChaCha8Rng> {
    /// Seed from something that differs between boots, e.g. the RTC seconds
    /// or a hardware RNG word.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R> Sensor for SimulatedSensor<R>
where
    R: RngCore,
{
    fn sample(&mut self) -> SensorReading {
        let temperature = 20 + self.rng.next_u32() % 10;
        let pressure = 5 + self.rng.next_u32() % 20;
        SensorReading {
            temperature: temperature as f32,
            pressure: pressure as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::impls;

    /// Counts up from a start value, one step per word.
    struct Counter(u32);

    impl RngCore for Counter {
        fn next_u32(&mut self) -> u32 {
            let value = self.0;
            self.0 = self.0.wrapping_add(1);
            value
        }

        fn next_u64(&mut self) -> u64 {
            impls::next_u64_via_u32(self)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            impls::fill_bytes_via_next(self, dest)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn readings_stay_in_range() {
        let mut sensor = SimulatedSensor::seeded(0x5EED);
        for _ in 0..1000 {
            let reading = sensor.sample();
            assert!((20.0..30.0).contains(&reading.temperature));
            assert!((5.0..25.0).contains(&reading.pressure));
        }
    }

    #[test]
    fn temperature_then_pressure_from_consecutive_words() {
        let mut sensor = SimulatedSensor::new(Counter(17));
        let reading = sensor.sample();
        assert_eq!(reading.temperature, 27.0);
        assert_eq!(reading.pressure, 23.0);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
