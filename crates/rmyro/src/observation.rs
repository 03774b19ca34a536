//! Receiver outputs for the client

use std::fmt;
use std::time::{Instant, SystemTime};

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

use crate::receiver::{Gust, Reading};

/// When a frame was received
///
/// The transmitter has no clock, so every observation is
/// timestamped when its frame's terminator arrives. Both a
/// monotonic time, for computing intervals, and a wall-clock
/// time, for reporting, are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Arrival {
    /// Monotonic receive time
    pub instant: Instant,

    /// Wall-clock receive time
    pub system_time: SystemTime,
}

impl Arrival {
    /// The current time
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            system_time: SystemTime::now(),
        }
    }

    /// Arrival at a known time
    pub fn at(instant: Instant, system_time: SystemTime) -> Self {
        Self {
            instant,
            system_time,
        }
    }
}

/// A complete weather observation
///
/// One `ObservationRecord` is produced for every frame which
/// decodes successfully. Units are fixed:
///
/// | quantity    | unit |
/// |-------------|------|
/// | wind, gust  | m/s  |
/// | direction   | °    |
/// | temperature | °C   |
/// | humidity    | %    |
/// | pressure    | hPa  |
/// | rain        | mm   |
///
/// Gust values are synthesized by the receiver and are absent
/// when no wind samples are available. A gust of zero means a
/// calm wind.
///
/// `ObservationRecord` implements `Display` as a one-line
/// summary.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationRecord {
    arrival: Arrival,
    reading: Reading,
    gust: Option<Gust>,
    rain_mm: Option<f64>,
}

impl ObservationRecord {
    /// Construct from parts
    ///
    /// `rain_mm` is the rain which fell since the previous
    /// observation.
    pub fn new(arrival: Arrival, reading: Reading, gust: Option<Gust>, rain_mm: Option<f64>) -> Self {
        Self {
            arrival,
            reading,
            gust,
            rain_mm,
        }
    }

    /// Monotonic receive time
    pub fn received(&self) -> Instant {
        self.arrival.instant
    }

    /// Wall-clock receive time
    pub fn system_time(&self) -> SystemTime {
        self.arrival.system_time
    }

    /// Wall-clock receive time, in UTC
    ///
    /// Requires `chrono`.
    #[cfg(feature = "chrono")]
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.arrival.system_time)
    }

    /// Address of the transmitter
    pub fn address(&self) -> char {
        self.reading.address
    }

    /// Wind speed (m/s)
    pub fn wind_speed_mps(&self) -> f64 {
        self.reading.wind_speed_mps
    }

    /// Wind direction (degrees)
    pub fn wind_direction_deg(&self) -> f64 {
        self.reading.wind_direction_deg
    }

    /// Wind gust (m/s), if available
    pub fn wind_gust_mps(&self) -> Option<f64> {
        self.gust.map(|g| g.speed_mps)
    }

    /// Wind gust direction (degrees), if available
    pub fn wind_gust_dir_deg(&self) -> Option<f64> {
        self.gust.map(|g| g.direction_deg)
    }

    /// Full gust estimate, if available
    pub fn gust(&self) -> Option<&Gust> {
        self.gust.as_ref()
    }

    /// True if the gust was computed from too few samples
    ///
    /// An unavailable gust is not low-density.
    pub fn gust_low_density(&self) -> bool {
        self.gust.map_or(false, |g| g.low_density)
    }

    /// Air temperature (°C)
    pub fn air_temperature_c(&self) -> f64 {
        self.reading.air_temperature_c
    }

    /// Relative humidity (%)
    pub fn relative_humidity_pct(&self) -> f64 {
        self.reading.relative_humidity_pct
    }

    /// Barometric pressure (hPa)
    pub fn pressure_hpa(&self) -> f64 {
        self.reading.pressure_hpa
    }

    /// Rain bucket total (mm)
    ///
    /// Present only if the rain bucket is enabled.
    pub fn rain_total_mm(&self) -> Option<f64> {
        self.reading.rain_accum_mm
    }

    /// Rain since the previous observation (mm)
    ///
    /// Absent if the rain bucket is disabled or if this is the
    /// first observation with a bucket total.
    pub fn rain_mm(&self) -> Option<f64> {
        self.rain_mm
    }

    /// Transmitter status byte
    pub fn status(&self) -> u8 {
        self.reading.status
    }

    /// The decoded frame
    pub fn reading(&self) -> &Reading {
        &self.reading
    }
}

impl fmt::Display for ObservationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wind {:.2} m/s @ {:.1}°",
            self.wind_speed_mps(),
            self.wind_direction_deg()
        )?;
        match &self.gust {
            Some(gust) => {
                write!(
                    f,
                    ", gust {:.2} m/s @ {:.1}°",
                    gust.speed_mps, gust.direction_deg
                )?;
                if gust.low_density {
                    write!(f, " (low density)")?;
                }
            }
            None => write!(f, ", gust n/a")?,
        }
        write!(
            f,
            ", {:.1} °C, {:.1} %, {:.1} hPa",
            self.air_temperature_c(),
            self.relative_humidity_pct(),
            self.pressure_hpa()
        )?;
        if let Some(total) = self.rain_total_mm() {
            match self.rain_mm {
                Some(rain) => write!(f, ", rain {:.1} mm (total {:.1} mm)", rain, total)?,
                None => write!(f, ", rain total {:.1} mm", total)?,
            }
        }
        if self.status() != 0 {
            write!(f, ", status {:02X}", self.status())?;
        }
        Ok(())
    }
}
