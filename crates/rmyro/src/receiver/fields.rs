//! Frame field decoding
//!
//! In ASCII auto-transmit mode, the transmitter sends one frame
//! per output interval. Fields are separated by a single space:
//!
//! ```txt
//! 0 100.00 180.5 22.1 50.1 0998.6 00000 00*08
//! | |      |     |    |    |      |     |  |
//! | |      |     |    |    |      |     |  +- checksum (hex)
//! | |      |     |    |    |      |     +---- status (hex)
//! | |      |     |    |    |      +---------- rain bucket tips (optional)
//! | |      |     |    |    +----------------- pressure (hPa)
//! | |      |     |    +---------------------- relative humidity (%)
//! | |      |     +--------------------------- air temperature (°C)
//! | |      +--------------------------------- wind direction (°)
//! | +---------------------------------------- wind speed (m/s)
//! +------------------------------------------ unit address
//! ```
//!
//! Frames carry no units. The transmitter must be configured
//! for hPa, °C, m/s and polar wind output.

use std::fmt;

use arrayvec::ArrayVec;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::framing::CandidateFrame;
use super::schema::SchemaVariant;

/// Millimeters of rain per bucket tip
pub const RAIN_MM_PER_TIP: f64 = 0.1;

/// Decoded transmitter frame
///
/// A `Reading` is produced only if *every* field of the frame
/// is present, numeric, and within its permitted range.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    /// Unit address
    pub address: char,

    /// Wind speed (m/s)
    pub wind_speed_mps: f64,

    /// Wind direction (degrees)
    pub wind_direction_deg: f64,

    /// Air temperature (°C)
    pub air_temperature_c: f64,

    /// Relative humidity (%)
    pub relative_humidity_pct: f64,

    /// Barometric pressure (hPa)
    pub pressure_hpa: f64,

    /// Rain accumulation since the bucket counter was reset (mm)
    ///
    /// Present if and only if the frame has the
    /// [`WithRain`](SchemaVariant::WithRain) layout.
    pub rain_accum_mm: Option<f64>,

    /// Transmitter status byte
    ///
    /// Zero when all sensors are healthy.
    pub status: u8,

    /// Frame checksum, as transmitted
    pub checksum: u8,
}

/// Numeric frame fields
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::IntoStaticStr,
)]
pub enum Field {
    /// Wind speed
    #[strum(serialize = "wind speed")]
    WindSpeed,

    /// Wind direction
    #[strum(serialize = "wind direction")]
    WindDirection,

    /// Air temperature
    #[strum(serialize = "temperature")]
    Temperature,

    /// Relative humidity
    #[strum(serialize = "humidity")]
    Humidity,

    /// Barometric pressure
    #[strum(serialize = "pressure")]
    Pressure,

    /// Rain accumulation
    #[strum(serialize = "rain")]
    Rain,
}

/// Error decoding a `CandidateFrame`
#[derive(Error, Clone, Debug, PartialEq)]
pub enum DecodeErr {
    /// Frame contains non-ASCII bytes
    #[error("invalid frame: contains non-ASCII bytes")]
    NotAscii,

    /// Frame layout does not match the active schema
    #[error("invalid frame: expected \"{expected}\" layout, found {found}")]
    WrongShape {
        /// Active schema
        expected: SchemaVariant,

        /// What the frame looks like
        found: FrameShape,
    },

    /// A numeric field could not be parsed
    #[error("invalid frame: {field} \"{token}\" is not a number")]
    NotNumeric {
        /// Field
        field: Field,

        /// Offending token
        token: String,
    },

    /// A numeric field is outside of its permitted range
    #[error("invalid frame: {field} {value} is out of range")]
    OutOfRange {
        /// Field
        field: Field,

        /// Offending value
        value: f64,
    },

    /// The status and checksum token is malformed
    #[error("invalid frame: status \"{0}\" does not match STATUS*CHECKSUM")]
    BadStatus(String),
}

impl DecodeErr {
    /// Frame shape, if the frame was tokenized
    ///
    /// Returns the observed shape of frames rejected for
    /// having the wrong layout.
    pub fn shape(&self) -> Option<FrameShape> {
        match self {
            DecodeErr::WrongShape { found, .. } => Some(*found),
            _ => None,
        }
    }
}

/// Observed frame layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameShape {
    /// Layout of a known schema variant
    Variant(SchemaVariant),

    /// Unrecognized layout with the given number of tokens
    Unknown {
        /// Token count
        tokens: usize,
    },
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameShape::Variant(variant) => write!(f, "\"{}\" layout", variant),
            FrameShape::Unknown { tokens } => write!(f, "unrecognized layout ({} tokens)", tokens),
        }
    }
}

/// Inclusive numeric range
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Bounds {
    /// Minimum permitted value
    pub min: f64,

    /// Maximum permitted value
    pub max: f64,
}

impl Bounds {
    /// Range `[min, max]`
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True if `value` is within range
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Permitted ranges for numeric fields
///
/// The defaults cover the measurement ranges of the
/// transmitter's sensors. The rain range applies only to
/// frames with the rain bucket layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRanges {
    /// Wind speed (m/s)
    pub wind_speed_mps: Bounds,

    /// Wind direction (degrees)
    pub wind_direction_deg: Bounds,

    /// Air temperature (°C)
    pub air_temperature_c: Bounds,

    /// Relative humidity (%)
    pub relative_humidity_pct: Bounds,

    /// Barometric pressure (hPa)
    pub pressure_hpa: Bounds,

    /// Rain accumulation (mm)
    pub rain_accum_mm: Bounds,
}

impl FieldRanges {
    /// Range for `field`
    pub fn of(&self, field: Field) -> &Bounds {
        match field {
            Field::WindSpeed => &self.wind_speed_mps,
            Field::WindDirection => &self.wind_direction_deg,
            Field::Temperature => &self.air_temperature_c,
            Field::Humidity => &self.relative_humidity_pct,
            Field::Pressure => &self.pressure_hpa,
            Field::Rain => &self.rain_accum_mm,
        }
    }
}

impl std::default::Default for FieldRanges {
    fn default() -> Self {
        Self {
            wind_speed_mps: Bounds::new(0.0, 100.0),
            wind_direction_deg: Bounds::new(0.0, 359.9),
            air_temperature_c: Bounds::new(-60.0, 70.0),
            relative_humidity_pct: Bounds::new(0.0, 100.0),
            pressure_hpa: Bounds::new(300.0, 1200.0),
            rain_accum_mm: Bounds::new(0.0, 99999.0 * RAIN_MM_PER_TIP),
        }
    }
}

/// Field decoder
///
/// Splits frames into tokens and maps them positionally onto a
/// [`Reading`]. Decoding is strict: any problem with any field
/// rejects the entire frame.
#[derive(Clone, Debug)]
pub struct FieldDecoder {
    separator: char,
    ranges: FieldRanges,
}

impl FieldDecoder {
    /// New decoder
    ///
    /// Tokens are separated by `separator`. Numeric fields must
    /// lie within `ranges`.
    pub fn new(separator: char, ranges: FieldRanges) -> Self {
        Self { separator, ranges }
    }

    /// Classify a frame's layout without decoding it
    pub fn shape(&self, frame: &CandidateFrame) -> Result<FrameShape, DecodeErr> {
        let text = frame.as_str().ok_or(DecodeErr::NotAscii)?;
        let (tokens, count) = tokenize(text, self.separator);
        Ok(classify(&tokens, count))
    }

    /// Decode a frame with the given layout
    ///
    /// The frame must match the `variant` layout exactly.
    pub fn decode(
        &self,
        frame: &CandidateFrame,
        variant: SchemaVariant,
    ) -> Result<Reading, DecodeErr> {
        let text = frame.as_str().ok_or(DecodeErr::NotAscii)?;
        let (tokens, count) = tokenize(text, self.separator);
        let shape = classify(&tokens, count);
        if shape != FrameShape::Variant(variant) {
            return Err(DecodeErr::WrongShape {
                expected: variant,
                found: shape,
            });
        }

        let address = tokens[0].chars().next().unwrap_or('?');
        let wind_speed_mps = self.number(Field::WindSpeed, tokens[1])?;
        let wind_direction_deg = self.number(Field::WindDirection, tokens[2])?;
        let air_temperature_c = self.number(Field::Temperature, tokens[3])?;
        let relative_humidity_pct = self.number(Field::Humidity, tokens[4])?;
        let pressure_hpa = self.number(Field::Pressure, tokens[5])?;
        let rain_accum_mm = if variant.has_rain() {
            Some(self.rain(tokens[6])?)
        } else {
            None
        };
        let (status, checksum) = parse_status(tokens[variant.token_count() - 1])?;

        Ok(Reading {
            address,
            wind_speed_mps,
            wind_direction_deg,
            air_temperature_c,
            relative_humidity_pct,
            pressure_hpa,
            rain_accum_mm,
            status,
            checksum,
        })
    }

    // Parse and range-check a decimal field
    fn number(&self, field: Field, token: &str) -> Result<f64, DecodeErr> {
        let value: f64 = token
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| DecodeErr::NotNumeric {
                field,
                token: token.to_owned(),
            })?;
        self.check(field, value)
    }

    // Parse bucket tips and convert to millimeters
    fn rain(&self, token: &str) -> Result<f64, DecodeErr> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeErr::NotNumeric {
                field: Field::Rain,
                token: token.to_owned(),
            });
        }
        let tips: u32 = token.parse().map_err(|_e| DecodeErr::NotNumeric {
            field: Field::Rain,
            token: token.to_owned(),
        })?;
        self.check(Field::Rain, tips as f64 * RAIN_MM_PER_TIP)
    }

    fn check(&self, field: Field, value: f64) -> Result<f64, DecodeErr> {
        if self.ranges.of(field).contains(value) {
            Ok(value)
        } else {
            Err(DecodeErr::OutOfRange { field, value })
        }
    }
}

// Largest number of tokens in any known layout
const MAX_TOKENS: usize = 8;

// Frame tokens, and the total number of tokens
//
// Only the first `MAX_TOKENS` tokens are retained. The count
// includes all of them.
type Tokens<'f> = ArrayVec<&'f str, MAX_TOKENS>;

// Split `text` at `separator`, skipping empty tokens
fn tokenize(text: &str, separator: char) -> (Tokens<'_>, usize) {
    let mut tokens = Tokens::new();
    let mut count = 0;
    for token in text.split(separator).filter(|t| !t.is_empty()) {
        let _ = tokens.try_push(token);
        count += 1;
    }
    (tokens, count)
}

// Determine frame layout
//
// Both layouts start with a one-character address and end with
// the `STATUS*CHECKSUM` token. The rain bucket layout has one
// more token, an integer tip count, just before the status.
// All the other numeric fields have decimal points.
fn classify(tokens: &[&str], count: usize) -> FrameShape {
    let unknown = FrameShape::Unknown { tokens: count };
    if count != tokens.len() || count < SchemaVariant::WithoutRain.token_count() {
        return unknown;
    }

    let address_ok = tokens[0].chars().count() == 1;
    let status_ok = tokens[count - 1].contains('*');
    let penultimate_decimal = tokens[count - 2].contains('.');
    if !address_ok || !status_ok {
        return unknown;
    }

    if count == SchemaVariant::WithoutRain.token_count() && penultimate_decimal {
        FrameShape::Variant(SchemaVariant::WithoutRain)
    } else if count == SchemaVariant::WithRain.token_count() && !penultimate_decimal {
        FrameShape::Variant(SchemaVariant::WithRain)
    } else {
        unknown
    }
}

// Parse `SS*CC` status and checksum token
fn parse_status(token: &str) -> Result<(u8, u8), DecodeErr> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^([[:xdigit:]]{2})\*([[:xdigit:]]{2})$").expect("bad status regexp");
    }

    let bad = || DecodeErr::BadStatus(token.to_owned());
    let caps = RE.captures(token).ok_or_else(bad)?;
    let status = u8::from_str_radix(&caps[1], 16).map_err(|_e| bad())?;
    let checksum = u8::from_str_radix(&caps[2], 16).map_err(|_e| bad())?;
    Ok((status, checksum))
}
