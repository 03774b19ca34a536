use std::time::Duration;

use crate::receiver::WeatherReceiver;
use crate::receiver::{Bounds, FieldRanges, MAX_GUST_WINDOW};

/// Builds a ResponseOne weather receiver
///
/// The builder comes with a sensible set of default options
/// for a transmitter in auto-transmit ASCII mode with a
/// 1000 ms output interval. Out of the box, a receiver built
/// with the defaults expects:
///
/// * pressure in hPa, temperature in °C, wind speed in m/s
/// * polar wind output
/// * carriage-return terminated frames with space-separated
///   fields
///
/// The API specified by the builder is part of this crate's
/// API. The actual default values are *not*, however, and
/// are subject to revision in any minor release. If you
/// care very strongly about a setting, be sure to configure
/// it here.
///
/// The configuration is copied into the receiver when it is
/// built and is never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherReceiverBuilder {
    gust_window: Duration,
    gust_min_samples: usize,
    warmup_frames: u32,
    warmup_majority: f32,
    warmup_max_rounds: u32,
    redetect_after: u32,
    max_frame_len: usize,
    terminators: Vec<u8>,
    separator: char,
    ranges: FieldRanges,
    read_timeout: Duration,
    read_chunk_len: usize,
}

impl WeatherReceiverBuilder {
    /// New receiver chain with "sensible" defaults
    pub fn new() -> Self {
        Self {
            gust_window: Duration::from_millis(1000),
            gust_min_samples: 2,
            warmup_frames: 10,
            warmup_majority: 0.8,
            warmup_max_rounds: 3,
            redetect_after: 5,
            max_frame_len: 256,
            terminators: vec![b'\r', b'\n'],
            separator: ' ',
            ranges: FieldRanges::default(),
            read_timeout: Duration::from_millis(500),
            read_chunk_len: 64,
        }
    }

    /// Build a receiver chain
    ///
    /// Once built, the receiver is in the warm-up state and
    /// is immediately ready to accept bytes.
    pub fn build(&self) -> WeatherReceiver {
        WeatherReceiver::from(self)
    }

    /// Gust window duration
    ///
    /// The gust is the peak wind speed among samples received
    /// within the trailing `window`. The transmitter does not
    /// report gusts itself, so this window should span several
    /// frames. A zero-length window is raised to one
    /// millisecond, and windows longer than
    /// [`MAX_GUST_WINDOW`] are shortened to it.
    pub fn with_gust_window(&mut self, window: Duration) -> &mut Self {
        self.gust_window = window.clamp(Duration::from_millis(1), MAX_GUST_WINDOW);
        self
    }

    /// Minimum gust sample count
    ///
    /// When fewer than `min_samples` wind samples fall within
    /// the gust window, gusts are still reported but are
    /// flagged as low-density.
    pub fn with_gust_min_samples(&mut self, min_samples: usize) -> &mut Self {
        self.gust_min_samples = min_samples;
        self
    }

    /// Schema detection warm-up
    ///
    /// The receiver observes `frames` frames before deciding
    /// whether the rain bucket channel is present. A variant is
    /// chosen only if at least `majority` (a fraction in
    /// `(0.5, 1.0]`) of those frames agree on it. If a warm-up
    /// round is inconclusive, another round begins. After
    /// `max_rounds` inconclusive rounds, the receiver gives up
    /// with an error.
    pub fn with_warmup(&mut self, frames: u32, majority: f32, max_rounds: u32) -> &mut Self {
        self.warmup_frames = u32::max(frames, 1);
        self.warmup_majority = f32::clamp(majority, 0.51, 1.0);
        self.warmup_max_rounds = u32::max(max_rounds, 1);
        self
    }

    /// Re-detection threshold
    ///
    /// Once a schema is locked, `run` consecutive frames which
    /// fail to decode but which match the *other* schema
    /// variant cause the receiver to repeat its warm-up. This
    /// permits the transmitter to be reconfigured without a
    /// restart.
    pub fn with_redetect_after(&mut self, run: u32) -> &mut Self {
        self.redetect_after = u32::max(run, 1);
        self
    }

    /// Maximum frame length (bytes)
    ///
    /// Runs of input longer than `len` without a terminator are
    /// discarded as noise. Valid frames are about 45 bytes
    /// long.
    pub fn with_max_frame_len(&mut self, len: usize) -> &mut Self {
        self.max_frame_len = usize::max(len, 8);
        self
    }

    /// Frame terminator bytes
    ///
    /// Any one of these bytes ends a frame. The transmitter
    /// sends a carriage return. An empty set is ignored.
    pub fn with_terminators(&mut self, terminators: &[u8]) -> &mut Self {
        if !terminators.is_empty() {
            self.terminators = terminators.to_vec();
        }
        self
    }

    /// Field separator
    ///
    /// Character which separates tokens within a frame.
    /// Consecutive separators are treated as one.
    pub fn with_separator(&mut self, separator: char) -> &mut Self {
        self.separator = separator;
        self
    }

    /// Permitted ranges for numeric fields
    ///
    /// Any field which falls outside its range invalidates the
    /// whole frame.
    pub fn with_field_ranges(&mut self, ranges: FieldRanges) -> &mut Self {
        self.ranges = ranges;
        self
    }

    /// Permitted range for wind speed (m/s)
    pub fn with_wind_speed_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.ranges.wind_speed_mps = Bounds::new(min, max);
        self
    }

    /// Byte source read timeout
    ///
    /// Bounds how long a single read may block. This is also
    /// the longest delay between a stop request and the
    /// receiver noticing it.
    pub fn with_read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = Duration::max(timeout, Duration::from_millis(1));
        self
    }

    /// Maximum bytes requested per read
    pub fn with_read_chunk_len(&mut self, len: usize) -> &mut Self {
        self.read_chunk_len = usize::max(len, 1);
        self
    }

    /// Gust window duration
    pub fn gust_window(&self) -> Duration {
        self.gust_window
    }

    /// Minimum gust sample count
    pub fn gust_min_samples(&self) -> usize {
        self.gust_min_samples
    }

    /// Warm-up frame count
    pub fn warmup_frames(&self) -> u32 {
        self.warmup_frames
    }

    /// Warm-up super-majority fraction
    pub fn warmup_majority(&self) -> f32 {
        self.warmup_majority
    }

    /// Maximum inconclusive warm-up rounds
    pub fn warmup_max_rounds(&self) -> u32 {
        self.warmup_max_rounds
    }

    /// Re-detection threshold (frames)
    pub fn redetect_after(&self) -> u32 {
        self.redetect_after
    }

    /// Maximum frame length (bytes)
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Frame terminator bytes
    pub fn terminators(&self) -> &[u8] {
        &self.terminators
    }

    /// Field separator
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Permitted ranges for numeric fields
    pub fn field_ranges(&self) -> &FieldRanges {
        &self.ranges
    }

    /// Byte source read timeout
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Maximum bytes requested per read
    pub fn read_chunk_len(&self) -> usize {
        self.read_chunk_len
    }
}

impl std::default::Default for WeatherReceiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps() {
        let mut builder = WeatherReceiverBuilder::new();
        builder
            .with_gust_window(Duration::ZERO)
            .with_warmup(0, 0.2, 0)
            .with_redetect_after(0)
            .with_max_frame_len(0)
            .with_terminators(&[])
            .with_read_chunk_len(0);

        assert_eq!(Duration::from_millis(1), builder.gust_window());
        assert_eq!(1, builder.warmup_frames());
        assert_eq!(0.51, builder.warmup_majority());
        assert_eq!(1, builder.warmup_max_rounds());
        assert_eq!(1, builder.redetect_after());
        assert_eq!(8, builder.max_frame_len());
        assert_eq!(&[b'\r', b'\n'], builder.terminators());
        assert_eq!(1, builder.read_chunk_len());

        builder.with_gust_window(Duration::MAX);
        assert_eq!(MAX_GUST_WINDOW, builder.gust_window());
    }

    #[test]
    fn test_long_gust_window() {
        let mut rx = WeatherReceiverBuilder::new()
            .with_gust_window(Duration::MAX)
            .with_warmup(1, 1.0, 1)
            .build();
        let frame = crate::CandidateFrame::new("0 3.10 180.5 22.1 50.1 0998.6 00*08").unwrap();
        let arrival = crate::Arrival::now();
        rx.process_frame(&frame, arrival).unwrap();
        let rec = rx
            .process_frame(&frame, arrival)
            .unwrap()
            .into_observation()
            .expect("expected observation");
        assert_eq!(Some(3.1), rec.wind_gust_mps());
    }
}
