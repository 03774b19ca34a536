//! # rmyro: RM Young ResponseOne Decoding
//!
//! This crate decodes the ASCII output of an
//! [RM Young](https://www.youngusa.com/) ResponseOne all-in-one
//! weather transmitter. It reads the transmitter's byte stream
//! and reports timestamped weather observations to the caller.
//!
//! ## Disclaimer
//!
//! This crate is dual-licensed MIT and Apache 2.0. Read these licenses
//! carefully as they may affect your rights.
//!
//! This crate is not affiliated with or endorsed by the transmitter's
//! manufacturer. Observations are reported as-is and are not suitable
//! for any safety-critical application.
//!
//! ## Example
//!
//! You will first need a byte stream from the transmitter. The
//! transmitter must be configured to *auto-transmit* in its ASCII
//! output mode. Opening and configuring the serial port is beyond
//! the scope of this crate; on most Unix systems, `stty` will do.
//! Anything that implements [`std::io::Read`] will work.
//!
//! ```
//! use rmyro::{ChannelSource, ReceiverEvent, WeatherReceiverBuilder};
//!
//! # let some_serial_port = || std::io::Cursor::new(b"0 3.10 180.5 22.1 50.1 0998.6 00*08\r".to_vec());
//! #
//! // create a WeatherReceiver
//! let mut rx = WeatherReceiverBuilder::new()
//!     .with_gust_window(std::time::Duration::from_secs(3)) // gust window
//!     .with_warmup(10, 0.8, 3)  // warm-up frames, majority, and rounds
//!     .build();
//!
//! // read the port on a helper thread, so reads time out
//! let source = ChannelSource::spawn(some_serial_port(), 64).expect("no thread");
//! for evt in rx.iter(source) {
//!     match evt {
//!         Ok(ReceiverEvent::Observation(obs)) => println!("{}", obs),
//!         Ok(ReceiverEvent::SchemaLocked(schema)) => println!("schema: {}", schema),
//!         Ok(_) => {}
//!         Err(err) => {
//!             eprintln!("receiver failed: {}", err);
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! The receiver is created via a
//! [builder](struct.WeatherReceiverBuilder.html).
//!
//! The [`WeatherReceiver`](struct.WeatherReceiver.html) reads from any
//! [`ByteSource`]. It can be driven three ways:
//!
//! * by iterator, with [`WeatherReceiver::iter()`], which yields a
//!   [`ReceiverEvent`] for every frame;
//! * to completion, with [`WeatherReceiver::run()`], which hands
//!   every observation to an [`ObservationSink`] until the source
//!   closes or a [`StopSignal`] is raised; or
//! * one frame at a time, with [`WeatherReceiver::process_frame()`].
//!
//! ## Background
//!
//! In ASCII auto-transmit mode, the transmitter sends one line of
//! space-separated fields at a fixed interval:
//!
//! ```txt
//! 0 3.10 180.5 22.1 50.1 0998.6 00*08
//! ```
//!
//! The fields are the sensor address, wind speed, wind direction,
//! air temperature, relative humidity, barometric pressure, and a
//! status byte with a checksum. If an optional rain bucket is
//! connected, a count of bucket tips is sent before the status.
//!
//! The transmitter does not announce whether the rain bucket is
//! present. The receiver observes the first few frames, which it
//! calls *warm-up*, to decide. If the transmitter is reconfigured
//! while running, the receiver notices and repeats warm-up.
//!
//! The transmitter does not report wind gusts. The receiver
//! synthesizes them from the peak wind speed over a trailing
//! window.
//!
//! ## Crate features
//!
//! * `chrono`: Use chrono to report observation
//!   [receive times](struct.ObservationRecord.html#method.datetime)
//!   as UTC timestamps. If enabled, `chrono` becomes part of this
//!   crate's public API.
//!

mod builder;
mod observation;
mod receiver;
mod source;

pub use builder::WeatherReceiverBuilder;
pub use observation::{Arrival, ObservationRecord};
pub use receiver::{
    Bounds, CandidateFrame, DecodeErr, DecodeStats, Field, FieldDecoder, FieldRanges, FnSink,
    FrameReader, FrameShape, Gust, GustEstimator, GustSample, GustWatch, Observation,
    ObservationSink, Reading, ReceiverError, ReceiverEvent, RecordAssembler, SchemaAmbiguous,
    SchemaChange, SchemaDetector, SchemaState, SchemaVariant, SourceIter, StopSignal, Tally,
    WeatherReceiver, MAX_GUST_WINDOW, RAIN_MM_PER_TIP,
};
pub use source::{ByteSource, ChannelSource, IoSource, SourceRead, ZeroRead};
