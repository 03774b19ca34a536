//! Full receiver chain

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use std::collections::VecDeque;
use std::convert::From;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

mod assembler;
mod fields;
mod framing;
mod gust;
mod output;
mod schema;
mod timeddata;

pub use assembler::RecordAssembler;
pub use fields::{
    Bounds, DecodeErr, Field, FieldDecoder, FieldRanges, FrameShape, Reading, RAIN_MM_PER_TIP,
};
pub use framing::{CandidateFrame, FrameReader};
pub use gust::{Gust, GustEstimator, GustSample, GustWatch, MAX_GUST_WINDOW};
pub use output::{FnSink, ObservationSink, ReceiverEvent};
pub use schema::{
    Observation, SchemaAmbiguous, SchemaChange, SchemaDetector, SchemaState, SchemaVariant, Tally,
};

use crate::builder::WeatherReceiverBuilder;
use crate::observation::Arrival;
use crate::source::{ByteSource, SourceRead};

/// A complete ResponseOne receiver chain
///
/// The receive chain takes bytes from a [`ByteSource`] and
/// performs the following operations:
///
/// 1. Framing: split the byte stream into frames at the
///    terminator, discarding oversize runs of noise
/// 2. Schema detection: during warm-up, decide whether the
///    rain bucket channel is present
/// 3. Field decoding: convert each frame to a [`Reading`],
///    rejecting any frame with a bad field
/// 4. Gust estimation: track peak wind over a trailing window
/// 5. Assembly: emit an [`ObservationRecord`](crate::ObservationRecord)
///
/// To create the receiver, first create its Builder:
///
/// ```
/// use rmyro::WeatherReceiverBuilder;
///
/// let receiver = WeatherReceiverBuilder::default().build();
/// assert_eq!(None, receiver.schema());
/// ```
///
/// All processing is sequential. Observations are produced in
/// the order their frames arrive. The only place the receiver
/// blocks is while reading from the byte source, and every read
/// is bounded by the configured read timeout.
#[derive(Clone, Debug)]
pub struct WeatherReceiver {
    framer: FrameReader,
    decoder: FieldDecoder,
    detector: SchemaDetector,
    gusts: GustEstimator,
    assembler: RecordAssembler,
    watch: GustWatch,
    read_timeout: Duration,
    read_chunk_len: usize,
    stats: DecodeStats,
    failure: Option<SchemaAmbiguous>,
}

/// Terminal receiver failure
///
/// Problems with individual frames are never errors. These
/// errors end the session; the caller decides whether to build
/// a new receiver and start over.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// The byte source failed
    #[error("unable to read from transmitter: {0}")]
    Io(#[from] io::Error),

    /// The frame schema could not be determined
    #[error(transparent)]
    SchemaAmbiguous(#[from] SchemaAmbiguous),
}

/// Receiver diagnostic counters
///
/// All counts are lifetime totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DecodeStats {
    /// Bytes read from the source
    pub bytes: u64,

    /// Non-empty frames received
    pub frames: u64,

    /// Frames decoded into observations
    pub readings: u64,

    /// Frames which could not be decoded
    pub decode_failures: u64,

    /// Runs of input discarded for lack of a terminator
    pub overflows: u64,

    /// Bytes discarded as noise
    pub discarded_bytes: u64,

    /// Inconclusive warm-up rounds
    pub warmup_rounds_failed: u64,

    /// Times the schema was re-detected
    pub redetections: u64,
}

impl fmt::Display for DecodeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes, {} frames, {} observations, {} decode failures, \
             {} overflows ({} bytes discarded), {} failed warm-ups, {} re-detections",
            self.bytes,
            self.frames,
            self.readings,
            self.decode_failures,
            self.overflows,
            self.discarded_bytes,
            self.warmup_rounds_failed,
            self.redetections
        )
    }
}

/// Cooperative stop request
///
/// Clone a `StopSignal` and give it to another thread or a
/// signal handler. When any clone is [stopped](#method.stop),
/// [`WeatherReceiver::run()`] returns at the next frame
/// boundary, no later than one read timeout after the request.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// New signal, not stopped
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True if a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl WeatherReceiver {
    /// Run the receiver to completion
    ///
    /// Reads from `source` and hands every observation to
    /// `sink`, in order, until:
    ///
    /// * the source is [closed](SourceRead::Closed),
    ///   which returns `Ok`; or
    /// * `stop` is raised, which also returns `Ok`; or
    /// * a terminal [`ReceiverError`] occurs.
    ///
    /// On success, returns the lifetime statistics. The source
    /// is closed before returning.
    pub fn run<S, K>(
        &mut self,
        mut source: S,
        mut sink: K,
        stop: &StopSignal,
    ) -> Result<DecodeStats, ReceiverError>
    where
        S: ByteSource,
        K: ObservationSink,
    {
        let mut events = Vec::new();
        let result = loop {
            if stop.is_stopped() {
                info!("receiver: stop requested");
                break Ok(());
            }

            let res = self.poll(&mut source, &mut events);
            for evt in events.drain(..) {
                if let ReceiverEvent::Observation(rec) = evt {
                    sink.accept(rec);
                }
            }

            match res {
                Ok(SourceRead::Closed) => break Ok(()),
                Ok(_) => continue,
                Err(err) => break Err(err),
            }
        };

        if let Err(err) = source.close() {
            warn!("receiver: unable to close source: {}", err);
        }

        result.map(|_| self.stats())
    }

    /// Receive events from a byte source
    ///
    /// Bind an iterator which reads `source` and produces
    /// [`ReceiverEvent`]s. The iterator blocks while the source
    /// is silent. It ends when the source closes or after
    /// yielding a terminal error.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter<S>(&mut self, source: S) -> SourceIter<'_, S>
    where
        S: ByteSource,
    {
        SourceIter {
            source,
            receiver: self,
            pending: VecDeque::new(),
            error: None,
            done: false,
        }
    }

    /// Perform one read from `source`
    ///
    /// Reads up to one chunk of bytes, waiting no longer than the
    /// read timeout, and processes every frame it completes. The
    /// resulting events are appended to `events`, even if an
    /// error is returned.
    ///
    /// Returns the outcome of the read.
    pub fn poll<S>(
        &mut self,
        source: &mut S,
        events: &mut Vec<ReceiverEvent>,
    ) -> Result<SourceRead, ReceiverError>
    where
        S: ByteSource + ?Sized,
    {
        if let Some(err) = &self.failure {
            return Err(err.clone().into());
        }

        let mut buf = vec![0u8; self.read_chunk_len];
        let res = source.read_timeout(&mut buf, self.read_timeout)?;
        let len = match res {
            SourceRead::Bytes(len) => len,
            _ => return Ok(res),
        };

        let arrival = Arrival::now();
        self.stats.bytes += len as u64;
        for &byte in &buf[..len] {
            if let Some(frame) = self.framer.input(byte) {
                events.push(self.process_frame(&frame, arrival)?);
            }
        }

        Ok(res)
    }

    /// Process one complete frame
    ///
    /// Decodes a `frame` which arrived at time `arrival`. Every
    /// frame produces exactly one event, unless schema detection
    /// has failed.
    pub fn process_frame(
        &mut self,
        frame: &CandidateFrame,
        arrival: Arrival,
    ) -> Result<ReceiverEvent, ReceiverError> {
        if let Some(err) = &self.failure {
            return Err(err.clone().into());
        }

        self.stats.frames += 1;
        let out = match self.detector.variant() {
            None => self.detect(frame),
            Some(variant) => self.decode(frame, variant, arrival),
        };

        if let Err(ReceiverError::SchemaAmbiguous(err)) = &out {
            warn!("receiver: {}", err);
            self.failure = Some(err.clone());
        }
        out
    }

    /// Active schema, or `None` during warm-up
    pub fn schema(&self) -> Option<SchemaVariant> {
        self.detector.variant()
    }

    /// Schema detector state
    pub fn schema_state(&self) -> &SchemaState {
        self.detector.state()
    }

    /// Handle to the most recent gust estimate
    ///
    /// The handle may be sent to other threads.
    pub fn gust_watch(&self) -> GustWatch {
        self.watch.clone()
    }

    /// Lifetime statistics
    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            overflows: self.framer.overflow_count(),
            discarded_bytes: self.framer.discarded_bytes(),
            ..self.stats
        }
    }

    /// Clear all states and return to warm-up
    ///
    /// Lifetime statistics are retained.
    pub fn reset(&mut self) {
        self.framer.reset();
        self.detector.reset();
        self.gusts.reset();
        self.assembler.reset();
        self.watch.publish(None);
        self.failure = None;
    }

    // warm-up: report the frame's shape only
    fn detect(&mut self, frame: &CandidateFrame) -> Result<ReceiverEvent, ReceiverError> {
        let shape = match self.decoder.shape(frame) {
            Ok(shape) => shape,
            Err(err) => {
                self.stats.decode_failures += 1;
                debug!("receiver: warm-up: dropped \"{}\": {}", frame, err);
                return Ok(ReceiverEvent::Dropped(err));
            }
        };

        debug!("receiver: warm-up: {}: \"{}\"", shape, frame);
        match self.detector.observe(Observation::Shape(shape))? {
            Some(SchemaChange::Locked(variant)) => Ok(ReceiverEvent::SchemaLocked(variant)),
            Some(SchemaChange::RoundFailed(tally)) => {
                self.stats.warmup_rounds_failed += 1;
                Ok(ReceiverEvent::WarmupRoundFailed(tally))
            }
            Some(SchemaChange::Redetecting) | None => match self.detector.state() {
                SchemaState::Detecting(tally) => Ok(ReceiverEvent::Warmup(*tally)),
                SchemaState::Locked { variant, .. } => Ok(ReceiverEvent::SchemaLocked(*variant)),
            },
        }
    }

    // locked: decode, estimate gust, assemble
    fn decode(
        &mut self,
        frame: &CandidateFrame,
        variant: SchemaVariant,
        arrival: Arrival,
    ) -> Result<ReceiverEvent, ReceiverError> {
        let reading = match self.decoder.decode(frame, variant) {
            Ok(reading) => reading,
            Err(err) => {
                self.stats.decode_failures += 1;
                info!("receiver: dropped \"{}\": {}", frame, err);

                let shape = err.shape().unwrap_or(FrameShape::Variant(variant));
                return match self.detector.observe(Observation::Failed(shape))? {
                    Some(SchemaChange::Redetecting) => {
                        self.stats.redetections += 1;
                        self.assembler.reset();
                        Ok(ReceiverEvent::Redetecting)
                    }
                    _ => Ok(ReceiverEvent::Dropped(err)),
                };
            }
        };

        self.detector.observe(Observation::Decoded)?;
        if reading.status != 0 {
            debug!("receiver: transmitter status {:02X}", reading.status);
        }

        self.gusts.insert(
            GustSample {
                speed_mps: reading.wind_speed_mps,
                direction_deg: reading.wind_direction_deg,
            },
            arrival.instant,
        );
        let gust = self.gusts.gust_at(arrival.instant);
        self.watch.publish(gust);

        self.stats.readings += 1;
        let record = self.assembler.assemble(reading, gust, arrival);
        debug!("receiver: {}", record);
        Ok(ReceiverEvent::Observation(record))
    }
}

impl From<&WeatherReceiverBuilder> for WeatherReceiver {
    /// Create the receiver from its Builder
    fn from(cfg: &WeatherReceiverBuilder) -> Self {
        Self {
            framer: FrameReader::new(cfg.max_frame_len(), cfg.terminators()),
            decoder: FieldDecoder::new(cfg.separator(), *cfg.field_ranges()),
            detector: SchemaDetector::new(
                cfg.warmup_frames(),
                cfg.warmup_majority(),
                cfg.warmup_max_rounds(),
                cfg.redetect_after(),
            ),
            gusts: GustEstimator::new(cfg.gust_window(), cfg.gust_min_samples()),
            assembler: RecordAssembler::new(),
            watch: GustWatch::new(),
            read_timeout: cfg.read_timeout(),
            read_chunk_len: cfg.read_chunk_len(),
            stats: DecodeStats::default(),
            failure: None,
        }
    }
}

/// Byte source iterator
///
/// This iterator is bound to a [`ByteSource`]. Calling the
/// `next()` method reads until the next [`ReceiverEvent`] is
/// available. Returns `None` once the source has closed or a
/// terminal error has been returned.
#[derive(Debug)]
pub struct SourceIter<'rx, S>
where
    S: ByteSource,
{
    source: S,
    receiver: &'rx mut WeatherReceiver,
    pending: VecDeque<ReceiverEvent>,
    error: Option<ReceiverError>,
    done: bool,
}

impl<'rx, S> Iterator for SourceIter<'rx, S>
where
    S: ByteSource,
{
    type Item = Result<ReceiverEvent, ReceiverError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut events = Vec::new();
        loop {
            if let Some(evt) = self.pending.pop_front() {
                return Some(Ok(evt));
            }
            if let Some(err) = self.error.take() {
                return Some(Err(err));
            }
            if self.done {
                return None;
            }

            let res = self.receiver.poll(&mut self.source, &mut events);
            self.pending.extend(events.drain(..));
            match res {
                Ok(SourceRead::Closed) => self.done = true,
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    self.error = Some(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Read};
    use std::time::{Instant, SystemTime};

    use assert_approx_eq::assert_approx_eq;

    use crate::source::{ChannelSource, IoSource, ZeroRead};
    use crate::ObservationRecord;

    // scripted byte source
    #[derive(Debug, Default)]
    struct Script {
        steps: VecDeque<io::Result<Vec<u8>>>,
        closed: bool,
    }

    impl Script {
        fn bytes(mut self, data: &[u8]) -> Self {
            self.steps.push_back(Ok(data.to_vec()));
            self
        }

        fn timeout(mut self) -> Self {
            self.steps.push_back(Ok(vec![]));
            self
        }

        fn fail(mut self) -> Self {
            self.steps.push_back(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "device unplugged",
            )));
            self
        }
    }

    impl ByteSource for Script {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<SourceRead> {
            match self.steps.pop_front() {
                None => Ok(SourceRead::Closed),
                Some(Err(err)) => Err(err),
                Some(Ok(data)) if data.is_empty() => Ok(SourceRead::TimedOut),
                Some(Ok(mut data)) => {
                    let len = usize::min(buf.len(), data.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    if len < data.len() {
                        self.steps.push_front(Ok(data.split_off(len)));
                    }
                    Ok(SourceRead::Bytes(len))
                }
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn without_rain(speed: f64, dir: f64) -> String {
        format!("0 {:.2} {:.1} 22.1 50.1 0998.6 00*08\r", speed, dir)
    }

    fn with_rain(speed: f64, dir: f64, tips: u32) -> String {
        format!("0 {:.2} {:.1} 22.1 50.1 0998.6 {:05} 00*08\r", speed, dir, tips)
    }

    fn receiver() -> WeatherReceiver {
        WeatherReceiverBuilder::new()
            .with_warmup(4, 0.75, 2)
            .with_redetect_after(3)
            .with_gust_window(Duration::from_secs(3))
            .build()
    }

    fn frame(s: &str) -> CandidateFrame {
        CandidateFrame::new(s).expect("expected frame")
    }

    #[test]
    fn test_warmup_then_observe() {
        let mut script = Script::default();
        for i in 0..6 {
            script = script.bytes(without_rain(i as f64, 10.0 * i as f64).as_bytes());
        }

        let mut rx = receiver();
        let events: Vec<ReceiverEvent> = rx
            .iter(&mut script)
            .collect::<Result<_, _>>()
            .expect("unexpected failure");

        assert_eq!(6, events.len());
        assert!(matches!(events[0], ReceiverEvent::Warmup(_)));
        assert_eq!(
            ReceiverEvent::SchemaLocked(SchemaVariant::WithoutRain),
            events[3]
        );

        let rec = events[4].observation().expect("expected observation");
        assert_approx_eq!(4.0, rec.wind_speed_mps());
        assert_approx_eq!(40.0, rec.wind_direction_deg());
        assert_eq!(None, rec.rain_total_mm());

        let rec = events[5].observation().expect("expected observation");
        assert_approx_eq!(5.0, rec.wind_gust_mps().unwrap());

        let stats = rx.stats();
        assert_eq!(6, stats.frames);
        assert_eq!(2, stats.readings);
        assert_eq!(0, stats.decode_failures);
    }

    #[test]
    fn test_malformed_frames_skipped() {
        let mut rx = receiver();
        let arrival = Arrival::now();
        for _i in 0..4 {
            rx.process_frame(&frame(&with_rain(1.0, 1.0, 0)), arrival)
                .unwrap();
        }
        assert_eq!(Some(SchemaVariant::WithRain), rx.schema());

        for bad in [
            "0 1.00 1.0 22.1 150.1 0998.6 00000 00*08",
            "0 1.00 x 22.1 50.1 0998.6 00000 00*08",
            "0 1.00",
            "$WIMWV,270.0,R,5.0,M,A*3C",
        ] {
            let evt = rx.process_frame(&frame(bad), arrival).unwrap();
            assert!(matches!(evt, ReceiverEvent::Dropped(_)));
        }

        let evt = rx
            .process_frame(&frame(&with_rain(2.0, 1.0, 3)), arrival)
            .unwrap();
        let rec = evt.into_observation().expect("expected observation");
        assert_approx_eq!(2.0, rec.wind_speed_mps());
        assert_approx_eq!(0.3, rec.rain_total_mm().unwrap());
        assert_eq!(4, rx.stats().decode_failures);
    }

    #[test]
    fn test_redetect() {
        let mut rx = receiver();
        let arrival = Arrival::now();
        for _i in 0..4 {
            rx.process_frame(&frame(&with_rain(1.0, 1.0, 0)), arrival)
                .unwrap();
        }

        // a frame without rain is a decode failure, not a reinterpretation
        let evt = rx
            .process_frame(&frame(&without_rain(1.0, 1.0)), arrival)
            .unwrap();
        assert_eq!(
            ReceiverEvent::Dropped(DecodeErr::WrongShape {
                expected: SchemaVariant::WithRain,
                found: FrameShape::Variant(SchemaVariant::WithoutRain)
            }),
            evt
        );
        rx.process_frame(&frame(&without_rain(1.0, 1.0)), arrival)
            .unwrap();
        assert_eq!(Some(SchemaVariant::WithRain), rx.schema());

        let evt = rx
            .process_frame(&frame(&without_rain(1.0, 1.0)), arrival)
            .unwrap();
        assert_eq!(ReceiverEvent::Redetecting, evt);
        assert_eq!(None, rx.schema());

        for _i in 0..4 {
            rx.process_frame(&frame(&without_rain(1.0, 1.0)), arrival)
                .unwrap();
        }
        assert_eq!(Some(SchemaVariant::WithoutRain), rx.schema());
        assert_eq!(1, rx.stats().redetections);
    }

    #[test]
    fn test_ambiguous_is_terminal() {
        let mut script = Script::default();
        for i in 0..8 {
            if i % 2 == 0 {
                script = script.bytes(with_rain(1.0, 1.0, 0).as_bytes());
            } else {
                script = script.bytes(without_rain(1.0, 1.0).as_bytes());
            }
        }
        script = script.bytes(with_rain(1.0, 1.0, 0).as_bytes());

        let mut rx = receiver();
        let mut out: Vec<ObservationRecord> = vec![];
        let err = rx
            .run(&mut script, &mut out, &StopSignal::new())
            .expect_err("expected failure");
        match err {
            ReceiverError::SchemaAmbiguous(err) => {
                assert_eq!(2, err.rounds);
                assert_eq!(2, err.with_rain);
                assert_eq!(2, err.without_rain);
            }
            _ => unreachable!(),
        }
        assert!(out.is_empty());
        assert!(script.closed);
        assert_eq!(1, script.steps.len());

        // stays failed
        assert!(rx
            .process_frame(&frame(&with_rain(1.0, 1.0, 0)), Arrival::now())
            .is_err());
        rx.reset();
        assert!(rx
            .process_frame(&frame(&with_rain(1.0, 1.0, 0)), Arrival::now())
            .is_ok());
    }

    #[test]
    fn test_io_failure_is_terminal() {
        let mut script = Script::default();
        for _i in 0..5 {
            script = script.bytes(without_rain(1.0, 1.0).as_bytes());
        }
        script = script.timeout().fail().bytes(without_rain(1.0, 1.0).as_bytes());

        let mut rx = receiver();
        let mut out: Vec<ObservationRecord> = vec![];
        let err = rx
            .run(&mut script, &mut out, &StopSignal::new())
            .expect_err("expected failure");
        assert!(matches!(err, ReceiverError::Io(_)));
        assert_eq!(1, out.len());
    }

    #[test]
    fn test_resync() {
        let mut input = vec![];
        for _i in 0..4 {
            input.extend_from_slice(without_rain(1.0, 1.0).as_bytes());
        }
        input.extend_from_slice(b"garbage,no,terminator...");
        input.extend(std::iter::repeat(b'#').take(600));
        input.extend_from_slice(b"\r");
        input.extend_from_slice(without_rain(7.5, 270.0).as_bytes());

        let mut rx = receiver();
        let mut out: Vec<ObservationRecord> = vec![];
        let stats = rx
            .run(
                IoSource::new(Cursor::new(input)),
                &mut out,
                &StopSignal::new(),
            )
            .expect("unexpected failure");

        assert_eq!(1, out.len());
        assert_approx_eq!(7.5, out[0].wind_speed_mps());
        assert_approx_eq!(270.0, out[0].wind_direction_deg());
        assert_eq!(5, stats.frames);
        assert_eq!(1, stats.overflows);
        assert_eq!(0, stats.decode_failures);
    }

    #[test]
    fn test_gust_end_to_end() {
        let mut rx = receiver();
        let t0 = Instant::now();
        let at = |s: f64| Arrival::at(t0 + Duration::from_secs_f64(s), SystemTime::now());
        assert_eq!(None, rx.gust_watch().latest());

        for _i in 0..4 {
            rx.process_frame(&frame(&without_rain(0.0, 0.0)), at(0.0))
                .unwrap();
        }
        assert_eq!(Some(SchemaVariant::WithoutRain), rx.schema());
        assert_eq!(None, rx.gust_watch().latest());

        for (t, speed, dir) in [(0.0, 5.0, 100.0), (1.0, 9.0, 200.0), (2.0, 4.0, 300.0)] {
            rx.process_frame(&frame(&without_rain(speed, dir)), at(t))
                .unwrap();
        }

        let rec = rx
            .process_frame(&frame(&without_rain(1.0, 10.0)), at(2.5))
            .unwrap()
            .into_observation()
            .expect("expected observation");
        assert_approx_eq!(9.0, rec.wind_gust_mps().unwrap());
        assert_approx_eq!(200.0, rec.wind_gust_dir_deg().unwrap());
        assert!(!rec.gust_low_density());

        let rec = rx
            .process_frame(&frame(&without_rain(1.0, 10.0)), at(4.5))
            .unwrap()
            .into_observation()
            .expect("expected observation");
        assert_approx_eq!(4.0, rec.wind_gust_mps().unwrap());
        assert_approx_eq!(300.0, rec.wind_gust_dir_deg().unwrap());

        let watched = rx.gust_watch().latest().expect("expected gust");
        assert_approx_eq!(4.0, watched.speed_mps);
    }

    // serial tty with a read timeout: zero-length reads while quiet
    struct QuietTty(VecDeque<Vec<u8>>);

    impl QuietTty {
        fn new() -> Self {
            let frame = without_rain(1.0, 1.0).into_bytes();
            Self(VecDeque::from(vec![
                frame.clone(),
                frame.clone(),
                vec![],
                frame.clone(),
                frame.clone(),
                frame,
            ]))
        }
    }

    impl Read for QuietTty {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let chunk = self
                .0
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unplugged"))?;
            let len = usize::min(chunk.len(), buf.len());
            buf[..len].copy_from_slice(&chunk[..len]);
            Ok(len)
        }
    }

    #[test]
    fn test_quiet_tty_keeps_session() {
        fn run(source: &mut dyn ByteSource) -> (Result<DecodeStats, ReceiverError>, usize) {
            let mut rx = WeatherReceiverBuilder::new()
                .with_warmup(1, 1.0, 1)
                .with_read_timeout(Duration::from_millis(100))
                .build();
            let mut out: Vec<ObservationRecord> = vec![];
            let res = rx.run(source, &mut out, &StopSignal::new());
            (res, out.len())
        }

        let (res, count) = run(&mut IoSource::with_zero_read(
            QuietTty::new(),
            ZeroRead::TimedOut,
        ));
        assert!(matches!(res, Err(ReceiverError::Io(_))));
        assert_eq!(4, count);

        let (res, count) = run(
            &mut ChannelSource::spawn_with(QuietTty::new(), 64, ZeroRead::TimedOut)
                .expect("spawn"),
        );
        assert!(matches!(res, Err(ReceiverError::Io(_))));
        assert_eq!(4, count);

        // by default, a zero-length read is the end
        let (res, count) = run(&mut IoSource::new(QuietTty::new()));
        assert!(res.is_ok());
        assert_eq!(1, count);
    }

    // reader which never returns
    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    #[test]
    fn test_stop_signal() {
        let mut rx = WeatherReceiverBuilder::new()
            .with_read_timeout(Duration::from_millis(50))
            .build();
        let stop = StopSignal::new();
        let source = ChannelSource::spawn(Silent, 16).expect("spawn");

        let remote = stop.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.stop();
        });

        let started = Instant::now();
        let stats = rx
            .run(source, Vec::<ObservationRecord>::new(), &stop)
            .expect("unexpected failure");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(0, stats.frames);
        stopper.join().expect("stopper failed");
    }
}
