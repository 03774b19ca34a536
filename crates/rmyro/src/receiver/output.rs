use std::fmt;
use std::sync::mpsc::{Sender, SyncSender, TrySendError};

#[cfg(not(test))]
use log::warn;

#[cfg(test)]
use std::println as warn;

use super::fields::DecodeErr;
use super::schema::{SchemaVariant, Tally};
use crate::observation::ObservationRecord;

/// Receiver event
///
/// Every frame the receiver reads produces exactly one event.
/// Most clients need only the
/// [`Observation`](ReceiverEvent::Observation) events; the
/// rest describe schema detection and rejected frames.
#[derive(Clone, Debug, PartialEq)]
pub enum ReceiverEvent {
    /// A frame was consumed by schema detection
    ///
    /// Frames received during warm-up are used only to
    /// determine the schema and are not decoded.
    Warmup(Tally),

    /// Warm-up round was inconclusive and has restarted
    WarmupRoundFailed(Tally),

    /// Warm-up concluded and the schema is now locked
    SchemaLocked(SchemaVariant),

    /// Frames of the other schema variant have been received
    /// repeatedly, and warm-up has restarted
    Redetecting,

    /// A frame was decoded into an observation
    Observation(ObservationRecord),

    /// A frame could not be decoded and was dropped
    Dropped(DecodeErr),
}

impl ReceiverEvent {
    /// Observation, if any
    pub fn observation(&self) -> Option<&ObservationRecord> {
        match self {
            ReceiverEvent::Observation(rec) => Some(rec),
            _ => None,
        }
    }

    /// Consume event, returning the observation, if any
    pub fn into_observation(self) -> Option<ObservationRecord> {
        match self {
            ReceiverEvent::Observation(rec) => Some(rec),
            _ => None,
        }
    }
}

impl fmt::Display for ReceiverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverEvent::Warmup(tally) => write!(
                f,
                "warm-up: round {}, frame {}",
                tally.round + 1,
                tally.total()
            ),
            ReceiverEvent::WarmupRoundFailed(tally) => write!(
                f,
                "warm-up: round {} inconclusive ({} with rain, {} without, {} other)",
                tally.round + 1,
                tally.with_rain,
                tally.without_rain,
                tally.other
            ),
            ReceiverEvent::SchemaLocked(variant) => write!(f, "schema: {}", variant),
            ReceiverEvent::Redetecting => write!(f, "schema: re-detecting"),
            ReceiverEvent::Observation(rec) => rec.fmt(f),
            ReceiverEvent::Dropped(err) => err.fmt(f),
        }
    }
}

/// Destination for observations
///
/// The receiver hands over each observation, in order, and
/// does not wait for any acknowledgement. Sinks must not
/// block for long: the receiver cannot read while a sink
/// is busy.
pub trait ObservationSink {
    /// Accept one observation
    fn accept(&mut self, record: ObservationRecord);
}

impl<S> ObservationSink for &mut S
where
    S: ObservationSink + ?Sized,
{
    fn accept(&mut self, record: ObservationRecord) {
        (**self).accept(record)
    }
}

impl ObservationSink for Vec<ObservationRecord> {
    fn accept(&mut self, record: ObservationRecord) {
        self.push(record)
    }
}

impl ObservationSink for Sender<ObservationRecord> {
    fn accept(&mut self, record: ObservationRecord) {
        if self.send(record).is_err() {
            warn!("sink: receiver hung up; observation discarded");
        }
    }
}

impl ObservationSink for SyncSender<ObservationRecord> {
    /// Never blocks. If the channel is full, the observation
    /// is discarded.
    fn accept(&mut self, record: ObservationRecord) {
        match self.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("sink: channel full; observation discarded"),
            Err(TrySendError::Disconnected(_)) => {
                warn!("sink: receiver hung up; observation discarded")
            }
        }
    }
}

/// Sink which calls a function
///
/// ```
/// use rmyro::{FnSink, IoSource, ObservationRecord, StopSignal, WeatherReceiverBuilder};
///
/// let input = b"0 3.10 180.5 22.1 50.1 0998.6 00*08\r".repeat(3);
/// let mut rx = WeatherReceiverBuilder::new().with_warmup(1, 1.0, 1).build();
///
/// let mut count = 0;
/// rx.run(
///     IoSource::new(&input[..]),
///     FnSink(|_rec: ObservationRecord| count += 1),
///     &StopSignal::new(),
/// )
/// .expect("receiver failed");
///
/// // the first frame is used for warm-up
/// assert_eq!(2, count);
/// ```
#[derive(Clone, Debug)]
pub struct FnSink<F>(pub F);

impl<F> ObservationSink for FnSink<F>
where
    F: FnMut(ObservationRecord),
{
    fn accept(&mut self, record: ObservationRecord) {
        (self.0)(record)
    }
}
