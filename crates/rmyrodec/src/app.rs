//! Event loop
//!
//! Drives the receiver to the end of its input, printing each
//! observation to standard output as it arrives. Everything else
//! the receiver reports goes to the log.
//!
//! If the input fails, it is reopened after a wait. The receiver
//! keeps its state across reopens. After `--max-tries`
//! consecutive failures with no data in between, we give up.

use std::time::Duration;

use anyhow::anyhow;
use chrono::SecondsFormat;
use log::{debug, info, warn};
use rmyro::{
    ByteSource, DecodeStats, ObservationRecord, ReceiverError, ReceiverEvent, WeatherReceiver,
};

use crate::cli::Args;

/// Run the application
///
/// Reads `source` with a fully-initialized `receiver` until the
/// input ends. Observations and schema changes are printed
/// unless `args` requests quiet.
///
/// Returns the receiver statistics, or the error which stopped
/// the receiver.
pub fn run<S>(
    args: &Args,
    receiver: &mut WeatherReceiver,
    source: S,
) -> Result<DecodeStats, ReceiverError>
where
    S: ByteSource,
{
    for evt in receiver.iter(source) {
        match evt? {
            ReceiverEvent::Observation(rec) => {
                if !args.quiet {
                    println!("{}", format_observation(&rec));
                }
            }
            ReceiverEvent::SchemaLocked(schema) => {
                if !args.quiet {
                    println!("# schema: {}", schema);
                }
            }
            ReceiverEvent::Redetecting => {
                warn!("transmitter output has changed; re-detecting schema")
            }
            evt @ ReceiverEvent::WarmupRoundFailed(_) => warn!("{}", evt),
            evt @ ReceiverEvent::Warmup(_) => debug!("{}", evt),
            ReceiverEvent::Dropped(err) => info!("{}", err),
        }
    }

    Ok(receiver.stats())
}

/// Run the application, reopening the input on failure
///
/// Calls `open` to obtain a byte source and runs the `receiver`
/// on it. If reading fails and `reopen` is set, the source is
/// opened again after `args.retry_wait` seconds. Sessions which
/// read any bytes reset the count of failed tries.
///
/// Errors other than I/O failures are never retried.
pub fn run_with_retry<S, F>(
    args: &Args,
    receiver: &mut WeatherReceiver,
    reopen: bool,
    mut open: F,
) -> Result<DecodeStats, anyhow::Error>
where
    S: ByteSource,
    F: FnMut() -> Result<S, anyhow::Error>,
{
    let mut tries = 0;
    loop {
        let bytes_before = receiver.stats().bytes;
        let err = match open() {
            Ok(source) => match run(args, receiver, source) {
                Ok(stats) => return Ok(stats),
                Err(ReceiverError::Io(err)) => anyhow::Error::from(err),
                Err(err) => return Err(err.into()),
            },
            Err(err) if tries > 0 => err,
            Err(err) => return Err(err),
        };

        if !reopen {
            return Err(err.context("unable to read from transmitter"));
        }

        if receiver.stats().bytes > bytes_before {
            tries = 0;
        }
        tries += 1;
        warn!(
            "failed attempt {} of {} to read from transmitter: {:#}",
            tries, args.max_tries, err
        );
        if tries >= args.max_tries {
            return Err(anyhow!(
                "read failed after {} tries: {:#}",
                args.max_tries,
                err
            ));
        }

        debug!("waiting {} seconds", args.retry_wait);
        std::thread::sleep(Duration::from_secs(args.retry_wait));
    }
}

/// One output line, with UTC receive time
fn format_observation(rec: &ObservationRecord) -> String {
    format!(
        "{} {}",
        rec.datetime().to_rfc3339_opts(SecondsFormat::Millis, true),
        rec
    )
}
