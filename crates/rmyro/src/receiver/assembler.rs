//! Assembles readings into observation records
//!
//! The [`RecordAssembler`] is the last stage of the receiver. It
//! stamps each [`Reading`] with its arrival time and the current
//! gust estimate. It also converts the rain bucket's running
//! total into a per-observation amount.
//!
//! The bucket total is a counter which wraps around. We follow
//! these rules:
//!
//! 1. The first total has no previous total to compare against,
//!    so no rain amount is reported.
//!
//! 2. If the total decreases, the counter has wrapped or been
//!    reset. All of the new total is reported as new rain.
//!
//! 3. Otherwise, the rain amount is the increase in the total.

#[cfg(not(test))]
use log::info;

#[cfg(test)]
use std::println as info;

use super::fields::{Reading, RAIN_MM_PER_TIP};
use super::gust::Gust;
use crate::observation::{Arrival, ObservationRecord};

/// The Assembler builds observation records
///
/// One reading in, one record out. Nothing is buffered except
/// the previous rain total.
#[derive(Clone, Debug, Default)]
pub struct RecordAssembler {
    last_rain_total: Option<f64>,
}

impl RecordAssembler {
    /// New Assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.last_rain_total = None;
    }

    /// Build a record
    ///
    /// Combines the `reading` with the current `gust` estimate
    /// and its `arrival` time.
    pub fn assemble(
        &mut self,
        reading: Reading,
        gust: Option<Gust>,
        arrival: Arrival,
    ) -> ObservationRecord {
        let rain_mm = match reading.rain_accum_mm {
            Some(total) => {
                let delta = delta_rain(total, self.last_rain_total);
                self.last_rain_total = Some(total);
                delta
            }
            None => None,
        };

        ObservationRecord::new(arrival, reading, gust, rain_mm)
    }
}

// Rain since the `last` bucket total
fn delta_rain(total: f64, last: Option<f64>) -> Option<f64> {
    let last = match last {
        Some(last) => last,
        None => {
            info!(
                "assembler: skipping rain measurement of {:.1} mm: no previous total",
                total
            );
            return None;
        }
    };

    if total < last {
        info!(
            "assembler: rain counter wraparound detected: new={:.1} last={:.1}",
            total, last
        );
        Some(total)
    } else {
        // totals are multiples of one bucket tip
        let tips = ((total - last) / RAIN_MM_PER_TIP).round();
        Some(tips / RAIN_MM_PER_TIP.recip())
    }
}
