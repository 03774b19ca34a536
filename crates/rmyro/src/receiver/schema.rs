//! Rain channel auto-detection
//!
//! The ResponseOne transmitter can be configured with or without
//! a tipping-bucket rain gauge. The frame format differs by one
//! field, and nothing in the frame says which format is in use.
//! The [`SchemaDetector`] decides by watching frames go by:
//!
//! ```txt
//!   start
//!    ||
//!    \/
//! +-------------+  super-majority   +--------------------+
//! |  Detecting  | ================> |  Locked(variant)   |
//! +-------------+                   +--------------------+
//!    ||     /\                               ||
//!    ||     ||=== K frames of the other =====||
//!    ||               variant
//!    \/
//!  too many inconclusive rounds → SchemaAmbiguous
//! ```
//!
//! Warm-up is counted in frames rather than seconds because
//! the frame rate depends on the transmitter's output interval.

use std::fmt;

#[cfg(not(test))]
use log::{info, warn};

#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use thiserror::Error;

use super::fields::FrameShape;

/// Frame layout variant
///
/// Selects whether frames carry the rain bucket tip count.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
pub enum SchemaVariant {
    /// Rain bucket enabled
    ///
    /// ```txt
    /// 0 100.00 180.5 22.1 50.1 0998.6 00000 00*08
    /// ```
    #[strum(serialize = "with rain")]
    WithRain,

    /// Rain bucket disabled
    ///
    /// ```txt
    /// 0 100.00 180.5 22.1 50.1 0998.6 00*08
    /// ```
    #[strum(serialize = "without rain")]
    WithoutRain,
}

impl SchemaVariant {
    /// Number of tokens in a frame of this variant
    pub fn token_count(&self) -> usize {
        match self {
            SchemaVariant::WithRain => 8,
            SchemaVariant::WithoutRain => 7,
        }
    }

    /// The other variant
    pub fn other(&self) -> SchemaVariant {
        match self {
            SchemaVariant::WithRain => SchemaVariant::WithoutRain,
            SchemaVariant::WithoutRain => SchemaVariant::WithRain,
        }
    }

    /// True if frames of this variant carry rain data
    pub fn has_rain(&self) -> bool {
        *self == SchemaVariant::WithRain
    }
}

/// Warm-up failed to settle on a schema
///
/// The transmitter sent frames of mixed or unrecognized shapes
/// for every warm-up round. This usually means the transmitter
/// is not in ASCII auto-transmit mode.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
#[error(
    "unable to detect frame schema after {rounds} rounds: \
     last round saw {with_rain} frames with rain, \
     {without_rain} without rain, {other} unrecognized"
)]
pub struct SchemaAmbiguous {
    /// Warm-up rounds attempted
    pub rounds: u32,

    /// Frames of the `WithRain` shape in the final round
    pub with_rain: u32,

    /// Frames of the `WithoutRain` shape in the final round
    pub without_rain: u32,

    /// Unrecognized frames in the final round
    pub other: u32,
}

/// Frame shape tally for one warm-up round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tally {
    /// Frames of the `WithRain` shape
    pub with_rain: u32,

    /// Frames of the `WithoutRain` shape
    pub without_rain: u32,

    /// Unrecognized frames
    pub other: u32,

    /// Inconclusive rounds completed before this one
    pub round: u32,
}

impl Tally {
    /// Frames observed this round
    pub fn total(&self) -> u32 {
        self.with_rain + self.without_rain + self.other
    }

    fn count(&mut self, shape: FrameShape) {
        match shape {
            FrameShape::Variant(SchemaVariant::WithRain) => self.with_rain += 1,
            FrameShape::Variant(SchemaVariant::WithoutRain) => self.without_rain += 1,
            FrameShape::Unknown { .. } => self.other += 1,
        }
    }
}

/// Schema detector state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaState {
    /// Warm-up in progress
    Detecting(Tally),

    /// Schema chosen
    ///
    /// `mismatch_run` counts consecutive frames which failed
    /// to decode with the shape of the other variant.
    Locked {
        /// Active variant
        variant: SchemaVariant,

        /// Consecutive frames of the other variant
        mismatch_run: u32,
    },
}

impl SchemaState {
    /// Active variant, if locked
    pub fn variant(&self) -> Option<SchemaVariant> {
        match self {
            SchemaState::Detecting(_) => None,
            SchemaState::Locked { variant, .. } => Some(*variant),
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaState::Detecting(tally) => write!(
                f,
                "detecting (round {}, {} frames)",
                tally.round + 1,
                tally.total()
            ),
            SchemaState::Locked { variant, .. } => write!(f, "{}", variant),
        }
    }
}

/// Input to the schema detector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Observation {
    /// A frame was tokenized during warm-up
    Shape(FrameShape),

    /// A frame decoded successfully under the locked variant
    Decoded,

    /// A frame failed to decode under the locked variant
    ///
    /// The shape is the frame's own shape, which may or may not
    /// match the locked variant.
    Failed(FrameShape),
}

/// Notable schema detector transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaChange {
    /// Warm-up concluded with this variant
    Locked(SchemaVariant),

    /// An inconclusive warm-up round was discarded
    RoundFailed(Tally),

    /// The transmitter appears to have been reconfigured
    Redetecting,
}

/// Schema detector
///
/// Tracks the active [`SchemaVariant`]. Callers report one
/// [`Observation`] per frame to [`observe()`](#method.observe).
#[derive(Clone, Debug)]
pub struct SchemaDetector {
    state: SchemaState,
    warmup_frames: u32,
    majority: f32,
    max_rounds: u32,
    redetect_after: u32,
}

impl SchemaDetector {
    /// New detector, in the warm-up state
    ///
    /// A variant is locked when at least `majority` of
    /// `warmup_frames` frames agree on it. Detection fails
    /// after `max_rounds` inconclusive rounds. Once locked,
    /// `redetect_after` consecutive frames of the other
    /// variant restart detection.
    pub fn new(warmup_frames: u32, majority: f32, max_rounds: u32, redetect_after: u32) -> Self {
        Self {
            state: SchemaState::Detecting(Tally::default()),
            warmup_frames,
            majority,
            max_rounds,
            redetect_after,
        }
    }

    /// Reset to the start of warm-up
    pub fn reset(&mut self) {
        self.state = SchemaState::Detecting(Tally::default());
    }

    /// Current state
    pub fn state(&self) -> &SchemaState {
        &self.state
    }

    /// Active variant, or `None` while detecting
    pub fn variant(&self) -> Option<SchemaVariant> {
        self.state.variant()
    }

    /// Report one frame
    ///
    /// Advances the state machine. Returns a [`SchemaChange`]
    /// if one occurred. An error is returned if warm-up has
    /// failed for the last time; the detector then remains in
    /// its final warm-up state.
    pub fn observe(
        &mut self,
        observation: Observation,
    ) -> Result<Option<SchemaChange>, SchemaAmbiguous> {
        let (next, change) = self.transition(observation)?;
        self.state = next;
        Ok(change)
    }

    // The state transition function
    fn transition(
        &self,
        observation: Observation,
    ) -> Result<(SchemaState, Option<SchemaChange>), SchemaAmbiguous> {
        match (self.state, observation) {
            (SchemaState::Detecting(mut tally), Observation::Shape(shape)) => {
                tally.count(shape);
                if tally.total() < self.warmup_frames {
                    return Ok((SchemaState::Detecting(tally), None));
                }

                if let Some(variant) = self.winner(&tally) {
                    info!(
                        "schema: locked \"{}\" after {} frames ({} with rain, {} without, {} other)",
                        variant,
                        tally.total(),
                        tally.with_rain,
                        tally.without_rain,
                        tally.other
                    );
                    return Ok((
                        SchemaState::Locked {
                            variant,
                            mismatch_run: 0,
                        },
                        Some(SchemaChange::Locked(variant)),
                    ));
                }

                let rounds = tally.round + 1;
                if rounds >= self.max_rounds {
                    return Err(SchemaAmbiguous {
                        rounds,
                        with_rain: tally.with_rain,
                        without_rain: tally.without_rain,
                        other: tally.other,
                    });
                }

                warn!(
                    "schema: inconclusive round {} of {} ({} with rain, {} without, {} other)",
                    rounds, self.max_rounds, tally.with_rain, tally.without_rain, tally.other
                );
                Ok((
                    SchemaState::Detecting(Tally {
                        round: rounds,
                        ..Tally::default()
                    }),
                    Some(SchemaChange::RoundFailed(tally)),
                ))
            }

            // decode results are meaningless while detecting
            (SchemaState::Detecting(_), _) => Ok((self.state, None)),

            (SchemaState::Locked { variant, .. }, Observation::Decoded) => Ok((
                SchemaState::Locked {
                    variant,
                    mismatch_run: 0,
                },
                None,
            )),

            (
                SchemaState::Locked {
                    variant,
                    mismatch_run,
                },
                Observation::Failed(FrameShape::Variant(shape)),
            ) if shape == variant.other() => {
                let mismatch_run = mismatch_run + 1;
                if mismatch_run >= self.redetect_after {
                    warn!(
                        "schema: {} consecutive \"{}\" frames; re-detecting",
                        mismatch_run, shape
                    );
                    Ok((
                        SchemaState::Detecting(Tally::default()),
                        Some(SchemaChange::Redetecting),
                    ))
                } else {
                    Ok((
                        SchemaState::Locked {
                            variant,
                            mismatch_run,
                        },
                        None,
                    ))
                }
            }

            // any other frame breaks the run
            (SchemaState::Locked { variant, .. }, _) => Ok((
                SchemaState::Locked {
                    variant,
                    mismatch_run: 0,
                },
                None,
            )),
        }
    }

    // Variant with a super-majority of the tally, if any
    fn winner(&self, tally: &Tally) -> Option<SchemaVariant> {
        let needed = (self.majority * tally.total() as f32).ceil() as u32;
        if tally.with_rain >= needed {
            Some(SchemaVariant::WithRain)
        } else if tally.without_rain >= needed {
            Some(SchemaVariant::WithoutRain)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use strum::IntoEnumIterator;

    const WITH: FrameShape = FrameShape::Variant(SchemaVariant::WithRain);
    const WITHOUT: FrameShape = FrameShape::Variant(SchemaVariant::WithoutRain);
    const JUNK: FrameShape = FrameShape::Unknown { tokens: 3 };

    fn feed(det: &mut SchemaDetector, shape: FrameShape, n: u32) -> Option<SchemaChange> {
        let mut last = None;
        for _i in 0..n {
            last = det
                .observe(Observation::Shape(shape))
                .expect("unexpected detection failure");
        }
        last
    }

    #[test]
    fn test_variant() {
        for variant in SchemaVariant::iter() {
            assert_eq!(variant, variant.other().other());
            assert_ne!(variant, variant.other());
        }
        assert_eq!(8, SchemaVariant::WithRain.token_count());
        assert_eq!(7, SchemaVariant::WithoutRain.token_count());
        assert_eq!("with rain", SchemaVariant::WithRain.to_string());
    }

    #[test]
    fn test_lock_with_rain() {
        let mut det = SchemaDetector::new(10, 0.8, 3, 5);
        assert_eq!(None, feed(&mut det, WITH, 9));
        assert_eq!(None, det.variant());
        assert_eq!(
            Some(SchemaChange::Locked(SchemaVariant::WithRain)),
            feed(&mut det, WITH, 1)
        );
        assert_eq!(Some(SchemaVariant::WithRain), det.variant());
    }

    #[test]
    fn test_lock_tolerates_noise() {
        let mut det = SchemaDetector::new(10, 0.8, 3, 5);
        feed(&mut det, JUNK, 2);
        assert_eq!(
            Some(SchemaChange::Locked(SchemaVariant::WithoutRain)),
            feed(&mut det, WITHOUT, 8)
        );
    }

    #[test]
    fn test_ambiguous() {
        let mut det = SchemaDetector::new(4, 0.75, 2, 5);
        feed(&mut det, WITH, 2);
        det.observe(Observation::Shape(WITHOUT)).unwrap();
        let change = det.observe(Observation::Shape(WITHOUT)).unwrap();
        match change {
            Some(SchemaChange::RoundFailed(tally)) => {
                assert_eq!(2, tally.with_rain);
                assert_eq!(2, tally.without_rain);
            }
            _ => unreachable!(),
        }

        // second round fails for good
        feed(&mut det, JUNK, 3);
        let err = det
            .observe(Observation::Shape(WITH))
            .expect_err("expected detection failure");
        assert_eq!(2, err.rounds);
        assert_eq!(1, err.with_rain);
        assert_eq!(3, err.other);
        assert_eq!(None, det.variant());
    }

    #[test]
    fn test_redetect() {
        let mut det = SchemaDetector::new(3, 0.8, 3, 3);
        feed(&mut det, WITH, 3);
        assert_eq!(Some(SchemaVariant::WithRain), det.variant());

        // run is broken by a good frame
        det.observe(Observation::Failed(WITHOUT)).unwrap();
        det.observe(Observation::Failed(WITHOUT)).unwrap();
        det.observe(Observation::Decoded).unwrap();

        // run is broken by junk
        det.observe(Observation::Failed(WITHOUT)).unwrap();
        det.observe(Observation::Failed(JUNK)).unwrap();

        // failures of the locked shape don't count
        det.observe(Observation::Failed(WITH)).unwrap();
        assert_eq!(Some(SchemaVariant::WithRain), det.variant());

        assert_eq!(None, det.observe(Observation::Failed(WITHOUT)).unwrap());
        assert_eq!(None, det.observe(Observation::Failed(WITHOUT)).unwrap());
        assert_eq!(
            Some(SchemaChange::Redetecting),
            det.observe(Observation::Failed(WITHOUT)).unwrap()
        );
        assert_eq!(None, det.variant());

        assert_eq!(
            Some(SchemaChange::Locked(SchemaVariant::WithoutRain)),
            feed(&mut det, WITHOUT, 3)
        );
    }
}
