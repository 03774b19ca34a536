//! Transmitter frame synchronization

use std::fmt;

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;

/// One transmitter sentence, as received
///
/// A `CandidateFrame` contains the bytes between two frame
/// terminators. NUL bytes and leading or trailing whitespace
/// are removed. Candidate frames are never empty, but no other
/// guarantees are made about their content: they may be
/// truncated, corrupted, or device noise that merely happened
/// to end in a terminator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CandidateFrame {
    data: Vec<u8>,
}

impl CandidateFrame {
    /// Create from bytes
    ///
    /// Returns `None` if nothing remains of `bytes` after
    /// NUL and whitespace removal.
    pub fn new<B>(bytes: B) -> Option<Self>
    where
        B: AsRef<[u8]>,
    {
        let mut data: Vec<u8> = bytes
            .as_ref()
            .iter()
            .copied()
            .filter(|&b| b != 0)
            .collect();

        let end = data
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map(|pos| pos + 1)?;
        data.truncate(end);
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        data.drain(0..start);

        Some(Self { data })
    }

    /// Frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Frame text, if the frame is entirely ASCII
    pub fn as_str(&self) -> Option<&str> {
        if self.data.is_ascii() {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }

    /// Frame length, in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for CandidateFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for CandidateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.data).fmt(f)
    }
}

/// Frame reader
///
/// The `FrameReader` accepts bytes, one at a time, from the
/// transmitter's serial stream and splits them into
/// [`CandidateFrame`]s at the frame terminator. The
/// transmitter ends each frame with a carriage return, but
/// any of the configured terminator bytes will do.
///
/// The serial line may carry noise. When more than
/// `max_frame_len` bytes arrive without a terminator, the
/// buffered data is discarded and the reader *desynchronizes*:
/// it ignores everything up to and including the next
/// terminator. The first frame after that terminator is
/// read normally.
///
/// Back-to-back terminators (like CR-LF) produce empty frames,
/// which are dropped silently.
#[derive(Clone, Debug)]
pub struct FrameReader {
    // bytes of the frame in progress
    buf: Vec<u8>,

    // reader state
    state: State,

    // longest permitted frame, in bytes
    max_frame_len: usize,

    // any one of these bytes ends a frame
    terminators: Vec<u8>,

    // lifetime count of oversize runs discarded
    overflow_count: u64,

    // lifetime count of bytes discarded as noise
    discarded_bytes: u64,
}

impl FrameReader {
    /// New frame reader
    ///
    /// Frames end with any byte in `terminators`. Runs
    /// longer than `max_frame_len` bytes without a terminator
    /// are discarded.
    pub fn new(max_frame_len: usize, terminators: &[u8]) -> Self {
        Self {
            buf: Vec::with_capacity(max_frame_len),
            state: State::Reading,
            max_frame_len,
            terminators: terminators.to_vec(),
            overflow_count: 0,
            discarded_bytes: 0,
        }
    }

    /// Reset to zero initial conditions
    ///
    /// Any partial frame is lost. Lifetime counters are
    /// retained.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = State::Reading;
    }

    /// Handle received data byte
    ///
    /// Accepts a single `data` byte from the byte source.
    /// Returns a frame when `data` is a terminator that ends a
    /// non-empty frame.
    pub fn input(&mut self, data: u8) -> Option<CandidateFrame> {
        let is_terminator = self.terminators.contains(&data);

        match self.state {
            State::Desync => {
                self.discarded_bytes += 1;
                if is_terminator {
                    info!(
                        "framing: resynchronized after discarding {} bytes",
                        self.discarded_bytes
                    );
                    self.state = State::Reading;
                }
                None
            }
            State::Reading if is_terminator => {
                let out = CandidateFrame::new(&self.buf);
                self.buf.clear();
                if let Some(frame) = &out {
                    debug!("framing: frame: \"{}\"", frame);
                }
                out
            }
            State::Reading => {
                if self.buf.len() >= self.max_frame_len {
                    info!(
                        "framing: abandoned: no terminator after {} bytes",
                        self.max_frame_len
                    );
                    self.overflow_count += 1;
                    self.discarded_bytes += self.buf.len() as u64 + 1;
                    self.buf.clear();
                    self.state = State::Desync;
                } else {
                    self.buf.push(data);
                }
                None
            }
        }
    }

    /// True if waiting for a terminator to resynchronize
    pub fn is_desynchronized(&self) -> bool {
        self.state == State::Desync
    }

    /// Lifetime count of oversize runs discarded
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Lifetime count of bytes discarded as noise
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }
}

// Reader state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    // Accumulate bytes until a terminator
    Reading,

    // Oversize run discarded; skip to the next terminator
    Desync,
}
