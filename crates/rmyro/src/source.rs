//! Byte sources
//!
//! The receiver does not open or configure serial ports. It reads
//! from anything which implements [`ByteSource`]: a read with a
//! timeout. Two adapters are provided for [`std::io::Read`]
//! implementations:
//!
//! * [`ChannelSource`] reads on a helper thread, so any blocking
//!   reader (a serial device node, a pipe, standard input) gains
//!   a timeout.
//!
//! * [`IoSource`] reads directly. Use it for readers that never
//!   block, like in-memory buffers, or readers which implement
//!   their own timeout.
//!
//! Most readers signal end-of-file with a zero-length read. A
//! serial tty configured with a read timeout (`VMIN=0`,
//! `VTIME>0`) instead returns zero bytes whenever the line is
//! quiet. Both adapters take a [`ZeroRead`] policy which says
//! which convention the reader follows.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

/// Result of one read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceRead {
    /// This many bytes were read into the buffer
    Bytes(usize),

    /// No bytes arrived before the timeout
    ///
    /// This is normal when the transmitter is quiet.
    TimedOut,

    /// The source has ended and will never produce more bytes
    Closed,
}

/// Meaning of a zero-length read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ZeroRead {
    /// End of file: the source is closed
    ///
    /// This is the convention for files, pipes, and standard
    /// input.
    #[default]
    Closed,

    /// No data yet: the read timed out
    ///
    /// Serial ttys with a read timeout return zero bytes when
    /// the transmitter is quiet. Such a source never closes on
    /// its own.
    TimedOut,
}

/// An ordered source of bytes, with timeout
///
/// Implementations own all retry and reconnection policy. Any
/// `Err` returned from [`read_timeout()`](#tymethod.read_timeout)
/// is treated by the receiver as fatal.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes
    ///
    /// Blocks for at most `timeout` waiting for input. Returns
    /// [`SourceRead::TimedOut`] if nothing arrives in time.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<SourceRead>;

    /// Release the source
    ///
    /// Further reads return [`SourceRead::Closed`].
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S> ByteSource for &mut S
where
    S: ByteSource + ?Sized,
{
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<SourceRead> {
        (**self).read_timeout(buf, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<S> ByteSource for Box<S>
where
    S: ByteSource + ?Sized,
{
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<SourceRead> {
        (**self).read_timeout(buf, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Byte source which reads on a helper thread
///
/// The helper thread performs blocking reads on the wrapped
/// reader and passes the data back over a bounded channel. The
/// receiving side waits with a timeout.
///
/// When the reader reaches end-of-file, the source reports
/// [`SourceRead::Closed`] once all data has been consumed. What
/// counts as end-of-file is set by the [`ZeroRead`] policy. A
/// read error is reported once, after any data which preceded
/// it.
///
/// After [`close()`](ByteSource::close), the helper thread exits
/// when its current read completes.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    closed: bool,
}

impl ChannelSource {
    /// Start reading `reader` on a new thread
    ///
    /// Each read on the helper thread requests up to
    /// `chunk_len` bytes. A zero-length read is end-of-file.
    pub fn spawn<R>(reader: R, chunk_len: usize) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with(reader, chunk_len, ZeroRead::Closed)
    }

    /// Start reading `reader` on a new thread
    ///
    /// As [`spawn()`](#method.spawn), but zero-length reads are
    /// interpreted according to `zero_read`.
    pub fn spawn_with<R>(reader: R, chunk_len: usize, zero_read: ZeroRead) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(Self::CHANNEL_DEPTH);
        std::thread::Builder::new()
            .name("rmyro-source".to_owned())
            .spawn(move || read_thread(reader, usize::max(chunk_len, 1), zero_read, tx))?;

        Ok(Self {
            rx,
            pending: Vec::new(),
            closed: false,
        })
    }

    // chunks buffered between the threads
    const CHANNEL_DEPTH: usize = 64;
}

impl ByteSource for ChannelSource {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<SourceRead> {
        if self.closed {
            return Ok(SourceRead::Closed);
        }

        if self.pending.is_empty() {
            match self.rx.recv_timeout(timeout) {
                Ok(Ok(chunk)) if chunk.is_empty() => return Ok(SourceRead::TimedOut),
                Ok(Ok(chunk)) => self.pending = chunk,
                Ok(Err(err)) => return Err(err),
                Err(RecvTimeoutError::Timeout) => return Ok(SourceRead::TimedOut),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("source: end of input");
                    self.closed = true;
                    return Ok(SourceRead::Closed);
                }
            }
        }

        let len = usize::min(buf.len(), self.pending.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        Ok(SourceRead::Bytes(len))
    }

    fn close(&mut self) -> io::Result<()> {
        // dropping the old receiver stops the helper thread
        let (_tx, rx) = mpsc::sync_channel(0);
        self.rx = rx;
        self.pending.clear();
        self.closed = true;
        Ok(())
    }
}

// Helper thread: read until end-of-file, error, or hangup
//
// A quiet tty sends an empty chunk, which lets us notice a hangup.
fn read_thread<R>(
    mut reader: R,
    chunk_len: usize,
    zero_read: ZeroRead,
    tx: SyncSender<io::Result<Vec<u8>>>,
) where
    R: Read,
{
    loop {
        let mut chunk = vec![0u8; chunk_len];
        match reader.read(&mut chunk) {
            Ok(0) if zero_read == ZeroRead::TimedOut => {
                if tx.send(Ok(vec![])).is_err() {
                    break;
                }
            }
            Ok(0) => break,
            Ok(len) => {
                chunk.truncate(len);
                if tx.send(Ok(chunk)).is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("source: read failed: {}", err);
                let _ = tx.send(Err(err));
                break;
            }
        }
    }
}

/// Byte source which reads directly
///
/// The `timeout` is not enforced. Reads which fail with
/// [`io::ErrorKind::TimedOut`], [`io::ErrorKind::WouldBlock`],
/// or [`io::ErrorKind::Interrupted`] are reported as
/// [`SourceRead::TimedOut`]. A reader which signals its own
/// timeout with a zero-length read, like a serial tty, needs
/// the [`ZeroRead::TimedOut`] policy.
#[derive(Debug)]
pub struct IoSource<R> {
    reader: Option<R>,
    zero_read: ZeroRead,
}

impl<R> IoSource<R>
where
    R: Read,
{
    /// Wrap `reader`
    ///
    /// A zero-length read is end-of-file.
    pub fn new(reader: R) -> Self {
        Self::with_zero_read(reader, ZeroRead::Closed)
    }

    /// Wrap `reader`, interpreting zero-length reads with `zero_read`
    pub fn with_zero_read(reader: R, zero_read: ZeroRead) -> Self {
        Self {
            reader: Some(reader),
            zero_read,
        }
    }
}

impl<R> ByteSource for IoSource<R>
where
    R: Read,
{
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<SourceRead> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(SourceRead::Closed),
        };

        match reader.read(buf) {
            Ok(0) if !buf.is_empty() && self.zero_read == ZeroRead::TimedOut => {
                Ok(SourceRead::TimedOut)
            }
            Ok(0) if !buf.is_empty() => {
                self.reader = None;
                Ok(SourceRead::Closed)
            }
            Ok(len) => Ok(SourceRead::Bytes(len)),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(SourceRead::TimedOut)
            }
            Err(err) => Err(err),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    // reader which blocks forever after its data
    struct Stalls(Cursor<Vec<u8>>);

    impl Read for Stalls {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => loop {
                    std::thread::sleep(Duration::from_secs(3600));
                },
                n => Ok(n),
            }
        }
    }

    // reader which fails after its data
    struct Fails(Cursor<Vec<u8>>);

    impl Read for Fails {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
                n => Ok(n),
            }
        }
    }

    // reader which returns each chunk in turn, then fails
    //
    // An empty chunk is a zero-length read.
    struct Chunks(std::collections::VecDeque<Vec<u8>>);

    impl Chunks {
        fn new(chunks: &[&[u8]]) -> Self {
            Self(chunks.iter().map(|c| c.to_vec()).collect())
        }
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    let len = usize::min(chunk.len(), buf.len());
                    buf[..len].copy_from_slice(&chunk[..len]);
                    Ok(len)
                }
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "unplugged")),
            }
        }
    }

    fn read_until_not_bytes<S: ByteSource>(src: &mut S, out: &mut Vec<u8>) -> SourceRead {
        let mut buf = [0u8; 3];
        loop {
            match src
                .read_timeout(&mut buf, Duration::from_millis(100))
                .expect("unexpected read failure")
            {
                SourceRead::Bytes(n) => out.extend_from_slice(&buf[..n]),
                other => return other,
            }
        }
    }

    #[test]
    fn test_io_source() {
        let mut src = IoSource::new(Cursor::new(b"0 1.0\r".to_vec()));
        let mut out = vec![];
        assert_eq!(SourceRead::Closed, read_until_not_bytes(&mut src, &mut out));
        assert_eq!(b"0 1.0\r", out.as_slice());
        assert_eq!(SourceRead::Closed, read_until_not_bytes(&mut src, &mut out));
    }

    #[test]
    fn test_io_source_zero_read() {
        let chunks: &[&[u8]] = &[b"ab", b"", b"cd"];

        let mut src = IoSource::new(Chunks::new(chunks));
        let mut out = vec![];
        assert_eq!(SourceRead::Closed, read_until_not_bytes(&mut src, &mut out));
        assert_eq!(b"ab", out.as_slice());

        let mut src = IoSource::with_zero_read(Chunks::new(chunks), ZeroRead::TimedOut);
        let mut out = vec![];
        assert_eq!(SourceRead::TimedOut, read_until_not_bytes(&mut src, &mut out));
        assert_eq!(b"ab", out.as_slice());

        let mut buf = [0u8; 8];
        assert_eq!(
            SourceRead::Bytes(2),
            src.read_timeout(&mut buf, Duration::ZERO).unwrap()
        );
        assert_eq!(b"cd", &buf[..2]);
        assert!(src.read_timeout(&mut buf, Duration::ZERO).is_err());
    }

    #[test]
    fn test_channel_source_zero_read() {
        let chunks: &[&[u8]] = &[b"ab", b"", b"", b"cd"];
        let mut src =
            ChannelSource::spawn_with(Chunks::new(chunks), 16, ZeroRead::TimedOut).expect("spawn");
        let mut buf = [0u8; 16];
        let mut out = vec![];
        let err = loop {
            match src.read_timeout(&mut buf, Duration::from_millis(100)) {
                Ok(SourceRead::Bytes(n)) => out.extend_from_slice(&buf[..n]),
                Ok(SourceRead::TimedOut) => continue,
                Ok(SourceRead::Closed) => panic!("zero-length read closed the source"),
                Err(err) => break err,
            }
        };
        assert_eq!(b"abcd", out.as_slice());
        assert_eq!(io::ErrorKind::NotConnected, err.kind());
    }

    #[test]
    fn test_channel_source_eof() {
        let mut src =
            ChannelSource::spawn(Cursor::new(b"hello world\r".to_vec()), 4).expect("spawn");
        let mut out = vec![];
        let mut last = SourceRead::TimedOut;
        while last == SourceRead::TimedOut {
            last = read_until_not_bytes(&mut src, &mut out);
        }
        assert_eq!(SourceRead::Closed, last);
        assert_eq!(b"hello world\r", out.as_slice());
    }

    #[test]
    fn test_channel_source_timeout() {
        let mut src = ChannelSource::spawn(Stalls(Cursor::new(b"abc".to_vec())), 16).expect("spawn");
        let mut out = vec![];
        for _i in 0..50 {
            assert_eq!(SourceRead::TimedOut, read_until_not_bytes(&mut src, &mut out));
            if out.len() == 3 {
                break;
            }
        }
        assert_eq!(b"abc", out.as_slice());
        assert_eq!(SourceRead::TimedOut, read_until_not_bytes(&mut src, &mut out));

        src.close().expect("close");
        assert_eq!(SourceRead::Closed, read_until_not_bytes(&mut src, &mut out));
    }

    #[test]
    fn test_channel_source_error() {
        let mut src = ChannelSource::spawn(Fails(Cursor::new(b"abc".to_vec())), 16).expect("spawn");
        let mut buf = [0u8; 16];
        let mut out = vec![];
        let err = loop {
            match src.read_timeout(&mut buf, Duration::from_millis(100)) {
                Ok(SourceRead::Bytes(n)) => out.extend_from_slice(&buf[..n]),
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(b"abc", out.as_slice());
        assert_eq!(io::ErrorKind::BrokenPipe, err.kind());
    }
}
