//! Byte sources the frame decoder can poll.
//!
//! The acquisition loop never talks to `serialport` directly. It polls a
//! [`ByteSource`]: something readable that can report how many bytes are
//! waiting and can drop its receive buffer when the decoder needs to
//! resynchronize. The serial link, an in-memory buffer and a recorded capture
//! all implement it.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::{Duration, Instant};

/// A readable byte stream with receive-buffer control.
pub trait ByteSource: Read {
    /// Number of bytes that can be read without waiting.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Drops every byte received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

/// An in-memory receive buffer.
///
/// Bytes are fed in and consumed front to back. Reading from an empty buffer
/// returns `Ok(0)`, which the decoder treats like a read timeout.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    pending: VecDeque<u8>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes as if they had just arrived on the wire.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            pending: bytes.into(),
        }
    }
}

impl Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ByteSource for MemorySource {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.pending.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}

/// A recorded capture played back from any reader.
///
/// A recording has no receive buffer that could overflow with stale bytes, so
/// [`discard_input`](ByteSource::discard_input) is a no-op and the decoder simply
/// hunts for the next sync byte.
pub struct ReplaySource<R> {
    inner: BufReader<R>,
}

impl<R: Read> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }
}

impl<R: Read> Read for ReplaySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> ByteSource for ReplaySource<R> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.inner.fill_buf()?.len())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Tees every byte read from `source` into `sink`, producing a capture file
/// that [`ReplaySource`] can play back later.
pub struct RecordingSource<S, W> {
    source: S,
    sink: W,
}

impl<S: ByteSource, W: Write> RecordingSource<S, W> {
    pub fn new(source: S, sink: W) -> Self {
        Self { source, sink }
    }

    /// Flushes the recording and hands back both halves.
    pub fn finish(mut self) -> io::Result<(S, W)> {
        self.sink.flush()?;
        Ok((self.source, self.sink))
    }
}

impl<S: ByteSource, W: Write> Read for RecordingSource<S, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

impl<S: ByteSource, W: Write> ByteSource for RecordingSource<S, W> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.source.bytes_available()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.source.discard_input()
    }
}

/// Fills `buf` from `source`, giving up after `timeout`.
///
/// Returns the number of bytes actually read. A short count means the source
/// timed out or reached end of stream; the caller decides what that means.
pub(crate) fn read_with_deadline<S: Read + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
    timeout: Duration,
) -> io::Result<usize> {
    let start = Instant::now();
    let mut filled = 0;

    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) => {}
            Err(e) => return Err(e),
        }
        if start.elapsed() >= timeout {
            break;
        }
    }

    Ok(filled)
}

/// Reads one `\n`-terminated line, lossily decoded and trimmed.
///
/// Returns `None` when nothing at all arrived before `timeout`.
pub(crate) fn read_line<S: Read + ?Sized>(
    source: &mut S,
    timeout: Duration,
) -> io::Result<Option<String>> {
    let start = Instant::now();
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if read_with_deadline(source, &mut byte, remaining)? == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if start.elapsed() >= timeout {
            break;
        }
    }

    if line.is_empty() && start.elapsed() >= timeout {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
}
