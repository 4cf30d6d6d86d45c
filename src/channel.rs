//! Byte-oriented duplex transport over a connected socket, Unix stream, or
//! raw file descriptor.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};

/// A connected duplex byte transport.
///
/// Mirrors the teacher's `Connection`/`ConnectionExt` split: writes are
/// infallible-by-convention (`write`/`flush`), while reads are explicit and
/// blocking-with-timeout via [`Channel::wait`].
pub trait Channel: Send {
    /// Write `buf` in full.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Block until bytes are available or `timeout` elapses (`None` blocks
    /// forever), then read whatever is available into `buf`, returning the
    /// number of bytes read (`0` on timeout or peer EOF... distinguished by
    /// [`Channel::at_eof`]).
    fn wait(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize>;

    /// Whether the peer has closed its write side.
    fn at_eof(&self) -> bool;

    /// The underlying file descriptor, for `poll`/`select`-based composition
    /// (used by [`crate::queue_channel::QueueChannel`]'s reader thread).
    fn as_raw_fd(&self) -> RawFd;
}

fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> io::Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let timeout_ms = match timeout {
        Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        None => -1,
    };
    let n = poll(&mut fds, timeout_ms).map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    Ok(n > 0)
}

/// A [`Channel`] backed by a connected TCP stream.
pub struct TcpChannel {
    stream: TcpStream,
    eof: bool,
}

impl TcpChannel {
    /// Wrap an already-connected stream.
    pub fn new(stream: TcpStream) -> Self {
        TcpChannel { stream, eof: false }
    }
}

impl Channel for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn wait(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        if !poll_readable(self.stream.as_raw_fd(), timeout)? {
            return Ok(0);
        }
        let n = self.stream.read(buf)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// A [`Channel`] backed by a connected Unix domain stream (path or abstract
/// namespace, per `unix://`/`unix-abstract://` CLI addresses).
pub struct UnixChannel {
    stream: UnixStream,
    eof: bool,
}

impl UnixChannel {
    /// Wrap an already-connected stream.
    pub fn new(stream: UnixStream) -> Self {
        UnixChannel { stream, eof: false }
    }
}

impl Channel for UnixChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn wait(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        if !poll_readable(self.stream.as_raw_fd(), timeout)? {
            return Ok(0);
        }
        let n = self.stream.read(buf)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// A [`Channel`] backed by a raw, already-connected file descriptor (the
/// `--fd N` CLI mode).
pub struct FdChannel {
    file: std::fs::File,
    eof: bool,
}

impl FdChannel {
    /// Take ownership of `fd`. Caller guarantees `fd` is a valid, open,
    /// connected descriptor.
    ///
    /// # Safety
    /// `fd` must be a valid file descriptor not owned elsewhere.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        FdChannel {
            file: std::fs::File::from_raw_fd(fd),
            eof: false,
        }
    }
}

impl Channel for FdChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn wait(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        if !poll_readable(self.file.as_raw_fd(), timeout)? {
            return Ok(0);
        }
        let n = self.file.read(buf)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

