//! A [`Channel`] facade whose read side is backed by a [`MessageQueue`] fed
//! by an auxiliary reader thread, so that a blocking `resume` can still
//! observe an asynchronous interrupt byte arriving on the wire.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::Channel;
use crate::queue::MessageQueue;

/// Reads raw chunks from an inner [`Channel`] on a background thread and
/// republishes them through a [`MessageQueue`], so the main session loop can
/// block on `get` alongside other waiters (and so `clear(true)` can wake it
/// when the channel is torn down).
pub struct QueueChannel {
    queue: Arc<MessageQueue>,
    reader: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    pending: Vec<u8>,
}

impl QueueChannel {
    /// Spawn the reader thread over `inner`, pumping bytes into a fresh
    /// queue until `inner` hits EOF or [`QueueChannel::shutdown`] is called.
    pub fn new<C: Channel + 'static>(mut inner: C) -> Self {
        let queue = Arc::new(MessageQueue::new());
        let stop = Arc::new(AtomicBool::new(false));

        let queue_for_reader = queue.clone();
        let stop_for_reader = stop.clone();
        let reader = thread::Builder::new()
            .name("queue-channel-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    if stop_for_reader.load(Ordering::Acquire) {
                        queue_for_reader.clear(true);
                        return;
                    }
                    match inner.wait(&mut buf, Some(Duration::from_millis(200))) {
                        Ok(0) => {
                            if inner.at_eof() {
                                queue_for_reader.clear(true);
                                return;
                            }
                        }
                        Ok(n) => queue_for_reader.put(buf[..n].to_vec()),
                        Err(_) => {
                            queue_for_reader.clear(true);
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn queue-channel reader thread");

        QueueChannel {
            queue,
            reader: Some(reader),
            stop,
            pending: Vec::new(),
        }
    }

    /// Block for up to `timeout` for bytes to become available, copying
    /// them into `buf` (may return fewer bytes than were queued; leftovers
    /// are buffered for the next call).
    pub fn wait(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.queue.get(timeout) {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    /// Whether the reader thread has observed EOF or been shut down.
    pub fn at_eof(&self) -> bool {
        self.queue.is_terminated()
    }

    /// Stop the reader thread and join it.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.clear(true);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for QueueChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    use crate::channel::TcpChannel;

    #[test]
    fn pumps_bytes_through_the_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let writer = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let mut qc = QueueChannel::new(TcpChannel::new(stream));
        let mut buf = [0u8; 16];
        let n = qc.wait(&mut buf, Some(Duration::from_secs(2))).unwrap();
        assert_eq!(&buf[..n], b"hello");
        writer.join().unwrap();
    }
}
