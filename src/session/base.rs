//! Wire-level session plumbing: the channel, the packet framer, ACK/NAK
//! bookkeeping, and the handful of `send*` helpers every handler uses.
//!
//! Grounded on `Sources/GDBRemote/SessionBase.cpp`: `onCommandReceived`
//! (ACK/NAK is sent only in ack mode, driven by the packet's checksum
//! validity), `getPacketSeparator` (GDB dialects separate the command letter
//! from its payload with a space; LLDB uses none), and `sendError`'s
//! `kSuccess`/`kErrorUnsupported`/`kErrorUnknown` special-casing.

use std::collections::VecDeque;
use std::time::Duration;

use crate::channel::Channel;
use crate::common::CompatMode;
use crate::error::ErrorKind;
use crate::protocol::packet_processor::{Control, PacketProcessor, PacketProcessorDelegate};
use crate::protocol::response_writer::frame;

/// Bookkeeping fed by the packet processor as bytes arrive: completed
/// command payloads, and whether an async interrupt byte was seen.
#[derive(Default)]
struct Inbox {
    commands: VecDeque<Vec<u8>>,
    interrupted: bool,
    send_ack: Option<bool>,
}

struct InboxDelegate<'a> {
    inbox: &'a mut Inbox,
    ack_mode: bool,
}

impl<'a> PacketProcessorDelegate for InboxDelegate<'a> {
    fn on_packet_data(&mut self, payload: &[u8], valid: bool) {
        if self.ack_mode {
            self.inbox.send_ack = Some(valid);
        }
        if valid {
            self.inbox.commands.push_back(payload.to_vec());
        }
    }

    fn on_invalid_data(&mut self, _bytes: &[u8]) {
        if self.ack_mode {
            self.inbox.send_ack = Some(false);
        }
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::Interrupt => self.inbox.interrupted = true,
            // `+`/`-` on a received stream (the client acking our replies)
            // carry no state this side needs to track beyond consuming them.
            Control::Ack | Control::Nack => {}
        }
    }
}

/// The receive/send plumbing shared by every session flavor, parameterized
/// over the transport.
pub struct SessionBase<C: Channel> {
    channel: C,
    processor: PacketProcessor,
    inbox: Inbox,
    ack_mode: bool,
    compat_mode: CompatMode,
}

impl<C: Channel> SessionBase<C> {
    /// Wrap an already-connected channel. Ack mode starts enabled, per the
    /// protocol's handshake default (disabled later by `QStartNoAckMode`).
    pub fn new(channel: C, compat_mode: CompatMode) -> Self {
        SessionBase {
            channel,
            processor: PacketProcessor::new(),
            inbox: Inbox::default(),
            ack_mode: true,
            compat_mode,
        }
    }

    /// Current compatibility dialect.
    pub fn compat_mode(&self) -> CompatMode {
        self.compat_mode
    }

    /// Switch dialects mid-session (negotiated via `qSupported`/thread-suffix
    /// probing).
    pub fn set_compat_mode(&mut self, mode: CompatMode) {
        self.compat_mode = mode;
    }

    /// Whether ACK/NAK bookkeeping is active.
    pub fn ack_mode(&self) -> bool {
        self.ack_mode
    }

    /// `QStartNoAckMode` flips this off for the rest of the session.
    pub fn set_ack_mode(&mut self, enabled: bool) {
        self.ack_mode = enabled;
    }

    /// The separator GDB dialects place between a command and its payload.
    /// LLDB uses none; see `SessionBase::getPacketSeparator`.
    pub fn packet_separator(&self) -> &'static str {
        match self.compat_mode {
            CompatMode::Gdb | CompatMode::GdbMultiprocess => " ",
            CompatMode::Lldb => "",
        }
    }

    /// Block (up to `timeout`) for the next complete, checksum-valid command
    /// payload, driving ACK/NAK sends as a side effect. Returns `Ok(None)` on
    /// a read timeout; `Err` only on a transport failure or peer EOF.
    pub fn receive_command(&mut self, timeout: Option<Duration>) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(cmd) = self.inbox.commands.pop_front() {
                self.flush_ack()?;
                return Ok(Some(cmd));
            }
            if self.inbox.interrupted {
                self.inbox.interrupted = false;
                self.flush_ack()?;
                return Ok(Some(b"\x03".to_vec()));
            }

            let mut buf = [0u8; 4096];
            let n = self.channel.wait(&mut buf, timeout)?;
            if n == 0 {
                if self.channel.at_eof() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "peer closed connection",
                    ));
                }
                self.flush_ack()?;
                return Ok(None);
            }

            let ack_mode = self.ack_mode;
            let mut delegate = InboxDelegate {
                inbox: &mut self.inbox,
                ack_mode,
            };
            self.processor.feed(&buf[..n], &mut delegate);
            self.flush_ack()?;
        }
    }

    fn flush_ack(&mut self) -> std::io::Result<()> {
        if let Some(valid) = self.inbox.send_ack.take() {
            if valid {
                self.send_ack()?;
            } else {
                self.send_nak()?;
            }
        }
        Ok(())
    }

    /// Send `+`.
    pub fn send_ack(&mut self) -> std::io::Result<()> {
        self.channel.write(b"+")
    }

    /// Send `-`.
    pub fn send_nak(&mut self) -> std::io::Result<()> {
        self.channel.write(b"-")
    }

    /// Frame and send a raw payload (already including any command letter).
    pub fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let framed = frame(payload, false);
        self.channel.write(&framed)?;
        self.channel.flush()
    }

    /// Send `OK`.
    pub fn send_ok(&mut self) -> std::io::Result<()> {
        self.send(b"OK")
    }

    /// Send the empty reply, used for `kSuccess`-adjacent "nothing to add"
    /// cases and for unsupported/unknown commands.
    pub fn send_empty(&mut self) -> std::io::Result<()> {
        self.send(b"")
    }

    /// Map an [`ErrorKind`] to its wire reply: `OK`... no, an `E<hh>` for
    /// classified errors, or the empty reply for `Unsupported`/`Unknown`.
    pub fn send_error(&mut self, kind: ErrorKind) -> std::io::Result<()> {
        match kind.as_errno() {
            Some(code) => {
                let payload = format!("E{}{:02x}", self.packet_separator(), code);
                self.send(payload.as_bytes())
            }
            None => self.send_empty(),
        }
    }

    /// Borrow the underlying channel (for callers that need direct access,
    /// e.g. to hand it to a [`crate::queue_channel::QueueChannel`]).
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::io::RawFd;

    #[derive(Default)]
    struct MemChannel {
        to_send: Vec<u8>,
        written: Vec<u8>,
        inbound: VecDeque<u8>,
        eof: bool,
    }

    impl Channel for MemChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }

        fn wait(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn at_eof(&self) -> bool {
            self.eof
        }

        fn as_raw_fd(&self) -> RawFd {
            -1
        }
    }

    impl MemChannel {
        fn push_inbound(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes);
        }
    }

    fn checksum_frame(payload: &[u8]) -> Vec<u8> {
        frame(payload, false)
    }

    #[test]
    fn acks_a_valid_command_in_ack_mode() {
        let mut chan = MemChannel::default();
        chan.push_inbound(&checksum_frame(b"qSupported"));
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        let cmd = session.receive_command(None).unwrap();
        assert_eq!(cmd, Some(b"qSupported".to_vec()));
        assert_eq!(session.channel_mut().written, b"+".to_vec());
    }

    #[test]
    fn no_ack_sent_once_disabled() {
        let mut chan = MemChannel::default();
        chan.push_inbound(&checksum_frame(b"g"));
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        session.set_ack_mode(false);
        let _ = session.receive_command(None).unwrap();
        assert!(session.channel_mut().written.is_empty());
    }

    #[test]
    fn nak_on_bad_checksum() {
        let mut chan = MemChannel::default();
        chan.push_inbound(b"$OK#00");
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        let cmd = session.receive_command(None).unwrap();
        assert_eq!(cmd, None);
        assert_eq!(session.channel_mut().written, b"-".to_vec());
    }

    #[test]
    fn gdb_error_reply_uses_space_separator() {
        let chan = MemChannel::default();
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        session.send_error(ErrorKind::NotFound).unwrap();
        assert_eq!(session.channel_mut().written[1..3], *b"E ");
    }

    #[test]
    fn lldb_error_reply_has_no_separator() {
        let chan = MemChannel::default();
        let mut session = SessionBase::new(chan, CompatMode::Lldb);
        session.send_error(ErrorKind::NotFound).unwrap();
        assert_eq!(&session.channel_mut().written[1..2], b"E");
        assert_eq!(&session.channel_mut().written[2..4], b"02");
    }

    #[test]
    fn unsupported_maps_to_empty_reply() {
        let chan = MemChannel::default();
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        session.send_error(ErrorKind::Unsupported).unwrap();
        // "$" "#" checksum("") == 0 -> "00"
        assert_eq!(session.channel_mut().written, b"$#00".to_vec());
    }

    #[test]
    fn interrupt_byte_is_delivered_as_a_pseudo_command() {
        let mut chan = MemChannel::default();
        chan.push_inbound(b"\x03");
        let mut session = SessionBase::new(chan, CompatMode::Gdb);
        let cmd = session.receive_command(None).unwrap();
        assert_eq!(cmd, Some(b"\x03".to_vec()));
    }
}
