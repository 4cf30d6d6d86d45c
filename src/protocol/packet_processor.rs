//! Streaming packet framer.
//!
//! Grounded on `Sources/GDBRemote/PacketProcessor.cpp`'s buffer-draining
//! `parse()`/`process()` pair (the `_needhash`/`_nreqs` fields named in the
//! data model are this module's `tail_needed` state) and cross-checked
//! against the teacher's byte-at-a-time `recv_packet.rs` state machine.

use super::checksum;

/// One of the three unframed single-byte controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// `+` — positive acknowledgement.
    Ack,
    /// `-` — negative acknowledgement, retransmit requested.
    Nack,
    /// `0x03` — asynchronous interrupt.
    Interrupt,
}

/// Upcalls the framer delivers as it recognizes complete units in the byte
/// stream. Exactly one upcall is made per recognized unit.
pub trait PacketProcessorDelegate {
    /// A complete `$<payload>#<hh>` frame was recognized. `valid` reflects
    /// the checksum comparison; an invalid checksum should prompt a NAK.
    fn on_packet_data(&mut self, payload: &[u8], valid: bool);

    /// Bytes were seen outside of any frame (stray bytes between `#<hh>` and
    /// the next `$`, or at stream start).
    fn on_invalid_data(&mut self, bytes: &[u8]);

    /// A single-byte control (`+`, `-`, `0x03`) was recognized.
    fn on_control(&mut self, control: Control);
}

#[derive(Debug)]
enum State {
    /// Not currently inside a frame; `invalid` accumulates stray bytes.
    Idle,
    /// Inside `$...`, accumulating payload until an unescaped `#`.
    Body { payload: Vec<u8> },
    /// Saw `#`, need the first hex digit of the checksum.
    Checksum1 { payload: Vec<u8> },
    /// Saw `#` and one hex digit, need the second.
    Checksum2 { payload: Vec<u8>, hi: u8 },
}

/// Incremental framer: feed it arbitrary byte slices via [`feed`](Self::feed)
/// and it delivers upcalls on the supplied delegate as frames complete,
/// carrying partial state across calls so a frame split across two `feed`
/// calls (or split inside the checksum suffix) is still recognized.
pub struct PacketProcessor {
    state: State,
    invalid: Vec<u8>,
}

impl Default for PacketProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketProcessor {
    /// A fresh processor with no buffered state.
    pub fn new() -> Self {
        PacketProcessor {
            state: State::Idle,
            invalid: Vec::new(),
        }
    }

    /// Feed `bytes` into the framer, delivering zero or more upcalls on
    /// `delegate` for every complete unit recognized.
    pub fn feed(&mut self, bytes: &[u8], delegate: &mut impl PacketProcessorDelegate) {
        for &b in bytes {
            self.feed_byte(b, delegate);
        }
    }

    /// Flush any accumulated invalid-data bytes without waiting for the
    /// next `$`. Call on stream shutdown so trailing garbage isn't lost.
    pub fn flush_invalid(&mut self, delegate: &mut impl PacketProcessorDelegate) {
        if !self.invalid.is_empty() {
            let bytes = std::mem::take(&mut self.invalid);
            delegate.on_invalid_data(&bytes);
        }
    }

    fn flush_invalid_inner(&mut self, delegate: &mut impl PacketProcessorDelegate) {
        if !self.invalid.is_empty() {
            let bytes = std::mem::take(&mut self.invalid);
            delegate.on_invalid_data(&bytes);
        }
    }

    fn feed_byte(&mut self, b: u8, delegate: &mut impl PacketProcessorDelegate) {
        match &mut self.state {
            State::Idle => match b {
                b'+' => {
                    self.flush_invalid_inner(delegate);
                    delegate.on_control(Control::Ack);
                }
                b'-' => {
                    self.flush_invalid_inner(delegate);
                    delegate.on_control(Control::Nack);
                }
                0x03 => {
                    self.flush_invalid_inner(delegate);
                    delegate.on_control(Control::Interrupt);
                }
                b'$' => {
                    self.flush_invalid_inner(delegate);
                    self.state = State::Body { payload: Vec::new() };
                }
                other => self.invalid.push(other),
            },
            State::Body { payload } => {
                if b == b'#' {
                    let payload = std::mem::take(payload);
                    self.state = State::Checksum1 { payload };
                } else {
                    payload.push(b);
                }
            }
            State::Checksum1 { payload } => {
                match (b as char).to_digit(16) {
                    Some(hi) => {
                        let payload = std::mem::take(payload);
                        self.state = State::Checksum2 {
                            payload,
                            hi: hi as u8,
                        };
                    }
                    None => {
                        // Malformed checksum tail; treat the frame as
                        // invalid data and resynchronize at this byte.
                        let payload = std::mem::take(payload);
                        self.invalid.push(b'$');
                        self.invalid.extend_from_slice(&payload);
                        self.invalid.push(b'#');
                        self.state = State::Idle;
                        self.feed_byte(b, delegate);
                    }
                }
            }
            State::Checksum2 { payload, hi } => match (b as char).to_digit(16) {
                Some(lo) => {
                    let payload = std::mem::take(payload);
                    let expected = (*hi << 4) | (lo as u8);
                    let actual = checksum(&payload);
                    delegate.on_packet_data(&payload, actual == expected);
                    self.state = State::Idle;
                }
                None => {
                    let payload = std::mem::take(payload);
                    let hi = *hi;
                    self.invalid.push(b'$');
                    self.invalid.extend_from_slice(&payload);
                    self.invalid.push(b'#');
                    self.invalid
                        .push(std::char::from_digit(hi as u32, 16).unwrap() as u8);
                    self.state = State::Idle;
                    self.feed_byte(b, delegate);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        packets: Vec<(Vec<u8>, bool)>,
        invalid: Vec<Vec<u8>>,
        controls: Vec<Control>,
    }

    impl PacketProcessorDelegate for Recorder {
        fn on_packet_data(&mut self, payload: &[u8], valid: bool) {
            self.packets.push((payload.to_vec(), valid));
        }
        fn on_invalid_data(&mut self, bytes: &[u8]) {
            self.invalid.push(bytes.to_vec());
        }
        fn on_control(&mut self, control: Control) {
            self.controls.push(control);
        }
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        let escaped = super::super::escape(payload);
        let sum = checksum(&escaped);
        let mut out = vec![b'$'];
        out.extend_from_slice(&escaped);
        out.push(b'#');
        out.extend(format!("{:02x}", sum).into_bytes());
        out
    }

    #[test]
    fn recognizes_a_complete_frame() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        p.feed(&framed(b"OK"), &mut r);
        assert_eq!(r.packets, vec![(b"OK".to_vec(), true)]);
    }

    #[test]
    fn recognizes_frame_split_across_feeds() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        let bytes = framed(b"qSupported");
        for chunk in bytes.chunks(3) {
            p.feed(chunk, &mut r);
        }
        assert_eq!(r.packets, vec![(b"qSupported".to_vec(), true)]);
    }

    #[test]
    fn survives_split_between_hash_and_checksum_digits() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        let bytes = framed(b"m4000,4");
        let (a, b) = bytes.split_at(bytes.len() - 1);
        p.feed(a, &mut r);
        assert!(r.packets.is_empty());
        p.feed(b, &mut r);
        assert_eq!(r.packets, vec![(b"m4000,4".to_vec(), true)]);
    }

    #[test]
    fn detects_bad_checksum() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        p.feed(b"$OK#00", &mut r);
        assert_eq!(r.packets, vec![(b"OK".to_vec(), false)]);
    }

    #[test]
    fn recognizes_controls() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        p.feed(b"+-\x03", &mut r);
        assert_eq!(r.controls, vec![Control::Ack, Control::Nack, Control::Interrupt]);
    }

    #[test]
    fn collects_stray_bytes_until_next_frame() {
        let mut p = PacketProcessor::new();
        let mut r = Recorder::default();
        p.feed(b"garbage", &mut r);
        p.feed(&framed(b"OK"), &mut r);
        assert_eq!(r.invalid, vec![b"garbage".to_vec()]);
        assert_eq!(r.packets, vec![(b"OK".to_vec(), true)]);
    }
}
