//! Low-level write-side framing: wraps a payload as `$<escaped>#<hh>`.
//!
//! Grounded on the teacher's `protocol::response_writer::ResponseWriter`
//! (a thin wrapper that accumulates a checksum as bytes are written) and
//! `original_source/Sources/GDBRemote/SessionBase.cpp`'s `send`, which always
//! escapes the whole payload before framing it. `session::base::SessionBase`
//! is the layer that adds ACK/NAK bookkeeping and the `sendOK`/`sendError`
//! conventions on top of this.

use crate::protocol::checksum;

/// Frame `payload` (already escaped, or not — see [`frame`]) as
/// `$<payload>#<hh>`.
fn frame_raw(escaped_payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_payload.len() + 4);
    out.push(b'$');
    out.extend_from_slice(escaped_payload);
    out.push(b'#');
    out.extend(format!("{:02x}", checksum(escaped_payload)).into_bytes());
    out
}

/// Frame `payload` for transmission. If `already_escaped` is false, `payload`
/// is escaped first (any `$`, `#`, `}`, `*` byte); the checksum is always
/// computed over the escaped bytes actually placed on the wire, matching
/// what a receiving [`crate::protocol::packet_processor::PacketProcessor`]
/// will sum.
pub fn frame(payload: &[u8], already_escaped: bool) -> Vec<u8> {
    if already_escaped {
        frame_raw(payload)
    } else {
        frame_raw(&crate::protocol::escape(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_and_escapes_by_default() {
        let framed = frame(b"a$b", false);
        let escaped = crate::protocol::escape(b"a$b");
        let mut expected = vec![b'$'];
        expected.extend_from_slice(&escaped);
        expected.push(b'#');
        expected.extend(format!("{:02x}", checksum(&escaped)).into_bytes());
        assert_eq!(framed, expected);
    }

    #[test]
    fn leaves_already_escaped_payloads_untouched() {
        let payload = crate::protocol::escape(b"a$b");
        let framed = frame(&payload, true);
        assert!(framed.starts_with(b"$"));
        assert!(framed.ends_with(format!("{:02x}", checksum(&payload)).as_bytes()));
    }
}
