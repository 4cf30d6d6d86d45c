//! End-to-end wire-protocol scenarios, driven as a raw TCP client against a
//! live `Session<TcpChannel, DebugSessionImpl>`.
//!
//! Covers the scenarios from `spec.md` §8 that don't need a real ptraced
//! target (S1, S5, S6); S2-S4 live in `target_process.rs` and
//! `resume_atomicity.rs`, grounded against a real spawned child instead of
//! the spec's illustrative fixed-address example.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use gdbserver::channel::{Channel, TcpChannel};
use gdbserver::common::CompatMode;
use gdbserver::protocol::frame;
use gdbserver::session::{DebugSessionImpl, Delegate, Session};
use gdbserver_arch::Arch;

/// Spawn a session server on an ephemeral loopback port, return the port
/// and the server thread's handle.
fn spawn_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let channel = TcpChannel::new(stream);
        let mut delegate = DebugSessionImpl::new();
        let _ = delegate.start_interrupt_watcher(channel.as_raw_fd());
        let mut session = Session::new(channel, delegate, CompatMode::Gdb);
        let _ = session.run();
    });
    port
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn send_command(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(&frame(payload, false)).unwrap();
}

/// Read bytes until a full `$...#hh` frame has arrived, skipping any
/// leading `+`/`-` ack bytes, and return the payload between `$` and `#`.
fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).unwrap();
        if byte[0] == b'$' {
            break;
        }
    }
    loop {
        stream.read_exact(&mut byte).unwrap();
        if byte[0] == b'#' {
            break;
        }
        buf.push(byte[0]);
    }
    // consume the two checksum hex digits
    stream.read_exact(&mut [0u8; 2]).unwrap();
    buf
}

/// S1 - no-ack handshake: `QStartNoAckMode` gets acked then replied `OK`,
/// and the server stops sending `+`/`-` for subsequent commands.
#[test]
fn s1_no_ack_handshake() {
    let port = spawn_server();
    let mut stream = connect(port);

    send_command(&mut stream, b"QStartNoAckMode");
    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack).unwrap();
    assert_eq!(ack[0], b'+');
    assert_eq!(read_reply(&mut stream), b"OK");
    stream.write_all(b"+").unwrap();

    // No-ack mode: a second command gets no leading `+`/`-`, straight to `$`.
    send_command(&mut stream, b"qC");
    let mut first = [0u8; 1];
    stream.read_exact(&mut first).unwrap();
    assert_eq!(first[0], b'$', "server must not ack once no-ack mode is on");
}

/// S5 - qSupported exchange: `multiprocess+` flips the session into
/// multiprocess-ptid mode, and the reply advertises this server's actual
/// feature set (the spec's `qEcho` example is illustrative, not literal).
#[test]
fn s5_qsupported_exchange() {
    let port = spawn_server();
    let mut stream = connect(port);

    send_command(&mut stream, b"qSupported:multiprocess+;swbreak+");
    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack).unwrap();
    assert_eq!(ack[0], b'+');
    let reply = String::from_utf8(read_reply(&mut stream)).unwrap();
    let features: Vec<&str> = reply.split(';').collect();
    assert!(features.contains(&"PacketSize=3fff"));
    assert!(features.contains(&"QStartNoAckMode+"));
    assert!(features.contains(&"qXfer:features:read+"));
}

/// S6 - qXfer paging: a request with a bounded `length` only ever returns
/// that many bytes (`m`, more remains) until the final chunk (`l`).
#[test]
fn s6_qxfer_paging() {
    let port = spawn_server();
    let mut stream = connect(port);

    let full = gdbserver_arch::x86_64::X86_64::target_description_xml();
    let page: usize = 0x200;
    assert!(full.len() > page, "test assumes target.xml needs more than one page");

    let mut ack = [0u8; 1];
    let mut offset = 0usize;
    let mut rest = Vec::new();
    loop {
        let cmd = format!("qXfer:features:read:target.xml:{:x},{:x}", offset, page);
        send_command(&mut stream, cmd.as_bytes());
        stream.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], b'+');
        let chunk = read_reply(&mut stream);
        let (tag, data) = (chunk[0], &chunk[1..]);
        if offset == 0 {
            assert_eq!(data.len(), page, "first page must be filled to the requested length");
        }
        rest.extend_from_slice(data);
        offset += data.len();
        if tag == b'l' {
            break;
        }
        assert_eq!(tag, b'm');
    }
    assert_eq!(&rest[..], full.as_bytes());
}
