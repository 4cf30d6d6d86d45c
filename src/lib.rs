//! A remote debug server speaking the GDB/LLDB Remote Serial Protocol over
//! TCP, a Unix domain socket, or an inherited file descriptor.
//!
//! The binary entry point lives in `main.rs`; this crate root just wires
//! together the layers it drives: wire framing ([`protocol`]), the
//! transport ([`channel`], [`queue_channel`]), command dispatch
//! ([`session`]), and the ptrace-backed target ([`target`]).

pub mod channel;
pub mod common;
pub mod error;
pub mod file_ops;
pub mod protocol;
pub mod queue;
pub mod queue_channel;
pub mod session;
pub mod spawner;
pub mod target;
