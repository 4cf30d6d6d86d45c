//! The session layer: packet-level handshake state, the capability
//! interface a concrete mode plugs into it, and the two concrete modes
//! themselves.

pub mod base;
pub mod debug_session;
pub mod delegate;
pub mod platform_session;
pub mod session;

pub use base::SessionBase;
pub use debug_session::DebugSessionImpl;
pub use delegate::Delegate;
pub use platform_session::PlatformSessionImpl;
pub use session::Session;
