//! The ptrace-backed target layer: processes, threads, software
//! breakpoints, and the auxv/shared-library introspection built on top of
//! them.

pub mod auxv;
pub mod breakpoint;
pub mod libraries;
pub mod process;
pub mod thread;

pub use breakpoint::{Lifetime, SiteMode, SoftwareBreakpointManager};
pub use process::Process;
pub use thread::Thread;

#[cfg(target_arch = "x86_64")]
pub use breakpoint::{HardwareBreakpointManager, WatchKind};
