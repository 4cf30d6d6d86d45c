//! A single ptrace-controlled thread and its last observed stop.
//!
//! Grounded on `Sources/Target/Linux/Thread.cpp`'s `updateStopInfo`, which
//! disambiguates a raw wait status into a [`StopReason`] by inspecting
//! `PTRACE_GETSIGINFO` rather than trusting the signal number alone: a
//! `SIGTRAP` can mean a breakpoint, a single-step trace trap, or (at attach
//! time) a plain stop, and only `si_code`/`si_pid` tell them apart.

use nix::unistd::Pid;

use crate::common::ProcessThreadId;
use crate::session::delegate::{StopEvent, StopInfo, StopReason};

/// Mirrors the original's `Thread::State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Not yet seen a wait status.
    Invalid,
    /// Resumed, not yet stopped again.
    Running,
    /// Stopped (breakpoint, signal, or otherwise).
    Stopped,
    /// Stopped by a single-step trace trap.
    Stepped,
    /// Exited or killed.
    Terminated,
}

/// One thread of a traced process.
#[derive(Debug, Clone)]
pub struct Thread {
    tid: Pid,
    state: ThreadState,
    stop_info: StopInfo,
}

impl Thread {
    /// A freshly known thread, not yet stopped.
    pub fn new(tid: Pid) -> Self {
        Thread {
            tid,
            state: ThreadState::Invalid,
            stop_info: StopInfo::default(),
        }
    }

    /// This thread's id.
    pub fn tid(&self) -> Pid {
        self.tid
    }

    /// Current state machine position.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// The most recently recorded stop.
    pub fn stop_info(&self) -> &StopInfo {
        &self.stop_info
    }

    /// Mark this thread as having just been resumed (`PTRACE_CONT`/`PTRACE_SINGLESTEP`).
    pub fn mark_running(&mut self) {
        self.state = ThreadState::Running;
    }

    /// Record a new stop, deriving [`ThreadState`] from the event/reason
    /// pair so callers don't have to keep the two in sync by hand.
    pub fn record_stop(
        &mut self,
        ptid: ProcessThreadId,
        event: StopEvent,
        reason: StopReason,
        signal: i32,
        status: i32,
    ) {
        self.state = match event {
            StopEvent::Exit | StopEvent::Kill => ThreadState::Terminated,
            _ if reason == StopReason::Trace => ThreadState::Stepped,
            _ => ThreadState::Stopped,
        };
        self.stop_info = StopInfo {
            event: Some(event),
            reason,
            signal,
            status,
            ptid,
            thread_name: self.stop_info.thread_name.clone(),
            core: core_of(self.tid),
            registers: Vec::new(),
            threads: Vec::new(),
            watchpoint: None,
            debug_string: None,
        };
    }
}

/// `SI_USER`: signal sent by `kill`/`tgkill` rather than the kernel itself.
pub const SI_USER: i32 = 0;
/// `SI_KERNEL`: delivered by the kernel (e.g. a breakpoint trap) rather than
/// any process.
pub const SI_KERNEL: i32 = 0x80;
/// `SI_TKILL`: sent via `tgkill`, the mechanism `PTRACE_INTERRUPT`-style
/// stops and manually delivered `SIGSTOP`s both use.
pub const SI_TKILL: i32 = -6;
/// `TRAP_BRKPT`: `si_code` for a hardware/software breakpoint trap.
pub const TRAP_BRKPT: i32 = 1;
/// `TRAP_TRACE`: `si_code` for a single-step trace trap.
pub const TRAP_TRACE: i32 = 2;

/// Classify a `SIGTRAP` stop using `PTRACE_GETSIGINFO`, per the five-case
/// split in `Thread::updateStopInfo`:
/// 1. `si_code == TRAP_BRKPT` or `SI_KERNEL`: a breakpoint trap.
/// 2. `si_code == TRAP_TRACE`: a single-step trace trap.
/// 3. `si_code` is `SI_USER`/`SI_TKILL` and `si_pid` is 0 or the tracee's
///    own pid: a self-inflicted stop (the initial `PTRACE_TRACEME` trap, or
///    a manually delivered `SIGSTOP` used to interrupt a running target).
/// 4. `si_code` is `SI_USER`/`SI_TKILL` from another pid: a genuine signal.
/// 5. Anything else: treated as a generic trap.
pub fn classify_trap(pid: Pid) -> StopReason {
    match nix::sys::ptrace::getsiginfo(pid) {
        Ok(info) => {
            let si_code = info.si_code;
            let si_pid = unsafe { info.si_pid() };
            if si_code == TRAP_BRKPT || si_code == SI_KERNEL {
                StopReason::Breakpoint
            } else if si_code == TRAP_TRACE {
                StopReason::Trace
            } else if si_code == SI_USER || si_code == SI_TKILL {
                if si_pid == 0 || si_pid == pid.as_raw() {
                    StopReason::Trap
                } else {
                    StopReason::SignalStop
                }
            } else {
                StopReason::Trap
            }
        }
        Err(_) => StopReason::Trap,
    }
}

/// `/proc/<tid>/stat`'s `processor` field (`man 5 proc`, field 39): the CPU
/// core the thread last ran on. `None` if the thread is already gone or the
/// stat line can't be parsed.
fn core_of(tid: Pid) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", tid.as_raw())).ok()?;
    let after_comm = stat.rfind(')')?;
    let fields: Vec<&str> = stat[after_comm + 2..].split_whitespace().collect();
    // `state` is field 3 and lands at fields[0], so field 39 is fields[36].
    fields.get(36)?.parse().ok()
}
