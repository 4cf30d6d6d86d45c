//! The capability surface `Session` drives: every debugger operation the
//! wire protocol can ask for is one method here.
//!
//! Grounded on `Headers/DebugServer2/GDBRemote/SessionDelegate.h`'s ~70
//! `virtual` methods. Per `SPEC_FULL.md` §9 (design notes: "Delegate
//! polymorphism"), this is modeled as a single trait with default
//! implementations that return [`ErrorKind::Unsupported`], so a concrete
//! delegate only overrides the subset of capabilities it actually has —
//! [`crate::session::debug_session::DebugSessionImpl`] overrides the
//! debugging-session methods, [`crate::session::platform_session::PlatformSessionImpl`]
//! the platform ones.

use crate::common::{Address, CompatMode, Feature, ProcessThreadId};
use crate::error::{ErrorKind, Result};

/// `Z`/`z` breakpoint/watchpoint type, as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointType {
    /// `0`
    Software,
    /// `1`
    Hardware,
    /// `2`
    WriteWatch,
    /// `3`
    ReadWatch,
    /// `4`
    AccessWatch,
}

impl BreakpointType {
    /// Decode the `type` field of a `Z`/`z` packet.
    pub fn from_wire(v: u32) -> Option<Self> {
        match v {
            0 => Some(BreakpointType::Software),
            1 => Some(BreakpointType::Hardware),
            2 => Some(BreakpointType::WriteWatch),
            3 => Some(BreakpointType::ReadWatch),
            4 => Some(BreakpointType::AccessWatch),
            _ => None,
        }
    }
}

/// One thread's resume directive from a `vCont` action list, or the single
/// implicit action synthesized by `c`/`s`/`C`/`S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// `c` — continue.
    Continue,
    /// `C` — continue, delivering `signal`.
    ContinueWithSignal(u32),
    /// `s` — single-step.
    SingleStep,
    /// `S` — single-step, delivering `signal`.
    SingleStepWithSignal(u32),
    /// `t` — stop (used in non-stop mode only; rejected at handshake here).
    Stop,
}

/// One entry of a `vCont` action list: a directive targeting a ptid (or the
/// wildcard "all other threads" when `ptid` is `None`).
#[derive(Debug, Clone, Copy)]
pub struct ThreadResumeAction {
    /// What to do.
    pub action: ResumeAction,
    /// Which thread(s); `None` means "every thread not already covered by a
    /// more specific action" (the single allowed global action).
    pub ptid: Option<ProcessThreadId>,
    /// Resume at this address instead of the current PC, if set.
    pub address: Option<Address>,
}

/// Why a thread stopped, when [`StopInfo::event`] is [`StopEvent::Stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// No reason to report (internal/transient stop).
    #[default]
    None,
    /// Generic trap (e.g. initial attach stop).
    Trap,
    /// Hit a software or hardware execution breakpoint.
    Breakpoint,
    /// Single-step trace trap.
    Trace,
    /// A signal not otherwise classified.
    SignalStop,
    /// Hit a watchpoint of the given access kind.
    ReadWatchpoint,
    /// See above.
    WriteWatchpoint,
    /// See above.
    AccessWatchpoint,
    /// A new thread was spawned (internal; silently resumed).
    ThreadSpawn,
    /// A thread exited (internal; silently resumed).
    ThreadExit,
    /// Shared library load/unload (internal; silently resumed).
    LibraryEvent,
    /// Invalid memory access.
    MemoryError,
    /// Floating point exception.
    MathError,
    /// Illegal instruction.
    InstructionError,
    /// Inferior wrote to the debug output channel.
    DebugOutput,
    /// Platform-specific user exception.
    UserException,
}

/// The top-level classification of a stop/wait event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEvent {
    /// No event (used only as a placeholder before the first wait).
    None,
    /// The target (or a thread within it) stopped; see `reason`.
    Stop,
    /// The target exited normally.
    Exit,
    /// The target was killed by a signal.
    Kill,
}

/// Full description of a stop, exit, or kill event — the `StopInfo` of
/// `spec.md` §3.
#[derive(Debug, Clone, Default)]
pub struct StopInfo {
    /// Top-level event classification.
    pub event: Option<StopEvent>,
    /// Reason for the stop, meaningful only when `event == Some(Stop)`.
    pub reason: StopReason,
    /// Signal number associated with the stop (0 if none).
    pub signal: i32,
    /// Exit status, meaningful only for `Exit`/`Kill`.
    pub status: i32,
    /// The ptid that caused this stop.
    pub ptid: ProcessThreadId,
    /// The stopped thread's name, if known.
    pub thread_name: String,
    /// CPU core the thread last ran on, if known.
    pub core: Option<u32>,
    /// Full register snapshot at the stop, if captured.
    pub registers: Vec<(u32, u64, u8)>,
    /// Every live thread's tid, for `threads:` stop-reply annotation.
    pub threads: Vec<u64>,
    /// `(address, index)` of a hit watchpoint, if `reason` is one of the
    /// watchpoint variants.
    pub watchpoint: Option<(u64, u32)>,
    /// Debug-output payload, if `reason == DebugOutput`.
    pub debug_string: Option<Vec<u8>>,
}

impl Default for StopReason {
    fn default() -> Self {
        StopReason::None
    }
}

impl StopInfo {
    /// Encode this stop as a `T`/`S`/`W`/`X` reply, per
    /// `Structures.cpp`'s `StopInfo::encode`. `threads_in_stop_reply`
    /// mirrors the session's `QListThreadsInStopReply` negotiated state.
    pub fn encode(&self, mode: CompatMode, threads_in_stop_reply: bool) -> String {
        let event = self.event.unwrap_or(StopEvent::Stop);
        match event {
            StopEvent::Exit => format!("W{:02x}", (self.status as u32) & 0xff),
            StopEvent::Kill => format!("X{:02x}", (self.signal as u32) & 0xff),
            StopEvent::None | StopEvent::Stop => {
                let gdb_plain = matches!(mode, CompatMode::Gdb);
                let mut s = String::new();
                if gdb_plain {
                    s.push('S');
                    s.push_str(&format!(
                        "{:02x}",
                        if self.reason != StopReason::None {
                            (self.signal as u32) & 0xff
                        } else {
                            0
                        }
                    ));
                    return s;
                }
                s.push('T');
                s.push_str(&format!(
                    "{:02x}",
                    if self.reason != StopReason::None {
                        (self.signal as u32) & 0xff
                    } else {
                        0
                    }
                ));

                let info = self.encode_info(mode, threads_in_stop_reply);
                let regs = self.encode_registers();
                if mode == CompatMode::Lldb {
                    s.push_str(&info);
                    s.push(';');
                    s.push_str(&regs);
                } else {
                    s.push_str(&regs);
                    s.push(';');
                    s.push_str(&info);
                }
                s.push(';');
                s
            }
        }
    }

    fn encode_info(&self, mode: CompatMode, threads_in_stop_reply: bool) -> String {
        let thread_mode = if mode == CompatMode::Lldb {
            CompatMode::Lldb
        } else {
            mode
        };
        let mut parts = vec![format!("thread:{}", self.ptid.format(thread_mode))];
        if !self.thread_name.is_empty() {
            parts.push(format!("name:{}", self.thread_name));
        }
        if let Some(core) = self.core {
            parts.push(format!("core:{:x}", core));
        }
        let reason_kv = self.reason_key_value();
        if let Some((k, v)) = reason_kv {
            parts.push(format!("{}:{}", k, v));
        }
        if let Some((addr, idx)) = self.watchpoint {
            parts.push(format!("watch:{:x}", addr));
            let _ = idx;
        }
        if self.reason == StopReason::SignalStop {
            parts.push(format!("signal:{:x}", self.signal));
        }
        if threads_in_stop_reply {
            let tids = if self.threads.is_empty() {
                format!("{:x}", self.ptid.tid.id().unwrap_or(0))
            } else {
                self.threads
                    .iter()
                    .map(|t| format!("{:x}", t))
                    .collect::<Vec<_>>()
                    .join(",")
            };
            parts.push(format!("threads:{}", tids));
        }
        parts.join(";")
    }

    fn reason_key_value(&self) -> Option<(&'static str, &'static str)> {
        match self.reason {
            StopReason::Breakpoint => Some(("reason", "breakpoint")),
            StopReason::Trace => Some(("reason", "trace")),
            StopReason::SignalStop => Some(("reason", "signal")),
            StopReason::ReadWatchpoint
            | StopReason::WriteWatchpoint
            | StopReason::AccessWatchpoint => Some(("reason", "watchpoint")),
            _ => None,
        }
    }

    fn encode_registers(&self) -> String {
        self.registers
            .iter()
            .map(|(num, value, size_bytes)| {
                let nibbles = (*size_bytes as usize) * 2;
                format!("{:02x}:{:0width$x}", num & 0xff, value, width = nibbles)
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// The `qHostInfo` response payload.
#[derive(Debug, Clone, Default)]
pub struct HostInfo {
    /// CPU architecture triple, e.g. `x86_64-unknown-linux-gnu`.
    pub triple: String,
    /// CPU type (ELF `e_machine`-ish identifier the dialect expects).
    pub cputype: u32,
    /// CPU subtype, if any.
    pub cpusubtype: u32,
    /// OS name, e.g. `linux`.
    pub os_type: String,
    /// `1` for little-endian targets.
    pub little_endian: bool,
    /// Pointer size in bytes.
    pub ptrsize: u32,
}

/// The `qProcessInfo` response payload.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    /// Process id.
    pub pid: u64,
    /// Parent process id, if known.
    pub parent_pid: Option<u64>,
    /// Real user id.
    pub real_uid: u32,
    /// Real group id.
    pub real_gid: u32,
    /// Effective user id.
    pub effective_uid: u32,
    /// Effective group id.
    pub effective_gid: u32,
    /// Architecture triple.
    pub triple: String,
    /// Executable's on-disk path, if known.
    pub name: Option<String>,
}

/// The `qMemoryRegionInfo` response payload.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegionInfo {
    /// Region start address.
    pub start: u64,
    /// Region length in bytes.
    pub length: u64,
    /// Bitmask of read/write/execute.
    pub protection: u8,
    /// Backing file path, if this region is file-backed.
    pub backing_file: Option<String>,
    /// Offset within the backing file.
    pub backing_file_offset: u64,
    /// Backing file inode.
    pub backing_file_inode: u64,
}

/// Read-only: `r` (bit 0), `w` (bit 1), `x` (bit 2).
pub const PROT_READ: u8 = 1 << 0;
/// Writable.
pub const PROT_WRITE: u8 = 1 << 1;
/// Executable.
pub const PROT_EXEC: u8 = 1 << 2;

/// A shared library's load info, as enumerated for `qXfer:libraries[-svr4]`.
#[derive(Debug, Clone, Default)]
pub struct SharedLibraryInfo {
    /// On-disk path.
    pub path: String,
    /// Load bias / base address.
    pub base_address: u64,
    /// Whether this entry is the main executable rather than a library.
    pub main_executable: bool,
}

/// Register-info payload for `qRegisterInfo`.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    /// Register number (in `g`/`G` order).
    pub regnum: u32,
    /// Register name.
    pub name: String,
    /// Size in bits.
    pub bit_size: u32,
    /// Byte offset in the contiguous layout.
    pub offset: u32,
    /// Encoding name (`uint`, `ieee754`, etc.) for the wire reply.
    pub encoding: &'static str,
    /// Format hint (`binary`, `hex`, ...).
    pub format: &'static str,
    /// Generic role (`pc`, `sp`, `fp`, `ra`, `flags`), if any.
    pub generic: Option<&'static str>,
    /// DWARF register number, if assigned.
    pub dwarf: Option<u32>,
    /// eh_frame register number, if assigned.
    pub eh_frame: Option<u32>,
    /// Registers invalidated by writing this one.
    pub invalidate: Vec<String>,
    /// Containing registers, if this is a sub-register.
    pub container: Vec<String>,
}

/// A host-side file handle, as used by the `vFile:*` family.
pub type FileHandle = i32;

/// Bit flags passed to `vFile:open`, normalized from either dialect's wire
/// encoding (`spec.md` §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// Open for reading.
    pub const READ: u32 = 1 << 0;
    /// Open for writing.
    pub const WRITE: u32 = 1 << 1;
    /// Append on every write.
    pub const APPEND: u32 = 1 << 2;
    /// Truncate on open.
    pub const TRUNCATE: u32 = 1 << 3;
    /// Non-blocking I/O.
    pub const NON_BLOCKING: u32 = 1 << 4;
    /// Create if it doesn't exist.
    pub const CREATE: u32 = 1 << 5;
    /// Fail if it already exists (with `CREATE`).
    pub const NEW_ONLY: u32 = 1 << 6;
    /// Fail if the final component is a symlink.
    pub const NO_FOLLOW: u32 = 1 << 7;
    /// Set close-on-exec on the resulting fd.
    pub const CLOSE_ON_EXEC: u32 = 1 << 8;

    /// Whether `flag` is set.
    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

/// The capability surface a [`crate::session::session::Session`] drives.
/// Every method defaults to returning [`ErrorKind::Unsupported`]; a concrete
/// delegate overrides only what it implements.
#[allow(unused_variables)]
pub trait Delegate {
    /// Size, in bits, of the general-purpose register file — used to decide
    /// the nibble width of native-endian address encodings.
    fn gpr_size(&self) -> usize {
        64
    }

    // ---- General information ----------------------------------------

    /// Negotiate feature support for `qSupported`.
    fn on_query_supported(
        &mut self,
        remote: &[Feature],
        local: &mut Vec<Feature>,
    ) -> Result<()> {
        let _ = remote;
        local.push(Feature {
            name: "qXfer:features:read".into(),
            flag: crate::common::FeatureFlag::Supported,
            value: None,
        });
        Ok(())
    }

    /// `qHostInfo`.
    fn on_query_host_info(&self) -> Result<HostInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `qRcmd`: execute a monitor command; returns console text to echo back
    /// (as a series of `O<hex>` packets) before the final `OK`.
    fn on_execute_command(&mut self, command: &str) -> Result<String> {
        let _ = command;
        Err(ErrorKind::Unsupported)
    }

    // ---- Debugging session --------------------------------------------

    /// `vAttach`.
    fn on_attach(&mut self, pid: u64) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `vAttachName`.
    fn on_attach_by_name(&mut self, name: &str) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `vRun`: spawn and attach to a fresh child.
    fn on_run_attach(&mut self, filename: &str, arguments: &[String]) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `D`: detach, optionally leaving the target stopped.
    fn on_detach(&mut self, pid: Option<u64>, stay_stopped: bool) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qAttached`.
    fn on_query_attached(&self, pid: Option<u64>) -> Result<bool> {
        Err(ErrorKind::Unsupported)
    }

    /// `qProcessInfo`/`qProcessInfoPID`.
    fn on_query_process_info(&self) -> Result<ProcessInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `qThreadStopInfo`/`?`.
    fn on_query_thread_stop_info(&self, ptid: ProcessThreadId) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `qOffsets`: executable load-bias / section offsets.
    fn on_query_section_offsets(&self) -> Result<(u64, u64, bool)> {
        Err(ErrorKind::Unsupported)
    }

    /// `QListThreadsInStopReply`: ask that every subsequent stop reply this
    /// delegate builds include a populated `threads` list. Most delegates
    /// (anything not driving a live stop-info pipeline) have nothing to do
    /// here; the default is a no-op rather than `Unsupported` so negotiating
    /// the feature never fails a session that doesn't need it.
    fn on_set_threads_in_stop_reply(&mut self, enabled: bool) {
        let _ = enabled;
    }

    /// `vCont`/`c`/`s`/`C`/`S`: apply resume actions and block until the
    /// next reportable stop.
    fn on_resume(&mut self, actions: &[ThreadResumeAction]) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `0x03`: asynchronous interrupt during a resume.
    fn on_interrupt(&mut self) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `k`/`vKill`.
    fn on_terminate(&mut self, ptid: ProcessThreadId) -> Result<StopInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `qRcmd exit` and similar.
    fn on_exit_server(&mut self) -> Result<()> {
        Ok(())
    }

    /// `qfThreadInfo`/`qsThreadInfo` thread enumeration. `last` is `None` for
    /// the first request.
    fn on_query_thread_list(&self, last: Option<u64>) -> Result<Option<u64>> {
        Err(ErrorKind::Unsupported)
    }

    /// `qC`.
    fn on_query_current_thread(&self) -> Result<ProcessThreadId> {
        Err(ErrorKind::Unsupported)
    }

    /// `H` validity check and `T` (thread-is-alive query).
    fn on_thread_is_alive(&mut self, ptid: ProcessThreadId) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qThreadExtraInfo`: human-readable thread description.
    fn on_query_thread_info(&self, ptid: ProcessThreadId) -> Result<String> {
        Err(ErrorKind::Unsupported)
    }

    /// `g`.
    fn on_read_general_registers(&mut self, ptid: ProcessThreadId) -> Result<Vec<u8>> {
        Err(ErrorKind::Unsupported)
    }

    /// `G`.
    fn on_write_general_registers(&mut self, ptid: ProcessThreadId, regs: &[u8]) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QSaveRegisterState`.
    fn on_save_registers(&mut self, ptid: ProcessThreadId) -> Result<u64> {
        Err(ErrorKind::Unsupported)
    }

    /// `QRestoreRegisterState`.
    fn on_restore_registers(&mut self, ptid: ProcessThreadId, id: u64) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `p`.
    fn on_read_register_value(&mut self, ptid: ProcessThreadId, regno: u32) -> Result<Vec<u8>> {
        Err(ErrorKind::Unsupported)
    }

    /// `P`.
    fn on_write_register_value(
        &mut self,
        ptid: ProcessThreadId,
        regno: u32,
        value: &[u8],
    ) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `m`.
    fn on_read_memory(&mut self, address: Address, length: usize) -> Result<Vec<u8>> {
        Err(ErrorKind::Unsupported)
    }

    /// `M`/`X`.
    fn on_write_memory(&mut self, address: Address, data: &[u8]) -> Result<usize> {
        Err(ErrorKind::Unsupported)
    }

    /// `_M`.
    fn on_allocate_memory(&mut self, size: u64, permissions: u8) -> Result<Address> {
        Err(ErrorKind::Unsupported)
    }

    /// `_m`.
    fn on_deallocate_memory(&mut self, address: Address) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qMemoryRegionInfo`.
    fn on_query_memory_region_info(&self, address: Address) -> Result<MemoryRegionInfo> {
        Err(ErrorKind::Unsupported)
    }

    /// `qCRC`.
    fn on_compute_crc(&mut self, address: Address, length: u64) -> Result<u32> {
        Err(ErrorKind::Unsupported)
    }

    /// `Z`.
    fn on_insert_breakpoint(
        &mut self,
        kind: BreakpointType,
        address: Address,
        size_hint: u32,
    ) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `z`.
    fn on_remove_breakpoint(
        &mut self,
        kind: BreakpointType,
        address: Address,
        size_hint: u32,
    ) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qXfer:<object>:read:...`. Returns the requested slice (already
    /// clamped to available data) and whether it is the final chunk.
    fn on_xfer_read(
        &mut self,
        object: &str,
        annex: &str,
        offset: u64,
        length: u64,
    ) -> Result<(Vec<u8>, bool)> {
        let _ = (object, annex, offset, length);
        Err(ErrorKind::Unsupported)
    }

    /// `qXfer:<object>:write:...`.
    fn on_xfer_write(&mut self, object: &str, annex: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let _ = (object, annex, offset, data);
        Err(ErrorKind::Unsupported)
    }

    /// `qRegisterInfo<n>`.
    fn on_query_register_info(&self, regno: u32) -> Result<RegisterInfo> {
        Err(ErrorKind::Unsupported)
    }

    // ---- Platform session ----------------------------------------------

    /// `QSetDisableASLR`.
    fn on_disable_aslr(&mut self, disable: bool) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QEnvironment`/`QEnvironmentHexEncoded`.
    fn on_set_environment_variable(&mut self, name: &str, value: &str) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QEnvironmentReset`: drop every variable accumulated via
    /// `on_set_environment_variable` so a subsequent `vRun` starts from a
    /// clean slate.
    fn on_reset_environment(&mut self) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QSetWorkingDir`.
    fn on_set_working_directory(&mut self, path: &str) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QSetSTDIN`/`QSetSTDOUT`/`QSetSTDERR`. `fileno` is 0/1/2.
    fn on_set_std_file(&mut self, fileno: u32, path: &str) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `QLaunchArch`.
    fn on_set_architecture(&mut self, architecture: &str) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `vRun`'s program-argument accumulation (platform launches).
    fn on_set_program_arguments(&mut self, args: &[String]) -> Result<()> {
        let _ = args;
        Err(ErrorKind::Unsupported)
    }

    /// `qPlatform_shell`.
    fn on_execute_program(
        &mut self,
        command: &str,
        timeout_secs: u32,
        working_directory: &str,
    ) -> Result<(i32, String)> {
        let _ = (command, timeout_secs, working_directory);
        Err(ErrorKind::Unsupported)
    }

    /// `qPlatform_mkdir`.
    fn on_file_create_directory(&mut self, path: &str, mode: u32) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:open`.
    fn on_file_open(&mut self, path: &str, flags: OpenFlags, mode: u32) -> Result<FileHandle> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:close`.
    fn on_file_close(&mut self, fd: FileHandle) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:pread`.
    fn on_file_read(&mut self, fd: FileHandle, count: u64, offset: u64) -> Result<Vec<u8>> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:pwrite`.
    fn on_file_write(&mut self, fd: FileHandle, offset: u64, data: &[u8]) -> Result<u64> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:unlink`.
    fn on_file_remove(&mut self, path: &str) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:readlink`.
    fn on_file_read_link(&mut self, path: &str) -> Result<String> {
        Err(ErrorKind::Unsupported)
    }

    /// `qPlatform_chmod`.
    fn on_file_set_permissions(&mut self, path: &str, mode: u32) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:exists`.
    fn on_file_exists(&mut self, path: &str) -> Result<bool> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:MD5`.
    fn on_file_compute_md5(&mut self, path: &str) -> Result<[u8; 16]> {
        Err(ErrorKind::Unsupported)
    }

    /// `vFile:size`/`vFile:fstat`.
    fn on_file_get_size(&mut self, path: &str) -> Result<u64> {
        Err(ErrorKind::Unsupported)
    }

    /// `qfProcessInfo`/`qsProcessInfo`.
    fn on_query_process_list(&self, name_filter: Option<&str>, first: bool) -> Result<ProcessInfo> {
        let _ = (name_filter, first);
        Err(ErrorKind::Unsupported)
    }

    /// `qLaunchGDBServer`.
    fn on_launch_debug_server(&mut self, host: &str) -> Result<(u16, u64)> {
        Err(ErrorKind::Unsupported)
    }

    /// `qLaunchSuccess`.
    fn on_query_launch_success(&self) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qUserName`.
    fn on_query_user_name(&self, uid: u32) -> Result<String> {
        Err(ErrorKind::Unsupported)
    }

    /// `qGroupName`.
    fn on_query_group_name(&self, gid: u32) -> Result<String> {
        Err(ErrorKind::Unsupported)
    }

    /// `qGetWorkingDir`.
    fn on_query_working_directory(&self) -> Result<String> {
        Err(ErrorKind::Unsupported)
    }
}
