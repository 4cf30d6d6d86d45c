//! The debugging-session half of [`crate::session::delegate::Delegate`]:
//! everything that drives a ptrace-controlled [`crate::target::Process`].
//!
//! Grounded on `Sources/GDBRemote/Session.cpp`'s resume handlers (`Handle_c`,
//! `Handle_vCont`) and `spec.md` §5's concurrency model: a resume blocks the
//! command loop in `Process::wait`, cancellable only by delivering a
//! `SIGSTOP`-equivalent to the tracee when an async interrupt byte arrives —
//! modeled here by [`InterruptWatcher`], a reader thread over a duplicated
//! socket fd that looks for `0x03` and delivers the `SIGSTOP` itself, since
//! the main thread can't: it's the one blocked in `wait()`.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::common::{Address, Feature, FeatureFlag};
use crate::error::{ErrorKind, Result};
use crate::session::delegate::{
    BreakpointType, Delegate, HostInfo, MemoryRegionInfo, ProcessInfo, RegisterInfo,
    ResumeAction, StopEvent, StopInfo, ThreadResumeAction,
};
use crate::file_ops::{self, FileTable};
use crate::session::delegate::{FileHandle, OpenFlags};
use crate::spawner::Spawner;
use crate::target::breakpoint::{Lifetime, SiteMode};
use crate::target::process::Process;
use gdbserver_arch::Arch;

/// No process currently attached; an async interrupt byte is a no-op.
const NO_TARGET: i32 = 0;

/// Watches a duplicated copy of the session's socket fd for the single
/// async-interrupt byte `0x03` and, when it arrives, delivers `SIGSTOP`
/// to the tracked target directly — this is what makes the interrupt
/// effective while the main thread is blocked inside `Process::wait`,
/// per `spec.md` §5 ("delivering a SIGSTOP-equivalent to the tracee" is
/// the only way to cancel that block). Mirrors ds2's QueueChannel reader
/// thread driving `onInterrupt` independently of the session loop.
pub struct InterruptWatcher {
    target_pid: Arc<AtomicI32>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptWatcher {
    /// Spawn the watcher over a dup of `fd`. The duplicate is closed when
    /// the watcher thread exits (EOF, error, or explicit `stop`).
    pub fn spawn(fd: RawFd) -> Result<Self> {
        let dup_fd = nix::unistd::dup(fd).map_err(ErrorKind::from)?;
        let target_pid = Arc::new(AtomicI32::new(NO_TARGET));
        let stop = Arc::new(AtomicBool::new(false));

        let target_pid_for_thread = target_pid.clone();
        let stop_for_thread = stop.clone();
        let handle = thread::Builder::new()
            .name("interrupt-watcher".into())
            .spawn(move || {
                let mut buf = [0u8; 64];
                loop {
                    if stop_for_thread.load(Ordering::Acquire) {
                        break;
                    }
                    match nix::unistd::read(dup_fd, &mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if buf[..n].contains(&0x03) {
                                let pid = target_pid_for_thread.load(Ordering::Acquire);
                                if pid != NO_TARGET {
                                    let _ = signal::kill(Pid::from_raw(pid), Signal::SIGSTOP);
                                }
                            }
                        }
                        Err(nix::errno::Errno::EINTR) => continue,
                        Err(_) => break,
                    }
                }
                let _ = nix::unistd::close(dup_fd);
            })
            .ok();

        Ok(InterruptWatcher {
            target_pid,
            stop,
            handle,
        })
    }

    /// Record which process async `0x03` bytes should `SIGSTOP`. Called
    /// whenever the session attaches to or launches a target; cleared
    /// (`NO_TARGET`) on detach.
    pub fn set_target(&self, pid: i32) {
        self.target_pid.store(pid, Ordering::Release);
    }

    /// Stop the watcher thread. Best-effort: the thread may still be
    /// blocked in `read` until the next byte or EOF, so this does not join.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.handle = None;
    }
}

/// The debugging-session delegate: owns the ptrace-controlled process and
/// everything resume/memory/register handlers need.
pub struct DebugSessionImpl {
    process: Option<Process>,
    snapshots: HashMap<u64, Vec<u8>>,
    next_snapshot_id: u64,
    allocations: HashMap<u64, u64>,
    threads_in_stop_reply: bool,
    interrupt_watcher: Option<InterruptWatcher>,
    /// Launch parameters accumulated via `QEnvironment*`/`QSetWorkingDir`/
    /// `QSetSTD*`/`QSetDisableASLR` before `vRun` commits them.
    pending_spawner: Spawner,
    files: FileTable,
}

impl DebugSessionImpl {
    /// An empty session with no attached process yet.
    pub fn new() -> Self {
        DebugSessionImpl {
            process: None,
            snapshots: HashMap::new(),
            next_snapshot_id: 1,
            allocations: HashMap::new(),
            threads_in_stop_reply: false,
            interrupt_watcher: None,
            pending_spawner: Spawner::new(),
            files: FileTable::new(),
        }
    }

    /// Install the interrupt watcher once the session's socket fd is known.
    pub fn start_interrupt_watcher(&mut self, fd: RawFd) -> Result<()> {
        self.interrupt_watcher = Some(InterruptWatcher::spawn(fd)?);
        Ok(())
    }

    /// Negotiated via `QListThreadsInStopReply`.
    pub fn set_threads_in_stop_reply(&mut self, enabled: bool) {
        self.threads_in_stop_reply = enabled;
    }

    fn process_mut(&mut self) -> Result<&mut Process> {
        self.process.as_mut().ok_or(ErrorKind::ProcessNotFound)
    }

    fn process(&self) -> Result<&Process> {
        self.process.as_ref().ok_or(ErrorKind::ProcessNotFound)
    }

    fn build_stop_info(&mut self, tid: i32) -> Result<StopInfo> {
        let threads_in_stop_reply = self.threads_in_stop_reply;
        let process = self.process_mut()?;
        let thread = process.thread(tid).ok_or(ErrorKind::NotFound)?;
        let mut stop = thread.stop_info().clone();
        if threads_in_stop_reply {
            stop.threads = process.thread_ids().into_iter().map(|t| t as u64).collect();
        }
        Ok(stop)
    }

    fn current_tid(&self) -> Result<i32> {
        Ok(self
            .process()?
            .current_thread()
            .ok_or(ErrorKind::NotFound)?
            .tid()
            .as_raw())
    }
}

impl Default for DebugSessionImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl Delegate for DebugSessionImpl {
    fn on_query_supported(&mut self, _remote: &[Feature], local: &mut Vec<Feature>) -> Result<()> {
        for name in [
            "qXfer:features:read",
            "qXfer:auxv:read",
            "qXfer:threads:read",
            "qXfer:libraries:read",
            "qXfer:libraries-svr4:read",
            "qXfer:exec-file:read",
        ] {
            local.push(Feature {
                name: name.into(),
                flag: FeatureFlag::Supported,
                value: None,
            });
        }
        Ok(())
    }

    fn on_attach(&mut self, pid: u64) -> Result<StopInfo> {
        let process = Process::attach(pid as i32)?;
        self.process = Some(process);
        if let Some(w) = &self.interrupt_watcher {
            w.set_target(pid as i32);
        }
        let tid = self.current_tid_after_attach()?;
        self.build_stop_info(tid)
    }

    fn on_attach_by_name(&mut self, name: &str) -> Result<StopInfo> {
        let pid = find_process_by_name(name)?;
        self.on_attach(pid as u64)
    }

    fn on_run_attach(&mut self, filename: &str, arguments: &[String]) -> Result<StopInfo> {
        let mut argv = vec![filename.to_string()];
        argv.extend_from_slice(arguments);
        self.pending_spawner.set_program_arguments(&argv);
        let spawner = std::mem::replace(&mut self.pending_spawner, Spawner::new());
        let process = Process::spawn(spawner)?;
        let pid = process.pid();
        self.process = Some(process);
        if let Some(w) = &self.interrupt_watcher {
            w.set_target(pid);
        }
        let tid = self.current_tid_after_attach()?;
        self.build_stop_info(tid)
    }

    fn on_detach(&mut self, _pid: Option<u64>, stay_stopped: bool) -> Result<()> {
        self.process_mut()?.detach(stay_stopped)?;
        if let Some(w) = &self.interrupt_watcher {
            w.set_target(NO_TARGET);
        }
        self.process = None;
        Ok(())
    }

    fn on_query_attached(&self, _pid: Option<u64>) -> Result<bool> {
        Ok(self.process()?.attached())
    }

    fn on_query_process_info(&self) -> Result<ProcessInfo> {
        let process = self.process()?;
        Ok(ProcessInfo {
            pid: process.pid() as u64,
            parent_pid: None,
            real_uid: nix::unistd::getuid().as_raw(),
            real_gid: nix::unistd::getgid().as_raw(),
            effective_uid: nix::unistd::geteuid().as_raw(),
            effective_gid: nix::unistd::getegid().as_raw(),
            triple: host_triple(),
            name: None,
        })
    }

    fn on_query_thread_stop_info(&self, ptid: crate::common::ProcessThreadId) -> Result<StopInfo> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        let process = self.process()?;
        Ok(process.thread(tid).ok_or(ErrorKind::NotFound)?.stop_info().clone())
    }

    fn on_query_section_offsets(&self) -> Result<(u64, u64, bool)> {
        let libraries = self.process()?.enumerate_shared_libraries()?;
        let bias = libraries
            .iter()
            .find(|l| l.main_executable)
            .map(|l| l.base_address)
            .unwrap_or(0);
        // The executable isn't loaded with separate text/data segment
        // offsets on Linux; report a single combined bias for both.
        Ok((bias, bias, true))
    }

    fn on_query_thread_info(&self, ptid: crate::common::ProcessThreadId) -> Result<String> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        self.process()?.thread(tid).ok_or(ErrorKind::NotFound)?;
        Ok(format!("tid = {}", tid))
    }

    fn on_set_threads_in_stop_reply(&mut self, enabled: bool) {
        DebugSessionImpl::set_threads_in_stop_reply(self, enabled);
    }

    fn on_resume(&mut self, actions: &[ThreadResumeAction]) -> Result<StopInfo> {
        let tids = self.process()?.thread_ids();
        let mut covered = std::collections::HashSet::new();
        let mut wildcard: Option<ThreadResumeAction> = None;

        for action in actions {
            match action.ptid {
                Some(ptid) => {
                    let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
                    covered.insert(tid);
                    self.apply_action(tid, action)?;
                }
                None => wildcard = Some(*action),
            }
        }
        if let Some(action) = wildcard {
            for tid in tids {
                if !covered.contains(&tid) {
                    self.apply_action(tid, &action)?;
                }
            }
        }

        // An async `0x03` arriving during this block is handled by
        // `InterruptWatcher`, which delivers `SIGSTOP` to the target
        // directly from its own thread -- `wait()` just sees it as an
        // ordinary stop. `Process::wait()` already rewinds the pc past a
        // hit software breakpoint's trap byte before returning.
        let tid = self.process_mut()?.wait()?;
        self.build_stop_info(tid)
    }

    fn on_interrupt(&mut self) -> Result<()> {
        let tid = self.current_tid()?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(tid), nix::sys::signal::Signal::SIGSTOP)
            .map_err(ErrorKind::from)
    }

    fn on_terminate(&mut self, _ptid: crate::common::ProcessThreadId) -> Result<StopInfo> {
        self.process_mut()?.terminate()?;
        if let Some(w) = &self.interrupt_watcher {
            w.set_target(NO_TARGET);
        }
        Ok(StopInfo {
            event: Some(StopEvent::Kill),
            signal: nix::sys::signal::Signal::SIGKILL as i32,
            ..Default::default()
        })
    }

    fn on_query_thread_list(&self, last: Option<u64>) -> Result<Option<u64>> {
        let tids = self.process()?.thread_ids();
        let mut sorted: Vec<u64> = tids.into_iter().map(|t| t as u64).collect();
        sorted.sort_unstable();
        match last {
            None => Ok(sorted.first().copied()),
            Some(l) => Ok(sorted.into_iter().find(|&t| t > l)),
        }
    }

    fn on_query_current_thread(&self) -> Result<crate::common::ProcessThreadId> {
        let tid = self.current_tid()?;
        Ok(crate::common::ProcessThreadId {
            pid: Some(crate::common::IdKind::Id(self.process()?.pid() as u64)),
            tid: crate::common::IdKind::Id(tid as u64),
        })
    }

    fn on_thread_is_alive(&mut self, ptid: crate::common::ProcessThreadId) -> Result<()> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        self.process()?.thread(tid).map(|_| ()).ok_or(ErrorKind::NotFound)
    }

    fn on_read_general_registers(&mut self, ptid: crate::common::ProcessThreadId) -> Result<Vec<u8>> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        read_registers(tid)
    }

    fn on_write_general_registers(&mut self, ptid: crate::common::ProcessThreadId, regs: &[u8]) -> Result<()> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        write_registers(tid, regs)
    }

    fn on_save_registers(&mut self, ptid: crate::common::ProcessThreadId) -> Result<u64> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        let bytes = read_registers(tid)?;
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.snapshots.insert(id, bytes);
        Ok(id)
    }

    fn on_restore_registers(&mut self, ptid: crate::common::ProcessThreadId, id: u64) -> Result<()> {
        let tid = ptid.tid.id().ok_or(ErrorKind::InvalidArgument)? as i32;
        let bytes = self.snapshots.remove(&id).ok_or(ErrorKind::NotFound)?;
        write_registers(tid, &bytes)
    }

    fn on_read_memory(&mut self, address: Address, length: usize) -> Result<Vec<u8>> {
        self.process()?.read_memory(address, length)
    }

    fn on_write_memory(&mut self, address: Address, data: &[u8]) -> Result<usize> {
        self.process()?.write_memory(address, data)
    }

    fn on_allocate_memory(&mut self, size: u64, permissions: u8) -> Result<Address> {
        let addr = self.process_mut()?.allocate_memory(size, permissions)?;
        self.allocations.insert(addr, size);
        Ok(Address::new(addr))
    }

    fn on_deallocate_memory(&mut self, address: Address) -> Result<()> {
        let size = self
            .allocations
            .remove(&address.value())
            .ok_or(ErrorKind::InvalidArgument)?;
        self.process_mut()?.deallocate_memory(address, size)
    }

    fn on_query_memory_region_info(&self, address: Address) -> Result<MemoryRegionInfo> {
        self.process()?.memory_region_info(address)
    }

    fn on_insert_breakpoint(&mut self, kind: BreakpointType, address: Address, size_hint: u32) -> Result<()> {
        if kind == BreakpointType::Software {
            let opcode = gdbserver_arch::x86_64::X86_64::breakpoint_opcode(size_hint);
            let opcode = opcode.to_vec();
            let pid = nix::unistd::Pid::from_raw(self.process()?.pid());
            let process = self.process_mut()?;
            return process.breakpoints().insert(
                address,
                SiteMode::Exec,
                opcode.len() as u32,
                Lifetime::Permanent,
                &opcode,
                |a, len| crate::target::process::read_memory_at(pid, a, len),
                |a, data| crate::target::process::write_memory_at(pid, a, data),
            );
        }
        #[cfg(target_arch = "x86_64")]
        {
            let watch_kind = match kind {
                BreakpointType::Hardware => crate::target::WatchKind::Execute,
                BreakpointType::WriteWatch => crate::target::WatchKind::Write,
                BreakpointType::ReadWatch | BreakpointType::AccessWatch => crate::target::WatchKind::ReadWrite,
                BreakpointType::Software => unreachable!(),
            };
            let pid = nix::unistd::Pid::from_raw(self.process()?.pid());
            return self.process_mut()?.hw_breakpoints().insert(pid, address, watch_kind, size_hint);
        }
        #[cfg(not(target_arch = "x86_64"))]
        Err(ErrorKind::Unsupported)
    }

    fn on_remove_breakpoint(&mut self, kind: BreakpointType, address: Address, _size_hint: u32) -> Result<()> {
        if kind == BreakpointType::Software {
            let pid = nix::unistd::Pid::from_raw(self.process()?.pid());
            let process = self.process_mut()?;
            return process
                .breakpoints()
                .remove(address, SiteMode::Exec, |a, data| crate::target::process::write_memory_at(pid, a, data));
        }
        #[cfg(target_arch = "x86_64")]
        {
            let pid = nix::unistd::Pid::from_raw(self.process()?.pid());
            return self.process_mut()?.hw_breakpoints().remove(pid, address);
        }
        #[cfg(not(target_arch = "x86_64"))]
        Err(ErrorKind::Unsupported)
    }

    fn on_query_host_info(&self) -> Result<HostInfo> {
        Ok(HostInfo {
            triple: host_triple(),
            cputype: 0,
            cpusubtype: 0,
            os_type: "linux".into(),
            little_endian: true,
            ptrsize: std::mem::size_of::<usize>() as u32,
        })
    }

    fn on_query_register_info(&self, regno: u32) -> Result<RegisterInfo> {
        let table = gdbserver_arch::x86_64::X86_64::register_info();
        let info = table.get(regno as usize).ok_or(ErrorKind::NotFound)?;
        Ok(RegisterInfo {
            regnum: regno,
            name: info.name.to_string(),
            bit_size: info.bit_size,
            offset: info.offset,
            encoding: match info.encoding {
                gdbserver_arch::Encoding::Uint => "uint",
                gdbserver_arch::Encoding::Sint => "sint",
                gdbserver_arch::Encoding::IeeeSingle | gdbserver_arch::Encoding::IeeeDouble => "ieee754",
                gdbserver_arch::Encoding::IeeeExtended => "ieee754",
                gdbserver_arch::Encoding::Vector => "vector",
            },
            format: "hex",
            generic: info.generic.map(|g| match g {
                gdbserver_arch::Generic::Pc => "pc",
                gdbserver_arch::Generic::Sp => "sp",
                gdbserver_arch::Generic::Fp => "fp",
                gdbserver_arch::Generic::Ra => "ra",
                gdbserver_arch::Generic::Flags => "flags",
            }),
            dwarf: info.dwarf,
            eh_frame: info.eh_frame,
            invalidate: info.invalidate.iter().map(|s| s.to_string()).collect(),
            container: info.container.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn on_xfer_read(&mut self, object: &str, _annex: &str, offset: u64, length: u64) -> Result<(Vec<u8>, bool)> {
        let buffer = match object {
            "features" => gdbserver_arch::x86_64::X86_64::target_description_xml().as_bytes().to_vec(),
            "auxv" => self.process()?.auxv_bytes()?,
            "threads" => self.render_threads_xml()?,
            "libraries" => self.render_libraries_xml()?,
            "libraries-svr4" => self.render_libraries_svr4_xml()?,
            "exec-file" => {
                let pid = self.process()?.pid();
                std::fs::read_link(format!("/proc/{}/exe", pid))
                    .map_err(ErrorKind::from)?
                    .to_string_lossy()
                    .into_owned()
                    .into_bytes()
            }
            _ => return Err(ErrorKind::Unsupported),
        };
        page_buffer(&buffer, offset, length)
    }
}

impl DebugSessionImpl {
    fn current_tid_after_attach(&self) -> Result<i32> {
        self.process()?.thread_ids().into_iter().min().ok_or(ErrorKind::NotFound)
    }

    fn apply_action(&mut self, tid: i32, action: &ThreadResumeAction) -> Result<()> {
        let (step, signal) = match action.action {
            ResumeAction::Continue => (false, None),
            ResumeAction::ContinueWithSignal(s) => (false, Some(s as i32)),
            ResumeAction::SingleStep => (true, None),
            ResumeAction::SingleStepWithSignal(s) => (true, Some(s as i32)),
            ResumeAction::Stop => return Err(ErrorKind::Unsupported),
        };
        self.process_mut()?.resume(tid, step, signal)
    }

    /// `qXfer:threads:read`, per `Sources/GDBRemote/DebugSessionImpl.cpp`'s
    /// `onXferRead`.
    fn render_threads_xml(&self) -> Result<Vec<u8>> {
        let process = self.process()?;
        let mut out = String::from("<threads>\n");
        for tid in process.thread_ids() {
            let core = process.thread(tid).and_then(|t| t.stop_info().core).unwrap_or(0);
            out.push_str(&format!(
                "<thread id=\"p{:x}.{:x}\" core=\"{}\"/>\n",
                process.pid(),
                tid,
                core
            ));
        }
        out.push_str("</threads>\n");
        Ok(out.into_bytes())
    }

    /// `qXfer:libraries:read`: the non-svr4, section-oriented rendering.
    /// The main executable is excluded, matching the original's
    /// `if (library.main) return;`.
    fn render_libraries_xml(&self) -> Result<Vec<u8>> {
        let libraries = self.process()?.enumerate_shared_libraries()?;
        let mut out = String::from("<library-list>\n");
        for library in libraries.iter().filter(|l| !l.main_executable) {
            let name = library.path.rsplit('/').next().unwrap_or(&library.path);
            out.push_str(&format!("  <library name=\"{}\">\n", name));
            out.push_str(&format!("    <section address=\"0x{:x}\" />\n", library.base_address));
            out.push_str("  </library>\n");
        }
        out.push_str("</library-list>");
        Ok(out.into_bytes())
    }

    /// `qXfer:libraries-svr4:read`: the link-map-oriented rendering GDB
    /// prefers when it's advertised, carrying `lm`/`l_addr` addresses.
    fn render_libraries_svr4_xml(&self) -> Result<Vec<u8>> {
        let libraries = self.process()?.enumerate_shared_libraries()?;
        let mut main_lm = None;
        let mut entries = String::new();
        for library in &libraries {
            if library.main_executable {
                main_lm = Some(library.base_address);
                continue;
            }
            entries.push_str(&format!(
                "<library name=\"{}\" lm=\"0x{:x}\" l_addr=\"0x{:x}\" l_ld=\"0x0\" />\n",
                library.path, library.base_address, library.base_address
            ));
        }
        let mut out = String::from("<library-list-svr4 version=\"1.0\"");
        if let Some(addr) = main_lm {
            out.push_str(&format!(" main-lm=\"0x{:x}\"", addr));
        }
        out.push_str(">\n");
        out.push_str(&entries);
        out.push_str("</library-list-svr4>");
        Ok(out.into_bytes())
    }
}

/// `qXfer:<object>:read` chunking: the caller's `offset`/`length` window
/// into a fully-rendered buffer, plus whether this chunk reaches the end.
fn page_buffer(buffer: &[u8], offset: u64, length: u64) -> Result<(Vec<u8>, bool)> {
    let offset = offset as usize;
    if offset >= buffer.len() {
        return Ok((Vec::new(), true));
    }
    let end = (offset + length as usize).min(buffer.len());
    Ok((buffer[offset..end].to_vec(), end == buffer.len()))
}

/// `vAttachName`: scan `/proc` for a process whose `comm` matches `name`,
/// preferring the most recently started match when more than one process
/// shares it (mirrors the original's "newest process wins" tie-break for
/// `attach -waitfor`).
fn find_process_by_name(name: &str) -> Result<i32> {
    let mut best: Option<(i32, std::time::SystemTime)> = None;
    let entries = std::fs::read_dir("/proc").map_err(ErrorKind::from)?;
    for entry in entries.flatten() {
        let tid: i32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            Some(tid) => tid,
            None => continue,
        };
        let comm = match std::fs::read_to_string(entry.path().join("comm")) {
            Ok(c) => c.trim_end().to_string(),
            Err(_) => continue,
        };
        if comm != name {
            continue;
        }
        let started = entry.metadata().and_then(|m| m.modified()).unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if best.map(|(_, t)| started > t).unwrap_or(true) {
            best = Some((tid, started));
        }
    }
    best.map(|(tid, _)| tid).ok_or(ErrorKind::NotFound)
}

fn host_triple() -> String {
    #[cfg(target_arch = "x86_64")]
    {
        "x86_64-unknown-linux-gnu".to_string()
    }
    #[cfg(target_arch = "aarch64")]
    {
        "aarch64-unknown-linux-gnu".to_string()
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        "unknown-unknown-linux-gnu".to_string()
    }
}

#[cfg(target_arch = "x86_64")]
fn read_registers(tid: i32) -> Result<Vec<u8>> {
    use gdbserver_arch::Registers;
    let regs = nix::sys::ptrace::getregs(nix::unistd::Pid::from_raw(tid)).map_err(ErrorKind::from)?;
    let x86 = gdbserver_arch::x86_64::X86_64Regs {
        regs: [
            regs.rax, regs.rbx, regs.rcx, regs.rdx, regs.rsi, regs.rdi, regs.rbp, regs.rsp,
            regs.r8, regs.r9, regs.r10, regs.r11, regs.r12, regs.r13, regs.r14, regs.r15,
        ],
        rip: regs.rip,
        eflags: regs.eflags as u32,
        segments: [regs.cs as u32, regs.ss as u32, regs.ds as u32, regs.es as u32, regs.fs as u32, regs.gs as u32],
    };
    let mut buf = vec![0u8; gdbserver_arch::x86_64::X86_64Regs::layout_size()];
    x86.write_bytes(&mut buf);
    Ok(buf)
}

#[cfg(target_arch = "x86_64")]
fn write_registers(tid: i32, bytes: &[u8]) -> Result<()> {
    use gdbserver_arch::Registers;
    let x86 = gdbserver_arch::x86_64::X86_64Regs::read_bytes(bytes).ok_or(ErrorKind::InvalidArgument)?;
    let pid = nix::unistd::Pid::from_raw(tid);
    let mut regs = nix::sys::ptrace::getregs(pid).map_err(ErrorKind::from)?;
    regs.rax = x86.regs[0];
    regs.rbx = x86.regs[1];
    regs.rcx = x86.regs[2];
    regs.rdx = x86.regs[3];
    regs.rsi = x86.regs[4];
    regs.rdi = x86.regs[5];
    regs.rbp = x86.regs[6];
    regs.rsp = x86.regs[7];
    regs.r8 = x86.regs[8];
    regs.r9 = x86.regs[9];
    regs.r10 = x86.regs[10];
    regs.r11 = x86.regs[11];
    regs.r12 = x86.regs[12];
    regs.r13 = x86.regs[13];
    regs.r14 = x86.regs[14];
    regs.r15 = x86.regs[15];
    regs.rip = x86.rip;
    regs.eflags = x86.eflags as u64;
    nix::sys::ptrace::setregs(pid, regs).map_err(ErrorKind::from)
}

#[cfg(not(target_arch = "x86_64"))]
fn read_registers(_tid: i32) -> Result<Vec<u8>> {
    Err(ErrorKind::Unsupported)
}

#[cfg(not(target_arch = "x86_64"))]
fn write_registers(_tid: i32, _bytes: &[u8]) -> Result<()> {
    Err(ErrorKind::Unsupported)
}
