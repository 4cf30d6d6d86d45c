//! A ptrace-controlled inferior: attach/spawn, wait/resume, memory, and the
//! auxiliary data (`auxv`, shared libraries, memory map) the session layer
//! renders into `qXfer` replies.
//!
//! Grounded on `Sources/Target/Linux/Process.cpp`: `wait()` drives the same
//! `waitpid(-1, __WALL)` loop (any tracee of this process, not just the
//! original thread), lets `PTRACE_EVENT_CLONE` register new threads
//! transparently, and classifies `SIGTRAP` through
//! [`crate::target::thread::classify_trap`] before handing a stop to the
//! caller. Bulk memory access prefers `process_vm_readv` and falls back to
//! `PTRACE_PEEKDATA`; all writes go through `PTRACE_POKEDATA`, since that's
//! the only one of the two that bypasses page-protection bits — required
//! for patching a software breakpoint into read-only code.

use std::collections::HashMap;
use std::convert::TryInto;

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::common::{Address, IdKind, ProcessThreadId};
use crate::error::{ErrorKind, Result};
use crate::session::delegate::{MemoryRegionInfo, StopEvent, StopReason, PROT_EXEC, PROT_READ, PROT_WRITE};
use crate::spawner::Spawner;
use crate::target::breakpoint::{Lifetime, SoftwareBreakpointManager};
#[cfg(target_arch = "x86_64")]
use crate::target::breakpoint::HardwareBreakpointManager;
use crate::target::thread::{classify_trap, Thread};
use crate::target::{auxv, libraries};

/// A traced process and every thread known to be running inside it.
pub struct Process {
    pid: i32,
    attached: bool,
    threads: HashMap<i32, Thread>,
    current_tid: Option<i32>,
    breakpoints: SoftwareBreakpointManager,
    #[cfg(target_arch = "x86_64")]
    hw_breakpoints: HardwareBreakpointManager,
}

impl Process {
    /// Attach to an already-running process. The caller must still consume
    /// the initial stop (the attach itself raises one) via [`Process::wait`]
    /// — `attach` only records it as the thread's starting state.
    pub fn attach(pid: i32) -> Result<Process> {
        let raw = Pid::from_raw(pid);
        ptrace::attach(raw).map_err(ErrorKind::from)?;
        waitpid(raw, None).map_err(ErrorKind::from)?;
        ptrace::setoptions(raw, ptrace::Options::PTRACE_O_TRACECLONE).map_err(ErrorKind::from)?;

        let mut process = Process {
            pid,
            attached: true,
            threads: HashMap::new(),
            current_tid: Some(pid),
            breakpoints: SoftwareBreakpointManager::new(),
            #[cfg(target_arch = "x86_64")]
            hw_breakpoints: HardwareBreakpointManager::new(),
        };
        process.record_initial_stop(pid);
        Ok(process)
    }

    /// Spawn a fresh child per `spawner` (which already performed
    /// `PTRACE_TRACEME` before `exec`) and consume its post-exec stop.
    pub fn spawn(spawner: Spawner) -> Result<Process> {
        let child = spawner.spawn()?;
        waitpid(child, None).map_err(ErrorKind::from)?;
        ptrace::setoptions(child, ptrace::Options::PTRACE_O_TRACECLONE).map_err(ErrorKind::from)?;

        let mut process = Process {
            pid: child.as_raw(),
            attached: false,
            threads: HashMap::new(),
            current_tid: Some(child.as_raw()),
            breakpoints: SoftwareBreakpointManager::new(),
            #[cfg(target_arch = "x86_64")]
            hw_breakpoints: HardwareBreakpointManager::new(),
        };
        process.record_initial_stop(child.as_raw());
        Ok(process)
    }

    fn record_initial_stop(&mut self, tid: i32) {
        let mut thread = Thread::new(Pid::from_raw(tid));
        let ptid = ProcessThreadId {
            pid: Some(IdKind::Id(self.pid as u64)),
            tid: IdKind::Id(tid as u64),
        };
        thread.record_stop(ptid, StopEvent::Stop, StopReason::Trap, Signal::SIGTRAP as i32, 0);
        self.threads.insert(tid, thread);
    }

    /// This process's id.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Whether this process was attached to (vs. spawned by the server).
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// A known thread by tid.
    pub fn thread(&self, tid: i32) -> Option<&Thread> {
        self.threads.get(&tid)
    }

    /// Every known thread's tid.
    pub fn thread_ids(&self) -> Vec<i32> {
        self.threads.keys().copied().collect()
    }

    /// The thread a bare (no-ptid) packet should target.
    pub fn current_thread(&self) -> Option<&Thread> {
        self.current_tid.and_then(|tid| self.threads.get(&tid))
    }

    /// The software breakpoint side table.
    pub fn breakpoints(&mut self) -> &mut SoftwareBreakpointManager {
        &mut self.breakpoints
    }

    /// The hardware breakpoint/watchpoint debug-register slots.
    #[cfg(target_arch = "x86_64")]
    pub fn hw_breakpoints(&mut self) -> &mut HardwareBreakpointManager {
        &mut self.hw_breakpoints
    }

    /// `D`: detach every known thread, optionally leaving the process group
    /// stopped rather than letting it run free.
    pub fn detach(&mut self, stay_stopped: bool) -> Result<()> {
        let sig = if stay_stopped { Some(Signal::SIGSTOP) } else { None };
        for tid in self.thread_ids() {
            let _ = ptrace::detach(Pid::from_raw(tid), sig);
        }
        Ok(())
    }

    /// `k`: kill the whole process and reap it.
    pub fn terminate(&mut self) -> Result<()> {
        nix::sys::signal::kill(Pid::from_raw(self.pid), Signal::SIGKILL).map_err(ErrorKind::from)?;
        let _ = waitpid(Pid::from_raw(self.pid), None);
        Ok(())
    }

    /// `c`/`s`/`vCont`: resume one thread, optionally single-stepping and/or
    /// delivering a signal.
    pub fn resume(&mut self, tid: i32, step: bool, signal: Option<i32>) -> Result<()> {
        let pid = Pid::from_raw(tid);
        let sig = signal.and_then(|s| Signal::try_from(s).ok());
        if step {
            ptrace::step(pid, sig).map_err(ErrorKind::from)?;
        } else {
            ptrace::cont(pid, sig).map_err(ErrorKind::from)?;
        }
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.mark_running();
        }
        self.current_tid = Some(tid);
        Ok(())
    }

    /// Block until some thread of this process changes state, registering
    /// any newly cloned thread transparently and classifying `SIGTRAP`
    /// stops (breakpoint vs. trace vs. plain trap) before returning.
    /// Returns the tid that stopped.
    pub fn wait(&mut self) -> Result<i32> {
        loop {
            let status = waitpid(Pid::from_raw(-1), Some(WaitPidFlag::__WALL)).map_err(ErrorKind::from)?;
            match status {
                WaitStatus::PtraceEvent(pid, _sig, event) if event == libc::PTRACE_EVENT_CLONE => {
                    if let Ok(new_tid) = ptrace::getevent(pid) {
                        self.threads
                            .entry(new_tid as i32)
                            .or_insert_with(|| Thread::new(Pid::from_raw(new_tid as i32)));
                    }
                    let _ = ptrace::cont(pid, None);
                }
                WaitStatus::Stopped(pid, Signal::SIGTRAP) => {
                    let tid = pid.as_raw();
                    self.ensure_thread(tid);
                    let reason = self.classify_and_rewind(pid);
                    self.record(tid, StopEvent::Stop, reason, Signal::SIGTRAP as i32, 0);
                    self.current_tid = Some(tid);
                    return Ok(tid);
                }
                WaitStatus::Stopped(pid, sig) => {
                    let tid = pid.as_raw();
                    self.ensure_thread(tid);
                    self.record(tid, StopEvent::Stop, StopReason::SignalStop, sig as i32, 0);
                    self.current_tid = Some(tid);
                    return Ok(tid);
                }
                WaitStatus::Exited(pid, code) => {
                    let tid = pid.as_raw();
                    self.ensure_thread(tid);
                    self.record(tid, StopEvent::Exit, StopReason::None, 0, code);
                    self.current_tid = Some(tid);
                    return Ok(tid);
                }
                WaitStatus::Signaled(pid, sig, _) => {
                    let tid = pid.as_raw();
                    self.ensure_thread(tid);
                    self.record(tid, StopEvent::Kill, StopReason::None, sig as i32, 0);
                    self.current_tid = Some(tid);
                    return Ok(tid);
                }
                _ => continue,
            }
        }
    }

    fn ensure_thread(&mut self, tid: i32) {
        self.threads.entry(tid).or_insert_with(|| Thread::new(Pid::from_raw(tid)));
    }

    fn record(&mut self, tid: i32, event: StopEvent, reason: StopReason, signal: i32, status: i32) {
        let ptid = ProcessThreadId {
            pid: Some(IdKind::Id(self.pid as u64)),
            tid: IdKind::Id(tid as u64),
        };
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.record_stop(ptid, event, reason, signal, status);
        }
    }

    /// Classify a `SIGTRAP`, and if it lands on an installed software
    /// breakpoint's trap byte, rewind the pc past it so the client sees the
    /// original instruction address.
    #[cfg(target_arch = "x86_64")]
    fn classify_and_rewind(&mut self, pid: Pid) -> StopReason {
        if let Ok(regs) = ptrace::getregs(pid) {
            let trap_address = regs.rip.wrapping_sub(1);
            if self.breakpoints.hit(trap_address).is_some() {
                let mut regs = regs;
                regs.rip = trap_address;
                let _ = ptrace::setregs(pid, regs);
                return StopReason::Breakpoint;
            }
        }
        classify_trap(pid)
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn classify_and_rewind(&mut self, pid: Pid) -> StopReason {
        classify_trap(pid)
    }

    /// `m`: read `length` bytes at `address` from this process.
    pub fn read_memory(&self, address: Address, length: usize) -> Result<Vec<u8>> {
        read_memory_at(Pid::from_raw(self.pid), address, length)
    }

    /// `M`/`X`: write `data` at `address` in this process.
    pub fn write_memory(&self, address: Address, data: &[u8]) -> Result<usize> {
        write_memory_at(Pid::from_raw(self.pid), address, data)?;
        Ok(data.len())
    }

    /// `_M`: inject a remote `mmap` for `size` bytes with the given
    /// `protection` bits (`PROT_READ`/`PROT_WRITE`/`PROT_EXEC`).
    #[cfg(target_arch = "x86_64")]
    pub fn allocate_memory(&mut self, size: u64, permissions: u8) -> Result<u64> {
        let prot = (permissions & (PROT_READ | PROT_WRITE | PROT_EXEC)) as u64;
        let flags = (libc::MAP_PRIVATE | libc::MAP_ANONYMOUS) as u64;
        let result = remote_syscall(
            Pid::from_raw(self.pid),
            libc::SYS_mmap as u64,
            [0, size, prot, flags, u64::MAX, 0],
        )?;
        if result < 0 {
            return Err(ErrorKind::NoMemory);
        }
        Ok(result as u64)
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn allocate_memory(&mut self, _size: u64, _permissions: u8) -> Result<u64> {
        Err(ErrorKind::Unsupported)
    }

    /// `_m`: inject a remote `munmap` for a region previously returned by
    /// [`Process::allocate_memory`].
    #[cfg(target_arch = "x86_64")]
    pub fn deallocate_memory(&mut self, address: Address, size: u64) -> Result<()> {
        let result = remote_syscall(Pid::from_raw(self.pid), libc::SYS_munmap as u64, [address.value(), size, 0, 0, 0, 0])?;
        if result != 0 {
            return Err(ErrorKind::InvalidAddress);
        }
        Ok(())
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn deallocate_memory(&mut self, _address: Address, _size: u64) -> Result<()> {
        Err(ErrorKind::Unsupported)
    }

    /// `qMemoryRegionInfo`: the mapping (or unmapped gap) containing
    /// `address`, from `/proc/<pid>/maps`.
    pub fn memory_region_info(&self, address: Address) -> Result<MemoryRegionInfo> {
        let maps = std::fs::read_to_string(format!("/proc/{}/maps", self.pid)).map_err(ErrorKind::from)?;
        let mut regions: Vec<MemoryRegionInfo> = maps.lines().filter_map(parse_maps_line).collect();
        regions.sort_by_key(|r| r.start);

        let addr = address.value();
        if let Some(region) = regions.iter().find(|r| addr >= r.start && addr < r.start + r.length) {
            return Ok(region.clone());
        }
        if let Some(next) = regions.iter().find(|r| r.start > addr) {
            return Ok(MemoryRegionInfo {
                start: addr,
                length: next.start - addr,
                protection: 0,
                backing_file: None,
                backing_file_offset: 0,
                backing_file_inode: 0,
            });
        }
        Ok(MemoryRegionInfo {
            start: addr,
            length: u64::MAX - addr,
            protection: 0,
            backing_file: None,
            backing_file_offset: 0,
            backing_file_inode: 0,
        })
    }

    /// `qXfer:auxv:read`.
    pub fn auxv_bytes(&self) -> Result<Vec<u8>> {
        auxv::read(self.pid)
    }

    /// `qXfer:libraries[-svr4]:read`.
    pub fn enumerate_shared_libraries(&self) -> Result<Vec<crate::session::delegate::SharedLibraryInfo>> {
        libraries::enumerate(self.pid)
    }
}

fn parse_maps_line(line: &str) -> Option<MemoryRegionInfo> {
    let mut parts = line.split_whitespace();
    let range = parts.next()?;
    let perms = parts.next()?;
    let offset = u64::from_str_radix(parts.next()?, 16).ok()?;
    let _dev = parts.next()?;
    let inode = parts.next()?.parse().ok()?;
    let rest: Vec<&str> = parts.collect();
    let path = if rest.is_empty() { None } else { Some(rest.join(" ")) };

    let (start_str, end_str) = range.split_once('-')?;
    let start = u64::from_str_radix(start_str, 16).ok()?;
    let end = u64::from_str_radix(end_str, 16).ok()?;

    let perm_bytes = perms.as_bytes();
    let mut protection = 0u8;
    if perm_bytes.first() == Some(&b'r') {
        protection |= PROT_READ;
    }
    if perm_bytes.get(1) == Some(&b'w') {
        protection |= PROT_WRITE;
    }
    if perm_bytes.get(2) == Some(&b'x') {
        protection |= PROT_EXEC;
    }

    Some(MemoryRegionInfo {
        start,
        length: end - start,
        protection,
        backing_file: path,
        backing_file_offset: offset,
        backing_file_inode: inode,
    })
}

/// Read `length` bytes at `address` from `pid`'s memory: `process_vm_readv`
/// first, falling back to word-at-a-time `PTRACE_PEEKDATA` if that fails
/// (e.g. a kernel built without cross-memory-attach support).
pub fn read_memory_at(pid: Pid, address: Address, length: usize) -> Result<Vec<u8>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let mut buf = vec![0u8; length];
    let remote = [nix::sys::uio::RemoteIoVec {
        base: address.value() as usize,
        len: length,
    }];
    let read_via_vm = {
        let mut local = [std::io::IoSliceMut::new(&mut buf)];
        nix::sys::uio::process_vm_readv(pid, &mut local, &remote)
    };
    match read_via_vm {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(_) => read_memory_ptrace(pid, address.value(), length),
    }
}

fn read_memory_ptrace(pid: Pid, address: u64, length: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(length);
    let mut cur = address;
    while out.len() < length {
        let word = ptrace::read(pid, cur as ptrace::AddressType).map_err(ErrorKind::from)?;
        let bytes = word.to_ne_bytes();
        let take = (length - out.len()).min(bytes.len());
        out.extend_from_slice(&bytes[..take]);
        cur += bytes.len() as u64;
    }
    Ok(out)
}

/// Write `data` at `address` in `pid`'s memory via `PTRACE_POKEDATA`,
/// word-at-a-time — the only mechanism that bypasses page-protection bits,
/// needed to patch a software breakpoint into read-only code.
pub fn write_memory_at(pid: Pid, address: Address, data: &[u8]) -> Result<()> {
    let word_size = std::mem::size_of::<usize>();
    let base = address.value();
    let mut offset = 0usize;
    while offset < data.len() {
        let word_addr = base + offset as u64;
        let remaining = data.len() - offset;
        let word = if remaining >= word_size {
            i64::from_ne_bytes(data[offset..offset + word_size].try_into().map_err(|_| ErrorKind::Unknown)?)
        } else {
            let existing = ptrace::read(pid, word_addr as ptrace::AddressType).map_err(ErrorKind::from)?;
            let mut bytes = existing.to_ne_bytes();
            bytes[..remaining].copy_from_slice(&data[offset..]);
            i64::from_ne_bytes(bytes)
        };
        unsafe { ptrace::write(pid, word_addr as ptrace::AddressType, word as *mut libc::c_void) }
            .map_err(ErrorKind::from)?;
        offset += word_size;
    }
    Ok(())
}

/// Inject and run a single syscall in the tracee: patch `syscall; int3` in
/// at the current pc, set up argument registers, run to the trap, read the
/// return value from `rax`, then restore the original bytes and registers.
#[cfg(target_arch = "x86_64")]
fn remote_syscall(pid: Pid, nr: u64, args: [u64; 6]) -> Result<i64> {
    let saved_regs = ptrace::getregs(pid).map_err(ErrorKind::from)?;
    let mut regs = saved_regs;
    regs.rax = nr;
    regs.rdi = args[0];
    regs.rsi = args[1];
    regs.rdx = args[2];
    regs.r10 = args[3];
    regs.r8 = args[4];
    regs.r9 = args[5];
    ptrace::setregs(pid, regs).map_err(ErrorKind::from)?;

    let inject_at = Address::new(saved_regs.rip);
    let original = read_memory_at(pid, inject_at, 3)?;
    write_memory_at(pid, inject_at, &[0x0f, 0x05, 0xcc])?;

    let run_result = (|| -> Result<i64> {
        ptrace::cont(pid, None).map_err(ErrorKind::from)?;
        waitpid(pid, None).map_err(ErrorKind::from)?;
        let after = ptrace::getregs(pid).map_err(ErrorKind::from)?;
        Ok(after.rax as i64)
    })();

    write_memory_at(pid, inject_at, &original)?;
    ptrace::setregs(pid, saved_regs).map_err(ErrorKind::from)?;
    run_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_parses_permissions_and_range() {
        let line = "556dcb9c1000-556dcb9c3000 r-xp 00001000 08:01 123456 /bin/cat";
        let region = parse_maps_line(line).unwrap();
        assert_eq!(region.start, 0x556dcb9c1000);
        assert_eq!(region.length, 0x2000);
        assert_eq!(region.protection, PROT_READ | PROT_EXEC);
        assert_eq!(region.backing_file.as_deref(), Some("/bin/cat"));
        assert_eq!(region.backing_file_inode, 123456);
    }

    #[test]
    fn maps_line_without_path_has_no_backing_file() {
        let line = "7ffd12345000-7ffd12366000 rw-p 00000000 00:00 0";
        let region = parse_maps_line(line).unwrap();
        assert_eq!(region.backing_file, None);
    }
}
