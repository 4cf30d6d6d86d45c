//! Breakpoint bookkeeping: software sites via opcode patch/restore over a
//! side table, and (x86_64 only) hardware breakpoints/watchpoints via the
//! debug registers.
//!
//! Grounded on `Sources/Core/SoftwareBreakpointManager.cpp`'s `enable`/
//! `disable`: a site's original bytes are read and stashed before the
//! trap opcode is written, and restored verbatim on removal. Memory access
//! is injected as closures rather than a direct `Process` reference so this
//! module stays free of ptrace/ELF concerns entirely. [`HardwareBreakpointManager`]
//! is grounded on `Sources/Target/Linux/X86_64/HardwareBreakpointManager.cpp`,
//! which programs `DR0`-`DR3`/`DR7` through `PTRACE_POKEUSER` at the kernel's
//! documented `struct user.u_debugreg` offset.

use std::collections::HashMap;

use crate::common::Address;
use crate::error::{ErrorKind, Result};

/// What kind of access a site traps on. `Exec` is a software `int3`-style
/// breakpoint; the watchpoint variants are handled by
/// [`HardwareBreakpointManager`] on x86_64 rather than by this manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteMode {
    /// Traps when the CPU fetches an instruction at the address.
    Exec,
    /// Traps on a load from the address (unimplemented).
    Read,
    /// Traps on a store to the address (unimplemented).
    Write,
    /// Traps on either (unimplemented).
    ReadWrite,
}

/// Whether a site survives a single hit or persists until explicitly removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Stays installed until `remove` is called.
    Permanent,
    /// Removed automatically the first time it's hit (unused by the
    /// `Z0`/`z0` handlers, which always install `Permanent` sites, but
    /// kept for parity with the original's `kLifetimeTemporaryUntilHit`).
    TempOneShot,
}

#[derive(Debug, Clone)]
struct Site {
    mode: SiteMode,
    lifetime: Lifetime,
    original_bytes: Vec<u8>,
}

/// A side table of installed software breakpoints, keyed by address.
#[derive(Debug, Default)]
pub struct SoftwareBreakpointManager {
    sites: HashMap<u64, Site>,
}

impl SoftwareBreakpointManager {
    /// An empty manager.
    pub fn new() -> Self {
        SoftwareBreakpointManager {
            sites: HashMap::new(),
        }
    }

    /// Install a site: read and stash the `opcode.len()` bytes currently at
    /// `address`, then overwrite them with `opcode`. A second insert at the
    /// same address is a no-op success, matching `Z0` being sent twice for
    /// the same location (some clients do this defensively).
    pub fn insert(
        &mut self,
        address: Address,
        mode: SiteMode,
        size: u32,
        lifetime: Lifetime,
        opcode: &[u8],
        read_fn: impl Fn(Address, usize) -> Result<Vec<u8>>,
        write_fn: impl Fn(Address, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let _ = size;
        if self.sites.contains_key(&address.value()) {
            return Ok(());
        }
        let original = read_fn(address, opcode.len())?;
        write_fn(address, opcode)?;
        self.sites.insert(
            address.value(),
            Site {
                mode,
                lifetime,
                original_bytes: original,
            },
        );
        Ok(())
    }

    /// Remove a site: restore its original bytes. Removing an address with
    /// no installed site of `mode` is an error (`z0` on an address never
    /// `Z0`'d).
    pub fn remove(
        &mut self,
        address: Address,
        mode: SiteMode,
        write_fn: impl Fn(Address, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let site = self
            .sites
            .get(&address.value())
            .filter(|s| s.mode == mode)
            .ok_or(ErrorKind::InvalidArgument)?;
        write_fn(address, &site.original_bytes)?;
        self.sites.remove(&address.value());
        Ok(())
    }

    /// Whether `address` currently has an installed `Exec` site — used by
    /// `Process::wait` to decide whether a `SIGTRAP` at `pc - 1` is a
    /// breakpoint hit worth rewinding the pc for.
    pub fn hit(&mut self, address: u64) -> Option<Lifetime> {
        let site = self.sites.get(&address)?;
        if site.mode != SiteMode::Exec {
            return None;
        }
        let lifetime = site.lifetime;
        if lifetime == Lifetime::TempOneShot {
            self.sites.remove(&address);
        }
        Some(lifetime)
    }
}

/// Which access a hardware watchpoint slot traps on, per `DR7`'s two-bit
/// `R/W` condition field (`00` execute is a plain breakpoint, not a
/// watchpoint, and needs `LEN` forced to `00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Execute,
    Write,
    ReadWrite,
}

impl WatchKind {
    fn rw_bits(self) -> u64 {
        match self {
            WatchKind::Execute => 0b00,
            WatchKind::Write => 0b01,
            WatchKind::ReadWrite => 0b11,
        }
    }
}

/// `struct user.u_debugreg`'s byte offset in the x86_64 Linux ptrace `USER`
/// area (`sys/user.h`'s `struct user`, after `user_regs_struct`, `u_fpvalid`,
/// `user_fpregs_struct`, and the bookkeeping fields preceding it).
#[cfg(target_arch = "x86_64")]
const DEBUGREG_OFFSET: i64 = 848;

/// x86_64 hardware breakpoints/watchpoints: up to four slots (`DR0`-`DR3`),
/// armed and sized through the control register `DR7`. Unlike software
/// sites these don't touch the tracee's instruction stream, so they work on
/// read-only text and don't require a resume-past-trap step.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default)]
pub struct HardwareBreakpointManager {
    slots: [Option<(u64, WatchKind, u32)>; 4],
}

#[cfg(target_arch = "x86_64")]
impl HardwareBreakpointManager {
    pub fn new() -> Self {
        HardwareBreakpointManager { slots: [None; 4] }
    }

    /// Arm a free slot for `address`, writing `DRn` then the updated `DR7`.
    pub fn insert(
        &mut self,
        pid: nix::unistd::Pid,
        address: Address,
        kind: WatchKind,
        len: u32,
    ) -> Result<()> {
        if self.slots.iter().any(|s| s.map(|(a, ..)| a) == Some(address.value())) {
            return Ok(());
        }
        let slot = self.slots.iter().position(|s| s.is_none()).ok_or(ErrorKind::NoMemory)?;
        poke_debugreg(pid, slot as i64, address.value() as i64)?;
        self.slots[slot] = Some((address.value(), kind, len));
        poke_debugreg(pid, 7, self.build_dr7() as i64)
    }

    /// Disarm the slot watching `address`.
    pub fn remove(&mut self, pid: nix::unistd::Pid, address: Address) -> Result<()> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.map(|(a, ..)| a) == Some(address.value()))
            .ok_or(ErrorKind::InvalidArgument)?;
        self.slots[slot] = None;
        poke_debugreg(pid, slot as i64, 0)?;
        poke_debugreg(pid, 7, self.build_dr7() as i64)
    }

    /// Which slot's address matches `DR6`'s reported trap, if any, for
    /// reporting a watchpoint hit back as the faulting address.
    pub fn slot_address(&self, index: usize) -> Option<u64> {
        self.slots.get(index).copied().flatten().map(|(a, ..)| a)
    }

    fn build_dr7(&self) -> u64 {
        let mut dr7 = 0u64;
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some((_, kind, len)) = slot {
                dr7 |= 1 << (i * 2); // local enable bit
                let len_bits: u64 = match len {
                    1 => 0b00,
                    2 => 0b01,
                    8 => 0b10,
                    _ => 0b11, // 4 bytes, also used for Execute (LEN must be 00 there)
                };
                let len_bits = if *kind == WatchKind::Execute { 0 } else { len_bits };
                dr7 |= kind.rw_bits() << (16 + i * 4);
                dr7 |= len_bits << (18 + i * 4);
            }
        }
        dr7
    }
}

#[cfg(target_arch = "x86_64")]
fn poke_debugreg(pid: nix::unistd::Pid, index: i64, value: i64) -> Result<()> {
    let offset = DEBUGREG_OFFSET + index * 8;
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEUSER,
            pid.as_raw(),
            offset as *mut libc::c_void,
            value as *mut libc::c_void,
        )
    };
    if ret == -1 {
        Err(ErrorKind::from(nix::errno::Errno::last()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn insert_stashes_original_bytes_and_patches() {
        let memory = RefCell::new(vec![0x90u8; 16]);
        let mut mgr = SoftwareBreakpointManager::new();
        mgr.insert(
            Address::new(4),
            SiteMode::Exec,
            1,
            Lifetime::Permanent,
            &[0xCC],
            |addr, len| Ok(memory.borrow()[addr.value() as usize..addr.value() as usize + len].to_vec()),
            |addr, data| {
                memory.borrow_mut()[addr.value() as usize..addr.value() as usize + data.len()]
                    .copy_from_slice(data);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(memory.borrow()[4], 0xCC);
        assert!(mgr.hit(4).is_some());
    }

    #[test]
    fn remove_restores_original_bytes() {
        let memory = RefCell::new(vec![0x90u8; 16]);
        let mut mgr = SoftwareBreakpointManager::new();
        let read = |addr: Address, len: usize| {
            Ok(memory.borrow()[addr.value() as usize..addr.value() as usize + len].to_vec())
        };
        mgr.insert(Address::new(4), SiteMode::Exec, 1, Lifetime::Permanent, &[0xCC], read, |addr, data| {
            memory.borrow_mut()[addr.value() as usize..addr.value() as usize + data.len()]
                .copy_from_slice(data);
            Ok(())
        })
        .unwrap();
        mgr.remove(Address::new(4), SiteMode::Exec, |addr, data| {
            memory.borrow_mut()[addr.value() as usize..addr.value() as usize + data.len()]
                .copy_from_slice(data);
            Ok(())
        })
        .unwrap();
        assert_eq!(memory.borrow()[4], 0x90);
    }

    #[test]
    fn remove_unknown_site_is_invalid_argument() {
        let mut mgr = SoftwareBreakpointManager::new();
        let err = mgr.remove(Address::new(99), SiteMode::Exec, |_, _| Ok(())).unwrap_err();
        assert_eq!(err, ErrorKind::InvalidArgument);
    }
}
