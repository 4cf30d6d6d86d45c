//! Shared library enumeration via the SVR4 `r_debug`/`link_map` protocol.
//!
//! Grounded on `Sources/Target/POSIX/ELFProcess.cpp`'s
//! `GetELFSharedLibraryInfoAddress` (locate `DT_DEBUG` in the on-disk ELF's
//! `.dynamic` section) and `EnumerateLinkMap` (walk the runtime `link_map`
//! list through the tracee's memory once `r_debug.r_map` is known). The
//! load bias is computed generically — lowest mapped address for the
//! executable's path in `/proc/<pid>/maps`, minus the lowest `PT_LOAD`
//! segment's `p_vaddr` — so it comes out `0` for a non-PIE `ET_EXEC` and
//! the actual randomized base for a PIE `ET_DYN`.

use goblin::elf::program_header::{PT_DYNAMIC, PT_LOAD};
use goblin::elf::Elf;
use nix::unistd::Pid;

use crate::common::Address;
use crate::error::{ErrorKind, Result};
use crate::session::delegate::SharedLibraryInfo;
use crate::target::process::read_memory_at;

/// `DT_DEBUG`: the `.dynamic` tag whose `d_ptr` the runtime linker fills in
/// with the address of `struct r_debug`.
const DT_DEBUG: u64 = 21;
/// Bytes per `Elf64_Dyn` entry (`d_tag: i64`, `d_un: u64`).
const DYN_ENTRY_SIZE: u64 = 16;
/// `struct r_debug`'s `r_map` field offset (`int r_version` at 0, padded to
/// 8 for the following pointer).
const R_DEBUG_R_MAP_OFFSET: u64 = 8;
/// `struct link_map` layout: `l_addr`, `l_name`, `l_ld`, `l_next`, `l_prev`,
/// each a 64-bit field.
const LINK_MAP_SIZE: usize = 40;
const LINK_MAP_L_NAME_OFFSET: usize = 8;
const LINK_MAP_L_NEXT_OFFSET: usize = 24;
/// Hard cap on link_map traversal and C-string length, guarding against a
/// corrupted or cyclic list in the tracee.
const MAX_LIBRARIES: usize = 4096;
const MAX_NAME_LEN: u64 = 4096;

/// Enumerate every shared library (plus the main executable) currently
/// mapped into `pid`.
pub fn enumerate(pid: i32) -> Result<Vec<SharedLibraryInfo>> {
    let exe_path = std::fs::read_link(format!("/proc/{}/exe", pid)).map_err(ErrorKind::from)?;
    let exe_path = exe_path.to_string_lossy().into_owned();
    let file = std::fs::read(&exe_path).map_err(ErrorKind::from)?;
    let elf = Elf::parse(&file).map_err(|_| ErrorKind::Unknown)?;

    let dynamic_vaddr = elf
        .program_headers
        .iter()
        .find(|ph| ph.p_type == PT_DYNAMIC)
        .map(|ph| ph.p_vaddr)
        .ok_or(ErrorKind::NotFound)?;
    let lowest_load_vaddr = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD)
        .map(|ph| ph.p_vaddr)
        .min()
        .unwrap_or(0);

    let dynamic = elf.dynamic.as_ref().ok_or(ErrorKind::NotFound)?;
    let debug_index = dynamic
        .dyns
        .iter()
        .position(|d| d.d_tag == DT_DEBUG)
        .ok_or(ErrorKind::NotFound)?;
    let debug_entry_vaddr = dynamic_vaddr + debug_index as u64 * DYN_ENTRY_SIZE + 8;

    let bias = load_bias(pid, &exe_path, lowest_load_vaddr)?;
    let pid_t = Pid::from_raw(pid);

    let r_debug_ptr_bytes = read_memory_at(pid_t, Address::new(debug_entry_vaddr + bias), 8)?;
    let r_debug_addr = u64::from_le_bytes(r_debug_ptr_bytes.try_into().map_err(|_| ErrorKind::Unknown)?);
    if r_debug_addr == 0 {
        return Ok(vec![SharedLibraryInfo {
            path: exe_path,
            base_address: bias,
            main_executable: true,
        }]);
    }

    let r_debug = read_memory_at(pid_t, Address::new(r_debug_addr), 16)?;
    let mut link_map = u64::from_le_bytes(
        r_debug[R_DEBUG_R_MAP_OFFSET as usize..R_DEBUG_R_MAP_OFFSET as usize + 8]
            .try_into()
            .map_err(|_| ErrorKind::Unknown)?,
    );

    let mut libraries = Vec::new();
    let mut seen = 0;
    while link_map != 0 && seen < MAX_LIBRARIES {
        seen += 1;
        let node = read_memory_at(pid_t, Address::new(link_map), LINK_MAP_SIZE)?;
        let l_addr = u64::from_le_bytes(node[0..8].try_into().map_err(|_| ErrorKind::Unknown)?);
        let l_name_ptr = u64::from_le_bytes(
            node[LINK_MAP_L_NAME_OFFSET..LINK_MAP_L_NAME_OFFSET + 8]
                .try_into()
                .map_err(|_| ErrorKind::Unknown)?,
        );
        let l_next = u64::from_le_bytes(
            node[LINK_MAP_L_NEXT_OFFSET..LINK_MAP_L_NEXT_OFFSET + 8]
                .try_into()
                .map_err(|_| ErrorKind::Unknown)?,
        );

        let name = read_cstring(pid_t, l_name_ptr)?;
        let main_executable = name.is_empty();
        libraries.push(SharedLibraryInfo {
            path: if main_executable { exe_path.clone() } else { name },
            base_address: l_addr,
            main_executable,
        });
        link_map = l_next;
    }
    Ok(libraries)
}

/// The executable's load bias: the lowest address it's mapped at in
/// `/proc/<pid>/maps`, minus its lowest `PT_LOAD` segment's link-time
/// `p_vaddr`. Zero for a non-PIE binary, the kernel's randomized base for a
/// PIE one.
fn load_bias(pid: i32, exe_path: &str, lowest_load_vaddr: u64) -> Result<u64> {
    let maps = std::fs::read_to_string(format!("/proc/{}/maps", pid)).map_err(ErrorKind::from)?;
    let mut lowest_mapped: Option<u64> = None;
    for line in maps.lines() {
        let mut fields = line.splitn(6, ' ');
        let range = fields.next().unwrap_or("");
        for _ in 0..4 {
            fields.next();
        }
        let path = fields.next().unwrap_or("").trim();
        if path != exe_path {
            continue;
        }
        if let Some((start, _)) = range.split_once('-') {
            if let Ok(start) = u64::from_str_radix(start, 16) {
                lowest_mapped = Some(lowest_mapped.map_or(start, |m| m.min(start)));
            }
        }
    }
    Ok(lowest_mapped.unwrap_or(0).saturating_sub(lowest_load_vaddr))
}

/// Read a NUL-terminated string out of the tracee's memory, 64 bytes at a
/// time, capped at [`MAX_NAME_LEN`].
fn read_cstring(pid: Pid, addr: u64) -> Result<String> {
    if addr == 0 {
        return Ok(String::new());
    }
    let mut out = Vec::new();
    let mut offset = 0u64;
    while offset < MAX_NAME_LEN {
        let chunk = read_memory_at(pid, Address::new(addr + offset), 64)?;
        if chunk.is_empty() {
            break;
        }
        if let Some(pos) = chunk.iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..pos]);
            return Ok(String::from_utf8_lossy(&out).into_owned());
        }
        out.extend_from_slice(&chunk);
        offset += 64;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}
