//! `qXfer:auxv:read`: the kernel's own auxiliary vector, unparsed.
//!
//! Grounded on `Sources/Target/POSIX/ELFProcess.cpp`'s `readAuxiliaryVector`,
//! which on Linux just slurps `/proc/<pid>/auxv` rather than reconstructing
//! it from the initial stack layout — the kernel already renders it as a
//! flat array of `Elf64_auxv_t { a_type, a_un }` pairs.

use crate::error::{ErrorKind, Result};

/// Read the raw auxv bytes for `pid`, exactly as the kernel exposes them.
pub fn read(pid: i32) -> Result<Vec<u8>> {
    std::fs::read(format!("/proc/{}/auxv", pid)).map_err(ErrorKind::from)
}
