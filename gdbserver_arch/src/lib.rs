//! Register layouts and wire encodings for the architectures `gdbserver`
//! supports.
//!
//! Each supported architecture exports a `Registers` type (the contiguous
//! `g`/`G` packet layout LLDB and GDB expect) and a static [`RegisterInfo`]
//! table describing every register in that layout: its bit size, encoding,
//! byte offset, and the various numbering schemes (DWARF, eh_frame, GDB,
//! LLDB) debuggers use to refer to it by number rather than by name.
//!
//! This crate hand-writes the two tables it ships (x86-64, AArch64) rather
//! than generating them from an architecture description file — the
//! generator itself is out of scope for `gdbserver` (see the root crate's
//! `SPEC_FULL.md`), but the table shape mirrors what such a generator would
//! produce.

#![deny(missing_docs)]

pub mod aarch64;
pub mod x86_64;

/// How a register's raw bytes should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain unsigned integer.
    Uint,
    /// Plain signed integer.
    Sint,
    /// IEEE-754 single precision float.
    IeeeSingle,
    /// IEEE-754 double precision float.
    IeeeDouble,
    /// x87 80-bit extended precision float.
    IeeeExtended,
    /// SIMD / vector register, no scalar interpretation.
    Vector,
}

/// A generic, architecture-independent register role.
///
/// GDB/LLDB allow a target description to tag a handful of registers with a
/// generic name so that frontend tooling (backtraces, `finish`, `return`)
/// doesn't need per-architecture knowledge of which concrete register holds
/// the program counter, stack pointer, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generic {
    /// Program counter / instruction pointer.
    Pc,
    /// Stack pointer.
    Sp,
    /// Frame pointer.
    Fp,
    /// Return address.
    Ra,
    /// Processor flags / status register.
    Flags,
}

/// Static description of a single architectural register.
///
/// One `RegisterInfo` exists per register in an architecture's `Registers`
/// layout; the table as a whole is what `qRegisterInfo` and the generated
/// `target.xml` (`qXfer:features:read`) are built from.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    /// Register name, as it appears in `target.xml` and `qRegisterInfo` replies.
    pub name: &'static str,
    /// Size of the register in bits.
    pub bit_size: u32,
    /// Byte offset of this register within the contiguous `g`/`G` layout.
    pub offset: u32,
    /// How the raw bytes should be interpreted.
    pub encoding: Encoding,
    /// DWARF register number, if one is assigned.
    pub dwarf: Option<u32>,
    /// eh_frame register number, if one is assigned (often equal to `dwarf`,
    /// but not guaranteed to be).
    pub eh_frame: Option<u32>,
    /// GDB register number (position in the architecture's `target.xml`).
    pub gdb: u32,
    /// LLDB register number (position in the contiguous layout; almost
    /// always equal to `gdb`, but kept distinct since the two dialects are
    /// not contractually obligated to agree).
    pub lldb: u32,
    /// Generic role, if any.
    pub generic: Option<Generic>,
    /// Registers that must be treated as stale after writing this one (e.g.
    /// writing a sub-register invalidates its containing register).
    pub invalidate: &'static [&'static str],
    /// The register(s) that contain this one, if it is a sub-register.
    pub container: &'static [&'static str],
}

/// Encodes architecture-specific information: pointer size, register layout,
/// and the breakpoint "kind" argument the wire protocol's `Z`/`z` packets
/// carry (e.g. ARM Thumb instruction size).
pub trait Arch {
    /// The architecture's pointer-sized integer type.
    type Usize: Copy
        + core::fmt::Debug
        + core::ops::Add<Output = Self::Usize>
        + core::ops::Sub<Output = Self::Usize>
        + PartialOrd
        + Eq;

    /// The contiguous register file exchanged by `g`/`G`.
    type Registers: Registers;

    /// The static table of per-register metadata, in `g`/`G` order.
    fn register_info() -> &'static [RegisterInfo];

    /// The target description XML served by `qXfer:features:read`.
    fn target_description_xml() -> &'static str;

    /// Software breakpoint opcode for the given `kind` (e.g. Thumb vs ARM
    /// instruction width). Most architectures ignore `kind` and return a
    /// single fixed opcode.
    fn breakpoint_opcode(kind: u32) -> &'static [u8];
}

/// Read/write access to a contiguous register file, in the byte order and
/// layout order a `g`/`G` packet uses.
pub trait Registers: Default + Clone + core::fmt::Debug {
    /// Serialize the register file into `buf`, which must be at least as
    /// large as the layout's total byte size.
    fn write_bytes(&self, buf: &mut [u8]);

    /// Parse a register file out of `buf`. Returns `None` if `buf` is too
    /// short for the layout.
    fn read_bytes(buf: &[u8]) -> Option<Self>
    where
        Self: Sized;

    /// Total size, in bytes, of the contiguous layout.
    fn layout_size() -> usize;
}
