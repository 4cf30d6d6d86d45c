//! x86-64 register layout (`org.gnu.gdb.i386.{64bit-core,64bit-sse}`-compatible).

use std::convert::TryInto;

use crate::{Arch, Encoding, Generic, RegisterInfo, Registers};

const GPR_NAMES: [&str; 16] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];

/// DWARF register numbers for the 16 GPRs, in `GPR_NAMES` order.
const GPR_DWARF: [u32; 16] = [0, 3, 2, 1, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Register file exchanged by `g`/`G` for an x86-64 target: 16 GPRs, `rip`,
/// `eflags`, and the six segment registers, in that order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct X86_64Regs {
    /// rax, rbx, rcx, rdx, rsi, rdi, rbp, rsp, r8-r15
    pub regs: [u64; 16],
    /// Instruction pointer.
    pub rip: u64,
    /// Status register.
    pub eflags: u32,
    /// cs, ss, ds, es, fs, gs
    pub segments: [u32; 6],
}

impl Registers for X86_64Regs {
    fn write_bytes(&self, buf: &mut [u8]) {
        let mut off = 0;
        for reg in &self.regs {
            buf[off..off + 8].copy_from_slice(&reg.to_le_bytes());
            off += 8;
        }
        buf[off..off + 8].copy_from_slice(&self.rip.to_le_bytes());
        off += 8;
        buf[off..off + 4].copy_from_slice(&self.eflags.to_le_bytes());
        off += 4;
        for seg in &self.segments {
            buf[off..off + 4].copy_from_slice(&seg.to_le_bytes());
            off += 4;
        }
    }

    fn read_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::layout_size() {
            return None;
        }
        let mut regs = [0u64; 16];
        let mut off = 0;
        for reg in regs.iter_mut() {
            *reg = u64::from_le_bytes(buf[off..off + 8].try_into().ok()?);
            off += 8;
        }
        let rip = u64::from_le_bytes(buf[off..off + 8].try_into().ok()?);
        off += 8;
        let eflags = u32::from_le_bytes(buf[off..off + 4].try_into().ok()?);
        off += 4;
        let mut segments = [0u32; 6];
        for seg in segments.iter_mut() {
            *seg = u32::from_le_bytes(buf[off..off + 4].try_into().ok()?);
            off += 4;
        }
        Some(X86_64Regs {
            regs,
            rip,
            eflags,
            segments,
        })
    }

    fn layout_size() -> usize {
        16 * 8 + 8 + 4 + 6 * 4
    }
}

macro_rules! gpr_info {
    ($idx:expr, $offset:expr) => {
        RegisterInfo {
            name: GPR_NAMES[$idx],
            bit_size: 64,
            offset: $offset,
            encoding: Encoding::Uint,
            dwarf: Some(GPR_DWARF[$idx]),
            eh_frame: Some(GPR_DWARF[$idx]),
            gdb: $idx as u32,
            lldb: $idx as u32,
            generic: match $idx {
                6 => Some(Generic::Fp),
                7 => Some(Generic::Sp),
                _ => None,
            },
            invalidate: &[],
            container: &[],
        }
    };
}

static REGISTER_INFO: [RegisterInfo; 23] = [
    gpr_info!(0, 0),
    gpr_info!(1, 8),
    gpr_info!(2, 16),
    gpr_info!(3, 24),
    gpr_info!(4, 32),
    gpr_info!(5, 40),
    gpr_info!(6, 48),
    gpr_info!(7, 56),
    gpr_info!(8, 64),
    gpr_info!(9, 72),
    gpr_info!(10, 80),
    gpr_info!(11, 88),
    gpr_info!(12, 96),
    gpr_info!(13, 104),
    gpr_info!(14, 112),
    gpr_info!(15, 120),
    RegisterInfo {
        name: "rip",
        bit_size: 64,
        offset: 128,
        encoding: Encoding::Uint,
        dwarf: Some(16),
        eh_frame: Some(16),
        gdb: 16,
        lldb: 16,
        generic: Some(Generic::Pc),
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "eflags",
        bit_size: 32,
        offset: 136,
        encoding: Encoding::Uint,
        dwarf: Some(49),
        eh_frame: Some(49),
        gdb: 17,
        lldb: 17,
        generic: Some(Generic::Flags),
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "cs",
        bit_size: 32,
        offset: 140,
        encoding: Encoding::Uint,
        dwarf: Some(51),
        eh_frame: Some(51),
        gdb: 18,
        lldb: 18,
        generic: None,
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "ss",
        bit_size: 32,
        offset: 144,
        encoding: Encoding::Uint,
        dwarf: Some(52),
        eh_frame: Some(52),
        gdb: 19,
        lldb: 19,
        generic: None,
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "ds",
        bit_size: 32,
        offset: 148,
        encoding: Encoding::Uint,
        dwarf: Some(53),
        eh_frame: Some(53),
        gdb: 20,
        lldb: 20,
        generic: None,
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "es",
        bit_size: 32,
        offset: 152,
        encoding: Encoding::Uint,
        dwarf: Some(50),
        eh_frame: Some(50),
        gdb: 21,
        lldb: 21,
        generic: None,
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "fs",
        bit_size: 32,
        offset: 156,
        encoding: Encoding::Uint,
        dwarf: Some(54),
        eh_frame: Some(54),
        gdb: 22,
        lldb: 22,
        generic: None,
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "gs",
        bit_size: 32,
        offset: 160,
        encoding: Encoding::Uint,
        dwarf: Some(55),
        eh_frame: Some(55),
        gdb: 23,
        lldb: 23,
        generic: None,
        invalidate: &[],
        container: &[],
    },
];

const TARGET_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE target SYSTEM "gdb-target.dtd">
<target>
  <architecture>i386:x86-64</architecture>
  <feature name="org.gnu.gdb.i386.64bit-core">
    <reg name="rax" bitsize="64" type="int64"/>
    <reg name="rbx" bitsize="64" type="int64"/>
    <reg name="rcx" bitsize="64" type="int64"/>
    <reg name="rdx" bitsize="64" type="int64"/>
    <reg name="rsi" bitsize="64" type="int64"/>
    <reg name="rdi" bitsize="64" type="int64"/>
    <reg name="rbp" bitsize="64" type="data_ptr"/>
    <reg name="rsp" bitsize="64" type="data_ptr"/>
    <reg name="r8" bitsize="64" type="int64"/>
    <reg name="r9" bitsize="64" type="int64"/>
    <reg name="r10" bitsize="64" type="int64"/>
    <reg name="r11" bitsize="64" type="int64"/>
    <reg name="r12" bitsize="64" type="int64"/>
    <reg name="r13" bitsize="64" type="int64"/>
    <reg name="r14" bitsize="64" type="int64"/>
    <reg name="r15" bitsize="64" type="int64"/>
    <reg name="rip" bitsize="64" type="code_ptr"/>
    <reg name="eflags" bitsize="32" type="i386_eflags"/>
    <reg name="cs" bitsize="32" type="int32"/>
    <reg name="ss" bitsize="32" type="int32"/>
    <reg name="ds" bitsize="32" type="int32"/>
    <reg name="es" bitsize="32" type="int32"/>
    <reg name="fs" bitsize="32" type="int32"/>
    <reg name="gs" bitsize="32" type="int32"/>
  </feature>
</target>
"#;

/// x86-64 architecture, no SSE/AVX extensions.
pub struct X86_64;

impl Arch for X86_64 {
    type Usize = u64;
    type Registers = X86_64Regs;

    fn register_info() -> &'static [RegisterInfo] {
        &REGISTER_INFO
    }

    fn target_description_xml() -> &'static str {
        TARGET_XML
    }

    fn breakpoint_opcode(_kind: u32) -> &'static [u8] {
        // int3
        &[0xCC]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_register_file() {
        let mut regs = X86_64Regs::default();
        regs.regs[0] = 0x1122_3344_5566_7788;
        regs.rip = 0xdead_beef;
        regs.eflags = 0x246;
        regs.segments = [0x33, 0x2b, 0x2b, 0x2b, 0x2b, 0x2b];

        let mut buf = vec![0u8; X86_64Regs::layout_size()];
        regs.write_bytes(&mut buf);
        let back = X86_64Regs::read_bytes(&buf).unwrap();
        assert_eq!(regs, back);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(X86_64Regs::read_bytes(&[0u8; 4]).is_none());
    }

    #[test]
    fn register_info_offsets_match_layout() {
        assert_eq!(REGISTER_INFO.last().unwrap().offset + 4, X86_64Regs::layout_size() as u32);
    }
}
