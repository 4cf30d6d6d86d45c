//! AArch64 register layout (`org.gnu.gdb.aarch64.core`-compatible).

use std::convert::TryInto;

use crate::{Arch, Encoding, Generic, RegisterInfo, Registers};

/// Register file exchanged by `g`/`G` for an AArch64 target: `x0`-`x30`,
/// `sp`, `pc`, `cpsr`, in that order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Aarch64Regs {
    /// x0-x30 (x30 is the link register).
    pub x: [u64; 31],
    /// Stack pointer.
    pub sp: u64,
    /// Program counter.
    pub pc: u64,
    /// Current program status register.
    pub cpsr: u32,
}

impl Registers for Aarch64Regs {
    fn write_bytes(&self, buf: &mut [u8]) {
        let mut off = 0;
        for reg in &self.x {
            buf[off..off + 8].copy_from_slice(&reg.to_le_bytes());
            off += 8;
        }
        buf[off..off + 8].copy_from_slice(&self.sp.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.pc.to_le_bytes());
        off += 8;
        buf[off..off + 4].copy_from_slice(&self.cpsr.to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::layout_size() {
            return None;
        }
        let mut x = [0u64; 31];
        let mut off = 0;
        for reg in x.iter_mut() {
            *reg = u64::from_le_bytes(buf[off..off + 8].try_into().ok()?);
            off += 8;
        }
        let sp = u64::from_le_bytes(buf[off..off + 8].try_into().ok()?);
        off += 8;
        let pc = u64::from_le_bytes(buf[off..off + 8].try_into().ok()?);
        off += 8;
        let cpsr = u32::from_le_bytes(buf[off..off + 4].try_into().ok()?);
        Some(Aarch64Regs { x, sp, pc, cpsr })
    }

    fn layout_size() -> usize {
        31 * 8 + 8 + 8 + 4
    }
}

macro_rules! x_info {
    ($idx:expr, $generic:expr) => {
        RegisterInfo {
            name: match $idx {
                29 => "fp",
                30 => "lr",
                _ => X_NAMES[$idx],
            },
            bit_size: 64,
            offset: $idx * 8,
            encoding: Encoding::Uint,
            dwarf: Some($idx as u32),
            eh_frame: Some($idx as u32),
            gdb: $idx as u32,
            lldb: $idx as u32,
            generic: $generic,
            invalidate: &[],
            container: &[],
        }
    };
}

const X_NAMES: [&str; 31] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30",
];

static REGISTER_INFO: [RegisterInfo; 34] = [
    x_info!(0, None),
    x_info!(1, None),
    x_info!(2, None),
    x_info!(3, None),
    x_info!(4, None),
    x_info!(5, None),
    x_info!(6, None),
    x_info!(7, None),
    x_info!(8, None),
    x_info!(9, None),
    x_info!(10, None),
    x_info!(11, None),
    x_info!(12, None),
    x_info!(13, None),
    x_info!(14, None),
    x_info!(15, None),
    x_info!(16, None),
    x_info!(17, None),
    x_info!(18, None),
    x_info!(19, None),
    x_info!(20, None),
    x_info!(21, None),
    x_info!(22, None),
    x_info!(23, None),
    x_info!(24, None),
    x_info!(25, None),
    x_info!(26, None),
    x_info!(27, None),
    x_info!(28, None),
    x_info!(29, Some(Generic::Fp)),
    x_info!(30, Some(Generic::Ra)),
    RegisterInfo {
        name: "sp",
        bit_size: 64,
        offset: 31 * 8,
        encoding: Encoding::Uint,
        dwarf: Some(31),
        eh_frame: Some(31),
        gdb: 31,
        lldb: 31,
        generic: Some(Generic::Sp),
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "pc",
        bit_size: 64,
        offset: 32 * 8,
        encoding: Encoding::Uint,
        dwarf: Some(32),
        eh_frame: Some(32),
        gdb: 32,
        lldb: 32,
        generic: Some(Generic::Pc),
        invalidate: &[],
        container: &[],
    },
    RegisterInfo {
        name: "cpsr",
        bit_size: 32,
        offset: 33 * 8,
        encoding: Encoding::Uint,
        dwarf: Some(33),
        eh_frame: Some(33),
        gdb: 33,
        lldb: 33,
        generic: Some(Generic::Flags),
        invalidate: &[],
        container: &[],
    },
];

const TARGET_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE target SYSTEM "gdb-target.dtd">
<target>
  <architecture>aarch64</architecture>
  <feature name="org.gnu.gdb.aarch64.core">
    <reg name="x0" bitsize="64"/>
    <reg name="x1" bitsize="64"/>
    <reg name="x2" bitsize="64"/>
    <reg name="x3" bitsize="64"/>
    <reg name="x4" bitsize="64"/>
    <reg name="x5" bitsize="64"/>
    <reg name="x6" bitsize="64"/>
    <reg name="x7" bitsize="64"/>
    <reg name="x8" bitsize="64"/>
    <reg name="x9" bitsize="64"/>
    <reg name="x10" bitsize="64"/>
    <reg name="x11" bitsize="64"/>
    <reg name="x12" bitsize="64"/>
    <reg name="x13" bitsize="64"/>
    <reg name="x14" bitsize="64"/>
    <reg name="x15" bitsize="64"/>
    <reg name="x16" bitsize="64"/>
    <reg name="x17" bitsize="64"/>
    <reg name="x18" bitsize="64"/>
    <reg name="x19" bitsize="64"/>
    <reg name="x20" bitsize="64"/>
    <reg name="x21" bitsize="64"/>
    <reg name="x22" bitsize="64"/>
    <reg name="x23" bitsize="64"/>
    <reg name="x24" bitsize="64"/>
    <reg name="x25" bitsize="64"/>
    <reg name="x26" bitsize="64"/>
    <reg name="x27" bitsize="64"/>
    <reg name="x28" bitsize="64"/>
    <reg name="fp" bitsize="64"/>
    <reg name="lr" bitsize="64"/>
    <reg name="sp" bitsize="64" type="data_ptr"/>
    <reg name="pc" bitsize="64" type="code_ptr"/>
    <reg name="cpsr" bitsize="32"/>
  </feature>
</target>
"#;

/// AArch64 architecture.
pub struct Aarch64;

impl Arch for Aarch64 {
    type Usize = u64;
    type Registers = Aarch64Regs;

    fn register_info() -> &'static [RegisterInfo] {
        &REGISTER_INFO
    }

    fn target_description_xml() -> &'static str {
        TARGET_XML
    }

    fn breakpoint_opcode(_kind: u32) -> &'static [u8] {
        // brk #0, little-endian
        &[0x00, 0x00, 0x20, 0xd4]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_register_file() {
        let mut regs = Aarch64Regs::default();
        regs.x[0] = 0x1122_3344_5566_7788;
        regs.sp = 0x7fff_ffff_0000;
        regs.pc = 0x4000_00;
        regs.cpsr = 0x6000_0000;

        let mut buf = vec![0u8; Aarch64Regs::layout_size()];
        regs.write_bytes(&mut buf);
        let back = Aarch64Regs::read_bytes(&buf).unwrap();
        assert_eq!(regs, back);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(Aarch64Regs::read_bytes(&[0u8; 4]).is_none());
    }
}
