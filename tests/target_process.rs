//! S2/S3 against a real ptraced child instead of spec.md's illustrative
//! fixed-address example (no real binary has `0xdeadbeef` sitting at a
//! literal `0x4000` under ASLR): spawn `/bin/sleep`, pick an address out of
//! its own memory map, and round-trip memory and a software breakpoint
//! through it.

use gdbserver::spawner::Spawner;
use gdbserver::target::breakpoint::{Lifetime, SiteMode};
use gdbserver::target::process::{read_memory_at, write_memory_at, Process};
use gdbserver::common::Address;

fn spawn_sleep() -> Process {
    let mut spawner = Spawner::new();
    spawner.set_program_arguments(&["/bin/sleep".to_string(), "10".to_string()]);
    Process::spawn(spawner).expect("spawn /bin/sleep")
}

/// First mapped, executable region's start address from `/proc/<pid>/maps`
/// -- a real address this process can read and write via ptrace.
fn first_exec_region(pid: i32) -> u64 {
    let maps = std::fs::read_to_string(format!("/proc/{}/maps", pid)).unwrap();
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let range = fields.next().unwrap();
        let perms = fields.next().unwrap_or("");
        if perms.contains('x') {
            let start = range.split('-').next().unwrap();
            return u64::from_str_radix(start, 16).unwrap();
        }
    }
    panic!("no executable region found in {}", maps);
}

/// S2 - read memory: a value written via `write_memory_at` reads back
/// identical via `read_memory_at`.
#[test]
fn s2_memory_round_trip() {
    let mut process = spawn_sleep();
    let pid = nix::unistd::Pid::from_raw(process.pid());
    let addr = Address::new(first_exec_region(process.pid()));

    let original = read_memory_at(pid, addr, 4).unwrap();
    write_memory_at(pid, addr, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    let read_back = read_memory_at(pid, addr, 4).unwrap();
    assert_eq!(read_back, vec![0xde, 0xad, 0xbe, 0xef]);

    // restore, so a subsequent wait()/resume doesn't execute garbage.
    write_memory_at(pid, addr, &original).unwrap();
    let _ = process.terminate();
}

/// S3 - software breakpoint lifecycle: inserting patches the byte to
/// `0xCC`, and removing restores the exact original bytes.
#[test]
fn s3_software_breakpoint_lifecycle() {
    let mut process = spawn_sleep();
    let pid = nix::unistd::Pid::from_raw(process.pid());
    let addr = Address::new(first_exec_region(process.pid()));

    let original = read_memory_at(pid, addr, 1).unwrap();

    process
        .breakpoints()
        .insert(
            addr,
            SiteMode::Exec,
            1,
            Lifetime::Permanent,
            &[0xCC],
            |a, len| read_memory_at(pid, a, len),
            |a, data| write_memory_at(pid, a, data),
        )
        .unwrap();
    assert_eq!(read_memory_at(pid, addr, 1).unwrap(), vec![0xCC]);

    process
        .breakpoints()
        .remove(addr, SiteMode::Exec, |a, data| write_memory_at(pid, a, data))
        .unwrap();
    assert_eq!(read_memory_at(pid, addr, 1).unwrap(), original);
    let _ = process.terminate();
}
