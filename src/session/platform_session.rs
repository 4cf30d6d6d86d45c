//! The platform-mode half of [`Delegate`]: process listing, remote program
//! execution, file access, and spawning child debug servers for `lldb
//! platform`/`gdbserver --multi`-style remote launches.
//!
//! Grounded on `Sources/GDBRemote/PlatformSessionImpl.cpp`: it owns no
//! ptrace-controlled process at all (that's `DebugSessionImpl`'s job) and
//! instead answers `qPlatform_*`/`vFile:*`/`qfProcessInfo` queries and spawns
//! either a plain child program (`qPlatform_shell`) or another instance of
//! this server (`qLaunchGDBServer`).

use std::cell::RefCell;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, Result};
use crate::file_ops::{self, FileTable};
use crate::session::delegate::{Delegate, FileHandle, HostInfo, OpenFlags, ProcessInfo};
use crate::spawner::Spawner;

/// The platform-mode delegate: launch parameters accumulated across
/// `QEnvironment*`/`QSet*` packets, open host files, and process-listing
/// pagination state.
pub struct PlatformSessionImpl {
    spawner: Spawner,
    files: FileTable,
    working_directory: Option<String>,
    /// `qfProcessInfo`/`qsProcessInfo` cursor. `Delegate::on_query_process_list`
    /// takes `&self`, since every other query method does, so the snapshot
    /// and cursor live behind a `RefCell` rather than requiring `&mut self`
    /// just for this one stateful query.
    process_list: RefCell<(Vec<i32>, usize)>,
}

impl PlatformSessionImpl {
    /// A fresh platform session with no accumulated launch state.
    pub fn new() -> Self {
        PlatformSessionImpl {
            spawner: Spawner::new(),
            files: FileTable::new(),
            working_directory: None,
            process_list: RefCell::new((Vec::new(), 0)),
        }
    }
}

impl Default for PlatformSessionImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl Delegate for PlatformSessionImpl {
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

    fn on_disable_aslr(&mut self, disable: bool) -> Result<()> {
        self.spawner.disable_aslr = disable;
        Ok(())
    }

    fn on_set_environment_variable(&mut self, name: &str, value: &str) -> Result<()> {
        self.spawner.set_environment_variable(&format!("{}={}", name, value))
    }

    fn on_reset_environment(&mut self) -> Result<()> {
        self.spawner.reset_environment();
        Ok(())
    }

    fn on_set_working_directory(&mut self, path: &str) -> Result<()> {
        self.working_directory = Some(path.to_string());
        self.spawner.working_directory = Some(path.to_string());
        Ok(())
    }

    fn on_set_std_file(&mut self, fileno: u32, path: &str) -> Result<()> {
        self.spawner.set_std_file(fileno, path)
    }

    fn on_set_architecture(&mut self, _architecture: &str) -> Result<()> {
        // Single-arch host: nothing to record, but negotiating the packet
        // should still succeed.
        Ok(())
    }

    fn on_set_program_arguments(&mut self, args: &[String]) -> Result<()> {
        self.spawner.set_program_arguments(args);
        Ok(())
    }

    fn on_execute_program(
        &mut self,
        command: &str,
        timeout_secs: u32,
        working_directory: &str,
    ) -> Result<(i32, String)> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_directory)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ErrorKind::from)?;

        let deadline = (timeout_secs > 0).then(|| Instant::now() + Duration::from_secs(timeout_secs as u64));
        let status = loop {
            if let Some(status) = child.try_wait().map_err(ErrorKind::from)? {
                break status;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ErrorKind::Interrupted);
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            let _ = stdout.read_to_string(&mut output);
        }
        Ok((status.code().unwrap_or(-1), output))
    }

    fn on_file_create_directory(&mut self, path: &str, mode: u32) -> Result<()> {
        file_ops::create_directory(path, mode)
    }

    fn on_file_open(&mut self, path: &str, flags: OpenFlags, mode: u32) -> Result<FileHandle> {
        self.files.open(path, flags, mode)
    }

    fn on_file_close(&mut self, fd: FileHandle) -> Result<()> {
        self.files.close(fd)
    }

    fn on_file_read(&mut self, fd: FileHandle, count: u64, offset: u64) -> Result<Vec<u8>> {
        self.files.read(fd, count, offset)
    }

    fn on_file_write(&mut self, fd: FileHandle, offset: u64, data: &[u8]) -> Result<u64> {
        self.files.write(fd, offset, data)
    }

    fn on_file_remove(&mut self, path: &str) -> Result<()> {
        file_ops::remove(path)
    }

    fn on_file_read_link(&mut self, path: &str) -> Result<String> {
        file_ops::read_link(path)
    }

    fn on_file_set_permissions(&mut self, path: &str, mode: u32) -> Result<()> {
        file_ops::set_permissions(path, mode)
    }

    fn on_file_exists(&mut self, path: &str) -> Result<bool> {
        Ok(file_ops::exists(path))
    }

    fn on_file_compute_md5(&mut self, path: &str) -> Result<[u8; 16]> {
        file_ops::compute_md5(path)
    }

    fn on_file_get_size(&mut self, path: &str) -> Result<u64> {
        file_ops::size(path)
    }

    fn on_query_process_list(&self, name_filter: Option<&str>, first: bool) -> Result<ProcessInfo> {
        let mut state = self.process_list.borrow_mut();
        if first {
            state.0 = list_pids(name_filter);
            state.1 = 0;
        }
        while state.1 < state.0.len() {
            let pid = state.0[state.1];
            state.1 += 1;
            if let Some(info) = process_info_for(pid) {
                return Ok(info);
            }
        }
        Err(ErrorKind::NotFound)
    }

    fn on_launch_debug_server(&mut self, host: &str) -> Result<(u16, u64)> {
        let listener = std::net::TcpListener::bind((host, 0)).map_err(ErrorKind::from)?;
        let port = listener.local_addr().map_err(ErrorKind::from)?.port();
        drop(listener);

        let exe = std::env::current_exe().map_err(ErrorKind::from)?;
        let child = Command::new(exe)
            .arg("g")
            .arg(format!("{}:{}", host, port))
            .spawn()
            .map_err(ErrorKind::from)?;
        Ok((port, child.id() as u64))
    }

    fn on_query_launch_success(&self) -> Result<()> {
        Ok(())
    }

    fn on_query_user_name(&self, uid: u32) -> Result<String> {
        lookup_passwd_field(uid).ok_or(ErrorKind::NotFound)
    }

    fn on_query_group_name(&self, gid: u32) -> Result<String> {
        lookup_group_field(gid).ok_or(ErrorKind::NotFound)
    }

    fn on_query_working_directory(&self) -> Result<String> {
        std::env::current_dir()
            .map_err(ErrorKind::from)
            .map(|p| p.to_string_lossy().into_owned())
    }
}

fn list_pids(name_filter: Option<&str>) -> Vec<i32> {
    let mut pids = Vec::new();
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return pids,
    };
    for entry in entries.flatten() {
        let pid: i32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            Some(pid) => pid,
            None => continue,
        };
        if let Some(filter) = name_filter {
            let comm = std::fs::read_to_string(entry.path().join("comm")).unwrap_or_default();
            if comm.trim_end() != filter {
                continue;
            }
        }
        pids.push(pid);
    }
    pids.sort_unstable();
    pids
}

fn process_info_for(pid: i32) -> Option<ProcessInfo> {
    let comm = std::fs::read_to_string(format!("/proc/{}/comm", pid)).ok()?;
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let mut real_uid = 0;
    let mut effective_uid = 0;
    let mut real_gid = 0;
    let mut effective_gid = 0;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            let mut fields = rest.split_whitespace();
            real_uid = fields.next()?.parse().ok()?;
            effective_uid = fields.next().unwrap_or("0").parse().unwrap_or(real_uid);
        } else if let Some(rest) = line.strip_prefix("Gid:") {
            let mut fields = rest.split_whitespace();
            real_gid = fields.next()?.parse().ok()?;
            effective_gid = fields.next().unwrap_or("0").parse().unwrap_or(real_gid);
        }
    }
    Some(ProcessInfo {
        pid: pid as u64,
        parent_pid: None,
        real_uid,
        real_gid,
        effective_uid,
        effective_gid,
        triple: host_triple(),
        name: Some(comm.trim_end().to_string()),
    })
}

/// Scan `/etc/passwd` for `uid`'s login name; no NSS/LDAP resolution.
fn lookup_passwd_field(uid: u32) -> Option<String> {
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let mut fields = line.split(':');
        let name = fields.next()?;
        fields.next()?;
        let entry_uid: u32 = fields.next()?.parse().ok()?;
        if entry_uid == uid {
            return Some(name.to_string());
        }
    }
    None
}

/// Scan `/etc/group` for `gid`'s name; no NSS/LDAP resolution.
fn lookup_group_field(gid: u32) -> Option<String> {
    let group = std::fs::read_to_string("/etc/group").ok()?;
    for line in group.lines() {
        let mut fields = line.split(':');
        let name = fields.next()?;
        fields.next()?;
        let entry_gid: u32 = fields.next()?.parse().ok()?;
        if entry_gid == gid {
            return Some(name.to_string());
        }
    }
    None
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_info_for_self_reports_this_pid() {
        let pid = std::process::id() as i32;
        let info = process_info_for(pid).unwrap();
        assert_eq!(info.pid, pid as u64);
    }

    #[test]
    fn lookup_passwd_field_resolves_root() {
        assert_eq!(lookup_passwd_field(0).as_deref(), Some("root"));
    }
}
