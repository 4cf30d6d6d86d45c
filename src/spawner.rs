//! Launch-parameter accumulation and process spawning for `vRun`/platform
//! launches.
//!
//! Grounded on the `QEnvironment*`/`QSetSTD*`/`QSetWorkingDir`/
//! `QSetDisableASLR` packet family described in `spec.md` §4.4 and §6: each
//! packet accumulates one piece of launch state into a `Spawner` before the
//! actual `vRun`/`qLaunchSuccess` pair commits it via `fork`+`exec`. Linux
//! ASLR is disabled with `personality(ADDR_NO_RANDOMIZE)`, following the
//! convention `Sources/Host/Linux/Process.cpp`'s POSIX base class documents
//! for `QSetDisableASLR`.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::io::RawFd;

use nix::unistd::{ForkResult, Pid};

use crate::error::{ErrorKind, Result};

const ADDR_NO_RANDOMIZE: libc::c_ulong = 0x0040000;

/// Accumulated launch parameters for a single `vRun`, built up across the
/// `QSetSTDIN`/`QEnvironment*`/`QSetWorkingDir`/`QSetDisableASLR` family
/// before the actual spawn.
#[derive(Debug, Default)]
pub struct Spawner {
    /// Executable path (argv[0] is always the filename itself).
    pub executable: String,
    /// Remaining argv entries.
    pub arguments: Vec<String>,
    /// Accumulated environment overrides (merged over the server's own
    /// environment at spawn time, per `QEnvironment`/`QEnvironmentHexEncoded`).
    pub environment: HashMap<String, String>,
    /// Working directory, if `QSetWorkingDir` was sent.
    pub working_directory: Option<String>,
    /// Redirect targets for fd 0/1/2, indexed `[stdin, stdout, stderr]`.
    pub stdio: [Option<String>; 3],
    /// Whether `QSetDisableASLR` requested ASLR be turned off.
    pub disable_aslr: bool,
}

impl Spawner {
    /// A fresh, empty accumulator.
    pub fn new() -> Self {
        Spawner::default()
    }

    /// Record the inferior's argv (first call sets the executable, further
    /// calls append arguments), as collected from `vRun`'s hex-encoded
    /// argument list or `A`'s packet form.
    pub fn set_program_arguments(&mut self, args: &[String]) {
        if let Some((exe, rest)) = args.split_first() {
            self.executable = exe.clone();
            self.arguments = rest.to_vec();
        }
    }

    /// `QEnvironment`/`QEnvironmentHexEncoded`: record a `NAME=value` pair.
    pub fn set_environment_variable(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or(ErrorKind::InvalidArgument)?;
        self.environment.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// `QEnvironmentReset`: discard accumulated environment overrides.
    pub fn reset_environment(&mut self) {
        self.environment.clear();
    }

    /// `QSetSTDIN`/`QSetSTDOUT`/`QSetSTDERR`.
    pub fn set_std_file(&mut self, fileno: u32, path: &str) -> Result<()> {
        let slot = self.stdio.get_mut(fileno as usize).ok_or(ErrorKind::InvalidArgument)?;
        *slot = Some(path.to_string());
        Ok(())
    }

    /// Fork and exec the accumulated program, returning the child's pid. The
    /// child is left stopped at its first instruction (`PTRACE_TRACEME` +
    /// `SIGSTOP`) so the caller can attach and resume it under control.
    pub fn spawn(&self) -> Result<Pid> {
        if self.executable.is_empty() {
            return Err(ErrorKind::InvalidArgument);
        }

        // Safety: the child only calls async-signal-safe functions
        // (ptrace, personality, chdir, dup2, execvp) before exec.
        match unsafe { nix::unistd::fork() }.map_err(ErrorKind::from)? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => {
                let _ = nix::sys::ptrace::traceme();

                if self.disable_aslr {
                    unsafe {
                        libc::personality(ADDR_NO_RANDOMIZE);
                    }
                }

                if let Some(dir) = &self.working_directory {
                    let _ = nix::unistd::chdir(dir.as_str());
                }

                for (fd, path) in self.stdio.iter().enumerate() {
                    if let Some(path) = path {
                        redirect_std_file(fd as RawFd, path);
                    }
                }

                let exe = CString::new(self.executable.clone()).unwrap();
                let mut argv: Vec<CString> = vec![exe.clone()];
                argv.extend(self.arguments.iter().map(|a| CString::new(a.as_str()).unwrap()));

                for (name, value) in &self.environment {
                    std::env::set_var(name, value);
                }

                let _ = nix::unistd::execvp(&exe, &argv);
                // execvp only returns on failure.
                std::process::exit(127);
            }
        }
    }
}

fn redirect_std_file(fd: RawFd, path: &str) {
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;

    let flags = match fd {
        0 => OFlag::O_RDONLY,
        _ => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
    };
    if let Ok(opened) = open(path, flags, Mode::from_bits_truncate(0o644)) {
        let _ = nix::unistd::dup2(opened, fd);
        let _ = nix::unistd::close(opened);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_program_arguments_splits_executable_from_argv() {
        let mut s = Spawner::new();
        s.set_program_arguments(&["/bin/echo".into(), "hi".into(), "there".into()]);
        assert_eq!(s.executable, "/bin/echo");
        assert_eq!(s.arguments, vec!["hi".to_string(), "there".to_string()]);
    }

    #[test]
    fn environment_variable_requires_equals() {
        let mut s = Spawner::new();
        assert!(s.set_environment_variable("NOEQUALS").is_err());
        s.set_environment_variable("FOO=bar").unwrap();
        assert_eq!(s.environment.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn reset_environment_clears_accumulated_pairs() {
        let mut s = Spawner::new();
        s.set_environment_variable("FOO=bar").unwrap();
        s.reset_environment();
        assert!(s.environment.is_empty());
    }

    #[test]
    fn spawn_without_executable_is_invalid_argument() {
        let s = Spawner::new();
        assert_eq!(s.spawn().unwrap_err(), ErrorKind::InvalidArgument);
    }
}
