//! CLI entry point: picks a run mode (`g`/`p`/`s`/`v`), opens the requested
//! transport, and drives a [`Session`] over it.
//!
//! Grounded on `Sources/main.cpp`'s `GDBMain`/`PlatformMain`/`SlaveMain`
//! dispatch: each mode differs only in which [`Delegate`] it builds and how
//! it gets to a connected [`Channel`], never in how the session itself runs.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use gdbserver::channel::{Channel, FdChannel, TcpChannel, UnixChannel};
use gdbserver::common::CompatMode;
use gdbserver::session::{DebugSessionImpl, Delegate, PlatformSessionImpl, Session};

#[derive(Parser)]
#[command(name = "gdbserver", version, about = "GDB/LLDB Remote Serial Protocol debug server")]
struct Cli {
    #[command(subcommand)]
    mode: RunMode,
}

#[derive(Subcommand)]
enum RunMode {
    /// Debugging session: attach to or launch a program, then serve one
    /// GDB/LLDB client over the wire protocol.
    #[command(name = "g")]
    Gdbserver(GdbserverArgs),
    /// Platform session: remote process listing, file access, and
    /// `qLaunchGDBServer`-spawned debugging sessions, no ptrace of its own.
    #[command(name = "p")]
    Platform(ConnectArgs),
    /// Slave session: a single pre-forked debugging session handed an
    /// already-bound port, used by a platform session's spawner.
    #[command(name = "s")]
    Slave(ConnectArgs),
    /// Print the version and exit.
    #[command(name = "v")]
    Version,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Write log output to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Verbose (debug-level) logging.
    #[arg(long, global = true)]
    debug: bool,
    /// Log every packet exchanged with the client.
    #[arg(long, global = true)]
    remote_debug: bool,
    /// Disable ANSI color in log output.
    #[arg(long, global = true)]
    no_colors: bool,
    /// Detach from the controlling terminal and run in the background.
    #[arg(long, global = true)]
    daemonize: bool,
    /// Start a new session (`setsid(2)`) before serving.
    #[arg(long, global = true)]
    setsid: bool,
}

#[derive(Args)]
struct ConnectArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// `[host]:port`, `unix://path`, or `unix-abstract://path`.
    address: Option<String>,
}

#[derive(Args)]
struct GdbserverArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// `[host]:port`, `unix://path`, or `unix-abstract://path`. Omitted when
    /// `--fd` supplies an already-connected descriptor.
    address: Option<String>,
    /// Attach to an already-running process instead of waiting for `vRun`.
    #[arg(long)]
    attach: Option<i32>,
    /// `NAME=value`, merged into the launched program's environment.
    /// Repeatable.
    #[arg(long = "set-env", value_name = "NAME=value")]
    set_env: Vec<String>,
    /// Remove `NAME` from the launched program's environment. Repeatable.
    #[arg(long = "unset-env", value_name = "NAME")]
    unset_env: Vec<String>,
    /// Negotiate plain GDB ptid formatting instead of LLDB's.
    #[arg(long = "gdb-compat")]
    gdb_compat: bool,
    /// Write the bound port to this named pipe once listening, for a
    /// launcher waiting to read it back.
    #[arg(long = "named-pipe")]
    named_pipe: Option<PathBuf>,
    /// Dial out to `address` instead of listening on it.
    #[arg(long = "reverse-connect")]
    reverse_connect: bool,
    /// Serve over an already-connected inherited file descriptor.
    #[arg(long)]
    fd: Option<RawFd>,
}

fn main() {
    let cli = Cli::parse();
    let common = match &cli.mode {
        RunMode::Gdbserver(a) => Some(a.common.clone()),
        RunMode::Platform(a) | RunMode::Slave(a) => Some(a.common.clone()),
        RunMode::Version => None,
    };
    if let Some(common) = &common {
        init_logging(common);
    }

    let result = match cli.mode {
        RunMode::Gdbserver(args) => run_gdbserver(args),
        RunMode::Platform(args) => run_platform(args),
        RunMode::Slave(args) => run_slave(args),
        RunMode::Version => {
            println!("gdbserver {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(common: &CommonArgs) {
    let level = if common.debug || common.remote_debug { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", level);
    }
    // pretty_env_logger only ever writes to stderr; `--log-file` is honored
    // by redirecting stderr itself, since the underlying crate has no
    // file-sink hook to plug into.
    if let Some(path) = &common.log_file {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            unsafe {
                libc::dup2(file.as_raw_fd(), 2);
            }
            std::mem::forget(file);
        }
    }
    let _ = pretty_env_logger::try_init();
    if common.no_colors {
        std::env::set_var("RUST_LOG_STYLE", "never");
    }
}

fn daemonize_if_requested(common: &CommonArgs) -> io::Result<()> {
    if common.setsid {
        nix::unistd::setsid().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    }
    if common.daemonize {
        // Safety: async-signal-safe call before any threads beyond the
        // logger's own (none yet) are running.
        if unsafe { libc::daemon(1, 0) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// A [`Channel`] over whichever concrete transport the CLI picked, so
/// `Session` doesn't need to be generic over a trait object.
enum AnyChannel {
    Tcp(TcpChannel),
    Unix(UnixChannel),
    Fd(FdChannel),
}

impl Channel for AnyChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            AnyChannel::Tcp(c) => c.write(buf),
            AnyChannel::Unix(c) => c.write(buf),
            AnyChannel::Fd(c) => c.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            AnyChannel::Tcp(c) => c.flush(),
            AnyChannel::Unix(c) => c.flush(),
            AnyChannel::Fd(c) => c.flush(),
        }
    }
    fn wait(&mut self, buf: &mut [u8], timeout: Option<std::time::Duration>) -> io::Result<usize> {
        match self {
            AnyChannel::Tcp(c) => c.wait(buf, timeout),
            AnyChannel::Unix(c) => c.wait(buf, timeout),
            AnyChannel::Fd(c) => c.wait(buf, timeout),
        }
    }
    fn at_eof(&self) -> bool {
        match self {
            AnyChannel::Tcp(c) => c.at_eof(),
            AnyChannel::Unix(c) => c.at_eof(),
            AnyChannel::Fd(c) => c.at_eof(),
        }
    }
    fn as_raw_fd(&self) -> RawFd {
        match self {
            AnyChannel::Tcp(c) => c.as_raw_fd(),
            AnyChannel::Unix(c) => c.as_raw_fd(),
            AnyChannel::Fd(c) => c.as_raw_fd(),
        }
    }
}

/// Parse `[host]:port` / `unix://path` / `unix-abstract://path` and produce
/// one connected channel: bind-then-accept for a listening address, or
/// dial out when `reverse` is set.
fn connect(address: &str, reverse: bool, named_pipe: Option<&PathBuf>) -> io::Result<AnyChannel> {
    if let Some(path) = address.strip_prefix("unix-abstract://") {
        // Stable `std` has no abstract-namespace constructor; see
        // DESIGN.md's Open Questions for why this falls back to a regular
        // filesystem socket at the same path instead of inventing a raw
        // `libc::socket`/`SUN_LEN` dance for an uncommon CLI form.
        return connect(&format!("unix://{}", path), reverse, named_pipe);
    }
    if let Some(path) = address.strip_prefix("unix://") {
        if reverse {
            let stream = std::os::unix::net::UnixStream::connect(path)?;
            return Ok(AnyChannel::Unix(UnixChannel::new(stream)));
        }
        let _ = std::fs::remove_file(path);
        let listener = std::os::unix::net::UnixListener::bind(path)?;
        if let Some(pipe) = named_pipe {
            notify_named_pipe(pipe, path)?;
        }
        let (stream, _) = listener.accept()?;
        return Ok(AnyChannel::Unix(UnixChannel::new(stream)));
    }

    if reverse {
        let stream = std::net::TcpStream::connect(address)?;
        return Ok(AnyChannel::Tcp(TcpChannel::new(stream)));
    }

    let (host, port) = address.rsplit_once(':').unwrap_or(("0.0.0.0", address));
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    let listener = std::net::TcpListener::bind((host, port.parse::<u16>().unwrap_or(0)))?;
    if let Some(pipe) = named_pipe {
        let bound_port = listener.local_addr()?.port();
        notify_named_pipe(pipe, &bound_port.to_string())?;
    }
    let (stream, peer) = listener.accept()?;
    info!("accepted connection from {}", peer);
    Ok(AnyChannel::Tcp(TcpChannel::new(stream)))
}

/// Create `path` as a FIFO if it doesn't exist yet, then write `payload` to
/// it so a launcher blocked on a read learns the bound address.
fn notify_named_pipe(path: &PathBuf, payload: &str) -> io::Result<()> {
    if !path.exists() {
        nix::unistd::mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o600))
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    }
    std::fs::write(path, format!("{}\n", payload))
}

fn run_gdbserver(args: GdbserverArgs) -> io::Result<()> {
    daemonize_if_requested(&args.common)?;

    for name in &args.unset_env {
        std::env::remove_var(name);
    }
    for assignment in &args.set_env {
        if let Some((name, value)) = assignment.split_once('=') {
            std::env::set_var(name, value);
        }
    }

    let channel = if let Some(fd) = args.fd {
        AnyChannel::Fd(unsafe { FdChannel::from_raw_fd(fd) })
    } else {
        let address = args.address.as_deref().unwrap_or_else(|| {
            error!("gdbserver mode requires an address or --fd");
            std::process::exit(1);
        });
        connect(address, args.reverse_connect, args.named_pipe.as_ref())?
    };

    let mut delegate = DebugSessionImpl::new();
    let _ = delegate.start_interrupt_watcher(channel.as_raw_fd());
    if let Some(pid) = args.attach {
        Delegate::on_attach(&mut delegate, pid as u64).map_err(to_io_error)?;
    }
    let compat_mode = if args.gdb_compat { CompatMode::Gdb } else { CompatMode::Lldb };
    let mut session = Session::new(channel, delegate, compat_mode);
    session.run()
}

fn run_platform(args: ConnectArgs) -> io::Result<()> {
    daemonize_if_requested(&args.common)?;
    let address = args.address.as_deref().unwrap_or("0.0.0.0:0");
    let channel = connect(address, false, None)?;
    let delegate = PlatformSessionImpl::new();
    let mut session = Session::new(channel, delegate, CompatMode::Lldb);
    session.run()
}

/// Binds an ephemeral TCP port, forks, and has the child serve exactly one
/// debugging session over it while the parent reports `<port> <pid>` on
/// stdout for a platform session's spawner to read back.
fn run_slave(args: ConnectArgs) -> io::Result<()> {
    daemonize_if_requested(&args.common)?;
    let listener = std::net::TcpListener::bind(("0.0.0.0", 0))?;
    let port = listener.local_addr()?.port();

    match unsafe { nix::unistd::fork() }.map_err(|e| io::Error::from_raw_os_error(e as i32))? {
        nix::unistd::ForkResult::Parent { child } => {
            println!("{} {}", port, child.as_raw());
            Ok(())
        }
        nix::unistd::ForkResult::Child => {
            unsafe {
                libc::close(0);
                libc::close(1);
                libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_RDONLY);
                libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_WRONLY);
            }
            let (stream, _) = listener.accept()?;
            let channel = AnyChannel::Tcp(TcpChannel::new(stream));
            let mut delegate = DebugSessionImpl::new();
            let _ = delegate.start_interrupt_watcher(channel.as_raw_fd());
            let mut session = Session::new(channel, delegate, CompatMode::Lldb);
            let result = session.run();
            std::process::exit(if result.is_ok() { 0 } else { 1 });
        }
    }
}

fn to_io_error(e: gdbserver::error::ErrorKind) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
