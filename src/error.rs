//! Error taxonomy shared by every layer of the server.

/// Kinds a [`Delegate`](crate::session::delegate::Delegate) method can fail
/// with. Maps onto the wire's `E<hh>` replies; `Unsupported` and `Unknown`
/// collapse to the protocol's empty "not implemented" reply instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Caller lacks permission for the requested operation.
    #[error("no permission")]
    NoPermission,
    /// No such file, thread, or breakpoint site.
    #[error("not found")]
    NotFound,
    /// No such process.
    #[error("process not found")]
    ProcessNotFound,
    /// A blocking call was interrupted.
    #[error("interrupted")]
    Interrupted,
    /// A file/handle argument does not refer to an open handle.
    #[error("invalid handle")]
    InvalidHandle,
    /// Out of memory (host or target).
    #[error("no memory")]
    NoMemory,
    /// Access denied at the OS level.
    #[error("access denied")]
    AccessDenied,
    /// The requested address is not valid in the target's address space.
    #[error("invalid address")]
    InvalidAddress,
    /// Resource is busy; caller may retry.
    #[error("busy")]
    Busy,
    /// Resource already exists.
    #[error("already exists")]
    AlreadyExist,
    /// No such device.
    #[error("no device")]
    NoDevice,
    /// Expected a directory.
    #[error("not a directory")]
    NotDirectory,
    /// Expected a file, found a directory.
    #[error("is a directory")]
    IsDirectory,
    /// Malformed or out-of-range argument.
    #[error("invalid argument")]
    InvalidArgument,
    /// Process file-descriptor table full.
    #[error("too many open files (process)")]
    TooManySystemFiles,
    /// System-wide file-descriptor table full.
    #[error("too many open files (system)")]
    TooManyFiles,
    /// File exceeds a size limit.
    #[error("file too big")]
    FileTooBig,
    /// Filesystem out of space.
    #[error("no space left")]
    NoSpace,
    /// Seek argument invalid for this handle.
    #[error("invalid seek")]
    InvalidSeek,
    /// Target is not writeable (read-only filesystem, etc.)
    #[error("not writeable")]
    NotWriteable,
    /// Path exceeds the OS length limit.
    #[error("name too long")]
    NameTooLong,
    /// Unclassified failure. Maps to the empty wire reply.
    #[error("unknown error")]
    Unknown,
    /// Operation recognized but intentionally unimplemented. Maps to the
    /// empty wire reply.
    #[error("unsupported")]
    Unsupported,
}

impl ErrorKind {
    /// The two-hex-digit payload of an `E<hh>` reply, or `None` for the
    /// kinds that map to the empty "unsupported" reply instead.
    pub fn as_errno(self) -> Option<u8> {
        use ErrorKind::*;
        match self {
            Unsupported | Unknown => None,
            NoPermission => Some(0x01),
            NotFound => Some(0x02),
            ProcessNotFound => Some(0x03),
            Interrupted => Some(0x04),
            InvalidHandle => Some(0x09),
            NoMemory => Some(0x0c),
            AccessDenied => Some(0x0d),
            InvalidAddress => Some(0x0e),
            Busy => Some(0x10),
            AlreadyExist => Some(0x11),
            NoDevice => Some(0x13),
            NotDirectory => Some(0x14),
            IsDirectory => Some(0x15),
            InvalidArgument => Some(0x16),
            TooManySystemFiles => Some(0x18),
            TooManyFiles => Some(0x19),
            FileTooBig => Some(0x1b),
            NoSpace => Some(0x1c),
            InvalidSeek => Some(0x1d),
            NotWriteable => Some(0x1e),
            NameTooLong => Some(0x24),
        }
    }
}

/// Result type used throughout the delegate/session/target layers.
pub type Result<T> = core::result::Result<T, ErrorKind>;

impl From<nix::errno::Errno> for ErrorKind {
    fn from(e: nix::errno::Errno) -> Self {
        use nix::errno::Errno::*;
        match e {
            EPERM => ErrorKind::NoPermission,
            ENOENT => ErrorKind::NotFound,
            ESRCH => ErrorKind::ProcessNotFound,
            EINTR => ErrorKind::Interrupted,
            EBADF => ErrorKind::InvalidHandle,
            ENOMEM => ErrorKind::NoMemory,
            EACCES => ErrorKind::AccessDenied,
            EFAULT => ErrorKind::InvalidAddress,
            EBUSY => ErrorKind::Busy,
            EEXIST => ErrorKind::AlreadyExist,
            ENODEV => ErrorKind::NoDevice,
            ENOTDIR => ErrorKind::NotDirectory,
            EISDIR => ErrorKind::IsDirectory,
            EINVAL => ErrorKind::InvalidArgument,
            EMFILE => ErrorKind::TooManySystemFiles,
            ENFILE => ErrorKind::TooManyFiles,
            EFBIG => ErrorKind::FileTooBig,
            ENOSPC => ErrorKind::NoSpace,
            ESPIPE => ErrorKind::InvalidSeek,
            EROFS => ErrorKind::NotWriteable,
            ENAMETOOLONG => ErrorKind::NameTooLong,
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match e.kind() {
            IoKind::NotFound => ErrorKind::NotFound,
            IoKind::PermissionDenied => ErrorKind::AccessDenied,
            IoKind::AlreadyExists => ErrorKind::AlreadyExist,
            IoKind::Interrupted => ErrorKind::Interrupted,
            IoKind::InvalidInput | IoKind::InvalidData => ErrorKind::InvalidArgument,
            _ => ErrorKind::Unknown,
        }
    }
}
