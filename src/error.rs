/// Error kinds crossing the engine boundary.
///
/// Syscall failures are caught at the lowest layer (cgroup node, task
/// runner) and annotated with the operation and path before they
/// propagate. Higher layers translate `Io` into a more specific kind
/// when they can.
use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid property: {0}")]
    InvalidProperty(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("no space left: {0}")]
    NoSpace(String),

    #[error("resource busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Classify a raw errno, keeping the failing operation in the message.
    pub fn from_errno(op: &str, errno: Errno) -> Self {
        let msg = format!("{}: {}", op, errno.desc());
        match errno {
            Errno::ENOSPC => Error::NoSpace(msg),
            Errno::EBUSY => Error::Busy(msg),
            Errno::EACCES | Errno::EPERM => Error::Permission(msg),
            _ => Error::Io(msg),
        }
    }

    /// Classify an io::Error the same way `from_errno` does.
    pub fn from_io(op: &str, err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Error::from_errno(op, Errno::from_i32(code)),
            None => Error::Io(format!("{}: {}", op, err)),
        }
    }

    /// Stable kind name, as reported in RPC replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidValue(_) => "InvalidValue",
            Error::InvalidProperty(_) => "InvalidProperty",
            Error::InvalidState(_) => "InvalidState",
            Error::InvalidData(_) => "InvalidData",
            Error::Permission(_) => "Permission",
            Error::NoSpace(_) => "NoSpace",
            Error::Busy(_) => "Busy",
            Error::Io(_) => "IO",
            Error::Timeout(_) => "Timeout",
            Error::Unknown(_) => "Unknown",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::from_io("io", err)
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::from_errno("syscall", errno)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_classification() {
        assert_eq!(Error::from_errno("mkdir /x", Errno::ENOSPC).kind(), "NoSpace");
        assert_eq!(Error::from_errno("rmdir /x", Errno::EBUSY).kind(), "Busy");
        assert_eq!(Error::from_errno("write tasks", Errno::EACCES).kind(), "Permission");
        assert_eq!(Error::from_errno("write tasks", Errno::EPERM).kind(), "Permission");
        assert_eq!(Error::from_errno("open", Errno::ENOENT).kind(), "IO");
    }

    #[test]
    fn message_keeps_operation() {
        let err = Error::from_errno("rmdir(/sys/fs/cgroup/freezer/corral/a)", Errno::EBUSY);
        assert!(err.to_string().contains("rmdir(/sys/fs/cgroup/freezer/corral/a)"));
    }

    #[test]
    fn io_error_without_errno_stays_io() {
        let err = Error::from_io("read", std::io::Error::new(std::io::ErrorKind::Other, "oops"));
        assert_eq!(err.kind(), "IO");
    }
}
