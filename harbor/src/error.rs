//! Error types for harbor operations.

use std::ffi::NulError;

use nix::errno::Errno;

use crate::JailId;

/// Alias for `Result<T, harbor::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by harbor jail operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input caught before any syscall was issued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A jail syscall returned an error.
    ///
    /// `message` is the text the kernel wrote into the `errmsg` parameter,
    /// when the call supports one and the kernel filled it in.
    #[error("{op}: {errno}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Kernel {
        /// The syscall that failed.
        op: &'static str,
        /// The errno reported by the kernel.
        errno: Errno,
        /// Diagnostic text from the kernel's `errmsg` parameter.
        message: Option<String>,
    },

    /// The process already joined a jail; no further lifecycle transition is possible.
    #[error("process is already attached to jail {0}")]
    AlreadyAttached(JailId),

    /// The re-exec'd child failed before running the target command.
    #[error(transparent)]
    Handoff(#[from] HandoffError),

    /// An I/O error while spawning or talking to a child process.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the kernel errno if this is a kernel rejection.
    pub const fn errno(&self) -> Option<Errno> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Builds a kernel rejection without diagnostic text.
    pub(crate) const fn kernel(op: &'static str, errno: Errno) -> Self {
        Self::Kernel {
            op,
            errno,
            message: None,
        }
    }
}

/// Input that cannot be marshaled into a kernel structure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// An address is neither 4 (IPv4) nor 16 (IPv6) bytes long.
    #[error("unexpected address length {len}: expected 4 or 16 bytes")]
    AddressLength {
        /// The offending length.
        len: usize,
    },

    /// A parameter name position holds a non-string value.
    #[error("parameter must be a string (entry {index})")]
    NonStringKey {
        /// Index of the entry in the flat parameter sequence.
        index: usize,
    },

    /// A parameter name is the last entry and has no value.
    #[error("parameter {key:?} has no value")]
    MissingValue {
        /// The dangling parameter name.
        key: String,
    },

    /// A dynamic value has no jail parameter encoding.
    #[error("unsupported value type for {key:?}: {kind}")]
    UnsupportedValueType {
        /// Parameter name the value was given for.
        key: String,
        /// Description of the rejected value.
        kind: &'static str,
    },

    /// A jail root path is not valid UTF-8.
    #[error("jail root {path:?} is not valid UTF-8")]
    NonUtf8Path {
        /// The rejected path.
        path: std::path::PathBuf,
    },

    /// A jail identifier is negative and cannot name any jail.
    #[error("invalid jail identifier {jid}")]
    NegativeJailId {
        /// The rejected identifier.
        jid: i32,
    },

    /// A string argument contained an interior NUL byte.
    #[error("interior NUL byte in string argument")]
    InteriorNul(#[from] NulError),
}

impl From<NulError> for Error {
    fn from(e: NulError) -> Self {
        Self::Validation(e.into())
    }
}

/// Failure reported by the `fork` child over the status pipe.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandoffError {
    /// The child could not join the jail.
    #[error("child failed to attach to jail {jid}: {errno}")]
    Attach {
        /// The jail the child tried to join.
        jid: JailId,
        /// The errno returned by `jail_attach(2)`.
        errno: Errno,
    },

    /// The child joined the jail but could not exec the target command.
    #[error("child failed to exec {program:?}: {message}")]
    Exec {
        /// The program that failed to start.
        program: String,
        /// The OS error from `execve(2)`, if any.
        errno: Option<Errno>,
        /// Human-readable failure description.
        message: String,
    },
}

impl HandoffError {
    /// Exit code the `fork` child terminates with for this failure.
    ///
    /// Attach failures use [`harbor_proto::ATTACH_FAILED_EXIT`]; exec
    /// failures follow the shell convention of 126 (found but not
    /// executable) and 127 (everything else).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Attach { .. } => harbor_proto::ATTACH_FAILED_EXIT,
            Self::Exec {
                errno: Some(Errno::EACCES | Errno::ENOEXEC),
                ..
            } => 126,
            Self::Exec { .. } => 127,
        }
    }
}
