//! Handoff report types sent from the `fork` child to its parent.

use serde::{Deserialize, Serialize};

/// Environment variable carrying the status pipe's write-end fd number.
pub const ENV_HANDOFF_FD: &str = "HARBOR_HANDOFF_FD";

/// Exit code of a `fork` child whose `jail_attach(2)` failed.
pub const ATTACH_FAILED_EXIT: i32 = 125;

/// Failure report written by the child before it exits.
///
/// Nothing is written on success: the pipe is close-on-exec in the child, so
/// a successful exec closes it with no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::exhaustive_enums)]
pub enum HandoffReport {
    /// `jail_attach(2)` was rejected by the kernel.
    AttachFailed {
        /// Jail identifier the child tried to join.
        jid: i32,
        /// Raw errno returned by the kernel.
        errno: i32,
    },
    /// The target command could not replace the child's image.
    ExecFailed {
        /// Program that failed to execute.
        program: String,
        /// Raw OS error, if the failure came from `execve(2)`.
        errno: Option<i32>,
        /// Human-readable failure description.
        message: String,
    },
}
