//! Wire format for harbor's fork/attach handoff.
//!
//! A re-exec'd child reports a failed attach or exec to its parent by writing
//! a single [`HandoffReport`] over a close-on-exec status pipe. Messages are
//! serialized with [`postcard`] and framed with a 4-byte big-endian length
//! prefix. A pipe that reaches EOF without a frame means the child exec'd the
//! target command successfully.

mod codec;
mod message;

pub use codec::{encode, read_report};
pub use message::{ATTACH_FAILED_EXIT, ENV_HANDOFF_FD, HandoffReport};
