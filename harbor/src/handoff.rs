//! Status pipe and child side of the fork/attach/exec handoff.
//!
//! The launcher creates a pipe before spawning `harbor fork`. The read end
//! is close-on-exec and stays in the parent. The write end is inherited by
//! the child, which marks it close-on-exec, attaches to the jail, and execs
//! the target. If anything fails first, the child writes a
//! [`HandoffReport`] into the pipe; a successful exec closes the pipe with
//! nothing written.

#![allow(unsafe_code)]

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::Command;

use harbor_proto::{ENV_HANDOFF_FD, HandoffReport};
use nix::errno::Errno;
use tracing::{debug, warn};

use crate::controller::{Controller, JailId};
use crate::error::HandoffError;
use crate::sys::Kernel;

/// Parent-side read end of the status pipe.
#[derive(Debug)]
pub struct StatusReader(File);

impl StatusReader {
    /// Blocks until the child execs or exits, returning its report, if any.
    pub fn read_report(mut self) -> io::Result<Option<HandoffReport>> {
        harbor_proto::read_report(&mut self.0)
    }
}

/// Creates a status pipe.
///
/// Returns `(child_fd, reader)`:
/// - `child_fd`: write end, created **without** `O_CLOEXEC` so it survives
///   the exec into `harbor fork`. The parent must drop it after spawning.
/// - `reader`: read end with `O_CLOEXEC` set so it does not leak into the child.
pub fn channel() -> io::Result<(OwnedFd, StatusReader)> {
    let mut fds: [RawFd; 2] = [0; 2];

    // SAFETY: pipe() is a standard POSIX call; fds is a valid 2-element array.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both FDs are valid after a successful pipe() call.
    let read_fd = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_fd = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    set_cloexec(&read_fd)?;

    Ok((write_fd, StatusReader(File::from(read_fd))))
}

/// Sets `FD_CLOEXEC` on a file descriptor.
fn set_cloexec(fd: &impl AsRawFd) -> io::Result<()> {
    // SAFETY: fcntl(F_SETFD) is async-signal-safe and the FD is valid.
    let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Takes ownership of the write end named by [`ENV_HANDOFF_FD`], if any.
fn status_writer() -> Option<File> {
    let raw = std::env::var(ENV_HANDOFF_FD).ok()?;
    let Ok(fd) = raw.parse::<RawFd>() else {
        warn!(value = %raw, "ignoring invalid {ENV_HANDOFF_FD}");
        return None;
    };
    // SAFETY: fcntl(F_GETFD) only inspects the descriptor table.
    if fd < 0 || unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
        warn!(fd, "{ENV_HANDOFF_FD} does not name an open descriptor");
        return None;
    }
    // SAFETY: the launcher passed this descriptor to us and nothing else in
    // this process owns it.
    let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
    if let Err(e) = set_cloexec(&file) {
        warn!(fd, "cannot mark status pipe close-on-exec: {e}");
        return None;
    }
    Some(file)
}

/// Writes `report` to the status pipe. The parent may be gone; failures are logged.
fn send(status: Option<&mut File>, report: &HandoffReport) {
    if let Some(w) = status {
        if let Err(e) = harbor_proto::encode(w, report) {
            warn!("cannot write handoff report: {e}");
        }
    }
}

/// Child side of the handoff, against the host kernel.
///
/// Attaches to `jid` and replaces the process image with `argv`. Returns
/// only on failure, after reporting it to the launcher.
pub fn enter(jid: JailId, argv: &[String]) -> HandoffError {
    enter_with(&mut Controller::new(), jid, argv)
}

/// [`enter`] with an explicit controller.
pub fn enter_with<K: Kernel>(
    ctl: &mut Controller<K>,
    jid: JailId,
    argv: &[String],
) -> HandoffError {
    let mut status = status_writer();

    if let Err(e) = ctl.attach(jid) {
        let errno = e.errno().unwrap_or(Errno::EINVAL);
        send(
            status.as_mut(),
            &HandoffReport::AttachFailed {
                jid: jid.get(),
                errno: errno as i32,
            },
        );
        return HandoffError::Attach { jid, errno };
    }

    let Some((program, args)) = argv.split_first() else {
        let err = HandoffError::Exec {
            program: String::new(),
            errno: None,
            message: "empty command".into(),
        };
        send(status.as_mut(), &report_for(&err));
        return err;
    };

    debug!(%jid, %program, "exec");
    let e = Command::new(program)
        .args(args)
        .env_remove(ENV_HANDOFF_FD)
        .exec();

    let err = HandoffError::Exec {
        program: program.clone(),
        errno: e.raw_os_error().map(Errno::from_raw),
        message: e.to_string(),
    };
    send(status.as_mut(), &report_for(&err));
    err
}

/// Wire form of a handoff failure.
fn report_for(err: &HandoffError) -> HandoffReport {
    match err {
        HandoffError::Attach { jid, errno } => HandoffReport::AttachFailed {
            jid: jid.get(),
            errno: *errno as i32,
        },
        HandoffError::Exec {
            program,
            errno,
            message,
        } => HandoffReport::ExecFailed {
            program: program.clone(),
            errno: errno.map(|e| e as i32),
            message: message.clone(),
        },
    }
}

impl From<HandoffReport> for HandoffError {
    fn from(report: HandoffReport) -> Self {
        match report {
            HandoffReport::AttachFailed { jid, errno } => Self::Attach {
                jid: JailId::new(jid),
                errno: Errno::from_raw(errno),
            },
            HandoffReport::ExecFailed {
                program,
                errno,
                message,
            } => Self::Exec {
                program,
                errno: errno.map(Errno::from_raw),
                message,
            },
        }
    }
}
