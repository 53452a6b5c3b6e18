//! Runs a command inside a jail from a separate process.
//!
//! `jail_attach(2)` moves the *calling* process, so a supervisor that wants
//! to stay on the host re-executes itself as `harbor fork <jid> -- <argv>`.
//! The child attaches, then execs the target; [`Launcher::launch`] waits for
//! it and turns any handoff report into an [`Error::Handoff`].

use std::ffi::OsString;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use harbor_proto::ENV_HANDOFF_FD;
use tracing::{debug, info};

use crate::controller::JailId;
use crate::error::{Error, HandoffError, Result};
use crate::handoff;

/// Spawns the hidden `fork` subcommand for a jail.
#[derive(Debug, Clone)]
pub struct Launcher {
    /// Executable to spawn.
    program: PathBuf,
    /// Arguments placed before `<jid> -- <argv>`.
    prefix: Vec<OsString>,
}

impl Launcher {
    /// Re-executes the running binary with the `fork` subcommand.
    pub fn current() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, ["fork"]))
    }

    /// Spawns `program prefix... <jid> -- <argv>`.
    pub fn new<I, S>(program: impl Into<PathBuf>, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            prefix: prefix.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the child command without the status pipe.
    pub fn command(&self, jid: JailId, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix)
            .arg(jid.to_string())
            .arg("--")
            .args(argv);
        cmd
    }

    /// Runs `argv` inside `jid` and waits for it.
    ///
    /// Stdio is inherited. A non-zero exit of the target is returned as the
    /// status, not as an error; a failed attach or exec becomes
    /// [`Error::Handoff`].
    pub fn launch(&self, jid: JailId, argv: &[String]) -> Result<ExitStatus> {
        let (child_fd, reader) = handoff::channel()?;

        let mut cmd = self.command(jid, argv);
        cmd.env(ENV_HANDOFF_FD, child_fd.as_raw_fd().to_string());

        debug!(program = %self.program.display(), %jid, "spawning handoff child");
        let mut child = cmd.spawn()?;
        drop(child_fd);

        let report = reader.read_report();
        let status = child.wait()?;

        if let Some(report) = report? {
            return Err(Error::Handoff(HandoffError::from(report)));
        }
        info!(%jid, pid = child.id(), %status, "command exited");
        Ok(status)
    }
}
