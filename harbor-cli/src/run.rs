//! `harbor run`: create a jail and run a command inside it.
//!
//! Usage: `harbor run [OPTIONS] ROOT COMMAND [ARG...]`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use harbor::{Controller, JailFlags, JailSpec, Launcher, Params};
use tracing::warn;

/// Arguments for `harbor run`.
#[derive(clap::Args)]
#[command(trailing_var_arg = true)]
pub struct RunArgs {
    /// Root directory of the jail.
    root: PathBuf,

    /// Jail name.
    #[arg(long, default_value = "harbor")]
    name: String,

    /// Hostname inside the jail (random if omitted).
    #[arg(long)]
    hostname: Option<String>,

    /// NIS domain name inside the jail.
    #[arg(long)]
    domainname: Option<String>,

    /// Address the jail may use; repeat for more (default: 127.0.0.1).
    #[arg(long = "ip", value_name = "ADDR")]
    ips: Vec<IpAddr>,

    /// Maximum number of child jails.
    #[arg(long, value_name = "N")]
    children_max: Option<u32>,

    /// Which mounts `statfs(2)` reveals (0, 1 or 2).
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u32).range(0..=2))]
    enforce_statfs: Option<u32>,

    /// Grant a permission, e.g. `raw_sockets` or `mount.devfs`; repeatable.
    #[arg(long, value_name = "PERM")]
    allow: Vec<String>,

    /// Extra jail parameters from a JSON object.
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Stay outside the jail and run the command through a re-exec'd child.
    #[arg(long)]
    handoff: bool,

    /// Remove the jail when the command exits.
    #[arg(long, requires = "handoff")]
    rm: bool,

    /// Create the jail with the legacy `jail(2)` call.
    #[arg(
        long,
        conflicts_with_all = ["handoff", "domainname", "children_max", "enforce_statfs", "allow", "params"]
    )]
    legacy: bool,

    /// Command and arguments to run inside the jail.
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl RunArgs {
    pub fn run(self) -> Result<i32> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("resolving jail root {}", self.root.display()))?;
        let spec = self.spec(&root)?;
        let mut ctl = Controller::new();

        if self.legacy {
            ctl.create(&spec).context("creating jail")?;
            return spawn(&self.command);
        }

        let params = self.params(&spec)?;
        if !self.handoff {
            ctl.configure(JailFlags::CREATE | JailFlags::ATTACH, &params)
                .context("creating jail")?;
            return spawn(&self.command);
        }

        let jid = ctl
            .configure(JailFlags::CREATE, &params)
            .context("creating jail")?;
        let result = Launcher::current().and_then(|l| l.launch(jid, &self.command));
        if self.rm {
            if let Err(e) = ctl.remove(jid) {
                warn!(%jid, "cannot remove jail: {e}");
            }
        } else {
            eprintln!("{jid}");
        }
        let status = result.with_context(|| format!("running command in jail {jid}"))?;
        Ok(crate::exit_code(status))
    }

    /// Builds the `JailSpec` shared by both creation calls.
    fn spec(&self, root: &Path) -> Result<JailSpec> {
        let mut b = JailSpec::builder().path(root).name(self.name.as_str());
        if let Some(h) = &self.hostname {
            b = b.hostname(h.as_str());
        }
        for ip in &self.ips {
            b = b.address(*ip);
        }
        Ok(b.build()?)
    }

    /// Adds the `jail_set(2)`-only options to the `JailSpec` parameters.
    fn params(&self, spec: &JailSpec) -> Result<Params> {
        let mut p = spec.to_params()?;
        if let Some(d) = &self.domainname {
            p = p.string("host.domainname", d.as_str());
        }
        if let Some(n) = self.children_max {
            p = p.u32("children.max", n);
        }
        if let Some(n) = self.enforce_statfs {
            p = p.u32("enforce_statfs", n);
        }
        for perm in &self.allow {
            p = p.flag(format!("allow.{perm}"));
        }
        if self.handoff {
            // Without a process inside, the jail would die as soon as it is created.
            p = p.flag("persist");
        }
        if let Some(path) = &self.params {
            let extra = Params::from_json_file(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?;
            p = p.extend(extra);
        }
        Ok(p)
    }
}

/// Runs `argv` in this process's jail and waits for it.
fn spawn(argv: &[String]) -> Result<i32> {
    let (program, args) = argv.split_first().context("empty command")?;
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("running {program:?}"))?;
    Ok(crate::exit_code(status))
}
