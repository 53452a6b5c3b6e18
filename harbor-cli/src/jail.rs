//! Commands against existing jails: exec, remove, get, and the hidden fork.

use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::{Context, Result};
use harbor::{Controller, Fetched, JailId, Launcher, handoff, is_integer_param};
use tracing::debug;

/// Arguments for `harbor exec`.
///
/// Usage: `harbor exec JID COMMAND [ARG...]`
#[derive(clap::Args)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    /// Jail identifier.
    jid: JailId,

    /// Command and arguments to run inside the jail.
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl ExecArgs {
    pub fn run(self) -> Result<i32> {
        let status = Launcher::current()?
            .launch(self.jid, &self.command)
            .with_context(|| format!("running command in jail {}", self.jid))?;
        Ok(crate::exit_code(status))
    }
}

/// Arguments for `harbor remove`.
#[derive(clap::Args)]
pub struct RemoveArgs {
    /// Jail identifier.
    jid: JailId,
}

impl RemoveArgs {
    pub fn run(self) -> Result<()> {
        Controller::new()
            .remove(self.jid)
            .with_context(|| format!("removing jail {}", self.jid))
    }
}

/// Arguments for `harbor get`.
///
/// Usage: `harbor get JID KEY [KEY...]`
#[derive(clap::Args)]
pub struct GetArgs {
    /// Jail identifier.
    jid: JailId,

    /// Parameter names, e.g. `name path host.hostname`.
    #[arg(required = true)]
    keys: Vec<String>,
}

impl GetArgs {
    pub fn run(self) -> Result<()> {
        let keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        let values = Controller::new()
            .get(self.jid, &keys)
            .with_context(|| format!("reading jail {}", self.jid))?;
        for v in &values {
            println!("{}={}", v.key, render(v));
        }
        Ok(())
    }
}

/// Arguments for the hidden `harbor fork`.
///
/// Usage: `harbor fork JID [--] COMMAND [ARG...]`
#[derive(clap::Args)]
#[command(trailing_var_arg = true)]
pub struct ForkArgs {
    /// Jail to attach to.
    pub jid: JailId,

    /// Command to exec once inside.
    #[arg(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ForkArgs {
    /// Attaches and execs; returns only with the failure's exit code.
    pub fn run(self) -> i32 {
        let err = handoff::enter(self.jid, &self.command);
        // The parent reads the report and prints the error.
        debug!("handoff failed: {err}");
        err.exit_code()
    }
}

/// Formats a fetched value for display.
fn render(v: &Fetched) -> String {
    let key = v.key.as_str();
    if key == "ip4.addr" {
        return join(v.value.chunks_exact(4).filter_map(|c| {
            <[u8; 4]>::try_from(c).ok().map(|b| Ipv4Addr::from(b).to_string())
        }));
    }
    if key == "ip6.addr" {
        return join(v.value.chunks_exact(16).filter_map(|c| {
            <[u8; 16]>::try_from(c).ok().map(|b| Ipv6Addr::from(b).to_string())
        }));
    }
    if is_integer_param(key) {
        if let Some(n) = v.as_u32() {
            return n.to_string();
        }
    }
    match v.as_str() {
        Some(s) => s.to_owned(),
        None => v.value.iter().fold(String::new(), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        }),
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fetched(key: &str, value: &[u8]) -> Fetched {
        Fetched {
            key: key.into(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn strings_stop_at_nul() {
        assert_eq!(render(&fetched("name", b"www\0\0\0")), "www");
    }

    #[test]
    fn integers_and_permissions() {
        assert_eq!(render(&fetched("jid", &5_u32.to_ne_bytes())), "5");
        assert_eq!(render(&fetched("allow.mount", &1_u32.to_ne_bytes())), "1");
    }

    #[test]
    fn address_lists() {
        let v4 = [127, 0, 0, 1, 10, 0, 0, 5];
        assert_eq!(render(&fetched("ip4.addr", &v4)), "127.0.0.1,10.0.0.5");
        assert_eq!(
            render(&fetched("ip6.addr", &Ipv6Addr::LOCALHOST.octets())),
            "::1"
        );
    }

    #[test]
    fn binary_falls_back_to_hex() {
        assert_eq!(render(&fetched("blob", &[0xff, 0xfe])), "fffe");
    }
}
