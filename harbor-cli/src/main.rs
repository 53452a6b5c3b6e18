//! CLI for running commands in FreeBSD jails.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod jail;
mod run;

use std::process::ExitStatus;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harbor", version, about = "Run commands in FreeBSD jails")]
struct Cli {
    /// Log syscalls and marshaled parameters.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a jail and run a command inside it.
    Run(Box<run::RunArgs>),

    /// Run a command inside an existing jail.
    Exec(jail::ExecArgs),

    /// Remove a jail, killing every process inside it.
    #[command(visible_alias = "rm")]
    Remove(jail::RemoveArgs),

    /// Print jail parameters.
    Get(jail::GetArgs),

    /// Attach to a jail and exec a command (used by `run --handoff` and `exec`).
    #[command(hide = true)]
    Fork(jail::ForkArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    match cli.dispatch() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("harbor: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout belongs to the jailed command.
fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

impl Cli {
    /// Runs the selected command and returns the process exit code.
    fn dispatch(self) -> Result<i32> {
        match self.command {
            Command::Run(args) => args.run(),
            Command::Exec(args) => args.run(),
            Command::Remove(args) => args.run().map(|()| 0),
            Command::Get(args) => args.run().map(|()| 0),
            Command::Fork(args) => Ok(args.run()),
            Command::Completion { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "harbor",
                    &mut std::io::stdout(),
                );
                Ok(0)
            }
        }
    }
}

/// Maps a child's exit status to ours, using the shell's `128 + signal` for signals.
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}
