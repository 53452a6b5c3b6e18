//! FreeBSD jail management.
//!
//! `harbor` marshals jail descriptions into the two kernel formats, the
//! legacy `struct jail` record taken by `jail(2)` and the name/value
//! `struct iovec` arrays taken by `jail_set(2)` and `jail_get(2)`, and drives
//! the jail lifecycle through a [`Controller`].
//!
//! # Quick start
//!
//! ```no_run
//! use harbor::{Controller, JailFlags, JailSpec, Launcher};
//!
//! let spec = JailSpec::builder()
//!     .path("/jails/www")
//!     .name("www")
//!     .build()
//!     .expect("invalid jail spec");
//!
//! let mut ctl = Controller::new();
//! let jid = ctl
//!     .configure(JailFlags::CREATE, &spec.to_params().expect("params"))
//!     .expect("jail_set failed");
//!
//! // Run a command inside the jail from a child process; this process stays on the host.
//! let status = Launcher::current()
//!     .and_then(|l| l.launch(jid, &["/bin/sh".into()]))
//!     .expect("handoff failed");
//! println!("exited with {status}");
//! ```
//!
//! Every syscall goes through the [`Kernel`] trait. [`SystemKernel`] issues
//! the real calls on FreeBSD and fails with `ENOSYS` elsewhere.

mod controller;
mod error;
mod flags;
pub mod handoff;
mod iovec;
mod launcher;
mod params;
mod record;
mod spec;
mod sys;
#[cfg(test)]
mod testing;

pub use controller::{Controller, Fetched, JailId, State};
pub use error::{Error, HandoffError, Result, ValidationError};
pub use flags::JailFlags;
pub use iovec::{INT_OUTPUT_LEN, OUTPUT_CAPACITY, ParamVector, output_len};
pub use launcher::Launcher;
pub use params::{ParamValue, Params, is_integer_param};
pub use record::{LegacyRecord, RawJail};
pub use spec::{Address, Family, JAIL_API_VERSION, JailSpec, JailSpecBuilder, random_hostname};
pub use sys::{Kernel, SystemKernel};
