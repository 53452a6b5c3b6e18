//! Jail lifecycle: create, configure, attach, query, remove.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{Error, Result, ValidationError};
use crate::flags::JailFlags;
use crate::iovec::{OUTPUT_CAPACITY, ParamVector, output_len};
use crate::params::Params;
use crate::record::LegacyRecord;
use crate::spec::JailSpec;
use crate::sys::{Kernel, SystemKernel};

/// Kernel-assigned jail identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JailId(i32);

impl JailId {
    /// Wraps a raw identifier. The kernel rejects values it does not know.
    pub const fn new(jid: i32) -> Self {
        Self(jid)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for JailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JailId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Where a [`Controller`] is in the jail lifecycle.
///
/// `Attached` has no outgoing edge: a process cannot leave a jail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum State {
    /// No jail has been created or joined yet.
    #[default]
    Unconfigured,
    /// A jail exists; the calling process is outside it.
    Created(JailId),
    /// The calling process is inside the jail.
    Attached(JailId),
}

/// A parameter value read back by [`Controller::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Parameter name.
    pub key: String,
    /// Bytes the kernel wrote.
    pub value: Vec<u8>,
}

impl Fetched {
    /// Interprets the value as a NUL-terminated string.
    pub fn as_str(&self) -> Option<&str> {
        let end = self
            .value
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.value.len());
        std::str::from_utf8(&self.value[..end]).ok()
    }

    /// Interprets the value as a native-endian 32-bit integer.
    pub fn as_u32(&self) -> Option<u32> {
        self.value
            .as_slice()
            .try_into()
            .ok()
            .map(u32::from_ne_bytes)
    }
}

/// Drives jail syscalls and tracks the resulting identifier.
///
/// # Example
///
/// ```no_run
/// use harbor::{Controller, JailFlags, Params};
///
/// let mut ctl = Controller::new();
/// let jid = ctl
///     .configure(
///         JailFlags::CREATE | JailFlags::ATTACH,
///         &Params::new().string("path", "/jails/www").string("name", "www"),
///     )
///     .expect("jail_set failed");
/// // This process now runs inside jail `jid`.
/// # let _ = jid;
/// ```
#[derive(Debug, Default)]
pub struct Controller<K = SystemKernel> {
    /// Syscall implementation.
    kernel: K,
    /// Lifecycle position.
    state: State,
}

impl Controller {
    /// Returns a controller that talks to the host kernel.
    pub fn new() -> Self {
        Self::with_kernel(SystemKernel)
    }
}

impl<K: Kernel> Controller<K> {
    /// Returns a controller that talks to `kernel`.
    pub const fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            state: State::Unconfigured,
        }
    }

    /// Current lifecycle position.
    pub const fn state(&self) -> State {
        self.state
    }

    /// Identifier of the tracked jail, if any.
    pub const fn jid(&self) -> Option<JailId> {
        match self.state {
            State::Unconfigured => None,
            State::Created(jid) | State::Attached(jid) => Some(jid),
        }
    }

    /// Returns the syscall implementation.
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Creates a jail with the legacy `jail(2)` call.
    ///
    /// The kernel also attaches the caller on success, exactly as
    /// `jail_set(2)` with `CREATE | ATTACH` does.
    pub fn create(&mut self, spec: &JailSpec) -> Result<JailId> {
        self.ensure_not_attached()?;
        let record = LegacyRecord::new(spec)?;
        debug!(path = %spec.path.display(), name = %spec.name, "jail(2)");

        let jid = self
            .kernel
            .jail(&record)
            .map_err(|errno| Error::kernel("jail", errno))?;
        drop(record);

        let jid = JailId(jid);
        info!(%jid, path = %spec.path.display(), "created jail");
        self.state = State::Attached(jid);
        Ok(jid)
    }

    /// Creates or updates a jail with `jail_set(2)`.
    ///
    /// Flag combinations are not checked here; the kernel rejects a call
    /// without `CREATE` or `UPDATE` with `EINVAL`.
    pub fn configure(&mut self, flags: JailFlags, params: &Params) -> Result<JailId> {
        if flags.intersects(JailFlags::CREATE | JailFlags::ATTACH) {
            self.ensure_not_attached()?;
        }

        let mut iov = ParamVector::new(params)?;
        let errmsg = iov.push_output("errmsg", OUTPUT_CAPACITY)?;
        debug!(%flags, descriptors = iov.len(), "jail_set(2)");

        let jid = match self.kernel.jail_set(&mut iov, flags) {
            Ok(jid) => JailId(jid),
            Err(errno) => {
                return Err(Error::Kernel {
                    op: "jail_set",
                    errno,
                    message: iov.output_string(errmsg),
                });
            }
        };

        if flags.contains(JailFlags::ATTACH) {
            info!(%jid, %flags, "configured jail and attached");
            self.state = State::Attached(jid);
        } else {
            info!(%jid, %flags, "configured jail");
            if self.state == State::Unconfigured || flags.contains(JailFlags::CREATE) {
                self.state = State::Created(jid);
            }
        }
        Ok(jid)
    }

    /// Moves the calling process into jail `jid` with `jail_attach(2)`.
    ///
    /// This is one-way: on success the process and its future children stay
    /// inside the jail.
    pub fn attach(&mut self, jid: JailId) -> Result<()> {
        self.ensure_not_attached()?;
        debug!(%jid, "jail_attach(2)");
        self.kernel
            .jail_attach(jid.0)
            .map_err(|errno| Error::kernel("jail_attach", errno))?;
        info!(%jid, "attached to jail");
        self.state = State::Attached(jid);
        Ok(())
    }

    /// Removes jail `jid` with `jail_remove(2)`, killing its processes.
    pub fn remove(&mut self, jid: JailId) -> Result<()> {
        debug!(%jid, "jail_remove(2)");
        self.kernel
            .jail_remove(jid.0)
            .map_err(|errno| Error::kernel("jail_remove", errno))?;
        info!(%jid, "removed jail");
        if self.state == State::Created(jid) {
            self.state = State::Unconfigured;
        }
        Ok(())
    }

    /// Reads parameters of jail `jid` with `jail_get(2)`.
    ///
    /// Each value comes back as the raw bytes the kernel wrote; use
    /// [`Fetched::as_str`] or [`Fetched::as_u32`] to interpret them.
    pub fn get(&self, jid: JailId, keys: &[&str]) -> Result<Vec<Fetched>> {
        let raw =
            u32::try_from(jid.0).map_err(|_| ValidationError::NegativeJailId { jid: jid.0 })?;
        let mut iov = ParamVector::new(&Params::new().u32("jid", raw))?;
        let slots = keys
            .iter()
            .map(|k| iov.push_output(k, output_len(k)))
            .collect::<Result<Vec<_>>>()?;
        let errmsg = iov.push_output("errmsg", OUTPUT_CAPACITY)?;
        debug!(%jid, ?keys, "jail_get(2)");

        if let Err(errno) = self.kernel.jail_get(&mut iov, JailFlags::NONE) {
            return Err(Error::Kernel {
                op: "jail_get",
                errno,
                message: iov.output_string(errmsg),
            });
        }

        Ok(keys
            .iter()
            .zip(slots)
            .map(|(key, slot)| Fetched {
                key: (*key).to_owned(),
                value: iov.segment(slot).unwrap_or_default().to_vec(),
            })
            .collect())
    }

    /// Fails if the process already joined a jail.
    fn ensure_not_attached(&self) -> Result<()> {
        match self.state {
            State::Attached(jid) => Err(Error::AlreadyAttached(jid)),
            _ => Ok(()),
        }
    }
}
