//! The jail syscall boundary.
//!
//! [`Kernel`] has one method per jail syscall and speaks in terms of the
//! marshaled structures. [`SystemKernel`] issues the real calls on FreeBSD;
//! on other systems every call fails with `ENOSYS`. All `unsafe` code that
//! hands pointers to the kernel is confined to this module.

#![allow(unsafe_code)]

use nix::errno::Errno;

use crate::flags::JailFlags;
use crate::iovec::ParamVector;
use crate::record::LegacyRecord;

/// The jail syscalls, one method each.
///
/// Every method is a single synchronous attempt; implementations must not
/// retry. On success the returned integer is the jail identifier.
pub trait Kernel {
    /// `jail(2)`: create a jail from a legacy record.
    fn jail(&self, record: &LegacyRecord) -> Result<i32, Errno>;

    /// `jail_set(2)`: create or update a jail from a parameter vector.
    fn jail_set(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno>;

    /// `jail_get(2)`: fill the vector's output slots for an existing jail.
    fn jail_get(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno>;

    /// `jail_attach(2)`: move the calling process into a jail.
    fn jail_attach(&self, jid: i32) -> Result<(), Errno>;

    /// `jail_remove(2)`: kill every process in a jail and remove it.
    fn jail_remove(&self, jid: i32) -> Result<(), Errno>;
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn jail(&self, record: &LegacyRecord) -> Result<i32, Errno> {
        (**self).jail(record)
    }

    fn jail_set(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno> {
        (**self).jail_set(params, flags)
    }

    fn jail_get(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno> {
        (**self).jail_get(params, flags)
    }

    fn jail_attach(&self, jid: i32) -> Result<(), Errno> {
        (**self).jail_attach(jid)
    }

    fn jail_remove(&self, jid: i32) -> Result<(), Errno> {
        (**self).jail_remove(jid)
    }
}

/// The host kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKernel;

#[cfg(target_os = "freebsd")]
impl Kernel for SystemKernel {
    fn jail(&self, record: &LegacyRecord) -> Result<i32, Errno> {
        let raw = std::ptr::from_ref(record.raw()).cast_mut().cast::<libc::jail>();
        // SAFETY: RawJail has the layout of `struct jail` and every pointer in
        // it references a buffer owned by `record`, alive for this call.
        Errno::result(unsafe { libc::jail(raw) })
    }

    fn jail_set(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno> {
        let iov = params.descriptors_mut();
        let niov = libc::c_uint::try_from(iov.len()).map_err(|_| Errno::E2BIG)?;
        // SAFETY: each descriptor references a buffer owned by `params`, or is
        // a zero-length flag; the kernel reads at most `iov_len` bytes.
        Errno::result(unsafe { libc::jail_set(iov.as_mut_ptr(), niov, raw_flags(flags)) })
    }

    fn jail_get(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno> {
        let iov = params.descriptors_mut();
        let niov = libc::c_uint::try_from(iov.len()).map_err(|_| Errno::E2BIG)?;
        // SAFETY: as for jail_set; output slots are writable for `iov_len`
        // bytes and the kernel only shrinks `iov_len`.
        Errno::result(unsafe { libc::jail_get(iov.as_mut_ptr(), niov, raw_flags(flags)) })
    }

    fn jail_attach(&self, jid: i32) -> Result<(), Errno> {
        // SAFETY: plain integer argument.
        Errno::result(unsafe { libc::jail_attach(jid) }).map(drop)
    }

    fn jail_remove(&self, jid: i32) -> Result<(), Errno> {
        // SAFETY: plain integer argument.
        Errno::result(unsafe { libc::jail_remove(jid) }).map(drop)
    }
}

/// Converts flags to the C `int` argument.
#[cfg(target_os = "freebsd")]
fn raw_flags(flags: JailFlags) -> libc::c_int {
    libc::c_int::try_from(flags.bits()).unwrap_or(libc::c_int::MAX)
}

#[cfg(not(target_os = "freebsd"))]
impl Kernel for SystemKernel {
    fn jail(&self, _record: &LegacyRecord) -> Result<i32, Errno> {
        Err(Errno::ENOSYS)
    }

    fn jail_set(&self, _params: &mut ParamVector, _flags: JailFlags) -> Result<i32, Errno> {
        Err(Errno::ENOSYS)
    }

    fn jail_get(&self, _params: &mut ParamVector, _flags: JailFlags) -> Result<i32, Errno> {
        Err(Errno::ENOSYS)
    }

    fn jail_attach(&self, _jid: i32) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    fn jail_remove(&self, _jid: i32) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
}

#[cfg(all(test, not(target_os = "freebsd")))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::Params;

    #[test]
    fn unsupported_platform_reports_enosys() {
        let mut v = ParamVector::new(&Params::new().string("name", "x")).unwrap();
        let k = SystemKernel;
        assert_eq!(k.jail_attach(1), Err(Errno::ENOSYS));
        assert_eq!(k.jail_remove(1), Err(Errno::ENOSYS));
        assert_eq!(k.jail_set(&mut v, JailFlags::CREATE), Err(Errno::ENOSYS));
    }
}
