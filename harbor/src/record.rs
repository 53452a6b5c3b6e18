//! Fixed-layout `struct jail` for the legacy `jail(2)` call.

use std::ffi::{CString, c_char};
use std::ptr;

use crate::error::Result;
use crate::spec::{Family, JailSpec};

/// C layout of `struct jail` (`sys/jail.h`, `JAIL_API_VERSION` 2).
#[repr(C)]
#[derive(Debug)]
pub struct RawJail {
    /// Structure version.
    pub version: u32,
    /// Jail root directory.
    pub path: *mut c_char,
    /// Hostname.
    pub hostname: *mut c_char,
    /// Jail name.
    pub jailname: *mut c_char,
    /// Number of IPv4 addresses at `ip4`.
    pub ip4s: u32,
    /// Number of IPv6 addresses at `ip6`.
    pub ip6s: u32,
    /// Contiguous `struct in_addr` array.
    pub ip4: *mut u8,
    /// Contiguous `struct in6_addr` array.
    pub ip6: *mut u8,
}

/// A `struct jail` together with every buffer it points into.
///
/// The strings and address arrays are heap allocations owned by this value,
/// so the pointers in [`RawJail`] stay valid for as long as the record is
/// alive, including across moves. It is built for one call and dropped.
#[derive(Debug)]
pub struct LegacyRecord {
    /// NUL-terminated jail root.
    path: CString,
    /// NUL-terminated hostname.
    hostname: CString,
    /// NUL-terminated jail name.
    name: CString,
    /// Concatenated 4-byte addresses.
    ip4: Box<[u8]>,
    /// Concatenated 16-byte addresses.
    ip6: Box<[u8]>,
    /// The record handed to the kernel.
    raw: RawJail,
}

impl LegacyRecord {
    /// Marshals `spec` into a `struct jail`.
    ///
    /// Fails if an address is neither 4 nor 16 bytes long or a string holds
    /// an interior NUL.
    pub fn new(spec: &JailSpec) -> Result<Self> {
        let mut ip4 = Vec::new();
        let mut ip6 = Vec::new();
        for addr in &spec.addresses {
            match addr.family()? {
                Family::V4 => ip4.extend_from_slice(addr.as_bytes()),
                Family::V6 => ip6.extend_from_slice(addr.as_bytes()),
            }
        }

        let path = CString::new(spec.root()?)?;
        let hostname = CString::new(spec.hostname.as_str())?;
        let name = CString::new(spec.name.as_str())?;
        let mut ip4 = ip4.into_boxed_slice();
        let mut ip6 = ip6.into_boxed_slice();

        let raw = RawJail {
            version: spec.version,
            path: path.as_ptr().cast_mut(),
            hostname: hostname.as_ptr().cast_mut(),
            jailname: name.as_ptr().cast_mut(),
            ip4s: count(ip4.len() / 4),
            ip6s: count(ip6.len() / 16),
            ip4: array_ptr(&mut ip4),
            ip6: array_ptr(&mut ip6),
        };

        Ok(Self {
            path,
            hostname,
            name,
            ip4,
            ip6,
            raw,
        })
    }

    /// Returns the record handed to `jail(2)`.
    pub const fn raw(&self) -> &RawJail {
        &self.raw
    }

    /// Returns the concatenated IPv4 address bytes.
    pub fn ip4_bytes(&self) -> &[u8] {
        &self.ip4
    }

    /// Returns the concatenated IPv6 address bytes.
    pub fn ip6_bytes(&self) -> &[u8] {
        &self.ip6
    }

    /// Returns the NUL-terminated path.
    pub fn path(&self) -> &CString {
        &self.path
    }

    /// Returns the NUL-terminated hostname.
    pub fn hostname(&self) -> &CString {
        &self.hostname
    }

    /// Returns the NUL-terminated jail name.
    pub fn name(&self) -> &CString {
        &self.name
    }
}

/// Pointer to an address array, or null when it is empty.
fn array_ptr(buf: &mut [u8]) -> *mut u8 {
    if buf.is_empty() {
        ptr::null_mut()
    } else {
        buf.as_mut_ptr()
    }
}

/// Address counts are bounded by memory; saturate instead of wrapping.
fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
