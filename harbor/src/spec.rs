//! Jail description: root path, hostname, name, and addresses.

use std::ffi::CString;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use crate::error::{Result, ValidationError};
use crate::params::Params;

/// `struct jail` version understood by `jail(2)` (`JAIL_API_VERSION`).
pub const JAIL_API_VERSION: u32 = 2;

/// Address family, derived from an address's byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Family {
    /// 4-byte IPv4 address.
    V4,
    /// 16-byte IPv6 address.
    V6,
}

/// A network address in network byte order.
///
/// Any byte string can be held; only 4- and 16-byte values survive
/// [`JailSpecBuilder::build`] and the marshalers.
#[derive(Clone, PartialEq, Eq)]
pub struct Address(Vec<u8>);

impl Address {
    /// Wraps raw address bytes without validation.
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the family, or an error if the length is neither 4 nor 16.
    pub fn family(&self) -> std::result::Result<Family, ValidationError> {
        match self.0.len() {
            4 => Ok(Family::V4),
            16 => Ok(Family::V6),
            len => Err(ValidationError::AddressLength { len }),
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip.octets().to_vec())
    }
}

impl From<Ipv6Addr> for Address {
    fn from(ip: Ipv6Addr) -> Self {
        Self(ip.octets().to_vec())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(v4) = <[u8; 4]>::try_from(self.0.as_slice()) {
            return write!(f, "{}", Ipv4Addr::from(v4));
        }
        if let Ok(v6) = <[u8; 16]>::try_from(self.0.as_slice()) {
            return write!(f, "{}", Ipv6Addr::from(v6));
        }
        write!(f, "Address({:02x?})", self.0)
    }
}

/// Desired state of a jail.
///
/// Build one with [`JailSpec::builder`]; fields are public so callers can
/// also assemble a spec directly, in which case the marshalers perform the
/// same validation as the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct JailSpec {
    /// `struct jail` version for the legacy call.
    pub version: u32,
    /// Root directory of the jail.
    pub path: PathBuf,
    /// Hostname inside the jail.
    pub hostname: String,
    /// Jail name. Empty means "let the kernel use the jid".
    pub name: String,
    /// IPv4 and IPv6 addresses, in order.
    pub addresses: Vec<Address>,
}

impl JailSpec {
    /// Returns a builder seeded with the defaults.
    ///
    /// Defaults: version 2, the system temp directory as root, a random
    /// 256-bit hex hostname, no name, and `127.0.0.1` as the only address.
    pub fn builder() -> JailSpecBuilder {
        JailSpecBuilder {
            spec: Self {
                version: JAIL_API_VERSION,
                path: std::env::temp_dir(),
                hostname: random_hostname(),
                name: String::new(),
                addresses: vec![Ipv4Addr::LOCALHOST.into()],
            },
            explicit_addresses: false,
        }
    }

    /// Returns the root path as text. Both creation calls take it as a C
    /// string, and `jail_set(2)` parameters are UTF-8, so other paths are refused.
    pub(crate) fn root(&self) -> std::result::Result<&str, ValidationError> {
        self.path.to_str().ok_or_else(|| ValidationError::NonUtf8Path {
            path: self.path.clone(),
        })
    }

    /// Checks every invariant the kernel structures depend on.
    pub fn validate(&self) -> Result<()> {
        for addr in &self.addresses {
            addr.family()?;
        }
        CString::new(self.root()?)?;
        CString::new(self.hostname.as_str())?;
        CString::new(self.name.as_str())?;
        Ok(())
    }

    /// Expresses this jail as `jail_set(2)` parameters.
    ///
    /// Addresses of one family are concatenated into a single `ip4.addr` or
    /// `ip6.addr` value, which is how the kernel expects address lists.
    pub fn to_params(&self) -> Result<Params> {
        let mut ip4 = Vec::new();
        let mut ip6 = Vec::new();
        for addr in &self.addresses {
            match addr.family()? {
                Family::V4 => ip4.extend_from_slice(addr.as_bytes()),
                Family::V6 => ip6.extend_from_slice(addr.as_bytes()),
            }
        }

        let mut params = Params::new()
            .string("path", self.root()?)
            .string("host.hostname", self.hostname.as_str());
        if !self.name.is_empty() {
            params = params.string("name", self.name.as_str());
        }
        if !ip4.is_empty() {
            params = params.bytes("ip4.addr", ip4);
        }
        if !ip6.is_empty() {
            params = params.bytes("ip6.addr", ip6);
        }
        Ok(params)
    }
}

/// Builder for [`JailSpec`].
///
/// # Example
///
/// ```
/// use harbor::JailSpec;
///
/// let spec = JailSpec::builder()
///     .path("/jails/www")
///     .name("www")
///     .hostname("www.example.org")
///     .address("10.0.0.5".parse::<std::net::IpAddr>().unwrap())
///     .build()
///     .expect("invalid jail spec");
/// assert_eq!(spec.addresses.len(), 1);
/// ```
#[derive(Debug)]
#[must_use = "a JailSpecBuilder does nothing until .build() is called"]
pub struct JailSpecBuilder {
    /// Spec under construction.
    spec: JailSpec,
    /// Whether the default loopback address has been replaced.
    explicit_addresses: bool,
}

impl JailSpecBuilder {
    /// Sets the `struct jail` version (default: 2).
    pub const fn version(mut self, version: u32) -> Self {
        self.spec.version = version;
        self
    }

    /// Sets the jail root directory.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.path = path.into();
        self
    }

    /// Sets the hostname seen inside the jail.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.spec.hostname = hostname.into();
        self
    }

    /// Sets the jail name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self
    }

    /// Adds an address. The first call replaces the default loopback address.
    pub fn address(mut self, addr: impl Into<Address>) -> Self {
        if !self.explicit_addresses {
            self.spec.addresses.clear();
            self.explicit_addresses = true;
        }
        self.spec.addresses.push(addr.into());
        self
    }

    /// Removes every address, including the default.
    pub fn no_addresses(mut self) -> Self {
        self.spec.addresses.clear();
        self.explicit_addresses = true;
        self
    }

    /// Validates and returns the `JailSpec`.
    pub fn build(self) -> Result<JailSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Generates a 64-character hex hostname (256 bits).
///
/// Seeded from the process-random [`RandomState`](std::collections::hash_map::RandomState)
/// keys, the pid, and the clock. Unique, not secret.
pub fn random_hostname() -> String {
    use std::collections::hash_map::RandomState;
    use std::fmt::Write;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut out = String::with_capacity(64);
    for word in 0..4_u64 {
        let mut h = RandomState::new().build_hasher();
        h.write_u64(word);
        h.write_u64(u64::from(std::process::id()));
        h.write_u128(nanos);
        let _ = write!(out, "{:016x}", h.finish());
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    #[test]
    fn defaults() {
        let spec = JailSpec::builder().build().unwrap();
        assert_eq!(spec.version, 2);
        assert_eq!(spec.path, std::env::temp_dir());
        assert_eq!(spec.hostname.len(), 64);
        assert!(spec.hostname.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(spec.name.is_empty());
        assert_eq!(spec.addresses, vec![Address::from(Ipv4Addr::LOCALHOST)]);
    }

    #[test]
    fn generated_hostnames_differ() {
        let a = JailSpec::builder().build().unwrap();
        let b = JailSpec::builder().build().unwrap();
        assert_ne!(a.hostname, b.hostname);
    }

    #[test]
    fn first_address_replaces_loopback() {
        let spec = JailSpec::builder()
            .address(Ipv4Addr::new(10, 0, 0, 1))
            .address(Ipv6Addr::LOCALHOST)
            .build()
            .unwrap();
        assert_eq!(spec.addresses.len(), 2);
        assert_eq!(spec.addresses[0].as_bytes(), &[10, 0, 0, 1]);
        assert_eq!(spec.addresses[1].family().unwrap(), Family::V6);
    }

    #[test]
    fn bad_address_length_aborts_build() {
        let err = JailSpec::builder()
            .address(Address::from_bytes(vec![1, 2, 3]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::AddressLength { len: 3 })
        ));
    }

    #[test]
    fn interior_nul_aborts_build() {
        let err = JailSpec::builder().hostname("a\0b").build().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::InteriorNul(_))
        ));
    }

    #[test]
    fn params_group_addresses_by_family() {
        let spec = JailSpec::builder()
            .path("/jails/a")
            .name("a")
            .hostname("a.test")
            .address(Ipv4Addr::new(10, 0, 0, 1))
            .address(Ipv6Addr::LOCALHOST)
            .address(Ipv4Addr::new(10, 0, 0, 2))
            .build()
            .unwrap();
        let params = spec.to_params().unwrap();
        let entries = params.entries();

        assert_eq!(entries[0], ParamValue::from("path"));
        assert_eq!(entries[1], ParamValue::from("/jails/a"));
        assert!(entries.contains(&ParamValue::from("name")));
        let pos = entries
            .iter()
            .position(|e| *e == ParamValue::from("ip4.addr"))
            .unwrap();
        assert_eq!(
            entries[pos + 1],
            ParamValue::Bytes(vec![10, 0, 0, 1, 10, 0, 0, 2])
        );
        let pos6 = entries
            .iter()
            .position(|e| *e == ParamValue::from("ip6.addr"))
            .unwrap();
        assert_eq!(entries[pos6 + 1], ParamValue::Bytes(Ipv6Addr::LOCALHOST.octets().to_vec()));
    }

    #[test]
    fn non_utf8_root_is_refused_by_both_marshalers() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = PathBuf::from(OsStr::from_bytes(b"/jails/\xff"));
        let err = JailSpec::builder().path(root.clone()).build().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::NonUtf8Path { ref path }) if *path == root
        ));

        let mut spec = JailSpec::builder().build().unwrap();
        spec.path = root;
        assert!(matches!(
            spec.to_params().unwrap_err(),
            crate::Error::Validation(ValidationError::NonUtf8Path { .. })
        ));
        assert!(matches!(
            crate::record::LegacyRecord::new(&spec).unwrap_err(),
            crate::Error::Validation(ValidationError::NonUtf8Path { .. })
        ));
    }

    #[test]
    fn unnamed_spec_omits_name_param() {
        let spec = JailSpec::builder().no_addresses().build().unwrap();
        let params = spec.to_params().unwrap();
        assert!(!params.entries().contains(&ParamValue::from("name")));
        assert!(!params.entries().contains(&ParamValue::from("ip4.addr")));
        assert_eq!(params.len(), 4);
    }
}
