//! Jail parameters as a flat key/value sequence.
//!
//! `jail_set(2)` and `jail_get(2)` take parameters as alternating name and
//! value descriptors. [`Params`] keeps that shape: entry 0 is a name, entry 1
//! its value, entry 2 the next name, and so on.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use serde_json::Value;

use crate::error::{Result, ValidationError};
use crate::spec::Address;

/// Parameters the kernel keeps as a C `int`, booleans included.
const INTEGER_PARAMS: &[&str] = &[
    "jid",
    "parent",
    "persist",
    "dying",
    "securelevel",
    "children.max",
    "children.cur",
    "enforce_statfs",
    "devfs_ruleset",
    "cpuset.id",
];

/// Returns `true` if the kernel reads and writes `key` as a 4-byte integer.
///
/// Every `allow.*` permission is a boolean and counts as one.
pub fn is_integer_param(key: &str) -> bool {
    INTEGER_PARAMS.contains(&key) || key.starts_with("allow.")
}

/// A single entry of a parameter sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParamValue {
    /// NUL-terminated string.
    Str(String),
    /// 32-bit integer in native byte order.
    U32(u32),
    /// Raw bytes (addresses, opaque blobs).
    Bytes(Vec<u8>),
    /// Boolean switch: present with an empty value means "enabled".
    Flag,
}

impl ParamValue {
    /// Returns the string if this is a [`ParamValue::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::U32(_) => "u32",
            Self::Bytes(_) => "bytes",
            Self::Flag => "flag",
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        Self::U32(n)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Address> for ParamValue {
    fn from(a: Address) -> Self {
        Self::Bytes(a.as_bytes().to_vec())
    }
}

/// Ordered jail parameters.
///
/// The typed methods always append a well-formed (name, value) pair.
/// [`Params::from_entries`] accepts any flat sequence; its shape is checked
/// when it is marshaled.
///
/// # Example
///
/// ```
/// use harbor::Params;
///
/// let params = Params::new()
///     .string("path", "/jails/www")
///     .string("name", "www")
///     .u32("children.max", 10)
///     .flag("allow.raw_sockets");
/// assert_eq!(params.len(), 8);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// Alternating names and values.
    entries: Vec<ParamValue>,
}

impl Params {
    /// Returns an empty sequence.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Wraps a raw flat sequence without checking it.
    pub const fn from_entries(entries: Vec<ParamValue>) -> Self {
        Self { entries }
    }

    /// Appends a name and a value of any supported kind.
    pub fn push(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.push(ParamValue::Str(key.into()));
        self.entries.push(value.into());
        self
    }

    /// Appends a string parameter.
    pub fn string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, ParamValue::Str(value.into()))
    }

    /// Appends a 32-bit integer parameter.
    pub fn u32(self, key: impl Into<String>, value: u32) -> Self {
        self.push(key, ParamValue::U32(value))
    }

    /// Appends a raw byte parameter.
    pub fn bytes(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.push(key, ParamValue::Bytes(value.into()))
    }

    /// Appends an address parameter.
    pub fn addr(self, key: impl Into<String>, value: impl Into<Address>) -> Self {
        self.push(key, ParamValue::from(value.into()))
    }

    /// Appends an enabled boolean parameter.
    pub fn flag(self, key: impl Into<String>) -> Self {
        self.push(key, ParamValue::Flag)
    }

    /// Appends every pair of `other`.
    pub fn extend(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Returns the flat entry sequence.
    pub fn entries(&self) -> &[ParamValue] {
        &self.entries
    }

    /// Number of entries (twice the number of pairs when well formed).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value of the first pair named `key`.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .chunks(2)
            .find(|pair| pair[0].as_str() == Some(key))
            .and_then(|pair| pair.get(1))
    }

    /// Checks the alternating shape: every even entry is a name and every
    /// name has a value.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        for (index, entry) in self.entries.iter().enumerate().step_by(2) {
            let ParamValue::Str(key) = entry else {
                return Err(ValidationError::NonStringKey { index });
            };
            if index + 1 == self.entries.len() {
                return Err(ValidationError::MissingValue { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Converts a JSON object of `name: value` pairs.
    ///
    /// Strings become string parameters, except under names ending in
    /// `.addr`, which are parsed as IP addresses. `true` enables a flag and
    /// `false` omits the pair. Integers must fit in 32 bits. Anything else is
    /// rejected with [`ValidationError::UnsupportedValueType`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ValidationError::UnsupportedValueType {
                key: String::new(),
                kind: "top-level value is not an object",
            }
            .into());
        };

        let mut params = Self::new();
        for (key, v) in map {
            if let Some(value) = json_value(key, v)? {
                params = params.push(key.as_str(), value);
            }
        }
        Ok(params)
    }

    /// Reads and converts a JSON parameter file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Self::from_json(&value)
    }
}

/// Converts one JSON value. `Ok(None)` means "leave the parameter out".
fn json_value(key: &str, v: &Value) -> std::result::Result<Option<ParamValue>, ValidationError> {
    let unsupported = |kind| ValidationError::UnsupportedValueType {
        key: key.to_owned(),
        kind,
    };

    match v {
        Value::Bool(true) => Ok(Some(ParamValue::Flag)),
        Value::Bool(false) => Ok(None),
        Value::String(s) if key.ends_with(".addr") => s
            .parse::<IpAddr>()
            .map(|ip| Some(Address::from(ip).into()))
            .map_err(|_| unsupported("string is not an IP address")),
        Value::String(s) => Ok(Some(ParamValue::Str(s.clone()))),
        Value::Number(n) => match n.as_u64() {
            Some(u) => u32::try_from(u)
                .map(|u| Some(ParamValue::U32(u)))
                .map_err(|_| unsupported("integer exceeds 32 bits")),
            None if n.is_i64() => Err(unsupported("negative integer")),
            None => Err(unsupported("floating-point number")),
        },
        Value::Null => Err(unsupported("null")),
        Value::Array(_) => Err(unsupported("array")),
        Value::Object(_) => Err(unsupported("object")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_builders_alternate() {
        let p = Params::new()
            .string("name", "a")
            .u32("children.max", 3)
            .flag("allow.mount");
        assert_eq!(p.len(), 6);
        assert!(p.validate().is_ok());
        assert_eq!(p.get("children.max"), Some(&ParamValue::U32(3)));
        assert_eq!(p.get("allow.mount"), Some(&ParamValue::Flag));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn non_string_key_is_caught_per_pair() {
        let p = Params::from_entries(vec![
            "path".into(),
            "/tmp".into(),
            "name".into(),
            "x".into(),
            ParamValue::U32(7),
            "oops".into(),
        ]);
        let err = p.validate().unwrap_err();
        assert!(matches!(err, ValidationError::NonStringKey { index: 4 }));
        assert!(err.to_string().contains("parameter must be a string"));
    }

    #[test]
    fn dangling_key_is_rejected() {
        let p = Params::from_entries(vec!["path".into(), "/tmp".into(), "name".into()]);
        assert!(matches!(
            p.validate(),
            Err(ValidationError::MissingValue { key }) if key == "name"
        ));
    }

    #[test]
    fn json_conversion() {
        let p = Params::from_json(&json!({
            "host.domainname": "example.org",
            "ip4.addr": "10.133.88.6",
            "children.max": 10,
            "allow.raw_sockets": true,
            "allow.mount": false,
        }))
        .unwrap();

        assert_eq!(
            p.get("host.domainname"),
            Some(&ParamValue::from("example.org"))
        );
        assert_eq!(
            p.get("ip4.addr"),
            Some(&ParamValue::Bytes(vec![10, 133, 88, 6]))
        );
        assert_eq!(p.get("children.max"), Some(&ParamValue::U32(10)));
        assert_eq!(p.get("allow.raw_sockets"), Some(&ParamValue::Flag));
        assert_eq!(p.get("allow.mount"), None);
    }

    #[test]
    fn json_rejects_unrepresentable_values() {
        for (value, kind) in [
            (json!(-1), "negative integer"),
            (json!(1.5), "floating-point number"),
            (json!(u64::from(u32::MAX) + 1), "integer exceeds 32 bits"),
            (json!(null), "null"),
            (json!([1, 2]), "array"),
            (json!({"a": 1}), "object"),
        ] {
            let err = Params::from_json(&json!({ "k": value })).unwrap_err();
            match err {
                crate::Error::Validation(ValidationError::UnsupportedValueType { key, kind: k }) => {
                    assert_eq!(key, "k");
                    assert_eq!(k, kind);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"enforce_statfs": 1, "ip6.addr": "::1"}"#).unwrap();

        let p = Params::from_json_file(&path).unwrap();
        assert_eq!(p.get("enforce_statfs"), Some(&ParamValue::U32(1)));
        assert_eq!(
            p.get("ip6.addr"),
            Some(&ParamValue::Bytes(std::net::Ipv6Addr::LOCALHOST.octets().to_vec()))
        );
    }
}
