//! In-memory jail table standing in for the kernel in unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use nix::errno::Errno;

use crate::flags::JailFlags;
use crate::iovec::{INT_OUTPUT_LEN, ParamVector};
use crate::params::is_integer_param;
use crate::record::LegacyRecord;
use crate::sys::Kernel;

/// Parameter names the fake kernel accepts.
const KNOWN: &[&str] = &[
    "jid",
    "name",
    "path",
    "persist",
    "host.hostname",
    "host.domainname",
    "ip4.addr",
    "ip6.addr",
    "children.max",
    "enforce_statfs",
    "allow.raw_sockets",
    "allow.socket_af",
    "allow.mount",
    "allow.mount.devfs",
    "allow.mount.procfs",
    "errmsg",
];

/// One jail in the fake table.
#[derive(Debug, Clone, Default)]
pub struct FakeJail {
    /// Jail identifier.
    pub jid: i32,
    /// Parameter values as the kernel received them.
    pub params: BTreeMap<String, Vec<u8>>,
}

impl FakeJail {
    /// Returns a string parameter without its terminator.
    pub fn str(&self, key: &str) -> Option<&str> {
        let v = self.params.get(key)?;
        std::str::from_utf8(v.strip_suffix(&[0]).unwrap_or(v)).ok()
    }
}

/// A kernel whose jail table lives in memory.
#[derive(Debug, Default)]
pub struct MemoryKernel {
    /// Jails by identifier.
    jails: RefCell<BTreeMap<i32, FakeJail>>,
    /// Last assigned identifier.
    last_jid: RefCell<i32>,
    /// Jail the "process" is attached to.
    attached: RefCell<Option<i32>>,
    /// Names of the syscalls issued, in order.
    calls: RefCell<Vec<&'static str>>,
}

impl MemoryKernel {
    /// Returns an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Syscalls issued so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    /// Snapshot of a jail.
    pub fn jail_by_id(&self, jid: i32) -> Option<FakeJail> {
        self.jails.borrow().get(&jid).cloned()
    }

    /// Jail the caller attached to, if any.
    pub fn attached(&self) -> Option<i32> {
        *self.attached.borrow()
    }

    /// Allocates the next identifier.
    fn next_jid(&self) -> i32 {
        let mut last = self.last_jid.borrow_mut();
        *last += 1;
        *last
    }

    /// Looks up a jail by name.
    fn find_by_name(&self, name: &[u8]) -> Option<i32> {
        self.jails
            .borrow()
            .values()
            .find(|j| j.params.get("name").is_some_and(|n| n.as_slice() == name))
            .map(|j| j.jid)
    }
}

/// Decoded (name, value index, value bytes) triples.
fn pairs(v: &ParamVector) -> Vec<(String, usize, Vec<u8>)> {
    (0..v.len())
        .step_by(2)
        .filter_map(|i| {
            let key = v.segment(i)?;
            let key = String::from_utf8_lossy(key.strip_suffix(&[0]).unwrap_or(key)).into_owned();
            Some((key, i + 1, v.segment(i + 1)?.to_vec()))
        })
        .collect()
}

/// Writes `msg` into the vector's `errmsg` slot, as the kernel does.
fn set_errmsg(v: &mut ParamVector, msg: &str) {
    let Some((_, idx, _)) = pairs(v).into_iter().find(|(k, _, _)| k == "errmsg") else {
        return;
    };
    write_slot(v, idx, format!("{msg}\0").as_bytes());
}

/// Copies `data` into output slot `idx` and shrinks its length.
fn write_slot(v: &mut ParamVector, idx: usize, data: &[u8]) {
    let Some(buf) = v.segment_mut(idx) else {
        return;
    };
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    v.descriptors_mut()[idx].iov_len = n;
}

/// Decodes a native-endian `u32` value as a jid.
fn jid_value(bytes: &[u8]) -> Option<i32> {
    let raw: [u8; 4] = bytes.try_into().ok()?;
    i32::try_from(u32::from_ne_bytes(raw)).ok()
}

impl Kernel for MemoryKernel {
    fn jail(&self, record: &LegacyRecord) -> Result<i32, Errno> {
        self.calls.borrow_mut().push("jail");
        let name = record.name().as_bytes_with_nul();
        if name.len() > 1 && self.find_by_name(name).is_some() {
            return Err(Errno::EEXIST);
        }

        let jid = self.next_jid();
        let mut params = BTreeMap::new();
        params.insert("path".into(), record.path().as_bytes_with_nul().to_vec());
        params.insert(
            "host.hostname".into(),
            record.hostname().as_bytes_with_nul().to_vec(),
        );
        params.insert("name".into(), name.to_vec());
        params.insert("ip4.addr".into(), record.ip4_bytes().to_vec());
        params.insert("ip6.addr".into(), record.ip6_bytes().to_vec());
        self.jails.borrow_mut().insert(jid, FakeJail { jid, params });
        *self.attached.borrow_mut() = Some(jid);
        Ok(jid)
    }

    fn jail_set(&self, params: &mut ParamVector, flags: JailFlags) -> Result<i32, Errno> {
        self.calls.borrow_mut().push("jail_set");
        if !flags.intersects(JailFlags::CREATE | JailFlags::UPDATE) {
            set_errmsg(params, "neither JAIL_CREATE nor JAIL_UPDATE is set");
            return Err(Errno::EINVAL);
        }

        let entries = pairs(params);
        if let Some((key, _, _)) = entries.iter().find(|(k, _, _)| !KNOWN.contains(&k.as_str())) {
            let msg = format!("unknown parameter: {key}");
            set_errmsg(params, &msg);
            return Err(Errno::EINVAL);
        }

        let existing = entries.iter().find_map(|(k, _, v)| match k.as_str() {
            "jid" => jid_value(v).filter(|j| self.jails.borrow().contains_key(j)),
            "name" => self.find_by_name(v),
            _ => None,
        });

        let jid = match existing {
            Some(_) if !flags.contains(JailFlags::UPDATE) => {
                set_errmsg(params, "jail already exists");
                return Err(Errno::EEXIST);
            }
            Some(jid) => jid,
            None if !flags.contains(JailFlags::CREATE) => {
                set_errmsg(params, "jail not found");
                return Err(Errno::ENOENT);
            }
            None => {
                let jid = self.next_jid();
                self.jails.borrow_mut().insert(
                    jid,
                    FakeJail {
                        jid,
                        params: BTreeMap::new(),
                    },
                );
                jid
            }
        };

        if let Some(jail) = self.jails.borrow_mut().get_mut(&jid) {
            for (k, _, v) in entries {
                if k != "errmsg" && k != "jid" {
                    jail.params.insert(k, v);
                }
            }
        }
        if flags.contains(JailFlags::ATTACH) {
            *self.attached.borrow_mut() = Some(jid);
        }
        Ok(jid)
    }

    fn jail_get(&self, params: &mut ParamVector, _flags: JailFlags) -> Result<i32, Errno> {
        self.calls.borrow_mut().push("jail_get");
        let entries = pairs(params);
        let jid = entries
            .iter()
            .find(|(k, _, _)| k == "jid")
            .and_then(|(_, _, v)| jid_value(v));
        let Some(jail) = jid.and_then(|j| self.jail_by_id(j)) else {
            set_errmsg(params, "jail not found");
            return Err(Errno::ENOENT);
        };

        for (k, idx, slot) in entries {
            if k == "jid" || k == "errmsg" {
                continue;
            }
            let Some(value) = jail.params.get(&k) else {
                set_errmsg(params, &format!("unknown parameter: {k}"));
                return Err(Errno::ENOENT);
            };
            if is_integer_param(&k) {
                // The kernel copies ints out only into a buffer of exactly sizeof(int).
                if slot.len() != INT_OUTPUT_LEN {
                    set_errmsg(params, &format!("{k}: wrong size"));
                    return Err(Errno::EINVAL);
                }
                // Booleans were set as bare names and read back as 1.
                if value.is_empty() {
                    write_slot(params, idx, &1_i32.to_ne_bytes());
                    continue;
                }
            }
            write_slot(params, idx, value);
        }
        Ok(jail.jid)
    }

    fn jail_attach(&self, jid: i32) -> Result<(), Errno> {
        self.calls.borrow_mut().push("jail_attach");
        if !self.jails.borrow().contains_key(&jid) {
            return Err(Errno::EINVAL);
        }
        *self.attached.borrow_mut() = Some(jid);
        Ok(())
    }

    fn jail_remove(&self, jid: i32) -> Result<(), Errno> {
        self.calls.borrow_mut().push("jail_remove");
        self.jails
            .borrow_mut()
            .remove(&jid)
            .map(drop)
            .ok_or(Errno::EINVAL)
    }
}
