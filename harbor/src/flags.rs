//! `jail_set(2)` flag bits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set passed as the `flags` argument of `jail_set(2)`.
///
/// The legacy `jail(2)` call takes no flags; it always creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JailFlags(u32);

impl JailFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Create the jail if it does not exist (`JAIL_CREATE`).
    pub const CREATE: Self = Self(0x1);
    /// Update parameters of an existing jail (`JAIL_UPDATE`).
    pub const UPDATE: Self = Self(0x2);
    /// Attach the calling process to the jail (`JAIL_ATTACH`).
    pub const ATTACH: Self = Self(0x4);

    /// Rendering order and names.
    const NAMES: [(Self, &'static str); 3] = [
        (Self::CREATE, "jail.CREATE"),
        (Self::UPDATE, "jail.UPDATE"),
        (Self::ATTACH, "jail.ATTACH"),
    ];

    /// Builds a flag set from raw bits. Unknown bits are kept and passed through.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for JailFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for JailFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for JailFlags {
    /// `jail.CREATE`, `(jail.CREATE|jail.ATTACH)`, or `*no-flags-set*`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        match names.as_slice() {
            [] => f.write_str("*no-flags-set*"),
            [one] => f.write_str(one),
            many => write!(f, "({})", many.join("|")),
        }
    }
}
