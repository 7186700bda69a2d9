//! Cache fingerprints.
//!
//! A pipeline is identified by a textual descriptor built from its
//! source and every operation's parameters, in order. The descriptor is
//! hashed with 128-bit `SipHash` into a [`Fingerprint`], whose hex form
//! names the cache entry.
//!
//! Descriptor layout: each section is written as `name(v1,v2,...)` and
//! sections are concatenated without separators. Operation sections take
//! the operation's name prefixed with `_`.

use std::fmt::{self, Write as _};
use std::hash::Hasher;
use std::time::{SystemTime, UNIX_EPOCH};

use siphasher::sip128::{Hasher128, SipHasher13};

/// One scalar contributing to a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Signed integer.
    Int(i64),
    /// Floating-point number, written in its shortest round-trip form.
    Float(f64),
    /// String, written quoted and escaped.
    Text(String),
    /// Boolean, written as `1` or `0`.
    Bool(bool),
    /// Absent parameter, written as nothing.
    Unset,
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            Self::Unset => Ok(()),
        }
    }
}

macro_rules! int_cache_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for CacheValue {
            fn from(value: $ty) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

int_cache_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for CacheValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Option<u32>> for CacheValue {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Unset, Self::from)
    }
}

/// Modification times contribute nanoseconds relative to the Unix epoch.
impl From<SystemTime> for CacheValue {
    fn from(value: SystemTime) -> Self {
        let nanos = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_nanos())
                .map_or(i64::MIN, |n| -n),
        };
        Self::Int(nanos)
    }
}

impl From<Fingerprint> for CacheValue {
    fn from(value: Fingerprint) -> Self {
        Self::Text(value.to_string())
    }
}

/// A 128-bit digest identifying one rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u128);

impl Fingerprint {
    /// Hash a descriptor.
    #[must_use]
    pub fn of(descriptor: &str) -> Self {
        let mut hasher = SipHasher13::new();
        hasher.write(descriptor.as_bytes());
        Self(hasher.finish128().as_u128())
    }

    /// The raw digest.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Accumulates descriptor sections.
#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    descriptor: String,
}

impl FingerprintBuilder {
    /// Start an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name(values...)`.
    pub fn section(&mut self, name: &str, values: &[CacheValue]) -> &mut Self {
        self.descriptor.push_str(name);
        self.descriptor.push('(');
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.descriptor.push(',');
            }
            // Writing into a String cannot fail.
            let _ = write!(self.descriptor, "{value}");
        }
        self.descriptor.push(')');
        self
    }

    /// The descriptor accumulated so far.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Hash the accumulated descriptor.
    #[must_use]
    pub fn finish(&self) -> Fingerprint {
        Fingerprint::of(&self.descriptor)
    }
}
