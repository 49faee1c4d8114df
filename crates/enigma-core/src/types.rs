use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EnigmaError, EnigmaResult};

/// UTC calendar date used as the key-derivation context.
///
/// Wire form is strictly `YYYY-MM-DD`: exactly ten characters, zero-padded,
/// and a real calendar date. Lenient forms such as `2024-1-5` are rejected so
/// both sides always feed identical bytes into HKDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyDate(NaiveDate);

impl KeyDate {
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        if !(0..=9999).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Strict `YYYY-MM-DD` parse.
    pub fn parse(s: &str) -> EnigmaResult<Self> {
        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shape_ok {
            return Err(EnigmaError::InvalidContext(format!(
                "key date must be YYYY-MM-DD, got {s:?}"
            )));
        }

        // Shape is verified, so the slices are ASCII digits.
        let year: i32 = s[0..4].parse().unwrap_or_default();
        let month: u32 = s[5..7].parse().unwrap_or_default();
        let day: u32 = s[8..10].parse().unwrap_or_default();

        Self::from_ymd(year, month, day)
            .ok_or_else(|| EnigmaError::InvalidContext(format!("not a calendar date: {s:?}")))
    }

    /// Signed number of days from `other` to `self`.
    pub fn days_since(&self, other: &KeyDate) -> i64 {
        self.0.signed_duration_since(other.0).num_days()
    }

    pub fn next_day(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    pub fn previous_day(&self) -> Option<Self> {
        self.0.checked_sub_days(Days::new(1)).map(Self)
    }
}

impl fmt::Display for KeyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for KeyDate {
    type Err = EnigmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyDate {
    type Error = EnigmaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyDate> for String {
    fn from(value: KeyDate) -> Self {
        value.to_string()
    }
}

/// Generation counter of a tenant's master secret. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SecretVersion(u32);

impl SecretVersion {
    pub const FIRST: SecretVersion = SecretVersion(1);

    pub fn new(version: u32) -> Option<Self> {
        (version >= 1).then_some(Self(version))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for SecretVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for SecretVersion {
    type Error = EnigmaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
            .ok_or_else(|| EnigmaError::InvalidContext("secret version must be >= 1".into()))
    }
}

impl From<SecretVersion> for u32 {
    fn from(value: SecretVersion) -> Self {
        value.0
    }
}

/// Whether envelope metadata (`appKey|keyDate|secretVersion`) is bound into
/// the AEAD as associated data. Both ends must agree or every message fails
/// authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextBinding {
    /// Metadata authenticated as associated data
    #[default]
    Bound,
    /// No associated data; wire-compatible with receivers that predate binding
    Unbound,
}
