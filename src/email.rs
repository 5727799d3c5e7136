/*
    installer-pkg - Installer validation and Debian build recipe
    Copyright (C) 2023  NotSludgeBomb

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Email address validation.
//!
//! Uses the "valid e-mail address" production from the WHATWG HTML standard:
//! <https://html.spec.whatwg.org/multipage/input.html#valid-e-mail-address>
//!
//! The pattern is a willful violation of RFC 5322. It rejects some addresses
//! the RFC allows (quoted local parts, comments) and accepts some it forbids
//! (consecutive dots in the local part). Keep it that way, the installer
//! must accept exactly what the web UI accepts.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Matches the whole input, labels are 1 to 63 characters without a leading
/// or trailing hyphen.
pub const EMAIL_REGEX: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a compile-time constant, a failure here is a programming error
    Regex::new(EMAIL_REGEX).expect("EMAIL_REGEX is a valid pattern")
});

/// Returns whether `input` is a valid email address.
///
/// No trimming or case folding is done, `" root@example.com"` is rejected.
pub fn is_valid_email(input: &str) -> bool {
    EMAIL.is_match(input)
}

/// An email address that passed [`is_valid_email`], stored exactly as given.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `@`.
    pub fn local_part(&self) -> &str {
        // Validated addresses always contain an '@', and the domain can't
        // contain one, so the last '@' is the separator
        self.0.rsplit_once('@').map_or("", |(local, _)| local)
    }

    /// The part after the `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for EmailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if is_valid_email(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidEmail(s.to_string()))
        }
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        if is_valid_email(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidEmail(value))
        }
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for EmailAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EmailAddress::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Extracts the address from a `Name <address>` maintainer field.
///
/// A field without angle brackets is treated as a bare address.
pub fn maintainer_address(field: &str) -> Option<&str> {
    match (field.rfind('<'), field.rfind('>')) {
        (Some(start), Some(end)) if start < end => Some(&field[start + 1..end]),
        (None, None) => Some(field.trim()),
        _ => None,
    }
}
