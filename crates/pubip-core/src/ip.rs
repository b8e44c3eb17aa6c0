// # Public IP value type
//
// The resolved address is carried as the exact text the resolver produced.
// It is validated once on construction and then compared byte-for-byte:
// no IPv4/IPv6 canonicalisation happens anywhere, so "2001:db8::1" and
// "2001:0db8::1" are different values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// A validated textual IP address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpAddress(String);

impl IpAddress {
    /// Validate and wrap an address.
    ///
    /// The text must be non-empty and parse as an IPv4 or IPv6 address.
    /// It is stored verbatim.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::invalid_input("IP address cannot be empty"));
        }
        if text.parse::<IpAddr>().is_err() {
            return Err(Error::invalid_input(format!(
                "not a valid IP address: {text:?}"
            )));
        }
        Ok(Self(text))
    }

    /// The address text as resolved
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IpAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for IpAddress {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for IpAddress {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for IpAddress {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        Self::new(text)
    }
}

impl From<IpAddress> for String {
    fn from(ip: IpAddress) -> Self {
        ip.0
    }
}
