//! Core types shared between the validator, the backends and the applier

use std::fmt;
use std::str::FromStr;

use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::{MacError, ValidationError};

/// A parsed 48-bit hardware address.
///
/// Displays as upper-case, colon separated octets (`00:25:86:AA:BB:CC`),
/// which is also the normalised text form stored in transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub MacAddress);

impl MacAddr {
    /// Build from raw octets
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(MacAddress::new(bytes))
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0.bytes()
    }

    /// Least significant bit of the first octet is clear
    pub fn is_unicast(&self) -> bool {
        self.octets()[0] & 0x01 == 0
    }

    /// Second least significant bit of the first octet is set
    pub fn is_locally_administered(&self) -> bool {
        self.octets()[0] & 0x02 == 0x02
    }

    /// Organizationally unique identifier, e.g. `00:25:86`
    pub fn oui(&self) -> String {
        let o = self.octets();
        format!("{:02X}:{:02X}:{:02X}", o[0], o[1], o[2])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<MacAddress>().map(MacAddr).map_err(|_| {
            MacError::Validation(ValidationError::InvalidFormat {
                value: s.to_string(),
            })
        })
    }
}

struct MacAddrVisitor;

impl<'de> serde::de::Visitor<'de> for MacAddrVisitor {
    type Value = MacAddr;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a MAC address string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<MacAddr>()
            .map_err(|_| E::custom(format!("invalid MAC address: {}", v)))
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(MacAddrVisitor)
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Operational state of a link as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkStatus::Up => "up",
            LinkStatus::Down => "down",
            LinkStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A network interface as enumerated by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    /// Current hardware address, `None` for links without one (loopback, tunnels)
    pub mac_address: Option<String>,
    pub status: LinkStatus,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl InterfaceInfo {
    pub fn new(name: impl Into<String>, mac_address: Option<String>, status: LinkStatus) -> Self {
        Self {
            name: name.into(),
            mac_address,
            status,
            driver: None,
            vendor: None,
            description: None,
        }
    }
}
