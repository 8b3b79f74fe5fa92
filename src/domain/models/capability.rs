//! Capability records: what an agent has declared it can do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor` capability version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityVersion {
    pub major: u32,
    pub minor: u32,
}

impl CapabilityVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for CapabilityVersion {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl fmt::Display for CapabilityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for CapabilityVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((major, minor)) => Ok(Self {
                major: major.parse()?,
                minor: minor.parse()?,
            }),
            // Bare integers are accepted as "N.0"
            None => Ok(Self {
                major: s.parse()?,
                minor: 0,
            }),
        }
    }
}

impl TryFrom<String> for CapabilityVersion {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CapabilityVersion> for String {
    fn from(v: CapabilityVersion) -> Self {
        v.to_string()
    }
}

/// A declared, versioned ability held by an agent.
///
/// `(agent_id, capability_id)` is unique. Deactivated records are retained
/// for audit and excluded from eligibility matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub agent_id: String,
    /// Hierarchical id, e.g. `format.python`
    pub capability_id: String,
    pub version: CapabilityVersion,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
}

impl CapabilityRecord {
    pub fn new(
        agent_id: impl Into<String>,
        capability_id: impl Into<String>,
        version: CapabilityVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            capability_id: capability_id.into(),
            version,
            is_active: true,
            registered_at: now,
            last_verified_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        let v: CapabilityVersion = "1.2".parse().unwrap();
        assert_eq!(v, CapabilityVersion::new(1, 2));
        assert_eq!(v.to_string(), "1.2");

        let bare: CapabilityVersion = "3".parse().unwrap();
        assert_eq!(bare, CapabilityVersion::new(3, 0));

        assert!("one.two".parse::<CapabilityVersion>().is_err());
        assert!("".parse::<CapabilityVersion>().is_err());
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        let v2_0: CapabilityVersion = "2.0".parse().unwrap();
        let v10_0: CapabilityVersion = "10.0".parse().unwrap();
        let v2_11: CapabilityVersion = "2.11".parse().unwrap();
        let v2_9: CapabilityVersion = "2.9".parse().unwrap();

        assert!(v10_0 > v2_0);
        assert!(v2_11 > v2_9);
    }

    #[test]
    fn test_new_record_is_active() {
        let record = CapabilityRecord::new("agent-1", "format.python", CapabilityVersion::new(1, 0));
        assert!(record.is_active);
        assert_eq!(record.registered_at, record.last_verified_at);
    }
}
