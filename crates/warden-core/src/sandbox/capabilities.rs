//! Declarative permission sets

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::WardenError;

/// A permission flag a profile can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    FileRead,
    FileWrite,
    Network,
    ProcessExec,
    SystemInfo,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::FileRead,
        Capability::FileWrite,
        Capability::Network,
        Capability::ProcessExec,
        Capability::SystemInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FileRead => "file-read",
            Capability::FileWrite => "file-write",
            Capability::Network => "network",
            Capability::ProcessExec => "process-exec",
            Capability::SystemInfo => "system-info",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| WardenError::invalid_rule(format!("Unknown capability: {}", s)))
    }
}

/// Capability flags plus the hosts network access is scoped to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub flags: BTreeSet<Capability>,
    #[serde(default)]
    pub network_hosts: BTreeSet<String>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.flags.insert(capability);
        self
    }

    /// Grant network access to one more host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.flags.insert(Capability::Network);
        self.network_hosts.insert(host.into());
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.flags.contains(&capability)
    }

    /// Both flags and hosts are contained in `other`
    pub fn is_subset(&self, other: &Capabilities) -> bool {
        self.flags.is_subset(&other.flags) && self.network_hosts.is_subset(&other.network_hosts)
    }

    pub fn union(&self, other: &Capabilities) -> Capabilities {
        Capabilities {
            flags: self.flags.union(&other.flags).copied().collect(),
            network_hosts: self
                .network_hosts
                .union(&other.network_hosts)
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.is_empty() {
            return f.write_str("(none)");
        }
        let flags: Vec<&str> = self.flags.iter().map(Capability::as_str).collect();
        f.write_str(&flags.join(", "))?;
        if !self.network_hosts.is_empty() {
            let hosts: Vec<&str> = self.network_hosts.iter().map(String::as_str).collect();
            write!(f, " [{}]", hosts.join(", "))?;
        }
        Ok(())
    }
}
