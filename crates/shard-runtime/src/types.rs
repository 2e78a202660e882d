//! Group, shard, and launch-configuration data shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use shard_topology::Unit;

use crate::error::RuntimeError;

/// Label carrying the group identity on every instance we create.
pub const GROUP_LABEL: &str = "shardgrid.group";
/// Label carrying the canonical cpuset encoding of the shard's unit.
pub const UNIT_LABEL: &str = "shardgrid.unit";
/// Label carrying the unit weight as a decimal string.
pub const WEIGHT_LABEL: &str = "shardgrid.weight";
/// Environment variable exposing the unit weight to the workload, so it
/// can size its own internal parallelism.
pub const WEIGHT_ENV: &str = "SHARD_WEIGHT";

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(()),
        }
    }
}

/// A port-publish request: `[host:]container[/proto]`.
///
/// Without a host port the engine picks an ephemeral one at start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl FromStr for PortSpec {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RuntimeError::InvalidPortSpec(s.to_string());

        let (ports, proto) = match s.split_once('/') {
            Some((ports, proto)) => {
                (ports, proto.parse::<Protocol>().map_err(|_| invalid())?)
            }
            None => (s, Protocol::Tcp),
        };

        let parse_port = |p: &str| -> Result<u16, RuntimeError> {
            match p.parse::<u16>() {
                Ok(0) | Err(_) => Err(invalid()),
                Ok(port) => Ok(port),
            }
        };

        match ports.split_once(':') {
            Some((host, container)) => Ok(PortSpec {
                host_port: Some(parse_port(host)?),
                container_port: parse_port(container)?,
                protocol: proto,
            }),
            None => Ok(PortSpec {
                host_port: None,
                container_port: parse_port(ports)?,
                protocol: proto,
            }),
        }
    }
}

/// An observed host/container port pair on a running instance.
///
/// `host_port` is zero when the port is exposed but not published;
/// consumers that need an externally reachable address skip those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Desired state for one `exec` invocation.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub image: String,
    pub layout: Vec<Unit>,
    pub ports: Vec<PortSpec>,
    pub overlay: Option<ConfigOverlay>,
}

/// Raw runtime-config overlay, decoded from an engine-native JSON blob.
///
/// Field names follow the engine's own config document so an operator can
/// reuse an existing container config file as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ConfigOverlay {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
}

impl ConfigOverlay {
    /// Decode an overlay from a JSON file on disk.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| RuntimeError::OverlayRead {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| RuntimeError::OverlayDecode {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The merged launch configuration handed to the engine for one shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchConfig {
    pub image: String,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub user: String,
    pub working_dir: String,
    pub cpuset_cpus: String,
    pub ports: Vec<PortSpec>,
}

impl LaunchConfig {
    /// Seed a launch config from a decoded overlay.
    pub fn from_overlay(overlay: &ConfigOverlay) -> Self {
        LaunchConfig {
            cmd: overlay.cmd.clone(),
            entrypoint: overlay.entrypoint.clone(),
            env: overlay.env.clone(),
            labels: overlay.labels.clone(),
            user: overlay.user.clone(),
            working_dir: overlay.working_dir.clone(),
            ..LaunchConfig::default()
        }
    }
}

/// One runtime instance of a group.
#[derive(Debug, Clone)]
pub struct Shard {
    pub name: String,
    pub id: String,
    pub status: String,
    pub unit: Unit,
    pub ports: Vec<PortBinding>,
}

/// The observed aggregate of all instances sharing a group label value.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub image: String,
    pub shards: Vec<Shard>,
}
