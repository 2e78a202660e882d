//! Linux topology discovery from sysfs.
//!
//! Reads `/sys/devices/system/cpu` and `/sys/devices/system/node`:
//! the online cpu list, per-node cpu lists, and each cpu's
//! package/core ids. Machines that expose no NUMA level get a single
//! synthetic node covering every online cpu. The sysfs root is a
//! parameter so tests can point at a fixture tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cpuset::CpuSet;
use crate::error::TopologyError;
use crate::topology::Topology;

pub(crate) fn discover_from(root: &Path) -> Result<Topology, TopologyError> {
    let online: CpuSet = read_trimmed(&root.join("cpu/online"))?.parse()?;
    let nodes = node_cpu_lists(root, &online)?;

    let mut layout = Vec::with_capacity(nodes.len());
    for node in &nodes {
        // Group the node's cpus into cores by (package id, core id).
        let mut cores: BTreeMap<(i64, i64), CpuSet> = BTreeMap::new();
        for cpu in node.iter() {
            cores.entry(core_key(root, cpu)?).or_default().insert(cpu);
        }
        layout.push(cores.into_values().collect::<Vec<_>>());
    }

    let topology = Topology::from_layout(&layout)?;
    debug!(
        cpus = %topology.cpus(),
        nodes = nodes.len(),
        cores = topology.n_cores(),
        "discovered topology"
    );

    Ok(topology)
}

/// Per-node online cpu lists, in node-index order. A missing `node`
/// directory means the kernel exposes no NUMA information; everything
/// lands in one node.
fn node_cpu_lists(root: &Path, online: &CpuSet) -> Result<Vec<CpuSet>, TopologyError> {
    let node_dir = root.join("node");
    if !node_dir.is_dir() {
        return Ok(vec![online.clone()]);
    }

    let entries = fs::read_dir(&node_dir).map_err(|source| TopologyError::Discovery {
        path: node_dir.clone(),
        source,
    })?;

    let mut indexed = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| TopologyError::Discovery {
            path: node_dir.clone(),
            source,
        })?;
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix("node"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };

        let cpulist: CpuSet = read_trimmed(&entry.path().join("cpulist"))?.parse()?;
        let present = cpulist.intersection(online);
        if !present.is_empty() {
            indexed.insert(index, present);
        }
    }

    if indexed.is_empty() {
        // Memory-only nodes or an empty directory; fall back to one node.
        return Ok(vec![online.clone()]);
    }

    Ok(indexed.into_values().collect())
}

/// The (package id, core id) pair a cpu belongs to. Cpus without a
/// topology directory each count as their own core.
fn core_key(root: &Path, cpu: u32) -> Result<(i64, i64), TopologyError> {
    let topo = root.join(format!("cpu/cpu{cpu}/topology"));
    if !topo.is_dir() {
        return Ok((0, i64::from(cpu)));
    }

    Ok((
        read_i64(&topo.join("physical_package_id"))?,
        read_i64(&topo.join("core_id"))?,
    ))
}

fn read_i64(path: &Path) -> Result<i64, TopologyError> {
    let value = read_trimmed(path)?;
    value.parse().map_err(|_| TopologyError::Malformed {
        path: path.to_path_buf(),
        value,
    })
}

fn read_trimmed(path: &Path) -> Result<String, TopologyError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| TopologyError::Discovery {
            path: path.to_path_buf(),
            source,
        })
}
