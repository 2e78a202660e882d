//! Hardware topology tree and the weighted distribution algorithm.
//!
//! A [`Topology`] is a tree rooted at the machine with one level per
//! hardware grouping: NUMA nodes, then cores, then processing units.
//! [`Topology::distribute`] splits the tree into exactly `n` cpusets by
//! recursively handing each subtree a share of `n` proportional to its
//! processing-unit count. Subtrees whose share rounds to zero are folded
//! into the previously emitted set, and a share larger than one at the
//! requested granularity duplicates the cpuset (oversubscription).

use std::path::Path;
use std::str::FromStr;

use crate::cpuset::CpuSet;
use crate::error::TopologyError;
use crate::sysfs;

/// The topology level partitions are drawn at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One partition boundary per NUMA node.
    Node,
    /// One partition boundary per physical core.
    Core,
}

impl Granularity {
    fn depth(self) -> usize {
        match self {
            Granularity::Node => 1,
            Granularity::Core => 2,
        }
    }
}

impl FromStr for Granularity {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" => Ok(Granularity::Node),
            "core" => Ok(Granularity::Core),
            _ => Err(TopologyError::UnknownGranularity(s.to_string())),
        }
    }
}

/// A compute-unit assignment for one shard.
///
/// Wraps the cpuset a shard is pinned to. The canonical string form
/// ([`Unit::encode`]) and the weight are what get attached as instance
/// labels; [`Unit::from_label_parts`] rebuilds the unit from those labels
/// when the live view is reconstructed from the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    cpus: CpuSet,
}

impl Unit {
    pub(crate) fn from_cpus(cpus: CpuSet) -> Self {
        Self { cpus }
    }

    /// The cpuset backing this unit.
    pub fn cpus(&self) -> &CpuSet {
        &self.cpus
    }

    /// Canonical string encoding, suitable for a label value.
    pub fn encode(&self) -> String {
        self.cpus.to_string()
    }

    /// Number of processing units assigned, used to size the shard's
    /// internal parallelism.
    pub fn weight(&self) -> usize {
        self.cpus.weight()
    }

    /// Rebuild a unit from the label values attached at launch.
    ///
    /// # Panics
    ///
    /// Panics if either label is unparseable or if the weight disagrees
    /// with the encoding. Every instance this system creates carries
    /// well-formed labels, so a bad value means the instance was tampered
    /// with and the layout can no longer be trusted.
    pub fn from_label_parts(encoding: &str, weight: &str) -> Self {
        let cpus: CpuSet = match encoding.parse() {
            Ok(cpus) => cpus,
            Err(_) => panic!("corrupt unit label '{encoding}' on instance"),
        };
        let labeled: usize = match weight.parse() {
            Ok(w) => w,
            Err(_) => panic!("corrupt weight label '{weight}' on instance"),
        };
        if labeled != cpus.weight() {
            panic!(
                "weight label '{labeled}' disagrees with unit '{encoding}' on instance"
            );
        }
        Self { cpus }
    }
}

#[derive(Debug, Clone)]
struct Object {
    depth: usize,
    cpuset: CpuSet,
    children: Vec<Object>,
}

/// The machine's discovered hardware layout.
#[derive(Debug, Clone)]
pub struct Topology {
    root: Object,
}

impl Topology {
    /// Discover the running machine's topology from sysfs.
    ///
    /// Failure here is fatal for the system as a whole; nothing can be
    /// distributed without topology data.
    pub fn discover() -> Result<Self, TopologyError> {
        Self::from_sysfs(Path::new("/sys/devices/system"))
    }

    /// Discover a topology from an alternate sysfs root.
    pub fn from_sysfs(root: &Path) -> Result<Self, TopologyError> {
        sysfs::discover_from(root)
    }

    /// Build a topology from an explicit layout: one entry per NUMA node,
    /// each listing the cpusets of its cores.
    pub fn from_layout(nodes: &[Vec<CpuSet>]) -> Result<Self, TopologyError> {
        let mut node_objects = Vec::with_capacity(nodes.len());
        let mut machine_set = CpuSet::new();

        for cores in nodes {
            let mut core_objects = Vec::with_capacity(cores.len());
            let mut node_set = CpuSet::new();

            for core in cores {
                if core.is_empty() {
                    continue;
                }
                let pus = core
                    .iter()
                    .map(|cpu| Object {
                        depth: 3,
                        cpuset: [cpu].into_iter().collect(),
                        children: Vec::new(),
                    })
                    .collect();
                node_set.union_with(core);
                core_objects.push(Object {
                    depth: 2,
                    cpuset: core.clone(),
                    children: pus,
                });
            }

            if core_objects.is_empty() {
                continue;
            }
            machine_set.union_with(&node_set);
            node_objects.push(Object {
                depth: 1,
                cpuset: node_set,
                children: core_objects,
            });
        }

        if machine_set.is_empty() {
            return Err(TopologyError::EmptyTopology);
        }

        Ok(Self {
            root: Object {
                depth: 0,
                cpuset: machine_set,
                children: node_objects,
            },
        })
    }

    /// Number of elementary compute units (cores) in the topology.
    pub fn n_cores(&self) -> usize {
        fn count(obj: &Object, depth: usize) -> usize {
            if obj.depth == depth {
                return 1;
            }
            obj.children.iter().map(|c| count(c, depth)).sum()
        }
        count(&self.root, 2)
    }

    /// Every processing unit visible in the topology.
    pub fn cpus(&self) -> &CpuSet {
        &self.root.cpuset
    }

    /// Partition the topology into exactly `n` units at the requested
    /// granularity.
    ///
    /// The result order is deterministic for a fixed topology and `n`.
    /// When `n` exceeds the number of granularity-level objects, units
    /// alias the underlying cpusets rather than erroring.
    pub fn distribute(
        &self,
        n: usize,
        granularity: Granularity,
    ) -> Result<Vec<Unit>, TopologyError> {
        if n == 0 {
            return Err(TopologyError::ZeroShards);
        }

        let mut sets = Vec::with_capacity(n);
        distrib(
            std::slice::from_ref(&self.root),
            n,
            granularity.depth(),
            &mut sets,
        );
        debug_assert_eq!(sets.len(), n);

        Ok(sets.into_iter().map(Unit::from_cpus).collect())
    }
}

/// Hand each root a chunk of `n` proportional to its processing-unit
/// weight, computed with cumulative ceiling division so the chunks always
/// sum to `n` exactly.
fn distrib(roots: &[Object], n: usize, until: usize, out: &mut Vec<CpuSet>) {
    let total: usize = roots.iter().map(|r| r.cpuset.weight()).sum();
    let mut given_weight = 0usize;

    for root in roots {
        let weight = root.cpuset.weight();
        if weight == 0 {
            continue;
        }

        let chunk = ((given_weight + weight) * n).div_ceil(total)
            - (given_weight * n).div_ceil(total);

        if chunk == 0 {
            // No share left for this subtree; fold its cpus into the
            // previously emitted set so they stay covered. The first
            // subtree always receives a chunk, so `out` is non-empty here.
            if let Some(prev) = out.last_mut() {
                prev.union_with(&root.cpuset);
            }
        } else if chunk == 1 || root.children.is_empty() || root.depth >= until {
            for _ in 0..chunk {
                out.push(root.cpuset.clone());
            }
        } else {
            distrib(&root.children, chunk, until, out);
        }

        given_weight += weight;
    }
}
