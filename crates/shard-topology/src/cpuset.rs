//! Processing-unit index sets and their canonical list encoding.
//!
//! The list format is the one cpuset interfaces speak: maximal ascending
//! ranges separated by commas, single members printed bare (`"0-3,8"`).
//! [`CpuSet`]'s `Display` always emits the canonical form and `FromStr`
//! accepts any valid list, so an encoding attached as an instance label
//! parses back to an identical set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;

/// An ordered set of processing-unit indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuSet(BTreeSet<u32>);

impl CpuSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Add a processing unit to the set.
    pub fn insert(&mut self, cpu: u32) {
        self.0.insert(cpu);
    }

    /// Whether `cpu` is a member.
    pub fn contains(&self, cpu: u32) -> bool {
        self.0.contains(&cpu)
    }

    /// Number of processing units in the set.
    pub fn weight(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge every member of `other` into this set.
    pub fn union_with(&mut self, other: &CpuSet) {
        self.0.extend(other.0.iter().copied());
    }

    /// Whether the two sets share any member.
    pub fn intersects(&self, other: &CpuSet) -> bool {
        self.0.iter().any(|cpu| other.0.contains(cpu))
    }

    /// Members present in both sets.
    pub fn intersection(&self, other: &CpuSet) -> CpuSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Iterate members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for CpuSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for cpu in self.0.iter().copied() {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == cpu => *end = cpu,
                _ => ranges.push((cpu, cpu)),
            }
        }

        let mut sep = "";
        for (start, end) in ranges {
            if start == end {
                write!(f, "{sep}{start}")?;
            } else {
                write!(f, "{sep}{start}-{end}")?;
            }
            sep = ",";
        }

        Ok(())
    }
}

impl FromStr for CpuSet {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TopologyError::InvalidCpuList(s.to_string());
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut set = BTreeSet::new();

        for part in trimmed.split(',') {
            let part = part.trim();
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: u32 = lo.trim().parse().map_err(|_| invalid())?;
                    let hi: u32 = hi.trim().parse().map_err(|_| invalid())?;
                    if lo > hi {
                        return Err(invalid());
                    }
                    set.extend(lo..=hi);
                }
                None => {
                    set.insert(part.parse().map_err(|_| invalid())?);
                }
            }
        }

        Ok(Self(set))
    }
}
