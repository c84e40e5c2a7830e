//! Grouping data model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::costs::Cost;
use crate::graph::FStage;

/// A group is a sub-pipeline with a single output stage. Members are either
/// inlined into their consumers within the group or computed at tiles of the
/// output, per `tile_sizes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// The stage whose tiles drive the whole group.
    pub output: FStage,
    /// Stages computed as part of this group; all stages of a member
    /// function are present together, and `output` is one of them.
    pub members: Vec<FStage>,
    /// Pure member functions spliced into their consumers.
    pub inlined: BTreeSet<String>,
    /// Tile sizes along the pure dimensions of the output.
    pub tile_sizes: BTreeMap<String, i64>,
}

impl Group {
    pub fn new(output: FStage, members: Vec<FStage>) -> Self {
        Self { output, members, inlined: BTreeSet::new(), tile_sizes: BTreeMap::new() }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output: {}, members: {{", self.output)?;
        for (i, m) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{m}")?;
        }
        write!(f, "}}, inlined: {{")?;
        for (i, name) in self.inlined.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}, tiles: {{")?;
        for (i, (var, size)) in self.tile_sizes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({var}, {size})")?;
        }
        write!(f, "}}")
    }
}

/// Estimated cost and exploitable parallelism of computing a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAnalysis {
    pub cost: Cost,
    pub parallelism: Option<i64>,
}

impl GroupAnalysis {
    pub fn unknown() -> Self {
        Self { cost: Cost::unknown(), parallelism: None }
    }

    pub fn is_known(&self) -> bool {
        self.cost.is_known() && self.parallelism.is_some()
    }
}

impl fmt::Display for GroupAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "[arith: {}, memory: {}, parallelism: {}]",
            opt(self.cost.arith),
            opt(self.cost.memory),
            opt(self.parallelism)
        )
    }
}

/// Tile sizes a group was scored with, and the resulting analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub tile_sizes: BTreeMap<String, i64>,
    pub analysis: GroupAnalysis,
}

/// A candidate merge of producer function `prod` into the group that owns
/// consumer stage `cons`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupingChoice {
    pub prod: String,
    pub cons: FStage,
}

impl fmt::Display for GroupingChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.prod, self.cons)
    }
}

/// Grouping mode. `Inline` splices pure producers into consumers; `FastMem`
/// computes producers at tiles of their single consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingLevel {
    Inline,
    FastMem,
}
