//! Outcome kinds and their fixed precedence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A test verdict.
///
/// Variants are declared in precedence order, worst first, so the derived
/// `Ord` sorts the most significant kind lowest and `min()` over a set of
/// kinds yields the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeKind {
    Skipped = 0,
    Blocked = 1,
    DumpedCore = 2,
    TimedOut = 3,
    Failed = 4,
    NotVerified = 5,
    Inspect = 6,
    Passed = 7,
}

/// Static properties of one outcome kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeDescriptor {
    pub kind: OutcomeKind,
    /// Human-readable name used in reasons and reports.
    pub name: &'static str,
    pub is_failure: bool,
}

/// The precedence table. Index is precedence; lower wins.
pub const PRECEDENCE: [OutcomeDescriptor; 8] = [
    OutcomeDescriptor { kind: OutcomeKind::Skipped, name: "SKIPPED", is_failure: false },
    OutcomeDescriptor { kind: OutcomeKind::Blocked, name: "BLOCKED", is_failure: true },
    OutcomeDescriptor { kind: OutcomeKind::DumpedCore, name: "DUMPED CORE", is_failure: true },
    OutcomeDescriptor { kind: OutcomeKind::TimedOut, name: "TIMED OUT", is_failure: true },
    OutcomeDescriptor { kind: OutcomeKind::Failed, name: "FAILED", is_failure: true },
    OutcomeDescriptor { kind: OutcomeKind::NotVerified, name: "NOT VERIFIED", is_failure: false },
    OutcomeDescriptor { kind: OutcomeKind::Inspect, name: "REQUIRES INSPECTION", is_failure: false },
    OutcomeDescriptor { kind: OutcomeKind::Passed, name: "PASSED", is_failure: false },
];

impl OutcomeKind {
    /// All kinds in precedence order.
    pub const ALL: [OutcomeKind; 8] = [
        OutcomeKind::Skipped,
        OutcomeKind::Blocked,
        OutcomeKind::DumpedCore,
        OutcomeKind::TimedOut,
        OutcomeKind::Failed,
        OutcomeKind::NotVerified,
        OutcomeKind::Inspect,
        OutcomeKind::Passed,
    ];

    pub fn precedence(self) -> usize {
        self as usize
    }

    pub fn descriptor(self) -> &'static OutcomeDescriptor {
        &PRECEDENCE[self.precedence()]
    }

    pub fn is_failure(self) -> bool {
        self.descriptor().is_failure
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    /// Accepts display names ("TIMED OUT") and compact names ("TIMEDOUT"),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase();
        PRECEDENCE
            .iter()
            .find(|d| d.name.replace(' ', "") == wanted || format!("{:?}", d.kind).to_uppercase() == wanted)
            .map(|d| d.kind)
            .ok_or_else(|| format!("Unknown outcome: {}", s))
    }
}
