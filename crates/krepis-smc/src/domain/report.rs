//! Verification results
//!
//! Findings and warnings are data, not errors: the explorer collects them
//! per execution and commits them only once that execution passes the full
//! consistency check.

use super::graph::{Address, Event, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Findings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Property violation found in a consistent execution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Finding {
    /// Conflicting accesses unordered by happens-before, at least one of
    /// them non-atomic
    DataRace {
        /// Location
        addr: Address,
        /// Earlier access in graph order
        first: Event,
        /// Later access in graph order
        second: Event,
    },

    /// Every unfinished thread waits on a join or a held lock
    Deadlock {
        /// Blocked threads
        threads: Vec<usize>,
    },

    /// Access to freed memory not ordered before the free
    UseAfterFree {
        /// Accessed location
        addr: Address,
        /// Offending access
        access: Event,
        /// Free of the enclosing block
        free: Event,
    },

    /// Second free of one block
    DoubleFree {
        /// Block base
        addr: Address,
        /// First free
        first: Event,
        /// Second free
        second: Event,
    },

    /// Free of an address that is not the base of a live allocation
    InvalidFree {
        /// Freed address
        addr: Address,
        /// Offending free
        free: Event,
    },

    /// `assert` evaluated to false
    AssertionViolation {
        /// Asserting thread
        thread: usize,
        /// Message attached to the assertion
        message: String,
    },
}

impl Finding {
    /// Short category name
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DataRace { .. } => "data-race",
            Self::Deadlock { .. } => "deadlock",
            Self::UseAfterFree { .. } => "use-after-free",
            Self::DoubleFree { .. } => "double-free",
            Self::InvalidFree { .. } => "invalid-free",
            Self::AssertionViolation { .. } => "assertion",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataRace { addr, first, second } => {
                write!(f, "data race on {addr} between {first} and {second}")
            }
            Self::Deadlock { threads } => write!(f, "deadlock among threads {threads:?}"),
            Self::UseAfterFree { addr, access, free } => {
                write!(f, "use after free of {addr}: {access} races with free {free}")
            }
            Self::DoubleFree { addr, first, second } => {
                write!(f, "double free of {addr} at {first} and {second}")
            }
            Self::InvalidFree { addr, free } => write!(f, "invalid free of {addr} at {free}"),
            Self::AssertionViolation { thread, message } => {
                write!(f, "assertion failed in thread {thread}: {message}")
            }
        }
    }
}

/// Resource exhaustion, reported without stopping the search
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Warning {
    /// A thread grew past the per-thread event bound and was blocked
    GraphBound {
        /// Offending thread
        thread: usize,
        /// Events it held when blocked
        events: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GraphBound { thread, events } => {
                write!(f, "thread {thread} exceeded the graph bound at {events} events")
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcomes and statistics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Final register values of one complete execution
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outcome(pub BTreeMap<String, Value>);

impl Outcome {
    /// Outcome from `(register, value)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    /// Value of a register
    pub fn get(&self, register: &str) -> Option<Value> {
        self.0.get(register).copied()
    }

    /// Every register of `pattern` holds the same value here
    pub fn matches(&self, pattern: &Self) -> bool {
        pattern.0.iter().all(|(reg, v)| self.get(reg) == Some(*v))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (reg, value) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{reg}={value}")?;
        }
        Ok(())
    }
}

/// Statistics for revisit-based exploration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationStats {
    /// Executions where every thread finished
    pub complete: usize,

    /// Executions that ended with a blocked thread
    pub blocked: usize,

    /// Candidates discarded by a consistency check
    pub inconsistent: usize,

    /// Alternative reads-from edges and placements tried
    pub forward_revisits: usize,

    /// Backward revisits explored
    pub backward_revisits: usize,

    /// Deepest stack of saved executions
    pub max_stack_depth: usize,
}

impl ExplorationStats {
    /// Fold another worker's statistics into these
    pub fn merge(&mut self, other: &Self) {
        self.complete += other.complete;
        self.blocked += other.blocked;
        self.inconsistent += other.inconsistent;
        self.forward_revisits += other.forward_revisits;
        self.backward_revisits += other.backward_revisits;
        self.max_stack_depth = self.max_stack_depth.max(other.max_stack_depth);
    }

    /// Executions that reached the end, complete or blocked
    pub const fn executions(&self) -> usize {
        self.complete + self.blocked
    }
}

/// Everything a search produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Distinct findings in discovery order
    pub findings: Vec<Finding>,
    /// Distinct warnings in discovery order
    pub warnings: Vec<Warning>,
    /// Exploration counters
    pub stats: ExplorationStats,
    /// How many complete executions ended with each outcome
    #[serde(with = "outcome_list")]
    pub outcomes: BTreeMap<Outcome, usize>,
}

/// Outcome tallies travel as a list of pairs; JSON keys must be strings
mod outcome_list {
    use super::Outcome;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Outcome, usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Outcome, usize>, D::Error> {
        Ok(Vec::<(Outcome, usize)>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

impl VerificationResult {
    /// No finding at all
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Record a finding unless already present; returns whether it was new
    pub fn add_finding(&mut self, finding: Finding) -> bool {
        if self.findings.contains(&finding) {
            return false;
        }
        self.findings.push(finding);
        true
    }

    /// Record a warning unless already present
    pub fn add_warning(&mut self, warning: Warning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: Self) {
        for f in other.findings {
            self.add_finding(f);
        }
        for w in other.warnings {
            self.add_warning(w);
        }
        self.stats.merge(&other.stats);
        for (outcome, n) in other.outcomes {
            *self.outcomes.entry(outcome).or_default() += n;
        }
    }

    /// Whether some complete execution ended in a state matching `outcome`
    ///
    /// Registers absent from `outcome` are unconstrained.
    pub fn allows(&self, outcome: &Outcome) -> bool {
        self.outcomes.keys().any(|o| o.matches(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_findings_are_deduplicated() {
        let mut r = VerificationResult::default();
        let race = Finding::DataRace {
            addr: Address(0x10),
            first: Event::new(1, 1),
            second: Event::new(2, 1),
        };
        assert!(r.add_finding(race.clone()));
        assert!(!r.add_finding(race));
        assert_eq!(r.findings.len(), 1);
        assert!(!r.is_clean());
    }

    #[test]
    fn test_merge_sums_counters_and_outcomes() {
        let o = Outcome::from_pairs([("r1", 1)]);
        let mut a = VerificationResult::default();
        a.stats.complete = 2;
        a.stats.max_stack_depth = 1;
        a.outcomes.insert(o.clone(), 2);

        let mut b = VerificationResult::default();
        b.stats.complete = 1;
        b.stats.max_stack_depth = 3;
        b.outcomes.insert(o.clone(), 1);
        b.add_warning(Warning::GraphBound { thread: 1, events: 4 });

        a.merge(b);
        assert_eq!(a.stats.complete, 3);
        assert_eq!(a.stats.max_stack_depth, 3);
        assert_eq!(a.outcomes[&o], 3);
        assert_eq!(a.warnings.len(), 1);
    }

    #[test]
    fn test_result_json_roundtrip() {
        let mut r = VerificationResult::default();
        r.outcomes.insert(Outcome::from_pairs([("r1", 0), ("r2", 1)]), 2);
        r.add_finding(Finding::Deadlock { threads: vec![1, 2] });
        let json = serde_json::to_string(&r).expect("serializable");
        let back: VerificationResult = serde_json::from_str(&json).expect("parsable");
        assert_eq!(back, r);
    }

    #[test]
    fn test_outcome_display() {
        let o = Outcome::from_pairs([("b", 2), ("a", 1)]);
        assert_eq!(o.to_string(), "a=1 b=2");
        assert_eq!(o.get("b"), Some(2));
        assert_eq!(o.get("c"), None);
    }

    #[test]
    fn test_allows_matches_partial_outcomes() {
        let mut r = VerificationResult::default();
        r.outcomes.insert(Outcome::from_pairs([("r0", 1), ("x", 2)]), 1);
        assert!(r.allows(&Outcome::from_pairs([("x", 2)])));
        assert!(r.allows(&Outcome::from_pairs([("r0", 1), ("x", 2)])));
        assert!(!r.allows(&Outcome::from_pairs([("x", 1)])));
        assert!(!r.allows(&Outcome::from_pairs([("r9", 0)])));
    }
}
