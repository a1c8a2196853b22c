//! Checker configuration
//!
//! Mirrors the shape of the simulator's `MemoryConfig`: a plain struct with
//! a `Default` impl, builder-style setters, and serde support so a config
//! can travel with an exported snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Memory model whose calculators decide consistency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryModel {
    /// Sequential consistency
    Sc,
    /// Release/acquire: every read acquires, every write releases
    Ra,
    /// Repaired C11
    #[default]
    Rc11,
    /// Linux-kernel style model with dependency tracking and RCU
    Lkmm,
}

impl MemoryModel {
    /// Whether backward revisits use pporf views with holes
    pub const fn tracks_dependencies(self) -> bool {
        matches!(self, Self::Lkmm)
    }

    /// Whether views treat every access as synchronizing
    pub const fn upgrades_to_release_acquire(self) -> bool {
        matches!(self, Self::Ra | Self::Sc)
    }

    /// Short identifier
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sc => "sc",
            Self::Ra => "ra",
            Self::Rc11 => "rc11",
            Self::Lkmm => "lkmm",
        }
    }
}

impl fmt::Display for MemoryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MemoryModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sc" => Ok(Self::Sc),
            "ra" => Ok(Self::Ra),
            "rc11" => Ok(Self::Rc11),
            "lkmm" => Ok(Self::Lkmm),
            other => Err(format!("unknown memory model: {other}")),
        }
    }
}

/// Strategy for ordering stores to the same location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CoherenceKind {
    /// One explicit total order per location, extended by placement choices
    ExplicitOrder,
    /// Explicit order that also bounds choices by what program-order
    /// successors already observe; used when events arrive out of order
    ExplicitOutOfOrder,
    /// Writes-before computed on demand from hb and rf
    #[default]
    DerivedOrder,
}

impl CoherenceKind {
    /// Whether stores carry an explicit per-location order
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::ExplicitOrder | Self::ExplicitOutOfOrder)
    }
}

impl fmt::Display for CoherenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitOrder => f.write_str("mo"),
            Self::ExplicitOutOfOrder => f.write_str("mo-ooo"),
            Self::DerivedOrder => f.write_str("wb"),
        }
    }
}

impl FromStr for CoherenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mo" | "explicit" => Ok(Self::ExplicitOrder),
            "mo-ooo" | "out-of-order" => Ok(Self::ExplicitOutOfOrder),
            "wb" | "derived" => Ok(Self::DerivedOrder),
            other => Err(format!("unknown coherence strategy: {other}")),
        }
    }
}

/// How much of the fixpoint to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckStrength {
    /// Monotone phase only, used after every step
    Step,
    /// Monotone phase plus the final combinatorial search
    Full,
}

/// Default bound on events per thread
pub const DEFAULT_MAX_THREAD_EVENTS: usize = 256;

/// Exploration configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Memory model
    pub model: MemoryModel,
    /// Coherence strategy
    pub coherence: CoherenceKind,
    /// Stop at the first finding
    pub halt_on_error: bool,
    /// Per-thread event bound before a graph-size warning
    pub max_thread_events: usize,
    /// Run the built-in race detector
    pub check_races: bool,
    /// Worker threads for parallel exploration
    pub workers: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            model: MemoryModel::default(),
            coherence: CoherenceKind::default(),
            halt_on_error: true,
            max_thread_events: DEFAULT_MAX_THREAD_EVENTS,
            check_races: true,
            workers: 1,
        }
    }
}

impl CheckerConfig {
    /// Select the memory model
    #[must_use]
    pub const fn with_model(mut self, model: MemoryModel) -> Self {
        self.model = model;
        self
    }

    /// Select the coherence strategy
    #[must_use]
    pub const fn with_coherence(mut self, coherence: CoherenceKind) -> Self {
        self.coherence = coherence;
        self
    }

    /// Continue past findings instead of halting
    #[must_use]
    pub const fn keep_going(mut self) -> Self {
        self.halt_on_error = false;
        self
    }

    /// Per-thread event bound
    #[must_use]
    pub const fn with_max_thread_events(mut self, bound: usize) -> Self {
        self.max_thread_events = bound;
        self
    }

    /// Enable or disable race detection
    #[must_use]
    pub const fn with_race_checks(mut self, enabled: bool) -> Self {
        self.check_races = enabled;
        self
    }

    /// Number of exploration workers (at least one)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
