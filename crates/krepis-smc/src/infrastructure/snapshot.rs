//! Snapshot export and import
//!
//! A [`Snapshot`] is the configuration plus the explorer's frontier (saved
//! parents and the live state), encoded as JSON. Calculators and relation
//! caches are not part of the encoding; they are rebuilt from the model
//! when a state is imported.

use crate::domain::config::CheckerConfig;
use crate::domain::error::CheckerError;
use crate::domain::revisit::{ExecutionState, Explorer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Snapshot format revision
pub const SNAPSHOT_VERSION: u32 = 1;

/// Resumable search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format revision
    pub version: u32,
    /// Configuration the search ran with
    pub config: CheckerConfig,
    /// Saved parents first, live state last
    pub frontier: Vec<ExecutionState>,
}

impl Snapshot {
    /// Capture an explorer's frontier
    pub fn capture(explorer: &Explorer) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            config: explorer.config().clone(),
            frontier: explorer.frontier(),
        }
    }

    /// Explorer continuing the captured search
    pub fn into_explorer(self) -> Explorer {
        Explorer::resume(self.config, self.frontier)
    }

    /// Encode as JSON
    pub fn to_json(&self) -> Result<String, CheckerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON and rebuild every graph's calculators
    pub fn from_json(json: &str) -> Result<Self, CheckerError> {
        let mut snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CheckerError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        for state in &mut snapshot.frontier {
            restore(state)?;
        }
        debug!(states = snapshot.frontier.len(), "snapshot decoded");
        Ok(snapshot)
    }

    /// Write to a file
    pub fn save(&self, path: &Path) -> Result<(), CheckerError> {
        fs::write(path, self.to_json()?).map_err(|e| CheckerError::Snapshot(e.to_string()))?;
        info!(path = %path.display(), states = self.frontier.len(), "snapshot saved");
        Ok(())
    }

    /// Read from a file
    pub fn load(path: &Path) -> Result<Self, CheckerError> {
        let json = fs::read_to_string(path).map_err(|e| CheckerError::Snapshot(e.to_string()))?;
        Self::from_json(&json)
    }
}

/// Encode one execution state
pub fn export_state(state: &ExecutionState) -> Result<String, CheckerError> {
    Ok(serde_json::to_string(state)?)
}

/// Decode one execution state, ready to explore
pub fn import_state(json: &str) -> Result<ExecutionState, CheckerError> {
    let mut state: ExecutionState = serde_json::from_str(json)?;
    restore(&mut state)?;
    Ok(state)
}

fn restore(state: &mut ExecutionState) -> Result<(), CheckerError> {
    state.graph.install_calculators();
    state.graph.check_invariants()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CoherenceKind, MemoryModel};
    use crate::domain::graph::{Event, EventLabel, LabelKind, MemOrdering};

    #[test]
    fn test_state_roundtrip() {
        let mut state = ExecutionState::new(MemoryModel::Sc, CoherenceKind::ExplicitOrder);
        state
            .graph
            .add_label(EventLabel::new(
                Event::new(0, 1),
                MemOrdering::SeqCst,
                LabelKind::Fence,
            ))
            .unwrap();

        let json = export_state(&state).unwrap();
        let mut back = import_state(&json).unwrap();
        assert_eq!(back.graph.thread_size(0), 2);
        assert_eq!(back.graph.model(), MemoryModel::Sc);
        assert!(back.graph.is_consistent(crate::domain::config::CheckStrength::Full));
    }

    #[test]
    fn test_rejects_other_versions() {
        let snap = Snapshot {
            version: SNAPSHOT_VERSION + 1,
            config: CheckerConfig::default(),
            frontier: Vec::new(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(matches!(
            Snapshot::from_json(&json),
            Err(CheckerError::Snapshot(_))
        ));
    }

    #[test]
    fn test_garbage_is_a_snapshot_error() {
        assert!(matches!(import_state("{"), Err(CheckerError::Snapshot(_))));
    }
}
