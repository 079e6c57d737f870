use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::Nudge;

/// Fingerprints the user has dismissed. Owned by the caller, never written back to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissedSet {
    fingerprints: BTreeSet<String>,
}

impl DismissedSet {
    pub fn dismiss(&mut self, fingerprint: &str) -> bool {
        self.fingerprints.insert(fingerprint.to_string())
    }

    pub fn is_dismissed(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn visible(&self, nudges: &[Nudge]) -> Vec<Nudge> {
        nudges
            .iter()
            .filter(|nudge| !self.is_dismissed(&nudge.fingerprint))
            .cloned()
            .collect()
    }

    /// Drops fingerprints that no live nudge carries any more. Returns how many were removed.
    pub fn prune(&mut self, live: &[Nudge]) -> usize {
        let live: BTreeSet<&str> = live.iter().map(|nudge| nudge.fingerprint.as_str()).collect();
        let before = self.fingerprints.len();
        self.fingerprints
            .retain(|fingerprint| live.contains(fingerprint.as_str()));
        before - self.fingerprints.len()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dismissal state {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&raw)
            .with_context(|| format!("dismissal state {} is not valid JSON", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write dismissal state {}", path.display()))
    }
}
