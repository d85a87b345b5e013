//! # Session Module
//!
//! The editable configuration the scheduler plays from: tuning, fingering,
//! pattern and transport. The surrounding application owns it and edits it
//! while the scheduler reads a consistent view on every tick.

use crate::{
    config::SchedulerConfig,
    pattern::ArpeggioPattern,
    transport::TransportState,
    tuning::{Fingering, Tuning},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub tuning: Tuning,
    pub fingering: Fingering,
    pub pattern: ArpeggioPattern,
    pub transport: TransportState,
}

impl Default for Session {
    fn default() -> Self {
        let tuning = Tuning::standard();
        let fingering = Fingering::open(tuning.string_count());
        Self {
            tuning,
            fingering,
            pattern: ArpeggioPattern::default(),
            transport: TransportState::default(),
        }
    }
}

impl Session {
    /// Restores the model invariants after loading from an untrusted source.
    pub fn normalize(&mut self) {
        self.tuning.normalize();
        let dropped = self.pattern.retain_in_cycle();
        if dropped > 0 {
            log::warn!(target: "session", "Dropped {} pattern events outside the cycle", dropped);
        }
    }
}

/// On-disk session: the session itself plus optional scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    #[serde(flatten)]
    pub session: Session,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl SessionFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let mut file: SessionFile = serde_json::from_str(&text)
            .with_context(|| format!("Invalid session file {}", path.display()))?;
        file.session.normalize();
        // Playback always starts from an explicit play command.
        file.session.transport.playing = false;
        log::info!(target: "session", "Loaded session from {}", path.display());
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write session file {}", path.display()))?;
        Ok(())
    }
}

/// Shared handle to a [`Session`].
///
/// Readers and writers go through a lock so a scheduler tick never observes
/// a half-applied edit. A poisoned lock is recovered, since the session is
/// plain data and stays usable.
#[derive(Debug, Clone, Default)]
pub struct SharedSession(Arc<RwLock<Session>>);

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(RwLock::new(session)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies an edit under the write lock.
    pub fn update<R>(&self, edit: impl FnOnce(&mut Session) -> R) -> R {
        edit(&mut self.write())
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }
}
