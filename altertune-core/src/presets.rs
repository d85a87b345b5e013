//! # Fingering Presets Module
//!
//! Named fingerings kept in a key-value store, filterable by string count.
//! Two stores are provided: an in-memory one and a single JSON file.

use crate::tuning::Fingering;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A saved fingering. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingeringPreset {
    pub id: String,
    pub name: String,
    pub strings_count: usize,
    pub fingering: Fingering,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning_name: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Storage contract for fingering presets.
pub trait PresetStore {
    /// All presets, most recently updated first.
    fn list(&self) -> Result<Vec<FingeringPreset>>;

    fn get(&self, id: &str) -> Result<Option<FingeringPreset>>;

    /// Creates a preset, or overwrites the one with `id`, keeping its creation time.
    fn save(
        &mut self,
        name: &str,
        fingering: &Fingering,
        strings_count: usize,
        tuning_name: Option<&str>,
        id: Option<&str>,
    ) -> Result<FingeringPreset>;

    /// Renames a preset. Unknown ids are ignored.
    fn rename(&mut self, id: &str, name: &str) -> Result<()>;

    fn remove(&mut self, id: &str) -> Result<()>;

    /// Presets made for an instrument with `strings_count` strings.
    fn list_for_strings(&self, strings_count: usize) -> Result<Vec<FingeringPreset>> {
        let mut presets = self.list()?;
        presets.retain(|p| p.strings_count == strings_count);
        Ok(presets)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Presets keyed by id; the shared logic behind both stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct PresetTable {
    presets: BTreeMap<String, FingeringPreset>,
}

impl PresetTable {
    fn sorted(&self) -> Vec<FingeringPreset> {
        let mut presets: Vec<FingeringPreset> = self.presets.values().cloned().collect();
        presets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        presets
    }

    fn upsert(
        &mut self,
        name: &str,
        fingering: &Fingering,
        strings_count: usize,
        tuning_name: Option<&str>,
        id: Option<&str>,
    ) -> FingeringPreset {
        let now = now_millis();
        let id = id
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let created_at = self.presets.get(&id).map_or(now, |p| p.created_at);
        let preset = FingeringPreset {
            id: id.clone(),
            name: name.to_owned(),
            strings_count,
            fingering: fingering.clone(),
            tuning_name: tuning_name.map(str::to_owned),
            created_at,
            updated_at: now,
        };
        self.presets.insert(id, preset.clone());
        preset
    }

    fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.presets.get_mut(id) {
            Some(preset) => {
                preset.name = name.to_owned();
                preset.updated_at = now_millis().max(preset.updated_at);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        self.presets.remove(id).is_some()
    }
}

/// Presets that live as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresetStore {
    table: PresetTable,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStore for MemoryPresetStore {
    fn list(&self) -> Result<Vec<FingeringPreset>> {
        Ok(self.table.sorted())
    }

    fn get(&self, id: &str) -> Result<Option<FingeringPreset>> {
        Ok(self.table.presets.get(id).cloned())
    }

    fn save(
        &mut self,
        name: &str,
        fingering: &Fingering,
        strings_count: usize,
        tuning_name: Option<&str>,
        id: Option<&str>,
    ) -> Result<FingeringPreset> {
        Ok(self.table.upsert(name, fingering, strings_count, tuning_name, id))
    }

    fn rename(&mut self, id: &str, name: &str) -> Result<()> {
        self.table.rename(id, name);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        self.table.remove(id);
        Ok(())
    }
}

/// Presets persisted as one JSON object keyed by id.
///
/// Every write replaces the file atomically through a temporary file in the
/// same directory.
#[derive(Debug, Clone)]
pub struct JsonPresetStore {
    path: PathBuf,
}

impl JsonPresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<PresetTable> {
        if !self.path.exists() {
            return Ok(PresetTable::default());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read presets from {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid preset file {}", self.path.display()))
    }

    fn store(&self, table: &PresetTable) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create preset directory {}", dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, table)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write presets to {}", self.path.display()))?;
        Ok(())
    }

    fn modify<R>(&self, edit: impl FnOnce(&mut PresetTable) -> R) -> Result<R> {
        let mut table = self.load()?;
        let result = edit(&mut table);
        self.store(&table)?;
        Ok(result)
    }
}

impl PresetStore for JsonPresetStore {
    fn list(&self) -> Result<Vec<FingeringPreset>> {
        Ok(self.load()?.sorted())
    }

    fn get(&self, id: &str) -> Result<Option<FingeringPreset>> {
        Ok(self.load()?.presets.remove(id))
    }

    fn save(
        &mut self,
        name: &str,
        fingering: &Fingering,
        strings_count: usize,
        tuning_name: Option<&str>,
        id: Option<&str>,
    ) -> Result<FingeringPreset> {
        let preset =
            self.modify(|table| table.upsert(name, fingering, strings_count, tuning_name, id))?;
        log::info!(target: "presets", "Saved preset {:?} ({})", preset.name, preset.id);
        Ok(preset)
    }

    fn rename(&mut self, id: &str, name: &str) -> Result<()> {
        let mut table = self.load()?;
        if table.rename(id, name) {
            self.store(&table)?;
        } else {
            log::debug!(target: "presets", "Rename of unknown preset {} ignored", id);
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        if self.modify(|table| table.remove(id))? {
            log::info!(target: "presets", "Deleted preset {}", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn PresetStore) {
        let open = Fingering::open(6);
        let drop_d = Fingering::from_frets([0, 2, 2, 1, 0, 0]);
        let a = store.save("Open", &open, 6, Some("Standard (EADGBE)"), None).unwrap();
        let b = store.save("Seven", &Fingering::open(7), 7, None, Some("seven")).unwrap();
        assert_eq!(b.id, "seven");
        assert_eq!(store.list().unwrap().len(), 2);

        let six = store.list_for_strings(6).unwrap();
        assert_eq!(six.len(), 1);
        assert_eq!(six[0].id, a.id);

        let overwritten = store.save("E major", &drop_d, 6, None, Some(a.id.as_str())).unwrap();
        assert_eq!(overwritten.created_at, a.created_at);
        assert_eq!(store.get(&a.id).unwrap().unwrap().fingering, drop_d);

        store.rename(&a.id, "E shape").unwrap();
        assert_eq!(store.get(&a.id).unwrap().unwrap().name, "E shape");
        store.rename("missing", "whatever").unwrap();

        store.remove("seven").unwrap();
        assert!(store.get("seven").unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryPresetStore::new());
    }

    #[test]
    fn json_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&mut JsonPresetStore::new(dir.path().join("nested").join("presets.json")));
    }

    #[test]
    fn json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        let saved = JsonPresetStore::new(&path)
            .save("Mute low", &Fingering::from_frets([-1, 0, 0]), 3, None, None)
            .unwrap();
        let reopened = JsonPresetStore::new(&path);
        assert_eq!(reopened.get(&saved.id).unwrap(), Some(saved));
    }

    #[test]
    fn list_is_newest_first() {
        let mut store = MemoryPresetStore::new();
        store.table.presets.insert(
            "old".into(),
            FingeringPreset {
                id: "old".into(),
                name: "old".into(),
                strings_count: 6,
                fingering: Fingering::open(6),
                tuning_name: None,
                created_at: 1,
                updated_at: 1,
            },
        );
        store.save("new", &Fingering::open(6), 6, None, None).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["new", "old"]);
    }
}
