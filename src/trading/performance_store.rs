use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::StoreResult;
use crate::trading::adaptation::PatternPerformanceRecord;

/// Persistent per-profile performance history.
pub trait PerformanceStore: Send + Sync {
    fn load(&self, profile: &str) -> StoreResult<Vec<PatternPerformanceRecord>>;
    /// Replace the stored list wholesale.
    fn save(&self, profile: &str, records: &[PatternPerformanceRecord]) -> StoreResult<()>;
}

/// One pretty-printed JSON file per profile under a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("performance_{}.json", profile))
    }
}

impl PerformanceStore for JsonFileStore {
    fn load(&self, profile: &str) -> StoreResult<Vec<PatternPerformanceRecord>> {
        let path = self.path_for(profile);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        let mut records: Vec<PatternPerformanceRecord> = serde_json::from_str(&content)?;
        for r in &mut records {
            r.recompute();
        }
        Ok(records)
    }

    fn save(&self, profile: &str, records: &[PatternPerformanceRecord]) -> StoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(profile);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(records)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Load history, falling back to an empty list on any failure.
pub fn load_or_empty(store: &dyn PerformanceStore, profile: &str) -> Vec<PatternPerformanceRecord> {
    match store.load(profile) {
        Ok(records) => {
            info!("Loaded {} performance records for '{}'", records.len(), profile);
            records
        }
        Err(e) => {
            warn!("Performance history for '{}' unavailable, starting empty: {}", profile, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Regime;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("perf_store_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_is_empty() {
        let store = JsonFileStore::new(temp_dir("missing"));
        assert!(store.load("balanced").unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        let store = JsonFileStore::new(&dir);
        fs::write(store.path_for("balanced"), "{not json").unwrap();
        assert!(store.load("balanced").is_err());
        assert!(load_or_empty(&store, "balanced").is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn profiles_are_kept_apart() {
        let dir = temp_dir("profiles");
        let store = JsonFileStore::new(&dir);
        let mut rec = PatternPerformanceRecord::new("engulfing", Regime::Trend);
        rec.record(true);
        store.save("aggressive", &[rec.clone()]).unwrap();

        assert_eq!(store.load("aggressive").unwrap(), vec![rec]);
        assert!(store.load("conservative").unwrap().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }
}
