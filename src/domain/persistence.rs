//! State store - durable anchor state and trading statistics
//!
//! Two independent JSON documents under the data directory. Every write
//! goes to a temp file first and is renamed into place, so a crash
//! mid-write can never corrupt the previous valid state. Saves happen
//! synchronously right after a trade resolves; an error here is fatal
//! for the trading loop.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use super::anchor::AnchorState;
use super::stats::TradingStats;

pub const ANCHOR_STATE_FILE: &str = "anchor_state.json";
pub const TRADING_STATS_FILE: &str = "trading_stats.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to serialize state: {0}")]
    Serialize(String),

    #[error("Failed to deserialize {path}: {reason}")]
    Deserialize { path: String, reason: String },

    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loaded anchor state violates the holding invariant")]
    InconsistentState,
}

/// Owns the on-disk strategy state. The trading loop is the only writer.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(ANCHOR_STATE_FILE)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(TRADING_STATS_FILE)
    }

    /// Load the anchor state, or `None` on first run.
    pub fn load_state(&self) -> Result<Option<AnchorState>, PersistError> {
        let state: Option<AnchorState> = self.load_json(&self.state_path())?;
        if let Some(ref s) = state {
            if !s.is_consistent() {
                return Err(PersistError::InconsistentState);
            }
        }
        Ok(state)
    }

    pub fn save_state(&self, state: &AnchorState) -> Result<(), PersistError> {
        self.write_atomic(&self.state_path(), state)?;
        tracing::debug!(
            holding = state.holding,
            anchor = %state.anchor_price_usd,
            "Anchor state saved"
        );
        Ok(())
    }

    pub fn load_stats(&self) -> Result<TradingStats, PersistError> {
        Ok(self.load_json(&self.stats_path())?.unwrap_or_default())
    }

    pub fn save_stats(&self, stats: &TradingStats) -> Result<(), PersistError> {
        self.write_atomic(&self.stats_path(), stats)
    }

    fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, PersistError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PersistError::Deserialize {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Write to `<path>.tmp`, then rename over the target. Rename within
    /// one directory is atomic on the filesystems we care about.
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| PersistError::Serialize(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::ActionType;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn first_run_has_no_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load_state().unwrap().is_none());
        assert_eq!(store.load_stats().unwrap(), TradingStats::default());
    }

    #[test]
    fn state_roundtrip_is_identical() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = AnchorState::default();
        state.record_buy(dec!(1.11));
        store.save_state(&state).unwrap();

        let loaded = store.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);

        // save(load()) must also be stable.
        store.save_state(&loaded).unwrap();
        assert_eq!(store.load_state().unwrap().unwrap(), state);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save_state(&AnchorState::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn crash_between_saves_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut first = AnchorState::default();
        first.record_buy(dec!(1.00));
        store.save_state(&first).unwrap();

        // Simulate a crash mid-write of the second save: a partial temp
        // file exists but the rename never happened.
        let tmp = store.state_path().with_extension("json.tmp");
        fs::write(&tmp, "{\"holding\": tru").unwrap();

        let loaded = store.load_state().unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn inconsistent_state_on_disk_is_rejected() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let bad = serde_json::json!({
            "holding": true,
            "anchor_price_usd": "1.0",
            "last_action": "sell",
            "last_action_price_usd": "1.0",
        });
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.state_path(), bad.to_string()).unwrap();

        assert!(matches!(
            store.load_state(),
            Err(PersistError::InconsistentState)
        ));
    }

    #[test]
    fn stats_roundtrip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut stats = TradingStats::default();
        stats.record(crate::domain::stats::TradeRecord {
            action: ActionType::Sell,
            token_amount: dec!(500),
            native_amount: dec!(0.25),
            price_usd: dec!(1.11),
            tx_hash: "0xdeadbeef".to_string(),
            success: true,
            timestamp: chrono::Utc::now(),
        });
        store.save_stats(&stats).unwrap();

        assert_eq!(store.load_stats().unwrap(), stats);
    }

    #[test]
    fn empty_file_treated_as_first_run() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        fs::write(store.state_path(), "  \n").unwrap();
        assert!(store.load_state().unwrap().is_none());
    }
}
