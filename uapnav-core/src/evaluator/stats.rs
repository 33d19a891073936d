//! Per-episode statistics.
use crate::record::{Record, RecordValue};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Statistics of finished episodes: reward plus the terminal metrics the
/// environment emitted (success, SPL, distance to goal, ...).
#[derive(Debug, Default, Clone)]
pub struct EpisodeStats {
    episodes: Vec<BTreeMap<String, f32>>,
}

impl EpisodeStats {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded episodes.
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Returns `true` when no episode has been recorded.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Appends one episode's statistics.
    pub fn push(&mut self, stats: BTreeMap<String, f32>) {
        self.episodes.push(stats);
    }

    /// Statistics of episode `ix`.
    pub fn get(&self, ix: usize) -> Option<&BTreeMap<String, f32>> {
        self.episodes.get(ix)
    }

    /// Mean of `key` over the episodes that emitted it.
    pub fn mean(&self, key: &str) -> Option<f32> {
        let values: Vec<f32> = self
            .episodes
            .iter()
            .filter_map(|e| e.get(key).copied())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f32>() / values.len() as f32)
        }
    }

    /// Aggregates the per-episode statistics into a record of means.
    pub fn aggregate(&self) -> Record {
        let keys: BTreeSet<&String> = self.episodes.iter().flat_map(|e| e.keys()).collect();
        let mut record = Record::empty();
        for k in keys {
            if let Some(m) = self.mean(k) {
                record.insert(k.clone(), RecordValue::Scalar(m));
            }
        }
        record
    }

    /// Writes the statistics to a CSV file, one row per episode.
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)?;
        }
        let keys: Vec<String> = self
            .episodes
            .iter()
            .flat_map(|e| e.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec!["episode".to_string()];
        header.extend(keys.iter().cloned());
        wtr.write_record(&header)?;
        for (ix, e) in self.episodes.iter().enumerate() {
            let mut row = vec![ix.to_string()];
            for k in &keys {
                row.push(e.get(k).map(|v| v.to_string()).unwrap_or_default());
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Tracks running episode rewards per environment slot and assembles
/// [`EpisodeStats`] as episodes finish.
pub struct EpisodeTracker {
    rewards: Vec<f32>,
    stats: EpisodeStats,
}

impl EpisodeTracker {
    /// Creates a tracker for `num_envs` slots.
    pub fn new(num_envs: usize) -> Self {
        Self {
            rewards: vec![0.0; num_envs],
            stats: EpisodeStats::new(),
        }
    }

    /// Accumulates one step of rewards.
    pub fn observe(&mut self, reward: &[f32]) {
        for (acc, r) in self.rewards.iter_mut().zip(reward) {
            *acc += r;
        }
    }

    /// Closes the episode in slot `ix`: records its accumulated reward plus
    /// the given terminal metrics and clears the slot.
    pub fn finish_episode(
        &mut self,
        ix: usize,
        metrics: Vec<(String, f32)>,
    ) -> &BTreeMap<String, f32> {
        let mut entry: BTreeMap<String, f32> = metrics.into_iter().collect();
        entry.insert("reward".to_string(), self.rewards[ix]);
        self.rewards[ix] = 0.0;
        self.stats.push(entry);
        self.stats.get(self.stats.len() - 1).unwrap()
    }

    /// The statistics collected so far.
    pub fn stats(&self) -> &EpisodeStats {
        &self.stats
    }

    /// Consumes the tracker, returning the collected statistics.
    pub fn into_stats(self) -> EpisodeStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn tracker_accumulates_and_resets_rewards() {
        let mut tracker = EpisodeTracker::new(2);
        tracker.observe(&[1.0, 2.0]);
        tracker.observe(&[0.5, 0.0]);
        let entry = tracker.finish_episode(0, vec![("success".to_string(), 1.0)]);
        assert_eq!(entry["reward"], 1.5);
        assert_eq!(entry["success"], 1.0);

        // Slot 0 restarts from zero; slot 1 keeps accumulating.
        tracker.observe(&[1.0, 1.0]);
        let entry = tracker.finish_episode(1, vec![]);
        assert_eq!(entry["reward"], 3.0);
    }

    #[test]
    fn aggregate_means_over_episodes() {
        let mut stats = EpisodeStats::new();
        stats.push(BTreeMap::from([
            ("reward".to_string(), 1.0),
            ("success".to_string(), 1.0),
        ]));
        stats.push(BTreeMap::from([
            ("reward".to_string(), 3.0),
            ("success".to_string(), 0.0),
        ]));
        let record = stats.aggregate();
        assert_eq!(record.get_scalar("reward").unwrap(), 2.0);
        assert_eq!(record.get_scalar("success").unwrap(), 0.5);
    }

    #[test]
    fn csv_dump_has_one_row_per_episode() -> Result<()> {
        let dir = TempDir::new("episode_stats")?;
        let path = dir.path().join("stats_episodes.csv");
        let mut stats = EpisodeStats::new();
        stats.push(BTreeMap::from([("reward".to_string(), 1.0)]));
        stats.push(BTreeMap::from([("reward".to_string(), 2.0)]));
        stats.to_csv(&path)?;
        let body = std::fs::read_to_string(&path)?;
        assert_eq!(body.lines().count(), 3);
        Ok(())
    }
}
