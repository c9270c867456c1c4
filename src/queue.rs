use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStage {
    Raw,
    Processed,
}

/// A clip on disk plus what the pipeline knows about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
    pub stage: AssetStage,
    pub prompt: String,
    /// Raw clip a processed asset was rendered from.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

impl AssetRef {
    pub fn raw(path: PathBuf, duration_secs: f64, prompt: &str) -> Self {
        Self {
            path,
            duration_secs,
            created_at: Utc::now(),
            stage: AssetStage::Raw,
            prompt: prompt.to_string(),
            source: None,
        }
    }

    /// Processed successor of `raw`, rendered to `path`.
    pub fn processed_from(raw: &AssetRef, path: PathBuf, duration_secs: f64) -> Self {
        Self {
            path,
            duration_secs,
            created_at: Utc::now(),
            stage: AssetStage::Processed,
            prompt: raw.prompt.clone(),
            source: Some(raw.path.clone()),
        }
    }
}

/// FIFO of processed clips waiting to be compiled.
///
/// The running total is only touched by `enqueue`, `drain` and `restore`, so
/// it always equals the sum of the queued durations.
#[derive(Debug, Clone)]
pub struct AccumulationQueue {
    assets: VecDeque<AssetRef>,
    total_secs: f64,
    threshold_secs: f64,
}

impl AccumulationQueue {
    pub fn new(threshold_secs: f64) -> Self {
        Self {
            assets: VecDeque::new(),
            total_secs: 0.0,
            threshold_secs,
        }
    }

    pub fn enqueue(&mut self, asset: AssetRef) {
        self.total_secs += asset.duration_secs;
        self.assets.push_back(asset);
    }

    pub fn ready(&self) -> bool {
        !self.assets.is_empty() && self.total_secs >= self.threshold_secs
    }

    /// Removes every queued asset at once. Hand the batch back with
    /// `restore` if the compile that consumes it fails.
    pub fn drain(&mut self) -> (Vec<AssetRef>, f64) {
        let total = self.total_secs;
        self.total_secs = 0.0;
        (self.assets.drain(..).collect(), total)
    }

    /// Puts a drained batch back in front of anything queued since, keeping order.
    pub fn restore(&mut self, batch: Vec<AssetRef>) {
        for asset in batch.into_iter().rev() {
            self.total_secs += asset.duration_secs;
            self.assets.push_front(asset);
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_secs
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_secs
    }

    pub fn progress(&self) -> f64 {
        (self.total_secs / self.threshold_secs).min(1.0)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetRef> {
        self.assets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, secs: f64) -> AssetRef {
        let raw = AssetRef::raw(PathBuf::from(format!("generated/{name}")), secs, "a corgi");
        AssetRef::processed_from(&raw, PathBuf::from(format!("processed/{name}")), secs)
    }

    #[test]
    fn total_tracks_sum_of_enqueued() {
        let mut q = AccumulationQueue::new(10_000.0);
        let durations = [30.0, 12.5, 7.25, 60.0, 0.5, 44.0];
        let mut expected = 0.0;
        for (i, d) in durations.iter().enumerate() {
            q.enqueue(clip(&format!("{i}.mp4"), *d));
            expected += d;
            assert_eq!(q.total_duration(), expected);
            let summed: f64 = q.assets().map(|a| a.duration_secs).sum();
            assert_eq!(q.total_duration(), summed);
        }
    }

    #[test]
    fn ready_after_crossing_threshold_and_drains_in_order() {
        let mut q = AccumulationQueue::new(600.0);
        q.enqueue(clip("a.mp4", 250.0));
        assert!(!q.ready());
        q.enqueue(clip("b.mp4", 200.0));
        assert!(!q.ready());
        q.enqueue(clip("c.mp4", 200.0));
        assert!(q.ready());

        let (batch, total) = q.drain();
        assert_eq!(total, 650.0);
        let names: Vec<_> = batch.iter().map(|a| a.path.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("processed/a.mp4"),
                PathBuf::from("processed/b.mp4"),
                PathBuf::from("processed/c.mp4"),
            ]
        );
        assert!(q.is_empty());
        assert_eq!(q.total_duration(), 0.0);
        assert!(!q.ready());
    }

    #[test]
    fn restore_after_failed_compile_is_identical() {
        let mut q = AccumulationQueue::new(60.0);
        q.enqueue(clip("a.mp4", 30.0));
        q.enqueue(clip("b.mp4", 45.0));
        let before: Vec<_> = q.assets().cloned().collect();
        let total_before = q.total_duration();

        let (batch, _) = q.drain();
        q.restore(batch);

        let after: Vec<_> = q.assets().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(q.total_duration(), total_before);
        assert!(q.ready());
    }

    #[test]
    fn restore_goes_ahead_of_newer_clips() {
        let mut q = AccumulationQueue::new(60.0);
        q.enqueue(clip("a.mp4", 30.0));
        q.enqueue(clip("b.mp4", 30.0));
        let (batch, _) = q.drain();
        q.enqueue(clip("c.mp4", 30.0));
        q.restore(batch);

        let names: Vec<_> = q.assets().map(|a| a.path.display().to_string()).collect();
        assert_eq!(names, ["processed/a.mp4", "processed/b.mp4", "processed/c.mp4"]);
        assert_eq!(q.total_duration(), 90.0);
    }

    #[test]
    fn burst_overshoot_is_compiled_whole() {
        let mut q = AccumulationQueue::new(60.0);
        for i in 0..40 {
            q.enqueue(clip(&format!("{i}.mp4"), 10.0));
        }
        let (batch, total) = q.drain();
        assert_eq!(batch.len(), 40);
        assert_eq!(total, 400.0);
    }

    #[test]
    fn processed_asset_remembers_its_source() {
        let a = clip("x.mp4", 5.0);
        assert_eq!(a.stage, AssetStage::Processed);
        assert_eq!(a.source, Some(PathBuf::from("generated/x.mp4")));
        assert_eq!(a.prompt, "a corgi");
    }
}
