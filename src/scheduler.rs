//! Drives generate → narrate → queue → compile → upload on a schedule.

use crate::compiler::Compilation;
use crate::config::{Config, ScheduleMode};
use crate::error::Result;
use crate::prompts::PromptTracker;
use crate::queue::{AccumulationQueue, AssetRef};
use crate::rotation::{UploadOutcome, UploadRotator, VideoHost};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Media side of the pipeline. Implemented over the real providers and
/// ffmpeg by `MediaStudio`; tests substitute fakes.
#[async_trait]
pub trait Studio: Send {
    async fn generate(&mut self, prompt: &str, duration_secs: u32) -> Result<AssetRef>;
    async fn process(&mut self, raw: &AssetRef) -> Result<AssetRef>;
    async fn compile(&mut self, assets: &[AssetRef]) -> Result<Compilation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    Processing,
    Queueing,
    Compiling,
    Uploading,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "IDLE",
            Phase::Generating => "GENERATING",
            Phase::Processing => "PROCESSING",
            Phase::Queueing => "QUEUEING",
            Phase::Compiling => "COMPILING",
            Phase::Uploading => "UPLOADING",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    FixedTime,
    SingleShot,
}

#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub mode: RunMode,
    pub phase: Phase,
    pub next_wake: Option<DateTime<Local>>,
    pub iteration: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub generated: u64,
    pub processed: u64,
    pub generation_failures: u64,
    pub processing_failures: u64,
    pub compilations: u64,
    pub compilation_failures: u64,
    pub uploads: u64,
    pub upload_failures: u64,
    pub deferrals: u64,
}

impl RunStats {
    pub fn failures(&self) -> u64 {
        self.generation_failures + self.processing_failures + self.compilation_failures + self.upload_failures
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub clip_duration_secs: u32,
    pub videos_per_run: u32,
    pub tick_interval: Duration,
    pub daily_at: NaiveTime,
    pub run_on_startup: bool,
    pub status_every: u64,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            clip_duration_secs: cfg.providers.duration_secs,
            videos_per_run: cfg.schedule.videos_per_run.max(1),
            tick_interval: cfg.schedule.tick_interval(),
            daily_at: cfg.schedule.daily_at,
            run_on_startup: cfg.schedule.run_on_startup,
            status_every: cfg.schedule.status_every.max(1),
        }
    }
}

/// Result of a single-shot run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stats: RunStats,
    pub queued_secs: f64,
    pub pending_uploads: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn exit_code(&self) -> u8 {
        if self.stats.failures() > 0 || (self.stats.compilations == 0 && !self.interrupted) {
            1
        } else {
            0
        }
    }
}

/// Next wall-clock occurrence of `at` strictly after `now`.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    // a local time skipped by a DST jump has no mapping that day; try the next
    for _ in 0..4 {
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    now.clone() + chrono::Duration::days(1)
}

pub struct Scheduler<S, H> {
    studio: S,
    host: H,
    prompts: PromptTracker,
    queue: AccumulationQueue,
    rotator: UploadRotator,
    backlog: VecDeque<Compilation>,
    state: ScheduleState,
    stats: RunStats,
    settings: SchedulerSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: Studio, H: VideoHost> Scheduler<S, H> {
    pub fn new(
        studio: S,
        host: H,
        prompts: PromptTracker,
        queue: AccumulationQueue,
        rotator: UploadRotator,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            studio,
            host,
            prompts,
            queue,
            rotator,
            backlog: VecDeque::new(),
            state: ScheduleState {
                mode: RunMode::Continuous,
                phase: Phase::Idle,
                next_wake: None,
                iteration: 0,
            },
            stats: RunStats::default(),
            settings,
            shutdown: None,
        }
    }

    /// Stop once `true` is published on `rx`.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn queue(&self) -> &AccumulationQueue {
        &self.queue
    }

    pub fn backlog(&self) -> impl Iterator<Item = &Compilation> {
        self.backlog.iter()
    }

    pub fn rotator(&self) -> &UploadRotator {
        &self.rotator
    }

    pub fn rotator_mut(&mut self) -> &mut UploadRotator {
        &mut self.rotator
    }

    pub fn prompts(&self) -> &PromptTracker {
        &self.prompts
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase != phase {
            info!(
                from = %self.state.phase,
                to = %phase,
                iteration = self.state.iteration,
                "phase transition"
            );
            self.state.phase = phase;
        }
    }

    /// Sleeps for `wait`; true when a shutdown arrived first.
    async fn sleep_or_shutdown(&mut self, wait: Duration) -> bool {
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);
        let Some(rx) = self.shutdown.as_mut() else {
            sleep.await;
            return false;
        };
        if *rx.borrow() {
            return true;
        }
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = rx.changed() => match changed {
                    Ok(()) if *rx.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }

    /// Recoverable errors become a logged skip; fatal ones propagate.
    fn absorb<T>(step: Phase, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_recoverable() => {
                warn!(phase = %step, "step failed, skipping: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Generates, narrates and queues one clip. Returns whether a clip was queued.
    pub async fn produce_clip(&mut self) -> Result<bool> {
        self.set_phase(Phase::Generating);
        let prompt = self.prompts.next_prompt()?;
        self.prompts.save().await?;
        info!("prompt: {prompt}");

        let generated = self
            .studio
            .generate(&prompt, self.settings.clip_duration_secs)
            .await;
        let Some(raw) = Self::absorb(Phase::Generating, generated)? else {
            self.stats.generation_failures += 1;
            return Ok(false);
        };
        self.stats.generated += 1;

        self.set_phase(Phase::Processing);
        let processed = self.studio.process(&raw).await;
        let Some(clip) = Self::absorb(Phase::Processing, processed)? else {
            self.stats.processing_failures += 1;
            return Ok(false);
        };
        self.stats.processed += 1;

        self.set_phase(Phase::Queueing);
        self.queue.enqueue(clip);
        info!(
            queued = self.queue.len(),
            total_secs = %format!("{:.1}", self.queue.total_duration()),
            threshold_secs = self.queue.threshold(),
            "queue at {:.0}%",
            self.queue.progress() * 100.0
        );
        Ok(true)
    }

    /// Compiles the whole queue when it is ready (or, with `force`, non-empty).
    /// A failed compile hands the batch back to the queue untouched.
    pub async fn compile_if_ready(&mut self, force: bool) -> Result<bool> {
        let due = self.queue.ready() || (force && !self.queue.is_empty());
        if !due {
            return Ok(false);
        }

        self.set_phase(Phase::Compiling);
        let (batch, total) = self.queue.drain();
        info!(clips = batch.len(), total_secs = %format!("{total:.1}"), "compiling queue");

        match self.studio.compile(&batch).await {
            Ok(compilation) => {
                self.stats.compilations += 1;
                self.backlog.push_back(compilation);
                Ok(true)
            }
            Err(e) => {
                self.queue.restore(batch);
                self.stats.compilation_failures += 1;
                Self::absorb::<()>(Phase::Compiling, Err(e))?;
                Ok(false)
            }
        }
    }

    /// Uploads backlog entries in order, stopping at the first deferral or failure.
    pub async fn flush_uploads(&mut self, force: bool) -> Result<usize> {
        if self.backlog.is_empty() {
            return Ok(0);
        }
        self.set_phase(Phase::Uploading);

        let mut done = 0;
        loop {
            if self.shutdown_requested() {
                break;
            }
            let Some(compilation) = self.backlog.front_mut() else {
                break;
            };
            let outcome = self
                .rotator
                .upload(&self.host, compilation, force, Utc::now())
                .await;
            match Self::absorb(Phase::Uploading, outcome)? {
                Some(UploadOutcome::Uploaded { .. }) => {
                    self.backlog.pop_front();
                    self.stats.uploads += 1;
                    done += 1;
                }
                Some(UploadOutcome::Deferred { .. }) => {
                    self.stats.deferrals += 1;
                    break;
                }
                None => {
                    self.stats.upload_failures += 1;
                    break;
                }
            }
        }
        if !self.backlog.is_empty() {
            info!(pending = self.backlog.len(), "uploads waiting for the next tick");
        }
        Ok(done)
    }

    /// One tick: `clips` generations, then compile and upload if due.
    pub async fn run_iteration(&mut self, clips: u32) -> Result<()> {
        self.state.iteration += 1;
        info!(iteration = self.state.iteration, "iteration start");

        for _ in 0..clips {
            if self.shutdown_requested() {
                break;
            }
            self.produce_clip().await?;
        }
        if !self.shutdown_requested() {
            self.compile_if_ready(false).await?;
        }
        self.flush_uploads(false).await?;
        self.set_phase(Phase::Idle);

        if self.state.iteration % self.settings.status_every == 0 {
            self.log_status();
        }
        Ok(())
    }

    pub fn log_status(&self) {
        let prompts = self.prompts.statistics();
        info!(
            iteration = self.state.iteration,
            generated = self.stats.generated,
            compilations = self.stats.compilations,
            uploads = self.stats.uploads,
            failures = self.stats.failures(),
            queued = self.queue.len(),
            backlog = self.backlog.len(),
            unique_prompts = prompts.unique_prompts,
            "status: queue {:.0}/{:.0}s, accounts [{}]",
            self.queue.total_duration(),
            self.queue.threshold(),
            self.rotator.summary()
        );
    }

    pub async fn run_scheduled(&mut self, mode: ScheduleMode) -> Result<()> {
        match mode {
            ScheduleMode::Continuous => self.run_continuous().await,
            ScheduleMode::FixedTime => self.run_fixed_time().await,
        }
    }

    /// One clip every tick interval until shutdown.
    pub async fn run_continuous(&mut self) -> Result<()> {
        self.state.mode = RunMode::Continuous;
        let every = self.settings.tick_interval;
        info!(interval_secs = every.as_secs(), "continuous mode");

        if self.settings.run_on_startup {
            self.run_iteration(1).await?;
        }
        loop {
            self.state.next_wake = chrono::Duration::from_std(every)
                .ok()
                .map(|d| Local::now() + d);
            if self.sleep_or_shutdown(every).await {
                break;
            }
            self.run_iteration(1).await?;
            if self.shutdown_requested() {
                break;
            }
        }
        info!("continuous mode stopped");
        self.log_status();
        Ok(())
    }

    /// `videos_per_run` clips once a day at the configured local time.
    pub async fn run_fixed_time(&mut self) -> Result<()> {
        self.state.mode = RunMode::FixedTime;
        let batch = self.settings.videos_per_run;
        if self.settings.run_on_startup {
            self.run_iteration(batch).await?;
        }
        loop {
            let now = Local::now();
            let wake = next_occurrence(&now, self.settings.daily_at);
            self.state.next_wake = Some(wake);
            info!("next run at {}", wake.format("%Y-%m-%d %H:%M"));

            let wait = (wake - now).to_std().unwrap_or(Duration::ZERO);
            if self.sleep_or_shutdown(wait).await {
                break;
            }
            self.run_iteration(batch).await?;
            if self.shutdown_requested() {
                break;
            }
        }
        info!("daily mode stopped");
        self.log_status();
        Ok(())
    }

    /// Generates `clips`, compiles whatever is queued and, if `upload`,
    /// publishes it past the stagger window.
    pub async fn run_once(&mut self, clips: u32, upload: bool) -> Result<RunSummary> {
        self.state.mode = RunMode::SingleShot;
        self.state.iteration += 1;

        for _ in 0..clips {
            if self.shutdown_requested() {
                break;
            }
            self.produce_clip().await?;
        }
        if !self.shutdown_requested() {
            self.compile_if_ready(true).await?;
        }
        if upload {
            self.flush_uploads(true).await?;
        }
        self.set_phase(Phase::Idle);
        self.log_status();

        Ok(RunSummary {
            stats: self.stats.clone(),
            queued_secs: self.queue.total_duration(),
            pending_uploads: self.backlog.len(),
            interrupted: self.shutdown_requested(),
        })
    }
}
