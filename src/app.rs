//! Process bootstrap shared by the three binaries.

use crate::api::youtube::YouTubeHost;
use crate::compiler::Compiler;
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::prompts::{self, PromptTracker};
use crate::providers::{VideoGenerator, build_providers};
use crate::queue::AccumulationQueue;
use crate::rotation::{Account, UploadRotator};
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::studio::MediaStudio;
use crate::title::TitleGenerator;
use crate::voiceover::VoiceoverProcessor;
use crate::{init, logging};
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const USER_AGENT: &str = concat!("pet-reels/", env!("CARGO_PKG_VERSION"));

pub type PipelineScheduler = Scheduler<MediaStudio, YouTubeHost>;

/// 2 for configuration problems, 1 for anything else.
pub fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::Configuration(_) => 2,
        _ => 1,
    }
}

/// Environment, configuration, logging, directory layout and tool check, in that order.
pub async fn bootstrap(env_file: Option<&Path>, needs_upload: bool) -> Result<Config> {
    if let Err(e) = config::load_env_file(env_file) {
        logging::init_console("info");
        error!("{e}");
        return Err(e);
    }

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init_console("info");
            error!("{e}");
            return Err(e);
        }
    };

    if let Err(e) = logging::init(&cfg.log_level, &cfg.paths.logs_dir()) {
        logging::init_console(&cfg.log_level);
        warn!("file logging unavailable: {e:#}");
    }

    init::ensure_directories(&cfg.paths)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("{e:#}"))))?;

    if !init::check_ffmpeg().await {
        return Err(Error::configuration("ffmpeg and ffprobe must be installed and on PATH"));
    }

    if needs_upload {
        cfg.require_credentials()?;
    }

    info!(
        providers = %cfg.providers.order.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(","),
        accounts = cfg.upload.account_count,
        threshold_secs = cfg.compilation.threshold_secs,
        "configuration loaded"
    );
    Ok(cfg)
}

fn http_client(cfg: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .gzip(true)
        .connect_timeout(Duration::from_secs(30))
        .timeout(cfg.timeouts.upload.max(cfg.timeouts.api))
        .build()
        .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))
}

/// Wires the real providers, narration, compiler and uploader into a scheduler.
pub async fn build_scheduler(cfg: &Config) -> Result<PipelineScheduler> {
    let client = http_client(cfg)?;

    let providers = build_providers(&cfg.providers, &client, &cfg.timeouts)?;
    let generator = VideoGenerator::new(
        client.clone(),
        providers,
        cfg.paths.generated_dir(),
        cfg.providers.aspect_ratio.clone(),
        &cfg.timeouts,
    );
    let voiceover = VoiceoverProcessor::new(
        client.clone(),
        cfg.voiceover.clone(),
        &cfg.paths,
        cfg.timeouts.api,
        cfg.timeouts.ffmpeg,
    );
    let titles = TitleGenerator::new(
        client.clone(),
        cfg.compilation.openai_key.clone(),
        cfg.compilation.openai_model.clone(),
        cfg.timeouts.api,
    );
    let compiler = Compiler::new(
        cfg.paths.clone(),
        cfg.compilation.asset_policy,
        titles,
        cfg.timeouts.ffmpeg,
    );
    let studio = MediaStudio {
        generator,
        voiceover,
        compiler,
    };

    let host = YouTubeHost::new(client, cfg.upload.clone(), cfg.timeouts.api, cfg.timeouts.upload);

    let pool = prompts::build_pool(&cfg.prompts)?;
    let tracker = PromptTracker::load(
        &cfg.paths.prompt_history_file(),
        pool,
        cfg.prompts.cooldown,
        cfg.prompts.history_cap,
    )
    .await;

    let accounts = cfg
        .credential_files()
        .into_iter()
        .enumerate()
        .map(|(i, path)| Account::numbered(i + 1, path))
        .collect();
    let rotator = UploadRotator::new(
        accounts,
        cfg.upload.stagger,
        cfg.upload.max_consecutive_failures,
    );

    Ok(Scheduler::new(
        studio,
        host,
        tracker,
        AccumulationQueue::new(cfg.compilation.threshold_secs),
        rotator,
        SchedulerSettings::from_config(cfg),
    ))
}

/// Publishes `true` on the first Ctrl+C or SIGTERM.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    warn!("SIGTERM handler unavailable: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("interrupt received, finishing the current step"),
            () = terminate => info!("SIGTERM received, finishing the current step"),
        }
        let _ = tx.send(true);
    });
    rx
}
