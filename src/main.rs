use clap::Parser;
use pet_reels::app;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pet-reels")]
#[command(about = "Generate pet clips, compile them and upload the reel once", long_about = None)]
struct Args {
    /// Read settings from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Number of clips to generate (defaults to VIDEOS_PER_RUN)
    #[arg(short = 'n', long)]
    videos: Option<u32>,

    /// Compile but leave the reel on disk
    #[arg(long)]
    no_upload: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match app::bootstrap(args.env_file.as_deref(), !args.no_upload).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::from(app::exit_code_for(&e));
        }
    };

    let scheduler = match app::build_scheduler(&cfg).await {
        Ok(s) => s,
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::from(app::exit_code_for(&e));
        }
    };
    let mut scheduler = scheduler.with_shutdown(app::shutdown_signal());

    let clips = args.videos.unwrap_or(cfg.schedule.videos_per_run).max(1);
    match scheduler.run_once(clips, !args.no_upload).await {
        Ok(summary) => {
            info!(
                generated = summary.stats.generated,
                compilations = summary.stats.compilations,
                uploads = summary.stats.uploads,
                failures = summary.stats.failures(),
                pending_uploads = summary.pending_uploads,
                "run finished, {:.1}s left in queue",
                summary.queued_secs
            );
            for c in scheduler.backlog() {
                info!("not uploaded: \"{}\" {}", c.title, c.output.display());
            }
            ExitCode::from(summary.exit_code())
        }
        Err(e) => {
            error!("run aborted: {e}");
            ExitCode::from(app::exit_code_for(&e))
        }
    }
}
