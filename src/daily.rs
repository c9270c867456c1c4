use clap::Parser;
use pet_reels::app;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pet-reels-daily")]
#[command(about = "Generate a batch of clips every day at SCHEDULE_TIME", long_about = None)]
struct Args {
    /// Read settings from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let scheduler = match app::bootstrap(args.env_file.as_deref(), true).await {
        Ok(cfg) => app::build_scheduler(&cfg).await,
        Err(e) => Err(e),
    };
    let mut scheduler = match scheduler {
        Ok(s) => s.with_shutdown(app::shutdown_signal()),
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::from(app::exit_code_for(&e));
        }
    };

    match scheduler.run_fixed_time().await {
        Ok(()) => {
            info!("stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("scheduler stopped: {e}");
            ExitCode::from(app::exit_code_for(&e))
        }
    }
}
