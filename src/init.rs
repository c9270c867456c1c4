use crate::config::Paths;
use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

pub async fn ensure_directories(paths: &Paths) -> Result<()> {
    for dir in paths.all_dirs() {
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

async fn tool_available(tool: &str) -> bool {
    match tokio::process::Command::new(tool)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn check_ffmpeg() -> bool {
    tool_available("ffmpeg").await && tool_available("ffprobe").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn creates_the_whole_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths {
            output_dir: tmp.path().join("outputs"),
            data_dir: tmp.path().join("data"),
            assets_dir: tmp.path().join("assets"),
            credentials_dir: tmp.path().join("credentials"),
        };

        ensure_directories(&paths).await.unwrap();
        ensure_directories(&paths).await.unwrap();

        for dir in paths.all_dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        assert!(paths.archive_dir().starts_with(PathBuf::from(&paths.output_dir)));
    }
}
