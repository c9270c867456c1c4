use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Anything smaller is treated as a failed or truncated render.
pub const MIN_OUTPUT_BYTES: u64 = 1024;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const STDERR_SNIPPET: usize = 600;
const CAPTION_FONT_SIZE: u32 = 40;
const TITLE_CARD_FONT_SIZE: u32 = 60;
const TITLE_CARD_LINE_CHARS: usize = 30;

async fn run_cmd(args: &[String], limit: Duration) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    cmd.kill_on_drop(true);
    debug!(command = %args.join(" "), "running");

    let output = tokio::time::timeout(limit, cmd.output())
        .await
        .with_context(|| format!("{} timed out after {}s", args[0], limit.as_secs()))?
        .with_context(|| format!("{} execution failed", args[0]))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet = stderr.trim().chars().take(STDERR_SNIPPET).collect::<String>();
        return Err(anyhow::anyhow!(
            "{} exited with {}: {}",
            args[0],
            output.status,
            snippet
        ));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path)
    .kill_on_drop(true);

    let output = tokio::time::timeout(PROBE_TIMEOUT, cmd.output())
        .await
        .context("ffprobe timed out")?
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// Output must exist and be at least `MIN_OUTPUT_BYTES`.
pub async fn validate_output(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("output missing: {}", path.display()))?;
    if !meta.is_file() || meta.len() < MIN_OUTPUT_BYTES {
        return Err(anyhow::anyhow!(
            "output too small ({} bytes): {}",
            meta.len(),
            path.display()
        ));
    }
    Ok(meta.len())
}

/// Inputs for the narration/music mux of a single clip.
#[derive(Debug, Clone)]
pub struct MuxPlan {
    pub video: PathBuf,
    pub narration: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub voice_volume: f64,
    pub music_volume: f64,
    pub duration_secs: f64,
    pub vertical: bool,
    pub caption: Option<String>,
    pub output: PathBuf,
}

impl MuxPlan {
    /// Every clip leaves with identical stream layout (H.264 30fps, stereo AAC)
    /// so the compilation concat never sees a codec mismatch.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(self.video.display().to_string());

        let mut next_input = 1;
        let mut voice_input = None;
        let mut music_input = None;

        if let Some(narration) = &self.narration {
            args.push("-i".to_string());
            args.push(narration.display().to_string());
            voice_input = Some(next_input);
            next_input += 1;
        }
        if let Some(music) = &self.music {
            args.extend(["-stream_loop", "-1", "-i"].iter().map(|s| s.to_string()));
            args.push(music.display().to_string());
            music_input = Some(next_input);
            next_input += 1;
        }

        let audio_filter = match (voice_input, music_input) {
            (Some(v), Some(m)) => format!(
                "[{v}:a]volume={:.2},apad[voice];[{m}:a]volume={:.2}[music];[voice][music]amix=inputs=2:duration=longest:dropout_transition=2[a]",
                self.voice_volume, self.music_volume
            ),
            (Some(v), None) => format!("[{v}:a]volume={:.2},apad[a]", self.voice_volume),
            (None, Some(m)) => format!("[{m}:a]volume={:.2}[a]", self.music_volume),
            (None, None) => {
                args.extend(
                    ["-f", "lavfi", "-i", "anullsrc=channel_layout=stereo:sample_rate=44100"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                format!("[{next_input}:a]anull[a]")
            }
        };

        let mut video_filter = if self.vertical {
            "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setsar=1,fps=30".to_string()
        } else {
            "[0:v]fps=30".to_string()
        };
        if let Some(caption) = self.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            video_filter.push(',');
            video_filter.push_str(&drawtext(
                caption,
                CAPTION_FONT_SIZE,
                "y=h-text_h-60:fontcolor=white@0.8:box=1:boxcolor=black@0.35:boxborderw=12",
            ));
        }
        video_filter.push_str(",format=yuv420p[v]");

        args.push("-filter_complex".to_string());
        args.push(format!("{video_filter};{audio_filter}"));
        args.extend(
            [
                "-map", "[v]", "-map", "[a]", "-c:v", "libx264", "-preset", "veryfast", "-crf", "22",
                "-c:a", "aac", "-b:a", "192k", "-ar", "44100", "-ac", "2", "-t",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(format!("{:.3}", self.duration_secs));
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
        args.push(self.output.display().to_string());
        args
    }
}

pub async fn ffmpeg_mux(plan: &MuxPlan, limit: Duration) -> Result<()> {
    run_cmd(&plan.to_args(), limit).await
}

/// Quotes `text` for a `text='...'` drawtext option inside a filtergraph.
fn drawtext_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            '\'' => out.push('\u{2019}'),
            _ => out.push(c),
        }
    }
    out
}

/// Horizontally centred drawtext stage; `style` carries placement and colours.
fn drawtext(text: &str, font_size: u32, style: &str) -> String {
    format!(
        "drawtext=text='{}':expansion=none:fontsize={font_size}:x=(w-text_w)/2:{style}",
        drawtext_escape(text)
    )
}

/// Greedy word wrap; words longer than `width` get a line of their own.
fn wrap_words(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

/// Concat demuxer list; single quotes inside paths are escaped the way ffmpeg expects.
pub fn concat_list_contents(clips: &[PathBuf]) -> String {
    let mut out = String::new();
    for clip in clips {
        let escaped = clip.display().to_string().replace('\'', r"'\''");
        out.push_str(&format!("file '{}'\n", escaped));
    }
    out
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path, limit: Duration) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args, limit).await
}

/// Single frame at `at_secs`, letterboxed to 1280x720.
pub async fn ffmpeg_extract_frame(input: &Path, at_secs: f64, out_jpg: &Path, limit: Duration) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", at_secs.max(0.0)),
        "-i".to_string(),
        input.display().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        "scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2:black".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        out_jpg.display().to_string(),
    ];
    run_cmd(&args, limit).await
}

/// Arguments for a 1280x720 black card with the wrapped title centred on it.
/// Emoji and other symbols are dropped since the default font lacks them.
pub fn title_card_args(title: &str, out_jpg: &Path) -> Vec<String> {
    let plain: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_ascii_punctuation() || c.is_whitespace())
        .collect();
    let text = wrap_words(plain.trim(), TITLE_CARD_LINE_CHARS);
    let filter = drawtext(
        &text,
        TITLE_CARD_FONT_SIZE,
        "y=(h-text_h)/2:fontcolor=white:line_spacing=12:box=1:boxcolor=black@0.5:boxborderw=20",
    );

    let mut args: Vec<String> = [
        "ffmpeg", "-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i",
        "color=c=black:s=1280x720", "-frames:v", "1", "-vf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(filter);
    args.extend(["-q:v", "2"].iter().map(|s| s.to_string()));
    args.push(out_jpg.display().to_string());
    args
}

pub async fn ffmpeg_title_card(title: &str, out_jpg: &Path, limit: Duration) -> Result<()> {
    run_cmd(&title_card_args(title, out_jpg), limit).await
}
