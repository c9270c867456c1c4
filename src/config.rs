use crate::error::{Error, Result};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FAL_ENDPOINT: &str = "https://api.fal.ai/v1/text-to-video";
const DEFAULT_RUNWAY_BASE_URL: &str = "https://api.runwayml.com";
const DEFAULT_NARRATION_TEMPLATE: &str = "{prompt}. Enjoy this cute moment!";
const DEFAULT_CAPTION: &str = "AI Generated";
const DEFAULT_TAGS: &str = "dogs,cats,AI,pets,funny,cute,animals,shorts,AI-generated";

/// API key or token. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Fal,
    Runway,
    Replicate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Fal => "fal",
            ProviderKind::Runway => "runway",
            ProviderKind::Replicate => "replicate",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fal" => Ok(ProviderKind::Fal),
            "runway" => Ok(ProviderKind::Runway),
            "replicate" => Ok(ProviderKind::Replicate),
            "local" => Err(Error::configuration(
                "VIDEO_PROVIDERS: local generation is not supported",
            )),
            other => Err(Error::configuration(format!(
                "VIDEO_PROVIDERS: unknown provider '{other}' (expected fal, runway or replicate)"
            ))),
        }
    }
}

/// What happens to constituent clips once a compilation has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    Delete,
    Archive,
    Keep,
}

impl FromStr for AssetPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(AssetPolicy::Delete),
            "archive" => Ok(AssetPolicy::Archive),
            "keep" => Ok(AssetPolicy::Keep),
            other => Err(Error::configuration(format!(
                "ASSET_POLICY: expected delete, archive or keep, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Continuous,
    FixedTime,
}

impl FromStr for ScheduleMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(ScheduleMode::Continuous),
            "fixed" | "fixed-time" | "daily" => Ok(ScheduleMode::FixedTime),
            other => Err(Error::configuration(format!(
                "SCHEDULE_MODE: expected continuous or fixed, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Builtin,
    File(PathBuf),
    Trends,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub order: Vec<ProviderKind>,
    pub fal_key: Option<Secret>,
    pub fal_endpoint: String,
    pub runway_key: Option<Secret>,
    pub runway_base_url: String,
    pub replicate_key: Option<Secret>,
    pub replicate_version: Option<String>,
    pub duration_secs: u32,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone)]
pub struct VoiceoverConfig {
    pub enabled: bool,
    pub elevenlabs_key: Option<Secret>,
    pub voice_id: String,
    pub model_id: String,
    pub narration_template: String,
    pub add_music: bool,
    pub music_volume: f64,
    pub voice_volume: f64,
    pub vertical: bool,
    /// Text burned into the bottom of every processed clip, if any.
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompilationConfig {
    pub threshold_secs: f64,
    pub asset_policy: AssetPolicy,
    pub openai_key: Option<Secret>,
    pub openai_model: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub account_count: usize,
    pub stagger: Duration,
    pub max_consecutive_failures: u32,
    pub privacy_status: String,
    pub tags: Vec<String>,
    pub category_id: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    pub daily_at: NaiveTime,
    pub videos_per_run: u32,
    pub daily_video_count: u32,
    pub run_on_startup: bool,
    pub status_every: u64,
}

impl ScheduleConfig {
    /// Continuous-mode generation tick, spread evenly over a day.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(86_400.0 / f64::from(self.daily_video_count.max(1)))
    }
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub cooldown: usize,
    pub history_cap: usize,
    pub source: PromptSource,
    pub trend_pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub credentials_dir: PathBuf,
}

impl Paths {
    pub fn generated_dir(&self) -> PathBuf {
        self.output_dir.join("generated")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.processed_dir().join("archive")
    }

    pub fn compilations_dir(&self) -> PathBuf {
        self.output_dir.join("compilations")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.output_dir.join("thumbnails")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    pub fn voiceover_dir(&self) -> PathBuf {
        self.assets_dir.join("voiceovers")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.assets_dir.join("music")
    }

    pub fn prompt_history_file(&self) -> PathBuf {
        self.data_dir.join("prompt_history.json")
    }

    /// OAuth client file for account `n` (1-based).
    pub fn credential_file(&self, n: usize) -> PathBuf {
        self.credentials_dir.join(format!("youtube_creds_{n}.json"))
    }

    pub fn all_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.generated_dir(),
            self.processed_dir(),
            self.archive_dir(),
            self.compilations_dir(),
            self.thumbnails_dir(),
            self.logs_dir(),
            self.voiceover_dir(),
            self.music_dir(),
            self.data_dir.clone(),
            self.credentials_dir.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub api: Duration,
    pub provider_max_wait: Duration,
    pub provider_poll: Duration,
    pub upload: Duration,
    pub ffmpeg: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProviderConfig,
    pub voiceover: VoiceoverConfig,
    pub compilation: CompilationConfig,
    pub upload: UploadConfig,
    pub schedule: ScheduleConfig,
    pub prompts: PromptConfig,
    pub paths: Paths,
    pub timeouts: Timeouts,
    pub log_level: String,
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn secret(&self, key: &str) -> Option<Secret> {
        self.get(key).map(Secret::new)
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| Error::configuration(format!("{key}: invalid value '{raw}'"))),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::configuration(format!("{key}: expected true/false, got '{raw}'"))),
            },
        }
    }

    fn secs_or(&self, key: &str, default: u64) -> Result<Duration> {
        let secs: u64 = self.parse_or(key, default)?;
        if secs == 0 {
            return Err(Error::configuration(format!("{key} must be greater than zero")));
        }
        Ok(Duration::from_secs(secs))
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy` beforehand to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let providers = parse_providers(&vars)?;
        let voiceover = parse_voiceover(&vars)?;
        let compilation = parse_compilation(&vars)?;
        let upload = parse_upload(&vars)?;
        let schedule = parse_schedule(&vars)?;
        let prompts = parse_prompts(&vars)?;

        let paths = Paths {
            output_dir: PathBuf::from(vars.string_or("OUTPUT_DIR", "outputs")),
            data_dir: PathBuf::from(vars.string_or("DATA_DIR", "data")),
            assets_dir: PathBuf::from(vars.string_or("ASSETS_DIR", "assets")),
            credentials_dir: PathBuf::from(vars.string_or("CREDENTIALS_DIR", "credentials")),
        };

        let timeouts = Timeouts {
            api: vars.secs_or("API_TIMEOUT_SECONDS", 300)?,
            provider_max_wait: vars.secs_or("PROVIDER_MAX_WAIT_SECONDS", 600)?,
            provider_poll: vars.secs_or("PROVIDER_POLL_SECONDS", 10)?,
            upload: vars.secs_or("UPLOAD_TIMEOUT_SECONDS", 1800)?,
            ffmpeg: vars.secs_or("FFMPEG_TIMEOUT_SECONDS", 900)?,
        };

        Ok(Config {
            providers,
            voiceover,
            compilation,
            upload,
            schedule,
            prompts,
            paths,
            timeouts,
            log_level: vars.string_or("LOG_LEVEL", "info").to_ascii_lowercase(),
        })
    }

    /// Credential file paths for every configured account, in rotation order.
    pub fn credential_files(&self) -> Vec<PathBuf> {
        (1..=self.upload.account_count)
            .map(|n| self.paths.credential_file(n))
            .collect()
    }

    pub fn require_credentials(&self) -> Result<()> {
        let missing: Vec<String> = self
            .credential_files()
            .into_iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::configuration(format!(
                "missing account credential files: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

fn parse_providers(vars: &Vars<'_>) -> Result<ProviderConfig> {
    let raw_order = vars
        .get("VIDEO_PROVIDERS")
        .or_else(|| vars.get("VIDEO_GENERATOR"))
        .unwrap_or_else(|| "fal".to_string());

    let mut order = Vec::new();
    for name in raw_order.split(',').filter(|s| !s.trim().is_empty()) {
        let kind: ProviderKind = name.parse()?;
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    if order.is_empty() {
        return Err(Error::configuration("VIDEO_PROVIDERS is empty"));
    }

    let cfg = ProviderConfig {
        fal_key: vars.secret("FAL_API_KEY"),
        fal_endpoint: vars.string_or("FAL_ENDPOINT", DEFAULT_FAL_ENDPOINT),
        runway_key: vars.secret("RUNWAY_API_KEY"),
        runway_base_url: vars.string_or("RUNWAY_BASE_URL", DEFAULT_RUNWAY_BASE_URL),
        replicate_key: vars.secret("REPLICATE_API_KEY"),
        replicate_version: vars.get("REPLICATE_MODEL_VERSION"),
        duration_secs: vars.parse_or("VIDEO_DURATION", 30)?,
        aspect_ratio: vars.string_or("ASPECT_RATIO", "9:16"),
        order,
    };

    for kind in &cfg.order {
        let (key, present) = match kind {
            ProviderKind::Fal => ("FAL_API_KEY", cfg.fal_key.is_some()),
            ProviderKind::Runway => ("RUNWAY_API_KEY", cfg.runway_key.is_some()),
            ProviderKind::Replicate => ("REPLICATE_API_KEY", cfg.replicate_key.is_some()),
        };
        if !present {
            return Err(Error::configuration(format!(
                "{key} missing (required by provider '{}')",
                kind.as_str()
            )));
        }
    }
    if cfg.order.contains(&ProviderKind::Replicate) && cfg.replicate_version.is_none() {
        return Err(Error::configuration(
            "REPLICATE_MODEL_VERSION missing (required by provider 'replicate')",
        ));
    }
    if cfg.duration_secs == 0 {
        return Err(Error::configuration("VIDEO_DURATION must be greater than zero"));
    }

    Ok(cfg)
}

fn parse_voiceover(vars: &Vars<'_>) -> Result<VoiceoverConfig> {
    let cfg = VoiceoverConfig {
        enabled: vars.bool_or("ADD_VOICEOVER", true)?,
        elevenlabs_key: vars.secret("ELEVENLABS_API_KEY"),
        voice_id: vars.string_or("ELEVEN_VOICE_ID", "JBFqnCBsd6RMkjVDRZzb"),
        model_id: vars.string_or("ELEVEN_MODEL_ID", "eleven_multilingual_v2"),
        narration_template: vars.string_or("NARRATION_TEMPLATE", DEFAULT_NARRATION_TEMPLATE),
        add_music: vars.bool_or("ADD_MUSIC", true)?,
        music_volume: vars.parse_or("MUSIC_VOLUME", 0.3)?,
        voice_volume: vars.parse_or("VOICEOVER_VOLUME", 1.0)?,
        vertical: vars.bool_or("FORMAT_VERTICAL", true)?,
        caption: if vars.bool_or("ADD_CAPTIONS", true)? {
            Some(vars.string_or("CAPTION_TEXT", DEFAULT_CAPTION))
                .filter(|text| !text.trim().is_empty())
        } else {
            None
        },
    };

    if cfg.enabled && cfg.elevenlabs_key.is_none() {
        return Err(Error::configuration(
            "ELEVENLABS_API_KEY missing (required when ADD_VOICEOVER is on)",
        ));
    }
    if !(0.0..=10.0).contains(&cfg.music_volume) || !(0.0..=10.0).contains(&cfg.voice_volume) {
        return Err(Error::configuration("MUSIC_VOLUME/VOICEOVER_VOLUME must be within 0..10"));
    }
    Ok(cfg)
}

fn parse_compilation(vars: &Vars<'_>) -> Result<CompilationConfig> {
    let threshold_secs = match vars.get("ACCUMULATION_THRESHOLD_SECONDS") {
        Some(_) => vars.parse_or("ACCUMULATION_THRESHOLD_SECONDS", 600.0)?,
        None => vars.parse_or::<f64>("TARGET_VIDEO_LENGTH_MINUTES", 10.0)? * 60.0,
    };
    if !(threshold_secs > 0.0) {
        return Err(Error::configuration("accumulation threshold must be greater than zero"));
    }

    Ok(CompilationConfig {
        threshold_secs,
        asset_policy: vars.string_or("ASSET_POLICY", "delete").parse()?,
        openai_key: vars.secret("OPENAI_API_KEY"),
        openai_model: vars.string_or("OPENAI_MODEL", "gpt-4o-mini"),
    })
}

fn parse_upload(vars: &Vars<'_>) -> Result<UploadConfig> {
    let account_count: usize = vars.parse_or("ACCOUNT_COUNT", 5)?;
    if account_count == 0 {
        return Err(Error::configuration("ACCOUNT_COUNT must be at least 1"));
    }
    let max_consecutive_failures: u32 = vars.parse_or("MAX_CONSECUTIVE_UPLOAD_FAILURES", 3)?;
    if max_consecutive_failures == 0 {
        return Err(Error::configuration("MAX_CONSECUTIVE_UPLOAD_FAILURES must be at least 1"));
    }

    let privacy_status = vars.string_or("PRIVACY_STATUS", "public").to_ascii_lowercase();
    if !matches!(privacy_status.as_str(), "public" | "unlisted" | "private") {
        return Err(Error::configuration(format!(
            "PRIVACY_STATUS: expected public, unlisted or private, got '{privacy_status}'"
        )));
    }

    let tags = vars
        .string_or("VIDEO_TAGS", DEFAULT_TAGS)
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(UploadConfig {
        account_count,
        stagger: Duration::from_secs(vars.parse_or("UPLOAD_STAGGER_DELAY", 900)?),
        max_consecutive_failures,
        privacy_status,
        tags,
        category_id: vars.string_or("VIDEO_CATEGORY_ID", "15"),
    })
}

fn parse_schedule(vars: &Vars<'_>) -> Result<ScheduleConfig> {
    let raw_time = vars.string_or("SCHEDULE_TIME", "09:00");
    let daily_at = NaiveTime::parse_from_str(&raw_time, "%H:%M").map_err(|_| {
        Error::configuration(format!("SCHEDULE_TIME: expected HH:MM, got '{raw_time}'"))
    })?;

    let cfg = ScheduleConfig {
        mode: vars.string_or("SCHEDULE_MODE", "continuous").parse()?,
        daily_at,
        videos_per_run: vars.parse_or("VIDEOS_PER_RUN", 1)?,
        daily_video_count: vars.parse_or("DAILY_VIDEO_COUNT", 96)?,
        run_on_startup: vars.bool_or("RUN_ON_STARTUP", true)?,
        status_every: vars.parse_or("STATUS_EVERY_ITERATIONS", 2)?,
    };
    if cfg.videos_per_run == 0 {
        return Err(Error::configuration("VIDEOS_PER_RUN must be at least 1"));
    }
    if cfg.daily_video_count == 0 {
        return Err(Error::configuration("DAILY_VIDEO_COUNT must be at least 1"));
    }
    Ok(cfg)
}

fn parse_prompts(vars: &Vars<'_>) -> Result<PromptConfig> {
    let file = vars.get("PROMPTS_FILE").map(PathBuf::from);
    let default_source = if file.is_some() { "file" } else { "builtin" };
    let source = match vars.string_or("PROMPT_SOURCE", default_source).to_ascii_lowercase().as_str() {
        "builtin" => PromptSource::Builtin,
        "trends" => PromptSource::Trends,
        "file" => match file {
            Some(path) => PromptSource::File(path),
            None => return Err(Error::configuration("PROMPT_SOURCE=file requires PROMPTS_FILE")),
        },
        other => {
            return Err(Error::configuration(format!(
                "PROMPT_SOURCE: expected builtin, file or trends, got '{other}'"
            )));
        }
    };

    let cfg = PromptConfig {
        cooldown: vars.parse_or("PROMPT_COOLDOWN", 5)?,
        history_cap: vars.parse_or("PROMPT_HISTORY_CAP", 500)?,
        source,
        trend_pool_size: vars.parse_or("TREND_POOL_SIZE", 60)?,
    };
    if cfg.history_cap == 0 {
        return Err(Error::configuration("PROMPT_HISTORY_CAP must be at least 1"));
    }
    Ok(cfg)
}

/// Loads `KEY=VALUE` pairs from `path` (or `.env` in the working directory) into the environment.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => dotenvy::from_path(p)
            .map(|_| ())
            .map_err(|e| Error::configuration(format!("failed to read {}: {e}", p.display()))),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> HashMap<String, String> {
        vars(&[("FAL_API_KEY", "fal-key"), ("ELEVENLABS_API_KEY", "el-key")])
    }

    #[test]
    fn defaults_follow_documented_values() {
        let cfg = Config::from_map(&minimal()).unwrap();
        assert_eq!(cfg.providers.order, vec![ProviderKind::Fal]);
        assert_eq!(cfg.providers.duration_secs, 30);
        assert_eq!(cfg.compilation.threshold_secs, 600.0);
        assert_eq!(cfg.compilation.asset_policy, AssetPolicy::Delete);
        assert_eq!(cfg.upload.account_count, 5);
        assert_eq!(cfg.upload.stagger, Duration::from_secs(900));
        assert_eq!(cfg.upload.max_consecutive_failures, 3);
        assert_eq!(cfg.schedule.mode, ScheduleMode::Continuous);
        assert_eq!(cfg.schedule.daily_at, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(cfg.schedule.tick_interval(), Duration::from_secs(900));
        assert_eq!(cfg.prompts.source, PromptSource::Builtin);
        assert_eq!(cfg.paths.credential_file(2), PathBuf::from("credentials/youtube_creds_2.json"));
    }

    #[test]
    fn provider_order_is_kept_and_deduplicated() {
        let mut v = minimal();
        v.insert("VIDEO_PROVIDERS".into(), "runway, fal,runway".into());
        v.insert("RUNWAY_API_KEY".into(), "rw".into());
        let cfg = Config::from_map(&v).unwrap();
        assert_eq!(cfg.providers.order, vec![ProviderKind::Runway, ProviderKind::Fal]);
    }

    #[test]
    fn missing_provider_key_fails_fast() {
        let v = vars(&[("VIDEO_PROVIDERS", "replicate"), ("ELEVENLABS_API_KEY", "x")]);
        let err = Config::from_map(&v).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("REPLICATE_API_KEY")));
    }

    #[test]
    fn replicate_needs_model_version() {
        let v = vars(&[
            ("VIDEO_PROVIDERS", "replicate"),
            ("REPLICATE_API_KEY", "r"),
            ("ELEVENLABS_API_KEY", "x"),
        ]);
        let err = Config::from_map(&v).unwrap_err();
        assert!(err.to_string().contains("REPLICATE_MODEL_VERSION"));
    }

    #[test]
    fn local_provider_is_rejected() {
        let mut v = minimal();
        v.insert("VIDEO_GENERATOR".into(), "local".into());
        assert!(Config::from_map(&v).is_err());
    }

    #[test]
    fn voiceover_key_only_required_when_enabled() {
        let v = vars(&[("FAL_API_KEY", "k")]);
        assert!(Config::from_map(&v).is_err());

        let v = vars(&[("FAL_API_KEY", "k"), ("ADD_VOICEOVER", "false")]);
        let cfg = Config::from_map(&v).unwrap();
        assert!(!cfg.voiceover.enabled);
    }

    #[test]
    fn caption_defaults_on_and_can_be_disabled() {
        let mut v = minimal();
        assert_eq!(
            Config::from_map(&v).unwrap().voiceover.caption.as_deref(),
            Some("AI Generated")
        );

        v.insert("CAPTION_TEXT".into(), "Made with AI".into());
        assert_eq!(
            Config::from_map(&v).unwrap().voiceover.caption.as_deref(),
            Some("Made with AI")
        );

        v.insert("ADD_CAPTIONS".into(), "false".into());
        assert!(Config::from_map(&v).unwrap().voiceover.caption.is_none());
    }

    #[test]
    fn threshold_from_minutes_or_seconds() {
        let mut v = minimal();
        v.insert("TARGET_VIDEO_LENGTH_MINUTES".into(), "5".into());
        assert_eq!(Config::from_map(&v).unwrap().compilation.threshold_secs, 300.0);

        v.insert("ACCUMULATION_THRESHOLD_SECONDS".into(), "120".into());
        assert_eq!(Config::from_map(&v).unwrap().compilation.threshold_secs, 120.0);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for (key, value) in [
            ("SCHEDULE_TIME", "9am"),
            ("ACCOUNT_COUNT", "0"),
            ("UPLOAD_STAGGER_DELAY", "soon"),
            ("ASSET_POLICY", "shred"),
            ("SCHEDULE_MODE", "hourly"),
            ("PRIVACY_STATUS", "friends"),
            ("API_TIMEOUT_SECONDS", "0"),
        ] {
            let mut v = minimal();
            v.insert(key.into(), value.into());
            let err = Config::from_map(&v).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{key}={value} accepted");
        }
    }

    #[test]
    fn prompts_file_switches_source() {
        let mut v = minimal();
        v.insert("PROMPTS_FILE".into(), "prompts.txt".into());
        let cfg = Config::from_map(&v).unwrap();
        assert_eq!(cfg.prompts.source, PromptSource::File(PathBuf::from("prompts.txt")));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let cfg = Config::from_map(&minimal()).unwrap();
        let dump = format!("{:?}", cfg);
        assert!(!dump.contains("fal-key"));
        assert!(dump.contains("Secret(***)"));
    }

    #[test]
    fn daily_count_drives_tick_interval() {
        let mut v = minimal();
        v.insert("DAILY_VIDEO_COUNT".into(), "24".into());
        let cfg = Config::from_map(&v).unwrap();
        assert_eq!(cfg.schedule.tick_interval(), Duration::from_secs(3600));
    }
}
