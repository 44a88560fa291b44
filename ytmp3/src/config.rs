use std::path::PathBuf;
use std::time::Duration;

/// Browser user agent sent to source sites to reduce spurious rejections.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Artifacts older than this are removed by cleanup passes.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Builder for service configuration.
///
/// Every field has a working default, so `ServiceConfig::default()` gives a
/// service storing artifacts under `<temp dir>/downloads`, calling `yt-dlp`
/// from `PATH`, and cleaning up only after successful conversions.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Flat directory holding the produced MP3 files.
    pub download_dir: Option<PathBuf>,
    /// yt-dlp executable (name looked up in `PATH`, or a full path).
    pub yt_dlp_path: PathBuf,
    /// Directory containing the ffmpeg binary, passed to yt-dlp.
    pub ffmpeg_location: Option<PathBuf>,
    pub user_agent: String,
    pub max_age: Duration,
    /// Run cleanup on a fixed schedule in addition to after each conversion.
    pub cleanup_interval: Option<Duration>,
    /// Abort a conversion that takes longer than this.
    pub convert_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            yt_dlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_age: DEFAULT_MAX_AGE,
            cleanup_interval: None,
            convert_timeout: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = Some(dir);
        self
    }

    pub fn yt_dlp_path(mut self, path: PathBuf) -> Self {
        self.yt_dlp_path = path;
        self
    }

    pub fn ffmpeg_location(mut self, dir: PathBuf) -> Self {
        self.ffmpeg_location = Some(dir);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    pub fn convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = Some(timeout);
        self
    }

    /// Resolve the artifact directory, defaulting to `<temp dir>/downloads`.
    pub fn resolve_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("downloads"))
    }
}
