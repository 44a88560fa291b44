use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{DelegateError, Error};
use crate::store::ArtifactStore;
use crate::types::{ConvertedAudio, Quality, AUDIO_EXTENSION, UNKNOWN_TITLE};

/// Marker prefixed to progress lines so they can be told apart from the
/// metadata JSON on stdout.
const PROGRESS_MARKER: &str = "[progress]";

/// Longest stderr excerpt carried into an error message.
const MAX_ERROR_CHARS: usize = 1000;

/// Converts a source URL into a stored MP3 artifact.
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    async fn download_audio(
        &self,
        url: &str,
        quality: Quality,
    ) -> Result<ConvertedAudio, DelegateError>;
}

/// A progress report from yt-dlp's download stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading { percent: String, total: String },
    Finished,
}

/// Log a progress event. Never fails.
pub fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Downloading { percent, total } => {
            debug!(%percent, %total, "downloading");
        }
        ProgressEvent::Finished => info!("download complete, now converting"),
    }
}

/// Parse a line produced by the `--progress-template` below.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();
    match fields.next()? {
        "finished" => Some(ProgressEvent::Finished),
        "downloading" => {
            let percent = fields.next().unwrap_or("0%").to_string();
            let total = fields.collect::<Vec<_>>().join(" ");
            let total = if total.is_empty() || total == "NA" || total == "N/A" {
                "unknown size".to_string()
            } else {
                total
            };
            Some(ProgressEvent::Downloading { percent, total })
        }
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YtDlpInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
}

/// Parse the info JSON printed after the move step. Unreadable metadata is
/// logged and dropped; it never fails the conversion.
fn parse_info(line: &str) -> Option<YtDlpInfo> {
    match serde_json::from_str(line) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(error = %e, "unreadable yt-dlp metadata");
            None
        }
    }
}

/// Build the result, with placeholders for anything the source didn't provide.
fn converted_audio(filename: String, info: Option<YtDlpInfo>) -> ConvertedAudio {
    let info = info.unwrap_or_default();

    ConvertedAudio {
        filename,
        title: info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        thumbnail: info.thumbnail,
        duration: info.duration,
    }
}

/// Drain yt-dlp's stdout and stderr, then wait for it to exit.
async fn collect_output(
    child: &mut Child,
) -> Result<(Option<YtDlpInfo>, Vec<u8>, ExitStatus), Error> {
    let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(Error::Io(std::io::Error::other(
            "yt-dlp output pipes unavailable",
        )));
    };

    let read_stdout = async {
        let mut lines = BufReader::new(stdout).lines();
        let mut info = None;
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = parse_progress_line(&line) {
                log_progress(&event);
            } else if line.trim_start().starts_with('{') {
                info = parse_info(&line).or(info);
            } else if !line.trim().is_empty() {
                debug!(%line, "yt-dlp output");
            }
        }
        Ok::<_, std::io::Error>(info)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await.map(|_| buf)
    };

    let (info, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
    let status = child.wait().await?;
    Ok((info, stderr, status))
}

/// Build a human-readable message from a failed yt-dlp run.
fn failure_message(stderr: &[u8], status: ExitStatus) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let errors: Vec<&str> = stderr
        .lines()
        .filter_map(|l| l.trim().strip_prefix("ERROR:"))
        .map(str::trim)
        .collect();

    let message = if !errors.is_empty() {
        errors.join("; ")
    } else if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        format!("yt-dlp exited with {status}")
    };

    message.chars().take(MAX_ERROR_CHARS).collect()
}

/// Conversion delegate backed by the yt-dlp binary (which drives ffmpeg for
/// the audio extraction step).
///
/// # Security
/// - Arguments are passed via `.args()` (no shell expansion)
/// - `--no-exec` prevents yt-dlp from running post-processing commands
/// - Output names come from a fresh UUID, never from the URL or title
pub struct YtDlp {
    store: ArtifactStore,
    yt_dlp_path: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    user_agent: String,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(store: ArtifactStore, config: &ServiceConfig) -> Self {
        Self {
            store,
            yt_dlp_path: config.yt_dlp_path.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.convert_timeout,
        }
    }

    /// Whether the configured yt-dlp binary can be executed.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build_args(&self, id: &str, url: &str, quality: Quality) -> Vec<OsString> {
        let output_template = self.store.root().join(format!("{id}.%(ext)s"));
        let progress_template =
            format!("download:{PROGRESS_MARKER} %(progress.status)s %(progress._percent_str)s %(progress._total_bytes_str)s");

        let mut args: Vec<OsString> = [
            "--format",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            AUDIO_EXTENSION,
            "--audio-quality",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(format!("{}K", quality.kbps()).into());
        args.push("--output".into());
        args.push(output_template.into_os_string());

        for flag in [
            "--quiet",
            "--no-warnings",
            "--no-playlist",
            "--no-exec",
            "--no-check-certificates",
            "--geo-bypass",
            "--progress",
            "--newline",
        ] {
            args.push(flag.into());
        }

        args.push("--progress-template".into());
        args.push(progress_template.into());
        args.push("--print".into());
        args.push("after_move:%()j".into());
        args.push("--user-agent".into());
        args.push(self.user_agent.clone().into());

        if let Some(dir) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(dir.clone().into_os_string());
        }

        // Keep the URL away from option parsing.
        args.push("--".into());
        args.push(url.into());
        args
    }

    async fn run(
        &self,
        id: &str,
        url: &str,
        quality: Quality,
    ) -> Result<ConvertedAudio, DelegateError> {
        let mut child = Command::new(&self.yt_dlp_path)
            .args(self.build_args(id, url, quality))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::YtDlpNotFound
                } else {
                    Error::Io(e)
                }
            })?;

        let collected = match self.timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, collect_output(&mut child)).await;
                match outcome {
                    Ok(collected) => collected,
                    Err(_) => {
                        // Reap yt-dlp before the caller discards partial files.
                        // An ffmpeg grandchild can outlive it; anything it still
                        // writes is picked up by the next cleanup pass.
                        if let Err(e) = child.kill().await {
                            warn!(%id, error = %e, "failed to kill yt-dlp");
                        }
                        return Err(DelegateError::Unexpected(format!(
                            "conversion timed out after {}s",
                            limit.as_secs()
                        )));
                    }
                }
            }
            None => collect_output(&mut child).await,
        };
        let (info, stderr, status) = collected?;

        if !status.success() {
            return Err(DelegateError::Download(failure_message(&stderr, status)));
        }

        // The extract-audio step always leaves `<id>.mp3`, whatever the
        // source container was.
        let filename = format!("{id}.{AUDIO_EXTENSION}");
        let path = self.store.resolve(&filename)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DelegateError::Unexpected(format!(
                "converted file not found at {}",
                path.display()
            )));
        }

        if info.is_none() {
            debug!(%id, "yt-dlp printed no metadata");
        }

        Ok(converted_audio(filename, info))
    }
}

#[async_trait]
impl AudioDownloader for YtDlp {
    async fn download_audio(
        &self,
        url: &str,
        quality: Quality,
    ) -> Result<ConvertedAudio, DelegateError> {
        let id = Uuid::new_v4().to_string();
        info!(%url, %quality, %id, "converting");

        let result = self.run(&id, url, quality).await;

        match &result {
            Ok(audio) => info!(filename = %audio.filename, title = %audio.title, "conversion finished"),
            Err(e) => {
                warn!(%url, %id, error = %e, "conversion failed");
                let store = self.store.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || store.discard(&id)).await {
                    warn!(error = %e, "discarding partial artifacts aborted");
                }
            }
        }

        result
    }
}
