//! Video URL in, MP3 out.
//!
//! **ytmp3** is a small HTTP service: `POST /api/convert` hands a video URL to
//! yt-dlp (which uses ffmpeg to extract the audio), stores the MP3 under a
//! generated `<uuid>.mp3` name, and `GET /api/download/{filename}` serves it
//! back. Stale artifacts are removed after each conversion, and optionally on a
//! fixed schedule.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> ytmp3::Result<()> {
//! use std::sync::Arc;
//! use ytmp3::{ArtifactStore, ServiceConfig, YtDlp};
//!
//! let config = ServiceConfig::default();
//! let store = ArtifactStore::new(config.resolve_download_dir())?;
//! let downloader = YtDlp::new(store.clone(), &config);
//!
//! let state = ytmp3::AppState::new(Arc::new(store), Arc::new(downloader), config.max_age);
//! let app = ytmp3::create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod janitor;
pub mod server;
pub mod store;
pub mod types;

pub use config::ServiceConfig;
pub use download::{AudioDownloader, YtDlp};
pub use error::{DelegateError, Error, Result};
pub use server::{create_router, AppState};
pub use store::{ArtifactStore, CleanupStats};
pub use types::{ConvertedAudio, Quality};
