use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use ytmp3::{ArtifactStore, AppState, ServiceConfig, YtDlp};

#[derive(Parser)]
#[command(name = "ytmp3-server", about = "Convert video URLs to MP3 over HTTP")]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Directory for converted files (default: <temp dir>/downloads).
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// yt-dlp executable.
    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Directory containing the ffmpeg binary.
    #[arg(long)]
    ffmpeg_location: Option<PathBuf>,

    /// Delete converted files older than this many seconds.
    #[arg(long, default_value = "3600")]
    max_age_secs: u64,

    /// Also run cleanup every N seconds, not only after conversions.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    cleanup_interval_secs: Option<u64>,

    /// Abort conversions that take longer than N seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new()
            .yt_dlp_path(self.yt_dlp.clone())
            .max_age(Duration::from_secs(self.max_age_secs));

        if let Some(dir) = &self.download_dir {
            config = config.download_dir(dir.clone());
        }
        if let Some(dir) = &self.ffmpeg_location {
            config = config.ffmpeg_location(dir.clone());
        }
        if let Some(secs) = self.cleanup_interval_secs {
            config = config.cleanup_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeout_secs {
            config = config.convert_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ytmp3=info".parse().expect("valid directive"))
                .add_directive("ytmp3_server=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = match format!("{}:{}", cli.host, cli.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Invalid address {}:{}: {e}", cli.host, cli.port);
            std::process::exit(1);
        }
    };

    let config = cli.service_config();
    let download_dir = config.resolve_download_dir();

    let store = match ArtifactStore::new(&download_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: cannot use {}: {e}", download_dir.display());
            std::process::exit(1);
        }
    };

    let downloader = YtDlp::new(store.clone(), &config);
    if !downloader.is_available().await {
        tracing::warn!(
            path = %config.yt_dlp_path.display(),
            "yt-dlp is not runnable — conversions will fail until it is installed"
        );
    }

    let store = Arc::new(store);
    if let Some(interval) = config.cleanup_interval {
        ytmp3::janitor::spawn_janitor(Arc::clone(&store), interval, config.max_age);
    }

    let state = AppState::new(store, Arc::new(downloader), config.max_age);
    let app = ytmp3::create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, download_dir = %download_dir.display(), "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }

    tracing::info!("server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
