use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tab_audio_streamer::{
    create_router, AppState, Config, RecordingCoordinator, RecordingState, RecordingTarget,
    SourceKind,
};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "tab-audio-streamer", version, about = "Stream captured audio to a collector")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/tab-audio-streamer.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP command surface
    Serve,

    /// Record one source until it ends, the duration elapses, or Ctrl-C
    Record {
        /// `file:PATH` or `tone:HZ`
        #[arg(short, long)]
        source: SourceKind,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Page URL reported to the collector
        #[arg(long)]
        url: Option<String>,

        /// Page title reported to the collector
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&cli.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Collector: {}", cfg.collector.url);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Record {
            source,
            duration,
            url,
            title,
        } => {
            let target = RecordingTarget {
                source,
                tab_url: url,
                tab_title: title,
                tab_favicon: None,
            };
            record(cfg, target, duration.map(Duration::from_secs)).await
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let coordinator = RecordingCoordinator::new(cfg.session_config());
    let app = create_router(AppState::new(coordinator.clone()));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    coordinator.stop().await?;
    Ok(())
}

async fn record(cfg: Config, target: RecordingTarget, duration: Option<Duration>) -> Result<()> {
    let coordinator = RecordingCoordinator::new(cfg.session_config());

    let session_id = coordinator
        .start(target)
        .await
        .context("Failed to start recording")?;
    info!("Recording to collector session {}", session_id);

    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = coordinator.status().await;
                if status.state == RecordingState::Idle {
                    info!("Source ended after {} chunks", status.chunks_count);
                    return Ok(());
                }
                info!(
                    "{:.1}s recorded, {} chunks delivered",
                    status.elapsed_secs.unwrap_or_default(),
                    status.chunks_count
                );
                if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }

    let summary = coordinator.stop().await?;
    info!(
        "Done: {} chunks sent, {} dropped, {} frames",
        summary.chunks_sent, summary.chunks_dropped, summary.frames_captured
    );
    Ok(())
}
