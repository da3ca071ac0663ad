use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use screen_recorder::backend::{FfmpegDevices, FfmpegEncoderFactory, X11Sources};
use screen_recorder::capture::SourceEnumerator;
use screen_recorder::config::MirrorTransportKind;
use screen_recorder::mirror::{MirrorTransport, NatsTransport, NetworkMirror, WebSocketTransport};
use screen_recorder::persistence::FixedDirectory;
use screen_recorder::{
    create_router, AppState, Config, PersistenceSink, Platform, SessionCoordinator, SourceRegistry,
    StreamAcquirer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screen-recorder")]
#[command(about = "Record a screen, system audio and microphone as separate files")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/screen-recorder")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control API
    Serve,

    /// List recordable screens and windows
    Sources,

    /// Record one source from the command line
    Record {
        /// Source id from `sources`
        #[arg(short, long)]
        source: String,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

struct App {
    coordinator: Arc<SessionCoordinator>,
    registry: Arc<SourceRegistry>,
}

async fn build(cfg: &Config) -> Result<App> {
    let sources: Arc<dyn SourceEnumerator> = Arc::new(X11Sources::new(cfg.capture.display.as_str()));
    let registry = Arc::new(SourceRegistry::new(
        Arc::clone(&sources),
        cfg.capture.exclude_patterns.clone(),
    ));

    let devices = Arc::new(FfmpegDevices::new(cfg.capture.ffmpeg(), sources));
    let acquirer = StreamAcquirer::new(devices, Platform::current())
        .with_microphone_constraints(cfg.recording.microphone());
    info!("Capturing on {}", acquirer.platform());
    let encoders = Arc::new(
        FfmpegEncoderFactory::probe(&cfg.capture.ffmpeg)
            .await
            .context("Failed to probe ffmpeg encoders")?,
    );

    let output_dir = cfg.recording.output_path();
    info!("Recordings will be saved to {}", output_dir.display());
    let sink = PersistenceSink::new(Arc::new(FixedDirectory::new(output_dir)));

    let mut coordinator = SessionCoordinator::new(acquirer, encoders, sink, cfg.recording.session());

    if cfg.mirror.enabled {
        let transport: Option<Arc<dyn MirrorTransport>> = match cfg.mirror.transport {
            MirrorTransportKind::WebSocket => Some(Arc::new(WebSocketTransport::new(cfg.mirror.url.as_str()))),
            MirrorTransportKind::Nats => match NatsTransport::connect(&cfg.mirror.url).await {
                Ok(transport) => Some(Arc::new(transport)),
                Err(e) => {
                    warn!("NATS unavailable, recording without live mirror: {:#}", e);
                    None
                }
            },
        };

        if let Some(transport) = transport {
            let mirror = NetworkMirror::new(
                transport,
                cfg.mirror.connect_timeout(),
                cfg.mirror.close_timeout(),
            );
            info!("Live mirror enabled via {}", mirror.transport_name());
            coordinator = coordinator.with_mirror(mirror);
        }
    }

    Ok(App {
        coordinator: Arc::new(coordinator),
        registry,
    })
}

async fn serve(cfg: &Config, app: App) -> Result<()> {
    let coordinator = Arc::clone(&app.coordinator);
    let router = create_router(AppState::new(app.coordinator, app.registry));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Some(report) = coordinator.shutdown().await {
        info!("Saved on shutdown: {}", serde_json::to_string(&report)?);
    }

    Ok(())
}

async fn list_sources(app: &App) -> Result<()> {
    let sources = app.registry.list_sources().await?;
    for source in sources {
        println!("{:<28} {:?}  {}", source.id, source.kind, source.name);
    }
    Ok(())
}

async fn record(app: &App, source_id: &str, seconds: Option<u64>) -> Result<()> {
    let source = app
        .registry
        .find(source_id)
        .await?
        .with_context(|| format!("No source with id {}", source_id))?;

    let outcome = app.coordinator.start_session(&source).await?;
    for degraded in &outcome.degraded {
        warn!("{} unavailable: {}", degraded.kind, degraded.reason);
    }
    println!("{}", outcome.indicator);

    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    if let Some(report) = app.coordinator.stop_session().await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, `info` otherwise
fn log_filter(rust_log: Option<String>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let app = build(&cfg).await?;

    match cli.command {
        Commands::Serve => serve(&cfg, app).await,
        Commands::Sources => list_sources(&app).await,
        Commands::Record { source, seconds } => record(&app, &source, seconds).await,
    }
}
