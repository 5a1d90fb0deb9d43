use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surface_agent::audio::{CaptureDevice, CaptureSourceFactory, WavFileSink};
use surface_agent::automation::{ClickTargets, Dispatcher, HeadlessSurface};
use surface_agent::nats::{run_command_channel, ChannelConfig};
use surface_agent::session::{RecordingController, SessionConfig};
use surface_agent::{create_router, AppState, Config};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "surface-agent", about = "Remote-controlled desktop automation agent")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/surface-agent")]
    config: String,

    /// Audio file replayed as the capture device (overrides config)
    #[arg(long)]
    capture_file: Option<PathBuf>,

    /// Capture from the system audio device (overrides config)
    #[arg(long, conflicts_with = "capture_file")]
    live: bool,

    /// Disable the NATS command channel
    #[arg(long)]
    no_nats: bool,

    /// Disable the HTTP control API
    #[arg(long)]
    no_http: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let device = match &args.capture_file {
        Some(path) => CaptureDevice::File(path.clone()),
        None if args.live => CaptureDevice::Live {
            device: Some(cfg.audio.live_device.clone()).filter(|name| !name.is_empty()),
            loopback: cfg.audio.loopback,
        },
        None => cfg.audio.capture_device(),
    };
    info!("Capture device: {:?}", device);
    if matches!(device, CaptureDevice::None) {
        warn!("No capture device configured; clicks will not record audio");
    }

    let sink = WavFileSink::new(cfg.audio.sink_config())?;
    let factory = CaptureSourceFactory::new(device, cfg.audio.capture_config());
    let controller = Arc::new(RecordingController::new(
        SessionConfig::from(&cfg.audio),
        Arc::new(factory),
        Arc::new(sink),
    ));

    let targets = ClickTargets::load(&cfg.automation.targets_path)?;
    let _watcher = targets.spawn_watcher(Duration::from_millis(cfg.automation.reload_interval_ms));

    let surface = HeadlessSurface::new(
        cfg.automation.surface_title.clone(),
        cfg.automation.surface_width,
        cfg.automation.surface_height,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(surface),
        targets,
        Arc::clone(&controller),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if cfg.nats.enabled && !args.no_nats {
        let channel = ChannelConfig::from(&cfg.nats);
        info!("Command channel: {} as {}", channel.url, channel.agent_id);
        tasks.push(tokio::spawn(run_command_channel(
            channel,
            Arc::clone(&dispatcher),
            shutdown_rx.clone(),
        )));
    }

    if cfg.service.http.enabled && !args.no_http {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("HTTP server listening on {}", addr);

        let router = create_router(AppState::new(Arc::clone(&dispatcher)));
        let mut http_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = http_shutdown.wait_for(|stopped| *stopped).await;
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
            }
        }));
    }

    if !args.no_console {
        // Blocking stdin reader on its own thread so it never holds up shutdown
        let console_dispatcher = Arc::clone(&dispatcher);
        let runtime = tokio::runtime::Handle::current();
        std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                info!("Waiting for command:");
                for line in std::io::stdin().lines() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let result = runtime.block_on(console_dispatcher.execute_line(&line));
                    if result.ok {
                        info!("{}: {}", result.command, result.message);
                    } else {
                        warn!("{}: {}", result.command, result.message);
                    }
                }
            })
            .context("Failed to spawn console thread")?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(report) = controller.stop_session().await {
        info!("Final session {}: {}", report.session_id, report.outcome.label());
    }
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task panicked: {}", e);
        }
    }

    Ok(())
}
