//! facewatchd - face detection worker daemon
//!
//! This daemon:
//! 1. Loads the worker configuration (file + env overrides)
//! 2. Builds the detector backend registry (model load failures abort startup)
//! 3. Spawns the alert dispatcher (bounded queue + sender thread)
//! 4. Runs one pipeline thread per configured camera
//! 5. Shuts down cooperatively on SIGINT/SIGTERM

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use facewatch::{
    AlertDispatcher, BackendRegistry, CameraPipeline, HttpAlertSink, StubBackend, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "facewatchd", about = "Multi-camera face detection and alerting worker")]
struct Cli {
    /// Path to the JSON worker config (also: FACEWATCH_CONFIG).
    #[arg(long, env = "FACEWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = WorkerConfig::load(cli.config.as_deref()).context("load worker config")?;

    let registry = build_registry(&cfg)?;
    let detector = registry
        .get(&cfg.detector.backend)
        .ok_or_else(|| {
            anyhow!(
                "detector backend '{}' not available (registered: {:?})",
                cfg.detector.backend,
                registry.list()
            )
        })?;
    log::info!("detector backend: {}", detector.name());

    let sink = HttpAlertSink::new(cfg.alerts.endpoint.clone(), cfg.alerts.timeout);
    let dispatcher =
        AlertDispatcher::spawn(Box::new(sink), &cfg.alerts).context("spawn alert dispatcher")?;
    log::info!(
        "alert dispatcher started: endpoint={} queue_depth={}",
        cfg.alerts.endpoint,
        cfg.alerts.queue_depth
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
        })
        .context("install signal handler")?;
    }

    log::info!("facewatchd running with {} camera(s)", cfg.cameras.len());

    let mut handles = Vec::with_capacity(cfg.cameras.len());
    for camera in &cfg.cameras {
        let mut pipeline = CameraPipeline::new(
            camera.clone(),
            detector.clone(),
            dispatcher.handle(),
            cfg.backoff.clone(),
        );
        let shutdown = shutdown.clone();
        let camera_id = camera.id.clone();
        let handle = std::thread::Builder::new()
            .name(format!("pipeline-{}", camera_id))
            .spawn(move || pipeline.run(&shutdown))
            .with_context(|| format!("spawn pipeline thread for camera '{}'", camera_id))?;
        handles.push((camera.id.clone(), handle));
    }

    // A panicked pipeline must not take the others down; log and keep going.
    for (camera_id, handle) in handles {
        if handle.join().is_err() {
            log::error!("pipeline {} panicked", camera_id);
        }
    }

    dispatcher.shutdown();
    log::info!("facewatchd stopped");
    Ok(())
}

/// Register available detector backends. The backend named in the config
/// must come up, and for model-backed backends a load failure is fatal.
fn build_registry(cfg: &WorkerConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    #[cfg(feature = "backend-tract")]
    if cfg.detector.backend == "tract" {
        let model_path = cfg
            .detector
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("detector.model_path is required for the tract backend"))?;
        let camera = cfg
            .cameras
            .first()
            .ok_or_else(|| anyhow!("at least one camera must be configured"))?;
        let backend = facewatch::TractBackend::new(model_path, camera.width, camera.height)
            .context("load detection model")?
            .with_threshold(cfg.detector.confidence_threshold);
        registry.register(backend);
    }

    #[cfg(not(feature = "backend-tract"))]
    if cfg.detector.backend == "tract" {
        return Err(anyhow!(
            "detector backend 'tract' requires the backend-tract feature"
        ));
    }

    registry.set_default(&cfg.detector.backend)?;
    Ok(registry)
}
