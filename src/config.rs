use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CAMERA_ID: &str = "camera-1";
const DEFAULT_CAMERA_URL: &str = "stub://camera-1";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_ALERT_ENDPOINT: &str = "http://127.0.0.1:3000/alert";
const DEFAULT_ALERT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_ALERT_QUEUE_DEPTH: usize = 64;
const DEFAULT_ALERT_MAX_RETRIES: u32 = 3;
const DEFAULT_ALERT_RETRY_INITIAL_MS: u64 = 250;
const DEFAULT_BACKOFF_INITIAL_MS: u64 = 200;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_READ_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    cameras: Option<Vec<CameraConfigFile>>,
    detector: Option<DetectorConfigFile>,
    alerts: Option<AlertConfigFile>,
    backoff: Option<BackoffConfigFile>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    id: String,
    url: String,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    queue_depth: Option<usize>,
    max_retries: Option<u32>,
    retry_initial_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct BackoffConfigFile {
    initial_ms: Option<u64>,
    max_ms: Option<u64>,
    multiplier: Option<f64>,
    read_failure_threshold: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cameras: Vec<CameraConfig>,
    pub detector: DetectorSettings,
    pub alerts: AlertSettings,
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub id: String,
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub queue_depth: usize,
    pub max_retries: u32,
    pub retry_initial: Duration,
}

#[derive(Debug, Clone)]
pub struct BackoffSettings {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub read_failure_threshold: u32,
}

impl WorkerConfig {
    /// Load configuration: file (if any), then env overrides, then validation.
    ///
    /// The file path comes from the caller (CLI flag) or `FACEWATCH_CONFIG`.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("FACEWATCH_CONFIG").ok();
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env_path.map(PathBuf::from));
        let file_cfg = match path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WorkerConfigFile) -> Self {
        let cameras = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .map(|cam| CameraConfig {
                id: cam.id,
                url: cam.url,
                target_fps: cam.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                width: cam.width.unwrap_or(DEFAULT_WIDTH),
                height: cam.height.unwrap_or(DEFAULT_HEIGHT),
            })
            .collect::<Vec<_>>();
        let cameras = if cameras.is_empty() {
            vec![CameraConfig {
                id: DEFAULT_CAMERA_ID.to_string(),
                url: DEFAULT_CAMERA_URL.to_string(),
                target_fps: DEFAULT_TARGET_FPS,
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            }]
        } else {
            cameras
        };
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };
        let alerts_file = file.alerts.unwrap_or_default();
        let alerts = AlertSettings {
            endpoint: alerts_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_ALERT_ENDPOINT.to_string()),
            timeout: Duration::from_millis(alerts_file.timeout_ms.unwrap_or(DEFAULT_ALERT_TIMEOUT_MS)),
            queue_depth: alerts_file.queue_depth.unwrap_or(DEFAULT_ALERT_QUEUE_DEPTH),
            max_retries: alerts_file.max_retries.unwrap_or(DEFAULT_ALERT_MAX_RETRIES),
            retry_initial: Duration::from_millis(
                alerts_file
                    .retry_initial_ms
                    .unwrap_or(DEFAULT_ALERT_RETRY_INITIAL_MS),
            ),
        };
        let backoff_file = file.backoff.unwrap_or_default();
        let backoff = BackoffSettings {
            initial: Duration::from_millis(
                backoff_file.initial_ms.unwrap_or(DEFAULT_BACKOFF_INITIAL_MS),
            ),
            max: Duration::from_millis(backoff_file.max_ms.unwrap_or(DEFAULT_BACKOFF_MAX_MS)),
            multiplier: backoff_file.multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER),
            read_failure_threshold: backoff_file
                .read_failure_threshold
                .unwrap_or(DEFAULT_READ_FAILURE_THRESHOLD),
        };
        Self {
            cameras,
            detector,
            alerts,
            backoff,
        }
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("FACEWATCH_ALERT_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.alerts.endpoint = endpoint;
            }
        }
        if let Ok(url) = std::env::var("FACEWATCH_CAMERA_URL") {
            // Single-camera convenience override: replaces the camera list.
            if !url.trim().is_empty() {
                self.cameras = vec![CameraConfig {
                    id: DEFAULT_CAMERA_ID.to_string(),
                    url,
                    target_fps: DEFAULT_TARGET_FPS,
                    width: DEFAULT_WIDTH,
                    height: DEFAULT_HEIGHT,
                }];
            }
        }
        if let Ok(path) = std::env::var("FACEWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(backend) = std::env::var("FACEWATCH_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one camera must be configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for cam in &self.cameras {
            if cam.id.trim().is_empty() {
                return Err(anyhow!("camera id must not be empty"));
            }
            if !seen.insert(cam.id.as_str()) {
                return Err(anyhow!("duplicate camera id '{}'", cam.id));
            }
            if cam.url.trim().is_empty() {
                return Err(anyhow!("camera '{}' has an empty url", cam.id));
            }
            if cam.target_fps == 0 {
                return Err(anyhow!("camera '{}' target_fps must be greater than zero", cam.id));
            }
        }
        if self.alerts.endpoint.trim().is_empty() {
            return Err(anyhow!("alert endpoint must not be empty"));
        }
        if self.alerts.queue_depth == 0 {
            return Err(anyhow!("alert queue_depth must be greater than zero"));
        }
        if self.backoff.multiplier <= 1.0 {
            return Err(anyhow!("backoff multiplier must be greater than 1.0"));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(anyhow!("backoff initial_ms must not exceed max_ms"));
        }
        if self.backoff.initial.is_zero() {
            return Err(anyhow!("backoff initial_ms must be greater than zero"));
        }
        if self.backoff.read_failure_threshold == 0 {
            return Err(anyhow!("read_failure_threshold must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WorkerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
