//! Alert events and delivery.
//!
//! When a detection pass yields one or more faces, the pipeline builds an
//! [`AlertEvent`] and hands it to the [`AlertDispatcher`] through a bounded,
//! non-blocking queue. A dedicated sender thread delivers events to the HTTP
//! collector with per-event retry, so a slow or unreachable backend never
//! stalls frame capture. Delivery failure is logged and the event dropped.

use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AlertSettings;

/// Structured notification for one detection-positive frame.
///
/// Wire format (JSON): `{"cameraId": ..., "timestamp": RFC3339, "faces": n}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    #[serde(rename = "cameraId")]
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    pub faces: usize,
}

impl AlertEvent {
    pub fn new(camera_id: &str, captured_at: DateTime<Utc>, faces: usize) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            timestamp: captured_at,
            faces,
        }
    }
}

/// Errors produced by alert sinks. Non-fatal: the pipeline continues
/// regardless of delivery outcome.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to send alert to {endpoint}: {reason}")]
    SendFailed { endpoint: String, reason: String },
}

/// Delivers one alert event to a collector.
pub trait AlertSink: Send {
    fn notify(&self, event: &AlertEvent) -> Result<(), SinkError>;
}

/// HTTP POST sink.
///
/// Carries a request timeout so a hung backend cannot block the sender
/// thread indefinitely. Any non-2xx status or transport error is `SendFailed`.
pub struct HttpAlertSink {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpAlertSink {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { endpoint, agent }
    }
}

impl AlertSink for HttpAlertSink {
    fn notify(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let send_err = |reason: String| SinkError::SendFailed {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(event)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => send_err(format!("collector returned {}", code)),
                ureq::Error::Transport(t) => send_err(t.to_string()),
            })?;

        log::debug!(
            "alert sent: camera={} faces={} status={}",
            event.camera_id,
            event.faces,
            response.status()
        );
        Ok(())
    }
}

/// Handle the pipelines use to enqueue alerts. Cheap to clone.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Sender<AlertEvent>,
}

impl DispatchHandle {
    /// Enqueue an alert without blocking.
    ///
    /// A full queue drops the event with a warning: detection cadence always
    /// wins over delivery.
    pub fn dispatch(&self, event: AlertEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!(
                    "alert queue full, dropping event: camera={} faces={}",
                    event.camera_id,
                    event.faces
                );
            }
            Err(TrySendError::Disconnected(event)) => {
                log::warn!(
                    "alert dispatcher stopped, dropping event: camera={} faces={}",
                    event.camera_id,
                    event.faces
                );
            }
        }
    }
}

/// Bounded queue plus sender thread between the frame loops and the sink.
pub struct AlertDispatcher {
    tx: Sender<AlertEvent>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Spawn the sender thread over a bounded queue.
    pub fn spawn(sink: Box<dyn AlertSink>, settings: &AlertSettings) -> std::io::Result<Self> {
        let (tx, rx) = bounded(settings.queue_depth);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let max_retries = settings.max_retries;
        let retry_initial = settings.retry_initial;
        let handle = std::thread::Builder::new()
            .name("alert-sender".to_string())
            .spawn(move || sender_loop(rx, stop_rx, sink, max_retries, retry_initial))?;

        Ok(Self {
            tx,
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Handle for pipelines to enqueue alerts.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop the sender thread and join it after it drains the queue.
    ///
    /// The stop signal is a dedicated channel, so shutdown completes even
    /// while pipelines still hold `DispatchHandle` clones of the queue
    /// sender. Events enqueued before the stop are still delivered.
    pub fn shutdown(mut self) {
        drop(self.tx);
        drop(self.stop_tx);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("alert sender thread panicked");
            }
        }
    }
}

fn sender_loop(
    rx: Receiver<AlertEvent>,
    stop_rx: Receiver<()>,
    sink: Box<dyn AlertSink>,
    max_retries: u32,
    retry_initial: Duration,
) {
    loop {
        select! {
            recv(rx) -> event => match event {
                Ok(event) => deliver(sink.as_ref(), &event, max_retries, retry_initial),
                // Every sender (dispatcher and all handles) is gone.
                Err(_) => return,
            },
            // shutdown() dropped the stop sender: drain what is already
            // queued, then exit without waiting on live handles.
            recv(stop_rx) -> _ => break,
        }
    }

    while let Ok(event) = rx.try_recv() {
        deliver(sink.as_ref(), &event, max_retries, retry_initial);
    }
}

fn deliver(sink: &dyn AlertSink, event: &AlertEvent, max_retries: u32, retry_initial: Duration) {
    let mut delay = retry_initial;
    let mut attempt = 0u32;
    loop {
        match sink.notify(event) {
            Ok(()) => return,
            Err(e) if attempt < max_retries => {
                attempt += 1;
                log::warn!(
                    "alert delivery failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt,
                    max_retries,
                    delay,
                    e
                );
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                log::error!(
                    "alert dropped after {} attempts: camera={} faces={}: {}",
                    attempt + 1,
                    event.camera_id,
                    event.faces,
                    e
                );
                return;
            }
        }
    }
}
