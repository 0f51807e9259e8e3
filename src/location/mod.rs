pub mod nmea;
pub mod replay;
pub mod serial;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::Receiver as TokioReceiver;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::consts::DEFAULT_TIMEOUT_MS;

/// One location reading as delivered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground reported by the receiver, if it reports one
    #[serde(default)]
    pub speed_mps: Option<f64>,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location unavailable: {0}")]
    CapabilityUnavailable(String),
    #[error("Location access denied: {0}")]
    PermissionDenied(String),
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("Timed out waiting for a position fix")]
    Timeout,
    #[error("Location error: {0}")]
    Transport(String),
}

pub type LocationEvent = Result<PositionSample, LocationError>;

/// Options handed to the provider when a watch starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub allow_cached_fix: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            allow_cached_fix: false,
        }
    }
}

/// A source of position samples, the desktop stand-in for a platform
/// "watch position" API.
pub trait LocationProvider: Send {
    fn name(&self) -> String;

    /// Subscribe to location updates. Fails with `CapabilityUnavailable`
    /// when the underlying device or file cannot be used at all.
    fn watch_position(&mut self, options: &WatchOptions) -> Result<PositionWatch, LocationError>;
}

/// Live subscription returned by [`LocationProvider::watch_position`].
///
/// Dropping it cancels the subscription: the event channel is closed, the
/// worker's running flag is cleared and a worker task (if any) is aborted.
/// No event can be received through a watch once it has been dropped.
pub struct PositionWatch {
    events: ReceiverStream<LocationEvent>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PositionWatch {
    pub fn new(events: TokioReceiver<LocationEvent>, running: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            events: ReceiverStream::new(events),
            running,
            task,
        }
    }

    /// Next event, or `None` once the provider has finished
    pub async fn next_event(&mut self) -> Option<LocationEvent> {
        self.events.next().await
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
