use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{channel as tokio_channel, Sender as TokioSender};

use crate::location::{LocationError, LocationEvent, LocationProvider, PositionSample, PositionWatch, WatchOptions};

const EVENT_QUEUE: usize = 32;
// Slowest playback allowed, 100x slower than recorded
const MIN_SPEEDUP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayFailure {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Transport,
}

impl From<ReplayFailure> for LocationError {
    fn from(failure: ReplayFailure) -> Self {
        match failure {
            ReplayFailure::PermissionDenied => LocationError::PermissionDenied("denied by replay script".into()),
            ReplayFailure::PositionUnavailable => LocationError::PositionUnavailable("signal lost in replay".into()),
            ReplayFailure::Timeout => LocationError::Timeout,
            ReplayFailure::Transport => LocationError::Transport("replay transport failure".into()),
        }
    }
}

/// One entry of a replay script: `{"fix": {...}}` or `{"error": "timeout"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayEvent {
    Fix(PositionSample),
    Error(ReplayFailure),
}

/// Plays back a recorded or hand-written list of fixes and failures.
///
/// Fixes are paced by their timestamps divided by `speedup`; a speedup of
/// zero delivers everything immediately. A gap between fixes longer than the
/// watch timeout ends the replay with [`LocationError::Timeout`], which is
/// what a live receiver would report.
pub struct ReplayProvider {
    path: Option<PathBuf>,
    events: Vec<ReplayEvent>,
    speedup: f64,
}

impl ReplayProvider {
    pub fn from_events(events: Vec<ReplayEvent>, speedup: f64) -> Self {
        Self {
            path: None,
            events,
            speedup,
        }
    }

    /// Script is read when a watch starts, so edits show up on the next start
    pub fn from_file(path: &Path, speedup: f64) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            events: Vec::new(),
            speedup,
        }
    }

    pub fn load_events(path: &Path) -> anyhow::Result<Vec<ReplayEvent>> {
        let script = std::fs::read_to_string(path)?;
        let events: Vec<ReplayEvent> = serde_json::from_str(&script)?;
        Ok(events)
    }

    async fn replay_task(events: Vec<ReplayEvent>, tx: TokioSender<LocationEvent>, running: Arc<AtomicBool>, options: WatchOptions, speedup: f64) {
        let mut last_timestamp: Option<i64> = None;

        for event in events {
            if !running.load(Ordering::Relaxed) {
                return;
            }

            let sample = match event {
                ReplayEvent::Fix(sample) => sample,
                ReplayEvent::Error(failure) => {
                    _ = tx.send(Err(failure.into())).await;
                    return;
                }
            };

            if let Some(previous) = last_timestamp {
                if !options.allow_cached_fix && sample.timestamp_ms <= previous {
                    debug!("Skipping stale replay fix at {}", sample.timestamp_ms);
                    continue;
                }

                let gap = Duration::from_millis((sample.timestamp_ms - previous).max(0) as u64);
                if gap > options.timeout {
                    Self::pace(options.timeout, speedup).await;
                    _ = tx.send(Err(LocationError::Timeout)).await;
                    return;
                }
                Self::pace(gap, speedup).await;
            }

            last_timestamp = Some(sample.timestamp_ms);
            if tx.send(Ok(sample)).await.is_err() {
                return;
            }
        }
    }

    async fn pace(gap: Duration, speedup: f64) {
        if let Some(delay) = pacing_delay(gap, speedup) {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wall-clock wait for a script gap; `None` when pacing is off (zero, negative or NaN speedup)
fn pacing_delay(gap: Duration, speedup: f64) -> Option<Duration> {
    if speedup.is_nan() || speedup <= 0.0 {
        return None;
    }
    let scaled = gap.as_secs_f64() / speedup.max(MIN_SPEEDUP);
    Some(Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX))
}

impl LocationProvider for ReplayProvider {
    fn name(&self) -> String {
        match &self.path {
            Some(path) => format!("replay {}", path.display()),
            None => "replay".to_string(),
        }
    }

    fn watch_position(&mut self, options: &WatchOptions) -> Result<PositionWatch, LocationError> {
        let events = match &self.path {
            Some(path) => Self::load_events(path)
                .map_err(|error| LocationError::CapabilityUnavailable(format!("{}: {}", path.display(), error)))?,
            None => self.events.clone(),
        };

        if events.is_empty() {
            return Err(LocationError::CapabilityUnavailable("replay script is empty".into()));
        }

        info!("Replaying {} events at {}x", events.len(), self.speedup);

        let (tx, rx) = tokio_channel::<LocationEvent>(EVENT_QUEUE);
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(Self::replay_task(events, tx, running.clone(), *options, self.speedup));

        Ok(PositionWatch::new(rx, running, Some(task)))
    }
}
