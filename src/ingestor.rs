use std::sync::mpsc::{channel, Receiver, Sender};
use log::{debug, info, warn};
use tokio::select;
use tokio::sync::mpsc::{channel as tokio_channel, Receiver as TokioReceiver, Sender as TokioSender};
use uuid::Uuid;

use crate::estimator::{SpeedEstimator, SpeedReading};
use crate::location::{LocationError, LocationEvent, LocationProvider, PositionWatch, WatchOptions};

const COMMAND_QUEUE: usize = 16;

/// Handle to the background task that owns the location subscription and
/// the speed estimator. Commands go in through [`start`](Self::start) and
/// [`stop`](Self::stop); results come back through
/// [`recv_message`](Self::recv_message).
pub struct SampleIngestor {
    ingest_rx: Receiver<IngestMessage>,
    ingest_tx: TokioSender<IngestCommand>,
}

impl SampleIngestor {
    pub fn new(provider: Box<dyn LocationProvider>, options: WatchOptions, buffer_capacity: usize) -> Self {
        let (gui_tx, ingest_rx) = channel::<IngestMessage>();
        let (ingest_tx, gui_rx) = tokio_channel::<IngestCommand>(COMMAND_QUEUE);

        let state = IngestLoopState::new(provider, options, buffer_capacity, gui_tx, gui_rx);
        tokio::spawn(async move {
            Self::ingest_task(state).await;
        });

        Self {
            ingest_rx,
            ingest_tx,
        }
    }

    /// Ask for a new tracking session tagged with `session`
    pub fn start(&self, session: Uuid) -> anyhow::Result<()> {
        self.ingest_tx.try_send(IngestCommand::Start { session })?;
        Ok(())
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        self.ingest_tx.try_send(IngestCommand::Stop)?;
        Ok(())
    }

    pub fn recv_message(&mut self) -> Option<IngestMessage> {
        self.ingest_rx.try_recv().ok()
    }

    async fn ingest_task(mut state: IngestLoopState) {
        loop {
            match Self::ingest_loop(&mut state).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(error) => {
                    // Only the UI side hanging up ends up here
                    debug!("Ingest task exiting: {}", error);
                    break;
                }
            }
        }

        if let Some(active) = state.active.take() {
            drop(active.watch);
            state.estimator.reset();
        }
    }

    async fn ingest_loop(state: &mut IngestLoopState) -> anyhow::Result<bool> {
        let step = select! {
            command = state.gui_rx.recv() => Step::Command(command),
            (session, event) = next_event(&mut state.active) => Step::Event(session, event),
        };

        match step {
            Step::Command(Some(IngestCommand::Start { session })) => state.start_tracking(session)?,
            Step::Command(Some(IngestCommand::Stop)) => state.stop_tracking()?,
            Step::Command(None) => return Ok(false), // Handle dropped
            Step::Event(session, event) => state.handle_event(session, event)?,
        }

        Ok(true)
    }
}

/// Waits for the next event of the active watch; never resolves while idle
async fn next_event(active: &mut Option<ActiveWatch>) -> (Uuid, Option<LocationEvent>) {
    match active {
        Some(active) => (active.session, active.watch.next_event().await),
        None => std::future::pending().await,
    }
}

enum Step {
    Command(Option<IngestCommand>),
    Event(Uuid, Option<LocationEvent>),
}

struct ActiveWatch {
    session: Uuid,
    watch: PositionWatch,
}

struct IngestLoopState {
    provider: Box<dyn LocationProvider>,
    options: WatchOptions,
    estimator: SpeedEstimator,
    active: Option<ActiveWatch>,
    gui_tx: Sender<IngestMessage>,
    gui_rx: TokioReceiver<IngestCommand>,
}

impl IngestLoopState {
    fn new(
        provider: Box<dyn LocationProvider>,
        options: WatchOptions,
        buffer_capacity: usize,
        gui_tx: Sender<IngestMessage>,
        gui_rx: TokioReceiver<IngestCommand>,
    ) -> Self {
        Self {
            provider,
            options,
            estimator: SpeedEstimator::new(buffer_capacity),
            active: None,
            gui_tx,
            gui_rx,
        }
    }

    fn current_session(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.session)
    }

    fn emit(&self, message: IngestMessage) -> anyhow::Result<()> {
        self.gui_tx.send(message)?;
        Ok(())
    }

    fn start_tracking(&mut self, session: Uuid) -> anyhow::Result<()> {
        if let Some(current) = self.current_session() {
            debug!("Start of {} ignored, session {} already running", session, current);
            return Ok(());
        }

        match self.provider.watch_position(&self.options) {
            Ok(watch) => {
                self.estimator.begin();
                self.active = Some(ActiveWatch { session, watch });
                info!(
                    "Tracking session {} started on {} (smoothing over {} samples)",
                    session,
                    self.provider.name(),
                    self.estimator.recent_speeds().capacity()
                );
                self.emit(IngestMessage::Started { session })
            }
            Err(error) => {
                warn!("Could not start tracking on {}: {}", self.provider.name(), error);
                self.emit(IngestMessage::Error { session, error })
            }
        }
    }

    fn stop_tracking(&mut self) -> anyhow::Result<()> {
        let Some(active) = self.active.take() else {
            debug!("Stop ignored, not tracking");
            return Ok(());
        };

        // Unsubscribe first so nothing from this watch can reach the estimator after the reset
        drop(active.watch);
        self.estimator.reset();

        info!("Tracking session {} stopped", active.session);
        self.emit(IngestMessage::Stopped { session: active.session })
    }

    fn handle_event(&mut self, session: Uuid, event: Option<LocationEvent>) -> anyhow::Result<()> {
        if self.current_session() != Some(session) {
            debug!("Discarding event from finished session {}", session);
            return Ok(());
        }

        match event {
            Some(Ok(sample)) => {
                debug!(
                    "Fix {:.6},{:.6} speed {:?} accuracy {:.1} m",
                    sample.latitude, sample.longitude, sample.speed_mps, sample.accuracy_m
                );
                match self.estimator.process(&sample) {
                    Some(reading) => {
                        debug!(
                            "Speed {:.2} m/s (instant {:.2}, window {}/{})",
                            reading.speed_mps,
                            reading.instantaneous_mps,
                            self.estimator.recent_speeds().len(),
                            self.estimator.recent_speeds().capacity()
                        );
                        self.emit(IngestMessage::Reading { session, reading })
                    }
                    None => Ok(()),
                }
            }
            Some(Err(error)) => self.fail(session, error),
            None => self.fail(session, LocationError::PositionUnavailable("location stream ended".into())),
        }
    }

    /// Any location failure ends the session; restarting is up to the user
    fn fail(&mut self, session: Uuid, error: LocationError) -> anyhow::Result<()> {
        warn!("Tracking session {} failed: {}", session, error);
        self.emit(IngestMessage::Error { session, error })?;
        self.stop_tracking()
    }
}

#[derive(Debug)]
pub enum IngestCommand {
    Start { session: Uuid },
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestMessage {
    Started { session: Uuid },
    Reading { session: Uuid, reading: SpeedReading },
    Error { session: Uuid, error: LocationError },
    Stopped { session: Uuid },
}
