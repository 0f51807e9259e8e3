use uuid::Uuid;

use crate::ingestor::IngestMessage;
use crate::units::{signal_quality, SpeedUnit};

/// Everything the window needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutView {
    pub display_speed_text: String,
    pub unit: &'static str,
    pub accuracy_text: String,
    pub signal_quality_percent: f64,
    pub error_message: Option<String>,
    pub is_tracking: bool,
}

/// UI-side state fed by ingest messages.
///
/// Messages are tagged with the session that produced them. The readout picks
/// the id for each start request, so only the answer to the latest request is
/// accepted and anything still in flight for an older session is dropped.
pub struct Readout {
    unit: SpeedUnit,
    speed_mps: f64,
    accuracy_m: Option<f64>,
    error: Option<String>,
    session: Option<Uuid>,
    pending_start: Option<Uuid>,
}

impl Readout {
    pub fn new(unit: SpeedUnit) -> Self {
        Self {
            unit,
            speed_mps: 0.0,
            accuracy_m: None,
            error: None,
            session: None,
            pending_start: None,
        }
    }

    /// Returns the session id to hand to the ingestor with the start command
    pub fn request_start(&mut self) -> Uuid {
        let session = Uuid::new_v4();
        self.pending_start = Some(session);
        self.error = None;
        session
    }

    pub fn request_stop(&mut self) {
        self.pending_start = None;
        self.end_session();
    }

    pub fn toggle_unit(&mut self) -> SpeedUnit {
        self.unit = self.unit.toggle();
        self.unit
    }

    pub fn unit(&self) -> SpeedUnit {
        self.unit
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.pending_start.is_some() || self.session.is_some()
    }

    pub fn apply(&mut self, message: &IngestMessage) {
        match message {
            IngestMessage::Started { session } => {
                if self.pending_start == Some(*session) {
                    self.pending_start = None;
                    self.session = Some(*session);
                    self.error = None;
                }
            }
            IngestMessage::Reading { session, reading } => {
                if self.session == Some(*session) {
                    self.speed_mps = reading.speed_mps.max(0.0);
                    self.accuracy_m = Some(reading.accuracy_m);
                    self.error = None;
                }
            }
            IngestMessage::Error { session, error } => {
                if self.session == Some(*session) || self.pending_start == Some(*session) {
                    self.pending_start = None;
                    self.error = Some(error.to_string());
                    self.end_session();
                }
            }
            IngestMessage::Stopped { session } => {
                if self.session == Some(*session) {
                    self.end_session();
                }
            }
        }
    }

    fn end_session(&mut self) {
        self.session = None;
        self.speed_mps = 0.0;
        self.accuracy_m = None;
    }

    pub fn view(&self) -> ReadoutView {
        ReadoutView {
            display_speed_text: self.unit.format(self.speed_mps),
            unit: self.unit.label(),
            accuracy_text: match self.accuracy_m {
                Some(accuracy) => format!("±{:.0} m", accuracy),
                None => "--".to_string(),
            },
            signal_quality_percent: self.accuracy_m.map(signal_quality).unwrap_or(0.0),
            error_message: self.error.clone(),
            is_tracking: self.is_tracking(),
        }
    }
}
