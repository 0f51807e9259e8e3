use std::collections::VecDeque;

use crate::consts::{JITTER_DISTANCE_M, NOISE_FLOOR_MPS};
use crate::geo::haversine_distance;
use crate::location::PositionSample;

/// Fixed-capacity FIFO of recent instantaneous speeds (m/s)
#[derive(Debug, Clone)]
pub struct RecentSpeeds {
    speeds: VecDeque<f64>,
    capacity: usize,
}

impl RecentSpeeds {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            speeds: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a speed, evicting the oldest entry once full
    pub fn push(&mut self, speed: f64) {
        if self.speeds.len() == self.capacity {
            self.speeds.pop_front();
        }
        self.speeds.push_back(speed);
    }

    /// Arithmetic mean, 0 when empty
    pub fn average(&self) -> f64 {
        if self.speeds.is_empty() {
            return 0.0;
        }
        self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
    }

    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.speeds.iter()
    }

    pub fn clear(&mut self) {
        self.speeds.clear();
    }
}

/// Per start/stop cycle state
#[derive(Debug, Clone)]
pub struct TrackingSession {
    previous: Option<PositionSample>,
    recent_speeds: RecentSpeeds,
    active: bool,
}

impl TrackingSession {
    fn new(capacity: usize) -> Self {
        Self {
            previous: None,
            recent_speeds: RecentSpeeds::new(capacity),
            active: false,
        }
    }

    fn clear(&mut self) {
        self.previous = None;
        self.recent_speeds.clear();
        self.active = false;
    }
}

/// Result of processing one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReading {
    /// Smoothed speed, m/s
    pub speed_mps: f64,
    /// Filtered speed this sample contributed, m/s
    pub instantaneous_mps: f64,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

/// Turns position samples into a smoothed speed.
///
/// Each sample yields an instantaneous speed, either the receiver's own
/// value or one derived from the haversine distance to the previous sample.
/// Speeds under the noise floor count as standing still. The displayed
/// value is the mean of the last N instantaneous speeds.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    session: TrackingSession,
    display_speed: f64,
    accuracy: Option<f64>,
}

impl SpeedEstimator {
    pub fn new(capacity: usize) -> Self {
        Self {
            session: TrackingSession::new(capacity),
            display_speed: 0.0,
            accuracy: None,
        }
    }

    /// Open a fresh session
    pub fn begin(&mut self) {
        self.reset();
        self.session.active = true;
    }

    /// Forget everything about the current session
    pub fn reset(&mut self) {
        self.session.clear();
        self.display_speed = 0.0;
        self.accuracy = None;
    }

    /// Feed one sample. Returns `None` without touching any state when no
    /// session is active.
    pub fn process(&mut self, sample: &PositionSample) -> Option<SpeedReading> {
        if !self.session.active {
            return None;
        }

        let instantaneous = apply_noise_floor(self.instantaneous_speed(sample));
        self.session.recent_speeds.push(instantaneous);
        self.display_speed = self.session.recent_speeds.average();

        self.session.previous = Some(*sample);
        self.accuracy = Some(sample.accuracy_m);

        Some(SpeedReading {
            speed_mps: self.display_speed,
            instantaneous_mps: instantaneous,
            accuracy_m: sample.accuracy_m,
            timestamp_ms: sample.timestamp_ms,
        })
    }

    fn instantaneous_speed(&self, sample: &PositionSample) -> Option<f64> {
        if let Some(speed) = sample.speed_mps {
            return Some(speed);
        }

        let previous = self.session.previous.as_ref()?;
        Some(fallback_speed(previous, sample))
    }

    pub fn display_speed(&self) -> f64 {
        self.display_speed
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    pub fn recent_speeds(&self) -> &RecentSpeeds {
        &self.session.recent_speeds
    }

    pub fn previous_sample(&self) -> Option<&PositionSample> {
        self.session.previous.as_ref()
    }
}

/// Speed from two consecutive fixes; 0 for non-positive elapsed time or jitter-sized moves
pub fn fallback_speed(previous: &PositionSample, current: &PositionSample) -> f64 {
    let elapsed_s = (current.timestamp_ms - previous.timestamp_ms) as f64 / 1000.0;
    if elapsed_s <= 0.0 {
        return 0.0;
    }

    let distance = haversine_distance(previous.latitude, previous.longitude, current.latitude, current.longitude);
    if distance <= JITTER_DISTANCE_M {
        return 0.0;
    }

    distance / elapsed_s
}

/// Absent, non-finite, negative or sub-threshold speeds become 0
fn apply_noise_floor(speed: Option<f64>) -> f64 {
    match speed {
        Some(speed) if speed.is_finite() && speed >= NOISE_FLOOR_MPS => speed,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~100 m of latitude
    const HUNDRED_M_DEG: f64 = 100.0 / 111_194.93;

    fn sample(latitude: f64, speed_mps: Option<f64>, timestamp_ms: i64) -> PositionSample {
        PositionSample {
            latitude,
            longitude: 7.0,
            speed_mps,
            accuracy_m: 10.0,
            timestamp_ms,
        }
    }

    fn active(capacity: usize) -> SpeedEstimator {
        let mut estimator = SpeedEstimator::new(capacity);
        estimator.begin();
        estimator
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = RecentSpeeds::new(3);
        for i in 0..50 {
            buffer.push(i as f64);
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_buffer_evicts_oldest_first() {
        let mut buffer = RecentSpeeds::new(3);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.push(3.0);
        buffer.push(4.0);

        let contents: Vec<f64> = buffer.iter().copied().collect();
        assert_eq!(contents, vec![2.0, 3.0, 4.0]);
        assert!((buffer.average() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_buffer_average_is_zero() {
        assert_eq!(RecentSpeeds::new(5).average(), 0.0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RecentSpeeds::new(0);
        buffer.push(2.0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_uses_platform_speed() {
        let mut estimator = active(5);
        let reading = estimator.process(&sample(45.0, Some(5.0), 1_000)).unwrap();

        assert_eq!(reading.speed_mps, 5.0);
        assert_eq!(reading.instantaneous_mps, 5.0);
        assert_eq!(estimator.recent_speeds().len(), 1);
    }

    #[test]
    fn test_first_sample_without_speed_is_zero() {
        let mut estimator = active(5);
        let reading = estimator.process(&sample(45.0, None, 1_000)).unwrap();

        assert_eq!(reading.instantaneous_mps, 0.0);
        assert_eq!(estimator.display_speed(), 0.0);
    }

    #[test]
    fn test_noise_floor_clamps_to_zero() {
        let mut estimator = active(5);
        estimator.process(&sample(45.0, Some(0.19), 1_000));
        estimator.process(&sample(45.0, Some(-3.0), 2_000));
        estimator.process(&sample(45.0, Some(f64::NAN), 3_000));

        assert!(estimator.recent_speeds().iter().all(|&speed| speed == 0.0));
        assert_eq!(estimator.display_speed(), 0.0);
    }

    #[test]
    fn test_noise_floor_boundary_is_kept() {
        let mut estimator = active(5);
        let reading = estimator.process(&sample(45.0, Some(0.2), 1_000)).unwrap();
        assert_eq!(reading.instantaneous_mps, 0.2);
    }

    #[test]
    fn test_fallback_with_non_positive_elapsed_is_zero() {
        let a = sample(45.0, None, 5_000);
        let b = sample(45.0 + HUNDRED_M_DEG, None, 5_000);
        let c = sample(45.0 + HUNDRED_M_DEG, None, 4_000);

        assert_eq!(fallback_speed(&a, &b), 0.0);
        assert_eq!(fallback_speed(&a, &c), 0.0);
    }

    #[test]
    fn test_fallback_jitter_is_zero() {
        // ~0.4 m apart
        let a = sample(45.0, None, 0);
        let b = sample(45.0 + 0.4 / 111_194.93, None, 1_000);
        assert_eq!(fallback_speed(&a, &b), 0.0);
    }

    #[test]
    fn test_platform_then_fallback_scenario() {
        let mut estimator = active(5);

        let first = estimator.process(&sample(45.0, Some(5.0), 0)).unwrap();
        assert_eq!(first.speed_mps, 5.0);

        let second = estimator.process(&sample(45.0 + HUNDRED_M_DEG, None, 10_000)).unwrap();
        assert!((second.instantaneous_mps - 10.0).abs() < 0.01, "got {}", second.instantaneous_mps);
        assert!((second.speed_mps - 7.5).abs() < 0.01, "got {}", second.speed_mps);
    }

    #[test]
    fn test_records_accuracy_and_previous() {
        let mut estimator = active(3);
        let fix = PositionSample {
            accuracy_m: 42.0,
            ..sample(45.0, Some(1.0), 1_000)
        };
        estimator.process(&fix);

        assert_eq!(estimator.accuracy(), Some(42.0));
        assert_eq!(estimator.previous_sample(), Some(&fix));
    }

    #[test]
    fn test_reset_clears_session() {
        let mut estimator = active(3);
        estimator.process(&sample(45.0, Some(4.0), 1_000));
        estimator.reset();

        assert!(!estimator.is_active());
        assert_eq!(estimator.display_speed(), 0.0);
        assert_eq!(estimator.accuracy(), None);
        assert_eq!(estimator.recent_speeds().len(), 0);
        assert!(estimator.previous_sample().is_none());
    }

    #[test]
    fn test_inactive_estimator_ignores_samples() {
        let mut estimator = SpeedEstimator::new(3);
        assert!(estimator.process(&sample(45.0, Some(4.0), 1_000)).is_none());
        assert_eq!(estimator.recent_speeds().len(), 0);
        assert!(estimator.previous_sample().is_none());
    }

    #[test]
    fn test_smoothing_over_window() {
        let mut estimator = active(3);
        for (i, speed) in [3.0, 6.0, 9.0, 12.0].iter().enumerate() {
            estimator.process(&sample(45.0, Some(*speed), i as i64 * 1_000));
        }
        // (6 + 9 + 12) / 3
        assert!((estimator.display_speed() - 9.0).abs() < 1e-9);
    }
}
