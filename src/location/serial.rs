use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serialport::{ErrorKind, SerialPort};
use tokio::sync::mpsc::{channel as tokio_channel, Sender as TokioSender};

use crate::location::nmea::{NmeaEvent, NmeaParser};
use crate::location::{LocationError, LocationEvent, LocationProvider, PositionWatch, WatchOptions};

const READ_POLL: Duration = Duration::from_millis(200);
const EVENT_QUEUE: usize = 32;

/// NMEA GNSS receiver attached to a serial port (USB or UART)
pub struct SerialGpsProvider {
    port: String,
    baud_rate: u32,
}

impl SerialGpsProvider {
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
        }
    }

    fn serial_thread(mut port: Box<dyn SerialPort>, tx: TokioSender<LocationEvent>, running: Arc<AtomicBool>, options: WatchOptions) {
        read_fixes(&mut port, &tx, &running, &options);
        debug!("Serial reader finished");
    }
}

/// Pump NMEA bytes from `reader` into `tx` until the watch is cancelled,
/// the channel closes, the reader fails, or no fix arrives within the
/// timeout. Reads are expected to return `TimedOut` when the line is idle.
fn read_fixes<R: Read + ?Sized>(reader: &mut R, tx: &TokioSender<LocationEvent>, running: &AtomicBool, options: &WatchOptions) {
    let mut parser = NmeaParser::new();
    let mut buffer = [0u8; 256];
    let mut last_fix_at = Instant::now();
    let mut last_sentence_at: Option<Instant> = None;
    let mut last_timestamp: Option<i64> = None;

    while running.load(Ordering::Relaxed) {
        match reader.read(&mut buffer) {
            Ok(length) => {
                for &byte in &buffer[..length] {
                    match parser.feed_byte(byte) {
                        Some(NmeaEvent::Fix(sample)) => {
                            last_sentence_at = Some(Instant::now());
                            last_fix_at = Instant::now();

                            if !options.allow_cached_fix && last_timestamp.is_some_and(|t| sample.timestamp_ms <= t) {
                                debug!("Dropping repeated fix at {}", sample.timestamp_ms);
                                continue;
                            }
                            last_timestamp = Some(sample.timestamp_ms);

                            if tx.blocking_send(Ok(sample)).is_err() {
                                return;
                            }
                        }
                        Some(NmeaEvent::NoFix) => last_sentence_at = Some(Instant::now()),
                        None => {}
                    }
                }
            }
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {}
            Err(error) => {
                warn!("Serial read failed: {}", error);
                _ = tx.blocking_send(Err(LocationError::Transport(error.to_string())));
                return;
            }
        }

        if last_fix_at.elapsed() > options.timeout {
            // A receiver that still talks has lost its fix; silence means the device went away
            let receiver_alive = last_sentence_at.is_some_and(|at| at.elapsed() <= options.timeout);
            let error = if receiver_alive {
                LocationError::PositionUnavailable("receiver has no satellite fix".into())
            } else {
                LocationError::Timeout
            };
            _ = tx.blocking_send(Err(error));
            return;
        }
    }
}

impl LocationProvider for SerialGpsProvider {
    fn name(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }

    fn watch_position(&mut self, options: &WatchOptions) -> Result<PositionWatch, LocationError> {
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(READ_POLL)
            .open()
            .map_err(|error| {
                if let Ok(ports) = serialport::available_ports() {
                    let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
                    info!("Available serial ports: {:?}", names);
                }
                classify_open_error(error)
            })?;

        // NMEA receivers stream at their configured rate; accuracy mode is a receiver-side setting
        info!(
            "Opened {} (high accuracy requested: {}, timeout {:?})",
            self.name(),
            options.high_accuracy,
            options.timeout
        );

        let (tx, rx) = tokio_channel::<LocationEvent>(EVENT_QUEUE);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let options = *options;

        thread::Builder::new()
            .name("gps-serial".into())
            .spawn(move || {
                Self::serial_thread(port, tx, running_clone, options);
            })
            .map_err(|error| LocationError::Transport(error.to_string()))?;

        Ok(PositionWatch::new(rx, running, None))
    }
}

fn classify_open_error(error: serialport::Error) -> LocationError {
    match error.kind() {
        ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
            LocationError::CapabilityUnavailable(error.to_string())
        }
        ErrorKind::Io(io::ErrorKind::PermissionDenied) => LocationError::PermissionDenied(error.to_string()),
        _ => LocationError::Transport(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const RMC_FIRST: &str = "$GPRMC,123519.00,A,4807.038,N,01131.000,E,10.0,084.4,230394,003.1,W\r\n";
    const RMC_SECOND: &str = "$GPRMC,123520.00,A,4807.040,N,01131.000,E,10.0,084.4,230394,003.1,W\r\n";
    const RMC_VOID: &str = "$GPRMC,123521.00,V,,,,,,,230394,,\r\n";

    /// Stands in for a serial port: hands out scripted chunks, then either
    /// repeats `idle` forever or reports an idle line with `TimedOut`.
    struct ScriptedPort {
        script: VecDeque<io::Result<Vec<u8>>>,
        idle: Option<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(script: Vec<io::Result<Vec<u8>>>, idle: Option<&str>) -> Self {
            Self {
                script: script.into(),
                idle: idle.map(|s| s.as_bytes().to_vec()),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let chunk = match self.script.pop_front() {
                Some(chunk) => chunk?,
                None => {
                    thread::sleep(Duration::from_millis(2));
                    match &self.idle {
                        Some(idle) => idle.clone(),
                        None => return Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
                    }
                }
            };
            let length = chunk.len().min(buf.len());
            buf[..length].copy_from_slice(&chunk[..length]);
            Ok(length)
        }
    }

    fn run(port: &mut ScriptedPort, allow_cached_fix: bool) -> Vec<LocationEvent> {
        let options = WatchOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(50),
            allow_cached_fix,
        };
        let (tx, mut rx) = tokio_channel::<LocationEvent>(EVENT_QUEUE);
        let running = AtomicBool::new(true);
        read_fixes(port, &tx, &running, &options);
        drop(tx);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn bytes(sentence: &str) -> io::Result<Vec<u8>> {
        Ok(sentence.as_bytes().to_vec())
    }

    #[test]
    fn test_fixes_then_silence_times_out() {
        let mut port = ScriptedPort::new(vec![bytes(RMC_FIRST), bytes(RMC_SECOND)], None);
        let events = run(&mut port, false);

        assert_eq!(events.len(), 3, "got {:?}", events);
        let first = events[0].as_ref().unwrap();
        assert!((first.latitude - 48.1173).abs() < 0.0001);
        assert!((first.speed_mps.unwrap() - 5.14444).abs() < 1e-6);
        assert!(events[1].as_ref().unwrap().timestamp_ms > first.timestamp_ms);
        assert_eq!(events[2], Err(LocationError::Timeout));
    }

    #[test]
    fn test_sentence_split_across_reads() {
        let (head, tail) = RMC_FIRST.split_at(20);
        let mut port = ScriptedPort::new(vec![bytes(head), bytes(tail)], None);
        let events = run(&mut port, false);

        assert!(events[0].is_ok(), "got {:?}", events);
    }

    #[test]
    fn test_void_status_is_position_unavailable() {
        let mut port = ScriptedPort::new(Vec::new(), Some(RMC_VOID));
        let events = run(&mut port, false);

        assert_eq!(events.len(), 1, "got {:?}", events);
        assert!(matches!(events[0], Err(LocationError::PositionUnavailable(_))));
    }

    #[test]
    fn test_repeated_fix_is_dropped_unless_cached_allowed() {
        let script = || vec![bytes(RMC_FIRST), bytes(RMC_FIRST), bytes(RMC_SECOND)];

        let events = run(&mut ScriptedPort::new(script(), None), false);
        let fixes = events.iter().filter(|event| event.is_ok()).count();
        assert_eq!(fixes, 2, "got {:?}", events);

        let events = run(&mut ScriptedPort::new(script(), None), true);
        let fixes = events.iter().filter(|event| event.is_ok()).count();
        assert_eq!(fixes, 3, "got {:?}", events);
    }

    #[test]
    fn test_read_error_is_transport() {
        let mut port = ScriptedPort::new(
            vec![bytes(RMC_FIRST), Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))],
            None,
        );
        let events = run(&mut port, false);

        assert_eq!(events.len(), 2, "got {:?}", events);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(LocationError::Transport(_))));
    }

    #[test]
    fn test_cancelled_watch_stops_reading() {
        let mut port = ScriptedPort::new(vec![bytes(RMC_FIRST)], None);
        let (tx, mut rx) = tokio_channel::<LocationEvent>(EVENT_QUEUE);
        let running = AtomicBool::new(false);
        read_fixes(&mut port, &tx, &running, &WatchOptions::default());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_device_is_capability_unavailable() {
        let error = serialport::Error::new(ErrorKind::NoDevice, "no such port");
        assert!(matches!(classify_open_error(error), LocationError::CapabilityUnavailable(_)));

        let error = serialport::Error::new(ErrorKind::Io(io::ErrorKind::NotFound), "gone");
        assert!(matches!(classify_open_error(error), LocationError::CapabilityUnavailable(_)));
    }

    #[test]
    fn test_access_denied_is_permission_denied() {
        let error = serialport::Error::new(ErrorKind::Io(io::ErrorKind::PermissionDenied), "dialout group");
        assert!(matches!(classify_open_error(error), LocationError::PermissionDenied(_)));
    }

    #[test]
    fn test_other_failures_are_transport() {
        let error = serialport::Error::new(ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(classify_open_error(error), LocationError::Transport(_)));
    }

    #[test]
    fn test_name_includes_port_and_baud() {
        let provider = SerialGpsProvider::new("/dev/ttyUSB0", 38400);
        assert_eq!(provider.name(), "/dev/ttyUSB0 @ 38400 baud");
    }
}
