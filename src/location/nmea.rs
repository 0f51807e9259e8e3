//! NMEA 0183 parser for serial GNSS receivers.
//! Understands RMC (position, speed, UTC date/time) and GGA (HDOP).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::consts::{HDOP_UERE_M, KNOTS_TO_MPS, NMEA_MAX_LINE, UNKNOWN_ACCURACY_M};
use crate::location::PositionSample;

/// Outcome of a complete RMC sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NmeaEvent {
    Fix(PositionSample),
    /// Receiver is talking but has no valid fix (status V)
    NoFix,
}

pub struct NmeaParser {
    line_buffer: Vec<u8>,
    last_hdop: Option<f64>,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            line_buffer: Vec::with_capacity(NMEA_MAX_LINE),
            last_hdop: None,
        }
    }

    /// Feed a byte from the serial port.
    /// Returns an event when the byte completes an RMC sentence.
    pub fn feed_byte(&mut self, byte: u8) -> Option<NmeaEvent> {
        match byte {
            b'$' => {
                self.line_buffer.clear();
                self.line_buffer.push(byte);
                None
            }
            b'\r' => None,
            b'\n' => {
                if self.line_buffer.is_empty() {
                    return None;
                }
                let event = self.parse_line();
                self.line_buffer.clear();
                event
            }
            _ => {
                if !self.line_buffer.is_empty() && self.line_buffer.len() < NMEA_MAX_LINE {
                    self.line_buffer.push(byte);
                }
                None
            }
        }
    }

    /// Accuracy radius derived from the last GGA HDOP
    pub fn accuracy_m(&self) -> f64 {
        match self.last_hdop {
            Some(hdop) => hdop * HDOP_UERE_M,
            None => UNKNOWN_ACCURACY_M,
        }
    }

    fn parse_line(&mut self) -> Option<NmeaEvent> {
        // NMEA is plain ASCII; anything else is line noise
        if !self.line_buffer.is_ascii() {
            return None;
        }
        let line = match core::str::from_utf8(&self.line_buffer) {
            Ok(s) => s.to_string(),
            Err(_) => return None,
        };
        let body = verify_checksum(&line)?;
        let fields: Vec<&str> = body.split(',').collect();
        let tag = fields.first()?;

        // Talker prefix varies (GP, GN, GL, GA...)
        if tag.len() != 5 {
            return None;
        }
        match tag.get(2..)? {
            "GGA" => {
                self.parse_gga(&fields);
                None
            }
            "RMC" => self.parse_rmc(&fields),
            _ => None,
        }
    }

    /// Format: $GPGGA,hhmmss.ss,llll.ll,a,yyyyy.yy,a,q,nn,h.h,...
    fn parse_gga(&mut self, fields: &[&str]) {
        if fields.len() < 9 {
            return;
        }
        if fields[6] == "0" {
            self.last_hdop = None;
            return;
        }
        if let Ok(hdop) = fields[8].parse::<f64>() {
            self.last_hdop = Some(hdop.max(0.0));
        }
    }

    /// Format: $GPRMC,hhmmss.ss,A,ddmm.mmmm,N,dddmm.mmmm,E,speed,course,ddmmyy,,,*checksum
    fn parse_rmc(&self, fields: &[&str]) -> Option<NmeaEvent> {
        if fields.len() < 10 {
            return None;
        }

        if fields[2] != "A" {
            return Some(NmeaEvent::NoFix);
        }

        let latitude = parse_coordinate(fields[3], fields[4])?;
        let longitude = parse_coordinate(fields[5], fields[6])?;
        let timestamp_ms = parse_timestamp(fields[1], fields[9])?;

        // Empty speed field leaves the estimator to derive one from positions
        let speed_mps = fields[7].parse::<f64>().ok().map(|knots| knots * KNOTS_TO_MPS);

        Some(NmeaEvent::Fix(PositionSample {
            latitude,
            longitude,
            speed_mps,
            accuracy_m: self.accuracy_m(),
            timestamp_ms,
        }))
    }
}

/// Strip and verify the `*hh` checksum if one is present.
/// Returns the sentence body without the leading `$`.
fn verify_checksum(line: &str) -> Option<&str> {
    let line = line.strip_prefix('$')?;
    match line.split_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            (actual == expected).then_some(body)
        }
        None => Some(line),
    }
}

/// Parse NMEA coordinate field (ddmm.mmmm or dddmm.mmmm)
fn parse_coordinate(coord_str: &str, dir_str: &str) -> Option<f64> {
    if coord_str.is_empty() || dir_str.is_empty() {
        return None;
    }

    let value = coord_str.parse::<f64>().ok()?;

    let degrees = (value / 100.0).floor();
    let minutes = value - (degrees * 100.0);

    let mut decimal = degrees + (minutes / 60.0);

    if dir_str == "S" || dir_str == "W" {
        decimal = -decimal;
    }

    Some(decimal)
}

/// Combine RMC time (hhmmss.ss) and date (ddmmyy) into epoch milliseconds
fn parse_timestamp(time_str: &str, date_str: &str) -> Option<i64> {
    if time_str.len() < 6 || date_str.len() != 6 {
        return None;
    }

    let hh = time_str.get(0..2)?.parse::<u32>().ok()?;
    let mm = time_str.get(2..4)?.parse::<u32>().ok()?;
    let ss = time_str.get(4..6)?.parse::<u32>().ok()?;
    let millis = match time_str.get(6..) {
        Some(frac) if frac.len() > 1 => ((frac.parse::<f64>().ok()? * 1000.0).round() as u32).min(999),
        _ => 0,
    };

    let day = date_str.get(0..2)?.parse::<u32>().ok()?;
    let month = date_str.get(2..4)?.parse::<u32>().ok()?;
    let year = 2000 + date_str.get(4..6)?.parse::<i32>().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hh, mm, ss, millis)?;
    Some(NaiveDateTime::new(date, time).and_utc().timestamp_millis())
}
