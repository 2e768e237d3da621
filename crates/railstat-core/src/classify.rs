//! Single-line classification of Rails request log lines.
//!
//! Recognized shapes, matched anywhere in the line so logger prefixes are tolerated:
//!
//! ```text
//! Started GET "/users/42" for 127.0.0.1 at 2024-01-15 10:00:00 +0000
//! Processing UsersController#show (for 127.0.0.1 at 2008-08-14 21:16:30) [GET]
//! Completed 200 OK in 500ms (Views: 12.3ms | ActiveRecord: 100.0ms)
//! Completed in 0.21665 (4 reqs/sec) | Rendering: 0.00926 (4%) | DB: 0.00000 (0%) | 200 OK [http://demo.nu/employees]
//! Completed in 53ms (View: 21, DB: 2) | 200 OK [http://localhost/users]
//! ```
//!
//! A line only counts as malformed when its overall shape matches one of these
//! but a field inside it does not parse. Lines that merely mention "Started" or
//! "Completed" in free text are irrelevant, not malformed.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::MalformedLine;
use crate::model::{CompletedLine, LineEvent, LineKind, RequestTarget, StartedLine};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOGGER_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

lazy_static! {
    /// Default Ruby `Logger` prefix: `I, [2024-01-15T10:00:01.123456 #1234]  INFO -- :`.
    static ref LOGGER_PREFIX: Regex = Regex::new(r"^[A-Z], \[(\S+) #\d+\]").unwrap();
    static ref STARTED: Regex =
        Regex::new(r#"Started ([A-Z]+) "([^"]*)" for (\S+) at (\S+ \S+)"#).unwrap();
    static ref PROCESSING: Regex =
        Regex::new(r"Processing (\S+)#(\S+) \(for (\S+) at (\S+ [^\s)]+)\) \[([A-Z]+)\]").unwrap();
    static ref COMPLETED_MS: Regex =
        Regex::new(r"Completed (\d{3})\b[^()]*? in (\S+?)ms\b(?:\s*\(([^)]*)\))?").unwrap();
    /// The duration is followed by a parenthesised breakdown or a `|` column.
    static ref COMPLETED_IN: Regex = Regex::new(r"Completed in (\S+)( [(|].*)$").unwrap();
    static ref VIEW_FIELD: Regex = Regex::new(r"\b(?:Views?|Rendering): ([^\s,()|]+)").unwrap();
    static ref DB_FIELD: Regex = Regex::new(r"\b(?:DB|ActiveRecord): ([^\s,()|]+)").unwrap();
    static ref STATUS_AND_URL: Regex =
        Regex::new(r"\| (\d{3})\b[^\[|]*(?:\[([^\]]*)\])?").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Seconds,
    Millis,
}

/// Classifies lines one at a time. Holds no state between lines.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    started: bool,
    completed: bool,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new([LineKind::Started, LineKind::Completed])
    }
}

impl LineClassifier {
    pub fn new(kinds: impl IntoIterator<Item = LineKind>) -> Self {
        let kinds: BTreeSet<LineKind> = kinds.into_iter().collect();
        Self {
            started: kinds.contains(&LineKind::Started),
            completed: kinds.contains(&LineKind::Completed),
        }
    }

    /// Only Completed lines: faster, but durations cannot be attributed to Started lines.
    pub fn completed_only() -> Self {
        Self::new([LineKind::Completed])
    }

    pub fn recognizes(&self, kind: LineKind) -> bool {
        match kind {
            LineKind::Started => self.started,
            LineKind::Completed => self.completed,
        }
    }

    /// `line_no` is only used to label errors.
    pub fn classify(&self, line_no: usize, line: &str) -> Result<Option<LineEvent>, MalformedLine> {
        if self.completed && line.contains("Completed ") {
            if let Some(completed) = parse_completed(line_no, line)? {
                return Ok(Some(LineEvent::Completed(completed)));
            }
        }
        if self.started {
            if line.contains("Started ") {
                if let Some(started) = parse_started(line_no, line)? {
                    return Ok(Some(LineEvent::Started(started)));
                }
            }
            if line.contains("Processing ") {
                if let Some(started) = parse_processing(line_no, line)? {
                    return Ok(Some(LineEvent::Started(started)));
                }
            }
        }
        Ok(None)
    }
}

fn logger_timestamp(line: &str) -> Option<NaiveDateTime> {
    let caps = LOGGER_PREFIX.captures(line)?;
    NaiveDateTime::parse_from_str(&caps[1], LOGGER_TIMESTAMP_FORMAT).ok()
}

fn parse_timestamp(line_no: usize, kind: LineKind, raw: &str) -> Result<NaiveDateTime, MalformedLine> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| MalformedLine::new(line_no, kind, format!("bad timestamp '{}': {}", raw, e)))
}

/// Accepts `12`, `12.5`, `12ms` and `12.5ms`. A trailing `ms` always means milliseconds.
fn parse_seconds(line_no: usize, field: &str, raw: &str, unit: Unit) -> Result<f64, MalformedLine> {
    let (digits, unit) = match raw.strip_suffix("ms") {
        Some(stripped) => (stripped, Unit::Millis),
        None => (raw, unit),
    };
    let value: f64 = digits.parse().map_err(|_| {
        MalformedLine::new(line_no, LineKind::Completed, format!("non-numeric {} '{}'", field, raw))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(MalformedLine::new(
            line_no,
            LineKind::Completed,
            format!("{} out of range: {}", field, raw),
        ));
    }
    Ok(match unit {
        Unit::Seconds => value,
        Unit::Millis => value / 1000.0,
    })
}

fn optional_field(
    line_no: usize,
    re: &Regex,
    field: &str,
    text: &str,
    unit: Unit,
) -> Result<Option<f64>, MalformedLine> {
    re.captures(text)
        .map(|caps| parse_seconds(line_no, field, &caps[1], unit))
        .transpose()
}

fn parse_started(line_no: usize, line: &str) -> Result<Option<StartedLine>, MalformedLine> {
    let Some(caps) = STARTED.captures(line) else {
        return Ok(None);
    };
    let timestamp = parse_timestamp(line_no, LineKind::Started, &caps[4])?;
    Ok(Some(StartedLine {
        timestamp,
        remote_addr: caps[3].to_string(),
        http_method: caps[1].to_string(),
        target: RequestTarget::Url(caps[2].to_string()),
    }))
}

fn parse_processing(line_no: usize, line: &str) -> Result<Option<StartedLine>, MalformedLine> {
    let Some(caps) = PROCESSING.captures(line) else {
        return Ok(None);
    };
    let timestamp = parse_timestamp(line_no, LineKind::Started, &caps[4])?;
    Ok(Some(StartedLine {
        timestamp,
        remote_addr: caps[3].to_string(),
        http_method: caps[5].to_string(),
        target: RequestTarget::controller_action(&caps[1], &caps[2]),
    }))
}

fn parse_completed(line_no: usize, line: &str) -> Result<Option<CompletedLine>, MalformedLine> {
    if let Some(caps) = COMPLETED_IN.captures(line) {
        return parse_completed_in(line_no, line, &caps[1], &caps[2]).map(Some);
    }
    let Some(caps) = COMPLETED_MS.captures(line) else {
        return Ok(None);
    };
    let http_status = parse_status(line_no, &caps[1])?;
    let duration_seconds = parse_seconds(line_no, "duration", &caps[2], Unit::Millis)?;
    let breakdown = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    Ok(Some(CompletedLine {
        timestamp: logger_timestamp(line),
        duration_seconds,
        http_status,
        database_seconds: optional_field(line_no, &DB_FIELD, "database time", breakdown, Unit::Millis)?,
        view_seconds: optional_field(line_no, &VIEW_FIELD, "view time", breakdown, Unit::Millis)?,
        target: None,
    }))
}

/// `Completed in <duration> ... | <status> ... [<url>]`, the pre-3.0 layout.
fn parse_completed_in(
    line_no: usize,
    line: &str,
    raw_duration: &str,
    rest: &str,
) -> Result<CompletedLine, MalformedLine> {
    // Sub-timings share the unit of the headline duration.
    let unit = if raw_duration.ends_with("ms") {
        Unit::Millis
    } else {
        Unit::Seconds
    };
    let duration_seconds = parse_seconds(line_no, "duration", raw_duration, unit)?;
    let Some(status) = STATUS_AND_URL.captures(rest) else {
        return Err(MalformedLine::new(line_no, LineKind::Completed, "missing http status"));
    };
    let http_status = parse_status(line_no, &status[1])?;
    let target = status
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|url| !url.is_empty())
        .map(|url| RequestTarget::Url(url.to_string()));

    Ok(CompletedLine {
        timestamp: logger_timestamp(line),
        duration_seconds,
        http_status,
        database_seconds: optional_field(line_no, &DB_FIELD, "database time", rest, unit)?,
        view_seconds: optional_field(line_no, &VIEW_FIELD, "view time", rest, unit)?,
        target,
    })
}

fn parse_status(line_no: usize, raw: &str) -> Result<u16, MalformedLine> {
    raw.parse().map_err(|_| {
        MalformedLine::new(line_no, LineKind::Completed, format!("bad http status '{}'", raw))
    })
}
