//! Drives classification, reconstruction, normalization and aggregation for a run.
//!
//! ```no_run
//! use railstat_core::{AnalyzerConfig, Analyzer, StatField};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let mut analyzer = Analyzer::new(AnalyzerConfig::default());
//! let file = File::open("production.log").unwrap();
//! analyzer.process_reader("production.log", BufReader::new(file)).unwrap();
//! let analysis = analyzer.finish();
//! for (signature, stats) in analysis.aggregator.top(StatField::Count, 10) {
//!     println!("{signature}: {} requests", stats.count);
//! }
//! ```

use std::io::BufRead;

use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::classify::LineClassifier;
use crate::config::AnalyzerConfig;
use crate::diagnostics::Diagnostics;
use crate::errors::AnalyzeError;
use crate::model::{LineEvent, LineKind};
use crate::reconstruct::Reconstructor;
use crate::signature::signature;

/// Per-line problems beyond this many per run are logged at debug level only.
const WARN_LIMIT: u64 = 3;

#[derive(Debug)]
pub struct Analyzer {
    config: AnalyzerConfig,
    classifier: LineClassifier,
    aggregator: Aggregator,
    diagnostics: Diagnostics,
}

/// Outcome of one input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    pub source: String,
    pub diagnostics: Diagnostics,
}

/// Everything a run produced. Individual requests are not part of it.
#[derive(Debug)]
pub struct Analysis {
    pub aggregator: Aggregator,
    pub diagnostics: Diagnostics,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            classifier: config.classifier(),
            aggregator: Aggregator::new(config.blocker),
            diagnostics: Diagnostics::default(),
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consumes one stream to its end. Lines that are not valid UTF-8 are decoded lossily.
    pub fn process_reader<R: BufRead>(
        &mut self,
        source: &str,
        mut reader: R,
    ) -> Result<StreamReport, AnalyzeError> {
        let mut stream = Stream::new(self, source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => stream.line(&String::from_utf8_lossy(&buf)),
                Err(e) => {
                    return Err(AnalyzeError::Io {
                        source_name: source.to_string(),
                        line: stream.line_no + 1,
                        source: e,
                    })
                }
            }
        }
        Ok(stream.end())
    }

    pub fn process_lines<I, S>(&mut self, source: &str, lines: I) -> StreamReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stream = Stream::new(self, source);
        for line in lines {
            stream.line(line.as_ref());
        }
        stream.end()
    }

    pub fn finish(self) -> Analysis {
        Analysis {
            aggregator: self.aggregator,
            diagnostics: self.diagnostics,
        }
    }

    fn should_warn(&self, already_this_stream: u64) -> bool {
        self.diagnostics.skipped() + already_this_stream < WARN_LIMIT
    }
}

/// One input stream. Pending requests never cross stream boundaries.
struct Stream<'a> {
    analyzer: &'a mut Analyzer,
    source: &'a str,
    reconstructor: Reconstructor,
    diagnostics: Diagnostics,
    line_no: usize,
}

impl<'a> Stream<'a> {
    fn new(analyzer: &'a mut Analyzer, source: &'a str) -> Self {
        let reconstructor = Reconstructor::new(analyzer.config.estimate_database_time);
        Self {
            analyzer,
            source,
            reconstructor,
            diagnostics: Diagnostics {
                streams: 1,
                ..Default::default()
            },
            line_no: 0,
        }
    }

    fn line(&mut self, raw: &str) {
        self.line_no += 1;
        self.diagnostics.lines_read += 1;
        let text = raw.trim_end_matches(['\n', '\r']);

        let event = match self.analyzer.classifier.classify(self.line_no, text) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(err) => {
                if self.analyzer.should_warn(self.diagnostics.skipped()) {
                    warn!(source = self.source, "skipping {}", err);
                } else {
                    debug!(source = self.source, "skipping {}", err);
                }
                self.diagnostics.malformed_lines += 1;
                // The request this line would have closed is lost with it.
                if err.kind == LineKind::Completed
                    && self.reconstructor.discard_oldest().is_some()
                {
                    self.diagnostics.discarded_requests += 1;
                }
                return;
            }
        };

        match &event {
            LineEvent::Started(_) => self.diagnostics.started_lines += 1,
            LineEvent::Completed(_) => self.diagnostics.completed_lines += 1,
        }
        let Some(request) = self.reconstructor.push(self.line_no, event) else {
            return;
        };

        match signature(&request) {
            Ok(sig) => {
                self.analyzer.aggregator.ingest(&sig, &request);
                self.diagnostics.requests_ingested += 1;
            }
            Err(err) => {
                if self.analyzer.should_warn(self.diagnostics.skipped()) {
                    warn!(source = self.source, "dropping {}", err);
                } else {
                    debug!(source = self.source, "dropping {}", err);
                }
                self.diagnostics.invalid_requests += 1;
            }
        }
    }

    fn end(self) -> StreamReport {
        let mut diagnostics = self.diagnostics;
        let unterminated = self.reconstructor.finish();
        if unterminated > 0 {
            warn!(
                source = self.source,
                count = unterminated,
                "discarding requests that never completed"
            );
        }
        diagnostics.unterminated_requests = unterminated as u64;

        info!(
            source = self.source,
            lines = diagnostics.lines_read,
            requests = diagnostics.requests_ingested,
            skipped = diagnostics.skipped(),
            "processed stream"
        );
        self.analyzer.diagnostics.merge(&diagnostics);
        StreamReport {
            source: self.source.to_string(),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, BufReader, Cursor, Read};

    const RAILS3: &str = r#"Started GET "/users/42" for 127.0.0.1 at 2024-01-15 10:00:00 +0000
Processing by UsersController#show as HTML
  Rendered users/show.html.erb (3.0ms)
Completed 200 OK in 500ms (Views: 300.0ms | ActiveRecord: 100.0ms)
Started GET "/users/43?tab=posts" for 127.0.0.1 at 2024-01-15 11:00:01 +0000
Completed 200 OK in 2000ms (Views: 10.0ms | ActiveRecord: 50.0ms)
"#;

    #[test]
    fn reader_stream_aggregates_requests() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let report = analyzer
            .process_reader("rails3.log", Cursor::new(RAILS3))
            .unwrap();
        assert_eq!(report.source, "rails3.log");
        assert_eq!(report.diagnostics.lines_read, 6);
        assert_eq!(report.diagnostics.started_lines, 2);
        assert_eq!(report.diagnostics.completed_lines, 2);
        assert_eq!(report.diagnostics.requests_ingested, 2);
        assert!(report.diagnostics.is_clean());
        assert_eq!(analyzer.diagnostics(), &report.diagnostics);
        assert!(!analyzer.config().is_fast());

        let analysis = analyzer.finish();
        let stats = analysis.aggregator.get("/users/:id/").unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.total_duration_seconds - 2.5).abs() < 1e-9);
        assert!((stats.total_database_seconds - 0.15).abs() < 1e-9);
        assert_eq!(stats.blocker_count, 1);
        assert_eq!(analysis.diagnostics.streams, 1);
    }

    #[test]
    fn fast_mode_without_urls_drops_invalid_requests() {
        let config = AnalyzerConfig {
            line_types: vec![LineKind::Completed],
            ..Default::default()
        };
        let mut analyzer = Analyzer::new(config);
        let report = analyzer.process_lines("rails3.log", RAILS3.lines());
        assert_eq!(report.diagnostics.started_lines, 0);
        assert_eq!(report.diagnostics.invalid_requests, 2);
        assert_eq!(report.diagnostics.requests_ingested, 0);
        assert!(analyzer.aggregator().is_empty());
    }

    #[test]
    fn malformed_lines_are_counted_and_skipped() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let lines = [
            "Completed in oops (1 reqs/sec) | 200 OK [http://x.org/a]",
            "Completed in 0.2 (5 reqs/sec) | 200 OK [http://x.org/a]",
        ];
        let report = analyzer.process_lines("mixed.log", lines);
        assert_eq!(report.diagnostics.malformed_lines, 1);
        assert_eq!(report.diagnostics.requests_ingested, 1);
        assert_eq!(analyzer.aggregator().get("/a/").unwrap().count, 1);
    }

    #[test]
    fn malformed_completed_line_drops_its_request() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let lines = [
            r#"Started GET "/a" for 127.0.0.1 at 2024-01-15 10:00:00 +0000"#,
            "Completed 200 OK in abcms (Views: 1.0ms)",
            r#"Started GET "/b/1" for 127.0.0.1 at 2024-01-15 10:00:01 +0000"#,
            "Completed 200 OK in 5ms",
            r#"Started GET "/c/1" for 127.0.0.1 at 2024-01-15 10:00:02 +0000"#,
            "Completed 200 OK in 7ms",
        ];
        let report = analyzer.process_lines("shifted.log", lines);
        assert_eq!(report.diagnostics.malformed_lines, 1);
        assert_eq!(report.diagnostics.discarded_requests, 1);
        assert_eq!(report.diagnostics.unterminated_requests, 0);
        assert_eq!(report.diagnostics.requests_ingested, 2);

        let agg = analyzer.aggregator();
        assert!(agg.get("/a/").is_none());
        assert!((agg.get("/b/:id/").unwrap().total_duration_seconds - 0.005).abs() < 1e-9);
        assert!((agg.get("/c/:id/").unwrap().total_duration_seconds - 0.007).abs() < 1e-9);
    }

    #[test]
    fn analyzer_debug_shows_config_and_counters() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        analyzer.process_lines("debug.log", ["Completed 200 OK in 5ms"]);
        let debug = format!("{:?}", analyzer);
        assert!(debug.starts_with("Analyzer"));
        assert!(debug.contains("invalid_requests: 1"));
    }

    #[test]
    fn pending_requests_do_not_cross_streams() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let first = analyzer.process_lines(
            "a.log",
            [r#"Started GET "/orphan" for 127.0.0.1 at 2024-01-15 10:00:00 +0000"#],
        );
        assert_eq!(first.diagnostics.unterminated_requests, 1);

        let second = analyzer.process_lines(
            "b.log",
            ["Completed 200 OK in 5ms (Views: 1.0ms | ActiveRecord: 1.0ms)"],
        );
        assert_eq!(second.diagnostics.invalid_requests, 1);
        assert!(analyzer.aggregator().get("/orphan/").is_none());

        let analysis = analyzer.finish();
        assert_eq!(analysis.diagnostics.streams, 2);
        assert_eq!(analysis.diagnostics.unterminated_requests, 1);
        assert_eq!(analysis.diagnostics.invalid_requests, 1);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut bytes = br#"Started GET "/caf"#.to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\" for 127.0.0.1 at 2024-01-15 10:00:00 +0000\r\n");
        bytes.extend_from_slice(b"Completed 200 OK in 5ms\r\n");

        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let report = analyzer
            .process_reader("latin1.log", BufReader::new(&bytes[..]))
            .unwrap();
        assert_eq!(report.diagnostics.requests_ingested, 1);
        assert_eq!(analyzer.aggregator().len(), 1);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn read_errors_stop_the_stream() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let err = analyzer
            .process_reader("broken.log", BufReader::new(FailingReader))
            .unwrap_err();
        let AnalyzeError::Io { source_name, line, .. } = err;
        assert_eq!(source_name, "broken.log");
        assert_eq!(line, 1);
    }
}
