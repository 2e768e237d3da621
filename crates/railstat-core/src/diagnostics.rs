use serde::Serialize;

/// Data-quality counters for one run. Nothing counted here aborts processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub streams: u64,
    pub lines_read: u64,
    pub started_lines: u64,
    pub completed_lines: u64,
    /// Lines with a recognized shape whose fields failed to parse.
    pub malformed_lines: u64,
    /// Requests dropped because neither a URL nor a controller/action was known.
    pub invalid_requests: u64,
    /// Pending requests dropped because their Completed line was malformed.
    pub discarded_requests: u64,
    /// Started lines still waiting for a Completed line when their stream ended.
    pub unterminated_requests: u64,
    pub requests_ingested: u64,
}

impl Diagnostics {
    pub fn merge(&mut self, other: &Diagnostics) {
        self.streams += other.streams;
        self.lines_read += other.lines_read;
        self.started_lines += other.started_lines;
        self.completed_lines += other.completed_lines;
        self.malformed_lines += other.malformed_lines;
        self.invalid_requests += other.invalid_requests;
        self.unterminated_requests += other.unterminated_requests;
        self.discarded_requests += other.discarded_requests;
        self.requests_ingested += other.requests_ingested;
    }

    pub fn skipped(&self) -> u64 {
        self.malformed_lines
            + self.invalid_requests
            + self.unterminated_requests
            + self.discarded_requests
    }

    pub fn is_clean(&self) -> bool {
        self.skipped() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_every_counter() {
        let mut total = Diagnostics {
            streams: 1,
            lines_read: 10,
            malformed_lines: 1,
            ..Default::default()
        };
        let stream = Diagnostics {
            streams: 1,
            lines_read: 5,
            invalid_requests: 2,
            unterminated_requests: 1,
            discarded_requests: 1,
            requests_ingested: 3,
            ..Default::default()
        };
        total.merge(&stream);
        assert_eq!(total.streams, 2);
        assert_eq!(total.lines_read, 15);
        assert_eq!(total.skipped(), 5);
        assert_eq!(total.discarded_requests, 1);
        assert_eq!(total.requests_ingested, 3);
        assert!(!total.is_clean());
        assert!(Diagnostics::default().is_clean());
    }
}
