//! Pairs Started and Completed events into request records.
//!
//! Matching is strictly FIFO: the oldest pending Started line is closed by the
//! next Completed line. Logs written by several workers at once interleave
//! their lines and will be paired incorrectly; there is no correlation key to
//! recover from that.

use std::collections::VecDeque;

use crate::model::{CompletedLine, CompletedRequest, LineEvent, PendingRequest, StartedLine};

#[derive(Debug, Default)]
pub struct Reconstructor {
    pending: VecDeque<PendingRequest>,
    estimate_database_time: bool,
}

impl Reconstructor {
    /// With `estimate_database_time`, a missing database time is derived as
    /// `duration - view` whenever the view time is known.
    pub fn new(estimate_database_time: bool) -> Self {
        Self {
            pending: VecDeque::new(),
            estimate_database_time,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one event. Returns a record each time a Completed event arrives.
    pub fn push(&mut self, line: usize, event: LineEvent) -> Option<CompletedRequest> {
        match event {
            LineEvent::Started(started) => {
                self.pending.push_back(PendingRequest { line, started });
                None
            }
            LineEvent::Completed(completed) => {
                let pending = self.pending.pop_front().map(|p| p.started);
                Some(self.merge(line, pending, completed))
            }
        }
    }

    /// Gives up on the oldest pending request. Called when its Completed line
    /// could not be parsed, so later Completed lines still pair correctly.
    pub fn discard_oldest(&mut self) -> Option<PendingRequest> {
        self.pending.pop_front()
    }

    /// Drops whatever is still pending and returns how many requests never completed.
    pub fn finish(self) -> usize {
        self.pending.len()
    }

    fn merge(
        &self,
        line: usize,
        started: Option<StartedLine>,
        completed: CompletedLine,
    ) -> CompletedRequest {
        let database_seconds = completed.database_seconds.or_else(|| {
            if !self.estimate_database_time {
                return None;
            }
            completed
                .view_seconds
                .map(|view| (completed.duration_seconds - view).max(0.0))
        });

        let (started_at, http_method, started_target) = match started {
            Some(s) => (Some(s.timestamp), Some(s.http_method), Some(s.target)),
            None => (None, None, None),
        };

        CompletedRequest {
            line,
            timestamp: completed.timestamp.or(started_at),
            duration_seconds: completed.duration_seconds,
            database_seconds,
            view_seconds: completed.view_seconds,
            http_status: completed.http_status,
            http_method,
            target: completed.target.or(started_target),
        }
    }
}
