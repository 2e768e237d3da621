//! Streaming per-signature aggregation.
//!
//! Nothing about individual requests is kept: each ingest folds one record
//! into running totals. Means are derived on read so they can never go stale.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::UnknownField;
use crate::model::CompletedRequest;

pub const DEFAULT_BLOCKER_THRESHOLD_SECONDS: f64 = 1.0;
pub const DEFAULT_MIN_NON_DATABASE_SHARE: f64 = 0.5;

/// When a slow request counts as a blocker: at least `threshold_seconds` long,
/// and more than `min_non_database_share` of it spent outside the database.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockerPolicy {
    pub threshold_seconds: f64,
    pub min_non_database_share: f64,
}

impl Default for BlockerPolicy {
    fn default() -> Self {
        Self {
            threshold_seconds: DEFAULT_BLOCKER_THRESHOLD_SECONDS,
            min_non_database_share: DEFAULT_MIN_NON_DATABASE_SHARE,
        }
    }
}

impl BlockerPolicy {
    pub fn with_threshold(threshold_seconds: f64) -> Self {
        Self {
            threshold_seconds,
            ..Default::default()
        }
    }

    pub fn is_blocker(&self, request: &CompletedRequest) -> bool {
        let duration = request.duration_seconds;
        if duration <= 0.0 || duration < self.threshold_seconds {
            return false;
        }
        request.non_database_seconds() / duration > self.min_non_database_share
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub count: u64,
    pub total_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub total_database_seconds: f64,
    /// Requests that contributed to `total_database_seconds`.
    pub database_count: u64,
    pub total_view_seconds: f64,
    pub view_count: u64,
    pub blocker_count: u64,
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self {
            count: 0,
            total_duration_seconds: 0.0,
            min_duration_seconds: f64::INFINITY,
            max_duration_seconds: 0.0,
            total_database_seconds: 0.0,
            database_count: 0,
            total_view_seconds: 0.0,
            view_count: 0,
            blocker_count: 0,
        }
    }
}

impl AggregateStats {
    fn record(&mut self, request: &CompletedRequest, blocker: bool) {
        let duration = request.duration_seconds;
        self.count += 1;
        self.total_duration_seconds += duration;
        self.min_duration_seconds = self.min_duration_seconds.min(duration);
        self.max_duration_seconds = self.max_duration_seconds.max(duration);
        if let Some(db) = request.database_seconds {
            self.total_database_seconds += db;
            self.database_count += 1;
        }
        if let Some(view) = request.view_seconds {
            self.total_view_seconds += view;
            self.view_count += 1;
        }
        if blocker {
            self.blocker_count += 1;
        }
    }

    pub fn mean_duration_seconds(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_duration_seconds / self.count as f64
    }

    /// `None` when no request in the group had a known database time.
    pub fn mean_database_seconds(&self) -> Option<f64> {
        (self.database_count > 0).then(|| self.total_database_seconds / self.database_count as f64)
    }

    pub fn mean_view_seconds(&self) -> Option<f64> {
        (self.view_count > 0).then(|| self.total_view_seconds / self.view_count as f64)
    }
}

/// Run-wide statistics, independent of signature.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GlobalStats {
    pub request_count: u64,
    pub min_timestamp: Option<NaiveDateTime>,
    pub max_timestamp: Option<NaiveDateTime>,
    pub hourly_histogram: [u64; 24],
    pub status_counts: BTreeMap<u16, u64>,
}

impl GlobalStats {
    fn record(&mut self, request: &CompletedRequest) {
        self.request_count += 1;
        *self.status_counts.entry(request.http_status).or_default() += 1;

        let Some(ts) = request.timestamp else {
            return;
        };
        if self.min_timestamp.is_none_or(|min| ts < min) {
            self.min_timestamp = Some(ts);
        }
        if self.max_timestamp.is_none_or(|max| ts > max) {
            self.max_timestamp = Some(ts);
        }
        self.hourly_histogram[ts.hour() as usize] += 1;
    }

    /// First and last observed timestamps, if any request carried one.
    pub fn timespan(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.min_timestamp.zip(self.max_timestamp)
    }

    pub fn hourly_histogram(&self) -> &[u64; 24] {
        &self.hourly_histogram
    }
}

/// Statistics that groups can be ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    Count,
    TotalDuration,
    MeanDuration,
    MaxDuration,
    TotalDatabase,
    MeanDatabase,
    TotalView,
    MeanView,
    BlockerCount,
}

impl StatField {
    pub const ALL: [StatField; 9] = [
        StatField::Count,
        StatField::TotalDuration,
        StatField::MeanDuration,
        StatField::MaxDuration,
        StatField::TotalDatabase,
        StatField::MeanDatabase,
        StatField::TotalView,
        StatField::MeanView,
        StatField::BlockerCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatField::Count => "count",
            StatField::TotalDuration => "total_duration",
            StatField::MeanDuration => "mean_duration",
            StatField::MaxDuration => "max_duration",
            StatField::TotalDatabase => "total_database",
            StatField::MeanDatabase => "mean_database",
            StatField::TotalView => "total_view",
            StatField::MeanView => "mean_view",
            StatField::BlockerCount => "blocker_count",
        }
    }

    /// Ranking value; unknown means rank as zero.
    pub fn value(&self, stats: &AggregateStats) -> f64 {
        match self {
            StatField::Count => stats.count as f64,
            StatField::TotalDuration => stats.total_duration_seconds,
            StatField::MeanDuration => stats.mean_duration_seconds(),
            StatField::MaxDuration => stats.max_duration_seconds,
            StatField::TotalDatabase => stats.total_database_seconds,
            StatField::MeanDatabase => stats.mean_database_seconds().unwrap_or(0.0),
            StatField::TotalView => stats.total_view_seconds,
            StatField::MeanView => stats.mean_view_seconds().unwrap_or(0.0),
            StatField::BlockerCount => stats.blocker_count as f64,
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "count" => StatField::Count,
            "total_duration" | "totalDurationSeconds" | "total_time" => StatField::TotalDuration,
            "mean_duration" | "meanDurationSeconds" | "mean_time" => StatField::MeanDuration,
            "max_duration" | "maxDurationSeconds" => StatField::MaxDuration,
            "total_database" | "totalDatabaseSeconds" | "total_db_time" => {
                StatField::TotalDatabase
            }
            "mean_database" | "meanDatabaseSeconds" | "mean_db_time" => StatField::MeanDatabase,
            "total_view" | "totalViewSeconds" => StatField::TotalView,
            "mean_view" | "meanViewSeconds" => StatField::MeanView,
            "blocker_count" | "blockerCount" | "blockers" => StatField::BlockerCount,
            other => {
                return Err(UnknownField {
                    name: other.to_string(),
                })
            }
        };
        Ok(field)
    }
}

/// Owns every per-signature and global statistic for one run.
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: HashMap<String, AggregateStats>,
    global: GlobalStats,
    blocker: BlockerPolicy,
}

impl Aggregator {
    pub fn new(blocker: BlockerPolicy) -> Self {
        Self {
            groups: HashMap::new(),
            global: GlobalStats::default(),
            blocker,
        }
    }

    /// Folds one request into its group. Ingesting the same request twice counts it twice.
    pub fn ingest(&mut self, signature: &str, request: &CompletedRequest) {
        let blocker = self.blocker.is_blocker(request);
        match self.groups.get_mut(signature) {
            Some(stats) => stats.record(request, blocker),
            None => {
                let mut stats = AggregateStats::default();
                stats.record(request, blocker);
                self.groups.insert(signature.to_string(), stats);
            }
        }
        self.global.record(request);
    }

    pub fn blocker_policy(&self) -> &BlockerPolicy {
        &self.blocker
    }

    pub fn global(&self) -> &GlobalStats {
        &self.global
    }

    pub fn get(&self, signature: &str) -> Option<&AggregateStats> {
        self.groups.get(signature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregateStats)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Ascending by `field`, ties broken by signature.
    pub fn sorted_by(&self, field: &str) -> Result<Vec<(String, AggregateStats)>, UnknownField> {
        Ok(self.sorted_by_field(field.parse()?))
    }

    pub fn sorted_by_field(&self, field: StatField) -> Vec<(String, AggregateStats)> {
        let mut rows: Vec<(&String, &AggregateStats)> = self.groups.iter().collect();
        rows.sort_by(|(a_sig, a), (b_sig, b)| {
            field
                .value(a)
                .total_cmp(&field.value(b))
                .then_with(|| a_sig.cmp(b_sig))
        });
        rows.into_iter()
            .map(|(sig, stats)| (sig.clone(), stats.clone()))
            .collect()
    }

    /// The `limit` highest-ranked groups, highest first.
    pub fn top(&self, field: StatField, limit: usize) -> Vec<(String, AggregateStats)> {
        let mut rows = self.sorted_by_field(field);
        rows.reverse();
        rows.truncate(limit);
        rows
    }
}
