//! Text and JSON renderings of a finished analysis.

use std::collections::BTreeMap;
use std::io::{self, Write};

use chrono::{NaiveDateTime, TimeDelta};
use railstat_core::{AggregateStats, Aggregator, Analysis, Diagnostics, GlobalStats, StatField};
use serde::Serialize;

use crate::cli::args::Report;

const SIGNATURE_WIDTH: usize = 50;
const BAR_WIDTH: usize = 50;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Highest first. Groups with nothing to show for the field (no blockers,
/// no database time) are left out, except when ranking by count.
fn ranked(aggregator: &Aggregator, field: StatField, amount: usize) -> Vec<(String, AggregateStats)> {
    aggregator
        .top(field, aggregator.len())
        .into_iter()
        .filter(|(_, stats)| field == StatField::Count || field.value(stats) > 0.0)
        .take(amount)
        .collect()
}

fn title(report: Report, amount: usize, aggregator: &Aggregator) -> String {
    match report {
        Report::Timespan => "Timespan".to_string(),
        Report::MostRequested => format!("Top {} most requested actions", amount),
        Report::TotalTime => format!("Top {} actions by time - cumulative", amount),
        Report::MeanTime => format!("Top {} actions by time - per request mean", amount),
        Report::TotalDbTime => format!("Top {} actions by database time - cumulative", amount),
        Report::MeanDbTime => format!("Top {} actions by database time - per request mean", amount),
        Report::Blockers => format!(
            "Top {} blockers (at least {:.1}s, mostly outside the database)",
            amount,
            aggregator.blocker_policy().threshold_seconds
        ),
        Report::HourlySpread => "Requests per hour".to_string(),
    }
}

pub fn write_text<W: Write>(
    out: &mut W,
    analysis: &Analysis,
    reports: &[Report],
    amount: usize,
) -> io::Result<()> {
    write_summary(out, &analysis.diagnostics)?;

    let aggregator = &analysis.aggregator;
    for report in reports {
        writeln!(out)?;
        let heading = title(*report, amount, aggregator);
        writeln!(out, "{}", heading)?;
        writeln!(out, "{}", "-".repeat(heading.len()))?;
        match report.field() {
            Some(field) => write_table(out, aggregator, field, amount)?,
            None if *report == Report::Timespan => write_timespan(out, aggregator.global())?,
            None => write_hourly_spread(out, aggregator.global())?,
        }
    }
    Ok(())
}

fn write_summary<W: Write>(out: &mut W, d: &Diagnostics) -> io::Result<()> {
    writeln!(
        out,
        "Analyzed {} requests ({} lines, {} file(s))",
        d.requests_ingested, d.lines_read, d.streams
    )?;
    if !d.is_clean() {
        writeln!(
            out,
            "Skipped {} malformed lines, {} requests without url or action, {} unterminated requests",
            d.malformed_lines, d.invalid_requests, d.unterminated_requests
        )?;
        if d.discarded_requests > 0 {
            writeln!(
                out,
                "Dropped {} requests whose Completed line was malformed",
                d.discarded_requests
            )?;
        }
    }
    Ok(())
}

fn write_table<W: Write>(
    out: &mut W,
    aggregator: &Aggregator,
    field: StatField,
    amount: usize,
) -> io::Result<()> {
    let rows = ranked(aggregator, field, amount);
    if rows.is_empty() {
        return writeln!(out, "(none)");
    }
    for (signature, stats) in rows {
        match field {
            StatField::Count => writeln!(
                out,
                "{:<width$}: {} requests",
                signature,
                stats.count,
                width = SIGNATURE_WIDTH
            )?,
            StatField::BlockerCount => writeln!(
                out,
                "{:<width$}: {:>10} blockers [{} requests]",
                signature,
                stats.blocker_count,
                stats.count,
                width = SIGNATURE_WIDTH
            )?,
            _ => writeln!(
                out,
                "{:<width$}: {:>10.3}s [{} requests]",
                signature,
                field.value(&stats),
                stats.count,
                width = SIGNATURE_WIDTH
            )?,
        }
    }
    Ok(())
}

fn write_timespan<W: Write>(out: &mut W, global: &GlobalStats) -> io::Result<()> {
    let Some((first, last)) = global.timespan() else {
        return writeln!(out, "No request carried a timestamp");
    };
    writeln!(out, "First request: {}", first.format(TIMESTAMP_FORMAT))?;
    writeln!(out, "Last request:  {}", last.format(TIMESTAMP_FORMAT))?;
    writeln!(out, "Covered:       {}", format_span(last - first))
}

fn format_span(span: TimeDelta) -> String {
    let secs = span.num_seconds().max(0);
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (hours, minutes, seconds) = (rest / 3600, rest % 3600 / 60, rest % 60);
    if days > 0 {
        format!("{}d {}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

fn write_hourly_spread<W: Write>(out: &mut W, global: &GlobalStats) -> io::Result<()> {
    let histogram = global.hourly_histogram();
    let max = histogram.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return writeln!(out, "No request carried a timestamp");
    }
    for (hour, &count) in histogram.iter().enumerate() {
        let bar = (count as f64 / max as f64 * BAR_WIDTH as f64).round() as usize;
        let line = format!(
            "{:>2}:00 - {:>2}:59 : {:>6} requests : {}",
            hour,
            hour,
            count,
            "#".repeat(bar)
        );
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    diagnostics: &'a Diagnostics,
    status_counts: &'a BTreeMap<u16, u64>,
    /// Present when requested; `null` if no request carried a timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    timespan: Option<Option<JsonTimespan>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hourly_spread: Option<&'a [u64; 24]>,
    tables: BTreeMap<&'static str, Vec<JsonRow>>,
}

#[derive(Serialize)]
struct JsonTimespan {
    first: NaiveDateTime,
    last: NaiveDateTime,
    seconds: i64,
}

#[derive(Serialize)]
struct JsonRow {
    signature: String,
    value: f64,
    #[serde(flatten)]
    stats: AggregateStats,
}

pub fn write_json<W: Write>(
    out: &mut W,
    analysis: &Analysis,
    reports: &[Report],
    amount: usize,
) -> anyhow::Result<()> {
    let aggregator = &analysis.aggregator;
    let global = aggregator.global();
    let mut json = JsonReport {
        diagnostics: &analysis.diagnostics,
        status_counts: &global.status_counts,
        timespan: None,
        hourly_spread: None,
        tables: BTreeMap::new(),
    };

    for report in reports {
        match report.field() {
            Some(field) => {
                let rows = ranked(aggregator, field, amount)
                    .into_iter()
                    .map(|(signature, stats)| JsonRow {
                        value: field.value(&stats),
                        signature,
                        stats,
                    })
                    .collect();
                json.tables.insert(report.as_str(), rows);
            }
            None if *report == Report::Timespan => {
                json.timespan = Some(global.timespan().map(|(first, last)| JsonTimespan {
                    first,
                    last,
                    seconds: (last - first).num_seconds(),
                }));
            }
            None => json.hourly_spread = Some(global.hourly_histogram()),
        }
    }

    serde_json::to_writer_pretty(&mut *out, &json)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railstat_core::{Analyzer, AnalyzerConfig, LineKind};

    const LOG: [&str; 6] = [
        r#"Started GET "/users/42" for 127.0.0.1 at 2024-01-15 10:00:00 +0000"#,
        "Completed 200 OK in 500ms (ActiveRecord: 100.0ms)",
        r#"Started GET "/users/43" for 127.0.0.1 at 2024-01-15 10:00:01 +0000"#,
        "Completed 200 OK in 2000ms (ActiveRecord: 50.0ms)",
        r#"Started GET "/reports/2024-01" for 127.0.0.1 at 2024-01-15 12:30:00 +0000"#,
        "Completed 200 OK in 3000ms (Views: 100.0ms | ActiveRecord: 2800.0ms)",
    ];

    fn analysis(config: AnalyzerConfig) -> Analysis {
        let mut analyzer = Analyzer::new(config);
        analyzer.process_lines("production.log", LOG);
        analyzer.finish()
    }

    fn text(reports: &[Report], amount: usize) -> String {
        let mut out = Vec::new();
        write_text(&mut out, &analysis(AnalyzerConfig::default()), reports, amount).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn tables_use_fixed_width_signature_column() {
        let out = text(&[Report::MostRequested, Report::TotalTime], 20);
        assert!(out.starts_with("Analyzed 3 requests (6 lines, 1 file(s))\n"));
        assert!(out.contains("Top 20 most requested actions\n-----"));
        assert!(out.contains(&format!("{:<50}: 2 requests\n", "/users/:id/")));
        assert!(out.contains(&format!("{:<50}:      3.000s [1 requests]\n", "/reports/:month/")));
        assert!(out.contains(&format!("{:<50}:      2.500s [2 requests]\n", "/users/:id/")));

        // Highest first.
        let out = text(&[Report::TotalTime], 20);
        assert!(out.find("/reports/:month/").unwrap() < out.find("/users/:id/").unwrap());
    }

    #[test]
    fn amount_limits_rows() {
        let out = text(&[Report::MostRequested], 1);
        assert!(out.contains("/users/:id/"));
        assert!(!out.contains("/reports/:month/"));
    }

    #[test]
    fn blockers_table_skips_groups_without_blockers() {
        let out = text(&[Report::Blockers], 20);
        assert!(out.contains("Top 20 blockers (at least 1.0s, mostly outside the database)"));
        assert!(out.contains(&format!("{:<50}: {:>10} blockers [2 requests]", "/users/:id/", 1)));
        // Three seconds, but nearly all of it in the database.
        assert!(!out.contains("/reports/:month/"));
    }

    #[test]
    fn timespan_and_hourly_spread() {
        let out = text(&[Report::Timespan, Report::HourlySpread], 20);
        assert!(out.contains("First request: 2024-01-15 10:00:00\n"));
        assert!(out.contains("Last request:  2024-01-15 12:30:00\n"));
        assert!(out.contains("Covered:       2h 30m 00s\n"));
        assert!(out.contains(&format!("10:00 - 10:59 :      2 requests : {}\n", "#".repeat(50))));
        assert!(out.contains(&format!("12:00 - 12:59 :      1 requests : {}\n", "#".repeat(25))));
        assert!(out.contains(" 3:00 -  3:59 :      0 requests\n"));
    }

    #[test]
    fn fast_mode_has_no_timespan() {
        let config = AnalyzerConfig {
            line_types: vec![LineKind::Completed],
            ..Default::default()
        };
        let mut out = Vec::new();
        write_text(&mut out, &analysis(config), &[Report::Timespan], 20).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("No request carried a timestamp"));
        assert!(out.contains("Skipped 0 malformed lines, 3 requests without url or action"));
    }

    #[test]
    fn span_formatting() {
        assert_eq!(format_span(TimeDelta::seconds(13_410)), "3h 43m 30s");
        assert_eq!(format_span(TimeDelta::seconds(90_061)), "1d 1h 01m 01s");
        assert_eq!(format_span(TimeDelta::zero()), "0h 00m 00s");
    }

    #[test]
    fn json_contains_only_requested_reports() {
        let mut out = Vec::new();
        write_json(
            &mut out,
            &analysis(AnalyzerConfig::default()),
            &[Report::Timespan, Report::MeanDbTime],
            20,
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["diagnostics"]["requests_ingested"], 3);
        assert_eq!(json["status_counts"]["200"], 3);
        assert_eq!(json["timespan"]["seconds"], 9000);
        assert_eq!(json["timespan"]["first"], "2024-01-15T10:00:00");
        assert!(json.get("hourly_spread").is_none());

        let rows = json["tables"]["mean_db_time"].as_array().unwrap();
        assert_eq!(rows[0]["signature"], "/reports/:month/");
        assert_eq!(rows[0]["count"], 1);
        assert_eq!(rows[1]["signature"], "/users/:id/");
        assert!(json["tables"].get("most_requested").is_none());
    }
}
