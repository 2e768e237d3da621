use clap::{Parser, ValueEnum};
use railstat_core::StatField;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "railstat",
    version,
    about = "Rails log analyzer: request counts and timings grouped by URL or controller action"
)]
pub struct Cli {
    /// Rails log files to analyze; `-` reads standard input
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Only parse Completed lines (no timestamps unless the logger prefixes them)
    #[arg(short = 'f', long)]
    pub fast: bool,

    /// Estimate database time as duration minus view time when the log omits it
    #[arg(short = 'g', long)]
    pub guess_database_time: bool,

    /// Requests at least this slow (seconds) count as blockers
    #[arg(long, value_name = "SECS")]
    pub blocker_duration: Option<f64>,

    /// Rows per table
    #[arg(short = 'c', long, default_value_t = 20)]
    pub amount: usize,

    /// Reports to print, comma separated (default: all)
    #[arg(short = 'o', long, value_enum, value_delimiter = ',')]
    pub output: Vec<Report>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// YAML analyzer config; command-line flags take precedence
    #[arg(long, env = "RAILSTAT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn reports(&self) -> Vec<Report> {
        if self.output.is_empty() {
            Report::ALL.to_vec()
        } else {
            self.output.clone()
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum Report {
    Timespan,
    MostRequested,
    TotalTime,
    MeanTime,
    TotalDbTime,
    MeanDbTime,
    Blockers,
    HourlySpread,
}

impl Report {
    pub const ALL: [Report; 8] = [
        Report::Timespan,
        Report::MostRequested,
        Report::TotalTime,
        Report::MeanTime,
        Report::TotalDbTime,
        Report::MeanDbTime,
        Report::Blockers,
        Report::HourlySpread,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Report::Timespan => "timespan",
            Report::MostRequested => "most_requested",
            Report::TotalTime => "total_time",
            Report::MeanTime => "mean_time",
            Report::TotalDbTime => "total_db_time",
            Report::MeanDbTime => "mean_db_time",
            Report::Blockers => "blockers",
            Report::HourlySpread => "hourly_spread",
        }
    }

    /// The statistic a table report ranks by; `None` for the global reports.
    pub fn field(&self) -> Option<StatField> {
        match self {
            Report::MostRequested => Some(StatField::Count),
            Report::TotalTime => Some(StatField::TotalDuration),
            Report::MeanTime => Some(StatField::MeanDuration),
            Report::TotalDbTime => Some(StatField::TotalDatabase),
            Report::MeanDbTime => Some(StatField::MeanDatabase),
            Report::Blockers => Some(StatField::BlockerCount),
            Report::Timespan | Report::HourlySpread => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_names_match_stat_field_aliases() {
        for report in Report::ALL {
            // most_requested ranks by plain count and has no alias of its own.
            if report == Report::MostRequested {
                continue;
            }
            if let Some(field) = report.field() {
                assert_eq!(report.as_str().parse::<StatField>().unwrap(), field);
            }
        }
        assert_eq!(Report::MostRequested.field(), Some(StatField::Count));
        assert_eq!(Report::HourlySpread.field(), None);
    }

    #[test]
    fn output_list_is_comma_separated() {
        let cli = Cli::try_parse_from([
            "railstat",
            "-o",
            "timespan,mean_db_time",
            "-c",
            "5",
            "production.log",
        ])
        .unwrap();
        assert_eq!(cli.reports(), vec![Report::Timespan, Report::MeanDbTime]);
        assert_eq!(cli.amount, 5);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn defaults_to_every_report() {
        let cli = Cli::try_parse_from(["railstat", "-f", "-g", "a.log", "b.log"]).unwrap();
        assert!(cli.fast);
        assert!(cli.guess_database_time);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.reports(), Report::ALL.to_vec());
    }

    #[test]
    fn unknown_report_is_rejected() {
        assert!(Cli::try_parse_from(["railstat", "-o", "slowest", "a.log"]).is_err());
        assert!(Cli::try_parse_from(["railstat"]).is_err());
    }
}
