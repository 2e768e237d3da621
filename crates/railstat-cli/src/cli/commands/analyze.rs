use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use railstat_core::{Analyzer, AnalyzerConfig, LineKind};
use tracing::{info, warn};

use super::report;
use crate::cli::args::{Cli, OutputFormat};
use crate::exit_codes;

pub fn run(args: Cli) -> Result<i32> {
    let config = build_config(&args)?;
    let line_types = config
        .line_types
        .iter()
        .map(LineKind::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut analyzer = Analyzer::new(config);
    for path in &args.files {
        let name = path.display().to_string();
        info!("processing {} log lines from {}", line_types, name);
        let reader = open_input(path)?;
        analyzer
            .process_reader(&name, reader)
            .with_context(|| format!("failed to read {}", name))?;
    }
    let analysis = analyzer.finish();

    let reports = args.reports();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => report::write_text(&mut out, &analysis, &reports, args.amount)?,
        OutputFormat::Json => report::write_json(&mut out, &analysis, &reports, args.amount)?,
    }
    out.flush()?;

    if analysis.diagnostics.requests_ingested == 0 {
        warn!("no requests could be reconstructed from the input");
        return Ok(exit_codes::NO_REQUESTS);
    }
    Ok(exit_codes::SUCCESS)
}

/// Config file first, then command-line overrides.
fn build_config(args: &Cli) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => AnalyzerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    if args.fast {
        config.line_types = vec![LineKind::Completed];
    }
    if args.guess_database_time {
        config.estimate_database_time = true;
    }
    if let Some(secs) = args.blocker_duration {
        config.blocker.threshold_seconds = secs;
    }
    config.validate().context("invalid analyzer settings")?;
    Ok(config)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}
