#![no_main]

use libfuzzer_sys::fuzz_target;
use railstat_core::{Analyzer, AnalyzerConfig};

// Arbitrary log text must never panic anywhere in the pipeline.
fuzz_target!(|data: &[u8]| {
    let mut analyzer = Analyzer::new(AnalyzerConfig {
        estimate_database_time: data.first().is_some_and(|b| b & 1 == 1),
        ..Default::default()
    });
    let _ = analyzer.process_reader("fuzz", data);
    let analysis = analyzer.finish();
    for field in railstat_core::StatField::ALL {
        let _ = analysis.aggregator.sorted_by_field(field);
    }
});
