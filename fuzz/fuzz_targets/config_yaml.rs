#![no_main]

use libfuzzer_sys::fuzz_target;
use railstat_core::AnalyzerConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = AnalyzerConfig::from_yaml(s) {
            let _ = config.classifier();
        }
    }
});
